//! Wire enums shared with RPC clients.
//!
//! Every enum here is generated from a single declarative table by
//! `wire_enum!`: the table yields the enum itself, forward lookup
//! (`from_code`, `FromStr`), reverse lookup (`code`, `name`, `Display`) and a
//! serde encoding as the numeric wire value. New codes are appended to a
//! table, never renumbered.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::classifier::Tier;
use crate::error::{ProofError, UnknownStatusError};

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident: $payload:ty, $unknown:path {
            $($variant:ident = $code:literal => $label:literal, $data:expr),+ $(,)?
        }
    ) => {
        wire_enum! {
            $(#[$meta])*
            pub enum $name, $unknown {
                $($variant = $code => $label),+
            }
        }

        impl $name {
            /// Extra column of the declarative table.
            pub const fn payload(self) -> $payload {
                match self {
                    $(Self::$variant => $data),+
                }
            }
        }
    };
    (
        $(#[$meta:meta])*
        pub enum $name:ident, $unknown:path {
            $($variant:ident = $code:literal => $label:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "i32", into = "i32")]
        pub enum $name {
            $($variant = $code),+
        }

        impl $name {
            /// Every variant, in table order.
            pub const ALL: &'static [$name] = &[$(Self::$variant),+];

            /// Numeric wire value.
            pub const fn code(self) -> i32 {
                self as i32
            }

            /// Canonical upper-case name.
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }

            pub fn from_code(code: i32) -> Result<Self, ProofError> {
                match code {
                    $($code => Ok(Self::$variant),)+
                    other => Err($unknown(other)),
                }
            }

            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($label => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(self.name())
            }
        }

        impl FromStr for $name {
            type Err = ProofError;

            /// Accepts either the canonical name or the numeric code.
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                if let Some(v) = Self::from_name(&s.to_ascii_uppercase()) {
                    return Ok(v);
                }
                match s.parse::<i32>() {
                    Ok(code) => Self::from_code(code),
                    Err(_) => Err(ProofError::UnknownName(s.to_string())),
                }
            }
        }

        impl TryFrom<i32> for $name {
            type Error = ProofError;

            fn try_from(code: i32) -> Result<Self, Self::Error> {
                Self::from_code(code)
            }
        }

        impl From<$name> for i32 {
            fn from(v: $name) -> i32 {
                v.code()
            }
        }
    };
}

wire_enum! {
    /// External service a proof targets. Selects the fetcher, nothing else.
    pub enum ProofType, ProofError::UnknownType {
        None = 0 => "NONE",
        Keybase = 1 => "KEYBASE",
        Twitter = 2 => "TWITTER",
        Github = 3 => "GITHUB",
        Reddit = 4 => "REDDIT",
        Coinbase = 5 => "COINBASE",
        Hackernews = 6 => "HACKERNEWS",
        Facebook = 8 => "FACEBOOK",
        GenericWebSite = 1000 => "GENERIC_WEB_SITE",
        Dns = 1001 => "DNS",
        Pgp = 1002 => "PGP",
        Rooter = 100001 => "ROOTER",
    }
}

wire_enum! {
    /// Externally visible lifecycle of a proof.
    pub enum ProofState, ProofError::UnknownState {
        None = 0 => "NONE",
        Ok = 1 => "OK",
        TempFailure = 2 => "TEMP_FAILURE",
        PermFailure = 3 => "PERM_FAILURE",
        Looking = 4 => "LOOKING",
        Superseded = 5 => "SUPERSEDED",
        Posted = 6 => "POSTED",
        Revoked = 7 => "REVOKED",
        Deleted = 8 => "DELETED",
    }
}

impl ProofState {
    /// Terminal states accept no classifier-driven transitions.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Deleted | Self::Revoked | Self::Superseded)
    }
}

fn unknown_status(code: i32) -> ProofError {
    ProofError::UnknownStatus(UnknownStatusError { code })
}

wire_enum! {
    /// Result code of one check attempt.
    ///
    /// * `1..=3` success-adjacent
    /// * `1xx` retryable soft errors
    /// * `2xx` hard errors, likely to stick if repeated enough
    /// * `3xx` final hard errors
    pub enum ProofStatus: Tier, unknown_status {
        None = 0 => "NONE", Tier::RetryableSoft,
        Ok = 1 => "OK", Tier::Success,
        Local = 2 => "LOCAL", Tier::Success,
        Found = 3 => "FOUND", Tier::Success,

        BaseError = 100 => "BASE_ERROR", Tier::RetryableSoft,
        HostUnreachable = 101 => "HOST_UNREACHABLE", Tier::RetryableSoft,
        PermissionDenied = 103 => "PERMISSION_DENIED", Tier::RetryableSoft,
        FailedParse = 106 => "FAILED_PARSE", Tier::RetryableSoft,
        DnsError = 107 => "DNS_ERROR", Tier::RetryableSoft,
        AuthFailed = 108 => "AUTH_FAILED", Tier::RetryableSoft,
        Http429 = 129 => "HTTP_429", Tier::RetryableSoft,
        Http500 = 150 => "HTTP_500", Tier::RetryableSoft,
        Timeout = 160 => "TIMEOUT", Tier::RetryableSoft,
        InternalError = 170 => "INTERNAL_ERROR", Tier::RetryableSoft,

        BaseHardError = 200 => "BASE_HARD_ERROR", Tier::CountableHard,
        NotFound = 201 => "NOT_FOUND", Tier::CountableHard,
        ContentFailure = 202 => "CONTENT_FAILURE", Tier::CountableHard,
        BadUsername = 203 => "BAD_USERNAME", Tier::CountableHard,
        BadRemoteId = 204 => "BAD_REMOTE_ID", Tier::CountableHard,
        TextNotFound = 205 => "TEXT_NOT_FOUND", Tier::CountableHard,
        BadArgs = 206 => "BAD_ARGS", Tier::CountableHard,
        ContentMissing = 207 => "CONTENT_MISSING", Tier::CountableHard,
        TitleNotFound = 208 => "TITLE_NOT_FOUND", Tier::CountableHard,
        ServiceError = 209 => "SERVICE_ERROR", Tier::CountableHard,
        TorSkipped = 210 => "TOR_SKIPPED", Tier::CountableHard,
        TorIncompatible = 211 => "TOR_INCOMPATIBLE", Tier::CountableHard,
        Http300 = 230 => "HTTP_300", Tier::CountableHard,
        Http400 = 240 => "HTTP_400", Tier::CountableHard,
        HttpOther = 260 => "HTTP_OTHER", Tier::CountableHard,
        EmptyJson = 270 => "EMPTY_JSON", Tier::CountableHard,

        Deleted = 301 => "DELETED", Tier::LifecycleEvent,
        ServiceDead = 302 => "SERVICE_DEAD", Tier::FinalHard,
        BadSignature = 303 => "BAD_SIGNATURE", Tier::FinalHard,
        BadApiUrl = 304 => "BAD_API_URL", Tier::FinalHard,
        UnknownType = 305 => "UNKNOWN_TYPE", Tier::FinalHard,
        NoHint = 306 => "NO_HINT", Tier::FinalHard,
        BadHintText = 307 => "BAD_HINT_TEXT", Tier::FinalHard,
        InvalidPvl = 308 => "INVALID_PVL", Tier::FinalHard,
    }
}

impl ProofStatus {
    /// Severity tier from the status table.
    pub const fn tier(self) -> Tier {
        self.payload()
    }
}
