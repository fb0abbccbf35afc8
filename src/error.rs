//! Error taxonomy for the analyzer
//!
//! Every failure here is fatal to a run: the engine is single-pass and
//! all-or-nothing per minute, so nothing is retried. Unknown-key queries are
//! deliberately *not* errors; they return an empty answer list.

use thiserror::Error;

/// Why a single record failed to decode
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("record ended before field `{field}`")]
    UnexpectedEnd { field: &'static str },

    #[error("field `{field}` is empty")]
    MissingField { field: &'static str },

    #[error("field `{field}` has non-digit byte 0x{byte:02x}")]
    InvalidDigit { field: &'static str, byte: u8 },

    #[error("field `{field}` overflows its integer type")]
    Overflow { field: &'static str },

    #[error("field `{field}` is not a dotted IPv4 address")]
    InvalidIp { field: &'static str },

    #[error("success flag must be `true` or `false`")]
    InvalidBool,

    #[error("service name is not valid UTF-8")]
    InvalidUtf8,
}

/// Errors for analyzer operations
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("malformed record at byte {offset}: {reason}")]
    Decode { offset: u64, reason: DecodeError },

    #[error("malformed alert rule on line {line}: {reason}")]
    Rule { line: usize, reason: String },

    #[error(
        "record for minute {minute} arrived while minute {current} is open; \
         out-of-order skew beyond one minute is not supported"
    )]
    SkewExceeded { minute: i64, current: i64 },

    #[error("pipeline stage `{stage}` failed")]
    StageFailed { stage: &'static str },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("input contains no records")]
    EmptyInput,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
