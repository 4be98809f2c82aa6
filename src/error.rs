use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Profiling session is already enabled")]
    SessionAlreadyEnabled,

    #[error("Profiling session is not enabled")]
    SessionNotEnabled,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid value {value:?} for {var}: {reason}")]
    InvalidEnv {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("Clock error: {0}")]
    Clock(String),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

// Exit codes for the demo binary
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const INVALID_ARGUMENTS: i32 = 2;
    pub const UNSUPPORTED: i32 = 3;
    pub const FAILURE_SUPPRESSED: i32 = 4;
}

impl Error {
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidArgument(_) | Error::InvalidEnv { .. } => exit_code::INVALID_ARGUMENTS,
            Error::UnsupportedPlatform(_) | Error::Clock(_) => exit_code::UNSUPPORTED,
            _ => exit_code::GENERAL_ERROR,
        }
    }
}
