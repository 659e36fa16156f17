use thiserror::Error;

/// Win32 error codes the exchange and enumerator react to.
pub mod code {
    pub const ERROR_SUCCESS: u32 = 0;
    pub const ERROR_INVALID_FUNCTION: u32 = 1;
    pub const ERROR_FILE_NOT_FOUND: u32 = 2;
    pub const ERROR_PATH_NOT_FOUND: u32 = 3;
    pub const ERROR_ACCESS_DENIED: u32 = 5;
    pub const ERROR_INVALID_HANDLE: u32 = 6;
    pub const ERROR_INVALID_DATA: u32 = 13;
    pub const ERROR_NOT_READY: u32 = 21;
    pub const ERROR_GEN_FAILURE: u32 = 31;
    pub const ERROR_INVALID_PARAMETER: u32 = 87;
    pub const ERROR_INSUFFICIENT_BUFFER: u32 = 122;
    pub const ERROR_MORE_DATA: u32 = 234;
    pub const ERROR_NO_MORE_ITEMS: u32 = 259;
    pub const ERROR_NOT_FOUND: u32 = 1168;
    pub const ERROR_NOT_A_REPARSE_POINT: u32 = 4390;
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("{operation} failed for {target}: OS error {code}")]
    Os {
        code: u32,
        operation: String,
        target: String,
    },

    #[error("{operation} for {target} needs {requested} bytes, above the {limit} byte limit")]
    BufferLimitExceeded {
        operation: String,
        target: String,
        requested: usize,
        limit: usize,
    },

    #[error("{operation} for {target} was cancelled")]
    Cancelled { operation: String, target: String },

    #[error("handle for {target} is not open")]
    InvalidHandle { target: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unrecognized reparse tag {tag:#010x}")]
    UnrecognizedReparseTag { tag: u32 },

    #[error("unrecognized partition style {0}")]
    UnrecognizedPartitionStyle(u32),

    #[error("malformed {record}: {reason}")]
    Malformed { record: &'static str, reason: String },

    #[error("{0} requires Windows")]
    Unsupported(&'static str),

    #[error("config: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DeviceError>;

impl DeviceError {
    pub fn os(code: u32, operation: impl Into<String>, target: impl Into<String>) -> Self {
        DeviceError::Os {
            code,
            operation: operation.into(),
            target: target.into(),
        }
    }

    pub fn malformed(record: &'static str, reason: impl Into<String>) -> Self {
        DeviceError::Malformed {
            record,
            reason: reason.into(),
        }
    }

    /// OS error code carried by the failure, if it came from the OS.
    pub fn os_code(&self) -> Option<u32> {
        match self {
            DeviceError::Os { code, .. } => Some(*code),
            DeviceError::Io(err) => err.raw_os_error().map(|code| code as u32),
            _ => None,
        }
    }

    /// True for failures detected before any native call was issued.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            DeviceError::InvalidInput(_) | DeviceError::InvalidHandle { .. }
        )
    }
}
