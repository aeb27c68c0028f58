use thiserror::Error;

/// Exit codes reported by the `procscope` binary
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnCode {
    NoError = 0,
    InvalidArguments = 1,
    AcquisitionFailed = 2,
    RuntimeError = 3,
    NotFound = 4,
    ControlFailed = 5,
}

impl ReturnCode {
    pub fn as_exit_code(self) -> i32 {
        self as i32
    }
}

/// Main error type for procscope operations
#[derive(Error, Debug)]
pub enum ProcscopeError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Failed to acquire process listing from `{command}`: {reason}")]
    Acquisition { command: String, reason: String },

    #[error("Invalid value {value:?} for field {field}: {reason}")]
    FieldFormat {
        field: String,
        value: String,
        reason: String,
    },

    #[error("No process with pid {pid} in snapshot")]
    NotFound { pid: String },

    #[error("Control command failed: {0}")]
    ControlFailed(String),
}

impl ProcscopeError {
    pub(crate) fn acquisition(command: &str, reason: impl Into<String>) -> Self {
        ProcscopeError::Acquisition {
            command: command.to_string(),
            reason: reason.into(),
        }
    }

    /// Convert error to the appropriate return code
    pub fn to_return_code(&self) -> ReturnCode {
        match self {
            ProcscopeError::InvalidArguments(_) => ReturnCode::InvalidArguments,
            ProcscopeError::Acquisition { .. } => ReturnCode::AcquisitionFailed,
            ProcscopeError::FieldFormat { .. } => ReturnCode::RuntimeError,
            ProcscopeError::NotFound { .. } => ReturnCode::NotFound,
            ProcscopeError::ControlFailed(_) => ReturnCode::ControlFailed,
        }
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        self.to_return_code().as_exit_code()
    }
}

/// Result type alias for procscope operations
pub type Result<T> = std::result::Result<T, ProcscopeError>;

impl From<ProcscopeError> for i32 {
    fn from(error: ProcscopeError) -> Self {
        error.exit_code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquisition_maps_to_its_own_exit_code() {
        let err = ProcscopeError::acquisition("ps", "empty output");
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("`ps`"));
    }

    #[test]
    fn test_not_found_mentions_pid() {
        let err = ProcscopeError::NotFound {
            pid: "4242".to_string(),
        };
        assert_eq!(err.to_return_code(), ReturnCode::NotFound);
        assert_eq!(i32::from(err), 4);
    }

    #[test]
    fn test_field_format_is_a_runtime_error() {
        let err = ProcscopeError::FieldFormat {
            field: "CreationDate".to_string(),
            value: "garbage".to_string(),
            reason: "expected YYYYMMDDHHMMSS prefix".to_string(),
        };
        assert_eq!(err.to_return_code(), ReturnCode::RuntimeError);
        assert!(err.to_string().contains("CreationDate"));
    }

    #[test]
    fn test_exit_codes_are_distinct() {
        let codes = [
            ReturnCode::NoError,
            ReturnCode::InvalidArguments,
            ReturnCode::AcquisitionFailed,
            ReturnCode::RuntimeError,
            ReturnCode::NotFound,
            ReturnCode::ControlFailed,
        ];
        for (expected, code) in codes.into_iter().enumerate() {
            assert_eq!(code.as_exit_code(), expected as i32);
        }
    }
}
