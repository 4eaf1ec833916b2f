use std::fmt;
use thiserror::Error;

/// `ERROR_INVALID_FUNCTION`
pub const ERROR_INVALID_FUNCTION: u32 = 1;
/// `ERROR_NOT_READY`, reported when dismounting a volume that is already gone.
pub const ERROR_NOT_READY: u32 = 21;
/// `ERROR_SECTOR_NOT_FOUND`
pub const ERROR_SECTOR_NOT_FOUND: u32 = 27;
/// `ERROR_INSUFFICIENT_BUFFER`
pub const ERROR_INSUFFICIENT_BUFFER: u32 = 122;

/// Numeric status handed back across the runtime boundary.
///
/// `0` is success, `-1` is the gateway's own "could not attempt" sentinel,
/// anything else is a native error code passed through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResultCode(pub i32);

impl ResultCode {
    pub const SUCCESS: ResultCode = ResultCode(0);
    pub const SENTINEL: ResultCode = ResultCode(-1);

    pub fn from_os(code: u32) -> Self {
        ResultCode(code as i32)
    }

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    pub fn value(self) -> i32 {
        self.0
    }
}

impl<T> From<&std::result::Result<T, GatewayError>> for ResultCode {
    fn from(result: &std::result::Result<T, GatewayError>) -> Self {
        match result {
            Ok(_) => ResultCode::SUCCESS,
            Err(e) => e.code(),
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("OS error {0} (0x{0:X})")]
    Os(u32),

    #[error("Output storage too small: need {needed}, have {capacity}")]
    BufferTooSmall { needed: usize, capacity: usize },

    #[error("Invalid transfer range: offset {offset}, length {length}, capacity {capacity}")]
    InvalidRange { offset: i32, length: i32, capacity: usize },

    #[error("Operation yielded an unusable handle")]
    InvalidHandle,

    #[error("Not available: {0}")]
    Unavailable(&'static str),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Reply too short for {field}: need {needed} bytes, got {len}")]
    TruncatedReply { field: &'static str, needed: usize, len: usize },
}

impl GatewayError {
    /// Code reported to the caller: OS codes verbatim, everything else the sentinel.
    pub fn code(&self) -> ResultCode {
        match self {
            GatewayError::Os(code) => ResultCode::from_os(*code),
            _ => ResultCode::SENTINEL,
        }
    }

    pub fn os_code(&self) -> Option<u32> {
        match self {
            GatewayError::Os(code) => Some(*code),
            _ => None,
        }
    }

    /// Raw devices report one of these two codes when read past their end.
    pub fn is_end_of_media(&self) -> bool {
        matches!(
            self,
            GatewayError::Os(ERROR_INVALID_FUNCTION) | GatewayError::Os(ERROR_SECTOR_NOT_FOUND)
        )
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Checks that caller-supplied storage can hold `needed` slots.
pub fn ensure_capacity(capacity: usize, needed: usize) -> Result<()> {
    if capacity < needed {
        return Err(GatewayError::BufferTooSmall { needed, capacity });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_codes_pass_through() {
        assert_eq!(GatewayError::Os(5).code(), ResultCode(5));
        assert_eq!(GatewayError::Os(0x8007_0005).code().value(), 0x8007_0005u32 as i32);
    }

    #[test]
    fn gateway_failures_use_sentinel() {
        assert_eq!(GatewayError::InvalidHandle.code(), ResultCode::SENTINEL);
        assert_eq!(
            GatewayError::BufferTooSmall { needed: 4, capacity: 2 }.code(),
            ResultCode::SENTINEL
        );
        assert_eq!(
            GatewayError::InvalidRange { offset: -1, length: 10, capacity: 10 }.code(),
            ResultCode(-1)
        );
    }

    #[test]
    fn end_of_media_codes() {
        assert!(GatewayError::Os(ERROR_INVALID_FUNCTION).is_end_of_media());
        assert!(GatewayError::Os(ERROR_SECTOR_NOT_FOUND).is_end_of_media());
        assert!(!GatewayError::Os(ERROR_NOT_READY).is_end_of_media());
        assert!(!GatewayError::InvalidHandle.is_end_of_media());
    }

    #[test]
    fn result_code_from_result() {
        let ok: Result<u32> = Ok(3);
        let err: Result<u32> = Err(GatewayError::Os(32));
        assert!(ResultCode::from(&ok).is_success());
        assert_eq!(ResultCode::from(&err), ResultCode(32));
    }

    #[test]
    fn capacity_check() {
        assert!(ensure_capacity(4, 4).is_ok());
        assert_eq!(
            ensure_capacity(3, 4),
            Err(GatewayError::BufferTooSmall { needed: 4, capacity: 3 })
        );
    }
}
