use devgate_core::{GatewayError, ResultCode};
use jni::sys::jint;
use thiserror::Error;

/// Anything that can go wrong inside an exported call.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("JNI: {0}")]
    Jni(#[from] jni::errors::Error),
}

impl BridgeError {
    /// Status reported to Java. OS codes pass through; JNI trouble such as a
    /// null array or a pending exception is the sentinel.
    pub fn code(&self) -> ResultCode {
        match self {
            BridgeError::Gateway(e) => e.code(),
            BridgeError::Jni(_) => ResultCode::SENTINEL,
        }
    }
}

pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

/// Collapses an exported call's outcome into its `jint` status.
pub fn status<T>(result: &BridgeResult<T>) -> jint {
    match result {
        Ok(_) => ResultCode::SUCCESS.value(),
        Err(e) => {
            log::debug!("native call failed: {}", e);
            e.code().value()
        }
    }
}
