use super::payload::PayloadKind;
use super::registry::CallbackToken;

/// Error code used when a callback object is dropped by the
///  lower layer without ever being fired.
pub const CALLBACK_DROPPED: i32 = -2000;

/// Status delivered with every native notification.
///
/// An `error_code` of zero means success; anything else is a failure and
///  `description` carries the native error message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FfiResult {
    pub error_code: i32,
    pub description: String,
}

impl FfiResult {
    /// A successful status
    pub fn ok() -> Self {
        Self::default()
    }

    /// A failed status with the given code and message
    pub fn error(error_code: i32, description: impl Into<String>) -> Self {
        Self {
            error_code,
            description: description.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error_code != 0
    }
}

impl From<NativeError> for FfiResult {
    fn from(err: NativeError) -> Self {
        Self {
            error_code: err.code,
            description: err.description,
        }
    }
}

/// The single failure kind reported by the native layer
///
/// Malformed input and cryptographic failures are not told apart by the
///  lower layer, both arrive here with a code and a message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("native error {code}: {description}")]
pub struct NativeError {
    pub code: i32,
    pub description: String,
}

impl NativeError {
    pub fn new(code: i32, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }
}

impl From<FfiResult> for NativeError {
    fn from(result: FfiResult) -> Self {
        Self {
            code: result.error_code,
            description: result.description,
        }
    }
}

/// Errors surfaced by the completion bridge
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// The native layer reported a failure
    #[error(transparent)]
    Native(#[from] NativeError),
    /// The native layer delivered a payload of the wrong shape
    #[error("payload mismatch: expected {expected:?}, got {got:?}")]
    PayloadMismatch {
        expected: PayloadKind,
        got: PayloadKind,
    },
    /// The payload has the right shape but a malformed body
    #[error("malformed payload: expected {expected} bytes, got {got}")]
    MalformedPayload { expected: usize, got: usize },
    /// The token is not (or no longer) registered
    #[error("unknown callback token {0}")]
    UnknownToken(CallbackToken),
    /// A call-once notification was sent to a for-each registration
    #[error("callback token {0} is not a single-shot registration")]
    NotSingleShot(CallbackToken),
    /// A per-item notification was sent to a single-shot registration
    #[error("callback token {0} is not a for-each registration")]
    NotForEach(CallbackToken),
    /// The registration went away without ever being completed
    #[error("callback token {0} was abandoned before completion")]
    Abandoned(CallbackToken),
}

impl BridgeError {
    /// The native failure behind this error, if there is one
    pub fn native(&self) -> Option<&NativeError> {
        match self {
            BridgeError::Native(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_ffi_result_status() {
        assert!(!FfiResult::ok().is_error());
        let failed = FfiResult::error(-7, "bad key");
        assert!(failed.is_error());

        let err = NativeError::from(failed.clone());
        assert_eq!(err.code, -7);
        assert_eq!(err.to_string(), "native error -7: bad key");
        assert_eq!(FfiResult::from(err), failed);
    }

    #[test]
    fn test_bridge_error_exposes_native() {
        let err = BridgeError::from(NativeError::new(-1, "boom"));
        assert_eq!(err.native().map(|e| e.code), Some(-1));
        assert!(BridgeError::Abandoned(CallbackToken::from_raw(3))
            .native()
            .is_none());
    }
}
