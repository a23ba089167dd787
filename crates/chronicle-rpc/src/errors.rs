//! RPC error codes and error type.

use chronicle_context::ContextError;
use serde_json::json;

use crate::types::RpcErrorBody;

// ── Error code constants ────────────────────────────────────────────

/// Invalid or missing parameters.
pub const INVALID_PARAMS: &str = "INVALID_PARAMS";
/// Unexpected internal error.
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
/// Resource or feature not available.
pub const NOT_AVAILABLE: &str = "NOT_AVAILABLE";
/// Operation not valid in current state.
pub const INVALID_OPERATION: &str = "INVALID_OPERATION";
/// Session does not exist.
pub const SESSION_NOT_FOUND: &str = "SESSION_NOT_FOUND";
/// Session exists but has ended.
pub const SESSION_NOT_ACTIVE: &str = "SESSION_NOT_ACTIVE";
/// The next turn cannot fit even after compaction.
pub const CONTEXT_OVERFLOW: &str = "CONTEXT_OVERFLOW";
/// Lost an append race; retry with the new head.
pub const SEQUENCE_CONFLICT: &str = "SEQUENCE_CONFLICT";

/// RPC error type returned by handlers.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Required parameter missing or wrong type.
    #[error("{message}")]
    InvalidParams {
        /// Description of what is wrong.
        message: String,
    },

    /// Requested resource not found.
    #[error("{message}")]
    NotFound {
        /// Specific error code (e.g. `SESSION_NOT_FOUND`).
        code: String,
        /// Human-readable message.
        message: String,
    },

    /// Internal server error.
    #[error("{message}")]
    Internal {
        /// Description.
        message: String,
    },

    /// Feature or resource not available.
    #[error("{message}")]
    NotAvailable {
        /// Description.
        message: String,
    },

    /// Domain-specific error with arbitrary code.
    #[error("{message}")]
    Custom {
        /// Machine-readable code.
        code: String,
        /// Human-readable message.
        message: String,
        /// Optional structured details.
        details: Option<serde_json::Value>,
    },
}

impl RpcError {
    /// Machine-readable error code for this variant.
    pub fn code(&self) -> &str {
        match self {
            Self::InvalidParams { .. } => INVALID_PARAMS,
            Self::NotFound { code, .. } | Self::Custom { code, .. } => code,
            Self::Internal { .. } => INTERNAL_ERROR,
            Self::NotAvailable { .. } => NOT_AVAILABLE,
        }
    }

    /// Convert to the wire-format error body.
    pub fn to_error_body(&self) -> RpcErrorBody {
        RpcErrorBody {
            code: self.code().to_owned(),
            message: self.to_string(),
            details: match self {
                Self::Custom { details, .. } => details.clone(),
                _ => None,
            },
        }
    }

    fn custom(code: &str, message: String, details: Option<serde_json::Value>) -> Self {
        Self::Custom {
            code: code.to_owned(),
            message,
            details,
        }
    }
}

impl From<ContextError> for RpcError {
    fn from(err: ContextError) -> Self {
        let message = err.to_string();
        match err {
            ContextError::SessionNotFound(_) => Self::NotFound {
                code: SESSION_NOT_FOUND.into(),
                message,
            },
            ContextError::SessionNotActive(_) => Self::custom(SESSION_NOT_ACTIVE, message, None),
            ContextError::EventNotFound(_) | ContextError::InvalidParent(_) => {
                Self::InvalidParams { message }
            }
            ContextError::SequenceConflict {
                session_id,
                expected,
                actual,
            } => Self::custom(
                SEQUENCE_CONFLICT,
                message,
                Some(json!({
                    "sessionId": session_id,
                    "expectedHead": expected,
                    "actualHead": actual,
                })),
            ),
            ContextError::InvalidOperation(_) => Self::custom(INVALID_OPERATION, message, None),
            ContextError::ContextOverflow {
                session_id,
                projected_tokens,
                token_limit,
            } => Self::custom(
                CONTEXT_OVERFLOW,
                message,
                Some(json!({
                    "sessionId": session_id,
                    "projectedTokens": projected_tokens,
                    "tokenLimit": token_limit,
                })),
            ),
            ContextError::SummarizationFailed {
                session_id,
                tokens_before,
                ..
            } => Self::custom(
                INTERNAL_ERROR,
                message,
                Some(json!({
                    "sessionId": session_id,
                    "tokensBefore": tokens_before,
                })),
            ),
            ContextError::Internal(_) => Self::Internal { message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_codes() {
        let err = RpcError::InvalidParams {
            message: "bad".into(),
        };
        assert_eq!(err.code(), INVALID_PARAMS);
        assert_eq!(err.to_string(), "bad");
        assert_eq!(
            RpcError::Internal {
                message: "boom".into()
            }
            .code(),
            INTERNAL_ERROR
        );
        assert_eq!(
            RpcError::NotAvailable {
                message: "nope".into()
            }
            .to_error_body()
            .code,
            NOT_AVAILABLE
        );
    }

    #[test]
    fn session_errors() {
        let err = RpcError::from(ContextError::SessionNotFound("sess_x".into()));
        assert_eq!(err.code(), SESSION_NOT_FOUND);
        assert_eq!(err.to_string(), "session not found: sess_x");

        let err = RpcError::from(ContextError::SessionNotActive("sess_x".into()));
        assert_eq!(err.code(), SESSION_NOT_ACTIVE);
    }

    #[test]
    fn invalid_parent_is_a_params_error() {
        let err = RpcError::from(ContextError::InvalidParent("evt_x".into()));
        assert_eq!(err.code(), INVALID_PARAMS);
    }

    #[test]
    fn overflow_carries_token_counts() {
        let body = RpcError::from(ContextError::ContextOverflow {
            session_id: "sess_1".into(),
            projected_tokens: 1150,
            token_limit: 1000,
        })
        .to_error_body();
        assert_eq!(body.code, CONTEXT_OVERFLOW);
        let details = body.details.unwrap();
        assert_eq!(details["sessionId"], "sess_1");
        assert_eq!(details["projectedTokens"], 1150);
        assert_eq!(details["tokenLimit"], 1000);
    }

    #[test]
    fn summarization_failure_is_internal_with_context() {
        let body = RpcError::from(ContextError::SummarizationFailed {
            session_id: "sess_1".into(),
            tokens_before: 850,
            message: "timed out".into(),
        })
        .to_error_body();
        assert_eq!(body.code, INTERNAL_ERROR);
        assert!(body.message.contains("timed out"));
        assert_eq!(body.details.unwrap()["tokensBefore"], 850);
    }

    #[test]
    fn conflict_and_busy() {
        let err = RpcError::from(ContextError::SequenceConflict {
            session_id: "s".into(),
            expected: "a".into(),
            actual: "b".into(),
        });
        assert_eq!(err.code(), SEQUENCE_CONFLICT);
        assert_eq!(err.to_error_body().details.unwrap()["actualHead"], "b");

        let err = RpcError::from(ContextError::InvalidOperation("busy".into()));
        assert_eq!(err.code(), INVALID_OPERATION);
        assert!(err.to_error_body().details.is_none());
    }
}
