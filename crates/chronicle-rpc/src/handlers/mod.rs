//! Method handlers.
//!
//! | Method | Handler |
//! |---|---|
//! | `context.getSnapshot` | [`context::GetSnapshotHandler`] |
//! | `context.getDetailedSnapshot` | [`context::GetDetailedSnapshotHandler`] |
//! | `context.shouldCompact` | [`context::ShouldCompactHandler`] |
//! | `context.preview` | [`context::PreviewCompactionHandler`] |
//! | `context.confirm` | [`context::ConfirmCompactionHandler`] |
//! | `context.canAcceptTurn` | [`context::CanAcceptTurnHandler`] |
//! | `context.clear` | [`context::ClearHandler`] |
//! | `events.getHistory` | [`events::GetHistoryHandler`] |
//! | `session.fork` | [`session::ForkSessionHandler`] |

pub mod context;
pub mod events;
pub mod session;

use serde::Serialize;
use serde_json::Value;

use crate::errors::RpcError;

/// Extract a required parameter from the params object.
pub(crate) fn require_param<'a>(params: Option<&'a Value>, key: &str) -> Result<&'a Value, RpcError> {
    params
        .and_then(|p| p.get(key))
        .ok_or_else(|| RpcError::InvalidParams {
            message: format!("Missing required parameter: {key}"),
        })
}

/// Extract a required string parameter.
pub(crate) fn require_string_param(params: Option<&Value>, key: &str) -> Result<String, RpcError> {
    require_param(params, key)?
        .as_str()
        .map(ToOwned::to_owned)
        .ok_or_else(|| RpcError::InvalidParams {
            message: format!("Parameter '{key}' must be a string"),
        })
}

/// Extract a required non-negative integer parameter.
pub(crate) fn require_u64_param(params: Option<&Value>, key: &str) -> Result<u64, RpcError> {
    require_param(params, key)?
        .as_u64()
        .ok_or_else(|| RpcError::InvalidParams {
            message: format!("Parameter '{key}' must be a non-negative integer"),
        })
}

/// Optional string parameter; present-but-wrong-type is an error.
pub(crate) fn opt_string_param(params: Option<&Value>, key: &str) -> Result<Option<String>, RpcError> {
    match params.and_then(|p| p.get(key)) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(RpcError::InvalidParams {
            message: format!("Parameter '{key}' must be a string"),
        }),
    }
}

/// Optional non-negative integer parameter.
pub(crate) fn opt_usize_param(params: Option<&Value>, key: &str) -> Result<Option<usize>, RpcError> {
    match params.and_then(|p| p.get(key)) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| RpcError::InvalidParams {
                message: format!("Parameter '{key}' must be a non-negative integer"),
            }),
    }
}

/// Serialize a handler result.
pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::Internal {
        message: e.to_string(),
    })
}
