use alloy_primitives::Bytes;
use alloy_sol_types::{decode_revert_reason, Revert, SolError};

/// JSON-RPC codes some providers use for rate limiting and overload.
const TRANSIENT_RPC_CODES: [i64; 3] = [-32005, -32603, 429];

/// Errors reported by the node or the transport in front of it.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum NodeError {
    /// Connectivity failure, the request may succeed if retried.
    #[error("transport failure: {0}")]
    Transport(String),
    /// The simulated or executed call reverted.
    #[error("execution reverted{}", revert_suffix(.reason))]
    Revert { reason: Option<String>, data: Bytes },
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("malformed node response: {0}")]
    Decode(String),
}

fn revert_suffix(reason: &Option<String>) -> String {
    reason
        .as_ref()
        .map(|reason| format!(": {reason}"))
        .unwrap_or_default()
}

impl NodeError {
    /// Builds a revert from raw revert data, decoding `Error(string)` and panics.
    pub fn revert(data: Bytes) -> Self {
        let reason = match Revert::abi_decode(&data) {
            Ok(revert) => Some(revert.reason),
            Err(_) => decode_revert_reason(&data),
        }
        .filter(|reason| !reason.is_empty());
        Self::Revert { reason, data }
    }

    /// Whether retrying the unchanged request can succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Rpc { code, .. } => TRANSIENT_RPC_CODES.contains(code),
            Self::Revert { .. } | Self::Decode(_) => false,
        }
    }

    pub fn revert_reason(&self) -> Option<&str> {
        match self {
            Self::Revert { reason, .. } => reason.as_deref(),
            _ => None,
        }
    }

    /// Lowercased message for classifying node rejections.
    pub fn message(&self) -> String {
        match self {
            Self::Rpc { message, .. } => message.to_lowercase(),
            other => other.to_string().to_lowercase(),
        }
    }
}

impl From<alloy_transport::TransportError> for NodeError {
    fn from(err: alloy_transport::TransportError) -> Self {
        use alloy_transport::RpcError;

        match err {
            RpcError::ErrorResp(payload) => {
                if let Some(data) = payload.as_revert_data() {
                    return Self::revert(data);
                }
                let message = payload.message.to_string();
                if let Some(reason) = message.strip_prefix("execution reverted") {
                    let reason = reason.trim_start_matches(':').trim();
                    return Self::Revert {
                        reason: (!reason.is_empty()).then(|| reason.to_string()),
                        data: Bytes::new(),
                    };
                }
                Self::Rpc {
                    code: payload.code,
                    message,
                }
            }
            RpcError::Transport(kind) => Self::Transport(kind.to_string()),
            other => Self::Decode(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn decodes_error_string_reverts() {
        let data: Bytes = Revert {
            reason: "insufficient balance".into(),
        }
        .abi_encode()
        .into();
        let err = NodeError::revert(data);
        assert_eq!(err.revert_reason(), Some("insufficient balance"));
        assert_eq!(err.to_string(), "execution reverted: insufficient balance");
        assert!(!err.is_transient());
    }

    #[test]
    fn empty_revert_has_no_reason() {
        let err = NodeError::revert(Bytes::new());
        assert_eq!(err.revert_reason(), None);
        assert_eq!(err.to_string(), "execution reverted");
    }

    #[test_case(NodeError::Transport("connection reset".into()), true ; "transport")]
    #[test_case(NodeError::Rpc { code: 429, message: "too many requests".into() }, true ; "rate limited")]
    #[test_case(NodeError::Rpc { code: -32000, message: "nonce too low".into() }, false ; "rejection")]
    #[test_case(NodeError::Decode("bad hex".into()), false ; "decode")]
    fn transient_classification(err: NodeError, transient: bool) {
        assert_eq!(err.is_transient(), transient);
    }
}
