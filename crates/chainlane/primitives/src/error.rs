/// Rejections raised while building a call, before anything reaches a node.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("invalid address `{input}`: {reason}")]
    InvalidAddress { input: String, reason: String },
    #[error("calldata must start with a 4 byte selector, got {0} bytes")]
    CalldataTooShort(usize),
    #[error("argument encoding mismatch: {0}")]
    ArgumentMismatch(String),
    #[error("failed to decode return data: {0}")]
    ReturnDecode(String),
}
