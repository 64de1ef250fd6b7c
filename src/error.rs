use std::time::Duration;

/// Errors surfaced synchronously by the ledger side (state machine, retry
/// manager, store). Chain failures never show up here.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not authorized: {0}")]
    Authorization(String),

    #[error("invalid state: {0}")]
    State(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("storage: {0}")]
    Storage(String),
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        LedgerError::Validation(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        LedgerError::State(msg.into())
    }
}

impl From<sled::Error> for LedgerError {
    fn from(e: sled::Error) -> Self {
        LedgerError::Storage(e.to_string())
    }
}

impl From<bincode::error::EncodeError> for LedgerError {
    fn from(e: bincode::error::EncodeError) -> Self {
        LedgerError::Storage(format!("encoding record: {e}"))
    }
}

impl From<bincode::error::DecodeError> for LedgerError {
    fn from(e: bincode::error::DecodeError) -> Self {
        LedgerError::Storage(format!("decoding record: {e}"))
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Failures talking to the chain. Only the anchor writer sees these; they end
/// up as `ChainLog::error_detail`.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("rpc unavailable: {0}")]
    Unavailable(String),

    #[error("nonce race: {0}")]
    NonceRace(String),

    #[error("contract reverted: {0}")]
    Reverted(String),

    #[error("malformed argument: {0}")]
    Malformed(String),
}

impl ChainError {
    /// Transient failures may be re-attempted by the sweep; permanent ones
    /// wait for an operator.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ChainError::Timeout(_) | ChainError::Unavailable(_) | ChainError::NonceRace(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(ChainError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(ChainError::Unavailable("conn refused".into()).is_transient());
        assert!(ChainError::NonceRace("nonce too low".into()).is_transient());
        assert!(!ChainError::Reverted("execution reverted".into()).is_transient());
        assert!(!ChainError::Malformed("bad address".into()).is_transient());
    }
}
