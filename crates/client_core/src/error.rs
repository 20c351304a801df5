use shared::domain::{DomainError, TokenId};
use thiserror::Error;

use crate::view_model::ActionKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("no wallet detected")]
    NoWallet,
    #[error("wallet connection rejected: {0}")]
    ConnectionRejected(String),
    #[error("wallet request failed: {0}")]
    WalletRequest(String),
    #[error("organizer role check failed: {0}")]
    RoleResolution(String),
    #[error("failed to fetch owned tokens: {0}")]
    TokenFetch(String),
    #[error("mint failed: {0}")]
    Mint(String),
    #[error("metadata update failed: {0}")]
    MetadataUpdate(String),
    #[error("failed to fetch token metadata: {0}")]
    MetadataFetch(String),
    #[error("only the organizer can update metadata")]
    NotAuthorized,
    #[error("no wallet session is connected")]
    NotConnected,
    #[error("invalid input: {0}")]
    InvalidInput(#[from] DomainError),
    #[error("{kind} already in flight for token id {token_id}")]
    ActionInFlight { kind: ActionKind, token_id: TokenId },
    #[error("session start superseded by a newer connection attempt")]
    Superseded,
}

impl SessionError {
    /// Errors that leave the client disconnected.
    pub fn is_fatal_to_session_start(&self) -> bool {
        matches!(
            self,
            Self::NoWallet | Self::ConnectionRejected(_) | Self::WalletRequest(_) | Self::Superseded
        )
    }

    /// Errors where re-triggering the same action with the same input may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionRejected(_)
                | Self::WalletRequest(_)
                | Self::RoleResolution(_)
                | Self::TokenFetch(_)
                | Self::Mint(_)
                | Self::MetadataUpdate(_)
                | Self::MetadataFetch(_)
                | Self::ActionInFlight { .. }
        )
    }
}

/// Flattens an adapter error chain into the reason carried by action errors.
pub(crate) fn reason(err: &anyhow::Error) -> String {
    format!("{err:#}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wallet_failures_end_the_session_start() {
        assert!(SessionError::NoWallet.is_fatal_to_session_start());
        assert!(SessionError::ConnectionRejected("denied".into()).is_fatal_to_session_start());
        assert!(!SessionError::RoleResolution("timeout".into()).is_fatal_to_session_start());
        assert!(!SessionError::TokenFetch("timeout".into()).is_fatal_to_session_start());
    }

    #[test]
    fn local_gates_are_not_retryable() {
        assert!(!SessionError::NoWallet.is_retryable());
        assert!(!SessionError::NotAuthorized.is_retryable());
        assert!(!SessionError::InvalidInput(DomainError::Empty { field: "token id" }).is_retryable());
        assert!(SessionError::Mint("execution reverted".into()).is_retryable());
    }
}
