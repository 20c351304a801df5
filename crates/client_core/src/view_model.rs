//! Observable session state consumed by the presentation layer.

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use shared::domain::{Address, TokenId, TokenRecord};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Mint,
    UpdateMetadata,
    FetchMetadata,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mint => "mint",
            Self::UpdateMetadata => "metadata update",
            Self::FetchMetadata => "metadata fetch",
        })
    }
}

/// Per-action sub-state: `Idle -> Submitted -> Confirmed|Failed -> Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionState {
    Idle,
    Submitted,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAction {
    pub kind: ActionKind,
    pub token_id: TokenId,
    pub metadata_uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedMetadata {
    pub token_id: TokenId,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub address: Address,
    pub is_authorized_organizer: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewModel {
    pub phase: SessionPhase,
    pub account: Option<Address>,
    pub is_authorized_organizer: bool,
    pub tokens: BTreeMap<TokenId, TokenRecord>,
    pub selected_metadata: Option<SelectedMetadata>,
    pub pending_actions: Vec<PendingAction>,
    pub last_refreshed_at: Option<DateTime<Utc>>,
}

impl ViewModel {
    pub fn connecting() -> Self {
        Self {
            phase: SessionPhase::Connecting,
            ..Self::default()
        }
    }

    pub fn token_ids(&self) -> Vec<&TokenId> {
        self.tokens.keys().collect()
    }

    pub fn contains_token(&self, token_id: &TokenId) -> bool {
        self.tokens.contains_key(token_id)
    }

    /// Front ends disable the triggering control while this is true.
    pub fn is_action_pending(&self, kind: ActionKind, token_id: &TokenId) -> bool {
        self.pending_actions
            .iter()
            .any(|action| action.kind == kind && &action.token_id == token_id)
    }

    pub(crate) fn replace_tokens(&mut self, token_ids: Vec<TokenId>, at: DateTime<Utc>) {
        self.tokens = token_ids
            .into_iter()
            .map(|token_id| (token_id.clone(), TokenRecord::new(token_id)))
            .collect();
        self.last_refreshed_at = Some(at);
    }

    pub(crate) fn show_metadata(&mut self, token_id: TokenId, uri: String) {
        if let Some(record) = self.tokens.get_mut(&token_id) {
            record.metadata_uri = Some(uri.clone());
        }
        self.selected_metadata = Some(SelectedMetadata { token_id, uri });
    }

    pub(crate) fn remove_pending(&mut self, kind: ActionKind, token_id: &TokenId) {
        self.pending_actions
            .retain(|action| !(action.kind == kind && &action.token_id == token_id));
    }
}

/// Builds the shareable `{base}/token/{id}` link that the presentation layer
/// renders as a QR code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketLinks {
    base: Url,
}

impl TicketLinks {
    pub fn new(base: Url) -> Self {
        Self { base }
    }

    pub fn link_for(&self, token_id: &TokenId) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push("token")
                .push(token_id.as_str());
        }
        url
    }
}
