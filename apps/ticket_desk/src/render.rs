//! Text rendering of coordinator events and view state for the desk prompt.

use client_core::{ActionState, ClientEvent, SessionPhase, ViewModel};

pub const HELP: &str = "\
commands:
  connect                  connect the wallet and load owned tickets
  disconnect               drop the wallet session
  refresh                  reload owned tickets
  mint <id> <hash>         mint ticket <id> with metadata ipfs://<hash>
  metadata <id>            show the metadata URI of ticket <id>
  update <id> <hash>       point ticket <id> at ipfs://<hash> (organizer only)
  link <id>                print the verification link for ticket <id>
  status                   show the session and owned tickets
  quit                     exit";

fn phase_label(phase: SessionPhase) -> &'static str {
    match phase {
        SessionPhase::Disconnected => "disconnected",
        SessionPhase::Connecting => "connecting",
        SessionPhase::Connected => "connected",
    }
}

fn state_label(state: ActionState) -> &'static str {
    match state {
        ActionState::Idle => "idle",
        ActionState::Submitted => "submitted",
        ActionState::Confirmed => "confirmed",
        ActionState::Failed => "failed",
    }
}

pub fn event_line(event: &ClientEvent) -> String {
    match event {
        ClientEvent::SessionStateChanged(phase) => format!("[session] {}", phase_label(*phase)),
        ClientEvent::SessionEstablished(snapshot) => format!(
            "[session] account {}{}",
            snapshot.address,
            if snapshot.is_authorized_organizer {
                " (organizer)"
            } else {
                ""
            }
        ),
        ClientEvent::TokensRefreshed { count } => format!("[tokens] {count} owned"),
        ClientEvent::MetadataLoaded { token_id, uri } => {
            format!("[metadata] token {token_id}: {uri}")
        }
        ClientEvent::ActionStateChanged {
            kind,
            token_id,
            state,
        } => format!("[{kind}] token {token_id}: {}", state_label(*state)),
        ClientEvent::Notice(text) => format!("[notice] {text}"),
        ClientEvent::Error(err) => format!("[error] {err}"),
    }
}

/// One-line digest used to detect view changes worth printing.
pub fn view_summary(view: &ViewModel) -> String {
    let account = view
        .account
        .map(|address| address.to_string())
        .unwrap_or_else(|| "-".into());
    let tokens = view
        .token_ids()
        .into_iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "[view] {} account={account} organizer={} tokens=[{tokens}] pending={}",
        phase_label(view.phase),
        view.is_authorized_organizer,
        view.pending_actions.len()
    )
}

pub fn status(view: &ViewModel) -> String {
    let mut lines = vec![view_summary(view)];
    if let Some(at) = view.last_refreshed_at {
        lines.push(format!("  last refreshed {}", at.format("%Y-%m-%d %H:%M:%S UTC")));
    }
    for action in &view.pending_actions {
        lines.push(format!(
            "  pending {} token {} -> {}",
            action.kind, action.token_id, action.metadata_uri
        ));
    }
    if let Some(selected) = &view.selected_metadata {
        lines.push(format!(
            "  selected token {}: {}",
            selected.token_id, selected.uri
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use client_core::{ActionKind, PendingAction, SessionError, SessionSnapshot};
    use shared::domain::{Address, TokenId, TokenRecord};

    fn token(raw: &str) -> TokenId {
        TokenId::new(raw).expect("token id")
    }

    #[test]
    fn events_render_as_tagged_lines() {
        let address: Address = "0x1111111111111111111111111111111111111111"
            .parse()
            .expect("address");
        assert_eq!(
            event_line(&ClientEvent::SessionEstablished(SessionSnapshot {
                address,
                is_authorized_organizer: true,
            })),
            "[session] account 0x1111111111111111111111111111111111111111 (organizer)"
        );
        assert_eq!(
            event_line(&ClientEvent::ActionStateChanged {
                kind: ActionKind::Mint,
                token_id: token("42"),
                state: ActionState::Submitted,
            }),
            "[mint] token 42: submitted"
        );
        assert_eq!(
            event_line(&ClientEvent::Error(SessionError::NotAuthorized)),
            "[error] only the organizer can update metadata"
        );
    }

    #[test]
    fn status_lists_tokens_and_pending_actions() {
        let mut view = ViewModel::default();
        view.phase = SessionPhase::Connected;
        for id in ["7", "42"] {
            view.tokens.insert(token(id), TokenRecord::new(token(id)));
        }
        view.pending_actions.push(PendingAction {
            kind: ActionKind::UpdateMetadata,
            token_id: token("7"),
            metadata_uri: "ipfs://QmNew".into(),
        });

        let rendered = status(&view);
        assert!(rendered.starts_with("[view] connected account=- organizer=false"));
        assert!(rendered.contains("pending=1"));
        assert!(rendered.contains("  pending metadata update token 7 -> ipfs://QmNew"));
    }
}
