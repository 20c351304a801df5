use std::{
    collections::HashSet,
    sync::{Arc, OnceLock},
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use shared::{
    domain::{Address, MetadataHash, RoleHash, TokenId, TxHash},
    error::RpcException,
    protocol::TransactionRequest,
};
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, error, info, warn};

pub mod config;
pub mod error;
pub mod rpc;
pub mod view_model;

pub use error::SessionError;
pub use view_model::{
    ActionKind, ActionState, PendingAction, SelectedMetadata, SessionPhase, SessionSnapshot,
    TicketLinks, ViewModel,
};

use config::ClientConfig;
use error::reason;
use rpc::{JsonRpcTransport, RpcContractConnector, RpcWalletProvider};

pub const ORGANIZER_ROLE: &str = "ORGANIZER_ROLE";

/// Role identifier checked against the contract, hashed once per process.
pub fn organizer_role_hash() -> RoleHash {
    static HASH: OnceLock<RoleHash> = OnceLock::new();
    *HASH.get_or_init(|| RoleHash::from_role_name(ORGANIZER_ROLE))
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    fn is_available(&self) -> bool;
    /// Suspends until the user approves or rejects account access.
    async fn request_accounts(&self) -> Result<Address>;
    async fn signing_capability(&self, account: Address) -> Result<Arc<dyn TransactionSigner>>;
}

pub struct MissingWalletProvider;

#[async_trait]
impl WalletProvider for MissingWalletProvider {
    fn is_available(&self) -> bool {
        false
    }

    async fn request_accounts(&self) -> Result<Address> {
        Err(anyhow!("no wallet detected"))
    }

    async fn signing_capability(&self, _account: Address) -> Result<Arc<dyn TransactionSigner>> {
        Err(anyhow!("no wallet detected"))
    }
}

#[async_trait]
pub trait TransactionSigner: Send + Sync {
    fn address(&self) -> Address;
    async fn send_transaction(&self, request: TransactionRequest) -> Result<TxHash>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutcome {
    Confirmed,
    Reverted { reason: String },
}

#[async_trait]
pub trait PendingTransaction: Send + Sync {
    fn tx_hash(&self) -> &TxHash;
    async fn await_confirmation(&self) -> Result<TxOutcome>;
}

#[async_trait]
pub trait TicketContract: Send + Sync {
    async fn has_role(&self, role: RoleHash, account: Address) -> Result<bool>;
    async fn token_ids_for_owner(&self, owner: Address) -> Result<Vec<TokenId>>;
    async fn token_uri(&self, token_id: &TokenId) -> Result<String>;
    async fn mint_nft(
        &self,
        to: Address,
        token_id: &TokenId,
        uri: &str,
    ) -> Result<Box<dyn PendingTransaction>>;
    async fn update_metadata(
        &self,
        token_id: &TokenId,
        uri: &str,
    ) -> Result<Box<dyn PendingTransaction>>;
}

/// Binds a contract client to a contract address and a signing capability.
pub trait ContractConnector: Send + Sync {
    fn bind(&self, contract: Address, signer: Arc<dyn TransactionSigner>)
        -> Arc<dyn TicketContract>;
}

#[derive(Debug, Clone)]
pub enum ClientEvent {
    SessionStateChanged(SessionPhase),
    SessionEstablished(SessionSnapshot),
    TokensRefreshed {
        count: usize,
    },
    MetadataLoaded {
        token_id: TokenId,
        uri: String,
    },
    ActionStateChanged {
        kind: ActionKind,
        token_id: TokenId,
        state: ActionState,
    },
    Notice(String),
    Error(SessionError),
}

struct ActiveSession {
    address: Address,
    contract: Arc<dyn TicketContract>,
    is_authorized_organizer: bool,
    // Held for the session lifetime; the contract client signs through it.
    _signer: Arc<dyn TransactionSigner>,
}

struct CoordinatorState {
    epoch: u64,
    session: Option<Arc<ActiveSession>>,
    in_flight: HashSet<(ActionKind, TokenId)>,
}

pub struct SessionCoordinator {
    contract_address: Address,
    wallet: Arc<dyn WalletProvider>,
    connector: Arc<dyn ContractConnector>,
    inner: Mutex<CoordinatorState>,
    view: watch::Sender<ViewModel>,
    events: broadcast::Sender<ClientEvent>,
}

impl SessionCoordinator {
    pub fn new_with_dependencies(
        contract_address: Address,
        wallet: Arc<dyn WalletProvider>,
        connector: Arc<dyn ContractConnector>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        let (view, _) = watch::channel(ViewModel::default());
        Arc::new(Self {
            contract_address,
            wallet,
            connector,
            inner: Mutex::new(CoordinatorState {
                epoch: 0,
                session: None,
                in_flight: HashSet::new(),
            }),
            view,
            events,
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Arc<Self>> {
        let http = Client::builder().timeout(config.request_timeout).build()?;
        let chain = Arc::new(JsonRpcTransport::new(
            http.clone(),
            config.chain_rpc_url.clone(),
        ));
        let wallet: Arc<dyn WalletProvider> = match &config.wallet_url {
            Some(url) => Arc::new(RpcWalletProvider::new(Arc::new(JsonRpcTransport::new(
                http,
                url.clone(),
            )))),
            None => Arc::new(MissingWalletProvider),
        };
        let connector = Arc::new(RpcContractConnector::new(
            chain,
            config.confirmation_poll_interval,
        ));
        Ok(Self::new_with_dependencies(
            config.contract_address,
            wallet,
            connector,
        ))
    }

    pub fn contract_address(&self) -> Address {
        self.contract_address
    }

    pub fn view(&self) -> ViewModel {
        self.view.borrow().clone()
    }

    pub fn subscribe_view(&self) -> watch::Receiver<ViewModel> {
        self.view.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub async fn session(&self) -> Option<SessionSnapshot> {
        let guard = self.inner.lock().await;
        guard.session.as_ref().map(|session| SessionSnapshot {
            address: session.address,
            is_authorized_organizer: session.is_authorized_organizer,
        })
    }

    /// Connects the wallet, binds the contract client, resolves the organizer
    /// role and loads the owned tokens. The view only ever shows a fully
    /// connected session or none at all.
    pub async fn establish_session(&self) -> Result<SessionSnapshot, SessionError> {
        let epoch = {
            let mut guard = self.inner.lock().await;
            guard.epoch += 1;
            guard.session = None;
            guard.in_flight.clear();
            self.view.send_replace(ViewModel::connecting());
            guard.epoch
        };
        let _ = self
            .events
            .send(ClientEvent::SessionStateChanged(SessionPhase::Connecting));

        if !self.wallet.is_available() {
            return Err(self.fail_session_start(epoch, SessionError::NoWallet).await);
        }

        let address = match self.wallet.request_accounts().await {
            Ok(address) => address,
            Err(err) => {
                return Err(self
                    .fail_session_start(epoch, classify_wallet_failure(err))
                    .await)
            }
        };
        let signer = match self.wallet.signing_capability(address).await {
            Ok(signer) => signer,
            Err(err) => {
                return Err(self
                    .fail_session_start(epoch, classify_wallet_failure(err))
                    .await)
            }
        };

        let contract = self
            .connector
            .bind(self.contract_address, Arc::clone(&signer));

        let (is_authorized_organizer, role_error) = match contract
            .has_role(organizer_role_hash(), address)
            .await
        {
            Ok(has_role) => (has_role, None),
            Err(err) => {
                warn!("session: role check failed account={address} err={err:#}");
                (false, Some(SessionError::RoleResolution(reason(&err))))
            }
        };

        let session = Arc::new(ActiveSession {
            address,
            contract,
            is_authorized_organizer,
            _signer: signer,
        });
        let snapshot = SessionSnapshot {
            address,
            is_authorized_organizer,
        };

        {
            let mut guard = self.inner.lock().await;
            if guard.epoch != epoch {
                debug!("session: dropped superseded connection account={address}");
                return Err(SessionError::Superseded);
            }
            guard.session = Some(Arc::clone(&session));
            self.view.send_modify(|view| {
                view.phase = SessionPhase::Connected;
                view.account = Some(address);
                view.is_authorized_organizer = is_authorized_organizer;
            });
        }

        info!(
            "session: connected account={} organizer={} contract={}",
            address, is_authorized_organizer, self.contract_address
        );
        if let Some(err) = role_error {
            self.report(err);
        }
        let _ = self
            .events
            .send(ClientEvent::SessionStateChanged(SessionPhase::Connected));
        let _ = self
            .events
            .send(ClientEvent::SessionEstablished(snapshot.clone()));

        let _ = self.refresh_for(&session, epoch).await;
        Ok(snapshot)
    }

    pub async fn disconnect(&self) {
        {
            let mut guard = self.inner.lock().await;
            guard.epoch += 1;
            guard.session = None;
            guard.in_flight.clear();
            self.view.send_replace(ViewModel::default());
        }
        info!("session: disconnected");
        let _ = self
            .events
            .send(ClientEvent::SessionStateChanged(SessionPhase::Disconnected));
    }

    /// Re-enumerates the session address's tokens and replaces the whole set.
    /// On failure the previous set is kept.
    pub async fn refresh_owned_tokens(&self) -> Result<usize, SessionError> {
        let (session, epoch) = self.current_session().await?;
        self.refresh_for(&session, epoch).await
    }

    pub async fn mint_token(
        &self,
        token_id: &str,
        metadata_hash: &str,
    ) -> Result<TxHash, SessionError> {
        let (session, epoch) = self.current_session().await?;
        let token_id = TokenId::new(token_id).map_err(|err| self.report(err.into()))?;
        let metadata_uri = MetadataHash::new(metadata_hash)
            .map_err(|err| self.report(err.into()))?
            .ipfs_uri();

        self.claim_action(epoch, ActionKind::Mint, &token_id, &metadata_uri)
            .await?;

        let result = async {
            let pending = session
                .contract
                .mint_nft(session.address, &token_id, &metadata_uri)
                .await
                .map_err(|err| SessionError::Mint(reason(&err)))?;
            let tx_hash = pending.tx_hash().clone();
            info!("mint: submitted token={token_id} uri={metadata_uri} tx={tx_hash}");
            confirm(pending.as_ref(), SessionError::Mint).await?;
            Ok::<_, SessionError>(tx_hash)
        }
        .await;

        let current = self
            .finish_action(epoch, ActionKind::Mint, &token_id, &result)
            .await;

        if current && result.is_ok() {
            info!("mint: confirmed token={token_id}");
            let _ = self.events.send(ClientEvent::Notice(format!(
                "ticket minted with token id {token_id}"
            )));
            let _ = self.refresh_for(&session, epoch).await;
        }
        result
    }

    /// Reads the token URI and shows it as the selected metadata. Never cached.
    pub async fn fetch_metadata(&self, token_id: &str) -> Result<String, SessionError> {
        let (session, epoch) = self.current_session().await?;
        let token_id = TokenId::new(token_id).map_err(|err| self.report(err.into()))?;

        self.emit_action(ActionKind::FetchMetadata, &token_id, ActionState::Submitted);
        let result = session
            .contract
            .token_uri(&token_id)
            .await
            .map_err(|err| SessionError::MetadataFetch(reason(&err)));

        {
            let guard = self.inner.lock().await;
            if guard.epoch != epoch {
                debug!("metadata: dropped result from previous session token={token_id}");
                return Err(SessionError::Superseded);
            }
            if let Ok(uri) = &result {
                self.view
                    .send_modify(|view| view.show_metadata(token_id.clone(), uri.clone()));
            }
        }

        match &result {
            Ok(uri) => {
                let _ = self.events.send(ClientEvent::MetadataLoaded {
                    token_id: token_id.clone(),
                    uri: uri.clone(),
                });
                self.emit_action(ActionKind::FetchMetadata, &token_id, ActionState::Confirmed);
            }
            Err(err) => {
                warn!("metadata: fetch failed token={token_id} err={err}");
                self.emit_action(ActionKind::FetchMetadata, &token_id, ActionState::Failed);
                self.report(err.clone());
            }
        }
        self.emit_action(ActionKind::FetchMetadata, &token_id, ActionState::Idle);
        result
    }

    /// Organizer-only. The local role gate is a UX pre-check; the contract
    /// still enforces the role and may reject independently.
    pub async fn update_metadata(
        &self,
        token_id: &str,
        metadata_hash: &str,
    ) -> Result<TxHash, SessionError> {
        let gate = self.active_session().await.and_then(|(session, epoch)| {
            if !session.is_authorized_organizer {
                return None;
            }
            let token_id = TokenId::new(token_id).ok()?;
            let metadata_uri = MetadataHash::new(metadata_hash).ok()?.ipfs_uri();
            Some((session, epoch, token_id, metadata_uri))
        });
        let Some((session, epoch, token_id, metadata_uri)) = gate else {
            return Err(self.report(SessionError::NotAuthorized));
        };

        self.claim_action(epoch, ActionKind::UpdateMetadata, &token_id, &metadata_uri)
            .await?;

        let result = async {
            let pending = session
                .contract
                .update_metadata(&token_id, &metadata_uri)
                .await
                .map_err(|err| SessionError::MetadataUpdate(reason(&err)))?;
            let tx_hash = pending.tx_hash().clone();
            info!("metadata: update submitted token={token_id} uri={metadata_uri} tx={tx_hash}");
            confirm(pending.as_ref(), SessionError::MetadataUpdate).await?;
            Ok::<_, SessionError>(tx_hash)
        }
        .await;

        let current = self
            .finish_action(epoch, ActionKind::UpdateMetadata, &token_id, &result)
            .await;

        if current && result.is_ok() {
            info!("metadata: update confirmed token={token_id}");
            let _ = self.events.send(ClientEvent::Notice(format!(
                "metadata updated for token id {token_id}"
            )));
        }
        result
    }

    async fn active_session(&self) -> Option<(Arc<ActiveSession>, u64)> {
        let guard = self.inner.lock().await;
        guard
            .session
            .as_ref()
            .map(|session| (Arc::clone(session), guard.epoch))
    }

    async fn current_session(&self) -> Result<(Arc<ActiveSession>, u64), SessionError> {
        self.active_session()
            .await
            .ok_or_else(|| self.report(SessionError::NotConnected))
    }

    /// Surfaces an action-boundary failure to the user and hands it back.
    fn report(&self, err: SessionError) -> SessionError {
        let _ = self.events.send(ClientEvent::Error(err.clone()));
        err
    }

    async fn refresh_for(
        &self,
        session: &ActiveSession,
        epoch: u64,
    ) -> Result<usize, SessionError> {
        match session.contract.token_ids_for_owner(session.address).await {
            Ok(token_ids) => {
                let guard = self.inner.lock().await;
                if guard.epoch != epoch {
                    return Err(SessionError::Superseded);
                }
                self.view
                    .send_modify(|view| view.replace_tokens(token_ids, Utc::now()));
                let count = self.view.borrow().tokens.len();
                drop(guard);

                info!(
                    "tokens: refreshed account={} count={count}",
                    session.address
                );
                let _ = self.events.send(ClientEvent::TokensRefreshed { count });
                Ok(count)
            }
            Err(err) => {
                if self.inner.lock().await.epoch != epoch {
                    return Err(SessionError::Superseded);
                }
                warn!(
                    "tokens: refresh failed account={} err={err:#}",
                    session.address
                );
                Err(self.report(SessionError::TokenFetch(reason(&err))))
            }
        }
    }

    async fn fail_session_start(&self, epoch: u64, err: SessionError) -> SessionError {
        {
            let guard = self.inner.lock().await;
            if guard.epoch != epoch {
                debug!("session: dropped failure of superseded connection err={err}");
                return SessionError::Superseded;
            }
            self.view.send_replace(ViewModel::default());
        }
        error!("session: connection failed err={err}");
        let _ = self
            .events
            .send(ClientEvent::SessionStateChanged(SessionPhase::Disconnected));
        self.report(err)
    }

    /// Reserves `(kind, token_id)` so the same transaction cannot be
    /// submitted twice while one is in flight.
    async fn claim_action(
        &self,
        epoch: u64,
        kind: ActionKind,
        token_id: &TokenId,
        metadata_uri: &str,
    ) -> Result<(), SessionError> {
        {
            let mut guard = self.inner.lock().await;
            if guard.epoch != epoch {
                return Err(SessionError::Superseded);
            }
            if !guard.in_flight.insert((kind, token_id.clone())) {
                drop(guard);
                return Err(self.report(SessionError::ActionInFlight {
                    kind,
                    token_id: token_id.clone(),
                }));
            }
            self.view.send_modify(|view| {
                view.pending_actions.push(PendingAction {
                    kind,
                    token_id: token_id.clone(),
                    metadata_uri: metadata_uri.to_string(),
                })
            });
        }
        self.emit_action(kind, token_id, ActionState::Submitted);
        Ok(())
    }

    /// Releases the in-flight claim. Returns `false`, without emitting
    /// anything, when the session the action ran in has been reset.
    async fn finish_action(
        &self,
        epoch: u64,
        kind: ActionKind,
        token_id: &TokenId,
        result: &Result<TxHash, SessionError>,
    ) -> bool {
        {
            let mut guard = self.inner.lock().await;
            if guard.epoch != epoch {
                debug!("{kind}: outcome from previous session dropped token={token_id}");
                return false;
            }
            guard.in_flight.remove(&(kind, token_id.clone()));
            self.view
                .send_modify(|view| view.remove_pending(kind, token_id));
        }

        match result {
            Ok(_) => self.emit_action(kind, token_id, ActionState::Confirmed),
            Err(err) => {
                warn!("{kind}: failed token={token_id} err={err}");
                self.emit_action(kind, token_id, ActionState::Failed);
                self.report(err.clone());
            }
        }
        self.emit_action(kind, token_id, ActionState::Idle);
        true
    }

    fn emit_action(&self, kind: ActionKind, token_id: &TokenId, state: ActionState) {
        let _ = self.events.send(ClientEvent::ActionStateChanged {
            kind,
            token_id: token_id.clone(),
            state,
        });
    }
}

async fn confirm(
    pending: &dyn PendingTransaction,
    failure: fn(String) -> SessionError,
) -> Result<(), SessionError> {
    match pending.await_confirmation().await {
        Ok(TxOutcome::Confirmed) => Ok(()),
        Ok(TxOutcome::Reverted { reason: revert }) => Err(failure(revert)),
        Err(err) => Err(failure(reason(&err))),
    }
}

fn classify_wallet_failure(err: anyhow::Error) -> SessionError {
    let rejection = err
        .chain()
        .filter_map(|cause| cause.downcast_ref::<RpcException>())
        .find(|rpc| rpc.is_user_rejection());
    match rejection {
        Some(rpc) => SessionError::ConnectionRejected(rpc.message.clone()),
        None => SessionError::WalletRequest(reason(&err)),
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
