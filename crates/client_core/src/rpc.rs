//! JSON-RPC adapters for the wallet bridge and the chain node.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use shared::{
    domain::{Address, RoleHash, TokenId, TxHash},
    error::RpcException,
    protocol::{
        methods, ContractCall, ContractMethod, ReceiptStatus, RpcRequest, RpcResponse,
        TransactionReceipt, TransactionRequest,
    },
};
use tracing::debug;
use url::Url;

use crate::{
    ContractConnector, PendingTransaction, TicketContract, TransactionSigner, TxOutcome,
    WalletProvider,
};

pub struct JsonRpcTransport {
    http: Client,
    endpoint: Url,
    next_id: AtomicU64,
}

impl JsonRpcTransport {
    pub fn new(http: Client, endpoint: Url) -> Self {
        Self {
            http,
            endpoint,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let response: RpcResponse = self
            .http
            .post(self.endpoint.clone())
            .json(&RpcRequest::new(id, method, params))
            .send()
            .await
            .with_context(|| format!("{method} request to {} failed", self.endpoint))?
            .error_for_status()?
            .json()
            .await
            .with_context(|| format!("malformed {method} response"))?;

        if let Some(error) = response.error {
            return Err(RpcException::from(error).into());
        }
        if response.id != id {
            bail!(
                "{method} response id mismatch: expected {id}, got {}",
                response.id
            );
        }

        serde_json::from_value(response.result.unwrap_or(Value::Null))
            .with_context(|| format!("unexpected {method} result"))
    }
}

/// Wallet reached through an EIP-1193 style JSON-RPC bridge.
pub struct RpcWalletProvider {
    transport: Arc<JsonRpcTransport>,
}

impl RpcWalletProvider {
    pub fn new(transport: Arc<JsonRpcTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl WalletProvider for RpcWalletProvider {
    fn is_available(&self) -> bool {
        true
    }

    async fn request_accounts(&self) -> Result<Address> {
        let accounts: Vec<Address> = self
            .transport
            .call(methods::REQUEST_ACCOUNTS, json!([]))
            .await?;
        accounts
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("wallet returned no accounts"))
    }

    async fn signing_capability(&self, account: Address) -> Result<Arc<dyn TransactionSigner>> {
        Ok(Arc::new(RpcSigner {
            transport: Arc::clone(&self.transport),
            address: account,
        }))
    }
}

pub struct RpcSigner {
    transport: Arc<JsonRpcTransport>,
    address: Address,
}

#[async_trait]
impl TransactionSigner for RpcSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn send_transaction(&self, request: TransactionRequest) -> Result<TxHash> {
        self.transport
            .call(methods::SEND_TRANSACTION, json!([request]))
            .await
    }
}

pub struct RpcContractConnector {
    chain: Arc<JsonRpcTransport>,
    poll_interval: Duration,
}

impl RpcContractConnector {
    pub fn new(chain: Arc<JsonRpcTransport>, poll_interval: Duration) -> Self {
        Self {
            chain,
            poll_interval,
        }
    }
}

impl ContractConnector for RpcContractConnector {
    fn bind(
        &self,
        contract: Address,
        signer: Arc<dyn TransactionSigner>,
    ) -> Arc<dyn TicketContract> {
        Arc::new(RpcContractClient {
            chain: Arc::clone(&self.chain),
            contract,
            signer,
            poll_interval: self.poll_interval,
        })
    }
}

pub struct RpcContractClient {
    chain: Arc<JsonRpcTransport>,
    contract: Address,
    signer: Arc<dyn TransactionSigner>,
    poll_interval: Duration,
}

impl RpcContractClient {
    async fn read<T: DeserializeOwned>(&self, method: ContractMethod, args: Vec<Value>) -> Result<T> {
        let call = ContractCall {
            to: self.contract,
            method,
            args,
        };
        self.chain
            .call(methods::CONTRACT_CALL, json!([call]))
            .await
            .with_context(|| format!("{} call failed", method.as_str()))
    }

    async fn submit(
        &self,
        method: ContractMethod,
        args: Vec<Value>,
    ) -> Result<Box<dyn PendingTransaction>> {
        let request = TransactionRequest {
            from: self.signer.address(),
            to: self.contract,
            method,
            args,
        };
        let tx_hash = self.signer.send_transaction(request).await?;
        debug!(
            "contract: submitted method={} tx={tx_hash}",
            method.as_str()
        );
        Ok(Box::new(RpcPendingTransaction {
            chain: Arc::clone(&self.chain),
            tx_hash,
            poll_interval: self.poll_interval,
        }))
    }
}

#[async_trait]
impl TicketContract for RpcContractClient {
    async fn has_role(&self, role: RoleHash, account: Address) -> Result<bool> {
        self.read(
            ContractMethod::HasRole,
            vec![json!(role), json!(account)],
        )
        .await
    }

    async fn token_ids_for_owner(&self, owner: Address) -> Result<Vec<TokenId>> {
        let raw: Vec<Value> = self
            .read(ContractMethod::GetTokenUrisForOwner, vec![json!(owner)])
            .await?;
        raw.into_iter().map(token_id_from_value).collect()
    }

    async fn token_uri(&self, token_id: &TokenId) -> Result<String> {
        self.read(ContractMethod::TokenUri, vec![json!(token_id)])
            .await
    }

    async fn mint_nft(
        &self,
        to: Address,
        token_id: &TokenId,
        uri: &str,
    ) -> Result<Box<dyn PendingTransaction>> {
        self.submit(
            ContractMethod::MintNft,
            vec![json!(to), json!(token_id), json!(uri)],
        )
        .await
    }

    async fn update_metadata(
        &self,
        token_id: &TokenId,
        uri: &str,
    ) -> Result<Box<dyn PendingTransaction>> {
        self.submit(
            ContractMethod::UpdateMetadata,
            vec![json!(token_id), json!(uri)],
        )
        .await
    }
}

/// Token ids come back as decimal strings or, from some nodes, as JSON numbers.
fn token_id_from_value(value: Value) -> Result<TokenId> {
    let raw = match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        other => bail!("unexpected token id in enumeration: {other}"),
    };
    TokenId::new(raw).context("empty token id in enumeration")
}

pub struct RpcPendingTransaction {
    chain: Arc<JsonRpcTransport>,
    tx_hash: TxHash,
    poll_interval: Duration,
}

#[async_trait]
impl PendingTransaction for RpcPendingTransaction {
    fn tx_hash(&self) -> &TxHash {
        &self.tx_hash
    }

    async fn await_confirmation(&self) -> Result<TxOutcome> {
        loop {
            let receipt: Option<TransactionReceipt> = self
                .chain
                .call(methods::GET_TRANSACTION_RECEIPT, json!([self.tx_hash]))
                .await?;

            match receipt {
                Some(receipt) => {
                    return Ok(match receipt.status {
                        ReceiptStatus::Success => TxOutcome::Confirmed,
                        ReceiptStatus::Reverted => TxOutcome::Reverted {
                            reason: receipt
                                .revert_reason
                                .unwrap_or_else(|| "execution reverted".to_string()),
                        },
                    });
                }
                None => {
                    debug!("contract: awaiting receipt tx={}", self.tx_hash);
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/rpc_tests.rs"]
mod tests;
