use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{domain::Address, error::RpcErrorObject};

pub const JSONRPC_VERSION: &str = "2.0";

pub mod methods {
    pub const REQUEST_ACCOUNTS: &str = "eth_requestAccounts";
    pub const SEND_TRANSACTION: &str = "eth_sendTransaction";
    pub const GET_TRANSACTION_RECEIPT: &str = "eth_getTransactionReceipt";
    pub const CONTRACT_CALL: &str = "contract_call";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl RpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
}

impl RpcResponse {
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: u64, error: RpcErrorObject) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// Ticketing contract entry points, named as in the contract ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractMethod {
    #[serde(rename = "hasRole")]
    HasRole,
    #[serde(rename = "getTokenURIsForOwner")]
    GetTokenUrisForOwner,
    #[serde(rename = "tokenURI")]
    TokenUri,
    #[serde(rename = "mintNFT")]
    MintNft,
    #[serde(rename = "updateMetadata")]
    UpdateMetadata,
}

impl ContractMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HasRole => "hasRole",
            Self::GetTokenUrisForOwner => "getTokenURIsForOwner",
            Self::TokenUri => "tokenURI",
            Self::MintNft => "mintNFT",
            Self::UpdateMetadata => "updateMetadata",
        }
    }

    pub fn is_state_changing(self) -> bool {
        matches!(self, Self::MintNft | Self::UpdateMetadata)
    }
}

/// Read-only call, sent as the single param of `contract_call`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractCall {
    pub to: Address,
    pub method: ContractMethod,
    pub args: Vec<Value>,
}

/// Signed call, sent as the single param of `eth_sendTransaction`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub from: Address,
    pub to: Address,
    pub method: ContractMethod,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub status: ReceiptStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revert_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
}
