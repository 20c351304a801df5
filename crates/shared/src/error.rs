use serde::{Deserialize, Serialize};
use thiserror::Error;

/// EIP-1193 "user rejected request".
pub const USER_REJECTED_REQUEST: i64 = 4001;
/// EIP-1193 "unauthorized": the wallet has not granted access to the account.
pub const UNAUTHORIZED_ACCOUNT: i64 = 4100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

impl RpcErrorObject {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
#[error("rpc error {code}: {message}")]
pub struct RpcException {
    pub code: i64,
    pub message: String,
}

impl RpcException {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn is_user_rejection(&self) -> bool {
        self.code == USER_REJECTED_REQUEST || self.code == UNAUTHORIZED_ACCOUNT
    }
}

impl From<RpcErrorObject> for RpcException {
    fn from(value: RpcErrorObject) -> Self {
        Self {
            code: value.code,
            message: value.message,
        }
    }
}
