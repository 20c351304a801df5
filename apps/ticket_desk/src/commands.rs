//! Line commands typed at the desk prompt.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeskCommand {
    Connect,
    Disconnect,
    Refresh,
    Mint {
        token_id: String,
        metadata_hash: String,
    },
    Metadata {
        token_id: String,
    },
    Update {
        token_id: String,
        metadata_hash: String,
    },
    Link {
        token_id: String,
    },
    Status,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command '{0}', type 'help' for the command list")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

impl DeskCommand {
    /// Blank lines parse to `None`.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();

        let command = match (name.to_ascii_lowercase().as_str(), args.as_slice()) {
            ("connect", []) => Self::Connect,
            ("disconnect", []) => Self::Disconnect,
            ("refresh", []) => Self::Refresh,
            ("mint", [token_id, metadata_hash]) => Self::Mint {
                token_id: token_id.to_string(),
                metadata_hash: metadata_hash.to_string(),
            },
            ("mint", _) => return Err(CommandError::Usage("mint <token-id> <metadata-hash>")),
            ("metadata", [token_id]) => Self::Metadata {
                token_id: token_id.to_string(),
            },
            ("metadata", _) => return Err(CommandError::Usage("metadata <token-id>")),
            ("update", [token_id, metadata_hash]) => Self::Update {
                token_id: token_id.to_string(),
                metadata_hash: metadata_hash.to_string(),
            },
            ("update", _) => return Err(CommandError::Usage("update <token-id> <metadata-hash>")),
            ("link", [token_id]) => Self::Link {
                token_id: token_id.to_string(),
            },
            ("link", _) => return Err(CommandError::Usage("link <token-id>")),
            ("status", []) => Self::Status,
            ("help", _) | ("?", _) => Self::Help,
            ("quit", []) | ("exit", []) => Self::Quit,
            _ => return Err(CommandError::Unknown(line.trim().to_string())),
        };
        Ok(Some(command))
    }
}
