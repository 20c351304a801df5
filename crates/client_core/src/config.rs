use std::{collections::HashMap, fs, path::Path, time::Duration};

use anyhow::{bail, Context};
use serde::Deserialize;
use shared::domain::Address;
use url::Url;

use crate::view_model::TicketLinks;

pub const DEFAULT_SETTINGS_FILE: &str = "ticketing.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub contract_address: String,
    pub chain_rpc_url: String,
    pub wallet_url: Option<String>,
    pub ticket_link_base: String,
    pub confirmation_poll_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            contract_address: "0x52aaeeb1ac34415b434ba7101a5ce34fdd1045ea".into(),
            chain_rpc_url: "http://127.0.0.1:8545".into(),
            wallet_url: None,
            ticket_link_base: "https://random-id.ngrok.io".into(),
            confirmation_poll_ms: 1000,
            request_timeout_secs: 30,
        }
    }
}

/// Validated client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub contract_address: Address,
    pub chain_rpc_url: Url,
    pub wallet_url: Option<Url>,
    pub ticket_links: TicketLinks,
    pub confirmation_poll_interval: Duration,
    pub request_timeout: Duration,
}

pub fn load_settings(path: Option<&Path>) -> Settings {
    let mut settings = Settings::default();

    let path = path.unwrap_or_else(|| Path::new(DEFAULT_SETTINGS_FILE));
    if let Ok(raw) = fs::read_to_string(path) {
        apply_file_overrides(&mut settings, &raw);
    }

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    settings
}

pub(crate) fn apply_file_overrides(settings: &mut Settings, raw: &str) {
    let Ok(file_cfg) = toml::from_str::<HashMap<String, toml::Value>>(raw) else {
        return;
    };

    let text = |key: &str| match file_cfg.get(key) {
        Some(toml::Value::String(v)) => Some(v.clone()),
        Some(toml::Value::Integer(v)) => Some(v.to_string()),
        _ => None,
    };

    if let Some(v) = text("contract_address") {
        settings.contract_address = v;
    }
    if let Some(v) = text("chain_rpc_url") {
        settings.chain_rpc_url = v;
    }
    if let Some(v) = text("wallet_url") {
        settings.wallet_url = Some(v);
    }
    if let Some(v) = text("ticket_link_base") {
        settings.ticket_link_base = v;
    }
    if let Some(v) = text("confirmation_poll_ms").and_then(|v| v.parse().ok()) {
        settings.confirmation_poll_ms = v;
    }
    if let Some(v) = text("request_timeout_secs").and_then(|v| v.parse().ok()) {
        settings.request_timeout_secs = v;
    }
}

pub(crate) fn apply_env_overrides(
    settings: &mut Settings,
    lookup: impl Fn(&str) -> Option<String>,
) {
    if let Some(v) = lookup("CONTRACT_ADDRESS") {
        settings.contract_address = v;
    }
    if let Some(v) = lookup("APP__CONTRACT_ADDRESS") {
        settings.contract_address = v;
    }

    if let Some(v) = lookup("CHAIN_RPC_URL") {
        settings.chain_rpc_url = v;
    }
    if let Some(v) = lookup("APP__CHAIN_RPC_URL") {
        settings.chain_rpc_url = v;
    }

    if let Some(v) = lookup("WALLET_URL") {
        settings.wallet_url = Some(v);
    }
    if let Some(v) = lookup("APP__WALLET_URL") {
        settings.wallet_url = Some(v);
    }

    if let Some(v) = lookup("TICKET_LINK_BASE") {
        settings.ticket_link_base = v;
    }
    if let Some(v) = lookup("APP__TICKET_LINK_BASE") {
        settings.ticket_link_base = v;
    }

    if let Some(v) = lookup("APP__CONFIRMATION_POLL_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.confirmation_poll_ms = parsed;
        }
    }
    if let Some(v) = lookup("APP__REQUEST_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.request_timeout_secs = parsed;
        }
    }
}

impl Settings {
    pub fn validate(&self) -> anyhow::Result<ClientConfig> {
        let contract_address = self
            .contract_address
            .parse::<Address>()
            .with_context(|| format!("invalid contract_address '{}'", self.contract_address))?;
        let chain_rpc_url = parse_http_url("chain_rpc_url", &self.chain_rpc_url)?;
        let wallet_url = match self.wallet_url.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(parse_http_url("wallet_url", raw)?),
        };
        let ticket_link_base = parse_http_url("ticket_link_base", &self.ticket_link_base)?;
        if self.confirmation_poll_ms == 0 {
            bail!("confirmation_poll_ms must be greater than zero");
        }

        Ok(ClientConfig {
            contract_address,
            chain_rpc_url,
            wallet_url,
            ticket_links: TicketLinks::new(ticket_link_base),
            confirmation_poll_interval: Duration::from_millis(self.confirmation_poll_ms),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        })
    }
}

fn parse_http_url(key: &str, raw: &str) -> anyhow::Result<Url> {
    let url = Url::parse(raw.trim()).with_context(|| format!("invalid {key} '{raw}'"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("{key} must use http or https, got '{raw}'");
    }
    Ok(url)
}
