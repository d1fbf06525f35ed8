//! Process-wide configuration, loaded once at startup from the environment
//! (spec §6). Parsing is explicit and eager: a malformed or missing required
//! variable fails fast, before the server binds a socket, so the process
//! exits with code 1 rather than failing a request later (spec §6 exit
//! codes, §2a config self-check).

use std::env;
use std::time::Duration;

use anyhow::Context;

/// Card-provider credentials and environment (spec §6).
#[derive(Clone, Debug)]
pub struct CardProviderConfig {
    pub api_key: String,
    pub webhook_secret: String,
    /// `sandbox` or `live`.
    pub env: String,
}

/// Wallet (Telegram Stars-style) provider credentials (spec §6).
#[derive(Clone, Debug)]
pub struct WalletProviderConfig {
    pub bot_token: String,
}

/// The fully-resolved process configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Connection string for the durable ledger store.
    pub ledger_url: String,
    /// Connection string for the volatile cache.
    pub cache_url: String,
    /// HMAC key for API-key hashing. Rotation requires re-hashing every
    /// persisted `key_hash`.
    pub server_secret: String,
    pub card: CardProviderConfig,
    pub wallet: WalletProviderConfig,
    /// Integer credit conversion; default 1000 (spec §6).
    pub credits_per_usd: u32,
    pub webapp_url: String,
    pub frontend_url: String,
    /// Socket address the HTTP server binds.
    pub bind_addr: String,
    pub ledger_pool_max_connections: u32,
    pub cache_pool_max_connections: u32,
    pub provider_call_timeout: Duration,
    pub cache_call_timeout: Duration,
}

impl Config {
    /// Load configuration from the process environment. Returns an error
    /// describing exactly which variable was missing or malformed, so the
    /// `check-config` CLI subcommand (spec §2a) can report a precise cause.
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Config {
            ledger_url: required_var("LEDGER_URL")?,
            cache_url: required_var("CACHE_URL")?,
            server_secret: required_var("SERVER_SECRET")?,
            card: CardProviderConfig {
                api_key: required_var("CARD_API_KEY")?,
                webhook_secret: required_var("CARD_WEBHOOK_SECRET")?,
                env: env::var("CARD_ENV").unwrap_or_else(|_| "sandbox".to_string()),
            },
            wallet: WalletProviderConfig { bot_token: required_var("WALLET_BOT_TOKEN")? },
            credits_per_usd: optional_var("CREDITS_PER_USD", 1000)?,
            webapp_url: required_var("WEBAPP_URL")?,
            frontend_url: required_var("FRONTEND_URL")?,
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            ledger_pool_max_connections: 20,
            cache_pool_max_connections: 50,
            provider_call_timeout: Duration::from_secs(30),
            cache_call_timeout: Duration::from_secs(5),
        })
    }

    /// Validate the config without starting anything. Used by the
    /// `check-config` CLI subcommand; a card env outside `{sandbox, live}`
    /// is the one cross-field check that simple env parsing can't catch.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.card.env != "sandbox" && self.card.env != "live" {
            anyhow::bail!("CARD_ENV must be `sandbox` or `live`, got `{}`", self.card.env);
        }
        if self.credits_per_usd == 0 {
            anyhow::bail!("CREDITS_PER_USD must be nonzero");
        }
        Ok(())
    }
}

fn required_var(name: &str) -> anyhow::Result<String> {
    env::var(name).with_context(|| format!("missing required environment variable `{name}`"))
}

fn optional_var<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid value for `{name}`: {e}")),
        Err(_) => Ok(default),
    }
}
