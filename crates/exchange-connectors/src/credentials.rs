//! Secure exchange API credentials, loaded from the environment and never
//! logged or displayed in full.

use crate::{ExchangeError, ExchangeId};
use secrecy::{ExposeSecret, Secret};
use std::env;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct ExchangeCredentials {
    pub exchange_id: ExchangeId,
    api_key: Secret<String>,
    api_secret: Secret<String>,
    passphrase: Option<Secret<String>>,
    pub sandbox: bool,
}

impl std::fmt::Debug for ExchangeCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeCredentials")
            .field("exchange_id", &self.exchange_id)
            .field("api_key", &"[REDACTED]")
            .field("api_secret", &"[REDACTED]")
            .field("passphrase", &self.passphrase.as_ref().map(|_| "[REDACTED]"))
            .field("sandbox", &self.sandbox)
            .finish()
    }
}

impl ExchangeCredentials {
    pub fn new(
        exchange_id: ExchangeId,
        api_key: String,
        api_secret: String,
        passphrase: Option<String>,
        sandbox: bool,
    ) -> Self {
        Self {
            exchange_id,
            api_key: Secret::new(api_key),
            api_secret: Secret::new(api_secret),
            passphrase: passphrase.map(Secret::new),
            sandbox,
        }
    }

    /// Loads credentials from environment variables:
    /// `COINBASE_API_KEY`/`COINBASE_API_SECRET`/`COINBASE_API_PASSPHRASE`,
    /// `BINANCE_US_API_KEY`/`BINANCE_US_API_SECRET`.
    pub fn from_env(exchange_id: ExchangeId) -> Result<Self, ExchangeError> {
        debug!(?exchange_id, "loading exchange credentials from environment");

        let (key_var, secret_var, passphrase_var) = match exchange_id {
            ExchangeId::Coinbase => (
                "COINBASE_API_KEY",
                "COINBASE_API_SECRET",
                Some("COINBASE_API_PASSPHRASE"),
            ),
            ExchangeId::BinanceUs => ("BINANCE_US_API_KEY", "BINANCE_US_API_SECRET", None),
        };

        let api_key = env::var(key_var)
            .map_err(|_| ExchangeError::Configuration(format!("missing environment variable: {key_var}")))?;
        let api_secret = env::var(secret_var)
            .map_err(|_| ExchangeError::Configuration(format!("missing environment variable: {secret_var}")))?;
        let passphrase = passphrase_var.and_then(|var| env::var(var).ok());
        let sandbox = env::var("GEKKO_SANDBOX")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        let credentials = Self::new(exchange_id, api_key, api_secret, passphrase, sandbox);
        credentials.validate()?;
        Ok(credentials)
    }

    pub fn validate(&self) -> Result<(), ExchangeError> {
        if self.api_key.expose_secret().is_empty() {
            return Err(ExchangeError::Configuration("API key cannot be empty".into()));
        }
        if self.api_secret.expose_secret().is_empty() {
            return Err(ExchangeError::Configuration("API secret cannot be empty".into()));
        }
        if self.exchange_id == ExchangeId::Coinbase && self.passphrase.is_none() {
            warn!("Coinbase credentials missing passphrase — some operations may fail");
        }
        Ok(())
    }

    pub fn api_key(&self) -> &Secret<String> {
        &self.api_key
    }

    pub fn api_secret(&self) -> &Secret<String> {
        &self.api_secret
    }

    pub fn passphrase(&self) -> Option<&str> {
        self.passphrase.as_ref().map(|s| s.expose_secret().as_str())
    }
}
