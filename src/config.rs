//! Carrier configuration loading and validation.
//!
//! The four Twilio values arrive as positional CLI arguments and are
//! validated here before any capability is registered. API key + secret
//! are used instead of the account auth token.

use url::Url;

/// Required prefix of every Twilio account SID.
pub const ACCOUNT_SID_PREFIX: &str = "AC";

/// Default Twilio REST API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.twilio.com";

/// Option name reported for API base errors.
pub const API_BASE_FIELD: &str = "api-base";

/// Usage line printed when startup arguments are missing or invalid.
pub const USAGE: &str = "Usage: twilio-messaging-mcp <accountSid> <apiKey> <apiSecret> <number>";

/// Errors raised while validating startup configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required value was missing or empty.
    #[error("missing required configuration parameter: {0}")]
    Missing(&'static str),

    /// The account SID does not start with `AC`.
    #[error("invalid Account SID format: Twilio Account SID must start with 'AC'")]
    InvalidAccountSid,

    /// A URL option could not be parsed or cannot carry a path.
    #[error("invalid {field} URL: {reason}")]
    InvalidUrl {
        /// Which option held the bad URL.
        field: &'static str,
        /// Why the URL was rejected.
        reason: String,
    },
}

/// Validated carrier credentials and sender identity.
#[derive(Clone)]
pub struct CarrierConfig {
    account_sid: String,
    api_key: String,
    api_secret: String,
    from_number: String,
    api_base: Url,
    status_callback: Option<Url>,
}

impl std::fmt::Debug for CarrierConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CarrierConfig")
            .field("account_sid", &self.account_sid)
            .field("api_key", &"[REDACTED]")
            .field("api_secret", &"[REDACTED]")
            .field("from_number", &self.from_number)
            .field("api_base", &self.api_base.as_str())
            .field(
                "status_callback",
                &self.status_callback.as_ref().map(Url::as_str),
            )
            .finish()
    }
}

impl CarrierConfig {
    /// Validate the four startup values.
    ///
    /// Presence is checked first for all four, so a missing value is
    /// reported the same way regardless of which one it is.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] for an empty value and
    /// [`ConfigError::InvalidAccountSid`] when the SID lacks the `AC` prefix.
    pub fn new(
        account_sid: &str,
        api_key: &str,
        api_secret: &str,
        from_number: &str,
    ) -> Result<Self, ConfigError> {
        let account_sid = require("accountSid", account_sid)?;
        let api_key = require("apiKey", api_key)?;
        let api_secret = require("apiSecret", api_secret)?;
        let from_number = require("number", from_number)?;

        if !account_sid.starts_with(ACCOUNT_SID_PREFIX) {
            return Err(ConfigError::InvalidAccountSid);
        }

        let api_base = parse_base_url(API_BASE_FIELD, DEFAULT_API_BASE)?;

        Ok(Self {
            account_sid,
            api_key,
            api_secret,
            from_number,
            api_base,
            status_callback: None,
        })
    }

    /// Override the REST API base URL (used by tests and proxies).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] if `raw` is not a valid URL or
    /// cannot have path segments appended (e.g. `mailto:`).
    pub fn with_api_base(mut self, raw: &str) -> Result<Self, ConfigError> {
        self.api_base = parse_base_url(API_BASE_FIELD, raw)?;
        Ok(self)
    }

    /// Set the public URL Twilio should post delivery-status callbacks to.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] if `raw` is not a valid URL.
    pub fn with_status_callback(mut self, raw: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
            field: "callback-url",
            reason: e.to_string(),
        })?;
        self.status_callback = Some(url);
        Ok(self)
    }

    /// Twilio account SID (`AC...`).
    pub fn account_sid(&self) -> &str {
        &self.account_sid
    }

    /// API key SID used as the basic-auth user.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// API key secret used as the basic-auth password.
    pub fn api_secret(&self) -> &str {
        &self.api_secret
    }

    /// Sender phone number attached to every outbound message.
    pub fn from_number(&self) -> &str {
        &self.from_number
    }

    /// REST API base URL.
    pub fn api_base(&self) -> &Url {
        &self.api_base
    }

    /// Status-callback URL, if configured.
    pub fn status_callback(&self) -> Option<&Url> {
        self.status_callback.as_ref()
    }
}

fn parse_base_url(field: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        field,
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidUrl {
            field,
            reason: format!("{raw} cannot be used as a base URL"),
        });
    }
    Ok(url)
}

fn require(name: &'static str, value: &str) -> Result<String, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Missing(name));
    }
    Ok(trimmed.to_owned())
}
