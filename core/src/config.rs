//! Client configuration.
//!
//! Everything is fixed when the client is built; there is no way to change
//! the base URL or credentials of a live client. Build a new one instead.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ApiError;
use crate::types::Pagination;

pub const DEFAULT_BASE_URL: &str = "https://api.form3.tech/";
pub const ACCOUNTS_PATH: &str = "/v1/organisation/accounts";
pub const HEALTH_PATH: &str = "/v1/health";
pub const DEFAULT_USER_AGENT: &str = concat!("f3-client/", env!("CARGO_PKG_VERSION"));

pub const ACCESS_KEY_HEADER: &str = "X-Access-Key";
pub const SECRET_ACCESS_KEY_HEADER: &str = "X-Secret-Access-Key";

/// Access key pair sent with every request.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key: String,
    pub secret_access_key: String,
}

impl Credentials {
    pub fn new(access_key: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_access_key: secret_access_key.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// Immutable settings shared by every request a client makes.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    base_url: String,
    service_path: String,
    pagination: Option<Pagination>,
    credentials: Option<Credentials>,
    user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            service_path: ACCOUNTS_PATH.to_string(),
            pagination: None,
            credentials: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ClientConfig {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn service_path(&self) -> &str {
        &self.service_path
    }

    /// Page applied to every `list_accounts` call, if any.
    pub fn pagination(&self) -> Option<Pagination> {
        self.pagination
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Resolves `path` against the base URL the way a browser resolves a
    /// link: an absolute path replaces the base URL's path.
    pub fn resolve(&self, path: &str) -> Result<Url, ApiError> {
        let base = Url::parse(&self.base_url).map_err(|e| {
            ApiError::RequestBuild(format!("invalid base URL {:?}: {e}", self.base_url))
        })?;
        base.join(path).map_err(|e| {
            ApiError::RequestBuild(format!("cannot resolve {path:?} against {base}: {e}"))
        })
    }
}

/// Builder for `AccountsClient`, one setter per configuration option.
#[derive(Debug, Clone, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
}

impl ClientBuilder {
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = base_url.into();
        self
    }

    /// Overrides the accounts collection path used by every account
    /// operation.
    pub fn service_path(mut self, service_path: impl Into<String>) -> Self {
        self.config.service_path = service_path.into();
        self
    }

    pub fn pagination(mut self, page_number: u32, page_size: u32) -> Self {
        self.config.pagination = Some(Pagination::new(page_number, page_size));
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.config.credentials = Some(credentials);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn into_config(self) -> ClientConfig {
        self.config
    }
}

/// How `wait_until_available` polls the health endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollPolicy {
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl PollPolicy {
    /// Delay after the zero-based `attempt` failed: doubles each time, capped
    /// at `max_delay_ms`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let millis = self
            .initial_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(millis)
    }
}

fn default_initial_delay() -> u64 {
    200
}

fn default_max_delay() -> u64 {
    5000
}

fn default_max_attempts() -> u32 {
    30
}
