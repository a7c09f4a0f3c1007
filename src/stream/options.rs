//! Configurable knobs for the stream client along with validation helpers so
//! callers can reason about timeouts and the identity used to sign requests.

use anyhow::{bail, Result};
use std::time::Duration;

pub(crate) const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_ACCESS_KEY_ID: &str = "local";
const DEFAULT_SECRET_ACCESS_KEY: &str = "local";

#[derive(Debug, Clone)]
pub struct StreamClientOptions {
    pub request_timeout: Duration,
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl Default for StreamClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            access_key_id: DEFAULT_ACCESS_KEY_ID.to_owned(),
            secret_access_key: DEFAULT_SECRET_ACCESS_KEY.to_owned(),
        }
    }
}

impl StreamClientOptions {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.request_timeout.is_zero() {
            bail!("request_timeout must be greater than 0");
        }
        if self.access_key_id.trim().is_empty() {
            bail!("access_key_id cannot be empty");
        }
        if self.secret_access_key.trim().is_empty() {
            bail!("secret_access_key cannot be empty");
        }
        Ok(())
    }
}
