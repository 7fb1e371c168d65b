use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{LinkError, Result};

pub const DEFAULT_ENDPOINT: &str = "http://localhost:54321/functions/v1/email-oauth";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LinkConfig {
    pub endpoint_candidates: Vec<String>,
    pub default_endpoint: String,
    pub app_origin: String,
    pub probe_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub poll_max_attempts: u32,
    pub closed_check_interval_ms: u64,
    pub closed_grace_ms: u64,
    pub callback_close_delay_ms: u64,
    pub popup_width: u32,
    pub popup_height: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            endpoint_candidates: vec![DEFAULT_ENDPOINT.to_string()],
            default_endpoint: DEFAULT_ENDPOINT.to_string(),
            app_origin: "http://localhost:5173".to_string(),
            probe_timeout_ms: 2_000,
            poll_interval_ms: 1_000,
            poll_max_attempts: 120,
            closed_check_interval_ms: 500,
            closed_grace_ms: 5_000,
            callback_close_delay_ms: 1_500,
            popup_width: 500,
            popup_height: 600,
        }
    }
}

impl LinkConfig {
    pub fn from_json_str(contents: &str) -> Result<Self> {
        let config = if contents.trim().is_empty() {
            Self::default()
        } else {
            serde_json::from_str::<Self>(contents)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for prefix in self
            .endpoint_candidates
            .iter()
            .chain(std::iter::once(&self.default_endpoint))
        {
            ensure_http_url(prefix, "endpoint prefix")?;
        }
        ensure_http_url(&self.app_origin, "appOrigin")?;

        if self.probe_timeout_ms == 0
            || self.poll_interval_ms == 0
            || self.closed_check_interval_ms == 0
        {
            return Err(LinkError::Validation(
                "probe, poll and closed-check intervals must be non-zero".to_string(),
            ));
        }
        if self.popup_width == 0 || self.popup_height == 0 {
            return Err(LinkError::Validation(
                "popup dimensions must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn closed_check_interval(&self) -> Duration {
        Duration::from_millis(self.closed_check_interval_ms)
    }

    pub fn closed_grace(&self) -> Duration {
        Duration::from_millis(self.closed_grace_ms)
    }

    pub fn callback_close_delay(&self) -> Duration {
        Duration::from_millis(self.callback_close_delay_ms)
    }
}

fn ensure_http_url(value: &str, field: &str) -> Result<()> {
    let url = Url::parse(value.trim())
        .map_err(|err| LinkError::Validation(format!("{field} '{value}' is invalid: {err}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(LinkError::Validation(format!(
            "{field} '{value}' must use http or https, not {scheme}"
        ))),
    }
}

/// ASCII origin (`scheme://host[:port]`) of an absolute URL.
pub fn origin_of(value: &str) -> Option<String> {
    let url = Url::parse(value.trim()).ok()?;
    match url.origin() {
        origin @ url::Origin::Tuple(..) => Some(origin.ascii_serialization()),
        url::Origin::Opaque(_) => None,
    }
}
