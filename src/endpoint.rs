use std::sync::Arc;
use std::time::Duration;

use crate::backend::LinkBackend;
use crate::config::LinkConfig;

/// Finds which deployed prefix currently serves the linking API.
#[derive(Clone)]
pub struct EndpointProber {
    backend: Arc<dyn LinkBackend>,
    candidates: Vec<String>,
    default_endpoint: String,
    timeout: Duration,
}

impl EndpointProber {
    pub fn new(
        backend: Arc<dyn LinkBackend>,
        candidates: Vec<String>,
        default_endpoint: String,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            candidates,
            default_endpoint,
            timeout,
        }
    }

    pub fn from_config(backend: Arc<dyn LinkBackend>, config: &LinkConfig) -> Self {
        Self::new(
            backend,
            config.endpoint_candidates.clone(),
            config.default_endpoint.clone(),
            config.probe_timeout(),
        )
    }

    pub async fn discover(&self, access_token: Option<&str>) -> String {
        discover(
            self.backend.as_ref(),
            &self.candidates,
            &self.default_endpoint,
            self.timeout,
            access_token,
        )
        .await
    }
}

/// `2xx`, or a rejected token (401/403) from a function that exists.
pub fn is_healthy_status(status: u16) -> bool {
    (200..300).contains(&status) || status == 401 || status == 403
}

/// Probes `candidates` one at a time and returns the first that answers
/// with a healthy status.
///
/// Other statuses, transport errors and timeouts skip the candidate. Never
/// fails: with no healthy candidate the default prefix is returned.
pub async fn discover(
    backend: &dyn LinkBackend,
    candidates: &[String],
    default_endpoint: &str,
    timeout: Duration,
    access_token: Option<&str>,
) -> String {
    for candidate in candidates {
        match tokio::time::timeout(timeout, backend.health(candidate, access_token)).await {
            Ok(Ok(status)) if is_healthy_status(status) => {
                log::info!("[endpoint] selected prefix={candidate} status={status}");
                return candidate.clone();
            }
            Ok(Ok(status)) => {
                log::debug!("[endpoint] probe rejected prefix={candidate} status={status}");
            }
            Ok(Err(err)) => {
                log::debug!("[endpoint] probe failed prefix={candidate}: {err}");
            }
            Err(_) => {
                log::debug!(
                    "[endpoint] probe timed out prefix={candidate} after={}ms",
                    timeout.as_millis()
                );
            }
        }
    }

    log::warn!("[endpoint] no candidate answered, using default prefix={default_endpoint}");
    default_endpoint.to_string()
}
