//! Health probes against the target service.

use crate::chaos::FaultHooks;
use crate::error::{HavocError, Result};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// What a successful probe observed.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResponse {
    pub status_code: u16,
    pub latency_ms: f64,
    /// Status string the target reported about itself, if any
    pub reported_status: Option<String>,
    /// Error rate the target reported, in percent
    pub error_rate_pct: Option<f64>,
}

impl ProbeResponse {
    pub fn ok(latency_ms: f64) -> Self {
        Self {
            status_code: 200,
            latency_ms,
            reported_status: None,
            error_rate_pct: None,
        }
    }

    /// Whether the target itself signalled trouble.
    pub fn self_reported_degraded(&self) -> bool {
        !(200..300).contains(&self.status_code)
            || matches!(
                self.reported_status.as_deref(),
                Some("degraded") | Some("unhealthy")
            )
    }
}

/// A health check call to the target.
///
/// The monitor bounds each call with its own timeout; implementations do not
/// need to.
#[async_trait::async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self) -> Result<ProbeResponse>;
}

#[derive(Debug, Deserialize)]
struct HealthBody {
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatsBody {
    /// Fraction of failed requests
    error_rate: Option<f64>,
}

/// Probes `GET {base}/health`, then reads `error_rate` from `GET {base}/stats`.
pub struct HttpProbe {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProbe {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HavocError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn error_rate_pct(&self) -> Option<f64> {
        let response = self
            .client
            .get(format!("{}/stats", self.base_url))
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        let stats: StatsBody = response.json().await.ok()?;
        stats.error_rate.map(|fraction| fraction * 100.0)
    }
}

#[async_trait::async_trait]
impl HealthProbe for HttpProbe {
    async fn probe(&self) -> Result<ProbeResponse> {
        let started = Instant::now();
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        let status_code = response.status().as_u16();

        let reported_status = response
            .json::<HealthBody>()
            .await
            .ok()
            .and_then(|body| body.status)
            .map(|s| s.to_lowercase());

        let error_rate_pct = self.error_rate_pct().await;
        debug!(status_code, latency_ms, ?error_rate_pct, "Health probe answered");

        Ok(ProbeResponse {
            status_code,
            latency_ms,
            reported_status,
            error_rate_pct,
        })
    }
}

/// Routes another probe through the fault hooks, so injected latency, hangs
/// and disruptions show up as target behavior.
pub struct HookedProbe {
    hooks: Arc<FaultHooks>,
    inner: Arc<dyn HealthProbe>,
}

impl HookedProbe {
    pub fn new(hooks: Arc<FaultHooks>, inner: Arc<dyn HealthProbe>) -> Self {
        Self { hooks, inner }
    }
}

#[async_trait::async_trait]
impl HealthProbe for HookedProbe {
    async fn probe(&self) -> Result<ProbeResponse> {
        let started = Instant::now();
        self.hooks.before_call().await?;
        let injected_ms = started.elapsed().as_secs_f64() * 1000.0;

        let mut response = self.inner.probe().await?;
        response.latency_ms += injected_ms;
        Ok(response)
    }
}
