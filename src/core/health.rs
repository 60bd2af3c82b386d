use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::config::HealthTargets;
use crate::core::backend::BackendHealth;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Service-name → reachable. Recomputed on demand, never cached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub backend: bool,
    pub runpod: bool,
    pub supabase: bool,
    pub r2: bool,
}

pub struct HealthChecker {
    client: reqwest::Client,
    backend_base: String,
    targets: HealthTargets,
}

impl HealthChecker {
    pub fn new(backend_base: String, targets: HealthTargets) -> Self {
        Self {
            client: reqwest::Client::new(),
            backend_base: backend_base.trim_end_matches('/').to_string(),
            targets,
        }
    }

    /// Probe every service once. Unconfigured targets report unreachable.
    pub async fn check(&self) -> HealthReport {
        let mut report = HealthReport::default();

        match self
            .client
            .get(format!("{}/health", self.backend_base))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                report.backend = true;
                if let Ok(body) = resp.json::<BackendHealth>().await {
                    report.runpod = body.runpod_connected;
                }
            }
            Ok(resp) => debug!("backend health returned {}", resp.status()),
            Err(e) => debug!("backend health probe failed: {e}"),
        }

        if let Some(url) = &self.targets.supabase_url {
            let mut req = self
                .client
                .get(format!("{}/rest/v1/", url.trim_end_matches('/')))
                .timeout(PROBE_TIMEOUT);
            if let Some(key) = &self.targets.supabase_anon_key {
                req = req.header("apikey", key);
            }
            report.supabase = matches!(req.send().await, Ok(resp) if resp.status().is_success());
        }

        if let Some(url) = &self.targets.r2_public_base_url {
            // A public bucket root commonly answers 403; that still proves
            // the endpoint is reachable.
            if let Ok(resp) = self.client.head(url).timeout(PROBE_TIMEOUT).send().await {
                report.r2 = resp.status().is_success() || resp.status() == StatusCode::FORBIDDEN;
            }
        }

        report
    }
}
