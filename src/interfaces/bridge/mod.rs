pub(crate) mod auth;
mod handlers;
mod router;

pub use router::build_bridge_router;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::BridgeConfig;
use crate::core::health::HealthChecker;
use crate::core::lifecycle::LifecycleComponent;
use crate::core::oauth::OAuthBroker;
use crate::core::vault::SecretsVault;
use crate::platform::{NativePlatform, Platform};

/// Everything a bridge handler may reach. Deliberately narrow: no filesystem
/// paths, no process handles, no cipher. Backend readiness is consulted
/// inside the broker, never handed to the UI.
#[derive(Clone)]
pub struct BridgeState {
    pub(crate) vault: Arc<SecretsVault>,
    pub(crate) broker: Arc<OAuthBroker>,
    pub(crate) health: Arc<HealthChecker>,
    pub(crate) bridge_token: String,
}

impl BridgeState {
    pub fn new(
        vault: Arc<SecretsVault>,
        broker: Arc<OAuthBroker>,
        health: Arc<HealthChecker>,
        bridge_token: String,
    ) -> Self {
        Self {
            vault,
            broker,
            health,
            bridge_token,
        }
    }
}

/// The sole crossing point between the untrusted UI process and the
/// privileged core. Loopback only; every request must carry the per-run
/// bridge token.
pub struct BridgeServer {
    state: BridgeState,
    config: BridgeConfig,
    token_path: std::path::PathBuf,
}

impl BridgeServer {
    pub fn new(state: BridgeState, config: BridgeConfig, run_dir: std::path::PathBuf) -> Self {
        Self {
            state,
            config,
            token_path: run_dir.join("bridge.token"),
        }
    }
}

#[async_trait]
impl LifecycleComponent for BridgeServer {
    async fn on_init(&mut self) -> Result<()> {
        // The UI process picks the token up from the run dir; nothing else
        // on the machine may read it.
        if let Some(run_dir) = self.token_path.parent() {
            tokio::fs::create_dir_all(run_dir).await?;
            NativePlatform::restrict_dir_permissions(run_dir);
        }
        tokio::fs::write(&self.token_path, &self.state.bridge_token).await?;
        NativePlatform::restrict_file_permissions(&self.token_path);
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        let addr = format!("127.0.0.1:{}", self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let app = router::build_bridge_router(self.state.clone(), self.config.ui_port);

        info!("capability bridge listening at http://{addr}");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("capability bridge crashed: {e}");
            }
        });
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        let _ = tokio::fs::remove_file(&self.token_path).await;
        info!("capability bridge shutting down");
        Ok(())
    }
}
