use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::core::backend::BackendClient;
use crate::core::health::HealthChecker;
use crate::core::lifecycle::{LifecycleComponent, LifecycleManager};
use crate::core::oauth::{AuthSurface, OAuthBroker, SystemBrowser};
use crate::core::supervisor::{BackendState, BackendSupervisor};
use crate::core::vault::SecretsVault;
use crate::interfaces::bridge::{BridgeServer, BridgeState};
use crate::logging;

/// The one place privileged handles live. Components borrow what they need
/// from here instead of reaching for globals.
pub struct AppContext {
    pub config: AppConfig,
    pub vault: Arc<SecretsVault>,
    pub supervisor: Arc<BackendSupervisor>,
    pub health: Arc<HealthChecker>,
    pub broker: Arc<OAuthBroker>,
}

impl AppContext {
    pub fn new(config: AppConfig) -> Self {
        let vault = Arc::new(SecretsVault::new(config.secrets_path()));
        let supervisor = Arc::new(BackendSupervisor::new(config.backend.clone()));
        let backend = BackendClient::new(config.backend.base_url());
        let health = Arc::new(HealthChecker::new(
            config.backend.base_url(),
            config.health.clone(),
        ));
        let surface: Arc<dyn AuthSurface> = Arc::new(SystemBrowser);
        let broker = Arc::new(OAuthBroker::new(
            config.oauth.clone(),
            supervisor.clone(),
            backend,
            surface,
        ));
        Self {
            config,
            vault,
            supervisor,
            health,
            broker,
        }
    }
}

/// Lifecycle adapter for the supervisor: a `Failed` readiness gate keeps the
/// app alive in degraded mode, it never aborts startup.
struct SupervisorComponent(Arc<BackendSupervisor>);

#[async_trait::async_trait]
impl LifecycleComponent for SupervisorComponent {
    async fn on_start(&mut self) -> Result<()> {
        if self.0.start().await == BackendState::Failed {
            warn!("backend unavailable, continuing with degraded functionality");
        }
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        self.0.shutdown().await;
        Ok(())
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct CoreFlags {
    pub data_dir: Option<PathBuf>,
    pub backend_port: Option<u16>,
    pub bridge_port: Option<u16>,
    pub verbose: bool,
    pub help: bool,
}

pub(crate) fn parse_core_flags(args: &[String], start: usize) -> CoreFlags {
    let mut flags = CoreFlags::default();
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--data-dir" => {
                if i + 1 < args.len() {
                    flags.data_dir = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--backend-port" => {
                if i + 1 < args.len() {
                    flags.backend_port = args[i + 1].parse().ok();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--bridge-port" => {
                if i + 1 < args.len() {
                    flags.bridge_port = args[i + 1].parse().ok();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--verbose" | "-v" => {
                flags.verbose = true;
                i += 1;
            }
            "--help" | "-h" => {
                flags.help = true;
                i += 1;
            }
            _ => i += 1,
        }
    }
    flags
}

fn print_help() {
    println!("clipforge - privileged control core for the ClipForge desktop app");
    println!();
    println!("Usage: clipforge [options]");
    println!();
    println!("Options:");
    println!("  --data-dir <path>      Override the data directory");
    println!("  --backend-port <port>  Loopback port for the supervised backend");
    println!("  --bridge-port <port>   Loopback port for the capability bridge");
    println!("  -v, --verbose          Debug logging");
    println!("  -h, --help             Show this help");
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let flags = parse_core_flags(&args, 1);
    if flags.help {
        print_help();
        return Ok(());
    }

    logging::init(flags.verbose);

    let mut config = AppConfig::load(flags.data_dir)?;
    if let Some(port) = flags.backend_port {
        config.backend.port = port;
    }
    if let Some(port) = flags.bridge_port {
        config.bridge.port = port;
    }
    info!("data dir: {}", config.data_dir.display());

    let ctx = AppContext::new(config);

    // The redirect listener must be up before any authorization URL embeds it.
    ctx.broker.start_redirect_listener().await?;

    let bridge_token = uuid::Uuid::new_v4().simple().to_string();
    let bridge_state = BridgeState::new(
        ctx.vault.clone(),
        ctx.broker.clone(),
        ctx.health.clone(),
        bridge_token,
    );
    let bridge = BridgeServer::new(bridge_state, ctx.config.bridge.clone(), ctx.config.run_dir());

    let mut lifecycle = LifecycleManager::new();
    lifecycle.attach(Arc::new(Mutex::new(SupervisorComponent(
        ctx.supervisor.clone(),
    ))));
    lifecycle.attach(Arc::new(Mutex::new(bridge)));
    lifecycle.start().await?;

    let report = ctx.health.check().await;
    info!(
        "startup health: backend={} runpod={} supabase={} r2={}",
        report.backend, report.runpod, report.supabase, report.r2
    );

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    ctx.broker.cancel_all().await;
    lifecycle.shutdown().await;
    Ok(())
}
