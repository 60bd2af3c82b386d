use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::info;

use crate::platform::{NativePlatform, Platform};

/// Configuration for the supervised backend process.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_command")]
    pub command: String,

    #[serde(default = "default_backend_args")]
    pub args: Vec<String>,

    /// Working directory for the backend process; defaults to `<data_dir>/backend`.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Loopback port the backend listens on. Never exposed on a public interface.
    #[serde(default = "default_backend_port")]
    pub port: u16,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_max_health_attempts")]
    pub max_health_attempts: u32,
}

impl BackendConfig {
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// Port for the capability bridge. The bind address is always loopback.
    #[serde(default = "default_bridge_port")]
    pub port: u16,

    /// Port the UI dev server runs on, for CORS allowlisting.
    #[serde(default = "default_ui_port")]
    pub ui_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthSettings {
    #[serde(default)]
    pub youtube_client_id: String,

    #[serde(default)]
    pub instagram_client_id: String,

    /// Port of the loopback redirect listener the broker owns. 0 = ephemeral.
    #[serde(default = "default_redirect_port")]
    pub redirect_port: u16,
}

/// External services probed by `health.check` beyond the backend itself.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HealthTargets {
    #[serde(default)]
    pub supabase_url: Option<String>,

    #[serde(default)]
    pub supabase_anon_key: Option<String>,

    #[serde(default)]
    pub r2_public_base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(skip)]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub bridge: BridgeConfig,

    #[serde(default)]
    pub oauth: OAuthSettings,

    #[serde(default)]
    pub health: HealthTargets,
}

fn default_backend_command() -> String {
    "python".to_string()
}
fn default_backend_args() -> Vec<String> {
    vec![
        "-m".into(),
        "uvicorn".into(),
        "main:app".into(),
        "--host".into(),
        "127.0.0.1".into(),
    ]
}
fn default_backend_port() -> u16 {
    8000
}
fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_max_health_attempts() -> u32 {
    30
}
fn default_bridge_port() -> u16 {
    17895
}
fn default_ui_port() -> u16 {
    5173
}
fn default_redirect_port() -> u16 {
    17896
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            command: default_backend_command(),
            args: default_backend_args(),
            working_dir: None,
            port: default_backend_port(),
            poll_interval_ms: default_poll_interval_ms(),
            max_health_attempts: default_max_health_attempts(),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            port: default_bridge_port(),
            ui_port: default_ui_port(),
        }
    }
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            youtube_client_id: String::new(),
            instagram_client_id: String::new(),
            redirect_port: default_redirect_port(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::new(),
            backend: BackendConfig::default(),
            bridge: BridgeConfig::default(),
            oauth: OAuthSettings::default(),
            health: HealthTargets::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration: defaults, then `core.toml` in the data dir,
    /// then environment overrides.
    pub fn load(data_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.unwrap_or_else(NativePlatform::data_dir);

        let config_path = data_dir.join("core.toml");
        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("reading {}", config_path.display()))?;
            toml::from_str::<AppConfig>(&content)
                .with_context(|| format!("parsing {}", config_path.display()))?
        } else {
            info!("No core.toml found, using defaults.");
            AppConfig::default()
        };

        config.data_dir = data_dir;
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(port) = std::env::var("CLIPFORGE_BACKEND_PORT")
            && let Ok(port) = port.parse()
        {
            self.backend.port = port;
        }
        if let Ok(port) = std::env::var("CLIPFORGE_BRIDGE_PORT")
            && let Ok(port) = port.parse()
        {
            self.bridge.port = port;
        }
        if let Ok(id) = std::env::var("GOOGLE_CLIENT_ID") {
            self.oauth.youtube_client_id = id;
        }
        if let Ok(id) = std::env::var("INSTAGRAM_CLIENT_ID") {
            self.oauth.instagram_client_id = id;
        }
        if let Ok(url) = std::env::var("SUPABASE_URL") {
            self.health.supabase_url = Some(url);
        }
        if let Ok(key) = std::env::var("SUPABASE_ANON_KEY") {
            self.health.supabase_anon_key = Some(key);
        }
        if let Ok(url) = std::env::var("R2_PUBLIC_BASE_URL") {
            self.health.r2_public_base_url = Some(url);
        }
    }

    /// Location of the encrypted secret store.
    pub fn secrets_path(&self) -> PathBuf {
        self.data_dir.join("secrets.enc")
    }

    /// Runtime state directory (pid files, the per-run bridge token).
    pub fn run_dir(&self) -> PathBuf {
        self.data_dir.join("run")
    }
}
