use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, watch};
use tracing::{error, info, warn};

use crate::config::BackendConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendState {
    NotStarted,
    Starting,
    Ready,
    Failed,
    Stopped,
}

impl std::fmt::Display for BackendState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotStarted => "not-started",
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Owns the one backend process of an application run.
///
/// `NotStarted -> Starting -> {Ready | Failed} -> Stopped`. A `Failed`
/// readiness gate does not kill a process that may still come up later; the
/// app runs degraded instead. Shutdown must leave no orphaned backend behind,
/// so the child is spawned with `kill_on_drop` and terminated explicitly.
pub struct BackendSupervisor {
    config: BackendConfig,
    client: reqwest::Client,
    state_tx: watch::Sender<BackendState>,
    child: Mutex<Option<Child>>,
}

impl BackendSupervisor {
    pub fn new(config: BackendConfig) -> Self {
        let (state_tx, _) = watch::channel(BackendState::NotStarted);
        Self {
            config,
            client: reqwest::Client::new(),
            state_tx,
            child: Mutex::new(None),
        }
    }

    pub fn state(&self) -> BackendState {
        *self.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<BackendState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, state: BackendState) {
        info!("backend state: {state}");
        self.state_tx.send_replace(state);
    }

    #[cfg(test)]
    pub(crate) fn force_state(&self, state: BackendState) {
        self.state_tx.send_replace(state);
    }

    /// Spawn the backend and block until it is healthy or the readiness gate
    /// times out. Returns the resulting state (`Ready` or `Failed`).
    pub async fn start(&self) -> BackendState {
        self.set_state(BackendState::Starting);

        let mut args = self.config.args.clone();
        args.push("--port".into());
        args.push(self.config.port.to_string());

        let mut cmd = Command::new(&self.config.command);
        cmd.args(&args)
            .env("PYTHONUNBUFFERED", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }

        info!("spawning backend: {} {}", self.config.command, args.join(" "));
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!("backend failed to spawn: {e}");
                self.set_state(BackendState::Failed);
                return BackendState::Failed;
            }
        };

        if let Some(stdout) = child.stdout.take() {
            forward_output(stdout, false);
        }
        if let Some(stderr) = child.stderr.take() {
            forward_output(stderr, true);
        }

        *self.child.lock().await = Some(child);
        self.wait_ready().await
    }

    /// Probe the liveness endpoint sequentially, one in-flight request at a
    /// time, until it answers or the attempt budget is spent.
    async fn wait_ready(&self) -> BackendState {
        let url = format!("{}/health", self.config.base_url());
        let interval = self.config.poll_interval();

        for attempt in 1..=self.config.max_health_attempts {
            let probe = self
                .client
                .get(&url)
                .timeout(interval.max(Duration::from_millis(100)))
                .send()
                .await;
            if matches!(probe, Ok(ref resp) if resp.status().is_success()) {
                info!("backend healthy after {attempt} probe(s)");
                self.set_state(BackendState::Ready);
                return BackendState::Ready;
            }
            if attempt < self.config.max_health_attempts {
                tokio::time::sleep(interval).await;
            }
        }

        warn!(
            "backend not healthy after {} probes, continuing degraded",
            self.config.max_health_attempts
        );
        self.set_state(BackendState::Failed);
        BackendState::Failed
    }

    /// Terminate the owned process and reap it.
    pub async fn shutdown(&self) {
        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.start_kill() {
                warn!("could not signal backend: {e}");
            }
            match child.wait().await {
                Ok(status) => info!("backend exited: {status}"),
                Err(e) => warn!("failed reaping backend: {e}"),
            }
        }
        self.set_state(BackendState::Stopped);
    }
}

/// Forward one child output stream to the observability sink, line by line.
fn forward_output<R>(reader: R, is_stderr: bool)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if is_stderr {
                warn!(target: "backend", "{line}");
            } else {
                info!(target: "backend", "{line}");
            }
        }
    });
}
