use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, PartialEq)]
pub enum LifecycleState {
    Init,
    Starting,
    Ready,
    Shutdown,
}

/// Implemented by everything the core starts and stops in order: the backend
/// supervisor first, the capability bridge after it, so the UI can never
/// reach privileged operations before the readiness gate has run.
#[async_trait::async_trait]
pub trait LifecycleComponent {
    async fn on_init(&mut self) -> Result<()> {
        Ok(())
    }
    async fn on_start(&mut self) -> Result<()> {
        Ok(())
    }
    async fn on_shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

pub struct LifecycleManager {
    state: LifecycleState,
    components: Vec<Arc<Mutex<dyn LifecycleComponent + Send + Sync>>>,
}

impl LifecycleManager {
    pub fn new() -> Self {
        Self {
            state: LifecycleState::Init,
            components: Vec::new(),
        }
    }

    pub fn attach(&mut self, component: Arc<Mutex<dyn LifecycleComponent + Send + Sync>>) {
        self.components.push(component);
    }

    /// Start every component in attach order. `on_start` is sequential on
    /// purpose: later components may depend on earlier ones being up.
    pub async fn start(&mut self) -> Result<()> {
        info!("lifecycle phase: init");
        self.state = LifecycleState::Init;
        for comp in &self.components {
            comp.lock().await.on_init().await?;
        }

        info!("lifecycle phase: starting");
        self.state = LifecycleState::Starting;
        for comp in &self.components {
            comp.lock().await.on_start().await?;
        }

        info!("lifecycle phase: ready");
        self.state = LifecycleState::Ready;
        Ok(())
    }

    /// Shut down in reverse attach order so the bridge stops accepting calls
    /// before the backend it fronts goes away. Shutdown errors are logged,
    /// never propagated: every component gets its chance to clean up.
    pub async fn shutdown(&mut self) {
        info!("lifecycle phase: shutdown");
        self.state = LifecycleState::Shutdown;

        for comp in self.components.iter().rev() {
            if let Err(e) = comp.lock().await.on_shutdown().await {
                warn!("component shutdown error: {e}");
            }
        }
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        id: usize,
        order: Arc<Mutex<Vec<(usize, &'static str)>>>,
        fail_shutdown: bool,
    }

    #[async_trait::async_trait]
    impl LifecycleComponent for Recorder {
        async fn on_start(&mut self) -> Result<()> {
            self.order.lock().await.push((self.id, "start"));
            Ok(())
        }
        async fn on_shutdown(&mut self) -> Result<()> {
            self.order.lock().await.push((self.id, "shutdown"));
            if self.fail_shutdown {
                anyhow::bail!("shutdown failed");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn starts_in_attach_order_and_stops_in_reverse() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut manager = LifecycleManager::new();
        for id in 0..3 {
            manager.attach(Arc::new(Mutex::new(Recorder {
                id,
                order: order.clone(),
                fail_shutdown: false,
            })));
        }

        manager.start().await.unwrap();
        assert_eq!(manager.state, LifecycleState::Ready);
        manager.shutdown().await;

        let order = order.lock().await;
        let starts: Vec<usize> = order
            .iter()
            .filter(|(_, p)| *p == "start")
            .map(|(id, _)| *id)
            .collect();
        let shutdowns: Vec<usize> = order
            .iter()
            .filter(|(_, p)| *p == "shutdown")
            .map(|(id, _)| *id)
            .collect();
        assert_eq!(starts, vec![0, 1, 2]);
        assert_eq!(shutdowns, vec![2, 1, 0]);
    }

    #[tokio::test]
    async fn one_failing_shutdown_does_not_stop_the_rest() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut manager = LifecycleManager::new();
        for id in 0..2 {
            manager.attach(Arc::new(Mutex::new(Recorder {
                id,
                order: order.clone(),
                fail_shutdown: id == 1,
            })));
        }
        manager.start().await.unwrap();
        manager.shutdown().await;

        let shutdowns = order
            .lock()
            .await
            .iter()
            .filter(|(_, p)| *p == "shutdown")
            .count();
        assert_eq!(shutdowns, 2);
    }
}
