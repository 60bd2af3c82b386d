use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::backend::BackendClient;

pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl JobStatus {
    /// Terminal statuses stop polling permanently.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobFault {
    pub code: String,
    pub message: String,
}

/// Read-only, eventually-consistent copy of a backend-owned job.
#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    pub job_id: String,
    #[serde(rename = "type", default)]
    pub job_type: Option<String>,
    pub status: JobStatus,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub output_urls: Vec<String>,
    #[serde(default)]
    pub error: Option<JobFault>,
    #[serde(default)]
    pub status_hint: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug)]
pub enum JobEvent {
    Update(Job),
    /// A single fetch failed; polling continues on the next tick.
    PollError(String),
}

/// Converts a backend job id into a live status stream without the caller
/// managing timers.
#[derive(Clone)]
pub struct JobTracker {
    backend: BackendClient,
    interval: Duration,
}

/// Handle for one tracking session. Dropping it closes the receiving side,
/// which ends the session at the loop's next send.
pub struct JobWatch {
    rx: mpsc::Receiver<JobEvent>,
    cancel: CancellationToken,
}

impl JobWatch {
    pub async fn recv(&mut self) -> Option<JobEvent> {
        self.rx.recv().await
    }

    /// Stop issuing requests. A late in-flight response is discarded rather
    /// than delivered to a caller that no longer observes this job.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Adapt the watch into a `Stream`. Dropping the stream ends the session
    /// the same way dropping the watch does: the loop stops at its next send.
    pub fn into_stream(self) -> ReceiverStream<JobEvent> {
        ReceiverStream::new(self.rx)
    }
}

impl JobTracker {
    pub fn new(backend: BackendClient) -> Self {
        Self {
            backend,
            interval: POLL_INTERVAL,
        }
    }

    pub fn with_interval(backend: BackendClient, interval: Duration) -> Self {
        Self { backend, interval }
    }

    /// Start tracking `job_id`: an immediate fetch, then one poll per tick
    /// until a terminal status, cancellation, or the receiver going away.
    pub fn track(&self, job_id: String) -> JobWatch {
        let (tx, rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let backend = self.backend.clone();
        let interval = self.interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let fetched = tokio::select! {
                    _ = token.cancelled() => break,
                    res = backend.get_job(&job_id) => res,
                };

                match fetched {
                    Ok(job) => {
                        let terminal = job.status.is_terminal();
                        if tx.send(JobEvent::Update(job)).await.is_err() {
                            break;
                        }
                        if terminal {
                            debug!("job {job_id} reached a terminal status, polling stopped");
                            break;
                        }
                    }
                    Err(e) => {
                        // Transient: surfaced for display, loop keeps trying.
                        if tx.send(JobEvent::PollError(e.to_string())).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        JobWatch { rx, cancel }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::{Json, Router, routing::get};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn job_json(status: &str) -> serde_json::Value {
        serde_json::json!({
            "job_id": "job-1",
            "type": "video_generate",
            "status": status,
            "progress": if status == "SUCCEEDED" { 100 } else { 40 },
            "output_urls": [],
        })
    }

    async fn serve_counting(
        responder: impl Fn(usize) -> axum::response::Response + Clone + Send + Sync + 'static,
    ) -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let state = hits.clone();
        let app = Router::new()
            .route(
                "/jobs/{id}",
                get(move |State(hits): State<Arc<AtomicUsize>>| {
                    let responder = responder.clone();
                    async move {
                        let n = hits.fetch_add(1, Ordering::SeqCst);
                        responder(n)
                    }
                }),
            )
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (format!("http://{}", addr), hits)
    }

    #[tokio::test]
    async fn polling_stops_permanently_on_terminal_status() {
        use axum::response::IntoResponse;
        let (base, hits) = serve_counting(|n| {
            if n < 3 {
                Json(job_json("RUNNING")).into_response()
            } else {
                Json(job_json("SUCCEEDED")).into_response()
            }
        })
        .await;

        let tracker =
            JobTracker::with_interval(BackendClient::new(base), Duration::from_millis(10));
        let mut watch = tracker.track("job-1".into());

        let mut updates = Vec::new();
        while let Some(event) = watch.recv().await {
            if let JobEvent::Update(job) = event {
                updates.push(job.status);
            }
        }
        assert_eq!(updates.len(), 4);
        assert_eq!(updates[3], JobStatus::Succeeded);
        assert_eq!(hits.load(Ordering::SeqCst), 4);

        // No further requests after the terminal fetch.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn one_failed_poll_does_not_stop_the_loop() {
        use axum::response::IntoResponse;
        let (base, _hits) = serve_counting(|n| {
            if n == 0 {
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "backend hiccup",
                )
                    .into_response()
            } else if n < 2 {
                Json(job_json("RUNNING")).into_response()
            } else {
                Json(job_json("SUCCEEDED")).into_response()
            }
        })
        .await;

        let tracker =
            JobTracker::with_interval(BackendClient::new(base), Duration::from_millis(10));
        let mut watch = tracker.track("job-1".into());

        let first = watch.recv().await.expect("first event");
        assert!(matches!(first, JobEvent::PollError(_)));

        // The loop kept going and eventually delivered the terminal update.
        let mut last_status = None;
        while let Some(event) = watch.recv().await {
            if let JobEvent::Update(job) = event {
                last_status = Some(job.status);
            }
        }
        assert_eq!(last_status, Some(JobStatus::Succeeded));
    }

    #[tokio::test]
    async fn cancellation_stops_requests() {
        use axum::response::IntoResponse;
        let (base, hits) = serve_counting(|_| Json(job_json("RUNNING")).into_response()).await;

        let tracker =
            JobTracker::with_interval(BackendClient::new(base), Duration::from_millis(10));
        let mut watch = tracker.track("job-1".into());

        assert!(matches!(watch.recv().await, Some(JobEvent::Update(_))));
        watch.cancel();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let settled = hits.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(hits.load(Ordering::SeqCst), settled);
    }

    #[tokio::test]
    async fn dropping_the_watch_cancels_the_session() {
        use axum::response::IntoResponse;
        let (base, hits) = serve_counting(|_| Json(job_json("QUEUED")).into_response()).await;

        let tracker =
            JobTracker::with_interval(BackendClient::new(base), Duration::from_millis(10));
        let watch = tracker.track("job-1".into());
        tokio::time::sleep(Duration::from_millis(30)).await;
        drop(watch);

        tokio::time::sleep(Duration::from_millis(30)).await;
        let settled = hits.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(hits.load(Ordering::SeqCst), settled);
    }

    #[test]
    fn terminal_statuses_are_exactly_the_three_final_ones() {
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Canceled.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }

    #[test]
    fn job_deserializes_backend_wire_format() {
        let job: Job = serde_json::from_value(serde_json::json!({
            "job_id": "j-9",
            "type": "tts",
            "status": "FAILED",
            "progress": 80,
            "output_urls": ["https://cdn.example/out.mp4"],
            "error": { "code": "GPU_OOM", "message": "out of memory" },
            "status_hint": "warming_gpu",
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:05:00Z"
        }))
        .expect("job should deserialize");
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_ref().unwrap().code, "GPU_OOM");
        assert_eq!(job.status_hint.as_deref(), Some("warming_gpu"));
    }
}
