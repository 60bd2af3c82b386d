use axum::extract::{Path, Query, State};
use axum::response::Html;
use axum::{Router, routing::get};
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use tokio::sync::{Mutex, oneshot};
use tracing::{info, warn};

use crate::config::OAuthSettings;
use crate::core::backend::{BackendClient, BackendError};
use crate::core::supervisor::{BackendState, BackendSupervisor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Youtube,
    Instagram,
}

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::Youtube, Provider::Instagram];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Youtube => "youtube",
            Self::Instagram => "instagram",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = OAuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "youtube" => Ok(Self::Youtube),
            "instagram" => Ok(Self::Instagram),
            other => Err(OAuthError::UnknownProvider(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("backend is not ready")]
    BackendUnavailable,
    #[error("an authorization session is already active for {0}")]
    SessionAlreadyActive(Provider),
    #[error("authorization window was closed before completion")]
    UserCancelled,
    #[error("token exchange failed: {0}")]
    TokenExchangeFailed(String),
    #[error("provider returned error: {0}")]
    Provider(String),
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("could not present authorization window: {0}")]
    Surface(String),
}

/// The isolated interactive browsing surface an authorization URL is shown in.
/// The production impl hands the URL to the system browser, which shares no
/// script context or credentials with this process.
pub trait AuthSurface: Send + Sync {
    fn present(&self, url: &str) -> std::io::Result<()>;
}

pub struct SystemBrowser;

impl AuthSurface for SystemBrowser {
    fn present(&self, url: &str) -> std::io::Result<()> {
        open::that(url)
    }
}

/// What the first matching navigation on the redirect listener carried.
#[derive(Debug)]
enum SessionEvent {
    Redirect {
        code: Option<String>,
        error: Option<String>,
    },
    /// The surface was closed (or the session cancelled) before any redirect.
    Closed,
}

/// One outstanding authorization attempt. The resolver is single-resolution:
/// whoever removes the session from the map owns the only chance to fire it.
struct PendingSession {
    resolver: oneshot::Sender<SessionEvent>,
}

type PendingMap = Arc<Mutex<HashMap<Provider, PendingSession>>>;

/// Drives the interactive authorization-code flow. The code-for-token
/// exchange is delegated to the backend; no client secret ever lives here.
pub struct OAuthBroker {
    settings: OAuthSettings,
    supervisor: Arc<BackendSupervisor>,
    backend: BackendClient,
    surface: Arc<dyn AuthSurface>,
    pending: PendingMap,
    redirect_port: AtomicU16,
}

impl OAuthBroker {
    pub fn new(
        settings: OAuthSettings,
        supervisor: Arc<BackendSupervisor>,
        backend: BackendClient,
        surface: Arc<dyn AuthSurface>,
    ) -> Self {
        let redirect_port = AtomicU16::new(settings.redirect_port);
        Self {
            settings,
            supervisor,
            backend,
            surface,
            pending: Arc::new(Mutex::new(HashMap::new())),
            redirect_port,
        }
    }

    /// Bind the loopback redirect listener and serve it in the background.
    /// Returns the bound port (relevant when configured as ephemeral).
    pub async fn start_redirect_listener(&self) -> anyhow::Result<u16> {
        let addr = SocketAddr::from(([127, 0, 0, 1], self.redirect_port.load(Ordering::SeqCst)));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let port = listener.local_addr()?.port();
        self.redirect_port.store(port, Ordering::SeqCst);

        let app = redirect_router(self.pending.clone());
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                warn!("oauth redirect listener stopped: {e}");
            }
        });
        info!("oauth redirect listener on 127.0.0.1:{port}");
        Ok(port)
    }

    fn redirect_uri(&self, provider: Provider) -> String {
        format!(
            "http://127.0.0.1:{}/oauth/{}/callback",
            self.redirect_port.load(Ordering::SeqCst),
            provider
        )
    }

    pub fn build_auth_url(&self, provider: Provider) -> String {
        let redirect = self.redirect_uri(provider);
        match provider {
            Provider::Youtube => format!(
                "https://accounts.google.com/o/oauth2/v2/auth?client_id={}&redirect_uri={}&response_type=code&scope={}",
                urlencoding::encode(&self.settings.youtube_client_id),
                urlencoding::encode(&redirect),
                urlencoding::encode("https://www.googleapis.com/auth/youtube.upload"),
            ),
            Provider::Instagram => format!(
                "https://api.instagram.com/oauth/authorize?client_id={}&redirect_uri={}&scope={}&response_type=code",
                urlencoding::encode(&self.settings.instagram_client_id),
                urlencoding::encode(&redirect),
                urlencoding::encode("user_profile,user_media"),
            ),
        }
    }

    /// Run one authorization attempt end to end: present the surface, wait
    /// for the first matching redirect, exchange the code via the backend.
    ///
    /// At most one session per provider may be outstanding. There is no
    /// session timeout; an abandoned window leaves the session pending until
    /// `cancel` clears it.
    pub async fn open(&self, provider: Provider) -> Result<Value, OAuthError> {
        if self.supervisor.state() != BackendState::Ready {
            return Err(OAuthError::BackendUnavailable);
        }

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            if pending.contains_key(&provider) {
                return Err(OAuthError::SessionAlreadyActive(provider));
            }
            pending.insert(provider, PendingSession { resolver: tx });
        }

        let url = self.build_auth_url(provider);
        if let Err(e) = self.surface.present(&url) {
            self.pending.lock().await.remove(&provider);
            return Err(OAuthError::Surface(e.to_string()));
        }

        info!("awaiting {provider} authorization redirect");
        let event = rx.await.map_err(|_| OAuthError::UserCancelled)?;

        match event {
            SessionEvent::Closed => Err(OAuthError::UserCancelled),
            SessionEvent::Redirect {
                error: Some(error), ..
            } => {
                if error == "access_denied" {
                    Err(OAuthError::UserCancelled)
                } else {
                    Err(OAuthError::Provider(error))
                }
            }
            SessionEvent::Redirect {
                code: Some(code), ..
            } => match self.backend.oauth_callback(provider, &code).await {
                Ok(payload) => {
                    info!("{provider} authorization complete");
                    Ok(payload)
                }
                Err(BackendError::Status { status, .. }) => Err(OAuthError::TokenExchangeFailed(
                    format!("backend returned {status}"),
                )),
                Err(e) => Err(OAuthError::TokenExchangeFailed(e.to_string())),
            },
            SessionEvent::Redirect { .. } => {
                Err(OAuthError::Provider("redirect carried no code".into()))
            }
        }
    }

    /// Window-close analog: resolve the provider's pending session as
    /// cancelled. Returns whether a session was actually pending.
    pub async fn cancel(&self, provider: Provider) -> bool {
        if let Some(session) = self.pending.lock().await.remove(&provider) {
            let _ = session.resolver.send(SessionEvent::Closed);
            true
        } else {
            false
        }
    }

    /// Cancel every outstanding session (application shutdown).
    pub async fn cancel_all(&self) {
        let sessions: Vec<(Provider, PendingSession)> =
            self.pending.lock().await.drain().collect();
        for (provider, session) in sessions {
            info!("cancelling pending {provider} authorization");
            let _ = session.resolver.send(SessionEvent::Closed);
        }
    }
}

#[derive(serde::Deserialize)]
struct RedirectParams {
    code: Option<String>,
    error: Option<String>,
}

/// The callback route the authorization URL redirects to. The first matching
/// navigation removes the session, so the resolver can fire at most once.
fn redirect_router(pending: PendingMap) -> Router {
    Router::new()
        .route("/oauth/{provider}/callback", get(handle_redirect))
        .with_state(pending)
}

async fn handle_redirect(
    Path(provider): Path<String>,
    Query(params): Query<RedirectParams>,
    State(pending): State<PendingMap>,
) -> (axum::http::StatusCode, Html<&'static str>) {
    let Ok(provider) = provider.parse::<Provider>() else {
        return (axum::http::StatusCode::NOT_FOUND, Html("unknown provider"));
    };
    let Some(session) = pending.lock().await.remove(&provider) else {
        return (
            axum::http::StatusCode::NOT_FOUND,
            Html("no authorization in progress"),
        );
    };

    let _ = session.resolver.send(SessionEvent::Redirect {
        code: params.code,
        error: params.error,
    });
    (
        axum::http::StatusCode::OK,
        Html("<html><body>Authorization received. You can close this window.</body></html>"),
    )
}
