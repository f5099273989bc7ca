//! Admin sign-in, sessions and the gate in front of the admin console.
//!
//! Sessions are resolved on every gated request, so a session that expires
//! mid-visit is refused on the next request. Every sign-in, sign-out and
//! detected expiry is published as a [`SessionChange`] to subscribers.
//! Expired sessions that are never presented again are removed by the
//! periodic sweep in [`audit_session_changes`].

use crate::api::AppState;
use crate::error::{Error, Result};
use crate::models::{AdminAccount, Session};
use crate::repository::SessionRepository;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Login entry point; unauthenticated admin requests are sent here
pub const LOGIN_PATH: &str = "/admin";

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Session lifecycle notification
#[derive(Debug, Clone, PartialEq)]
pub enum SessionChange {
    SignedIn { admin_id: i64, email: String },
    SignedOut { admin_id: i64, email: String },
    Expired { admin_id: i64, email: String },
}

/// Issues, resolves and revokes admin sessions
pub struct Authenticator {
    sessions: Arc<dyn SessionRepository>,
    ttl: Duration,
    changes: broadcast::Sender<SessionChange>,
}

impl Authenticator {
    pub fn new(sessions: Arc<dyn SessionRepository>, ttl: Duration) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            sessions,
            ttl,
            changes,
        }
    }

    /// Receive every subsequent session change
    pub fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.changes.subscribe()
    }

    /// Verify credentials and open a session
    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let admin = self
            .sessions
            .find_admin(email.trim())
            .await?
            .ok_or(Error::InvalidCredentials)?;

        if !verify_password_blocking(password, &admin.password_hash).await? {
            warn!(admin_id = admin.id, "Rejected admin sign-in");
            return Err(Error::InvalidCredentials);
        }

        let now = Utc::now();
        let session = Session {
            token: Uuid::new_v4(),
            admin_id: admin.id,
            email: admin.email,
            created_at: now,
            expires_at: now + self.ttl,
        };
        self.sessions.insert_session(&session).await?;

        metrics::counter!("gallery.sessions.signed_in").increment(1);
        self.publish(SessionChange::SignedIn {
            admin_id: session.admin_id,
            email: session.email.clone(),
        });

        Ok(session)
    }

    /// Revoke a session; unknown tokens are ignored
    pub async fn sign_out(&self, token: Uuid) -> Result<()> {
        if let Some(session) = self.sessions.find_session(token).await? {
            self.sessions.delete_session(token).await?;
            self.publish(SessionChange::SignedOut {
                admin_id: session.admin_id,
                email: session.email,
            });
        }
        Ok(())
    }

    /// The live session for `token`, dropping it if it has expired
    pub async fn current_session(&self, token: Uuid) -> Result<Option<Session>> {
        let Some(session) = self.sessions.find_session(token).await? else {
            return Ok(None);
        };

        if session.is_expired_at(Utc::now()) {
            self.sessions.delete_session(token).await?;
            self.publish(SessionChange::Expired {
                admin_id: session.admin_id,
                email: session.email,
            });
            return Ok(None);
        }

        Ok(Some(session))
    }

    /// Create the admin account, or reset its password if it exists
    pub async fn ensure_admin(&self, email: &str, password: &str) -> Result<AdminAccount> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(Error::validation("Admin email and password must not be empty"));
        }

        let password = password.to_string();
        let hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| Error::Internal(format!("Password hashing task failed: {}", e)))??;
        let admin = self.sessions.upsert_admin(email, &hash).await?;
        info!(admin_id = admin.id, email = %admin.email, "Admin account ready");
        Ok(admin)
    }

    /// Delete every session that has expired, presented or not
    pub async fn purge_expired(&self) -> Result<u64> {
        let purged = self.sessions.purge_expired(Utc::now()).await?;
        if purged > 0 {
            info!(purged, "Expired sessions purged");
            metrics::counter!("gallery.sessions.purged").increment(purged);
        }
        Ok(purged)
    }

    fn publish(&self, change: SessionChange) {
        // No subscribers is fine
        let _ = self.changes.send(change);
    }
}

/// Argon2 PHC hash of `password` with a random salt
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(hashing_error)
}

fn hashing_error(e: argon2::password_hash::Error) -> Error {
    Error::Internal(format!("Failed to hash password: {}", e))
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    PasswordHash::new(password_hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Argon2 verification off the async workers
async fn verify_password_blocking(password: &str, password_hash: &str) -> Result<bool> {
    let password = password.to_string();
    let password_hash = password_hash.to_string();
    tokio::task::spawn_blocking(move || verify_password(&password, &password_hash))
        .await
        .map_err(|e| Error::Internal(format!("Password verification task failed: {}", e)))
}

/// Session cookie attributes
#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub name: String,
    pub secure: bool,
}

impl CookieSettings {
    pub fn session_cookie(&self, token: Uuid) -> Cookie<'static> {
        Cookie::build((self.name.clone(), token.to_string()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .build()
    }

    pub fn removal_cookie(&self) -> Cookie<'static> {
        Cookie::build((self.name.clone(), "")).path("/").build()
    }

    /// Token carried by the request's session cookie, if well-formed
    pub fn token(&self, jar: &CookieJar) -> Option<Uuid> {
        jar.get(&self.name)
            .and_then(|cookie| Uuid::parse_str(cookie.value()).ok())
    }
}

/// Gate for admin routes.
///
/// Without a live session the request is answered with `303 See Other` to
/// the login page. With one, the [`Session`] is placed in the request
/// extensions for handlers to take as context.
pub async fn require_session(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let session = match state.cookies.token(&jar) {
        Some(token) => state.auth.current_session(token).await,
        None => Ok(None),
    };

    match session {
        Ok(Some(session)) => {
            request.extensions_mut().insert(session);
            next.run(request).await
        }
        Ok(None) => {
            debug!(path = %request.uri().path(), "No active session, redirecting to login");
            let jar = if jar.get(&state.cookies.name).is_some() {
                jar.remove(state.cookies.removal_cookie())
            } else {
                jar
            };
            (jar, Redirect::to(LOGIN_PATH)).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Log session changes and purge expired sessions every `sweep_every`,
/// until shutdown
pub async fn audit_session_changes(
    auth: Arc<Authenticator>,
    sweep_every: std::time::Duration,
    shutdown: CancellationToken,
) {
    let mut changes = auth.subscribe();
    let mut sweep = tokio::time::interval(sweep_every);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = sweep.tick() => {
                if let Err(e) = auth.purge_expired().await {
                    warn!(error = %e, "Expired session sweep failed");
                }
            }
            change = changes.recv() => match change {
                Ok(SessionChange::SignedIn { admin_id, email }) => {
                    info!(admin_id, email = %email, "Admin signed in");
                }
                Ok(SessionChange::SignedOut { admin_id, email }) => {
                    info!(admin_id, email = %email, "Admin signed out");
                }
                Ok(SessionChange::Expired { admin_id, email }) => {
                    info!(admin_id, email = %email, "Admin session expired");
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Session audit lagged behind");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{MemoryStore, SessionRepository};

    async fn authenticator(ttl: Duration) -> Authenticator {
        let auth = Authenticator::new(Arc::new(MemoryStore::new()), ttl);
        auth.ensure_admin("admin@example.com", "correct horse")
            .await
            .unwrap();
        auth
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("s3cret").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("s3cret", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("s3cret", "not-a-phc-string"));
    }

    #[test]
    fn test_hashing_failure_is_internal() {
        let err = hashing_error(argon2::password_hash::Error::Algorithm);
        assert!(matches!(err, Error::Internal(_)));
        assert_eq!(err.status(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_sign_in_and_resolve() {
        let auth = authenticator(Duration::hours(1)).await;
        let mut changes = auth.subscribe();

        let session = auth
            .sign_in(" admin@example.com ", "correct horse")
            .await
            .unwrap();
        assert_eq!(session.email, "admin@example.com");

        let current = auth.current_session(session.token).await.unwrap();
        assert_eq!(current, Some(session.clone()));

        assert_eq!(
            changes.recv().await.unwrap(),
            SessionChange::SignedIn {
                admin_id: session.admin_id,
                email: "admin@example.com".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_wrong_password_rejected() {
        let auth = authenticator(Duration::hours(1)).await;
        let err = auth
            .sign_in("admin@example.com", "battery staple")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials));

        let err = auth.sign_in("nobody@example.com", "x").await.unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_expired_session_is_dropped_and_announced() {
        let auth = authenticator(Duration::zero()).await;
        let session = auth
            .sign_in("admin@example.com", "correct horse")
            .await
            .unwrap();
        let mut changes = auth.subscribe();

        assert_eq!(auth.current_session(session.token).await.unwrap(), None);
        assert!(matches!(
            changes.recv().await.unwrap(),
            SessionChange::Expired { .. }
        ));
        // Gone from the store, so no second notification
        assert_eq!(auth.current_session(session.token).await.unwrap(), None);
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_sign_out_revokes() {
        let auth = authenticator(Duration::hours(1)).await;
        let session = auth
            .sign_in("admin@example.com", "correct horse")
            .await
            .unwrap();
        let mut changes = auth.subscribe();

        auth.sign_out(session.token).await.unwrap();
        assert_eq!(auth.current_session(session.token).await.unwrap(), None);
        assert!(matches!(
            changes.recv().await.unwrap(),
            SessionChange::SignedOut { .. }
        ));

        // Unknown token is a no-op
        auth.sign_out(Uuid::new_v4()).await.unwrap();
    }

    #[tokio::test]
    async fn test_ensure_admin_rejects_empty() {
        let auth = Authenticator::new(Arc::new(MemoryStore::new()), Duration::hours(1));
        assert!(matches!(
            auth.ensure_admin("admin@example.com", "").await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_audit_stops_on_shutdown() {
        let auth = Arc::new(Authenticator::new(
            Arc::new(MemoryStore::new()),
            Duration::hours(1),
        ));
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(audit_session_changes(
            auth,
            std::time::Duration::from_secs(3600),
            shutdown.clone(),
        ));
        shutdown.cancel();
        tokio_test::assert_ok!(task.await);
    }

    #[tokio::test]
    async fn test_purge_removes_unpresented_expired_sessions() {
        let store = Arc::new(MemoryStore::new());
        let auth = Authenticator::new(store.clone(), Duration::zero());
        auth.ensure_admin("admin@example.com", "correct horse")
            .await
            .unwrap();

        let mut tokens = Vec::new();
        for _ in 0..5 {
            let session = auth
                .sign_in("admin@example.com", "correct horse")
                .await
                .unwrap();
            tokens.push(session.token);
        }

        assert_eq!(auth.purge_expired().await.unwrap(), 5);
        for token in tokens {
            assert_eq!(store.find_session(token).await.unwrap(), None);
        }
        assert_eq!(auth.purge_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_purge_keeps_live_sessions() {
        let store = Arc::new(MemoryStore::new());
        let auth = Authenticator::new(store.clone(), Duration::hours(1));
        auth.ensure_admin("admin@example.com", "correct horse")
            .await
            .unwrap();
        let session = auth
            .sign_in("admin@example.com", "correct horse")
            .await
            .unwrap();

        assert_eq!(auth.purge_expired().await.unwrap(), 0);
        assert!(store.find_session(session.token).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_audit_loop_sweeps_expired_sessions() {
        let store = Arc::new(MemoryStore::new());
        let auth = Arc::new(Authenticator::new(store.clone(), Duration::zero()));
        auth.ensure_admin("admin@example.com", "correct horse")
            .await
            .unwrap();
        let session = auth
            .sign_in("admin@example.com", "correct horse")
            .await
            .unwrap();

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(audit_session_changes(
            auth.clone(),
            std::time::Duration::from_millis(10),
            shutdown.clone(),
        ));

        let mut purged = false;
        for _ in 0..100 {
            if store.find_session(session.token).await.unwrap().is_none() {
                purged = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        shutdown.cancel();
        tokio_test::assert_ok!(task.await);
        assert!(purged, "expired session survived the sweep");
    }

    #[test]
    fn test_cookie_token_parsing() {
        let settings = CookieSettings {
            name: "gallery_session".to_string(),
            secure: false,
        };
        let token = Uuid::new_v4();
        let jar = CookieJar::new().add(settings.session_cookie(token));
        assert_eq!(settings.token(&jar), Some(token));

        let jar = CookieJar::new().add(Cookie::new("gallery_session", "garbage"));
        assert_eq!(settings.token(&jar), None);
    }
}
