// src/services/auth_service.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing;

use crate::{
    config::AuthConfig,
    errors::{FleetError, FleetResult},
    models::{driver::is_valid_pin_format, Driver, FleetChanges},
    services::store_service::FleetStore,
};

/// Checks a submitted PIN against the admin drivers and produces stored credentials.
#[async_trait]
pub trait AdminAuthenticator: Send + Sync {
    /// The admin driver whose PIN matches, if any.
    async fn verify(&self, drivers: &[Driver], pin: &str) -> FleetResult<Option<Driver>>;
    async fn hash_pin(&self, pin: &str) -> FleetResult<String>;
}

pub struct PinAuthenticator {
    cost: u32,
}

impl PinAuthenticator {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }
}

#[async_trait]
impl AdminAuthenticator for PinAuthenticator {
    async fn verify(&self, drivers: &[Driver], pin: &str) -> FleetResult<Option<Driver>> {
        let admins: Vec<Driver> = drivers.iter().filter(|d| d.is_admin && !d.pin.is_empty()).cloned().collect();
        let pin = pin.to_string();

        tokio::task::spawn_blocking(move || {
            for admin in admins {
                let matches = if admin.has_hashed_pin() {
                    bcrypt::verify(&pin, &admin.pin)?
                } else {
                    admin.pin == pin
                };
                if matches {
                    return Ok(Some(admin));
                }
            }
            Ok(None)
        })
        .await
        .map_err(|e| FleetError::internal_error(format!("PIN check task failed: {}", e)))?
    }

    async fn hash_pin(&self, pin: &str) -> FleetResult<String> {
        let pin = pin.to_string();
        let cost = self.cost;
        let hashed = tokio::task::spawn_blocking(move || bcrypt::hash(pin, cost))
            .await
            .map_err(|e| FleetError::internal_error(format!("PIN hashing task failed: {}", e)))??;
        Ok(hashed)
    }
}

#[derive(Debug, Clone)]
struct AttemptInfo {
    failures: u32,
    window_start: Instant,
}

/// Counts PIN attempts per client and locks the client out once the limit is hit.
pub struct FailedAttemptLimiter {
    attempts: RwLock<HashMap<String, AttemptInfo>>,
    max_failures: u32,
    window: Duration,
}

impl FailedAttemptLimiter {
    pub fn new(max_failures: u32, window: Duration) -> Self {
        Self {
            attempts: RwLock::new(HashMap::new()),
            max_failures,
            window,
        }
    }

    /// Reserves one attempt for `client` before its PIN is checked. The reservation
    /// counts as a failure until `reset` clears it after a successful login.
    pub async fn acquire(&self, client: &str) -> FleetResult<u32> {
        let mut attempts = self.attempts.write().await;
        let now = Instant::now();
        attempts.retain(|_, info| now.duration_since(info.window_start) < self.window);

        let info = attempts.entry(client.to_string()).or_insert(AttemptInfo {
            failures: 0,
            window_start: now,
        });
        if info.failures >= self.max_failures {
            return Err(FleetError::RateLimitExceeded);
        }
        info.failures += 1;
        Ok(info.failures)
    }

    pub async fn reset(&self, client: &str) {
        self.attempts.write().await.remove(client);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSession {
    pub token: String,
    pub driver_id: String,
    pub driver_name: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub pin: String,
}

#[async_trait]
pub trait AuthOperations: Send + Sync {
    async fn login(&self, pin: &str, client: &str) -> FleetResult<AdminSession>;
    async fn validate_session(&self, token: &str) -> FleetResult<AdminSession>;
    async fn logout(&self, token: &str) -> FleetResult<()>;
}

pub struct AuthService {
    store: Arc<dyn FleetStore>,
    authenticator: Arc<dyn AdminAuthenticator>,
    limiter: FailedAttemptLimiter,
    sessions: RwLock<HashMap<String, AdminSession>>,
    session_ttl: Duration,
}

impl AuthService {
    pub fn new(store: Arc<dyn FleetStore>, authenticator: Arc<dyn AdminAuthenticator>, config: &AuthConfig) -> Self {
        Self {
            store,
            authenticator,
            limiter: FailedAttemptLimiter::new(config.max_failed_attempts, config.lockout),
            sessions: RwLock::new(HashMap::new()),
            session_ttl: config.session_ttl,
        }
    }

    async fn prune_sessions(&self) {
        let now = Utc::now();
        self.sessions.write().await.retain(|_, session| session.expires_at > now);
    }

    /// Replaces a legacy plaintext PIN with its hash. Losing the race to another write is harmless.
    async fn upgrade_legacy_pin(&self, admin: &Driver, pin: &str) {
        let result = async {
            let hashed = self.authenticator.hash_pin(pin).await?;
            let data = self.store.load().await?;
            let drivers = data
                .drivers
                .iter()
                .map(|d| if d.id == admin.id { Driver { pin: hashed.clone(), ..d.clone() } } else { d.clone() })
                .collect();
            self.store.commit(FleetChanges::drivers(drivers), data.revision).await
        }
        .await;

        match result {
            Ok(_) => tracing::info!("Upgraded stored PIN of {} to a bcrypt hash", admin.name),
            Err(e) => tracing::warn!("Could not upgrade PIN of {}: {}", admin.name, e),
        }
    }
}

#[async_trait]
impl AuthOperations for AuthService {
    async fn login(&self, pin: &str, client: &str) -> FleetResult<AdminSession> {
        let attempt = self.limiter.acquire(client).await?;
        self.prune_sessions().await;

        let data = self.store.load().await?;
        if data.drivers.is_empty() {
            return Err(FleetError::ServiceUnavailable("no drivers registered".to_string()));
        }

        let admin = if is_valid_pin_format(pin) {
            self.authenticator.verify(&data.drivers, pin).await?
        } else {
            None
        };

        let Some(admin) = admin else {
            tracing::warn!("Rejected admin PIN from {} ({} recent failures)", client, attempt);
            return Err(FleetError::InvalidPin);
        };

        self.limiter.reset(client).await;
        if !admin.has_hashed_pin() {
            self.upgrade_legacy_pin(&admin, pin).await;
        }

        let ttl = chrono::Duration::from_std(self.session_ttl).unwrap_or(chrono::Duration::hours(12));
        let session = AdminSession {
            token: nanoid::nanoid!(32),
            driver_id: admin.id.clone(),
            driver_name: admin.name.clone(),
            expires_at: Utc::now() + ttl,
        };
        self.sessions.write().await.insert(session.token.clone(), session.clone());

        tracing::info!("Admin session opened for {}", admin.name);
        Ok(session)
    }

    async fn validate_session(&self, token: &str) -> FleetResult<AdminSession> {
        let session = self.sessions.read().await.get(token).cloned();
        match session {
            Some(session) if session.expires_at > Utc::now() => Ok(session),
            Some(_) => {
                self.sessions.write().await.remove(token);
                tracing::debug!("Admin session expired");
                Err(FleetError::SessionExpired)
            }
            None => Err(FleetError::SessionExpired),
        }
    }

    async fn logout(&self, token: &str) -> FleetResult<()> {
        if let Some(session) = self.sessions.write().await.remove(token) {
            tracing::info!("Admin session closed for {}", session.driver_name);
        }
        Ok(())
    }
}
