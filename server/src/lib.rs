//! Sabong arena server.
//!
//! [`Service`] owns the arena behind one mutex together with the event hub
//! and the `lastcall` countdown, so every command, the events it emits and
//! any countdown change happen in a single critical section. [`Api`] exposes
//! it over HTTP and a websocket observer stream.

use sabong_execution::{Actor, Arena, ArenaError, Countdown, Store, Value};
use sabong_types::{
    api::LoginResponse, Envelope, Role, UserId, Viewer,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{info, warn};

pub mod api;
pub mod auth;
pub mod config;
pub mod countdown;
pub mod hub;
pub mod metrics;
pub mod persistence;

#[cfg(test)]
mod service_tests;

pub use api::Api;
pub use auth::{AuthError, Sessions};
pub use config::{ConfigError, ServerConfig, StaffAccount};
pub use metrics::{WsMetrics, WsMetricsSnapshot};
pub use persistence::SqliteStore;

use countdown::Countdowns;
use hub::Hub;

pub type ArenaStore = Box<dyn Store>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Arena(#[from] ArenaError),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

struct Core {
    arena: Arena<ArenaStore>,
    hub: Hub,
    countdowns: Countdowns,
}

impl Core {
    /// Publishes everything the last command queued. Any phase change ends
    /// the running countdown.
    fn flush(&mut self) {
        for event in self.arena.drain_events() {
            if event.phase().is_some() {
                self.countdowns.cancel();
            }
            self.hub.publish(event);
        }
    }
}

pub struct Service {
    core: Mutex<Core>,
    sessions: Sessions,
    metrics: WsMetrics,
    config: ServerConfig,
}

impl Service {
    pub fn new(store: ArenaStore, rows: Vec<Value>, config: ServerConfig) -> Self {
        let arena = Arena::restore(store, config.arena.clone(), rows);
        let hub = Hub::new(config.broadcast_buffer);
        Self {
            core: Mutex::new(Core {
                arena,
                hub,
                countdowns: Countdowns::default(),
            }),
            sessions: Sessions::default(),
            metrics: WsMetrics::default(),
            config,
        }
    }

    /// Opens the configured database (or an in-memory one) and creates any
    /// missing staff accounts.
    pub fn open(config: ServerConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let (store, rows) = match &config.database_path {
            Some(path) => {
                let (store, rows) = SqliteStore::open(path)?;
                info!(path = %path.display(), rows = rows.len(), "arena database loaded");
                (store, rows)
            }
            None => {
                warn!("no database path configured; state is kept in memory only");
                (SqliteStore::open_in_memory()?, Vec::new())
            }
        };
        let service = Self::new(Box::new(store), rows, config);
        service.bootstrap_staff()?;
        Ok(service)
    }

    pub fn bootstrap_staff(&self) -> anyhow::Result<()> {
        for account in &self.config.staff {
            if self.read(|arena| arena.account_by_name(&account.username).is_some()) {
                continue;
            }
            let credential = auth::hash_password(&account.password)?;
            let created = self.execute(|arena| {
                arena.register(&account.username, credential, account.role, now_ms())
            })?;
            info!(user = %created.id, username = %created.username, role = created.role.as_str(), "staff account created");
        }
        Ok(())
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn sessions(&self) -> &Sessions {
        &self.sessions
    }

    pub fn ws_metrics(&self) -> &WsMetrics {
        &self.metrics
    }

    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs one arena command and publishes the events it produced, even when
    /// the command failed (a blocked settlement still reports itself).
    pub fn execute<T>(
        &self,
        command: impl FnOnce(&mut Arena<ArenaStore>) -> sabong_execution::Result<T>,
    ) -> sabong_execution::Result<T> {
        let mut core = self.lock();
        let result = command(&mut core.arena);
        core.flush();
        result
    }

    pub fn read<T>(&self, query: impl FnOnce(&Arena<ArenaStore>) -> T) -> T {
        query(&self.lock().arena)
    }

    /// Starts a `lastcall` countdown that closes betting when it runs out.
    pub fn last_call(
        self: &Arc<Self>,
        actor: &Actor,
        seconds: Option<u32>,
    ) -> sabong_execution::Result<Countdown> {
        let mut core = self.lock();
        let result = core.arena.last_call(actor, seconds, now_ms());
        core.flush();
        if let Ok(countdown) = &result {
            let epoch = countdown.epoch;
            let service = Arc::downgrade(self);
            core.countdowns.start(
                epoch,
                Duration::from_secs(u64::from(countdown.seconds)),
                move || {
                    if let Some(service) = service.upgrade() {
                        service.expire_last_call(epoch);
                    }
                },
            );
        }
        result
    }

    fn expire_last_call(&self, epoch: u64) {
        let mut core = self.lock();
        core.countdowns.finish(epoch);
        match core.arena.expire_last_call(epoch) {
            Ok(true) => info!(epoch, "last call expired; betting closed"),
            Ok(false) => {}
            Err(err) => warn!(epoch, %err, "failed to close betting after last call"),
        }
        core.flush();
    }

    /// A snapshot for `viewer` plus a receiver positioned right after it.
    pub fn subscribe(&self, viewer: &Viewer) -> (Envelope, broadcast::Receiver<Arc<Envelope>>) {
        let core = self.lock();
        let receiver = core.hub.subscribe();
        let snapshot = core.arena.snapshot(viewer);
        (hub::snapshot_envelope(core.hub.seq(), snapshot), receiver)
    }

    pub fn snapshot(&self, viewer: &Viewer) -> Envelope {
        let core = self.lock();
        hub::snapshot_envelope(core.hub.seq(), core.arena.snapshot(viewer))
    }

    pub fn observers(&self) -> usize {
        self.lock().hub.observers()
    }

    // Identity

    pub fn register(&self, username: &str, password: &str) -> Result<LoginResponse, ServiceError> {
        auth::validate_password(password)?;
        let credential = auth::hash_password(password)?;
        let account =
            self.execute(|arena| arena.register(username, credential, Role::Bettor, now_ms()))?;
        let token = self.sessions.issue(account.id);
        Ok(LoginResponse {
            token,
            account: account.view(),
        })
    }

    pub fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ServiceError> {
        let account = self
            .read(|arena| arena.account_by_name(username).cloned())
            .ok_or(AuthError::InvalidCredentials)?;
        if !auth::verify_password(password, &account.credential) {
            return Err(AuthError::InvalidCredentials.into());
        }
        if account.disabled {
            return Err(AuthError::Disabled.into());
        }
        let token = self.sessions.issue(account.id);
        info!(user = %account.id, role = account.role.as_str(), "login");
        Ok(LoginResponse {
            token,
            account: account.view(),
        })
    }

    pub fn logout(&self, token: &str) -> bool {
        self.sessions.revoke(token)
    }

    /// Resolves a bearer token to the caller, rejecting disabled accounts.
    pub fn authenticate(&self, token: &str) -> Result<Actor, AuthError> {
        let user = self.sessions.resolve(token).ok_or(AuthError::Unauthorized)?;
        let account = self.read(|arena| arena.account(user).map(|a| (a.role, a.disabled)));
        match account {
            Some((_, true)) => {
                self.sessions.revoke_user(user);
                Err(AuthError::Disabled)
            }
            Some((role, false)) => Ok(Actor { id: user, role }),
            None => Err(AuthError::Unauthorized),
        }
    }

    /// Disables or re-enables an account; disabling also ends its sessions.
    pub fn set_disabled(
        &self,
        actor: &Actor,
        user: UserId,
        disabled: bool,
    ) -> sabong_execution::Result<sabong_execution::Account> {
        let account = self.execute(|arena| arena.set_disabled(actor, user, disabled))?;
        if disabled {
            let revoked = self.sessions.revoke_user(user);
            info!(user = %user, revoked, "sessions revoked");
        }
        Ok(account)
    }
}
