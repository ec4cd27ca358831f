//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor and
//! cloned into every websocket task. It holds the one `SessionState` behind
//! an exclusive async mutex, the connection registry, the auth gate, and
//! the two storage collaborators as trait objects so tests can swap in
//! in-memory doubles.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::config::Config;
use crate::services::attendance::AttendanceStore;
use crate::services::auth::AuthGate;
use crate::services::classes::ClassRepository;
use crate::services::registry::ConnectionRegistry;
use crate::services::session::SessionState;

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; all inner fields are Arc-wrapped or Clone.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthGate,
    pub registry: ConnectionRegistry,
    /// The current attendance session. Every read and write goes through this lock.
    pub session: Arc<Mutex<SessionState>>,
    pub classes: Arc<dyn ClassRepository>,
    pub store: Arc<dyn AttendanceStore>,
    /// Upper bound on the close-time batch insert.
    pub persist_timeout: Duration,
    /// Capacity of each connection's outbound queue.
    pub client_queue_capacity: usize,
}

impl AppState {
    #[must_use]
    pub fn new(config: &Config, classes: Arc<dyn ClassRepository>, store: Arc<dyn AttendanceStore>) -> Self {
        Self {
            auth: AuthGate::new(&config.jwt_secret),
            registry: ConnectionRegistry::new(),
            session: Arc::new(Mutex::new(SessionState::new())),
            classes,
            store,
            persist_timeout: config.persist_timeout,
            client_queue_capacity: config.client_queue_capacity,
        }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
