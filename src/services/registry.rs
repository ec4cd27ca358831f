//! Connection registry — live websocket connections and fan-out.
//!
//! DESIGN
//! ======
//! Each connection owns a bounded `mpsc` queue drained by its socket task.
//! The registry maps connection IDs to the queue sender plus the identity
//! attached at connect time.
//!
//! `broadcast` clones the senders under the read lock and delivers after
//! releasing it, so register/unregister never wait on delivery and a
//! connection leaving mid-broadcast only causes its own send to be skipped.
//! Delivery uses `try_send`: a full or closed queue is logged and skipped,
//! never retried, and never stops delivery to the rest.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::event::Envelope;
use crate::services::auth::Identity;

struct Connection {
    identity: Identity,
    tx: mpsc::Sender<Envelope>,
}

#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<Uuid, Connection>>>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, connection_id: Uuid, identity: Identity, tx: mpsc::Sender<Envelope>) {
        self.inner
            .write()
            .await
            .insert(connection_id, Connection { identity, tx });
    }

    /// Remove a connection. Returns its identity if it was registered.
    pub async fn unregister(&self, connection_id: Uuid) -> Option<Identity> {
        self.inner
            .write()
            .await
            .remove(&connection_id)
            .map(|conn| conn.identity)
    }

    /// Deliver to every registered connection. Returns how many accepted it.
    pub async fn broadcast(&self, envelope: &Envelope) -> usize {
        let targets: Vec<(Uuid, mpsc::Sender<Envelope>)> = {
            let conns = self.inner.read().await;
            conns.iter().map(|(id, conn)| (*id, conn.tx.clone())).collect()
        };

        let mut delivered = 0;
        for (connection_id, tx) in targets {
            if deliver(connection_id, &tx, envelope.clone()) {
                delivered += 1;
            }
        }
        debug!(event = %envelope.event, delivered, "registry: broadcast");
        delivered
    }

    /// Deliver to exactly one connection. `false` if it is gone or its queue is full.
    pub async fn unicast(&self, connection_id: Uuid, envelope: Envelope) -> bool {
        let tx = {
            let conns = self.inner.read().await;
            let Some(conn) = conns.get(&connection_id) else {
                debug!(%connection_id, event = %envelope.event, "registry: unicast to unknown connection");
                return false;
            };
            conn.tx.clone()
        };
        deliver(connection_id, &tx, envelope)
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.len()
    }
}

fn deliver(connection_id: Uuid, tx: &mpsc::Sender<Envelope>, envelope: Envelope) -> bool {
    match tx.try_send(envelope) {
        Ok(()) => true,
        Err(TrySendError::Full(envelope)) => {
            warn!(%connection_id, event = %envelope.event, "registry: client queue full; dropping envelope");
            false
        }
        Err(TrySendError::Closed(envelope)) => {
            debug!(%connection_id, event = %envelope.event, "registry: client queue closed; skipping");
            false
        }
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
