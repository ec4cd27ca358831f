use super::*;
use crate::services::auth::Role;
use serde_json::json;
use tokio::time::{Duration, timeout};

fn teacher() -> Identity {
    Identity { user_id: Uuid::new_v4(), role: Role::Teacher }
}

fn student() -> Identity {
    Identity { user_id: Uuid::new_v4(), role: Role::Student }
}

fn ping() -> Envelope {
    Envelope::new("TODAY_SUMMARY", json!({"present": 0, "absent": 0, "total": 0}))
}

async fn recv(rx: &mut mpsc::Receiver<Envelope>) -> Envelope {
    timeout(Duration::from_millis(200), rx.recv())
        .await
        .expect("receive timed out")
        .expect("channel closed unexpectedly")
}

#[tokio::test]
async fn broadcast_reaches_every_registered_connection() {
    let registry = ConnectionRegistry::new();
    let mut receivers = Vec::new();
    for identity in [teacher(), student(), student()] {
        let (tx, rx) = mpsc::channel(8);
        registry.register(Uuid::new_v4(), identity, tx).await;
        receivers.push(rx);
    }

    assert_eq!(registry.broadcast(&ping()).await, 3);
    for rx in &mut receivers {
        assert_eq!(recv(rx).await.event, "TODAY_SUMMARY");
    }
}

#[tokio::test]
async fn broadcast_skips_unregistered_connection() {
    let registry = ConnectionRegistry::new();
    let gone = Uuid::new_v4();
    let (gone_tx, mut gone_rx) = mpsc::channel(8);
    let (stay_tx, mut stay_rx) = mpsc::channel(8);
    registry.register(gone, student(), gone_tx).await;
    registry.register(Uuid::new_v4(), student(), stay_tx).await;

    assert!(registry.unregister(gone).await.is_some());
    assert_eq!(registry.broadcast(&ping()).await, 1);

    assert_eq!(recv(&mut stay_rx).await.event, "TODAY_SUMMARY");
    assert!(gone_rx.try_recv().is_err());
}

#[tokio::test]
async fn failing_send_does_not_stop_delivery_to_others() {
    let registry = ConnectionRegistry::new();

    // Closed receiver: the socket task has already exited.
    let (closed_tx, closed_rx) = mpsc::channel(8);
    drop(closed_rx);
    registry.register(Uuid::new_v4(), student(), closed_tx).await;

    // Full queue: a slow client.
    let (full_tx, _full_rx) = mpsc::channel(1);
    full_tx.try_send(ping()).unwrap();
    registry.register(Uuid::new_v4(), student(), full_tx).await;

    let (ok_tx, mut ok_rx) = mpsc::channel(8);
    registry.register(Uuid::new_v4(), teacher(), ok_tx).await;

    assert_eq!(registry.broadcast(&ping()).await, 1);
    assert_eq!(recv(&mut ok_rx).await.event, "TODAY_SUMMARY");
}

#[tokio::test]
async fn unicast_targets_one_connection() {
    let registry = ConnectionRegistry::new();
    let target = Uuid::new_v4();
    let (target_tx, mut target_rx) = mpsc::channel(8);
    let (other_tx, mut other_rx) = mpsc::channel(8);
    registry.register(target, student(), target_tx).await;
    registry.register(Uuid::new_v4(), student(), other_tx).await;

    assert!(registry.unicast(target, Envelope::new("MY_ATTENDANCE", json!({"status": "present"}))).await);
    assert_eq!(recv(&mut target_rx).await.event, "MY_ATTENDANCE");
    assert!(other_rx.try_recv().is_err());
}

#[tokio::test]
async fn unicast_to_unknown_connection_is_false() {
    let registry = ConnectionRegistry::new();
    assert!(!registry.unicast(Uuid::new_v4(), ping()).await);
}

#[tokio::test]
async fn unregister_returns_identity_once() {
    let registry = ConnectionRegistry::new();
    let id = Uuid::new_v4();
    let identity = teacher();
    let (tx, _rx) = mpsc::channel(8);
    registry.register(id, identity, tx).await;
    assert_eq!(registry.connection_count().await, 1);

    assert_eq!(registry.unregister(id).await, Some(identity));
    assert_eq!(registry.unregister(id).await, None);
    assert_eq!(registry.connection_count().await, 0);
}

#[tokio::test]
async fn concurrent_join_leave_during_broadcast_is_safe() {
    let registry = ConnectionRegistry::new();
    let (tx, mut rx) = mpsc::channel(256);
    registry.register(Uuid::new_v4(), teacher(), tx).await;

    let churn = {
        let registry = registry.clone();
        tokio::spawn(async move {
            for _ in 0..100 {
                let id = Uuid::new_v4();
                let (tx, _rx) = mpsc::channel(1);
                registry.register(id, student(), tx).await;
                registry.unregister(id).await;
            }
        })
    };
    for _ in 0..50 {
        registry.broadcast(&ping()).await;
    }
    churn.await.expect("churn task should finish");

    let mut received = 0;
    while rx.try_recv().is_ok() {
        received += 1;
    }
    assert_eq!(received, 50);
}
