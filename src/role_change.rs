//! Refetches room data when the backend announces a role change.

use crate::notification::{decode_notification, NotificationType};
use crate::room_cache::RoomInvalidator;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use livekit::RoomEvent;
use log::{debug, info};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Listens for `RoleChanged` notifications while alive. Dropping it
/// unsubscribes.
pub struct RoleChangeListener {
    room_id: String,
    task: JoinHandle<()>,
}

impl RoleChangeListener {
    pub fn spawn<S>(room_id: &str, payloads: S, invalidator: Arc<dyn RoomInvalidator>) -> Self
    where
        S: Stream<Item = Bytes> + Send + 'static,
    {
        let task = tokio::spawn(listen(room_id.to_string(), payloads, invalidator));
        info!("Listening for role changes in room {}", room_id);

        RoleChangeListener {
            room_id: room_id.to_string(),
            task,
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn is_listening(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for RoleChangeListener {
    fn drop(&mut self) {
        debug!("Stopped listening for role changes in room {}", self.room_id);
        self.task.abort();
    }
}

async fn listen<S>(room_id: String, payloads: S, invalidator: Arc<dyn RoomInvalidator>)
where
    S: Stream<Item = Bytes> + Send + 'static,
{
    tokio::pin!(payloads);

    while let Some(payload) = payloads.next().await {
        let Some(notification) = decode_notification(&payload) else {
            continue;
        };

        if notification.notification_type() == NotificationType::RoleChanged {
            info!("Role changed in room {}", room_id);
            invalidator.invalidate_room(&room_id);
        }
    }
}

/// Data-channel payloads carried by a LiveKit room event receiver.
pub fn data_payloads(room_events: UnboundedReceiver<RoomEvent>) -> impl Stream<Item = Bytes> {
    UnboundedReceiverStream::new(room_events).filter_map(|event| async move {
        match event {
            RoomEvent::DataReceived { payload, .. } => Some(Bytes::copy_from_slice(&payload)),
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct RecordingInvalidator {
        invalidated: Mutex<Vec<String>>,
    }

    impl RoomInvalidator for RecordingInvalidator {
        fn invalidate_room(&self, room_id: &str) {
            self.invalidated.lock().unwrap().push(room_id.to_string());
        }
    }

    fn listener(
        room_id: &str,
    ) -> (
        mpsc::UnboundedSender<Bytes>,
        Arc<RecordingInvalidator>,
        RoleChangeListener,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let invalidator = Arc::new(RecordingInvalidator::default());
        let listener =
            RoleChangeListener::spawn(room_id, UnboundedReceiverStream::new(rx), invalidator.clone());
        (tx, invalidator, listener)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn role_changed_invalidates_room_once() {
        let (tx, invalidator, _listener) = listener("room-42");

        tx.send(Bytes::from_static(br#"{"type":"RoleChanged"}"#)).unwrap();
        settle().await;

        assert_eq!(*invalidator.invalidated.lock().unwrap(), vec!["room-42"]);
    }

    #[tokio::test]
    async fn other_and_garbage_payloads_are_ignored() {
        let (tx, invalidator, listener) = listener("room-42");

        tx.send(Bytes::from_static(br#"{"type":"ParticipantMuted"}"#)).unwrap();
        tx.send(Bytes::from_static(br#"{"type":"roleChanged"}"#)).unwrap();
        tx.send(Bytes::from_static(b"\x00\x01garbage")).unwrap();
        tx.send(Bytes::from_static(b"{}")).unwrap();
        settle().await;

        assert!(invalidator.invalidated.lock().unwrap().is_empty());
        assert!(listener.is_listening());
    }

    #[tokio::test]
    async fn each_role_change_is_one_invalidation() {
        let (tx, invalidator, _listener) = listener("room-42");

        tx.send(Bytes::from_static(br#"{"type":"RoleChanged"}"#)).unwrap();
        tx.send(Bytes::from_static(br#"{"type":"HandRaised"}"#)).unwrap();
        tx.send(Bytes::from_static(br#"{"type":"RoleChanged","identity":"ada"}"#))
            .unwrap();
        settle().await;

        assert_eq!(invalidator.invalidated.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn dropped_listener_stops_invalidating() {
        let (tx, invalidator, listener) = listener("room-42");
        drop(listener);
        settle().await;

        // The receiver went away with the aborted task.
        let sent = tx.send(Bytes::from_static(br#"{"type":"RoleChanged"}"#));
        settle().await;

        assert!(sent.is_err());
        assert!(invalidator.invalidated.lock().unwrap().is_empty());
    }
}
