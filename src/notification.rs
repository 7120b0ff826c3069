//! Notifications exchanged over the room's realtime data channel.
//!
//! Payloads are UTF-8 JSON objects tagged with a `type` field.

use crate::error::NotifyError;
use async_trait::async_trait;
use livekit::id::ParticipantIdentity;
use livekit::prelude::LocalParticipant;
use livekit::DataPacket;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationType {
    RoleChanged,
    ParticipantMuted,
    Other(String),
}

impl NotificationType {
    pub fn as_str(&self) -> &str {
        match self {
            NotificationType::RoleChanged => "RoleChanged",
            NotificationType::ParticipantMuted => "ParticipantMuted",
            NotificationType::Other(other) => other,
        }
    }
}

impl From<&str> for NotificationType {
    fn from(value: &str) -> Self {
        match value {
            "RoleChanged" => NotificationType::RoleChanged,
            "ParticipantMuted" => NotificationType::ParticipantMuted,
            other => NotificationType::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "type")]
    kind: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Notification {
    pub fn new(kind: NotificationType) -> Self {
        Notification {
            kind: kind.as_str().to_string(),
            payload: Map::new(),
        }
    }

    pub fn notification_type(&self) -> NotificationType {
        NotificationType::from(self.kind.as_str())
    }

    pub fn encode(&self) -> Result<Vec<u8>, NotifyError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Decodes one data-channel payload. Anything that is not a JSON object
/// with a string `type` yields `None`.
pub fn decode_notification(payload: &[u8]) -> Option<Notification> {
    match serde_json::from_slice::<Notification>(payload) {
        Ok(notification) => Some(notification),
        Err(e) => {
            debug!("Ignoring undecodable data payload: {}", e);
            None
        }
    }
}

/// Sends notifications to other participants.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        notification: &Notification,
        destination_identities: &[String],
    ) -> Result<(), NotifyError>;
}

#[async_trait]
impl Notifier for LocalParticipant {
    async fn notify(
        &self,
        notification: &Notification,
        destination_identities: &[String],
    ) -> Result<(), NotifyError> {
        let packet = DataPacket {
            payload: notification.encode()?,
            reliable: true,
            destination_identities: destination_identities
                .iter()
                .cloned()
                .map(ParticipantIdentity::from)
                .collect(),
            ..Default::default()
        };

        self.publish_data(packet)
            .await
            .map_err(|e| NotifyError::Publish(e.to_string()))
    }
}
