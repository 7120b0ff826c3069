use livekit::participant::ParticipantKind;
use livekit::prelude::{LocalParticipant, RemoteParticipant, TrackSource};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Connection descriptor for the media server, handed out by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiLiveKit {
    pub url: String,
    pub room: String,
    pub token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiAccessLevel {
    Public,
    Trusted,
    Restricted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiAccessRole {
    Member,
    Administrator,
    Owner,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiUser {
    pub id: String,
    pub email: String,
    pub full_name: Option<String>,
    pub short_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResourceAccess {
    pub id: String,
    pub user: ApiUser,
    pub resource: String,
    pub role: ApiAccessRole,
}

/// Room as served by `GET rooms/{slug}/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiRoom {
    pub id: String,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub pin_code: Option<String>,
    pub is_administrable: bool,
    pub is_owner: bool,
    pub access_level: ApiAccessLevel,
    #[serde(default)]
    pub livekit: Option<ApiLiveKit>,
    #[serde(default)]
    pub configuration: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    pub accesses: Option<Vec<ApiResourceAccess>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantPermissions {
    pub can_subscribe: bool,
    pub can_publish: bool,
    pub can_publish_data: bool,
    pub can_update_metadata: bool,
    pub can_subscribe_metrics: bool,
    pub can_publish_sources: Vec<String>,
}

/// Read-only snapshot of a room participant.
#[derive(Debug, Clone)]
pub struct ParticipantInfo {
    pub identity: String,
    pub name: String,
    pub is_local: bool,
    pub is_speaking: bool,
    pub audio_level: f32,
    pub kind: ParticipantKind,
    pub attributes: HashMap<String, String>,
    pub microphone_track_sid: Option<String>,
    pub permissions: Option<ParticipantPermissions>,
}

impl ParticipantInfo {
    pub fn new(identity: impl Into<String>) -> Self {
        ParticipantInfo {
            identity: identity.into(),
            name: String::new(),
            is_local: false,
            is_speaking: false,
            audio_level: 0.0,
            kind: ParticipantKind::Standard,
            attributes: HashMap::new(),
            microphone_track_sid: None,
            permissions: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_microphone(mut self, track_sid: impl Into<String>) -> Self {
        self.microphone_track_sid = Some(track_sid.into());
        self
    }
}

impl From<&RemoteParticipant> for ParticipantInfo {
    fn from(participant: &RemoteParticipant) -> Self {
        let microphone_track_sid = participant
            .track_publications()
            .values()
            .find(|publication| publication.source() == TrackSource::Microphone)
            .map(|publication| publication.sid().as_str().to_string());

        ParticipantInfo {
            identity: participant.identity().to_string(),
            name: participant.name(),
            is_local: false,
            is_speaking: participant.is_speaking(),
            audio_level: participant.audio_level(),
            kind: participant.kind(),
            attributes: participant.attributes(),
            microphone_track_sid,
            permissions: None,
        }
    }
}

impl From<&LocalParticipant> for ParticipantInfo {
    fn from(participant: &LocalParticipant) -> Self {
        let microphone_track_sid = participant
            .track_publications()
            .values()
            .find(|publication| publication.source() == TrackSource::Microphone)
            .map(|publication| publication.sid().as_str().to_string());

        ParticipantInfo {
            identity: participant.identity().to_string(),
            name: participant.name(),
            is_local: true,
            is_speaking: participant.is_speaking(),
            audio_level: participant.audio_level(),
            kind: ParticipantKind::Standard,
            attributes: participant.attributes(),
            microphone_track_sid,
            permissions: None,
        }
    }
}

#[derive(Debug)]
pub struct RoomInfo {
    pub local_participant: ParticipantInfo,
    pub remote_participants: Vec<ParticipantInfo>,
}

impl RoomInfo {
    pub fn from_room(room: &livekit::Room) -> Self {
        let mut remote_participants: Vec<ParticipantInfo> = room
            .remote_participants()
            .values()
            .map(ParticipantInfo::from)
            .collect();
        remote_participants.sort_by(|a, b| a.identity.cmp(&b.identity));

        RoomInfo {
            local_participant: ParticipantInfo::from(&room.local_participant()),
            remote_participants,
        }
    }

    pub fn find(&self, identity: &str) -> Option<&ParticipantInfo> {
        std::iter::once(&self.local_participant)
            .chain(self.remote_participants.iter())
            .find(|participant| participant.identity == identity)
    }
}
