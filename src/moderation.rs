//! Privileged participant actions: promote, demote, mute, remove and
//! lower-hand.
//!
//! Every action reads the current room from the shared room store and fails
//! with [`ModerationError::RoomUnavailable`] before any request when it has
//! not been fetched yet. One action is one round trip; there is no retry and
//! nothing local changes on failure.

use crate::api::{post_json_with_token, ApiClient};
use crate::error::{ApiError, ModerationError};
use crate::model::{ApiLiveKit, ApiRoom, ParticipantInfo};
use crate::notification::{Notification, NotificationType, Notifier};
use crate::participant::{resolve_hand_raised_at, ATTR_HAND_RAISED_AT};
use crate::store::Store;
use futures::future::try_join_all;
use log::{info, warn};
use reqwest::{Client, Url};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

const UPDATE_PARTICIPANT_RPC: &str = "twirp/livekit.RoomService/UpdateParticipant";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishSource {
    Camera,
    Microphone,
    ScreenShare,
    ScreenShareAudio,
}

impl PublishSource {
    pub fn as_wire(&self) -> &'static str {
        match self {
            PublishSource::Camera => "CAMERA",
            PublishSource::Microphone => "MICROPHONE",
            PublishSource::ScreenShare => "SCREEN_SHARE",
            PublishSource::ScreenShareAudio => "SCREEN_SHARE_AUDIO",
        }
    }
}

pub struct ModerationClient {
    api: ApiClient,
    http_client: Client,
    room: Store<Option<ApiRoom>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl ModerationClient {
    pub fn new(api: ApiClient, room: Store<Option<ApiRoom>>) -> Self {
        ModerationClient {
            api,
            http_client: Client::new(),
            room,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    fn room_id(&self) -> Result<String, ModerationError> {
        self.room
            .read(|room| room.as_ref().map(|room| room.id.clone()))
            .filter(|id| !id.is_empty())
            .ok_or(ModerationError::RoomUnavailable)
    }

    fn media_backend(&self) -> Result<ApiLiveKit, ModerationError> {
        self.room
            .read(|room| room.as_ref().and_then(|room| room.livekit.clone()))
            .ok_or(ModerationError::MediaBackendUnavailable)
    }

    async fn post_identity(&self, verb: &str, participant: &ParticipantInfo) -> Result<(), ModerationError> {
        let room_id = self.room_id()?;
        info!("{} participant {} in room {}", verb, participant.identity, room_id);

        self.api
            .post_json(
                &format!("rooms/{room_id}/{verb}-participant/"),
                &json!({ "participant_identity": participant.identity }),
            )
            .await?;
        Ok(())
    }

    pub async fn promote(&self, participant: &ParticipantInfo) -> Result<(), ModerationError> {
        self.post_identity("promote", participant).await
    }

    pub async fn demote(&self, participant: &ParticipantInfo) -> Result<(), ModerationError> {
        self.post_identity("demote", participant).await
    }

    pub async fn remove(&self, participant: &ParticipantInfo) -> Result<(), ModerationError> {
        self.post_identity("remove", participant).await
    }

    /// Mutes the participant's microphone. Returns `false` without any
    /// request when the participant publishes no microphone.
    pub async fn mute(&self, participant: &ParticipantInfo) -> Result<bool, ModerationError> {
        let room_id = self.room_id()?;

        let Some(track_sid) = participant.microphone_track_sid.as_deref() else {
            info!("Participant {} has no microphone to mute", participant.identity);
            return Ok(false);
        };

        self.api
            .post_json(
                &format!("rooms/{room_id}/mute-participant/"),
                &json!({
                    "participant_identity": participant.identity,
                    "track_sid": track_sid,
                }),
            )
            .await?;

        if let Some(notifier) = &self.notifier {
            notifier
                .notify(
                    &Notification::new(NotificationType::ParticipantMuted),
                    std::slice::from_ref(&participant.identity),
                )
                .await?;
        }

        Ok(true)
    }

    /// Mutes every participant concurrently, failing with the first error.
    /// Returns how many microphones were muted.
    pub async fn mute_all(&self, participants: &[ParticipantInfo]) -> Result<usize, ModerationError> {
        self.room_id()?;

        let muted = try_join_all(participants.iter().map(|p| self.mute(p))).await?;
        Ok(muted.into_iter().filter(|muted| *muted).count())
    }

    /// Clears the raised hand by resending the participant's attributes with
    /// an empty `handRaisedAt`.
    ///
    /// The attributes are a snapshot taken now; a change made by someone else
    /// before the request lands is overwritten.
    pub async fn lower_hand(&self, participant: &ParticipantInfo) -> Result<(), ModerationError> {
        let room_id = self.room_id()?;

        self.api
            .post_json(
                &format!("rooms/{room_id}/update-participant/"),
                &json!({
                    "participant_identity": participant.identity,
                    "attributes": lowered_hand_attributes(&participant.attributes),
                }),
            )
            .await?;
        Ok(())
    }

    /// Lowers every raised hand. Returns how many hands were lowered.
    pub async fn lower_all_hands(
        &self,
        participants: &[ParticipantInfo],
    ) -> Result<usize, ModerationError> {
        self.room_id()?;

        let raised: Vec<&ParticipantInfo> = participants
            .iter()
            .filter(|p| resolve_hand_raised_at(&p.attributes).is_some())
            .collect();

        try_join_all(raised.iter().map(|p| self.lower_hand(p))).await?;
        Ok(raised.len())
    }

    /// Same as [`Self::lower_hand`] but through the media server's own
    /// participant API, using the room's connection descriptor.
    pub async fn lower_hand_via_media_backend(
        &self,
        participant: &ParticipantInfo,
    ) -> Result<(), ModerationError> {
        let livekit = self.media_backend()?;
        let url = server_api_url(&livekit.url, UPDATE_PARTICIPANT_RPC)?;

        let mut body = Map::new();
        body.insert("room".into(), json!(livekit.room));
        body.insert("identity".into(), json!(participant.identity));
        body.insert(
            "attributes".into(),
            json!(lowered_hand_attributes(&participant.attributes)),
        );
        if let Some(permissions) = &participant.permissions {
            body.insert("permission".into(), json!(permissions));
        }

        post_json_with_token(&self.http_client, url, &livekit.token, &Value::Object(body)).await?;
        Ok(())
    }

    /// Replaces the participant's publish permission with `sources`.
    pub async fn update_permissions(
        &self,
        participant: &ParticipantInfo,
        sources: &[PublishSource],
    ) -> Result<(), ModerationError> {
        let room_id = self.room_id()?;
        let current = participant.permissions.as_ref();

        let permission = json!({
            "can_subscribe": current.map(|p| p.can_subscribe),
            "can_publish_data": current.map(|p| p.can_publish_data),
            "can_update_metadata": current.map(|p| p.can_update_metadata),
            "can_subscribe_metrics": current.map(|p| p.can_subscribe_metrics),
            "can_publish": !sources.is_empty(),
            "can_publish_sources": sources.iter().map(PublishSource::as_wire).collect::<Vec<_>>(),
        });

        self.api
            .post_json(
                &format!("rooms/{room_id}/update-participant/"),
                &json!({
                    "participant_identity": participant.identity,
                    "permission": permission,
                }),
            )
            .await?;
        Ok(())
    }

    pub async fn update_permissions_all(
        &self,
        participants: &[ParticipantInfo],
        sources: &[PublishSource],
    ) -> Result<(), ModerationError> {
        self.room_id()?;
        try_join_all(participants.iter().map(|p| self.update_permissions(p, sources))).await?;
        Ok(())
    }
}

fn lowered_hand_attributes(attributes: &HashMap<String, String>) -> HashMap<String, String> {
    let mut lowered = attributes.clone();
    lowered.insert(ATTR_HAND_RAISED_AT.to_string(), String::new());
    lowered
}

/// Maps the media server's websocket url to its HTTP API endpoint.
fn server_api_url(livekit_url: &str, path: &str) -> Result<Url, ApiError> {
    let http_url = if let Some(rest) = livekit_url.strip_prefix("wss://") {
        format!("https://{rest}")
    } else if let Some(rest) = livekit_url.strip_prefix("ws://") {
        format!("http://{rest}")
    } else {
        livekit_url.to_string()
    };

    let base = if http_url.ends_with('/') {
        http_url
    } else {
        format!("{http_url}/")
    };

    let url = Url::parse(&base)
        .and_then(|base| base.join(path))
        .map_err(|e| ApiError::InvalidUrl(format!("{livekit_url}: {e}")))?;

    if url.scheme() != "https" {
        warn!("Media server API is not using TLS: {}", url);
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NotifyError;
    use crate::room_cache::tests::room;
    use async_trait::async_trait;
    use axum::body::Bytes;
    use axum::http::{HeaderMap, Method, StatusCode, Uri};
    use axum::Router;
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    struct Recorded {
        method: Method,
        path: String,
        authorization: Option<String>,
        body: Value,
    }

    struct MockBackend {
        base_url: String,
        requests: Arc<Mutex<Vec<Recorded>>>,
    }

    impl MockBackend {
        async fn start(status: StatusCode) -> Self {
            let requests = Arc::new(Mutex::new(Vec::new()));
            let recorder = Arc::clone(&requests);

            let app = Router::new().fallback(
                move |method: Method, uri: Uri, headers: HeaderMap, body: Bytes| {
                    let recorder = Arc::clone(&recorder);
                    async move {
                        recorder.lock().unwrap().push(Recorded {
                            method,
                            path: uri.path().to_string(),
                            authorization: headers
                                .get("authorization")
                                .and_then(|v| v.to_str().ok())
                                .map(str::to_string),
                            body: serde_json::from_slice(&body).unwrap_or(Value::Null),
                        });
                        (status, r#"{"detail":"mock"}"#)
                    }
                },
            );

            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });

            MockBackend {
                base_url: format!("http://{addr}/api/v1.0/"),
                requests,
            }
        }

        fn requests(&self) -> Vec<Recorded> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(Notification, Vec<String>)>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(
            &self,
            notification: &Notification,
            destination_identities: &[String],
        ) -> Result<(), NotifyError> {
            self.sent
                .lock()
                .unwrap()
                .push((notification.clone(), destination_identities.to_vec()));
            Ok(())
        }
    }

    fn client(backend: &MockBackend, room: Option<ApiRoom>) -> ModerationClient {
        ModerationClient::new(
            ApiClient::new(&backend.base_url).unwrap(),
            Store::new("room", room),
        )
    }

    #[tokio::test]
    async fn promote_demote_remove_post_identity_to_room() {
        let backend = MockBackend::start(StatusCode::OK).await;
        let moderation = client(&backend, Some(room("r1")));
        let ada = ParticipantInfo::new("ada");

        moderation.promote(&ada).await.unwrap();
        moderation.demote(&ada).await.unwrap();
        moderation.remove(&ada).await.unwrap();

        let requests = backend.requests();
        let paths: Vec<&str> = requests.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "/api/v1.0/rooms/r1/promote-participant/",
                "/api/v1.0/rooms/r1/demote-participant/",
                "/api/v1.0/rooms/r1/remove-participant/",
            ]
        );
        for request in &requests {
            assert_eq!(request.method, Method::POST);
            assert_eq!(request.body, json!({ "participant_identity": "ada" }));
        }
    }

    #[tokio::test]
    async fn unresolved_room_fails_without_any_request() {
        let backend = MockBackend::start(StatusCode::OK).await;
        let moderation = client(&backend, None);
        let ada = ParticipantInfo::new("ada")
            .with_microphone("TR_mic")
            .with_attribute("handRaisedAt", "1");

        assert!(matches!(moderation.promote(&ada).await, Err(ModerationError::RoomUnavailable)));
        assert!(matches!(moderation.demote(&ada).await, Err(ModerationError::RoomUnavailable)));
        assert!(matches!(moderation.remove(&ada).await, Err(ModerationError::RoomUnavailable)));
        assert!(matches!(moderation.mute(&ada).await, Err(ModerationError::RoomUnavailable)));
        assert!(matches!(
            moderation.mute_all(std::slice::from_ref(&ada)).await,
            Err(ModerationError::RoomUnavailable)
        ));
        assert!(matches!(moderation.lower_hand(&ada).await, Err(ModerationError::RoomUnavailable)));
        assert!(matches!(
            moderation.lower_all_hands(std::slice::from_ref(&ada)).await,
            Err(ModerationError::RoomUnavailable)
        ));
        assert!(matches!(
            moderation.lower_hand_via_media_backend(&ada).await,
            Err(ModerationError::MediaBackendUnavailable)
        ));

        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn backend_rejection_propagates_status() {
        let backend = MockBackend::start(StatusCode::FORBIDDEN).await;
        let moderation = client(&backend, Some(room("r1")));

        let err = moderation.promote(&ParticipantInfo::new("ada")).await.unwrap_err();

        match err {
            ModerationError::Api(api) => {
                assert_eq!(api.status(), Some(reqwest::StatusCode::FORBIDDEN));
                assert!(api.to_string().contains("mock"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(backend.requests().len(), 1);
    }

    #[tokio::test]
    async fn lower_hand_clears_timestamp_and_keeps_other_attributes() {
        let backend = MockBackend::start(StatusCode::OK).await;
        let moderation = client(&backend, Some(room("r1")));
        let ada = ParticipantInfo::new("ada")
            .with_attribute("handRaisedAt", "169900000")
            .with_attribute("color", "hsl(10,60%,40%)");

        moderation.lower_hand(&ada).await.unwrap();

        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].path, "/api/v1.0/rooms/r1/update-participant/");
        assert_eq!(
            requests[0].body,
            json!({
                "participant_identity": "ada",
                "attributes": { "handRaisedAt": "", "color": "hsl(10,60%,40%)" },
            })
        );
        // The snapshot is not mutated.
        assert_eq!(ada.attributes["handRaisedAt"], "169900000");
    }

    #[tokio::test]
    async fn lower_all_hands_only_touches_raised_hands() {
        let backend = MockBackend::start(StatusCode::OK).await;
        let moderation = client(&backend, Some(room("r1")));
        let participants = vec![
            ParticipantInfo::new("ada").with_attribute("handRaisedAt", "1"),
            ParticipantInfo::new("bob").with_attribute("handRaisedAt", ""),
            ParticipantInfo::new("cy"),
        ];

        let lowered = moderation.lower_all_hands(&participants).await.unwrap();

        assert_eq!(lowered, 1);
        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].body["participant_identity"], "ada");
    }

    #[tokio::test]
    async fn mute_sends_track_and_notifies_target() {
        let backend = MockBackend::start(StatusCode::OK).await;
        let notifier = Arc::new(RecordingNotifier::default());
        let moderation = client(&backend, Some(room("r1"))).with_notifier(notifier.clone());

        let muted = moderation
            .mute(&ParticipantInfo::new("ada").with_microphone("TR_mic"))
            .await
            .unwrap();

        assert!(muted);
        let requests = backend.requests();
        assert_eq!(requests[0].path, "/api/v1.0/rooms/r1/mute-participant/");
        assert_eq!(
            requests[0].body,
            json!({ "participant_identity": "ada", "track_sid": "TR_mic" })
        );

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0.notification_type(), NotificationType::ParticipantMuted);
        assert_eq!(sent[0].1, vec!["ada".to_string()]);
    }

    #[tokio::test]
    async fn mute_all_skips_participants_without_microphone() {
        let backend = MockBackend::start(StatusCode::OK).await;
        let moderation = client(&backend, Some(room("r1")));
        let participants = vec![
            ParticipantInfo::new("ada").with_microphone("TR_a"),
            ParticipantInfo::new("bob"),
            ParticipantInfo::new("cy").with_microphone("TR_c"),
        ];

        let muted = moderation.mute_all(&participants).await.unwrap();

        assert_eq!(muted, 2);
        assert_eq!(backend.requests().len(), 2);
    }

    #[tokio::test]
    async fn failed_mute_sends_no_notification() {
        let backend = MockBackend::start(StatusCode::INTERNAL_SERVER_ERROR).await;
        let notifier = Arc::new(RecordingNotifier::default());
        let moderation = client(&backend, Some(room("r1"))).with_notifier(notifier.clone());

        let result = moderation
            .mute(&ParticipantInfo::new("ada").with_microphone("TR_mic"))
            .await;

        assert!(matches!(result, Err(ModerationError::Api(_))));
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_permissions_sends_upper_case_sources() {
        let backend = MockBackend::start(StatusCode::OK).await;
        let moderation = client(&backend, Some(room("r1")));

        moderation
            .update_permissions(
                &ParticipantInfo::new("ada"),
                &[PublishSource::Camera, PublishSource::ScreenShare],
            )
            .await
            .unwrap();

        let body = &backend.requests()[0].body;
        assert_eq!(body["permission"]["can_publish"], true);
        assert_eq!(
            body["permission"]["can_publish_sources"],
            json!(["CAMERA", "SCREEN_SHARE"])
        );
    }

    #[tokio::test]
    async fn lower_hand_via_media_backend_uses_room_token() {
        let backend = MockBackend::start(StatusCode::OK).await;
        let server_url = backend.base_url.trim_end_matches("/api/v1.0/").replace("http://", "ws://");
        let mut with_media = room("r1");
        with_media.livekit = Some(ApiLiveKit {
            url: server_url,
            room: "lk-room".into(),
            token: "jwt-token".into(),
        });
        let moderation = client(&backend, Some(with_media));

        moderation
            .lower_hand_via_media_backend(
                &ParticipantInfo::new("ada").with_attribute("handRaisedAt", "5"),
            )
            .await
            .unwrap();

        let requests = backend.requests();
        assert_eq!(requests[0].path, "/twirp/livekit.RoomService/UpdateParticipant");
        assert_eq!(requests[0].authorization.as_deref(), Some("Bearer jwt-token"));
        assert_eq!(requests[0].body["room"], "lk-room");
        assert_eq!(requests[0].body["attributes"]["handRaisedAt"], "");
    }

    #[test]
    fn server_api_url_switches_scheme() {
        assert_eq!(
            server_api_url("wss://lk.example.org", UPDATE_PARTICIPANT_RPC)
                .unwrap()
                .as_str(),
            "https://lk.example.org/twirp/livekit.RoomService/UpdateParticipant"
        );
        assert_eq!(
            server_api_url("ws://localhost:7880/", UPDATE_PARTICIPANT_RPC)
                .unwrap()
                .as_str(),
            "http://localhost:7880/twirp/livekit.RoomService/UpdateParticipant"
        );
    }
}
