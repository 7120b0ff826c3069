//! State slices of a room view, one [`Store`] each.

use crate::panel::PanelState;
use crate::storage::{persisted_store, LocalStorage, USER_CHOICES_KEY, USER_PREFERENCES_KEY};
use crate::store::Store;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Main window layout: chrome visibility plus the main side panel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayoutState {
    pub show_header: bool,
    pub show_footer: bool,
    pub show_subtitles: bool,
    pub panel: PanelState,
}

impl AsRef<PanelState> for LayoutState {
    fn as_ref(&self) -> &PanelState {
        &self.panel
    }
}

impl AsMut<PanelState> for LayoutState {
    fn as_mut(&mut self) -> &mut PanelState {
        &mut self.panel
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModalsState {
    pub permissions: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordingLanguage {
    #[serde(rename = "en")]
    English,
    #[default]
    #[serde(rename = "fr")]
    French,
    #[serde(rename = "auto")]
    Automatic,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecordingStatus {
    TranscriptStarting,
    TranscriptStarted,
    TranscriptStopping,
    #[default]
    Stopped,
    ScreenRecordingStarting,
    ScreenRecordingStarted,
    ScreenRecordingStopping,
    AnyStarted,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordingState {
    pub status: RecordingStatus,
    pub language: RecordingLanguage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenSharePreference {
    pub enabled: bool,
}

impl Default for ScreenSharePreference {
    fn default() -> Self {
        ScreenSharePreference { enabled: true }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomPiPState {
    pub is_open: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutType {
    Grid,
    Carousel,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParticipantLayout {
    pub layout_type: Option<LayoutType>,
    pub first_grid_tile_track_id: Option<String>,
}

impl ParticipantLayout {
    pub fn set_grid(&mut self, first_track_id: Option<String>) {
        self.layout_type = Some(LayoutType::Grid);
        self.first_grid_tile_track_id = first_track_id;
    }

    pub fn set_carousel(&mut self) {
        self.layout_type = Some(LayoutType::Carousel);
        self.first_grid_tile_track_id = None;
    }

    pub fn reset(&mut self) {
        *self = ParticipantLayout::default();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreferences {
    pub is_idle_disconnect_modal_enabled: bool,
}

impl Default for UserPreferences {
    fn default() -> Self {
        UserPreferences {
            is_idle_disconnect_modal_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoResolution {
    #[default]
    H720,
    H360,
    H180,
}

impl VideoResolution {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            VideoResolution::H720 => (1280, 720),
            VideoResolution::H360 => (640, 360),
            VideoResolution::H180 => (320, 180),
        }
    }
}

/// Device choices, stored in the same shape LiveKit's web components use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserChoices {
    pub video_enabled: bool,
    pub audio_enabled: bool,
    pub video_device_id: String,
    pub audio_device_id: String,
    pub username: String,
    pub noise_reduction_enabled: bool,
    pub audio_output_device_id: String,
    pub video_publish_resolution: VideoResolution,
}

impl Default for UserChoices {
    fn default() -> Self {
        UserChoices {
            video_enabled: true,
            audio_enabled: true,
            video_device_id: "default".to_string(),
            audio_device_id: "default".to_string(),
            username: String::new(),
            noise_reduction_enabled: false,
            audio_output_device_id: "default".to_string(),
            video_publish_resolution: VideoResolution::H720,
        }
    }
}

/// Every UI-state slice that is not panel navigation. Built per room view.
#[derive(Clone)]
pub struct RoomStores {
    pub modals: Store<ModalsState>,
    pub recording: Store<RecordingState>,
    pub screen_share: Store<ScreenSharePreference>,
    pub room_pip: Store<RoomPiPState>,
    pub participant_layout: Store<ParticipantLayout>,
    pub user_preferences: Store<UserPreferences>,
    pub user_choices: Store<UserChoices>,
}

impl RoomStores {
    pub fn new(storage: Arc<LocalStorage>) -> Self {
        RoomStores {
            modals: Store::with_default("modals"),
            recording: Store::with_default("recording"),
            screen_share: Store::with_default("screen_share_preference"),
            room_pip: Store::with_default("room_pip"),
            participant_layout: Store::with_default("participant_layout"),
            user_preferences: persisted_store(Arc::clone(&storage), USER_PREFERENCES_KEY),
            user_choices: persisted_store(storage, USER_CHOICES_KEY),
        }
    }
}
