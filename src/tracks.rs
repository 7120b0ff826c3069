//! Local preview tracks for the pre-join screen.
//!
//! Track creation grabs capture devices, so at most one creation runs at a
//! time per [`PreviewTracks`]. An acquisition whose effect was torn down
//! before the devices were ready stops the tracks it created instead of
//! publishing them.

use crate::error::TrackError;
use crate::store::Store;
use crate::stores::{UserChoices, VideoResolution};
use async_trait::async_trait;
use livekit::track::{LocalAudioTrack, LocalTrack, LocalVideoTrack};
use livekit::webrtc::audio_source::native::NativeAudioSource;
use livekit::webrtc::prelude::{AudioSourceOptions, RtcAudioSource};
use livekit::webrtc::video_source::native::NativeVideoSource;
use livekit::webrtc::video_source::{RtcVideoSource, VideoResolution as RtcVideoResolution};
use log::{debug, error, info};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioCaptureOptions {
    pub device_id: String,
    pub noise_suppression: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoCaptureOptions {
    pub device_id: String,
    pub resolution: VideoResolution,
}

/// Which tracks to create. `None` skips that kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureOptions {
    pub audio: Option<AudioCaptureOptions>,
    pub video: Option<VideoCaptureOptions>,
}

impl CaptureOptions {
    pub fn from_user_choices(choices: &UserChoices) -> Self {
        CaptureOptions {
            audio: choices.audio_enabled.then(|| AudioCaptureOptions {
                device_id: choices.audio_device_id.clone(),
                noise_suppression: choices.noise_reduction_enabled,
            }),
            video: choices.video_enabled.then(|| VideoCaptureOptions {
                device_id: choices.video_device_id.clone(),
                resolution: choices.video_publish_resolution,
            }),
        }
    }

    fn is_empty(&self) -> bool {
        self.audio.is_none() && self.video.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
        }
    }
}

pub trait PreviewTrack: Send + Sync {
    fn kind(&self) -> TrackKind;
    fn name(&self) -> &str;
    /// Releases the capture device. Idempotent.
    fn stop(&self);
}

#[async_trait]
pub trait TrackFactory: Send + Sync + 'static {
    async fn create_audio(
        &self,
        options: &AudioCaptureOptions,
    ) -> Result<Arc<dyn PreviewTrack>, TrackError>;

    async fn create_video(
        &self,
        options: &VideoCaptureOptions,
    ) -> Result<Arc<dyn PreviewTrack>, TrackError>;
}

#[derive(Clone, Default)]
pub struct PreviewState {
    pub audio: Option<Arc<dyn PreviewTrack>>,
    pub video: Option<Arc<dyn PreviewTrack>>,
}

impl PreviewState {
    pub fn is_empty(&self) -> bool {
        self.audio.is_none() && self.video.is_none()
    }

    fn tracks(&self) -> impl Iterator<Item = &Arc<dyn PreviewTrack>> {
        self.audio.iter().chain(self.video.iter())
    }
}

pub type TrackErrorHandler = Arc<dyn Fn(&TrackError) + Send + Sync>;

pub struct PreviewTracks<F> {
    factory: Arc<F>,
    track_lock: Arc<Mutex<()>>,
    audio_lock: Mutex<()>,
    video_lock: Mutex<()>,
    state: Store<PreviewState>,
    initiated: Arc<AtomicBool>,
    on_error: Option<TrackErrorHandler>,
}

impl<F: TrackFactory> PreviewTracks<F> {
    pub fn new(factory: F) -> Self {
        PreviewTracks {
            factory: Arc::new(factory),
            track_lock: Arc::new(Mutex::new(())),
            audio_lock: Mutex::new(()),
            video_lock: Mutex::new(()),
            state: Store::with_default("preview_tracks"),
            initiated: Arc::new(AtomicBool::new(false)),
            on_error: None,
        }
    }

    pub fn with_error_handler(mut self, on_error: impl Fn(&TrackError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(on_error));
        self
    }

    pub fn state(&self) -> &Store<PreviewState> {
        &self.state
    }

    pub fn is_initiated(&self) -> bool {
        self.initiated.load(Ordering::SeqCst)
    }

    /// Starts creating the requested tracks in the background. Does nothing
    /// once tracks have been delivered.
    pub fn acquire(&self, options: CaptureOptions) -> PreviewEffect {
        let needs_cleanup = Arc::new(AtomicBool::new(false));

        if self.is_initiated() {
            debug!("Preview tracks already initiated");
            return PreviewEffect {
                needs_cleanup,
                initiated: Arc::clone(&self.initiated),
                task: None,
            };
        }

        let task = tokio::spawn(acquire_tracks(
            Arc::clone(&self.factory),
            Arc::clone(&self.track_lock),
            options,
            Arc::clone(&needs_cleanup),
            Arc::clone(&self.initiated),
            self.state.clone(),
            self.on_error.clone(),
        ));

        PreviewEffect {
            needs_cleanup,
            initiated: Arc::clone(&self.initiated),
            task: Some(task),
        }
    }

    /// Replaces the live audio track with one built from `options`. Does
    /// nothing until an acquisition has delivered tracks.
    pub async fn restart_audio(&self, options: &AudioCaptureOptions) -> Result<(), TrackError> {
        if !self.is_initiated() {
            debug!("Audio restart ignored, preview not initiated");
            return Ok(());
        }

        let _guard = self.audio_lock.lock().await;
        if !self.is_initiated() {
            return Ok(());
        }
        let track = self
            .factory
            .create_audio(options)
            .await
            .inspect_err(|e| report(&self.on_error, e))?;

        if self.install(TrackKind::Audio, track) {
            info!("Audio preview restarted on device {}", options.device_id);
        }
        Ok(())
    }

    /// Replaces the live video track with one built from `options`. Does
    /// nothing until an acquisition has delivered tracks.
    pub async fn restart_video(&self, options: &VideoCaptureOptions) -> Result<(), TrackError> {
        if !self.is_initiated() {
            debug!("Video restart ignored, preview not initiated");
            return Ok(());
        }

        let _guard = self.video_lock.lock().await;
        if !self.is_initiated() {
            return Ok(());
        }
        let track = self
            .factory
            .create_video(options)
            .await
            .inspect_err(|e| report(&self.on_error, e))?;

        if self.install(TrackKind::Video, track) {
            info!("Video preview restarted on device {}", options.device_id);
        }
        Ok(())
    }

    // The initiated check runs under the store's write lock, so a release
    // racing with a restart either stops the installed track or makes the
    // restart stop its own.
    fn install(&self, kind: TrackKind, track: Arc<dyn PreviewTrack>) -> bool {
        let initiated = &self.initiated;
        let (replaced, rejected) = self.state.update(|state| {
            if !initiated.load(Ordering::SeqCst) {
                return (None, Some(track));
            }
            let slot = match kind {
                TrackKind::Audio => &mut state.audio,
                TrackKind::Video => &mut state.video,
            };
            (slot.replace(track), None)
        });

        let installed = rejected.is_none();
        for stale in replaced.into_iter().chain(rejected) {
            stale.stop();
        }
        installed
    }

    /// Stops every delivered track and allows a new acquisition.
    pub async fn release(&self) {
        let _guard = self.track_lock.lock().await;
        self.initiated.store(false, Ordering::SeqCst);
        let state = self.state.update(std::mem::take);
        for track in state.tracks() {
            track.stop();
        }
    }
}

async fn acquire_tracks<F: TrackFactory>(
    factory: Arc<F>,
    track_lock: Arc<Mutex<()>>,
    options: CaptureOptions,
    needs_cleanup: Arc<AtomicBool>,
    initiated: Arc<AtomicBool>,
    state: Store<PreviewState>,
    on_error: Option<TrackErrorHandler>,
) {
    let _guard = track_lock.lock().await;

    if options.is_empty() || initiated.load(Ordering::SeqCst) {
        return;
    }

    let created = match create_tracks(factory.as_ref(), &options).await {
        Ok(created) => created,
        Err(e) => {
            report(&on_error, &e);
            return;
        }
    };

    if needs_cleanup.load(Ordering::SeqCst) {
        debug!("Preview torn down during creation, stopping new tracks");
        for track in created.tracks() {
            track.stop();
        }
        return;
    }

    let replaced = state.update(|current| std::mem::replace(current, created));
    for track in replaced.tracks() {
        track.stop();
    }
    initiated.store(true, Ordering::SeqCst);
    info!("Preview tracks ready");
}

async fn create_tracks<F: TrackFactory>(
    factory: &F,
    options: &CaptureOptions,
) -> Result<PreviewState, TrackError> {
    let mut created = PreviewState::default();

    if let Some(audio) = &options.audio {
        created.audio = Some(factory.create_audio(audio).await?);
    }
    if let Some(video) = &options.video {
        match factory.create_video(video).await {
            Ok(track) => created.video = Some(track),
            Err(e) => {
                for track in created.tracks() {
                    track.stop();
                }
                return Err(e);
            }
        }
    }

    Ok(created)
}

fn report(on_error: &Option<TrackErrorHandler>, e: &TrackError) {
    match on_error {
        Some(handler) => handler(e),
        None => error!("{}", e),
    }
}

/// One acquisition. Tearing it down before the tracks are delivered makes
/// the background creation stop whatever it produced.
pub struct PreviewEffect {
    needs_cleanup: Arc<AtomicBool>,
    initiated: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl PreviewEffect {
    pub fn teardown(&self) {
        if !self.initiated.load(Ordering::SeqCst) {
            self.needs_cleanup.store(true, Ordering::SeqCst);
        }
    }

    /// Waits for the background creation to finish.
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Preview track task failed: {}", e);
            }
        }
    }
}

impl Drop for PreviewEffect {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Creates LiveKit native sources. Frames are fed by the capture layer,
/// which is outside this crate.
pub struct LivekitTrackFactory {
    sample_rate: u32,
    num_channels: u32,
}

impl LivekitTrackFactory {
    pub fn new(sample_rate: u32, num_channels: u32) -> Self {
        LivekitTrackFactory {
            sample_rate,
            num_channels,
        }
    }
}

impl Default for LivekitTrackFactory {
    fn default() -> Self {
        Self::new(48000, 1)
    }
}

#[async_trait]
impl TrackFactory for LivekitTrackFactory {
    async fn create_audio(
        &self,
        options: &AudioCaptureOptions,
    ) -> Result<Arc<dyn PreviewTrack>, TrackError> {
        let source = NativeAudioSource::new(
            AudioSourceOptions {
                echo_cancellation: true,
                noise_suppression: options.noise_suppression,
                auto_gain_control: true,
            },
            self.sample_rate,
            self.num_channels,
            None,
        );
        let track =
            LocalAudioTrack::create_audio_track("preview_microphone", RtcAudioSource::Native(source));

        debug!("Created audio preview for device {}", options.device_id);
        Ok(Arc::new(LivekitPreviewTrack {
            kind: TrackKind::Audio,
            name: "preview_microphone".to_string(),
            track: LocalTrack::Audio(track),
        }))
    }

    async fn create_video(
        &self,
        options: &VideoCaptureOptions,
    ) -> Result<Arc<dyn PreviewTrack>, TrackError> {
        let (width, height) = options.resolution.dimensions();
        let source = NativeVideoSource::new(RtcVideoResolution { width, height });
        let track =
            LocalVideoTrack::create_video_track("preview_camera", RtcVideoSource::Native(source));

        debug!(
            "Created {}x{} video preview for device {}",
            width, height, options.device_id
        );
        Ok(Arc::new(LivekitPreviewTrack {
            kind: TrackKind::Video,
            name: "preview_camera".to_string(),
            track: LocalTrack::Video(track),
        }))
    }
}

struct LivekitPreviewTrack {
    kind: TrackKind,
    name: String,
    track: LocalTrack,
}

impl PreviewTrack for LivekitPreviewTrack {
    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn stop(&self) {
        match &self.track {
            LocalTrack::Audio(track) => track.disable(),
            LocalTrack::Video(track) => track.disable(),
        }
    }
}
