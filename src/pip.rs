//! Detached picture-in-picture window for a room.
//!
//! The window walks `Closed -> Opening -> Open -> Closing -> Closed`. Opening
//! is asynchronous, so a `close()` may land while the host is still creating
//! the surface; the late surface is then closed and thrown away. Every opened
//! surface gets a new generation number so that close events from an older
//! surface never touch the current one.

use crate::error::PipError;
use crate::store::Store;
use crate::stores::RoomPiPState;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipPhase {
    Closed,
    Opening,
    Open,
    Closing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipSize {
    pub width: u32,
    pub height: u32,
}

impl Default for PipSize {
    fn default() -> Self {
        PipSize {
            width: 480,
            height: 270,
        }
    }
}

/// Signals that the surface is going away without our involvement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceEvent {
    PageHide,
    BeforeUnload,
}

pub trait PipSurface: Send {
    fn mount(&mut self) -> Result<(), PipError>;
    fn unmount(&mut self);
    fn close(&mut self);
}

pub type SurfaceEvents = UnboundedReceiver<SurfaceEvent>;

#[async_trait]
pub trait PipHost: Send + Sync {
    fn is_supported(&self) -> bool;

    async fn request_window(
        &self,
        size: PipSize,
    ) -> Result<(Box<dyn PipSurface>, SurfaceEvents), PipError>;
}

struct PipInner {
    generation: u64,
    surface: Option<Box<dyn PipSurface>>,
    watcher: Option<JoinHandle<()>>,
}

pub struct PipWindow {
    host: Arc<dyn PipHost>,
    size: PipSize,
    phase: Store<PipPhase>,
    room_pip: Store<RoomPiPState>,
    inner: Arc<Mutex<PipInner>>,
}

impl PipWindow {
    pub fn new(host: Arc<dyn PipHost>, size: PipSize, room_pip: Store<RoomPiPState>) -> Self {
        PipWindow {
            host,
            size,
            phase: Store::new("pip_phase", PipPhase::Closed),
            room_pip,
            inner: Arc::new(Mutex::new(PipInner {
                generation: 0,
                surface: None,
                watcher: None,
            })),
        }
    }

    pub fn phase(&self) -> PipPhase {
        self.phase.get()
    }

    /// Observable phase, mostly useful to wait for transitions.
    pub fn phase_store(&self) -> &Store<PipPhase> {
        &self.phase
    }

    pub fn is_open(&self) -> bool {
        self.room_pip.read(|state| state.is_open)
    }

    pub fn is_supported(&self) -> bool {
        self.host.is_supported()
    }

    pub async fn open(&self) -> Result<(), PipError> {
        let generation = {
            let mut inner = self.inner.lock().await;
            if self.phase() != PipPhase::Closed {
                debug!("PiP open ignored in phase {:?}", self.phase());
                return Ok(());
            }
            if !self.host.is_supported() {
                return Err(PipError::Unsupported);
            }

            inner.generation += 1;
            self.phase.set(PipPhase::Opening);
            inner.generation
        };

        let requested = self.host.request_window(self.size).await;

        let mut inner = self.inner.lock().await;
        if inner.generation != generation || self.phase() != PipPhase::Opening {
            if let Ok((mut surface, _)) = requested {
                info!("PiP window closed while opening, discarding surface");
                surface.close();
            }
            return Ok(());
        }

        let (mut surface, events) = match requested {
            Ok(created) => created,
            Err(e) => {
                warn!("Failed to open PiP window: {}", e);
                self.phase.set(PipPhase::Closed);
                return Err(e);
            }
        };

        if let Err(e) = surface.mount() {
            warn!("Failed to mount PiP view: {}", e);
            surface.close();
            self.phase.set(PipPhase::Closed);
            return Err(e);
        }

        inner.surface = Some(surface);
        inner.watcher = Some(tokio::spawn(watch_surface(
            Arc::downgrade(&self.inner),
            generation,
            events,
            self.phase.clone(),
            self.room_pip.clone(),
        )));
        self.phase.set(PipPhase::Open);
        self.room_pip.update(|state| state.is_open = true);

        info!("PiP window opened ({}x{})", self.size.width, self.size.height);
        Ok(())
    }

    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;

        match self.phase() {
            PipPhase::Closed | PipPhase::Closing => return,
            PipPhase::Opening => {
                // The pending open sees the bumped generation and discards its surface.
                inner.generation += 1;
                self.phase.set(PipPhase::Closed);
                return;
            }
            PipPhase::Open => {}
        }

        self.phase.set(PipPhase::Closing);
        inner.generation += 1;
        if let Some(watcher) = inner.watcher.take() {
            watcher.abort();
        }
        if let Some(mut surface) = inner.surface.take() {
            surface.unmount();
            surface.close();
        }

        self.phase.set(PipPhase::Closed);
        self.room_pip.update(|state| state.is_open = false);
        info!("PiP window closed");
    }

    pub async fn toggle(&self) -> Result<(), PipError> {
        if self.phase() == PipPhase::Closed {
            self.open().await
        } else {
            self.close().await;
            Ok(())
        }
    }
}

impl Drop for PipWindow {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.inner.try_lock() {
            if let Some(watcher) = inner.watcher.take() {
                watcher.abort();
            }
            if let Some(mut surface) = inner.surface.take() {
                surface.unmount();
                surface.close();
            }
        }
    }
}

async fn watch_surface(
    inner: Weak<Mutex<PipInner>>,
    generation: u64,
    mut events: SurfaceEvents,
    phase: Store<PipPhase>,
    room_pip: Store<RoomPiPState>,
) {
    let event = events.recv().await;

    let Some(inner) = inner.upgrade() else {
        return;
    };
    let mut inner = inner.lock().await;
    if inner.generation != generation || phase.get() != PipPhase::Open {
        debug!("Ignoring stale PiP surface event {:?}", event);
        return;
    }

    info!("PiP window closed externally ({:?})", event);
    inner.watcher = None;
    if let Some(mut surface) = inner.surface.take() {
        surface.unmount();
    }
    phase.set(PipPhase::Closed);
    room_pip.update(|state| state.is_open = false);
}

/// Host with no real windowing system. Surfaces only log, and
/// [`HeadlessPipHost::dismiss`] plays the user closing the window.
pub struct HeadlessPipHost {
    supported: bool,
    current: StdMutex<Option<UnboundedSender<SurfaceEvent>>>,
}

impl HeadlessPipHost {
    pub fn new() -> Self {
        HeadlessPipHost {
            supported: true,
            current: StdMutex::new(None),
        }
    }

    pub fn unsupported() -> Self {
        HeadlessPipHost {
            supported: false,
            current: StdMutex::new(None),
        }
    }

    /// Returns false when no surface is listening.
    pub fn dismiss(&self) -> bool {
        let current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        current
            .as_ref()
            .is_some_and(|tx| tx.send(SurfaceEvent::PageHide).is_ok())
    }
}

impl Default for HeadlessPipHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PipHost for HeadlessPipHost {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn request_window(
        &self,
        size: PipSize,
    ) -> Result<(Box<dyn PipSurface>, SurfaceEvents), PipError> {
        if !self.supported {
            return Err(PipError::Unsupported);
        }

        let (tx, rx) = unbounded_channel();
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
        Ok((Box::new(HeadlessSurface { size, mounted: false }), rx))
    }
}

struct HeadlessSurface {
    size: PipSize,
    mounted: bool,
}

impl PipSurface for HeadlessSurface {
    fn mount(&mut self) -> Result<(), PipError> {
        self.mounted = true;
        info!("[pip] view mounted at {}x{}", self.size.width, self.size.height);
        Ok(())
    }

    fn unmount(&mut self) {
        if self.mounted {
            self.mounted = false;
            info!("[pip] view unmounted");
        }
    }

    fn close(&mut self) {
        info!("[pip] surface closed");
    }
}
