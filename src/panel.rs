//! Side panel navigation for the main surface and the PiP surface.
//!
//! Both surfaces use the same [`PanelState`] vocabulary but each coordinator
//! owns its own store, so opening chat in PiP never moves the main window.

use crate::error::UnknownPanel;
use crate::store::Store;
use crate::stores::LayoutState;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PanelId {
    Participants,
    Effects,
    Chat,
    Tools,
    Admin,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubPanelId {
    Transcript,
    ScreenRecording,
}

impl PanelId {
    pub const ALL: [PanelId; 6] = [
        PanelId::Participants,
        PanelId::Effects,
        PanelId::Chat,
        PanelId::Tools,
        PanelId::Admin,
        PanelId::Info,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PanelId::Participants => "participants",
            PanelId::Effects => "effects",
            PanelId::Chat => "chat",
            PanelId::Tools => "tools",
            PanelId::Admin => "admin",
            PanelId::Info => "info",
        }
    }
}

impl SubPanelId {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubPanelId::Transcript => "transcript",
            SubPanelId::ScreenRecording => "screenRecording",
        }
    }
}

impl fmt::Display for PanelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for SubPanelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PanelId {
    type Err = UnknownPanel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PanelId::ALL
            .into_iter()
            .find(|panel| panel.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownPanel(s.to_string()))
    }
}

impl FromStr for SubPanelId {
    type Err = UnknownPanel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "transcript" => Ok(SubPanelId::Transcript),
            "screenrecording" | "screen-recording" => Ok(SubPanelId::ScreenRecording),
            _ => Err(UnknownPanel(s.to_string())),
        }
    }
}

/// Which side panel and nested view are visible on one surface.
///
/// Fields are private: the only way to set a sub-panel is together with a
/// panel, so `sub_panel.is_some()` implies `panel.is_some()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PanelState {
    active_panel_id: Option<PanelId>,
    active_sub_panel_id: Option<SubPanelId>,
}

impl PanelState {
    pub fn active_panel_id(&self) -> Option<PanelId> {
        self.active_panel_id
    }

    pub fn active_sub_panel_id(&self) -> Option<SubPanelId> {
        self.active_sub_panel_id
    }

    fn open(&mut self, panel: PanelId, sub_panel: Option<SubPanelId>) {
        self.active_panel_id = Some(panel);
        self.active_sub_panel_id = sub_panel;
    }

    fn close(&mut self) {
        self.active_panel_id = None;
        self.active_sub_panel_id = None;
    }

    fn toggle(&mut self, panel: PanelId) {
        if self.active_panel_id == Some(panel) {
            self.close();
        } else {
            self.open(panel, None);
        }
    }

    fn go_back(&mut self) {
        self.active_sub_panel_id = None;
    }
}

impl AsRef<PanelState> for PanelState {
    fn as_ref(&self) -> &PanelState {
        self
    }
}

impl AsMut<PanelState> for PanelState {
    fn as_mut(&mut self) -> &mut PanelState {
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelScope {
    Main,
    Pip,
}

impl fmt::Display for PanelScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PanelScope::Main => f.write_str("main"),
            PanelScope::Pip => f.write_str("pip"),
        }
    }
}

/// Owner of one surface's panel state. Only the coordinator mutates it.
pub struct PanelCoordinator<T> {
    scope: PanelScope,
    store: Store<T>,
}

pub type MainPanels = PanelCoordinator<LayoutState>;
pub type PipPanels = PanelCoordinator<PanelState>;

impl PanelCoordinator<LayoutState> {
    pub fn main() -> Self {
        PanelCoordinator {
            scope: PanelScope::Main,
            store: Store::with_default("layout"),
        }
    }
}

impl PanelCoordinator<PanelState> {
    pub fn pip() -> Self {
        PanelCoordinator {
            scope: PanelScope::Pip,
            store: Store::with_default("pip_layout"),
        }
    }
}

impl<T> PanelCoordinator<T>
where
    T: AsRef<PanelState> + AsMut<PanelState> + Clone + Send + Sync + 'static,
{
    pub fn scope(&self) -> PanelScope {
        self.scope
    }

    /// Read access for subscribers. Mutations go through the coordinator.
    pub fn store(&self) -> &Store<T> {
        &self.store
    }

    pub fn state(&self) -> PanelState {
        self.store.read(|s| *s.as_ref())
    }

    pub fn active_panel(&self) -> Option<PanelId> {
        self.state().active_panel_id()
    }

    pub fn active_sub_panel(&self) -> Option<SubPanelId> {
        self.state().active_sub_panel_id()
    }

    pub fn is_open(&self, panel: PanelId) -> bool {
        self.active_panel() == Some(panel)
    }

    pub fn is_side_panel_open(&self) -> bool {
        self.active_panel().is_some()
    }

    pub fn is_sub_panel_open(&self) -> bool {
        self.active_sub_panel().is_some()
    }

    pub fn open(&self, panel: PanelId, sub_panel: Option<SubPanelId>) {
        debug!("[{}] open panel {} (sub: {:?})", self.scope, panel, sub_panel);
        self.store.update(|s| s.as_mut().open(panel, sub_panel));
    }

    pub fn close(&self) {
        debug!("[{}] close panel", self.scope);
        self.store.update(|s| s.as_mut().close());
    }

    pub fn toggle(&self, panel: PanelId) {
        debug!("[{}] toggle panel {}", self.scope, panel);
        self.store.update(|s| s.as_mut().toggle(panel));
    }

    pub fn go_back(&self) {
        self.store.update(|s| s.as_mut().go_back());
    }

    pub fn open_transcript(&self) {
        self.open(PanelId::Tools, Some(SubPanelId::Transcript));
    }

    pub fn open_screen_recording(&self) {
        self.open(PanelId::Tools, Some(SubPanelId::ScreenRecording));
    }
}
