//! Room-level client state and moderation for a LiveKit based meeting app.
//!
//! UI state lives in [`store::Store`] slices grouped per mounted room in
//! [`room_view::RoomView`]. Privileged actions go through the meeting
//! backend's REST API ([`moderation`]), and role changes pushed over the
//! room's data channel refresh the cached room data ([`role_change`]).

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod moderation;
pub mod notification;
pub mod panel;
pub mod participant;
pub mod pip;
pub mod repl;
pub mod role_change;
pub mod room_cache;
pub mod room_view;
pub mod storage;
pub mod store;
pub mod stores;
pub mod tracks;
