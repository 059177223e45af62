//! Home Assistant signaling backend
//!
//! Authenticated websocket connection that carries `camera/web_rtc_offer`
//! and `rtsp_to_webrtc/get_settings` commands and reports which
//! integrations are loaded.

mod client;
pub mod messages;

pub use client::HassClient;
