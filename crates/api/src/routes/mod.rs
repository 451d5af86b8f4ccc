//! HTTP and WebSocket handlers

pub mod control;
pub mod telemetry;
pub mod video;
pub mod ws;
