//! Notification Relay - real-time event fan-out
//!
//! Subscribes to a single Redis pub/sub channel and pushes every event it
//! receives to all connected WebSocket clients, with a health endpoint for
//! orchestration probes.

pub mod adapters;
pub mod application;
pub mod bootstrap;
pub mod config;
pub mod domain;
pub mod ports;
