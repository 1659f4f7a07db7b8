//! IM realtime delivery server library.
//! Tracks which users hold a live WebSocket and delivers events to them.
//! This crate exposes internal modules for integration testing and for the
//! services that dispatch through the Hub. The binary entry point is in main.rs.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod ws;
