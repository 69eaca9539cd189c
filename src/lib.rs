//! mihrab - offline-first prayer times companion.
//!
//! Two loosely related subsystems make up the core:
//! - [`cache`]: an offline cache controller that intercepts outbound
//!   requests and applies per-class caching strategies over versioned
//!   stores.
//! - [`prayer`]: day-scoped prayer time tables and a pure temporal state
//!   resolver (current/next prayer, countdowns, Makruh windows).
//!
//! [`app`] hosts both in a 1 Hz tick loop for the terminal binary.

pub mod app;
pub mod cache;
pub mod config;
pub mod event;
pub mod prayer;
