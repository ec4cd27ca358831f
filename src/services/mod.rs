//! Domain services used by websocket and HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own session logic and storage contracts so route
//! handlers can stay focused on protocol translation and auth plumbing.

pub mod attendance;
pub mod auth;
pub mod classes;
pub mod finalize;
pub mod registry;
pub mod session;
