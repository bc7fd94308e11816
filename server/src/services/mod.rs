//! Domain services used by HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own generation and tool execution so route handlers can
//! stay focused on request validation and stream framing.

pub mod chat;
pub mod tools;
