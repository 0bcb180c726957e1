//! Session event bus.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`SessionEvent`]: envelope around a [`SessionNotice`] tagged with the
//!   session it came from.
//!
//! [`SessionNotice`]: shadow_core::session::SessionNotice

pub mod bus;

pub use bus::{EventBus, SessionEvent};
