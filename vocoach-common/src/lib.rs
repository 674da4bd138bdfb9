//! # Vocoach Common Library
//!
//! Shared code for the vocoach speech playback engine and the UI layers that
//! observe it:
//! - Event types (`PlayerEvent` tagged union) and the broadcast `EventBus`
//! - Player state and metrics snapshot types
//! - Bootstrap configuration file resolution
//! - Common error type

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
pub use events::{EventBus, PlayerEvent, PlayerState};
