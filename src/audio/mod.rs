//! # Audio Module
//!
//! Per-guild playback sessions on top of a remote Lavalink node.
//!
//! ## Architecture
//!
//! ### [`registry`] - Session Registry
//! - At most one [`session::PlayerSession`] per guild, created on demand
//! - Concurrent commands for the same guild share the in-flight connection
//! - Owns the inactivity and empty-channel watchdogs
//!
//! ### [`session`] - Player Session
//! - Queue, loop/autoplay flags, volume and the "now playing" message
//! - Reacts to node events (track end, exceptions, position updates)
//!
//! ### [`lavalink`] - Audio Node
//! - REST + WebSocket client for Lavalink v4
//! - Voice credentials come from songbird in gateway-only mode
//!
//! ### [`player`] - Bot Entry Point
//! - Stored in serenity's `TypeMap`, dispatches node events to sessions
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! let target = SessionTarget { guild_id, voice_channel, text_channel };
//! if let Some(session) = player.session(target).await {
//!     session.add_track(track).await?;
//!     session.skip().await?;
//! }
//! ```

pub mod autoplay;
pub mod error;
pub mod lavalink;
pub mod node;
pub mod occupancy;
pub mod player;
pub mod queue;
pub mod registry;
pub mod session;
pub mod state;
pub mod watchdog;
