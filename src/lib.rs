//! # signaldesk — real-time data synchronization core
//!
//! Keeps a trading dashboard's view of live quotes, ranked recommendations,
//! per-symbol strategy plans and position-exit alerts consistent while data
//! arrives over a persistent WebSocket (push) and REST endpoints (pull).
//!
//! Start from [`state::Dashboard`]: it owns one of each component and spawns
//! the background tasks.

pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod exits;
pub mod models;
pub mod monitor;
pub mod protocol;
pub mod quotes;
pub mod recommendations;
pub mod state;
pub mod storage;
pub mod strategy_cache;
pub mod stream;

pub use error::{SyncError, SyncResult};
pub use state::Dashboard;
