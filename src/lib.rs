//! # scribe-realtime
//!
//! Real-time connection and message-routing core for the Scribe
//! meeting-notes platform.
//!
//! This crate maintains one persistent WebSocket session to the backend
//! and routes typed push messages (task progress, notifications, project
//! membership changes) to injected application services. Rendering, REST,
//! and state management belong to the embedding application — this crate
//! is the connection layer only.
//!
//! ## Architecture
//!
//! ```text
//! Backend (WebSocket)
//!     │
//!     ├── ConnectionManager (ws/connection)
//!     │       token provider ──► connect / timeout / reconnect / close policy
//!     │
//!     ├── MessageRouter (ws/router)
//!     │       parse ──► last-message slot ──► per-type handlers
//!     │
//!     └── Collaborators (injected)
//!             CacheInvalidator │ Notifier │ Translate │ SessionControl
//! ```

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod notify;
pub mod session;
pub mod translate;
pub mod ws;
