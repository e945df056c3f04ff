//! WebSocket layer: connection lifecycle, close-code policy, message routing.
//!
//! The connection manager owns the single persistent socket; the router
//! consumes its inbound frames and fans them out to the application's
//! cache, notification, and session collaborators.

pub mod close_code;
pub mod connection;
pub mod messages;
pub mod router;
