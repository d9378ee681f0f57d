//! HTTP surface of the notification relay.
//!
//! Endpoints:
//! - GET  /health: liveness
//! - POST /api/notification: queue a notification for a user
//! - POST /api/users: register a user
//! - PUT  /api/users: upsert a user
//! - PUT  /api/users/preferences: replace a user's channel preferences
//! - GET  /api/users: look a user up by id, email or telephone

pub mod extract;
pub mod middleware;
pub mod routes;
pub mod state;
