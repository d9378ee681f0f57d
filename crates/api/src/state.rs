//! Shared application state for the Axum API server.

use std::sync::Arc;

use relay_common::config::AppConfig;
use relay_engine::{Dispatcher, SharedDirectory};

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub directory: SharedDirectory,
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(config: AppConfig, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            config,
            directory: Arc::clone(dispatcher.directory()),
            dispatcher,
        }
    }
}
