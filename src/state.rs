//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! It holds the relay (per-session outbound channels), the presence tracker
//! and the resolved configuration. Clone is cheap: every field is shared.

use std::sync::Arc;

use crate::config::Config;
use crate::presence::PresenceTracker;
use crate::relay::Relay;

#[derive(Clone)]
pub struct AppState {
    pub relay: Relay,
    pub presence: PresenceTracker,
    pub config: Arc<Config>,
}

impl AppState {
    #[must_use]
    pub fn new(config: Config) -> Self {
        let relay = Relay::new();
        let presence = PresenceTracker::new(relay.clone(), config.grace);
        Self { relay, presence, config: Arc::new(config) }
    }
}

#[cfg(test)]
pub mod test_helpers {
    use std::time::Duration;

    use super::*;

    /// App state with a short grace period so presence tests finish quickly.
    #[must_use]
    pub fn test_app_state(grace: Duration) -> AppState {
        AppState::new(Config { grace, ..Config::default() })
    }
}
