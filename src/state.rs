//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! carries configuration plus the two platform seams: the identity provider
//! and the data plane that mints per-user store and feed handles. Nothing
//! per-user lives here; each live view owns its own list.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::supabase::{DataPlane, IdentityProvider};

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; all inner fields are Arc-wrapped.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub identity: Arc<dyn IdentityProvider>,
    pub data: Arc<dyn DataPlane>,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig, identity: Arc<dyn IdentityProvider>, data: Arc<dyn DataPlane>) -> Self {
        Self { config: Arc::new(config), identity, data }
    }
}
