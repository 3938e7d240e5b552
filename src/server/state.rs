use std::sync::Arc;
use std::time::Instant;

use crate::auth::Authenticator;
use crate::config::Settings;
use crate::connection::ConnectionIdGenerator;
use crate::error::GatewayError;
use crate::hub::HubHandle;
use crate::publisher::{create_publisher, Publisher};

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub authenticator: Arc<Authenticator>,
    pub publisher: Arc<dyn Publisher>,
    pub hub: HubHandle,
    pub ids: Arc<ConnectionIdGenerator>,
    pub start_time: Instant,
}

impl AppState {
    /// Validate `settings` and build every collaborator the listener needs.
    /// Fails before anything is bound if the configuration is unusable.
    pub fn new(settings: Settings, hub: HubHandle) -> Result<Self, GatewayError> {
        let auth_settings = settings.validate()?;
        let authenticator = Authenticator::from_settings(&auth_settings)?;
        let publisher = create_publisher(&settings.publisher, &settings.id, &hub)?;

        Ok(Self::from_parts(settings, authenticator, publisher, hub))
    }

    pub fn from_parts(
        settings: Settings,
        authenticator: Authenticator,
        publisher: Arc<dyn Publisher>,
        hub: HubHandle,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            authenticator: Arc::new(authenticator),
            publisher,
            hub,
            ids: Arc::new(ConnectionIdGenerator::new()),
            start_time: Instant::now(),
        }
    }
}
