use std::sync::Arc;

use reqwest::Client;

use super::{
    auth::SupabaseIdentity,
    channels::mailer_from_config,
    config::Config,
    database::SupabaseStore,
    dispatch::{Backends, Dispatcher},
    error::StartupError,
};

pub struct AppState {
    pub dispatcher: Dispatcher,
}

impl AppState {
    pub fn new(config: &Config) -> Result<Arc<Self>, StartupError> {
        let client = Client::builder()
            .timeout(config.email.timeout * 2)
            .build()?;

        let store = Arc::new(SupabaseStore::new(client.clone(), config));

        let backends = Backends {
            identity: Arc::new(SupabaseIdentity::new(client.clone(), config)),
            issues: store.clone(),
            audience: store.clone(),
            inbox: store,
            mailer: mailer_from_config(client, &config.email),
        };

        Ok(Self::with_dispatcher(Dispatcher::new(
            backends,
            config.email.timeout,
        )?))
    }

    pub fn with_dispatcher(dispatcher: Dispatcher) -> Arc<Self> {
        Arc::new(Self { dispatcher })
    }
}
