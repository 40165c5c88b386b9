use std::sync::Arc;

use crate::{config::Config, dispatcher::DispatcherHandle};

#[derive(Clone)]
pub struct HttpState {
    pub config: Arc<Config>,
    pub dispatcher: DispatcherHandle,
}

impl HttpState {
    pub fn new(config: Config, dispatcher: DispatcherHandle) -> Self {
        Self {
            config: Arc::new(config),
            dispatcher,
        }
    }
}
