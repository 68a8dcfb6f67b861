use dispatch_core::assistant::AssistantConfig;
use dispatch_core::session::SessionStore;
use dispatch_core::{DispatchService, Store};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub dispatch: DispatchService,
    pub session: Arc<Mutex<SessionStore>>,
    pub assistant: Option<AssistantConfig>,
    pub poll_interval: Duration,
    pub change_retention: i64,
}

impl AppState {
    pub fn new(
        store: Store,
        session: SessionStore,
        assistant: Option<AssistantConfig>,
        poll_interval: Duration,
        change_retention: i64,
    ) -> Self {
        Self {
            dispatch: DispatchService::new(store.clone()),
            store,
            session: Arc::new(Mutex::new(session)),
            assistant,
            poll_interval,
            change_retention,
        }
    }
}
