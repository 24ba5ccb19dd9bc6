use std::sync::Arc;

use crate::config::Config;
use crate::realtime::SubscriptionManager;
use crate::services::directory::{ChildAccess, UserDirectory};
use crate::store::MemoryStore;

/// Everything an embedding caller (conversation list, composer, thread
/// view) needs to drive the messaging core. Created at login; call
/// `subscriptions.unsubscribe_all()` before dropping at logout.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MemoryStore>,
    pub config: Arc<Config>,
    pub subscriptions: Arc<SubscriptionManager>,
    pub child_access: Arc<dyn ChildAccess>,
    pub directory: Arc<dyn UserDirectory>,
}

impl AppState {
    pub fn new(
        config: Config,
        child_access: Arc<dyn ChildAccess>,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        let store = MemoryStore::shared();
        let config = Arc::new(config);
        let subscriptions = Arc::new(SubscriptionManager::new(
            Arc::clone(&store),
            Arc::clone(&config),
        ));
        Self {
            store,
            config,
            subscriptions,
            child_access,
            directory,
        }
    }
}
