//! Static platform-to-adapter mapping, resolved once at startup.
//! Dispatch is a pure lookup; there is no runtime type inspection.

use super::PlatformAdapter;
use crate::error::{PubflowError, Result};
use crate::models::Platform;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<Platform, Arc<dyn PlatformAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn PlatformAdapter>) -> Self {
        self.adapters.insert(adapter.platform(), adapter);
        self
    }

    pub fn get(&self, platform: Platform) -> Option<Arc<dyn PlatformAdapter>> {
        self.adapters.get(&platform).cloned()
    }

    pub fn resolve(&self, platform: Platform) -> Result<Arc<dyn PlatformAdapter>> {
        self.get(platform).ok_or_else(|| {
            PubflowError::AdapterError(format!("no adapter registered for platform {platform}"))
        })
    }

    pub fn registered_platforms(&self) -> Vec<Platform> {
        self.adapters.keys().copied().collect()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("platforms", &self.registered_platforms())
            .finish()
    }
}
