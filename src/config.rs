use serde::Deserialize;

/// Maximum accepted length for an entity name.
pub const ENTITY_NAME_MAX_LEN: usize = 20;

/// Entities fetched per registry request when sweeping the whole roster
/// for name/color lookup.
pub const ENTITY_LOOKUP_PAGE_SIZE: usize = 100;

/// Top-level configuration for the race engine.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Base URL of the remote registry/controller/ledger service.
    pub base_url: String,
    /// Entities shown per garage page.
    pub garage_page_size: usize,
    /// Winner rows shown per winners page.
    pub winners_page_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            garage_page_size: 7,
            winners_page_size: 10,
        }
    }
}
