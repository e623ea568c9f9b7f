// Garage roster — paginated entity listing, entry-form flow, and selection state.

use std::sync::Arc;

use anyhow::{bail, Result};
use parking_lot::RwLock;
use tracing::debug;

use crate::config::ENTITY_NAME_MAX_LEN;
use crate::remote::traits::{Entity, EntityRegistry, EntitySpec};

#[derive(Debug, Clone, Default)]
struct RosterState {
    entities: Vec<Entity>,
    total: usize,
    page: usize,
    selected: Option<Entity>,
}

/// One page of the remote registry plus the edit selection, re-fetched after
/// every mutation. The entity list on the current page is the roster a race
/// runs over.
pub struct GarageRoster {
    registry: Arc<dyn EntityRegistry>,
    page_size: usize,
    state: RwLock<RosterState>,
}

impl GarageRoster {
    pub fn new(registry: Arc<dyn EntityRegistry>, page_size: usize) -> Self {
        Self {
            registry,
            page_size,
            state: RwLock::new(RosterState {
                page: 1,
                ..Default::default()
            }),
        }
    }

    /// Entities on the current page, in listing order.
    pub fn entities(&self) -> Vec<Entity> {
        self.state.read().entities.clone()
    }

    pub fn total(&self) -> usize {
        self.state.read().total
    }

    pub fn page(&self) -> usize {
        self.state.read().page
    }

    pub fn total_pages(&self) -> usize {
        let total = self.state.read().total;
        (total + self.page_size - 1) / self.page_size
    }

    pub fn selected(&self) -> Option<Entity> {
        self.state.read().selected.clone()
    }

    /// Fetch one page and make it current. Pages are 1-based.
    pub async fn load_page(&self, page: usize) -> Result<()> {
        let page = page.max(1);
        let fetched = self.registry.list_entities(page, self.page_size).await?;
        debug!(
            "garage page {} loaded: {} of {} entities",
            page,
            fetched.entities.len(),
            fetched.total
        );

        let mut state = self.state.write();
        state.page = page;
        state.entities = fetched.entities;
        state.total = fetched.total;
        Ok(())
    }

    /// Re-fetch the current page.
    pub async fn reload(&self) -> Result<()> {
        let page = self.state.read().page;
        self.load_page(page).await
    }

    pub async fn next_page(&self) -> Result<()> {
        let page = self.state.read().page;
        if page < self.total_pages() {
            self.load_page(page + 1).await
        } else {
            Ok(())
        }
    }

    pub async fn prev_page(&self) -> Result<()> {
        let page = self.state.read().page;
        if page > 1 {
            self.load_page(page - 1).await
        } else {
            Ok(())
        }
    }

    /// Validate a name the way the entry form does: non-blank, at most
    /// `ENTITY_NAME_MAX_LEN` characters.
    pub fn validate_name(name: &str) -> Result<()> {
        if name.trim().is_empty() {
            bail!("entity name must not be empty");
        }
        if name.chars().count() > ENTITY_NAME_MAX_LEN {
            bail!("entity name longer than {} characters", ENTITY_NAME_MAX_LEN);
        }
        Ok(())
    }

    /// Create an entity and jump to the page it lands on (the last one).
    pub async fn create(&self, spec: EntitySpec) -> Result<Entity> {
        Self::validate_name(&spec.name)?;
        let entity = self.registry.create_entity(&spec).await?;

        let new_total = self.state.read().total + 1;
        let last_page = (new_total + self.page_size - 1) / self.page_size;
        self.load_page(last_page.max(1)).await?;
        Ok(entity)
    }

    /// Update an entity and re-fetch the current page. Clears the selection
    /// when the edited entity was selected (the edit flow is complete).
    pub async fn update(&self, id: u32, spec: EntitySpec) -> Result<Entity> {
        Self::validate_name(&spec.name)?;
        let entity = self.registry.update_entity(id, &spec).await?;
        {
            let mut state = self.state.write();
            if state.selected.as_ref().map(|s| s.id) == Some(id) {
                state.selected = None;
            }
        }
        self.reload().await?;
        Ok(entity)
    }

    /// Delete an entity and re-fetch the current page.
    pub async fn remove(&self, id: u32) -> Result<()> {
        self.registry.delete_entity(id).await?;
        {
            let mut state = self.state.write();
            if state.selected.as_ref().map(|s| s.id) == Some(id) {
                state.selected = None;
            }
        }
        self.reload().await
    }

    /// Mark an entity as the edit target.
    pub fn select(&self, entity: Entity) {
        self.state.write().selected = Some(entity);
    }

    pub fn clear_selection(&self) {
        self.state.write().selected = None;
    }
}
