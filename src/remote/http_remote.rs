use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Serialize;
use tracing::{debug, warn};

use super::traits::{
    DriveController, Entity, EntityPage, EntityRegistry, EntitySpec, Kinematics, SortField,
    SortOrder, WinnerLedger, WinnerPage, WinnerRecord,
};
use crate::config::EngineConfig;

/// HTTP client for the remote registry, drive controller, and winner ledger,
/// all served from one base URL.
pub struct HttpRemote {
    client: Client,
    base_url: String,
}

impl HttpRemote {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: Client::new(),
            base_url,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.base_url.clone())
    }

    fn url(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base_url, path_and_query)
    }

    /// Reject non-2xx responses, logging the status.
    fn ensure_success(resp: Response, what: &str) -> Result<Response> {
        let status = resp.status();
        if !status.is_success() {
            warn!("{} failed status={}", what, status.as_u16());
            return Err(anyhow!("{} failed: HTTP {}", what, status.as_u16()));
        }
        Ok(resp)
    }

    /// Parse the pagination total from the `X-Total-Count` header.
    fn total_count(resp: &Response) -> usize {
        resp.headers()
            .get("x-total-count")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0)
    }
}

#[async_trait]
impl DriveController for HttpRemote {
    async fn start_entity(&self, id: u32) -> Result<Kinematics> {
        let resp = self
            .client
            .patch(self.url(&format!("/engine?id={}&status=started", id)))
            .send()
            .await?;
        let resp = Self::ensure_success(resp, "engine start")?;
        let kinematics: Kinematics = resp.json().await?;
        debug!(
            "engine start id={} distance={} velocity={}",
            id, kinematics.distance, kinematics.velocity
        );
        Ok(kinematics)
    }

    async fn drive_entity(&self, id: u32) -> Result<()> {
        let resp = self
            .client
            .patch(self.url(&format!("/engine?id={}&status=drive", id)))
            .send()
            .await?;
        Self::ensure_success(resp, "engine drive")?;
        debug!("engine drive id={} accepted", id);
        Ok(())
    }

    async fn stop_entity(&self, id: u32) -> Result<()> {
        let resp = self
            .client
            .patch(self.url(&format!("/engine?id={}&status=stopped", id)))
            .send()
            .await?;
        Self::ensure_success(resp, "engine stop")?;
        Ok(())
    }
}

#[async_trait]
impl EntityRegistry for HttpRemote {
    async fn list_entities(&self, page: usize, limit: usize) -> Result<EntityPage> {
        let resp = self
            .client
            .get(self.url(&format!("/garage?_page={}&_limit={}", page, limit)))
            .send()
            .await?;
        let resp = Self::ensure_success(resp, "garage list")?;
        let total = Self::total_count(&resp);
        let entities: Vec<Entity> = resp.json().await?;
        debug!("garage list page={} fetched={} total={}", page, entities.len(), total);
        Ok(EntityPage { entities, total })
    }

    async fn create_entity(&self, spec: &EntitySpec) -> Result<Entity> {
        let resp = self
            .client
            .post(self.url("/garage"))
            .json(spec)
            .send()
            .await?;
        let resp = Self::ensure_success(resp, "garage create")?;
        Ok(resp.json().await?)
    }

    async fn update_entity(&self, id: u32, spec: &EntitySpec) -> Result<Entity> {
        let resp = self
            .client
            .put(self.url(&format!("/garage/{}", id)))
            .json(spec)
            .send()
            .await?;
        let resp = Self::ensure_success(resp, "garage update")?;
        Ok(resp.json().await?)
    }

    async fn delete_entity(&self, id: u32) -> Result<()> {
        let resp = self
            .client
            .delete(self.url(&format!("/garage/{}", id)))
            .send()
            .await?;
        Self::ensure_success(resp, "garage delete")?;
        Ok(())
    }
}

#[derive(Serialize)]
struct RecordWinnerBody {
    id: u32,
    time: f64,
}

#[async_trait]
impl WinnerLedger for HttpRemote {
    async fn record_winner(&self, id: u32, time_seconds: f64) -> Result<()> {
        let body = RecordWinnerBody {
            id,
            time: time_seconds,
        };
        let resp = self
            .client
            .post(self.url("/race-winner"))
            .json(&body)
            .send()
            .await?;
        Self::ensure_success(resp, "winner record")?;
        debug!("winner recorded id={} time={:.2}s", id, time_seconds);
        Ok(())
    }

    async fn list_winners(
        &self,
        page: usize,
        limit: usize,
        sort: SortField,
        order: SortOrder,
    ) -> Result<WinnerPage> {
        let resp = self
            .client
            .get(self.url(&format!(
                "/winners?_page={}&_limit={}&_sort={}&_order={}",
                page,
                limit,
                sort.as_str(),
                order.as_str()
            )))
            .send()
            .await?;
        let resp = Self::ensure_success(resp, "winners list")?;
        let total = Self::total_count(&resp);
        let winners: Vec<WinnerRecord> = resp.json().await?;
        Ok(WinnerPage { winners, total })
    }
}
