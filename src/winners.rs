// Winners board — sortable, paginated ledger listing joined with entity info.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::RwLock;

use crate::config::ENTITY_LOOKUP_PAGE_SIZE;
use crate::remote::traits::{
    Entity, EntityRegistry, SortField, SortOrder, WinnerLedger, WinnerRecord,
};

/// One display row: a ledger record plus the entity it refers to, when the
/// registry still knows that id.
#[derive(Debug, Clone)]
pub struct WinnerRow {
    pub record: WinnerRecord,
    pub entity: Option<Entity>,
}

#[derive(Debug, Clone)]
struct BoardState {
    rows: Vec<WinnerRow>,
    total: usize,
    page: usize,
    sort: SortField,
    order: SortOrder,
}

/// Paginated view over the winner ledger, sorted server-side and joined with
/// registry entities for name/color display.
pub struct WinnersBoard {
    ledger: Arc<dyn WinnerLedger>,
    registry: Arc<dyn EntityRegistry>,
    page_size: usize,
    state: RwLock<BoardState>,
}

impl WinnersBoard {
    pub fn new(
        ledger: Arc<dyn WinnerLedger>,
        registry: Arc<dyn EntityRegistry>,
        page_size: usize,
    ) -> Self {
        Self {
            ledger,
            registry,
            page_size,
            state: RwLock::new(BoardState {
                rows: Vec::new(),
                total: 0,
                page: 1,
                sort: SortField::Id,
                order: SortOrder::Asc,
            }),
        }
    }

    pub fn rows(&self) -> Vec<WinnerRow> {
        self.state.read().rows.clone()
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

    pub fn sorting(&self) -> (SortField, SortOrder) {
        let state = self.state.read();
        (state.sort, state.order)
    }

    /// Toggle sorting: the same field flips the order, a new field starts
    /// ascending. Re-fetches the current page.
    pub async fn toggle_sort(&self, field: SortField) -> Result<()> {
        {
            let mut state = self.state.write();
            if state.sort == field {
                state.order = state.order.flipped();
            } else {
                state.sort = field;
                state.order = SortOrder::Asc;
            }
        }
        self.reload().await
    }

    /// Fetch one page of winner rows and make it current.
    pub async fn load_page(&self, page: usize) -> Result<()> {
        let page = page.max(1);
        let (sort, order) = self.sorting();
        let fetched = self
            .ledger
            .list_winners(page, self.page_size, sort, order)
            .await?;
        let lookup = self.entity_lookup().await?;

        let rows = fetched
            .winners
            .into_iter()
            .map(|record| WinnerRow {
                entity: lookup.get(&record.id).cloned(),
                record,
            })
            .collect();

        let mut state = self.state.write();
        state.page = page;
        state.rows = rows;
        state.total = fetched.total;
        Ok(())
    }

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

    /// Sweep the registry page by page into an id lookup table.
    async fn entity_lookup(&self) -> Result<HashMap<u32, Entity>> {
        let mut all = HashMap::new();
        let mut page = 1;
        loop {
            let fetched = self
                .registry
                .list_entities(page, ENTITY_LOOKUP_PAGE_SIZE)
                .await?;
            let count = fetched.entities.len();
            for entity in fetched.entities {
                all.insert(entity.id, entity);
            }
            if all.len() >= fetched.total || count == 0 {
                break;
            }
            page += 1;
        }
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::traits::mocks::{MockLedger, MockRegistry};

    fn record(id: u32, wins: u32, time: f64) -> WinnerRecord {
        WinnerRecord { id, wins, time }
    }

    fn board(winners: Vec<WinnerRecord>, entity_count: u32) -> WinnersBoard {
        WinnersBoard::new(
            Arc::new(MockLedger::with_winners(winners)),
            Arc::new(MockRegistry::new(entity_count)),
            10,
        )
    }

    #[tokio::test]
    async fn test_rows_join_ledger_records_with_entities() {
        // Entity 99 is not in the registry.
        let board = board(
            vec![record(1, 3, 4.5), record(2, 1, 2.2), record(99, 5, 1.1)],
            3,
        );
        board.load_page(1).await.unwrap();

        let rows = board.rows();
        assert_eq!(rows.len(), 3);
        assert_eq!(board.total(), 3);

        let known = rows.iter().find(|r| r.record.id == 1).unwrap();
        assert_eq!(known.entity.as_ref().unwrap().name, "Entity 1");

        let unknown = rows.iter().find(|r| r.record.id == 99).unwrap();
        assert!(unknown.entity.is_none());
    }

    #[tokio::test]
    async fn test_toggle_sort_flips_and_resets() {
        let board = board(
            vec![record(1, 3, 4.5), record(2, 1, 2.2), record(3, 5, 1.1)],
            3,
        );
        board.load_page(1).await.unwrap();
        assert_eq!(board.sorting(), (SortField::Id, SortOrder::Asc));

        board.toggle_sort(SortField::Time).await.unwrap();
        assert_eq!(board.sorting(), (SortField::Time, SortOrder::Asc));
        let times: Vec<f64> = board.rows().iter().map(|r| r.record.time).collect();
        assert_eq!(times, vec![1.1, 2.2, 4.5]);

        // Same field again flips the order.
        board.toggle_sort(SortField::Time).await.unwrap();
        assert_eq!(board.sorting(), (SortField::Time, SortOrder::Desc));
        let times: Vec<f64> = board.rows().iter().map(|r| r.record.time).collect();
        assert_eq!(times, vec![4.5, 2.2, 1.1]);

        // A new field starts ascending again.
        board.toggle_sort(SortField::Wins).await.unwrap();
        assert_eq!(board.sorting(), (SortField::Wins, SortOrder::Asc));
        let wins: Vec<u32> = board.rows().iter().map(|r| r.record.wins).collect();
        assert_eq!(wins, vec![1, 3, 5]);
    }

    #[tokio::test]
    async fn test_board_pagination() {
        let winners: Vec<WinnerRecord> =
            (1..=23).map(|i| record(i, i, f64::from(i))).collect();
        let board = board(winners, 5);

        board.load_page(1).await.unwrap();
        assert_eq!(board.rows().len(), 10);
        assert_eq!(board.total(), 23);
        assert_eq!(board.total_pages(), 3);

        board.next_page().await.unwrap();
        board.next_page().await.unwrap();
        assert_eq!(board.page(), 3);
        assert_eq!(board.rows().len(), 3);

        board.next_page().await.unwrap();
        assert_eq!(board.page(), 3);
    }

    #[tokio::test]
    async fn test_entity_lookup_sweeps_every_registry_page() {
        // More entities than one lookup page.
        let winners = vec![record(150, 1, 9.9)];
        let board = WinnersBoard::new(
            Arc::new(MockLedger::with_winners(winners)),
            Arc::new(MockRegistry::new(250)),
            10,
        );
        board.load_page(1).await.unwrap();

        let rows = board.rows();
        assert_eq!(rows[0].entity.as_ref().unwrap().name, "Entity 150");
    }
}
