//! Table-state core: what is on screen and how it maps back to the store.
//!
//! `TableView` owns the page cursor and the row identity map for the current
//! table. Every fetch (page, full table or search) resets the identity map and
//! rebinds the rows it returns. Mutations go through
//! [`MutationOrchestrator`](crate::mutation::MutationOrchestrator), which only
//! touches the view after the store accepted the write.

mod cursor;
mod identity;
mod search;

pub use cursor::{PageCursor, PageWindow};
pub use identity::{RowHandle, RowIdentityMap};
pub use search::{SearchFilter, SearchSpec};

use crate::db::{Column, FetchMode, Row, StoreGateway, Value};
use crate::error::{BrowseError, Result};

pub struct TableView {
    gateway: StoreGateway,
    paginate: bool,
    cursor: PageCursor,
    identity: RowIdentityMap,
    order: Vec<RowHandle>,
    columns: Vec<Column>,
    search: Option<SearchSpec>,
    row_count: usize,
}

impl TableView {
    /// With `paginate` off every load fetches the whole table.
    pub fn new(gateway: StoreGateway, page_size: usize, paginate: bool) -> Self {
        TableView {
            gateway,
            paginate,
            cursor: PageCursor::new(page_size),
            identity: RowIdentityMap::new(),
            order: Vec::new(),
            columns: Vec::new(),
            search: None,
            row_count: 0,
        }
    }

    pub fn gateway(&self) -> &StoreGateway {
        &self.gateway
    }

    pub fn table(&self) -> Option<&str> {
        self.cursor.table()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn search(&self) -> Option<&SearchSpec> {
        self.search.as_ref()
    }

    pub fn window(&self) -> PageWindow {
        self.cursor.window()
    }

    /// Rows in the whole table as of the last load, not just the ones on screen.
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn is_paginated(&self) -> bool {
        self.paginate
    }

    pub fn page_position(&self) -> (usize, usize) {
        if self.paginate {
            self.cursor.page_position(self.row_count)
        } else {
            (1, 1)
        }
    }

    pub fn mode(&self) -> FetchMode {
        match &self.search {
            Some(search) => FetchMode::Filtered(search.clone()),
            None if self.paginate => FetchMode::Paged(self.cursor.window()),
            None => FetchMode::Full,
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn handle_at(&self, index: usize) -> Option<RowHandle> {
        self.order.get(index).copied()
    }

    pub fn lookup(&self, handle: RowHandle) -> Result<&Row> {
        self.identity.lookup(handle)
    }

    /// Rows on screen, in view order.
    pub fn rows(&self) -> impl Iterator<Item = (RowHandle, &Row)> + '_ {
        self.order
            .iter()
            .filter_map(|h| self.identity.lookup(*h).ok().map(|row| (*h, row)))
    }

    /// Switches to `table` at offset 0. On error the previous view is kept.
    pub async fn open_table(&mut self, table: &str) -> Result<()> {
        let mut cursor = self.cursor.clone();
        cursor.set_table(table);
        let mode = if self.paginate {
            FetchMode::Paged(cursor.window())
        } else {
            FetchMode::Full
        };

        let (rows, columns, row_count) = self.fetch(table, &mode).await?;
        self.cursor = cursor;
        self.search = None;
        self.install(rows, columns, row_count);
        tracing::debug!(table = %table, "opened table");
        Ok(())
    }

    /// Reloads the current window. An active search is dropped.
    pub async fn refresh(&mut self) -> Result<()> {
        let table = self.current_table()?;
        if self.paginate {
            let row_count = self.gateway.row_count(&table).await?;
            self.load_window(&table, self.cursor.clone(), row_count).await?;
        } else {
            let (rows, columns, row_count) = self.fetch(&table, &FetchMode::Full).await?;
            self.install(rows, columns, row_count);
        }
        self.search = None;
        Ok(())
    }

    /// Returns false when there is nothing to page (search results, full view).
    pub async fn next_page(&mut self) -> Result<bool> {
        if !self.paginate || self.search.is_some() {
            return Ok(false);
        }
        let table = self.current_table()?;
        let row_count = self.gateway.row_count(&table).await?;
        let mut cursor = self.cursor.clone();
        cursor.next_page(row_count);
        self.load_window(&table, cursor, row_count).await?;
        Ok(true)
    }

    pub async fn previous_page(&mut self) -> Result<bool> {
        if !self.paginate || self.search.is_some() {
            return Ok(false);
        }
        let table = self.current_table()?;
        let row_count = self.gateway.row_count(&table).await?;
        let mut cursor = self.cursor.clone();
        cursor.previous_page();
        self.load_window(&table, cursor, row_count).await?;
        Ok(true)
    }

    /// Replaces the view with rows whose `column` contains `pattern`.
    ///
    /// The page cursor is left alone so that `clear_search` returns to it.
    pub async fn apply_search(&mut self, column: &str, pattern: &str) -> Result<()> {
        let table = self.current_table()?;
        let search = SearchSpec::new(column, pattern);
        let (rows, columns) = SearchFilter::new(&self.gateway)
            .apply(&table, &self.columns, &search)
            .await?;
        let row_count = self.gateway.row_count(&table).await?;

        self.search = Some(search);
        self.install(rows, columns, row_count);
        Ok(())
    }

    pub async fn clear_search(&mut self) -> Result<()> {
        if self.search.is_none() {
            return Ok(());
        }
        self.refresh().await
    }

    /// Drops `handle` and every other row on screen equal to `prior`, matching what
    /// the store deleted.
    pub(crate) fn remove_matching(&mut self, handle: RowHandle, prior: &Row, affected: usize) -> Result<()> {
        self.identity.remove(handle)?;
        self.order.retain(|h| *h != handle);

        if affected > 1 {
            let duplicates: Vec<RowHandle> = self
                .rows()
                .filter(|(_, row)| *row == prior)
                .map(|(h, _)| h)
                .collect();
            for h in duplicates {
                self.identity.remove(h)?;
                self.order.retain(|o| *o != h);
            }
        }

        self.row_count = self.row_count.saturating_sub(affected);
        Ok(())
    }

    /// Writes `value` into `column` of `handle` and of any on-screen duplicates the
    /// store also updated.
    pub(crate) fn replace_matching(
        &mut self,
        handle: RowHandle,
        prior: &Row,
        column: usize,
        value: Value,
        affected: usize,
    ) -> Result<()> {
        let mut targets = vec![handle];
        if affected > 1 {
            targets.extend(
                self.rows()
                    .filter(|(h, row)| *h != handle && *row == prior)
                    .map(|(h, _)| h),
            );
        }

        for h in targets {
            let mut row = self.identity.lookup(h)?.clone();
            if let Some(cell) = row.get_mut(column) {
                *cell = value.clone();
            }
            self.identity.rebind(h, row)?;
        }
        Ok(())
    }

    pub(crate) fn append_row(&mut self, row: Row) -> RowHandle {
        let handle = self.identity.bind(row);
        self.order.push(handle);
        self.row_count += 1;
        handle
    }

    fn current_table(&self) -> Result<String> {
        self.cursor
            .table()
            .map(str::to_string)
            .ok_or(BrowseError::InvalidTransition {
                action: "load rows",
                state: "no table is open",
            })
    }

    /// Loads `cursor`'s page, first clamping it to `row_count`.
    async fn load_window(&mut self, table: &str, mut cursor: PageCursor, row_count: usize) -> Result<()> {
        cursor.clamp(row_count);
        let (rows, columns) = self
            .gateway
            .fetch(table, &FetchMode::Paged(cursor.window()))
            .await?;
        self.cursor = cursor;
        self.install(rows, columns, row_count);
        Ok(())
    }

    async fn fetch(&self, table: &str, mode: &FetchMode) -> Result<(Vec<Row>, Vec<Column>, usize)> {
        let (rows, columns) = self.gateway.fetch(table, mode).await?;
        let row_count = match mode {
            FetchMode::Full => rows.len(),
            _ => self.gateway.row_count(table).await?,
        };
        Ok((rows, columns, row_count))
    }

    fn install(&mut self, rows: Vec<Row>, columns: Vec<Column>, row_count: usize) {
        self.identity.reset();
        self.order = rows.into_iter().map(|row| self.identity.bind(row)).collect();
        self.columns = columns;
        self.row_count = row_count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{events_schema, scratch_gateway};

    async fn events_view(count: usize, page_size: usize) -> (tempfile::TempDir, TableView) {
        let (dir, gateway) = scratch_gateway(&events_schema(count)).await;
        let mut view = TableView::new(gateway, page_size, true);
        view.open_table("events").await.unwrap();
        (dir, view)
    }

    fn first_values(view: &TableView) -> Vec<Value> {
        view.rows().map(|(_, row)| row[0].clone()).collect()
    }

    #[tokio::test]
    async fn test_open_table_loads_first_page() {
        let (_dir, view) = events_view(45, 10).await;

        assert_eq!(view.table(), Some("events"));
        assert_eq!(view.len(), 10);
        assert_eq!(view.row_count(), 45);
        assert_eq!(view.columns()[0].name, "n");
        assert_eq!(view.handle_at(0).unwrap().slot(), 0);
        assert_eq!(view.page_position(), (1, 5));
    }

    #[tokio::test]
    async fn test_paging_to_the_end_clamps() {
        let (_dir, mut view) = events_view(45, 10).await;

        for _ in 0..4 {
            assert!(view.next_page().await.unwrap());
        }
        assert_eq!(view.window().offset, 40);
        assert_eq!(view.len(), 5);

        view.next_page().await.unwrap();
        assert_eq!(view.window().offset, 35);
        assert_eq!(view.len(), 10);
        assert_eq!(first_values(&view)[0], Value::Integer(36));

        view.next_page().await.unwrap();
        assert_eq!(view.window().offset, 35);
    }

    #[tokio::test]
    async fn test_page_change_invalidates_handles() {
        let (_dir, mut view) = events_view(45, 10).await;
        let old = view.handle_at(0).unwrap();

        view.next_page().await.unwrap();
        assert!(matches!(view.lookup(old), Err(BrowseError::UnknownHandle(_))));

        view.previous_page().await.unwrap();
        assert_eq!(view.window().offset, 0);
        assert!(view.lookup(old).is_err());
    }

    #[tokio::test]
    async fn test_refresh_after_deleting_last_page_moves_back() {
        let (_dir, mut view) = events_view(45, 10).await;
        for _ in 0..4 {
            view.next_page().await.unwrap();
        }
        assert_eq!(view.window().offset, 40);

        let columns = view.columns().to_vec();
        let last_page: Vec<Row> = view.rows().map(|(_, row)| row.clone()).collect();
        for row in &last_page {
            view.gateway().delete_row("events", row, &columns).await.unwrap();
        }

        view.refresh().await.unwrap();
        assert_eq!(view.window().offset, 30);
        assert_eq!(view.row_count(), 40);
        assert_eq!(view.len(), 10);
        assert_eq!(view.page_position(), (4, 4));
        assert_eq!(first_values(&view)[0], Value::Integer(31));
    }

    #[tokio::test]
    async fn test_open_unknown_table_keeps_view() {
        let (_dir, mut view) = events_view(5, 10).await;
        let handle = view.handle_at(0).unwrap();

        let err = view.open_table("missing").await.unwrap_err();
        assert!(matches!(err, BrowseError::NoSuchTable(_)));
        assert_eq!(view.table(), Some("events"));
        assert!(view.lookup(handle).is_ok());
    }

    #[tokio::test]
    async fn test_search_round_trip_restores_window() {
        let (_dir, mut view) = events_view(45, 10).await;
        view.next_page().await.unwrap();
        view.next_page().await.unwrap();
        let window = view.window();

        view.apply_search("n", "3").await.unwrap();
        assert!(view.search().is_some());
        assert!(matches!(view.mode(), FetchMode::Filtered(_)));
        // 3, 13, 23, 30..=39, 43
        assert_eq!(view.len(), 14);
        assert_eq!(view.window(), window);
        assert!(!view.next_page().await.unwrap());

        view.clear_search().await.unwrap();
        assert!(view.search().is_none());
        assert_eq!(view.window(), window);
        assert_eq!(first_values(&view)[0], Value::Integer(21));
    }

    #[tokio::test]
    async fn test_search_unknown_column_leaves_view() {
        let (_dir, mut view) = events_view(5, 10).await;
        let handle = view.handle_at(2).unwrap();

        let err = view.apply_search("missing", "x").await.unwrap_err();
        assert!(matches!(err, BrowseError::InvalidColumn { .. }));
        assert!(view.search().is_none());
        assert_eq!(view.lookup(handle).unwrap(), &vec![Value::Integer(3)]);
    }

    #[tokio::test]
    async fn test_unpaginated_view_fetches_everything() {
        let (_dir, gateway) = scratch_gateway(&events_schema(120)).await;
        let mut view = TableView::new(gateway, 10, false);
        view.open_table("events").await.unwrap();

        assert_eq!(view.mode(), FetchMode::Full);
        assert_eq!(view.len(), 120);
        assert!(!view.next_page().await.unwrap());
        assert_eq!(view.page_position(), (1, 1));
    }

    #[tokio::test]
    async fn test_refresh_without_table_is_invalid() {
        let (_dir, gateway) = scratch_gateway(&events_schema(1)).await;
        let mut view = TableView::new(gateway, 10, true);

        let err = view.refresh().await.unwrap_err();
        assert!(err.is_internal());
    }
}
