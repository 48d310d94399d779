use serde::{Deserialize, Serialize};

/// The `(offset, limit)` slice of a table held by the current view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageWindow {
    pub offset: usize,
    pub limit: usize,
}

/// Pagination state for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    table: Option<String>,
    offset: usize,
    limit: usize,
}

impl PageCursor {
    /// A zero limit is raised to 1.
    pub fn new(limit: usize) -> Self {
        PageCursor {
            table: None,
            offset: 0,
            limit: limit.max(1),
        }
    }

    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn window(&self) -> PageWindow {
        PageWindow {
            offset: self.offset,
            limit: self.limit,
        }
    }

    /// Switches tables, starting again at the first page with the same limit.
    pub fn set_table(&mut self, table: &str) {
        self.table = Some(table.to_string());
        self.offset = 0;
    }

    /// Advances one page; at the end it settles on the last full (or only) page.
    pub fn next_page(&mut self, row_count: usize) {
        if self.offset + self.limit >= row_count {
            self.offset = row_count.saturating_sub(self.limit);
        } else {
            self.offset += self.limit;
        }
    }

    /// Pulls the offset back onto the last page when the table shrank under it.
    pub fn clamp(&mut self, row_count: usize) {
        if self.offset > 0 && self.offset >= row_count {
            self.offset = row_count.saturating_sub(self.limit);
        }
    }

    pub fn previous_page(&mut self) {
        self.offset = self.offset.saturating_sub(self.limit);
    }

    /// Index of the current page and the number of pages, both for display.
    pub fn page_position(&self, row_count: usize) -> (usize, usize) {
        let pages = row_count.div_ceil(self.limit).max(1);
        let current = self.offset.div_ceil(self.limit).min(pages - 1);
        (current + 1, pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_page_clamps_to_last_full_page() {
        let mut cursor = PageCursor::new(10);
        cursor.set_table("events");
        for _ in 0..4 {
            cursor.next_page(45);
        }
        assert_eq!(cursor.window().offset, 40);

        cursor.next_page(45);
        assert_eq!(cursor.window().offset, 35);
    }

    #[test]
    fn test_next_page_converges_and_is_idempotent() {
        for (rows, limit) in [(0, 5), (3, 5), (5, 5), (45, 10), (100, 7), (101, 50)] {
            let mut cursor = PageCursor::new(limit);
            cursor.set_table("t");
            for _ in 0..(rows / limit + 3) {
                cursor.next_page(rows);
            }
            let settled = rows.saturating_sub(limit);
            assert_eq!(cursor.window().offset, settled, "rows={rows} limit={limit}");

            cursor.next_page(rows);
            assert_eq!(cursor.window().offset, settled);
        }
    }

    #[test]
    fn test_previous_page_never_goes_negative() {
        let mut cursor = PageCursor::new(10);
        cursor.set_table("events");
        cursor.next_page(45);
        cursor.next_page(45);
        cursor.previous_page();
        assert_eq!(cursor.window().offset, 10);
        cursor.previous_page();
        cursor.previous_page();
        assert_eq!(cursor.window().offset, 0);
    }

    #[test]
    fn test_single_page_navigation_is_noop() {
        let mut cursor = PageCursor::new(50);
        cursor.set_table("small");
        cursor.next_page(20);
        assert_eq!(cursor.window(), PageWindow { offset: 0, limit: 50 });
        cursor.previous_page();
        assert_eq!(cursor.window().offset, 0);
    }

    #[test]
    fn test_set_table_resets_offset_keeps_limit() {
        let mut cursor = PageCursor::new(10);
        cursor.set_table("a");
        cursor.next_page(100);
        cursor.set_table("b");

        assert_eq!(cursor.table(), Some("b"));
        assert_eq!(cursor.window(), PageWindow { offset: 0, limit: 10 });
    }

    #[test]
    fn test_clamp_after_table_shrinks() {
        let mut cursor = PageCursor::new(10);
        cursor.set_table("events");
        for _ in 0..4 {
            cursor.next_page(45);
        }
        assert_eq!(cursor.window().offset, 40);

        cursor.clamp(45);
        assert_eq!(cursor.window().offset, 40);
        cursor.clamp(40);
        assert_eq!(cursor.window().offset, 30);
        cursor.clamp(0);
        assert_eq!(cursor.window().offset, 0);
    }

    #[test]
    fn test_page_position() {
        let mut cursor = PageCursor::new(10);
        assert_eq!(cursor.page_position(0), (1, 1));
        assert_eq!(cursor.page_position(45), (1, 5));
        cursor.next_page(45);
        assert_eq!(cursor.page_position(45), (2, 5));
        for _ in 0..5 {
            cursor.next_page(45);
        }
        assert_eq!(cursor.page_position(45), (5, 5));
    }

    #[test]
    fn test_zero_limit_is_raised() {
        assert_eq!(PageCursor::new(0).window().limit, 1);
    }
}
