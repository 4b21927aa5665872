use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Represents pagination parameters for SQL queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pagination {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl Pagination {
    /// Create pagination with page number (1-indexed) and per-page count.
    /// An offset past `u32::MAX` saturates and reads as an empty page.
    pub fn new(page: u32, per_page: u32) -> Self {
        let offset = page.checked_sub(1).map(|p| p.saturating_mul(per_page));
        Self {
            limit: Some(per_page),
            offset,
        }
    }

    /// Create pagination with only limit
    pub fn limit_only(limit: u32) -> Self {
        Self {
            limit: Some(limit),
            offset: None,
        }
    }

    /// Create pagination with both limit and offset
    pub fn limit_offset(limit: u32, offset: u32) -> Self {
        Self {
            limit: Some(limit),
            offset: Some(offset),
        }
    }

    /// Convert to SQL string. SQLite needs a LIMIT before an OFFSET, so an
    /// offset on its own renders `LIMIT -1`.
    pub fn to_sql(&self) -> String {
        let mut sql = String::new();

        match (self.limit, self.offset) {
            (Some(limit), _) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(_)) => sql.push_str(" LIMIT -1"),
            (None, None) => {}
        }

        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        sql
    }

    /// Calculate total pages given a total count
    pub fn total_pages(&self, total_count: u64) -> u64 {
        match self.limit {
            Some(limit) if limit > 0 => total_count.div_ceil(u64::from(limit)),
            _ => 1,
        }
    }

    /// Get current page number (1-indexed)
    pub fn current_page(&self) -> u32 {
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) if limit > 0 => (offset / limit) + 1,
            _ => 1,
        }
    }

    /// Check if there's a next page
    pub fn has_next_page(&self, total_count: u64) -> bool {
        match self.limit {
            Some(limit) => {
                u64::from(self.offset.unwrap_or(0)) + u64::from(limit) < total_count
            }
            None => false,
        }
    }

    /// Check if there's a previous page
    pub fn has_previous_page(&self) -> bool {
        self.offset.is_some_and(|offset| offset > 0)
    }
}

/// Receives the unpaged row count of a paginated read.
///
/// Pass a handle to [`QueryProcessor::paginate`](super::QueryProcessor::paginate);
/// the repository stores the count of all matching rows (distinct groups
/// when the query groups) once the read completes.
#[derive(Debug, Clone, Default)]
pub struct TotalCount(Arc<AtomicI64>);

impl TotalCount {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn set(&self, total: i64) {
        self.0.store(total, Ordering::Release);
    }
}

/// One page of a collection plus the count of every matching row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: i64,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total_count: i64, pagination: Pagination) -> Self {
        Self {
            items,
            total_count,
            limit: pagination.limit,
            offset: pagination.offset,
        }
    }

    fn pagination(&self) -> Pagination {
        Pagination {
            limit: self.limit,
            offset: self.offset,
        }
    }

    pub fn total_pages(&self) -> u64 {
        self.pagination().total_pages(self.total_count.max(0) as u64)
    }

    pub fn current_page(&self) -> u32 {
        self.pagination().current_page()
    }

    pub fn has_next_page(&self) -> bool {
        self.pagination().has_next_page(self.total_count.max(0) as u64)
    }

    pub fn has_previous_page(&self) -> bool {
        self.pagination().has_previous_page()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total_count: self.total_count,
            limit: self.limit,
            offset: self.offset,
        }
    }
}
