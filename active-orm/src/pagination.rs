//! # Pagination Module
//!
//! Page request and page result types of the paginated finders.
//!
//! Page numbers are 1-indexed. A [`Pagination`] can be deserialized straight
//! from query parameters (e.g. `?page=2&size=20`), and both result types
//! serialize to JSON for API responses.
//!
//! ## Example
//!
//! ```rust,ignore
//! use active_orm::pagination::Pagination;
//!
//! let request = Pagination::new(2, 10);
//! let page = session
//!     .model::<User>()
//!     .full_paginate_all(request.page, request.size)
//!     .await?;
//!
//! println!("{} of {} pages", page.page_number, page.total_page);
//! ```

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// The page number (1-indexed). Default: 1.
    #[serde(default = "default_page")]
    pub page: usize,

    /// The number of rows per page. Default: 10.
    #[serde(default = "default_size")]
    pub size: usize,
}

fn default_page() -> usize {
    1
}

fn default_size() -> usize {
    10
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: default_page(), size: default_size() }
    }
}

impl Pagination {
    pub fn new(page: usize, size: usize) -> Self {
        Self { page, size }
    }

    /// Rejects page numbers and sizes lower than 1, and pages whose offset
    /// does not fit in a SQL `BIGINT`.
    pub fn validate(&self) -> Result<()> {
        if self.page < 1 || self.size < 1 {
            return Err(Error::Usage(format!(
                "Page number and page size must be at least 1 (page: {}, size: {})",
                self.page, self.size
            )));
        }
        let offset = (self.page - 1).checked_mul(self.size);
        let fits = |n: usize| i64::try_from(n).is_ok();
        if !offset.is_some_and(fits) || !fits(self.size) {
            return Err(Error::Usage(format!(
                "Page {} of size {} is out of range",
                self.page, self.size
            )));
        }
        Ok(())
    }

    /// Number of rows skipped before this page.
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.size)
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub list: Vec<T>,
    pub page_number: usize,
    pub page_size: usize,
}

impl<T> Page<T> {
    pub fn new(list: Vec<T>, page_number: usize, page_size: usize) -> Self {
        Self { list, page_number, page_size }
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}

/// One page of results plus the totals of the whole result set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FullPage<T> {
    pub list: Vec<T>,
    pub page_number: usize,
    pub page_size: usize,
    pub total_page: usize,
    pub total_row: usize,
}

impl<T> FullPage<T> {
    /// Builds the page; `total_page` is `ceil(total_row / page_size)`.
    pub fn new(list: Vec<T>, page_number: usize, page_size: usize, total_row: usize) -> Self {
        let total_page = if page_size == 0 { 0 } else { total_row.div_ceil(page_size) };
        Self { list, page_number, page_size, total_page, total_row }
    }

    /// A page of a result set without rows.
    pub fn empty(page_number: usize, page_size: usize) -> Self {
        Self::new(Vec::new(), page_number, page_size, 0)
    }
}

impl<T> From<FullPage<T>> for Page<T> {
    fn from(page: FullPage<T>) -> Self {
        Page::new(page.list, page.page_number, page.page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_pages_round_up() {
        let page = FullPage::new(vec![1, 2, 3], 3, 10, 23);
        assert_eq!(page.total_page, 3);

        assert_eq!(FullPage::<i32>::new(vec![], 1, 10, 20).total_page, 2);
        assert_eq!(FullPage::<i32>::new(vec![], 1, 10, 1).total_page, 1);
    }

    #[test]
    fn test_empty_result_has_no_pages() {
        let page = FullPage::<i32>::empty(1, 10);
        assert_eq!(page.total_row, 0);
        assert_eq!(page.total_page, 0);
        assert!(page.list.is_empty());
    }

    #[test]
    fn test_validation_and_offset() {
        assert!(Pagination::new(1, 1).validate().is_ok());
        assert!(matches!(Pagination::new(0, 10).validate(), Err(Error::Usage(_))));
        assert!(matches!(Pagination::new(1, 0).validate(), Err(Error::Usage(_))));
        assert_eq!(Pagination::new(3, 10).offset(), 20);
    }

    #[test]
    fn test_offset_overflow_is_rejected() {
        assert!(matches!(Pagination::new(usize::MAX, 2).validate(), Err(Error::Usage(_))));
        assert!(matches!(Pagination::new(2, usize::MAX).validate(), Err(Error::Usage(_))));
        assert_eq!(Pagination::new(usize::MAX, 2).offset(), usize::MAX);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let request: Pagination = serde_json::from_str(r#"{ "page": 4 }"#).unwrap();
        assert_eq!(request, Pagination::new(4, 10));
    }

    #[test]
    fn test_serializes_totals() {
        let json = serde_json::to_value(FullPage::new(vec!["a"], 1, 1, 2)).unwrap();
        assert_eq!(json["total_page"], 2);
        assert_eq!(json["list"][0], "a");
    }
}
