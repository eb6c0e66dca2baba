//! Pagination helpers

use serde::Serialize;

/// Page request, already clamped to valid bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListParams {
    /// Page number (1-indexed)
    pub page: u32,
    pub page_size: u32,
}

impl ListParams {
    /// Clamp a raw request: pages start at 1, sizes fall in `1..=max_page_size`
    pub fn new(page: Option<u32>, page_size: Option<u32>, default_size: u32, max_page_size: u32) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            page_size: page_size.unwrap_or(default_size).clamp(1, max_page_size.max(1)),
        }
    }

    /// Calculate the offset for database queries
    pub fn offset(&self) -> i64 {
        (self.page.saturating_sub(1) as i64) * self.page_size as i64
    }

    /// Get the limit for database queries
    pub fn limit(&self) -> i64 {
        self.page_size as i64
    }
}

/// Pagination metadata returned next to a page of items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total: i64,
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(params: &ListParams, total: i64) -> Self {
        let size = params.page_size.max(1) as i64;
        Self {
            page: params.page,
            page_size: params.page_size,
            total,
            total_pages: (total + size - 1) / size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_clamping() {
        let p = ListParams::new(None, None, 10, 100);
        assert_eq!((p.page, p.page_size), (1, 10));

        let p = ListParams::new(Some(0), Some(500), 10, 100);
        assert_eq!((p.page, p.page_size), (1, 100));

        let p = ListParams::new(Some(3), Some(0), 10, 100);
        assert_eq!((p.page, p.page_size), (3, 1));
    }

    #[test]
    fn test_offset() {
        assert_eq!(ListParams::new(Some(1), Some(10), 10, 100).offset(), 0);
        assert_eq!(ListParams::new(Some(4), Some(25), 10, 100).offset(), 75);
    }

    #[test]
    fn test_total_pages() {
        let p = ListParams::new(Some(1), Some(10), 10, 100);
        assert_eq!(Pagination::new(&p, 0).total_pages, 0);
        assert_eq!(Pagination::new(&p, 10).total_pages, 1);
        assert_eq!(Pagination::new(&p, 11).total_pages, 2);
    }
}
