//! Pagination types for history listings.

use serde::{Deserialize, Serialize};

/// Request parameters for paginated queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Page number (1-indexed).
    #[serde(default = "default_page")]
    pub page: u32,
    /// Number of items per page.
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    20
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

impl PageRequest {
    /// Creates a page request.
    #[must_use]
    pub const fn new(page: u32, per_page: u32) -> Self {
        Self { page, per_page }
    }

    /// Returns a copy with `page >= 1` and `1 <= per_page <= max_per_page`.
    #[must_use]
    pub fn clamped(self, max_per_page: u32) -> Self {
        Self {
            page: self.page.max(1),
            per_page: self.per_page.clamp(1, max_per_page.max(1)),
        }
    }

    /// Calculates the offset for database queries.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }

    /// Returns the limit for database queries.
    #[must_use]
    pub fn limit(&self) -> u64 {
        u64::from(self.per_page)
    }
}

/// Response wrapper for paginated data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResponse<T> {
    /// The items in the current page.
    pub data: Vec<T>,
    /// Pagination metadata.
    pub meta: PageMeta,
}

/// Pagination metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    /// Current page number.
    pub page: u32,
    /// Items per page.
    pub per_page: u32,
    /// Total number of items across all pages.
    pub total: u64,
    /// Total number of pages.
    pub total_pages: u64,
}

impl<T> PageResponse<T> {
    /// Creates a new paginated response.
    #[must_use]
    pub fn new(data: Vec<T>, request: PageRequest, total: u64) -> Self {
        let per_page = u64::from(request.per_page.max(1));
        let total_pages = if total == 0 { 1 } else { total.div_ceil(per_page) };

        Self {
            data,
            meta: PageMeta {
                page: request.page,
                per_page: request.per_page,
                total,
                total_pages,
            },
        }
    }

    /// Transforms the page items, keeping the metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PageResponse<U> {
        PageResponse {
            data: self.data.into_iter().map(f).collect(),
            meta: self.meta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_default() {
        let request = PageRequest::default();
        assert_eq!(request.page, 1);
        assert_eq!(request.per_page, 20);
    }

    #[test]
    fn test_page_request_offset() {
        assert_eq!(PageRequest::new(1, 20).offset(), 0);
        assert_eq!(PageRequest::new(3, 20).offset(), 40);
        assert_eq!(PageRequest::new(0, 20).offset(), 0);
    }

    #[test]
    fn test_page_request_clamped() {
        assert_eq!(PageRequest::new(0, 500).clamped(100), PageRequest::new(1, 100));
        assert_eq!(PageRequest::new(2, 0).clamped(100), PageRequest::new(2, 1));
        assert_eq!(PageRequest::new(4, 30).clamped(100), PageRequest::new(4, 30));
    }

    #[test]
    fn test_page_response_total_pages() {
        let response: PageResponse<i32> = PageResponse::new(vec![], PageRequest::new(1, 10), 25);
        assert_eq!(response.meta.total_pages, 3);

        let response: PageResponse<i32> = PageResponse::new(vec![], PageRequest::new(1, 10), 30);
        assert_eq!(response.meta.total_pages, 3);

        let response: PageResponse<i32> = PageResponse::new(vec![], PageRequest::new(1, 10), 0);
        assert_eq!(response.meta.total_pages, 1);
    }

    #[test]
    fn test_page_response_map() {
        let response = PageResponse::new(vec![1, 2, 3], PageRequest::new(1, 10), 3).map(|n| n * 2);
        assert_eq!(response.data, vec![2, 4, 6]);
        assert_eq!(response.meta.total, 3);
    }
}
