//! Paging over list endpoints
//!
//! Bid and notification lists are small, so handlers load the full result
//! and cut one page out of it.

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::ops::Range;

const DEFAULT_PER_PAGE: u32 = 20;

/// `?page=&per_page=` query parameters
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PaginationParams {
    /// 1-indexed
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl PaginationParams {
    pub const MAX_PER_PAGE: u32 = 100;

    pub fn per_page(&self) -> u32 {
        self.per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, Self::MAX_PER_PAGE)
    }

    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    /// Index range of the requested page within `total` items.
    fn window(&self, total: usize) -> Range<usize> {
        let per_page = self.per_page() as usize;
        let start = (self.page() as usize - 1).saturating_mul(per_page).min(total);
        start..(start + per_page).min(total)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaginationMeta {
    pub page: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

/// One page of a list plus where it sits in the whole
#[derive(Debug, Serialize)]
pub struct Paginated<T: Serialize> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

impl<T: Serialize> Paginated<T> {
    pub fn from_all(mut items: Vec<T>, params: &PaginationParams) -> Self {
        let total = items.len();
        let window = params.window(total);
        items.truncate(window.end);
        let data = items.split_off(window.start);

        let page = params.page();
        let per_page = params.per_page();
        let total_pages = total.div_ceil(per_page as usize) as u32;

        Self {
            data,
            pagination: PaginationMeta {
                page,
                per_page,
                total_items: total as u64,
                total_pages,
                has_next: page < total_pages,
                has_prev: page > 1,
            },
        }
    }
}

impl<T: Serialize> IntoResponse for Paginated<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(page: u32, per_page: u32) -> PaginationParams {
        PaginationParams {
            page: Some(page),
            per_page: Some(per_page),
        }
    }

    #[test]
    fn slices_requested_page() {
        let page = Paginated::from_all((1..=8).collect::<Vec<u32>>(), &params(2, 3));

        assert_eq!(page.data, vec![4, 5, 6]);
        assert_eq!(page.pagination.total_items, 8);
        assert_eq!(page.pagination.total_pages, 3);
        assert!(page.pagination.has_next);
        assert!(page.pagination.has_prev);
    }

    #[test]
    fn page_past_the_end_is_empty() {
        let page = Paginated::from_all(vec![1, 2], &params(5, 10));
        assert!(page.data.is_empty());
        assert!(!page.pagination.has_next);
    }

    #[test]
    fn per_page_is_clamped() {
        let p = params(0, 1000);
        assert_eq!(p.page(), 1);
        assert_eq!(p.per_page(), PaginationParams::MAX_PER_PAGE);
    }
}
