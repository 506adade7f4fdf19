//! # Pagination
//!
//! Page arithmetic for score-ordered listings. Out-of-range page numbers land
//! on the last page; a listing with no items still has one (empty) page.

use serde::Serialize;

use crate::error::{AppError, Result};

/// Posts per front-page page.
pub const FRONT_PAGE_SIZE: u64 = 25;

/// Parses the raw `page` query parameter. Absent means page 1.
///
/// Non-integer input is reported as a missing page, so the HTTP layer answers 404.
pub fn parse_page_param(raw: Option<&str>) -> Result<i64> {
    match raw {
        None => Ok(1),
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .map_err(|_| AppError::not_found("Page", raw)),
    }
}

/// Position of one page within a listing of `total` items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageWindow {
    /// 1-based page number after clamping
    pub number: u64,
    pub num_pages: u64,
    #[serde(skip)]
    pub offset: u64,
    #[serde(skip)]
    pub limit: u64,
    pub has_previous: bool,
    pub has_next: bool,
}

impl PageWindow {
    pub fn new(total: u64, per_page: u64, requested: i64) -> Self {
        let per_page = per_page.max(1);
        let num_pages = total.div_ceil(per_page).max(1);
        let number = match u64::try_from(requested) {
            Ok(n) if (1..=num_pages).contains(&n) => n,
            _ => num_pages,
        };
        PageWindow {
            number,
            num_pages,
            offset: (number - 1) * per_page,
            limit: per_page,
            has_previous: number > 1,
            has_next: number < num_pages,
        }
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(flatten)]
    pub window: PageWindow,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_param_parsing() {
        assert_eq!(parse_page_param(None).unwrap(), 1);
        assert_eq!(parse_page_param(Some("2")).unwrap(), 2);
        assert!(matches!(parse_page_param(Some("something")), Err(AppError::NotFound(_, _))));
    }

    #[test]
    fn fifty_items_make_two_pages() {
        let first = PageWindow::new(50, 25, 1);
        assert_eq!((first.number, first.num_pages, first.offset), (1, 2, 0));
        assert!(!first.has_previous && first.has_next);

        let second = PageWindow::new(50, 25, 2);
        assert_eq!(second.offset, 25);
        assert!(second.has_previous && !second.has_next);
    }

    #[test]
    fn out_of_range_clamps_to_last_page() {
        assert_eq!(PageWindow::new(50, 25, 10).number, 2);
        assert_eq!(PageWindow::new(50, 25, 0).number, 2);
        assert_eq!(PageWindow::new(51, 25, -1).number, 3);
    }

    #[test]
    fn empty_listing_has_one_page() {
        let w = PageWindow::new(0, 25, 1);
        assert_eq!((w.number, w.num_pages, w.offset), (1, 1, 0));
        assert!(!w.has_next && !w.has_previous);
    }
}
