//! Offset pagination shared by the users backend and the list controller.

use serde::Serialize;

pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// A 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    /// Build a request, clamping both fields to at least 1.
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.max(1),
        }
    }

    pub fn offset(&self) -> usize {
        (self.page.max(1) as usize - 1) * self.page_size.max(1) as usize
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_SIZE)
    }
}

/// One page of results plus the totals needed for navigation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub total_pages: u32,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, total: u64, page_size: u32) -> Self {
        Self {
            data,
            total,
            total_pages: total_pages(total, page_size),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// `ceil(total / page_size)`; zero when there is nothing to show.
pub fn total_pages(total: u64, page_size: u32) -> u32 {
    let pages = total.div_ceil(u64::from(page_size.max(1)));
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// Clamp `page` into `1..=max(total_pages, 1)`.
pub fn clamp_page(page: u32, total_pages: u32) -> u32 {
    page.clamp(1, total_pages.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_is_zero_based() {
        assert_eq!(PageRequest::new(1, 5).offset(), 0);
        assert_eq!(PageRequest::new(3, 5).offset(), 10);
        assert_eq!(PageRequest::new(0, 0).offset(), 0);
    }

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(total_pages(0, 5), 0);
        assert_eq!(total_pages(5, 5), 1);
        assert_eq!(total_pages(7, 5), 2);
    }

    #[test]
    fn clamp_keeps_at_least_first_page() {
        assert_eq!(clamp_page(2, 1), 1);
        assert_eq!(clamp_page(3, 0), 1);
        assert_eq!(clamp_page(2, 4), 2);
    }
}
