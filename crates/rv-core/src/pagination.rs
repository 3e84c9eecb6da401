//! Page-window pagination
//!
//! Listings are cut into fixed-size pages and the navigation shows a sliding
//! window of page links around the current page. Bad input from a query string
//! (unknown page size, non-numeric or out-of-range page) is coerced into
//! something usable; pagination never fails.

use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Number of page links shown on each side of the current page.
pub const DEFAULT_TOLERANCE: usize = 3;

/// Page sizes offered to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "usize", try_from = "usize")]
pub enum PageSize {
    #[default]
    Ten,
    TwentyFive,
    Fifty,
    Hundred,
    TwoHundredFifty,
    FiveHundred,
}

impl PageSize {
    pub const ALL: [PageSize; 6] = [
        PageSize::Ten,
        PageSize::TwentyFive,
        PageSize::Fifty,
        PageSize::Hundred,
        PageSize::TwoHundredFifty,
        PageSize::FiveHundred,
    ];

    pub fn get(self) -> usize {
        match self {
            PageSize::Ten => 10,
            PageSize::TwentyFive => 25,
            PageSize::Fifty => 50,
            PageSize::Hundred => 100,
            PageSize::TwoHundredFifty => 250,
            PageSize::FiveHundred => 500,
        }
    }

    pub fn from_value(value: usize) -> Option<Self> {
        PageSize::ALL.into_iter().find(|size| size.get() == value)
    }

    /// Parse a `per_page` query value, falling back to `default` for anything
    /// missing, non-numeric or outside the allowed set.
    pub fn parse_or(value: Option<&str>, default: PageSize) -> Self {
        value
            .and_then(|v| v.trim().parse::<usize>().ok())
            .and_then(PageSize::from_value)
            .unwrap_or(default)
    }

    pub fn parse_lenient(value: Option<&str>) -> Self {
        PageSize::parse_or(value, PageSize::default())
    }
}

impl From<PageSize> for usize {
    fn from(size: PageSize) -> usize {
        size.get()
    }
}

impl TryFrom<usize> for PageSize {
    type Error = String;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        PageSize::from_value(value).ok_or_else(|| {
            format!(
                "page size must be one of 10, 25, 50, 100, 250, 500 (got {})",
                value
            )
        })
    }
}

/// Parse a one-based `page` query value. Missing, empty, non-numeric and zero
/// all mean page 1. A number too large for `usize` saturates, so it still
/// clamps to the last page.
pub fn parse_requested_page(value: Option<&str>) -> usize {
    let Some(value) = value.map(str::trim) else {
        return 1;
    };
    let page = match value.parse::<usize>() {
        Ok(page) => page,
        Err(_) if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) => usize::MAX,
        Err(_) => 1,
    };
    page.max(1)
}

/// Defaults applied when a listing does not ask for anything specific
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationConfig {
    pub default_page_size: PageSize,
    pub tolerance: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_page_size: PageSize::default(),
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

/// What a caller asked for, already coerced into valid values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page_size: PageSize,
    pub requested_page: usize,
    pub tolerance: usize,
}

impl PageRequest {
    pub fn new(page_size: PageSize, requested_page: usize, tolerance: usize) -> Self {
        Self {
            page_size,
            requested_page,
            tolerance,
        }
    }

    /// Build a request from raw `page` / `per_page` query values.
    pub fn from_query(
        page: Option<&str>,
        per_page: Option<&str>,
        config: &PaginationConfig,
    ) -> Self {
        Self {
            page_size: PageSize::parse_or(per_page, config.default_page_size),
            requested_page: parse_requested_page(page),
            tolerance: config.tolerance,
        }
    }

    pub fn paginate(&self, total_items: usize) -> PageResult {
        paginate(total_items, self.page_size, self.requested_page, self.tolerance)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(PageSize::default(), 1, DEFAULT_TOLERANCE)
    }
}

/// Where the current page sits in the collection and which page links to show
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResult {
    pub total_items: usize,
    pub page_size: PageSize,
    pub current_page: usize,
    pub last_page: usize,
    pub record_slice_bounds: Range<usize>,
    pub page_list: Vec<usize>,
    pub is_first_page: bool,
    pub is_last_page: bool,
}

/// Compute the page to show and its navigation window.
pub fn paginate(
    total_items: usize,
    page_size: PageSize,
    requested_page: usize,
    tolerance: usize,
) -> PageResult {
    let size = page_size.get();
    let last_page = total_items.div_ceil(size).max(1);
    let current_page = requested_page.clamp(1, last_page);

    let start = ((current_page - 1) * size).min(total_items);
    let end = (start + size).min(total_items);

    let first_link = current_page.saturating_sub(tolerance).max(1);
    let last_link = current_page.saturating_add(tolerance).min(last_page);

    PageResult {
        total_items,
        page_size,
        current_page,
        last_page,
        record_slice_bounds: start..end,
        page_list: (first_link..=last_link).collect(),
        is_first_page: current_page == 1,
        is_last_page: current_page == last_page,
    }
}

impl PageResult {
    /// The records of the current page, taken from the full collection.
    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let end = self.record_slice_bounds.end.min(items.len());
        let start = self.record_slice_bounds.start.min(end);
        &items[start..end]
    }

    /// SQL `OFFSET` for the current page
    pub fn offset(&self) -> usize {
        self.record_slice_bounds.start
    }

    /// SQL `LIMIT` for the current page
    pub fn limit(&self) -> usize {
        self.record_slice_bounds.len()
    }

    pub fn previous_page(&self) -> Option<usize> {
        (!self.is_first_page).then(|| self.current_page - 1)
    }

    pub fn next_page(&self) -> Option<usize> {
        (!self.is_last_page).then(|| self.current_page + 1)
    }
}

/// A materialised page of records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    #[serde(flatten)]
    pub pagination: PageResult,
    pub records: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(pagination: PageResult, records: Vec<T>) -> Self {
        Self {
            pagination,
            records,
        }
    }

    pub fn from_slice(items: &[T], pagination: PageResult) -> Self
    where
        T: Clone,
    {
        let records = pagination.slice(items).to_vec();
        Self {
            pagination,
            records,
        }
    }

    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            pagination: self.pagination,
            records: self.records.into_iter().map(f).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_collection() {
        for size in PageSize::ALL {
            for requested in [0, 1, 7, 1000] {
                let page = paginate(0, size, requested, 3);
                assert_eq!(page.current_page, 1);
                assert!(page.record_slice_bounds.is_empty());
                assert_eq!(page.page_list, vec![1]);
                assert!(page.is_first_page);
                assert!(page.is_last_page);
            }
        }
    }

    #[test]
    fn test_out_of_range_page_clamps_to_last() {
        let items: Vec<usize> = (0..105).collect();
        let page = paginate(105, PageSize::Ten, 50, 3);

        assert_eq!(page.last_page, 11);
        assert_eq!(page.current_page, 11);
        assert_eq!(page.slice(&items), &[100, 101, 102, 103, 104]);
        assert!(page.is_last_page);
        assert_eq!(page.next_page(), None);
        assert_eq!(page.previous_page(), Some(10));
    }

    #[test]
    fn test_overflowing_page_number_clamps_to_last() {
        let requested = parse_requested_page(Some("99999999999999999999999"));
        let page = paginate(105, PageSize::Ten, requested, 3);
        assert_eq!(page.current_page, 11);
        assert_eq!(page.page_list, vec![8, 9, 10, 11]);
        assert_eq!(page.record_slice_bounds, 100..105);
    }

    #[test]
    fn test_window_in_the_middle() {
        let page = paginate(100, PageSize::Ten, 5, 3);
        assert_eq!(page.page_list, vec![2, 3, 4, 5, 6, 7, 8]);
        assert!(!page.is_first_page);
        assert!(!page.is_last_page);
        assert_eq!(page.record_slice_bounds, 40..50);
    }

    #[test]
    fn test_window_truncated_not_padded() {
        let first = paginate(100, PageSize::Ten, 1, 3);
        assert_eq!(first.page_list, vec![1, 2, 3, 4]);
        assert!(first.is_first_page);

        let last = paginate(100, PageSize::Ten, 10, 3);
        assert_eq!(last.page_list, vec![7, 8, 9, 10]);
    }

    #[test]
    fn test_zero_tolerance() {
        let page = paginate(100, PageSize::Ten, 4, 0);
        assert_eq!(page.page_list, vec![4]);
    }

    #[test]
    fn test_lenient_parsing() {
        assert_eq!(PageSize::parse_lenient(Some("25")), PageSize::TwentyFive);
        assert_eq!(PageSize::parse_lenient(Some("26")), PageSize::Ten);
        assert_eq!(PageSize::parse_lenient(Some("abc")), PageSize::Ten);
        assert_eq!(PageSize::parse_lenient(None), PageSize::Ten);

        assert_eq!(parse_requested_page(Some("3")), 3);
        assert_eq!(parse_requested_page(Some("")), 1);
        assert_eq!(parse_requested_page(Some("0")), 1);
        assert_eq!(parse_requested_page(Some("-2")), 1);
        assert_eq!(parse_requested_page(None), 1);
        assert_eq!(parse_requested_page(Some("99999999999999999999999")), usize::MAX);
    }

    #[test]
    fn test_request_from_query_uses_config_defaults() {
        let config = PaginationConfig {
            default_page_size: PageSize::Fifty,
            tolerance: 2,
        };
        let request = PageRequest::from_query(Some("x"), None, &config);
        assert_eq!(request.page_size, PageSize::Fifty);
        assert_eq!(request.requested_page, 1);

        let page = request.paginate(500);
        assert_eq!(page.page_list, vec![1, 2, 3]);
        assert_eq!(page.limit(), 50);
        assert_eq!(page.offset(), 0);
    }

    #[test]
    fn test_page_serializes_size_as_number() {
        let page = Page::from_slice(&[1, 2, 3], paginate(3, PageSize::Ten, 1, 3));
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["page_size"], 10);
        assert_eq!(json["records"], serde_json::json!([1, 2, 3]));
        assert_eq!(json["page_list"], serde_json::json!([1]));
    }
}
