//! Page-number pagination over a set's items.
//!
//! Mirrors the paginator of the emulated framework: pages are 1-indexed,
//! a page past the end is an error, and the first page of an empty result is
//! allowed.

use serde::{Deserialize, Serialize};
use std::cmp::min;

use crate::error::{MockError, MockResult};

/// A single page of results.
///
/// # Example
///
/// ```ignore
/// let page = PageRequest::new(2, 10).paginate((1..=25).collect())?;
///
/// assert_eq!(page.items, (11..=20).collect::<Vec<_>>());
/// assert_eq!(page.num_pages, 3);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// The items on this page.
    pub items: Vec<T>,
    /// The 1-indexed page number.
    pub number: usize,
    /// Maximum number of items per page.
    pub per_page: usize,
    /// Total number of items across all pages.
    pub count: usize,
    /// Total number of pages.
    pub num_pages: usize,
    /// The next page number, if there is one.
    pub next_page: Option<usize>,
    /// The previous page number, if there is one.
    pub previous_page: Option<usize>,
}

impl<T> Page<T> {
    /// Returns `true` if a later page exists.
    pub fn has_next(&self) -> bool {
        self.next_page.is_some()
    }

    /// Returns `true` if an earlier page exists.
    pub fn has_previous(&self) -> bool {
        self.previous_page.is_some()
    }

    /// 1-indexed position of the first item on this page, or 0 when empty.
    pub fn start_index(&self) -> usize {
        if self.items.is_empty() {
            0
        } else {
            (self.number - 1) * self.per_page + 1
        }
    }

    /// 1-indexed position of the last item on this page, or 0 when empty.
    pub fn end_index(&self) -> usize {
        if self.items.is_empty() {
            0
        } else {
            self.start_index() + self.items.len() - 1
        }
    }
}

/// Which page to fetch and how large pages are.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PageRequest {
    /// The page number (1-indexed).
    pub page: usize,
    /// Number of items per page.
    pub per_page: usize,
    /// Whether page 1 of an empty result is valid.
    pub allow_empty_first_page: bool,
}

impl PageRequest {
    /// Creates a request for page `page` of `per_page` items.
    ///
    /// # Arguments
    ///
    /// * `page` - The page number (1-indexed)
    /// * `per_page` - Number of items per page
    pub fn new(page: usize, per_page: usize) -> Self {
        Self {
            page,
            per_page,
            allow_empty_first_page: true,
        }
    }

    /// Creates a new builder for constructing a page request.
    pub fn builder() -> PageRequestBuilder {
        PageRequestBuilder::new()
    }

    /// Number of items to skip before this page.
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1) * self.per_page
    }

    /// Number of pages needed for `count` items.
    pub fn num_pages(&self, count: usize) -> usize {
        if count == 0 {
            usize::from(self.allow_empty_first_page)
        } else {
            count.div_ceil(self.per_page.max(1))
        }
    }

    /// Cuts the requested page out of `items`.
    ///
    /// # Errors
    ///
    /// Returns [`MockError::InvalidValue`] for page 0, a page size of 0, or
    /// a page past the last one.
    pub fn paginate<T>(&self, mut items: Vec<T>) -> MockResult<Page<T>> {
        if self.per_page == 0 {
            return Err(MockError::InvalidValue("Page size must be at least 1".into()));
        }
        if self.page < 1 {
            return Err(MockError::InvalidValue("That page number is less than 1".into()));
        }

        let count = items.len();
        let num_pages = self.num_pages(count);
        if self.page > num_pages {
            return Err(MockError::InvalidValue("That page contains no results".into()));
        }

        let offset = self.offset();
        let end = min(offset + self.per_page, count);
        let page_items = items
            .drain(offset.min(count)..end)
            .collect();

        Ok(Page {
            items: page_items,
            number: self.page,
            per_page: self.per_page,
            count,
            num_pages,
            next_page: (self.page < num_pages).then_some(self.page + 1),
            previous_page: (self.page > 1).then(|| self.page - 1),
        })
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, 10)
    }
}

/// Builder for constructing [`PageRequest`] instances.
#[derive(Default)]
pub struct PageRequestBuilder {
    page: Option<usize>,
    per_page: Option<usize>,
    allow_empty_first_page: Option<bool>,
}

impl PageRequestBuilder {
    /// Creates a new builder with no parameters set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the page number (1-indexed).
    pub fn with_page(mut self, page: usize) -> Self {
        self.page = Some(page);
        self
    }

    /// Sets the number of items per page.
    pub fn with_per_page(mut self, per_page: usize) -> Self {
        self.per_page = Some(per_page);
        self
    }

    /// Sets whether page 1 of an empty result is valid.
    pub fn with_allow_empty_first_page(mut self, allow: bool) -> Self {
        self.allow_empty_first_page = Some(allow);
        self
    }

    /// Builds the request, defaulting to page 1 of 10 items.
    pub fn build(self) -> PageRequest {
        PageRequest {
            page: self.page.unwrap_or(1),
            per_page: self.per_page.unwrap_or(10),
            allow_empty_first_page: self.allow_empty_first_page.unwrap_or(true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn middle_page_links_both_ways() {
        let page = PageRequest::new(2, 10).paginate((1..=25).collect()).unwrap();

        assert_eq!(page.items, (11..=20).collect::<Vec<_>>());
        assert_eq!(page.num_pages, 3);
        assert_eq!(page.next_page, Some(3));
        assert_eq!(page.previous_page, Some(1));
    }

    #[test]
    fn last_page_is_partial() {
        let page = PageRequest::new(3, 10).paginate((1..=25).collect()).unwrap();

        assert_eq!(page.items, (21..=25).collect::<Vec<_>>());
        assert_eq!((page.start_index(), page.end_index()), (21, 25));
        assert!(!page.has_next());
    }

    #[test]
    fn empty_first_page_is_allowed_by_default() {
        let page = PageRequest::default().paginate(Vec::<i32>::new()).unwrap();
        assert!(page.items.is_empty());

        let strict = PageRequest::builder()
            .with_allow_empty_first_page(false)
            .build();
        assert!(strict.paginate(Vec::<i32>::new()).is_err());
    }

    #[test]
    fn out_of_range_pages_are_rejected() {
        assert_eq!(
            PageRequest::new(0, 10).paginate(vec![1]),
            Err(MockError::InvalidValue("That page number is less than 1".into()))
        );
        assert_eq!(
            PageRequest::new(2, 10).paginate(vec![1]),
            Err(MockError::InvalidValue("That page contains no results".into()))
        );
    }
}
