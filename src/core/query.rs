//! Pagination window and hypermedia link assembly

use serde::Serialize;

use super::error::StoreError;
use super::store::Query;

/// A hypermedia link rendered as `{"rel": ..., "href": ...}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub rel: String,
    pub href: String,
}

impl Link {
    pub fn new(rel: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            rel: rel.into(),
            href: href.into(),
        }
    }
}

/// Requested page and page size, before clamping
///
/// The page defaults to 1 and the size to the configured default page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub page_size: usize,
}

impl PageRequest {
    pub fn new(page: Option<usize>, page_size: Option<usize>, default_page_size: usize) -> Self {
        Self {
            page: page.unwrap_or(1),
            page_size: page_size.unwrap_or(default_page_size),
        }
    }

    /// Cap the page size, e.g. at a configured maximum
    pub fn capped(mut self, max_page_size: Option<usize>) -> Self {
        if let Some(max) = max_page_size {
            self.page_size = self.page_size.min(max);
        }
        self
    }
}

/// Pagination metadata for a collection response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// Total number of matching items
    pub count: usize,

    /// Current page number (starts at 1), clamped into range
    pub page: usize,

    /// Total number of pages, at least 1
    pub page_count: usize,

    pub page_size: usize,

    #[serde(skip)]
    pub offset: usize,
}

impl Pagination {
    pub fn new(count: usize, request: PageRequest) -> Self {
        // A zero page size would divide by zero
        let page_size = request.page_size.max(1);
        let page_count = count.div_ceil(page_size).max(1);
        let page = request.page.clamp(1, page_count);

        Self {
            count,
            page,
            page_count,
            page_size,
            offset: (page - 1) * page_size,
        }
    }

    /// Whether the page window needs to be applied to the query at all
    pub fn is_windowed(&self) -> bool {
        self.count > self.page_size
    }

    pub fn has_next(&self) -> bool {
        self.page < self.page_count
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    /// Limit and offset the query to the current page
    ///
    /// A result that fits in one page is returned unchanged.
    pub fn apply_window<Q: Query>(&self, query: Q) -> Q {
        if self.is_windowed() {
            query.limit(self.page_size).offset(self.offset)
        } else {
            query
        }
    }

    /// Slice an already materialized collection to the current page
    pub fn window<T>(&self, mut items: Vec<T>) -> Vec<T> {
        if !self.is_windowed() {
            return items;
        }
        let end = (self.offset + self.page_size).min(items.len());
        let start = self.offset.min(end);
        items.truncate(end);
        items.drain(..start);
        items
    }

    /// Navigation links for `base_href`
    ///
    /// `first`/`last` always; `next`/`prev` only when such a page exists.
    pub fn links(&self, base_href: &str, page_param: &str, page_size_param: &str) -> Vec<Link> {
        let href = |page: usize| {
            let separator = if base_href.contains('?') { '&' } else { '?' };
            format!(
                "{}{}{}={}&{}={}",
                base_href, separator, page_param, page, page_size_param, self.page_size
            )
        };

        let mut links = vec![Link::new("first", href(1))];
        if self.has_prev() {
            links.push(Link::new("prev", href(self.page - 1)));
        }
        if self.has_next() {
            links.push(Link::new("next", href(self.page + 1)));
        }
        links.push(Link::new("last", href(self.page_count)));
        links
    }
}

/// Count a query and compute its page window in one step
pub fn paginate<Q: Query>(query: &Q, request: PageRequest) -> Result<Pagination, StoreError> {
    Ok(Pagination::new(query.count()?, request))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rels(links: &[Link]) -> Vec<&str> {
        links.iter().map(|l| l.rel.as_str()).collect()
    }

    #[test]
    fn test_page_is_clamped() {
        let pagination = Pagination::new(95, PageRequest::new(Some(10), Some(20), 100));
        assert_eq!(pagination.page, 5);
        assert_eq!(pagination.page_count, 5);
        assert_eq!(pagination.offset, 80);
        assert!(pagination.is_windowed());

        let links = pagination.links("/books", "page", "page_size");
        assert_eq!(rels(&links), vec!["first", "prev", "last"]);
        assert_eq!(links[1].href, "/books?page=4&page_size=20");
    }

    #[test]
    fn test_single_page_is_not_windowed() {
        let pagination = Pagination::new(15, PageRequest::new(None, Some(20), 100));
        assert_eq!(pagination.page, 1);
        assert_eq!(pagination.page_count, 1);
        assert!(!pagination.is_windowed());
        assert_eq!(
            rels(&pagination.links("/books", "page", "page_size")),
            vec!["first", "last"]
        );
    }

    #[test]
    fn test_empty_result_has_one_page() {
        let pagination = Pagination::new(0, PageRequest::new(Some(3), Some(0), 100));
        assert_eq!(pagination.page, 1);
        assert_eq!(pagination.page_count, 1);
        assert_eq!(pagination.page_size, 1);
    }

    #[test]
    fn test_in_memory_window() {
        let pagination = Pagination::new(7, PageRequest::new(Some(2), Some(3), 100));
        assert_eq!(pagination.window((1..=7).collect()), vec![4, 5, 6]);

        let last = Pagination::new(7, PageRequest::new(Some(3), Some(3), 100));
        assert_eq!(last.window((1..=7).collect()), vec![7]);
    }

    #[test]
    fn test_page_size_cap() {
        let request = PageRequest::new(None, Some(500), 100).capped(Some(200));
        assert_eq!(request.page_size, 200);
        assert_eq!(request.page, 1);
    }

    #[test]
    fn test_links_keep_existing_query() {
        let pagination = Pagination::new(50, PageRequest::new(Some(1), Some(20), 100));
        let links = pagination.links("/books?title=Dune", "page", "page_size");
        assert_eq!(links[1].rel, "next");
        assert_eq!(links[1].href, "/books?title=Dune&page=2&page_size=20");
    }
}
