use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const DEFAULT_PAGE_SIZE: u64 = 10;
pub const MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, Deserialize, Default)]
pub struct PageQuery {
    pub page: Option<String>,
    pub page_size: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub size: u64,
}

impl PageRequest {
    /// Items to skip; saturates for absurd page numbers so the store sees an
    /// empty page instead of an overflow.
    pub fn offset(&self) -> u64 {
        self.page
            .saturating_sub(1)
            .saturating_mul(self.size)
            .min(i64::MAX as u64)
    }

    pub fn is_last_marker(&self) -> bool {
        self.page == u64::MAX
    }
}

impl PageQuery {
    /// Page numbers start at 1; a size outside `1..=100` falls back or is capped.
    pub fn into_request(self) -> Result<PageRequest, AppError> {
        let page = match self.page.as_deref().map(str::trim) {
            None | Some("") => 1,
            Some("last") => u64::MAX,
            Some(raw) => match raw.parse::<u64>() {
                Ok(page) if page >= 1 => page,
                _ => return Err(AppError::NotFound("Invalid page.".to_string())),
            },
        };

        let size = self
            .page_size
            .as_deref()
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .filter(|size| *size >= 1)
            .map_or(DEFAULT_PAGE_SIZE, |size| size.min(MAX_PAGE_SIZE));

        Ok(PageRequest { page, size })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Page<T> {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

/// Number of pages for `count` items; an empty list still has one page.
pub fn page_count(count: u64, size: u64) -> u64 {
    count.div_ceil(size).max(1)
}

/// Resolves `last` and rejects pages past the end.
pub fn resolve_page(request: PageRequest, count: u64) -> Result<PageRequest, AppError> {
    let last = page_count(count, request.size);
    let page = if request.is_last_marker() { last } else { request.page };
    if page > last {
        return Err(AppError::NotFound("Invalid page.".to_string()));
    }
    Ok(PageRequest { page, ..request })
}

impl<T> Page<T> {
    pub fn new(path: &str, request: PageRequest, count: u64, results: Vec<T>) -> Self {
        let link = |page: u64| {
            if request.size == DEFAULT_PAGE_SIZE {
                format!("{path}?page={page}")
            } else {
                format!("{path}?page={page}&page_size={}", request.size)
            }
        };
        let last = page_count(count, request.size);

        Page {
            count,
            next: (request.page < last).then(|| link(request.page + 1)),
            previous: (request.page > 1).then(|| link(request.page - 1)),
            results,
        }
    }
}
