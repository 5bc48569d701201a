use serde::Deserialize;

use convene_types::api::Page;

use crate::error::{ApiError, FieldErrors};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// `?page=&page_size=` on endpoints with no other query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

/// A validated page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Pagination {
    /// Pages are 1-based. An oversized `page_size` is capped, not rejected.
    pub fn from_query(page: Option<u32>, page_size: Option<u32>) -> Result<Self, ApiError> {
        let mut errors = FieldErrors::new();
        let page = page.unwrap_or(1);
        if page == 0 {
            errors.add("page", "Ensure this value is greater than or equal to 1.");
        }
        let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page_size == 0 {
            errors.add("page_size", "Ensure this value is greater than or equal to 1.");
        }
        errors.into_result()?;

        Ok(Self {
            page,
            page_size: page_size.min(MAX_PAGE_SIZE),
        })
    }

    pub fn limit(&self) -> u32 {
        self.page_size
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }

    pub fn wrap<T>(&self, count: u64, results: Vec<T>) -> Page<T> {
        Page {
            count,
            page: self.page,
            page_size: self.page_size,
            results,
        }
    }
}
