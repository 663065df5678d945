//! API request handlers

pub mod bulk_signups;
pub mod health;
pub mod security;

use crate::error::ApiError;
use chrono::NaiveDate;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// `?page=&pageSize=` query parameters
#[derive(Debug, Default)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

/// Validated page window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: i64,
    pub page_size: i64,
    pub offset: i64,
}

impl PageQuery {
    /// Validate the query; pages start at 1
    pub fn resolve(&self) -> Result<PageWindow, ApiError> {
        let page = self.page.unwrap_or(1);
        let page_size = self.page_size.unwrap_or(DEFAULT_PAGE_SIZE);

        if page < 1 {
            return Err(ApiError::bad_request("page must be at least 1"));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(ApiError::bad_request(format!(
                "pageSize must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        let offset = (page - 1)
            .checked_mul(page_size)
            .ok_or_else(|| ApiError::bad_request("page is out of range"))?;
        Ok(PageWindow {
            page,
            page_size,
            offset,
        })
    }
}

/// Parse a `YYYY-MM-DD` date
pub fn parse_date(raw: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ApiError::bad_request(format!("Invalid date '{}', expected YYYY-MM-DD", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_query_bounds() {
        assert_eq!(
            PageQuery::default().resolve().unwrap(),
            PageWindow {
                page: 1,
                page_size: 20,
                offset: 0
            }
        );
        let q = PageQuery {
            page: Some(3),
            page_size: Some(50),
        };
        assert_eq!(q.resolve().unwrap().offset, 100);
        let q = PageQuery {
            page: Some(0),
            page_size: None,
        };
        assert!(q.resolve().is_err());
        let q = PageQuery {
            page: Some(2),
            page_size: Some(101),
        };
        assert!(q.resolve().is_err());
    }

    #[test]
    fn test_huge_page_is_rejected() {
        let q = PageQuery {
            page: Some(i64::MAX),
            page_size: Some(100),
        };
        let err = q.resolve().unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2024-02-29").unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert!(parse_date("2023-02-29").is_err());
        assert!(parse_date("yesterday").is_err());
    }
}
