//! Page window for report rows

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 10;

/// `(page, limit)` with both at least 1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    limit: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl PageRequest {
    /// Non-positive values fall back to the defaults; `limit` is capped at `max_limit`
    pub fn new(page: i64, limit: i64, max_limit: u32) -> Self {
        let page = u32::try_from(page)
            .ok()
            .filter(|p| *p >= 1)
            .unwrap_or(DEFAULT_PAGE);
        let limit = u32::try_from(limit)
            .ok()
            .filter(|l| *l >= 1)
            .unwrap_or(DEFAULT_LIMIT)
            .min(max_limit.max(1));
        Self { page, limit }
    }

    /// Parse query-string values; missing or unparsable values use the defaults
    pub fn from_raw(page: Option<&str>, limit: Option<&str>, max_limit: u32) -> Self {
        let parse = |v: Option<&str>| v.and_then(|s| s.trim().parse::<i64>().ok()).unwrap_or(0);
        Self::new(parse(page), parse(limit), max_limit)
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }

    /// `ceil(total / limit)`, zero for an empty population
    pub fn total_pages(&self, total: i64) -> i64 {
        if total <= 0 {
            return 0;
        }
        let limit = i64::from(self.limit);
        (total + limit - 1) / limit
    }
}
