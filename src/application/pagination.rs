//! Pagination metrics derived from sub-query result counters.

use serde::Serialize;

use crate::application::repos::QueryMetrics;

/// Maximum number of page links in the window.
pub const PAGE_WINDOW: u64 = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub current_page: u64,
    pub last_page: u64,
    /// Page numbers around the current page, at most [`PAGE_WINDOW`] long.
    pub pages: Vec<u64>,
    pub previous_page: Option<u64>,
    pub next_page: Option<u64>,
    /// 1-based index of the first record on this page, 0 when empty.
    pub from_record: u64,
    pub to_record: u64,
    pub total_records: u64,
    pub limit: u64,
    pub offset: u64,
}

impl Pagination {
    pub fn from_metrics(metrics: &QueryMetrics) -> Self {
        let QueryMetrics {
            result_size: size,
            result_offset: offset,
            result_limit: limit,
        } = *metrics;

        // A zero limit means the whole result fits on one page.
        let (current_page, last_page) = if limit == 0 {
            (1, 1)
        } else {
            let last = size.div_ceil(limit).max(1);
            ((offset / limit).saturating_add(1).min(last), last)
        };

        let mut start = current_page.saturating_sub(PAGE_WINDOW / 2).max(1);
        let end = (start + PAGE_WINDOW - 1).min(last_page);
        if end + 1 - start < PAGE_WINDOW {
            start = end.saturating_sub(PAGE_WINDOW - 1).max(1);
        }

        let to_record = if limit == 0 {
            size
        } else {
            offset.saturating_add(limit).min(size)
        };
        let from_record = if size == 0 || offset >= size {
            0
        } else {
            offset + 1
        };

        Self {
            current_page,
            last_page,
            pages: (start..=end).collect(),
            previous_page: (current_page > 1).then(|| current_page - 1),
            next_page: (current_page < last_page).then(|| current_page + 1),
            from_record,
            to_record,
            total_records: size,
            limit,
            offset,
        }
    }
}
