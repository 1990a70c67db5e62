//! Cache keys of the dashboard resources.
//!
//! Every key starts with its namespace segment so that mutations can
//! invalidate a whole resource by prefix.

use callboard_api_types::{DynamicsKind, Range};

use crate::query::QueryKey;
use crate::query_key;

pub const MANAGERS: &str = "managers";
pub const CALLS: &str = "calls";
pub const CALL: &str = "call";
pub const ADMINS: &str = "admins";
pub const SETTINGS: &str = "settings";
pub const DASHBOARD: &str = "dashboard";
pub const PROCESSES: &str = "processes";

/// Filters of the calls catalog. `None` fields are not sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallFilter {
    pub page: u32,
    pub per_page: u32,
    pub search: String,
    pub manager_id: Option<u64>,
    pub is_checked: Option<u8>,
    pub ai_score: Option<String>,
    pub reject_reason: Option<String>,
    pub status: Option<String>,
}

impl Default for CallFilter {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 10,
            search: String::new(),
            manager_id: None,
            is_checked: None,
            ai_score: None,
            reject_reason: None,
            status: None,
        }
    }
}

/// Filters of the processing pipeline catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcessFilter {
    pub page: u32,
    pub per_page: u32,
    pub search: String,
    pub stage: String,
    pub status: String,
    /// `DD-MM-YYYY` or `YYYY-MM-DD`; normalized before use.
    pub date_from: String,
    pub date_to: String,
}

impl Default for ProcessFilter {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 10,
            search: String::new(),
            stage: "all".to_string(),
            status: "all".to_string(),
            date_from: String::new(),
            date_to: String::new(),
        }
    }
}

pub fn managers_root() -> QueryKey {
    query_key![MANAGERS]
}

pub fn managers(page: u32, per_page: u32, search: &str) -> QueryKey {
    query_key![MANAGERS, page, per_page, search]
}

pub fn manager_view(id: u64, range: Range) -> QueryKey {
    query_key![MANAGERS, "view", id, range.as_str()]
}

pub fn manager_dynamics(id: u64, range: Range, kind: DynamicsKind) -> QueryKey {
    query_key![MANAGERS, "dynamics", id, range.as_str(), kind.as_str()]
}

pub fn manager_calls(id: u64, page: u32, per_page: u32, search: &str) -> QueryKey {
    query_key![MANAGERS, "calls", id, page, per_page, search]
}

pub fn managers_dropdown(search: &str) -> QueryKey {
    query_key![MANAGERS, "dropdown", search]
}

pub fn calls_root() -> QueryKey {
    query_key![CALLS]
}

pub fn calls(filter: &CallFilter) -> QueryKey {
    query_key![
        CALLS,
        "catalog",
        filter.page,
        filter.per_page,
        &filter.search,
        filter.manager_id,
        filter.is_checked.map(u32::from),
        filter.ai_score.clone(),
        filter.reject_reason.clone(),
        filter.status.clone()
    ]
}

pub fn call_view(id: u64) -> QueryKey {
    query_key![CALL, "view", id]
}

pub fn call_transcript(id: u64) -> QueryKey {
    query_key![CALL, "transcript", id]
}

pub fn call_comments(id: u64) -> QueryKey {
    query_key![CALL, "comments", id]
}

pub fn admins_root() -> QueryKey {
    query_key![ADMINS]
}

pub fn admins(page: u32, per_page: u32, search: &str) -> QueryKey {
    query_key![ADMINS, page, per_page, search]
}

pub fn settings_root() -> QueryKey {
    query_key![SETTINGS]
}

pub fn settings(page: u32, per_page: u32) -> QueryKey {
    query_key![SETTINGS, page, per_page]
}

pub fn dashboard_main() -> QueryKey {
    query_key![DASHBOARD, "main"]
}

pub fn dashboard_dynamics(range: Range, kind: DynamicsKind) -> QueryKey {
    query_key![DASHBOARD, "dynamics", range.as_str(), kind.as_str()]
}

pub fn dashboard_rejects(range: Range) -> QueryKey {
    query_key![DASHBOARD, "rejects", range.as_str()]
}

pub fn dashboard_best(range: Range) -> QueryKey {
    query_key![DASHBOARD, "best", range.as_str()]
}

pub fn dashboard_worst(range: Range) -> QueryKey {
    query_key![DASHBOARD, "worst", range.as_str()]
}

pub fn process_statistics() -> QueryKey {
    query_key![PROCESSES, "statistics"]
}

pub fn processes(filter: &ProcessFilter) -> QueryKey {
    query_key![
        PROCESSES,
        "catalog",
        filter.page,
        filter.per_page,
        &filter.stage,
        &filter.status,
        &filter.search,
        normalize_date(&filter.date_from),
        normalize_date(&filter.date_to)
    ]
}

/// Converts `DD-MM-YYYY` to `YYYY-MM-DD`; ISO dates pass through, anything
/// else becomes empty.
pub fn normalize_date(input: &str) -> String {
    let parts: Vec<&str> = input.split('-').collect();
    match parts.as_slice() {
        [year, month, day] if digits(year, 4) && digits(month, 2) && digits(day, 2) => {
            input.to_string()
        }
        [day, month, year] if !day.is_empty() && !month.is_empty() && !year.is_empty() => {
            format!("{year}-{month}-{day}")
        }
        _ => String::new(),
    }
}

fn digits(part: &str, len: usize) -> bool {
    part.len() == len && part.bytes().all(|b| b.is_ascii_digit())
}
