use serde::{Deserialize, Serialize};

use crate::Pagination;

/// Headline numbers of the main dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardKpi {
    pub total_analyses: u64,
    pub avg_call_duration: String,
    pub total_on_line: String,
    pub ai_score_avg: String,
    pub weak_followup_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicsPoint {
    pub point_label: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectsBreakdownItem {
    pub key: String,
    pub label: String,
    pub count: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectsTotals {
    pub total_calls: u64,
    pub avg_ai_score: f64,
    pub total_on_line: String,
    pub weak_followup_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectsReport {
    pub scope: String,
    pub range: String,
    pub totals: RejectsTotals,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub breakdown: Vec<RejectsBreakdownItem>,
}

/// Row of the best/worst manager leaderboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerRating {
    pub name: String,
    pub ai_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessStatistic {
    pub count: u64,
    pub percent: f64,
}

/// Pipeline counters from recording lookup to delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessStatistics {
    pub total: ProcessStatistic,
    pub search_call: ProcessStatistic,
    pub voice_to_text: ProcessStatistic,
    pub ai: ProcessStatistic,
    pub sent: ProcessStatistic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessTask {
    pub id: String,
    pub date: String,
    pub time: String,
    pub stage_label: String,
    pub status_label: String,
    #[serde(default)]
    pub status_color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessFilterOption {
    pub value: String,
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessFilters {
    #[serde(default)]
    pub stages: Vec<ProcessFilterOption>,
    #[serde(default)]
    pub statuses: Vec<ProcessFilterOption>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessFiltersApplied {
    #[serde(default)]
    pub stage: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub date_from: Option<String>,
    #[serde(default)]
    pub date_to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessCatalog {
    pub items: Vec<ProcessTask>,
    pub pagination: Pagination,
    #[serde(default)]
    pub filters: ProcessFilters,
    #[serde(default)]
    pub filters_applied: ProcessFiltersApplied,
}
