//! Request and response shapes of the Callboard dashboard REST API.
//!
//! Every endpoint wraps its payload in an [`Envelope`]; list endpoints carry
//! a [`Catalog`] with [`Pagination`]. Fields the backend sometimes omits are
//! `#[serde(default)]` so decoding stays tolerant of partial records.

mod analytics;
mod people;

pub use analytics::{
    DashboardKpi, DynamicsPoint, ManagerRating, ProcessCatalog, ProcessFilterOption,
    ProcessFilters, ProcessFiltersApplied, ProcessStatistic, ProcessStatistics, ProcessTask,
    RejectsBreakdownItem, RejectsReport, RejectsTotals,
};
pub use people::{
    Admin, CallAi, CallAiScore, CallComment, CallComments, CallInfo, CallRecord, CallTranscript,
    CallView, CommentAuthor, Manager, ManagerOption, ManagerProfile, ManagerRejects,
    ManagerStats, ManagerView, RejectSlice, Setting, TranscriptLine,
};

use serde::{Deserialize, Serialize};

/// Common response wrapper: `{ status, message, time_update?, data }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub status: bool,
    #[serde(default)]
    pub message: String,
    /// Server-side timestamp of the underlying data snapshot.
    #[serde(default)]
    pub time_update: Option<String>,
    pub data: T,
}

/// Envelope for write endpoints whose `data` is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acknowledgement<T> {
    pub status: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<T>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

/// A paginated list of records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

/// Time window accepted by the analytics endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Range {
    All,
    Year,
    Month,
    Week,
    Day,
}

impl Range {
    pub fn as_str(&self) -> &'static str {
        match self {
            Range::All => "all",
            Range::Year => "year",
            Range::Month => "month",
            Range::Week => "week",
            Range::Day => "day",
        }
    }
}

/// Series selector for dynamics charts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DynamicsKind {
    Calls,
    AiAvg,
}

impl DynamicsKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DynamicsKind::Calls => "calls",
            DynamicsKind::AiAvg => "ai_avg",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerCreateRequest {
    pub full_name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crm_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department_id: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerEditRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crm_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminCreateRequest {
    pub full_name: String,
    pub email: String,
    pub role: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminEditRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingCreateRequest {
    pub status_id: u64,
    pub status_name: String,
    pub field_id: u64,
    pub prompt_full: String,
    pub prompt_for_table: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingEditRequest {
    pub status_id: u64,
    pub status_name: String,
    pub field_id: u64,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddCommentRequest {
    pub text: String,
}

/// Metadata submitted with a recording for AI analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub id_crm: String,
    pub manager_id: String,
    pub client_phone: String,
    /// Name of the uploaded recording; the upload itself is the transport's concern.
    pub file_name: String,
}
