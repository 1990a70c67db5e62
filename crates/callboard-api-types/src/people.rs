use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Admin {
    pub id: u64,
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub role: Vec<String>,
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(default)]
    pub is_blocked: u8,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub last_login_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manager {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(default)]
    pub total_calls: u64,
    #[serde(default)]
    pub avg_duration: String,
    #[serde(default)]
    pub ai_score_avg: String,
    #[serde(default)]
    pub ai_color_avg: String,
    #[serde(default)]
    pub top_rejects_text: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub crm_id: Option<String>,
}

/// Entry of the managers dropdown used by call filters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerOption {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerView {
    pub manager: ManagerProfile,
    pub stats: ManagerStats,
    pub rejects: ManagerRejects,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerProfile {
    pub id: u64,
    #[serde(default)]
    pub crm_id: Option<u64>,
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub photo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerStats {
    pub range: String,
    pub total_calls: u64,
    pub avg_ai_score: String,
    pub avg_duration: String,
    pub total_duration: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerRejects {
    pub total: u64,
    #[serde(default)]
    pub items: Vec<RejectSlice>,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectSlice {
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    pub id: u64,
    pub date: String,
    pub time: String,
    pub manager_id: u64,
    pub manager_name: String,
    #[serde(default)]
    pub manager_photo: String,
    #[serde(default)]
    pub check: bool,
    #[serde(default)]
    pub duration_call: String,
    #[serde(default)]
    pub client_phone: String,
    #[serde(default)]
    pub ai_score: String,
    #[serde(default)]
    pub ai_color: String,
    #[serde(default)]
    pub reject_reason: String,
    #[serde(default)]
    pub status_label: String,
    #[serde(default)]
    pub status_color: String,
    #[serde(default)]
    pub can_open: bool,
}

/// Single speaker turn of a transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptLine {
    pub id: String,
    pub speaker: String,
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Transcripts arrive in more than one shape; unknown fields are kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallTranscript {
    #[serde(default)]
    pub transcript: Vec<TranscriptLine>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallInfo {
    pub date: String,
    pub manager_id: u64,
    pub manager_name: String,
    #[serde(default)]
    pub manager_photo: String,
    #[serde(default)]
    pub duration_call: String,
    #[serde(default)]
    pub client_phone: String,
    #[serde(default)]
    pub recording_link: String,
    #[serde(default)]
    pub is_checked: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallAiScore {
    pub label: String,
    pub title: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallAi {
    pub ai_score: String,
    #[serde(default)]
    pub ai_color: String,
    #[serde(default)]
    pub status_label: String,
    #[serde(default)]
    pub status_color: String,
    #[serde(default)]
    pub reject_reason: String,
    #[serde(default)]
    pub scores: Vec<CallAiScore>,
    #[serde(default)]
    pub analysis_text: String,
}

/// Detail page of one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallView {
    pub info: CallInfo,
    pub ai: CallAi,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentAuthor {
    pub name: String,
    #[serde(default)]
    pub photo: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallComment {
    pub id: u64,
    pub admin: CommentAuthor,
    pub text: String,
    #[serde(default)]
    pub created_human: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallComments {
    #[serde(default)]
    pub items: Vec<CallComment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setting {
    pub id: u64,
    pub status_id: u64,
    pub status_name: String,
    pub field_id: u64,
    #[serde(default)]
    pub prompt_full: String,
    #[serde(default)]
    pub prompt_for_table: String,
    #[serde(default)]
    pub enabled: bool,
}
