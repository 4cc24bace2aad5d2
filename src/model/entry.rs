use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A student's career passport journal entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PassportEntry {
    #[serde(default)]
    pub id: String,
    pub student_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[schema(example = "2026-06-15")]
    pub date: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,
    /// Visible to social workers
    #[serde(default)]
    pub is_public: bool,
}
