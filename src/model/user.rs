use crate::model::role::Role;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "id": "u3",
    "name": "小華",
    "email": "hua@student.edu",
    "role": "STUDENT",
    "isProfileCompleted": true,
    "schoolDetails": "建國中學 / 一年級",
    "phoneNumber": "0912345678"
}))]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_profile_completed: Option<bool>,
    /// School, department and grade
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school_details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

impl User {
    pub fn has_email(&self, email: &str) -> bool {
        self.email.eq_ignore_ascii_case(email.trim())
    }

    /// Administrator account recreated when the remote store has no record of it.
    pub fn bootstrap_admin(email: &str) -> Self {
        Self {
            id: "u_admin_lemon".to_string(),
            name: "檸檬社工 (Admin)".to_string(),
            email: email.to_string(),
            role: Role::SocialWorker,
            avatar_url: Some("https://api.dicebear.com/7.x/avataaars/svg?seed=Lemon".to_string()),
            is_profile_completed: Some(true),
            school_details: None,
            phone_number: None,
        }
    }
}
