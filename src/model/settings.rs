use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const DEFAULT_CATEGORIES: [&str; 6] = [
    "自我探索",
    "職涯體驗",
    "志工服務",
    "技能學習",
    "科技應用",
    "藝術創作",
];

pub fn default_categories() -> Vec<String> {
    DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SystemSettings {
    pub landing_title: String,
    pub landing_subtitle: String,
    pub landing_image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_webhook_url: Option<String>,
    /// Emails allowed to register as social workers
    #[serde(default)]
    pub authorized_worker_emails: Vec<String>,
    /// Public URL of the deployed portal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployed_url: Option<String>,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            landing_title: "探索未來，\n從這裡開始。".to_string(),
            landing_subtitle: "CareerPassport 是一個專為青少年設計的生涯探索紀錄平台。累積你的學習歷程，發現你的無限可能。".to_string(),
            landing_image_url: "https://images.unsplash.com/photo-1522202176988-66273c2fd55f?auto=format&fit=crop&w=1351&q=80".to_string(),
            sync_webhook_url: None,
            authorized_worker_emails: Vec::new(),
            deployed_url: None,
        }
    }
}

impl SystemSettings {
    pub fn authorizes_worker(&self, email: &str, configured: &[String]) -> bool {
        self.authorized_worker_emails
            .iter()
            .chain(configured)
            .any(|allowed| allowed.eq_ignore_ascii_case(email.trim()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CloudConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub google_script_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_authorization_merges_both_lists() {
        let settings = SystemSettings {
            authorized_worker_emails: vec!["chang@socialwork.org".into()],
            ..SystemSettings::default()
        };
        let configured = vec!["lemon70431@gfm.org.tw".to_string()];

        assert!(settings.authorizes_worker("Chang@SocialWork.org", &configured));
        assert!(settings.authorizes_worker("lemon70431@gfm.org.tw ", &configured));
        assert!(!settings.authorizes_worker("someone@else.org", &configured));
    }
}
