//! Client for the spreadsheet-backed script endpoint that holds all portal data.
//!
//! Every call is a single `POST` of a JSON document with an `action` field.
//! The endpoint answers with `{status, message?, data?}`. Calls are never retried.

use crate::model::{
    announcement::Announcement, attendance::AttendanceRecord, course::Course,
    entry::PassportEntry, settings::CloudConfig, settings::SystemSettings, user::User,
};
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use strum_macros::AsRefStr;
use thiserror::Error;
use tracing::{debug, error, warn};

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("network error calling {action}: {source}")]
    Http {
        action: &'static str,
        source: reqwest::Error,
    },
    #[error("script endpoint returned an error page for {action}")]
    ScriptError { action: &'static str },
    #[error("script endpoint answered {action} with HTTP {status}")]
    Status { action: &'static str, status: u16 },
    #[error("remote store rejected {action}: {message}")]
    Rejected {
        action: &'static str,
        message: String,
    },
    #[error("could not encode {action} payload: {source}")]
    Encode {
        action: &'static str,
        source: serde_json::Error,
    },
    #[error("unreadable response to {action}: {source}")]
    Decode {
        action: &'static str,
        source: serde_json::Error,
    },
}

/// Credentials the remote store checks on every call.
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user_id: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            password: password.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeStatus {
    Success,
    Fail,
    Error,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub status: EnvelopeStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Everything the remote store returns on login.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub users: Option<Vec<User>>,
    #[serde(default)]
    pub courses: Option<Vec<Course>>,
    #[serde(default)]
    pub entries: Option<Vec<PassportEntry>>,
    #[serde(default)]
    pub announcements: Option<Vec<Announcement>>,
    #[serde(default)]
    pub attendance: Option<Vec<AttendanceRecord>>,
    #[serde(default)]
    pub categories: Option<Vec<String>>,
    #[serde(default)]
    pub settings: Option<SystemSettings>,
    #[serde(default)]
    pub cloud_config: Option<CloudConfig>,
}

/// Kind of item carried by a `save` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
pub enum DataType {
    #[strum(serialize = "user")]
    User,
    #[strum(serialize = "course")]
    Course,
    #[strum(serialize = "delete_course")]
    DeleteCourse,
    #[strum(serialize = "entry")]
    Entry,
    #[strum(serialize = "delete_entry")]
    DeleteEntry,
    #[strum(serialize = "announcement")]
    Announcement,
    #[strum(serialize = "delete_announcement")]
    DeleteAnnouncement,
    #[strum(serialize = "attendance")]
    Attendance,
    #[strum(serialize = "settings")]
    Settings,
    #[strum(serialize = "categories")]
    Categories,
    #[strum(serialize = "cloudConfig")]
    CloudConfig,
}

#[derive(Debug, Clone)]
pub struct ScriptClient {
    http: reqwest::Client,
    url: String,
}

impl ScriptClient {
    pub fn new(url: impl Into<String>, timeout_secs: Option<u64>) -> Result<Self, RemoteError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder.build().map_err(|e| RemoteError::Http {
            action: "client_init",
            source: e,
        })?;

        Ok(Self {
            http,
            url: url.into(),
        })
    }

    /// Authenticates `creds` and returns the full data snapshot.
    pub async fn login(&self, creds: &Credentials) -> Result<Snapshot, RemoteError> {
        const ACTION: &str = "login";

        let payload = json!({
            "action": ACTION,
            "userId": creds.user_id,
            "password": creds.password,
        });

        let envelope = self.call(ACTION, &payload).await?;
        match (envelope.status, envelope.data) {
            (EnvelopeStatus::Success, Some(data)) => {
                serde_json::from_value(data).map_err(|e| RemoteError::Decode {
                    action: ACTION,
                    source: e,
                })
            }
            (_, _) => Err(RemoteError::Rejected {
                action: ACTION,
                message: envelope
                    .message
                    .unwrap_or_else(|| "invalid email or password".to_string()),
            }),
        }
    }

    /// Upserts (or, for `delete_*` types, removes) one item in the remote store.
    pub async fn save<T: Serialize>(
        &self,
        creds: &Credentials,
        data_type: DataType,
        item: &T,
    ) -> Result<(), RemoteError> {
        const ACTION: &str = "save";

        let mut data = serde_json::to_value(item).map_err(|e| RemoteError::Encode {
            action: ACTION,
            source: e,
        })?;
        match data.as_object_mut() {
            Some(fields) => {
                fields.insert("dataType".into(), Value::from(data_type.as_ref()));
            }
            None => {
                data = json!({ "value": data, "dataType": data_type.as_ref() });
            }
        }

        let payload = json!({
            "action": ACTION,
            "userId": creds.user_id,
            "password": creds.password,
            "data": data,
        });

        let envelope = self.call(ACTION, &payload).await?;
        if envelope.status == EnvelopeStatus::Success {
            debug!(data_type = data_type.as_ref(), "Remote save confirmed");
            Ok(())
        } else {
            warn!(data_type = data_type.as_ref(), message = ?envelope.message, "Remote save rejected");
            Err(RemoteError::Rejected {
                action: ACTION,
                message: envelope
                    .message
                    .unwrap_or_else(|| "save failed".to_string()),
            })
        }
    }

    async fn call(&self, action: &'static str, payload: &Value) -> Result<Envelope, RemoteError> {
        // text/plain keeps the script endpoint from rejecting the request
        let resp = self
            .http
            .post(&self.url)
            .header(CONTENT_TYPE, "text/plain;charset=utf-8")
            .body(payload.to_string())
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, action, "Remote call failed");
                RemoteError::Http { action, source: e }
            })?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| RemoteError::Http { action, source: e })?;

        if text.trim_start().starts_with("<!DOCTYPE html") {
            error!(action, "Script endpoint returned HTML");
            return Err(RemoteError::ScriptError { action });
        }

        if !status.is_success() {
            return Err(RemoteError::Status {
                action,
                status: status.as_u16(),
            });
        }

        serde_json::from_str(&text).map_err(|e| RemoteError::Decode { action, source: e })
    }
}
