use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::AsRefStr;
use utoipa::ToSchema;

/// Attendance status. Serialized with the labels the remote sheet stores.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, AsRefStr, ToSchema)]
pub enum AttendanceStatus {
    #[serde(rename = "準時", alias = "on_time")]
    #[strum(serialize = "on_time")]
    OnTime,
    #[serde(rename = "遲到", alias = "late")]
    #[strum(serialize = "late")]
    Late,
    #[serde(rename = "請假", alias = "on_leave")]
    #[strum(serialize = "on_leave")]
    OnLeave,
    #[serde(rename = "無故缺席", alias = "absent")]
    #[strum(serialize = "absent")]
    Absent,
}

/// One record per (course, student, session date).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttendanceKey {
    pub course_id: String,
    pub student_id: String,
    pub session_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "id": "at1",
    "courseId": "c1",
    "studentId": "u1",
    "checkInTime": "2026-06-15T00:55:00.000Z",
    "sessionDate": "2026-06-15",
    "status": "準時",
    "isManual": false
}))]
pub struct AttendanceRecord {
    pub id: String,
    pub course_id: String,
    pub student_id: String,
    #[serde(with = "flexible_time")]
    #[schema(value_type = String, format = "date-time")]
    pub check_in_time: DateTime<Utc>,
    #[schema(value_type = String, format = "date")]
    pub session_date: NaiveDate,
    pub status: AttendanceStatus,
    /// Set by a social worker rather than a GPS check-in
    #[serde(default)]
    pub is_manual: bool,
}

impl AttendanceRecord {
    pub fn session_key(&self) -> AttendanceKey {
        AttendanceKey {
            course_id: self.course_id.clone(),
            student_id: self.student_id.clone(),
            session_date: self.session_date,
        }
    }
}

/// Timestamps written by older clients lack an offset; those are read as UTC.
mod flexible_time {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(t: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&t.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp `{raw}`")))
    }

    pub(super) fn parse(raw: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|n| n.and_utc())
            })
    }
}
