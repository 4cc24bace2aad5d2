use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Check-in radius used when a course has none configured.
pub const DEFAULT_CHECK_IN_RADIUS_METERS: f64 = 100.0;

/// Start time assumed for courses saved without one.
const DEFAULT_START_TIME: &str = "09:00";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "id": "c1",
    "title": "一日咖啡師體驗",
    "description": "咖啡師職場體驗",
    "startDate": "2026-07-01",
    "endDate": "2026-07-15",
    "sessionDates": ["2026-07-01", "2026-07-08", "2026-07-15"],
    "startTime": "09:00",
    "location": "轉角咖啡廳",
    "locationLat": 25.0330,
    "locationLng": 121.5654,
    "checkInRadius": 100,
    "category": "職涯體驗",
    "instructor": "林店長",
    "capacity": 10,
    "enrolledCount": 8,
    "tags": ["餐飲", "實作"]
}))]
pub struct Course {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
    /// Dates on which attendance is taken
    #[serde(default)]
    #[schema(value_type = Vec<String>, format = "date")]
    pub session_dates: Vec<NaiveDate>,
    /// Nominal start time, `HH:MM`
    #[serde(default)]
    pub start_time: String,
    #[serde(default)]
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_lng: Option<f64>,
    /// Check-in radius in meters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_in_radius: Option<f64>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub instructor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub capacity: u32,
    #[serde(default)]
    pub enrolled_count: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_form_url: Option<String>,
}

/// Where and how close a student must be to check in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckInPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: f64,
}

impl Course {
    pub fn check_in_point(&self) -> Option<CheckInPoint> {
        let (latitude, longitude) = (self.location_lat?, self.location_lng?);
        let radius_meters = self
            .check_in_radius
            .filter(|r| r.is_finite() && *r > 0.0)
            .unwrap_or(DEFAULT_CHECK_IN_RADIUS_METERS);

        Some(CheckInPoint {
            latitude,
            longitude,
            radius_meters,
        })
    }

    pub fn meets_on(&self, date: NaiveDate) -> bool {
        self.session_dates.contains(&date)
    }

    /// Parsed start time. Empty means the 09:00 default; `None` means unparseable.
    pub fn session_start(&self) -> Option<NaiveTime> {
        let raw = match self.start_time.trim() {
            "" => DEFAULT_START_TIME,
            t => t,
        };
        NaiveTime::parse_from_str(raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
            .ok()
    }

    /// Demo course listed while the remote store holds no courses.
    pub fn demo(today: NaiveDate) -> Self {
        let day = today.format("%Y-%m-%d").to_string();
        Self {
            id: "c1".to_string(),
            title: "一日咖啡師體驗 (測試用)".to_string(),
            description: "此課程日期設定為今天，方便測試 GPS 簽到功能。".to_string(),
            start_date: day.clone(),
            end_date: day,
            session_dates: vec![today],
            start_time: DEFAULT_START_TIME.to_string(),
            location: "轉角咖啡廳".to_string(),
            location_lat: Some(25.0330),
            location_lng: Some(121.5654),
            check_in_radius: None,
            category: "職涯體驗".to_string(),
            instructor: "林店長".to_string(),
            image_url: Some("https://picsum.photos/id/42/800/600".to_string()),
            capacity: 10,
            enrolled_count: 8,
            tags: vec!["餐飲".to_string(), "實作".to_string(), "咖啡".to_string()],
            google_form_url: None,
        }
    }
}
