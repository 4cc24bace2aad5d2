pub mod announcement;
pub mod attendance;
pub mod course;
pub mod entry;
pub mod settings;
pub mod user;

use crate::{
    checkin::{CheckInError, SENSOR_TIMEOUT_MS},
    config::Config,
    remote::RemoteError,
    store::StoreError,
};
use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde_json::json;

impl ResponseError for StoreError {
    fn status_code(&self) -> StatusCode {
        match self {
            StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            StoreError::UnknownUser(_) => StatusCode::UNAUTHORIZED,
            StoreError::Remote(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            StoreError::Remote(RemoteError::Rejected { message, .. }) => {
                tracing::error!(error = %self, "Remote store rejected write");
                format!("Save failed: {message}")
            }
            StoreError::Remote(e) => {
                tracing::error!(error = %e, "Remote store unavailable");
                "Save failed, please check your network and try again".to_string()
            }
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(json!({ "message": message }))
    }
}

impl ResponseError for CheckInError {
    fn status_code(&self) -> StatusCode {
        match self {
            CheckInError::OutOfRange { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            CheckInError::MissingCoordinates | CheckInError::NoSessionToday(_) => {
                StatusCode::CONFLICT
            }
            CheckInError::Sensor(_) => StatusCode::BAD_REQUEST,
            CheckInError::InvalidStartTime(_) => StatusCode::CONFLICT,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            CheckInError::OutOfRange {
                distance_meters,
                radius_meters,
            } => json!({
                "message": self.to_string(),
                "distanceMeters": distance_meters.round(),
                "radiusMeters": radius_meters,
            }),
            CheckInError::Sensor(kind) => json!({
                "message": self.to_string(),
                "sensorError": kind,
                "sensorTimeoutMs": SENSOR_TIMEOUT_MS,
            }),
            _ => json!({ "message": self.to_string() }),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}

/// Wall clock in the time zone courses are scheduled in.
pub fn local_now(config: &Config) -> NaiveDateTime {
    Utc::now().with_timezone(&config.session_offset()).naive_local()
}

pub fn local_today(config: &Config) -> NaiveDate {
    local_now(config).date()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkin::SensorFailure;
    use actix_web::body::to_bytes;

    #[actix_web::test]
    async fn out_of_range_reports_distance_and_radius() {
        let err = CheckInError::OutOfRange {
            distance_meters: 152.4,
            radius_meters: 100.0,
        };
        let resp = err.error_response();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body: serde_json::Value =
            serde_json::from_slice(&to_bytes(resp.into_body()).await.unwrap()).unwrap();
        assert_eq!(body["distanceMeters"], 152.0);
        assert_eq!(body["radiusMeters"], 100.0);
    }

    #[test]
    fn error_kinds_map_to_distinct_statuses() {
        assert_eq!(
            CheckInError::MissingCoordinates.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            CheckInError::Sensor(SensorFailure::PermissionDenied).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            StoreError::NotFound {
                kind: "course",
                id: "c9".into()
            }
            .status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            StoreError::Remote(RemoteError::ScriptError { action: "save" }).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }
}
