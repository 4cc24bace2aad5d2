use crate::model::{attendance::AttendanceStatus, course::Course};
use crate::utils::geo::{Coordinates, haversine_distance};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};
use strum_macros::Display;
use thiserror::Error;
use utoipa::ToSchema;

/// Minutes after the nominal start during which a check-in is still on time.
pub const GRACE_PERIOD_MINUTES: i64 = 15;

/// Timeout clients use for their high-accuracy location request.
pub const SENSOR_TIMEOUT_MS: u32 = 5_000;

// absorbs float noise so a reading exactly on the radius is accepted
const DISTANCE_TOLERANCE_METERS: f64 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SensorFailure {
    PermissionDenied,
    Unavailable,
    Timeout,
}

/// What the device's location sensor reported.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum LocationReading {
    Fix {
        latitude: f64,
        longitude: f64,
        /// Reported accuracy in meters
        #[serde(default)]
        accuracy: Option<f64>,
    },
    Failed {
        error: SensorFailure,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum CheckInError {
    #[error("this course has no GPS check-in point, please sign in with the social worker on site")]
    MissingCoordinates,
    #[error("this course has no session on {0}")]
    NoSessionToday(NaiveDate),
    #[error("course start time `{0}` is not a valid HH:MM time")]
    InvalidStartTime(String),
    #[error("could not read your location ({0}), check the GPS switch and browser permissions")]
    Sensor(SensorFailure),
    #[error("you are about {distance_meters:.0} m from the course location, move within {radius_meters:.0} m and try again")]
    OutOfRange {
        distance_meters: f64,
        radius_meters: f64,
    },
}

/// Outcome of an accepted check-in attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub status: AttendanceStatus,
    pub session_date: NaiveDate,
    pub distance_meters: f64,
    pub radius_meters: f64,
    /// Sensor-reported accuracy of the fix, if the client sent one
    pub accuracy_meters: Option<f64>,
}

/// Decides whether a reading taken at `now` (course-local time) counts as
/// on time, late, or not at all.
pub fn evaluate(
    course: &Course,
    reading: &LocationReading,
    now: NaiveDateTime,
) -> Result<Evaluation, CheckInError> {
    let point = course
        .check_in_point()
        .ok_or(CheckInError::MissingCoordinates)?;

    let session_date = now.date();
    if !course.meets_on(session_date) {
        return Err(CheckInError::NoSessionToday(session_date));
    }

    let start = course
        .session_start()
        .ok_or_else(|| CheckInError::InvalidStartTime(course.start_time.clone()))?;

    let (position, accuracy_meters) = match *reading {
        LocationReading::Fix {
            latitude,
            longitude,
            accuracy,
        } => (Coordinates::new(latitude, longitude), accuracy),
        LocationReading::Failed { error } => return Err(CheckInError::Sensor(error)),
    };

    let distance_meters = haversine_distance(
        position,
        Coordinates::new(point.latitude, point.longitude),
    );

    if distance_meters > point.radius_meters + DISTANCE_TOLERANCE_METERS {
        return Err(CheckInError::OutOfRange {
            distance_meters,
            radius_meters: point.radius_meters,
        });
    }

    Ok(Evaluation {
        status: punctuality(session_date, start, now),
        session_date,
        distance_meters,
        radius_meters: point.radius_meters,
        accuracy_meters,
    })
}

/// Late only when strictly after start + grace period.
pub fn punctuality(session_date: NaiveDate, start: NaiveTime, now: NaiveDateTime) -> AttendanceStatus {
    let late_after = session_date.and_time(start) + TimeDelta::minutes(GRACE_PERIOD_MINUTES);
    if now > late_after {
        AttendanceStatus::Late
    } else {
        AttendanceStatus::OnTime
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::geo::EARTH_RADIUS_METERS;

    const LAT: f64 = 25.0330;
    const LNG: f64 = 121.5654;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        day().and_hms_opt(h, m, s).unwrap()
    }

    fn course() -> Course {
        let mut course = Course::demo(day());
        course.start_time = "09:00".into();
        course.check_in_radius = Some(100.0);
        course
    }

    /// A fix `meters` due north of the course.
    fn north_of_course(meters: f64) -> LocationReading {
        LocationReading::Fix {
            latitude: LAT + (meters / EARTH_RADIUS_METERS).to_degrees(),
            longitude: LNG,
            accuracy: Some(5.0),
        }
    }

    #[test]
    fn accepts_reading_exactly_on_the_radius() {
        let eval = evaluate(&course(), &north_of_course(100.0), at(9, 0, 0)).unwrap();
        assert_eq!(eval.status, AttendanceStatus::OnTime);
        assert!((eval.distance_meters - 100.0).abs() < 1e-3);
        assert_eq!(eval.radius_meters, 100.0);
        assert_eq!(eval.session_date, day());
    }

    #[test]
    fn reported_accuracy_is_kept_on_the_evaluation() {
        let eval = evaluate(&course(), &north_of_course(20.0), at(9, 0, 0)).unwrap();
        assert_eq!(eval.accuracy_meters, Some(5.0));

        let bare = LocationReading::Fix {
            latitude: LAT,
            longitude: LNG,
            accuracy: None,
        };
        let eval = evaluate(&course(), &bare, at(9, 0, 0)).unwrap();
        assert_eq!(eval.accuracy_meters, None);
    }

    #[test]
    fn rejects_reading_one_meter_outside() {
        match evaluate(&course(), &north_of_course(101.0), at(9, 0, 0)) {
            Err(CheckInError::OutOfRange {
                distance_meters,
                radius_meters,
            }) => {
                assert!((distance_meters - 101.0).abs() < 0.01);
                assert_eq!(radius_meters, 100.0);
            }
            other => panic!("expected out of range, got {other:?}"),
        }
    }

    #[test]
    fn grace_period_boundaries() {
        let check = |t| evaluate(&course(), &north_of_course(10.0), t).unwrap().status;
        assert_eq!(check(at(8, 45, 0)), AttendanceStatus::OnTime);
        assert_eq!(check(at(9, 14, 0)), AttendanceStatus::OnTime);
        assert_eq!(check(at(9, 15, 0)), AttendanceStatus::OnTime);
        assert_eq!(check(at(9, 15, 1)), AttendanceStatus::Late);
        assert_eq!(check(at(9, 16, 0)), AttendanceStatus::Late);
    }

    #[test]
    fn empty_start_time_means_nine_oclock() {
        let mut course = course();
        course.start_time = String::new();
        let status = evaluate(&course, &north_of_course(0.0), at(9, 16, 0)).unwrap().status;
        assert_eq!(status, AttendanceStatus::Late);
    }

    #[test]
    fn missing_coordinates_take_precedence() {
        let mut course = course();
        course.location_lat = None;
        let failed = LocationReading::Failed {
            error: SensorFailure::PermissionDenied,
        };
        assert_eq!(
            evaluate(&course, &failed, at(9, 0, 0)),
            Err(CheckInError::MissingCoordinates)
        );
    }

    #[test]
    fn sensor_failure_is_not_out_of_range() {
        let failed = LocationReading::Failed {
            error: SensorFailure::Timeout,
        };
        assert_eq!(
            evaluate(&course(), &failed, at(9, 0, 0)),
            Err(CheckInError::Sensor(SensorFailure::Timeout))
        );
    }

    #[test]
    fn no_session_on_other_days() {
        let tomorrow = day().succ_opt().unwrap().and_hms_opt(9, 0, 0).unwrap();
        assert_eq!(
            evaluate(&course(), &north_of_course(0.0), tomorrow),
            Err(CheckInError::NoSessionToday(day().succ_opt().unwrap()))
        );
    }

    #[test]
    fn unparseable_start_time_is_reported() {
        let mut course = course();
        course.start_time = "morning".into();
        assert_eq!(
            evaluate(&course, &north_of_course(0.0), at(9, 0, 0)),
            Err(CheckInError::InvalidStartTime("morning".into()))
        );
    }

    #[test]
    fn reading_deserializes_from_fix_or_failure() {
        let fix: LocationReading =
            serde_json::from_str(r#"{"latitude": 25.0, "longitude": 121.5}"#).unwrap();
        assert!(matches!(fix, LocationReading::Fix { accuracy: None, .. }));

        let failed: LocationReading =
            serde_json::from_str(r#"{"error": "permission_denied"}"#).unwrap();
        assert!(matches!(
            failed,
            LocationReading::Failed {
                error: SensorFailure::PermissionDenied
            }
        ));
    }
}
