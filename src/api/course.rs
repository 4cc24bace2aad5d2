use crate::{
    api::{local_now, local_today},
    auth::auth::AuthUser,
    checkin::{self, LocationReading},
    config::Config,
    model::{
        attendance::{AttendanceKey, AttendanceRecord},
        course::Course,
    },
    store::{CheckInOutcome, PortalStore, StoreError, collection::Synced, new_id},
};
use actix_web::{HttpResponse, Responder, web};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodayCourse {
    #[serde(flatten)]
    pub course: Synced<Course>,
    /// Caller's record for today's session, if any
    pub attendance: Option<Synced<AttendanceRecord>>,
}

/// List courses
#[utoipa::path(
    get,
    path = "/api/courses",
    responses(
        (status = 200, description = "All courses with their sync state", body = [Course]),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Course"
)]
pub async fn list_courses(
    store: web::Data<PortalStore>,
    config: web::Data<Config>,
) -> impl Responder {
    HttpResponse::Ok().json(store.list_courses(local_today(&config)))
}

/// Courses meeting today, with the caller's attendance for each
#[utoipa::path(
    get,
    path = "/api/courses/today",
    responses(
        (status = 200, description = "Today's sessions", body = Object, example = json!([{
            "id": "c1",
            "title": "一日咖啡師體驗",
            "startTime": "09:00",
            "sync": "confirmed",
            "attendance": {"status": "準時", "isManual": false, "sync": "confirmed"}
        }])),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Course"
)]
pub async fn today_courses(
    auth: AuthUser,
    store: web::Data<PortalStore>,
    config: web::Data<Config>,
) -> impl Responder {
    let today = local_today(&config);

    let courses: Vec<TodayCourse> = store
        .list_courses(today)
        .into_iter()
        .filter(|c| c.item.meets_on(today))
        .map(|course| {
            let attendance = store.get_attendance(&AttendanceKey {
                course_id: course.item.id.clone(),
                student_id: auth.user_id.clone(),
                session_date: today,
            });
            TodayCourse { course, attendance }
        })
        .collect();

    HttpResponse::Ok().json(courses)
}

/// Get course by id
#[utoipa::path(
    get,
    path = "/api/courses/{id}",
    params(("id" = String, Path, description = "Course id")),
    responses(
        (status = 200, description = "Course found", body = Course),
        (status = 404, description = "Course not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Course"
)]
pub async fn get_course(
    path: web::Path<String>,
    store: web::Data<PortalStore>,
    config: web::Data<Config>,
) -> actix_web::Result<impl Responder> {
    let id = path.into_inner();
    let course = store
        .get_course(&id, local_today(&config))
        .ok_or(StoreError::NotFound { kind: "course", id })?;

    Ok(HttpResponse::Ok().json(course))
}

/// Create course
#[utoipa::path(
    post,
    path = "/api/courses",
    request_body = Course,
    responses(
        (status = 201, description = "Course saved", body = Course),
        (status = 403, description = "Social worker only"),
        (status = 502, description = "Remote store rejected the write")
    ),
    security(("bearer_auth" = [])),
    tag = "Course"
)]
pub async fn create_course(
    auth: AuthUser,
    store: web::Data<PortalStore>,
    payload: web::Json<Course>,
) -> actix_web::Result<impl Responder> {
    auth.require_social_worker()?;

    let mut course = payload.into_inner();
    if course.id.trim().is_empty() {
        course.id = new_id();
    }

    let course = store.save_course(course).await?;
    info!(course_id = %course.id, "Course created");

    Ok(HttpResponse::Created().json(course))
}

/// Replace course
#[utoipa::path(
    put,
    path = "/api/courses/{id}",
    params(("id" = String, Path, description = "Course id")),
    request_body = Course,
    responses(
        (status = 200, description = "Course saved", body = Course),
        (status = 403, description = "Social worker only"),
        (status = 404, description = "Course not found"),
        (status = 502, description = "Remote store rejected the write")
    ),
    security(("bearer_auth" = [])),
    tag = "Course"
)]
pub async fn update_course(
    auth: AuthUser,
    path: web::Path<String>,
    store: web::Data<PortalStore>,
    config: web::Data<Config>,
    payload: web::Json<Course>,
) -> actix_web::Result<impl Responder> {
    auth.require_social_worker()?;

    let id = path.into_inner();
    if store.get_course(&id, local_today(&config)).is_none() {
        return Err(StoreError::NotFound { kind: "course", id }.into());
    }

    let mut course = payload.into_inner();
    course.id = id;

    Ok(HttpResponse::Ok().json(store.save_course(course).await?))
}

/// Delete course
#[utoipa::path(
    delete,
    path = "/api/courses/{id}",
    params(("id" = String, Path, description = "Course id")),
    responses(
        (status = 204, description = "Course deleted"),
        (status = 403, description = "Social worker only"),
        (status = 404, description = "Course not found"),
        (status = 502, description = "Remote store rejected the write")
    ),
    security(("bearer_auth" = [])),
    tag = "Course"
)]
pub async fn delete_course(
    auth: AuthUser,
    path: web::Path<String>,
    store: web::Data<PortalStore>,
) -> actix_web::Result<impl Responder> {
    auth.require_social_worker()?;

    store.delete_course(&path).await?;
    info!(course_id = %path, "Course deleted");

    Ok(HttpResponse::NoContent().finish())
}

/// GPS check-in for today's session
///
/// The body is what the device's location sensor reported: either a fix or a
/// failure kind. Clients should request a high-accuracy fix with a 5 second
/// timeout.
#[utoipa::path(
    post,
    path = "/api/courses/{id}/check-in",
    params(("id" = String, Path, description = "Course id")),
    request_body = LocationReading,
    responses(
        (status = 200, description = "Checked in", body = Object, example = json!({
            "message": "Checked in (on time)",
            "status": "準時",
            "distanceMeters": 12.0,
            "radiusMeters": 100.0,
            "record": {"id": "at1", "courseId": "c1", "studentId": "u1", "status": "準時", "isManual": false}
        })),
        (status = 400, description = "Location sensor failure", body = Object, example = json!({
            "message": "could not read your location (permission_denied), check the GPS switch and browser permissions",
            "sensorError": "permission_denied"
        })),
        (status = 403, description = "Student only"),
        (status = 404, description = "Course not found"),
        (status = 409, description = "No GPS point or no session today"),
        (status = 422, description = "Too far from the course", body = Object, example = json!({
            "message": "you are about 152 m from the course location, move within 100 m and try again",
            "distanceMeters": 152.0,
            "radiusMeters": 100.0
        })),
        (status = 502, description = "Attendance could not be saved")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn check_in(
    auth: AuthUser,
    path: web::Path<String>,
    store: web::Data<PortalStore>,
    config: web::Data<Config>,
    reading: web::Json<LocationReading>,
) -> actix_web::Result<impl Responder> {
    auth.require_student()?;

    let now = local_now(&config);
    let course_id = path.into_inner();
    let course = store
        .get_course(&course_id, now.date())
        .ok_or_else(|| StoreError::NotFound {
            kind: "course",
            id: course_id.clone(),
        })?;

    let evaluation = checkin::evaluate(&course.item, &reading, now).inspect_err(|e| {
        debug!(course_id = %course_id, student_id = %auth.user_id, reason = %e, "Check-in refused");
    })?;

    let outcome = store
        .record_check_in(&course_id, &auth.user_id, &evaluation, Utc::now())
        .await?;

    let resp = match outcome {
        CheckInOutcome::Recorded(record) => {
            info!(
                course_id = %course_id,
                student_id = %auth.user_id,
                status = evaluation.status.as_ref(),
                distance = evaluation.distance_meters,
                accuracy = ?evaluation.accuracy_meters,
                "Check-in recorded"
            );
            json!({
                "message": format!("Checked in ({})", evaluation.status.as_ref().replace('_', " ")),
                "status": evaluation.status,
                "distanceMeters": evaluation.distance_meters.round(),
                "radiusMeters": evaluation.radius_meters,
                "accuracyMeters": evaluation.accuracy_meters,
                "record": record,
            })
        }
        CheckInOutcome::ManualKept(record) => json!({
            "message": "Attendance for this session was already set by a social worker",
            "status": record.status,
            "distanceMeters": evaluation.distance_meters.round(),
            "radiusMeters": evaluation.radius_meters,
            "record": record,
        }),
    };

    Ok(HttpResponse::Ok().json(resp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::jwt::generate_access_token,
        config::test_config,
        store::tests::{course, mount_saves, seeded_store, student},
        utils::geo::EARTH_RADIUS_METERS,
    };
    use actix_web::{App, test};
    use wiremock::MockServer;

    const LAT: f64 = 25.0330;
    const LNG: f64 = 121.5654;

    fn bearer(config: &Config) -> (&'static str, String) {
        let token =
            generate_access_token(&student("u1", "ming@student.edu"), &config.jwt_secret, 900)
                .unwrap();
        ("Authorization", format!("Bearer {token}"))
    }

    fn north_of_course(meters: f64) -> serde_json::Value {
        json!({
            "latitude": LAT + (meters / EARTH_RADIUS_METERS).to_degrees(),
            "longitude": LNG,
            "accuracy": 8.0
        })
    }

    /// Store with course `c1` meeting today, starting late enough that any
    /// check-in during the test is on time.
    async fn store_meeting_today(server: &MockServer, config: &Config) -> PortalStore {
        mount_saves(server, "success").await;
        let store = seeded_store(server);
        let mut today = course("c1", local_today(config));
        today.start_time = "23:59".into();
        store.save_course(today).await.unwrap();
        store
    }

    macro_rules! course_app {
        ($store:expr, $config:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($store))
                    .app_data(web::Data::new($config))
                    .route("/courses/today", web::get().to(today_courses))
                    .route("/courses/{id}/check-in", web::post().to(check_in)),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn check_in_within_radius_is_recorded() {
        let server = MockServer::start().await;
        let config = test_config(&server.uri());
        let store = store_meeting_today(&server, &config).await;
        let app = course_app!(store, config.clone());

        let req = test::TestRequest::post()
            .uri("/courses/c1/check-in")
            .insert_header(bearer(&config))
            .set_json(north_of_course(40.0))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["status"], "準時");
        assert_eq!(body["distanceMeters"], 40.0);
        assert_eq!(body["accuracyMeters"], 8.0);
        assert_eq!(body["record"]["isManual"], false);

        let req = test::TestRequest::get()
            .uri("/courses/today")
            .insert_header(bearer(&config))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body[0]["id"], "c1");
        assert_eq!(body[0]["attendance"]["status"], "準時");
        assert_eq!(body[0]["attendance"]["sync"], "confirmed");
    }

    #[actix_web::test]
    async fn check_in_out_of_range_is_refused() {
        let server = MockServer::start().await;
        let config = test_config(&server.uri());
        let store = store_meeting_today(&server, &config).await;
        let app = course_app!(store, config.clone());

        let req = test::TestRequest::post()
            .uri("/courses/c1/check-in")
            .insert_header(bearer(&config))
            .set_json(north_of_course(250.0))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 422);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["distanceMeters"], 250.0);
        assert_eq!(body["radiusMeters"], 100.0);
    }

    #[actix_web::test]
    async fn course_without_coordinates_needs_manual_sign_in() {
        let server = MockServer::start().await;
        let config = test_config(&server.uri());
        mount_saves(&server, "success").await;
        let store = seeded_store(&server);
        let mut no_gps = course("c2", local_today(&config));
        no_gps.location_lat = None;
        no_gps.location_lng = None;
        store.save_course(no_gps).await.unwrap();
        let app = course_app!(store, config.clone());

        let req = test::TestRequest::post()
            .uri("/courses/c2/check-in")
            .insert_header(bearer(&config))
            .set_json(north_of_course(0.0))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 409);
    }

    #[actix_web::test]
    async fn sensor_failure_is_a_bad_request() {
        let server = MockServer::start().await;
        let config = test_config(&server.uri());
        let store = store_meeting_today(&server, &config).await;
        let app = course_app!(store, config.clone());

        let req = test::TestRequest::post()
            .uri("/courses/c1/check-in")
            .insert_header(bearer(&config))
            .set_json(json!({"error": "timeout"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["sensorError"], "timeout");
    }

    #[actix_web::test]
    async fn unknown_course_is_not_found() {
        let server = MockServer::start().await;
        let config = test_config(&server.uri());
        let store = store_meeting_today(&server, &config).await;
        let app = course_app!(store, config.clone());

        let req = test::TestRequest::post()
            .uri("/courses/nope/check-in")
            .insert_header(bearer(&config))
            .set_json(north_of_course(0.0))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 404);
    }
}
