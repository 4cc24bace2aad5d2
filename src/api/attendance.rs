use crate::{
    auth::auth::AuthUser,
    model::attendance::{AttendanceKey, AttendanceRecord, AttendanceStatus},
    store::{AttendanceFilter, PortalStore},
};
use actix_web::{HttpResponse, Responder, web};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

#[derive(Debug, Deserialize, IntoParams)]
pub struct AttendanceQuery {
    pub course_id: Option<String>,
    /// Ignored for students, who only see their own records
    pub student_id: Option<String>,
    #[param(value_type = Option<String>, format = "date", example = "2026-03-02")]
    pub session_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OverrideAttendance {
    #[schema(example = "c1")]
    pub course_id: String,
    #[schema(example = "u1")]
    pub student_id: String,
    #[schema(example = "2026-03-02", format = "date", value_type = String)]
    pub session_date: NaiveDate,
    pub status: AttendanceStatus,
}

/// List attendance records
#[utoipa::path(
    get,
    path = "/api/attendance",
    params(AttendanceQuery),
    responses(
        (status = 200, description = "Matching records with their sync state", body = [AttendanceRecord]),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn list_attendance(
    auth: AuthUser,
    store: web::Data<PortalStore>,
    query: web::Query<AttendanceQuery>,
) -> impl Responder {
    let query = query.into_inner();

    let student_id = if auth.is_student() {
        Some(auth.user_id)
    } else {
        query.student_id
    };

    let filter = AttendanceFilter {
        course_id: query.course_id,
        student_id,
        session_date: query.session_date,
    };

    HttpResponse::Ok().json(store.list_attendance(&filter))
}

/// Set a student's attendance by hand
///
/// Always replaces whatever is stored for the session, including GPS
/// check-ins. The record is marked manual so later check-ins leave it alone.
#[utoipa::path(
    put,
    path = "/api/attendance",
    request_body = OverrideAttendance,
    responses(
        (status = 200, description = "Record saved", body = AttendanceRecord),
        (status = 400, description = "Unknown status label"),
        (status = 403, description = "Social worker only"),
        (status = 404, description = "Student or course not found"),
        (status = 502, description = "Remote store rejected the write", body = Object, example = json!({
            "message": "Save failed, please check your network and try again"
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
pub async fn override_attendance(
    auth: AuthUser,
    store: web::Data<PortalStore>,
    payload: web::Json<OverrideAttendance>,
) -> actix_web::Result<impl Responder> {
    auth.require_social_worker()?;

    let payload = payload.into_inner();
    let key = AttendanceKey {
        course_id: payload.course_id,
        student_id: payload.student_id,
        session_date: payload.session_date,
    };

    let record = store
        .override_attendance(key, payload.status, Utc::now())
        .await?;

    info!(
        course_id = %record.course_id,
        student_id = %record.student_id,
        status = record.status.as_ref(),
        by = %auth.user_id,
        "Attendance set manually"
    );

    Ok(HttpResponse::Ok().json(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::jwt::generate_access_token,
        config::{Config, test_config},
        model::{role::Role, user::User},
        store::tests::{mount_saves, seeded_store, student},
    };
    use actix_web::{App, test};
    use serde_json::json;
    use wiremock::MockServer;

    fn bearer_for(user: &User, config: &Config) -> (&'static str, String) {
        let token = generate_access_token(user, &config.jwt_secret, 900).unwrap();
        ("Authorization", format!("Bearer {token}"))
    }

    fn worker() -> User {
        User {
            role: Role::SocialWorker,
            ..student("w1", "chang@socialwork.org")
        }
    }

    macro_rules! attendance_app {
        ($store:expr, $config:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($store))
                    .app_data(web::Data::new($config))
                    .route("/attendance", web::get().to(list_attendance))
                    .route("/attendance", web::put().to(override_attendance)),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn override_then_list() {
        let server = MockServer::start().await;
        mount_saves(&server, "success").await;
        let config = test_config(&server.uri());
        let app = attendance_app!(seeded_store(&server), config.clone());

        let req = test::TestRequest::put()
            .uri("/attendance")
            .insert_header(bearer_for(&worker(), &config))
            .set_json(json!({
                "courseId": "c1", "studentId": "u1",
                "sessionDate": "2026-03-02", "status": "請假"
            }))
            .to_request();
        let record: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(record["isManual"], true);
        assert_eq!(record["status"], "請假");

        let req = test::TestRequest::get()
            .uri("/attendance?course_id=c1&session_date=2026-03-02")
            .insert_header(bearer_for(&student("u1", "ming@student.edu"), &config))
            .to_request();
        let list: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(list.as_array().unwrap().len(), 1);
        assert_eq!(list[0]["status"], "請假");
        assert_eq!(list[0]["sync"], "confirmed");
    }

    #[actix_web::test]
    async fn students_only_see_their_own_records() {
        let server = MockServer::start().await;
        mount_saves(&server, "success").await;
        let config = test_config(&server.uri());
        let app = attendance_app!(seeded_store(&server), config.clone());

        let req = test::TestRequest::put()
            .uri("/attendance")
            .insert_header(bearer_for(&worker(), &config))
            .set_json(json!({
                "courseId": "c1", "studentId": "u1",
                "sessionDate": "2026-03-02", "status": "absent"
            }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 200);

        let req = test::TestRequest::get()
            .uri("/attendance?student_id=u1")
            .insert_header(bearer_for(&student("u2", "mei@student.edu"), &config))
            .to_request();
        let list: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert!(list.as_array().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn students_cannot_override() {
        let server = MockServer::start().await;
        let config = test_config(&server.uri());
        let app = attendance_app!(seeded_store(&server), config.clone());

        let req = test::TestRequest::put()
            .uri("/attendance")
            .insert_header(bearer_for(&student("u1", "ming@student.edu"), &config))
            .set_json(json!({
                "courseId": "c1", "studentId": "u1",
                "sessionDate": "2026-03-02", "status": "準時"
            }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 403);
    }

    #[actix_web::test]
    async fn failed_override_is_a_bad_gateway() {
        let server = MockServer::start().await;
        mount_saves(&server, "error").await;
        let config = test_config(&server.uri());
        let app = attendance_app!(seeded_store(&server), config.clone());

        let req = test::TestRequest::put()
            .uri("/attendance")
            .insert_header(bearer_for(&worker(), &config))
            .set_json(json!({
                "courseId": "c1", "studentId": "u1",
                "sessionDate": "2026-03-02", "status": "遲到"
            }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 502);
    }
}
