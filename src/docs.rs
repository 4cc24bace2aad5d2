use crate::api::attendance::OverrideAttendance;
use crate::api::settings::Categories;
use crate::api::user::UpdateProfile;
use crate::checkin::{LocationReading, SensorFailure};
use crate::model::{
    announcement::Announcement,
    attendance::{AttendanceRecord, AttendanceStatus},
    course::Course,
    entry::PassportEntry,
    role::Role,
    settings::{CloudConfig, SystemSettings},
    user::User,
};
use crate::models::{LoginReqDto, RegisterReq};
use crate::store::collection::SyncState;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "CareerPassport API",
        version = "1.0.0",
        description = r#"
## CareerPassport portal

Backend for a youth career-exploration portal run by social workers.
All data lives in a spreadsheet-backed script endpoint; this service keeps an
in-memory mirror of it.

### 🔹 Key Features
- **GPS attendance**
  - Students check in from their phone within the course radius (100 m default)
  - On time until 15 minutes after the start, late afterwards
  - Social workers can set any student's status by hand
- **Courses, journal entries and announcements**
- **Portal settings and course categories**

### 🔐 Security
Endpoints under `/api` need a **JWT Bearer** access token from `/auth/login`.
Write operations on courses, attendance and settings are limited to social workers.

### 📦 Sync state
Every cached item carries `sync`: `confirmed`, `pending` or `pending_delete`.
A write the remote store rejects is rolled back and reported as `502`.
"#,
    ),
    paths(
        crate::auth::handlers::login,
        crate::auth::handlers::register,
        crate::auth::handlers::refresh_token,
        crate::auth::handlers::logout,

        crate::api::user::me,
        crate::api::user::update_me,
        crate::api::user::list_users,

        crate::api::course::list_courses,
        crate::api::course::today_courses,
        crate::api::course::get_course,
        crate::api::course::create_course,
        crate::api::course::update_course,
        crate::api::course::delete_course,
        crate::api::course::check_in,

        crate::api::attendance::list_attendance,
        crate::api::attendance::override_attendance,

        crate::api::entry::list_entries,
        crate::api::entry::create_entry,
        crate::api::entry::update_entry,
        crate::api::entry::delete_entry,

        crate::api::announcement::list_announcements,
        crate::api::announcement::create_announcement,
        crate::api::announcement::delete_announcement,

        crate::api::settings::get_settings,
        crate::api::settings::update_settings,
        crate::api::settings::get_categories,
        crate::api::settings::update_categories,
        crate::api::settings::get_cloud_config,
        crate::api::settings::update_cloud_config,
        crate::api::settings::sync
    ),
    components(
        schemas(
            LoginReqDto,
            RegisterReq,
            Role,
            User,
            UpdateProfile,
            Course,
            LocationReading,
            SensorFailure,
            AttendanceRecord,
            AttendanceStatus,
            OverrideAttendance,
            PassportEntry,
            Announcement,
            SystemSettings,
            Categories,
            CloudConfig,
            SyncState
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Sign in, registration and tokens"),
        (name = "User", description = "Accounts and profiles"),
        (name = "Course", description = "Course catalogue"),
        (name = "Attendance", description = "GPS check-in and manual attendance"),
        (name = "Entry", description = "Career passport journal"),
        (name = "Announcement", description = "Announcements from social workers"),
        (name = "Settings", description = "Portal settings and remote sync"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}
