use crate::{
    auth::auth::AuthUser,
    model::user::User,
    store::{PortalStore, StoreError, collection::Synced},
};
use actix_web::{HttpResponse, Responder, web};
use serde::Deserialize;
use tracing::info;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfile {
    #[schema(example = "小明")]
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    /// School, department and grade
    #[schema(example = "建國中學 / 一年級")]
    pub school_details: Option<String>,
    #[schema(example = "0912345678")]
    pub phone_number: Option<String>,
}

fn not_blank(value: Option<&String>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

fn current_user(store: &PortalStore, auth: &AuthUser) -> Result<Synced<User>, StoreError> {
    store
        .get_user(&auth.user_id)
        .ok_or_else(|| StoreError::NotFound {
            kind: "user",
            id: auth.user_id.clone(),
        })
}

/// Current user
#[utoipa::path(
    get,
    path = "/api/me",
    responses(
        (status = 200, description = "Signed-in account", body = User),
        (status = 404, description = "Account no longer cached")
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn me(auth: AuthUser, store: web::Data<PortalStore>) -> actix_web::Result<impl Responder> {
    Ok(HttpResponse::Ok().json(current_user(&store, &auth)?))
}

/// Update own profile
///
/// The profile counts as completed once school details and a phone number
/// are both on file.
#[utoipa::path(
    put,
    path = "/api/me",
    request_body = UpdateProfile,
    responses(
        (status = 200, description = "Profile saved", body = User),
        (status = 404, description = "Account no longer cached"),
        (status = 502, description = "Remote store rejected the write")
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn update_me(
    auth: AuthUser,
    store: web::Data<PortalStore>,
    payload: web::Json<UpdateProfile>,
) -> actix_web::Result<impl Responder> {
    let mut user = current_user(&store, &auth)?.item;
    let update = payload.into_inner();

    if let Some(name) = update.name.filter(|n| !n.trim().is_empty()) {
        user.name = name.trim().to_string();
    }
    if update.avatar_url.is_some() {
        user.avatar_url = update.avatar_url;
    }
    if update.school_details.is_some() {
        user.school_details = update.school_details;
    }
    if update.phone_number.is_some() {
        user.phone_number = update.phone_number;
    }

    let completed =
        not_blank(user.school_details.as_ref()) && not_blank(user.phone_number.as_ref());
    user.is_profile_completed = Some(completed);

    let user = store.save_user(user).await?;
    info!(user_id = %user.id, completed, "Profile updated");

    Ok(HttpResponse::Ok().json(user))
}

/// List users
#[utoipa::path(
    get,
    path = "/api/users",
    responses(
        (status = 200, description = "All accounts", body = [User]),
        (status = 403, description = "Social worker only")
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn list_users(
    auth: AuthUser,
    store: web::Data<PortalStore>,
) -> actix_web::Result<impl Responder> {
    auth.require_social_worker()?;
    Ok(HttpResponse::Ok().json(store.list_users()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::jwt::generate_access_token,
        config::test_config,
        store::tests::{mount_saves, seeded_store, student},
    };
    use actix_web::{App, test};
    use serde_json::json;
    use wiremock::MockServer;

    #[actix_web::test]
    async fn profile_completes_with_school_and_phone() {
        let server = MockServer::start().await;
        mount_saves(&server, "success").await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(seeded_store(&server)))
                .app_data(web::Data::new(test_config(&server.uri())))
                .route("/me", web::put().to(update_me))
                .route("/users", web::get().to(list_users)),
        )
        .await;
        let token =
            generate_access_token(&student("u1", "ming@student.edu"), "test-secret", 900).unwrap();
        let auth = ("Authorization", format!("Bearer {token}"));

        let req = test::TestRequest::put()
            .uri("/me")
            .insert_header(auth.clone())
            .set_json(json!({"schoolDetails": "建國中學 / 一年級"}))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["isProfileCompleted"], false);

        let req = test::TestRequest::put()
            .uri("/me")
            .insert_header(auth.clone())
            .set_json(json!({"phoneNumber": "0912345678"}))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["isProfileCompleted"], true);
        assert_eq!(body["schoolDetails"], "建國中學 / 一年級");

        let req = test::TestRequest::get()
            .uri("/users")
            .insert_header(auth)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 403);
    }

    #[actix_web::test]
    async fn me_returns_cached_account_or_not_found() {
        let server = MockServer::start().await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(seeded_store(&server)))
                .app_data(web::Data::new(test_config(&server.uri())))
                .route("/me", web::get().to(me)),
        )
        .await;

        let token =
            generate_access_token(&student("u1", "ming@student.edu"), "test-secret", 900).unwrap();
        let req = test::TestRequest::get()
            .uri("/me")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["id"], "u1");
        assert_eq!(body["sync"], "confirmed");

        let token =
            generate_access_token(&student("u9", "gone@student.edu"), "test-secret", 900).unwrap();
        let req = test::TestRequest::get()
            .uri("/me")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 404);
    }
}
