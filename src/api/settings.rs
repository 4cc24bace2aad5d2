use crate::{
    auth::auth::AuthUser,
    model::settings::{CloudConfig, SystemSettings},
    store::{PortalStore, collection::SyncState},
    utils::email_filter,
};
use actix_web::{HttpResponse, Responder, error::ErrorBadRequest, web};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Categories {
    #[schema(example = json!(["自我探索", "職涯體驗"]))]
    pub items: Vec<String>,
    #[serde(default, skip_deserializing)]
    #[schema(read_only)]
    pub sync: Option<SyncState>,
}

/// Get system settings
#[utoipa::path(
    get,
    path = "/api/settings",
    responses((status = 200, description = "Current settings", body = SystemSettings)),
    security(("bearer_auth" = [])),
    tag = "Settings"
)]
pub async fn get_settings(store: web::Data<PortalStore>) -> impl Responder {
    HttpResponse::Ok().json(store.settings())
}

/// Replace system settings
#[utoipa::path(
    put,
    path = "/api/settings",
    request_body = SystemSettings,
    responses(
        (status = 200, description = "Settings saved", body = SystemSettings),
        (status = 403, description = "Social worker only"),
        (status = 502, description = "Remote store rejected the write")
    ),
    security(("bearer_auth" = [])),
    tag = "Settings"
)]
pub async fn update_settings(
    auth: AuthUser,
    store: web::Data<PortalStore>,
    payload: web::Json<SystemSettings>,
) -> actix_web::Result<impl Responder> {
    auth.require_social_worker()?;

    store.save_settings(payload.into_inner()).await?;
    info!(by = %auth.user_id, "System settings updated");

    Ok(HttpResponse::Ok().json(store.settings()))
}

/// Get course categories
#[utoipa::path(
    get,
    path = "/api/categories",
    responses((status = 200, description = "Categories in display order", body = Categories)),
    security(("bearer_auth" = [])),
    tag = "Settings"
)]
pub async fn get_categories(store: web::Data<PortalStore>) -> impl Responder {
    let categories = store.categories();
    HttpResponse::Ok().json(Categories {
        items: categories.item,
        sync: Some(categories.sync),
    })
}

/// Replace course categories
#[utoipa::path(
    put,
    path = "/api/categories",
    request_body = Categories,
    responses(
        (status = 200, description = "Categories saved", body = Categories),
        (status = 400, description = "Empty or duplicate category"),
        (status = 403, description = "Social worker only"),
        (status = 502, description = "Remote store rejected the write")
    ),
    security(("bearer_auth" = [])),
    tag = "Settings"
)]
pub async fn update_categories(
    auth: AuthUser,
    store: web::Data<PortalStore>,
    payload: web::Json<Categories>,
) -> actix_web::Result<impl Responder> {
    auth.require_social_worker()?;

    let mut items: Vec<String> = Vec::with_capacity(payload.items.len());
    for name in &payload.items {
        let name = name.trim();
        if name.is_empty() || items.iter().any(|c| c == name) {
            return Err(ErrorBadRequest("Category names must be non-empty and unique"));
        }
        items.push(name.to_string());
    }

    store.save_categories(items).await?;

    Ok(get_categories(store).await)
}

/// Get cloud sync configuration
#[utoipa::path(
    get,
    path = "/api/cloud-config",
    responses(
        (status = 200, description = "Cloud sync configuration", body = CloudConfig),
        (status = 403, description = "Social worker only")
    ),
    security(("bearer_auth" = [])),
    tag = "Settings"
)]
pub async fn get_cloud_config(
    auth: AuthUser,
    store: web::Data<PortalStore>,
) -> actix_web::Result<impl Responder> {
    auth.require_social_worker()?;
    Ok(HttpResponse::Ok().json(store.cloud_config()))
}

/// Replace cloud sync configuration
#[utoipa::path(
    put,
    path = "/api/cloud-config",
    request_body = CloudConfig,
    responses(
        (status = 200, description = "Configuration saved", body = CloudConfig),
        (status = 403, description = "Social worker only"),
        (status = 502, description = "Remote store rejected the write")
    ),
    security(("bearer_auth" = [])),
    tag = "Settings"
)]
pub async fn update_cloud_config(
    auth: AuthUser,
    store: web::Data<PortalStore>,
    payload: web::Json<CloudConfig>,
) -> actix_web::Result<impl Responder> {
    auth.require_social_worker()?;

    store.save_cloud_config(payload.into_inner()).await?;

    Ok(HttpResponse::Ok().json(store.cloud_config()))
}

/// Reload everything from the remote store
#[utoipa::path(
    post,
    path = "/api/sync",
    responses(
        (status = 200, description = "Cache reloaded", body = Object, example = json!({
            "message": "Synced", "users": 12
        })),
        (status = 403, description = "Social worker only"),
        (status = 502, description = "Remote store unavailable")
    ),
    security(("bearer_auth" = [])),
    tag = "Settings"
)]
pub async fn sync(
    auth: AuthUser,
    store: web::Data<PortalStore>,
) -> actix_web::Result<impl Responder> {
    auth.require_social_worker()?;

    store.sync().await.inspect_err(|e| {
        error!(error = %e, "Manual sync failed");
    })?;
    let users = email_filter::warmup_email_filter(&store, 500);

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Synced",
        "users": users
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::jwt::generate_access_token,
        config::test_config,
        model::{role::Role, user::User},
        store::tests::{mount_saves, seeded_store, student},
    };
    use actix_web::{App, test};
    use serde_json::json;
    use wiremock::MockServer;

    fn worker_bearer() -> (&'static str, String) {
        let worker = User {
            role: Role::SocialWorker,
            ..student("w1", "chang@socialwork.org")
        };
        let token = generate_access_token(&worker, "test-secret", 900).unwrap();
        ("Authorization", format!("Bearer {token}"))
    }

    #[actix_web::test]
    async fn categories_round_trip_through_the_api() {
        let server = MockServer::start().await;
        mount_saves(&server, "success").await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(seeded_store(&server)))
                .app_data(web::Data::new(test_config(&server.uri())))
                .route("/categories", web::get().to(get_categories))
                .route("/categories", web::put().to(update_categories)),
        )
        .await;

        let req = test::TestRequest::put()
            .uri("/categories")
            .insert_header(worker_bearer())
            .set_json(json!({"items": ["自我探索", " 機器人 "]}))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["items"], json!(["自我探索", "機器人"]));
        assert_eq!(body["sync"], "confirmed");

        let req = test::TestRequest::put()
            .uri("/categories")
            .insert_header(worker_bearer())
            .set_json(json!({"items": ["a", "a"]}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);
    }

    #[actix_web::test]
    async fn failed_settings_write_keeps_old_value() {
        let server = MockServer::start().await;
        mount_saves(&server, "error").await;
        let store = web::Data::new(seeded_store(&server));
        let app = test::init_service(
            App::new()
                .app_data(store.clone())
                .app_data(web::Data::new(test_config(&server.uri())))
                .route("/settings", web::put().to(update_settings)),
        )
        .await;

        let req = test::TestRequest::put()
            .uri("/settings")
            .insert_header(worker_bearer())
            .set_json(json!({
                "landingTitle": "新標題", "landingSubtitle": "", "landingImageUrl": ""
            }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 502);

        let current = store.settings();
        assert_eq!(current.item, SystemSettings::default());
        assert_eq!(current.sync, SyncState::Confirmed);
    }
}
