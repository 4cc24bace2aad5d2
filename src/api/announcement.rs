use crate::{
    api::local_today,
    auth::auth::AuthUser,
    config::Config,
    model::announcement::Announcement,
    store::{PortalStore, new_id},
};
use actix_web::{HttpResponse, Responder, web};
use tracing::info;

/// List announcements, newest first
#[utoipa::path(
    get,
    path = "/api/announcements",
    responses(
        (status = 200, description = "Announcements with their sync state", body = [Announcement]),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Announcement"
)]
pub async fn list_announcements(store: web::Data<PortalStore>) -> impl Responder {
    HttpResponse::Ok().json(store.list_announcements())
}

/// Publish announcement
///
/// Author and date are filled in from the caller and today's date.
#[utoipa::path(
    post,
    path = "/api/announcements",
    request_body = Announcement,
    responses(
        (status = 201, description = "Announcement published", body = Announcement),
        (status = 403, description = "Social worker only"),
        (status = 502, description = "Remote store rejected the write")
    ),
    security(("bearer_auth" = [])),
    tag = "Announcement"
)]
pub async fn create_announcement(
    auth: AuthUser,
    store: web::Data<PortalStore>,
    config: web::Data<Config>,
    payload: web::Json<Announcement>,
) -> actix_web::Result<impl Responder> {
    auth.require_social_worker()?;

    let mut announcement = payload.into_inner();
    announcement.id = new_id();
    announcement.author_name = store
        .get_user(&auth.user_id)
        .map(|u| u.item.name)
        .unwrap_or(auth.email);
    if announcement.date.trim().is_empty() {
        announcement.date = local_today(&config).format("%Y-%m-%d").to_string();
    }

    let announcement = store.save_announcement(announcement).await?;
    info!(announcement_id = %announcement.id, "Announcement published");

    Ok(HttpResponse::Created().json(announcement))
}

/// Delete announcement
#[utoipa::path(
    delete,
    path = "/api/announcements/{id}",
    params(("id" = String, Path, description = "Announcement id")),
    responses(
        (status = 204, description = "Announcement deleted"),
        (status = 403, description = "Social worker only"),
        (status = 404, description = "Announcement not found"),
        (status = 502, description = "Remote store rejected the write")
    ),
    security(("bearer_auth" = [])),
    tag = "Announcement"
)]
pub async fn delete_announcement(
    auth: AuthUser,
    path: web::Path<String>,
    store: web::Data<PortalStore>,
) -> actix_web::Result<impl Responder> {
    auth.require_social_worker()?;

    store.delete_announcement(&path).await?;

    Ok(HttpResponse::NoContent().finish())
}
