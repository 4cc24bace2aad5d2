use crate::{
    auth::auth::AuthUser,
    model::entry::PassportEntry,
    store::{PortalStore, StoreError, new_id},
};
use actix_web::{HttpResponse, Responder, error::ErrorForbidden, web};
use serde::Deserialize;
use tracing::info;
use utoipa::IntoParams;

#[derive(Debug, Deserialize, IntoParams)]
pub struct EntryQuery {
    /// Social workers only; students always get their own entries
    pub student_id: Option<String>,
}

fn owned_entry(store: &PortalStore, id: &str) -> Result<PassportEntry, StoreError> {
    store
        .get_entry(id)
        .map(|e| e.item)
        .ok_or_else(|| StoreError::NotFound {
            kind: "entry",
            id: id.to_string(),
        })
}

/// List journal entries, newest first
#[utoipa::path(
    get,
    path = "/api/entries",
    params(EntryQuery),
    responses(
        (status = 200, description = "Entries with their sync state", body = [PassportEntry]),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Entry"
)]
pub async fn list_entries(
    auth: AuthUser,
    store: web::Data<PortalStore>,
    query: web::Query<EntryQuery>,
) -> impl Responder {
    let student_id = if auth.is_student() {
        Some(auth.user_id.as_str())
    } else {
        query.student_id.as_deref()
    };

    HttpResponse::Ok().json(store.list_entries(student_id))
}

/// Create journal entry
#[utoipa::path(
    post,
    path = "/api/entries",
    request_body = PassportEntry,
    responses(
        (status = 201, description = "Entry saved", body = PassportEntry),
        (status = 403, description = "Student only"),
        (status = 502, description = "Remote store rejected the write")
    ),
    security(("bearer_auth" = [])),
    tag = "Entry"
)]
pub async fn create_entry(
    auth: AuthUser,
    store: web::Data<PortalStore>,
    payload: web::Json<PassportEntry>,
) -> actix_web::Result<impl Responder> {
    auth.require_student()?;

    let mut entry = payload.into_inner();
    entry.id = new_id();
    entry.student_id = auth.user_id;

    let entry = store.save_entry(entry).await?;
    info!(entry_id = %entry.id, "Journal entry created");

    Ok(HttpResponse::Created().json(entry))
}

/// Update own journal entry
#[utoipa::path(
    put,
    path = "/api/entries/{id}",
    params(("id" = String, Path, description = "Entry id")),
    request_body = PassportEntry,
    responses(
        (status = 200, description = "Entry saved", body = PassportEntry),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Entry not found"),
        (status = 502, description = "Remote store rejected the write")
    ),
    security(("bearer_auth" = [])),
    tag = "Entry"
)]
pub async fn update_entry(
    auth: AuthUser,
    path: web::Path<String>,
    store: web::Data<PortalStore>,
    payload: web::Json<PassportEntry>,
) -> actix_web::Result<impl Responder> {
    let existing = owned_entry(&store, &path)?;
    if existing.student_id != auth.user_id {
        return Err(ErrorForbidden("Only the author can edit this entry"));
    }

    let mut entry = payload.into_inner();
    entry.id = existing.id;
    entry.student_id = existing.student_id;

    Ok(HttpResponse::Ok().json(store.save_entry(entry).await?))
}

/// Delete journal entry
#[utoipa::path(
    delete,
    path = "/api/entries/{id}",
    params(("id" = String, Path, description = "Entry id")),
    responses(
        (status = 204, description = "Entry deleted"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Entry not found"),
        (status = 502, description = "Remote store rejected the write")
    ),
    security(("bearer_auth" = [])),
    tag = "Entry"
)]
pub async fn delete_entry(
    auth: AuthUser,
    path: web::Path<String>,
    store: web::Data<PortalStore>,
) -> actix_web::Result<impl Responder> {
    let existing = owned_entry(&store, &path)?;
    if existing.student_id != auth.user_id && !auth.role.is_social_worker() {
        return Err(ErrorForbidden("Only the author can delete this entry"));
    }

    store.delete_entry(&existing.id).await?;

    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::jwt::generate_access_token,
        config::test_config,
        model::user::User,
        store::tests::{mount_saves, seeded_store, student},
    };
    use actix_web::{App, test};
    use serde_json::json;
    use wiremock::MockServer;

    fn bearer_for(user: &User) -> (&'static str, String) {
        let config = test_config("http://localhost");
        let token = generate_access_token(user, &config.jwt_secret, 900).unwrap();
        ("Authorization", format!("Bearer {token}"))
    }

    #[actix_web::test]
    async fn only_the_author_can_edit() {
        let server = MockServer::start().await;
        mount_saves(&server, "success").await;
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(seeded_store(&server)))
                .app_data(web::Data::new(test_config(&server.uri())))
                .route("/entries", web::post().to(create_entry))
                .route("/entries", web::get().to(list_entries))
                .route("/entries/{id}", web::put().to(update_entry)),
        )
        .await;
        let ming = student("u1", "ming@student.edu");
        let mei = student("u2", "mei@student.edu");

        let req = test::TestRequest::post()
            .uri("/entries")
            .insert_header(bearer_for(&ming))
            .set_json(json!({
                "studentId": "someone-else", "title": "咖啡師體驗心得",
                "content": "學會拉花", "date": "2026-03-02", "isPublic": true
            }))
            .to_request();
        let created: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(created["studentId"], "u1");
        let id = created["id"].as_str().unwrap().to_string();

        let req = test::TestRequest::put()
            .uri(&format!("/entries/{id}"))
            .insert_header(bearer_for(&mei))
            .set_json(json!({"studentId": "u2", "title": "x", "date": "2026-03-02"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 403);

        let req = test::TestRequest::get()
            .uri("/entries?student_id=u1")
            .insert_header(bearer_for(&mei))
            .to_request();
        let list: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert!(list.as_array().unwrap().is_empty());
    }
}
