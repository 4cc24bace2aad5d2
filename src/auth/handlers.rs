use crate::{
    auth::{
        jwt::{generate_access_token, generate_refresh_token, verify_token},
        password::verify_password,
    },
    config::Config,
    model::{role::Role, user::User},
    models::{LoginReqDto, RegisterReq, TokenType},
    remote::{Credentials, RemoteError},
    store::{PortalStore, StoreError, new_id},
    utils::{email_filter, token_store::RefreshTokens},
};
use actix_web::{HttpRequest, HttpResponse, Responder, web};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, instrument};

#[derive(Serialize)]
struct LoginResponse {
    access_token: String,
    refresh_token: String,
    user: User,
}

/// Configured administrator credentials, checked against the argon2 hash.
fn is_bootstrap_admin(config: &Config, email: &str, password: &str) -> bool {
    config.admin_email.eq_ignore_ascii_case(email.trim())
        && config
            .admin_password_hash
            .as_deref()
            .is_some_and(|hash| verify_password(password, hash).is_ok())
}

async fn issue_tokens(
    user: &User,
    config: &Config,
    tokens: &RefreshTokens,
) -> Result<(String, String), HttpResponse> {
    let access_token = generate_access_token(user, &config.jwt_secret, config.access_token_ttl);
    let refresh = generate_refresh_token(user, &config.jwt_secret, config.refresh_token_ttl);

    match (access_token, refresh) {
        (Ok(access_token), Ok((refresh_token, claims))) => {
            debug!(user_id = %user.id, jti = %claims.jti, "Storing refresh token");
            tokens.remember(&claims.jti, &user.id).await;
            Ok((access_token, refresh_token))
        }
        (Err(e), _) | (_, Err(e)) => {
            error!(error = %e, "Failed to sign tokens");
            Err(HttpResponse::InternalServerError().finish())
        }
    }
}

/// Registration handler
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterReq,
    responses(
        (status = 201, description = "Account created", body = Object, example = json!({
            "message": "User registered successfully"
        })),
        (status = 400, description = "Missing fields"),
        (status = 403, description = "Email not authorized for social worker accounts"),
        (status = 409, description = "Email already registered"),
        (status = 502, description = "Remote store unavailable")
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_register", skip(req, store, config), fields(email = %req.email))]
pub async fn register(
    req: web::Json<RegisterReq>,
    store: web::Data<PortalStore>,
    config: web::Data<Config>,
) -> impl Responder {
    let req = req.into_inner();
    let email = req.email.trim().to_lowercase();

    if req.name.trim().is_empty() || email.is_empty() || req.password.is_empty() {
        return HttpResponse::BadRequest().json(json!({
            "error": "Name, email and password must not be empty"
        }));
    }

    // only social workers need to be on the allow list
    if req.role == Role::SocialWorker {
        let mut allowed = config.authorized_worker_emails.clone();
        allowed.push(config.admin_email.clone());

        if !store.settings().item.authorizes_worker(&email, &allowed) {
            info!("Social worker registration refused: email not authorized");
            return HttpResponse::Forbidden().json(json!({
                "error": format!(
                    "This email is not authorized for social worker accounts, contact {}",
                    config.admin_email
                )
            }));
        }
    }

    if !email_filter::is_email_available(&email, &store) {
        return HttpResponse::Conflict().json(json!({
            "error": "Email already registered"
        }));
    }

    let user = User {
        id: new_id(),
        name: req.name.trim().to_string(),
        email: email.clone(),
        role: req.role,
        avatar_url: Some(format!(
            "https://api.dicebear.com/7.x/avataaars/svg?seed={}",
            req.name.trim()
        )),
        is_profile_completed: Some(false),
        school_details: None,
        phone_number: None,
    };

    match store.register(user, &req.password).await {
        Ok(user) => {
            email_filter::insert(&user.email);
            info!(user_id = %user.id, "User registered");
            HttpResponse::Created().json(json!({
                "message": "User registered successfully"
            }))
        }
        Err(StoreError::Remote(RemoteError::Rejected { message, .. })) => {
            HttpResponse::BadRequest().json(json!({ "error": message }))
        }
        Err(e) => {
            error!(error = %e, "Failed to register user");
            HttpResponse::BadGateway().json(json!({
                "error": "Registration failed, please try again later"
            }))
        }
    }
}

/// Login handler
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Signed in", body = Object, example = json!({
            "access_token": "eyJ...",
            "refresh_token": "eyJ...",
            "user": {"id": "u1", "name": "小明", "email": "ming@student.edu", "role": "STUDENT"}
        })),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account belongs to the other portal"),
        (status = 502, description = "Remote store unavailable")
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_login",
    skip(user, store, config, tokens),
    fields(email = %user.email)
)]
pub async fn login(
    user: web::Json<LoginReqDto>,
    store: web::Data<PortalStore>,
    config: web::Data<Config>,
    tokens: web::Data<RefreshTokens>,
) -> impl Responder {
    info!("Login request received");

    if user.email.trim().is_empty() || user.password.is_empty() {
        info!("Validation failed: empty email or password");
        return HttpResponse::BadRequest().body("Email or password required");
    }

    let bootstrap = is_bootstrap_admin(&config, &user.email, &user.password);
    let creds = Credentials::new(user.email.trim(), user.password.clone());

    debug!(bootstrap, "Authenticating against remote store");

    let account = match store.authenticate(&creds, bootstrap).await {
        Ok(account) => account,
        Err(StoreError::Remote(RemoteError::Rejected { message, .. })) => {
            info!(%message, "Invalid credentials");
            return HttpResponse::Unauthorized().json(json!({ "error": message }));
        }
        Err(StoreError::UnknownUser(_)) => {
            info!("Signed in remotely but no portal account found");
            return HttpResponse::Unauthorized().json(json!({
                "error": "No account found for this email, please register first"
            }));
        }
        Err(e) => {
            error!(error = %e, "Remote store error during login");
            return HttpResponse::BadGateway().json(json!({
                "error": "Could not reach the data service"
            }));
        }
    };

    email_filter::warmup_email_filter(&store, 500);

    if let Some(required) = user.role {
        if account.role != required {
            info!(role = %account.role, "Login refused: wrong portal");
            return HttpResponse::Forbidden().json(json!({
                "error": format!("This account is not a {} account", required)
            }));
        }
    }

    let (access_token, refresh_token) = match issue_tokens(&account, &config, &tokens).await {
        Ok(pair) => pair,
        Err(resp) => return resp,
    };

    info!(user_id = %account.id, "Login successful");

    HttpResponse::Ok().json(LoginResponse {
        access_token,
        refresh_token,
        user: account,
    })
}

fn bearer(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

/// Exchange a refresh token for a new token pair
#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "New token pair"),
        (status = 401, description = "Refresh token invalid, expired or revoked")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn refresh_token(
    req: HttpRequest,
    store: web::Data<PortalStore>,
    config: web::Data<Config>,
    tokens: web::Data<RefreshTokens>,
) -> impl Responder {
    let Some(token) = bearer(&req) else {
        return HttpResponse::Unauthorized().body("No token");
    };

    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) if c.token_type == TokenType::Refresh => c,
        _ => return HttpResponse::Unauthorized().finish(),
    };

    // 🔍 unknown or revoked
    if tokens.owner(&claims.jti).await.as_deref() != Some(claims.user_id.as_str()) {
        return HttpResponse::Unauthorized().finish();
    }

    // 🔥 one refresh token, one exchange
    tokens.revoke(&claims.jti).await;

    let account = match store.get_user(&claims.user_id) {
        Some(u) => u.item,
        None => {
            info!(user_id = %claims.user_id, "Refresh for account no longer cached");
            return HttpResponse::Unauthorized().finish();
        }
    };

    match issue_tokens(&account, &config, &tokens).await {
        Ok((access_token, refresh_token)) => HttpResponse::Ok().json(json!({
            "access_token": access_token,
            "refresh_token": refresh_token
        })),
        Err(resp) => resp,
    }
}

/// Revoke a refresh token
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses((status = 204, description = "Signed out (also when the token was unknown)")),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn logout(
    req: HttpRequest,
    config: web::Data<Config>,
    tokens: web::Data<RefreshTokens>,
) -> impl Responder {
    let Some(token) = bearer(&req) else {
        return HttpResponse::NoContent().finish();
    };

    if let Ok(claims) = verify_token(token, &config.jwt_secret) {
        // only refresh tokens can logout
        if claims.token_type == TokenType::Refresh {
            tokens.revoke(&claims.jti).await;
        }
    }

    HttpResponse::NoContent().finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::hash_password;
    use crate::config::test_config;
    use crate::store::tests::{mount_saves, seeded_store};
    use actix_web::{App, test};
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    macro_rules! auth_app {
        ($store:expr, $config:expr, $tokens:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($store))
                    .app_data(web::Data::new($config))
                    .app_data(web::Data::new($tokens))
                    .route("/auth/login", web::post().to(login))
                    .route("/auth/register", web::post().to(register))
                    .route("/auth/refresh", web::post().to(refresh_token))
                    .route("/auth/logout", web::post().to(logout)),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn bootstrap_admin_needs_matching_hash() {
        let mut config = test_config("http://localhost");
        assert!(!is_bootstrap_admin(&config, "lemon70431@gfm.org.tw", "04151704"));

        config.admin_password_hash = Some(hash_password("04151704").unwrap());
        assert!(is_bootstrap_admin(&config, " LEMON70431@gfm.org.tw", "04151704"));
        assert!(!is_bootstrap_admin(&config, "lemon70431@gfm.org.tw", "guess"));
        assert!(!is_bootstrap_admin(&config, "chang@socialwork.org", "04151704"));
    }

    #[actix_web::test]
    async fn login_then_refresh_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"action": "login"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "data": {"users": [{"id": "u1", "name": "小明", "email": "ming@student.edu", "role": "STUDENT"}]}
            })))
            .mount(&server)
            .await;
        let config = test_config(&server.uri());
        let app = auth_app!(seeded_store(&server), config, RefreshTokens::new(60));

        let req = test::TestRequest::post()
            .uri("/auth/login")
            .set_json(json!({"email": "ming@student.edu", "password": "password123", "role": "STUDENT"}))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["user"]["id"], "u1");
        let refresh = body["refresh_token"].as_str().unwrap().to_string();

        let req = test::TestRequest::post()
            .uri("/auth/refresh")
            .insert_header(("Authorization", format!("Bearer {refresh}")))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 200);

        // the same refresh token cannot be used twice
        let req = test::TestRequest::post()
            .uri("/auth/refresh")
            .insert_header(("Authorization", format!("Bearer {refresh}")))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 401);
    }

    #[actix_web::test]
    async fn login_rejects_wrong_portal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "data": {"users": [{"id": "u1", "name": "小明", "email": "ming@student.edu", "role": "STUDENT"}]}
            })))
            .mount(&server)
            .await;
        let app = auth_app!(
            seeded_store(&server),
            test_config(&server.uri()),
            RefreshTokens::new(60)
        );

        let req = test::TestRequest::post()
            .uri("/auth/login")
            .set_json(json!({"email": "ming@student.edu", "password": "pw", "role": "SOCIAL_WORKER"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 403);
    }

    #[actix_web::test]
    async fn bad_password_is_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "fail", "message": "帳號或密碼錯誤"
            })))
            .mount(&server)
            .await;
        let app = auth_app!(
            seeded_store(&server),
            test_config(&server.uri()),
            RefreshTokens::new(60)
        );

        let req = test::TestRequest::post()
            .uri("/auth/login")
            .set_json(json!({"email": "ming@student.edu", "password": "nope"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 401);
    }

    #[actix_web::test]
    async fn unauthorized_social_worker_cannot_register() {
        let server = MockServer::start().await;
        mount_saves(&server, "success").await;
        let app = auth_app!(
            seeded_store(&server),
            test_config(&server.uri()),
            RefreshTokens::new(60)
        );

        let req = test::TestRequest::post()
            .uri("/auth/register")
            .set_json(json!({
                "name": "新社工", "email": "new@socialwork.org",
                "password": "pw", "role": "SOCIAL_WORKER"
            }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 403);

        let req = test::TestRequest::post()
            .uri("/auth/register")
            .set_json(json!({
                "name": "張社工", "email": "Chang@SocialWork.org",
                "password": "pw", "role": "SOCIAL_WORKER"
            }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 201);
    }

    #[actix_web::test]
    async fn student_registers_once() {
        let server = MockServer::start().await;
        mount_saves(&server, "success").await;
        let app = auth_app!(
            seeded_store(&server),
            test_config(&server.uri()),
            RefreshTokens::new(60)
        );

        let body = json!({
            "name": "小美", "email": "mei@student.edu",
            "password": "pw", "role": "STUDENT"
        });
        let req = test::TestRequest::post()
            .uri("/auth/register")
            .set_json(&body)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 201);

        let req = test::TestRequest::post()
            .uri("/auth/register")
            .set_json(&body)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 409);
    }

    #[actix_web::test]
    async fn logout_is_always_no_content() {
        let server = MockServer::start().await;
        let app = auth_app!(
            seeded_store(&server),
            test_config(&server.uri()),
            RefreshTokens::new(60)
        );

        let req = test::TestRequest::post().uri("/auth/logout").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 204);
    }
}
