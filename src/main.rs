use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};

mod api;
mod auth;
mod checkin;
mod config;
mod docs;
mod model;
mod models;
mod remote;
mod routes;
mod store;
mod utils;

use config::Config;

use crate::docs::ApiDoc;
use crate::remote::{Credentials, ScriptClient};
use crate::store::PortalStore;
use crate::utils::{email_filter, token_store::RefreshTokens};
use anyhow::Context;
use tracing::{info, warn};
use tracing_appender::rolling;
use utoipa::OpenApi; // ← needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "CareerPassport"
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // `career-passport hash-password <pw>` prints a value for ADMIN_PASSWORD_HASH
    let args: Vec<String> = std::env::args().collect();
    if let [_, cmd, password] = args.as_slice() {
        if cmd == "hash-password" {
            let hash = auth::password::hash_password(password)
                .map_err(|e| anyhow::anyhow!("failed to hash password: {e}"))?;
            println!("{hash}");
            return Ok(());
        }
    }

    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!("Server starting...");

    let remote = ScriptClient::new(&config.script_url, config.remote_timeout_secs)
        .context("failed to build remote store client")?;
    let store = Data::new(PortalStore::new(
        remote,
        Credentials::new(&config.script_user_id, &config.script_password),
    ));
    let tokens = Data::new(RefreshTokens::new(config.refresh_token_ttl));

    let store_for_warmup = store.clone();
    let server_addr = config.server_addr.clone();
    let config_data = Data::new(config);

    actix_web::rt::spawn(async move {
        // first hydration, then the email filter from the loaded accounts
        match store_for_warmup.sync().await {
            Ok(()) => {
                email_filter::warmup_email_filter(&store_for_warmup, 500);
            }
            Err(e) => warn!(error = %e, "Initial sync failed, starting with an empty cache"),
        }
    });

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← important: wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(store.clone())
            .app_data(tokens.clone())
            .app_data(config_data.clone())
            .service(index)
            // Configure auth + protected routes with rate limiting
            .configure(|cfg| routes::configure(cfg, &config_data))
    })
    .bind(&server_addr)
    .with_context(|| format!("failed to bind {server_addr}"))?
    .run()
    .await?;

    Ok(())
}
