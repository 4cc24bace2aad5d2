use crate::{
    api::{announcement, attendance, course, entry, settings, user},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

// Helper to build per-route limiter
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let requests_per_min = requests_per_min.max(1);
    let per_ms = (60_000 / requests_per_min as u64).max(1);

    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .expect("non-zero period and burst size");
    Governor::new(&cfg)
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config) {
    let login_limiter = Arc::new(build_limiter(config.rate_login_per_min));
    let register_limiter = Arc::new(build_limiter(config.rate_register_per_min));
    let refresh_limiter = Arc::new(build_limiter(config.rate_refresh_per_min));
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));

    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/register")
                    .wrap(register_limiter.clone())
                    .route(web::post().to(handlers::register)),
            )
            .service(
                web::resource("/refresh")
                    .wrap(refresh_limiter.clone())
                    .route(web::post().to(handlers::refresh_token)),
            )
            .service(
                web::resource("/logout")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::logout)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(protected_limiter) // rate limiting
            .service(
                web::resource("/me")
                    .route(web::get().to(user::me))
                    .route(web::put().to(user::update_me)),
            )
            .service(web::resource("/users").route(web::get().to(user::list_users)))
            .service(
                web::scope("/courses")
                    // /courses
                    .service(
                        web::resource("")
                            .route(web::get().to(course::list_courses))
                            .route(web::post().to(course::create_course)),
                    )
                    // /courses/today, registered before /{id}
                    .service(web::resource("/today").route(web::get().to(course::today_courses)))
                    // /courses/{id}
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(course::get_course))
                            .route(web::put().to(course::update_course))
                            .route(web::delete().to(course::delete_course)),
                    )
                    // /courses/{id}/check-in
                    .service(
                        web::resource("/{id}/check-in").route(web::post().to(course::check_in)),
                    ),
            )
            .service(
                web::resource("/attendance")
                    .route(web::get().to(attendance::list_attendance))
                    .route(web::put().to(attendance::override_attendance)),
            )
            .service(
                web::scope("/entries")
                    .service(
                        web::resource("")
                            .route(web::get().to(entry::list_entries))
                            .route(web::post().to(entry::create_entry)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::put().to(entry::update_entry))
                            .route(web::delete().to(entry::delete_entry)),
                    ),
            )
            .service(
                web::scope("/announcements")
                    .service(
                        web::resource("")
                            .route(web::get().to(announcement::list_announcements))
                            .route(web::post().to(announcement::create_announcement)),
                    )
                    .service(
                        web::resource("/{id}")
                            .route(web::delete().to(announcement::delete_announcement)),
                    ),
            )
            .service(
                web::resource("/settings")
                    .route(web::get().to(settings::get_settings))
                    .route(web::put().to(settings::update_settings)),
            )
            .service(
                web::resource("/categories")
                    .route(web::get().to(settings::get_categories))
                    .route(web::put().to(settings::update_categories)),
            )
            .service(
                web::resource("/cloud-config")
                    .route(web::get().to(settings::get_cloud_config))
                    .route(web::put().to(settings::update_cloud_config)),
            )
            .service(web::resource("/sync").route(web::post().to(settings::sync))),
    );
}

// LOGIN
//  ├─ access_token (15 min)
//  └─ refresh_token (7 days, one exchange each)

// API REQUEST
//  └─ Authorization: Bearer access_token

// ACCESS EXPIRED
//  └─ POST /auth/refresh with refresh_token
//       └─ returns a new token pair, old refresh token revoked
