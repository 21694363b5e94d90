use crate::{
    api::{attendance, device, hr_request},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use anyhow::anyhow;
use std::sync::Arc;

type Limiter = Governor<PeerIpKeyExtractor, NoOpMiddleware>;

/// Token bucket refilling `requests_per_min` per minute, with the same burst.
/// `None` when the value cannot form a quota (zero).
fn build_limiter(requests_per_min: u32) -> Option<Limiter> {
    if requests_per_min == 0 {
        return None;
    }
    let per_ms = (60_000 / requests_per_min as u64).max(1);
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()?;
    Some(Governor::new(&cfg))
}

/// Built once at startup and shared by every worker.
#[derive(Clone)]
pub struct Limiters {
    login: Arc<Limiter>,
    refresh: Arc<Limiter>,
    protected: Arc<Limiter>,
}

impl Limiters {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let build = |name: &str, per_min: u32| {
            build_limiter(per_min)
                .map(Arc::new)
                .ok_or_else(|| anyhow!("{name} rate limit must be at least 1 request per minute"))
        };
        Ok(Self {
            login: build("RATE_LOGIN_PER_MIN", config.rate_login_per_min)?,
            refresh: build("RATE_REFRESH_PER_MIN", config.rate_refresh_per_min)?,
            protected: build("RATE_PROTECTED_PER_MIN", config.rate_protected_per_min)?,
        })
    }
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config, limiters: &Limiters) {
    let login_limiter = limiters.login.clone();
    let refresh_limiter = limiters.refresh.clone();
    let protected_limiter = limiters.protected.clone();

    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(login_limiter.clone())
                    .route(web::post().to(handlers::login)),
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
                web::scope("/attendance")
                    // /attendance
                    .service(web::resource("").route(web::get().to(attendance::history)))
                    .service(
                        web::resource("/challenge").route(web::post().to(attendance::request_challenge)),
                    )
                    .service(web::resource("/submit").route(web::post().to(attendance::submit)))
                    .service(web::resource("/today").route(web::get().to(attendance::today)))
                    // /attendance/{id}
                    .service(
                        web::resource("/{id}").route(web::delete().to(attendance::delete_record)),
                    ),
            )
            .service(
                web::scope("/devices")
                    // /devices
                    .service(
                        web::resource("")
                            .route(web::get().to(device::list_devices))
                            .route(web::post().to(device::register_device)),
                    )
                    // /devices/{id}
                    .service(web::resource("/{id}").route(web::delete().to(device::delete_device)))
                    // /devices/{id}/status
                    .service(
                        web::resource("/{id}/status").route(web::put().to(device::set_device_status)),
                    ),
            )
            .service(
                web::scope("/requests")
                    // /requests
                    .service(web::resource("").route(web::get().to(hr_request::list_requests)))
                    // fixed segments before /{id}
                    .service(
                        web::resource("/leave-balance").route(web::get().to(hr_request::leave_balance)),
                    )
                    .service(web::resource("/leave").route(web::post().to(hr_request::create_leave)))
                    .service(
                        web::resource("/overtime").route(web::post().to(hr_request::create_overtime)),
                    )
                    .service(
                        web::resource("/late-early")
                            .route(web::post().to(hr_request::create_late_early)),
                    )
                    // /requests/{id}
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(hr_request::get_request))
                            .route(web::put().to(hr_request::update_request))
                            .route(web::delete().to(hr_request::delete_request)),
                    )
                    .service(
                        web::resource("/{id}/approve")
                            .route(web::put().to(hr_request::approve_request)),
                    )
                    .service(
                        web::resource("/{id}/reject").route(web::put().to(hr_request::reject_request)),
                    )
                    .service(
                        web::resource("/{id}/cancel").route(web::put().to(hr_request::cancel_request)),
                    ),
            ),
    );
}

// LOGIN
//  ├─ access_token (15 min)
//  └─ refresh_token (7 days)

// ATTENDANCE
//  ├─ POST /attendance/challenge  -> one-time token bound to device + action
//  └─ POST /attendance/submit     -> token consumed, record updated
