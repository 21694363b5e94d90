use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, ResponseError,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web::Data,
};

use crate::auth::auth::authenticate;
use crate::config::Config;
use crate::error::AppError;

pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let config = req
        .app_data::<Data<Config>>()
        .ok_or_else(|| AppError::Internal("App config missing".into()))?;

    let header = match req.headers().get("Authorization") {
        Some(h) => Some(h.to_str().map_err(|_| {
            AppError::Unauthorized("Invalid Authorization header encoding".into())
        })?),
        None => None,
    };

    match authenticate(header, &config.jwt_secret) {
        Ok(auth_user) => {
            tracing::debug!(user_id = auth_user.user_id, role = ?auth_user.role, "Authenticated");
            req.extensions_mut().insert(auth_user);
            next.call(req).await
        }
        Err(e) => {
            let resp = e.error_response();
            Ok(req.into_response(resp))
        }
    }
}
