use actix_web::{HttpRequest, HttpResponse, Responder, web};
use chrono::Utc;
use serde::Deserialize;
use sqlx::MySqlPool;
use utoipa::{IntoParams, ToSchema};

use crate::api::with_request_context;
use crate::auth::auth::AuthUser;
use crate::config::Config;
use crate::error::AppResult;
use crate::model::device::{Device, DeviceMetadata, DeviceStatus};
use crate::service::{device_registry, employees};

#[derive(Deserialize, IntoParams)]
pub struct DeviceQuery {
    /// Whose devices to list; super admins only, defaults to the caller
    pub employee_id: Option<u64>,
}

#[derive(Deserialize, ToSchema)]
pub struct RegisterDevice {
    #[schema(example = "b1946ac92492d2347c6235b4d2611184")]
    pub device_fingerprint: String,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(flatten)]
    pub metadata: DeviceMetadata,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateDeviceStatus {
    #[schema(example = "blocked")]
    pub status: DeviceStatus,
}

/// List registered devices
#[utoipa::path(
    get,
    path = "/api/v1/devices",
    params(DeviceQuery),
    responses(
        (status = 200, description = "Devices, primary first", body = Vec<Device>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Device"
)]
pub async fn list_devices(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<DeviceQuery>,
) -> AppResult<impl Responder> {
    let employee_id = match query.employee_id {
        Some(id) if auth.employee_id != Some(id) => {
            auth.require_super_admin()?;
            id
        }
        _ => auth.require_employee()?,
    };

    let mut conn = pool.acquire().await?;
    let devices = device_registry::list_for_employee(&mut conn, employee_id).await?;
    Ok(HttpResponse::Ok().json(devices))
}

/// Register a device ahead of its first attendance challenge
#[utoipa::path(
    post,
    path = "/api/v1/devices",
    request_body = RegisterDevice,
    responses(
        (status = 201, description = "Device registered", body = Device),
        (status = 400, description = "Device is already registered", body = Object, example = json!({
            "error": "bad_request",
            "message": "Device is already registered"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "No employee profile")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Device"
)]
pub async fn register_device(
    req: HttpRequest,
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    body: web::Json<RegisterDevice>,
) -> AppResult<impl Responder> {
    let employee_id = auth.require_employee()?;
    let body = body.into_inner();
    let meta = with_request_context(body.metadata, &req, config.trust_proxy_headers);

    let mut tx = pool.begin().await?;
    employees::lock(&mut tx, employee_id).await?;
    let device = device_registry::register_explicit(
        &mut tx,
        employee_id,
        &body.device_fingerprint,
        &meta,
        body.is_primary,
        Utc::now(),
    )
    .await?;
    tx.commit().await?;

    Ok(HttpResponse::Created().json(device))
}

/// Activate, deactivate or block a device (super admin only)
#[utoipa::path(
    put,
    path = "/api/v1/devices/{id}/status",
    params(
        ("id" = u64, Path, description = "Device id")
    ),
    request_body = UpdateDeviceStatus,
    responses(
        (status = 200, description = "Status changed", body = Device),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Super admin only"),
        (status = 404, description = "Device not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Device"
)]
pub async fn set_device_status(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<UpdateDeviceStatus>,
) -> AppResult<impl Responder> {
    auth.require_super_admin()?;
    let mut conn = pool.acquire().await?;
    let device = device_registry::set_status(&mut conn, path.into_inner(), body.status).await?;
    Ok(HttpResponse::Ok().json(device))
}

/// Remove a device (super admin only)
#[utoipa::path(
    delete,
    path = "/api/v1/devices/{id}",
    params(
        ("id" = u64, Path, description = "Device id")
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Super admin only"),
        (status = 404, description = "Device not found")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Device"
)]
pub async fn delete_device(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<impl Responder> {
    auth.require_super_admin()?;
    let mut conn = pool.acquire().await?;
    device_registry::delete(&mut conn, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}
