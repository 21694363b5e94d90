use actix_web::{HttpRequest, HttpResponse, Responder, web};
use sqlx::{MySqlConnection, MySqlPool};
use tracing::{debug, error, info, instrument};

use crate::{
    auth::{
        jwt::{Subject, generate_access_token, generate_refresh_token, verify_token},
        password::verify_password,
    },
    config::Config,
    error::{AppError, AppResult},
    models::{Claims, LoginReqDto, TokenPair, TokenType, UserSql},
};

fn bearer(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

fn signing_error(e: jsonwebtoken::errors::Error) -> AppError {
    AppError::Internal(format!("token signing failed: {e}"))
}

/// Issues an access/refresh pair and stores the refresh jti.
async fn issue_pair(conn: &mut MySqlConnection, subject: &Subject, config: &Config) -> AppResult<TokenPair> {
    let access_token =
        generate_access_token(subject, &config.jwt_secret, config.access_token_ttl).map_err(signing_error)?;
    let (refresh_token, refresh_claims) =
        generate_refresh_token(subject, &config.jwt_secret, config.refresh_token_ttl).map_err(signing_error)?;

    debug!(user_id = subject.user_id, jti = %refresh_claims.jti, "Storing refresh token");
    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (user_id, jti, expires_at)
        VALUES (?, ?, FROM_UNIXTIME(?))
        "#,
    )
    .bind(subject.user_id)
    .bind(&refresh_claims.jti)
    .bind(refresh_claims.exp as i64)
    .execute(&mut *conn)
    .await?;

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Token pair issued", body = TokenPair),
        (status = 400, description = "Missing username or password"),
        (status = 401, description = "Invalid credentials")
    )
)]
#[instrument(
    name = "auth_login",
    skip(pool, config, user),
    fields(username = %user.username)
)]
pub async fn login(
    user: web::Json<LoginReqDto>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<impl Responder> {
    info!("Login request received");

    if user.username.trim().is_empty() || user.password.is_empty() {
        return Err(AppError::bad_request("Username or password required"));
    }

    let db_user = sqlx::query_as::<_, UserSql>(
        r#"
        SELECT id, username, password, role_id, employee_id
        FROM users
        WHERE username = ?
        "#,
    )
    .bind(user.username.trim())
    .fetch_optional(pool.get_ref())
    .await?;

    let db_user = match db_user {
        Some(u) => u,
        None => {
            info!("Invalid credentials: user not found");
            return Err(AppError::Unauthorized("Invalid credentials".into()));
        }
    };

    if let Err(e) = verify_password(&user.password, &db_user.password) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    let subject = Subject {
        user_id: db_user.id,
        username: db_user.username,
        role: db_user.role_id,
        employee_id: db_user.employee_id,
    };

    let mut conn = pool.acquire().await?;
    let pair = issue_pair(&mut conn, &subject, &config).await?;

    // non-fatal
    if let Err(e) = sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = ?")
        .bind(subject.user_id)
        .execute(&mut *conn)
        .await
    {
        error!(error = %e, "Failed to update last_login_at");
    }

    info!(user_id = subject.user_id, "Login successful");
    Ok(HttpResponse::Ok().json(pair))
}

fn refresh_claims(req: &HttpRequest, config: &Config) -> AppResult<Claims> {
    let token = bearer(req).ok_or_else(|| AppError::Unauthorized("Missing refresh token".into()))?;
    let claims = verify_token(token, &config.jwt_secret)
        .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))?;
    if claims.token_type != TokenType::Refresh {
        return Err(AppError::Unauthorized("Refresh token required".into()));
    }
    Ok(claims)
}

/// Rotates the refresh token: the presented jti is revoked and a new pair issued.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    tag = "Auth",
    responses(
        (status = 200, description = "New token pair", body = TokenPair),
        (status = 401, description = "Refresh token invalid, expired or revoked")
    ),
    security(("bearer_auth" = []))
)]
pub async fn refresh_token(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<impl Responder> {
    let claims = refresh_claims(&req, &config)?;

    let mut tx = pool.begin().await?;
    let revoked = sqlx::query(
        "UPDATE refresh_tokens SET revoked = TRUE WHERE jti = ? AND revoked = FALSE AND expires_at > NOW()",
    )
    .bind(&claims.jti)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if revoked == 0 {
        info!(user_id = claims.user_id, "Refresh with unknown or revoked token");
        return Err(AppError::Unauthorized("Refresh token revoked".into()));
    }

    let pair = issue_pair(&mut tx, &Subject::from(&claims), &config).await?;
    tx.commit().await?;

    debug!(user_id = claims.user_id, "Refresh token rotated");
    Ok(HttpResponse::Ok().json(pair))
}

/// Revokes the presented refresh token. Always answers 204.
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "Auth",
    responses((status = 204, description = "Logged out")),
    security(("bearer_auth" = []))
)]
pub async fn logout(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> impl Responder {
    let claims = match refresh_claims(&req, &config) {
        Ok(c) => c,
        Err(_) => return HttpResponse::NoContent().finish(),
    };

    if let Err(e) = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE jti = ?")
        .bind(&claims.jti)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to revoke refresh token");
    }

    HttpResponse::NoContent().finish()
}
