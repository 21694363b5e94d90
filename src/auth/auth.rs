use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, web::Data};
use futures::future::{Ready, ready};

use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::model::role::Role;
use crate::models::TokenType;

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub role: Role,

    /// Present only if this user is linked to an employee record
    pub employee_id: Option<u64>,
}

/// Resolves an `Authorization` header value into the calling user.
/// Only access tokens are accepted.
pub fn authenticate(header_value: Option<&str>, secret: &str) -> AppResult<AuthUser> {
    let header_value =
        header_value.ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?;
    let token = header_value.strip_prefix("Bearer ").ok_or_else(|| {
        AppError::Unauthorized("Authorization header must start with Bearer".into())
    })?;

    let claims = verify_token(token, secret)
        .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))?;
    if claims.token_type != TokenType::Access {
        return Err(AppError::Unauthorized("Access token required".into()));
    }

    let role = Role::from_id(claims.role).ok_or_else(|| AppError::Unauthorized("Invalid role".into()))?;

    Ok(AuthUser {
        user_id: claims.user_id,
        username: claims.sub,
        role,
        employee_id: claims.employee_id,
    })
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        // already resolved by auth_middleware
        if let Some(user) = req.extensions().get::<AuthUser>() {
            return ready(Ok(user.clone()));
        }

        let config = match req.app_data::<Data<Config>>() {
            Some(c) => c,
            None => return ready(Err(AppError::Internal("Config missing".into()).into())),
        };

        let header = req.headers().get("Authorization").and_then(|h| h.to_str().ok());
        ready(authenticate(header, &config.jwt_secret).map_err(Into::into))
    }
}

impl AuthUser {
    pub fn require_super_admin(&self) -> AppResult<()> {
        if self.role == Role::SuperAdmin {
            Ok(())
        } else {
            Err(AppError::forbidden("Super admin only"))
        }
    }

    /// Employee id of the caller; attendance and requests need one.
    pub fn require_employee(&self) -> AppResult<u64> {
        self.employee_id
            .ok_or_else(|| AppError::forbidden("No employee profile is linked to this account"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{Subject, generate_access_token, generate_refresh_token};

    fn subject(role: u8) -> Subject {
        Subject {
            user_id: 1,
            username: "mgr".into(),
            role,
            employee_id: Some(11),
        }
    }

    #[test]
    fn bearer_access_token_resolves_user() {
        let token = generate_access_token(&subject(2), "k", 60).unwrap();
        let user = authenticate(Some(&format!("Bearer {token}")), "k").unwrap();
        assert_eq!(user.role, Role::Manager);
        assert_eq!(user.require_employee().unwrap(), 11);
        assert!(matches!(user.require_super_admin(), Err(AppError::Forbidden(_))));
    }

    #[test]
    fn refresh_tokens_and_bad_headers_are_unauthorized() {
        let (refresh, _) = generate_refresh_token(&subject(1), "k", 60).unwrap();
        for header in [
            None,
            Some("Token abc".to_string()),
            Some("Bearer not-a-jwt".to_string()),
            Some(format!("Bearer {refresh}")),
        ] {
            assert!(matches!(
                authenticate(header.as_deref(), "k"),
                Err(AppError::Unauthorized(_))
            ));
        }
    }

    #[test]
    fn unknown_role_is_unauthorized() {
        let token = generate_access_token(&subject(9), "k", 60).unwrap();
        assert!(matches!(
            authenticate(Some(&format!("Bearer {token}")), "k"),
            Err(AppError::Unauthorized(_))
        ));
    }
}
