use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::Error};
use uuid::Uuid;

use crate::models::{Claims, TokenType};

/// Identity carried by both token kinds.
#[derive(Debug, Clone)]
pub struct Subject {
    pub user_id: u64,
    pub username: String,
    pub role: u8,
    pub employee_id: Option<u64>,
}

impl From<&Claims> for Subject {
    fn from(claims: &Claims) -> Self {
        Subject {
            user_id: claims.user_id,
            username: claims.sub.clone(),
            role: claims.role,
            employee_id: claims.employee_id,
        }
    }
}

fn now() -> usize {
    Utc::now().timestamp().max(0) as usize
}

fn sign(subject: &Subject, token_type: TokenType, secret: &str, ttl: usize) -> Result<(String, Claims), Error> {
    let claims = Claims {
        user_id: subject.user_id,
        sub: subject.username.clone(),
        role: subject.role,
        exp: now() + ttl,
        jti: Uuid::new_v4().to_string(),
        token_type,
        employee_id: subject.employee_id,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok((token, claims))
}

pub fn generate_access_token(subject: &Subject, secret: &str, ttl: usize) -> Result<String, Error> {
    sign(subject, TokenType::Access, secret, ttl).map(|(token, _)| token)
}

pub fn generate_refresh_token(subject: &Subject, secret: &str, ttl: usize) -> Result<(String, Claims), Error> {
    sign(subject, TokenType::Refresh, secret, ttl)
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, Error> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject() -> Subject {
        Subject {
            user_id: 7,
            username: "jdoe".into(),
            role: 3,
            employee_id: Some(70),
        }
    }

    #[test]
    fn access_token_verifies_with_same_secret() {
        let token = generate_access_token(&subject(), "s3cret", 60).unwrap();
        let claims = verify_token(&token, "s3cret").unwrap();
        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.sub, "jdoe");
        assert_eq!(claims.employee_id, Some(70));
        assert_eq!(claims.token_type, TokenType::Access);
    }

    #[test]
    fn refresh_token_carries_its_jti() {
        let (token, issued) = generate_refresh_token(&subject(), "s3cret", 60).unwrap();
        let claims = verify_token(&token, "s3cret").unwrap();
        assert_eq!(claims.token_type, TokenType::Refresh);
        assert_eq!(claims.jti, issued.jti);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = generate_access_token(&subject(), "s3cret", 60).unwrap();
        assert!(verify_token(&token, "other").is_err());
    }
}
