use anyhow::Result;
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// Claims of a session token issued by the hosted auth service.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // user id
    pub exp: usize,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl Claims {
    /// Anonymous tokens are valid JWTs but do not open the admin area.
    pub fn is_admin(&self) -> bool {
        !matches!(self.role.as_deref(), Some("anon"))
    }
}

/// Issues a token the same way the auth service does. Used by tooling and tests;
/// production sessions come from the auth service itself.
pub fn create_jwt(user_id: &str, role: &str, secret: &str, ttl_hours: i64) -> Result<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(ttl_hours))
        .ok_or_else(|| anyhow::anyhow!("invalid token lifetime"))?
        .timestamp();

    let claims = Claims {
        sub: user_id.to_owned(),
        exp: expiration as usize,
        email: None,
        role: Some(role.to_owned()),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )?;

    Ok(token)
}

pub fn validate_jwt(token: &str, secret: &str) -> Result<Claims> {
    let mut validation = Validation::default();
    // Auth services put their project ref in `aud`; we only care about signature and expiry.
    validation.validate_aud = false;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &validation,
    )?;

    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwt_cycle() {
        let secret = "test_secret";
        let token = create_jwt("admin_1", "authenticated", secret, 1).unwrap();
        let claims = validate_jwt(&token, secret).unwrap();
        assert_eq!(claims.sub, "admin_1");
        assert!(claims.is_admin());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = create_jwt("admin_1", "authenticated", "a", 1).unwrap();
        assert!(validate_jwt(&token, "b").is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = create_jwt("admin_1", "authenticated", "s", -2).unwrap();
        assert!(validate_jwt(&token, "s").is_err());
    }

    #[test]
    fn test_anon_role_is_not_admin() {
        let token = create_jwt("visitor", "anon", "s", 1).unwrap();
        assert!(!validate_jwt(&token, "s").unwrap().is_admin());
    }
}
