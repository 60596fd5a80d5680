pub mod password;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::config::SecurityConfig;
use crate::middleware::route::RouteClass;

/// Name of the cookie carrying the signed session token.
pub const TOKEN_COOKIE: &str = "token";

/// Signed session token payload.
///
/// Every field is required; a token missing any of them fails to deserialize
/// and is treated as invalid before any role check runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: i64,
    pub role: String,
    pub email: String,
    pub name: String,
    pub iat: i64,
    pub exp: i64,
}

impl SessionClaims {
    pub fn new(sub: i64, role: String, email: String, name: String, issued_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            sub,
            role,
            email,
            name,
            iat: issued_at.timestamp(),
            exp: (issued_at + ttl).timestamp(),
        }
    }

    fn is_well_formed(&self) -> bool {
        !self.role.trim().is_empty() && !self.email.trim().is_empty() && self.iat <= self.exp
    }
}

/// Identity granted to a request that passed authorization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthUser {
    pub subject_id: i64,
    pub role: String,
    pub email: String,
    pub name: String,
    pub expires_at: i64,
}

impl From<SessionClaims> for AuthUser {
    fn from(claims: SessionClaims) -> Self {
        Self {
            subject_id: claims.sub,
            role: claims.role,
            email: claims.email,
            name: claims.name,
            expires_at: claims.exp,
        }
    }
}

/// Why a request was refused by the authorization gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthDenied {
    #[error("No token")]
    NoToken,
    #[error("Token expired")]
    Expired,
    #[error("Invalid token")]
    Invalid,
    #[error("Unauthorized")]
    Forbidden,
}

impl AuthDenied {
    /// UI routes send the browser to the login page for these; everything
    /// else gets a JSON 401.
    pub fn redirects_to_login(&self) -> bool {
        matches!(self, AuthDenied::NoToken | AuthDenied::Expired)
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("JWT generation error: {0}")]
    Generation(String),
    #[error("Invalid JWT secret")]
    InvalidSecret,
}

/// Time source for token issuance and expiry checks.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock pinned to one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Shared-secret signing material, derived once from `SecurityConfig`.
#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SessionKeys {
    pub fn from_secret(secret: &str) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::InvalidSecret);
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        })
    }
}

impl fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKeys(..)")
    }
}

/// Mints session tokens at login.
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    keys: SessionKeys,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    pub fn new(keys: SessionKeys, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { keys, ttl, clock }
    }

    pub fn from_config(config: &SecurityConfig, clock: Arc<dyn Clock>) -> Result<Self, TokenError> {
        let keys = SessionKeys::from_secret(&config.jwt_secret)?;
        Ok(Self::new(keys, Duration::minutes(config.token_ttl_minutes as i64), clock))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, sub: i64, role: &str, email: &str, name: &str) -> Result<(String, SessionClaims), TokenError> {
        let claims = SessionClaims::new(
            sub,
            role.to_string(),
            email.to_string(),
            name.to_string(),
            self.clock.now(),
            self.ttl,
        );
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.keys.encoding)
            .map_err(|e| TokenError::Generation(e.to_string()))?;
        Ok((token, claims))
    }
}

/// Verifies session tokens and role claims for classified routes.
#[derive(Debug, Clone)]
pub struct AuthorizationGate {
    keys: SessionKeys,
    validation: Validation,
    clock: Arc<dyn Clock>,
    admin_role: String,
}

impl AuthorizationGate {
    pub fn new(keys: SessionKeys, admin_role: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against our clock after the signature so an
        // expired-but-authentic token is distinguishable from a forged one.
        validation.validate_exp = false;
        validation.leeway = 0;

        Self {
            keys,
            validation,
            clock,
            admin_role: admin_role.into(),
        }
    }

    pub fn from_config(config: &SecurityConfig, clock: Arc<dyn Clock>) -> Result<Self, TokenError> {
        let keys = SessionKeys::from_secret(&config.jwt_secret)?;
        Ok(Self::new(keys, config.admin_role.clone(), clock))
    }

    /// Decide whether a request on `class` may proceed.
    ///
    /// `Ok(None)` means the route needs no identity.
    pub fn authorize(&self, token: Option<&str>, class: RouteClass) -> Result<Option<AuthUser>, AuthDenied> {
        if !class.requires_authentication() {
            return Ok(None);
        }

        let token = token.filter(|t| !t.trim().is_empty()).ok_or(AuthDenied::NoToken)?;
        let claims = self.verify(token)?;

        if claims.role != self.admin_role {
            tracing::warn!(subject = claims.sub, role = %claims.role, "role does not satisfy route requirement");
            return Err(AuthDenied::Forbidden);
        }

        Ok(Some(AuthUser::from(claims)))
    }

    /// Check signature, payload shape and expiry.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, AuthDenied> {
        let data = decode::<SessionClaims>(token, &self.keys.decoding, &self.validation).map_err(|e| {
            tracing::warn!(error = %e, "session token rejected");
            AuthDenied::Invalid
        })?;

        let claims = data.claims;
        if !claims.is_well_formed() {
            return Err(AuthDenied::Invalid);
        }
        if self.clock.now().timestamp() > claims.exp {
            return Err(AuthDenied::Expired);
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SECRET: &str = "unit-test-secret";

    fn at(secs: i64) -> Arc<dyn Clock> {
        Arc::new(FixedClock(Utc.timestamp_opt(secs, 0).unwrap()))
    }

    fn issuer(clock: Arc<dyn Clock>) -> TokenIssuer {
        TokenIssuer::new(SessionKeys::from_secret(SECRET).unwrap(), Duration::minutes(15), clock)
    }

    fn gate(clock: Arc<dyn Clock>) -> AuthorizationGate {
        AuthorizationGate::new(SessionKeys::from_secret(SECRET).unwrap(), "admin", clock)
    }

    #[test]
    fn public_and_api_routes_need_no_identity() {
        let gate = gate(at(1_000));
        assert_eq!(gate.authorize(None, RouteClass::Public), Ok(None));
        assert_eq!(gate.authorize(None, RouteClass::RateLimitedApi), Ok(None));
    }

    #[test]
    fn missing_or_blank_token_is_no_token() {
        let gate = gate(at(1_000));
        assert_eq!(gate.authorize(None, RouteClass::AdminProtected), Err(AuthDenied::NoToken));
        assert_eq!(gate.authorize(Some(" "), RouteClass::AdminProtected), Err(AuthDenied::NoToken));
    }

    #[test]
    fn admin_token_is_granted() {
        let (token, _) = issuer(at(1_000)).issue(7, "admin", "ops@example.com", "Ops").unwrap();
        let user = gate(at(1_100)).authorize(Some(&token), RouteClass::AdminProtected).unwrap().unwrap();
        assert_eq!(user.subject_id, 7);
        assert_eq!(user.email, "ops@example.com");
    }

    #[test]
    fn expired_token_is_distinguished_from_invalid() {
        let (token, claims) = issuer(at(1_000)).issue(7, "admin", "ops@example.com", "Ops").unwrap();
        let later = gate(at(claims.exp + 1));
        assert_eq!(later.authorize(Some(&token), RouteClass::AdminProtected), Err(AuthDenied::Expired));

        // exactly at expiry is still valid
        let boundary = gate(at(claims.exp));
        assert!(boundary.authorize(Some(&token), RouteClass::AdminProtected).is_ok());
    }

    #[test]
    fn tampered_signature_is_invalid() {
        let (token, _) = issuer(at(1_000)).issue(7, "admin", "ops@example.com", "Ops").unwrap();
        let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
        let sig = parts[2].clone();
        let flipped = if sig.starts_with('A') { "B" } else { "A" };
        parts[2] = format!("{}{}", flipped, &sig[1..]);
        let forged = parts.join(".");

        assert_eq!(gate(at(1_100)).authorize(Some(&forged), RouteClass::AdminProtected), Err(AuthDenied::Invalid));
    }

    #[test]
    fn wrong_secret_is_invalid() {
        let other = TokenIssuer::new(SessionKeys::from_secret("other").unwrap(), Duration::minutes(15), at(1_000));
        let (token, _) = other.issue(7, "admin", "ops@example.com", "Ops").unwrap();
        assert_eq!(gate(at(1_100)).authorize(Some(&token), RouteClass::AdminProtected), Err(AuthDenied::Invalid));
    }

    #[test]
    fn customer_role_is_forbidden() {
        let (token, _) = issuer(at(1_000)).issue(9, "customer", "c@example.com", "C").unwrap();
        assert_eq!(gate(at(1_100)).authorize(Some(&token), RouteClass::AdminProtected), Err(AuthDenied::Forbidden));
    }

    #[test]
    fn missing_claim_is_invalid() {
        #[derive(Serialize)]
        struct Partial {
            sub: i64,
            email: String,
            exp: i64,
        }
        let token = encode(
            &Header::new(Algorithm::HS256),
            &Partial { sub: 1, email: "x@example.com".into(), exp: 5_000 },
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert_eq!(gate(at(1_000)).authorize(Some(&token), RouteClass::AdminProtected), Err(AuthDenied::Invalid));
    }

    #[test]
    fn garbage_is_invalid() {
        assert_eq!(gate(at(1_000)).authorize(Some("not-a-jwt"), RouteClass::AdminProtected), Err(AuthDenied::Invalid));
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert!(matches!(SessionKeys::from_secret(""), Err(TokenError::InvalidSecret)));
    }
}
