use std::sync::Arc;

use base64::Engine;
use chrono::Utc;
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_512};
use subtle::ConstantTimeEq;

use gophkeeper_core::constants::SALT_LEN;
use gophkeeper_core::crypto::random_bytes;

use crate::error::{Result, ServerError};
use crate::storage::{UserId, UserStore};

const TOKEN_ISSUER: &str = "gophkeeper";
const TOKEN_AUDIENCE: &str = "token";
const REFRESH_TOKEN_AUDIENCE: &str = "refresh";
const TOKEN_LIVENESS_SECS: i64 = 3600;
const TOKEN_ID_LEN: usize = 64;
const MIN_SIGN_KEY_LEN: usize = 64;

const SIGNING_ALGORITHM: Algorithm = Algorithm::HS512;

/// The result of a successful authentication, shared with RPC handlers
/// through per-request extensions.
#[derive(Debug, Clone)]
pub struct AuthData {
    pub user_id: String,
    pub token: String,
    pub refresh_token: String,
    pub expires_at: i64,
    pub key_salt: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    iss: String,
    aud: String,
    exp: i64,
    nbf: i64,
    jti: String,
    user_id: String,
}

/// Issues and validates signed bearer tokens, and owns the registration and
/// password-check flows against the user store.
pub struct Authorizer {
    users: Arc<dyn UserStore>,
    sign_key: Vec<u8>,
}

impl Authorizer {
    /// The sign key must be at least 64 bytes: an HS512 MAC keyed with less
    /// weakens every token the process ever issues.
    pub fn new(users: Arc<dyn UserStore>, sign_key: Vec<u8>) -> Result<Self> {
        if sign_key.len() < MIN_SIGN_KEY_LEN {
            return Err(ServerError::Internal(format!(
                "token sign key too short: {} bytes, need at least {MIN_SIGN_KEY_LEN}",
                sign_key.len()
            )));
        }

        Ok(Self { users, sign_key })
    }

    /// Create an account and issue its first token pair.
    pub async fn register(&self, login: &str, password: &str, key_salt: &[u8]) -> Result<AuthData> {
        if login.is_empty() || password.is_empty() || key_salt.is_empty() {
            return Err(ServerError::BadCredentials);
        }

        let auth_salt = random_bytes(SALT_LEN)?;
        let verifier = compute_verifier(&auth_salt, password.as_bytes());

        let id = self.users.add(login, key_salt, &auth_salt, &verifier).await?;

        let mut auth = self.generate_auth_data(&id.to_string())?;
        auth.key_salt = key_salt.to_vec();

        tracing::info!(user_id = %id, "user registered");
        Ok(auth)
    }

    /// Check a login/password pair and issue a fresh token pair along with
    /// the account's key salt.
    pub async fn authorize(&self, login: &str, password: &str) -> Result<AuthData> {
        if login.is_empty() || password.is_empty() {
            return Err(ServerError::BadCredentials);
        }

        let user = self
            .users
            .get_by_login(login)
            .await
            .map_err(|_| ServerError::InvalidCredentials)?;

        let computed = compute_verifier(&user.auth_salt, password.as_bytes());
        if computed.ct_eq(&user.verifier).unwrap_u8() == 0 {
            return Err(ServerError::InvalidCredentials);
        }

        let mut auth = self.generate_auth_data(&user.id.to_string())?;
        auth.key_salt = user.key_salt;

        tracing::debug!(user_id = %user.id, "user authorized");
        Ok(auth)
    }

    /// The refresh flow is declared but intentionally not implemented;
    /// clients re-authenticate when a token expires.
    pub async fn refresh_token(&self, _refresh_token: &str) -> Result<AuthData> {
        Err(ServerError::Internal("unimplemented".to_string()))
    }

    /// Validate a token without touching the user store.
    pub fn is_valid_token(&self, token: &str) -> Result<()> {
        self.parse_token(token).map(|_| ())
    }

    /// Validate a token and load its user. Soft-deleted users make the token
    /// invalid even if the MAC still verifies.
    pub async fn authorize_with_token(&self, token: &str) -> Result<AuthData> {
        let claims = self.parse_token(token)?;

        let user_id: UserId = claims.user_id.parse()?;
        let user = self
            .users
            .get_by_id(user_id)
            .await
            .map_err(|_| ServerError::Unauthenticated("unknown user".to_string()))?;

        if user.is_deleted {
            return Err(ServerError::Unauthenticated("unknown user".to_string()));
        }

        Ok(AuthData {
            user_id: claims.user_id,
            token: token.to_string(),
            refresh_token: String::new(),
            expires_at: claims.exp,
            key_salt: user.key_salt,
        })
    }

    fn generate_auth_data(&self, user_id: &str) -> Result<AuthData> {
        self.generate_auth_data_at(user_id, Utc::now().timestamp())
    }

    fn generate_auth_data_at(&self, user_id: &str, issued_at: i64) -> Result<AuthData> {
        let token = self.create_signed_token(TOKEN_AUDIENCE, user_id, issued_at)?;
        let refresh_token = self.create_signed_token(REFRESH_TOKEN_AUDIENCE, user_id, issued_at)?;

        Ok(AuthData {
            user_id: user_id.to_string(),
            token,
            refresh_token,
            expires_at: issued_at + TOKEN_LIVENESS_SECS,
            key_salt: Vec::new(),
        })
    }

    fn create_signed_token(&self, audience: &str, user_id: &str, issued_at: i64) -> Result<String> {
        let token_id = random_bytes(TOKEN_ID_LEN)?;

        let claims = Claims {
            iss: TOKEN_ISSUER.to_string(),
            aud: audience.to_string(),
            exp: issued_at + TOKEN_LIVENESS_SECS,
            nbf: issued_at,
            jti: base64::engine::general_purpose::URL_SAFE.encode(token_id),
            user_id: user_id.to_string(),
        };

        encode(
            &Header::new(SIGNING_ALGORITHM),
            &claims,
            &EncodingKey::from_secret(&self.sign_key),
        )
        .map_err(|e| ServerError::Internal(format!("token signing failed: {e}")))
    }

    fn parse_token(&self, token: &str) -> Result<Claims> {
        let header = decode_header(token).map_err(|_| ServerError::InvalidToken)?;

        // Only the HMAC family is acceptable; a token claiming any other
        // algorithm is rejected before its MAC is even looked at.
        match header.alg {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {}
            _ => return Err(ServerError::BadSignMethod),
        }

        let mut validation = Validation::new(header.alg);
        validation.leeway = 0;
        validation.validate_nbf = true;
        validation.set_audience(&[TOKEN_AUDIENCE]);
        validation.set_issuer(&[TOKEN_ISSUER]);

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.sign_key),
            &validation,
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => ServerError::ExpiredToken,
            _ => ServerError::InvalidToken,
        })?;

        Ok(data.claims)
    }
}

/// The stored password verifier: SHA3-512 over `auth_salt || password`.
fn compute_verifier(auth_salt: &[u8], password: &[u8]) -> Vec<u8> {
    let mut hasher = Sha3_512::new();
    hasher.update(auth_salt);
    hasher.update(password);
    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;

    fn authorizer() -> Authorizer {
        Authorizer::new(Arc::new(MemoryStorage::new()), vec![0x5A; 64]).unwrap()
    }

    #[test]
    fn test_sign_key_length_enforced() {
        let result = Authorizer::new(Arc::new(MemoryStorage::new()), vec![0x5A; 32]);
        assert!(result.is_err());
    }

    #[test]
    fn test_verifier_depends_on_salt_and_password() {
        let a = compute_verifier(&[1; 64], b"pwd");
        let b = compute_verifier(&[2; 64], b"pwd");
        let c = compute_verifier(&[1; 64], b"other");
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn test_register_and_authorize() {
        let auth = authorizer();
        let registered = auth.register("t1", "t1", &[0xAB; 64]).await.unwrap();
        assert!(!registered.token.is_empty());
        assert!(!registered.refresh_token.is_empty());

        let authorized = auth.authorize("t1", "t1").await.unwrap();
        assert_eq!(authorized.user_id, registered.user_id);
        assert_eq!(authorized.key_salt, vec![0xAB; 64]);
    }

    #[tokio::test]
    async fn test_register_rejects_empty_inputs() {
        let auth = authorizer();
        assert!(matches!(
            auth.register("", "pwd", &[1; 64]).await.unwrap_err(),
            ServerError::BadCredentials
        ));
        assert!(matches!(
            auth.register("login", "", &[1; 64]).await.unwrap_err(),
            ServerError::BadCredentials
        ));
        assert!(matches!(
            auth.register("login", "pwd", &[]).await.unwrap_err(),
            ServerError::BadCredentials
        ));
    }

    #[tokio::test]
    async fn test_authorize_wrong_password() {
        let auth = authorizer();
        auth.register("t1", "t1", &[1; 64]).await.unwrap();

        let err = auth.authorize("t1", "wrong").await.unwrap_err();
        assert!(matches!(err, ServerError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_authorize_unknown_login() {
        let auth = authorizer();
        let err = auth.authorize("ghost", "pwd").await.unwrap_err();
        assert!(matches!(err, ServerError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_token_roundtrip() {
        let auth = authorizer();
        let registered = auth.register("t1", "t1", &[1; 64]).await.unwrap();

        auth.is_valid_token(&registered.token).unwrap();

        let data = auth.authorize_with_token(&registered.token).await.unwrap();
        assert_eq!(data.user_id, registered.user_id);
        assert_eq!(data.key_salt, vec![1u8; 64]);
    }

    #[tokio::test]
    async fn test_token_liveness_window() {
        let auth = authorizer();
        let registered = auth.register("t1", "t1", &[1; 64]).await.unwrap();

        // Issued 30 minutes ago: still inside the one-hour liveness window.
        let half_hour_old = auth
            .generate_auth_data_at(&registered.user_id, Utc::now().timestamp() - 1800)
            .unwrap();
        assert!(auth.is_valid_token(&half_hour_old.token).is_ok());

        // Issued two hours ago: expired.
        let two_hours_old = auth
            .generate_auth_data_at(&registered.user_id, Utc::now().timestamp() - 7200)
            .unwrap();
        assert!(matches!(
            auth.is_valid_token(&two_hours_old.token).unwrap_err(),
            ServerError::ExpiredToken
        ));
    }

    #[tokio::test]
    async fn test_token_nbf_in_future() {
        let auth = authorizer();
        let registered = auth.register("t1", "t1", &[1; 64]).await.unwrap();

        let future = auth
            .generate_auth_data_at(&registered.user_id, Utc::now().timestamp() + 600)
            .unwrap();
        assert!(auth.is_valid_token(&future.token).is_err());
    }

    #[tokio::test]
    async fn test_refresh_audience_is_not_a_token() {
        let auth = authorizer();
        let registered = auth.register("t1", "t1", &[1; 64]).await.unwrap();

        // The refresh token carries aud = "refresh" and must not pass
        // validation on the access-token path.
        assert!(auth.is_valid_token(&registered.refresh_token).is_err());
    }

    #[tokio::test]
    async fn test_non_hmac_algorithm_rejected() {
        let auth = authorizer();
        let registered = auth.register("t1", "t1", &[1; 64]).await.unwrap();

        // Re-label the header as RS256 while keeping the body and MAC.
        let mut parts: Vec<&str> = registered.token.split('.').collect();
        assert_eq!(parts.len(), 3);

        let forged_header = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        parts[0] = &forged_header;
        let forged = parts.join(".");

        assert!(matches!(
            auth.is_valid_token(&forged).unwrap_err(),
            ServerError::BadSignMethod
        ));
    }

    #[tokio::test]
    async fn test_garbage_token_rejected() {
        let auth = authorizer();
        assert!(auth.is_valid_token("not.a.token").is_err());
        assert!(auth.is_valid_token("").is_err());
    }

    #[tokio::test]
    async fn test_token_signed_with_other_key_rejected() {
        let auth_a = authorizer();
        let auth_b = Authorizer::new(Arc::new(MemoryStorage::new()), vec![0x77; 64]).unwrap();

        let registered = auth_a.register("t1", "t1", &[1; 64]).await.unwrap();
        assert!(auth_b.is_valid_token(&registered.token).is_err());
    }

    #[tokio::test]
    async fn test_refresh_flow_unimplemented() {
        let auth = authorizer();
        assert!(auth.refresh_token("anything").await.is_err());
    }
}
