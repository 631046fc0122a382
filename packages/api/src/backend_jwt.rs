use chrono::Utc;
use flowboard_types::create_id;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const ISSUER: &str = "flowboard";
const REALTIME_AUDIENCE: &str = "flowboard-realtime";
const REALTIME_TTL_SECONDS: i64 = 15 * 60;

/// Published key set clients use to verify peer tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Value>,
}

#[derive(Debug, Clone, Copy)]
pub struct TimeClaims {
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
}

pub fn make_time_claims(ttl_seconds: i64) -> TimeClaims {
    let now = Utc::now().timestamp();
    TimeClaims {
        iat: now,
        nbf: now - 30,
        exp: now + ttl_seconds,
    }
}

/// Claims carried by a realtime room token. Scoped to one board and a
/// short lifetime; `permissions` is what the room enforces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeClaims {
    pub sub: String,
    pub name: Option<String>,
    pub app_id: String,
    pub board_id: String,
    pub room: String,
    pub permissions: Vec<String>,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub jti: String,
}

/// Signing backend for realtime access tokens. Keys come from the
/// environment; without them the realtime capability is simply absent.
pub struct BackendJwt {
    encoding: EncodingKey,
    decoding: DecodingKey,
    algorithm: Algorithm,
    jwks: Jwks,
}

impl BackendJwt {
    /// Load from `FLOWBOARD_REALTIME_PRIVATE_KEY` (Ed25519 PEM) and
    /// `FLOWBOARD_REALTIME_JWKS` (public JWK set, JSON). Returns `None`
    /// when either is missing - the façade then runs without realtime.
    pub fn from_env() -> Option<Self> {
        let private_pem = std::env::var("FLOWBOARD_REALTIME_PRIVATE_KEY").ok()?;
        let public_pem = std::env::var("FLOWBOARD_REALTIME_PUBLIC_KEY").ok()?;
        let jwks_json = std::env::var("FLOWBOARD_REALTIME_JWKS").ok()?;

        let encoding = EncodingKey::from_ed_pem(private_pem.as_bytes()).ok()?;
        let decoding = DecodingKey::from_ed_pem(public_pem.as_bytes()).ok()?;
        let jwks: Jwks = serde_json::from_str(&jwks_json).ok()?;

        Some(BackendJwt {
            encoding,
            decoding,
            algorithm: Algorithm::EdDSA,
            jwks,
        })
    }

    /// HMAC variant for tests and single-node local deployments. The JWKS
    /// is empty here; symmetric verification happens server side only.
    pub fn from_secret(secret: &[u8]) -> Self {
        BackendJwt {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            algorithm: Algorithm::HS256,
            jwks: Jwks { keys: vec![] },
        }
    }

    pub fn jwks(&self) -> Jwks {
        self.jwks.clone()
    }

    pub fn sign_realtime(
        &self,
        sub: &str,
        name: Option<String>,
        app_id: &str,
        board_id: &str,
        permissions: Vec<String>,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let time = make_time_claims(REALTIME_TTL_SECONDS);
        let claims = RealtimeClaims {
            sub: sub.to_string(),
            name,
            app_id: app_id.to_string(),
            board_id: board_id.to_string(),
            room: flowboard::flow::realtime::room_id(app_id, board_id),
            permissions,
            iss: ISSUER.to_string(),
            aud: REALTIME_AUDIENCE.to_string(),
            iat: time.iat,
            nbf: time.nbf,
            exp: time.exp,
            jti: create_id(),
        };

        jsonwebtoken::encode(&Header::new(self.algorithm), &claims, &self.encoding)
    }

    pub fn verify_realtime(
        &self,
        token: &str,
    ) -> Result<RealtimeClaims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(self.algorithm);
        validation.set_audience(&[REALTIME_AUDIENCE]);
        validation.set_issuer(&[ISSUER]);
        let data = jsonwebtoken::decode::<RealtimeClaims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realtime_token_roundtrip() {
        let jwt = BackendJwt::from_secret(b"test-secret");
        let token = jwt
            .sign_realtime(
                "user-1",
                Some("Ada".to_string()),
                "app-1",
                "board-1",
                vec!["read".to_string(), "write".to_string()],
            )
            .unwrap();

        let claims = jwt.verify_realtime(&token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.room, "app-1:board-1");
        assert_eq!(claims.permissions, vec!["read", "write"]);
    }

    #[test]
    fn foreign_tokens_fail_verification() {
        let signer = BackendJwt::from_secret(b"secret-a");
        let verifier = BackendJwt::from_secret(b"secret-b");

        let token = signer
            .sign_realtime("user-1", None, "app-1", "board-1", vec!["read".to_string()])
            .unwrap();

        assert!(verifier.verify_realtime(&token).is_err());
    }
}
