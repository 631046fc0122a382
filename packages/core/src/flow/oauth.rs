use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Represents an OAuth/OIDC provider configuration that a node requires.
/// Nodes that need third-party service access declare their OAuth
/// requirements using this structure.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone)]
pub struct OAuthProvider {
    /// Unique identifier for this provider (e.g., "google_drive", "github")
    pub id: String,
    /// Display name shown to users (e.g., "Google Drive")
    pub name: String,
    /// OAuth authorization endpoint URL
    pub auth_url: String,
    /// OAuth token endpoint URL
    pub token_url: String,
    /// OAuth client ID (can be empty if provided by environment or user input)
    pub client_id: String,
    /// Required OAuth scopes
    pub scopes: Vec<String>,
    /// Whether PKCE (Proof Key for Code Exchange) is required
    pub pkce_required: bool,
    /// Optional: URL for token revocation
    pub revoke_url: Option<String>,
    /// Optional: OpenID Connect discovery URL
    pub oidc_discovery_url: Option<String>,
}

impl OAuthProvider {
    pub fn new(id: &str, name: &str) -> Self {
        OAuthProvider {
            id: id.to_string(),
            name: name.to_string(),
            auth_url: String::new(),
            token_url: String::new(),
            client_id: String::new(),
            scopes: Vec::new(),
            pkce_required: true,
            revoke_url: None,
            oidc_discovery_url: None,
        }
    }

    pub fn set_auth_url(mut self, url: &str) -> Self {
        self.auth_url = url.to_string();
        self
    }

    pub fn set_token_url(mut self, url: &str) -> Self {
        self.token_url = url.to_string();
        self
    }

    pub fn set_client_id(mut self, client_id: &str) -> Self {
        self.client_id = client_id.to_string();
        self
    }

    pub fn add_scope(mut self, scope: &str) -> Self {
        self.scopes.push(scope.to_string());
        self
    }

    pub fn set_pkce_required(mut self, required: bool) -> Self {
        self.pkce_required = required;
        self
    }

    pub fn build(self) -> Self {
        self
    }
}

/// Token passed from the caller for one run. The engine validates presence
/// and scope coverage before starting and never persists it.
#[derive(Serialize, Deserialize, JsonSchema, Debug, Clone)]
pub struct OAuthToken {
    /// The access token for API calls
    pub access_token: String,
    /// Optional refresh token for obtaining new access tokens
    pub refresh_token: Option<String>,
    /// Unix timestamp when the access token expires
    pub expires_at: Option<u64>,
    /// The token type (usually "Bearer")
    pub token_type: Option<String>,
    /// Scopes this token was granted
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl OAuthToken {
    pub fn new(access_token: String) -> Self {
        OAuthToken {
            access_token,
            refresh_token: None,
            expires_at: None,
            token_type: Some("Bearer".to_string()),
            scopes: Vec::new(),
        }
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn is_expired(&self) -> bool {
        if let Some(expires_at) = self.expires_at {
            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            // Consider expired if less than 60 seconds remaining
            expires_at <= now + 60
        } else {
            false
        }
    }

    /// Whether this token grants every requested scope.
    pub fn covers_scopes(&self, required: &[String]) -> bool {
        required
            .iter()
            .all(|scope| self.scopes.iter().any(|granted| granted == scope))
    }

    pub fn bearer_header(&self) -> String {
        format!(
            "{} {}",
            self.token_type.as_deref().unwrap_or("Bearer"),
            self.access_token
        )
    }
}

/// Collection of OAuth tokens keyed by provider ID
pub type OAuthTokens = HashMap<String, OAuthToken>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_coverage() {
        let token = OAuthToken::new("abc".to_string())
            .with_scopes(vec!["repo".to_string(), "read:user".to_string()]);

        assert!(token.covers_scopes(&["repo".to_string()]));
        assert!(!token.covers_scopes(&["repo".to_string(), "admin:org".to_string()]));
        assert!(token.covers_scopes(&[]));
    }

    #[test]
    fn expiry_has_a_grace_margin() {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();

        let mut token = OAuthToken::new("abc".to_string());
        token.expires_at = Some(now + 30);
        assert!(token.is_expired());

        token.expires_at = Some(now + 3600);
        assert!(!token.is_expired());
    }
}
