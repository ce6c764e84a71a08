use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub display_name: String,
    /// Auth provider token; present once the user has signed in.
    #[serde(skip)]
    pub access_token: Option<String>,
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("user_id", &self.user_id)
            .field("display_name", &self.display_name)
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Identity {
    pub fn generate(display_name: &str) -> Self {
        Self {
            user_id: Uuid::new_v4().to_string(),
            display_name: display_name.to_string(),
            access_token: None,
        }
    }

    /// Create an identity from an auth provider session.
    pub fn from_auth_session(user_id: String, display_name: String, access_token: String) -> Self {
        Self {
            user_id,
            display_name,
            access_token: Some(access_token),
        }
    }

    pub fn is_signed_in(&self) -> bool {
        self.access_token.is_some()
    }

    /// Returns a public view of this identity without sensitive fields.
    pub fn to_public(&self) -> PublicIdentity {
        PublicIdentity {
            user_id: self.user_id.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicIdentity {
    pub user_id: String,
    pub display_name: String,
}
