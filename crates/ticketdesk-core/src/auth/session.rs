use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::claims;
use super::SessionError;

/// Role granted to an identity. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::User => write!(f, "user"),
        }
    }
}

impl FromStr for Role {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            other => Err(SessionError::InvalidCredential(format!(
                "unknown role '{}'",
                other
            ))),
        }
    }
}

/// The resolved identity behind a credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub email: String,
    pub role: Role,
}

impl Identity {
    /// Build the identity a login produces from the issued credential.
    ///
    /// The id comes from the `user_id` claim (falling back to `sub`). A
    /// missing or unrecognised role claim degrades to `Role::User`.
    pub fn from_credential(credential: &str, email: &str) -> Result<Self, SessionError> {
        let claims = claims::decode_claims(credential).ok_or_else(|| {
            SessionError::InvalidCredential("credential payload could not be decoded".to_string())
        })?;

        let id = claims.subject().ok_or_else(|| {
            SessionError::InvalidCredential("credential has no subject claim".to_string())
        })?;

        Ok(Self {
            id: id.to_string(),
            email: email.to_string(),
            role: claims.role.unwrap_or(Role::User),
        })
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// A credential paired with the identity it resolves to.
///
/// Sessions are only ever replaced as a whole; there are no partial updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub credential: String,
    pub identity: Identity,
}

impl Session {
    pub fn new(credential: impl Into<String>, identity: Identity) -> Self {
        Self {
            credential: credential.into(),
            identity,
        }
    }

    /// Decoded `exp` claim, if the credential carries one
    pub fn expires_at(&self) -> Option<i64> {
        claims::decode_expiry(&self.credential)
    }
}

/// Lifecycle state owned by the `SessionManager`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Persisted session not yet restored; authorization decisions must wait
    #[default]
    Initializing,
    Anonymous,
    Authenticated(Session),
}

impl SessionState {
    pub fn is_initializing(&self) -> bool {
        matches!(self, SessionState::Initializing)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }

    pub fn is_admin(&self) -> bool {
        self.session().map(|s| s.identity.is_admin()).unwrap_or(false)
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionState::Authenticated(session) => Some(session),
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Initializing => write!(f, "initializing"),
            SessionState::Anonymous => write!(f, "anonymous"),
            SessionState::Authenticated(s) => {
                write!(f, "authenticated as {} ({})", s.identity.email, s.identity.role)
            }
        }
    }
}
