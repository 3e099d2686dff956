use super::Claims;
use crate::services::AuthProvider;

/// Authenticated caller extracted from a verified bearer token
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// User ID (from JWT sub claim)
    pub user_id: String,

    /// User email if available
    pub email: Option<String>,

    /// User role if specified
    pub role: Option<String>,
}

impl AuthContext {
    pub fn from_claims(claims: &Claims) -> Result<Self, &'static str> {
        if claims.sub.trim().is_empty() {
            return Err("Missing user ID in token");
        }

        Ok(Self {
            user_id: claims.sub.clone(),
            email: claims.email.clone(),
            role: claims.role.clone(),
        })
    }
}

impl AuthProvider for AuthContext {
    fn current_user_id(&self) -> Option<String> {
        Some(self.user_id.clone())
    }
}
