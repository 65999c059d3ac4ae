use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result, msg};

/// Basic email sanity check: one `@`, non-empty local part, dotted domain.
pub fn validate_email_format(email: &str) -> Result<()> {
    let email = email.trim();
    let Some((local, domain)) = email.split_once('@') else {
        return Err(AppError::BadRequest(msg::EMAIL_INVALID.into()));
    };

    if local.is_empty()
        || local.contains(' ')
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
    {
        return Err(AppError::BadRequest(msg::EMAIL_INVALID.into()));
    }

    Ok(())
}

/// Storefront customer. Authentication lives in the session layer in front of us;
/// this is only the identity licenses and orders point at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub created_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateUser {
    pub email: String,
    pub name: String,
}

impl CreateUser {
    pub fn validate(&self) -> Result<()> {
        validate_email_format(&self.email)?;
        if self.name.trim().is_empty() {
            return Err(AppError::BadRequest(msg::NAME_EMPTY.into()));
        }
        Ok(())
    }
}
