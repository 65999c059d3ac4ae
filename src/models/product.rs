use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{AppError, Result, msg};

/// Distinguishes an absent field (leave unchanged) from an explicit `null` (clear it).
fn deserialize_optional_nullable<'de, D, T>(
    deserializer: D,
) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Some(Option::deserialize(deserializer)?))
}

fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !slug.starts_with('-')
        && !slug.ends_with('-')
}

fn validate_duration(days: Option<i32>) -> Result<()> {
    match days {
        Some(d) if d < 1 => Err(AppError::BadRequest(msg::DURATION_INVALID.into())),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub currency: String,
    /// License lifetime in days. None = perpetual.
    pub duration_days: Option<i32>,
    /// Licenses minted for this product pin themselves to the first machine that validates.
    pub requires_hardware_binding: bool,
    pub download_url: Option<String>,
    pub active: bool,
    pub created_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateProduct {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price_cents: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub duration_days: Option<i32>,
    #[serde(default)]
    pub requires_hardware_binding: bool,
    #[serde(default)]
    pub download_url: Option<String>,
}

fn default_currency() -> String {
    "usd".to_string()
}

impl CreateProduct {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::BadRequest(msg::NAME_EMPTY.into()));
        }
        if !is_valid_slug(&self.slug) {
            return Err(AppError::BadRequest(msg::SLUG_INVALID.into()));
        }
        if self.price_cents < 0 {
            return Err(AppError::BadRequest(msg::PRICE_NEGATIVE.into()));
        }
        validate_duration(self.duration_days)
    }
}

/// Partial product update. Fields that shape already-issued licenses (duration,
/// hardware binding) only affect licenses minted after the change.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProduct {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_nullable")]
    pub description: Option<Option<String>>,
    pub price_cents: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_optional_nullable")]
    pub duration_days: Option<Option<i32>>,
    pub requires_hardware_binding: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_optional_nullable")]
    pub download_url: Option<Option<String>>,
    pub active: Option<bool>,
}

impl UpdateProduct {
    pub fn validate(&self) -> Result<()> {
        if let Some(ref name) = self.name
            && name.trim().is_empty()
        {
            return Err(AppError::BadRequest(msg::NAME_EMPTY.into()));
        }
        if let Some(price) = self.price_cents
            && price < 0
        {
            return Err(AppError::BadRequest(msg::PRICE_NEGATIVE.into()));
        }
        validate_duration(self.duration_days.flatten())
    }
}
