//! Catalog product records.
//!
//! [`Product`] mirrors the JSON returned by the catalog REST API
//! (camelCase fields, price as a JSON number). [`NewProduct`] is the
//! draft submitted when creating a product; the API assigns the id.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use super::id::ProductId;
use super::price::{CurrencyCode, Price};

/// Minimum length for the free-text fields of a product draft.
const MIN_FIELD_LENGTH: usize = 2;

/// Errors raised while validating a product draft.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProductError {
    /// A text field is shorter than required.
    #[error("{field} must be at least {min} characters")]
    TooShort {
        /// Field name as shown to the user.
        field: &'static str,
        /// Minimum length.
        min: usize,
    },
    /// The price could not be parsed as a decimal number.
    #[error("invalid price: {0}")]
    InvalidPrice(String),
    /// The price is below zero.
    #[error("price cannot be negative")]
    NegativePrice,
}

/// A product as listed by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub sku: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub price: Decimal,
    /// Missing, null or unrecognised codes read as the default currency.
    #[serde(default, deserialize_with = "lenient_currency")]
    pub currency: CurrencyCode,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

fn lenient_currency<'de, D>(deserializer: D) -> Result<CurrencyCode, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value
        .as_str()
        .and_then(|code| code.parse().ok())
        .unwrap_or_default())
}

impl Product {
    /// Unit price with currency.
    #[must_use]
    pub const fn unit_price(&self) -> Price {
        Price::new(self.price, self.currency)
    }
}

/// A product draft submitted to the catalog for creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub sku: String,
    pub title: String,
    pub description: String,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub price: Decimal,
    pub currency: CurrencyCode,
    pub category: String,
}

impl NewProduct {
    /// Parse a user-entered price string.
    ///
    /// # Errors
    ///
    /// Returns `ProductError::InvalidPrice` if the text is not a decimal
    /// number and `ProductError::NegativePrice` if it is below zero.
    pub fn parse_price(input: &str) -> Result<Decimal, ProductError> {
        let price = Decimal::from_str(input.trim())
            .map_err(|_| ProductError::InvalidPrice(input.trim().to_owned()))?;
        if price.is_sign_negative() && !price.is_zero() {
            return Err(ProductError::NegativePrice);
        }
        Ok(price)
    }

    /// Check the draft before it is sent to the catalog.
    ///
    /// # Errors
    ///
    /// Returns the first failing rule: short sku, title, description or
    /// category, or a negative price.
    pub fn validate(&self) -> Result<(), ProductError> {
        let fields = [
            ("sku", &self.sku),
            ("title", &self.title),
            ("description", &self.description),
            ("category", &self.category),
        ];
        for (field, value) in fields {
            if value.trim().chars().count() < MIN_FIELD_LENGTH {
                return Err(ProductError::TooShort {
                    field,
                    min: MIN_FIELD_LENGTH,
                });
            }
        }
        if self.price.is_sign_negative() && !self.price.is_zero() {
            return Err(ProductError::NegativePrice);
        }
        Ok(())
    }
}
