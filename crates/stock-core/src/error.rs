//! # Catalog Error Types
//!
//! Typed error handling for the stockroom catalog engine.
//! Configuration and lookup operations return `Result<T, CatalogError>`.
//! Per-unit purchase failures live in [`crate::transaction::PurchaseFailure`]
//! and never surface here.

use thiserror::Error;

/// Core error type for catalog configuration and generation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// Configuration errors (invalid ranges, duplicate ids, bad multipliers)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Item definition referenced by a source is not registered
    #[error("Item definition not found: {item_id}")]
    DefinitionNotFound { item_id: String },

    /// Recipe referenced by a source is not registered
    #[error("Recipe not found: {recipe_id}")]
    RecipeNotFound { recipe_id: String },

    /// Inventory referenced by a source does not exist
    #[error("Inventory not found: {inventory}")]
    InventoryNotFound { inventory: String },

    /// No catalog registered under this id
    #[error("Catalog not found: {catalog_id}")]
    CatalogNotFound { catalog_id: String },

    /// `limited_stock` lower bound above upper bound
    #[error("Invalid stock range [{lower}, {upper}] on {definition_id}")]
    InvalidStockRange {
        definition_id: String,
        lower: u32,
        upper: u32,
    },

    /// Selection could not be applied to the current rows
    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CatalogError {
    /// Returns true if the error only affects one definition or candidate,
    /// so generation can skip it and keep going
    pub fn is_row_scoped(&self) -> bool {
        matches!(
            self,
            CatalogError::DefinitionNotFound { .. }
                | CatalogError::RecipeNotFound { .. }
                | CatalogError::InventoryNotFound { .. }
                | CatalogError::InvalidStockRange { .. }
        )
    }

    /// Returns the HTTP status code appropriate for this error
    pub fn status_code(&self) -> u16 {
        match self {
            CatalogError::Configuration(_) => 500,
            CatalogError::DefinitionNotFound { .. } => 404,
            CatalogError::RecipeNotFound { .. } => 404,
            CatalogError::InventoryNotFound { .. } => 404,
            CatalogError::CatalogNotFound { .. } => 404,
            CatalogError::InvalidStockRange { .. } => 500,
            CatalogError::InvalidSelection(_) => 400,
            CatalogError::Serialization(_) => 400,
        }
    }
}

impl From<toml::de::Error> for CatalogError {
    fn from(err: toml::de::Error) -> Self {
        CatalogError::Serialization(err.to_string())
    }
}

/// Result type alias for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_scoped_errors() {
        assert!(CatalogError::DefinitionNotFound {
            item_id: "chair".into()
        }
        .is_row_scoped());
        assert!(CatalogError::InventoryNotFound {
            inventory: "shelf".into()
        }
        .is_row_scoped());
        assert!(!CatalogError::Configuration("bad".into()).is_row_scoped());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            CatalogError::InvalidSelection("empty".into()).status_code(),
            400
        );
        assert_eq!(
            CatalogError::CatalogNotFound {
                catalog_id: "x".into()
            }
            .status_code(),
            404
        );
        assert_eq!(CatalogError::Configuration("x".into()).status_code(), 500);
    }

    #[test]
    fn test_toml_error_conversion() {
        let err: CatalogError = toml::from_str::<toml::Value>("= nope")
            .unwrap_err()
            .into();
        assert!(matches!(err, CatalogError::Serialization(_)));
    }
}
