//! Built-in tool catalogs.
//!
//! A catalog is a named set of tools plus the system message that tells the
//! model how to use them. The gateway builds one [`ToolRegistry`] from the
//! configured catalog at startup and shares it with every session.
//!
//! # Catalogs
//!
//! - `rental`: car rental assistant (locations, cars, model and booking display)
//! - `products`: product advisor backed by a JSON product file
//! - `none`: no tools, plain relay

mod products;
mod rental;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::core::tools::{ToolError, ToolRegistry};

pub use products::{ProductCategory, ProductModel, ProductStore, ProductVariation};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read product file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse product file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("The products catalog requires a product file path")]
    MissingProductsPath,

    #[error("Tool registration failed: {0}")]
    Registration(#[from] ToolError),
}

/// Which set of tools the gateway serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCatalog {
    #[default]
    Rental,
    Products,
    None,
}

impl ToolCatalog {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolCatalog::Rental => "rental",
            ToolCatalog::Products => "products",
            ToolCatalog::None => "none",
        }
    }

    /// Instructions matching the catalog's tools.
    pub fn default_system_message(&self) -> Option<&'static str> {
        match self {
            ToolCatalog::Rental => Some(rental::SYSTEM_MESSAGE),
            ToolCatalog::Products => Some(products::SYSTEM_MESSAGE),
            ToolCatalog::None => None,
        }
    }

    /// Builds the registry for this catalog.
    ///
    /// `products_path` is only read by the products catalog, which requires it.
    pub fn build_registry(&self, products_path: Option<&Path>) -> Result<ToolRegistry, CatalogError> {
        let mut registry = ToolRegistry::new();
        match self {
            ToolCatalog::Rental => rental::register(&mut registry)?,
            ToolCatalog::Products => {
                let path = products_path.ok_or(CatalogError::MissingProductsPath)?;
                let store = ProductStore::from_file(path)?;
                tracing::info!(
                    path = %path.display(),
                    categories = store.categories().len(),
                    "Loaded product catalog"
                );
                products::register(&mut registry, store)?;
            }
            ToolCatalog::None => {}
        }
        Ok(registry)
    }
}

impl fmt::Display for ToolCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolCatalog {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rental" | "car_rental" => Ok(ToolCatalog::Rental),
            "products" | "product" => Ok(ToolCatalog::Products),
            "none" | "" => Ok(ToolCatalog::None),
            other => Err(format!(
                "Unknown tool catalog: {other}. Supported catalogs: rental, products, none"
            )),
        }
    }
}

/// Copies the named fields of a validated argument object, for display tools.
fn pick(arguments: &Value, keys: &[&str]) -> Value {
    let fields: Map<String, Value> = keys
        .iter()
        .map(|key| {
            let value = arguments.get(*key).cloned().unwrap_or(Value::Null);
            ((*key).to_string(), value)
        })
        .collect();
    Value::Object(fields)
}

/// Required string argument.
fn string_argument<'a>(arguments: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArguments(format!("`{key}` must be a string")))
}
