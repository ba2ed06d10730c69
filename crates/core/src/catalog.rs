//! Read-only product catalog, populated by the out-of-scope scraper.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::domain::product::Product;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog file not found: `{0}`")]
    Missing(PathBuf),
    #[error("could not read catalog file `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("could not parse catalog file `{path}`: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
}

/// Immutable set of products loaded once at startup.
#[derive(Clone, Debug, Default)]
pub struct ProductCatalog {
    products: Vec<Product>,
}

impl ProductCatalog {
    pub fn new(products: Vec<Product>) -> Self {
        Self { products }
    }

    /// Load a JSON array of products, the scraper's output format.
    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        if !path.exists() {
            return Err(CatalogError::Missing(path.to_path_buf()));
        }
        let raw = fs::read_to_string(path)
            .map_err(|source| CatalogError::Read { path: path.to_path_buf(), source })?;
        let products = serde_json::from_str(&raw)
            .map_err(|source| CatalogError::Parse { path: path.to_path_buf(), source })?;
        Ok(Self { products })
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }
}
