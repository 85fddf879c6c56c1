//! Eyewear model catalog.
//!
//! The built-in catalog is embedded at compile time from `contrib/models.toml`;
//! a replacement can be loaded from disk. Load state is written only by the
//! session loop as asset events arrive.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

const BUILTIN_CATALOG: &str = include_str!("../../../contrib/models.toml");

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid catalog: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("duplicate model id: {0}")]
    DuplicateId(String),
    #[error("model {id}: {reason}")]
    InvalidEntry { id: String, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum LoadState {
    #[default]
    Unloaded,
    Loading {
        progress: f32,
    },
    Loaded,
    Error {
        message: String,
    },
}

impl LoadState {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub name: String,
    /// Asset path as written in the catalog; relative paths resolve against the asset dir.
    pub asset_path: PathBuf,
    /// Model-specific size correction multiplied into the solved scale.
    pub base_scale: f32,
    pub load_state: LoadState,
}

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default, rename = "model")]
    models: Vec<CatalogEntry>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogEntry {
    id: String,
    name: String,
    asset: PathBuf,
    #[serde(default = "default_base_scale")]
    base_scale: f32,
}

fn default_base_scale() -> f32 {
    1.0
}

#[derive(Debug, Clone)]
pub struct Catalog {
    models: Vec<ModelDescriptor>,
    asset_dir: PathBuf,
}

impl Catalog {
    /// Parse a catalog whose relative asset paths live under `asset_dir`.
    pub fn from_toml_str(src: &str, asset_dir: impl Into<PathBuf>) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(src)?;
        let mut seen = HashSet::new();
        let mut models = Vec::with_capacity(file.models.len());

        for entry in file.models {
            if entry.id.trim().is_empty() {
                return Err(CatalogError::InvalidEntry {
                    id: entry.id,
                    reason: "empty id".into(),
                });
            }
            if !(entry.base_scale.is_finite() && entry.base_scale > 0.0) {
                return Err(CatalogError::InvalidEntry {
                    id: entry.id,
                    reason: format!("base_scale must be positive, got {}", entry.base_scale),
                });
            }
            if !seen.insert(entry.id.clone()) {
                return Err(CatalogError::DuplicateId(entry.id));
            }
            models.push(ModelDescriptor {
                id: entry.id,
                name: entry.name,
                asset_path: entry.asset,
                base_scale: entry.base_scale,
                load_state: LoadState::Unloaded,
            });
        }

        Ok(Self {
            models,
            asset_dir: asset_dir.into(),
        })
    }

    /// Load a catalog file. Relative asset paths resolve next to the file.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let src = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let catalog = Self::from_toml_str(&src, dir)?;
        tracing::info!(path = %path.display(), models = catalog.len(), "catalog loaded");
        Ok(catalog)
    }

    /// The catalog shipped with the binary.
    pub fn builtin(asset_dir: impl Into<PathBuf>) -> Result<Self, CatalogError> {
        Self::from_toml_str(BUILTIN_CATALOG, asset_dir)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.iter()
    }

    pub fn get(&self, id: &str) -> Option<&ModelDescriptor> {
        self.models.iter().find(|m| m.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut ModelDescriptor> {
        self.models.iter_mut().find(|m| m.id == id)
    }

    /// Full path to a model's asset.
    pub fn resolve(&self, model: &ModelDescriptor) -> PathBuf {
        if model.asset_path.is_absolute() {
            model.asset_path.clone()
        } else {
            self.asset_dir.join(&model.asset_path)
        }
    }

    pub fn asset_dir(&self) -> &Path {
        &self.asset_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_parses() {
        let catalog = Catalog::builtin("assets").unwrap();
        assert!(!catalog.is_empty());
        for model in catalog.iter() {
            assert_eq!(model.load_state, LoadState::Unloaded);
            assert!(model.base_scale > 0.0);
        }
        let first = catalog.iter().next().unwrap();
        assert!(catalog.resolve(first).starts_with("assets"));
    }

    #[test]
    fn test_default_base_scale_and_absolute_paths() {
        let src = r#"
            [[model]]
            id = "a"
            name = "A"
            asset = "/opt/models/a.glb"
        "#;
        let catalog = Catalog::from_toml_str(src, "assets").unwrap();
        let a = catalog.get("a").unwrap();
        assert_eq!(a.base_scale, 1.0);
        assert_eq!(catalog.resolve(a), PathBuf::from("/opt/models/a.glb"));
        assert!(catalog.get("b").is_none());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let src = r#"
            [[model]]
            id = "a"
            name = "A"
            asset = "a.glb"

            [[model]]
            id = "a"
            name = "Again"
            asset = "b.glb"
        "#;
        assert!(matches!(
            Catalog::from_toml_str(src, "."),
            Err(CatalogError::DuplicateId(id)) if id == "a"
        ));
    }

    #[test]
    fn test_invalid_entries_rejected() {
        let bad_scale = r#"
            [[model]]
            id = "a"
            name = "A"
            asset = "a.glb"
            base_scale = -1.0
        "#;
        assert!(matches!(
            Catalog::from_toml_str(bad_scale, "."),
            Err(CatalogError::InvalidEntry { .. })
        ));

        let unknown_field = r#"
            [[model]]
            id = "a"
            name = "A"
            asset = "a.glb"
            price = 12
        "#;
        assert!(matches!(
            Catalog::from_toml_str(unknown_field, "."),
            Err(CatalogError::Parse(_))
        ));
    }

    #[test]
    fn test_load_resolves_next_to_file() {
        let dir = std::env::temp_dir().join(format!("tryon-catalog-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("models.toml");
        std::fs::write(&path, "[[model]]\nid = \"x\"\nname = \"X\"\nasset = \"x.glb\"\n").unwrap();

        let catalog = Catalog::load(&path).unwrap();
        let x = catalog.get("x").unwrap();
        assert_eq!(catalog.resolve(x), dir.join("x.glb"));

        std::fs::remove_dir_all(&dir).unwrap();
        assert!(matches!(Catalog::load(&path), Err(CatalogError::Io { .. })));
    }
}
