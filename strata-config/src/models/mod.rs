//! Declarative description of a data layer and how it is loaded.

pub mod specs;

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use strata_model::Model;

pub use specs::{FilterSpec, ProxySpec, SorterSpec, StoreSpec, ViewSpec};

/// Source that produced the data-layer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DataLayerConfigSource {
    #[default]
    Default,
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

/// Models, stores and the views chained off them.
///
/// ```toml
/// [[models]]
/// name = "User"
/// id_property = "email"
/// fields = [{ name = "age", type = "int" }]
///
/// [[stores]]
/// id = "users"
/// model = "User"
/// autoload = true
/// proxy = { type = "file", path = "users.json" }
///
/// [[views]]
/// id = "adults"
/// source = "users"
/// filters = [{ property = "age", operator = ">=", value = 18 }]
/// ```
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DataLayerConfig {
    pub models: Vec<Model>,
    pub stores: Vec<StoreSpec>,
    pub views: Vec<ViewSpec>,
}

impl DataLayerConfig {
    /// Load the data-layer configuration using environment variables.
    /// Evaluation order:
    /// 1) `$STRATA_CONFIG_PATH` (TOML or JSON file),
    /// 2) `$STRATA_CONFIG_JSON` (inline JSON),
    /// 3) the first default candidate file that exists,
    /// 4) an empty configuration.
    pub fn load_from_env() -> anyhow::Result<(Self, DataLayerConfigSource)> {
        if let Ok(path_str) = env::var("STRATA_CONFIG_PATH")
            && !path_str.trim().is_empty()
        {
            let path = PathBuf::from(path_str);
            let config = Self::load_from_file(&path)?;
            return Ok((config, DataLayerConfigSource::EnvPath(path)));
        }

        if let Ok(raw) = env::var("STRATA_CONFIG_JSON")
            && !raw.trim().is_empty()
        {
            let parsed = Self::parse_json(&raw)
                .context("failed to parse STRATA_CONFIG_JSON")?;
            return Ok((parsed, DataLayerConfigSource::EnvInline));
        }

        if let Some(path) = Self::find_default_file() {
            let config = Self::load_from_file(&path)?;
            return Ok((config, DataLayerConfigSource::File(path)));
        }

        Ok((Self::default(), DataLayerConfigSource::Default))
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path).with_context(|| {
            format!("failed to read data layer config from {}", path.display())
        })?;

        let mut config = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::parse_json(&contents).with_context(|| {
                format!("invalid data layer config {}", path.display())
            })?,
            Some("toml") | Some("tml") => {
                toml::from_str(&contents).map_err(|err| {
                    anyhow!(
                        "invalid data layer config {}: {}",
                        path.display(),
                        err
                    )
                })?
            }
            _ => Self::parse_from_str(&contents, &path.display().to_string())?,
        };

        if let Some(dir) = path.parent() {
            config.resolve_paths(dir);
        }
        Ok(config)
    }

    pub fn parse_from_str(
        contents: &str,
        origin: &str,
    ) -> anyhow::Result<Self> {
        // Try TOML first, then JSON for convenience.
        toml::from_str(contents).or_else(|toml_err| {
            serde_json::from_str(contents).map_err(|json_err| {
                anyhow!(
                    "failed to parse data layer config {}: toml error: {}; json error: {}",
                    origin,
                    toml_err,
                    json_err
                )
            })
        })
    }

    pub fn parse_json(raw: &str) -> anyhow::Result<Self> {
        serde_json::from_str(raw)
            .map_err(|err| anyhow!("invalid data layer config json: {err}"))
    }

    /// Make relative file-proxy paths relative to `base`
    fn resolve_paths(&mut self, base: &Path) {
        for store in &mut self.stores {
            if let Some(ProxySpec::File { path }) = &mut store.proxy
                && path.is_relative()
            {
                *path = base.join(&*path);
            }
        }
    }

    fn find_default_file() -> Option<PathBuf> {
        const CANDIDATES: &[&str] = &[
            "strata.toml",
            "strata.json",
            "config/strata.toml",
            "config/strata.json",
        ];

        CANDIDATES
            .iter()
            .map(Path::new)
            .find(|path| path.exists())
            .map(|path| path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TOML: &str = r#"
        [[models]]
        name = "User"
        id_property = "email"
        fields = [{ name = "age", type = "int" }]

        [[stores]]
        id = "users"
        model = "User"
        duplicate_policy = "replace"
        proxy = { type = "file", path = "users.json" }
        sorters = [{ property = "age", direction = "desc" }]

        [[views]]
        id = "adults"
        source = "users"
        filters = [{ property = "age", operator = ">=", value = 18 }]
    "#;

    #[test]
    fn parses_toml_then_json() {
        let config = DataLayerConfig::parse_from_str(TOML, "inline").unwrap();
        assert_eq!(config.models[0].id_property, "email");
        assert_eq!(config.stores[0].sorters[0].direction, "desc");
        assert_eq!(config.views[0].source, "users");

        let config = DataLayerConfig::parse_from_str(
            r#"{"stores": [{"id": "s", "model": "M"}]}"#,
            "inline",
        )
        .unwrap();
        assert_eq!(config.stores[0].id, "s");
        assert!(config.stores[0].proxy.is_none());

        assert!(DataLayerConfig::parse_from_str("stores = 3", "inline").is_err());
    }

    #[test]
    fn file_proxy_paths_resolve_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strata.toml");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(TOML.as_bytes()).unwrap();

        let config = DataLayerConfig::load_from_file(&path).unwrap();
        assert_eq!(
            config.stores[0].proxy,
            Some(ProxySpec::File {
                path: dir.path().join("users.json")
            })
        );
    }

    #[test]
    fn missing_file_reports_its_path() {
        let err = DataLayerConfig::load_from_file(Path::new("/nonexistent/strata.toml"))
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/strata.toml"));
    }
}
