//! Configuration file loading
//!
//! A service config is one file (YAML, TOML or JSON, chosen by extension)
//! overlaid with `{PREFIX}` environment variables, where `__` separates
//! nested keys: `COLLSRV_HISTORY__WINDOW_SECS=600`.

use std::path::Path;

use errors::{PlantError, PlantResult};
use figment::providers::{Env, Format, Json, Toml, Yaml};
use figment::Figment;
use serde::de::DeserializeOwned;
use tracing::info;

/// Build the figment for `path` + environment overrides
pub fn figment_for(path: &Path, env_prefix: &str) -> PlantResult<Figment> {
    if !path.exists() {
        return Err(PlantError::MissingConfig(format!(
            "configuration file not found: {}",
            path.display()
        )));
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let figment = match ext.as_str() {
        "yaml" | "yml" => Figment::new().merge(Yaml::file(path)),
        "toml" => Figment::new().merge(Toml::file(path)),
        "json" => Figment::new().merge(Json::file(path)),
        other => {
            return Err(PlantError::invalid_config(
                "config",
                format!("unsupported config format '{}'", other),
            ))
        },
    };

    Ok(figment.merge(Env::prefixed(env_prefix).split("__")))
}

/// Load and deserialize a configuration file
pub fn load_config<T: DeserializeOwned>(path: &Path, env_prefix: &str) -> PlantResult<T> {
    let config = figment_for(path, env_prefix)?.extract::<T>()?;
    info!("Configuration loaded from {}", path.display());
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Sample {
        name: String,
        #[serde(default)]
        nested: Nested,
    }

    #[derive(Debug, Default, Deserialize)]
    struct Nested {
        #[serde(default)]
        window_secs: u64,
    }

    #[test]
    fn test_load_yaml_and_toml() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = dir.path().join("a.yaml");
        std::fs::write(&yaml, "name: plant\nnested:\n  window_secs: 900\n").unwrap();
        let cfg: Sample = load_config(&yaml, "LOADER_TEST_A_").unwrap();
        assert_eq!(cfg.name, "plant");
        assert_eq!(cfg.nested.window_secs, 900);

        let toml = dir.path().join("a.toml");
        std::fs::write(&toml, "name = \"plant\"\n").unwrap();
        let cfg: Sample = load_config(&toml, "LOADER_TEST_A_").unwrap();
        assert_eq!(cfg.nested.window_secs, 0);
    }

    #[test]
    fn test_env_overrides_nested_key() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("c.yaml", "name: plant\nnested:\n  window_secs: 900\n")?;
            jail.set_env("LOADER_TEST_B_NESTED__WINDOW_SECS", "60");
            let cfg: Sample = load_config(Path::new("c.yaml"), "LOADER_TEST_B_")
                .map_err(|e| figment::Error::from(e.to_string()))?;
            assert_eq!(cfg.nested.window_secs, 60);
            Ok(())
        });
    }

    #[test]
    fn test_missing_and_unsupported() {
        assert!(matches!(
            load_config::<Sample>(Path::new("/nonexistent/x.yaml"), "X_"),
            Err(PlantError::MissingConfig(_))
        ));

        let dir = tempfile::tempdir().unwrap();
        let ini = dir.path().join("a.ini");
        std::fs::write(&ini, "name=plant").unwrap();
        assert!(load_config::<Sample>(&ini, "X_").is_err());
    }
}
