use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::{Error, FieldgateConfig, Result};

/// File picked up from the working directory when no path is given.
pub const CONFIG_FILE_NAME: &str = "fieldgate.toml";

const ENV_GRAPHQL_URL: &str = "GRAPHQL_URL";
const ENV_BIND: &str = "FIELDGATE_BIND";
const ENV_PORT: &str = "FIELDGATE_PORT";

/// Load and parse a TOML config file.
pub fn load_config(path: &Path) -> Result<FieldgateConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| Error::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolve the effective configuration.
///
/// An explicit `path` must exist. Without one, `fieldgate.toml` in the
/// working directory is used when present, otherwise the defaults.
/// Environment overrides are applied last. The result is not validated:
/// callers layer their own overrides first and then call
/// [`FieldgateConfig::validate`].
pub fn discover_and_load(path: Option<&Path>) -> Result<FieldgateConfig> {
    let mut config = match path {
        Some(path) => {
            info!(path = %path.display(), "loading config");
            load_config(path)?
        },
        None => {
            let candidate = PathBuf::from(CONFIG_FILE_NAME);
            if candidate.is_file() {
                info!(path = %candidate.display(), "loading config");
                load_config(&candidate)?
            } else {
                debug!("no config file found, using defaults");
                FieldgateConfig::default()
            }
        },
    };
    apply_env(&mut config);
    Ok(config)
}

/// Apply `GRAPHQL_URL`, `FIELDGATE_BIND` and `FIELDGATE_PORT` from the
/// process environment.
pub fn apply_env(config: &mut FieldgateConfig) {
    apply_env_from(config, |key| std::env::var(key).ok());
}

fn apply_env_from(config: &mut FieldgateConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(url) = lookup(ENV_GRAPHQL_URL).filter(|v| !v.trim().is_empty()) {
        config.upstream.endpoint = url;
    }
    if let Some(bind) = lookup(ENV_BIND).filter(|v| !v.trim().is_empty()) {
        config.server.bind = bind;
    }
    if let Some(port) = lookup(ENV_PORT) {
        match port.trim().parse() {
            Ok(port) => config.server.port = port,
            Err(e) => warn!(value = %port, "ignoring invalid {ENV_PORT}: {e}"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {super::*, std::collections::HashMap};

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn loads_file_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            r#"
            [server]
            port = 8088

            [upstream]
            endpoint = "https://graphql.example.com/graphql"
            subscription_events = ["next"]
            "#,
        )
        .unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.server.port, 8088);
        assert_eq!(cfg.server.bind, "0.0.0.0");
        assert_eq!(cfg.upstream.subscription_events, vec!["next"]);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover_and_load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
    }

    #[test]
    fn invalid_values_are_left_for_the_caller() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fieldgate.toml");
        std::fs::write(&path, "[upstream]\nendpoint = \"not a url\"\n").unwrap();

        let mut cfg = discover_and_load(Some(&path)).unwrap();
        assert!(cfg.validate().is_err());

        cfg.upstream.endpoint = "http://core:4000/graphql".into();
        cfg.validate().unwrap();
    }

    #[test]
    fn malformed_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut cfg = FieldgateConfig::default();
        apply_env_from(
            &mut cfg,
            env(&[
                ("GRAPHQL_URL", "http://10.0.0.5:4000/graphql"),
                ("FIELDGATE_BIND", "127.0.0.1"),
                ("FIELDGATE_PORT", "9000"),
            ]),
        );
        assert_eq!(cfg.upstream.endpoint, "http://10.0.0.5:4000/graphql");
        assert_eq!(cfg.server.bind, "127.0.0.1");
        assert_eq!(cfg.server.port, 9000);
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut cfg = FieldgateConfig::default();
        apply_env_from(&mut cfg, env(&[("GRAPHQL_URL", "  "), ("FIELDGATE_BIND", "")]));
        assert_eq!(cfg, FieldgateConfig::default());
    }

    #[test]
    fn invalid_port_is_ignored() {
        let mut cfg = FieldgateConfig::default();
        apply_env_from(&mut cfg, env(&[("FIELDGATE_PORT", "eighty")]));
        assert_eq!(cfg.server.port, crate::DEFAULT_PORT);
    }
}
