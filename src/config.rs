//! YAML configuration with profile overlays and environment overrides.
//!
//! [ConfigLoader::load] reads `application.yaml`, then `application-<profile>.yaml` for every
//! active profile, then lets environment variables override individual keys: the key
//! `server.port` is overridden by `SERVER_PORT`. Overriding strings are coerced to booleans
//! and numbers when they look like one, unlike the container which never interprets values.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};
use tracing::{debug, trace};

use crate::value::{EnvValueSource, ValueSource};
use crate::{ActiveProfiles, ConfigError};

/// Read files relative to a base directory
#[derive(Clone, Debug)]
pub struct ResourceLoader {
    base: PathBuf,
}

impl ResourceLoader {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn resolve(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.base.join(relative)
    }

    pub fn exists(&self, relative: impl AsRef<Path>) -> bool {
        self.resolve(relative).is_file()
    }

    pub fn read_to_string(&self, relative: impl AsRef<Path>) -> Result<String, ConfigError> {
        let path = self.resolve(relative);
        std::fs::read_to_string(&path).map_err(|source| ConfigError::Io { path, source })
    }
}

/// Merged configuration tree
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Config {
    root: Mapping,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        let document: Value = serde_yaml::from_str(text).map_err(|source| ConfigError::Yaml {
            path: origin.to_path_buf(),
            source,
        })?;
        match document {
            Value::Null => Ok(Self::default()),
            Value::Mapping(root) => Ok(Self { root }),
            _ => Err(ConfigError::NotAMapping {
                path: origin.to_path_buf(),
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Lookup a dotted key such as `server.port`
    pub fn get(&self, key: &str) -> Option<&Value> {
        let mut segments = key.split('.');
        let mut current = self.root.get(segments.next()?)?;
        for segment in segments {
            current = current.as_mapping()?.get(segment)?;
        }
        Some(current)
    }

    /// Scalar rendered as a string, sequences of scalars as a comma separated list
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).and_then(render)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        let segments: Vec<&str> = key.split('.').collect();
        insert_path(&mut self.root, &segments, value);
    }

    /// Dotted keys of all leaf values
    pub fn keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        collect_keys(&self.root, "", &mut keys);
        keys
    }

    /// Deep merge: nested mappings are merged, other values of `overlay` replace existing ones
    pub fn merge(&mut self, overlay: Config) {
        merge_mappings(&mut self.root, overlay.root);
    }

    /// Deserialize a section (or the whole tree with an empty prefix)
    pub fn bind<T: DeserializeOwned>(&self, prefix: &str) -> Result<T, ConfigError> {
        let section = if prefix.is_empty() {
            Value::Mapping(self.root.clone())
        } else {
            self.get(prefix).cloned().unwrap_or(Value::Null)
        };
        serde_yaml::from_value(section).map_err(|source| ConfigError::Bind {
            prefix: prefix.to_string(),
            source,
        })
    }

    /// Replace existing keys by the matching environment values
    pub fn apply_env(&mut self, env: &dyn ValueSource) {
        for key in self.keys() {
            if let Some(raw) = env.get(&env_var_name(&key)) {
                debug!(%key, "environment override");
                self.set(&key, coerce(&raw));
            }
        }
    }
}

impl ValueSource for Config {
    fn get(&self, key: &str) -> Option<String> {
        self.get_string(key)
    }
}

fn render(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Sequence(items) => {
            let items: Option<Vec<String>> = items.iter().map(render).collect();
            items.map(|items| items.join(","))
        }
        _ => None,
    }
}

fn insert_path(mapping: &mut Mapping, segments: &[&str], value: Value) {
    match segments {
        [] => {}
        [last] => {
            mapping.insert(Value::from(*last), value);
        }
        [first, rest @ ..] => {
            let key = Value::from(*first);
            if !matches!(mapping.get(&key), Some(Value::Mapping(_))) {
                mapping.insert(key.clone(), Value::Mapping(Mapping::new()));
            }
            if let Some(Value::Mapping(child)) = mapping.get_mut(&key) {
                insert_path(child, rest, value);
            }
        }
    }
}

fn collect_keys(mapping: &Mapping, prefix: &str, keys: &mut Vec<String>) {
    for (key, value) in mapping {
        let Some(name) = render(key) else {
            continue;
        };
        let full = if prefix.is_empty() {
            name
        } else {
            format!("{}.{}", prefix, name)
        };
        match value {
            Value::Mapping(child) => collect_keys(child, &full, keys),
            _ => keys.push(full),
        }
    }
}

fn merge_mappings(base: &mut Mapping, overlay: Mapping) {
    for (key, value) in overlay {
        if let Value::Mapping(incoming) = value {
            if let Some(Value::Mapping(existing)) = base.get_mut(&key) {
                merge_mappings(existing, incoming);
                continue;
            }
            base.insert(key, Value::Mapping(incoming));
        } else {
            base.insert(key, value);
        }
    }
}

/// Environment variable overriding a configuration key: `server.max-connections` -> `SERVER_MAX_CONNECTIONS`
pub fn env_var_name(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Interpret a raw string as a boolean or a number when possible
pub fn coerce(raw: &str) -> Value {
    let trimmed = raw.trim();
    match trimmed {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(integer) = trimmed.parse::<i64>() {
        return Value::Number(integer.into());
    }
    match trimmed.parse::<f64>() {
        Ok(float) if float.is_finite() => Value::Number(float.into()),
        _ => Value::String(raw.to_string()),
    }
}

/// Load `application[-profile].yaml` files from a directory
#[derive(Clone, Debug)]
pub struct ConfigLoader {
    resources: ResourceLoader,
    name: String,
    env_overrides: bool,
}

impl ConfigLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            resources: ResourceLoader::new(dir),
            name: "application".to_string(),
            env_overrides: true,
        }
    }

    /// Base name of the configuration files, `application` by default
    pub fn file_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn env_overrides(mut self, enabled: bool) -> Self {
        self.env_overrides = enabled;
        self
    }

    /// Base file only, without profile overlays nor environment overrides
    pub fn load_base(&self) -> Result<Config, ConfigError> {
        self.read_optional(&self.name)
    }

    pub fn load(&self, profiles: &ActiveProfiles) -> Result<Config, ConfigError> {
        self.load_with_env(profiles, &EnvValueSource)
    }

    pub fn load_with_env(
        &self,
        profiles: &ActiveProfiles,
        env: &dyn ValueSource,
    ) -> Result<Config, ConfigError> {
        let mut config = self.load_base()?;
        for profile in profiles.iter() {
            let overlay = self.read_optional(&format!("{}-{}", self.name, profile))?;
            if !overlay.is_empty() {
                debug!(%profile, "apply profile configuration");
            }
            config.merge(overlay);
        }
        if self.env_overrides {
            config.apply_env(env);
        }
        Ok(config)
    }

    fn read_optional(&self, stem: &str) -> Result<Config, ConfigError> {
        for extension in ["yaml", "yml"] {
            let file = format!("{}.{}", stem, extension);
            if self.resources.exists(&file) {
                let text = self.resources.read_to_string(&file)?;
                return Config::parse(&text, &self.resources.resolve(&file));
            }
        }
        trace!(%stem, dir = %self.resources.base().display(), "no configuration file");
        Ok(Config::default())
    }
}
