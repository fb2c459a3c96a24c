//! Configuration value lookup used for value injection.

use std::collections::HashMap;

use crate::WiringError;

/// Resolve a configuration key to a raw string.
///
/// The container never interprets the returned string.
pub trait ValueSource: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// Read values from the process environment (default source of the container)
#[derive(Clone, Copy, Debug, Default)]
pub struct EnvValueSource;

impl ValueSource for EnvValueSource {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// In-memory values, mostly useful in tests
#[derive(Clone, Debug, Default)]
pub struct MapValueSource(HashMap<String, String>);

impl MapValueSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapValueSource {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl ValueSource for MapValueSource {
    fn get(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }
}

impl<F> ValueSource for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn get(&self, key: &str) -> Option<String> {
        self(key)
    }
}

/// View of the container's value source handed to [Component::inject_values](crate::Component::inject_values)
pub struct Values<'a> {
    source: &'a dyn ValueSource,
    component: &'static str,
}

impl<'a> Values<'a> {
    pub(crate) fn new(source: &'a dyn ValueSource, component: &'static str) -> Self {
        Self { source, component }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.source.get(key)
    }

    /// Lookup a value that must be present.
    ///
    /// There is no default at this layer: a missing key is an error naming the key and the component.
    pub fn require(&self, key: &str) -> Result<String, WiringError> {
        self.source.get(key).ok_or_else(|| WiringError::MissingValue {
            key: key.to_string(),
            component: self.component,
        })
    }
}
