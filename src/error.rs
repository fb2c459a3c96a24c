use std::path::PathBuf;

use thiserror::Error;

use crate::Token;

/// Errors triggered during the autowiring process
#[derive(Error, Debug)]
pub enum WiringError {
    #[error("No provider for {token}{}", format_qualifiers(.qualifiers))]
    NoProvider {
        token: String,
        qualifiers: Vec<String>,
    },
    #[error("Circular dependency: {token} is not ready yet")]
    NotReady { token: String },
    #[error("Invalid provider for {token}: {reason}")]
    InvalidProvider { token: String, reason: &'static str },
    #[error("Missing configuration value '{key}' required by {component}")]
    MissingValue { key: String, component: &'static str },
    #[error("Type mismatch: {token} does not hold a {expected}")]
    TypeMismatch {
        token: String,
        expected: &'static str,
    },
    #[error("Failed to construct {component}: {source}")]
    Component {
        component: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl WiringError {
    pub(crate) fn no_provider(token: &Token, qualifiers: &[&str]) -> Self {
        WiringError::NoProvider {
            token: token.to_string(),
            qualifiers: qualifiers.iter().map(|q| q.to_string()).collect(),
        }
    }

    pub(crate) fn not_ready(token: &Token) -> Self {
        WiringError::NotReady {
            token: token.to_string(),
        }
    }

    pub(crate) fn mismatch<T: ?Sized>(token: &Token) -> Self {
        WiringError::TypeMismatch {
            token: token.to_string(),
            expected: std::any::type_name::<T>(),
        }
    }

    /// Wrap an application error raised while building the component `T`
    pub fn component<T: ?Sized>(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        WiringError::Component {
            component: std::any::type_name::<T>(),
            source: source.into(),
        }
    }
}

fn format_qualifiers(qualifiers: &[String]) -> String {
    if qualifiers.is_empty() {
        String::new()
    } else {
        format!(" with qualifiers [{}]", qualifiers.join(", "))
    }
}

/// Errors raised while loading configuration files
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid YAML in {}: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Top-level YAML document in {} must be a mapping", .path.display())]
    NotAMapping { path: PathBuf },
    #[error("Cannot bind configuration section '{prefix}': {source}")]
    Bind {
        prefix: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Errors raised while starting an [Application](crate::Application)
#[derive(Error, Debug)]
pub enum BootError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Wiring(#[from] WiringError),
}
