//! Runtime dependency injection container with scopes, qualifiers and profile-based activation.
//!
//! # Simple use case
//!
//! ```
//! # use std::sync::Arc;
//! # use sprout::*;
//! // Define traits and implementors
//! trait MyTrait: Send + Sync {
//!     fn cheers(&self) -> String;
//! }
//!
//! #[derive(Default)]
//! struct MyImpl;
//!
//! impl MyTrait for MyImpl {
//!     fn cheers(&self) -> String {
//!         "Hello world".to_string()
//!     }
//! }
//!
//! // Describe how the container builds the implementor and what it stands for
//! impl Component for MyImpl {
//!     fn construct(_container: &Container) -> Result<Self, WiringError> {
//!         Ok(MyImpl)
//!     }
//!
//!     fn supertypes() -> Vec<Supertype<Self>> {
//!         vec![Supertype::of::<dyn MyTrait>(|c| c as Arc<dyn MyTrait>)]
//!     }
//! }
//!
//! # fn main() -> Result<(), WiringError> {
//! // Register it and build a container over the registry
//! let registry = Registry::new();
//! registry.declare::<MyImpl>(&ActiveProfiles::default());
//! let container = Container::builder().registry(&registry).build()?;
//!
//! let a: Arc<dyn MyTrait> = container.get_dyn()?;
//! assert_eq!(a.cheers(), "Hello world");
//! # Ok(())
//! # }
//! ```
//!
//! # Mechanism
//!
//! Components are requested through a [Token]: a type, a name or a unique [Symbol].
//! A [Provider] binds a token to a construction strategy (a [Component] class, a ready value
//! or a factory closure), a [Scope] and optional qualifiers.
//!
//! * The [Registry] collects providers. Registration is append-only and gated by the
//!   [ActiveProfiles] at declaration time.
//! * The [Container] snapshots a registry, caches singletons and builds components in four steps:
//!   constructor injection, field injection, configuration value injection, post-construction hook.
//!   Circular references are tolerated through [Deferred] handles, filled once the cycle completes.
//! * Configuration classes ([Stereotype::Configuration]) declare [BeanMethod]s, registered as
//!   factory providers when the container is built.
//!
//! The [Application] ties it together with YAML configuration files and a transport-free [Router].

mod app;
mod component;
mod config;
mod container;
mod error;
mod profile;
mod provider;
mod registry;
mod token;
mod value;
mod web;

pub use app::{init_tracing, Application, ApplicationBuilder, ApplicationContext, LOG_ENV};
pub use component::{BeanMethod, ClassDef, Component, Stereotype, Supertype};
pub use config::{coerce, env_var_name, Config, ConfigLoader, ResourceLoader};
pub use container::{Container, ContainerBuilder, Deferred};
pub use error::{BootError, ConfigError, WiringError};
pub use profile::{
    ActiveProfiles, ProfileExpr, DEFAULT_PROFILE, PROFILES_CONFIG_KEY, PROFILES_OVERRIDE_ENV,
    PROFILE_FALLBACK_ENV,
};
pub use provider::{Factory, Instance, Provider, ProviderBuilder, Scope, Strategy};
pub use registry::{Module, Registry};
pub use token::{Symbol, Token, TypeKey};
pub use value::{EnvValueSource, MapValueSource, ValueSource, Values};
pub use web::{Controller, Method, Request, Response, Route, Router};

#[cfg(test)]
mod tests;
