//! Append-only store of provider declarations.
//!
//! Applications usually build their own [Registry] and pass it to the container builder.
//! A process-wide instance is also available through [Registry::global]: every container
//! created with [Container::new](crate::Container::new) sees it, so tests relying on it
//! must [clear](Registry::clear) it between cases.

use std::sync::{Mutex, MutexGuard, PoisonError};

use once_cell::sync::Lazy;
use tracing::debug;

use crate::profile::{ActiveProfiles, ProfileExpr};
use crate::web::Controller;
use crate::{Component, Provider};

static GLOBAL_REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// Group of registrations performed together, replacing directory scanning
pub trait Module {
    fn register(&self, registry: &Registry, profiles: &ActiveProfiles);
}

#[derive(Default)]
pub struct Registry {
    providers: Mutex<Vec<Provider>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static Registry {
        &GLOBAL_REGISTRY
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Provider>> {
        self.providers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a provider, without any duplicate detection
    pub fn register(&self, provider: Provider) {
        debug!(token = %provider.token(), scope = ?provider.scope(), "register provider");
        self.lock().push(provider);
    }

    /// Copy of the registered providers
    pub fn list(&self) -> Vec<Provider> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Register a provider if its profile expression matches the active profiles.
    ///
    /// The decision is taken now and never revisited.
    pub fn register_profiled(
        &self,
        provider: Provider,
        expr: &ProfileExpr,
        profiles: &ActiveProfiles,
    ) -> bool {
        if !expr.matches(profiles) {
            debug!(token = %provider.token(), %profiles, "skip provider for inactive profile");
            return false;
        }
        self.register(provider);
        true
    }

    /// Declare a component, gated by its profile entries
    pub fn declare<T: Component>(&self, profiles: &ActiveProfiles) -> bool {
        self.register_profiled(
            Provider::component::<T>(),
            &ProfileExpr::any_of(T::PROFILES),
            profiles,
        )
    }

    /// Declare a controller, gated by its profile entries
    pub fn declare_controller<T: Controller>(&self, profiles: &ActiveProfiles) -> bool {
        self.register_profiled(
            Provider::controller::<T>(),
            &ProfileExpr::any_of(T::PROFILES),
            profiles,
        )
    }

    pub fn install(&self, module: &dyn Module, profiles: &ActiveProfiles) {
        module.register(self, profiles);
    }
}
