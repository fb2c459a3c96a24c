//! Token resolution, scope management and injection.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::{debug, info, trace};

use crate::component::ClassDef;
use crate::provider::{Instance, Strategy};
use crate::value::{EnvValueSource, ValueSource};
use crate::{Component, Provider, Registry, Scope, Token, TypeKey, WiringError};

/// Shared cell receiving a singleton once it is built
type Slot = Arc<OnceCell<Instance>>;

enum Resolved {
    Ready(Instance),
    /// The provider is under construction further up the resolution chain
    Pending(Pending),
}

struct Pending {
    slot: Slot,
    /// Supertype conversion applied once the slot is filled
    upcast: Option<(ClassDef, TypeKey)>,
}

/// Dependency injection container.
///
/// The container snapshots the providers of a [Registry] when it is built, caches singletons
/// and tracks the providers under construction to tolerate circular references.
/// Resolution is synchronous and depth-first: the container is [Send] but not [Sync].
pub struct Container {
    providers: RefCell<Vec<Provider>>,
    /// Singleton slots, by position in `providers`
    singletons: RefCell<HashMap<usize, Slot>>,
    building: RefCell<HashSet<usize>>,
    values: Arc<dyn ValueSource>,
    auto_register: bool,
}

/// Release the building mark of a provider on every exit path
struct BuildGuard<'a> {
    building: &'a RefCell<HashSet<usize>>,
    entry: usize,
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        self.building.borrow_mut().remove(&self.entry);
    }
}

impl Container {
    /// Container over the global registry, reading values from the environment
    pub fn new() -> Result<Self, WiringError> {
        Self::builder().build()
    }

    pub fn builder<'r>() -> ContainerBuilder<'r> {
        ContainerBuilder::default()
    }

    pub fn values(&self) -> &dyn ValueSource {
        self.values.as_ref()
    }

    /// Copy of the providers known to this container, including bootstrapped beans
    pub fn providers(&self) -> Vec<Provider> {
        self.providers.borrow().clone()
    }

    /// Resolve a token into a type-erased instance.
    ///
    /// Using a provider that is still under construction fails with [WiringError::NotReady],
    /// circular references must be requested through [Container::deferred].
    pub fn resolve(&self, token: &Token, qualifiers: &[&str]) -> Result<Instance, WiringError> {
        let resolved = self.lookup(token, qualifiers, None)?;
        ready(token, resolved)
    }

    /// Resolve a component by type.
    ///
    /// When auto-registration is enabled, an unregistered component is registered on the fly.
    pub fn get<T: Component>(&self) -> Result<Arc<T>, WiringError> {
        self.get_qualified::<T>(&[])
    }

    pub fn get_qualified<T: Component>(&self, qualifiers: &[&str]) -> Result<Arc<T>, WiringError> {
        let token = Token::of::<T>();
        let resolved = self.lookup(&token, qualifiers, Some(&ClassDef::of::<T>()))?;
        downcast::<T>(&token, ready(&token, resolved)?)
    }

    /// Resolve any type registered under its own type token (values, factories)
    pub fn get_by_type<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, WiringError> {
        self.get_token::<T>(&Token::of::<T>(), &[])
    }

    pub fn get_named<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, WiringError> {
        self.get_token::<T>(&Token::name(name), &[])
    }

    pub fn get_token<T: Send + Sync + 'static>(
        &self,
        token: &Token,
        qualifiers: &[&str],
    ) -> Result<Arc<T>, WiringError> {
        downcast::<T>(token, self.resolve(token, qualifiers)?)
    }

    /// Resolve a trait object, e.g. `container.get_dyn::<dyn Greeter>()`
    pub fn get_dyn<I: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<I>, WiringError> {
        self.get_dyn_qualified::<I>(&[])
    }

    pub fn get_dyn_qualified<I: ?Sized + Send + Sync + 'static>(
        &self,
        qualifiers: &[&str],
    ) -> Result<Arc<I>, WiringError> {
        let token = Token::of::<I>();
        let instance = self.resolve(&token, qualifiers)?;
        instance
            .downcast::<Arc<I>>()
            .map(|outer| Arc::clone(&*outer))
            .map_err(|_| WiringError::mismatch::<I>(&token))
    }

    /// Resolve a component that may still be under construction (circular reference)
    pub fn get_deferred<T: Component>(&self) -> Result<Deferred<T>, WiringError> {
        let token = Token::of::<T>();
        let resolved = self.lookup(&token, &[], Some(&ClassDef::of::<T>()))?;
        Ok(Deferred::new(token, resolved))
    }

    pub fn deferred<T: Send + Sync + 'static>(
        &self,
        token: &Token,
        qualifiers: &[&str],
    ) -> Result<Deferred<T>, WiringError> {
        let resolved = self.lookup(token, qualifiers, None)?;
        Ok(Deferred::new(token.clone(), resolved))
    }

    fn lookup(
        &self,
        token: &Token,
        qualifiers: &[&str],
        autowire: Option<&ClassDef>,
    ) -> Result<Resolved, WiringError> {
        let requested: BTreeSet<String> = qualifiers.iter().map(|q| q.to_string()).collect();
        trace!(%token, ?qualifiers, "resolve");

        let (entry, provider) = match self.find(token, &requested) {
            Some(found) => found,
            None => match autowire {
                Some(class) if self.auto_register && requested.is_empty() => {
                    self.register_on_miss(token, class)
                }
                _ => return Err(WiringError::no_provider(token, qualifiers)),
            },
        };

        let resolved = self.instantiate(entry, &provider)?;
        // A concrete class serving a request for one of its supertypes
        if let (Token::Type(key), Some(class)) = (token, provider.class()) {
            if class.extends(*key) {
                return match resolved {
                    Resolved::Ready(instance) => class
                        .upcast(instance, *key)
                        .map(Resolved::Ready)
                        .ok_or_else(|| WiringError::TypeMismatch {
                            token: token.to_string(),
                            expected: class.key().name(),
                        }),
                    Resolved::Pending(pending) => Ok(Resolved::Pending(Pending {
                        upcast: Some((class.clone(), *key)),
                        ..pending
                    })),
                };
            }
        }
        Ok(resolved)
    }

    fn find(&self, token: &Token, requested: &BTreeSet<String>) -> Option<(usize, Provider)> {
        let providers = self.providers.borrow();
        let found = providers
            .iter()
            .position(|p| p.provides(token) && p.satisfies(requested))
            .or_else(|| {
                let name = token.as_name()?;
                providers.iter().position(|p| p.name() == Some(name))
            })
            .or_else(|| {
                let key = token.type_key()?;
                providers.iter().position(|p| {
                    p.class().is_some_and(|class| class.extends(key)) && p.satisfies(requested)
                })
            });
        found.map(|entry| (entry, providers[entry].clone()))
    }

    fn register_on_miss(&self, token: &Token, class: &ClassDef) -> (usize, Provider) {
        debug!(%token, "auto-register singleton provider");
        let provider = Provider::from_class(token.clone(), class.clone());
        let mut providers = self.providers.borrow_mut();
        providers.push(provider.clone());
        (providers.len() - 1, provider)
    }

    fn instantiate(&self, entry: usize, provider: &Provider) -> Result<Resolved, WiringError> {
        let singleton = provider.scope() == Scope::Singleton;
        if singleton {
            if let Some(instance) = self.cached(entry) {
                trace!(token = %provider.token(), "singleton cache hit");
                return Ok(Resolved::Ready(instance));
            }
        }

        if self.building.borrow().contains(&entry) {
            debug!(token = %provider.token(), "circular reference, handing out a deferred slot");
            let slot = if singleton {
                self.slot(entry)
            } else {
                Arc::default()
            };
            return Ok(Resolved::Pending(Pending { slot, upcast: None }));
        }

        let _guard = self.begin(entry);
        let instance = match provider.strategy() {
            Strategy::Value(value) => Arc::clone(value),
            Strategy::Factory(factory) => (**factory)(self)?,
            Strategy::Class(class) => class.build(self)?,
        };
        if singleton {
            // deferred handles may already hold the slot
            let _ = self.slot(entry).set(Arc::clone(&instance));
        }
        debug!(token = %provider.token(), scope = ?provider.scope(), "instantiated");
        Ok(Resolved::Ready(instance))
    }

    fn begin(&self, entry: usize) -> BuildGuard<'_> {
        self.building.borrow_mut().insert(entry);
        BuildGuard {
            building: &self.building,
            entry,
        }
    }

    fn cached(&self, entry: usize) -> Option<Instance> {
        self.singletons
            .borrow()
            .get(&entry)
            .and_then(|slot| slot.get().cloned())
    }

    fn slot(&self, entry: usize) -> Slot {
        Arc::clone(self.singletons.borrow_mut().entry(entry).or_default())
    }

    /// Instantiate configuration classes and register their beans
    fn bootstrap(&self) -> Result<(), WiringError> {
        let configurations: Vec<(usize, Provider)> = self
            .providers
            .borrow()
            .iter()
            .enumerate()
            .filter(|(_, p)| p.class().is_some_and(ClassDef::is_configuration))
            .map(|(entry, p)| (entry, p.clone()))
            .collect();

        for (entry, provider) in configurations {
            let Some(class) = provider.class() else {
                continue;
            };
            let instance = ready(provider.token(), self.instantiate(entry, &provider)?)?;
            let beans = class.bean_providers(instance)?;
            debug!(configuration = %provider.token(), beans = beans.len(), "register beans");
            self.providers.borrow_mut().extend(beans);
        }

        info!(providers = self.providers.borrow().len(), "container ready");
        Ok(())
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("providers", &self.providers.borrow().len())
            .field("singletons", &self.singletons.borrow().len())
            .field("auto_register", &self.auto_register)
            .finish()
    }
}

fn ready(token: &Token, resolved: Resolved) -> Result<Instance, WiringError> {
    match resolved {
        Resolved::Ready(instance) => Ok(instance),
        Resolved::Pending(_) => Err(WiringError::not_ready(token)),
    }
}

fn downcast<T: Send + Sync + 'static>(token: &Token, instance: Instance) -> Result<Arc<T>, WiringError> {
    instance
        .downcast::<T>()
        .map_err(|_| WiringError::mismatch::<T>(token))
}

/// Configure and build a [Container]
#[derive(Default)]
pub struct ContainerBuilder<'r> {
    registry: Option<&'r Registry>,
    providers: Vec<Provider>,
    values: Option<Arc<dyn ValueSource>>,
    auto_register: bool,
}

impl<'r> ContainerBuilder<'r> {
    /// Registry to snapshot, the global one by default
    pub fn registry(mut self, registry: &'r Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Extra provider, local to this container
    pub fn provider(mut self, provider: Provider) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn providers(mut self, providers: impl IntoIterator<Item = Provider>) -> Self {
        self.providers.extend(providers);
        self
    }

    /// Source of injected configuration values, the process environment by default
    pub fn value_source(mut self, values: impl ValueSource + 'static) -> Self {
        self.values = Some(Arc::new(values));
        self
    }

    pub fn shared_value_source(mut self, values: Arc<dyn ValueSource>) -> Self {
        self.values = Some(values);
        self
    }

    /// Register unknown components on the fly when they are requested by type, without qualifiers
    pub fn auto_register(mut self, enabled: bool) -> Self {
        self.auto_register = enabled;
        self
    }

    pub fn build(self) -> Result<Container, WiringError> {
        let registry = self.registry.unwrap_or_else(|| Registry::global());
        let mut providers = registry.list();
        providers.extend(self.providers);

        let container = Container {
            providers: RefCell::new(providers),
            singletons: RefCell::default(),
            building: RefCell::default(),
            values: self.values.unwrap_or_else(|| Arc::new(EnvValueSource)),
            auto_register: self.auto_register,
        };
        container.bootstrap()?;
        Ok(container)
    }
}

/// Handle on an instance that may not be constructed yet.
///
/// Obtained for circular references: [Deferred::get] fails with [WiringError::NotReady]
/// until the underlying singleton has been built.
pub struct Deferred<T> {
    token: Token,
    slot: Slot,
    upcast: Option<(ClassDef, TypeKey)>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> Deferred<T> {
    fn new(token: Token, resolved: Resolved) -> Self {
        let (slot, upcast) = match resolved {
            Resolved::Ready(instance) => (Arc::new(OnceCell::with_value(instance)), None),
            Resolved::Pending(pending) => (pending.slot, pending.upcast),
        };
        Self {
            token,
            slot,
            upcast,
            _marker: PhantomData,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.slot.get().is_some()
    }

    pub fn get(&self) -> Result<Arc<T>, WiringError> {
        let instance = self
            .slot
            .get()
            .ok_or_else(|| WiringError::not_ready(&self.token))?;
        let instance = Arc::clone(instance);
        let instance = match &self.upcast {
            Some((class, key)) => class
                .upcast(instance, *key)
                .ok_or_else(|| WiringError::mismatch::<T>(&self.token))?,
            None => instance,
        };
        downcast::<T>(&self.token, instance)
    }
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            token: self.token.clone(),
            slot: Arc::clone(&self.slot),
            upcast: self.upcast.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("token", &self.token)
            .field("ready", &self.slot.get().is_some())
            .finish()
    }
}
