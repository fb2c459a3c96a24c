//! Component classes: explicit replacement for annotated, reflected classes.
//!
//! A [Component] describes how to build itself from the container: constructor injection
//! happens in [Component::construct], followed by field injection, configuration value
//! injection and finally the post-construction hook. The [ClassDef] erases this per-type
//! metadata so that it can be stored in a [Provider].

use std::fmt;
use std::sync::Arc;

use crate::provider::{Instance, Strategy};
use crate::value::Values;
use crate::web::{self, Controller, ErasedRoute};
use crate::{Container, Provider, Scope, Token, TypeKey, WiringError};

/// Role of a component, mostly informative except for configuration classes and controllers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Stereotype {
    #[default]
    Component,
    Service,
    Repository,
    Controller,
    /// Declares bean-producing methods, instantiated eagerly when the container is built
    Configuration,
}

/// A type that the container can construct and inject.
///
/// Only [Component::construct] is required, all other hooks default to no-ops.
pub trait Component: Send + Sync + Sized + 'static {
    const STEREOTYPE: Stereotype = Stereotype::Component;
    const SCOPE: Scope = Scope::Singleton;
    /// Optional alias usable as a name token
    const NAME: Option<&'static str> = None;
    const QUALIFIERS: &'static [&'static str] = &[];
    /// Profile expression entries (`"dev"`, `"!production"`), empty means always registered
    const PROFILES: &'static [&'static str] = &[];

    /// Build the instance, resolving constructor dependencies in order.
    fn construct(container: &Container) -> Result<Self, WiringError>;

    /// Assign field-level dependencies, after construction.
    fn inject_fields(&mut self, _container: &Container) -> Result<(), WiringError> {
        Ok(())
    }

    /// Assign configuration values, after field injection.
    fn inject_values(&mut self, _values: &Values<'_>) -> Result<(), WiringError> {
        Ok(())
    }

    /// Called once all injection is complete, before the instance is handed out.
    fn post_construct(&mut self) -> Result<(), WiringError> {
        Ok(())
    }

    /// Types this component can stand in for (usually trait objects)
    fn supertypes() -> Vec<Supertype<Self>> {
        Vec::new()
    }

    /// Bean-producing methods of a configuration class
    fn beans() -> Vec<BeanMethod<Self>> {
        Vec::new()
    }
}

/// Declare that a component can be used where the type `I` is requested
pub struct Supertype<C> {
    key: TypeKey,
    cast: Arc<dyn Fn(Arc<C>) -> Instance + Send + Sync>,
}

impl<C: Send + Sync + 'static> Supertype<C> {
    /// Usually `Supertype::of::<dyn MyTrait>(|c| c as Arc<dyn MyTrait>)`
    pub fn of<I: ?Sized + Send + Sync + 'static>(cast: fn(Arc<C>) -> Arc<I>) -> Self {
        Self {
            key: TypeKey::of::<I>(),
            cast: Arc::new(move |component| {
                let target: Arc<I> = cast(component);
                Arc::new(target) as Instance
            }),
        }
    }
}

#[derive(Clone)]
pub(crate) struct ErasedSupertype {
    key: TypeKey,
    cast: Arc<dyn Fn(Instance) -> Option<Instance> + Send + Sync>,
}

fn erase_supertypes<T: Component>() -> Vec<ErasedSupertype> {
    T::supertypes()
        .into_iter()
        .map(|supertype| {
            let cast = supertype.cast;
            ErasedSupertype {
                key: supertype.key,
                cast: Arc::new(move |instance: Instance| {
                    instance.downcast::<T>().ok().map(|c| (*cast)(c))
                }),
            }
        })
        .collect()
}

type BeanProducer<C> = Arc<dyn Fn(&C, &Container) -> Result<Instance, WiringError> + Send + Sync>;

/// Bean-producing method of a configuration class.
///
/// The bean is registered under its alias, or under the method name by default.
pub struct BeanMethod<C> {
    method: &'static str,
    alias: Option<String>,
    scope: Scope,
    produce: BeanProducer<C>,
}

impl<C: Send + Sync + 'static> BeanMethod<C> {
    pub fn new<T, F>(method: &'static str, produce: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&C, &Container) -> Result<T, WiringError> + Send + Sync + 'static,
    {
        Self {
            method,
            alias: None,
            scope: Scope::Singleton,
            produce: Arc::new(move |config: &C, container: &Container| {
                let bean: Instance = Arc::new(produce(config, container)?);
                Ok(bean)
            }),
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn method_name(&self) -> &'static str {
        self.method
    }

    pub fn alias_name(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn bean_scope(&self) -> Scope {
        self.scope
    }

    /// Bind the method to the configuration instance as a factory provider
    fn into_provider(self, config: Arc<C>) -> Provider {
        let token = Token::name(self.alias.unwrap_or_else(|| self.method.to_string()));
        let produce = self.produce;
        Provider::new(
            token,
            Strategy::Factory(Arc::new(move |container: &Container| {
                (*produce)(&config, container)
            })),
        )
        .with_scope(self.scope)
    }
}

fn erase_beans<T: Component>(config: Instance) -> Result<Vec<Provider>, WiringError> {
    let config = config
        .downcast::<T>()
        .map_err(|_| WiringError::mismatch::<T>(&Token::of::<T>()))?;
    Ok(T::beans()
        .into_iter()
        .map(|bean| bean.into_provider(Arc::clone(&config)))
        .collect())
}

fn build_component<T: Component>(container: &Container) -> Result<Instance, WiringError> {
    let mut component = T::construct(container)?;
    component.inject_fields(container)?;
    component.inject_values(&Values::new(container.values(), std::any::type_name::<T>()))?;
    component.post_construct()?;
    Ok(Arc::new(component))
}

/// Type-erased metadata of a [Component]
#[derive(Clone)]
pub struct ClassDef {
    key: TypeKey,
    stereotype: Stereotype,
    build: fn(&Container) -> Result<Instance, WiringError>,
    supertypes: fn() -> Vec<ErasedSupertype>,
    beans: fn(Instance) -> Result<Vec<Provider>, WiringError>,
    routes: Option<fn() -> Vec<ErasedRoute>>,
}

impl ClassDef {
    pub fn of<T: Component>() -> Self {
        Self {
            key: TypeKey::of::<T>(),
            stereotype: T::STEREOTYPE,
            build: build_component::<T>,
            supertypes: erase_supertypes::<T>,
            beans: erase_beans::<T>,
            routes: None,
        }
    }

    pub fn controller<T: Controller>() -> Self {
        Self {
            stereotype: Stereotype::Controller,
            routes: Some(web::erase_routes::<T>),
            ..Self::of::<T>()
        }
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn stereotype(&self) -> Stereotype {
        self.stereotype
    }

    pub fn is_configuration(&self) -> bool {
        self.stereotype == Stereotype::Configuration
    }

    pub fn is_controller(&self) -> bool {
        self.routes.is_some()
    }

    /// True if the class declared `key` among its supertypes (strict: not the class itself)
    pub fn extends(&self, key: TypeKey) -> bool {
        key != self.key && (self.supertypes)().iter().any(|s| s.key == key)
    }

    pub(crate) fn build(&self, container: &Container) -> Result<Instance, WiringError> {
        (self.build)(container)
    }

    /// Convert an instance of this class into an instance of the declared supertype
    pub(crate) fn upcast(&self, instance: Instance, key: TypeKey) -> Option<Instance> {
        (self.supertypes)()
            .into_iter()
            .find(|s| s.key == key)
            .and_then(|s| (*s.cast)(instance))
    }

    pub(crate) fn bean_providers(&self, config: Instance) -> Result<Vec<Provider>, WiringError> {
        (self.beans)(config)
    }

    pub(crate) fn routes(&self) -> Vec<ErasedRoute> {
        self.routes.map(|routes| routes()).unwrap_or_default()
    }
}

impl fmt::Debug for ClassDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDef")
            .field("key", &self.key)
            .field("stereotype", &self.stereotype)
            .finish()
    }
}

/// Implement [Component] for a type constructed with [Default].
///
/// The stereotype and scope can optionally be selected.
#[macro_export]
macro_rules! component {
    ($component:ty) => {
        $crate::component!($component, $crate::Stereotype::Component, $crate::Scope::Singleton);
    };
    ($component:ty, $stereotype:expr) => {
        $crate::component!($component, $stereotype, $crate::Scope::Singleton);
    };
    ($component:ty, $stereotype:expr, $scope:expr) => {
        impl $crate::Component for $component {
            const STEREOTYPE: $crate::Stereotype = $stereotype;
            const SCOPE: $crate::Scope = $scope;

            fn construct(_container: &$crate::Container) -> Result<Self, $crate::WiringError> {
                Ok(<$component as Default>::default())
            }
        }
    };
}
