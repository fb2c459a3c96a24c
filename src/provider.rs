//! Declarations describing how the container obtains an instance for a token.
//!
//! A [Provider] pairs a [Token] with exactly one production [Strategy]:
//!
//! * a component class ([ClassDef]) built through the full injection pipeline,
//! * a precomputed value, shared as is,
//! * a factory function receiving the container.
//!
//! Providers are immutable once registered. Several providers may share a token,
//! the qualifiers attached to each of them are then used to pick one.

use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::component::{ClassDef, Component};
use crate::web::Controller;
use crate::{Container, Token, WiringError};

/// Type-erased shared instance produced by the container
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Type-erased factory function
pub type Factory = Arc<dyn Fn(&Container) -> Result<Instance, WiringError> + Send + Sync>;

/// Lifecycle policy of the instances produced by a provider
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Scope {
    /// One cached instance per container
    #[default]
    Singleton,
    /// A new instance for every resolution
    Prototype,
}

/// Production strategy of a provider
#[derive(Clone)]
pub enum Strategy {
    Class(ClassDef),
    Value(Instance),
    Factory(Factory),
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Class(class) => f.debug_tuple("Class").field(&class.key()).finish(),
            Strategy::Value(_) => f.write_str("Value"),
            Strategy::Factory(_) => f.write_str("Factory"),
        }
    }
}

/// Registered recipe for producing an instance of a token
#[derive(Clone, Debug)]
pub struct Provider {
    token: Token,
    strategy: Strategy,
    scope: Scope,
    qualifiers: BTreeSet<String>,
    name: Option<String>,
}

impl Provider {
    pub fn new(token: Token, strategy: Strategy) -> Self {
        Self {
            token,
            strategy,
            scope: Scope::default(),
            qualifiers: BTreeSet::new(),
            name: None,
        }
    }

    pub fn builder(token: impl Into<Token>) -> ProviderBuilder {
        ProviderBuilder::new(token.into())
    }

    /// Provider for a component type, using the metadata declared on the type
    pub fn component<T: Component>() -> Self {
        Self::from_class(Token::of::<T>(), ClassDef::of::<T>())
            .with_scope(T::SCOPE)
            .with_qualifiers(T::QUALIFIERS.iter().copied())
            .with_optional_name(T::NAME)
    }

    /// Provider for a controller, exposing its routes to the [Router](crate::Router)
    pub fn controller<T: Controller>() -> Self {
        Self::from_class(Token::of::<T>(), ClassDef::controller::<T>())
            .with_scope(T::SCOPE)
            .with_qualifiers(T::QUALIFIERS.iter().copied())
            .with_optional_name(T::NAME)
    }

    pub fn from_class(token: Token, class: ClassDef) -> Self {
        Self::new(token, Strategy::Class(class))
    }

    /// Precomputed value registered under its own type
    pub fn instance<T: Send + Sync + 'static>(value: T) -> Self {
        Self::value(Token::of::<T>(), value)
    }

    /// Precomputed value registered under any token.
    ///
    /// Values registered under a trait object token `Token::of::<dyn I>()` must be given as `Arc<dyn I>`.
    pub fn value<T: Send + Sync + 'static>(token: impl Into<Token>, value: T) -> Self {
        Self::new(token.into(), Strategy::Value(Arc::new(value)))
    }

    pub fn factory<T, F>(token: impl Into<Token>, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> Result<T, WiringError> + Send + Sync + 'static,
    {
        Self::new(token.into(), Strategy::Factory(erase_factory(factory)))
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_qualifiers<I, S>(mut self, qualifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.qualifiers.extend(qualifiers.into_iter().map(Into::into));
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    fn with_optional_name(mut self, name: Option<&str>) -> Self {
        self.name = name.map(str::to_string);
        self
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn qualifiers(&self) -> &BTreeSet<String> {
        &self.qualifiers
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Backing class, if the provider uses the class strategy
    pub fn class(&self) -> Option<&ClassDef> {
        match &self.strategy {
            Strategy::Class(class) => Some(class),
            _ => None,
        }
    }

    /// True if the provider is registered under the token or backed by the requested class
    pub(crate) fn provides(&self, token: &Token) -> bool {
        if &self.token == token {
            return true;
        }
        match (token, self.class()) {
            (Token::Type(key), Some(class)) => class.key() == *key,
            _ => false,
        }
    }

    /// True if the provider carries all requested qualifiers
    pub(crate) fn satisfies(&self, requested: &BTreeSet<String>) -> bool {
        requested.is_subset(&self.qualifiers)
    }
}

pub(crate) fn erase_factory<T, F>(factory: F) -> Factory
where
    T: Send + Sync + 'static,
    F: Fn(&Container) -> Result<T, WiringError> + Send + Sync + 'static,
{
    Arc::new(move |container: &Container| {
        let instance: Instance = Arc::new(factory(container)?);
        Ok(instance)
    })
}

/// Step-by-step provider declaration.
///
/// Unlike the [Provider] constructors, a builder can describe an invalid provider,
/// which is reported by [ProviderBuilder::build].
pub struct ProviderBuilder {
    token: Token,
    class: Option<ClassDef>,
    value: Option<Instance>,
    factory: Option<Factory>,
    scope: Scope,
    qualifiers: BTreeSet<String>,
    name: Option<String>,
}

impl ProviderBuilder {
    fn new(token: Token) -> Self {
        Self {
            token,
            class: None,
            value: None,
            factory: None,
            scope: Scope::default(),
            qualifiers: BTreeSet::new(),
            name: None,
        }
    }

    pub fn use_class<T: Component>(mut self) -> Self {
        self.class = Some(ClassDef::of::<T>());
        self
    }

    pub fn use_value<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.value = Some(Arc::new(value));
        self
    }

    pub fn use_factory<T, F>(mut self, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> Result<T, WiringError> + Send + Sync + 'static,
    {
        self.factory = Some(erase_factory(factory));
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifiers.insert(qualifier.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn build(self) -> Result<Provider, WiringError> {
        let strategy = match (self.class, self.value, self.factory) {
            (Some(class), None, None) => Strategy::Class(class),
            (None, Some(value), None) => Strategy::Value(value),
            (None, None, Some(factory)) => Strategy::Factory(factory),
            (None, None, None) => {
                return Err(WiringError::InvalidProvider {
                    token: self.token.to_string(),
                    reason: "no class, value or factory",
                })
            }
            _ => {
                return Err(WiringError::InvalidProvider {
                    token: self.token.to_string(),
                    reason: "more than one of class, value or factory",
                })
            }
        };
        Ok(Provider {
            token: self.token,
            strategy,
            scope: self.scope,
            qualifiers: self.qualifiers,
            name: self.name,
        })
    }
}
