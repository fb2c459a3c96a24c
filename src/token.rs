//! Identifiers used to request instances from a [Container](crate::Container).

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Nominal type identifier.
///
/// Equality and hashing only consider the [TypeId], the name is kept for messages.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

static NEXT_SYMBOL: AtomicU64 = AtomicU64::new(1);

/// Opaque unique token.
///
/// Two symbols created with the same description are still distinct.
#[derive(Clone)]
pub struct Symbol {
    id: u64,
    description: Arc<str>,
}

impl Symbol {
    pub fn new(description: impl AsRef<str>) -> Self {
        Self {
            id: NEXT_SYMBOL.fetch_add(1, Ordering::Relaxed),
            description: Arc::from(description.as_ref()),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.description)
    }
}

/// Something the container can produce: a type, a name or a symbol.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Token {
    Type(TypeKey),
    Name(String),
    Symbol(Symbol),
}

impl Token {
    /// Token of a (possibly unsized) type, e.g. `Token::of::<dyn Greeter>()`
    pub fn of<T: ?Sized + 'static>() -> Self {
        Token::Type(TypeKey::of::<T>())
    }

    pub fn name(name: impl Into<String>) -> Self {
        Token::Name(name.into())
    }

    pub fn type_key(&self) -> Option<TypeKey> {
        match self {
            Token::Type(key) => Some(*key),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Token::Name(name) => Some(name),
            _ => None,
        }
    }
}

impl From<&str> for Token {
    fn from(name: &str) -> Self {
        Token::Name(name.to_string())
    }
}

impl From<String> for Token {
    fn from(name: String) -> Self {
        Token::Name(name)
    }
}

impl From<Symbol> for Token {
    fn from(symbol: Symbol) -> Self {
        Token::Symbol(symbol)
    }
}

impl From<TypeKey> for Token {
    fn from(key: TypeKey) -> Self {
        Token::Type(key)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Type(key) => f.write_str(key.name()),
            Token::Name(name) => write!(f, "\"{}\"", name),
            Token::Symbol(symbol) => write!(f, "{:?}", symbol),
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
