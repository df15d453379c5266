//! Identity tokens standing in for injectable types
//!
//! A [Symbol] is an opaque key: two symbols are equal when their [Identity] is equal,
//! the name is only used for diagnostics. [Token] adds the type of the provided value
//! on top of a symbol, and [TokenLike] accepts either a symbol or a [Class] that
//! carries an attached symbol.

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use once_cell::sync::Lazy;

use crate::WiringError;

/// Opaque identity of a token
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Identity {
    Opaque(u64),
    Type(TypeId),
}

impl Identity {
    /// A process-unique identity, never equal to any other fresh identity
    pub fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Identity::Opaque(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn of<T: ?Sized + 'static>() -> Self {
        Identity::Type(TypeId::of::<T>())
    }
}

/// Key of a generic instantiation: the exact identity of the parameter
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum GenericKey {
    Symbol(Identity),
    Class(TypeId),
}

static GENERICS: Lazy<Mutex<HashMap<(Identity, GenericKey), Symbol>>> = Lazy::new(Mutex::default);

struct SymbolInner {
    identity: Identity,
    name: Option<String>,
    is_unique: bool,
}

/// Untyped token, used as registry and cache key
#[derive(Clone)]
pub struct Symbol(Arc<SymbolInner>);

impl Symbol {
    pub fn new(name: Option<&str>, identity: Option<Identity>, is_unique: bool) -> Self {
        Symbol(Arc::new(SymbolInner {
            identity: identity.unwrap_or_else(Identity::fresh),
            name: name.map(str::to_owned),
            is_unique,
        }))
    }

    /// The unique token minted for an injectable type without an explicit token
    pub fn for_class<T: 'static>() -> Self {
        Symbol::new(Some(type_name::<T>()), Some(Identity::of::<T>()), true)
    }

    pub fn identity(&self) -> Identity {
        self.0.identity
    }

    pub fn name(&self) -> Option<&str> {
        self.0.name.as_deref()
    }

    pub fn is_unique(&self) -> bool {
        self.0.is_unique
    }

    /// Obtain the token of this symbol instantiated with a parameter.
    ///
    /// The derived symbol is memoized on the identity of the base and the exact identity
    /// of the parameter: asking twice for the same pair returns the same symbol, even
    /// through distinct handles sharing an identity.
    /// The `is_unique` flag only applies when the derived symbol is first created.
    pub fn generic(&self, param: &TokenLike, is_unique: bool) -> Symbol {
        let key = match param {
            TokenLike::Symbol(s) => GenericKey::Symbol(s.identity()),
            TokenLike::Class(c) => GenericKey::Class(c.type_id()),
        };
        let mut generics = GENERICS.lock().unwrap_or_else(PoisonError::into_inner);
        generics
            .entry((self.identity(), key))
            .or_insert_with(|| {
                let name = format!("{}<{}>", self, param);
                Symbol::new(Some(&name), None, is_unique)
            })
            .clone()
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.0.identity == other.0.identity
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.identity.hash(state);
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name().unwrap_or("<unknown>"))
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Symbol")
            .field("name", &self.name())
            .field("identity", &self.0.identity)
            .field("is_unique", &self.0.is_unique)
            .finish()
    }
}

/// Symbol standing for a value of type `T`
pub struct Token<T> {
    symbol: Symbol,
    _provided: PhantomData<fn() -> T>,
}

impl<T> Token<T> {
    pub fn from_symbol(symbol: Symbol) -> Self {
        Token {
            symbol,
            _provided: PhantomData,
        }
    }

    /// A token accepting a single provider
    pub fn unique(name: &str) -> Self {
        create_token(Some(name), None, true)
    }

    /// A token accepting any number of providers, resolved as a sequence
    pub fn multi(name: &str) -> Self {
        create_token(Some(name), None, false)
    }

    pub fn symbol(&self) -> Symbol {
        self.symbol.clone()
    }

    /// Typed version of [derive_generic]
    pub fn generic<R>(&self, param: impl Into<TokenLike>, is_unique: bool) -> Token<R> {
        Token::from_symbol(self.symbol.generic(&param.into(), is_unique))
    }
}

impl<T> Clone for Token<T> {
    fn clone(&self) -> Self {
        Token::from_symbol(self.symbol.clone())
    }
}

impl<T> Deref for Token<T> {
    type Target = Symbol;

    fn deref(&self) -> &Symbol {
        &self.symbol
    }
}

impl<T> PartialEq for Token<T> {
    fn eq(&self, other: &Self) -> bool {
        self.symbol == other.symbol
    }
}

impl<T> Eq for Token<T> {}

impl<T> fmt::Debug for Token<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Token").field(&self.symbol).finish()
    }
}

impl<T> From<Token<T>> for Symbol {
    fn from(token: Token<T>) -> Self {
        token.symbol
    }
}

impl<T> From<&Token<T>> for Symbol {
    fn from(token: &Token<T>) -> Self {
        token.symbol.clone()
    }
}

/// Reference to an injectable type, used as key of the side tables
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Class {
    id: TypeId,
    name: &'static str,
}

impl Class {
    pub fn of<T: 'static>() -> Self {
        Class {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Either a symbol or a class with an attached symbol
#[derive(Clone, Debug)]
pub enum TokenLike {
    Symbol(Symbol),
    Class(Class),
}

impl TokenLike {
    /// Normalize into a concrete symbol
    pub fn to_symbol(&self) -> Result<Symbol, WiringError> {
        match self {
            TokenLike::Symbol(s) => Ok(s.clone()),
            TokenLike::Class(c) => lookup_token(*c).ok_or(WiringError::NotTokenLike(c.name())),
        }
    }
}

impl fmt::Display for TokenLike {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenLike::Symbol(s) => fmt::Display::fmt(s, f),
            TokenLike::Class(c) => fmt::Display::fmt(c, f),
        }
    }
}

impl From<Symbol> for TokenLike {
    fn from(symbol: Symbol) -> Self {
        TokenLike::Symbol(symbol)
    }
}

impl From<&Symbol> for TokenLike {
    fn from(symbol: &Symbol) -> Self {
        TokenLike::Symbol(symbol.clone())
    }
}

impl<T> From<Token<T>> for TokenLike {
    fn from(token: Token<T>) -> Self {
        TokenLike::Symbol(token.symbol)
    }
}

impl<T> From<&Token<T>> for TokenLike {
    fn from(token: &Token<T>) -> Self {
        TokenLike::Symbol(token.symbol())
    }
}

impl From<Class> for TokenLike {
    fn from(class: Class) -> Self {
        TokenLike::Class(class)
    }
}

/// Create a new token. Without an explicit identity, the token gets a fresh one.
pub fn create_token<T>(
    name: Option<&str>,
    identity: Option<Identity>,
    is_unique: bool,
) -> Token<T> {
    Token::from_symbol(Symbol::new(name, identity, is_unique))
}

/// Obtain the token of `base` instantiated with `param`.
///
/// Fails if `base` is a class without an attached token.
pub fn derive_generic(
    base: impl Into<TokenLike>,
    param: impl Into<TokenLike>,
    is_unique: bool,
) -> Result<Symbol, WiringError> {
    let base = base.into().to_symbol()?;
    Ok(base.generic(&param.into(), is_unique))
}

static ATTACHED: Lazy<RwLock<HashMap<Class, Symbol>>> = Lazy::new(RwLock::default);

/// Associate a token with a class. A class can only carry one token.
pub fn attach_token(target: Class, symbol: &Symbol) -> Result<(), WiringError> {
    let mut attached = ATTACHED.write().unwrap_or_else(PoisonError::into_inner);
    match attached.get(&target) {
        Some(existing) if existing == symbol => Ok(()),
        Some(existing) => Err(WiringError::AlreadyAttached {
            class: target.name(),
            existing: existing.clone(),
        }),
        None => {
            attached.insert(target, symbol.clone());
            Ok(())
        }
    }
}

pub fn lookup_token(target: Class) -> Option<Symbol> {
    ATTACHED
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&target)
        .cloned()
}
