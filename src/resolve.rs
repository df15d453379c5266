//! Providers and the values they produce
//!
//! A [Provider] pairs a target token with the ordered list of tokens it requires and
//! a resolver function building the value from the resolved requirements.
//!
//! * The resolver receives the resolved requirements as [Dependencies], in the order of
//!   the `requires` list, and can be synchronous ([make_provider]) or asynchronous
//!   ([make_async_provider]).
//! * Produced values are type-erased as [Value] and handed back to callers as [Resolved]:
//!   a single value for unique tokens, an ordered sequence for multi-valued tokens.
//!
//! Providers are immutable and cheap to clone, clones share the same identity.

use std::any::{type_name, Any};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use thiserror::Error;

use crate::injectable::build_provider_from_class;
use crate::symbol::{Class, Symbol, Token};

/// Type-erased value produced by a provider
pub type Value = Arc<dyn Any + Send + Sync>;

/// Error type returned by user-defined resolver functions
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type Produced = BoxFuture<'static, Result<Value, WiringError>>;
type ResolverFn = dyn Fn(Dependencies) -> Produced + Send + Sync;

/// Errors triggered during the wiring and resolution process
#[derive(Error, Debug)]
pub enum WiringError {
    #[error("object is not token-like: no token attached to `{0}`")]
    NotTokenLike(&'static str),
    #[error("missing injection metadata for `{0}`")]
    MissingMetadata(&'static str),
    #[error("provider not found for `{0}`")]
    ProviderNotFound(Symbol),
    #[error("multiple providers loaded for unique token `{token}`: {}", .providers.len())]
    MultipleProvidersForUniqueToken {
        token: Symbol,
        providers: Vec<Provider>,
    },
    #[error("consistency error: `{class}` already carries the token `{existing}`")]
    AlreadyAttached { class: &'static str, existing: Symbol },
    #[error("consistency error: injection metadata for `{0}` is already registered")]
    AlreadyRegistered(&'static str),
    #[error("field `{field}` of `{class}` is injected more than once")]
    DuplicateField {
        class: &'static str,
        field: &'static str,
    },
    #[error("constructor slots of `{class}` do not cover slot {index}")]
    ConstructorSlotGap { class: &'static str, index: usize },
    #[error("resolved value is not a `{expected}`")]
    TypeMismatch { expected: &'static str },
    #[error("expected a single value, found a sequence of {0}")]
    UnexpectedCardinality(usize),
    #[error("no resolved dependency at position {0}")]
    MissingDependency(usize),
    #[error("provider for `{token}` failed")]
    ProviderFailed {
        token: Symbol,
        #[source]
        source: BoxError,
    },
}

impl WiringError {
    /// Wrap the failure of a user resolver, unless it is already a wiring error.
    pub(crate) fn from_resolver(token: &Symbol, error: BoxError) -> Self {
        match error.downcast::<WiringError>() {
            Ok(wiring) => *wiring,
            Err(source) => WiringError::ProviderFailed {
                token: token.clone(),
                source,
            },
        }
    }
}

/// Result of the resolution of a token
#[derive(Clone)]
pub enum Resolved {
    One(Value),
    Many(Arc<[Value]>),
}

impl Resolved {
    /// Downcast a single value
    pub fn one<T: Any + Send + Sync>(&self) -> Result<Arc<T>, WiringError> {
        match self {
            Resolved::One(v) => downcast(v),
            Resolved::Many(values) => Err(WiringError::UnexpectedCardinality(values.len())),
        }
    }

    /// Downcast all values. A single value is seen as a sequence of one.
    pub fn many<T: Any + Send + Sync>(&self) -> Result<Vec<Arc<T>>, WiringError> {
        self.values().iter().map(downcast).collect()
    }

    pub fn values(&self) -> &[Value] {
        match self {
            Resolved::One(v) => std::slice::from_ref(v),
            Resolved::Many(values) => values,
        }
    }

    pub fn len(&self) -> usize {
        self.values().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values().is_empty()
    }
}

impl fmt::Debug for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolved::One(_) => f.write_str("Resolved::One"),
            Resolved::Many(values) => write!(f, "Resolved::Many({})", values.len()),
        }
    }
}

fn downcast<T: Any + Send + Sync>(value: &Value) -> Result<Arc<T>, WiringError> {
    value.clone().downcast::<T>().map_err(|_| WiringError::TypeMismatch {
        expected: type_name::<T>(),
    })
}

/// Resolved requirements of a provider, in the order of its `requires` list
#[derive(Clone, Debug, Default)]
pub struct Dependencies(Vec<Resolved>);

impl Dependencies {
    pub fn new(resolved: Vec<Resolved>) -> Self {
        Self(resolved)
    }

    pub fn get(&self, index: usize) -> Result<&Resolved, WiringError> {
        self.0.get(index).ok_or(WiringError::MissingDependency(index))
    }

    pub fn one<T: Any + Send + Sync>(&self, index: usize) -> Result<Arc<T>, WiringError> {
        self.get(index)?.one()
    }

    pub fn many<T: Any + Send + Sync>(&self, index: usize) -> Result<Vec<Arc<T>>, WiringError> {
        self.get(index)?.many()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<Resolved> {
        self.0
    }
}

struct ProviderInner {
    id: u64,
    provide_to: Symbol,
    requires: Vec<Symbol>,
    resolver: Box<ResolverFn>,
}

/// Immutable descriptor of a factory for a token
#[derive(Clone)]
pub struct Provider(Arc<ProviderInner>);

impl Provider {
    /// Build a provider from an erased resolver function.
    ///
    /// This is the building block of all other constructors.
    pub fn erased<F>(provide_to: Symbol, requires: Vec<Symbol>, resolver: F) -> Self
    where
        F: Fn(Dependencies) -> Produced + Send + Sync + 'static,
    {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Provider(Arc::new(ProviderInner {
            id: NEXT.fetch_add(1, Ordering::Relaxed),
            provide_to,
            requires,
            resolver: Box::new(resolver),
        }))
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn provide_to(&self) -> &Symbol {
        &self.0.provide_to
    }

    pub fn requires(&self) -> &[Symbol] {
        &self.0.requires
    }

    pub fn ptr_eq(&self, other: &Provider) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Call the resolver function, without resolving anything
    pub(crate) fn invoke(&self, dependencies: Dependencies) -> Produced {
        (self.0.resolver)(dependencies)
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("id", &self.0.id)
            .field("provide_to", &self.0.provide_to)
            .field("requires", &self.0.requires)
            .finish_non_exhaustive()
    }
}

/// Create a provider from a synchronous resolver function
pub fn make_provider<T, F>(provide_to: &Token<T>, requires: Vec<Symbol>, resolver: F) -> Provider
where
    T: Any + Send + Sync,
    F: Fn(Dependencies) -> Result<T, BoxError> + Send + Sync + 'static,
{
    let token = provide_to.symbol();
    Provider::erased(provide_to.symbol(), requires, move |deps| {
        let produced = resolver(deps)
            .map(|v| Arc::new(v) as Value)
            .map_err(|e| WiringError::from_resolver(&token, e));
        future::ready(produced).boxed()
    })
}

/// Create a provider from an asynchronous resolver function
pub fn make_async_provider<T, F, Fut>(
    provide_to: &Token<T>,
    requires: Vec<Symbol>,
    resolver: F,
) -> Provider
where
    T: Any + Send + Sync,
    F: Fn(Dependencies) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
{
    let token = provide_to.symbol();
    Provider::erased(provide_to.symbol(), requires, move |deps| {
        let token = token.clone();
        resolver(deps)
            .map(move |produced| {
                produced
                    .map(|v| Arc::new(v) as Value)
                    .map_err(|e| WiringError::from_resolver(&token, e))
            })
            .boxed()
    })
}

/// Anything that can be registered in an injector: a provider or an injectable class
#[derive(Clone, Debug)]
pub enum Providable {
    Provider(Provider),
    Class(Class),
}

impl Providable {
    pub fn into_provider(self) -> Result<Provider, WiringError> {
        match self {
            Providable::Provider(p) => Ok(p),
            Providable::Class(c) => build_provider_from_class(c),
        }
    }
}

impl From<Provider> for Providable {
    fn from(provider: Provider) -> Self {
        Providable::Provider(provider)
    }
}

impl From<&Provider> for Providable {
    fn from(provider: &Provider) -> Self {
        Providable::Provider(provider.clone())
    }
}

impl From<Class> for Providable {
    fn from(class: Class) -> Self {
        Providable::Class(class)
    }
}
