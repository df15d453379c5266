use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, trace};

use crate::*;

/// Notification sent after a provider produced a value
#[derive(Clone)]
pub struct Provided {
    pub provider: Provider,
    pub value: Value,
}

type Observer = Arc<dyn Fn(&Provided) + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

#[derive(Default)]
struct Observers {
    next: AtomicU64,
    list: RwLock<Vec<(u64, Observer)>>,
}

impl Observers {
    fn subscribe(&self, observer: Observer) -> Subscription {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        self.list
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, observer));
        Subscription(id)
    }

    fn unsubscribe(&self, subscription: Subscription) -> bool {
        let mut list = self.list.write().unwrap_or_else(PoisonError::into_inner);
        let before = list.len();
        list.retain(|(id, _)| *id != subscription.0);
        list.len() != before
    }

    fn notify(&self, event: &Provided) {
        // Observers may subscribe from their callback: call them outside of the lock
        let observers: Vec<Observer> = self
            .list
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, o)| o.clone())
            .collect();
        for observer in observers {
            observer(event);
        }
    }
}

/// Providers grouped by target token, in registration order
#[derive(Default)]
pub(crate) struct Registry(HashMap<Symbol, Vec<Provider>>);

impl Registry {
    pub(crate) fn append(&mut self, provider: Provider) {
        self.0
            .entry(provider.provide_to().clone())
            .or_default()
            .push(provider);
    }

    pub(crate) fn append_providable(
        &mut self,
        providable: impl Into<Providable>,
    ) -> Result<(), WiringError> {
        self.append(providable.into().into_provider()?);
        Ok(())
    }

    pub(crate) fn bucket(&self, token: &Symbol) -> &[Provider] {
        self.0.get(token).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Asynchronous resolution engine.
///
/// The injector owns the registered providers and caches resolved values:
/// each token is resolved at most once for the lifetime of the injector.
///
/// Resolving the same token concurrently before it is cached is not guarded:
/// both resolutions may invoke the providers and the last one is kept in the cache.
pub struct Injector {
    registry: Registry,
    cache: Mutex<HashMap<Symbol, Resolved>>,
    observers: Observers,
}

impl Injector {
    pub(crate) fn new(registry: Registry) -> Self {
        Self {
            registry,
            cache: Mutex::default(),
            observers: Observers::default(),
        }
    }

    /// Build an injector from providers and injectable classes.
    ///
    /// Providers of the same token are kept in the order of the list.
    pub fn from_providers<I>(providers: I) -> Result<Self, WiringError>
    where
        I: IntoIterator,
        I::Item: Into<Providable>,
    {
        let mut registry = Registry::default();
        for providable in providers {
            registry.append_providable(providable)?;
        }
        debug!(tokens = registry.0.len(), "injector ready");
        Ok(Self::new(registry))
    }

    /// Providers registered for a token, in registration order
    pub fn providers_for(&self, token: impl Into<TokenLike>) -> Result<&[Provider], WiringError> {
        Ok(self.registry.bucket(&token.into().to_symbol()?))
    }

    /// Resolve a token, invoking the required providers on first use.
    pub async fn resolve(&self, token: impl Into<TokenLike>) -> Result<Resolved, WiringError> {
        let symbol = token.into().to_symbol()?;
        self.resolve_symbol(symbol).await
    }

    /// Resolve a token expected to provide a single value
    pub async fn get<T: Any + Send + Sync>(
        &self,
        token: impl Into<TokenLike>,
    ) -> Result<Arc<T>, WiringError> {
        self.resolve(token).await?.one()
    }

    /// Resolve all values provided for a token
    pub async fn get_all<T: Any + Send + Sync>(
        &self,
        token: impl Into<TokenLike>,
    ) -> Result<Vec<Arc<T>>, WiringError> {
        self.resolve(token).await?.many()
    }

    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&Provided) + Send + Sync + 'static,
    {
        self.observers.subscribe(Arc::new(observer))
    }

    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        self.observers.unsubscribe(subscription)
    }

    fn cached(&self, symbol: &Symbol) -> Option<Resolved> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(symbol)
            .cloned()
    }

    fn resolve_symbol(&self, symbol: Symbol) -> BoxFuture<'_, Result<Resolved, WiringError>> {
        async move {
            if let Some(resolved) = self.cached(&symbol) {
                trace!(token = %symbol, "cache hit");
                return Ok(resolved);
            }

            let providers = self.registry.bucket(&symbol);
            if providers.is_empty() {
                return Err(WiringError::ProviderNotFound(symbol));
            }
            if symbol.is_unique() && providers.len() > 1 {
                return Err(WiringError::MultipleProvidersForUniqueToken {
                    token: symbol,
                    providers: providers.to_vec(),
                });
            }

            let resolved = if symbol.is_unique() || providers.len() == 1 {
                Resolved::One(self.resolve_provider(&providers[0]).await?)
            } else {
                let mut values = Vec::with_capacity(providers.len());
                for provider in providers {
                    values.push(self.resolve_provider(provider).await?);
                }
                Resolved::Many(values.into())
            };

            self.cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(symbol, resolved.clone());
            Ok(resolved)
        }
        .boxed()
    }

    /// Resolve the requirements of a single provider in this injector, then invoke it.
    ///
    /// The provider is invoked on every call: only tokens are cached.
    pub(crate) fn resolve_provider<'a>(
        &'a self,
        provider: &'a Provider,
    ) -> BoxFuture<'a, Result<Value, WiringError>> {
        async move {
            // Depth-first: each requirement is fully resolved before the next one
            let mut requires = Vec::with_capacity(provider.requires().len());
            for token in provider.requires() {
                requires.push(self.resolve_symbol(token.clone()).await?);
            }

            let value = provider.invoke(Dependencies::new(requires)).await?;
            debug!(token = %provider.provide_to(), provider = provider.id(), "provided");

            self.observers.notify(&Provided {
                provider: provider.clone(),
                value: value.clone(),
            });
            Ok(value)
        }
        .boxed()
    }
}
