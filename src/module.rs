//! Composition of injectors through explicit import/export boundaries
//!
//! A [Module] owns its own [Injector] and cache. Importing a module gives access to
//! its exported providers, wrapped so that each value is still produced and cached
//! inside the exporting module: importers share the value instead of recomputing it.

use std::any::Any;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::FutureExt;
use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use crate::inject::Registry;
use crate::*;

/// Entry of the export list of a module
#[derive(Clone, Debug)]
pub enum Export {
    Provider(Provider),
    Class(Class),
    /// All providers registered in the module for this token
    Token(Symbol),
}

impl From<Provider> for Export {
    fn from(provider: Provider) -> Self {
        Export::Provider(provider)
    }
}

impl From<&Provider> for Export {
    fn from(provider: &Provider) -> Self {
        Export::Provider(provider.clone())
    }
}

impl From<Class> for Export {
    fn from(class: Class) -> Self {
        Export::Class(class)
    }
}

impl From<Symbol> for Export {
    fn from(symbol: Symbol) -> Self {
        Export::Token(symbol)
    }
}

impl<T> From<&Token<T>> for Export {
    fn from(token: &Token<T>) -> Self {
        Export::Token(token.symbol())
    }
}

/// Description of a module
#[derive(Clone, Default)]
pub struct ModuleOptions {
    pub imports: Vec<Module>,
    pub providers: Vec<Providable>,
    pub exports: Vec<Export>,
}

/// Builder for [ModuleOptions]
#[derive(Default)]
pub struct ModuleBuilder {
    options: ModuleOptions,
}

impl ModuleBuilder {
    pub fn import(mut self, module: &Module) -> Self {
        self.options.imports.push(module.clone());
        self
    }

    pub fn provide(mut self, providable: impl Into<Providable>) -> Self {
        self.options.providers.push(providable.into());
        self
    }

    pub fn export(mut self, export: impl Into<Export>) -> Self {
        self.options.exports.push(export.into());
        self
    }

    pub fn build(self) -> Result<Module, WiringError> {
        Module::from_options(self.options)
    }
}

struct ModuleInner {
    injector: Arc<Injector>,
    exported: Vec<Provider>,
    wrapped: OnceCell<Vec<Provider>>,
}

/// Injector with an explicit set of exported providers.
///
/// Cloning a module gives another handle on the same injector and cache.
#[derive(Clone)]
pub struct Module(Arc<ModuleInner>);

impl Module {
    pub fn builder() -> ModuleBuilder {
        ModuleBuilder::default()
    }

    /// Build a module.
    ///
    /// The exported providers of the imports are registered first,
    /// then the providers of the module itself.
    /// Token exports are expanded to the providers registered at this point.
    pub fn from_options(options: ModuleOptions) -> Result<Self, WiringError> {
        let ModuleOptions {
            imports,
            providers,
            exports,
        } = options;

        let mut registry = Registry::default();
        for module in &imports {
            for provider in module.exported_providers() {
                registry.append(provider.clone());
            }
        }
        for providable in providers {
            registry.append_providable(providable)?;
        }

        let mut seen = HashSet::new();
        let mut exported = Vec::new();
        let mut add = |provider: Provider| {
            if seen.insert(provider.id()) {
                exported.push(provider);
            }
        };
        for export in exports {
            match export {
                Export::Provider(p) => add(p),
                Export::Class(c) => add(build_provider_from_class(c)?),
                Export::Token(t) => {
                    let bucket = registry.bucket(&t);
                    if bucket.is_empty() {
                        warn!(token = %t, "exported token has no provider");
                    }
                    bucket.iter().cloned().for_each(&mut add);
                }
            }
        }

        debug!(
            imports = imports.len(),
            exports = exported.len(),
            "module ready"
        );
        Ok(Module(Arc::new(ModuleInner {
            injector: Arc::new(Injector::new(registry)),
            exported,
            wrapped: OnceCell::new(),
        })))
    }

    pub fn injector(&self) -> &Injector {
        &self.0.injector
    }

    pub async fn resolve(&self, token: impl Into<TokenLike>) -> Result<Resolved, WiringError> {
        self.0.injector.resolve(token).await
    }

    pub async fn get<T: Any + Send + Sync>(
        &self,
        token: impl Into<TokenLike>,
    ) -> Result<Arc<T>, WiringError> {
        self.0.injector.get(token).await
    }

    pub async fn get_all<T: Any + Send + Sync>(
        &self,
        token: impl Into<TokenLike>,
    ) -> Result<Vec<Arc<T>>, WiringError> {
        self.0.injector.get_all(token).await
    }

    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&Provided) + Send + Sync + 'static,
    {
        self.0.injector.subscribe(observer)
    }

    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        self.0.injector.unsubscribe(subscription)
    }

    /// Providers visible to importers.
    ///
    /// Each exported provider is wrapped in a provider without requirements which
    /// resolves the original one inside this module. The wrappers are built once,
    /// and each wrapper keeps the first value produced successfully: all importers
    /// share it. A failed production is not kept and is retried on the next call.
    pub fn exported_providers(&self) -> &[Provider] {
        self.0.wrapped.get_or_init(|| {
            self.0
                .exported
                .iter()
                .map(|exported| {
                    let injector = self.0.injector.clone();
                    let exported = exported.clone();
                    let memo: Arc<Mutex<Option<Value>>> = Arc::default();
                    Provider::erased(exported.provide_to().clone(), Vec::new(), move |_| {
                        let injector = injector.clone();
                        let exported = exported.clone();
                        let memo = memo.clone();
                        async move {
                            let kept = memo.lock().unwrap_or_else(PoisonError::into_inner).clone();
                            if let Some(value) = kept {
                                return Ok(value);
                            }
                            let value = injector.resolve_provider(&exported).await?;
                            *memo.lock().unwrap_or_else(PoisonError::into_inner) =
                                Some(value.clone());
                            Ok(value)
                        }
                        .boxed()
                    })
                })
                .collect()
        })
    }
}

impl TryFrom<ModuleOptions> for Module {
    type Error = WiringError;

    fn try_from(options: ModuleOptions) -> Result<Self, Self::Error> {
        Module::from_options(options)
    }
}
