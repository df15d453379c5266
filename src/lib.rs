//! Asynchronous dependency injection with identity tokens, providers and composable modules.
//!
//! # Simple use case
//!
//! ```
//! # use std::sync::Arc;
//! # use izoka::*;
//! // Define traits and implementors
//! trait Handler: Send + Sync {
//!     fn handle(&self, name: &str) -> String;
//! }
//!
//! struct Greeter;
//!
//! impl Handler for Greeter {
//!     fn handle(&self, name: &str) -> String {
//!         format!("Hello, {}!", name)
//!     }
//! }
//!
//! # fn main() -> Result<(), WiringError> {
//! // Declare a token for the trait and an injectable type providing it
//! let handler: Token<Arc<dyn Handler>> = Token::multi("Handler");
//! Injectable::new(|_| Ok(Greeter))
//!     .provides_as(&handler, |g| Arc::new(g) as Arc<dyn Handler>)
//!     .register()?;
//!
//! // Create an injector and resolve the token
//! let injector = Injector::from_providers(providers![Class::of::<Greeter>()])?;
//! let handlers = futures::executor::block_on(injector.get_all::<Arc<dyn Handler>>(&handler))?;
//! assert_eq!(handlers[0].handle("world"), "Hello, world!");
//! # Ok(())
//! # }
//! ```
//!
//! # Mechanism
//!
//! A [Token] is an opaque identity standing for a type of value. It is either *unique*
//! (exactly one provider, resolves to a single value) or multi-valued (any number of
//! providers, resolves to the ordered sequence of their values).
//!
//! * A [Provider] targets a token, lists the tokens it requires and holds a resolver
//!   function building the value from the resolved requirements.
//! * The [Injectable] builder records how a type is constructed (constructor slots and
//!   fields to inject) and [build_provider_from_class] turns this record into a provider.
//! * The [Injector] groups providers by token, resolves requirements depth-first and
//!   caches the result: each token is resolved at most once per injector.
//! * A [Module] wraps an injector with a list of exported providers. Importing modules
//!   can resolve these exports, but the values are produced and cached by the exporting module.
//!
//! Circular dependencies are not detected: a provider requiring its own token
//! (directly or not) does not terminate.

mod helpers;
mod inject;
mod injectable;
mod module;
mod resolve;
mod symbol;

pub use helpers::value_provider;
pub use inject::{Injector, Provided, Subscription};
pub use injectable::{build_provider_from_class, Injectable, Injection};
pub use module::{Export, Module, ModuleBuilder, ModuleOptions};
pub use resolve::{
    make_async_provider, make_provider, BoxError, Dependencies, Providable, Provider, Resolved,
    Value, WiringError,
};
pub use symbol::{
    attach_token, create_token, derive_generic, lookup_token, Class, Identity, Symbol, Token,
    TokenLike,
};
