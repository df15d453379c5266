use std::any::Any;

use crate::{make_provider, Provider, Token};

/// Generic clone-based provider, producing a copy of a constant value
pub fn value_provider<T: Any + Clone + Send + Sync>(provide_to: &Token<T>, value: T) -> Provider {
    make_provider(provide_to, Vec::new(), move |_| Ok(value.clone()))
}

/// Build a list of [Providable](crate::Providable) from providers and classes.
///
/// ```
/// # use izoka::*;
/// let port: Token<u16> = Token::unique("port");
/// let injector = Injector::from_providers(providers![value_provider(&port, 8080)]).unwrap();
/// # assert_eq!(injector.providers_for(&port).unwrap().len(), 1);
/// ```
#[macro_export]
macro_rules! providers {
    ($($providable: expr),* $(,)?) => {
        vec![$($crate::Providable::from($providable)),*]
    };
}
