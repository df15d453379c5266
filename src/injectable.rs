//! Injection records attached to injectable types
//!
//! The [Injectable] builder declares how a type is constructed: which token it provides,
//! which constructor slots and which fields receive which resolved token.
//! [Injectable::register] stores the record in a side table keyed by the [Class] of the type
//! and attaches the provided token to the class.
//! [build_provider_from_class] then turns a record into a [Provider], once per class.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use futures::future::{self, FutureExt};
use once_cell::sync::Lazy;

use crate::resolve::{BoxError, Dependencies, Provider, Resolved, Value, WiringError};
use crate::symbol::{attach_token, Class, Symbol, Token, TokenLike};

/// A single entry of an injection record
#[derive(Clone, Debug)]
pub enum Injection {
    /// Positional argument of the constructor
    ConstructorSlot { index: usize, token: TokenLike },
    /// Property assigned after construction
    Field { name: &'static str, token: TokenLike },
}

impl Injection {
    pub fn token(&self) -> &TokenLike {
        match self {
            Injection::ConstructorSlot { token, .. } | Injection::Field { token, .. } => token,
        }
    }
}

type Constructor<T> = dyn Fn(Dependencies) -> Result<T, BoxError> + Send + Sync;
type Setter<T> = dyn Fn(&mut T, &Resolved) -> Result<(), BoxError> + Send + Sync;
type Upcast<T> = dyn Fn(T) -> Value + Send + Sync;
type Build = dyn Fn(Vec<Resolved>) -> Result<Value, BoxError> + Send + Sync;

/// Type-erased injection record
struct ClassRecord {
    token: Symbol,
    injections: Vec<Injection>,
    build: Box<Build>,
}

static RECORDS: Lazy<RwLock<HashMap<Class, Arc<ClassRecord>>>> = Lazy::new(RwLock::default);
static PROVIDERS: Lazy<Mutex<HashMap<Class, Provider>>> = Lazy::new(Mutex::default);

/// Declare an injectable type.
///
/// ```
/// # use izoka::*;
/// struct Greeting(String);
///
/// let token = Injectable::new(|_| Ok(Greeting("Hello".into())))
///     .register()
///     .unwrap();
/// assert_eq!(lookup_token(Class::of::<Greeting>()), Some(token.symbol()));
/// ```
pub struct Injectable<T> {
    token: Option<Symbol>,
    upcast: Box<Upcast<T>>,
    constructor: Box<Constructor<T>>,
    injections: Vec<Injection>,
    setters: HashMap<&'static str, Box<Setter<T>>>,
}

impl<T: Any + Send + Sync> Injectable<T> {
    /// The constructor receives the values of the constructor slots: `Dependencies`
    /// position `i` holds the value injected in slot `i`.
    pub fn new<F>(constructor: F) -> Self
    where
        F: Fn(Dependencies) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Self {
            token: None,
            upcast: Box::new(|instance: T| Arc::new(instance) as Value),
            constructor: Box::new(constructor),
            injections: Vec::new(),
            setters: HashMap::new(),
        }
    }

    /// Provide instances under an explicit token
    pub fn provides(mut self, token: &Token<T>) -> Self {
        self.token = Some(token.symbol());
        self
    }

    /// Provide instances under the token of another type, usually a trait object
    pub fn provides_as<U, F>(mut self, token: &Token<U>, upcast: F) -> Self
    where
        U: Any + Send + Sync,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        self.token = Some(token.symbol());
        self.upcast = Box::new(move |instance: T| Arc::new(upcast(instance)) as Value);
        self
    }

    /// Inject a token in a constructor slot.
    ///
    /// Slots must cover `0..n` without gaps once all of them are declared.
    pub fn inject(mut self, index: usize, token: impl Into<TokenLike>) -> Self {
        self.injections.push(Injection::ConstructorSlot {
            index,
            token: token.into(),
        });
        self
    }

    /// Inject a token in a field, assigned by `setter` once the instance is constructed.
    ///
    /// A field name can only be injected once.
    pub fn field<F>(mut self, name: &'static str, token: impl Into<TokenLike>, setter: F) -> Self
    where
        F: Fn(&mut T, &Resolved) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.injections.push(Injection::Field {
            name,
            token: token.into(),
        });
        self.setters.insert(name, Box::new(setter));
        self
    }

    /// Store the injection record of `T` and attach its token to the class.
    ///
    /// Without an explicit token, a unique token identified by the type itself is used.
    /// Fails on a field injected twice or on a gap in the constructor slots.
    pub fn register(self) -> Result<Token<T>, WiringError> {
        let Injectable {
            token,
            upcast,
            constructor,
            injections,
            mut setters,
        } = self;
        let class = Class::of::<T>();
        let token = token.unwrap_or_else(Symbol::for_class::<T>);

        let mut slots: Vec<(usize, usize)> = Vec::new();
        let mut fields: Vec<(usize, Box<Setter<T>>)> = Vec::new();
        for (position, injection) in injections.iter().enumerate() {
            match injection {
                Injection::ConstructorSlot { index, .. } => slots.push((*index, position)),
                Injection::Field { name, .. } => match setters.remove(name) {
                    Some(setter) => fields.push((position, setter)),
                    None => {
                        return Err(WiringError::DuplicateField {
                            class: class.name(),
                            field: *name,
                        })
                    }
                },
            }
        }
        slots.sort_by_key(|(index, _)| *index);
        // Slot indices are constructor argument positions: 0, 1, 2...
        if let Some(rank) = slots.iter().enumerate().position(|(rank, (index, _))| rank != *index) {
            return Err(WiringError::ConstructorSlotGap {
                class: class.name(),
                index: rank,
            });
        }

        let mut records = RECORDS.write().unwrap_or_else(PoisonError::into_inner);
        if records.contains_key(&class) {
            return Err(WiringError::AlreadyRegistered(class.name()));
        }
        attach_token(class, &token)?;

        let build = move |resolved: Vec<Resolved>| -> Result<Value, BoxError> {
            let take = |position: usize| {
                resolved
                    .get(position)
                    .ok_or(WiringError::MissingDependency(position))
            };
            let arguments = slots
                .iter()
                .map(|(_, position)| take(*position).cloned())
                .collect::<Result<Vec<_>, _>>()?;
            let mut instance = constructor(Dependencies::new(arguments))?;
            for (position, setter) in &fields {
                setter(&mut instance, take(*position)?)?;
            }
            Ok(upcast(instance))
        };

        records.insert(
            class,
            Arc::new(ClassRecord {
                token: token.clone(),
                injections,
                build: Box::new(build),
            }),
        );
        Ok(Token::from_symbol(token))
    }
}

/// Obtain the provider of an injectable class.
///
/// The provider is built once per class: further calls return the same provider.
pub fn build_provider_from_class(class: Class) -> Result<Provider, WiringError> {
    if let Some(provider) = PROVIDERS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&class)
    {
        return Ok(provider.clone());
    }

    let record = RECORDS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&class)
        .cloned()
        .ok_or(WiringError::MissingMetadata(class.name()))?;

    let requires = record
        .injections
        .iter()
        .map(|injection| injection.token().to_symbol())
        .collect::<Result<Vec<_>, _>>()?;

    let token = record.token.clone();
    let provider = Provider::erased(token.clone(), requires, move |deps| {
        let produced =
            (record.build)(deps.into_inner()).map_err(|e| WiringError::from_resolver(&token, e));
        future::ready(produced).boxed()
    });

    let mut providers = PROVIDERS.lock().unwrap_or_else(PoisonError::into_inner);
    Ok(providers.entry(class).or_insert(provider).clone())
}
