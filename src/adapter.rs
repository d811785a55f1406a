//! Adapter Registry
//!
//! Adapters turn application values into storable [`Value`]s when they are
//! bound as parameters. Converters go the other way: they turn a stored value
//! back into an application type, selected by the first word of the column's
//! declared type.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{BoxError, Error, Result};
use crate::storage::Value;

type Adapter = Arc<dyn Fn(&dyn Any) -> Value + Send + Sync>;
type Converter =
    Arc<dyn Fn(&Value) -> std::result::Result<Box<dyn Any>, BoxError> + Send + Sync>;

/// Registry of adapters (type → Value) and converters (declared type → type)
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<TypeId, Adapter>,
    converters: HashMap<String, (TypeId, Converter)>,
}

impl AdapterRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the adapter for `T`
    pub fn register_adapter<T, F>(&mut self, adapter: F)
    where
        T: Any,
        F: Fn(&T) -> Value + Send + Sync + 'static,
    {
        let erased: Adapter = Arc::new(move |obj: &dyn Any| match obj.downcast_ref::<T>() {
            Some(obj) => adapter(obj),
            // Keyed by TypeId, so the downcast cannot fail
            None => Value::Null,
        });
        self.adapters.insert(TypeId::of::<T>(), erased);
    }

    /// Remove the adapter for `T`; returns whether one existed
    pub fn remove_adapter<T: Any>(&mut self) -> bool {
        self.adapters.remove(&TypeId::of::<T>()).is_some()
    }

    /// Adapt an application object into a value
    pub fn adapt(&self, obj: &dyn Any, type_name: &str) -> Result<Value> {
        match self.adapters.get(&obj.type_id()) {
            Some(adapter) => Ok(adapter(obj)),
            None => Err(Error::Adaptation(format!(
                "no adapter registered for type {}",
                type_name
            ))),
        }
    }

    /// Register (or replace) the converter for a declared type.
    ///
    /// Only the first word of `declared_type` is significant and matching
    /// ignores case, so `"timestamp"` also serves `TIMESTAMP WITH TIME ZONE`.
    pub fn register_converter<T, F>(&mut self, declared_type: &str, converter: F)
    where
        T: Any,
        F: Fn(&Value) -> std::result::Result<T, BoxError> + Send + Sync + 'static,
    {
        let erased: Converter =
            Arc::new(move |value: &Value| converter(value).map(|v| Box::new(v) as Box<dyn Any>));
        self.converters
            .insert(converter_key(declared_type), (TypeId::of::<T>(), erased));
    }

    /// Remove the converter for a declared type; returns whether one existed
    pub fn remove_converter(&mut self, declared_type: &str) -> bool {
        self.converters.remove(&converter_key(declared_type)).is_some()
    }

    /// Whether a converter exists for the declared type
    pub fn has_converter(&self, declared_type: &str) -> bool {
        self.converters.contains_key(&converter_key(declared_type))
    }

    /// Convert a value using the converter registered for `declared_type`
    pub fn convert<T: Any>(&self, declared_type: Option<&str>, value: &Value) -> Result<T> {
        let Some(declared) = declared_type else {
            return Err(Error::Adaptation(
                "column has no declared type to select a converter".to_string(),
            ));
        };
        let key = converter_key(declared);
        let Some((target, converter)) = self.converters.get(&key) else {
            return Err(Error::Adaptation(format!(
                "no converter registered for declared type {}",
                key
            )));
        };
        if *target != TypeId::of::<T>() {
            return Err(Error::Adaptation(format!(
                "converter for {} does not produce {}",
                key,
                type_name::<T>()
            )));
        }

        let converted = converter(value)
            .map_err(|e| Error::Adaptation(format!("converter for {} failed: {}", key, e)))?;
        converted
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| Error::Adaptation(format!("converter for {} returned the wrong type", key)))
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut converters: Vec<&String> = self.converters.keys().collect();
        converters.sort();
        f.debug_struct("AdapterRegistry")
            .field("adapters", &self.adapters.len())
            .field("converters", &converters)
            .finish()
    }
}

/// First word of a declared type, lowercased
fn converter_key(declared_type: &str) -> String {
    declared_type
        .trim()
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or("")
        .to_lowercase()
}

// ========== Parameters ==========

/// A single statement parameter
#[derive(Clone)]
pub enum Param {
    /// A value bound as-is
    Value(Value),
    /// An application object, adapted through the registry at bind time
    Object {
        object: Arc<dyn Any + Send + Sync>,
        type_name: &'static str,
    },
}

impl Param {
    /// Wrap an application object that needs a registered adapter
    pub fn adapt<T: Any + Send + Sync>(object: T) -> Self {
        Param::Object {
            object: Arc::new(object),
            type_name: type_name::<T>(),
        }
    }

    /// Resolve this parameter into a storable value
    pub fn resolve(&self, adapters: &AdapterRegistry) -> Result<Value> {
        match self {
            Param::Value(value) => Ok(value.clone()),
            Param::Object { object, type_name } => adapters.adapt(object.as_ref(), type_name),
        }
    }
}

impl fmt::Debug for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Value(value) => write!(f, "{:?}", value),
            Param::Object { type_name, .. } => write!(f, "<{}>", type_name),
        }
    }
}

macro_rules! param_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Param {
                fn from(v: $ty) -> Self {
                    Param::Value(Value::from(v))
                }
            }
        )*
    };
}

param_from!(bool, i32, i64, u32, f64, String, &str, Vec<u8>, &[u8]);

impl From<Value> for Param {
    fn from(v: Value) -> Self {
        Param::Value(v)
    }
}

impl From<&String> for Param {
    fn from(v: &String) -> Self {
        Param::Value(Value::Text(v.clone()))
    }
}

impl<T: Into<Value>> From<Option<T>> for Param {
    fn from(v: Option<T>) -> Self {
        Param::Value(v.map_or(Value::Null, Into::into))
    }
}

/// Parameters supplied with a statement
#[derive(Debug, Clone, Default)]
pub enum Params {
    /// No parameters
    #[default]
    None,
    /// Values for `?` placeholders, in order
    Positional(Vec<Param>),
    /// Values for `:name` placeholders, keyed by name without the colon
    Named(IndexMap<String, Param>),
}

impl Params {
    /// Number of supplied parameters
    pub fn len(&self) -> usize {
        match self {
            Params::None => 0,
            Params::Positional(values) => values.len(),
            Params::Named(values) => values.len(),
        }
    }

    /// Whether no parameters were supplied
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<()> for Params {
    fn from(_: ()) -> Self {
        Params::None
    }
}

impl<T: Into<Param>> From<Vec<T>> for Params {
    fn from(values: Vec<T>) -> Self {
        Params::Positional(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Param>, const N: usize> From<[T; N]> for Params {
    fn from(values: [T; N]) -> Self {
        Params::Positional(values.into_iter().map(Into::into).collect())
    }
}

impl<K: Into<String>, T: Into<Param>> From<IndexMap<K, T>> for Params {
    fn from(values: IndexMap<K, T>) -> Self {
        Params::Named(
            values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Build positional parameters from heterogeneous values
///
/// ```
/// use pebblesql::params;
/// let p = params![1, "two", 3.0, None::<i64>];
/// assert_eq!(p.len(), 4);
/// ```
#[macro_export]
macro_rules! params {
    () => {
        $crate::Params::Positional(::std::vec::Vec::new())
    };
    ($($value:expr),+ $(,)?) => {
        $crate::Params::Positional(::std::vec![$($crate::Param::from($value)),+])
    };
}

/// Build named parameters
///
/// ```
/// use pebblesql::named_params;
/// let p = named_params! { "who" => "Yeltsin", "age" => 72 };
/// assert_eq!(p.len(), 2);
/// ```
#[macro_export]
macro_rules! named_params {
    ($($name:expr => $value:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut map = $crate::indexmap::IndexMap::new();
        $(map.insert(::std::string::String::from($name), $crate::Param::from($value));)*
        $crate::Params::Named(map)
    }};
}

// ========== Typed extraction ==========

/// Types that can be read out of a [`Value`]
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self>;
}

fn mismatch<T>(value: &Value) -> Error {
    Error::Adaptation(format!(
        "cannot read {} value as {}",
        value.type_name(),
        type_name::<T>()
    ))
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Integer(i) => Ok(*i),
            other => Err(mismatch::<i64>(other)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide).map_err(|_| mismatch::<i32>(value))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Real(f) => Ok(*f),
            Value::Integer(i) => Ok(*i as f64),
            other => Err(mismatch::<f64>(other)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Integer(i) => Ok(*i != 0),
            other => Err(mismatch::<bool>(other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Text(s) => Ok(s.clone()),
            other => Err(mismatch::<String>(other)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Blob(b) => Ok(b.clone()),
            other => Err(mismatch::<Vec<u8>>(other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}
