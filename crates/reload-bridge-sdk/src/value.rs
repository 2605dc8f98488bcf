//! Values stored in the registry
//!
//! Compiled units publish plain data, nested namespaces and native functions.
//! Functions are reference counted so resolving one out of the registry is
//! cheap and does not keep the registry locked while it runs.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::HostError;

type NativeCallable = dyn Fn(&[Value]) -> Result<Value, HostError> + Send + Sync;

/// A callable published into the registry
#[derive(Clone)]
pub struct NativeFn {
    name: Arc<str>,
    inner: Arc<NativeCallable>,
}

impl NativeFn {
    /// Wrap a closure as a named native function
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, HostError> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name.into()),
            inner: Arc::new(f),
        }
    }

    /// Invoke the function
    pub fn call(&self, args: &[Value]) -> Result<Value, HostError> {
        (self.inner)(args)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether both handles point at the same closure
    pub fn same_as(&self, other: &NativeFn) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFn")
            .field("name", &self.name)
            .finish()
    }
}

/// A value in the registry
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// Structured data, e.g. compile-time defines
    Json(serde_json::Value),
    /// A nested namespace segment
    Namespace(BTreeMap<String, Value>),
    Function(NativeFn),
}

impl Value {
    /// An empty namespace
    pub fn namespace() -> Self {
        Value::Namespace(BTreeMap::new())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&NativeFn> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Look up a direct member of a namespace value
    pub fn member(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Namespace(members) => members.get(key),
            _ => None,
        }
    }

    /// Call this value as a function
    pub fn call(&self, args: &[Value]) -> Result<Value, HostError> {
        match self {
            Value::Function(f) => f.call(args),
            other => Err(HostError::NotCallable(other.kind().to_string())),
        }
    }

    /// Short type name used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Json(_) => "json",
            Value::Namespace(_) => "namespace",
            Value::Function(_) => "function",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Json(a), Value::Json(b)) => a == b,
            (Value::Namespace(a), Value::Namespace(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a.same_as(b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl From<NativeFn> for Value {
    fn from(f: NativeFn) -> Self {
        Value::Function(f)
    }
}
