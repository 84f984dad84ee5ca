// SPDX-FileCopyrightText: © 2025 StreamKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Named, typed property stores with change listeners.
//!
//! Both the [`Core`](crate::core::Core) and every stream context own a
//! [`Properties`] store. Nodes read tuning values from it (for example a
//! gain in dB) and publish status through it (for example network buffer
//! fullness). Listeners receive every change on an unbounded channel and may
//! filter by name prefix.

use bytes::Bytes;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A property value.
#[derive(Clone)]
pub enum PropertyValue {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Bytes(Bytes),
    /// An in-process object, such as a key manager or a shared buffer.
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl PropertyValue {
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Boolean(_) => "boolean",
            Self::Bytes(_) => "bytes",
            Self::Opaque(_) => "opaque",
        }
    }

    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric value, converting integers.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Downcasts an opaque value.
    pub fn as_opaque<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match self {
            Self::Opaque(v) => Arc::clone(v).downcast::<T>().ok(),
            _ => None,
        }
    }
}

impl fmt::Debug for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "Integer({v})"),
            Self::Float(v) => write!(f, "Float({v})"),
            Self::String(v) => write!(f, "String({v:?})"),
            Self::Boolean(v) => write!(f, "Boolean({v})"),
            Self::Bytes(v) => write!(f, "Bytes({} bytes)", v.len()),
            Self::Opaque(_) => f.write_str("Opaque(..)"),
        }
    }
}

impl PartialEq for PropertyValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Opaque(a), Self::Opaque(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Bytes> for PropertyValue {
    fn from(v: Bytes) -> Self {
        Self::Bytes(v)
    }
}

/// A change notification. `value` is `None` when the property was unset.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChange {
    pub name: String,
    pub value: Option<PropertyValue>,
}

/// Handle returned by [`Properties::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Listener {
    id: ListenerId,
    prefix: Option<String>,
    tx: mpsc::UnboundedSender<PropertyChange>,
}

impl Listener {
    fn matches(&self, name: &str) -> bool {
        self.prefix.as_deref().is_none_or(|prefix| name.starts_with(prefix))
    }
}

#[derive(Default)]
struct PropertiesInner {
    values: IndexMap<String, PropertyValue>,
    listeners: Vec<Listener>,
    next_listener: u64,
}

impl PropertiesInner {
    fn notify(&mut self, name: &str, value: Option<&PropertyValue>) {
        // closed receivers are pruned as we go
        self.listeners.retain(|listener| {
            if !listener.matches(name) {
                return true;
            }
            listener
                .tx
                .send(PropertyChange { name: name.to_string(), value: value.cloned() })
                .is_ok()
        });
    }
}

/// A thread-safe property store. Clones share the same store.
#[derive(Clone, Default)]
pub struct Properties {
    inner: Arc<Mutex<PropertiesInner>>,
}

impl fmt::Debug for Properties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.inner.lock();
        f.debug_struct("Properties")
            .field("values", &guard.values)
            .field("listeners", &guard.listeners.len())
            .finish()
    }
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name` and notifies matching listeners.
    ///
    /// Setting a property to the value it already holds is silent.
    pub fn set(&self, name: &str, value: impl Into<PropertyValue>) {
        let value = value.into();
        let mut guard = self.inner.lock();
        if guard.values.get(name) == Some(&value) {
            return;
        }
        guard.values.insert(name.to_string(), value.clone());
        guard.notify(name, Some(&value));
    }

    /// Removes `name`. Returns the previous value.
    pub fn unset(&self, name: &str) -> Option<PropertyValue> {
        let mut guard = self.inner.lock();
        let previous = guard.values.shift_remove(name)?;
        guard.notify(name, None);
        Some(previous)
    }

    pub fn get(&self, name: &str) -> Option<PropertyValue> {
        self.inner.lock().values.get(name).cloned()
    }

    pub fn get_integer(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(|v| v.as_integer())
    }

    pub fn get_float(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(|v| v.as_float())
    }

    pub fn get_string(&self, name: &str) -> Option<String> {
        match self.get(name)? {
            PropertyValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn get_opaque<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.get(name)?.as_opaque::<T>()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.lock().values.contains_key(name)
    }

    /// Property names in insertion order.
    pub fn names(&self) -> Vec<String> {
        self.inner.lock().values.keys().cloned().collect()
    }

    /// Removes every property, notifying listeners for each one. Listeners stay.
    pub fn clear(&self) {
        let mut guard = self.inner.lock();
        let names: Vec<String> = guard.values.keys().cloned().collect();
        guard.values.clear();
        for name in names {
            guard.notify(&name, None);
        }
    }

    /// Subscribes to changes of properties whose name starts with `prefix`
    /// (all properties when `None`).
    pub fn add_listener(
        &self,
        prefix: Option<&str>,
    ) -> (ListenerId, mpsc::UnboundedReceiver<PropertyChange>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut guard = self.inner.lock();
        let id = ListenerId(guard.next_listener);
        guard.next_listener += 1;
        guard.listeners.push(Listener { id, prefix: prefix.map(str::to_string), tx });
        (id, rx)
    }

    /// Returns `false` if `id` was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut guard = self.inner.lock();
        let before = guard.listeners.len();
        guard.listeners.retain(|l| l.id != id);
        guard.listeners.len() != before
    }
}
