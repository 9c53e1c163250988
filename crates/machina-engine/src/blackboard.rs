//! Shared blackboard — the typed key/value data plane threaded through states.
//!
//! A [`Blackboard`] is a clone-to-share handle: every clone sees the same
//! entries, which is how an engine, its nested machines and parallel
//! children all observe one data plane. Each entry carries the `TypeId` of
//! the value it was created with; typed access against a different type is
//! rejected rather than coerced.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::errors::BlackboardError;

/// A value storable on a [`Blackboard`].
///
/// Blanket-implemented for every `Any + Clone + Send + Sync` type, so any
/// ordinary owned value can be stored without further ceremony.
pub trait BlackboardValue: Any + Send + Sync {
    /// Clone into a fresh boxed entry.
    fn clone_value(&self) -> Box<dyn BlackboardValue>;
    /// Debug rendering used by [`Blackboard::serialize`]. Strings render
    /// verbatim, primitive numerics and bools through `ToString`, and
    /// everything else as an `Object of Type [...]` placeholder.
    fn render(&self) -> String;
    /// Stable name of the concrete type, for diagnostics.
    fn type_name(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

macro_rules! render_via_to_string {
    ($any:expr, $($ty:ty),+ $(,)?) => {
        $(
            if let Some(v) = $any.downcast_ref::<$ty>() {
                return v.to_string();
            }
        )+
    };
}

impl<T: Any + Clone + Send + Sync> BlackboardValue for T {
    fn clone_value(&self) -> Box<dyn BlackboardValue> {
        Box::new(self.clone())
    }

    fn render(&self) -> String {
        let any: &dyn Any = self;
        if let Some(s) = any.downcast_ref::<String>() {
            return s.clone();
        }
        if let Some(s) = any.downcast_ref::<&'static str>() {
            return (*s).to_string();
        }
        render_via_to_string!(
            any, bool, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64
        );
        format!("Object of Type [{}]", std::any::type_name::<T>())
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Concurrent, type-checked, string-keyed heterogeneous value store.
///
/// All operations take `&self` and serialize through one internal lock, so
/// a blackboard may be touched from any task or thread. `Clone` produces a
/// handle onto the same entries.
#[derive(Clone, Default)]
pub struct Blackboard {
    entries: Arc<Mutex<HashMap<String, Box<dyn BlackboardValue>>>>,
}

impl Blackboard {
    /// Create an empty blackboard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an entry exists for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Remove the entry for `key`, if any.
    pub fn remove(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Typed read. Returns `None` when the key is absent **or** when the
    /// stored entry has a different type; otherwise a clone of the value.
    pub fn get<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        let entries = self.entries.lock();
        entries
            .get(key)
            .and_then(|entry| BlackboardValue::as_any(&**entry).downcast_ref::<T>())
            .cloned()
    }

    /// Typed write. Inserts a new entry or overwrites a same-typed one;
    /// fails with [`BlackboardError::TypeMismatch`] when the existing
    /// entry was created with a different type.
    pub fn set<T: BlackboardValue>(
        &self,
        key: impl Into<String>,
        value: T,
    ) -> Result<(), BlackboardError> {
        let key = key.into();
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(&key) {
            if BlackboardValue::as_any(&**existing).type_id() != TypeId::of::<T>() {
                return Err(BlackboardError::TypeMismatch {
                    key,
                    stored: BlackboardValue::type_name(&**existing),
                    requested: std::any::type_name::<T>(),
                });
            }
        }
        entries.insert(key, Box::new(value));
        Ok(())
    }

    /// Run `f` on the value stored under `key`, holding the entry lock for
    /// the duration. A missing entry is created from `T::default()` first.
    ///
    /// This replaces handing out references into the store: the closure's
    /// borrow cannot outlive the lock. Calling back into the same
    /// blackboard from inside `f` deadlocks.
    pub fn update<T, R>(
        &self,
        key: impl Into<String>,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<R, BlackboardError>
    where
        T: BlackboardValue + Default,
    {
        let key = key.into();
        let mut entries = self.entries.lock();
        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| Box::new(T::default()));
        let stored = entry.type_name();
        match BlackboardValue::as_any_mut(&mut **entry).downcast_mut::<T>() {
            Some(value) => Ok(f(value)),
            None => Err(BlackboardError::TypeMismatch {
                key,
                stored,
                requested: std::any::type_name::<T>(),
            }),
        }
    }

    /// Independent copy of the current contents. Unlike `clone`, which
    /// shares entries, later writes to either side stay private.
    pub fn fork(&self) -> Blackboard {
        let entries = self.entries.lock();
        let copied: HashMap<String, Box<dyn BlackboardValue>> = entries
            .iter()
            .map(|(key, value)| (key.clone(), BlackboardValue::clone_value(&**value)))
            .collect();
        Blackboard {
            entries: Arc::new(Mutex::new(copied)),
        }
    }

    /// Render the whole store as a single-line, JSON-shaped object with
    /// every value emitted as a string, e.g. `{"retries": "3"}`. Entries
    /// appear in sorted key order; an empty blackboard renders as `{}`.
    pub fn serialize(&self) -> String {
        let entries = self.entries.lock();
        let mut rendered: Vec<String> = entries
            .iter()
            .map(|(key, value)| {
                format!(
                    "{}: {}",
                    json_string(key),
                    json_string(&BlackboardValue::render(&**value))
                )
            })
            .collect();
        rendered.sort();
        format!("{{{}}}", rendered.join(", "))
    }
}

impl fmt::Debug for Blackboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blackboard")
            .field("entries", &self.len())
            .finish()
    }
}

fn json_string(s: &str) -> String {
    serde_json::Value::String(s.to_owned()).to_string()
}
