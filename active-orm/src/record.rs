//! # Record Module
//!
//! The structural half of an entity: a case-insensitive attribute bag with a
//! parallel set of modified attributes.
//!
//! Attribute names are matched case-insensitively, while the spelling used on
//! first assignment is kept and used when the engine renders column lists.
//! The modified set keeps assignment order so INSERT and UPDATE column lists
//! are stable.
//!
//! ## Example
//!
//! ```rust,ignore
//! use active_orm::{Attributes, Record};
//!
//! let mut record = Record::new();
//! record.set("Name", "Alice");
//! assert_eq!(record.get("name"), Some(&"Alice".into()));
//! assert_eq!(record.modified_names(), vec!["Name"]);
//! ```

use std::collections::HashMap;

use serde::{ser::SerializeMap, Serialize, Serializer};

use crate::{
    errors::Result,
    value::{FromValue, Value},
    Error,
};

// ============================================================================
// Record Structure
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct Slot {
    name: String,
    value: Value,
}

/// Attribute bag with dirty tracking.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    slots: HashMap<String, Slot>,
    order: Vec<String>,
    modified: Vec<String>,
}

fn fold(name: &str) -> String {
    name.trim().to_lowercase()
}

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the attribute value, `None` when never assigned.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.slots.get(&fold(name)).map(|s| &s.value)
    }

    /// Whether the attribute is absent or `NULL`.
    pub fn is_unset(&self, name: &str) -> bool {
        self.get(name).is_none_or(Value::is_null)
    }

    /// Assigns an attribute and marks it modified.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> &mut Self {
        let key = fold(name);
        if !self.modified.contains(&key) {
            self.modified.push(key.clone());
        }
        self.put(key, name, value.into());
        self
    }

    /// Assigns an attribute without marking it modified.
    ///
    /// Used when hydrating a record from a result row.
    pub fn put_loaded(&mut self, name: &str, value: Value) {
        self.put(fold(name), name, value);
    }

    fn put(&mut self, key: String, name: &str, value: Value) {
        match self.slots.get_mut(&key) {
            Some(slot) => slot.value = value,
            None => {
                self.order.push(key.clone());
                self.slots.insert(key, Slot { name: name.trim().to_string(), value });
            }
        }
    }

    /// Removes an attribute entirely, including its modified flag.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let key = fold(name);
        self.order.retain(|k| k != &key);
        self.modified.retain(|k| k != &key);
        self.slots.remove(&key).map(|s| s.value)
    }

    /// Names of all attributes in assignment order.
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().filter_map(|k| self.slots.get(k)).map(|s| s.name.as_str()).collect()
    }

    /// Names of the modified attributes in assignment order.
    pub fn modified_names(&self) -> Vec<&str> {
        self.modified.iter().filter_map(|k| self.slots.get(k)).map(|s| s.name.as_str()).collect()
    }

    /// Values of the modified attributes, aligned with [`Record::modified_names`].
    pub fn modified_values(&self) -> Vec<Value> {
        self.modified.iter().filter_map(|k| self.slots.get(k)).map(|s| s.value.clone()).collect()
    }

    /// Whether any attribute changed since the last successful write.
    pub fn is_modified(&self) -> bool {
        !self.modified.is_empty()
    }

    /// Forgets all pending modifications.
    pub fn clear_modified(&mut self) {
        self.modified.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.slots.len()))?;
        for key in &self.order {
            if let Some(slot) = self.slots.get(key) {
                map.serialize_entry(&slot.name, &slot.value)?;
            }
        }
        map.end()
    }
}

// ============================================================================
// Attributes Trait
// ============================================================================

/// Structural access to an entity's attributes.
///
/// Implementors only expose their [`Record`]; everything else has a default
/// implementation. `#[derive(Model)]` implements this trait for structs that
/// hold a single `Record` field.
pub trait Attributes {
    fn record(&self) -> &Record;

    fn record_mut(&mut self) -> &mut Record;

    /// Raw attribute value.
    fn get(&self, name: &str) -> Option<&Value> {
        self.record().get(name)
    }

    /// Typed attribute value; a missing attribute reads as `NULL`.
    fn get_as<T: FromValue>(&self, name: &str) -> Result<T>
    where
        Self: Sized,
    {
        let value = self.record().get(name).unwrap_or(&Value::Null);
        T::from_value(value).map_err(|e| Error::Conversion(format!("attribute '{}': {}", name, e)))
    }

    /// Assigns an attribute and marks it modified.
    fn set(&mut self, name: &str, value: impl Into<Value>) -> &mut Self
    where
        Self: Sized,
    {
        self.record_mut().set(name, value);
        self
    }

    fn modified_names(&self) -> Vec<&str> {
        self.record().modified_names()
    }

    fn clear_modified(&mut self) {
        self.record_mut().clear_modified();
    }
}

impl Attributes for Record {
    fn record(&self) -> &Record {
        self
    }

    fn record_mut(&mut self) -> &mut Record {
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_case_insensitive() {
        let mut record = Record::new();
        record.set("UserName", "alice");
        record.set("username", "bob");

        assert_eq!(record.len(), 1);
        assert_eq!(record.get("USERNAME"), Some(&Value::Text("bob".into())));
        assert_eq!(record.names(), vec!["UserName"]);
    }

    #[test]
    fn test_modified_tracking_keeps_assignment_order() {
        let mut record = Record::new();
        record.put_loaded("id", Value::Int(1));
        record.set("name", "alice");
        record.set("age", 30);
        record.set("name", "alicia");

        assert_eq!(record.modified_names(), vec!["name", "age"]);
        assert_eq!(record.modified_values(), vec![Value::Text("alicia".into()), Value::Int(30)]);

        record.clear_modified();
        assert!(!record.is_modified());
        assert_eq!(record.names(), vec!["id", "name", "age"]);
    }

    #[test]
    fn test_null_counts_as_unset() {
        let mut record = Record::new();
        assert!(record.is_unset("id"));
        record.set("id", Value::Null);
        assert!(record.is_unset("id"));
        record.set("id", 5);
        assert!(!record.is_unset("ID"));
    }

    #[test]
    fn test_typed_getter_reports_attribute_name() {
        let mut record = Record::new();
        record.set("age", "not a number");
        let err = record.get_as::<i64>("age").unwrap_err();
        assert!(err.to_string().contains("age"));
        assert_eq!(record.get_as::<Option<i64>>("missing").unwrap(), None);
    }

    #[test]
    fn test_remove_drops_modified_flag() {
        let mut record = Record::new();
        record.set("a", 1).set("b", 2);
        assert_eq!(record.remove("A"), Some(Value::Int(1)));
        assert_eq!(record.modified_names(), vec!["b"]);
    }
}
