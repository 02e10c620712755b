//! Keyed, typed entity records.

use std::collections::BTreeMap;

use alloy::primitives::{Address, I256};
use serde::{Deserialize, Serialize};

use crate::error::MappingError;
use crate::value::Value;

/// One record of a named entity type.
///
/// The id is fixed at construction and is not part of `fields`. Typed
/// getters return the kind's zero value for absent or `Null` fields and a
/// [`MappingError::TypeMismatch`] when the field holds another kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "type")]
    entity_type: String,
    id: String,
    #[serde(default)]
    fields: BTreeMap<String, Value>,
}

impl Entity {
    /// Create an empty entity.
    #[must_use]
    pub fn new(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Entity type name.
    #[must_use]
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Entity id, unique within its type.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Raw field value, if set.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Set a field, replacing any previous value.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Remove a field, returning its previous value.
    pub fn unset(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    /// Iterate over all set fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Read a `BigInt` field.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::TypeMismatch`] if the field is not numeric.
    pub fn big_int(&self, field: &str) -> Result<I256, MappingError> {
        match self.fields.get(field) {
            None | Some(Value::Null) => Ok(I256::ZERO),
            Some(v) => v.to_big_int(field),
        }
    }

    /// Read a `Boolean` field.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::TypeMismatch`] if the field is not a bool.
    pub fn bool(&self, field: &str) -> Result<bool, MappingError> {
        match self.fields.get(field) {
            None | Some(Value::Null) => Ok(false),
            Some(v) => v
                .as_bool()
                .ok_or_else(|| MappingError::type_mismatch(field, "bool", v.kind())),
        }
    }

    /// Read a `String` (or id reference) field.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::TypeMismatch`] if the field is not a string.
    pub fn string(&self, field: &str) -> Result<&str, MappingError> {
        match self.fields.get(field) {
            None | Some(Value::Null) => Ok(""),
            Some(v) => v
                .as_str()
                .ok_or_else(|| MappingError::type_mismatch(field, "string", v.kind())),
        }
    }

    /// Read an `Address` field.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::TypeMismatch`] if the field is not an address.
    pub fn address(&self, field: &str) -> Result<Address, MappingError> {
        match self.fields.get(field) {
            None | Some(Value::Null) => Ok(Address::ZERO),
            Some(v) => v
                .as_address()
                .ok_or_else(|| MappingError::type_mismatch(field, "address", v.kind())),
        }
    }

    /// Read a list field.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::TypeMismatch`] if the field is not a list.
    pub fn list(&self, field: &str) -> Result<&[Value], MappingError> {
        match self.fields.get(field) {
            None | Some(Value::Null) => Ok(&[]),
            Some(v) => v
                .as_list()
                .ok_or_else(|| MappingError::type_mismatch(field, "list", v.kind())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::i256_from_u64;

    #[test]
    fn unset_fields_read_as_zero_values() {
        let e = Entity::new("LendingPair", "0x1");
        assert_eq!(e.big_int("totalAssetAmount").unwrap(), I256::ZERO);
        assert!(!e.bool("finalized").unwrap());
        assert_eq!(e.string("type").unwrap(), "");
        assert_eq!(e.address("owner").unwrap(), Address::ZERO);
        assert!(e.list("eligibleTokenIds").unwrap().is_empty());
    }

    #[test]
    fn wrong_kind_is_a_type_mismatch() {
        let mut e = Entity::new("LendingPair", "0x1");
        e.set("totalAssetAmount", "not a number");
        let err = e.big_int("totalAssetAmount").unwrap_err();
        assert!(
            matches!(err, MappingError::TypeMismatch { found: "string", .. }),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn set_replaces_previous_value() {
        let mut e = Entity::new("User", "0xabc");
        e.set("block", i256_from_u64(1));
        e.set("block", i256_from_u64(2));
        assert_eq!(e.big_int("block").unwrap(), i256_from_u64(2));
        assert_eq!(e.fields().count(), 1);
    }
}
