//! Capability trait for records managed by the entity cache.

use crate::error::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Trait that every record stored by [`crate::entities::EntityCache`] must implement.
///
/// The cache only needs two things from a record: its numeric identifier and
/// whether a fetch actually filled it. Field layout is handled by serde.
///
/// # Example
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use tiercache::CacheableEntity;
///
/// #[derive(Clone, Default, Serialize, Deserialize)]
/// pub struct Video {
///     pub id: u32,
///     pub user_id: u32,
///     pub title: String,
/// }
///
/// impl CacheableEntity for Video {
///     fn id(&self) -> u32 {
///         self.id
///     }
///
///     fn is_populated(&self) -> bool {
///         self.user_id != 0 || !self.title.is_empty()
///     }
/// }
/// ```
pub trait CacheableEntity: Send + Sync + Serialize + DeserializeOwned + Clone {
    /// Stable identifier; appended to the namespace to form the composite key.
    ///
    /// Must not change for the lifetime of the record.
    fn id(&self) -> u32;

    /// True iff a fetch filled at least one non-default field.
    ///
    /// Distinguishes "tier returned an empty record" from "tier returned data".
    fn is_populated(&self) -> bool;

    /// Flatten the record into the field map stored in the distributed tier.
    ///
    /// Every field value is stored as its JSON text, so `Some("42")` and
    /// `42` stay distinguishable when read back.
    ///
    /// # Errors
    /// Returns `Error::SerializationError` if the record does not serialize to
    /// a JSON object.
    fn to_fields(&self) -> Result<Vec<(String, String)>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map
                .into_iter()
                .map(|(name, value)| (name, value.to_string()))
                .collect()),
            other => Err(Error::SerializationError(format!(
                "entity must serialize to an object, got {}",
                other
            ))),
        }
    }

    /// Overlay a field map fetched from the distributed tier onto `self`.
    ///
    /// Fields missing from the map keep their current values, so the caller's
    /// identifier survives. An empty map leaves `self` untouched.
    ///
    /// # Errors
    /// Returns `Error::DeserializationError` if a field cannot be decoded into
    /// the type of the corresponding struct field.
    fn apply_fields(&mut self, fields: &HashMap<String, String>) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }

        let mut current = match serde_json::to_value(&*self)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        for (name, raw) in fields {
            // Values that are not JSON were written by a foreign producer as bare text.
            let decoded =
                serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()));
            current.insert(name.clone(), decoded);
        }

        *self = serde_json::from_value(Value::Object(current))
            .map_err(|e| Error::DeserializationError(e.to_string()))?;
        Ok(())
    }

    /// Optional: validate the record before it is cached or handed back.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}
