//! Per-type schema cache.
//!
//! Schemas are derived once per node type name and shared by every
//! instance of that type.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, error};

use crate::declaration::NodeDeclaration;
use crate::error::SchemaError;
use crate::schema::NodeSchema;

#[derive(Clone, Default)]
pub struct SchemaCache {
  cache: Arc<RwLock<HashMap<String, Arc<NodeSchema>>>>,
}

impl SchemaCache {
  pub fn new() -> Self {
    Self::default()
  }

  /// Get the schema for `type_name`, deriving it from `declare` on first use.
  ///
  /// A failed derivation is not cached; the next call re-derives and fails
  /// again.
  pub fn get_or_build(
    &self,
    type_name: &str,
    declare: impl FnOnce() -> NodeDeclaration,
  ) -> Result<Arc<NodeSchema>, SchemaError> {
    if let Some(schema) = self.get(type_name) {
      return Ok(schema);
    }

    let schema = match NodeSchema::build(&declare()) {
      Ok(schema) => Arc::new(schema),
      Err(e) => {
        error!(type_name = %type_name, error = %e, "schema_build_failed");
        return Err(e);
      }
    };

    let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
    // Another caller may have won the race; keep the first schema.
    let schema = cache
      .entry(type_name.to_string())
      .or_insert_with(|| {
        debug!(type_name = %type_name, "schema_registered");
        schema
      })
      .clone();
    Ok(schema)
  }

  pub fn get(&self, type_name: &str) -> Option<Arc<NodeSchema>> {
    let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
    cache.get(type_name).cloned()
  }

  pub fn len(&self) -> usize {
    self
      .cache
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn clear(&self) {
    let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
    cache.clear();
  }
}
