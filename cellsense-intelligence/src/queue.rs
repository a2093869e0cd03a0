//! Per-schema validator cache
//!
//! A [`SchemaValidator`] is compiled the first time its schema is used and kept for the
//! life of the queue. Validators carry a mutable branch cache, so each one sits behind its
//! own async mutex: requests against different schemas interleave freely, requests against
//! the same schema run one at a time.

use cellsense_analysis::json::to_json_schema;
use cellsense_analysis::{SchemaError, SchemaRef, SchemaRegistry, SchemaValidator};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

type Slot = Arc<Mutex<Option<SchemaValidator>>>;

#[derive(Default)]
pub struct ValidatorQueue {
    slots: Mutex<HashMap<String, Slot>>,
}

impl ValidatorQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with the validator for `schema`, compiling it first if needed.
    pub async fn with_validator<T, F>(
        &self,
        schema: &SchemaRef,
        registry: &Arc<SchemaRegistry>,
        f: F,
    ) -> Result<T, SchemaError>
    where
        F: FnOnce(&mut SchemaValidator) -> T,
    {
        let key = schema_key(schema, registry)?;
        let slot = {
            let mut slots = self.slots.lock().await;
            Arc::clone(slots.entry(key).or_default())
        };
        let mut guard = slot.lock().await;
        let validator = match &mut *guard {
            Some(validator) => validator,
            empty => empty.insert(SchemaValidator::new(
                Arc::clone(schema),
                Arc::clone(registry),
            )?),
        };
        Ok(f(validator))
    }

    /// Number of validators compiled so far
    pub async fn compiled(&self) -> usize {
        let slots: Vec<Slot> = self.slots.lock().await.values().cloned().collect();
        let mut count = 0;
        for slot in slots {
            if slot.lock().await.is_some() {
                count += 1;
            }
        }
        count
    }
}

/// Registered schemas are keyed by id; anonymous ones by their JSON form.
fn schema_key(schema: &SchemaRef, registry: &SchemaRegistry) -> Result<String, SchemaError> {
    match &schema.id {
        Some(id) => Ok(id.clone()),
        None => Ok(to_json_schema(schema, registry)?.to_string()),
    }
}
