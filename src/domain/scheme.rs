//! Page scheme: which block ids occupy which layout slot.
//!
//! Accepted shapes (all keyed by slot name at the top level):
//!
//! ```json
//! { "header": "menu", "main": ["news", ["left", "right"]], "footer": { "links": ["legal"] } }
//! ```
//!
//! Nested arrays flatten into their slot; nested objects become dotted slot
//! names (`footer.links`).

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use super::error::DomainError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scheme {
    slots: BTreeMap<String, Vec<String>>,
    members: BTreeSet<String>,
}

impl Scheme {
    /// Parse a scheme document. Blank input yields an empty scheme.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }

        let value: Value =
            serde_json::from_str(raw).map_err(|err| DomainError::scheme(err.to_string()))?;
        let Value::Object(map) = value else {
            return Err(DomainError::scheme("top level must be an object of slots"));
        };

        let mut scheme = Self::default();
        for (slot, entry) in map {
            scheme.collect(&slot, &entry)?;
        }
        Ok(scheme)
    }

    pub fn from_slots<I, S, B>(slots: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<B>)>,
        S: Into<String>,
        B: Into<String>,
    {
        let mut scheme = Self::default();
        for (slot, ids) in slots {
            let slot = slot.into();
            for id in ids {
                scheme.push(&slot, id.into());
            }
        }
        scheme
    }

    pub fn contains(&self, block_id: &str) -> bool {
        self.members.contains(block_id)
    }

    pub fn slots(&self) -> &BTreeMap<String, Vec<String>> {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn collect(&mut self, slot: &str, value: &Value) -> Result<(), DomainError> {
        match value {
            Value::String(id) => {
                let id = id.trim();
                if !id.is_empty() {
                    self.push(slot, id.to_string());
                }
                Ok(())
            }
            Value::Number(number) => {
                self.push(slot, number.to_string());
                Ok(())
            }
            Value::Array(items) => {
                for item in items {
                    self.collect(slot, item)?;
                }
                Ok(())
            }
            Value::Object(children) => {
                for (child, entry) in children {
                    self.collect(&format!("{slot}.{child}"), entry)?;
                }
                Ok(())
            }
            Value::Null => Ok(()),
            Value::Bool(_) => Err(DomainError::scheme(format!(
                "slot `{slot}` contains a boolean"
            ))),
        }
    }

    fn push(&mut self, slot: &str, id: String) {
        self.members.insert(id.clone());
        self.slots.entry(slot.to_string()).or_default().push(id);
    }
}
