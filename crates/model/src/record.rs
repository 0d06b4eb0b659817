use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::CollectionType;

pub type FieldCode = String;
pub type FieldValue = Value;
pub type Fields = BTreeMap<FieldCode, FieldValue>;

/// A record as stored in one of the collections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
	pub collection: CollectionType,
	/// Store-assigned record id, opaque to the engine.
	pub external_id: String,
	#[serde(default)]
	pub fields: Fields,
}

impl SourceRecord {
	pub fn new(collection: CollectionType, external_id: impl Into<String>) -> Self {
		Self {
			collection,
			external_id: external_id.into(),
			fields: Fields::new(),
		}
	}

	#[must_use]
	pub fn with_field(mut self, code: impl Into<FieldCode>, value: impl Into<FieldValue>) -> Self {
		self.fields.insert(code.into(), value.into());
		self
	}

	pub fn field(&self, code: &str) -> Option<&FieldValue> {
		self.fields.get(code)
	}

	/// The key value held in `code`, see [`key_value`].
	pub fn key_value(&self, code: &str) -> Option<String> {
		self.fields.get(code).and_then(key_value)
	}
}

/// Renders a field value as a key.
///
/// Strings are trimmed and numbers use their decimal form; anything else, including blank strings,
/// carries no key.
pub fn key_value(value: &FieldValue) -> Option<String> {
	match value {
		Value::String(s) => {
			let trimmed = s.trim();
			(!trimmed.is_empty()).then(|| trimmed.to_string())
		}
		Value::Number(n) => Some(n.to_string()),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn key_value_shapes() {
		assert_eq!(key_value(&json!(" A1 ")), Some("A1".to_string()));
		assert_eq!(key_value(&json!(4021)), Some("4021".to_string()));
		assert_eq!(key_value(&json!("   ")), None);
		assert_eq!(key_value(&json!(null)), None);
		assert_eq!(key_value(&json!(["A1"])), None);
	}

	#[test]
	fn record_builder() {
		let record = SourceRecord::new(CollectionType::Seat, "17")
			.with_field("seatNumber", "A1")
			.with_field("floor", 3);

		assert_eq!(record.key_value("seatNumber").as_deref(), Some("A1"));
		assert_eq!(record.field("floor"), Some(&json!(3)));
		assert_eq!(record.key_value("missing"), None);
	}
}
