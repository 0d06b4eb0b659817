use ledger_model::{key_value, FieldCode, FieldValue, SourceRecord};

use std::fmt::Write;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Record filter understood by every [`RecordStoreClient`](super::RecordStoreClient).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum Predicate {
	All,
	Eq { field: FieldCode, value: FieldValue },
	In { field: FieldCode, values: Vec<String> },
	Contains { field: FieldCode, value: String },
	And { all: Vec<Predicate> },
	Or { any: Vec<Predicate> },
}

impl Predicate {
	pub fn eq(field: impl Into<FieldCode>, value: impl Into<FieldValue>) -> Self {
		Self::Eq {
			field: field.into(),
			value: value.into(),
		}
	}

	pub fn key_in(field: impl Into<FieldCode>, values: impl IntoIterator<Item = String>) -> Self {
		Self::In {
			field: field.into(),
			values: values.into_iter().collect(),
		}
	}

	pub fn contains(field: impl Into<FieldCode>, value: impl Into<String>) -> Self {
		Self::Contains {
			field: field.into(),
			value: value.into(),
		}
	}

	#[must_use]
	pub fn matches(&self, record: &SourceRecord) -> bool {
		match self {
			Self::All => true,
			Self::Eq { field, value } => match (record.field(field), key_value(value)) {
				(Some(actual), Some(expected)) => key_value(actual).as_ref() == Some(&expected),
				(Some(actual), None) => actual == value,
				(None, _) => value.is_null(),
			},
			Self::In { field, values } => record
				.key_value(field)
				.is_some_and(|actual| values.contains(&actual)),
			Self::Contains { field, value } => match record.field(field) {
				Some(Value::String(actual)) => actual.contains(value.as_str()),
				Some(other) => key_value(other).is_some_and(|actual| actual.contains(value.as_str())),
				None => false,
			},
			Self::And { all } => all.iter().all(|p| p.matches(record)),
			Self::Or { any } => any.iter().any(|p| p.matches(record)),
		}
	}

	/// Renders the predicate in the store's query syntax; its length is what the store limits.
	#[must_use]
	pub fn to_query(&self) -> String {
		let mut out = String::new();
		self.write_query(&mut out);
		out
	}

	fn write_query(&self, out: &mut String) {
		match self {
			Self::All => {}
			Self::Eq { field, value } => {
				let _ = write!(out, "{field} = ");
				write_literal(out, &key_value(value).unwrap_or_default());
			}
			Self::In { field, values } => {
				let _ = write!(out, "{field} in (");
				for (idx, value) in values.iter().enumerate() {
					if idx > 0 {
						out.push_str(", ");
					}
					write_literal(out, value);
				}
				out.push(')');
			}
			Self::Contains { field, value } => {
				let _ = write!(out, "{field} like ");
				write_literal(out, value);
			}
			Self::And { all } => write_joined(out, all, " and "),
			Self::Or { any } => write_joined(out, any, " or "),
		}
	}
}

fn write_joined(out: &mut String, predicates: &[Predicate], joiner: &str) {
	let mut first = true;
	for predicate in predicates.iter().filter(|p| !matches!(p, Predicate::All)) {
		if !first {
			out.push_str(joiner);
		}
		first = false;
		out.push('(');
		predicate.write_query(out);
		out.push(')');
	}
}

fn write_literal(out: &mut String, value: &str) {
	out.push('"');
	for c in value.chars() {
		if c == '"' || c == '\\' {
			out.push('\\');
		}
		out.push(c);
	}
	out.push('"');
}

#[cfg(test)]
mod tests {
	use ledger_model::CollectionType;

	use pretty_assertions::assert_eq;
	use serde_json::json;

	use super::*;

	fn seat() -> SourceRecord {
		SourceRecord::new(CollectionType::Seat, "1")
			.with_field("seatNumber", "A1")
			.with_field("floor", 3)
			.with_field("area", "North wing")
	}

	#[test]
	fn evaluates_against_records() {
		let record = seat();

		assert!(Predicate::All.matches(&record));
		assert!(Predicate::eq("seatNumber", "A1").matches(&record));
		assert!(Predicate::eq("floor", "3").matches(&record));
		assert!(!Predicate::eq("floor", 4).matches(&record));
		assert!(Predicate::key_in("seatNumber", ["B2".to_string(), "A1".to_string()]).matches(&record));
		assert!(Predicate::contains("area", "North").matches(&record));
		assert!(Predicate::And {
			all: vec![Predicate::eq("floor", 3), Predicate::contains("area", "wing")]
		}
		.matches(&record));
		assert!(!Predicate::Or {
			any: vec![Predicate::eq("floor", 1), Predicate::eq("seatNumber", "Z9")]
		}
		.matches(&record));
		assert!(Predicate::eq("missing", json!(null)).matches(&record));
	}

	#[test]
	fn renders_queries() {
		assert_eq!(
			Predicate::key_in("assetNumber", ["PC-1".to_string(), "PC\"2".to_string()]).to_query(),
			r#"assetNumber in ("PC-1", "PC\"2")"#
		);
		assert_eq!(
			Predicate::And {
				all: vec![
					Predicate::All,
					Predicate::eq("floor", 3),
					Predicate::contains("area", "North")
				]
			}
			.to_query(),
			r#"(floor = "3") and (area like "North")"#
		);
		assert_eq!(Predicate::All.to_query(), "");
	}
}
