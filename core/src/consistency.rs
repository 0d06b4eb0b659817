//! Advisory integrity checks over a set of composite rows.
//!
//! Nothing here blocks a mutation or a persist; callers decide what to do with the issues.

use ledger_model::{key_value, CollectionType, FieldRef, FieldRegistry, IntegrationKey, KeyParts};

use std::{collections::HashMap, fmt};

use serde::Serialize;
use strum::IntoStaticStr;
use tracing::debug;

use super::row::{CompositeRow, RowId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, IntoStaticStr)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IssueKind {
	/// The stored key's slot no longer matches the record's identity value.
	KeyMismatch {
		collection: CollectionType,
		stored: Option<String>,
		live: Option<String>,
	},
	/// Another row holds the same identity value for the same collection.
	DuplicateKey {
		collection: CollectionType,
		value: String,
		other_rows: Vec<RowId>,
	},
	/// A reference field disagrees with the row's record of the referenced collection.
	CrossReferenceMismatch {
		field: FieldRef,
		referenced: CollectionType,
		expected: String,
		found: String,
	},
	MissingIdentity {
		collection: CollectionType,
	},
	UndecodableKey {
		reason: String,
	},
}

impl IssueKind {
	/// Stable snake_case name of the issue kind.
	pub fn tag(&self) -> &'static str {
		self.into()
	}
}

impl fmt::Display for IssueKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::KeyMismatch {
				collection,
				stored,
				live,
			} => write!(
				f,
				"{collection} key slot holds {:?} but the record holds {:?}",
				stored.as_deref().unwrap_or(""),
				live.as_deref().unwrap_or("")
			),
			Self::DuplicateKey {
				collection,
				value,
				other_rows,
			} => write!(
				f,
				"{collection} value {value:?} is also held by {} other row(s)",
				other_rows.len()
			),
			Self::CrossReferenceMismatch {
				field,
				referenced,
				expected,
				found,
			} => write!(
				f,
				"{}.{} refers to {referenced} {found:?}, expected {expected:?}",
				field.collection, field.code
			),
			Self::MissingIdentity { collection } => {
				write!(f, "{collection} record has no identity value")
			}
			Self::UndecodableKey { reason } => write!(f, "stored key cannot be decoded: {reason}"),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsistencyIssue {
	pub row_id: RowId,
	pub integration_key: IntegrationKey,
	#[serde(flatten)]
	pub kind: IssueKind,
}

impl ConsistencyIssue {
	pub fn tag(&self) -> &'static str {
		self.kind.tag()
	}
}

impl fmt::Display for ConsistencyIssue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"[{}] <row_id='{}', key='{}'> {}",
			self.tag(),
			self.row_id,
			self.integration_key,
			self.kind
		)
	}
}

/// Runs every check over `rows`, returning issues in row order.
pub fn check(rows: &[CompositeRow], registry: &FieldRegistry) -> Vec<ConsistencyIssue> {
	let mut holders = HashMap::<(CollectionType, String), Vec<RowId>>::new();
	for row in rows {
		for (collection, value) in row.key_parts(registry) {
			if let Some(value) = value {
				holders.entry((collection, value)).or_default().push(row.row_id);
			}
		}
	}

	let mut issues = vec![];

	for row in rows {
		let mut push = |kind| {
			issues.push(ConsistencyIssue {
				row_id: row.row_id,
				integration_key: row.integration_key.clone(),
				kind,
			});
		};

		let live = row.key_parts(registry);

		match row.integration_key.decode() {
			Ok(stored) => {
				for collection in CollectionType::ALL {
					if stored[collection] != live[collection] {
						push(IssueKind::KeyMismatch {
							collection,
							stored: stored[collection].clone(),
							live: live[collection].clone(),
						});
					}
				}
			}
			Err(e) => push(IssueKind::UndecodableKey {
				reason: e.to_string(),
			}),
		}

		for (collection, _) in row.records.present() {
			if live[collection].is_none() {
				push(IssueKind::MissingIdentity { collection });
			}
		}

		for (collection, value) in live.iter() {
			let Some(value) = value else {
				continue;
			};

			let Some(others) = holders.get(&(collection, value.clone())) else {
				continue;
			};

			if others.len() > 1 {
				push(IssueKind::DuplicateKey {
					collection,
					value: value.clone(),
					other_rows: others
						.iter()
						.copied()
						.filter(|other| *other != row.row_id)
						.collect(),
				});
			}
		}

		for kind in cross_reference_mismatches(row, &live, registry) {
			push(kind);
		}
	}

	debug!(rows = rows.len(), issues = issues.len(), "Consistency check done;");

	issues
}

/// Compares every filled reference field with the referenced record's identity value, or, when the
/// referenced collection is absent from the row, with the first filled copy.
fn cross_reference_mismatches(
	row: &CompositeRow,
	live: &KeyParts,
	registry: &FieldRegistry,
) -> Vec<IssueKind> {
	let mut mismatches = vec![];

	for referenced in CollectionType::ALL {
		let copies = row
			.records
			.present()
			.flat_map(|(collection, record)| {
				registry
					.reference_fields(collection, referenced)
					.filter_map(move |descriptor| {
						record
							.field(&descriptor.code)
							.and_then(key_value)
							.map(|value| (descriptor.field_ref(), value))
					})
			})
			.collect::<Vec<_>>();

		let Some(expected) = live[referenced]
			.clone()
			.or_else(|| copies.first().map(|(_, value)| value.clone()))
		else {
			continue;
		};

		mismatches.extend(
			copies
				.into_iter()
				.filter(|(_, found)| *found != expected)
				.map(|(field, found)| IssueKind::CrossReferenceMismatch {
					field,
					referenced,
					expected: expected.clone(),
					found,
				}),
		);
	}

	mismatches
}

#[cfg(test)]
mod tests {
	use ledger_model::{PerCollection, SourceRecord};

	use pretty_assertions::assert_eq;

	use crate::config::LedgerConfig;

	use super::*;

	fn registry() -> FieldRegistry {
		LedgerConfig::default().validate().expect("valid default")
	}

	fn device_row(asset: &str, registry: &FieldRegistry) -> CompositeRow {
		let mut records = PerCollection::default();
		records[CollectionType::Device] =
			Some(SourceRecord::new(CollectionType::Device, asset).with_field("assetNumber", asset));
		CompositeRow::new(records, registry)
	}

	#[test]
	fn consistent_rows_have_no_issues() {
		let registry = registry();
		let rows = vec![device_row("PC-1", &registry), device_row("PC-2", &registry)];

		assert!(check(&rows, &registry).is_empty());
	}

	#[test]
	fn flags_both_duplicate_holders() {
		let registry = registry();
		let rows = vec![
			device_row("PCAIT23N1541", &registry),
			device_row("PCAIT23N1541", &registry),
		];

		let issues = check(&rows, &registry);

		assert_eq!(issues.len(), 2);
		assert!(issues.iter().all(|issue| issue.tag() == "duplicate_key"));
		assert_eq!(
			issues[0].kind,
			IssueKind::DuplicateKey {
				collection: CollectionType::Device,
				value: "PCAIT23N1541".to_string(),
				other_rows: vec![rows[1].row_id],
			}
		);
		assert_eq!(issues[1].row_id, rows[1].row_id);
	}

	#[test]
	fn flags_drifted_key_slot() {
		let registry = registry();
		let mut records = PerCollection::default();
		records[CollectionType::Device] =
			Some(SourceRecord::new(CollectionType::Device, "d1").with_field("assetNumber", "X"));
		records[CollectionType::Seat] =
			Some(SourceRecord::new(CollectionType::Seat, "s1").with_field("seatNumber", "Z"));
		let row = CompositeRow::with_key(
			IntegrationKey::from_raw("DEVICE:X|USER:|EXTENSION:|SEAT:Y"),
			records,
		);

		let issues = check(&[row], &registry);

		assert_eq!(
			issues.iter().map(|issue| &issue.kind).collect::<Vec<_>>(),
			[&IssueKind::KeyMismatch {
				collection: CollectionType::Seat,
				stored: Some("Y".to_string()),
				live: Some("Z".to_string()),
			}]
		);
		assert_eq!(issues[0].tag(), "key_mismatch");
	}

	#[test]
	fn flags_cross_reference_drift() {
		let registry = registry();
		let mut records = PerCollection::default();
		records[CollectionType::Seat] = Some(
			SourceRecord::new(CollectionType::Seat, "s1")
				.with_field("seatNumber", "A1")
				.with_field("assetNumber", "PC-OLD"),
		);
		records[CollectionType::Device] = Some(
			SourceRecord::new(CollectionType::Device, "d1")
				.with_field("assetNumber", "PC-NEW")
				.with_field("seatNumber", "A1"),
		);
		let row = CompositeRow::new(records, &registry);

		let issues = check(&[row], &registry);

		assert_eq!(issues.len(), 1);
		assert_eq!(
			issues[0].kind,
			IssueKind::CrossReferenceMismatch {
				field: FieldRef::new(CollectionType::Seat, "assetNumber"),
				referenced: CollectionType::Device,
				expected: "PC-NEW".to_string(),
				found: "PC-OLD".to_string(),
			}
		);
	}

	#[test]
	fn flags_missing_identity_and_garbage_keys() {
		let registry = registry();
		let mut records = PerCollection::default();
		records[CollectionType::User] =
			Some(SourceRecord::new(CollectionType::User, "u1").with_field("userName", "Sam"));
		let row = CompositeRow::with_key(IntegrationKey::from_raw("not a key"), records);

		let tags = check(&[row], &registry)
			.iter()
			.map(ConsistencyIssue::tag)
			.collect::<Vec<_>>();

		assert_eq!(tags, ["undecodable_key", "missing_identity"]);
	}
}
