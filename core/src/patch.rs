use ledger_model::{CollectionType, FieldRegistry, Fields, PerCollection};
use ledger_store::{UpdateKey, UpsertDirective};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{
	row::{CompositeRow, RowId},
	tracker::EditTracker,
};

/// A dirty record that could not be turned into a directive because it has no identity value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedPatch {
	pub row_id: RowId,
	pub collection: CollectionType,
}

/// Update-by-key directives per collection, each list dispatchable on its own.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Patches {
	pub directives: PerCollection<Vec<UpsertDirective>>,
	pub skipped: Vec<SkippedPatch>,
}

impl Patches {
	pub fn for_collection(&self, collection: CollectionType) -> &[UpsertDirective] {
		&self.directives[collection]
	}

	pub fn len(&self) -> usize {
		self.directives.values().map(Vec::len).sum()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[derive(Debug, Clone, Copy)]
pub struct PatchBuilder<'registry> {
	registry: &'registry FieldRegistry,
}

impl<'registry> PatchBuilder<'registry> {
	pub const fn new(registry: &'registry FieldRegistry) -> Self {
		Self { registry }
	}

	/// Builds directives for every record holding a modified field or a stale reference.
	///
	/// A directive is keyed by the record's identity value and carries only the modified fields,
	/// never the identity field itself. Records moved by an exchange or separation, and records
	/// left behind, get their reference fields rewritten to the row they sit on now, even when
	/// nothing was edited; a cleared association writes null. On records with edits, the
	/// identity values of the row's other records are copied into the matching reference fields
	/// as well. An edited reference field always wins.
	pub fn build(&self, rows: &[CompositeRow], tracker: &EditTracker) -> Patches {
		let mut patches = Patches::default();

		for row in rows {
			for (collection, _) in row.records.present() {
				let identity_field = self.registry.identity_field(collection);

				let mut fields = tracker
					.dirty_fields(row, collection)
					.into_iter()
					.filter(|(code, _)| code.as_str() != identity_field)
					.map(|(code, value)| (code.clone(), value.clone()))
					.collect::<Fields>();

				let edited = !fields.is_empty();

				for (code, value) in tracker.relocated_references(row, collection, self.registry) {
					fields.entry(code).or_insert(value);
				}

				if fields.is_empty() {
					continue;
				}

				let Some(key_value) = row.identity_value(collection, self.registry) else {
					warn!(
						row_id = %row.row_id,
						%collection,
						"Skipping patch for a record without identity value;"
					);
					patches.skipped.push(SkippedPatch {
						row_id: row.row_id,
						collection,
					});
					continue;
				};

				if edited {
					for other in collection.others() {
						let Some(other_value) = row.identity_value(other, self.registry) else {
							continue;
						};

						for descriptor in self.registry.reference_fields(collection, other) {
							fields
								.entry(descriptor.code.clone())
								.or_insert_with(|| Value::String(other_value.clone()));
						}
					}
				}

				patches.directives[collection].push(UpsertDirective {
					key: UpdateKey {
						field: identity_field.to_string(),
						value: key_value,
					},
					fields,
				});
			}
		}

		debug!(
			directives = patches.len(),
			skipped = patches.skipped.len(),
			"Built patches;"
		);

		patches
	}
}
