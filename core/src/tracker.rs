use ledger_model::{
	CollectionType, FieldCode, FieldRef, FieldRegistry, FieldValue, Fields, KeyParts, PerCollection,
};

use std::collections::{BTreeSet, HashMap};

use serde_json::Value;

use super::row::{CompositeRow, RowId};

type Baseline = PerCollection<Option<Fields>>;

/// Per record slot, the key parts of the row the record was joined in.
type Companions = PerCollection<Option<KeyParts>>;

/// Field values captured when a row was joined, and the fields that have diverged from them since.
///
/// Exchange and separation move baselines along with the records they relocate, so only edits
/// ever show up as modifications. Relocations are tracked apart from edits: every record also
/// remembers which identity values it was joined alongside.
#[derive(Debug, Default)]
pub struct EditTracker {
	baselines: HashMap<RowId, Baseline>,
	companions: HashMap<RowId, Companions>,
	modified: HashMap<RowId, BTreeSet<FieldRef>>,
}

impl EditTracker {
	pub fn from_rows(rows: &[CompositeRow], registry: &FieldRegistry) -> Self {
		let mut tracker = Self::default();
		for row in rows {
			tracker.snapshot(row, registry);
		}
		tracker
	}

	/// Takes `row`'s current values and associations as its baseline.
	pub fn snapshot(&mut self, row: &CompositeRow, registry: &FieldRegistry) {
		self.baselines.insert(
			row.row_id,
			row.records
				.map(|_, record| record.as_ref().map(|record| record.fields.clone())),
		);

		let parts = row.key_parts(registry);
		self.companions.insert(
			row.row_id,
			row.records
				.map(|_, record| record.as_ref().map(|_| parts.clone())),
		);

		self.modified.remove(&row.row_id);
	}

	pub fn baseline_value(
		&self,
		row_id: RowId,
		collection: CollectionType,
		code: &str,
	) -> Option<&FieldValue> {
		self.baselines
			.get(&row_id)
			.and_then(|baseline| baseline[collection].as_ref())
			.and_then(|fields| fields.get(code))
	}

	pub fn is_field_modified(&self, row: &CompositeRow, collection: CollectionType, code: &str) -> bool {
		differs(
			row.record(collection).and_then(|record| record.field(code)),
			self.baseline_value(row.row_id, collection, code),
		)
	}

	pub fn is_row_modified(&self, row_id: RowId) -> bool {
		self.modified
			.get(&row_id)
			.is_some_and(|fields| !fields.is_empty())
	}

	pub fn modified_fields(&self, row_id: RowId) -> impl Iterator<Item = &FieldRef> {
		self.modified.get(&row_id).into_iter().flatten()
	}

	/// Current values of `collection`'s fields that differ from the baseline.
	pub fn dirty_fields<'row>(
		&self,
		row: &'row CompositeRow,
		collection: CollectionType,
	) -> Vec<(&'row FieldCode, &'row FieldValue)> {
		let Some(record) = row.record(collection) else {
			return vec![];
		};

		record
			.fields
			.iter()
			.filter(|(code, value)| {
				differs(
					Some(value),
					self.baseline_value(row.row_id, collection, code),
				)
			})
			.collect()
	}

	/// Rescans every field of `row` against its baseline, returning whether anything differs.
	pub fn recheck(&mut self, row: &CompositeRow) -> bool {
		let empty = Baseline::default();
		let baseline = self.baselines.get(&row.row_id).unwrap_or(&empty);

		let modified = CollectionType::ALL
			.into_iter()
			.flat_map(|collection| {
				let current = row.record(collection).map(|record| &record.fields);
				let before = baseline[collection].as_ref();

				current
					.into_iter()
					.chain(before)
					.flat_map(|fields| fields.keys())
					.collect::<BTreeSet<_>>()
					.into_iter()
					.filter(move |code| {
						differs(
							current.and_then(|fields| fields.get(*code)),
							before.and_then(|fields| fields.get(*code)),
						)
					})
					.map(move |code| FieldRef::new(collection, code.clone()))
			})
			.collect::<BTreeSet<_>>();

		let is_modified = !modified.is_empty();
		self.modified.insert(row.row_id, modified);
		is_modified
	}

	/// Whether any record on `row` now sits next to other identity values than it was joined with.
	pub fn is_relocated(&self, row: &CompositeRow, registry: &FieldRegistry) -> bool {
		let current = row.key_parts(registry);

		row.records.present().any(|(collection, _)| {
			self.joined_parts(row.row_id, collection)
				.map_or(true, |joined| *joined != current)
		})
	}

	/// Reference fields of `collection`'s record that must change to match the row it sits on now.
	///
	/// Only associations that changed since the join are considered; a reference that already
	/// disagreed at join time is left for the consistency check. Cleared associations yield null.
	pub fn relocated_references(
		&self,
		row: &CompositeRow,
		collection: CollectionType,
		registry: &FieldRegistry,
	) -> Vec<(FieldCode, FieldValue)> {
		let (Some(record), Some(joined)) =
			(row.record(collection), self.joined_parts(row.row_id, collection))
		else {
			return vec![];
		};

		collection
			.others()
			.filter_map(|other| {
				let current = row.identity_value(other, registry);
				(current != joined[other]).then_some((other, current))
			})
			.flat_map(|(other, current)| {
				let value = current.map_or(Value::Null, Value::String);
				registry
					.reference_fields(collection, other)
					.map(move |descriptor| (descriptor.code.clone(), value.clone()))
			})
			.filter(|(code, value)| differs(Some(value), record.field(code)))
			.collect()
	}

	fn joined_parts(&self, row_id: RowId, collection: CollectionType) -> Option<&KeyParts> {
		self.companions
			.get(&row_id)
			.and_then(|companions| companions[collection].as_ref())
	}

	/// Updates the modified set for a single edited field.
	pub fn note_edit(&mut self, row: &CompositeRow, collection: CollectionType, code: &str) {
		let field = FieldRef::new(collection, code);
		let is_modified = self.is_field_modified(row, collection, code);
		let modified = self.modified.entry(row.row_id).or_default();

		if is_modified {
			modified.insert(field);
		} else {
			modified.remove(&field);
		}
	}

	/// Swaps `collection`'s baseline between two rows, mirroring a swapped association.
	pub(crate) fn swap_baseline(&mut self, a: RowId, b: RowId, collection: CollectionType) {
		let from_a = self.take_baseline(a, collection);
		let from_b = self.take_baseline(b, collection);

		self.put_baseline(a, collection, from_b);
		self.put_baseline(b, collection, from_a);
	}

	/// Moves `collection`'s baseline from one row to another, mirroring a moved association.
	pub(crate) fn move_baseline(&mut self, from: RowId, to: RowId, collection: CollectionType) {
		let moved = self.take_baseline(from, collection);
		self.put_baseline(to, collection, moved);
	}

	fn take_baseline(
		&mut self,
		row_id: RowId,
		collection: CollectionType,
	) -> (Option<Fields>, Option<KeyParts>) {
		let fields = self
			.baselines
			.get_mut(&row_id)
			.and_then(|baseline| baseline[collection].take());
		let joined = self
			.companions
			.get_mut(&row_id)
			.and_then(|companions| companions[collection].take());

		(fields, joined)
	}

	fn put_baseline(
		&mut self,
		row_id: RowId,
		collection: CollectionType,
		(fields, joined): (Option<Fields>, Option<KeyParts>),
	) {
		self.baselines.entry(row_id).or_default()[collection] = fields;
		self.companions.entry(row_id).or_default()[collection] = joined;
	}
}

/// A missing value and JSON null are the same thing.
fn differs(current: Option<&FieldValue>, baseline: Option<&FieldValue>) -> bool {
	current.unwrap_or(&Value::Null) != baseline.unwrap_or(&Value::Null)
}
