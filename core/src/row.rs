use ledger_model::{
	CollectionType, FieldRegistry, IntegrationKey, KeyParts, PerCollection, SourceRecord,
};

use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session-local row identifier, meaningless outside the session that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(Uuid);

impl RowId {
	#[must_use]
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for RowId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for RowId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

/// Join of up to one record per collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositeRow {
	pub row_id: RowId,
	/// Key as of the last join or relocation; see [`CompositeRow::derive_key`] for the live one.
	pub integration_key: IntegrationKey,
	pub records: PerCollection<Option<SourceRecord>>,
}

impl CompositeRow {
	/// Builds a row and derives its key from the records' identity values.
	pub fn new(records: PerCollection<Option<SourceRecord>>, registry: &FieldRegistry) -> Self {
		let mut row = Self {
			row_id: RowId::new(),
			integration_key: IntegrationKey::encode(&KeyParts::default()),
			records,
		};
		row.refresh_key(registry);
		row
	}

	/// Builds a row keeping `integration_key` as given, even if it disagrees with the records.
	pub fn with_key(
		integration_key: IntegrationKey,
		records: PerCollection<Option<SourceRecord>>,
	) -> Self {
		Self {
			row_id: RowId::new(),
			integration_key,
			records,
		}
	}

	pub fn record(&self, collection: CollectionType) -> Option<&SourceRecord> {
		self.records[collection].as_ref()
	}

	pub fn record_mut(&mut self, collection: CollectionType) -> Option<&mut SourceRecord> {
		self.records[collection].as_mut()
	}

	/// Identity value of the record held for `collection`.
	pub fn identity_value(
		&self,
		collection: CollectionType,
		registry: &FieldRegistry,
	) -> Option<String> {
		self.record(collection)
			.and_then(|record| record.key_value(registry.identity_field(collection)))
	}

	pub fn key_parts(&self, registry: &FieldRegistry) -> KeyParts {
		PerCollection::from_fn(|collection| self.identity_value(collection, registry))
	}

	#[must_use]
	pub fn derive_key(&self, registry: &FieldRegistry) -> IntegrationKey {
		IntegrationKey::encode(&self.key_parts(registry))
	}

	pub fn refresh_key(&mut self, registry: &FieldRegistry) {
		self.integration_key = self.derive_key(registry);
	}

	pub fn record_count(&self) -> usize {
		self.records.present_count()
	}
}

#[derive(Debug, Clone, Copy)]
pub enum RowLookup<'key> {
	Id(RowId),
	Key(&'key IntegrationKey),
}

impl From<RowId> for RowLookup<'_> {
	fn from(row_id: RowId) -> Self {
		Self::Id(row_id)
	}
}

impl<'key> From<&'key IntegrationKey> for RowLookup<'key> {
	fn from(key: &'key IntegrationKey) -> Self {
		Self::Key(key)
	}
}

/// Ordered rows of one join, addressable by [`RowId`].
#[derive(Debug, Default)]
pub struct WorkingSet {
	rows: Vec<CompositeRow>,
	index: HashMap<RowId, usize>,
}

impl WorkingSet {
	pub fn from_rows(rows: Vec<CompositeRow>) -> Self {
		let mut working = Self {
			rows,
			index: HashMap::new(),
		};
		working.reindex();
		working
	}

	fn reindex(&mut self) {
		self.index = self
			.rows
			.iter()
			.enumerate()
			.map(|(idx, row)| (row.row_id, idx))
			.collect();
	}

	pub fn rows(&self) -> &[CompositeRow] {
		&self.rows
	}

	pub fn len(&self) -> usize {
		self.rows.len()
	}

	pub fn is_empty(&self) -> bool {
		self.rows.is_empty()
	}

	pub fn get(&self, row_id: RowId) -> Option<&CompositeRow> {
		self.index.get(&row_id).map(|idx| &self.rows[*idx])
	}

	pub fn get_mut(&mut self, row_id: RowId) -> Option<&mut CompositeRow> {
		self.index.get(&row_id).map(|idx| &mut self.rows[*idx])
	}

	/// First row matching `lookup`; keys are not guaranteed unique.
	pub fn find(&self, lookup: RowLookup<'_>) -> Option<&CompositeRow> {
		match lookup {
			RowLookup::Id(row_id) => self.get(row_id),
			RowLookup::Key(key) => self.rows.iter().find(|row| &row.integration_key == key),
		}
	}

	/// Mutable access to two distinct rows at once.
	pub fn pair_mut(
		&mut self,
		a: RowId,
		b: RowId,
	) -> Option<(&mut CompositeRow, &mut CompositeRow)> {
		let (ia, ib) = (*self.index.get(&a)?, *self.index.get(&b)?);

		if ia == ib {
			return None;
		}

		let (low, high) = (ia.min(ib), ia.max(ib));
		let (left, right) = self.rows.split_at_mut(high);
		let (low_row, high_row) = (&mut left[low], &mut right[0]);

		Some(if ia < ib {
			(low_row, high_row)
		} else {
			(high_row, low_row)
		})
	}

	/// Inserts `row` right after `anchor`, or at the end when `anchor` is unknown.
	pub fn insert_after(&mut self, anchor: RowId, row: CompositeRow) {
		let position = self
			.index
			.get(&anchor)
			.map_or(self.rows.len(), |idx| idx + 1);

		self.rows.insert(position, row);
		self.reindex();
	}

	/// Records across all rows.
	pub fn record_count(&self) -> usize {
		self.rows.iter().map(CompositeRow::record_count).sum()
	}
}

#[cfg(test)]
mod tests {
	use crate::config::LedgerConfig;

	use super::*;

	fn registry() -> FieldRegistry {
		LedgerConfig::default().validate().expect("valid default")
	}

	fn seat_row(seat: &str, registry: &FieldRegistry) -> CompositeRow {
		let mut records = PerCollection::default();
		records[CollectionType::Seat] =
			Some(SourceRecord::new(CollectionType::Seat, seat).with_field("seatNumber", seat));
		CompositeRow::new(records, registry)
	}

	#[test]
	fn derives_key_from_identity_values() {
		let registry = registry();
		let row = seat_row("A1", &registry);

		assert_eq!(row.integration_key.as_str(), "DEVICE:|USER:|EXTENSION:|SEAT:A1");
		assert_eq!(row.record_count(), 1);
	}

	#[test]
	fn pair_mut_preserves_argument_order() {
		let registry = registry();
		let rows = vec![seat_row("A1", &registry), seat_row("A2", &registry)];
		let (first, second) = (rows[0].row_id, rows[1].row_id);
		let mut working = WorkingSet::from_rows(rows);

		let (b, a) = working.pair_mut(second, first).expect("distinct rows");
		assert_eq!(b.row_id, second);
		assert_eq!(a.row_id, first);

		assert!(working.pair_mut(first, first).is_none());
	}

	#[test]
	fn inserts_after_anchor() {
		let registry = registry();
		let rows = vec![seat_row("A1", &registry), seat_row("A3", &registry)];
		let anchor = rows[0].row_id;
		let mut working = WorkingSet::from_rows(rows);

		let inserted = seat_row("A2", &registry);
		let inserted_id = inserted.row_id;
		working.insert_after(anchor, inserted);

		assert_eq!(working.rows()[1].row_id, inserted_id);
		assert_eq!(
			working.get(inserted_id).map(|row| row.integration_key.as_str()),
			Some("DEVICE:|USER:|EXTENSION:|SEAT:A2")
		);
		assert_eq!(working.record_count(), 3);
	}
}
