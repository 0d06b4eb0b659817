use ledger_model::{CollectionType, FieldRef, FieldRegistry, PerCollection};

use thiserror::Error;
use tracing::debug;

use super::{
	row::{CompositeRow, RowId, WorkingSet},
	tracker::EditTracker,
	Error,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SeparationError {
	#[error("no fields to separate")]
	NoFields,
	#[error("fields span more than one collection: {first} and {second}")]
	MixedCollections {
		first: CollectionType,
		second: CollectionType,
	},
	#[error("row has no {0} record to separate")]
	CollectionAbsent(CollectionType),
	#[error("{0} record has no identity value to anchor a new row")]
	MissingIdentity(CollectionType),
	#[error("field `{}` is neither declared nor present on the {} record", .0.code, .0.collection)]
	UnknownField(FieldRef),
}

/// Splits one collection's record off a row into a new row of its own.
#[derive(Debug, Clone, Copy)]
pub struct SeparationEngine<'registry> {
	registry: &'registry FieldRegistry,
}

impl<'registry> SeparationEngine<'registry> {
	pub const fn new(registry: &'registry FieldRegistry) -> Self {
		Self { registry }
	}

	/// Returns the id of the row created right after `source`.
	pub fn separate(
		&self,
		working: &mut WorkingSet,
		tracker: &mut EditTracker,
		source: RowId,
		target_fields: &[FieldRef],
	) -> Result<RowId, Error> {
		let collection = Self::target_collection(target_fields)?;

		let row = working.get_mut(source).ok_or(Error::RowNotFound(source))?;
		let record = row
			.record(collection)
			.ok_or(SeparationError::CollectionAbsent(collection))?;

		if let Some(unknown) = target_fields.iter().find(|field| {
			self.registry.descriptor(collection, &field.code).is_none()
				&& record.field(&field.code).is_none()
		}) {
			return Err(SeparationError::UnknownField(unknown.clone()).into());
		}

		if row.identity_value(collection, self.registry).is_none() {
			return Err(SeparationError::MissingIdentity(collection).into());
		}

		let mut records = PerCollection::default();
		records[collection] = row.records[collection].take();
		row.refresh_key(self.registry);

		let new_row = CompositeRow::new(records, self.registry);
		let new_row_id = new_row.row_id;

		debug!(
			%collection,
			%source,
			new_row = %new_row_id,
			key = %new_row.integration_key,
			"Separated association;"
		);

		tracker.move_baseline(source, new_row_id, collection);
		tracker.recheck(&new_row);
		if let Some(row) = working.get(source) {
			tracker.recheck(row);
		}

		working.insert_after(source, new_row);

		Ok(new_row_id)
	}

	fn target_collection(target_fields: &[FieldRef]) -> Result<CollectionType, SeparationError> {
		let first = target_fields
			.first()
			.map(|field| field.collection)
			.ok_or(SeparationError::NoFields)?;

		if let Some(other) = target_fields.iter().find(|field| field.collection != first) {
			return Err(SeparationError::MixedCollections {
				first,
				second: other.collection,
			});
		}

		Ok(first)
	}
}
