use ledger_model::{CollectionType, FieldCode, FieldRegistry, FieldValue};

use thiserror::Error;

use super::{
	row::{RowId, WorkingSet},
	tracker::EditTracker,
	Error,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EditError {
	#[error("row has no {0} record to edit")]
	CollectionAbsent(CollectionType),
	#[error("field `{code}` is not declared for {collection}")]
	UnknownField {
		collection: CollectionType,
		code: FieldCode,
	},
	#[error("field `{code}` of {collection} cannot be edited directly")]
	NotEditable {
		collection: CollectionType,
		code: FieldCode,
	},
}

/// Writes a user edit into a row and updates its modified set.
pub(crate) fn apply(
	registry: &FieldRegistry,
	working: &mut WorkingSet,
	tracker: &mut EditTracker,
	row_id: RowId,
	collection: CollectionType,
	code: &str,
	value: FieldValue,
) -> Result<(), Error> {
	let descriptor = registry
		.descriptor(collection, code)
		.ok_or_else(|| EditError::UnknownField {
			collection,
			code: code.to_string(),
		})?;

	if !descriptor.editable() {
		return Err(EditError::NotEditable {
			collection,
			code: code.to_string(),
		}
		.into());
	}

	let row = working.get_mut(row_id).ok_or(Error::RowNotFound(row_id))?;
	let record = row
		.record_mut(collection)
		.ok_or(EditError::CollectionAbsent(collection))?;

	record.fields.insert(code.to_string(), value);
	tracker.note_edit(row, collection, code);

	Ok(())
}
