use ledger_model::{CollectionType, FieldCode, FieldRegistry};

use thiserror::Error;
use tracing::debug;

use super::{
	row::{RowId, WorkingSet},
	tracker::EditTracker,
	Error,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExchangeError {
	#[error("cannot exchange a row with itself <row_id='{0}'>")]
	SameRow(RowId),
	#[error("field `{0}` is not swappable")]
	NotSwappable(FieldCode),
}

/// Swaps the record behind an identity field between two rows.
///
/// The whole association moves: the record, every field it carries and the baseline captured
/// for it. Two untouched rows therefore stay untouched after any number of exchanges.
#[derive(Debug, Clone, Copy)]
pub struct ExchangeEngine<'registry> {
	registry: &'registry FieldRegistry,
}

impl<'registry> ExchangeEngine<'registry> {
	pub const fn new(registry: &'registry FieldRegistry) -> Self {
		Self { registry }
	}

	/// Returns the collection whose association was swapped.
	pub fn exchange(
		&self,
		working: &mut WorkingSet,
		tracker: &mut EditTracker,
		row_a: RowId,
		row_b: RowId,
		field_code: &str,
	) -> Result<CollectionType, Error> {
		if row_a == row_b {
			return Err(ExchangeError::SameRow(row_a).into());
		}

		let collection = self
			.registry
			.swappable_collection(field_code)
			.ok_or_else(|| ExchangeError::NotSwappable(field_code.to_string()))?;

		for row_id in [row_a, row_b] {
			if working.get(row_id).is_none() {
				return Err(Error::RowNotFound(row_id));
			}
		}

		let Some((a, b)) = working.pair_mut(row_a, row_b) else {
			return Err(ExchangeError::SameRow(row_a).into());
		};

		debug!(
			%collection,
			from = ?a.identity_value(collection, self.registry),
			to = ?b.identity_value(collection, self.registry),
			"Exchanging association;"
		);

		std::mem::swap(&mut a.records[collection], &mut b.records[collection]);
		tracker.swap_baseline(row_a, row_b, collection);

		a.refresh_key(self.registry);
		b.refresh_key(self.registry);

		tracker.recheck(a);
		tracker.recheck(b);

		Ok(collection)
	}
}
