use ledger_model::CollectionType;
use ledger_store::Predicate;

use tracing::trace;

use crate::{config::Limits, Error};

/// Quotes around a literal plus the `", "` separator.
const PER_KEY_OVERHEAD: usize = 4;

/// Splits `keys` into batches whose `field in (...)` query fits `limits.max_query_len`.
///
/// The batch size is estimated from the average key length and clamped to the configured bounds;
/// any batch whose rendered query is still too long is halved until it fits. A key that does not
/// fit on its own cannot be fetched at all.
pub fn plan_batches(
	collection: CollectionType,
	field: &str,
	keys: &[String],
	limits: &Limits,
) -> Result<Vec<Vec<String>>, Error> {
	if keys.is_empty() {
		return Ok(vec![]);
	}

	let overhead = query_len(field, &[]);
	let average_key_len = keys.iter().map(String::len).sum::<usize>().div_ceil(keys.len());

	let batch_size = (limits.max_query_len.saturating_sub(overhead)
		/ (average_key_len + PER_KEY_OVERHEAD))
		.clamp(limits.min_batch, limits.max_batch);

	trace!(%collection, field, keys = keys.len(), batch_size, "Planning key batches;");

	let mut batches = vec![];
	for chunk in keys.chunks(batch_size) {
		split_to_fit(collection, field, chunk, limits.max_query_len, &mut batches)?;
	}

	Ok(batches)
}

fn split_to_fit(
	collection: CollectionType,
	field: &str,
	keys: &[String],
	limit: usize,
	out: &mut Vec<Vec<String>>,
) -> Result<(), Error> {
	let len = query_len(field, keys);

	if len <= limit {
		out.push(keys.to_vec());
		return Ok(());
	}

	if keys.len() == 1 {
		return Err(Error::BatchLimitExceeded {
			collection,
			query_len: len,
			limit,
		});
	}

	let (left, right) = keys.split_at(keys.len() / 2);
	split_to_fit(collection, field, left, limit, out)?;
	split_to_fit(collection, field, right, limit, out)
}

fn query_len(field: &str, keys: &[String]) -> usize {
	Predicate::key_in(field, keys.iter().cloned())
		.to_query()
		.len()
}
