use ledger_model::{CollectionType, PerCollection};
use ledger_store::{RecordStoreClient, UpsertDirective, UpsertOutcome};

use futures_concurrency::future::Join;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use super::patch::{Patches, SkippedPatch};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectionReport {
	pub attempted: usize,
	pub succeeded: usize,
	pub failed: usize,
	/// Set when the whole upsert call failed.
	pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PersistReport {
	pub collections: PerCollection<CollectionReport>,
	pub skipped: Vec<SkippedPatch>,
}

impl PersistReport {
	pub fn succeeded(&self) -> usize {
		self.collections.values().map(|report| report.succeeded).sum()
	}

	pub fn failed(&self) -> usize {
		self.collections.values().map(|report| report.failed).sum()
	}

	pub fn is_complete(&self) -> bool {
		self.failed() == 0 && self.skipped.is_empty()
	}
}

/// Sends every non-empty directive list to the store, one call per collection.
///
/// Collections are written independently: a failed call is recorded and the others still go out.
/// Nothing is retried.
#[instrument(skip_all, fields(directives = patches.len()))]
pub(crate) async fn dispatch(store: &dyn RecordStoreClient, patches: Patches) -> PersistReport {
	let Patches {
		directives,
		skipped,
	} = patches;

	let results = directives
		.into_iter()
		.filter(|(_, list)| !list.is_empty())
		.map(|(collection, list)| async move {
			let report = upsert(store, collection, &list).await;
			(collection, report)
		})
		.collect::<Vec<_>>()
		.join()
		.await;

	let mut report = PersistReport {
		skipped,
		..PersistReport::default()
	};

	for (collection, collection_report) in results {
		report.collections[collection] = collection_report;
	}

	debug!(
		succeeded = report.succeeded(),
		failed = report.failed(),
		skipped = report.skipped.len(),
		"Persist done;"
	);

	report
}

async fn upsert(
	store: &dyn RecordStoreClient,
	collection: CollectionType,
	directives: &[UpsertDirective],
) -> CollectionReport {
	let attempted = directives.len();

	match store.upsert_by_key(collection, directives).await {
		Ok(outcomes) => {
			let succeeded = outcomes.iter().filter(|outcome| outcome.is_success()).count();

			for outcome in &outcomes {
				if let UpsertOutcome::Rejected { key, reason } = outcome {
					warn!(%collection, %key, %reason, "Store rejected a directive;");
				}
			}

			CollectionReport {
				attempted,
				succeeded,
				failed: attempted.saturating_sub(succeeded),
				error: None,
			}
		}
		Err(e) => {
			warn!(%collection, %e, "Upsert failed;");

			CollectionReport {
				attempted,
				succeeded: 0,
				failed: attempted,
				error: Some(e.to_string()),
			}
		}
	}
}
