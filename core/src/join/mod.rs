use ledger_model::{CollectionType, FieldRegistry, PerCollection, SourceRecord};
use ledger_store::{Predicate, RecordStoreClient, StoreError};

use std::{
	collections::{BTreeSet, HashMap, HashSet},
	future::Future,
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc,
	},
	time::Duration,
};

use backoff::ExponentialBackoffBuilder;
use futures::{stream, StreamExt};
use futures_concurrency::future::Join;
use serde::Serialize;
use strum::Display;
use tracing::{debug, instrument, trace, warn};

use super::{
	config::{LedgerConfig, Limits},
	row::CompositeRow,
	Error,
};

mod batch;

pub use batch::plan_batches;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JoinStage {
	Seed,
	CrossFetch,
}

/// A collection whose fetch kept failing and was joined as if it were empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchFailure {
	pub collection: CollectionType,
	pub stage: JoinStage,
	pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JoinReport {
	pub generation: u64,
	pub seeds: usize,
	pub rows: usize,
	/// Records received per collection, seeds included.
	pub fetched: PerCollection<usize>,
	pub failures: Vec<FetchFailure>,
}

impl JoinReport {
	pub fn is_degraded(&self) -> bool {
		!self.failures.is_empty()
	}
}

#[derive(Debug)]
pub struct JoinOutcome {
	pub generation: u64,
	pub rows: Vec<CompositeRow>,
	pub report: JoinReport,
}

/// Builds composite rows from a seed fetch on the anchor collections and keyed fetches on the rest.
#[derive(Clone)]
pub struct JoinEngine {
	store: Arc<dyn RecordStoreClient>,
	registry: Arc<FieldRegistry>,
	anchors: Vec<CollectionType>,
	limits: Limits,
	generation: u64,
	current: Arc<AtomicU64>,
}

impl std::fmt::Debug for JoinEngine {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("JoinEngine")
			.field("anchors", &self.anchors)
			.field("limits", &self.limits)
			.field("generation", &self.generation)
			.finish_non_exhaustive()
	}
}

impl JoinEngine {
	pub fn new(
		store: Arc<dyn RecordStoreClient>,
		registry: Arc<FieldRegistry>,
		config: &LedgerConfig,
	) -> Self {
		Self {
			store,
			registry,
			anchors: config.anchors.clone(),
			limits: config.limits.clone(),
			generation: 0,
			current: Arc::new(AtomicU64::new(0)),
		}
	}

	/// Ties this engine to a session's generation counter.
	pub(crate) fn tagged(mut self, generation: u64, current: Arc<AtomicU64>) -> Self {
		self.generation = generation;
		self.current = current;
		self
	}

	pub const fn generation(&self) -> u64 {
		self.generation
	}

	/// Whether no newer join was started since this one.
	pub fn is_current(&self) -> bool {
		self.current.load(Ordering::Acquire) == self.generation
	}

	fn ensure_current(&self) -> Result<(), Error> {
		let current = self.current.load(Ordering::Acquire);
		if current == self.generation {
			Ok(())
		} else {
			Err(Error::SupersededJoin {
				generation: self.generation,
				current,
			})
		}
	}

	#[instrument(skip_all, fields(generation = self.generation, query = %predicate.to_query()), err)]
	pub async fn run(&self, predicate: &Predicate) -> Result<JoinOutcome, Error> {
		let mut report = JoinReport {
			generation: self.generation,
			..JoinReport::default()
		};

		let seeds = self.fetch_seeds(predicate, &mut report).await;
		report.seeds = seeds.len();
		debug!(seeds = seeds.len(), "Seed fetch done;");

		self.ensure_current()?;

		let fetched = self.cross_fetch(&seeds, &mut report).await?;
		debug!(fetched = ?report.fetched, "Cross fetch done;");

		self.ensure_current()?;

		let rows = self.assemble(seeds, fetched);
		report.rows = rows.len();

		if report.is_degraded() {
			warn!(failures = report.failures.len(), rows = rows.len(), "Join completed degraded;");
		} else {
			debug!(rows = rows.len(), "Join completed;");
		}

		Ok(JoinOutcome {
			generation: self.generation,
			rows,
			report,
		})
	}

	async fn fetch_seeds(&self, predicate: &Predicate, report: &mut JoinReport) -> Vec<SourceRecord> {
		let results = self
			.anchors
			.iter()
			.map(|anchor| {
				let anchor = *anchor;
				async move {
					let result = self
						.with_retry(anchor, || self.store.fetch_all(anchor, predicate))
						.await;
					(anchor, result)
				}
			})
			.collect::<Vec<_>>()
			.join()
			.await;

		let mut seeds = vec![];
		for (anchor, result) in results {
			match result {
				Ok(records) => {
					report.fetched[anchor] += records.len();
					seeds.extend(records);
				}
				Err(e) => report.failures.push(degrade(anchor, JoinStage::Seed, &e)),
			}
		}

		seeds
	}

	/// Fetches, for every collection, the records the seeds refer to.
	async fn cross_fetch(
		&self,
		seeds: &[SourceRecord],
		report: &mut JoinReport,
	) -> Result<PerCollection<Vec<SourceRecord>>, Error> {
		let mut planned = vec![];

		for target in CollectionType::ALL {
			let keys = seeds
				.iter()
				.filter(|seed| seed.collection != target)
				.flat_map(|seed| {
					self.registry
						.reference_fields(seed.collection, target)
						.filter_map(|descriptor| seed.key_value(&descriptor.code))
				})
				.collect::<BTreeSet<_>>()
				.into_iter()
				.collect::<Vec<_>>();

			if keys.is_empty() {
				continue;
			}

			let field = self.registry.identity_field(target);
			let batches = plan_batches(target, field, &keys, &self.limits)?;
			trace!(%target, keys = keys.len(), batches = batches.len(), "Planned cross fetch;");
			planned.push((target, batches));
		}

		let results = planned
			.into_iter()
			.map(|(target, batches)| async move {
				(target, self.fetch_collection(target, batches).await)
			})
			.collect::<Vec<_>>()
			.join()
			.await;

		let mut fetched = PerCollection::<Vec<SourceRecord>>::default();
		for (target, result) in results {
			match result {
				Ok(records) => {
					report.fetched[target] += records.len();
					fetched[target] = records;
				}
				Err(e) => report
					.failures
					.push(degrade(target, JoinStage::CrossFetch, &e)),
			}
		}

		Ok(fetched)
	}

	/// All batches of one collection; a single failed batch fails the collection.
	async fn fetch_collection(
		&self,
		target: CollectionType,
		batches: Vec<Vec<String>>,
	) -> Result<Vec<SourceRecord>, StoreError> {
		let field = self.registry.identity_field(target);

		let results = stream::iter(batches)
			.map(|batch| async move {
				self.with_retry(target, || self.store.fetch_by_keys(target, field, &batch))
					.await
			})
			.buffered(self.limits.fetch_concurrency)
			.collect::<Vec<_>>()
			.await;

		let mut records = vec![];
		for result in results {
			records.extend(result?);
		}

		Ok(records)
	}

	async fn with_retry<T, F, Fut>(&self, collection: CollectionType, fetch: F) -> Result<T, StoreError>
	where
		F: Fn() -> Fut,
		Fut: Future<Output = Result<T, StoreError>>,
	{
		let max_attempts = self.limits.fetch_retries;
		let backoff = ExponentialBackoffBuilder::new()
			.with_initial_interval(Duration::from_millis(self.limits.retry_initial_ms))
			.with_max_elapsed_time(None)
			.build();

		let mut attempt = 0;

		backoff::future::retry(backoff, || {
			attempt += 1;
			let attempt = attempt;
			let pending = fetch();

			async move {
				pending.await.map_err(|e| {
					if attempt >= max_attempts {
						backoff::Error::permanent(e)
					} else {
						debug!(%collection, attempt, %e, "Store fetch failed, retrying;");
						backoff::Error::transient(e)
					}
				})
			}
		})
		.await
	}

	/// One row per seed, with the fetched records it refers to attached; a record joins one row at most.
	fn assemble(
		&self,
		seeds: Vec<SourceRecord>,
		fetched: PerCollection<Vec<SourceRecord>>,
	) -> Vec<CompositeRow> {
		let index = self.index(&seeds, fetched);
		let mut attached = HashSet::<(CollectionType, String)>::new();
		let mut rows = Vec::with_capacity(seeds.len());

		for seed in seeds {
			if attached.contains(&(seed.collection, seed.external_id.clone())) {
				trace!(collection = %seed.collection, external_id = %seed.external_id, "Seed already joined;");
				continue;
			}

			let mut records = PerCollection::<Option<SourceRecord>>::default();

			for target in seed.collection.others() {
				let Some(key) = self
					.registry
					.reference_fields(seed.collection, target)
					.find_map(|descriptor| seed.key_value(&descriptor.code))
				else {
					continue;
				};

				let Some(candidates) = index[target].get(&key) else {
					continue;
				};

				if candidates.len() > 1 {
					warn!(
						%target,
						%key,
						candidates = candidates.len(),
						"Several records share an identity value, attaching the first;"
					);
				}

				// A record joins at most one row; later referrers keep their reference but no copy
				let Some(candidate) = candidates.first() else {
					continue;
				};

				if attached.contains(&(target, candidate.external_id.clone())) {
					debug!(
						%target,
						%key,
						external_id = %candidate.external_id,
						"Record already joined to an earlier row;"
					);
					continue;
				}

				attached.insert((target, candidate.external_id.clone()));
				records[target] = Some(candidate.clone());
			}

			let collection = seed.collection;
			records[collection] = Some(seed);

			for (collection, record) in records.present() {
				attached.insert((collection, record.external_id.clone()));
			}

			rows.push(CompositeRow::new(records, &self.registry));
		}

		rows
	}

	/// Candidate records per collection and identity value, fetched records before seeds.
	fn index(
		&self,
		seeds: &[SourceRecord],
		fetched: PerCollection<Vec<SourceRecord>>,
	) -> PerCollection<HashMap<String, Vec<SourceRecord>>> {
		let mut index = PerCollection::<HashMap<String, Vec<SourceRecord>>>::default();
		let mut seen = HashSet::<(CollectionType, String)>::new();

		let all = fetched
			.into_iter()
			.flat_map(|(_, records)| records)
			.chain(seeds.iter().cloned());

		for record in all {
			if !seen.insert((record.collection, record.external_id.clone())) {
				continue;
			}

			if let Some(value) = record.key_value(self.registry.identity_field(record.collection)) {
				index[record.collection].entry(value).or_default().push(record);
			}
		}

		index
	}
}

fn degrade(collection: CollectionType, stage: JoinStage, e: &StoreError) -> FetchFailure {
	warn!(%collection, %stage, %e, "Fetch failed, joining collection as empty;");

	FetchFailure {
		collection,
		stage,
		message: e.to_string(),
	}
}

#[cfg(test)]
mod tests {
	use ledger_store::{MemoryStore, StoreCall};

	use pretty_assertions::assert_eq;
	use serde_json::json;

	use super::*;

	fn config() -> LedgerConfig {
		LedgerConfig {
			limits: Limits {
				retry_initial_ms: 1,
				..Limits::default()
			},
			..LedgerConfig::default()
		}
	}

	fn engine(store: Arc<MemoryStore>, config: &LedgerConfig) -> JoinEngine {
		let registry = Arc::new(config.validate().expect("valid config"));
		JoinEngine::new(store, registry, config)
	}

	fn store() -> Arc<MemoryStore> {
		Arc::new(
			MemoryStore::from_json(
				&json!({
					"SEAT": [
						{ "external_id": "s1", "fields": { "seatNumber": "A1", "assetNumber": "PC-1", "userCode": "U-1" } },
						{ "external_id": "s2", "fields": { "seatNumber": "A2", "assetNumber": "PC-404" } },
						{ "external_id": "s3", "fields": { "seatNumber": "A3" } }
					],
					"DEVICE": [
						{ "external_id": "d1", "fields": { "assetNumber": "PC-1", "hostName": "ws-01" } },
						{ "external_id": "d2", "fields": { "assetNumber": "PC-2" } }
					],
					"USER": [
						{ "external_id": "u1", "fields": { "userCode": "U-1", "userName": "Sam" } }
					]
				})
				.to_string(),
			)
			.expect("valid fixture"),
		)
	}

	#[tokio::test]
	async fn one_row_per_seed() {
		let config = config();
		let outcome = engine(store(), &config)
			.run(&Predicate::All)
			.await
			.expect("join");

		let keys = outcome
			.rows
			.iter()
			.map(|row| row.integration_key.as_str())
			.collect::<Vec<_>>();

		assert_eq!(
			keys,
			[
				"DEVICE:PC-1|USER:U-1|EXTENSION:|SEAT:A1",
				"DEVICE:|USER:|EXTENSION:|SEAT:A2",
				"DEVICE:|USER:|EXTENSION:|SEAT:A3",
			]
		);
		assert_eq!(outcome.report.seeds, 3);
		assert_eq!(outcome.report.fetched[CollectionType::Device], 1);
		assert!(!outcome.report.is_degraded());
	}

	#[tokio::test]
	async fn failing_collection_degrades_to_empty() {
		let config = config();
		let store = store();
		store.fail_fetches(CollectionType::Device, 10).await;

		let outcome = engine(Arc::clone(&store), &config)
			.run(&Predicate::All)
			.await
			.expect("join");

		assert_eq!(outcome.rows.len(), 3);
		assert!(outcome.rows[0].record(CollectionType::Device).is_none());
		assert!(outcome.rows[0].record(CollectionType::User).is_some());
		assert_eq!(
			outcome
				.report
				.failures
				.iter()
				.map(|failure| (failure.collection, failure.stage))
				.collect::<Vec<_>>(),
			[(CollectionType::Device, JoinStage::CrossFetch)]
		);

		let device_calls = store
			.calls()
			.await
			.into_iter()
			.filter(|call| {
				matches!(call, StoreCall::FetchByKeys { collection: CollectionType::Device, .. })
			})
			.count();
		assert_eq!(device_calls, 3);
	}

	#[tokio::test]
	async fn transient_failures_are_retried() {
		let config = config();
		let store = store();
		store.fail_fetches(CollectionType::Seat, 2).await;

		let outcome = engine(store, &config)
			.run(&Predicate::All)
			.await
			.expect("join");

		assert_eq!(outcome.rows.len(), 3);
		assert!(!outcome.report.is_degraded());
	}

	#[tokio::test]
	async fn multiple_anchors_do_not_duplicate_rows() {
		let config = LedgerConfig {
			anchors: vec![CollectionType::Seat, CollectionType::Device],
			..config()
		};

		let outcome = engine(store(), &config)
			.run(&Predicate::All)
			.await
			.expect("join");

		let keys = outcome
			.rows
			.iter()
			.map(|row| row.integration_key.as_str())
			.collect::<Vec<_>>();

		assert_eq!(
			keys,
			[
				"DEVICE:PC-1|USER:U-1|EXTENSION:|SEAT:A1",
				"DEVICE:|USER:|EXTENSION:|SEAT:A2",
				"DEVICE:|USER:|EXTENSION:|SEAT:A3",
				"DEVICE:PC-2|USER:|EXTENSION:|SEAT:",
			]
		);
	}

	#[tokio::test]
	async fn shared_references_attach_the_record_once() {
		let config = config();
		let store = Arc::new(
			MemoryStore::from_json(
				&json!({
					"SEAT": [
						{ "external_id": "s1", "fields": { "seatNumber": "A1", "assetNumber": "PC-1" } },
						{ "external_id": "s2", "fields": { "seatNumber": "A2", "assetNumber": "PC-1" } }
					],
					"DEVICE": [
						{ "external_id": "d1", "fields": { "assetNumber": "PC-1" } }
					]
				})
				.to_string(),
			)
			.expect("valid fixture"),
		);

		let outcome = engine(store, &config)
			.run(&Predicate::All)
			.await
			.expect("join");

		let keys = outcome
			.rows
			.iter()
			.map(|row| row.integration_key.as_str())
			.collect::<Vec<_>>();

		assert_eq!(
			keys,
			[
				"DEVICE:PC-1|USER:|EXTENSION:|SEAT:A1",
				"DEVICE:|USER:|EXTENSION:|SEAT:A2",
			]
		);
		assert_eq!(
			outcome
				.rows
				.iter()
				.map(CompositeRow::record_count)
				.sum::<usize>(),
			3
		);
	}

	#[tokio::test]
	async fn stale_engine_stops() {
		let config = config();
		let current = Arc::new(AtomicU64::new(2));
		let engine = engine(store(), &config).tagged(1, Arc::clone(&current));

		assert!(!engine.is_current());
		assert!(matches!(
			engine.run(&Predicate::All).await,
			Err(Error::SupersededJoin {
				generation: 1,
				current: 2
			})
		));
	}
}
