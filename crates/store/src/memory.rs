use ledger_model::{CollectionType, FieldCode, PerCollection, SourceRecord};

use std::{
	collections::BTreeMap,
	sync::atomic::{AtomicU64, AtomicUsize, Ordering},
	time::Duration,
};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, trace};

use super::{
	FieldMetadata, Predicate, RecordStoreClient, StoreError, UpdateKey, UpsertDirective,
	UpsertOutcome,
};

/// A call received by a [`MemoryStore`], kept in order of arrival.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
	FetchAll {
		collection: CollectionType,
		query: String,
	},
	FetchByKeys {
		collection: CollectionType,
		field: FieldCode,
		keys: usize,
		query_len: usize,
	},
	Upsert {
		collection: CollectionType,
		directives: usize,
	},
}

#[derive(Debug, Default, Clone, Copy)]
struct Faults {
	failing_fetches: u32,
	reject_upserts: bool,
}

#[derive(Deserialize)]
struct FixtureRecord {
	#[serde(default)]
	external_id: Option<String>,
	#[serde(default)]
	fields: Map<String, Value>,
}

/// In-memory [`RecordStoreClient`] with fault injection and a call log.
#[derive(Debug, Default)]
pub struct MemoryStore {
	records: RwLock<PerCollection<Vec<SourceRecord>>>,
	faults: Mutex<PerCollection<Faults>>,
	calls: Mutex<Vec<StoreCall>>,
	next_id: AtomicU64,
	max_query_len: Option<usize>,
	latency: Option<Duration>,
	in_flight: PerCollection<AtomicUsize>,
	peak_in_flight: PerCollection<AtomicUsize>,
}

impl MemoryStore {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Refuses queries longer than `limit` characters, like the hosted store does.
	#[must_use]
	pub const fn with_max_query_len(mut self, limit: usize) -> Self {
		self.max_query_len = Some(limit);
		self
	}

	/// Delays every keyed fetch by `latency`, so overlapping fetches can be observed.
	#[must_use]
	pub const fn with_latency(mut self, latency: Duration) -> Self {
		self.latency = Some(latency);
		self
	}

	/// Most keyed fetches against `collection` that were ever in flight at once.
	pub fn peak_in_flight(&self, collection: CollectionType) -> usize {
		self.peak_in_flight[collection].load(Ordering::Acquire)
	}

	/// Loads records from a JSON object keyed by collection name.
	///
	/// ```json
	/// { "SEAT": [{ "external_id": "1", "fields": { "seatNumber": "A1" } }] }
	/// ```
	pub fn from_json(json: &str) -> Result<Self, StoreError> {
		let fixture = serde_json::from_str::<BTreeMap<CollectionType, Vec<FixtureRecord>>>(json)?;
		let store = Self::new();
		let mut records = PerCollection::<Vec<SourceRecord>>::default();

		for (collection, entries) in fixture {
			for entry in entries {
				let external_id = entry.external_id.unwrap_or_else(|| store.allocate_id());
				let mut record = SourceRecord::new(collection, external_id);
				record.fields.extend(entry.fields);
				records[collection].push(record);
			}
		}

		Ok(Self {
			records: RwLock::new(records),
			..store
		})
	}

	pub async fn insert(&self, record: SourceRecord) {
		self.records.write().await[record.collection].push(record);
	}

	/// Current contents of `collection`.
	pub async fn records(&self, collection: CollectionType) -> Vec<SourceRecord> {
		self.records.read().await[collection].clone()
	}

	pub async fn record_count(&self) -> usize {
		self.records.read().await.values().map(Vec::len).sum()
	}

	/// Makes the next `times` fetches against `collection` fail.
	pub async fn fail_fetches(&self, collection: CollectionType, times: u32) {
		self.faults.lock().await[collection].failing_fetches = times;
	}

	/// Makes every upsert against `collection` fail as a whole.
	pub async fn reject_upserts(&self, collection: CollectionType) {
		self.faults.lock().await[collection].reject_upserts = true;
	}

	pub async fn calls(&self) -> Vec<StoreCall> {
		self.calls.lock().await.clone()
	}

	fn allocate_id(&self) -> String {
		(self.next_id.fetch_add(1, Ordering::Relaxed) + 1).to_string()
	}

	async fn check_fetch(&self, collection: CollectionType, query: &str) -> Result<(), StoreError> {
		{
			let mut faults = self.faults.lock().await;
			if faults[collection].failing_fetches > 0 {
				faults[collection].failing_fetches -= 1;
				return Err(StoreError::Unavailable {
					collection,
					reason: "injected fetch failure".to_string(),
				});
			}
		}

		match self.max_query_len {
			Some(limit) if query.len() > limit => Err(StoreError::QueryTooLong {
				collection,
				len: query.len(),
				limit,
			}),
			_ => Ok(()),
		}
	}

	async fn filter(&self, collection: CollectionType, predicate: &Predicate) -> Vec<SourceRecord> {
		self.records.read().await[collection]
			.iter()
			.filter(|record| predicate.matches(record))
			.cloned()
			.collect()
	}
}

#[async_trait]
impl RecordStoreClient for MemoryStore {
	async fn fetch_all(
		&self,
		collection: CollectionType,
		predicate: &Predicate,
	) -> Result<Vec<SourceRecord>, StoreError> {
		let query = predicate.to_query();

		self.calls.lock().await.push(StoreCall::FetchAll {
			collection,
			query: query.clone(),
		});

		self.check_fetch(collection, &query).await?;

		let records = self.filter(collection, predicate).await;
		trace!(%collection, %query, count = records.len(), "Served fetch_all;");

		Ok(records)
	}

	async fn fetch_by_keys(
		&self,
		collection: CollectionType,
		field_code: &str,
		keys: &[String],
	) -> Result<Vec<SourceRecord>, StoreError> {
		let predicate = Predicate::key_in(field_code, keys.iter().cloned());
		let query = predicate.to_query();

		self.calls.lock().await.push(StoreCall::FetchByKeys {
			collection,
			field: field_code.to_string(),
			keys: keys.len(),
			query_len: query.len(),
		});

		let in_flight = self.in_flight[collection].fetch_add(1, Ordering::AcqRel) + 1;
		self.peak_in_flight[collection].fetch_max(in_flight, Ordering::AcqRel);

		if let Some(latency) = self.latency {
			tokio::time::sleep(latency).await;
		}

		let checked = self.check_fetch(collection, &query).await;
		self.in_flight[collection].fetch_sub(1, Ordering::AcqRel);
		checked?;

		Ok(self.filter(collection, &predicate).await)
	}

	async fn upsert_by_key(
		&self,
		collection: CollectionType,
		directives: &[UpsertDirective],
	) -> Result<Vec<UpsertOutcome>, StoreError> {
		self.calls.lock().await.push(StoreCall::Upsert {
			collection,
			directives: directives.len(),
		});

		if self.faults.lock().await[collection].reject_upserts {
			return Err(StoreError::Rejected {
				collection,
				reason: "injected upsert rejection".to_string(),
			});
		}

		let mut records = self.records.write().await;

		let outcomes = directives
			.iter()
			.map(|UpsertDirective { key, fields }| {
				let UpdateKey { field, value } = key;

				if value.trim().is_empty() {
					return UpsertOutcome::Rejected {
						key: field.clone(),
						reason: "empty key value".to_string(),
					};
				}

				if let Some(record) = records[collection]
					.iter_mut()
					.find(|record| record.key_value(field).as_ref() == Some(value))
				{
					record
						.fields
						.extend(fields.iter().map(|(code, value)| (code.clone(), value.clone())));

					UpsertOutcome::Updated {
						external_id: record.external_id.clone(),
					}
				} else {
					let mut record = SourceRecord::new(collection, self.allocate_id());
					record.fields.clone_from(fields);
					record
						.fields
						.insert(field.clone(), Value::String(value.clone()));
					let external_id = record.external_id.clone();
					records[collection].push(record);

					UpsertOutcome::Created { external_id }
				}
			})
			.collect::<Vec<_>>();

		debug!(%collection, count = outcomes.len(), "Applied upserts;");

		Ok(outcomes)
	}

	async fn field_metadata(
		&self,
		collection: CollectionType,
	) -> Result<BTreeMap<FieldCode, FieldMetadata>, StoreError> {
		let records = self.records.read().await;

		Ok(records[collection]
			.iter()
			.flat_map(|record| record.fields.iter())
			.map(|(code, value)| {
				let kind = match value {
					Value::Number(_) => "NUMBER",
					Value::Array(_) => "MULTI_SELECT",
					Value::Bool(_) => "CHECK_BOX",
					_ => "SINGLE_LINE_TEXT",
				};

				(
					code.clone(),
					FieldMetadata {
						label: code.clone(),
						kind: kind.to_string(),
					},
				)
			})
			.collect())
	}
}
