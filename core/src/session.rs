use ledger_model::{CollectionType, FieldCode, FieldRef, FieldRegistry, FieldValue};
use ledger_store::{FieldMetadata, Predicate, RecordStoreClient, StoreError};

use std::{
	collections::BTreeMap,
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc,
	},
};

use tokio::sync::broadcast;
use tracing::{debug, info, instrument};

use super::{
	config::LedgerConfig,
	consistency::{self, ConsistencyIssue},
	edit,
	event::{EventBus, LedgerEvent},
	exchange::ExchangeEngine,
	join::{JoinEngine, JoinOutcome, JoinReport},
	patch::{PatchBuilder, Patches},
	persist::{self, PersistReport},
	row::{CompositeRow, RowId, RowLookup, WorkingSet},
	separation::SeparationEngine,
	tracker::EditTracker,
	Error,
};

/// One reconciliation session: a working set of composite rows, the baseline they are compared
/// against, and the store they were read from.
///
/// Mutations are synchronous and apply values and baselines together; only joins, persisting and
/// metadata lookups talk to the store.
pub struct LedgerSession {
	store: Arc<dyn RecordStoreClient>,
	registry: Arc<FieldRegistry>,
	config: LedgerConfig,
	working: WorkingSet,
	tracker: EditTracker,
	generation: Arc<AtomicU64>,
	last_report: Option<JoinReport>,
	events: EventBus,
}

impl std::fmt::Debug for LedgerSession {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LedgerSession")
			.field("rows", &self.working.len())
			.field("generation", &self.generation.load(Ordering::Acquire))
			.finish_non_exhaustive()
	}
}

/// A join started by [`LedgerSession::begin_join`], detached from the session until installed.
#[derive(Debug)]
pub struct PendingJoin {
	engine: JoinEngine,
	predicate: Predicate,
}

impl PendingJoin {
	pub const fn generation(&self) -> u64 {
		self.engine.generation()
	}

	pub fn is_current(&self) -> bool {
		self.engine.is_current()
	}

	pub async fn run(self) -> Result<JoinOutcome, Error> {
		self.engine.run(&self.predicate).await
	}
}

impl LedgerSession {
	/// Validates `config` and opens an empty session over `store`.
	pub fn new(store: Arc<dyn RecordStoreClient>, config: LedgerConfig) -> Result<Self, Error> {
		let registry = Arc::new(config.validate()?);
		let events = EventBus::new(config.events_capacity);

		Ok(Self {
			store,
			registry,
			config,
			working: WorkingSet::default(),
			tracker: EditTracker::default(),
			generation: Arc::new(AtomicU64::new(0)),
			last_report: None,
			events,
		})
	}

	pub fn registry(&self) -> &FieldRegistry {
		&self.registry
	}

	pub const fn config(&self) -> &LedgerConfig {
		&self.config
	}

	pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
		self.events.subscribe()
	}

	/// Starts a new join generation; every join started before it becomes stale.
	pub fn begin_join(&self, predicate: Predicate) -> PendingJoin {
		let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
		debug!(generation, "Starting join;");

		PendingJoin {
			engine: JoinEngine::new(
				Arc::clone(&self.store),
				Arc::clone(&self.registry),
				&self.config,
			)
			.tagged(generation, Arc::clone(&self.generation)),
			predicate,
		}
	}

	/// Replaces the working set with a finished join and snapshots its baseline.
	pub fn install(&mut self, outcome: JoinOutcome) -> Result<&[CompositeRow], Error> {
		let current = self.generation.load(Ordering::Acquire);
		if outcome.generation != current {
			return Err(Error::SupersededJoin {
				generation: outcome.generation,
				current,
			});
		}

		let JoinOutcome {
			generation,
			rows,
			report,
		} = outcome;

		self.tracker = EditTracker::from_rows(&rows, &self.registry);
		self.working = WorkingSet::from_rows(rows);
		self.last_report = Some(report);

		info!(generation, rows = self.working.len(), "Installed join;");
		self.events.emit(LedgerEvent::JoinInstalled {
			generation,
			rows: self.working.len(),
		});

		Ok(self.working.rows())
	}

	pub async fn run_join(&mut self, predicate: Predicate) -> Result<&[CompositeRow], Error> {
		let outcome = self.begin_join(predicate).run().await?;
		self.install(outcome)
	}

	pub const fn last_join_report(&self) -> Option<&JoinReport> {
		self.last_report.as_ref()
	}

	pub fn rows(&self) -> &[CompositeRow] {
		self.working.rows()
	}

	pub fn get_row<'key>(&self, lookup: impl Into<RowLookup<'key>>) -> Option<&CompositeRow> {
		self.working.find(lookup.into())
	}

	/// Records across all rows; exchanges and separations never change it.
	pub fn record_count(&self) -> usize {
		self.working.record_count()
	}

	pub fn edit_field(
		&mut self,
		row_id: RowId,
		collection: CollectionType,
		code: &str,
		value: impl Into<FieldValue>,
	) -> Result<(), Error> {
		edit::apply(
			&self.registry,
			&mut self.working,
			&mut self.tracker,
			row_id,
			collection,
			code,
			value.into(),
		)?;

		self.events.emit(LedgerEvent::FieldEdited {
			row_id,
			field: FieldRef::new(collection, code),
		});

		Ok(())
	}

	pub fn exchange(
		&mut self,
		row_a: RowId,
		row_b: RowId,
		field_code: &str,
	) -> Result<CollectionType, Error> {
		let collection = ExchangeEngine::new(&self.registry).exchange(
			&mut self.working,
			&mut self.tracker,
			row_a,
			row_b,
			field_code,
		)?;

		self.events.emit(LedgerEvent::Exchanged {
			row_a,
			row_b,
			collection,
		});

		Ok(collection)
	}

	pub fn separate(&mut self, source: RowId, target_fields: &[FieldRef]) -> Result<RowId, Error> {
		let new_row = SeparationEngine::new(&self.registry).separate(
			&mut self.working,
			&mut self.tracker,
			source,
			target_fields,
		)?;

		if let Some(collection) = target_fields.first().map(|field| field.collection) {
			self.events.emit(LedgerEvent::Separated {
				source,
				new_row,
				collection,
			});
		}

		Ok(new_row)
	}

	/// False for unknown rows.
	pub fn is_field_modified(&self, row_id: RowId, collection: CollectionType, code: &str) -> bool {
		self.working
			.get(row_id)
			.is_some_and(|row| self.tracker.is_field_modified(row, collection, code))
	}

	pub fn is_row_modified(&self, row_id: RowId) -> bool {
		self.tracker.is_row_modified(row_id)
	}

	/// Whether an exchange or separation changed the row's associations since the join.
	///
	/// Independent of edits: a relocated row can be unmodified and still produce patches.
	pub fn is_row_relocated(&self, row_id: RowId) -> bool {
		self.working
			.get(row_id)
			.is_some_and(|row| self.tracker.is_relocated(row, &self.registry))
	}

	pub fn modified_fields(&self, row_id: RowId) -> Vec<FieldRef> {
		self.tracker.modified_fields(row_id).cloned().collect()
	}

	/// Recomputes a row's modified set from scratch.
	pub fn recheck_row(&mut self, row_id: RowId) -> Result<bool, Error> {
		let row = self.working.get(row_id).ok_or(Error::RowNotFound(row_id))?;
		Ok(self.tracker.recheck(row))
	}

	pub fn build_patches(&self) -> Patches {
		PatchBuilder::new(&self.registry).build(self.working.rows(), &self.tracker)
	}

	pub fn run_consistency_check(&self) -> Vec<ConsistencyIssue> {
		consistency::check(self.working.rows(), &self.registry)
	}

	/// Writes the current patches to the store.
	///
	/// The baseline is left as is, so a persisted edit still shows as modified until the next join.
	#[instrument(skip(self))]
	pub async fn persist(&self) -> PersistReport {
		persist::dispatch(self.store.as_ref(), self.build_patches()).await
	}

	pub async fn field_metadata(
		&self,
		collection: CollectionType,
	) -> Result<BTreeMap<FieldCode, FieldMetadata>, StoreError> {
		self.store.field_metadata(collection).await
	}
}
