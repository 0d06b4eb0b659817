//!
//! # Ledger Store
//!
//! Boundary between the reconciliation engine and the platform that actually stores the seat,
//! device, extension and user collections. The engine only needs four calls: a filtered fetch, a
//! fetch by key values, an update-by-key upsert and field metadata. [`MemoryStore`] implements
//! them in memory and is what the CLI and the test-suites run against.
//!

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

use ledger_model::{CollectionType, FieldCode, Fields, SourceRecord};

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod memory;
mod predicate;

pub use memory::{MemoryStore, StoreCall};
pub use predicate::Predicate;

#[derive(Error, Debug)]
pub enum StoreError {
	#[error("collection {collection} is unavailable: {reason}")]
	Unavailable {
		collection: CollectionType,
		reason: String,
	},
	#[error("store rejected the request for {collection}: {reason}")]
	Rejected {
		collection: CollectionType,
		reason: String,
	},
	#[error("query for {collection} is {len} characters long, the store accepts at most {limit}")]
	QueryTooLong {
		collection: CollectionType,
		len: usize,
		limit: usize,
	},
	#[error("malformed store fixture: {0}")]
	Fixture(#[from] serde_json::Error),
}

/// Locates the record an update applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateKey {
	pub field: FieldCode,
	pub value: String,
}

/// Update-by-key write for one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsertDirective {
	pub key: UpdateKey,
	pub fields: Fields,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum UpsertOutcome {
	Updated { external_id: String },
	Created { external_id: String },
	Rejected { key: String, reason: String },
}

impl UpsertOutcome {
	#[must_use]
	pub const fn is_success(&self) -> bool {
		!matches!(self, Self::Rejected { .. })
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMetadata {
	pub label: String,
	#[serde(rename = "type")]
	pub kind: String,
}

/// Access to the four record collections.
///
/// Implementations own transport, pagination and authentication. Callers are expected to keep key
/// lists passed to [`RecordStoreClient::fetch_by_keys`] within the store's query length limit.
#[async_trait]
pub trait RecordStoreClient: Send + Sync {
	async fn fetch_all(
		&self,
		collection: CollectionType,
		predicate: &Predicate,
	) -> Result<Vec<SourceRecord>, StoreError>;

	async fn fetch_by_keys(
		&self,
		collection: CollectionType,
		field_code: &str,
		keys: &[String],
	) -> Result<Vec<SourceRecord>, StoreError>;

	async fn upsert_by_key(
		&self,
		collection: CollectionType,
		directives: &[UpsertDirective],
	) -> Result<Vec<UpsertOutcome>, StoreError>;

	async fn field_metadata(
		&self,
		collection: CollectionType,
	) -> Result<BTreeMap<FieldCode, FieldMetadata>, StoreError>;
}
