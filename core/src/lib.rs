//!
//! # Ledger Core
//!
//! Reconciliation engine behind the seat ledger. It joins the seat, device, extension and user
//! collections into composite rows, lets callers edit, exchange and separate those rows while
//! telling user edits apart from mechanical relocations, and turns the result back into minimal
//! update-by-key patches per collection. An advisory consistency check reports duplicate
//! identities and drifted keys.
//!
//! Everything hangs off a [`LedgerSession`], which owns one working set at a time.
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

use ledger_model::CollectionType;

pub mod config;
pub mod consistency;
mod edit;
pub mod event;
mod exchange;
pub mod join;
pub mod logging;
pub mod patch;
pub mod persist;
mod row;
mod separation;
mod session;
mod tracker;

pub use config::{ConfigError, LedgerConfig, Limits};
pub use consistency::{ConsistencyIssue, IssueKind};
pub use edit::EditError;
pub use event::{EventBus, LedgerEvent};
pub use exchange::{ExchangeEngine, ExchangeError};
pub use join::{FetchFailure, JoinEngine, JoinOutcome, JoinReport, JoinStage};
pub use patch::{PatchBuilder, Patches, SkippedPatch};
pub use persist::{CollectionReport, PersistReport};
pub use row::{CompositeRow, RowId, RowLookup, WorkingSet};
pub use separation::{SeparationEngine, SeparationError};
pub use session::{LedgerSession, PendingJoin};
pub use tracker::EditTracker;

#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error(
		"a single {collection} key needs a {query_len} byte query, above the store limit of {limit}"
	)]
	BatchLimitExceeded {
		collection: CollectionType,
		query_len: usize,
		limit: usize,
	},
	#[error("invalid exchange: {0}")]
	InvalidExchange(#[from] ExchangeError),
	#[error("invalid separation: {0}")]
	InvalidSeparation(#[from] SeparationError),
	#[error("invalid edit: {0}")]
	InvalidEdit(#[from] EditError),
	#[error("row not found <row_id='{0}'>")]
	RowNotFound(RowId),
	#[error("join generation {generation} was superseded by generation {current}")]
	SupersededJoin { generation: u64, current: u64 },
	#[error(transparent)]
	Config(#[from] ConfigError),
}
