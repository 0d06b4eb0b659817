//!
//! # Ledger Model
//!
//! Shared vocabulary for the ledger workspace: the four record collections, the records fetched
//! from them, the integration key that identifies a joined row, and the typed field registry that
//! says which fields are identities, which can be edited and which ones mirror another
//! collection's identity.
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

mod collection;
mod key;
mod record;
mod registry;

pub use collection::{CollectionType, PerCollection};
pub use key::{IntegrationKey, KeyDecodeError, KeyParts};
pub use record::{key_value, FieldCode, FieldValue, Fields, SourceRecord};
pub use registry::{FieldDescriptor, FieldRef, FieldRegistry, RegistryError};
