use ledger_model::{CollectionType, FieldDescriptor, FieldRegistry, RegistryError};

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;

/// Store limits and fetch behaviour used by the join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
	/// Longest query, in bytes, the store accepts.
	pub max_query_len: usize,
	pub min_batch: usize,
	pub max_batch: usize,
	/// Key batches in flight per collection.
	pub fetch_concurrency: usize,
	/// Attempts per store fetch, the first one included.
	pub fetch_retries: u32,
	pub retry_initial_ms: u64,
}

impl Default for Limits {
	fn default() -> Self {
		Self {
			max_query_len: 4000,
			min_batch: 10,
			max_batch: 200,
			fetch_concurrency: 4,
			fetch_retries: 3,
			retry_initial_ms: 50,
		}
	}
}

/// LedgerConfig describes the collections' fields and how to query the store.
/// It is read once at startup, usually from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
	/// Collections whose filtered records seed the join, in order.
	pub anchors: Vec<CollectionType>,
	pub limits: Limits,
	pub events_capacity: usize,
	pub fields: Vec<FieldDescriptor>,
}

impl Default for LedgerConfig {
	fn default() -> Self {
		Self {
			anchors: vec![CollectionType::Seat],
			limits: Limits::default(),
			events_capacity: 64,
			fields: default_fields(),
		}
	}
}

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("failed to read config file <path='{}'>: {source}", .path.display())]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
	#[error("failed to parse config: {0}")]
	Parse(#[from] toml::de::Error),
	#[error("at least one anchor collection is required")]
	NoAnchors,
	#[error("invalid limits: {0}")]
	InvalidLimits(&'static str),
	#[error(transparent)]
	Registry(#[from] RegistryError),
}

impl LedgerConfig {
	pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();

		let raw = fs::read_to_string(path)
			.await
			.map_err(|source| ConfigError::Io {
				path: path.to_path_buf(),
				source,
			})?;

		Self::from_toml(&raw)
	}

	pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
		toml::from_str(raw).map_err(Into::into)
	}

	/// Checks the limits and builds the field registry.
	pub fn validate(&self) -> Result<FieldRegistry, ConfigError> {
		if self.anchors.is_empty() {
			return Err(ConfigError::NoAnchors);
		}

		let limits = &self.limits;
		if limits.min_batch == 0 || limits.min_batch > limits.max_batch {
			return Err(ConfigError::InvalidLimits(
				"min_batch must be at least 1 and not above max_batch",
			));
		}
		if limits.fetch_concurrency == 0 {
			return Err(ConfigError::InvalidLimits("fetch_concurrency must be at least 1"));
		}
		if limits.fetch_retries == 0 {
			return Err(ConfigError::InvalidLimits("fetch_retries must be at least 1"));
		}
		if self.events_capacity == 0 {
			return Err(ConfigError::InvalidLimits("events_capacity must be at least 1"));
		}

		FieldRegistry::new(self.fields.clone()).map_err(Into::into)
	}
}

/// Field layout of the seat ledger.
pub fn default_fields() -> Vec<FieldDescriptor> {
	use CollectionType::{Device, Extension, Seat, User};

	vec![
		FieldDescriptor::new(Seat, "seatNumber")
			.labeled("Seat number")
			.identity()
			.swappable(),
		FieldDescriptor::new(Seat, "floor").labeled("Floor"),
		FieldDescriptor::new(Seat, "area").labeled("Area"),
		FieldDescriptor::new(Seat, "assetNumber")
			.labeled("Device asset number")
			.references(Device),
		FieldDescriptor::new(Seat, "userCode")
			.labeled("User code")
			.references(User),
		FieldDescriptor::new(Seat, "extensionNumber")
			.labeled("Extension number")
			.references(Extension),
		FieldDescriptor::new(Device, "assetNumber")
			.labeled("Asset number")
			.identity()
			.swappable(),
		FieldDescriptor::new(Device, "hostName").labeled("Host name"),
		FieldDescriptor::new(Device, "model").labeled("Model"),
		FieldDescriptor::new(Device, "purchasedOn")
			.labeled("Purchase date")
			.read_only(),
		FieldDescriptor::new(Device, "seatNumber")
			.labeled("Seat number")
			.references(Seat),
		FieldDescriptor::new(Device, "userCode")
			.labeled("User code")
			.references(User),
		FieldDescriptor::new(Extension, "extensionNumber")
			.labeled("Extension number")
			.identity()
			.swappable(),
		FieldDescriptor::new(Extension, "phoneModel").labeled("Phone model"),
		FieldDescriptor::new(Extension, "seatNumber")
			.labeled("Seat number")
			.references(Seat),
		FieldDescriptor::new(User, "userCode")
			.labeled("User code")
			.identity()
			.swappable(),
		FieldDescriptor::new(User, "userName").labeled("Name"),
		FieldDescriptor::new(User, "department").labeled("Department"),
	]
}
