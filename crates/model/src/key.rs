use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{CollectionType, PerCollection};

const SEPARATOR: char = '|';
const ESCAPE: char = '\\';

/// Identity values per collection; `None` marks a missing association.
pub type KeyParts = PerCollection<Option<String>>;

/// Composite identity of a joined row, `DEVICE:<v>|USER:<v>|EXTENSION:<v>|SEAT:<v>`.
///
/// Every collection always has a slot, so rows with different sets of associations never share a
/// key. An empty value is encoded like a missing one and decodes as `None`; every other value
/// round-trips unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntegrationKey(String);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyDecodeError {
	#[error("integration key has {found} segments, expected {expected}")]
	SegmentCount { expected: usize, found: usize },
	#[error("segment {position} of integration key should start with `{expected}:`, found `{found}`")]
	UnexpectedSegment {
		position: usize,
		expected: CollectionType,
		found: String,
	},
	#[error("integration key ends with a dangling escape")]
	DanglingEscape,
}

impl IntegrationKey {
	/// `Some("")` and `None` produce the same key.
	#[must_use]
	pub fn encode(parts: &KeyParts) -> Self {
		let mut out = String::new();

		for (position, (collection, value)) in parts.iter().enumerate() {
			if position > 0 {
				out.push(SEPARATOR);
			}

			out.push_str(&collection.to_string());
			out.push(':');

			if let Some(value) = value {
				for c in value.chars() {
					if c == SEPARATOR || c == ESCAPE {
						out.push(ESCAPE);
					}
					out.push(c);
				}
			}
		}

		Self(out)
	}

	pub fn decode(&self) -> Result<KeyParts, KeyDecodeError> {
		decode(&self.0)
	}

	/// Wraps an already encoded key without validating it.
	///
	/// Keys read back from elsewhere may be stale or malformed; consistency checks decode them
	/// lazily and report failures instead of refusing them up front.
	pub fn from_raw(raw: impl Into<String>) -> Self {
		Self(raw.into())
	}

	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for IntegrationKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl FromStr for IntegrationKey {
	type Err = KeyDecodeError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		decode(s).map(|parts| Self::encode(&parts))
	}
}

fn split_segments(raw: &str) -> Result<Vec<String>, KeyDecodeError> {
	let mut segments = vec![String::new()];
	let mut chars = raw.chars();

	while let Some(c) = chars.next() {
		match c {
			ESCAPE => {
				let escaped = chars.next().ok_or(KeyDecodeError::DanglingEscape)?;
				if let Some(last) = segments.last_mut() {
					last.push(escaped);
				}
			}
			SEPARATOR => segments.push(String::new()),
			c => {
				if let Some(last) = segments.last_mut() {
					last.push(c);
				}
			}
		}
	}

	Ok(segments)
}

fn decode(raw: &str) -> Result<KeyParts, KeyDecodeError> {
	let segments = split_segments(raw)?;

	if segments.len() != CollectionType::ALL.len() {
		return Err(KeyDecodeError::SegmentCount {
			expected: CollectionType::ALL.len(),
			found: segments.len(),
		});
	}

	let mut parts = KeyParts::default();

	for (position, (collection, segment)) in CollectionType::ALL
		.into_iter()
		.zip(segments)
		.enumerate()
	{
		let prefix = format!("{collection}:");
		let Some(value) = segment.strip_prefix(&prefix) else {
			return Err(KeyDecodeError::UnexpectedSegment {
				position,
				expected: collection,
				found: segment,
			});
		};

		parts[collection] = (!value.is_empty()).then(|| value.to_string());
	}

	Ok(parts)
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use proptest::prelude::*;

	use super::*;

	fn parts(device: Option<&str>, user: Option<&str>, extension: Option<&str>, seat: Option<&str>) -> KeyParts {
		let mut parts = KeyParts::default();
		parts[CollectionType::Device] = device.map(str::to_string);
		parts[CollectionType::User] = user.map(str::to_string);
		parts[CollectionType::Extension] = extension.map(str::to_string);
		parts[CollectionType::Seat] = seat.map(str::to_string);
		parts
	}

	#[test]
	fn encodes_absent_slots_as_empty() {
		let key = IntegrationKey::encode(&parts(None, None, None, Some("A1")));

		assert_eq!(key.as_str(), "DEVICE:|USER:|EXTENSION:|SEAT:A1");
	}

	#[test]
	fn partial_rows_stay_distinct() {
		let only_device = IntegrationKey::encode(&parts(Some("X"), None, None, None));
		let only_seat = IntegrationKey::encode(&parts(None, None, None, Some("X")));

		assert_ne!(only_device, only_seat);
	}

	#[test]
	fn escapes_separator_and_escape() {
		let original = parts(Some("a|b"), Some("c\\d"), None, Some("e:f"));
		let key = IntegrationKey::encode(&original);

		assert_eq!(key.as_str(), "DEVICE:a\\|b|USER:c\\\\d|EXTENSION:|SEAT:e:f");
		assert_eq!(key.decode(), Ok(original));
	}

	#[test]
	fn rejects_malformed_keys() {
		assert_eq!(
			IntegrationKey::from_raw("DEVICE:|USER:|SEAT:").decode(),
			Err(KeyDecodeError::SegmentCount {
				expected: 4,
				found: 3
			})
		);
		assert!(matches!(
			IntegrationKey::from_raw("USER:|DEVICE:|EXTENSION:|SEAT:").decode(),
			Err(KeyDecodeError::UnexpectedSegment { position: 0, .. })
		));
		assert_eq!(
			IntegrationKey::from_raw("DEVICE:|USER:|EXTENSION:|SEAT:\\").decode(),
			Err(KeyDecodeError::DanglingEscape)
		);
	}

	#[test]
	fn parses_from_str() {
		let key: IntegrationKey = "DEVICE:X|USER:|EXTENSION:|SEAT:Y".parse().expect("valid key");

		assert_eq!(key.decode(), Ok(parts(Some("X"), None, None, Some("Y"))));
		assert!("garbage".parse::<IntegrationKey>().is_err());
	}

	#[test]
	fn empty_values_decode_as_missing() {
		let key = IntegrationKey::encode(&parts(Some(""), None, Some(" "), Some("A1")));

		assert_eq!(key, IntegrationKey::encode(&parts(None, None, Some(" "), Some("A1"))));
		assert_eq!(key.decode(), Ok(parts(None, None, Some(" "), Some("A1"))));
	}

	fn slot() -> impl Strategy<Value = Option<String>> {
		prop_oneof![Just(None), Just(Some(String::new())), ".*".prop_map(Some)]
	}

	proptest! {
		#[test]
		fn decode_inverts_encode(device in slot(), user in slot(), extension in slot(), seat in slot()) {
			let original = parts(device.as_deref(), user.as_deref(), extension.as_deref(), seat.as_deref());
			let expected = original.map(|_, value| value.clone().filter(|value| !value.is_empty()));

			prop_assert_eq!(IntegrationKey::encode(&original).decode(), Ok(expected));
		}
	}
}
