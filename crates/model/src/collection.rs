use std::ops::{Index, IndexMut};

use serde::{ser::SerializeMap, Deserialize, Serialize, Serializer};
use strum::{Display, EnumIter, EnumString};

/// One of the four independently stored record collections.
///
/// Variants are declared in integration key order.
#[derive(
	Debug,
	Clone,
	Copy,
	PartialEq,
	Eq,
	Hash,
	PartialOrd,
	Ord,
	Serialize,
	Deserialize,
	Display,
	EnumString,
	EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum CollectionType {
	Device,
	User,
	Extension,
	Seat,
}

impl CollectionType {
	pub const ALL: [Self; 4] = [Self::Device, Self::User, Self::Extension, Self::Seat];

	#[must_use]
	pub const fn index(self) -> usize {
		match self {
			Self::Device => 0,
			Self::User => 1,
			Self::Extension => 2,
			Self::Seat => 3,
		}
	}

	/// The other three collections, in key order.
	pub fn others(self) -> impl Iterator<Item = Self> {
		Self::ALL.into_iter().filter(move |other| *other != self)
	}
}

/// A total map from [`CollectionType`] to `T`, iterated in key order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PerCollection<T>([T; 4]);

impl<T> PerCollection<T> {
	pub fn from_fn(f: impl FnMut(CollectionType) -> T) -> Self {
		Self(CollectionType::ALL.map(f))
	}

	pub fn iter(&self) -> impl Iterator<Item = (CollectionType, &T)> {
		CollectionType::ALL.into_iter().zip(self.0.iter())
	}

	pub fn iter_mut(&mut self) -> impl Iterator<Item = (CollectionType, &mut T)> {
		CollectionType::ALL.into_iter().zip(self.0.iter_mut())
	}

	pub fn map<U>(&self, mut f: impl FnMut(CollectionType, &T) -> U) -> PerCollection<U> {
		PerCollection::from_fn(|collection| f(collection, &self[collection]))
	}

	pub fn values(&self) -> impl Iterator<Item = &T> {
		self.0.iter()
	}
}

impl<T> PerCollection<Option<T>> {
	/// Collections holding a value, in key order.
	pub fn present(&self) -> impl Iterator<Item = (CollectionType, &T)> {
		self.iter()
			.filter_map(|(collection, slot)| slot.as_ref().map(|value| (collection, value)))
	}

	pub fn present_count(&self) -> usize {
		self.0.iter().filter(|slot| slot.is_some()).count()
	}
}

impl<T> Index<CollectionType> for PerCollection<T> {
	type Output = T;

	fn index(&self, collection: CollectionType) -> &Self::Output {
		&self.0[collection.index()]
	}
}

impl<T> IndexMut<CollectionType> for PerCollection<T> {
	fn index_mut(&mut self, collection: CollectionType) -> &mut Self::Output {
		&mut self.0[collection.index()]
	}
}

impl<T> IntoIterator for PerCollection<T> {
	type Item = (CollectionType, T);
	type IntoIter = std::iter::Zip<std::array::IntoIter<CollectionType, 4>, std::array::IntoIter<T, 4>>;

	fn into_iter(self) -> Self::IntoIter {
		CollectionType::ALL.into_iter().zip(self.0)
	}
}

impl<T: Serialize> Serialize for PerCollection<T> {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		let mut map = serializer.serialize_map(Some(4))?;
		for (collection, value) in self.iter() {
			map.serialize_entry(&collection, value)?;
		}
		map.end()
	}
}

#[cfg(test)]
mod tests {
	use std::str::FromStr;

	use strum::IntoEnumIterator;

	use super::*;

	#[test]
	fn key_order_matches_declaration() {
		assert_eq!(CollectionType::iter().collect::<Vec<_>>(), CollectionType::ALL);

		for (position, collection) in CollectionType::ALL.into_iter().enumerate() {
			assert_eq!(collection.index(), position);
		}
	}

	#[test]
	fn names_round_trip() {
		assert_eq!(CollectionType::Extension.to_string(), "EXTENSION");
		assert_eq!(
			CollectionType::from_str("seat").ok(),
			Some(CollectionType::Seat)
		);
	}

	#[test]
	fn others_skips_self() {
		let others = CollectionType::User.others().collect::<Vec<_>>();

		assert_eq!(
			others,
			[
				CollectionType::Device,
				CollectionType::Extension,
				CollectionType::Seat
			]
		);
	}
}
