use std::collections::{hash_map::Entry, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{CollectionType, FieldCode, PerCollection};

/// A field addressed by its collection and code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldRef {
	pub collection: CollectionType,
	pub code: FieldCode,
}

impl FieldRef {
	pub fn new(collection: CollectionType, code: impl Into<FieldCode>) -> Self {
		Self {
			collection,
			code: code.into(),
		}
	}
}

/// Describes one field of one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
	pub collection: CollectionType,
	pub code: FieldCode,
	#[serde(default)]
	pub label: Option<String>,
	/// The field other collections use to cross-reference this collection's records.
	#[serde(default)]
	pub identity: bool,
	#[serde(default)]
	pub read_only: bool,
	/// Can be exchanged between rows, taking the record association along.
	#[serde(default)]
	pub swappable: bool,
	/// Holds a denormalized copy of another collection's identity value.
	#[serde(default)]
	pub references: Option<CollectionType>,
}

impl FieldDescriptor {
	pub fn new(collection: CollectionType, code: impl Into<FieldCode>) -> Self {
		Self {
			collection,
			code: code.into(),
			label: None,
			identity: false,
			read_only: false,
			swappable: false,
			references: None,
		}
	}

	#[must_use]
	pub fn identity(mut self) -> Self {
		self.identity = true;
		self
	}

	#[must_use]
	pub fn swappable(mut self) -> Self {
		self.swappable = true;
		self
	}

	#[must_use]
	pub fn read_only(mut self) -> Self {
		self.read_only = true;
		self
	}

	#[must_use]
	pub fn references(mut self, target: CollectionType) -> Self {
		self.references = Some(target);
		self
	}

	#[must_use]
	pub fn labeled(mut self, label: impl Into<String>) -> Self {
		self.label = Some(label.into());
		self
	}

	/// Identity fields only change through exchange, never through direct edits.
	#[must_use]
	pub const fn editable(&self) -> bool {
		!self.identity && !self.read_only
	}

	#[must_use]
	pub fn field_ref(&self) -> FieldRef {
		FieldRef::new(self.collection, self.code.clone())
	}
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
	#[error("collection {0} has no identity field")]
	MissingIdentity(CollectionType),
	#[error("collection {collection} declares two identity fields: `{first}` and `{second}`")]
	DuplicateIdentity {
		collection: CollectionType,
		first: FieldCode,
		second: FieldCode,
	},
	#[error("field `{}` is declared twice for {}", .0.code, .0.collection)]
	DuplicateField(FieldRef),
	#[error("swappable field `{code}` is declared by both {first} and {second}")]
	AmbiguousSwappable {
		code: FieldCode,
		first: CollectionType,
		second: CollectionType,
	},
	#[error("field `{}` of {} is swappable but is not an identity field", .0.code, .0.collection)]
	SwappableNotIdentity(FieldRef),
	#[error("field `{}` of {} references its own collection", .0.code, .0.collection)]
	SelfReference(FieldRef),
}

/// Validated set of [`FieldDescriptor`]s, built once at startup.
#[derive(Debug, Clone)]
pub struct FieldRegistry {
	descriptors: Vec<FieldDescriptor>,
	by_ref: HashMap<FieldRef, usize>,
	identity: PerCollection<FieldCode>,
	swappable: HashMap<FieldCode, CollectionType>,
}

impl FieldRegistry {
	pub fn new(descriptors: Vec<FieldDescriptor>) -> Result<Self, RegistryError> {
		let mut by_ref = HashMap::with_capacity(descriptors.len());
		let mut identity = PerCollection::<Option<FieldCode>>::default();
		let mut swappable = HashMap::new();

		for (idx, descriptor) in descriptors.iter().enumerate() {
			let field_ref = descriptor.field_ref();

			if by_ref.insert(field_ref.clone(), idx).is_some() {
				return Err(RegistryError::DuplicateField(field_ref));
			}

			if descriptor.references == Some(descriptor.collection) {
				return Err(RegistryError::SelfReference(field_ref));
			}

			if descriptor.identity {
				if let Some(first) = &identity[descriptor.collection] {
					return Err(RegistryError::DuplicateIdentity {
						collection: descriptor.collection,
						first: first.clone(),
						second: descriptor.code.clone(),
					});
				}
				identity[descriptor.collection] = Some(descriptor.code.clone());
			}

			if descriptor.swappable {
				if !descriptor.identity {
					return Err(RegistryError::SwappableNotIdentity(field_ref));
				}

				match swappable.entry(descriptor.code.clone()) {
					Entry::Occupied(entry) => {
						return Err(RegistryError::AmbiguousSwappable {
							code: descriptor.code.clone(),
							first: *entry.get(),
							second: descriptor.collection,
						});
					}
					Entry::Vacant(entry) => {
						entry.insert(descriptor.collection);
					}
				}
			}
		}

		let mut identity_fields = PerCollection::<FieldCode>::default();
		for (collection, code) in identity {
			identity_fields[collection] = code.ok_or(RegistryError::MissingIdentity(collection))?;
		}

		Ok(Self {
			descriptors,
			by_ref,
			identity: identity_fields,
			swappable,
		})
	}

	#[must_use]
	pub fn identity_field(&self, collection: CollectionType) -> &str {
		&self.identity[collection]
	}

	pub fn descriptor(&self, collection: CollectionType, code: &str) -> Option<&FieldDescriptor> {
		self.by_ref
			.get(&FieldRef::new(collection, code))
			.map(|idx| &self.descriptors[*idx])
	}

	/// The collection owning the swappable field `code`, if any.
	pub fn swappable_collection(&self, code: &str) -> Option<CollectionType> {
		self.swappable.get(code).copied()
	}

	/// Fields of `from` that mirror the identity of `to`.
	pub fn reference_fields(
		&self,
		from: CollectionType,
		to: CollectionType,
	) -> impl Iterator<Item = &FieldDescriptor> {
		self.descriptors
			.iter()
			.filter(move |d| d.collection == from && d.references == Some(to))
	}

	/// Every reference field declared on `from`.
	pub fn references_from(&self, from: CollectionType) -> impl Iterator<Item = &FieldDescriptor> {
		self.descriptors
			.iter()
			.filter(move |d| d.collection == from && d.references.is_some())
	}

	#[must_use]
	pub fn descriptors(&self) -> &[FieldDescriptor] {
		&self.descriptors
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn identities() -> Vec<FieldDescriptor> {
		vec![
			FieldDescriptor::new(CollectionType::Device, "assetNumber")
				.identity()
				.swappable(),
			FieldDescriptor::new(CollectionType::User, "userCode").identity(),
			FieldDescriptor::new(CollectionType::Extension, "extensionNumber").identity(),
			FieldDescriptor::new(CollectionType::Seat, "seatNumber")
				.identity()
				.swappable(),
		]
	}

	#[test]
	fn builds_lookups() {
		let mut descriptors = identities();
		descriptors.push(
			FieldDescriptor::new(CollectionType::Seat, "deviceNumber")
				.references(CollectionType::Device),
		);
		let registry = FieldRegistry::new(descriptors).expect("valid registry");

		assert_eq!(registry.identity_field(CollectionType::Seat), "seatNumber");
		assert_eq!(
			registry.swappable_collection("assetNumber"),
			Some(CollectionType::Device)
		);
		assert_eq!(registry.swappable_collection("userCode"), None);
		assert_eq!(
			registry
				.reference_fields(CollectionType::Seat, CollectionType::Device)
				.map(|d| d.code.as_str())
				.collect::<Vec<_>>(),
			["deviceNumber"]
		);
		assert!(!registry
			.descriptor(CollectionType::Seat, "seatNumber")
			.expect("declared")
			.editable());
	}

	#[test]
	fn rejects_missing_identity() {
		let mut descriptors = identities();
		descriptors.retain(|d| d.collection != CollectionType::User);

		assert_eq!(
			FieldRegistry::new(descriptors).err(),
			Some(RegistryError::MissingIdentity(CollectionType::User))
		);
	}

	#[test]
	fn rejects_swappable_non_identity() {
		let mut descriptors = identities();
		descriptors.push(FieldDescriptor::new(CollectionType::Seat, "floor").swappable());

		assert_eq!(
			FieldRegistry::new(descriptors).err(),
			Some(RegistryError::SwappableNotIdentity(FieldRef::new(
				CollectionType::Seat,
				"floor"
			)))
		);
	}

	#[test]
	fn rejects_ambiguous_swappable() {
		let mut descriptors = identities();
		descriptors[1] = FieldDescriptor::new(CollectionType::User, "assetNumber")
			.identity()
			.swappable();

		assert!(matches!(
			FieldRegistry::new(descriptors),
			Err(RegistryError::AmbiguousSwappable { .. })
		));
	}

	#[test]
	fn rejects_self_reference_and_duplicates() {
		let mut descriptors = identities();
		descriptors.push(
			FieldDescriptor::new(CollectionType::Seat, "seatCopy").references(CollectionType::Seat),
		);
		assert!(matches!(
			FieldRegistry::new(descriptors),
			Err(RegistryError::SelfReference(_))
		));

		let mut descriptors = identities();
		descriptors.push(FieldDescriptor::new(CollectionType::Seat, "seatNumber"));
		assert!(matches!(
			FieldRegistry::new(descriptors),
			Err(RegistryError::DuplicateField(_))
		));
	}
}
