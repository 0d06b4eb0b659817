use ledger_core::LedgerSession;
use ledger_model::{CollectionType, FieldRef};

use proptest::prelude::*;

mod common;

const SWAPPABLE: [&str; 4] = ["assetNumber", "userCode", "extensionNumber", "seatNumber"];

#[derive(Debug, Clone)]
enum Relocation {
	Exchange { a: usize, b: usize, field: usize },
	Separate { row: usize, collection: usize },
}

fn relocation() -> impl Strategy<Value = Relocation> {
	prop_oneof![
		(any::<usize>(), any::<usize>(), 0..SWAPPABLE.len())
			.prop_map(|(a, b, field)| Relocation::Exchange { a, b, field }),
		(any::<usize>(), any::<usize>())
			.prop_map(|(row, collection)| Relocation::Separate { row, collection }),
	]
}

fn joined_session() -> LedgerSession {
	tokio::runtime::Builder::new_current_thread()
		.enable_all()
		.build()
		.unwrap()
		.block_on(common::joined())
		.1
}

/// Every record in the working set, by collection and external id.
fn inventory(session: &LedgerSession) -> Vec<(CollectionType, String)> {
	let mut records = session
		.rows()
		.iter()
		.flat_map(|row| row.records.present())
		.map(|(collection, record)| (collection, record.external_id.clone()))
		.collect::<Vec<_>>();
	records.sort();
	records
}

/// Applies `relocation` to rows picked modulo the current row count, always on distinct rows and
/// on collections present on the source row.
fn apply(session: &mut LedgerSession, relocation: &Relocation) {
	let rows = session.rows();
	let count = rows.len();

	match *relocation {
		Relocation::Exchange { a, b, field } => {
			let (a, mut b) = (a % count, b % count);
			if a == b {
				b = (a + 1) % count;
			}

			let (row_a, row_b) = (rows[a].row_id, rows[b].row_id);
			session.exchange(row_a, row_b, SWAPPABLE[field]).unwrap();
		}
		Relocation::Separate { row, collection } => {
			let source = &rows[row % count];
			let present = source
				.records
				.present()
				.map(|(collection, _)| collection)
				.collect::<Vec<_>>();

			if present.is_empty() {
				return;
			}

			let collection = present[collection % present.len()];
			let field = FieldRef::new(collection, session.registry().identity_field(collection));
			let source = source.row_id;

			session.separate(source, &[field]).unwrap();
		}
	}
}

proptest! {
	#![proptest_config(ProptestConfig::with_cases(64))]

	#[test]
	fn relocations_never_create_or_lose_records(
		relocations in prop::collection::vec(relocation(), 1..12)
	) {
		let mut session = joined_session();
		let count = session.record_count();
		let records = inventory(&session);

		for relocation in &relocations {
			apply(&mut session, relocation);

			prop_assert_eq!(session.record_count(), count);
			prop_assert_eq!(inventory(&session), records.clone());

			for row in session.rows() {
				prop_assert!(!session.is_row_modified(row.row_id));
				prop_assert_eq!(row.integration_key.clone(), row.derive_key(session.registry()));
			}
		}
	}
}
