#![allow(dead_code)]

use ledger_core::{LedgerConfig, LedgerSession, Limits, RowId};
use ledger_store::{MemoryStore, Predicate, RecordStoreClient};

use std::sync::Arc;

/// Three seats: A1 fully equipped, A2 with a device only, A3 empty.
pub const FIXTURE: &str = r#"{
	"SEAT": [
		{ "external_id": "s1", "fields": { "seatNumber": "A1", "floor": 3, "area": "North", "assetNumber": "PC-1", "userCode": "U-1", "extensionNumber": "5001" } },
		{ "external_id": "s2", "fields": { "seatNumber": "A2", "floor": 3, "area": "North", "assetNumber": "PC-2" } },
		{ "external_id": "s3", "fields": { "seatNumber": "A3", "floor": 4, "area": "South" } }
	],
	"DEVICE": [
		{ "external_id": "d1", "fields": { "assetNumber": "PC-1", "hostName": "ws-01", "model": "T14", "seatNumber": "A1", "userCode": "U-1" } },
		{ "external_id": "d2", "fields": { "assetNumber": "PC-2", "hostName": "ws-02", "model": "T14", "seatNumber": "A2" } }
	],
	"USER": [
		{ "external_id": "u1", "fields": { "userCode": "U-1", "userName": "Sam", "department": "Ops" } }
	],
	"EXTENSION": [
		{ "external_id": "e1", "fields": { "extensionNumber": "5001", "phoneModel": "KX-1", "seatNumber": "A1" } }
	]
}"#;

pub fn config() -> LedgerConfig {
	LedgerConfig {
		limits: Limits {
			retry_initial_ms: 1,
			..Limits::default()
		},
		..LedgerConfig::default()
	}
}

pub fn store() -> Arc<MemoryStore> {
	Arc::new(MemoryStore::from_json(FIXTURE).unwrap())
}

pub fn session(store: &Arc<MemoryStore>) -> LedgerSession {
	let client: Arc<dyn RecordStoreClient> = store.clone();
	LedgerSession::new(client, config()).unwrap()
}

/// Session over [`FIXTURE`] with the join installed, plus the ids of the A1, A2 and A3 rows.
pub async fn joined() -> (Arc<MemoryStore>, LedgerSession, [RowId; 3]) {
	let store = store();
	let mut session = session(&store);

	let rows = session.run_join(Predicate::All).await.unwrap();
	assert_eq!(rows.len(), 3);
	let ids = [rows[0].row_id, rows[1].row_id, rows[2].row_id];

	(store, session, ids)
}
