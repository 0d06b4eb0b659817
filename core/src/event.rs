//! Event bus notifying observers of working set changes

use ledger_model::{CollectionType, FieldRef};

use tokio::sync::broadcast;

use super::row::RowId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
	/// A join replaced the working set
	JoinInstalled { generation: u64, rows: usize },

	/// A user edited one field
	FieldEdited { row_id: RowId, field: FieldRef },

	/// A record association moved between two rows
	Exchanged {
		row_a: RowId,
		row_b: RowId,
		collection: CollectionType,
	},

	/// A record association was split off into a new row
	Separated {
		source: RowId,
		new_row: RowId,
		collection: CollectionType,
	},
}

#[derive(Debug)]
pub struct EventBus {
	sender: broadcast::Sender<LedgerEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn emit(&self, event: LedgerEvent) {
		// No receivers is fine
		let _ = self.sender.send(event);
	}

	pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
		self.sender.subscribe()
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(64)
	}
}
