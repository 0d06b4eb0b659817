//! Rendering of command results

use anyhow::Result;
use ledger_core::{ConsistencyIssue, LedgerSession, Patches};
use serde_json::json;

use super::OutputFormat;

pub fn rows(session: &LedgerSession, format: OutputFormat) -> Result<()> {
	let report = session.last_join_report();

	match format {
		OutputFormat::Human => {
			let rows = session.rows();
			println!("{} rows, {} records", rows.len(), session.record_count());

			for row in rows {
				println!("  {}  ({} records)", row.integration_key, row.record_count());
			}

			for failure in report.iter().flat_map(|report| &report.failures) {
				println!(
					"warning: {} joined as empty after a failed {} fetch: {}",
					failure.collection, failure.stage, failure.message
				);
			}
		}
		OutputFormat::Json => println!(
			"{}",
			serde_json::to_string_pretty(&json!({
				"report": report,
				"rows": session.rows(),
			}))?
		),
	}

	Ok(())
}

pub fn issues(issues: &[ConsistencyIssue], format: OutputFormat) -> Result<()> {
	match format {
		OutputFormat::Human => {
			if issues.is_empty() {
				println!("No consistency issues found");
			}
			for issue in issues {
				println!("{issue}");
			}
		}
		OutputFormat::Json => println!("{}", serde_json::to_string_pretty(issues)?),
	}

	Ok(())
}

pub fn patches(patches: &Patches, format: OutputFormat) -> Result<()> {
	match format {
		OutputFormat::Human => {
			if patches.is_empty() {
				println!("Nothing to write");
			}

			for (collection, directives) in patches.directives.iter() {
				for directive in directives {
					let fields = directive
						.fields
						.iter()
						.map(|(code, value)| format!("{code}={value}"))
						.collect::<Vec<_>>()
						.join(", ");

					println!(
						"{collection} {}={}: {fields}",
						directive.key.field, directive.key.value
					);
				}
			}

			for skipped in &patches.skipped {
				println!(
					"skipped: {} record of row {} has no identity value",
					skipped.collection, skipped.row_id
				);
			}
		}
		OutputFormat::Json => println!("{}", serde_json::to_string_pretty(patches)?),
	}

	Ok(())
}
