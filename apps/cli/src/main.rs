use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ledger_core::{logging, LedgerConfig, LedgerSession};
use ledger_model::{CollectionType, FieldValue};
use ledger_store::{MemoryStore, Predicate, RecordStoreClient};
use std::{path::PathBuf, sync::Arc};
use tracing::debug;

mod output;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
	Human,
	Json,
}

#[derive(Parser, Debug)]
#[command(name = "ledger", about = "Seat ledger reconciliation over a collection snapshot")]
struct Cli {
	/// Path to a TOML config, built-in defaults when omitted
	#[arg(long)]
	config: Option<PathBuf>,

	/// JSON snapshot of the collections, keyed by collection name
	#[arg(long)]
	data: PathBuf,

	/// Output format
	#[arg(long, value_enum, default_value = "human")]
	output: OutputFormat,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Join the collections and list the resulting rows
	Join(SeedArgs),
	/// Join, then run the consistency check
	Check(SeedArgs),
	/// Join, apply edits, and show the patches they produce
	Patches(PatchesArgs),
}

#[derive(Parser, Debug, Clone)]
struct SeedArgs {
	/// Only seed records whose field equals the value (FIELD=VALUE)
	#[arg(long = "filter", value_parser = parse_pair)]
	filters: Vec<(String, String)>,

	/// Only seed records whose field contains the value (FIELD=VALUE)
	#[arg(long = "contains", value_parser = parse_pair)]
	contains: Vec<(String, String)>,
}

impl SeedArgs {
	fn predicate(&self) -> Predicate {
		let mut all = self
			.filters
			.iter()
			.map(|(field, value)| Predicate::eq(field.as_str(), value.as_str()))
			.chain(
				self.contains
					.iter()
					.map(|(field, value)| Predicate::contains(field.as_str(), value.as_str())),
			)
			.collect::<Vec<_>>();

		match all.len() {
			0 => Predicate::All,
			1 => all.remove(0),
			_ => Predicate::And { all },
		}
	}
}

#[derive(Parser, Debug, Clone)]
struct PatchesArgs {
	#[command(flatten)]
	seed: SeedArgs,

	/// Edit to apply before building patches (IDENTITY:COLLECTION.FIELD=VALUE)
	#[arg(long = "set", value_parser = parse_edit)]
	edits: Vec<EditArg>,
}

/// A field edit addressed by the identity value of the edited record.
#[derive(Debug, Clone)]
struct EditArg {
	identity: String,
	collection: CollectionType,
	field: String,
	value: FieldValue,
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
	raw.split_once('=')
		.map(|(field, value)| (field.trim().to_string(), value.to_string()))
		.filter(|(field, _)| !field.is_empty())
		.ok_or_else(|| format!("expected FIELD=VALUE, got `{raw}`"))
}

fn parse_edit(raw: &str) -> Result<EditArg, String> {
	let err = || format!("expected IDENTITY:COLLECTION.FIELD=VALUE, got `{raw}`");

	let (identity, rest) = raw.split_once(':').ok_or_else(err)?;
	let (target, value) = rest.split_once('=').ok_or_else(err)?;
	let (collection, field) = target.split_once('.').ok_or_else(err)?;

	let collection = collection
		.parse::<CollectionType>()
		.map_err(|e| format!("unknown collection `{collection}`: {e}"))?;

	// Numbers, booleans and quoted strings are taken as JSON, anything else as plain text
	let value = serde_json::from_str(value).unwrap_or_else(|_| FieldValue::String(value.to_string()));

	Ok(EditArg {
		identity: identity.to_string(),
		collection,
		field: field.to_string(),
		value,
	})
}

async fn open_session(cli: &Cli) -> Result<LedgerSession> {
	let config = match &cli.config {
		Some(path) => LedgerConfig::load(path).await?,
		None => LedgerConfig::default(),
	};

	let raw = tokio::fs::read_to_string(&cli.data)
		.await
		.with_context(|| format!("failed to read data file <path='{}'>", cli.data.display()))?;
	let store: Arc<dyn RecordStoreClient> = Arc::new(MemoryStore::from_json(&raw)?);

	debug!(data = %cli.data.display(), "Opened snapshot;");

	Ok(LedgerSession::new(store, config)?)
}

fn apply_edits(session: &mut LedgerSession, edits: &[EditArg]) -> Result<()> {
	for edit in edits {
		let Some(row_id) = session
			.rows()
			.iter()
			.find(|row| {
				row.identity_value(edit.collection, session.registry()).as_deref()
					== Some(edit.identity.as_str())
			})
			.map(|row| row.row_id)
		else {
			bail!(
				"no row holds a {} record with identity `{}`",
				edit.collection,
				edit.identity
			);
		};

		session.edit_field(row_id, edit.collection, &edit.field, edit.value.clone())?;
	}

	Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	logging::init(logging::DEFAULT_FILTER).map_err(|e| anyhow::anyhow!(e))?;

	let mut session = open_session(&cli).await?;

	match &cli.command {
		Commands::Join(seed) => {
			session.run_join(seed.predicate()).await?;
			output::rows(&session, cli.output)?;
		}
		Commands::Check(seed) => {
			session.run_join(seed.predicate()).await?;
			output::issues(&session.run_consistency_check(), cli.output)?;
		}
		Commands::Patches(args) => {
			session.run_join(args.seed.predicate()).await?;
			apply_edits(&mut session, &args.edits)?;
			output::patches(&session.build_patches(), cli.output)?;
		}
	}

	Ok(())
}
