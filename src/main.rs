use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use planfeed::archive::{ExtractedWorkbook, WorkbookKind};
use planfeed::store::PgStore;
use planfeed::{config, observability};

#[derive(Parser)]
#[command(name = "planfeed", about = "planfeed - planning workbook ETL for the territorial fund")]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum IngestKind {
	Plan,
	Tiers,
}

#[derive(Subcommand)]
enum Commands {
	/// Discover, download, and ingest the newest protocol archive (default)
	Run,
	/// Re-ingest a local workbook file, bypassing discovery and download
	Ingest {
		/// Path to the .xlsx workbook
		#[arg(long)]
		file: String,
		/// Protocol date to stamp onto the loaded rows (YYYY-MM-DD)
		#[arg(long)]
		date: NaiveDate,
		/// Business classification of the workbook
		#[arg(long, value_enum)]
		kind: IngestKind,
		/// Source label for audit provenance; defaults to the filename
		#[arg(long)]
		label: Option<String>,
	},
}

#[tokio::main]
async fn main() {
	let settings = match config::load() {
		Ok(s) => s,
		Err(e) => {
			eprintln!("failed to load config, using defaults: {}", e);
			config::Settings::default()
		}
	};

	if let Err(e) = observability::init_logging(&settings.log_level) {
		eprintln!("failed to initialize logging: {}", e);
	}

	let cli = Cli::parse();
	let outcome = match cli.command.unwrap_or(Commands::Run) {
		Commands::Run => planfeed::run(&settings).await,
		Commands::Ingest {
			file,
			date,
			kind,
			label,
		} => ingest_local(&settings, &file, date, kind, label).await,
	};

	if let Err(e) = outcome {
		tracing::error!(error = %e, "run failed");
		std::process::exit(1);
	}
}

async fn ingest_local(
	settings: &config::Settings,
	file: &str,
	date: NaiveDate,
	kind: IngestKind,
	label: Option<String>,
) -> anyhow::Result<()> {
	let bytes = tokio::fs::read(file).await?;
	let filename = label.unwrap_or_else(|| {
		std::path::Path::new(file)
			.file_name()
			.map(|n| n.to_string_lossy().into_owned())
			.unwrap_or_else(|| file.to_string())
	});
	let extracted = ExtractedWorkbook {
		bytes,
		filename,
		kind: match kind {
			IngestKind::Plan => WorkbookKind::Plan,
			IngestKind::Tiers => WorkbookKind::Tiers,
		},
	};

	let store = PgStore::connect(settings.database_url.as_str()).await?;
	planfeed::ingest_workbook(&store, settings, extracted, date).await
}
