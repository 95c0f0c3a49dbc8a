pub mod archive;
pub mod catalog;
pub mod config;
pub mod error;
pub mod fetch;
pub mod observability;
pub mod pipeline;
pub mod plan;
pub mod sheets;
pub mod store;
pub mod tiers;

use std::path::Path;

use anyhow::Result;
use chrono::NaiveDate;
use tracing::info;

use crate::archive::{ExtractedWorkbook, WorkbookKind};
use crate::catalog::CatalogProvider;
use crate::config::Settings;
use crate::pipeline::WorkbookMeta;
use crate::sheets::HeaderVocabulary;
use crate::store::PgStore;

/// One scheduled run: find the newest unprocessed protocol archive, pull the
/// workbook out of it, and dispatch on its business classification. A run
/// with no newer archive is a normal, successful no-op.
pub async fn run(settings: &Settings) -> Result<()> {
	let store = PgStore::connect(settings.database_url.as_str()).await?;
	let max_date = store.max_ingestion_date().await?;
	info!(?max_date, "connected; newest loaded protocol date fetched");

	let client = reqwest::Client::new();
	let html = fetch::fetch_page(&client, &settings.source_url).await?;
	let Some(link) =
		fetch::discover_latest(&html, &settings.source_url, &settings.archive_tag, max_date)?
	else {
		info!("nothing to ingest; loaded data is current");
		return Ok(());
	};

	info!(url = %link.url, date = %link.date, "downloading protocol archive");
	let archive_path =
		fetch::download_archive(&client, &link.url, Path::new(&settings.download_dir)).await?;

	let extracted = archive::extract_workbook(
		&archive_path,
		&settings.plan_file_tag,
		&settings.tier_file_tag,
	)
	.await?;
	info!(filename = %extracted.filename, kind = ?extracted.kind, "workbook extracted");

	ingest_workbook(&store, settings, extracted, link.date).await
}

/// Process one extracted workbook against the store. Split out of [`run`] so
/// a local workbook file can be re-ingested without touching the source site.
pub async fn ingest_workbook(
	store: &PgStore,
	settings: &Settings,
	extracted: ExtractedWorkbook,
	protocol_date: NaiveDate,
) -> Result<()> {
	let mut workbook = sheets::open_workbook_bytes(extracted.bytes)?;

	match extracted.kind {
		WorkbookKind::Plan => {
			let categories = store.categories().await?;
			let meta = WorkbookMeta {
				source_label: extracted.filename,
				ingestion_date: protocol_date,
			};
			let summary = pipeline::process_planning(
				&mut workbook,
				&categories,
				&meta,
				&HeaderVocabulary::default(),
				&settings.region_prefix,
				store,
			)
			.await?;
			info!(
				categories = summary.categories,
				rows = summary.rows_appended,
				join_gaps = summary.join_gaps,
				date = %protocol_date,
				"planning workbook loaded"
			);
		}
		WorkbookKind::Tiers => {
			let summary =
				pipeline::process_tiers(&mut workbook, &settings.region_prefix, store).await?;
			info!(
				parsed = summary.facilities_parsed,
				updated = summary.deltas_applied,
				"tier reference reconciled"
			);
		}
	}

	Ok(())
}
