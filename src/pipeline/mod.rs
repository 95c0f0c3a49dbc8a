use anyhow::Result;
use calamine::Reader;
use chrono::NaiveDate;
use tracing::{info, warn};

use crate::catalog::ReportCategory;
use crate::plan::{BatchStamp, PlanSink, merge_plan};
use crate::sheets::{
	HeaderVocabulary, Workbook, extract_table, match_sheets, reshape, worksheet_at,
};
use crate::tiers::{TierStore, parse_tier_sheet, reconcile};

/// Provenance stamped onto every appended row of one workbook run.
#[derive(Debug, Clone)]
pub struct WorkbookMeta {
	/// On-disk filename of the workbook extracted from the archive.
	pub source_label: String,
	/// Publication date parsed from the protocol link.
	pub ingestion_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoadSummary {
	pub categories: usize,
	pub rows_appended: u64,
	/// Total volume/finance rows dropped by the inner joins.
	pub join_gaps: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TierSummary {
	pub facilities_parsed: usize,
	pub deltas_applied: u64,
}

/// Process a planning workbook: match sheets to the catalog, then per
/// category extract the volume and finance tables, reshape both to long
/// form, inner-join them, and append the batch.
///
/// Any structural mismatch aborts the whole workbook; a category batch that
/// has started appending is not rolled back here.
pub async fn process_planning(
	workbook: &mut Workbook,
	categories: &[ReportCategory],
	meta: &WorkbookMeta,
	vocab: &HeaderVocabulary,
	region_prefix: &str,
	sink: &dyn PlanSink,
) -> Result<LoadSummary> {
	let sheet_names = workbook.sheet_names().to_vec();
	let assignments = match_sheets(&sheet_names, categories)?;

	let mut summary = LoadSummary::default();
	for assignment in &assignments {
		info!(category = %assignment.category, "loading category");

		let volume_range = worksheet_at(workbook, assignment.volume_sheet)?;
		let finance_range = worksheet_at(workbook, assignment.finance_sheet)?;

		let volume_table = extract_table(
			&volume_range,
			&sheet_names[assignment.volume_sheet],
			&assignment.category,
			vocab,
			region_prefix,
		)?;
		let finance_table = extract_table(
			&finance_range,
			&sheet_names[assignment.finance_sheet],
			&assignment.category,
			vocab,
			region_prefix,
		)?;

		let with_subgroup = volume_table.with_subgroup;
		let volume = reshape(&volume_table);
		let finance = reshape(&finance_table);

		let stamp = BatchStamp {
			sheet_id: assignment.category_id,
			category: assignment.category.clone(),
			source_label: meta.source_label.clone(),
			ingestion_date: meta.ingestion_date,
		};
		let outcome = merge_plan(&volume, &finance, with_subgroup, &stamp);
		if outcome.volume_only > 0 || outcome.finance_only > 0 {
			warn!(
				category = %assignment.category,
				volume_only = outcome.volume_only,
				finance_only = outcome.finance_only,
				"volume/finance keys did not fully match; unmatched rows dropped"
			);
		}

		let appended = sink.append_plan(&outcome.rows).await?;
		info!(
			category = %assignment.category,
			rows = appended,
			"category batch appended"
		);

		summary.categories += 1;
		summary.rows_appended += appended;
		summary.join_gaps += outcome.volume_only + outcome.finance_only;
	}

	Ok(summary)
}

/// Process a tier-classification workbook: parse the first sheet's running
/// tier assignments, diff against the stored mapping, and apply only the
/// changed rows.
pub async fn process_tiers(
	workbook: &mut Workbook,
	region_prefix: &str,
	store: &dyn TierStore,
) -> Result<TierSummary> {
	let range = worksheet_at(workbook, 0)?;
	let parsed = parse_tier_sheet(&range, region_prefix);

	let stored = store.current_tiers(region_prefix).await?;
	let deltas = reconcile(&parsed, &stored);
	info!(
		parsed = parsed.len(),
		changed = deltas.len(),
		"tier workbook reconciled"
	);

	let applied = if deltas.is_empty() {
		0
	} else {
		store.apply_tier_deltas(&deltas).await?
	};

	Ok(TierSummary {
		facilities_parsed: parsed.len(),
		deltas_applied: applied,
	})
}
