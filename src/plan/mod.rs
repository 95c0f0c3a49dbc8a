use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::sheets::LongRecord;

/// One row of the destination planning table, joined from the volume and
/// finance long records of a category and stamped with run metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanRow {
	pub facility_code: String,
	pub subgroup: Option<String>,
	pub insurer_code: String,
	pub volume_plan: Option<f64>,
	pub finance_plan: Option<f64>,
	/// The category id from the reference catalog (`id_sheet` downstream).
	pub sheet_id: i32,
	pub category: String,
	/// On-disk filename of the source workbook, kept as audit provenance.
	pub source_label: String,
	/// Publication date of the protocol; the versioning key for appends.
	pub ingestion_date: NaiveDate,
}

/// Run metadata stamped onto every merged row of one category batch.
#[derive(Debug, Clone)]
pub struct BatchStamp {
	pub sheet_id: i32,
	pub category: String,
	pub source_label: String,
	pub ingestion_date: NaiveDate,
}

/// Result of one category's volume/finance join. The join is inner; rows
/// present on only one side are dropped, but the drop counts are surfaced
/// here so the pipeline can log them instead of losing them silently.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
	pub rows: Vec<PlanRow>,
	pub volume_only: usize,
	pub finance_only: usize,
}

type JoinKey = (String, String, Option<String>);

fn join_key(record: &LongRecord, with_subgroup: bool) -> JoinKey {
	(
		record.facility_code.clone(),
		record.insurer_code.clone(),
		if with_subgroup { record.subgroup.clone() } else { None },
	)
}

/// Inner-join volume and finance records on `(facility, insurer)`, extended
/// with the subgroup for the categories that carry one, and stamp the
/// result. Volume order is preserved. A duplicate finance key indicates
/// a malformed sheet; the first occurrence is used and the rest count as
/// finance-side gaps.
pub fn merge_plan(
	volume: &[LongRecord],
	finance: &[LongRecord],
	with_subgroup: bool,
	stamp: &BatchStamp,
) -> MergeOutcome {
	let mut finance_values: HashMap<JoinKey, Option<f64>> =
		HashMap::with_capacity(finance.len());
	let mut finance_only = 0usize;
	for record in finance {
		match finance_values.entry(join_key(record, with_subgroup)) {
			Entry::Vacant(slot) => {
				slot.insert(record.value);
			}
			Entry::Occupied(_) => finance_only += 1,
		}
	}

	let mut matched: HashSet<JoinKey> = HashSet::new();
	let mut rows = Vec::new();
	let mut volume_only = 0usize;
	for record in volume {
		let key = join_key(record, with_subgroup);
		match finance_values.get(&key) {
			Some(finance_plan) => {
				matched.insert(key);
				rows.push(PlanRow {
					facility_code: record.facility_code.clone(),
					subgroup: record.subgroup.clone(),
					insurer_code: record.insurer_code.clone(),
					volume_plan: record.value,
					finance_plan: *finance_plan,
					sheet_id: stamp.sheet_id,
					category: stamp.category.clone(),
					source_label: stamp.source_label.clone(),
					ingestion_date: stamp.ingestion_date,
				});
			}
			None => volume_only += 1,
		}
	}
	finance_only += finance_values.len() - matched.len();

	MergeOutcome {
		rows,
		volume_only,
		finance_only,
	}
}

/// Append-only destination for merged plan rows. The Postgres implementation
/// lives in `crate::store`; tests substitute an in-memory sink. A whole
/// category batch is appended as one unit; mid-batch failures surface to the
/// caller and are not rolled back here.
#[async_trait]
pub trait PlanSink: Send + Sync {
	async fn append_plan(&self, rows: &[PlanRow]) -> Result<u64>;
}
