use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use calamine::{Data, Range};

use crate::sheets::cell_to_string;

/// Ordinal markers that advance the running tier, in the exact spelling the
/// authoritative workbook uses.
const TIER_MARKERS: [(&str, i32); 3] = [("к I-му", 1), ("ко II-му", 2), ("к III-му", 3)];

/// A facility whose tier in the workbook differs from the stored one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierDelta {
	pub facility_code: String,
	pub new_tier: i32,
}

/// A facility row parsed out of the tier workbook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierRecord {
	pub facility_code: String,
	pub tier: i32,
}

/// The running tier state. Tier assignment is positional: a row's tier is
/// not derivable from the row alone, only from the most recent marker above
/// it, so parsing is a sequential pass, never a lookup.
#[derive(Debug, Default)]
pub struct TierParser {
	current: i32,
}

impl TierParser {
	pub fn new() -> Self {
		Self::default()
	}

	/// Observe one row of text, transitioning on a marker if present, and
	/// return the tier in effect for this row.
	pub fn observe(&mut self, text: &str) -> i32 {
		for (marker, tier) in TIER_MARKERS {
			if text.contains(marker) {
				self.current = tier;
				break;
			}
		}
		self.current
	}
}

/// Parse the single free-text column of the tier workbook into facility
/// records. Rows are kept iff their text (numeric cells rendered as integer
/// strings) contains the regional prefix; each keeps the tier most recently
/// announced above it.
pub fn parse_tier_rows<'a, I>(rows: I, region_prefix: &str) -> Vec<TierRecord>
where
	I: IntoIterator<Item = &'a [Data]>,
{
	let mut parser = TierParser::new();
	let mut out = Vec::new();
	for row in rows {
		let text = cell_to_string(row.first().unwrap_or(&Data::Empty));
		let tier = parser.observe(&text);
		if text.contains(region_prefix) {
			out.push(TierRecord {
				facility_code: text,
				tier,
			});
		}
	}
	out
}

pub fn parse_tier_sheet(range: &Range<Data>, region_prefix: &str) -> Vec<TierRecord> {
	parse_tier_rows(range.rows(), region_prefix)
}

/// Diff parsed tiers against the stored mapping. The join is inner: parsed
/// facilities unknown to the reference table are ignored, and only rows
/// whose tier actually changed are emitted, in document order.
pub fn reconcile(parsed: &[TierRecord], stored: &HashMap<String, i32>) -> Vec<TierDelta> {
	parsed
		.iter()
		.filter(|record| {
			stored
				.get(&record.facility_code)
				.is_some_and(|current| *current != record.tier)
		})
		.map(|record| TierDelta {
			facility_code: record.facility_code.clone(),
			new_tier: record.tier,
		})
		.collect()
}

/// Reference mapping store for facility tiers. The Postgres implementation
/// lives in `crate::store`.
#[async_trait]
pub trait TierStore: Send + Sync {
	/// Current `facility_code -> tier` mapping for the region.
	async fn current_tiers(&self, region_prefix: &str) -> Result<HashMap<String, i32>>;
	/// Apply deltas as row-level updates keyed by facility code. Returns the
	/// number of rows updated.
	async fn apply_tier_deltas(&self, deltas: &[TierDelta]) -> Result<u64>;
}
