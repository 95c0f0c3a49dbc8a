use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::catalog::ReportCategory;
use crate::error::EtlError;
use crate::sheets::{DAY_CARE_CATEGORY, IVF_CATEGORY, VOLUME_MARKER};

/// Modifier tokens that disqualify a sheet from matching a single-token
/// category: such sheets belong to a more specific two-token category
/// (oncology / prophylaxis / dispensary / diagnostics variants).
static MODIFIER_RE: Lazy<Regex> =
	Lazy::new(|| Regex::new("онко|проф|дисп|диагност").expect("valid modifier regex"));

/// Abbreviations that appear in sheet names but not in the reference table.
const ABBREVIATIONS: [(&str, &str); 3] =
	[("онкол.", "онко"), ("проф.", "проф"), ("дисп.", "дисп")];

/// Which sheets hold one category's volume and finance tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetAssignment {
	pub category: String,
	pub category_id: i32,
	pub volume_sheet: usize,
	pub finance_sheet: usize,
}

/// Strip parenthetical annotations, lowercase, and canonicalize known
/// abbreviations. Returned string is what both the token split and the
/// modifier check operate on.
fn normalize_sheet_name(name: &str) -> String {
	let mut n = name.replace(['(', ')'], "").to_lowercase();
	for (abbrev, full) in ABBREVIATIONS {
		n = n.replace(abbrev, full);
	}
	n
}

fn is_candidate(normalized: &str, category: &ReportCategory) -> bool {
	let tokens: Vec<&str> = normalized.split_whitespace().collect();
	if !tokens.contains(&category.primary_token.as_str()) {
		return false;
	}
	if category.secondary_token.is_empty() {
		!MODIFIER_RE.is_match(normalized)
	} else {
		tokens.contains(&category.secondary_token.as_str())
	}
}

/// Map workbook sheet names onto category descriptors.
///
/// For each category the two matching sheets are recorded in order of
/// appearance and the roles are resolved by content: the sheet whose name
/// carries the volume marker is the volume sheet. The IVF category has no
/// dedicated sheets and reuses the day-care pair under its own id; splitting
/// the shared sheet into the two row ranges happens in the extractor.
///
/// Fewer than two candidate sheets for a category means the workbook layout
/// changed; that is fatal for the whole workbook.
pub fn match_sheets(
	sheet_names: &[String],
	categories: &[ReportCategory],
) -> Result<Vec<SheetAssignment>> {
	let normalized: Vec<String> = sheet_names.iter().map(|n| normalize_sheet_name(n)).collect();

	let mut assignments: Vec<SheetAssignment> = Vec::new();
	for category in categories {
		let key = category.display_name();

		if category.primary_token == IVF_CATEGORY {
			// Requires the day-care assignment to exist already; the catalog
			// is ordered by id, with day-care ahead of IVF.
			let day_care = assignments
				.iter()
				.find(|a| a.category == DAY_CARE_CATEGORY)
				.ok_or(EtlError::SheetsNotFound {
					category: key.clone(),
					found: 0,
				})?;
			assignments.push(SheetAssignment {
				category: key,
				category_id: category.id,
				volume_sheet: day_care.volume_sheet,
				finance_sheet: day_care.finance_sheet,
			});
			continue;
		}

		let candidates: Vec<usize> = normalized
			.iter()
			.enumerate()
			.filter(|(_, n)| is_candidate(n, category))
			.map(|(i, _)| i)
			.collect();

		if candidates.len() < 2 {
			return Err(EtlError::SheetsNotFound {
				category: key,
				found: candidates.len(),
			}
			.into());
		}
		if candidates.len() > 2 {
			tracing::warn!(
				category = %key,
				candidates = candidates.len(),
				"more than two sheets matched; using the first two in sheet order"
			);
		}

		let (first, second) = (candidates[0], candidates[1]);
		let (volume_sheet, finance_sheet) = if normalized[first].contains(VOLUME_MARKER) {
			(first, second)
		} else {
			(second, first)
		};

		assignments.push(SheetAssignment {
			category: key,
			category_id: category.id,
			volume_sheet,
			finance_sheet,
		});
	}

	Ok(assignments)
}
