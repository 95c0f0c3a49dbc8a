use anyhow::Result;
use calamine::{Data, Range};

use crate::error::EtlError;
use crate::sheets::{
	DAY_CARE_CATEGORY, DIALYSIS_CATEGORY, HIGH_COST_CATEGORY, IVF_CATEGORY, carries_subgroup,
	cell_to_string,
};

/// Header placement drifts release to release but stays within the top of the
/// sheet; discovery scans this many leading rows exhaustively.
pub const HEADER_SCAN_ROWS: usize = 15;

/// Integer codes the two dialysis modality labels are remapped to.
pub const HEMODIALYSIS_CODE: &str = "101";
pub const PERITONEAL_CODE: &str = "102";

/// The header-label vocabulary, kept as an explicit configuration table so a
/// future category only needs a new entry here. Labels are matched exactly
/// against cell text.
#[derive(Debug, Clone)]
pub struct HeaderVocabulary {
	/// Label of the facility-code column; doubles as the section marker on
	/// the shared day-care/IVF sheet.
	pub facility_label: String,
	/// Insurer column labels mapped to insurer codes, in reshape order.
	pub insurers: Vec<(String, String)>,
	/// Subgroup column label used by the dialysis category.
	pub dialysis_subgroup_label: String,
	/// Subgroup column label used by the high-cost-care category.
	pub high_cost_subgroup_label: String,
	/// The two modality labels the dialysis extractor keeps, in the order
	/// they remap to [`HEMODIALYSIS_CODE`] and [`PERITONEAL_CODE`].
	pub dialysis_modalities: (String, String),
}

impl Default for HeaderVocabulary {
	fn default() -> Self {
		Self {
			facility_label: "Код МО".to_string(),
			insurers: vec![
				("ООО \"АльфаСтрахование-ОМС\"".to_string(), "81008".to_string()),
				("АО \"СК\"СОГАЗ-Мед\"".to_string(), "81001".to_string()),
				("ООО \"Капитал МС\"".to_string(), "81007".to_string()),
			],
			dialysis_subgroup_label: "Наименование медицинской организации".to_string(),
			high_cost_subgroup_label: "№ группы ВМП".to_string(),
			dialysis_modalities: (
				"гемодиализ".to_string(),
				"перитонеальный диализ".to_string(),
			),
		}
	}
}

impl HeaderVocabulary {
	/// The subgroup label relevant for a category, if that category carries
	/// the subgroup dimension at all.
	fn subgroup_label_for(&self, category: &str) -> Option<&str> {
		match category {
			HIGH_COST_CATEGORY => Some(self.high_cost_subgroup_label.as_str()),
			DIALYSIS_CATEGORY => Some(self.dialysis_subgroup_label.as_str()),
			_ => None,
		}
	}
}

/// Field -> column mapping produced by the header scan.
#[derive(Debug, Clone, PartialEq, Eq)]
struct HeaderColumns {
	facility: usize,
	/// (insurer code, column), in vocabulary order.
	insurers: Vec<(String, usize)>,
	subgroup: Option<usize>,
}

/// One row of the cleaned rectangular table. `cells` aligns with
/// [`RawTable::insurer_codes`].
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
	pub facility_code: String,
	pub subgroup: Option<String>,
	pub cells: Vec<Data>,
}

/// The rectangular region of a sheet after header discovery and filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
	pub category: String,
	pub with_subgroup: bool,
	pub insurer_codes: Vec<String>,
	pub rows: Vec<RawRow>,
}

/// Bounded 2-D search for the header labels: any of the first
/// [`HEADER_SCAN_ROWS`] rows, any column. First occurrence of a label wins.
fn scan_header(
	rows: &[&[Data]],
	sheet_name: &str,
	category: &str,
	vocab: &HeaderVocabulary,
) -> Result<HeaderColumns> {
	let subgroup_label = vocab.subgroup_label_for(category);

	let mut facility: Option<usize> = None;
	let mut insurers: Vec<(String, Option<usize>)> = vocab
		.insurers
		.iter()
		.map(|(_, code)| (code.clone(), None))
		.collect();
	let mut subgroup: Option<usize> = None;

	for row in rows.iter().take(HEADER_SCAN_ROWS) {
		for (col, cell) in row.iter().enumerate() {
			let Data::String(text) = cell else { continue };
			if text == &vocab.facility_label {
				facility.get_or_insert(col);
				continue;
			}
			if let Some((idx, _)) = vocab
				.insurers
				.iter()
				.enumerate()
				.find(|(_, (label, _))| label == text)
			{
				insurers[idx].1.get_or_insert(col);
				continue;
			}
			if subgroup_label == Some(text.as_str()) {
				subgroup.get_or_insert(col);
			}
		}
	}

	let missing = |label: &str| EtlError::HeaderNotFound {
		sheet: sheet_name.to_string(),
		label: label.to_string(),
		scan_rows: HEADER_SCAN_ROWS,
	};

	let facility = facility.ok_or_else(|| missing(&vocab.facility_label))?;
	let insurers = insurers
		.into_iter()
		.zip(vocab.insurers.iter())
		.map(|((code, col), (label, _))| col.map(|c| (code, c)).ok_or_else(|| missing(label)))
		.collect::<Result<Vec<_>, _>>()?;
	if let Some(label) = subgroup_label {
		if subgroup.is_none() {
			return Err(missing(label).into());
		}
	}

	Ok(HeaderColumns {
		facility,
		insurers,
		subgroup,
	})
}

/// Day-care and IVF share one sheet. Rows where the facility-code column
/// holds the literal header label are section markers; everything before the
/// second marker is day-care, everything from it onward is IVF.
fn section_bounds(
	rows: &[&[Data]],
	facility_col: usize,
	sheet_name: &str,
	category: &str,
	facility_label: &str,
) -> Result<(usize, usize)> {
	let markers: Vec<usize> = rows
		.iter()
		.enumerate()
		.filter(|(_, row)| {
			matches!(row.get(facility_col), Some(Data::String(s)) if s == facility_label)
		})
		.map(|(i, _)| i)
		.collect();

	if markers.len() < 2 {
		return Err(EtlError::SectionMarkerMissing {
			sheet: sheet_name.to_string(),
			found: markers.len(),
		}
		.into());
	}

	Ok(if category == DAY_CARE_CATEGORY {
		(0, markers[1])
	} else {
		(markers[1], rows.len())
	})
}

/// Whether a facility-code cell keeps its row. A string keeps the row iff it
/// contains the regional prefix; an empty cell drops it; a numeric or other
/// non-string cell is undecidable and therefore kept. Header and annotation
/// rows fall out here because their labels never contain the prefix.
fn keep_by_facility_code(cell: &Data, region_prefix: &str) -> bool {
	match cell {
		Data::String(s) => s.contains(region_prefix),
		Data::Empty => false,
		_ => true,
	}
}

/// Locate the header, select the category's row range, and return the
/// cleaned, filtered table restricted to the vocabulary columns.
pub fn extract_table(
	range: &Range<Data>,
	sheet_name: &str,
	category: &str,
	vocab: &HeaderVocabulary,
	region_prefix: &str,
) -> Result<RawTable> {
	let rows: Vec<&[Data]> = range.rows().collect();
	let header = scan_header(&rows, sheet_name, category, vocab)?;

	let (start, end) = if category == DAY_CARE_CATEGORY || category == IVF_CATEGORY {
		section_bounds(&rows, header.facility, sheet_name, category, &vocab.facility_label)?
	} else {
		(0, rows.len())
	};

	let empty = Data::Empty;
	let mut out: Vec<RawRow> = Vec::new();
	for row in &rows[start..end] {
		let facility_cell = row.get(header.facility).unwrap_or(&empty);
		if !keep_by_facility_code(facility_cell, region_prefix) {
			continue;
		}

		let subgroup = header
			.subgroup
			.map(|col| cell_to_string(row.get(col).unwrap_or(&empty)));
		let cells: Vec<Data> = header
			.insurers
			.iter()
			.map(|(_, col)| row.get(*col).cloned().unwrap_or(Data::Empty))
			.collect();

		out.push(RawRow {
			facility_code: cell_to_string(facility_cell),
			subgroup,
			cells,
		});
	}

	let rows = match category {
		DIALYSIS_CATEGORY => remap_dialysis_subgroups(out, vocab),
		HIGH_COST_CATEGORY => out
			.into_iter()
			.filter(|r| r.subgroup.as_deref().is_some_and(|s| !s.is_empty()))
			.collect(),
		_ => out,
	};

	Ok(RawTable {
		category: category.to_string(),
		with_subgroup: carries_subgroup(category),
		insurer_codes: header.insurers.into_iter().map(|(code, _)| code).collect(),
		rows,
	})
}

/// Keep only the two known modality labels and remap them to their fixed
/// integer codes; anything else (facility names, totals) is excluded.
fn remap_dialysis_subgroups(rows: Vec<RawRow>, vocab: &HeaderVocabulary) -> Vec<RawRow> {
	let (hemo, peritoneal) = (&vocab.dialysis_modalities.0, &vocab.dialysis_modalities.1);
	rows.into_iter()
		.filter_map(|mut row| {
			let code = match row.subgroup.as_deref() {
				Some(s) if s == hemo => HEMODIALYSIS_CODE,
				Some(s) if s == peritoneal => PERITONEAL_CODE,
				_ => return None,
			};
			row.subgroup = Some(code.to_string());
			Some(row)
		})
		.collect()
}
