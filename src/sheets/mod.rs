pub mod extract;
pub mod matcher;
pub mod reshape;

#[cfg(test)]
pub mod test_utils;

pub use extract::{HeaderVocabulary, RawRow, RawTable, extract_table};
pub use matcher::{SheetAssignment, match_sheets};
pub use reshape::{LongRecord, reshape};

use std::io::Cursor;

use anyhow::{Result, anyhow};
use calamine::{Data, Range, Reader, Sheets, open_workbook_auto_from_rs};

use crate::error::EtlError;

/// Category keys with special handling downstream. These are the
/// `display_name()` values of the corresponding catalog entries.
pub const HIGH_COST_CATEGORY: &str = "вмп";
pub const DIALYSIS_CATEGORY: &str = "диализ";
pub const DAY_CARE_CATEGORY: &str = "дн.стационар";
pub const IVF_CATEGORY: &str = "эко";

/// Sheet-name marker distinguishing volume sheets from finance sheets.
pub const VOLUME_MARKER: &str = "объёмы";

/// Categories whose records carry the subgroup dimension, which then extends
/// the volume/finance join key.
pub fn carries_subgroup(category: &str) -> bool {
	category == HIGH_COST_CATEGORY || category == DIALYSIS_CATEGORY
}

/// An open workbook backed by an in-memory buffer. Archives are small enough
/// that the whole workbook is held in memory for the duration of one run.
pub type Workbook = Sheets<Cursor<Vec<u8>>>;

pub fn open_workbook_bytes(bytes: Vec<u8>) -> Result<Workbook> {
	open_workbook_auto_from_rs(Cursor::new(bytes))
		.map_err(|e| anyhow!("failed to open Excel workbook: {}", e))
}

/// Fetch a worksheet range by index, turning the two calamine failure shapes
/// (absent index, unreadable sheet) into one error.
pub fn worksheet_at(workbook: &mut Workbook, index: usize) -> Result<Range<Data>> {
	workbook
		.worksheet_range_at(index)
		.ok_or(EtlError::MissingWorksheet(index))?
		.map_err(|e| anyhow!("failed to read worksheet {}: {}", index, e))
}

/// Render a cell as a string the way the rest of the pipeline keys on it:
/// integral floats become integer strings so codes read from numeric cells
/// join against text codes in the reference tables.
pub fn cell_to_string(cell: &Data) -> String {
	match cell {
		Data::String(s) => s.trim().to_string(),
		Data::Int(i) => i.to_string(),
		Data::Float(f) => {
			if f.fract() == 0.0 {
				(*f as i64).to_string()
			} else {
				f.to_string()
			}
		}
		Data::Bool(b) => b.to_string(),
		_ => String::new(),
	}
}

/// Numeric coercion for metric cells. Failure is tolerated: a non-numeric
/// cell yields `None` and the record is kept.
pub fn cell_to_number(cell: &Data) -> Option<f64> {
	match cell {
		Data::Int(i) => Some(*i as f64),
		Data::Float(f) => Some(*f),
		Data::String(s) => s.trim().parse::<f64>().ok(),
		_ => None,
	}
}
