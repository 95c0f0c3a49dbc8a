use thiserror::Error;

/// Failure taxonomy for workbook processing.
///
/// A `StructuralMismatch`-class error (missing sheets, missing header labels,
/// missing section markers) means the publisher changed the workbook layout in
/// a way the matcher/extractor cannot absorb. It is fatal for the whole
/// workbook: no partial category batch is committed once one of these fires.
/// Numeric coercion failures are deliberately NOT part of this taxonomy; they
/// degrade to `None` values during reshaping.
#[derive(Debug, Error)]
pub enum EtlError {
	#[error("category '{category}' matched {found} sheet(s), expected a volume/finance pair")]
	SheetsNotFound { category: String, found: usize },

	#[error("header label '{label}' not found in the first {scan_rows} rows of sheet '{sheet}'")]
	HeaderNotFound {
		sheet: String,
		label: String,
		scan_rows: usize,
	},

	#[error("sheet '{sheet}' has {found} section marker(s), expected at least 2 to split day-care from IVF")]
	SectionMarkerMissing { sheet: String, found: usize },

	#[error("workbook has no worksheet at index {0}")]
	MissingWorksheet(usize),

	#[error("archive contains no recognizable workbook")]
	NoWorkbookInArchive,

	#[error("unsupported archive format: '{0}'")]
	UnsupportedArchive(String),
}
