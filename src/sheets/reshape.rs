use crate::sheets::{RawTable, cell_to_number};

/// One facility × insurer × [subgroup] observation in long form.
/// `value` is `None` when the source cell failed numeric coercion.
#[derive(Debug, Clone, PartialEq)]
pub struct LongRecord {
	pub facility_code: String,
	pub subgroup: Option<String>,
	pub insurer_code: String,
	pub value: Option<f64>,
}

/// Melt the wide per-insurer columns into long rows, column-major: all rows
/// of the first insurer, then the second, then the third. An `R`-row table
/// with `K` insurer columns yields exactly `K × R` records, each preserving
/// the identity columns of its source row.
pub fn reshape(table: &RawTable) -> Vec<LongRecord> {
	let mut out = Vec::with_capacity(table.insurer_codes.len() * table.rows.len());
	for (k, insurer_code) in table.insurer_codes.iter().enumerate() {
		for row in &table.rows {
			out.push(LongRecord {
				facility_code: row.facility_code.clone(),
				subgroup: row.subgroup.clone(),
				insurer_code: insurer_code.clone(),
				value: row.cells.get(k).and_then(cell_to_number),
			});
		}
	}
	out
}
