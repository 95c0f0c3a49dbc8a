//! Builders for in-memory workbooks used by the unit tests. Sheets are
//! written with `rust_xlsxwriter` and read back through the same calamine
//! path production uses.

use calamine::{Data, Range, Reader};
use rust_xlsxwriter::Workbook as XlsxWriter;

use crate::sheets::{Workbook, open_workbook_bytes};

/// Test cell values; `Empty` cells are simply not written.
#[derive(Debug, Clone)]
pub enum Cell {
	S(String),
	N(f64),
	Empty,
}

impl Cell {
	pub fn s(v: &str) -> Self {
		Cell::S(v.to_string())
	}

	pub fn n(v: f64) -> Self {
		Cell::N(v)
	}
}

/// Build an xlsx workbook with the given named sheets and return its bytes.
pub fn workbook_bytes(sheets: &[(&str, &[Vec<Cell>])]) -> Vec<u8> {
	let mut writer = XlsxWriter::new();
	for (name, grid) in sheets {
		let ws = writer.add_worksheet();
		ws.set_name(*name).expect("valid sheet name");
		for (r, row) in grid.iter().enumerate() {
			for (c, cell) in row.iter().enumerate() {
				match cell {
					Cell::S(s) => {
						ws.write_string(r as u32, c as u16, s).expect("write string");
					}
					Cell::N(n) => {
						ws.write_number(r as u32, c as u16, *n).expect("write number");
					}
					Cell::Empty => {}
				}
			}
		}
	}
	writer.save_to_buffer().expect("serialize workbook")
}

pub fn open_workbook(sheets: &[(&str, &[Vec<Cell>])]) -> Workbook {
	open_workbook_bytes(workbook_bytes(sheets)).expect("open workbook")
}

/// Build a one-sheet workbook and return that sheet's range.
pub fn open_single_sheet(name: &str, grid: &[Vec<Cell>]) -> Range<Data> {
	let mut wb = open_workbook(&[(name, grid)]);
	wb.worksheet_range_at(0)
		.expect("sheet present")
		.expect("sheet readable")
}
