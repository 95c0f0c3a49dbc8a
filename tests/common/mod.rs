//! Common helpers for integration tests: in-memory workbook construction and
//! in-memory substitutes for the Postgres-backed sinks.
//!
//! Each integration test binary compiles this module independently and uses
//! only a subset of it.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use planfeed::plan::{PlanRow, PlanSink};
use planfeed::tiers::{TierDelta, TierStore};
use rust_xlsxwriter::Workbook as XlsxWriter;

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
pub fn workbook_bytes(sheets: &[(&str, Vec<Vec<Cell>>)]) -> Vec<u8> {
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

/// Collects appended plan rows instead of writing to Postgres.
#[derive(Default)]
pub struct MemoryPlanSink {
	pub rows: Mutex<Vec<PlanRow>>,
}

#[async_trait]
impl PlanSink for MemoryPlanSink {
	async fn append_plan(&self, rows: &[PlanRow]) -> Result<u64> {
		let mut held = self.rows.lock().unwrap();
		held.extend_from_slice(rows);
		Ok(rows.len() as u64)
	}
}

/// Serves a fixed tier mapping and records applied deltas.
#[derive(Default)]
pub struct MemoryTierStore {
	pub stored: HashMap<String, i32>,
	pub applied: Mutex<Vec<TierDelta>>,
}

#[async_trait]
impl TierStore for MemoryTierStore {
	async fn current_tiers(&self, _region_prefix: &str) -> Result<HashMap<String, i32>> {
		Ok(self.stored.clone())
	}

	async fn apply_tier_deltas(&self, deltas: &[TierDelta]) -> Result<u64> {
		let mut held = self.applied.lock().unwrap();
		held.extend_from_slice(deltas);
		Ok(deltas.len() as u64)
	}
}
