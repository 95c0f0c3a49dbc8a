use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

use crate::catalog::{CatalogProvider, RESERVED_SHEET_ID, ReportCategory};
use crate::plan::{PlanRow, PlanSink};
use crate::tiers::{TierDelta, TierStore};

/// Postgres bind parameters are capped at u16::MAX; nine binds per plan row
/// keeps batches of this size well under the cap.
const APPEND_CHUNK_ROWS: usize = 5_000;

/// Postgres-backed implementation of the catalog, planning-append, and
/// tier-reference seams. One pool, shared across a run.
pub struct PgStore {
	pool: PgPool,
}

impl PgStore {
	pub fn new(pool: PgPool) -> Self {
		Self { pool }
	}

	/// Connect helper using a DATABASE_URL-like string.
	pub async fn connect(database_url: &str) -> Result<Self> {
		let pool = PgPool::connect(database_url).await?;
		Ok(Self::new(pool))
	}

	/// The newest publication date already loaded. Archives up to and
	/// including this date are skipped by discovery; that is the only guard
	/// against duplicate appends.
	pub async fn max_ingestion_date(&self) -> Result<Option<NaiveDate>> {
		let date: Option<NaiveDate> =
			sqlx::query_scalar("SELECT max(date_ins) FROM tfoms.op_plan")
				.fetch_one(&self.pool)
				.await?;
		Ok(date)
	}
}

#[async_trait]
impl CatalogProvider for PgStore {
	async fn categories(&self) -> Result<Vec<ReportCategory>> {
		let rows = sqlx::query(
			"SELECT id_report_sheet, \
			        split_part(lower(name), ' ', 1) AS primary_token, \
			        split_part(lower(name), ' ', 2) AS secondary_token \
			 FROM reports.ref_report_sheet \
			 WHERE id_report_sheet != $1 \
			 ORDER BY id_report_sheet",
		)
		.bind(RESERVED_SHEET_ID)
		.fetch_all(&self.pool)
		.await?;

		Ok(rows
			.into_iter()
			.map(|row| ReportCategory {
				id: row.get("id_report_sheet"),
				primary_token: row.get("primary_token"),
				secondary_token: row.get("secondary_token"),
			})
			.collect())
	}
}

#[async_trait]
impl PlanSink for PgStore {
	async fn append_plan(&self, rows: &[PlanRow]) -> Result<u64> {
		let mut appended = 0u64;
		for chunk in rows.chunks(APPEND_CHUNK_ROWS) {
			let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
				"INSERT INTO tfoms.op_plan \
				 (code_mo, id_additional_group, code_smo, volume_plan, finance_plan, \
				  id_sheet, list_name, comment, date_ins) ",
			);
			builder.push_values(chunk, |mut b, row| {
				b.push_bind(row.facility_code.clone())
					.push_bind(row.subgroup.clone())
					.push_bind(row.insurer_code.clone())
					.push_bind(row.volume_plan)
					.push_bind(row.finance_plan)
					.push_bind(row.sheet_id)
					.push_bind(row.category.clone())
					.push_bind(row.source_label.clone())
					.push_bind(row.ingestion_date);
			});
			let result = builder.build().execute(&self.pool).await?;
			appended += result.rows_affected();
		}
		Ok(appended)
	}
}

#[async_trait]
impl TierStore for PgStore {
	async fn current_tiers(&self, region_prefix: &str) -> Result<HashMap<String, i32>> {
		let rows = sqlx::query(
			"SELECT federal_code::text AS federal_code, level_mo \
			 FROM nsi.ref_mo \
			 WHERE federal_code::text LIKE '%' || $1 || '%'",
		)
		.bind(region_prefix)
		.fetch_all(&self.pool)
		.await?;

		Ok(rows
			.into_iter()
			.map(|row| (row.get("federal_code"), row.get("level_mo")))
			.collect())
	}

	async fn apply_tier_deltas(&self, deltas: &[TierDelta]) -> Result<u64> {
		let mut updated = 0u64;
		for delta in deltas {
			let result = sqlx::query(
				"UPDATE nsi.ref_mo SET level_mo = $1 WHERE federal_code::numeric = $2::numeric",
			)
			.bind(delta.new_tier)
			.bind(delta.facility_code.clone())
			.execute(&self.pool)
			.await?;
			updated += result.rows_affected();
		}
		Ok(updated)
	}
}
