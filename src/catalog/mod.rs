use anyhow::Result;
use async_trait::async_trait;

/// Catalog id of the aggregate sheet that has no workbook counterpart and is
/// never matched against sheet names.
pub const RESERVED_SHEET_ID: i32 = 16;

/// One expected report section, as described by the reference table. Sheets
/// are matched against the two tokens, not against the raw reference name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportCategory {
	pub id: i32,
	pub primary_token: String,
	/// Empty for single-token categories; those additionally require that no
	/// modifier token appears in the sheet name.
	pub secondary_token: String,
}

impl ReportCategory {
	pub fn new(id: i32, primary: &str, secondary: &str) -> Self {
		Self {
			id,
			primary_token: primary.to_string(),
			secondary_token: secondary.to_string(),
		}
	}

	/// The category key used downstream as `list_name` and for the
	/// category-specific extraction rules.
	pub fn display_name(&self) -> String {
		format!("{} {}", self.primary_token, self.secondary_token)
			.trim_end()
			.to_string()
	}
}

/// Source of the per-run category list. The Postgres implementation lives in
/// `crate::store`; tests substitute fixed slices.
#[async_trait]
pub trait CatalogProvider: Send + Sync {
	/// Categories ordered by id, excluding [`RESERVED_SHEET_ID`].
	async fn categories(&self) -> Result<Vec<ReportCategory>>;
}
