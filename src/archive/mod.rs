use std::io::{Read, Seek};
use std::path::Path;

use anyhow::{Result, anyhow};
use tokio::process::Command;
use zip::ZipArchive;

use crate::error::EtlError;

/// Business classification of a workbook found inside an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkbookKind {
	/// Planning data: the analytical volume/finance sheets.
	Plan,
	/// The facility-tier classification listing.
	Tiers,
}

/// A workbook pulled out of an archive, with its repaired filename.
#[derive(Debug, Clone)]
pub struct ExtractedWorkbook {
	pub bytes: Vec<u8>,
	pub filename: String,
	pub kind: WorkbookKind,
}

/// Classify an archive entry by filename: the planning workbook carries a
/// fixed prefix, the tier workbook a fixed substring (compared lowercased,
/// with closing parentheses stripped, matching how the publisher varies the
/// name). Anything else, including non-xlsx entries, is ignored.
pub fn classify_filename(name: &str, plan_tag: &str, tier_tag: &str) -> Option<WorkbookKind> {
	if !name.ends_with(".xlsx") {
		return None;
	}
	if name.starts_with(plan_tag) {
		return Some(WorkbookKind::Plan);
	}
	if name.to_lowercase().replace(')', "").contains(tier_tag) {
		return Some(WorkbookKind::Tiers);
	}
	None
}

/// Zip entry names predating the UTF-8 flag are stored in a legacy codepage;
/// the publisher's archives use cp866 for Russian filenames. Valid UTF-8 is
/// taken as-is, everything else decoded as cp866.
pub fn decode_entry_name(raw: &[u8]) -> String {
	match std::str::from_utf8(raw) {
		Ok(s) => s.to_string(),
		Err(_) => encoding_rs::IBM866.decode(raw).0.into_owned(),
	}
}

/// Walk a zip archive and pull out the first entry that classifies as a
/// planning or tier workbook.
pub fn extract_from_zip<R: Read + Seek>(
	reader: R,
	plan_tag: &str,
	tier_tag: &str,
) -> Result<ExtractedWorkbook> {
	let mut archive =
		ZipArchive::new(reader).map_err(|e| anyhow!("failed to open zip archive: {}", e))?;

	for index in 0..archive.len() {
		let mut file = archive
			.by_index(index)
			.map_err(|e| anyhow!("failed to read zip entry {}: {}", index, e))?;
		let raw_name = file.name_raw().to_vec();
		let filename = decode_entry_name(&raw_name);
		let Some(kind) = classify_filename(&filename, plan_tag, tier_tag) else {
			continue;
		};

		let mut bytes = Vec::new();
		file.read_to_end(&mut bytes)
			.map_err(|e| anyhow!("failed to read '{}' from zip: {}", filename, e))?;
		return Ok(ExtractedWorkbook {
			bytes,
			filename,
			kind,
		});
	}

	Err(EtlError::NoWorkbookInArchive.into())
}

/// Rar extraction delegates to the external `unrar` binary, which must be on
/// PATH (the publisher occasionally ships rar instead of zip).
pub async fn extract_from_rar(
	path: &Path,
	plan_tag: &str,
	tier_tag: &str,
) -> Result<ExtractedWorkbook> {
	let listing = Command::new("unrar")
		.arg("lb")
		.arg(path)
		.output()
		.await
		.map_err(|e| anyhow!("failed to run unrar: {}", e))?;
	if !listing.status.success() {
		return Err(anyhow!(
			"unrar lb failed: {}",
			String::from_utf8_lossy(&listing.stderr)
		));
	}

	for line in String::from_utf8_lossy(&listing.stdout).lines() {
		let filename = line.trim();
		let Some(kind) = classify_filename(filename, plan_tag, tier_tag) else {
			continue;
		};

		let extracted = Command::new("unrar")
			.arg("p")
			.arg("-inul")
			.arg(path)
			.arg(filename)
			.output()
			.await
			.map_err(|e| anyhow!("failed to run unrar: {}", e))?;
		if !extracted.status.success() {
			return Err(anyhow!(
				"unrar p failed for '{}': {}",
				filename,
				String::from_utf8_lossy(&extracted.stderr)
			));
		}
		return Ok(ExtractedWorkbook {
			bytes: extracted.stdout,
			filename: filename.to_string(),
			kind,
		});
	}

	Err(EtlError::NoWorkbookInArchive.into())
}

/// Pull the recognized workbook out of a downloaded archive, dispatching on
/// the extension, and delete the archive afterwards.
pub async fn extract_workbook(
	path: &Path,
	plan_tag: &str,
	tier_tag: &str,
) -> Result<ExtractedWorkbook> {
	let extension = path
		.extension()
		.and_then(|e| e.to_str())
		.unwrap_or("")
		.to_lowercase();

	let extracted = match extension.as_str() {
		"zip" => {
			let file = std::fs::File::open(path)
				.map_err(|e| anyhow!("failed to open '{}': {}", path.display(), e))?;
			extract_from_zip(std::io::BufReader::new(file), plan_tag, tier_tag)?
		}
		"rar" => extract_from_rar(path, plan_tag, tier_tag).await?,
		other => return Err(EtlError::UnsupportedArchive(other.to_string()).into()),
	};

	std::fs::remove_file(path)
		.map_err(|e| anyhow!("failed to remove archive '{}': {}", path.display(), e))?;
	Ok(extracted)
}
