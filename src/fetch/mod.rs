use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

/// Free-text protocol dates look like "10 февраля 2024"; months are matched
/// by their first three letters.
static DATE_RE: Lazy<Regex> =
	Lazy::new(|| Regex::new(r"(\d{1,2}) ([а-яА-Я]+) (\d{4})").expect("valid date regex"));

static ANCHOR_SELECTOR: Lazy<Selector> =
	Lazy::new(|| Selector::parse("a").expect("valid anchor selector"));

const MONTHS: [(&str, u32); 12] = [
	("янв", 1),
	("фев", 2),
	("мар", 3),
	("апр", 4),
	("мая", 5),
	("июн", 6),
	("июл", 7),
	("авг", 8),
	("сен", 9),
	("окт", 10),
	("ноя", 11),
	("дек", 12),
];

/// An archive link discovered on the publication page, with the protocol
/// date parsed from the link text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveLink {
	pub url: Url,
	pub date: NaiveDate,
}

/// Parse a publication date out of free text ("Протокол от 10 февраля 2024 года").
pub fn parse_protocol_date(text: &str) -> Option<NaiveDate> {
	let captures = DATE_RE.captures(text)?;
	let day: u32 = captures[1].parse().ok()?;
	let month_word: String = captures[2].to_lowercase().chars().take(3).collect();
	let month = MONTHS
		.iter()
		.find(|(prefix, _)| *prefix == month_word)
		.map(|(_, m)| *m)?;
	let year: i32 = captures[3].parse().ok()?;
	NaiveDate::from_ymd_opt(year, month, day)
}

/// Scan the publication page for the first anchor whose text carries the
/// archive tag. Returns its absolute URL and protocol date when that date is
/// newer than `newer_than`; `None` means there is nothing new to ingest.
/// Only the first tagged anchor is considered: the page lists protocols
/// newest-first.
pub fn discover_latest(
	html: &str,
	base: &Url,
	archive_tag: &str,
	newer_than: Option<NaiveDate>,
) -> Result<Option<ArchiveLink>> {
	let document = Html::parse_document(html);
	for anchor in document.select(&ANCHOR_SELECTOR) {
		let text: String = anchor.text().collect();
		if !text.contains(archive_tag) {
			continue;
		}

		let date = parse_protocol_date(&text)
			.ok_or_else(|| anyhow!("no protocol date in link text '{}'", text.trim()))?;
		if newer_than.is_some_and(|max| date <= max) {
			return Ok(None);
		}

		let href = anchor
			.value()
			.attr("href")
			.ok_or_else(|| anyhow!("tagged anchor has no href"))?;
		let url = base
			.join(href)
			.map_err(|e| anyhow!("failed to resolve archive link '{}': {}", href, e))?;
		return Ok(Some(ArchiveLink { url, date }));
	}
	Ok(None)
}

/// Fetch the publication page body. No retries: an unreachable source fails
/// the run, which is rescheduled externally.
pub async fn fetch_page(client: &reqwest::Client, url: &Url) -> Result<String> {
	let body = client
		.get(url.clone())
		.send()
		.await?
		.error_for_status()?
		.text()
		.await?;
	Ok(body)
}

/// Download an archive into `dir`, named after the last path segment of the
/// URL. Returns the on-disk path.
pub async fn download_archive(
	client: &reqwest::Client,
	url: &Url,
	dir: &Path,
) -> Result<PathBuf> {
	let filename = url
		.path_segments()
		.and_then(|mut segments| segments.next_back())
		.filter(|s| !s.is_empty())
		.ok_or_else(|| anyhow!("archive URL '{}' has no filename", url))?;

	let bytes = client
		.get(url.clone())
		.send()
		.await?
		.error_for_status()?
		.bytes()
		.await?;

	tokio::fs::create_dir_all(dir).await?;
	let path = dir.join(filename);
	tokio::fs::write(&path, &bytes).await?;
	Ok(path)
}
