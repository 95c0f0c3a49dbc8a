//! End-to-end pipeline tests over in-memory workbooks: sheets are written
//! with `rust_xlsxwriter`, read back through calamine, and processed against
//! in-memory sinks.

mod common;

use chrono::NaiveDate;
use common::{Cell, MemoryPlanSink, MemoryTierStore, workbook_bytes};
use planfeed::catalog::ReportCategory;
use planfeed::pipeline::{WorkbookMeta, process_planning, process_tiers};
use planfeed::sheets::{HeaderVocabulary, open_workbook_bytes};

fn insurer_header(vocab: &HeaderVocabulary) -> Vec<Cell> {
	vocab
		.insurers
		.iter()
		.map(|(label, _)| Cell::s(label))
		.collect()
}

/// The shared day-care/IVF sheet: a day-care section, then a second header
/// marking the IVF section. `scale` separates volume values from finance.
fn shared_sheet(vocab: &HeaderVocabulary, scale: f64) -> Vec<Vec<Cell>> {
	let mut header = vec![Cell::s(&vocab.facility_label)];
	header.extend(insurer_header(vocab));
	vec![
		vec![Cell::s("Дневной стационар")],
		header.clone(),
		vec![
			Cell::s("810001"),
			Cell::n(1.0 * scale),
			Cell::n(2.0 * scale),
			Cell::n(3.0 * scale),
		],
		vec![
			Cell::s("810002"),
			Cell::n(4.0 * scale),
			Cell::n(5.0 * scale),
			Cell::n(6.0 * scale),
		],
		vec![Cell::s("Экстракорпоральное оплодотворение")],
		header,
		vec![
			Cell::s("810001"),
			Cell::n(7.0 * scale),
			Cell::n(8.0 * scale),
			Cell::n(9.0 * scale),
		],
	]
}

fn dialysis_sheet(vocab: &HeaderVocabulary, scale: f64) -> Vec<Vec<Cell>> {
	let mut header = vec![
		Cell::s(&vocab.facility_label),
		Cell::s(&vocab.dialysis_subgroup_label),
	];
	header.extend(insurer_header(vocab));
	vec![
		vec![Cell::s("Приложение 7")],
		header,
		vec![
			Cell::s("810003"),
			Cell::s("гемодиализ"),
			Cell::n(10.0 * scale),
			Cell::n(11.0 * scale),
			Cell::n(12.0 * scale),
		],
		vec![
			Cell::s("810003"),
			Cell::s("перитонеальный диализ"),
			Cell::n(13.0 * scale),
			Cell::n(14.0 * scale),
			Cell::n(15.0 * scale),
		],
		vec![
			Cell::s("810003"),
			Cell::s("итого"),
			Cell::n(23.0 * scale),
			Cell::n(25.0 * scale),
			Cell::n(27.0 * scale),
		],
	]
}

fn high_cost_sheet(vocab: &HeaderVocabulary, scale: f64) -> Vec<Vec<Cell>> {
	let mut header = vec![
		Cell::s(&vocab.facility_label),
		Cell::s(&vocab.high_cost_subgroup_label),
	];
	header.extend(insurer_header(vocab));
	vec![
		header,
		vec![
			Cell::s("810004"),
			Cell::n(1.0),
			Cell::n(20.0 * scale),
			Cell::n(21.0 * scale),
			Cell::n(22.0 * scale),
		],
		// Subtotal row without a group, dropped by the extractor
		vec![
			Cell::s("810004"),
			Cell::Empty,
			Cell::n(20.0 * scale),
			Cell::n(21.0 * scale),
			Cell::n(22.0 * scale),
		],
	]
}

fn categories() -> Vec<ReportCategory> {
	vec![
		ReportCategory::new(2, "дн.стационар", ""),
		ReportCategory::new(3, "диализ", ""),
		ReportCategory::new(5, "вмп", ""),
		ReportCategory::new(9, "эко", ""),
	]
}

fn planning_workbook() -> Vec<u8> {
	let vocab = HeaderVocabulary::default();
	// Finance sheet listed before volume for day-care to exercise role
	// resolution by sheet name rather than document order.
	workbook_bytes(&[
		("финансы дн.стационар", shared_sheet(&vocab, 10.0)),
		("объёмы дн.стационар", shared_sheet(&vocab, 1.0)),
		("объёмы диализ", dialysis_sheet(&vocab, 1.0)),
		("финансы диализ", dialysis_sheet(&vocab, 10.0)),
		("объёмы вмп", high_cost_sheet(&vocab, 1.0)),
		("финансы вмп", high_cost_sheet(&vocab, 10.0)),
	])
}

#[tokio::test]
async fn planning_workbook_loads_all_categories() {
	let mut workbook = open_workbook_bytes(planning_workbook()).expect("open workbook");
	let meta = WorkbookMeta {
		source_label: "Аналитическая справка 10.02.2024.xlsx".to_string(),
		ingestion_date: NaiveDate::from_ymd_opt(2024, 2, 10).unwrap(),
	};
	let sink = MemoryPlanSink::default();

	let summary = process_planning(
		&mut workbook,
		&categories(),
		&meta,
		&HeaderVocabulary::default(),
		"81",
		&sink,
	)
	.await
	.expect("process planning workbook");

	assert_eq!(summary.categories, 4);
	assert_eq!(summary.join_gaps, 0);
	// day-care 2 rows, dialysis 2, high-cost 1, IVF 1: x3 insurers each
	assert_eq!(summary.rows_appended, 18);

	let rows = sink.rows.lock().unwrap();
	assert_eq!(rows.len(), 18);
	assert!(rows.iter().all(|r| r.ingestion_date == meta.ingestion_date));
	assert!(rows.iter().all(|r| r.source_label == meta.source_label));

	// Volume/finance roles were resolved by name, not sheet order.
	let day_care = rows
		.iter()
		.find(|r| r.category == "дн.стационар" && r.facility_code == "810001" && r.insurer_code == "81008")
		.expect("day-care row");
	assert_eq!(day_care.sheet_id, 2);
	assert_eq!(day_care.volume_plan, Some(1.0));
	assert_eq!(day_care.finance_plan, Some(10.0));
	assert_eq!(day_care.subgroup, None);

	// IVF rows come from the section after the second marker, under their own id.
	let ivf: Vec<_> = rows.iter().filter(|r| r.category == "эко").collect();
	assert_eq!(ivf.len(), 3);
	assert!(ivf.iter().all(|r| r.sheet_id == 9));
	let ivf_alpha = ivf
		.iter()
		.find(|r| r.insurer_code == "81008")
		.expect("ivf row");
	assert_eq!(ivf_alpha.volume_plan, Some(7.0));
	assert_eq!(ivf_alpha.finance_plan, Some(70.0));

	// Dialysis modalities are remapped and extend the join key.
	let dialysis: Vec<_> = rows.iter().filter(|r| r.category == "диализ").collect();
	assert_eq!(dialysis.len(), 6);
	let hemo = dialysis
		.iter()
		.find(|r| r.subgroup.as_deref() == Some("101") && r.insurer_code == "81001")
		.expect("hemodialysis row");
	assert_eq!(hemo.volume_plan, Some(11.0));
	assert_eq!(hemo.finance_plan, Some(110.0));

	// High-cost care kept only the row with a group number.
	let high_cost: Vec<_> = rows.iter().filter(|r| r.category == "вмп").collect();
	assert_eq!(high_cost.len(), 3);
	assert!(high_cost.iter().all(|r| r.subgroup.as_deref() == Some("1")));
}

#[tokio::test]
async fn missing_category_sheets_abort_the_workbook() {
	let mut workbook = open_workbook_bytes(planning_workbook()).expect("open workbook");
	let meta = WorkbookMeta {
		source_label: "справка.xlsx".to_string(),
		ingestion_date: NaiveDate::from_ymd_opt(2024, 2, 10).unwrap(),
	};
	let sink = MemoryPlanSink::default();

	let mut cats = categories();
	cats.push(ReportCategory::new(11, "стоматология", ""));

	let err = process_planning(
		&mut workbook,
		&cats,
		&meta,
		&HeaderVocabulary::default(),
		"81",
		&sink,
	)
	.await
	.unwrap_err();
	assert!(err.to_string().contains("стоматология"));
}

#[tokio::test]
async fn tier_workbook_applies_only_changed_rows() {
	let grid = vec![
		vec![Cell::s("Перечень медицинских организаций по уровням")],
		vec![Cell::s("к I-му уровню оказания помощи")],
		vec![Cell::s("81001")],
		vec![Cell::s("ко II-му уровню оказания помощи")],
		vec![Cell::n(81002.0)],
		vec![Cell::s("81003")],
	];
	let bytes = workbook_bytes(&[("Уровни МО", grid)]);
	let mut workbook = open_workbook_bytes(bytes).expect("open workbook");

	let store = MemoryTierStore {
		stored: [
			("81001".to_string(), 1), // unchanged
			("81002".to_string(), 3), // changed
			("81003".to_string(), 2), // unchanged
		]
		.into_iter()
		.collect(),
		..Default::default()
	};

	let summary = process_tiers(&mut workbook, "81", &store)
		.await
		.expect("process tier workbook");

	assert_eq!(summary.facilities_parsed, 3);
	assert_eq!(summary.deltas_applied, 1);
	let applied = store.applied.lock().unwrap();
	assert_eq!(applied.len(), 1);
	assert_eq!(applied[0].facility_code, "81002");
	assert_eq!(applied[0].new_tier, 2);
}
