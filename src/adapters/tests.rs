use std::path::Path;

use calamine::{Data, Range};
use image::{GrayImage, Luma};

use super::ocr::{SegmentationMode, parse_tsv};
use super::preprocess::{
    Enhancement, ImageEnhancer, Preprocessor, binarize, enhanced_path, thicken_strokes,
};
use super::raster::{RasterImage, check_page_in_range, parse_pdfinfo_pages, render_command};
use super::sink::{AnswerSheetDocument, AnswerSink, CellFill, JsonAnswerSheet, XlsxAnswerSheet};
use super::workbook::{column_index, parse_range};
use crate::engine::assemble::{SlotAnswer, SlotValue};
use crate::engine::library::MeasurementCategory;
use crate::error::BoundaryError;
use crate::util::read_json;

const TSV: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t2480\t3508\t-1\t
4\t1\t1\t1\t1\t0\t410\t200\t300\t40\t-1\t
5\t1\t1\t1\t1\t1\t410\t200\t60\t40\t96.1\t120
5\t1\t1\t1\t1\t2\t480\t205\t30\t35\t91.5\tW
5\t1\t1\t1\t1\t3\t520\t205\t30\t35\t-1\t
5\t1\t1\t1\t1\t4\t560\t205\t30\t35\t88.0\t
";

#[test]
fn tsv_keeps_only_recognized_words_with_boxes() {
    let tokens = parse_tsv(TSV);
    assert_eq!(tokens.len(), 2);

    assert_eq!(tokens[0].text, "120");
    assert_eq!(tokens[0].bbox.x, 410.0);
    assert_eq!(tokens[0].bbox.y, 200.0);
    assert_eq!(tokens[0].bbox.width, 60.0);
    assert_eq!(tokens[0].bbox.height, 40.0);

    assert_eq!(tokens[1].text, "W");
    assert_eq!(tokens[1].bbox.x, 480.0);
}

#[test]
fn tsv_ignores_truncated_rows() {
    assert!(parse_tsv("5\t1\t1\t1\t1\t1\t410\t200").is_empty());
    assert!(parse_tsv("").is_empty());
}

#[test]
fn segmentation_mode_labels_pass() {
    assert_eq!(SegmentationMode(6).to_string(), "psm6");
    assert_eq!(SegmentationMode(11).to_string(), "psm11");
}

#[test]
fn pdfinfo_page_count_is_parsed() {
    let stdout = "Title:          drawing\nCreator:        CAD\nPages:          5\nEncrypted:      no\n";
    assert_eq!(parse_pdfinfo_pages(stdout), Some(5));
    assert_eq!(parse_pdfinfo_pages("Title: x\n"), None);
}

#[test]
fn rendering_runs_only_pdftoppm_for_the_requested_page() {
    let command = render_command(
        Path::new("drawing.pdf"),
        3,
        300,
        Path::new("/tmp/dimcheck_page_3"),
    );

    assert_eq!(command.get_program(), "pdftoppm");
    let args = command
        .get_args()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect::<Vec<String>>();
    assert_eq!(
        args,
        vec![
            "-r",
            "300",
            "-f",
            "3",
            "-l",
            "3",
            "-singlefile",
            "-png",
            "drawing.pdf",
            "/tmp/dimcheck_page_3",
        ]
    );
}

#[test]
fn page_outside_document_is_a_boundary_error() {
    let pdf = Path::new("drawing.pdf");
    assert!(check_page_in_range(pdf, 1, 5).is_ok());
    assert!(check_page_in_range(pdf, 5, 5).is_ok());

    match check_page_in_range(pdf, 6, 5) {
        Err(BoundaryError::PageOutOfRange {
            page, page_count, ..
        }) => {
            assert_eq!(page, 6);
            assert_eq!(page_count, 5);
        }
        other => panic!("expected page out of range, got {other:?}"),
    }
    assert!(check_page_in_range(pdf, 0, 5).is_err());
}

#[test]
fn borrowed_raster_is_left_on_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("page.png");
    std::fs::write(&path, b"png").expect("write");

    drop(RasterImage::borrowed(&path));
    assert!(path.exists());
}

#[test]
fn column_letters_map_to_zero_based_index() {
    assert_eq!(column_index("A").expect("A"), 0);
    assert_eq!(column_index("b").expect("b"), 1);
    assert_eq!(column_index("Z").expect("Z"), 25);
    assert_eq!(column_index("AA").expect("AA"), 26);
    assert!(column_index("").is_err());
    assert!(column_index("B2").is_err());
}

fn questionnaire_range() -> Range<Data> {
    let mut range = Range::new((0, 0), (9, 2));
    range.set_value((0, 1), Data::String("Drawing checklist".to_string()));
    range.set_value((1, 1), Data::String("Page-2".to_string()));
    range.set_value((2, 1), Data::String("Total length?".to_string()));
    range.set_value((3, 1), Data::String("Hole diameter?".to_string()));
    range.set_value((4, 1), Data::Empty);
    range.set_value((5, 1), Data::String(" page-3 ".to_string()));
    range.set_value((6, 1), Data::String("Chamfer angle?".to_string()));
    range.set_value((7, 1), Data::Float(42.0));
    range.set_value((8, 1), Data::String("Page-5".to_string()));
    range.set_value((9, 0), Data::String("not the question column".to_string()));
    range
}

#[test]
fn questionnaire_blocks_follow_page_markers() {
    let pages = parse_range(&questionnaire_range(), 1).expect("parse");

    assert_eq!(pages.keys().copied().collect::<Vec<u32>>(), vec![2, 3, 5]);

    let page_two = &pages[&2];
    assert_eq!(page_two.len(), 2);
    assert_eq!(page_two[0].row, 3);
    assert_eq!(page_two[0].question, "Total length?");
    assert_eq!(page_two[1].row, 4);

    let page_three = &pages[&3];
    assert_eq!(page_three.len(), 2);
    assert_eq!(page_three[0].question, "Chamfer angle?");
    assert_eq!(page_three[1].question, "42");
    assert_eq!(page_three[1].row, 8);

    assert!(pages[&5].is_empty());
}

#[test]
fn questionnaire_without_markers_is_empty() {
    let mut range = Range::new((0, 0), (1, 1));
    range.set_value((0, 1), Data::String("Total length?".to_string()));
    range.set_value((1, 1), Data::String("Width?".to_string()));

    assert!(parse_range(&range, 1).expect("parse").is_empty());
}

fn answer(row: u32, value: SlotValue, category: Option<MeasurementCategory>) -> SlotAnswer {
    SlotAnswer {
        row,
        question: format!("question {row}"),
        category,
        value,
        explanation: "test".to_string(),
    }
}

#[test]
fn answer_sheet_marks_found_and_missing_cells() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("answers.json");
    let mut sheet = JsonAnswerSheet::create(&path, Path::new("checklist.xlsx"), "Sheet1", "c");

    sheet
        .write_page(
            2,
            &[
                answer(3, SlotValue::Scalar(120.0), Some(MeasurementCategory::TotalLength)),
                answer(4, SlotValue::NotFound, Some(MeasurementCategory::HoleDiameter)),
                answer(5, SlotValue::NotFound, None),
            ],
        )
        .expect("write page");

    let saved: AnswerSheetDocument = read_json(&path).expect("read back");
    assert_eq!(saved, *sheet.document());
    assert_eq!(saved.answer_column, "C");

    let page = &saved.pages[&2];
    assert_eq!(page.found, 1);
    assert_eq!(page.not_found, 2);

    assert_eq!(page.cells[0].cell, "C3");
    assert_eq!(page.cells[0].answer, "120");
    assert_eq!(page.cells[0].fill, CellFill::LightGreen);
    assert_eq!(page.cells[0].category.as_deref(), Some("total_length"));

    assert_eq!(page.cells[1].answer, "not found");
    assert_eq!(page.cells[1].fill, CellFill::LightPink);
    assert_eq!(page.cells[1].fill_argb, "FFFFC7CE");
    assert_eq!(page.cells[2].category, None);
}

#[test]
fn answer_sheet_is_saved_after_every_page() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("out").join("answers.json");
    let mut sheet = JsonAnswerSheet::create(&path, Path::new("checklist.xlsx"), "Sheet1", "C");

    sheet
        .write_page(3, &[answer(7, SlotValue::Scalar(45.0), None)])
        .expect("page 3");
    let after_first: AnswerSheetDocument = read_json(&path).expect("first save");
    assert_eq!(after_first.pages.len(), 1);

    sheet
        .write_page(
            5,
            &[answer(
                10,
                SlotValue::List(vec!["⌀10".to_string(), "⌀25".to_string()]),
                None,
            )],
        )
        .expect("page 5");
    let after_second: AnswerSheetDocument = read_json(&path).expect("second save");
    assert_eq!(after_second.pages.len(), 2);
    assert_eq!(after_second.pages[&5].cells[0].answer, "⌀10, ⌀25");

    let leftovers = std::fs::read_dir(path.parent().expect("parent"))
        .expect("list")
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
        .count();
    assert_eq!(leftovers, 0);
}

fn two_tone(width: u32, height: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, _| {
        if x < width / 2 { Luma([30]) } else { Luma([220]) }
    })
}

#[test]
fn contrast_enhancement_is_black_and_white() {
    let binary = binarize(&two_tone(4, 4));

    assert!(binary.pixels().all(|pixel| pixel.0[0] == 0 || pixel.0[0] == 255));
    assert_eq!(binary.get_pixel(0, 0).0[0], 0);
    assert_eq!(binary.get_pixel(1, 3).0[0], 0);
    assert_eq!(binary.get_pixel(3, 0).0[0], 255);
}

#[test]
fn symbol_enhancement_thickens_dark_strokes() {
    let mut binary = GrayImage::from_pixel(5, 5, Luma([255]));
    binary.put_pixel(2, 2, Luma([0]));

    let thick = thicken_strokes(&binary);
    assert_eq!(thick.get_pixel(1, 1).0[0], 0);
    assert_eq!(thick.get_pixel(3, 3).0[0], 0);
    assert_eq!(thick.get_pixel(0, 0).0[0], 255);
    assert_eq!(thick.get_pixel(4, 2).0[0], 255);
}

#[test]
fn enhanced_copy_sits_beside_the_render_and_is_cleaned_up() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("page_3.png");
    two_tone(8, 6).save(&path).expect("save render");
    let raster = RasterImage::borrowed(&path);

    let enhanced = Preprocessor
        .enhance(&raster, Enhancement::Symbols)
        .expect("enhance");
    let copy = enhanced.path().to_path_buf();
    assert_eq!(copy, enhanced_path(&path, Enhancement::Symbols));
    assert!(copy.ends_with("page_3-symbols.png"));

    let decoded = image::open(&copy).expect("decode").to_luma8();
    assert_eq!(decoded.dimensions(), (8, 6));

    drop(enhanced);
    assert!(!copy.exists());
    assert!(path.exists());
}

#[test]
fn undecodable_render_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("page_1.png");
    std::fs::write(&path, b"not a png").expect("write");

    assert!(
        Preprocessor
            .enhance(&RasterImage::borrowed(&path), Enhancement::Contrast)
            .is_err()
    );
}

fn checklist_workbook(path: &Path) {
    let mut book = umya_spreadsheet::new_file();
    let sheet = book.get_sheet_by_name_mut("Sheet1").expect("default sheet");
    sheet.get_cell_mut("B1").set_value("Page-2");
    sheet.get_cell_mut("B2").set_value("Total length?");
    sheet.get_cell_mut("B3").set_value("Hole diameter?");
    sheet.get_cell_mut("B4").set_value("Page-3");
    sheet.get_cell_mut("B5").set_value("Chamfer angle?");
    umya_spreadsheet::writer::xlsx::write(&book, path).expect("write workbook");
}

fn fill_argb(sheet: &umya_spreadsheet::Worksheet, cell: &str) -> Option<String> {
    sheet
        .get_cell(cell)
        .and_then(|cell| cell.get_style().get_background_color())
        .map(|color| color.get_argb().to_string())
}

#[test]
fn workbook_answers_are_written_with_fills_after_every_page() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = dir.path().join("checklist.xlsx");
    let target = dir.path().join("checklist_answers.xlsx");
    checklist_workbook(&source);

    let mut sheet = XlsxAnswerSheet::open(&source, &target, "Sheet1", "c").expect("open");
    sheet
        .write_page(
            2,
            &[
                answer(2, SlotValue::Scalar(120.0), Some(MeasurementCategory::TotalLength)),
                answer(3, SlotValue::NotFound, Some(MeasurementCategory::HoleDiameter)),
            ],
        )
        .expect("page 2");

    let saved = umya_spreadsheet::reader::xlsx::read(&target).expect("read page 2");
    let page_two = saved.get_sheet_by_name("Sheet1").expect("sheet");
    assert_eq!(page_two.get_value("C2"), "120");
    assert_eq!(page_two.get_value("C3"), "not found");
    assert_eq!(page_two.get_value("B2"), "Total length?");
    assert_eq!(fill_argb(page_two, "C2").as_deref(), Some(CellFill::LightGreen.argb()));
    assert_eq!(fill_argb(page_two, "C3").as_deref(), Some(CellFill::LightPink.argb()));
    assert_eq!(page_two.get_value("C5"), "");

    sheet
        .write_page(3, &[answer(5, SlotValue::Scalar(45.0), None)])
        .expect("page 3");
    let saved = umya_spreadsheet::reader::xlsx::read(&target).expect("read page 3");
    let page_three = saved.get_sheet_by_name("Sheet1").expect("sheet");
    assert_eq!(page_three.get_value("C2"), "120");
    assert_eq!(page_three.get_value("C5"), "45");

    let original = umya_spreadsheet::reader::xlsx::read(&source).expect("read source");
    assert_eq!(original.get_sheet_by_name("Sheet1").expect("sheet").get_value("C2"), "");
}

#[test]
fn workbook_sink_needs_the_questionnaire_sheet() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = dir.path().join("checklist.xlsx");
    checklist_workbook(&source);

    assert!(XlsxAnswerSheet::open(&source, &source, "Answers", "C").is_err());
    assert!(
        XlsxAnswerSheet::open(&dir.path().join("missing.xlsx"), &source, "Sheet1", "C").is_err()
    );
}

#[test]
fn paired_sinks_both_receive_every_page() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = dir.path().join("checklist.xlsx");
    let answers = dir.path().join("answers.json");
    checklist_workbook(&source);

    let mut sinks = (
        XlsxAnswerSheet::open(&source, &source, "Sheet1", "C").expect("open"),
        JsonAnswerSheet::create(&answers, &source, "Sheet1", "C"),
    );
    sinks
        .write_page(3, &[answer(5, SlotValue::Scalar(45.0), None)])
        .expect("write");

    let saved: AnswerSheetDocument = read_json(&answers).expect("json");
    assert_eq!(saved.pages[&3].cells[0].cell, "C5");
    let book = umya_spreadsheet::reader::xlsx::read(&source).expect("read");
    assert_eq!(book.get_sheet_by_name("Sheet1").expect("sheet").get_value("C5"), "45");
}
