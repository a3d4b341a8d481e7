use crate::error::{PipelineError, Result};
use crate::types::{cell_text, LineItemTable};
use csv::WriterBuilder;
use rust_xlsxwriter::{Color, Format, Workbook, XlsxError};
use serde_json::Value;
use std::path::PathBuf;

pub const CSV_FILE_NAME: &str = "order_matches.csv";
pub const XLSX_FILE_NAME: &str = "order_matches.xlsx";
const WORKSHEET_NAME: &str = "order_matches";

/// Export formats offered for the final table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Xlsx,
}

impl ExportFormat {
    pub fn file_name(self) -> &'static str {
        match self {
            ExportFormat::Csv => CSV_FILE_NAME,
            ExportFormat::Xlsx => XLSX_FILE_NAME,
        }
    }

    pub fn render(self, table: &LineItemTable) -> Result<Vec<u8>> {
        match self {
            ExportFormat::Csv => to_csv(table),
            ExportFormat::Xlsx => to_xlsx(table),
        }
    }
}

/// UTF-8 comma-separated text: header row, then one record per row.
pub fn to_csv(table: &LineItemTable) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new().from_writer(Vec::<u8>::new());
    writer.write_record(table.columns())?;
    for row in table.rows() {
        writer.write_record(row.iter().map(cell_text))?;
    }
    writer.flush()?;
    writer
        .into_inner()
        .map_err(|e| PipelineError::Csv(e.into_error().into()))
}

/// Single-sheet workbook with a bold, frozen header row.
pub fn to_xlsx(table: &LineItemTable) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(WORKSHEET_NAME)?;

    let header_format = Format::new()
        .set_bold()
        .set_background_color(Color::RGB(0x2563EB))
        .set_font_color(Color::RGB(0xFFFFFF));

    for (col, header) in table.columns().iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, sanitize_cell(header), &header_format)?;
    }
    for (row_idx, row) in table.rows().iter().enumerate() {
        let r = (row_idx + 1) as u32;
        for (col, value) in row.iter().enumerate() {
            let c = col as u16;
            match value {
                Value::Null => {}
                Value::Bool(b) => {
                    worksheet.write_boolean(r, c, *b)?;
                }
                Value::Number(n) => match n.as_f64() {
                    Some(f) => {
                        worksheet.write_number(r, c, f)?;
                    }
                    None => {
                        worksheet.write_string(r, c, n.to_string())?;
                    }
                },
                other => {
                    worksheet.write_string(r, c, sanitize_cell(&cell_text(other)))?;
                }
            }
        }
    }
    worksheet.set_freeze_panes(1, 0)?;
    worksheet.autofit();

    workbook.save_to_buffer().map_err(|e: XlsxError| e.into())
}

/// Drop control characters that produce unreadable sheet XML.
fn sanitize_cell(s: &str) -> String {
    s.chars()
        .filter(|&c| {
            let u = c as u32;
            c == '\t' || c == '\n' || c == '\r' || !(u < 0x20 || u == 0x7F || u == 0xFFFE || u == 0xFFFF)
        })
        .collect()
}

/// Where to write an export: the explicit path if one was chosen, otherwise a
/// timestamped, not-yet-existing file in Downloads (or Desktop).
pub fn resolve_export_path(path_override: Option<&str>, format: ExportFormat) -> Result<PathBuf> {
    if let Some(p) = path_override.map(str::trim).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(p));
    }
    let dir = dirs::download_dir()
        .or_else(dirs::desktop_dir)
        .ok_or_else(|| PipelineError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not find Downloads or Desktop folder.",
        )))?;

    let file_name = format.file_name();
    let (stem, ext) = file_name.rsplit_once('.').unwrap_or((file_name, ""));
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let mut path = dir.join(format!("{}_{}.{}", stem, stamp, ext));
    let mut counter = 2u32;
    while path.exists() {
        path = dir.join(format!("{}_{}_{}.{}", stem, stamp, counter, ext));
        counter += 1;
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::{Cursor, Read};

    fn table(v: Value) -> LineItemTable {
        crate::extract::table_from_response(v).unwrap()
    }

    #[test]
    fn csv_header_then_rows() {
        let t = table(json!([{"A": "x", "Matched Item": "m1"}]));
        let csv = String::from_utf8(to_csv(&t).unwrap()).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("A,Matched Item"));
        assert_eq!(lines.next(), Some("x,m1"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn csv_quotes_and_renders_cells() {
        let t = table(json!([{"Desc": "Bolt, hex \"M8\"", "Qty": 4, "Note": null}]));
        let csv = String::from_utf8(to_csv(&t).unwrap()).unwrap();
        assert_eq!(csv, "Desc,Qty,Note\n\"Bolt, hex \"\"M8\"\"\",4,\n");
    }

    #[test]
    fn csv_of_empty_table_is_header_only() {
        let t = LineItemTable::new(vec!["A".into(), "B".into()]).unwrap();
        assert_eq!(to_csv(&t).unwrap(), b"A,B\n");
    }

    fn xlsx_part(bytes: &[u8], name: &str) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut xml = String::new();
        archive.by_name(name).unwrap().read_to_string(&mut xml).unwrap();
        xml
    }

    fn cell_xml<'a>(sheet: &'a str, cell_ref: &str) -> &'a str {
        let start = sheet
            .find(&format!("<c r=\"{}\"", cell_ref))
            .unwrap_or_else(|| panic!("no cell {cell_ref} in {sheet}"));
        let end = start + sheet[start..].find("</c>").unwrap();
        &sheet[start..end]
    }

    #[test]
    fn xlsx_is_a_zip_container() {
        let t = table(json!([{"A": "x", "N": 1.5, "B": true, "Z": null}]));
        let bytes = to_xlsx(&t).unwrap();
        assert!(bytes.starts_with(&[0x50, 0x4B, 0x03, 0x04]));
    }

    #[test]
    fn xlsx_keeps_cell_types() {
        let t = table(json!([{"A": "x", "N": 1.5, "B": true, "Z": null}]));
        let bytes = to_xlsx(&t).unwrap();
        let sheet = xlsx_part(&bytes, "xl/worksheets/sheet1.xml");

        assert!(cell_xml(&sheet, "A2").contains(r#"t="s""#));
        let number = cell_xml(&sheet, "B2");
        assert!(!number.contains("t=\""), "number written as text: {number}");
        assert!(number.contains("<v>1.5</v>"));
        let boolean = cell_xml(&sheet, "C2");
        assert!(boolean.contains(r#"t="b""#), "{boolean}");
        assert!(boolean.contains("<v>1</v>"));
        assert!(!sheet.contains(r#"<c r="D2""#), "null cells stay blank");
    }

    #[test]
    fn xlsx_header_is_named_bold_and_frozen() {
        let t = table(json!([{"A": "x", "Matched Item": "m1"}]));
        let bytes = to_xlsx(&t).unwrap();

        let workbook = xlsx_part(&bytes, "xl/workbook.xml");
        assert!(workbook.contains(r#"<sheet name="order_matches""#), "{workbook}");

        let sheet = xlsx_part(&bytes, "xl/worksheets/sheet1.xml");
        assert!(sheet.contains(r#"ySplit="1""#));
        assert!(sheet.contains(r#"state="frozen""#));
        assert!(cell_xml(&sheet, "A1").contains(" s=\""), "header cell has no style");
        assert!(!cell_xml(&sheet, "A2").contains(" s=\""));

        let styles = xlsx_part(&bytes, "xl/styles.xml");
        assert!(styles.contains("<b/>"));
    }

    #[test]
    fn sanitize_drops_control_chars() {
        assert_eq!(sanitize_cell("a\u{0}b\tc\u{7F}"), "ab\tc");
    }

    #[test]
    fn explicit_export_path_wins() {
        let p = resolve_export_path(Some(" /tmp/out.csv "), ExportFormat::Csv).unwrap();
        assert_eq!(p, PathBuf::from("/tmp/out.csv"));
    }

    #[test]
    fn format_names() {
        assert_eq!(ExportFormat::Csv.file_name(), "order_matches.csv");
        assert_eq!(ExportFormat::Xlsx.file_name(), "order_matches.xlsx");
    }
}
