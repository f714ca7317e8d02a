use crate::db::RowSet;
use crate::report::{NO_DATA_MESSAGE, ReportArtifact, ReportError, safe_filename};
use rust_xlsxwriter::{Format, Workbook};
use serde_json::Value;

const SHEET_NAME: &str = "Report";
const MAX_COLUMN_WIDTH: f64 = 50.0;

pub fn render(rows: &RowSet, title: &str) -> Result<ReportArtifact, ReportError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet
        .set_name(SHEET_NAME)
        .map_err(|e| ReportError::Render(e.to_string()))?;

    if rows.is_empty() {
        // a single informational cell instead of an empty sheet
        sheet
            .write_string(0, 0, NO_DATA_MESSAGE)
            .map_err(|e| ReportError::Render(e.to_string()))?;
    } else {
        let header_format = Format::new().set_bold();

        for (col, name) in rows.columns.iter().enumerate() {
            sheet
                .write_string_with_format(0, col as u16, name, &header_format)
                .map_err(|e| ReportError::Render(e.to_string()))?;
        }

        for (row_index, row) in rows.rows.iter().enumerate() {
            let excel_row = (row_index + 1) as u32;
            for (col, column) in rows.columns.iter().enumerate() {
                write_cell(
                    sheet,
                    excel_row,
                    col as u16,
                    row.get(column).unwrap_or(&Value::Null),
                )?;
            }
        }

        // width per column sized to the longest value, capped
        for (col, name) in rows.columns.iter().enumerate() {
            let mut max_len = name.chars().count();
            for row in &rows.rows {
                let len = super::format_cell(row.get(name).unwrap_or(&Value::Null))
                    .chars()
                    .count();
                if len > max_len {
                    max_len = len;
                }
            }
            sheet
                .set_column_width(col as u16, ((max_len + 2) as f64).min(MAX_COLUMN_WIDTH))
                .map_err(|e| ReportError::Render(e.to_string()))?;
        }

        sheet
            .set_freeze_panes(1, 0)
            .map_err(|e| ReportError::Render(e.to_string()))?;
    }

    let bytes = workbook
        .save_to_buffer()
        .map_err(|e| ReportError::Render(e.to_string()))?;

    Ok(ReportArtifact {
        bytes,
        mime: "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        filename: safe_filename(title, "xlsx"),
    })
}

fn write_cell(
    sheet: &mut rust_xlsxwriter::Worksheet,
    row: u32,
    col: u16,
    value: &Value,
) -> Result<(), ReportError> {
    let result = match value {
        Value::Null => return Ok(()),
        Value::Bool(b) => sheet.write_boolean(row, col, *b),
        Value::Number(n) => match n.as_f64() {
            Some(v) => sheet.write_number(row, col, v),
            None => sheet.write_string(row, col, &n.to_string()),
        },
        Value::String(s) => sheet.write_string(row, col, s),
        other => sheet.write_string(row, col, &other.to_string()),
    };
    result.map_err(|e| ReportError::Render(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};

    fn rowset(columns: &[&str], rows: Vec<Vec<Value>>) -> RowSet {
        let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        let rows = rows
            .into_iter()
            .map(|values| {
                let mut map = Map::new();
                for (column, value) in columns.iter().zip(values) {
                    map.insert(column.clone(), value);
                }
                map
            })
            .collect();
        RowSet { columns, rows }
    }

    #[test]
    fn produces_a_zip_container_with_the_declared_mime() {
        let rows = rowset(&["a", "b"], vec![vec![json!(1), json!("x")]]);
        let artifact = render(&rows, "Sales export").unwrap();

        // XLSX is a ZIP archive
        assert_eq!(&artifact.bytes[..2], b"PK");
        assert_eq!(
            artifact.mime,
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        );
        assert_eq!(artifact.filename, "Sales_export.xlsx");
    }

    #[test]
    fn empty_rowset_still_yields_a_workbook() {
        let artifact = render(&RowSet::default(), "t").unwrap();
        assert_eq!(&artifact.bytes[..2], b"PK");
        assert!(!artifact.bytes.is_empty());
    }

    #[test]
    fn mixed_value_types_are_accepted() {
        let rows = rowset(
            &["n", "s", "b", "missing"],
            vec![vec![json!(1.5), json!("text"), json!(true), Value::Null]],
        );
        assert!(render(&rows, "t").is_ok());
    }
}
