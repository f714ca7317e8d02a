use crate::db::RowSet;
use crate::report::{NO_DATA_MESSAGE, ReportArtifact, ReportError, format_cell, safe_filename};
use serde_json::Value;

// BOM so Excel opens the file as UTF-8
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

pub fn render(rows: &RowSet, title: &str) -> Result<ReportArtifact, ReportError> {
    let mut writer = ::csv::Writer::from_writer(Vec::new());

    if rows.is_empty() {
        if rows.columns.is_empty() {
            writer
                .write_record(["message"])
                .map_err(|e| ReportError::Render(e.to_string()))?;
            writer
                .write_record([NO_DATA_MESSAGE])
                .map_err(|e| ReportError::Render(e.to_string()))?;
        } else {
            writer
                .write_record(&rows.columns)
                .map_err(|e| ReportError::Render(e.to_string()))?;
        }
    } else {
        writer
            .write_record(&rows.columns)
            .map_err(|e| ReportError::Render(e.to_string()))?;

        for row in &rows.rows {
            let record: Vec<String> = rows
                .columns
                .iter()
                .map(|column| format_cell(row.get(column).unwrap_or(&Value::Null)))
                .collect();
            writer
                .write_record(&record)
                .map_err(|e| ReportError::Render(e.to_string()))?;
        }
    }

    let data = writer
        .into_inner()
        .map_err(|e| ReportError::Render(e.to_string()))?;

    let mut bytes = Vec::with_capacity(UTF8_BOM.len() + data.len());
    bytes.extend_from_slice(UTF8_BOM);
    bytes.extend_from_slice(&data);

    Ok(ReportArtifact {
        bytes,
        mime: "text/csv",
        filename: safe_filename(title, "csv"),
    })
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

    fn body(artifact: &ReportArtifact) -> String {
        assert_eq!(&artifact.bytes[..3], &[0xEF, 0xBB, 0xBF]);
        String::from_utf8(artifact.bytes[3..].to_vec()).unwrap()
    }

    #[test]
    fn header_and_rows_in_column_order() {
        let rows = rowset(&["a", "b"], vec![vec![json!(1), json!("x")]]);
        let artifact = render(&rows, "test").unwrap();

        let text = body(&artifact);
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("a,b"));
        assert_eq!(lines.next(), Some("1,x"));
        assert_eq!(artifact.mime, "text/csv");
        assert_eq!(artifact.filename, "test.csv");
    }

    #[test]
    fn null_values_render_as_empty_fields() {
        let rows = rowset(&["a", "b"], vec![vec![Value::Null, json!("y")]]);
        let text = body(&render(&rows, "t").unwrap());
        assert!(text.contains("\n,y"));
    }

    #[test]
    fn empty_rowset_still_produces_a_well_formed_file() {
        let rows = RowSet::default();
        let text = body(&render(&rows, "t").unwrap());
        assert!(text.starts_with("message"));
        assert!(text.contains(NO_DATA_MESSAGE));
    }

    #[test]
    fn structure_round_trips_through_a_csv_reader() {
        let rows = rowset(
            &["region", "total", "when"],
            vec![
                vec![json!("north"), json!(10.5), json!("2024-01-01")],
                vec![json!("south, east"), json!(3), Value::Null],
            ],
        );
        let artifact = render(&rows, "t").unwrap();

        let mut reader = ::csv::Reader::from_reader(&artifact.bytes[3..]);
        let headers: Vec<String> = reader
            .headers()
            .unwrap()
            .iter()
            .map(|h| h.to_string())
            .collect();
        assert_eq!(headers, vec!["region", "total", "when"]);

        let records: Vec<_> = reader.records().collect::<Result<_, _>>().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(&records[1][0], "south, east");
    }
}
