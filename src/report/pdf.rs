use crate::db::RowSet;
use crate::report::{NO_DATA_MESSAGE, ReportArtifact, ReportError, format_cell, safe_filename};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use serde_json::Value;
use tracing::error;

// A4 in points, with the margins the report template has always used
const PAGE_WIDTH: f32 = 595.28;
const PAGE_HEIGHT: f32 = 841.89;
const MARGIN_LEFT: f32 = 24.0;
const MARGIN_RIGHT: f32 = 24.0;
const MARGIN_TOP: f32 = 36.0;
const MARGIN_BOTTOM: f32 = 36.0;

const TITLE_SIZE: f32 = 16.0;
const HEADER_FONT_SIZE: f32 = 9.0;
const BODY_FONT_SIZE: f32 = 8.0;
const HEADER_ROW_HEIGHT: f32 = 18.0;
const ROW_HEIGHT: f32 = 14.0;
const CELL_PADDING: f32 = 4.0;

// Column width heuristic: bounded sample, bounded chars per column
const AVG_CHAR_WIDTH: f32 = BODY_FONT_SIZE * 0.55;
const MAX_CHARS_PER_COLUMN: usize = 40;
const MIN_COLUMN_WIDTH: f32 = 50.0;
const WIDTH_SAMPLE_ROWS: usize = 1000;

/// Renders a titled, paginated table. The header row repeats on every
/// page and per-column widths are scaled so the table never overflows
/// the printable width. A rendering failure produces a single-page
/// document carrying the error text instead of propagating.
pub fn render(rows: &RowSet, title: &str) -> Result<ReportArtifact, ReportError> {
    let bytes = match build_document(rows, title) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("PDF table rendering failed, emitting fallback page: {}", e);
            build_message_document(title, &format!("Failed to render the table: {}", e))?
        }
    };

    Ok(ReportArtifact {
        bytes,
        mime: "application/pdf",
        filename: safe_filename(title, "pdf"),
    })
}

fn build_document(rows: &RowSet, title: &str) -> Result<Vec<u8>, ReportError> {
    if rows.is_empty() {
        return build_message_document(title, NO_DATA_MESSAGE);
    }

    let widths = column_widths(rows);
    let char_caps = column_char_caps(rows);

    let mut pages: Vec<Vec<Operation>> = Vec::new();
    let mut ops: Vec<Operation> = Vec::new();

    // Title only on the first page
    let mut y = PAGE_HEIGHT - MARGIN_TOP - TITLE_SIZE;
    push_text(&mut ops, "F2", TITLE_SIZE, MARGIN_LEFT, y, title);
    y -= TITLE_SIZE + 10.0;

    y = push_header_row(&mut ops, &rows.columns, &widths, &char_caps, y);

    for (index, row) in rows.rows.iter().enumerate() {
        if y - ROW_HEIGHT < MARGIN_BOTTOM {
            pages.push(std::mem::take(&mut ops));
            y = push_header_row(&mut ops, &rows.columns, &widths, &char_caps, PAGE_HEIGHT - MARGIN_TOP);
        }

        y -= ROW_HEIGHT;

        // Zebra banding
        if index % 2 == 1 {
            push_fill_rect(&mut ops, MARGIN_LEFT, y, widths.iter().sum(), ROW_HEIGHT, (0.97, 0.97, 0.97));
        }

        let mut x = MARGIN_LEFT;
        for (column, (&width, &cap)) in rows.columns.iter().zip(widths.iter().zip(&char_caps)) {
            let text = format_cell(row.get(column).unwrap_or(&Value::Null));
            push_text(
                &mut ops,
                "F1",
                BODY_FONT_SIZE,
                x + CELL_PADDING,
                y + CELL_PADDING,
                &clip_text(&text, cap),
            );
            x += width;
        }

        push_rule(&mut ops, MARGIN_LEFT, y, widths.iter().sum());
    }

    pages.push(ops);
    assemble(pages)
}

/// Single-page document with the title and one message paragraph; used
/// for empty result sets and as the failure fallback.
fn build_message_document(title: &str, message: &str) -> Result<Vec<u8>, ReportError> {
    let mut ops: Vec<Operation> = Vec::new();

    let y = PAGE_HEIGHT - MARGIN_TOP - TITLE_SIZE;
    push_text(&mut ops, "F2", TITLE_SIZE, MARGIN_LEFT, y, title);
    push_text(
        &mut ops,
        "F1",
        10.0,
        MARGIN_LEFT,
        y - TITLE_SIZE - 14.0,
        message,
    );

    assemble(vec![ops])
}

fn assemble(pages: Vec<Vec<Operation>>) -> Result<Vec<u8>, ReportError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let bold_font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
            "F2" => bold_font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    let page_count = pages.len();
    for operations in pages {
        let content = Content { operations };
        let encoded = content
            .encode()
            .map_err(|e| ReportError::Render(e.to_string()))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => page_count as i64,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|e| ReportError::Render(e.to_string()))?;
    Ok(bytes)
}

/// Returns the new cursor position below the header row.
fn push_header_row(
    ops: &mut Vec<Operation>,
    columns: &[String],
    widths: &[f32],
    char_caps: &[usize],
    y: f32,
) -> f32 {
    let y = y - HEADER_ROW_HEIGHT;
    let total: f32 = widths.iter().sum();

    push_fill_rect(ops, MARGIN_LEFT, y, total, HEADER_ROW_HEIGHT, (0.5, 0.5, 0.5));

    ops.push(Operation::new(
        "rg",
        vec![1.0f32.into(), 1.0f32.into(), 1.0f32.into()],
    ));
    let mut x = MARGIN_LEFT;
    for (column, (&width, &cap)) in columns.iter().zip(widths.iter().zip(char_caps)) {
        push_text(
            ops,
            "F2",
            HEADER_FONT_SIZE,
            x + CELL_PADDING,
            y + CELL_PADDING + 1.0,
            &clip_text(column, cap),
        );
        x += width;
    }
    ops.push(Operation::new(
        "rg",
        vec![0.0f32.into(), 0.0f32.into(), 0.0f32.into()],
    ));

    push_rule(ops, MARGIN_LEFT, y, total);
    y
}

fn push_text(ops: &mut Vec<Operation>, font: &str, size: f32, x: f32, y: f32, text: &str) {
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new("Tf", vec![font.into(), size.into()]));
    ops.push(Operation::new("Td", vec![x.into(), y.into()]));
    ops.push(Operation::new(
        "Tj",
        vec![Object::string_literal(sanitize_text(text))],
    ));
    ops.push(Operation::new("ET", vec![]));
}

fn push_fill_rect(ops: &mut Vec<Operation>, x: f32, y: f32, w: f32, h: f32, color: (f32, f32, f32)) {
    ops.push(Operation::new(
        "rg",
        vec![color.0.into(), color.1.into(), color.2.into()],
    ));
    ops.push(Operation::new(
        "re",
        vec![x.into(), y.into(), w.into(), h.into()],
    ));
    ops.push(Operation::new("f", vec![]));
    ops.push(Operation::new(
        "rg",
        vec![0.0f32.into(), 0.0f32.into(), 0.0f32.into()],
    ));
}

/// Thin horizontal separator under a row.
fn push_rule(ops: &mut Vec<Operation>, x: f32, y: f32, width: f32) {
    ops.push(Operation::new("w", vec![0.25f32.into()]));
    ops.push(Operation::new(
        "RG",
        vec![0.5f32.into(), 0.5f32.into(), 0.5f32.into()],
    ));
    ops.push(Operation::new("m", vec![x.into(), y.into()]));
    ops.push(Operation::new("l", vec![(x + width).into(), y.into()]));
    ops.push(Operation::new("S", vec![]));
}

/// Max char count per column over the header and a bounded row sample,
/// capped so one wide column cannot eat the page.
fn column_char_caps(rows: &RowSet) -> Vec<usize> {
    let mut caps: Vec<usize> = rows.columns.iter().map(|c| c.chars().count()).collect();

    for row in rows.rows.iter().take(WIDTH_SAMPLE_ROWS) {
        for (i, column) in rows.columns.iter().enumerate() {
            let len = format_cell(row.get(column).unwrap_or(&Value::Null))
                .chars()
                .count();
            if len > caps[i] {
                caps[i] = len;
            }
        }
    }

    caps.iter()
        .map(|&c| c.min(MAX_CHARS_PER_COLUMN))
        .collect()
}

/// Character-count widths, scaled down proportionally when the raw total
/// exceeds the printable width.
fn column_widths(rows: &RowSet) -> Vec<f32> {
    let caps = column_char_caps(rows);
    let raw: Vec<f32> = caps
        .iter()
        .map(|&chars| (chars as f32 * AVG_CHAR_WIDTH + 12.0).max(MIN_COLUMN_WIDTH))
        .collect();

    let available = PAGE_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let total: f32 = raw.iter().sum();
    let scale = if total > available {
        available / total
    } else {
        1.0
    };

    raw.iter().map(|w| w * scale).collect()
}

fn clip_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let clipped: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", clipped)
    }
}

// Helvetica has no glyphs outside Latin-1; anything else becomes '?'.
fn sanitize_text(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_ascii_graphic() || c == ' ' || (c as u32 >= 0xA0 && c as u32 <= 0xFF) {
                c
            } else {
                '?'
            }
        })
        .collect()
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
    fn produces_a_pdf_with_the_declared_mime() {
        let rows = rowset(&["a", "b"], vec![vec![json!(1), json!("x")]]);
        let artifact = render(&rows, "Sales").unwrap();
        assert!(artifact.bytes.starts_with(b"%PDF-"));
        assert_eq!(artifact.mime, "application/pdf");
        assert_eq!(artifact.filename, "Sales.pdf");
    }

    #[test]
    fn empty_rowset_renders_the_no_data_message_and_no_table() {
        let artifact = render(&RowSet::default(), "Empty report").unwrap();
        // content streams are not compressed, so the text is searchable
        let raw = String::from_utf8_lossy(&artifact.bytes);
        assert!(raw.contains("No data found"));
        // no header fill means no table was drawn
        assert!(!raw.contains("0.5 0.5 0.5 rg"));
    }

    #[test]
    fn wide_tables_scale_to_the_printable_width() {
        let columns: Vec<String> = (0..30).map(|i| format!("column_{}", i)).collect();
        let refs: Vec<&str> = columns.iter().map(|c| c.as_str()).collect();
        let row: Vec<Value> = (0..30).map(|i| json!(format!("value {}", i))).collect();
        let rows = rowset(&refs, vec![row]);

        let widths = column_widths(&rows);
        let total: f32 = widths.iter().sum();
        assert!(total <= PAGE_WIDTH - MARGIN_LEFT - MARGIN_RIGHT + 0.5);
    }

    #[test]
    fn long_values_are_capped_per_column() {
        let rows = rowset(&["a"], vec![vec![json!("x".repeat(500))]]);
        let caps = column_char_caps(&rows);
        assert_eq!(caps, vec![MAX_CHARS_PER_COLUMN]);
        assert_eq!(clip_text(&"x".repeat(500), 40).chars().count(), 40);
    }

    #[test]
    fn many_rows_paginate_and_still_render() {
        let columns = ["id", "name"];
        let data: Vec<Vec<Value>> = (0..200)
            .map(|i| vec![json!(i), json!(format!("row {}", i))])
            .collect();
        let rows = rowset(&columns, data);

        let artifact = render(&rows, "Long report").unwrap();
        let doc = Document::load_mem(&artifact.bytes).unwrap();
        let page_count = doc.get_pages().len();
        assert!(page_count > 2, "expected multiple pages, saw {}", page_count);
    }

    #[test]
    fn deterministic_for_the_same_input() {
        let rows = rowset(&["a"], vec![vec![json!("x")]]);
        let first = render(&rows, "t").unwrap();
        let second = render(&rows, "t").unwrap();
        assert_eq!(first.bytes, second.bytes);
    }

    #[test]
    fn non_latin_text_degrades_instead_of_breaking() {
        assert_eq!(sanitize_text("média ±10%"), "média ±10%");
        assert_eq!(sanitize_text("total 売上"), "total ??");
    }
}
