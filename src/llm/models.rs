use serde::{Deserialize, Serialize};

/// How the frontend should render the answer. Fixed enumeration; anything
/// outside it counts as a malformed model reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualizationType {
    Bar,
    Pie,
    Line,
    Table,
    Report,
    Text,
    SingleValue,
}

/// Downloadable report formats. `report_type` arrives as free text from
/// the model, so parsing is lenient and an unknown kind degrades to a
/// JSON table payload instead of failing the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Csv,
    Pdf,
    Xlsx,
}

impl ReportKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "csv" => Some(ReportKind::Csv),
            "pdf" => Some(ReportKind::Pdf),
            "xlsx" => Some(ReportKind::Xlsx),
            _ => None,
        }
    }
}

/// Structured decode of the model's answer. `sql_query == None` means a
/// conversational reply with no data operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiResponse {
    pub message: String,
    pub sql_query: Option<String>,
    pub visualization_type: Option<VisualizationType>,
    pub report_type: Option<String>,
    pub x_axis: Option<String>,
    pub y_axis: Option<String>,
    pub label: Option<String>,
    pub value: Option<String>,
}

impl AiResponse {
    /// Enforces the conversational-answer invariant: no SQL means a plain
    /// text reply with every data hint cleared.
    pub fn normalized(mut self) -> Self {
        if self.sql_query.is_none() {
            self.visualization_type = Some(VisualizationType::Text);
            self.report_type = None;
            self.x_axis = None;
            self.y_axis = None;
            self.label = None;
            self.value = None;
        }
        self
    }
}

/// Outcome of one translation round trip. Blocked and Malformed are
/// recovered into friendly text responses by the orchestrator, never
/// surfaced as errors.
#[derive(Debug, Clone)]
pub enum Translation {
    Answered(AiResponse),
    Blocked { reason: String },
    Malformed { message: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_kind_parsing_is_lenient_about_case_and_whitespace() {
        assert_eq!(ReportKind::parse("csv"), Some(ReportKind::Csv));
        assert_eq!(ReportKind::parse(" PDF "), Some(ReportKind::Pdf));
        assert_eq!(ReportKind::parse("Xlsx"), Some(ReportKind::Xlsx));
        assert_eq!(ReportKind::parse("docx"), None);
        assert_eq!(ReportKind::parse(""), None);
    }

    #[test]
    fn visualization_type_uses_snake_case_wire_names() {
        let v: VisualizationType = serde_json::from_str("\"single_value\"").unwrap();
        assert_eq!(v, VisualizationType::SingleValue);
        assert!(serde_json::from_str::<VisualizationType>("\"histogram\"").is_err());
    }

    #[test]
    fn normalization_clears_hints_when_sql_is_absent() {
        let response = AiResponse {
            message: "Oi!".to_string(),
            sql_query: None,
            visualization_type: Some(VisualizationType::Bar),
            report_type: Some("csv".to_string()),
            x_axis: Some("month".to_string()),
            y_axis: Some("total".to_string()),
            label: None,
            value: None,
        }
        .normalized();

        assert_eq!(response.visualization_type, Some(VisualizationType::Text));
        assert!(response.report_type.is_none());
        assert!(response.x_axis.is_none());
        assert!(response.y_axis.is_none());
    }

    #[test]
    fn normalization_keeps_hints_when_sql_is_present() {
        let response = AiResponse {
            message: "Monthly totals".to_string(),
            sql_query: Some("SELECT 1".to_string()),
            visualization_type: Some(VisualizationType::Bar),
            report_type: None,
            x_axis: Some("month".to_string()),
            y_axis: Some("total".to_string()),
            label: None,
            value: None,
        }
        .normalized();

        assert_eq!(response.visualization_type, Some(VisualizationType::Bar));
        assert_eq!(response.x_axis.as_deref(), Some("month"));
    }
}
