//! Report results and their JSON/CSV exports.

use crate::error::AnalyticsError;
use eyre::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Prepended to CSV exports so spreadsheet tools detect UTF-8.
const UTF8_BOM: &str = "\u{feff}";

/// Describes one column of a report.
///
/// See: <https://developers.google.com/youtube/analytics/reference/reports/query#response>
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnHeader {
    /// The dimension or metric name.
    pub name: String,
    /// `DIMENSION` or `METRIC`.
    #[serde(rename = "columnType")]
    pub column_type: String,
    /// `STRING`, `INTEGER` or `FLOAT`.
    #[serde(rename = "dataType")]
    pub data_type: String,
}

/// A decoded `reports.query` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Identifies the API resource's type, `youtubeAnalytics#resultTable`.
    pub kind: String,
    #[serde(rename = "columnHeaders")]
    pub column_headers: Vec<ColumnHeader>,
    /// One entry per data row, values ordered like [`Self::column_headers`].
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    /// Builds a result from the decoded response body.
    ///
    /// Fails with [`AnalyticsError::MalformedResponse`] if `kind`, `columnHeaders` or `rows`
    /// is absent or null.
    pub fn from_response(response: Value) -> eyre::Result<Self> {
        for field in ["kind", "columnHeaders", "rows"] {
            if response.get(field).is_none_or(Value::is_null) {
                return Err(AnalyticsError::MalformedResponse { field }.into());
            }
        }
        serde_json::from_value(response).context("decode report response")
    }

    pub fn to_json_string(&self) -> eyre::Result<String> {
        serde_json::to_string(self).context("serialize report as JSON")
    }

    /// Writes `{kind, columnHeaders, rows}` to `path`, replacing any existing file.
    pub fn save_as_json(&self, path: impl AsRef<Path>) -> eyre::Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json_string()?)
            .with_context(|| format!("write JSON report to {}", path.display()))
    }

    /// The CSV export: BOM, a header row of column names, then one line per data row.
    pub fn to_csv_string(&self) -> String {
        let mut out = String::from(UTF8_BOM);
        let header: Vec<String> = self
            .column_headers
            .iter()
            .map(|h| csv_escape(&h.name))
            .collect();
        push_line(&mut out, &header);
        for row in &self.rows {
            let fields: Vec<String> = row.iter().map(|v| csv_escape(&csv_field(v))).collect();
            push_line(&mut out, &fields);
        }
        out
    }

    /// Writes [`Self::to_csv_string`] to `path`, replacing any existing file.
    pub fn save_as_csv(&self, path: impl AsRef<Path>) -> eyre::Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_csv_string())
            .with_context(|| format!("write CSV report to {}", path.display()))
    }
}

fn push_line(out: &mut String, fields: &[String]) {
    out.push_str(&fields.join(","));
    out.push_str("\r\n");
}

fn csv_field(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Quote if the field contains a delimiter, quote or line break.
fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn header(name: &str, column_type: &str, data_type: &str) -> ColumnHeader {
        ColumnHeader {
            name: name.into(),
            column_type: column_type.into(),
            data_type: data_type.into(),
        }
    }

    fn daily_views() -> QueryResult {
        QueryResult {
            kind: "youtubeAnalytics#resultTable".into(),
            column_headers: vec![
                header("day", "DIMENSION", "STRING"),
                header("views", "METRIC", "INTEGER"),
            ],
            rows: vec![vec![json!("2023-01-01"), json!(10)]],
        }
    }

    #[test]
    fn decode_api_response() {
        let response = json!({
            "kind": "youtubeAnalytics#resultTable",
            "columnHeaders": [
                {"name": "day", "columnType": "DIMENSION", "dataType": "STRING"},
                {"name": "views", "columnType": "METRIC", "dataType": "INTEGER"}
            ],
            "rows": [["2023-01-01", 10]]
        });
        assert_eq!(QueryResult::from_response(response).unwrap(), daily_views());
    }

    #[test]
    fn missing_fields_are_malformed() {
        for field in ["kind", "columnHeaders", "rows"] {
            let mut response = json!({"kind": "k", "columnHeaders": [], "rows": []});
            response.as_object_mut().unwrap().remove(field);
            let err = QueryResult::from_response(response).unwrap_err();
            assert_eq!(
                err.downcast_ref::<AnalyticsError>(),
                Some(&AnalyticsError::MalformedResponse { field })
            );
        }
    }

    #[test]
    fn null_fields_are_malformed() {
        let response = json!({"kind": "k", "columnHeaders": [], "rows": null});
        let err = QueryResult::from_response(response).unwrap_err();
        assert_eq!(
            err.downcast_ref::<AnalyticsError>(),
            Some(&AnalyticsError::MalformedResponse { field: "rows" })
        );
    }

    #[test]
    fn empty_rows_accepted() {
        let result =
            QueryResult::from_response(json!({"kind": "k", "columnHeaders": [], "rows": []}))
                .unwrap();
        assert!(result.rows.is_empty());
        assert_eq!(result.to_csv_string(), "\u{feff}\r\n");
    }

    #[test]
    fn csv_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        daily_views().save_as_csv(&path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..3], b"\xEF\xBB\xBF");
        assert_eq!(&bytes[3..], b"day,views\r\n2023-01-01,10\r\n");
    }

    #[test]
    fn csv_quotes_and_values() {
        let result = QueryResult {
            kind: "k".into(),
            column_headers: vec![
                header("video, title", "DIMENSION", "STRING"),
                header("ratio", "METRIC", "FLOAT"),
                header("note", "DIMENSION", "STRING"),
            ],
            rows: vec![
                vec![json!("say \"hi\""), json!(0.5), Value::Null],
                vec![json!("two\nlines"), json!(true), json!("plain")],
            ],
        };
        assert_eq!(
            result.to_csv_string(),
            "\u{feff}\"video, title\",ratio,note\r\n\
             \"say \"\"hi\"\"\",0.5,\r\n\
             \"two\nlines\",true,plain\r\n"
        );
    }

    #[test]
    fn export_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        std::fs::write(&path, "x".repeat(1000)).unwrap();
        daily_views().save_as_csv(&path).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            daily_views().to_csv_string()
        );
    }

    #[test]
    fn json_save_and_reparse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let original = daily_views();
        original.save_as_json(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let reparsed: QueryResult = serde_json::from_str(&text).unwrap();
        assert_eq!(reparsed, original);

        let raw: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(raw["columnHeaders"][1]["dataType"], "INTEGER");
        assert_eq!(raw["rows"][0][1], 10);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope").join("report.json");
        assert!(daily_views().save_as_json(&path).is_err());
    }
}
