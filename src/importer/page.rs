use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::error::{ImportError, ImportResult};

/// One row of a listing: column name to JSON scalar.
pub type Row = Map<String, Value>;

/// One page of a `_shape=objects` table listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page {
    #[serde(rename = "table")]
    pub table_name: String,
    pub rows: Vec<Row>,
    pub primary_keys: Vec<String>,
    /// Sources report `null` when counting the table timed out.
    #[serde(deserialize_with = "required_nullable")]
    pub filtered_table_rows_count: Option<u64>,
    #[serde(default)]
    pub next_url: Option<String>,
}

impl Page {
    /// Decode a page body, reporting missing keys as a format error.
    pub fn from_slice(url: &str, body: &[u8]) -> ImportResult<Self> {
        let page: Page =
            serde_json::from_slice(body).map_err(|err| ImportError::format(url, err.to_string()))?;
        if page.table_name.trim().is_empty() {
            return Err(ImportError::format(url, "empty table name"));
        }
        Ok(page)
    }

    pub fn row_count(&self) -> u64 {
        self.rows.len() as u64
    }

    /// Reported table size, or the rows on this page when the source gave none.
    pub fn expected_count(&self) -> u64 {
        self.filtered_table_rows_count
            .unwrap_or_else(|| self.row_count())
    }
}

/// The key must be present, but its value may be `null`.
fn required_nullable<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<u64>::deserialize(deserializer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_listing_page() {
        let body = json!({
            "table": "mytable",
            "rows": [{"foo": "bar"}],
            "primary_keys": [],
            "filtered_table_rows_count": 1,
            "next_url": null,
            "truncated": false
        });
        let page = Page::from_slice("http://example", body.to_string().as_bytes()).expect("page");
        assert_eq!(page.table_name, "mytable");
        assert_eq!(page.row_count(), 1);
        assert_eq!(page.rows[0]["foo"], json!("bar"));
        assert!(page.next_url.is_none());
    }

    #[test]
    fn missing_next_url_means_last_page() {
        let body = json!({
            "table": "t",
            "rows": [],
            "primary_keys": ["id"],
            "filtered_table_rows_count": 0
        });
        let page = Page::from_slice("http://example", body.to_string().as_bytes()).expect("page");
        assert!(page.next_url.is_none());
        assert_eq!(page.primary_keys, vec!["id".to_string()]);
    }

    #[test]
    fn missing_rows_is_a_format_error() {
        let body = json!({
            "table": "t",
            "primary_keys": [],
            "filtered_table_rows_count": 3
        });
        let err = Page::from_slice("http://example", body.to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, ImportError::Format { .. }));
        assert!(err.to_string().contains("rows"));
    }

    #[test]
    fn null_row_count_falls_back_to_page_rows() {
        let body = json!({
            "table": "big",
            "rows": [{"id": 1}, {"id": 2}],
            "primary_keys": ["id"],
            "filtered_table_rows_count": null,
            "next_url": "/db/big.json?_next=2"
        });
        let page = Page::from_slice("http://example", body.to_string().as_bytes()).expect("page");
        assert_eq!(page.filtered_table_rows_count, None);
        assert_eq!(page.expected_count(), 2);
    }

    #[test]
    fn missing_row_count_is_a_format_error() {
        let body = json!({"table": "t", "rows": [], "primary_keys": []});
        let err = Page::from_slice("http://example", body.to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, ImportError::Format { .. }));
        assert!(err.to_string().contains("filtered_table_rows_count"));
    }

    #[test]
    fn keeps_source_column_order() {
        let body = r#"{"table": "t", "rows": [{"zeta": 1, "alpha": "a", "mid": 2.5}],
            "primary_keys": [], "filtered_table_rows_count": 1}"#;
        let page = Page::from_slice("http://example", body.as_bytes()).expect("page");
        let keys: Vec<&str> = page.rows[0].keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn non_json_body_is_a_format_error() {
        let err = Page::from_slice("http://example", b"<html>nope</html>").unwrap_err();
        assert!(matches!(err, ImportError::Format { .. }));
    }
}
