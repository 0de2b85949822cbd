use serde::{Deserialize, Serialize};

/// Progress record for one import, persisted between pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportState {
    pub database: String,
    pub table_name: String,
    pub done_count: u64,
    pub expected_count: u64,
    /// Absolute URL of the next page, `None` once the import is complete.
    pub next_url: Option<String>,
}

impl ImportState {
    pub fn is_complete(&self) -> bool {
        self.next_url.is_none()
    }

    /// Path of the table page the user is redirected to after starting.
    pub fn redirect_path(&self) -> String {
        let mut base = url::Url::parse("http://localhost/").expect("static base URL");
        if let Ok(mut segments) = base.path_segments_mut() {
            segments.push(&self.database).push(&self.table_name);
        }
        format!(
            "{}?_import_expected_rows={}",
            base.path(),
            self.expected_count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(database: &str, table: &str) -> ImportState {
        ImportState {
            database: database.into(),
            table_name: table.into(),
            done_count: 1,
            expected_count: 1,
            next_url: None,
        }
    }

    #[test]
    fn redirect_path_encodes_expected_rows() {
        assert_eq!(
            state(":memory:", "mytable").redirect_path(),
            "/:memory:/mytable?_import_expected_rows=1"
        );
    }

    #[test]
    fn redirect_path_escapes_segments() {
        assert_eq!(
            state("data", "my table/2").redirect_path(),
            "/data/my%20table%2F2?_import_expected_rows=1"
        );
    }

    #[test]
    fn round_trips_through_json() {
        let mut original = state("data", "t");
        original.next_url = Some("http://example/t.json?_next=5".into());
        let json = serde_json::to_string(&original).unwrap();
        assert!(json.contains("\"nextUrl\""));
        let restored: ImportState = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, original);
        assert!(!restored.is_complete());
    }
}
