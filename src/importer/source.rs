//! Validation and normalization of source listing URLs.

use url::Url;

use super::error::{ImportError, ImportResult};

const SHAPE_PARAM: &str = "_shape";
const SIZE_PARAM: &str = "_size";

/// Turn a user supplied table URL into the JSON listing URL to fetch.
///
/// The path gets a `.json` suffix when it does not already have one and the
/// query always ends with `_shape=objects&_size=max`, replacing any values
/// the user supplied for those two parameters.
pub fn normalize_source_url(raw: &str) -> ImportResult<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ImportError::invalid_url(raw, "a URL is required"));
    }

    let mut url = Url::parse(trimmed).map_err(|err| ImportError::invalid_url(raw, err.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ImportError::invalid_url(
            raw,
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    if url.host_str().is_none() {
        return Err(ImportError::invalid_url(raw, "missing host"));
    }

    let path = url.path().trim_end_matches('/').to_string();
    if !path.ends_with(".json") {
        url.set_path(&format!("{path}.json"));
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != SHAPE_PARAM && key != SIZE_PARAM)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    {
        let mut query = url.query_pairs_mut();
        query.clear();
        for (key, value) in &kept {
            query.append_pair(key, value);
        }
        query.append_pair(SHAPE_PARAM, "objects");
        query.append_pair(SIZE_PARAM, "max");
    }

    Ok(url)
}

/// Resolve a `next_url` against the page it was returned from.
pub fn resolve_next_url(page_url: &Url, next: &str) -> ImportResult<Url> {
    page_url
        .join(next)
        .map_err(|err| ImportError::format(page_url.as_str(), format!("invalid next_url '{next}': {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_json_suffix_and_shape_parameters() {
        let url = normalize_source_url("http://example/some/table").expect("valid url");
        assert_eq!(
            url.as_str(),
            "http://example/some/table.json?_shape=objects&_size=max"
        );
    }

    #[test]
    fn keeps_existing_suffix_and_other_parameters() {
        let url = normalize_source_url("https://example.com/db/t.json?_sort=id&_shape=array&_size=10")
            .expect("valid url");
        assert_eq!(
            url.as_str(),
            "https://example.com/db/t.json?_sort=id&_shape=objects&_size=max"
        );
    }

    #[test]
    fn strips_trailing_slash_before_suffix() {
        let url = normalize_source_url("http://example/db/table/?foo=bar").expect("valid url");
        assert_eq!(
            url.as_str(),
            "http://example/db/table.json?foo=bar&_shape=objects&_size=max"
        );
    }

    #[test]
    fn rejects_relative_and_non_http_urls() {
        assert!(matches!(
            normalize_source_url("/some/table"),
            Err(ImportError::InvalidSourceUrl { .. })
        ));
        assert!(matches!(
            normalize_source_url("ftp://example/some/table"),
            Err(ImportError::InvalidSourceUrl { .. })
        ));
        assert!(matches!(
            normalize_source_url("   "),
            Err(ImportError::InvalidSourceUrl { .. })
        ));
    }

    #[test]
    fn resolves_relative_next_url() {
        let page = Url::parse("http://example/db/t.json?_shape=objects&_size=max").unwrap();
        let next = resolve_next_url(&page, "/db/t.json?_next=2&_shape=objects").unwrap();
        assert_eq!(next.as_str(), "http://example/db/t.json?_next=2&_shape=objects");

        let absolute = resolve_next_url(&page, "https://other/db/t.json?_next=3").unwrap();
        assert_eq!(absolute.as_str(), "https://other/db/t.json?_next=3");
    }
}
