use crate::{Error, Result};

/// Checks that a header pair can be put on the wire unchanged.
pub fn check_header(name: &str, value: &str) -> Result<()> {
    let invalid = |source: http::Error| Error::InvalidHeader {
        name: name.to_string(),
        source,
    };
    http::header::HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.into()))?;
    http::header::HeaderValue::from_str(value).map_err(|e| invalid(e.into()))?;
    Ok(())
}

/// Joins a base URL and an endpoint path without doubling or dropping the `/`.
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    match path {
        "" => base.to_string(),
        p if p.starts_with('/') => format!("{base}{p}"),
        p => format!("{base}/{p}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_normalizes_slashes() {
        assert_eq!(join_url("http://h:1", "/a"), "http://h:1/a");
        assert_eq!(join_url("http://h:1/", "/a"), "http://h:1/a");
        assert_eq!(join_url("http://h:1/api", "a"), "http://h:1/api/a");
        assert_eq!(join_url("http://h:1/", ""), "http://h:1");
        assert_eq!(join_url("http://h:1", "/slow?ms=5"), "http://h:1/slow?ms=5");
    }

    #[test]
    fn check_header_rejects_bad_names_and_values() {
        assert!(check_header("authorization", "Bearer x").is_ok());
        assert!(matches!(
            check_header("bad header", "x"),
            Err(Error::InvalidHeader { name, .. }) if name == "bad header"
        ));
        assert!(check_header("x-ok", "line\nbreak").is_err());
    }
}
