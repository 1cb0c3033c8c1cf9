use url::Url;

const MAX_LOCATOR_LENGTH: usize = 2048;

/// Key check used when no domain rule applies.
pub fn non_empty_key(key: &str) -> Result<(), String> {
    if key.is_empty() {
        Err("key must not be empty".to_string())
    } else {
        Ok(())
    }
}

/// Accepts absolute `http`/`https` URLs and root-relative paths such as
/// `/images/banner1.png`. Input is expected to be trimmed already.
pub fn resource_locator(raw: &str) -> Result<(), String> {
    if raw.is_empty() {
        return Err("url must not be empty".to_string());
    }
    if raw.len() > MAX_LOCATOR_LENGTH {
        return Err(format!(
            "url must be at most {} characters",
            MAX_LOCATOR_LENGTH
        ));
    }
    if raw.chars().any(char::is_whitespace) {
        return Err("url must not contain whitespace".to_string());
    }

    if raw.starts_with('/') {
        // "//host/x" is protocol-relative, not a path on this site
        if raw.starts_with("//") {
            return Err("protocol-relative urls are not accepted".to_string());
        }
        return Ok(());
    }

    match Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => Ok(()),
        Ok(url) => Err(format!("unsupported url scheme '{}'", url.scheme())),
        Err(e) => Err(format!("malformed url: {}", e)),
    }
}
