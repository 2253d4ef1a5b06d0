//! Basic-auth credential parsing

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

/// Extracts the `(username, password)` pair from a `Basic` authorization
/// header value. Anything malformed or of another scheme is treated as no
/// credential.
pub fn parse_basic(header: &str) -> Option<(String, String)> {
    let (scheme, rest) = header.split_once(|c: char| c.is_whitespace())?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(rest.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(credential: &str) -> String {
        STANDARD.encode(credential)
    }

    #[test]
    fn test_parse_valid_header() {
        let header = format!("Basic {}", encode("user:secret"));
        assert_eq!(
            parse_basic(&header),
            Some(("user".to_string(), "secret".to_string()))
        );
    }

    #[test]
    fn test_scheme_is_case_insensitive() {
        let header = format!("basic {}", encode("user:secret"));
        assert!(parse_basic(&header).is_some());
    }

    #[test]
    fn test_password_may_contain_colons() {
        let header = format!("Basic {}", encode("user:se:cret"));
        assert_eq!(
            parse_basic(&header),
            Some(("user".to_string(), "se:cret".to_string()))
        );
    }

    #[test]
    fn test_rejects_other_schemes_and_garbage() {
        assert_eq!(parse_basic("Bearer abc123"), None);
        assert_eq!(parse_basic("Basic !!!not-base64!!!"), None);
        assert_eq!(parse_basic(&format!("Basic {}", encode("no-colon"))), None);
        assert_eq!(parse_basic("Basic"), None);
    }
}
