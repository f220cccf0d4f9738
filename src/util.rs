//! Utility functions

/// Generate a new request ID
pub fn generate_request_id() -> String {
    format!("sdk-{}", uuid::Uuid::new_v4())
}

/// URL encode a single path segment
pub fn encode_segment(s: &str) -> String {
    use percent_encoding::{AsciiSet, CONTROLS};

    // RFC 3986 unreserved characters plus common safe chars
    const FRAGMENT: &AsciiSet = &CONTROLS
        .add(b' ')
        .add(b'"')
        .add(b'<')
        .add(b'>')
        .add(b'`')
        .add(b'#')
        .add(b'?')
        .add(b'{')
        .add(b'}')
        .add(b'/')
        .add(b'%');

    percent_encoding::utf8_percent_encode(s, FRAGMENT).to_string()
}

/// URL encode a vault secret path, preserving `/` separators
///
/// Vault paths like `secret/data/db` are hierarchical; each segment is encoded
/// on its own so the separators survive.
pub fn encode_path(path: &str) -> String {
    path.trim_matches('/')
        .split('/')
        .map(encode_segment)
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_segment() {
        assert_eq!(encode_segment("hello world"), "hello%20world");
        assert_eq!(encode_segment("test/path"), "test%2Fpath");
        assert_eq!(encode_segment("my-key"), "my-key");
        assert_eq!(encode_segment("my_key.v2"), "my_key.v2");
    }

    #[test]
    fn test_encode_path_keeps_separators() {
        assert_eq!(encode_path("secret/data/db"), "secret/data/db");
        assert_eq!(encode_path("/secret/data/db/"), "secret/data/db");
        assert_eq!(encode_path("secret/my app/key"), "secret/my%20app/key");
    }

    #[test]
    fn test_request_id_prefix() {
        let id = generate_request_id();
        assert!(id.starts_with("sdk-"));
        assert_ne!(id, generate_request_id());
    }
}
