//! HTTP route normalization for cardinality control: replace
//! numeric ids with `:id`, alphanumerics of length 6-20 with `:ci`, and
//! UUIDs with `:uuid`. A small byte-scanning function rather than a regex,
//! tested directly — this runs on every request.

/// Normalizes one path for use as the `route` label on `http_requests_total`
/// / `http_request_duration_seconds`.
pub fn normalize_route(path: &str) -> String {
    path.split('/')
        .map(normalize_segment)
        .collect::<Vec<_>>()
        .join("/")
}

fn normalize_segment(segment: &str) -> &str {
    if segment.is_empty() {
        return "";
    }
    if is_uuid(segment) {
        return ":uuid";
    }
    if is_numeric_id(segment) {
        return ":id";
    }
    if is_alphanumeric_ci(segment) {
        return ":ci";
    }
    segment
}

fn is_uuid(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    if bytes.len() != 36 {
        return false;
    }
    for (i, &b) in bytes.iter().enumerate() {
        let expect_dash = matches!(i, 8 | 13 | 18 | 23);
        if expect_dash {
            if b != b'-' {
                return false;
            }
        } else if !b.is_ascii_hexdigit() {
            return false;
        }
    }
    true
}

fn is_numeric_id(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

fn is_alphanumeric_ci(segment: &str) -> bool {
    let len = segment.len();
    if !(6..=20).contains(&len) {
        return false;
    }
    let has_digit = segment.bytes().any(|b| b.is_ascii_digit());
    let has_alpha = segment.bytes().any(|b| b.is_ascii_alphabetic());
    let all_alnum = segment.bytes().all(|b| b.is_ascii_alphanumeric());
    all_alnum && has_digit && has_alpha
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_segment_becomes_id() {
        assert_eq!(normalize_route("/users/12345"), "/users/:id");
    }

    #[test]
    fn uuid_segment_becomes_uuid() {
        assert_eq!(
            normalize_route("/recognition/batch/550e8400-e29b-41d4-a716-446655440000"),
            "/recognition/batch/:uuid"
        );
    }

    #[test]
    fn alphanumeric_client_id_becomes_ci() {
        assert_eq!(normalize_route("/clients/abc123de"), "/clients/:ci");
    }

    #[test]
    fn literal_segments_are_unchanged() {
        assert_eq!(normalize_route("/recognition/recognize"), "/recognition/recognize");
    }

    #[test]
    fn pure_alpha_short_segment_is_not_ci() {
        assert_eq!(normalize_route("/health"), "/health");
    }
}
