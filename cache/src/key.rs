use md5::{Digest, Md5};

/// Cache key: `md5(imageBytes)` prefixed with `face_recog_`.
pub fn cache_key(image_bytes: &[u8]) -> String {
    let digest = Md5::digest(image_bytes);
    format!("face_recog_{digest:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_stable_and_prefixed() {
        let a = cache_key(b"hello");
        let b = cache_key(b"hello");
        assert_eq!(a, b);
        assert!(a.starts_with("face_recog_"));
    }

    #[test]
    fn different_bytes_differ() {
        assert_ne!(cache_key(b"a"), cache_key(b"b"));
    }
}
