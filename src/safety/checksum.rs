use sha2::{Digest, Sha256};

/// SHA-256 of `bytes` as lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Short stable tag for a path, used to keep same-named files apart.
pub fn path_tag(normalized: &str) -> String {
    sha256_hex(normalized.as_bytes())[..8].to_string()
}
