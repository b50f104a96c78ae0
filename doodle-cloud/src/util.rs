//! Shared utility functions

use sha2::{Digest, Sha256};

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Hex SHA-256 of `bytes`
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Artifact path namespaced by order id and generation time
pub fn artifact_path(order_id: uuid::Uuid, generated_at: i64, suffix: &str) -> String {
    format!("orders/{order_id}/{generated_at}-{suffix}.pdf")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_path_is_namespaced() {
        let id = uuid::Uuid::nil();
        assert_eq!(
            artifact_path(id, 1700000000000, "book"),
            "orders/00000000-0000-0000-0000-000000000000/1700000000000-book.pdf"
        );
        assert_ne!(artifact_path(id, 1, "book"), artifact_path(id, 2, "book"));
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
