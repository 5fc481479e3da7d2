//! Stable identity derivation for documents, objects, classes and attachments.
//!
//! Ids are derived from qualified names rather than allocated from a
//! sequence, so the same entity maps to the same row in every store.

/// Derive the id of a document from its full name and language.
pub fn document_id(full_name: &str, language: &str) -> i64 {
    derive(&[full_name.as_bytes(), language.as_bytes()])
}

/// Derive the id of an object from its identity triple.
pub fn object_id(name: &str, class_name: &str, number: i32) -> i64 {
    let number = number.to_le_bytes();
    derive(&[name.as_bytes(), class_name.as_bytes(), &number])
}

/// Derive the id of a class from its name.
pub fn class_id(name: &str) -> i64 {
    derive(&[name.as_bytes()])
}

/// Derive the id of an attachment from its owning document and filename.
pub fn attachment_id(doc_full_name: &str, filename: &str) -> i64 {
    derive(&[doc_full_name.as_bytes(), filename.as_bytes()])
}

fn derive(parts: &[&[u8]]) -> i64 {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        // length-prefix each part so ("a", "bc") and ("ab", "c") differ
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    let hash = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    // integer primary keys are signed; stay in the non-negative half
    i64::from_le_bytes(bytes) & i64::MAX
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_stable() {
        assert_eq!(document_id("Ledger.001", ""), document_id("Ledger.001", ""));
        assert_eq!(object_id("Ledger.001", "Invoice", 0), object_id("Ledger.001", "Invoice", 0));
    }

    #[test]
    fn test_ids_distinguish_parts() {
        assert_ne!(document_id("Ledger.001", ""), document_id("Ledger.001", "fr"));
        assert_ne!(object_id("Ledger.001", "Invoice", 0), object_id("Ledger.001", "Invoice", 1));
        assert_ne!(document_id("Ledger.ab", "c"), document_id("Ledger.a", "bc"));
    }

    #[test]
    fn test_ids_are_non_negative() {
        for i in 0..64 {
            assert!(document_id(&format!("Space.Doc{}", i), "") >= 0);
        }
    }
}
