//! Content fingerprints for frozen configurations and emitted files.

use sha2::{Digest, Sha256};

/// A hasher for building fingerprints from multiple components.
///
/// Every component is terminated, so `["ab", "c"]` and `["a", "bc"]` never
/// collide.
#[derive(Default)]
pub struct Fingerprint {
    hasher: Sha256,
}

impl Fingerprint {
    /// Create a new fingerprint builder.
    pub fn new() -> Self {
        Fingerprint {
            hasher: Sha256::new(),
        }
    }

    /// Add a string component to the fingerprint.
    pub fn update_str(&mut self, s: &str) -> &mut Self {
        self.hasher.update(s.as_bytes());
        self.hasher.update(b"\0");
        self
    }

    /// Add a labelled list. The label and length are hashed so adjacent
    /// lists cannot shift items between each other.
    pub fn update_list<'a>(
        &mut self,
        label: &str,
        items: impl IntoIterator<Item = &'a str>,
    ) -> &mut Self {
        let items: Vec<&str> = items.into_iter().collect();
        self.update_str(label);
        self.update_str(&items.len().to_string());
        for item in items {
            self.update_str(item);
        }
        self
    }

    /// Add key/value pairs in the order given.
    pub fn update_pairs<'a>(
        &mut self,
        label: &str,
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> &mut Self {
        let pairs: Vec<(&str, &str)> = pairs.into_iter().collect();
        self.update_str(label);
        self.update_str(&pairs.len().to_string());
        for (key, value) in pairs {
            self.update_str(key);
            self.update_str(value);
        }
        self
    }

    /// Finalize and return the fingerprint as a hex string.
    pub fn finish(self) -> String {
        hex::encode(self.hasher.finalize())
    }

    /// Finalize and return a short fingerprint (first 16 chars).
    pub fn finish_short(self) -> String {
        self.finish()[..16].to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_hex_sha256() {
        let mut fp = Fingerprint::new();
        fp.update_str("hello");
        let hash = fp.finish();
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let fp = |parts: &[&str]| {
            let mut fp = Fingerprint::new();
            fp.update_list("features", parts.iter().copied());
            fp.finish()
        };

        assert_eq!(fp(&["asm", "threads"]), fp(&["asm", "threads"]));
        assert_ne!(fp(&["asm", "threads"]), fp(&["asm"]));
    }

    #[test]
    fn test_fingerprint_lists_do_not_shift() {
        let a = {
            let mut fp = Fingerprint::new();
            fp.update_list("a", ["x", "y"]).update_list("b", ["z"]);
            fp.finish()
        };
        let b = {
            let mut fp = Fingerprint::new();
            fp.update_list("a", ["x"]).update_list("b", ["y", "z"]);
            fp.finish()
        };
        assert_ne!(a, b);
    }

    #[test]
    fn test_finish_short() {
        let mut fp = Fingerprint::new();
        fp.update_pairs("install", [("prefix", "/usr/local")]);
        assert_eq!(fp.finish_short().len(), 16);
    }
}
