use crate::core::value::Value;
use std::fmt;
use xxhash_rust::xxh3::xxh3_64;

const SEPARATOR: char = '\u{1f}';
const NULL_MARKER: char = '\u{0}';

/// Identity of a logical row: the canonical text of its primary-key values.
///
/// Two records with equal fingerprints always hash to the same partition, for
/// the whole run and across runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn from_values<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let mut key = String::new();
        for (i, value) in values.into_iter().enumerate() {
            if i > 0 {
                key.push(SEPARATOR);
            }
            match value.key_text() {
                Some(text) => key.push_str(&text),
                None => key.push(NULL_MARKER),
            }
        }
        Fingerprint(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn hash64(&self) -> u64 {
        xxh3_64(self.0.as_bytes())
    }

    /// Index of the partition that owns this fingerprint.
    pub fn partition(&self, partitions: usize) -> usize {
        if partitions <= 1 {
            return 0;
        }
        (self.hash64() % partitions as u64) as usize
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let printable = self.0.replace(SEPARATOR, "|").replace(NULL_MARKER, "<null>");
        write!(f, "{printable}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_keys_produce_equal_fingerprints() {
        let a = Fingerprint::from_values(&[Value::Int(1), Value::from("x")]);
        let b = Fingerprint::from_values(&[Value::from("1"), Value::from("x")]);
        assert_eq!(a, b);
        assert_eq!(a.partition(7), b.partition(7));
    }

    #[test]
    fn separator_keeps_composite_keys_apart() {
        let a = Fingerprint::from_values(&[Value::from("ab"), Value::from("c")]);
        let b = Fingerprint::from_values(&[Value::from("a"), Value::from("bc")]);
        assert_ne!(a, b);
    }

    #[test]
    fn null_differs_from_empty_string() {
        let a = Fingerprint::from_values(&[Value::Null]);
        let b = Fingerprint::from_values(&[Value::from("")]);
        assert_ne!(a, b);
        assert_eq!(a.to_string(), "<null>");
    }

    #[test]
    fn single_partition_always_owns() {
        let fp = Fingerprint::from_values(&[Value::Int(99)]);
        assert_eq!(fp.partition(1), 0);
        assert_eq!(fp.partition(0), 0);
        assert!(fp.partition(4) < 4);
    }
}
