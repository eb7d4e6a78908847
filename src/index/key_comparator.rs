use std::cmp::Ordering;
use std::fmt;

/// A fixed-width index key: `N` bytes of caller-defined encoding. The tree
/// never interprets key bytes itself; ordering comes from the comparator.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenericKey<const N: usize> {
    data: [u8; N],
}

impl<const N: usize> GenericKey<N> {
    pub fn zeroed() -> Self {
        Self { data: [0u8; N] }
    }

    /// Encodes a signed integer into the key prefix (little endian),
    /// zero-padding the remainder.
    pub fn set_from_integer(&mut self, value: i64) {
        self.data = [0u8; N];
        let bytes = value.to_le_bytes();
        let len = bytes.len().min(N);
        self.data[..len].copy_from_slice(&bytes[..len]);
    }

    pub fn from_integer(value: i64) -> Self {
        let mut key = Self::zeroed();
        key.set_from_integer(value);
        key
    }

    /// Decodes the integer prefix written by `set_from_integer`.
    pub fn to_integer(&self) -> i64 {
        let mut bytes = [0u8; 8];
        let len = 8.min(N);
        bytes[..len].copy_from_slice(&self.data[..len]);
        i64::from_le_bytes(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        assert_eq!(bytes.len(), N);
        let mut key = Self::zeroed();
        key.data.copy_from_slice(bytes);
        key
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl<const N: usize> Default for GenericKey<N> {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl<const N: usize> fmt::Debug for GenericKey<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GenericKey<{}>({})", N, self.to_integer())
    }
}

/// A total order over serialized keys.
pub trait KeyComparator: Send + Sync + Clone + 'static {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

/// Orders keys by the signed 64-bit integer in their prefix, matching
/// `GenericKey::set_from_integer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Int64Comparator;

impl KeyComparator for Int64Comparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        if a.len() < 8 || b.len() < 8 {
            return a.len().cmp(&b.len());
        }

        let a_val = i64::from_le_bytes(a[..8].try_into().unwrap());
        let b_val = i64::from_le_bytes(b[..8].try_into().unwrap());
        a_val.cmp(&b_val)
    }
}

/// Orders keys lexicographically over their raw bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytewiseComparator;

impl KeyComparator for BytewiseComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_key_integer_round_trip() {
        let key = GenericKey::<8>::from_integer(42);
        assert_eq!(key.to_integer(), 42);

        let key = GenericKey::<16>::from_integer(-9);
        assert_eq!(key.to_integer(), -9);
    }

    #[test]
    fn test_generic_key_bytes_round_trip() {
        let key = GenericKey::<8>::from_integer(1234);
        let copy = GenericKey::<8>::from_bytes(key.as_bytes());
        assert_eq!(key, copy);
    }

    #[test]
    fn test_int64_comparator() {
        let cmp = Int64Comparator;
        let a = GenericKey::<8>::from_integer(1);
        let b = GenericKey::<8>::from_integer(2);

        assert_eq!(cmp.compare(a.as_bytes(), b.as_bytes()), Ordering::Less);
        assert_eq!(cmp.compare(b.as_bytes(), a.as_bytes()), Ordering::Greater);
        assert_eq!(cmp.compare(a.as_bytes(), a.as_bytes()), Ordering::Equal);
    }

    #[test]
    fn test_bytewise_comparator() {
        let cmp = BytewiseComparator;
        assert_eq!(cmp.compare(b"abc", b"abd"), Ordering::Less);
        assert_eq!(cmp.compare(b"abc", b"abc"), Ordering::Equal);
    }
}
