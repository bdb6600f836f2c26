//! Canonical key form
//!
//! Every key is reduced to a text form before it touches the index. Two keys
//! are the same key iff their text forms are equal, so the integer `1`, the
//! float `1.0` and the string `"1"` all address one entry.

use std::fmt;

/// Conversion of a key into the text form used for indexing
pub trait CanonicalKey {
    /// Canonical text form of this key
    fn canonical_key(&self) -> String;
}

macro_rules! impl_integer_key {
    ($($t:ty),*) => {
        $(
            impl CanonicalKey for $t {
                #[inline]
                fn canonical_key(&self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

impl_integer_key!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);

// `Display` for floats is the shortest decimal that parses back to the same
// value and never switches to exponent notation.
impl CanonicalKey for f64 {
    #[inline]
    fn canonical_key(&self) -> String {
        self.to_string()
    }
}

impl CanonicalKey for f32 {
    #[inline]
    fn canonical_key(&self) -> String {
        self.to_string()
    }
}

impl CanonicalKey for str {
    #[inline]
    fn canonical_key(&self) -> String {
        self.to_owned()
    }
}

impl CanonicalKey for String {
    #[inline]
    fn canonical_key(&self) -> String {
        self.clone()
    }
}

impl CanonicalKey for char {
    #[inline]
    fn canonical_key(&self) -> String {
        self.to_string()
    }
}

impl CanonicalKey for bool {
    #[inline]
    fn canonical_key(&self) -> String {
        self.to_string()
    }
}

impl<K: CanonicalKey + ?Sized> CanonicalKey for &K {
    #[inline]
    fn canonical_key(&self) -> String {
        (**self).canonical_key()
    }
}

/// Dynamically typed key for call sites that mix key types
#[derive(Debug, Clone, PartialEq)]
pub enum Key {
    /// Integer key
    Int(i64),
    /// Floating-point key
    Float(f64),
    /// Text key
    Text(String),
}

impl CanonicalKey for Key {
    fn canonical_key(&self) -> String {
        match self {
            Key::Int(i) => i.canonical_key(),
            Key::Float(f) => f.canonical_key(),
            Key::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_key())
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Int(value)
    }
}

impl From<f64> for Key {
    fn from(value: f64) -> Self {
        Key::Float(value)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Text(value.to_owned())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Text(value)
    }
}
