//! Insertion-ordered script arrays.

use std::fmt;

use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;
use tern_stack::ensure_sufficient_stack;

use crate::{Slot, Value, ValueError};

/// Array key: an integer or a string that is not a canonical integer.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum ArrayKey {
    Int(i64),
    Str(Box<str>),
}

impl ArrayKey {
    /// Parse a canonical decimal integer ("0", "42", "-7"; not "007" or "-0").
    fn canonical_int(s: &str) -> Option<i64> {
        let digits = s.strip_prefix('-').unwrap_or(s);
        let canonical = match digits.as_bytes() {
            [] => false,
            [b'0'] => digits.len() == s.len(),
            [first, rest @ ..] => {
                first.is_ascii_digit() && *first != b'0' && rest.iter().all(u8::is_ascii_digit)
            }
        };
        if canonical {
            s.parse().ok()
        } else {
            None
        }
    }
}

impl From<i64> for ArrayKey {
    fn from(n: i64) -> Self {
        ArrayKey::Int(n)
    }
}

impl From<&str> for ArrayKey {
    fn from(s: &str) -> Self {
        match ArrayKey::canonical_int(s) {
            Some(n) => ArrayKey::Int(n),
            None => ArrayKey::Str(s.into()),
        }
    }
}

impl fmt::Display for ArrayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArrayKey::Int(n) => write!(f, "{n}"),
            ArrayKey::Str(s) => write!(f, "{s}"),
        }
    }
}

/// Ordered map from [`ArrayKey`] to element [`Slot`].
///
/// Cloning shares every element slot with the source; writes to an
/// element of either copy go through [`Slot::ensure_exclusive`] and so
/// never leak into the other.
#[derive(Clone, Default)]
pub struct Array {
    entries: IndexMap<ArrayKey, Slot, FxBuildHasher>,
    next_index: i64,
}

impl Array {
    pub fn new() -> Self {
        Self::default()
    }

    /// A list keyed `0..n`.
    pub fn list(values: impl IntoIterator<Item = Value>) -> Self {
        let mut array = Array::new();
        for value in values {
            array.entries.insert(ArrayKey::Int(array.next_index), Slot::new(value));
            array.next_index += 1;
        }
        array
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index the next append will use.
    pub fn next_index(&self) -> i64 {
        self.next_index
    }

    pub fn get(&self, key: &ArrayKey) -> Option<&Slot> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &ArrayKey) -> Option<&mut Slot> {
        self.entries.get_mut(key)
    }

    pub fn contains_key(&self, key: &ArrayKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or overwrite, keeping an existing key's position.
    pub fn insert(&mut self, key: impl Into<ArrayKey>, value: Value) -> Option<Slot> {
        self.insert_slot(key.into(), Slot::new(value))
    }

    /// Insert an existing slot, sharing it with its other holders.
    pub fn insert_slot(&mut self, key: ArrayKey, slot: Slot) -> Option<Slot> {
        if let ArrayKey::Int(n) = key {
            if n >= self.next_index {
                self.next_index = n.saturating_add(1);
            }
        }
        self.entries.insert(key, slot)
    }

    /// Append under the next free integer index.
    pub fn push(&mut self, value: Value) -> Result<i64, ValueError> {
        let index = self.next_index;
        if self.entries.contains_key(&ArrayKey::Int(index)) {
            return Err(ValueError::NextIndexOccupied);
        }
        self.insert_slot(ArrayKey::Int(index), Slot::new(value));
        Ok(index)
    }

    /// Remove an entry, preserving the order of the rest.
    pub fn remove(&mut self, key: &ArrayKey) -> Option<Slot> {
        self.entries.shift_remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ArrayKey, &Slot)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &ArrayKey> {
        self.entries.keys()
    }

    pub fn slots(&self) -> impl Iterator<Item = &Slot> {
        self.entries.values()
    }

    pub fn slots_mut(&mut self) -> impl Iterator<Item = &mut Slot> {
        self.entries.values_mut()
    }

    /// Remove every entry and reset the append index.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.next_index = 0;
    }
}

impl Drop for Array {
    fn drop(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        let entries = std::mem::take(&mut self.entries);
        ensure_sufficient_stack(move || drop(entries));
    }
}

impl PartialEq for Array {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .zip(other.iter())
                .all(|((k1, v1), (k2, v2))| k1 == k2 && v1 == v2)
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

impl FromIterator<(ArrayKey, Value)> for Array {
    fn from_iter<I: IntoIterator<Item = (ArrayKey, Value)>>(iter: I) -> Self {
        let mut array = Array::new();
        for (key, value) in iter {
            array.insert_slot(key, Slot::new(value));
        }
        array
    }
}
