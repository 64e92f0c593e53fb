//! Lua Table Implementation
//!
//! Tables keep an array part for the keys `1..=n` and an insertion-ordered
//! hash part for everything else. Clearing a hash entry leaves a tombstone
//! so that `next` can resume from a key assigned nil during traversal.

use super::handle::TableHandle;
use super::value::Value;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Reasons a value cannot be used as a table key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyError {
    Nil,
    NaN,
}

impl KeyError {
    pub fn message(&self) -> &'static str {
        match self {
            KeyError::Nil => "table index is nil",
            KeyError::NaN => "table index is NaN",
        }
    }
}

/// Key wrapper giving values the identity semantics of raw table lookup
#[derive(Debug, Clone, Copy)]
struct TableKey(Value);

impl TableKey {
    fn new(key: Value) -> Result<Self, KeyError> {
        match key {
            Value::Nil => Err(KeyError::Nil),
            Value::Number(n) if n.is_nan() => Err(KeyError::NaN),
            // -0.0 and 0.0 are the same key
            Value::Number(n) if n == 0.0 => Ok(TableKey(Value::Number(0.0))),
            other => Ok(TableKey(other)),
        }
    }
}

impl PartialEq for TableKey {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Value::Number(a), Value::Number(b)) => a.to_bits() == b.to_bits(),
            (Value::Vector(a), Value::Vector(b)) => {
                a.x.to_bits() == b.x.to_bits() && a.y.to_bits() == b.y.to_bits() && a.z.to_bits() == b.z.to_bits()
            }
            (Value::Angle(a), Value::Angle(b)) => {
                a.x.to_bits() == b.x.to_bits() && a.y.to_bits() == b.y.to_bits() && a.z.to_bits() == b.z.to_bits()
            }
            (a, b) => a == b,
        }
    }
}

impl Eq for TableKey {}

impl Hash for TableKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(&self.0).hash(state);
        match &self.0 {
            Value::Nil => {}
            Value::Boolean(b) => b.hash(state),
            Value::Number(n) => n.to_bits().hash(state),
            Value::String(h) => h.hash(state),
            Value::Table(h) => h.hash(state),
            Value::Function(h) => h.hash(state),
            Value::UserData(h) => h.hash(state),
            Value::LightUserData(p) => (*p as usize).hash(state),
            Value::Vector(v) => {
                v.x.to_bits().hash(state);
                v.y.to_bits().hash(state);
                v.z.to_bits().hash(state);
            }
            Value::Angle(a) => {
                a.x.to_bits().hash(state);
                a.y.to_bits().hash(state);
                a.z.to_bits().hash(state);
            }
            Value::Thread(h) => h.hash(state),
        }
    }
}

/// Lua table representation
#[derive(Debug, Clone, Default)]
pub struct Table {
    /// Array part, holding keys `1..=array.len()`
    array: Vec<Value>,

    /// Hash part in insertion order; a nil value is a tombstone
    entries: Vec<(Value, Value)>,

    /// Position of each hash key in `entries`
    index: HashMap<TableKey, usize>,

    /// Number of tombstones in `entries`
    tombstones: usize,

    /// Optional metatable
    pub metatable: Option<TableHandle>,
}

/// Array slot addressed by `key`, if it is a positive integral number
fn array_slot(key: &Value) -> Option<usize> {
    match key {
        Value::Number(n) if n.fract() == 0.0 && *n >= 1.0 && *n <= u32::MAX as f64 => Some(*n as usize),
        _ => None,
    }
}

impl Table {
    /// Create a new empty table
    pub fn new() -> Self {
        Table::default()
    }

    /// Create a new table with capacity
    pub fn with_capacity(array_cap: usize, map_cap: usize) -> Self {
        Table {
            array: Vec::with_capacity(array_cap),
            entries: Vec::with_capacity(map_cap),
            index: HashMap::with_capacity(map_cap),
            ..Table::default()
        }
    }

    /// Raw lookup; missing keys read as nil
    pub fn get(&self, key: &Value) -> Value {
        if let Some(slot) = array_slot(key) {
            if slot <= self.array.len() {
                return self.array[slot - 1];
            }
        }

        match TableKey::new(*key) {
            Ok(k) => self.index.get(&k).map(|&pos| self.entries[pos].1).unwrap_or(Value::Nil),
            Err(_) => Value::Nil,
        }
    }

    /// Whether `key` is present with a non-nil value
    pub fn contains(&self, key: &Value) -> bool {
        !self.get(key).is_nil()
    }

    /// Raw assignment; assigning nil removes the key
    pub fn set(&mut self, key: Value, value: Value) -> Result<(), KeyError> {
        if let Some(slot) = array_slot(&key) {
            if slot <= self.array.len() {
                self.array[slot - 1] = value;
                return Ok(());
            }
            if slot == self.array.len() + 1 && !value.is_nil() {
                self.clear_hash_entry(&key);
                self.array.push(value);
                self.migrate_to_array();
                return Ok(());
            }
        }

        let k = TableKey::new(key)?;
        match self.index.get(&k) {
            Some(&pos) => {
                let old = self.entries[pos].1;
                match (old.is_nil(), value.is_nil()) {
                    (true, false) => self.tombstones -= 1,
                    (false, true) => self.tombstones += 1,
                    _ => {}
                }
                self.entries[pos].1 = value;
            }
            None if value.is_nil() => {}
            None => {
                if self.tombstones > 8 && self.tombstones * 2 > self.entries.len() {
                    self.compact();
                }
                self.index.insert(k, self.entries.len());
                self.entries.push((k.0, value));
            }
        }

        Ok(())
    }

    fn clear_hash_entry(&mut self, key: &Value) {
        if let Ok(k) = TableKey::new(*key) {
            if let Some(&pos) = self.index.get(&k) {
                if !self.entries[pos].1.is_nil() {
                    self.entries[pos].1 = Value::Nil;
                    self.tombstones += 1;
                }
            }
        }
    }

    /// Move `n+1, n+2, ...` from the hash part after the array part grew to `n`
    fn migrate_to_array(&mut self) {
        loop {
            let next_key = Value::Number((self.array.len() + 1) as f64);
            let Ok(k) = TableKey::new(next_key) else { return };
            let Some(&pos) = self.index.get(&k) else { return };
            let value = self.entries[pos].1;
            if value.is_nil() {
                return;
            }
            self.entries[pos].1 = Value::Nil;
            self.tombstones += 1;
            self.array.push(value);
        }
    }

    fn compact(&mut self) {
        self.entries.retain(|(_, v)| !v.is_nil());
        self.index.clear();
        for (pos, (key, _)) in self.entries.iter().enumerate() {
            self.index.insert(TableKey(*key), pos);
        }
        self.tombstones = 0;
    }

    /// Length operator: a border of the table
    pub fn border(&self) -> usize {
        let mut n = self.array.len();
        while n > 0 && self.array[n - 1].is_nil() {
            n -= 1;
        }
        n
    }

    /// Traversal step: the entry after `key` (nil starts the traversal).
    ///
    /// Returns `Err(())` when `key` is not in the table.
    pub fn next(&self, key: &Value) -> Result<Option<(Value, Value)>, ()> {
        let (array_from, hash_from) = match key {
            Value::Nil => (0, 0),
            k => match array_slot(k) {
                Some(slot) if slot <= self.array.len() => (slot, 0),
                _ => {
                    let k = TableKey::new(*k).map_err(|_| ())?;
                    let pos = *self.index.get(&k).ok_or(())?;
                    (self.array.len(), pos + 1)
                }
            },
        };

        for slot in array_from..self.array.len() {
            let value = self.array[slot];
            if !value.is_nil() {
                return Ok(Some((Value::Number((slot + 1) as f64), value)));
            }
        }

        Ok(self.entries[hash_from.min(self.entries.len())..]
            .iter()
            .find(|(_, v)| !v.is_nil())
            .copied())
    }

    /// Every live key/value pair
    pub fn pairs(&self) -> impl Iterator<Item = (Value, Value)> + '_ {
        let array = self
            .array
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_nil())
            .map(|(i, v)| (Value::Number((i + 1) as f64), *v));
        let hash = self.entries.iter().filter(|(_, v)| !v.is_nil()).copied();
        array.chain(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> Value {
        Value::Number(n)
    }

    #[test]
    fn test_array_part_grows_and_migrates() {
        let mut table = Table::new();

        table.set(num(2.0), num(20.0)).unwrap();
        assert_eq!(table.border(), 0);

        table.set(num(1.0), num(10.0)).unwrap();
        assert_eq!(table.border(), 2);
        assert_eq!(table.get(&num(2.0)), num(20.0));
    }

    #[test]
    fn test_nil_and_nan_keys_rejected() {
        let mut table = Table::new();
        assert_eq!(table.set(Value::Nil, num(1.0)), Err(KeyError::Nil));
        assert_eq!(table.set(num(f64::NAN), num(1.0)), Err(KeyError::NaN));
        assert_eq!(table.get(&Value::Nil), Value::Nil);
    }

    #[test]
    fn test_negative_zero_is_zero() {
        let mut table = Table::new();
        table.set(num(-0.0), Value::Boolean(true)).unwrap();
        assert_eq!(table.get(&num(0.0)), Value::Boolean(true));
    }

    #[test]
    fn test_next_visits_every_entry_once() {
        let mut table = Table::new();
        table.set(num(1.0), num(1.0)).unwrap();
        table.set(num(2.0), num(2.0)).unwrap();
        table.set(Value::Boolean(true), num(3.0)).unwrap();
        table.set(num(0.5), num(4.0)).unwrap();

        let mut key = Value::Nil;
        let mut total = 0.0;
        let mut steps = 0;
        while let Some((k, v)) = table.next(&key).unwrap() {
            if let Value::Number(n) = v {
                total += n;
            }
            key = k;
            steps += 1;
        }

        assert_eq!(steps, 4);
        assert_eq!(total, 10.0);
    }

    #[test]
    fn test_next_survives_clearing_current_key() {
        let mut table = Table::new();
        table.set(Value::Boolean(true), num(1.0)).unwrap();
        table.set(Value::Boolean(false), num(2.0)).unwrap();

        let (first, _) = table.next(&Value::Nil).unwrap().unwrap();
        table.set(first, Value::Nil).unwrap();

        let (second, value) = table.next(&first).unwrap().unwrap();
        assert_eq!(second, Value::Boolean(false));
        assert_eq!(value, num(2.0));
        assert_eq!(table.next(&second).unwrap(), None);
    }

    #[test]
    fn test_next_rejects_unknown_key() {
        let table = Table::new();
        assert!(table.next(&Value::Boolean(true)).is_err());
    }
}
