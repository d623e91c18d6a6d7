//! Hybrid Lua table.
//!
//! Three partitions back a table:
//!
//! * the **array part**, a 1-indexed `Vec` for positive integral keys,
//! * the **string part**, insertion ordered,
//! * the **fallback part** for every other key, allocated on first use and
//!   compared with raw equality.
//!
//! The length of a table is the size of its array part. An optional
//! metatable is consulted by the evaluator for `__index` / `__newindex`.

use std::cell::{Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use log::debug;

use crate::value::Value;

/// How far past the end of the array part an integral key may land and still
/// be stored there; the gap is filled with `nil`.
const ARRAY_GAP_LIMIT: usize = 1024;

#[derive(Debug, Default)]
pub struct Table {
    array: Vec<Value>,
    string_index: HashMap<String, usize>,
    strings: Vec<(String, Value)>,
    others: Option<Vec<(Value, Value)>>,
    pub metatable: Option<TableRef>,
}

/// Array-part slot for a key, if the key is a positive integral number.
fn array_index(key: &Value) -> Option<usize> {
    let n = key.as_number()?;

    (n >= 1.0 && n.fract() == 0.0 && n < usize::MAX as f64).then(|| n as usize - 1)
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table whose array part holds `values`.
    pub fn from_values(values: Vec<Value>) -> Self {
        let mut table = Table {
            array: values,
            ..Table::default()
        };
        table.trim();
        table
    }

    /// Array-part length (`#t`).
    pub fn len(&self) -> usize {
        self.array.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys().is_empty()
    }

    pub fn get(&self, key: &Value) -> Value {
        if let Value::String(s) = key {
            return self
                .string_index
                .get(s)
                .map_or(Value::Nil, |&i| self.strings[i].1.clone());
        }

        if let Some(i) = array_index(key) {
            if let Some(value) = self.array.get(i) {
                return value.clone();
            }
        }

        self.others
            .as_ref()
            .and_then(|others| others.iter().find(|(k, _)| k == key))
            .map_or(Value::Nil, |(_, v)| v.clone())
    }

    pub fn get_str(&self, key: &str) -> Value {
        self.string_index
            .get(key)
            .map_or(Value::Nil, |&i| self.strings[i].1.clone())
    }

    pub fn has(&self, key: &Value) -> bool {
        !self.get(key).is_nil()
    }

    /// Raw store. The caller rejects `nil` and NaN keys.
    pub fn set(&mut self, key: Value, value: Value) {
        match key {
            Value::String(s) => self.set_str(s, value),

            key => match array_index(&key) {
                Some(i) if i < self.array.len() => {
                    self.array[i] = value;
                    self.trim();
                }

                Some(i) if i < self.array.len() + ARRAY_GAP_LIMIT && !value.is_nil() => {
                    self.remove_other(&key);
                    self.array.resize(i, Value::Nil);
                    self.array.push(value);
                    self.absorb_others();
                }

                _ => self.set_other(key, value),
            },
        }
    }

    pub fn set_str(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();

        match self.string_index.get(&key) {
            Some(&i) => self.strings[i].1 = value,

            None if value.is_nil() => {}

            None => {
                self.string_index.insert(key.clone(), self.strings.len());
                self.strings.push((key, value));
            }
        }
    }

    fn set_other(&mut self, key: Value, value: Value) {
        let others = self.others.get_or_insert_with(Vec::new);
        let position = others.iter().position(|(k, _)| *k == key);

        match (position, value.is_nil()) {
            (Some(i), true) => {
                others.remove(i);
            }

            (Some(i), false) => others[i].1 = value,

            (None, true) => {}

            (None, false) => others.push((key, value)),
        }
    }

    /// Move fallback entries whose keys now fall inside the array part.
    fn absorb_others(&mut self) {
        let Some(others) = self.others.as_mut() else {
            return;
        };

        let len = self.array.len();
        let mut i = 0;

        while i < others.len() {
            match array_index(&others[i].0) {
                Some(slot) if slot < len => {
                    let (_, value) = others.remove(i);
                    self.array[slot] = value;
                }

                _ => i += 1,
            }
        }
    }

    fn remove_other(&mut self, key: &Value) {
        if let Some(others) = self.others.as_mut() {
            others.retain(|(k, _)| k != key);
        }
    }

    /// Drop trailing `nil`s so that `t[#t] = nil` shrinks the length.
    fn trim(&mut self) {
        while self.array.last().is_some_and(Value::is_nil) {
            self.array.pop();
        }
    }

    /// Insert into the array part at 1-based `pos`, shifting up.
    pub fn insert(&mut self, pos: usize, value: Value) {
        let at = pos.saturating_sub(1).min(self.array.len());
        self.array.insert(at, value);
    }

    pub fn push(&mut self, value: Value) {
        self.array.push(value);
        self.trim();
    }

    /// Remove from the array part at 1-based `pos`, shifting down.
    pub fn remove(&mut self, pos: usize) -> Value {
        if pos == 0 || pos > self.array.len() {
            return Value::Nil;
        }

        let removed = self.array.remove(pos - 1);
        self.trim();
        removed
    }

    pub fn array(&self) -> &[Value] {
        &self.array
    }

    pub fn array_mut(&mut self) -> &mut Vec<Value> {
        &mut self.array
    }

    /// Keys with non-nil values: array indices, then string keys in
    /// insertion order, then fallback keys.
    pub fn keys(&self) -> Vec<Value> {
        let array = self
            .array
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_nil())
            .map(|(i, _)| Value::Number((i + 1) as f64));

        let strings = self
            .strings
            .iter()
            .filter(|(_, v)| !v.is_nil())
            .map(|(k, _)| Value::String(k.clone()));

        let others = self.others.iter().flatten().map(|(k, _)| k.clone());

        array.chain(strings).chain(others).collect()
    }

    /// Entry following `key` in [`Table::keys`] order (`next`). Traversal
    /// resumes in the partition holding `key`; `None` at the end or for a
    /// key the table has never held.
    pub fn next(&self, key: &Value) -> Option<(Value, Value)> {
        let (array_from, strings_from, others_from) = if key.is_nil() {
            (0, 0, 0)
        } else {
            match self.cursor_after(key)? {
                Cursor::Array(i) => (i, 0, 0),
                Cursor::Strings(i) => (self.array.len(), i, 0),
                Cursor::Others(i) => (self.array.len(), self.strings.len(), i),
            }
        };

        debug!("Table next from {}/{}/{}", array_from, strings_from, others_from);

        let array = self
            .array
            .iter()
            .enumerate()
            .skip(array_from)
            .find(|(_, v)| !v.is_nil())
            .map(|(i, v)| (Value::Number((i + 1) as f64), v.clone()));

        if array.is_some() {
            return array;
        }

        let string = self
            .strings
            .iter()
            .skip(strings_from)
            .find(|(_, v)| !v.is_nil())
            .map(|(k, v)| (Value::String(k.clone()), v.clone()));

        if string.is_some() {
            return string;
        }

        self.others
            .iter()
            .flatten()
            .nth(others_from)
            .map(|(k, v)| (k.clone(), v.clone()))
    }

    fn cursor_after(&self, key: &Value) -> Option<Cursor> {
        if let Value::String(s) = key {
            return self.string_index.get(s).map(|&i| Cursor::Strings(i + 1));
        }

        let slot = array_index(key);

        if let Some(i) = slot.filter(|&i| i < self.array.len()) {
            return Some(Cursor::Array(i + 1));
        }

        let position = self
            .others
            .as_ref()
            .and_then(|others| others.iter().position(|(k, _)| k == key));

        match (position, slot) {
            (Some(i), _) => Some(Cursor::Others(i + 1)),

            // an array key cleared during traversal, which trimmed the array
            (None, Some(i)) => Some(Cursor::Array(i + 1)),

            (None, None) => None,
        }
    }
}

/// Resume point for [`Table::next`]: the partition and index to scan from.
enum Cursor {
    Array(usize),
    Strings(usize),
    Others(usize),
}

/// Shared, identity-compared handle to a [`Table`].
#[derive(Clone, Default)]
pub struct TableRef(Rc<RefCell<Table>>);

// Tables may contain themselves; never recurse.
impl fmt::Debug for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table: {:#x}", self.id())
    }
}

impl TableRef {
    pub fn new(table: Table) -> Self {
        TableRef(Rc::new(RefCell::new(table)))
    }

    pub fn from_values(values: Vec<Value>) -> Self {
        TableRef::new(Table::from_values(values))
    }

    pub fn borrow(&self) -> Ref<'_, Table> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Table> {
        self.0.borrow_mut()
    }

    pub fn ptr_eq(&self, other: &TableRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    pub fn get(&self, key: &Value) -> Value {
        self.borrow().get(key)
    }

    pub fn set(&self, key: Value, value: Value) {
        self.borrow_mut().set(key, value);
    }

    pub fn len(&self) -> usize {
        self.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.borrow().is_empty()
    }

    pub fn metatable(&self) -> Option<TableRef> {
        self.borrow().metatable.clone()
    }
}
