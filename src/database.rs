//! Ordered, name-keyed collection of tables plus file-level notes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::table::Table;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableDatabase {
    tables: Vec<Table>,
    #[serde(default)]
    notes:  Vec<String>,
}

impl TableDatabase {
    pub fn new() -> Self { Self::default() }

    pub fn from_tables<I: IntoIterator<Item = Table>>(tables: I) -> Self {
        let mut db = Self::new();
        for t in tables { db.put(t); }
        db
    }

    /// Insert a table, replacing any table of the same name in place.
    pub fn put(&mut self, table: Table) {
        match self.tables.iter_mut().find(|t| t.name() == table.name()) {
            Some(slot) => *slot = table,
            None       => self.tables.push(table),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name() == name)
    }

    /// Mutable access for editing values and notes.  Use
    /// [`rename`](Self::rename) to change a name; it keeps names unique.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.iter_mut().find(|t| t.name() == name)
    }

    /// Rename table `old` to `new`, dropping any other table already called
    /// `new`.  The renamed table keeps its position.  False when `old` does
    /// not exist.
    pub fn rename(&mut self, old: &str, new: &str) -> bool {
        if !self.contains_name(old) {
            return false;
        }
        if old != new {
            self.tables.retain(|t| t.name() != new);
        }
        if let Some(t) = self.tables.iter_mut().find(|t| t.name() == old) {
            t.set_name(new);
        }
        true
    }

    pub fn contains_name(&self, name: &str) -> bool { self.get(name).is_some() }

    pub fn len(&self) -> usize { self.tables.len() }

    pub fn is_empty(&self) -> bool { self.tables.is_empty() }

    /// Tables in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Table> { self.tables.iter() }

    pub fn names(&self) -> Vec<&str> { self.tables.iter().map(Table::name).collect() }

    // ── Notes ────────────────────────────────────────────────────────────────

    pub fn add_note<S: Into<String>>(&mut self, note: S) { self.notes.push(note.into()); }

    pub fn add_all_notes<I, S>(&mut self, notes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.notes.extend(notes.into_iter().map(Into::into));
    }

    pub fn number_of_notes(&self) -> usize { self.notes.len() }

    pub fn note(&self, i: usize) -> Option<&str> { self.notes.get(i).map(String::as_str) }

    pub fn notes(&self) -> &[String] { &self.notes }
}

impl<'a> IntoIterator for &'a TableDatabase {
    type Item = &'a Table;
    type IntoIter = std::slice::Iter<'a, Table>;
    fn into_iter(self) -> Self::IntoIter { self.tables.iter() }
}

impl fmt::Display for TableDatabase {
    /// `Table database: CL, CD, CM`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Table database: {}", self.names().join(", "))
    }
}
