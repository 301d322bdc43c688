use std::collections::HashSet;
use std::fmt;

use serde_json::Value;

/// Identity of a row, taken from its `id` field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId(String);

impl RowId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Strings and numbers are accepted; `"7"` and `7` are the same row.
    pub fn of(row: &Value) -> Option<Self> {
        match row.get("id")? {
            Value::String(s) => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Selected row identities; independent of whatever page is loaded.
#[derive(Debug, Clone, Default)]
pub struct SelectionStore {
    selected: HashSet<RowId>,
}

impl SelectionStore {
    /// Replaces the selection with the ids of `rows`. Rows without an id are ignored.
    pub fn update<'a, I>(&mut self, rows: I)
    where
        I: IntoIterator<Item = &'a Value>,
    {
        self.selected = rows.into_iter().filter_map(RowId::of).collect();
    }

    pub fn contains(&self, row: &Value) -> bool {
        RowId::of(row).is_some_and(|id| self.selected.contains(&id))
    }

    pub fn ids(&self) -> Vec<RowId> {
        let mut ids: Vec<RowId> = self.selected.iter().cloned().collect();
        ids.sort();
        ids
    }
}
