//! Row/table contract used by the generic merge and replace operations.
//!
//! A [`TableRow`] declares its target table, its value columns and a typed
//! accessor for every column that may take part in a key. Callers name the
//! key columns once; [`KeyColumns::resolve`] turns those names into accessors
//! so the merge loop never looks a column up by name per row.

use std::fmt::{Display, Formatter};

use ::duckdb::types::Value;

use crate::WarehouseError;

/// Storage type of a declared column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Date,
    Double,
}

impl ColumnType {
    /// Bind placeholder for a value of this type. Dates travel as ISO text.
    pub const fn placeholder(self) -> &'static str {
        match self {
            Self::Date => "CAST(? AS DATE)",
            Self::Text | Self::Double => "?",
        }
    }
}

/// A value column written by the application.
///
/// `inserted_at` / `updated_at` are managed by the warehouse and never listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub column_type: ColumnType,
}

impl ColumnDef {
    pub const fn text(name: &'static str) -> Self {
        Self {
            name,
            column_type: ColumnType::Text,
        }
    }

    pub const fn date(name: &'static str) -> Self {
        Self {
            name,
            column_type: ColumnType::Date,
        }
    }

    pub const fn double(name: &'static str) -> Self {
        Self {
            name,
            column_type: ColumnType::Double,
        }
    }
}

/// Canonical text form of one key component.
///
/// Matches DuckDB's `CAST(... AS VARCHAR)` rendering of the stored value, so
/// keys read back from the table compare equal to keys taken from rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyPart(String);

impl KeyPart {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<time::Date> for KeyPart {
    fn from(value: time::Date) -> Self {
        Self(value.to_string())
    }
}

impl Display for KeyPart {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Full composite key of a row.
pub type RowKey = Vec<KeyPart>;

/// Typed accessor for one key column.
pub type KeyAccessor<R> = fn(&R) -> KeyPart;

/// A record type that can be merged into or replaced in a warehouse table.
pub trait TableRow: Sized {
    /// Target table name.
    const TABLE: &'static str;

    /// Value columns, in the order produced by [`TableRow::values`].
    const COLUMNS: &'static [ColumnDef];

    /// Accessor for a column usable as a key component.
    fn key_accessor(column: &str) -> Option<KeyAccessor<Self>>;

    /// Bind values for [`TableRow::COLUMNS`], same order and length.
    fn values(&self) -> Vec<Value>;
}

/// Key columns resolved to accessors for one row type.
pub struct KeyColumns<R> {
    columns: Vec<&'static str>,
    accessors: Vec<KeyAccessor<R>>,
}

impl<R: TableRow> KeyColumns<R> {
    /// Resolve key column names against the row type's declared columns.
    pub fn resolve(names: &[&str]) -> Result<Self, WarehouseError> {
        if names.is_empty() {
            return Err(WarehouseError::EmptyKeyColumns { table: R::TABLE });
        }

        let mut columns = Vec::with_capacity(names.len());
        let mut accessors = Vec::with_capacity(names.len());
        for name in names {
            let unknown = || WarehouseError::UnknownKeyColumn {
                table: R::TABLE,
                column: (*name).to_owned(),
            };
            let declared = R::COLUMNS
                .iter()
                .find(|column| column.name == *name)
                .ok_or_else(unknown)?;
            let accessor = R::key_accessor(name).ok_or_else(unknown)?;
            columns.push(declared.name);
            accessors.push(accessor);
        }

        Ok(Self { columns, accessors })
    }

    /// Declared names of the key columns, in key order.
    pub fn columns(&self) -> &[&'static str] {
        &self.columns
    }

    pub fn key_of(&self, row: &R) -> RowKey {
        self.accessors.iter().map(|accessor| accessor(row)).collect()
    }
}

impl<R> Clone for KeyColumns<R> {
    fn clone(&self) -> Self {
        Self {
            columns: self.columns.clone(),
            accessors: self.accessors.clone(),
        }
    }
}

impl<R> std::fmt::Debug for KeyColumns<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyColumns")
            .field("columns", &self.columns)
            .finish()
    }
}
