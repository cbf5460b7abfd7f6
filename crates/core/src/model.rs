//! Catalog entities: schemas, tables and partitions.

use std::collections::HashMap;

use crate::statistics::Statistics;
use crate::types::{PartitionValues, SchemaName, TableName, WriteId};

/// A table or partition column: name plus a catalog type name.
///
/// The type name is opaque to the coordinator (it is whatever the external
/// catalog's type system produces) and is never interpreted here.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Catalog type name, e.g. `"bigint"` or `"varchar(32)"`.
    pub type_name: String,
}

/// Where a table's or partition's data lives and in what format.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct StorageDescriptor {
    /// Directory holding the data files. `None` means the catalog owns
    /// directory creation (an unmanaged-location table).
    pub location: Option<String>,
    /// Opaque file format identifier (interpreted by the column-format
    /// writer/reader this coordinator does not implement).
    pub format: Option<String>,
}

impl StorageDescriptor {
    /// Build a descriptor with an explicit location.
    pub fn at(location: impl Into<String>) -> Self {
        StorageDescriptor {
            location: Some(location.into()),
            format: None,
        }
    }
}

/// Identifies a table uniquely within the catalog.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct TableKey {
    /// Owning schema.
    pub schema_name: SchemaName,
    /// Table name.
    pub table_name: TableName,
}

impl TableKey {
    /// Build a table key from borrowed strings.
    pub fn new(schema_name: impl Into<String>, table_name: impl Into<String>) -> Self {
        TableKey {
            schema_name: SchemaName(schema_name.into()),
            table_name: TableName(table_name.into()),
        }
    }
}

impl std::fmt::Display for TableKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema_name, self.table_name)
    }
}

/// A table's full catalog definition.
///
/// Invariant: `partition_columns` and the names in `columns` are disjoint —
/// a column cannot be both a data column and a partition column.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Table {
    /// Table identity.
    pub key: TableKey,
    /// Data columns (excludes partition columns).
    pub columns: Vec<Column>,
    /// Ordered partition-column names (empty for an unpartitioned table).
    pub partition_columns: Vec<String>,
    /// Location and format.
    pub storage: StorageDescriptor,
    /// Catalog owner principal.
    pub owner: String,
    /// Free-form key/value table parameters.
    pub parameters: HashMap<String, String>,
    /// Write-id assigned for the operation currently in flight against this
    /// table, if it is a transactional table being written in this
    /// transaction.
    pub write_id: Option<WriteId>,
}

impl Table {
    /// Check the data/partition column disjointness invariant.
    pub fn validate(&self) -> Result<(), String> {
        for col in &self.columns {
            if self.partition_columns.iter().any(|p| p == &col.name) {
                return Err(format!(
                    "column `{}` is both a data column and a partition column",
                    col.name
                ));
            }
        }
        Ok(())
    }

    /// Whether the catalog owns this table's directory (no explicit location).
    pub fn is_managed_location(&self) -> bool {
        self.storage.location.is_none()
    }
}

/// One partition of a partitioned table.
///
/// Invariant: `values.0.len() == table.partition_columns.len()`, checked by
/// [`Partition::validate_against`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Partition {
    /// Owning table.
    pub table: TableKey,
    /// Ordered partition-column values.
    pub values: PartitionValues,
    /// Location and format (partitions may override the table's format).
    pub storage: StorageDescriptor,
    /// Free-form key/value partition parameters.
    pub parameters: HashMap<String, String>,
}

impl Partition {
    /// Validate `values.len()` against the owning table's partition-column count.
    pub fn validate_against(&self, table: &Table) -> Result<(), String> {
        if self.values.0.len() != table.partition_columns.len() {
            return Err(format!(
                "partition has {} values but table `{}` has {} partition columns",
                self.values.0.len(),
                table.key,
                table.partition_columns.len()
            ));
        }
        Ok(())
    }
}
