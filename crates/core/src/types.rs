//! Identifiers shared across the coordinator.

use std::fmt;

use crate::model::TableKey;

/// Name of a catalog namespace (a "database" in Hive-metastore terms).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct SchemaName(pub String);

impl fmt::Display for SchemaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SchemaName {
    fn from(s: &str) -> Self {
        SchemaName(s.to_string())
    }
}

/// Name of a table within a schema.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct TableName(pub String);

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TableName {
    fn from(s: &str) -> Self {
        TableName(s.to_string())
    }
}

/// Ordered partition-column values identifying one partition of a table.
///
/// Order matches the table's `partition_columns`; two `PartitionValues` with
/// the same strings in a different order identify different partitions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct PartitionValues(pub Vec<String>);

impl PartitionValues {
    /// Build from an ordered list of values.
    pub fn new(values: Vec<String>) -> Self {
        PartitionValues(values)
    }

    /// Render as the conventional `col=value/col=value` partition name.
    pub fn to_partition_name(&self, partition_columns: &[String]) -> String {
        partition_columns
            .iter()
            .zip(self.0.iter())
            .map(|(col, val)| format!("{col}={val}"))
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// A partition key: the table it belongs to plus its ordered values.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct PartitionKey {
    /// Owning table.
    pub table: TableKey,
    /// Ordered partition-column values.
    pub values: PartitionValues,
}

impl PartitionKey {
    /// Construct a partition key.
    pub fn new(table: TableKey, values: PartitionValues) -> Self {
        PartitionKey { table, values }
    }
}

/// Caller identity (the metastore principal a submitted action originated from).
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Identity(pub String);

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for the top-level SQL statement driving the transaction.
///
/// Used to tag output file names so that scoped cleanup only ever touches
/// files this query produced, never a concurrent writer's files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct QueryId(pub String);

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque write-id issued by the external catalog, scoping one ACID
/// operation's deltas on a transactional table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct WriteId(pub u64);

/// Opaque transaction-id issued by the external catalog for one ACID
/// transaction lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct TransactionId(pub u64);
