//! Boundary value types: the "Value Marshalling" component of the design.
//!
//! These are the types a host binding converts its own value system to and
//! from. This crate does not know or care what that host value system looks
//! like — it only promises a faithful, lossless Rust-native representation
//! of what SQLite itself can produce or accept.

use rusqlite::types::{ToSqlOutput, Value as SqliteValue};
use rusqlite::ToSql;

/// One bound parameter or one returned cell.
///
/// Unlike a host language that must narrow every integer into a `f64`, this
/// crate keeps integers as `i64` and preserves embedded NUL bytes in text by
/// carrying a real `String` rather than a C string.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<SqliteValue> for Value {
    fn from(v: SqliteValue) -> Self {
        match v {
            SqliteValue::Null => Value::Null,
            SqliteValue::Integer(i) => Value::Integer(i),
            SqliteValue::Real(r) => Value::Real(r),
            SqliteValue::Text(s) => Value::Text(s),
            SqliteValue::Blob(b) => Value::Blob(b),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let v = match self {
            Value::Null => SqliteValue::Null,
            Value::Integer(i) => SqliteValue::Integer(*i),
            Value::Real(r) => SqliteValue::Real(*r),
            Value::Text(s) => SqliteValue::Text(s.clone()),
            Value::Blob(b) => SqliteValue::Blob(b.clone()),
        };
        Ok(ToSqlOutput::Owned(v))
    }
}

/// One result row: column name paired with its cell value, in select order.
pub type Row = Vec<(String, Value)>;

/// Column metadata as returned alongside `rows`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ColumnMeta {
    pub column_name: String,
    pub column_declared_type: Option<String>,
    pub column_index: usize,
}

/// The shape returned by `executeInContext` for a single statement.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ExecResult {
    pub rows_affected: i64,
    pub insert_id: Option<i64>,
    pub rows: Option<Vec<Row>>,
    pub metadata: Option<Vec<ColumnMeta>>,
}

/// The shape returned by `executeBatch`.
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct BatchResult {
    pub rows_affected: i64,
}

/// The shape returned by `loadFile`.
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct LoadFileResult {
    pub rows_affected: i64,
    pub commands: usize,
}

/// One statement plus its bound parameters, as accepted by `executeBatch`.
///
/// `params` covers both shapes a batch entry can take: a single parameter
/// set, or — for a batched single-statement update — one set per repetition.
#[derive(Debug, Clone)]
pub struct BatchCommand {
    pub sql: String,
    pub params: BatchParams,
}

#[derive(Debug, Clone)]
pub enum BatchParams {
    Single(Vec<Value>),
    Many(Vec<Vec<Value>>),
}

