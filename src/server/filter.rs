//! Compiles the client `filters` parameter into a row predicate.
//!
//! The wire form is a JSON object mapping column names to arrays of
//! accepted values, e.g. `{"region": ["North", "South"], "year": [2024]}`.
//! A row matches when, for every listed column, its value is one of the
//! listed values.
//!
//! Execution uses [`Predicate::to_expr`], which binds the values as
//! literals of the column's own type in a DataFusion expression, so `"3"`
//! matches a float `3.0` and `"true"` matches a boolean column. The SQL
//! rendering produced by
//! `Display` is for logs and diagnostics; it quotes identifiers and
//! escapes literals so it is always well-formed.

use crate::error::{ServerError, ServerResult};
use datafusion::arrow::datatypes::{DataType, Schema};
use datafusion::logical_expr::{ident, lit, Expr};
use datafusion::scalar::ScalarValue;
use serde_json::Value;
use std::fmt;

/// One `column IN (values)` clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub column: String,
    pub values: Vec<String>,
}

impl Clause {
    fn to_expr(&self, schema: &Schema) -> Expr {
        let column = ident(self.column.as_str());
        let Ok(field) = schema.field_with_name(&self.column) else {
            let list = self.values.iter().map(|v| lit(v.as_str())).collect();
            return column.in_list(list, false);
        };

        let list: Vec<Expr> = self
            .values
            .iter()
            .filter_map(|v| typed_literal(v, field.data_type()))
            .map(lit)
            .collect();
        if list.is_empty() {
            // No value is representable in the column's type
            return lit(false);
        }
        column.in_list(list, false)
    }
}

/// Interpret `value` as a literal of `data_type`.
///
/// `None` when the text has no value of that type (`"abc"` or `"1.5"` for
/// an integer column); such a value can never match.
pub fn typed_literal(value: &str, data_type: &DataType) -> Option<ScalarValue> {
    let text = if data_type.is_integer() {
        integral_text(value)?
    } else {
        value.to_string()
    };
    let scalar = ScalarValue::Utf8(Some(text)).cast_to(data_type).ok()?;
    (!scalar.is_null()).then_some(scalar)
}

/// `"1.0"` and `"1e3"` name integers too
fn integral_text(value: &str) -> Option<String> {
    let value = value.trim();
    if value.parse::<i128>().is_ok() {
        return Some(value.to_string());
    }
    let float: f64 = value.parse().ok()?;
    (float.is_finite() && float.fract() == 0.0).then(|| format!("{float:.0}"))
}

/// Conjunction of clauses; empty means "match everything"
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Predicate {
    clauses: Vec<Clause>,
}

impl Predicate {
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Engine expression with bound literal values, `None` when empty.
    ///
    /// Column names are not checked against the table here; an unknown
    /// column fails when the plan is built.
    pub fn to_expr(&self, schema: &Schema) -> Option<Expr> {
        self.clauses
            .iter()
            .map(|clause| clause.to_expr(schema))
            .reduce(Expr::and)
    }

    /// Normalized filter object (non-empty clauses only)
    pub fn applied(&self) -> Value {
        let map = self
            .clauses
            .iter()
            .map(|c| (c.column.clone(), Value::from(c.values.clone())))
            .collect::<serde_json::Map<_, _>>();
        Value::Object(map)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                f.write_str(" AND ")?;
            }
            write!(f, "{} IN (", quote_identifier(&clause.column))?;
            for (j, value) in clause.values.iter().enumerate() {
                if j > 0 {
                    f.write_str(", ")?;
                }
                f.write_str(&quote_literal(value))?;
            }
            f.write_str(")")?;
        }
        Ok(())
    }
}

/// Wrap a column name in double quotes, doubling embedded quotes
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Wrap a value in single quotes, doubling embedded quotes
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Parse the optional `filters` query parameter.
///
/// Absent or blank input yields an empty predicate. Anything other than an
/// object of scalar arrays is rejected with [`ServerError::InvalidFilter`].
/// Columns with an empty array are dropped.
pub fn compile(raw: Option<&str>) -> ServerResult<Predicate> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(Predicate::default()),
        Some(s) => s,
    };

    let parsed: Value = serde_json::from_str(raw).map_err(|_| ServerError::InvalidFilter)?;
    let object = parsed.as_object().ok_or(ServerError::InvalidFilter)?;

    let mut clauses = Vec::with_capacity(object.len());
    for (column, values) in object {
        let values = values.as_array().ok_or(ServerError::InvalidFilter)?;
        if values.is_empty() {
            continue;
        }
        let values = values
            .iter()
            .map(scalar_text)
            .collect::<Option<Vec<_>>>()
            .ok_or(ServerError::InvalidFilter)?;
        clauses.push(Clause {
            column: column.clone(),
            values,
        });
    }

    Ok(Predicate { clauses })
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
