//! Relational storage types produced by type inference.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SchemaError;

/// Scalar column type in the generated schema.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum SqlType {
    #[serde(rename = "TIMESTAMP WITH TIME ZONE")]
    TimestampTz,
    #[serde(rename = "DATE")]
    Date,
    #[serde(rename = "BOOLEAN")]
    Boolean,
    #[serde(rename = "SMALLINT")]
    SmallInt,
    #[serde(rename = "INTEGER")]
    Integer,
    #[serde(rename = "BIGINT")]
    BigInt,
    #[serde(rename = "DOUBLE PRECISION")]
    DoublePrecision,
    #[default]
    #[serde(rename = "TEXT")]
    Text,
}

impl SqlType {
    /// PostgreSQL spelling of the type.
    pub fn as_sql(&self) -> &'static str {
        match self {
            SqlType::TimestampTz => "TIMESTAMP WITH TIME ZONE",
            SqlType::Date => "DATE",
            SqlType::Boolean => "BOOLEAN",
            SqlType::SmallInt => "SMALLINT",
            SqlType::Integer => "INTEGER",
            SqlType::BigInt => "BIGINT",
            SqlType::DoublePrecision => "DOUBLE PRECISION",
            SqlType::Text => "TEXT",
        }
    }

    /// Column type text, with `[]` appended for arrays.
    pub fn render(&self, is_array: bool) -> String {
        if is_array {
            format!("{}[]", self.as_sql())
        } else {
            self.as_sql().to_string()
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, SqlType::SmallInt | SqlType::Integer | SqlType::BigInt)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, SqlType::TimestampTz | SqlType::Date)
    }

    /// Smallest integer type that holds `max_abs`.
    pub fn integer_for_magnitude(max_abs: u64) -> Self {
        if max_abs < 32_767 {
            SqlType::SmallInt
        } else if max_abs < 2_147_483_647 {
            SqlType::Integer
        } else {
            SqlType::BigInt
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for SqlType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.to_ascii_uppercase().as_str() {
            "TIMESTAMP WITH TIME ZONE" | "TIMESTAMPTZ" => Ok(SqlType::TimestampTz),
            "DATE" => Ok(SqlType::Date),
            "BOOLEAN" | "BOOL" => Ok(SqlType::Boolean),
            "SMALLINT" | "INT2" => Ok(SqlType::SmallInt),
            "INTEGER" | "INT" | "INT4" => Ok(SqlType::Integer),
            "BIGINT" | "INT8" => Ok(SqlType::BigInt),
            "DOUBLE PRECISION" | "FLOAT8" => Ok(SqlType::DoublePrecision),
            "TEXT" => Ok(SqlType::Text),
            _ => Err(SchemaError::Parse(format!("Unknown column type '{s}'"))),
        }
    }
}
