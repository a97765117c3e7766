//! Query Builder Types - Core types and enums for query building

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::backends::DatabaseValue;

/// Query operator types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryOperator {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Like,
    NotLike,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl QueryOperator {
    /// Parse an SQL operator token, `None` when unsupported
    pub fn parse(operator: &str) -> Option<Self> {
        let op = match operator.trim().to_uppercase().as_str() {
            "=" => QueryOperator::Equal,
            "!=" | "<>" => QueryOperator::NotEqual,
            ">" => QueryOperator::GreaterThan,
            ">=" => QueryOperator::GreaterThanOrEqual,
            "<" => QueryOperator::LessThan,
            "<=" => QueryOperator::LessThanOrEqual,
            "LIKE" => QueryOperator::Like,
            "NOT LIKE" => QueryOperator::NotLike,
            "IN" => QueryOperator::In,
            "NOT IN" => QueryOperator::NotIn,
            "IS NULL" => QueryOperator::IsNull,
            "IS NOT NULL" => QueryOperator::IsNotNull,
            _ => return None,
        };
        Some(op)
    }
}

impl fmt::Display for QueryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryOperator::Equal => write!(f, "="),
            QueryOperator::NotEqual => write!(f, "!="),
            QueryOperator::GreaterThan => write!(f, ">"),
            QueryOperator::GreaterThanOrEqual => write!(f, ">="),
            QueryOperator::LessThan => write!(f, "<"),
            QueryOperator::LessThanOrEqual => write!(f, "<="),
            QueryOperator::Like => write!(f, "LIKE"),
            QueryOperator::NotLike => write!(f, "NOT LIKE"),
            QueryOperator::In => write!(f, "IN"),
            QueryOperator::NotIn => write!(f, "NOT IN"),
            QueryOperator::IsNull => write!(f, "IS NULL"),
            QueryOperator::IsNotNull => write!(f, "IS NOT NULL"),
        }
    }
}

/// Where clause condition
#[derive(Debug, Clone, PartialEq)]
pub struct WhereCondition {
    pub column: String,
    pub operator: QueryOperator,
    pub value: Option<DatabaseValue>,
    pub values: Vec<DatabaseValue>, // For IN, NOT IN
}

/// One projected item of a SELECT
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// `*`
    All,
    /// `table.*`
    AllFrom(String),
    /// `column` or `column AS alias`
    Column { column: String, alias: Option<String> },
    /// `COUNT(*) AS alias`
    CountAll { alias: String },
}

impl SelectItem {
    /// Output column name this item produces in a result row
    pub fn output_name(&self) -> Option<&str> {
        match self {
            SelectItem::All | SelectItem::AllFrom(_) => None,
            SelectItem::Column { column, alias } => Some(
                alias
                    .as_deref()
                    .unwrap_or_else(|| column.rsplit('.').next().unwrap_or(column)),
            ),
            SelectItem::CountAll { alias } => Some(alias),
        }
    }
}

impl fmt::Display for SelectItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectItem::All => write!(f, "*"),
            SelectItem::AllFrom(table) => write!(f, "{}.*", table),
            SelectItem::Column { column, alias: Some(alias) } => write!(f, "{} AS {}", column, alias),
            SelectItem::Column { column, alias: None } => write!(f, "{}", column),
            SelectItem::CountAll { alias } => write!(f, "COUNT(*) AS {}", alias),
        }
    }
}

/// Join types
#[derive(Debug, Clone, PartialEq)]
pub enum JoinType {
    Inner,
    Left,
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "INNER JOIN"),
            JoinType::Left => write!(f, "LEFT JOIN"),
        }
    }
}

/// Join clause
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub join_type: JoinType,
    pub table: String,
    pub on_conditions: Vec<(String, String)>, // (left_column, right_column)
}

/// Order by direction
#[derive(Debug, Clone, PartialEq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderDirection::Asc => write!(f, "ASC"),
            OrderDirection::Desc => write!(f, "DESC"),
        }
    }
}
