//! Records - one database row plus its relationship cache
//!
//! Column data and relationship data live in separate maps. The resolvers in
//! [`crate::loading`] only ever write the relation and count maps; column
//! values are left exactly as the row produced them.

use std::collections::HashMap;

use serde_json::{Map, Value as JsonValue};

use crate::backends::{DatabaseValue, RecordKey, Row};

static NULL: DatabaseValue = DatabaseValue::Null;

/// Resolved value of one relationship on one record
#[derive(Debug, Clone, PartialEq)]
pub enum RelationValue {
    /// HasOne / BelongsTo; `None` means loaded and absent
    One(Option<Box<Record>>),
    /// HasMany / ManyToMany, in result order
    Many(Vec<Record>),
}

impl RelationValue {
    /// Empty value of the right shape for a relationship kind
    pub fn empty(is_collection: bool) -> Self {
        if is_collection {
            RelationValue::Many(Vec::new())
        } else {
            RelationValue::One(None)
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RelationValue::One(one) => usize::from(one.is_some()),
            RelationValue::Many(many) => many.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The single related record, if this is a loaded to-one value
    pub fn as_one(&self) -> Option<&Record> {
        match self {
            RelationValue::One(one) => one.as_deref(),
            RelationValue::Many(_) => None,
        }
    }

    /// The related collection, if this is a to-many value
    pub fn as_many(&self) -> Option<&[Record]> {
        match self {
            RelationValue::Many(many) => Some(many),
            RelationValue::One(_) => None,
        }
    }

    /// Every related record regardless of shape
    pub fn records(&self) -> Vec<&Record> {
        match self {
            RelationValue::One(one) => one.iter().map(|r| &**r).collect(),
            RelationValue::Many(many) => many.iter().collect(),
        }
    }

    pub fn records_mut(&mut self) -> Vec<&mut Record> {
        match self {
            RelationValue::One(one) => one.iter_mut().map(|r| &mut **r).collect(),
            RelationValue::Many(many) => many.iter_mut().collect(),
        }
    }

    fn to_json(&self) -> JsonValue {
        match self {
            RelationValue::One(Some(record)) => record.to_json(),
            RelationValue::One(None) => JsonValue::Null,
            RelationValue::Many(many) => JsonValue::Array(many.iter().map(Record::to_json).collect()),
        }
    }
}

/// Lazy access result for a relationship
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Loaded<'a> {
    /// Never resolved on this record; use [`crate::LazyLoader`] to fetch it
    NotLoaded,
    Loaded(&'a RelationValue),
}

impl<'a> Loaded<'a> {
    pub fn is_loaded(&self) -> bool {
        matches!(self, Loaded::Loaded(_))
    }

    pub fn value(self) -> Option<&'a RelationValue> {
        match self {
            Loaded::Loaded(value) => Some(value),
            Loaded::NotLoaded => None,
        }
    }
}

/// One row of a model's table
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    model: String,
    table: String,
    attributes: HashMap<String, DatabaseValue>,
    relations: HashMap<String, RelationValue>,
    counts: HashMap<String, i64>,
    pivot: Option<HashMap<String, DatabaseValue>>,
}

impl Record {
    /// Create an empty record for a model
    pub fn new(model: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            table: table.into(),
            attributes: HashMap::new(),
            relations: HashMap::new(),
            counts: HashMap::new(),
            pivot: None,
        }
    }

    /// Build a record from one result row
    pub fn from_row(model: impl Into<String>, table: impl Into<String>, row: Row) -> Self {
        let mut record = Self::new(model, table);
        record.attributes = row;
        record
    }

    /// Builder-style attribute setter
    pub fn with_attribute(mut self, column: &str, value: impl Into<DatabaseValue>) -> Self {
        self.set(column, value);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn attributes(&self) -> &HashMap<String, DatabaseValue> {
        &self.attributes
    }

    /// Column value, `None` when the column is absent
    pub fn get(&self, column: &str) -> Option<&DatabaseValue> {
        self.attributes.get(column)
    }

    /// Column value with absent columns read as NULL
    pub fn value(&self, column: &str) -> &DatabaseValue {
        self.attributes.get(column).unwrap_or(&NULL)
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.value(column).as_i64()
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        match self.value(column) {
            DatabaseValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn set(&mut self, column: &str, value: impl Into<DatabaseValue>) {
        self.attributes.insert(column.to_string(), value.into());
    }

    /// Join key of a column; absent and NULL columns have none
    pub fn key(&self, column: &str) -> Option<RecordKey> {
        self.value(column).to_key()
    }

    /// Lazy access to a relationship
    pub fn relation(&self, name: &str) -> Loaded<'_> {
        match self.relations.get(name) {
            Some(value) => Loaded::Loaded(value),
            None => Loaded::NotLoaded,
        }
    }

    pub fn relation_loaded(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    /// Names of every loaded relationship
    pub fn loaded_relations(&self) -> Vec<&str> {
        self.relations.keys().map(String::as_str).collect()
    }

    /// Replace a relationship value as a whole
    pub fn set_relation(&mut self, name: &str, value: RelationValue) {
        self.relations.insert(name.to_string(), value);
    }

    pub fn unset_relation(&mut self, name: &str) -> Option<RelationValue> {
        self.relations.remove(name)
    }

    /// Related records of a loaded relationship, empty when not loaded
    pub fn related(&self, name: &str) -> Vec<&Record> {
        self.relations.get(name).map(RelationValue::records).unwrap_or_default()
    }

    pub fn related_records_mut(&mut self, name: &str) -> Vec<&mut Record> {
        self.relations
            .get_mut(name)
            .map(RelationValue::records_mut)
            .unwrap_or_default()
    }

    pub fn set_count(&mut self, alias: &str, count: i64) {
        self.counts.insert(alias.to_string(), count);
    }

    /// Aggregated count stored under an alias such as `posts_count`
    pub fn count(&self, alias: &str) -> Option<i64> {
        self.counts.get(alias).copied()
    }

    pub fn counts(&self) -> &HashMap<String, i64> {
        &self.counts
    }

    /// Pivot attributes when loaded through a many-to-many relationship
    pub fn pivot(&self) -> Option<&HashMap<String, DatabaseValue>> {
        self.pivot.as_ref()
    }

    pub fn set_pivot(&mut self, pivot: HashMap<String, DatabaseValue>) {
        self.pivot = Some(pivot);
    }

    /// Render attributes, counts, pivot data and loaded relations as JSON
    pub fn to_json(&self) -> JsonValue {
        let mut map = Map::new();
        for (column, value) in &self.attributes {
            map.insert(column.clone(), value.to_json());
        }
        for (alias, count) in &self.counts {
            map.insert(alias.clone(), JsonValue::from(*count));
        }
        if let Some(pivot) = &self.pivot {
            let pivot_map: Map<String, JsonValue> = pivot
                .iter()
                .map(|(column, value)| (column.clone(), value.to_json()))
                .collect();
            map.insert("pivot".to_string(), JsonValue::Object(pivot_map));
        }
        for (name, value) in &self.relations {
            map.insert(name.clone(), value.to_json());
        }
        JsonValue::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(id: i64) -> Record {
        Record::new("User", "users")
            .with_attribute("id", id)
            .with_attribute("name", format!("user-{}", id))
    }

    #[test]
    fn test_relation_not_loaded_until_set() {
        let mut record = user(1);
        assert_eq!(record.relation("posts"), Loaded::NotLoaded);

        record.set_relation("posts", RelationValue::Many(vec![]));
        let loaded = record.relation("posts");
        assert!(loaded.is_loaded());
        assert!(loaded.value().map(RelationValue::is_empty).unwrap_or(false));
    }

    #[test]
    fn test_set_relation_replaces_whole_value() {
        let mut record = user(1);
        record.set_relation("posts", RelationValue::Many(vec![user(2), user(3)]));
        record.set_relation("posts", RelationValue::Many(vec![user(4)]));
        assert_eq!(record.related("posts").len(), 1);
        assert_eq!(record.related("posts")[0].get_i64("id"), Some(4));
    }

    #[test]
    fn test_absent_and_null_columns_have_no_key() {
        let record = user(1).with_attribute("team_id", DatabaseValue::Null);
        assert_eq!(record.key("team_id"), None);
        assert_eq!(record.key("missing"), None);
        assert_eq!(record.key("id"), Some(RecordKey::Int(1)));
    }

    #[test]
    fn test_to_json_nests_relations_and_counts() {
        let mut record = user(1);
        record.set_relation("profile", RelationValue::One(None));
        record.set_count("posts_count", 3);

        let json = record.to_json();
        assert_eq!(json["id"], json!(1));
        assert_eq!(json["profile"], JsonValue::Null);
        assert_eq!(json["posts_count"], json!(3));
    }
}
