//! Schema lookup: models, fields, columns and relations.
//!
//! Translation never guesses names. Every field referenced by a document is
//! resolved through a [`SchemaResolver`], which maps models to tables and
//! fields to columns. [`SchemaRegistry`] is an in-memory implementation
//! populated with [`ModelSchema`] definitions.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::error::{QueryError, QueryResult};
use crate::relations::RelationSpec;
use crate::sql::{ColumnResolver, Dialect};

/// A scalar field of a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field name as used in documents and results.
    pub name: String,
    /// Column name in the table.
    pub column: String,
    /// Part of the primary key.
    pub is_id: bool,
    /// Holds a JSON document stored as text.
    pub is_json: bool,
}

impl FieldSpec {
    /// A field whose column has the same name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            column: name.clone(),
            name,
            is_id: false,
            is_json: false,
        }
    }

    /// Map this field to a differently named column.
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    /// Mark this field as (part of) the primary key.
    pub fn id(mut self) -> Self {
        self.is_id = true;
        self
    }

    /// Mark this field as a JSON document. Backends that store documents as
    /// text decode it when reading rows back.
    pub fn json(mut self) -> Self {
        self.is_json = true;
        self
    }
}

/// Definition of one model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSchema {
    /// Model name.
    pub name: String,
    /// Table name.
    pub table: String,
    /// Scalar fields in declaration order.
    pub fields: Vec<FieldSpec>,
    /// Relations keyed by relation field name.
    pub relations: IndexMap<String, RelationSpec>,
}

impl ModelSchema {
    /// Create a model stored in `table`.
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            fields: Vec::new(),
            relations: IndexMap::new(),
        }
    }

    /// Add a scalar field.
    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    /// Add a relation.
    pub fn relation(mut self, relation: RelationSpec) -> Self {
        self.relations.insert(relation.name.clone(), relation);
        self
    }

    /// Look up a scalar field.
    pub fn get_field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Look up a relation.
    pub fn get_relation(&self, name: &str) -> Option<&RelationSpec> {
        self.relations.get(name)
    }

    /// Whether `name` is a relation field.
    pub fn is_relation(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    /// Column for `field`, failing for unknown fields.
    pub fn column_for(&self, field: &str) -> QueryResult<&str> {
        self.get_field(field)
            .map(|f| f.column.as_str())
            .ok_or_else(|| QueryError::unknown_field(&self.name, field))
    }

    /// Relation named `name`, failing for unknown relations.
    pub fn relation_for(&self, name: &str) -> QueryResult<&RelationSpec> {
        self.get_relation(name).ok_or_else(|| {
            QueryError::invalid_select(format!(
                "`{}` is not a relation of model `{}`",
                name, self.name
            ))
            .with_model(&self.name)
            .with_field(name)
        })
    }

    /// Primary key fields.
    pub fn primary_key(&self) -> Vec<&FieldSpec> {
        self.fields.iter().filter(|f| f.is_id).collect()
    }

    /// All scalar field names.
    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    /// A column resolver for this model.
    pub fn columns(&self, dialect: Dialect) -> ModelColumns<'_> {
        ModelColumns {
            schema: self,
            dialect,
            alias: None,
        }
    }
}

/// Resolves fields of one model to quoted columns, optionally qualified by a
/// table alias.
#[derive(Debug, Clone, Copy)]
pub struct ModelColumns<'a> {
    schema: &'a ModelSchema,
    dialect: Dialect,
    alias: Option<&'a str>,
}

impl<'a> ModelColumns<'a> {
    /// Qualify every column with `alias`.
    pub fn with_alias(mut self, alias: &'a str) -> Self {
        self.alias = Some(alias);
        self
    }
}

impl ColumnResolver for ModelColumns<'_> {
    fn column(&self, field: &str) -> QueryResult<String> {
        let column = self.dialect.quote_identifier(self.schema.column_for(field)?);
        Ok(match self.alias {
            Some(alias) => format!("{}.{}", self.dialect.quote_identifier(alias), column),
            None => column,
        })
    }
}

/// Model and field name resolution.
pub trait SchemaResolver: Send + Sync {
    /// Get the definition of `model`.
    fn model(&self, model: &str) -> QueryResult<Arc<ModelSchema>>;

    /// Table name of `model`.
    fn resolve_table_name(&self, model: &str) -> QueryResult<String> {
        Ok(self.model(model)?.table.clone())
    }

    /// Column name of `field` on `model`.
    fn resolve_field_name(&self, model: &str, field: &str) -> QueryResult<String> {
        Ok(self.model(model)?.column_for(field)?.to_string())
    }
}

/// In-memory schema registry.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    models: RwLock<HashMap<String, Arc<ModelSchema>>>,
}

impl SchemaRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a model.
    pub fn register(&self, model: ModelSchema) {
        self.models.write().insert(model.name.clone(), Arc::new(model));
    }

    /// Builder-style registration.
    pub fn with_model(self, model: ModelSchema) -> Self {
        self.register(model);
        self
    }

    /// Names of all registered models.
    pub fn model_names(&self) -> Vec<String> {
        self.models.read().keys().cloned().collect()
    }
}

impl SchemaResolver for SchemaRegistry {
    fn model(&self, model: &str) -> QueryResult<Arc<ModelSchema>> {
        self.models
            .read()
            .get(model)
            .cloned()
            .ok_or_else(|| QueryError::unknown_model(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn user() -> ModelSchema {
        ModelSchema::new("User", "users")
            .field(FieldSpec::new("id").id())
            .field(FieldSpec::new("email").column("email_address"))
            .relation(RelationSpec::one_to_many("posts", "Post").fields(["id"]).references(["authorId"]))
    }

    #[test]
    fn test_resolve_names() {
        let registry = SchemaRegistry::new().with_model(user());
        assert_eq!(registry.resolve_table_name("User").unwrap(), "users");
        assert_eq!(registry.resolve_field_name("User", "email").unwrap(), "email_address");
    }

    #[test]
    fn test_unknown_model_and_field() {
        let registry = SchemaRegistry::new().with_model(user());
        assert_eq!(registry.model("Nope").unwrap_err().code, ErrorCode::UnknownModel);
        assert_eq!(
            registry.resolve_field_name("User", "nope").unwrap_err().code,
            ErrorCode::UnknownField
        );
    }

    #[test]
    fn test_model_columns_alias() {
        let schema = user();
        let columns = schema.columns(Dialect::SQLite).with_alias("t0");
        assert_eq!(columns.column("email").unwrap(), "\"t0\".\"email_address\"");
        assert!(columns.column("posts").is_err());
    }

    #[test]
    fn test_primary_key_and_relations() {
        let schema = user();
        assert_eq!(schema.primary_key().len(), 1);
        assert!(schema.is_relation("posts"));
        assert!(!schema.is_relation("email"));
        assert!(schema.relation_for("email").is_err());
    }
}
