//! Relation specification types.

/// Type of relation between models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationType {
    /// One-to-one relation (e.g., User has one Profile).
    OneToOne,
    /// One-to-many relation (e.g., User has many Posts).
    OneToMany,
    /// Many-to-one relation (e.g., Post belongs to User).
    ManyToOne,
}

impl RelationType {
    /// Check if this relation returns multiple records.
    pub fn is_many(&self) -> bool {
        matches!(self, Self::OneToMany)
    }

    /// Check if this relation returns a single record.
    pub fn is_one(&self) -> bool {
        matches!(self, Self::OneToOne | Self::ManyToOne)
    }
}

/// Specification for a relation between models.
///
/// `fields` are the joining fields on the owning model and `references` the
/// matching fields on the related model, regardless of which side stores the
/// foreign key. `User.posts` is `fields = ["id"]`, `references = ["authorId"]`;
/// `Post.author` is the mirror image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationSpec {
    /// Name of the relation (field name).
    pub name: String,
    /// Type of relation.
    pub relation_type: RelationType,
    /// Name of the related model.
    pub related_model: String,
    /// Joining fields on this model.
    pub fields: Vec<String>,
    /// Joining fields on the related model.
    pub references: Vec<String>,
}

impl RelationSpec {
    fn new(name: impl Into<String>, relation_type: RelationType, related_model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            relation_type,
            related_model: related_model.into(),
            fields: Vec::new(),
            references: Vec::new(),
        }
    }

    /// Create a one-to-one relation spec.
    pub fn one_to_one(name: impl Into<String>, related_model: impl Into<String>) -> Self {
        Self::new(name, RelationType::OneToOne, related_model)
    }

    /// Create a one-to-many relation spec.
    pub fn one_to_many(name: impl Into<String>, related_model: impl Into<String>) -> Self {
        Self::new(name, RelationType::OneToMany, related_model)
    }

    /// Create a many-to-one relation spec.
    pub fn many_to_one(name: impl Into<String>, related_model: impl Into<String>) -> Self {
        Self::new(name, RelationType::ManyToOne, related_model)
    }

    /// Set the joining fields on this model.
    pub fn fields(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Set the joining fields on the related model.
    pub fn references(mut self, refs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.references = refs.into_iter().map(Into::into).collect();
        self
    }

    /// Pairs of (local field, related field).
    pub fn join_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .zip(self.references.iter())
            .map(|(f, r)| (f.as_str(), r.as_str()))
    }
}
