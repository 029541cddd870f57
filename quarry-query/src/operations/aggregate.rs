//! Aggregation and groupBy.
//!
//! The statement values handed to an [`Executor`](crate::traits::Executor)
//! have no notion of GROUP BY or HAVING, so this module renders SQL text
//! itself and runs it through `query_raw`. Every aggregate is selected under
//! an alias that encodes its kind (`amount_sum`, `_all_count`, ...), and
//! [`GroupBy::reshape`] folds the flat row back into nested documents:
//!
//! ```text
//! { "category": "A", "amount_sum": 30 }  ──▶  { "category": "A", "_sum": { "amount": 30 } }
//! ```
//!
//! The non-grouped `aggregate` operation is a [`GroupBy`] with an empty `by`
//! list, so both operations return the same shape.
//!
//! ```rust
//! use quarry_query::operations::GroupBy;
//! use quarry_query::schema::{FieldSpec, ModelSchema};
//! use quarry_query::sql::Dialect;
//! use serde_json::json;
//!
//! let schema = ModelSchema::new("Sale", "sales")
//!     .field(FieldSpec::new("id").id())
//!     .field(FieldSpec::new("category"))
//!     .field(FieldSpec::new("amount"));
//!
//! let options = json!({"by": ["category"], "_sum": {"amount": true}});
//! let group_by = GroupBy::from_options("Sale", options.as_object().unwrap()).unwrap();
//! let (sql, _) = group_by.build_sql(&schema, Dialect::SQLite).unwrap();
//! assert_eq!(
//!     sql,
//!     r#"SELECT "category" AS "category", SUM("amount") AS "amount_sum" FROM "sales" GROUP BY "category""#
//! );
//! ```

use serde_json::{Map, Value};
use tracing::debug;

use super::{Dispatcher, Operation};
use crate::document::{build_condition, kind_of, parse_order_by, parse_pagination};
use crate::error::{QueryError, QueryResult};
use crate::filter::{Filter, FilterValue};
use crate::pagination::Pagination;
use crate::schema::ModelSchema;
use crate::sql::{ColumnResolver, Dialect, SqlBuilder};
use crate::types::{OrderByField, Record, SortOrder};

/// Kind of aggregate function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateKind {
    /// `COUNT`
    Count,
    /// `SUM`
    Sum,
    /// `AVG`
    Avg,
    /// `MIN`
    Min,
    /// `MAX`
    Max,
}

impl AggregateKind {
    /// Every kind, in document key order.
    pub const ALL: [Self; 5] = [Self::Count, Self::Sum, Self::Avg, Self::Min, Self::Max];

    /// Option key, e.g. `_sum`.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Count => "_count",
            Self::Sum => "_sum",
            Self::Avg => "_avg",
            Self::Min => "_min",
            Self::Max => "_max",
        }
    }

    /// SQL function name.
    pub fn function(&self) -> &'static str {
        match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
        }
    }

    /// Alias suffix, e.g. `sum`.
    pub fn suffix(&self) -> &'static str {
        &self.key()[1..]
    }

    /// Parse an option key.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.key() == key)
    }
}

/// What an aggregate is computed over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateTarget {
    /// `_count: true`, reported as a plain number under `_count`.
    Rows,
    /// `_count: {_all: true}`, reported under `_count._all`.
    All,
    /// One field, reported under `_<kind>.<field>`.
    Field(String),
}

/// One aggregate expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateField {
    /// Function.
    pub kind: AggregateKind,
    /// Argument.
    pub target: AggregateTarget,
}

impl AggregateField {
    /// `COUNT(*)` reported as a plain number.
    pub fn count_rows() -> Self {
        Self {
            kind: AggregateKind::Count,
            target: AggregateTarget::Rows,
        }
    }

    /// `COUNT(*)` reported under `_count._all`.
    pub fn count_all() -> Self {
        Self {
            kind: AggregateKind::Count,
            target: AggregateTarget::All,
        }
    }

    /// `kind` applied to `field`.
    pub fn new(kind: AggregateKind, field: impl Into<String>) -> Self {
        Self {
            kind,
            target: AggregateTarget::Field(field.into()),
        }
    }

    fn for_key(kind: AggregateKind, field: &str) -> Self {
        if kind == AggregateKind::Count && field == "_all" {
            Self::count_all()
        } else {
            Self::new(kind, field)
        }
    }

    /// Column alias carrying the kind.
    pub fn alias(&self) -> String {
        match &self.target {
            AggregateTarget::Rows => "_count".to_string(),
            AggregateTarget::All => "_all_count".to_string(),
            AggregateTarget::Field(field) => format!("{}_{}", field, self.kind.suffix()),
        }
    }

    /// Render the expression.
    pub fn to_sql(&self, columns: &dyn ColumnResolver) -> QueryResult<String> {
        match &self.target {
            AggregateTarget::Rows | AggregateTarget::All => Ok("COUNT(*)".to_string()),
            AggregateTarget::Field(field) => {
                Ok(format!("{}({})", self.kind.function(), columns.column(field)?))
            }
        }
    }
}

/// Requested aggregates, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregationSpec {
    /// Aggregates to compute.
    pub fields: Vec<AggregateField>,
}

impl AggregationSpec {
    /// Read `_count`, `_sum`, `_avg`, `_min` and `_max` from an options map.
    pub fn parse(options: &Map<String, Value>) -> QueryResult<Self> {
        let mut fields = Vec::new();
        for (key, value) in options {
            let Some(kind) = AggregateKind::from_key(key) else {
                continue;
            };
            match value {
                Value::Bool(true) if kind == AggregateKind::Count => fields.push(AggregateField::count_rows()),
                Value::Bool(false) | Value::Null => {}
                Value::Object(selected) => {
                    for (field, enabled) in selected {
                        match enabled {
                            Value::Bool(true) => fields.push(AggregateField::for_key(kind, field)),
                            Value::Bool(false) | Value::Null => {}
                            other => {
                                return Err(QueryError::invalid_input(
                                    key,
                                    format!("`{}` expects a boolean, got {}", field, kind_of(other)),
                                )
                                .with_field(field));
                            }
                        }
                    }
                }
                other => {
                    return Err(QueryError::invalid_input(
                        key,
                        format!("expected an object of fields, got {}", kind_of(other)),
                    ));
                }
            }
        }
        Ok(Self { fields })
    }

    /// Whether no aggregate was requested.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Operators for HAVING conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HavingOp {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
}

impl HavingOp {
    /// Get the SQL operator string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }

    /// Parse a document operator name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "equals" => Some(Self::Eq),
            "not" => Some(Self::Ne),
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            _ => None,
        }
    }
}

/// A condition for the HAVING clause.
#[derive(Debug, Clone, PartialEq)]
pub struct HavingCondition {
    /// The aggregate to check.
    pub field: AggregateField,
    /// The comparison operator.
    pub op: HavingOp,
    /// The value to compare against.
    pub value: FilterValue,
}

impl HavingCondition {
    fn write_sql(&self, sql: &mut SqlBuilder, columns: &dyn ColumnResolver) -> QueryResult<()> {
        let expr = self.field.to_sql(columns)?;
        match (&self.value, self.op) {
            (FilterValue::Null, HavingOp::Eq) => {
                sql.push(format!("{} IS NULL", expr));
            }
            (FilterValue::Null, HavingOp::Ne) => {
                sql.push(format!("{} IS NOT NULL", expr));
            }
            (value, op) => {
                let placeholder = sql.bind(value.clone());
                sql.push(format!("{} {} {}", expr, op.as_str(), placeholder));
            }
        }
        Ok(())
    }
}

/// Parse a `having` document: `{_sum: {amount: {gt: 100}}, _count: {_all: {gte: 2}}}`.
pub fn parse_having(doc: &Value) -> QueryResult<Vec<HavingCondition>> {
    let map = doc.as_object().ok_or_else(|| {
        QueryError::invalid_filter(format!("having must be an object, got {}", kind_of(doc)))
    })?;

    let mut conditions = Vec::new();
    for (key, fields) in map {
        let kind = AggregateKind::from_key(key).ok_or_else(|| {
            QueryError::invalid_filter(format!(
                "having keys must be aggregates (_count, _sum, _avg, _min, _max), got `{}`",
                key
            ))
        })?;
        let fields = fields.as_object().ok_or_else(|| {
            QueryError::invalid_filter(format!("having.{} must be an object, got {}", key, kind_of(fields)))
        })?;
        for (field, ops) in fields {
            let ops = ops.as_object().ok_or_else(|| {
                QueryError::invalid_filter(format!(
                    "having.{}.{} must be an operator object, got {}",
                    key,
                    field,
                    kind_of(ops)
                ))
                .with_field(field)
            })?;
            for (op, literal) in ops {
                let op_kind = HavingOp::parse(op).ok_or_else(|| QueryError::unknown_operator(field, op))?;
                if literal.is_array() || literal.is_object() {
                    return Err(QueryError::invalid_filter(format!(
                        "having.{}.{}.{} expects a scalar, got {}",
                        key,
                        field,
                        op,
                        kind_of(literal)
                    ))
                    .with_field(field));
                }
                conditions.push(HavingCondition {
                    field: AggregateField::for_key(kind, field),
                    op: op_kind,
                    value: FilterValue::from_json(literal),
                });
            }
        }
    }
    Ok(conditions)
}

/// One ORDER BY entry of a grouped query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupOrder {
    /// A grouped field.
    Field(OrderByField),
    /// An aggregate result.
    Aggregate(AggregateField, SortOrder),
}

fn parse_group_order(doc: &Value, by: &[String]) -> QueryResult<Vec<GroupOrder>> {
    let entries: Vec<&Map<String, Value>> = match doc {
        Value::Object(map) => vec![map],
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_object().ok_or_else(|| {
                    QueryError::invalid_input("orderBy", format!("array entries must be objects, got {}", kind_of(item)))
                })
            })
            .collect::<QueryResult<_>>()?,
        other => {
            return Err(QueryError::invalid_input(
                "orderBy",
                format!("expected an object or an array, got {}", kind_of(other)),
            ));
        }
    };

    let mut out = Vec::new();
    for map in entries {
        for (key, value) in map {
            if let Some(kind) = AggregateKind::from_key(key) {
                match value {
                    Value::String(dir) if kind == AggregateKind::Count => {
                        out.push(GroupOrder::Aggregate(AggregateField::count_rows(), SortOrder::parse(dir)));
                    }
                    Value::Object(fields) => {
                        for (field, dir) in fields {
                            let dir = dir.as_str().ok_or_else(|| {
                                QueryError::invalid_input(
                                    "orderBy",
                                    format!("direction of `{}.{}` must be a string", key, field),
                                )
                            })?;
                            out.push(GroupOrder::Aggregate(
                                AggregateField::for_key(kind, field),
                                SortOrder::parse(dir),
                            ));
                        }
                    }
                    other => {
                        return Err(QueryError::invalid_input(
                            "orderBy",
                            format!("`{}` expects an object of fields, got {}", key, kind_of(other)),
                        ));
                    }
                }
                continue;
            }

            if !by.iter().any(|f| f == key) {
                return Err(QueryError::invalid_input(
                    "orderBy",
                    format!("`{}` must be listed in `by` to order a groupBy by it", key),
                )
                .with_field(key));
            }
            let mut single = Map::new();
            single.insert(key.clone(), value.clone());
            out.extend(parse_order_by(&Value::Object(single))?.into_iter().map(GroupOrder::Field));
        }
    }
    Ok(out)
}

fn parse_by(options: &Map<String, Value>) -> QueryResult<Vec<String>> {
    let by = match options.get("by") {
        None | Some(Value::Null) => return Err(QueryError::missing_option("groupBy", "by")),
        Some(Value::String(field)) => vec![field.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(str::to_string).ok_or_else(|| {
                    QueryError::invalid_input("by", format!("entries must be field names, got {}", kind_of(item)))
                })
            })
            .collect::<QueryResult<Vec<_>>>()?,
        Some(other) => {
            return Err(QueryError::invalid_input(
                "by",
                format!("expected a field name or an array, got {}", kind_of(other)),
            ));
        }
    };
    if by.is_empty() {
        return Err(QueryError::invalid_input("by", "must name at least one field").with_operation("groupBy"));
    }
    Ok(by)
}

/// A parsed `groupBy` (or, with empty `by`, `aggregate`) request.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupBy {
    /// Model to aggregate.
    pub model: String,
    /// Grouping fields.
    pub by: Vec<String>,
    /// Aggregates to compute.
    pub aggregates: AggregationSpec,
    /// Row filter applied before grouping.
    pub filter: Filter,
    /// Group filter.
    pub having: Vec<HavingCondition>,
    /// Group ordering.
    pub order_by: Vec<GroupOrder>,
    /// Group window.
    pub pagination: Pagination,
}

impl GroupBy {
    /// Decode a `groupBy` options map. Everything is validated here, before
    /// any SQL exists.
    pub fn from_options(model: impl Into<String>, options: &Map<String, Value>) -> QueryResult<Self> {
        let by = parse_by(options)?;
        let filter = match options.get("where") {
            Some(doc) => build_condition(doc)?,
            None => Filter::None,
        };
        let having = match options.get("having") {
            Some(doc) => parse_having(doc)?,
            None => Vec::new(),
        };
        let order_by = match options.get("orderBy") {
            Some(doc) => parse_group_order(doc, &by)?,
            None => Vec::new(),
        };
        let pagination = parse_pagination(options)?;
        pagination.validate()?;

        Ok(Self {
            model: model.into(),
            aggregates: AggregationSpec::parse(options)?,
            by,
            filter,
            having,
            order_by,
            pagination,
        })
    }

    /// Decode an `aggregate` options map: no grouping, at least one aggregate.
    pub fn aggregate(model: impl Into<String>, options: &Map<String, Value>) -> QueryResult<Self> {
        let aggregates = AggregationSpec::parse(options)?;
        if aggregates.is_empty() {
            return Err(QueryError::invalid_request(
                "aggregate requires at least one of _count, _sum, _avg, _min, _max",
            )
            .with_operation("aggregate"));
        }
        let filter = match options.get("where") {
            Some(doc) => build_condition(doc)?,
            None => Filter::None,
        };
        Ok(Self {
            model: model.into(),
            by: Vec::new(),
            aggregates,
            filter,
            having: Vec::new(),
            order_by: Vec::new(),
            pagination: Pagination::default(),
        })
    }

    /// Render the statement.
    pub fn build_sql(&self, schema: &ModelSchema, dialect: Dialect) -> QueryResult<(String, Vec<FilterValue>)> {
        let columns = schema.columns(dialect);

        let mut select = Vec::with_capacity(self.by.len() + self.aggregates.fields.len());
        let mut group = Vec::with_capacity(self.by.len());
        for field in &self.by {
            let column = columns.column(field)?;
            select.push(format!("{} AS {}", column, dialect.quote_identifier(field)));
            group.push(column);
        }
        for aggregate in &self.aggregates.fields {
            select.push(format!(
                "{} AS {}",
                aggregate.to_sql(&columns)?,
                dialect.quote_identifier(&aggregate.alias())
            ));
        }
        if select.is_empty() {
            return Err(QueryError::invalid_request("nothing to select: no `by` fields and no aggregates"));
        }

        let mut sql = SqlBuilder::new(dialect);
        sql.push("SELECT ").push(select.join(", ")).push(" FROM ").push_identifier(&schema.table);

        if !self.filter.is_none() {
            sql.push(" WHERE ");
            self.filter.write_sql(&mut sql, &columns)?;
        }
        if !group.is_empty() {
            sql.push(" GROUP BY ").push(group.join(", "));
        }
        if !self.having.is_empty() {
            sql.push(" HAVING ");
            for (i, condition) in self.having.iter().enumerate() {
                if i > 0 {
                    sql.push(" AND ");
                }
                condition.write_sql(&mut sql, &columns)?;
            }
        }
        if !self.order_by.is_empty() {
            let parts = self
                .order_by
                .iter()
                .map(|order| match order {
                    GroupOrder::Field(field) => field.to_sql(&columns, dialect),
                    GroupOrder::Aggregate(aggregate, dir) => {
                        Ok(format!("{} {}", aggregate.to_sql(&columns)?, dir.as_sql()))
                    }
                })
                .collect::<QueryResult<Vec<_>>>()?;
            sql.push(" ORDER BY ").push(parts.join(", "));
        }
        sql.push(self.pagination.to_sql(dialect));

        Ok(sql.build())
    }

    /// Fold aliased aggregate columns into nested per-kind documents.
    pub fn reshape(&self, mut row: Record) -> Record {
        let mut out = Record::new();
        for field in &self.by {
            out.insert(field.clone(), row.remove(field).unwrap_or(Value::Null));
        }
        for aggregate in &self.aggregates.fields {
            let value = row.remove(&aggregate.alias()).unwrap_or(Value::Null);
            let (key, inner) = match &aggregate.target {
                AggregateTarget::Rows => {
                    out.insert(aggregate.kind.key().to_string(), value);
                    continue;
                }
                AggregateTarget::All => (aggregate.kind.key(), "_all"),
                AggregateTarget::Field(field) => (aggregate.kind.key(), field.as_str()),
            };
            let slot = out
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(nested) = slot {
                nested.insert(inner.to_string(), value);
            }
        }
        out
    }
}

impl Dispatcher<'_> {
    pub(super) async fn aggregate(&self, schema: &ModelSchema, options: &Map<String, Value>) -> QueryResult<Value> {
        let request = GroupBy::aggregate(&schema.name, options)?;
        let (sql, params) = request.build_sql(schema, self.executor.capabilities().dialect)?;
        debug!(model = %schema.name, sql = %sql, "aggregate");

        let row = self
            .executor
            .query_raw(&sql, &params)
            .await
            .map_err(|e| e.with_operation(Operation::Aggregate.as_str()))?
            .into_iter()
            .next()
            .unwrap_or_default();
        Ok(Value::Object(self.converter.coerce_aggregate_result(request.reshape(row))))
    }

    pub(super) async fn group_by(&self, schema: &ModelSchema, options: &Map<String, Value>) -> QueryResult<Value> {
        let request = GroupBy::from_options(&schema.name, options)?;
        let (sql, params) = request.build_sql(schema, self.executor.capabilities().dialect)?;
        debug!(model = %schema.name, sql = %sql, params = params.len(), "groupBy");

        let rows = self
            .executor
            .query_raw(&sql, &params)
            .await
            .map_err(|e| e.with_operation(Operation::GroupBy.as_str()))?;
        Ok(Value::Array(
            rows.into_iter()
                .map(|row| Value::Object(self.converter.coerce_aggregate_result(request.reshape(row))))
                .collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::schema::FieldSpec;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sales() -> ModelSchema {
        ModelSchema::new("Sale", "sales")
            .field(FieldSpec::new("id").id())
            .field(FieldSpec::new("category").column("category_name"))
            .field(FieldSpec::new("amount"))
            .field(FieldSpec::new("region"))
    }

    fn options(doc: Value) -> Map<String, Value> {
        doc.as_object().cloned().unwrap()
    }

    #[test]
    fn test_aggregate_spec_parsing() {
        let spec = AggregationSpec::parse(&options(json!({
            "_count": true,
            "_sum": {"amount": true, "region": false},
            "_max": {"amount": true}
        })))
        .unwrap();
        assert_eq!(
            spec.fields,
            vec![
                AggregateField::count_rows(),
                AggregateField::new(AggregateKind::Sum, "amount"),
                AggregateField::new(AggregateKind::Max, "amount"),
            ]
        );
        assert!(AggregationSpec::parse(&options(json!({"_sum": true}))).is_err());
        assert!(AggregationSpec::parse(&options(json!({"_avg": {"amount": 1}}))).is_err());
    }

    #[test]
    fn test_aliases() {
        assert_eq!(AggregateField::count_rows().alias(), "_count");
        assert_eq!(AggregateField::count_all().alias(), "_all_count");
        assert_eq!(AggregateField::new(AggregateKind::Avg, "price").alias(), "price_avg");
    }

    #[test]
    fn test_group_by_full_sql() {
        let request = GroupBy::from_options(
            "Sale",
            &options(json!({
                "by": ["category", "region"],
                "where": {"region": {"not": "north"}, "amount": {"gt": 0}},
                "_count": {"_all": true},
                "_sum": {"amount": true},
                "having": {"_sum": {"amount": {"gt": 100}}, "_count": {"_all": {"gte": 2}}},
                "orderBy": [{"_sum": {"amount": "desc"}}, {"category": "asc"}],
                "take": 10,
                "skip": 5
            })),
        )
        .unwrap();

        let (sql, params) = request.build_sql(&sales(), Dialect::PostgreSQL).unwrap();
        assert_eq!(
            sql,
            concat!(
                r#"SELECT "category_name" AS "category", "region" AS "region", "#,
                r#"COUNT(*) AS "_all_count", SUM("amount") AS "amount_sum" FROM "sales" "#,
                r#"WHERE ("region" <> $1 AND "amount" > $2) "#,
                r#"GROUP BY "category_name", "region" "#,
                r#"HAVING SUM("amount") > $3 AND COUNT(*) >= $4 "#,
                r#"ORDER BY SUM("amount") DESC, "category_name" ASC LIMIT 10 OFFSET 5"#
            )
        );
        assert_eq!(
            params,
            vec![
                FilterValue::String("north".into()),
                FilterValue::Int(0),
                FilterValue::Int(100),
                FilterValue::Int(2),
            ]
        );
    }

    #[test]
    fn test_group_by_rejects_bad_requests_before_sql() {
        let err = GroupBy::from_options("Sale", &options(json!({"by": []}))).unwrap_err();
        assert!(err.is_request_error());

        let err = GroupBy::from_options("Sale", &options(json!({}))).unwrap_err();
        assert_eq!(err.code, ErrorCode::RequiredFieldMissing);

        let err = GroupBy::from_options("Sale", &options(json!({"by": "category", "take": -1}))).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidParameter);

        let err = GroupBy::from_options(
            "Sale",
            &options(json!({"by": "category", "orderBy": {"region": "asc"}})),
        )
        .unwrap_err();
        assert!(err.message.contains("region"));

        let err = GroupBy::from_options(
            "Sale",
            &options(json!({"by": "category", "having": {"_sum": {"amount": {"near": 3}}}})),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidFilter);

        assert!(GroupBy::from_options("Sale", &options(json!({"by": "category", "having": {"amount": {}}}))).is_err());
    }

    #[test]
    fn test_unknown_group_field_fails_at_render() {
        let request = GroupBy::from_options("Sale", &options(json!({"by": "color"}))).unwrap();
        let err = request.build_sql(&sales(), Dialect::SQLite).unwrap_err();
        assert_eq!(err.code, ErrorCode::UnknownField);
    }

    #[test]
    fn test_aggregate_without_group() {
        let request = GroupBy::aggregate(
            "Sale",
            &options(json!({"_avg": {"amount": true}, "where": {"region": "east"}})),
        )
        .unwrap();
        let (sql, params) = request.build_sql(&sales(), Dialect::SQLite).unwrap();
        assert_eq!(
            sql,
            r#"SELECT AVG("amount") AS "amount_avg" FROM "sales" WHERE "region" = ?"#
        );
        assert_eq!(params, vec![FilterValue::String("east".into())]);

        assert!(GroupBy::aggregate("Sale", &options(json!({"where": {}}))).is_err());
    }

    #[test]
    fn test_reshape() {
        let request = GroupBy::from_options(
            "Sale",
            &options(json!({
                "by": ["category"],
                "_count": {"_all": true, "amount": true},
                "_sum": {"amount": true},
                "_min": {"amount": true}
            })),
        )
        .unwrap();

        let row = options(json!({
            "category": "books",
            "_all_count": 3,
            "amount_count": 2,
            "amount_sum": 1450,
            "amount_min": 200
        }));
        assert_eq!(
            Value::Object(request.reshape(row)),
            json!({
                "category": "books",
                "_count": {"_all": 3, "amount": 2},
                "_sum": {"amount": 1450},
                "_min": {"amount": 200}
            })
        );
    }

    #[test]
    fn test_count_rows_reshapes_to_scalar() {
        let request = GroupBy::aggregate("Sale", &options(json!({"_count": true}))).unwrap();
        let row = options(json!({"_count": 3}));
        assert_eq!(Value::Object(request.reshape(row)), json!({"_count": 3}));
    }

    #[test]
    fn test_having_null_comparison() {
        let request = GroupBy::from_options(
            "Sale",
            &options(json!({"by": "category", "having": {"_max": {"region": {"not": null}}}})),
        )
        .unwrap();
        let (sql, params) = request.build_sql(&sales(), Dialect::SQLite).unwrap();
        assert!(sql.ends_with(r#"HAVING MAX("region") IS NOT NULL"#));
        assert!(params.is_empty());
    }
}
