//! Relational backend on SQLite.
//!
//! One table per registered model, created on open from the model schemas.
//! Conditions, filters, sorting, and limits compile to SQL wherever SQLite
//! can express them; list-column predicates and cross-model composition run
//! over the fetched rows instead, so the observable semantics stay identical
//! to the other adapters. Fuzzy string filtering goes through a registered
//! case-insensitive `REGEXP` function.

mod migrations;
mod sql;

use std::path::Path;
use std::sync::Arc;

use regex::RegexBuilder;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Connection;
use tracing::info;

use crate::backends::memory::fuzzy_value_matches;
use crate::backends::{execute_query, sort_records, BackendKind, DataBackend};
use crate::error::{BackendError, RepositoryError, RepositoryResult};
use crate::model::{
    AttributeValue, EntityId, FieldKind, Record, Schema, SchemaRegistry, ID_ATTRIBUTE,
};
use crate::query::{Comparison, Condition, Criteria, ModelSelector, Query};

use sql::Predicate;

/// SQLite backend over a single synchronous connection.
#[derive(Debug)]
pub struct SqliteBackend {
    connection: Option<Connection>,
    registry: Arc<SchemaRegistry>,
    target: String,
}

impl SqliteBackend {
    /// Opens (or creates) the database file and the model tables.
    ///
    /// # Errors
    ///
    /// [`RepositoryError::Connection`] when the database cannot be opened.
    ///
    /// [`RepositoryError::Connection`]: crate::error::RepositoryError::Connection
    pub fn open(path: impl AsRef<Path>, registry: Arc<SchemaRegistry>) -> RepositoryResult<Self> {
        let target = path.as_ref().display().to_string();
        let connection =
            Connection::open(path.as_ref()).map_err(|e| RepositoryError::Connection {
                backend: "relational",
                target: target.clone(),
                message: e.to_string(),
            })?;
        Self::from_connection(connection, registry, target)
    }

    /// Opens a private in-memory database, mainly for tests.
    pub fn in_memory(registry: Arc<SchemaRegistry>) -> RepositoryResult<Self> {
        let connection = Connection::open_in_memory().map_err(|e| RepositoryError::Connection {
            backend: "relational",
            target: ":memory:".to_string(),
            message: e.to_string(),
        })?;
        Self::from_connection(connection, registry, ":memory:".to_string())
    }

    fn from_connection(
        connection: Connection,
        registry: Arc<SchemaRegistry>,
        target: String,
    ) -> RepositoryResult<Self> {
        register_regexp(&connection)?;
        for schema in registry.schemas() {
            connection.execute(&sql::create_table(schema), [])?;
        }
        info!(target = %target, models = registry.model_names().len(), "opened sqlite database");
        Ok(Self {
            connection: Some(connection),
            registry,
            target,
        })
    }

    /// The database this backend talks to.
    pub fn target(&self) -> &str {
        &self.target
    }

    fn connection(&self) -> RepositoryResult<&Connection> {
        self.connection.as_ref().ok_or_else(|| {
            BackendError::Closed {
                backend: "relational",
            }
            .into()
        })
    }

    fn schema_for(&self, model: &str) -> RepositoryResult<Arc<Schema>> {
        self.registry.get(model).ok_or_else(|| {
            BackendError::UnknownModel {
                model: model.to_string(),
            }
            .into()
        })
    }

    fn selected_models(&self, models: &ModelSelector) -> Vec<String> {
        match models {
            ModelSelector::All => self.registry.model_names(),
            ModelSelector::Models(names) => names.clone(),
        }
    }

    fn fetch(
        &self,
        schema: &Arc<Schema>,
        clause: &str,
        params: Vec<SqlValue>,
        suffix: &str,
    ) -> RepositoryResult<Vec<Record>> {
        let connection = self.connection()?;
        let statement_sql = format!(
            "SELECT {} FROM {}{}{}",
            sql::select_columns(schema),
            sql::quote(schema.model_name()),
            clause,
            suffix
        );
        let mut statement = connection.prepare(&statement_sql)?;
        let mut rows = statement.query(rusqlite::params_from_iter(params))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(row_to_record(schema, row)?);
        }
        Ok(records)
    }

    /// Splits a condition group into SQL predicates and the conditions that
    /// must run over fetched rows. `None` means the group can never match
    /// this model because it names an undeclared attribute.
    fn partition_conditions(
        schema: &Schema,
        conditions: &[Condition],
    ) -> Option<(Vec<Predicate>, Vec<Condition>)> {
        let mut predicates = Vec::new();
        let mut residual = Vec::new();
        for condition in conditions {
            if condition.attribute == ID_ATTRIBUTE {
                predicates.push(sql::condition_predicate(condition));
                continue;
            }
            match schema.field(&condition.attribute) {
                None => return None,
                Some(field) if matches!(field.kind, FieldKind::List(_)) => {
                    residual.push(condition.clone());
                }
                Some(_) => predicates.push(sql::condition_predicate(condition)),
            }
        }
        Some((predicates, residual))
    }

    fn fetch_conditions(
        &self,
        schema: &Arc<Schema>,
        conditions: &[Condition],
    ) -> RepositoryResult<Vec<Record>> {
        let Some((predicates, residual)) = Self::partition_conditions(schema, conditions) else {
            return Ok(Vec::new());
        };
        let (clause, params) = sql::where_clause(&predicates);
        let mut records = self.fetch(schema, &clause, params, "")?;
        if !residual.is_empty() {
            records.retain(|record| {
                residual.iter().all(|condition| {
                    match record.get(&condition.attribute) {
                        Some(candidate) => {
                            condition.operator.evaluate(&candidate, &condition.value)
                        }
                        None => false,
                    }
                })
            });
        }
        Ok(records)
    }

    /// A query compiles to a single statement when it targets one model, has
    /// no composition, and every referenced attribute lives in a SQL-typed
    /// column.
    fn single_statement(&self, query: &Query, models: &ModelSelector) -> Option<Arc<Schema>> {
        if !query.compositions().is_empty() {
            return None;
        }
        let selector = query.models().resolve(models);
        let schema = self.registry.get(selector.single()?)?;
        let (_, residual) = Self::partition_conditions(&schema, query.conditions())?;
        if !residual.is_empty() {
            return None;
        }
        let sortable = query.sort_keys().iter().all(|key| {
            key.attribute == ID_ATTRIBUTE || schema.field(&key.attribute).is_some()
        });
        sortable.then_some(schema)
    }
}

impl DataBackend for SqliteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Relational
    }

    fn name(&self) -> &'static str {
        "relational"
    }

    fn add(&mut self, record: &Record) -> RepositoryResult<()> {
        let schema = self.schema_for(record.model_name())?;
        let mut params = vec![sql::id_to_sql_value(record.id())];
        for field in schema.fields() {
            let value = record.get(&field.name).unwrap_or(AttributeValue::Null);
            params.push(sql::to_sql_value(&value));
        }
        self.connection()?
            .execute(&sql::upsert(&schema), rusqlite::params_from_iter(params))?;
        Ok(())
    }

    fn delete(&mut self, model: &str, id: &EntityId) -> RepositoryResult<()> {
        let schema = self.schema_for(model)?;
        let table = sql::quote(schema.model_name());
        let deleted = self.connection()?.execute(
            &format!("DELETE FROM {} WHERE {} = ?1", table, sql::quote(sql::ID_COLUMN)),
            rusqlite::params![sql::id_to_sql_value(id)],
        )?;
        if deleted == 0 {
            return Err(RepositoryError::not_found(model, ID_ATTRIBUTE, id));
        }
        Ok(())
    }

    fn get(
        &mut self,
        model: &str,
        attribute: &str,
        value: &AttributeValue,
    ) -> RepositoryResult<Vec<Record>> {
        let schema = self.schema_for(model)?;
        let condition = Condition {
            attribute: attribute.to_string(),
            operator: Comparison::Equal,
            value: value.clone(),
        };
        let mut records = self.fetch_conditions(&schema, std::slice::from_ref(&condition))?;
        sort_records(&mut records, &[]);
        Ok(records)
    }

    fn all(&mut self, models: &ModelSelector) -> RepositoryResult<Vec<Record>> {
        let mut records = Vec::new();
        for model in self.selected_models(models) {
            let schema = self.schema_for(&model)?;
            records.extend(self.fetch(&schema, "", Vec::new(), "")?);
        }
        sort_records(&mut records, &[]);
        Ok(records)
    }

    fn search(
        &mut self,
        criteria: &Criteria,
        models: &ModelSelector,
    ) -> RepositoryResult<Vec<Record>> {
        criteria.validate()?;
        match criteria {
            Criteria::Filter(filter) => {
                let mut results = Vec::new();
                'models: for model in self.selected_models(models) {
                    let schema = self.schema_for(&model)?;
                    let mut predicates = Vec::new();
                    let mut residual: Vec<(&String, &AttributeValue)> = Vec::new();
                    for (attribute, value) in filter.iter() {
                        if attribute == ID_ATTRIBUTE {
                            predicates.push(sql::filter_predicate(attribute, value));
                            continue;
                        }
                        match schema.field(attribute) {
                            None => continue 'models,
                            Some(field) if matches!(field.kind, FieldKind::List(_)) => {
                                residual.push((attribute, value));
                            }
                            Some(_) => predicates.push(sql::filter_predicate(attribute, value)),
                        }
                    }
                    let (clause, params) = sql::where_clause(&predicates);
                    let mut records = self.fetch(&schema, &clause, params, "")?;
                    if !residual.is_empty() {
                        records.retain(|record| {
                            residual.iter().all(|(attribute, expected)| {
                                match record.get(attribute) {
                                    Some(candidate) => fuzzy_value_matches(&candidate, expected),
                                    None => false,
                                }
                            })
                        });
                    }
                    results.extend(records);
                }
                sort_records(&mut results, &[]);
                Ok(results)
            }
            Criteria::Query(query) => {
                if let Some(schema) = self.single_statement(query, models) {
                    let (predicates, _) =
                        Self::partition_conditions(&schema, query.conditions())
                            .unwrap_or_default();
                    let (clause, params) = sql::where_clause(&predicates);
                    let mut suffix = sql::order_by(query.sort_keys());
                    if let Some(limit) = query.limit_count() {
                        suffix.push_str(&format!(" LIMIT {}", limit));
                    }
                    return self.fetch(&schema, &clause, params, &suffix);
                }

                execute_query(query, &mut |selector: &ModelSelector,
                                           conditions: &[Condition]| {
                    let mut records = Vec::new();
                    for model in self.selected_models(&selector.resolve(models)) {
                        let schema = self.schema_for(&model)?;
                        records.extend(self.fetch_conditions(&schema, conditions)?);
                    }
                    Ok(records)
                })
            }
        }
    }

    fn apply_migrations(&mut self, directory: &Path) -> RepositoryResult<()> {
        migrations::apply(self.connection()?, directory)
    }

    fn empty(&mut self) -> RepositoryResult<()> {
        let connection = self.connection()?;
        for schema in self.registry.schemas() {
            connection.execute(
                &format!("DELETE FROM {}", sql::quote(schema.model_name())),
                [],
            )?;
        }
        Ok(())
    }

    fn close(&mut self) -> RepositoryResult<()> {
        if let Some(connection) = self.connection.take() {
            connection
                .close()
                .map_err(|(_, e)| BackendError::Sql(e))?;
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.connection.is_none()
    }
}

/// Registers the case-insensitive `REGEXP` function SQLite itself lacks.
fn register_regexp(connection: &Connection) -> rusqlite::Result<()> {
    connection.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let pattern: String = ctx.get(0)?;
            let text: Option<String> = ctx.get(1)?;
            let matched = match text {
                Some(text) => match RegexBuilder::new(&pattern).case_insensitive(true).build() {
                    Ok(regex) => regex.is_match(&text),
                    // Not a valid pattern: fall back to a plain substring match.
                    Err(_) => text.to_lowercase().contains(&pattern.to_lowercase()),
                },
                None => false,
            };
            Ok(matched)
        },
    )
}

fn row_to_record(schema: &Arc<Schema>, row: &rusqlite::Row<'_>) -> RepositoryResult<Record> {
    let id = match row.get_ref(0)? {
        ValueRef::Integer(n) => EntityId::Int(n),
        ValueRef::Text(text) => EntityId::Str(String::from_utf8_lossy(text).into_owned()),
        other => {
            return Err(BackendError::Serialization {
                backend: "relational",
                message: format!("unsupported id storage class {}", other.data_type()),
            }
            .into())
        }
    };
    let mut object = serde_json::Map::new();
    for (index, field) in schema.fields().iter().enumerate() {
        let value = column_to_json(row.get_ref(index + 1)?, &field.kind)?;
        object.insert(field.name.clone(), value);
    }
    Record::from_json(schema.clone(), id, &object)
}

fn column_to_json(value: ValueRef<'_>, kind: &FieldKind) -> RepositoryResult<serde_json::Value> {
    match value {
        ValueRef::Null => Ok(serde_json::Value::Null),
        ValueRef::Integer(n) => Ok(match kind {
            FieldKind::Bool => serde_json::Value::Bool(n != 0),
            _ => serde_json::Value::from(n),
        }),
        ValueRef::Real(f) => Ok(serde_json::Value::from(f)),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes).into_owned();
            match kind {
                FieldKind::List(_) => {
                    serde_json::from_str(&text).map_err(|e| {
                        BackendError::Serialization {
                            backend: "relational",
                            message: format!("invalid stored list: {}", e),
                        }
                        .into()
                    })
                }
                _ => Ok(serde_json::Value::String(text)),
            }
        }
        ValueRef::Blob(_) => Err(BackendError::Serialization {
            backend: "relational",
            message: "blob columns are not supported".to_string(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::model::Model;
    use crate::query::Filter;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Article {
        id_: EntityId,
        title: String,
        score: i64,
        tags: Vec<String>,
        published_at: Option<chrono::DateTime<chrono::Utc>>,
    }

    impl Model for Article {
        const MODEL_NAME: &'static str = "article";

        fn schema() -> Schema {
            Schema::builder("article")
                .field("title", FieldKind::Str)
                .field("score", FieldKind::Int)
                .field("tags", FieldKind::List(Box::new(FieldKind::Str)))
                .optional_field("published_at", FieldKind::DateTime)
                .build()
        }

        fn id(&self) -> EntityId {
            self.id_.clone()
        }

        fn set_id(&mut self, id: EntityId) {
            self.id_ = id;
        }
    }

    fn registry() -> Arc<SchemaRegistry> {
        Arc::new(SchemaRegistry::new().register::<Article>())
    }

    fn article(id: i64, title: &str, score: i64, tags: &[&str]) -> Record {
        Record::from_model(&Article {
            id_: EntityId::Int(id),
            title: title.to_string(),
            score,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            published_at: None,
        })
        .unwrap()
    }

    fn populated() -> SqliteBackend {
        let mut backend = SqliteBackend::in_memory(registry()).unwrap();
        backend.add(&article(1, "Intro to storage", 10, &["storage"])).unwrap();
        backend.add(&article(2, "Advanced indexing", 30, &["storage", "perf"])).unwrap();
        backend.add(&article(3, "Release notes", 20, &[])).unwrap();
        backend
    }

    #[test]
    fn test_round_trip_preserves_attribute_kinds() {
        let mut backend = SqliteBackend::in_memory(registry()).unwrap();
        let published = chrono::Utc::now();
        backend
            .add(
                &Record::from_model(&Article {
                    id_: EntityId::Int(1),
                    title: "Typed columns".to_string(),
                    score: 5,
                    tags: vec!["a".to_string(), "b".to_string()],
                    published_at: Some(published),
                })
                .unwrap(),
            )
            .unwrap();

        let all = backend.all(&ModelSelector::one::<Article>()).unwrap();
        assert_eq!(all.len(), 1);
        let back: Article = all[0].into_model().unwrap();
        assert_eq!(back.score, 5);
        assert_eq!(back.tags, vec!["a".to_string(), "b".to_string()]);
        // Microsecond precision survives the TEXT column.
        assert_eq!(
            back.published_at.map(|d| d.timestamp_micros()),
            Some(published.timestamp_micros())
        );
    }

    #[test]
    fn test_add_upserts_on_the_primary_key() {
        let mut backend = populated();
        backend.add(&article(1, "Intro, revised", 11, &["storage"])).unwrap();
        let records = backend
            .get("article", ID_ATTRIBUTE, &AttributeValue::Int(1))
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].get("title"),
            Some(AttributeValue::Str("Intro, revised".into()))
        );
    }

    #[test]
    fn test_delete_missing_row_fails() {
        let mut backend = populated();
        backend.delete("article", &EntityId::Int(3)).unwrap();
        let error = backend.delete("article", &EntityId::Int(3)).unwrap_err();
        assert!(error.is_not_found());
    }

    #[test]
    fn test_filter_uses_the_regexp_function() {
        let mut backend = populated();
        let criteria = Criteria::from(Filter::new().with("title", "^advanced"));
        let records = backend
            .search(&criteria, &ModelSelector::one::<Article>())
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id(), &EntityId::Int(2));
    }

    #[test]
    fn test_list_predicates_run_over_fetched_rows() {
        let mut backend = populated();
        let criteria = Criteria::from(Filter::new().with("tags", "perf"));
        let records = backend
            .search(&criteria, &ModelSelector::one::<Article>())
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id(), &EntityId::Int(2));
    }

    #[test]
    fn test_query_sort_and_limit_compile_to_sql() {
        let mut backend = populated();
        let query = Query::model::<Article>().sort("score", true).limit(2);
        let records = backend
            .search(&Criteria::from(query), &ModelSelector::one::<Article>())
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id(), &EntityId::Int(2));
        assert_eq!(records[1].id(), &EntityId::Int(3));
    }

    #[test]
    fn test_unknown_model_is_an_error() {
        let mut backend = populated();
        let error = backend
            .get("reader", "name", &AttributeValue::Str("x".into()))
            .unwrap_err();
        assert!(matches!(
            error,
            RepositoryError::Backend(BackendError::UnknownModel { .. })
        ));
    }

    #[test]
    fn test_migrations_apply_once_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("0001_extra.sql"),
            "CREATE TABLE \"extra\" (\"id\" INTEGER PRIMARY KEY);",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("0002_seed.sql"),
            "INSERT INTO \"extra\" (\"id\") VALUES (1);",
        )
        .unwrap();

        let mut backend = SqliteBackend::in_memory(registry()).unwrap();
        backend.apply_migrations(dir.path()).unwrap();
        // Rerunning must not re-execute the scripts.
        backend.apply_migrations(dir.path()).unwrap();

        let count: i64 = backend
            .connection()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM \"extra\"", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_closed_backend_rejects_operations() {
        let mut backend = populated();
        backend.close().unwrap();
        assert!(backend.is_closed());
        let error = backend.all(&ModelSelector::All).unwrap_err();
        assert!(matches!(
            error,
            RepositoryError::Backend(BackendError::Closed { .. })
        ));
    }
}
