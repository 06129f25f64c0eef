//! SQL statement compilation for the relational backend.
//!
//! Every statement is built from the model schema: one table per model,
//! named after the model, with an `id` column plus one column per declared
//! attribute. All values travel as bound parameters; identifiers are always
//! double-quoted.

use chrono::SecondsFormat;
use rusqlite::types::Value as SqlValue;

use crate::model::{AttributeValue, EntityId, FieldKind, IdKind, Schema};
use crate::query::{Comparison, Condition, SortKey};
use crate::model::ID_ATTRIBUTE;

/// Identity column of every model table.
pub(crate) const ID_COLUMN: &str = "id";

/// Quotes an identifier for direct interpolation.
pub(crate) fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// The column a record attribute maps to.
pub(crate) fn column_for(attribute: &str) -> &str {
    if attribute == ID_ATTRIBUTE {
        ID_COLUMN
    } else {
        attribute
    }
}

fn column_type(kind: &FieldKind) -> &'static str {
    match kind {
        FieldKind::Bool | FieldKind::Int => "INTEGER",
        FieldKind::Float => "REAL",
        FieldKind::Str | FieldKind::DateTime => "TEXT",
        // Lists are stored as their JSON text.
        FieldKind::List(_) => "TEXT",
    }
}

/// `CREATE TABLE IF NOT EXISTS` for a model schema.
pub(crate) fn create_table(schema: &Schema) -> String {
    let id_type = match schema.id_kind() {
        IdKind::Int => "INTEGER",
        IdKind::Str => "TEXT",
    };
    let mut columns = vec![format!("{} {} PRIMARY KEY", quote(ID_COLUMN), id_type)];
    for field in schema.fields() {
        let not_null = if field.required { " NOT NULL" } else { "" };
        columns.push(format!(
            "{} {}{}",
            quote(&field.name),
            column_type(&field.kind),
            not_null
        ));
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote(schema.model_name()),
        columns.join(", ")
    )
}

/// Upsert statement for a model schema: insert, or overwrite every attribute
/// column when the id already exists.
pub(crate) fn upsert(schema: &Schema) -> String {
    let mut columns = vec![quote(ID_COLUMN)];
    columns.extend(schema.fields().iter().map(|field| quote(&field.name)));
    let placeholders: Vec<String> = (1..=columns.len()).map(|n| format!("?{}", n)).collect();
    let assignments: Vec<String> = schema
        .fields()
        .iter()
        .map(|field| format!("{col} = excluded.{col}", col = quote(&field.name)))
        .collect();
    if assignments.is_empty() {
        return format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) DO NOTHING",
            quote(schema.model_name()),
            columns.join(", "),
            placeholders.join(", "),
            quote(ID_COLUMN)
        );
    }
    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) DO UPDATE SET {}",
        quote(schema.model_name()),
        columns.join(", "),
        placeholders.join(", "),
        quote(ID_COLUMN),
        assignments.join(", ")
    )
}

/// Column list of a model select, id first, attributes in declaration order.
pub(crate) fn select_columns(schema: &Schema) -> String {
    let mut columns = vec![quote(ID_COLUMN)];
    columns.extend(schema.fields().iter().map(|field| quote(&field.name)));
    columns.join(", ")
}

/// Converts an attribute value into a bindable SQL value.
pub(crate) fn to_sql_value(value: &AttributeValue) -> SqlValue {
    match value {
        AttributeValue::Null => SqlValue::Null,
        AttributeValue::Bool(b) => SqlValue::Integer(i64::from(*b)),
        AttributeValue::Int(n) => SqlValue::Integer(*n),
        AttributeValue::Float(f) => SqlValue::Real(*f),
        AttributeValue::Str(s) => SqlValue::Text(s.clone()),
        AttributeValue::DateTime(dt) => {
            SqlValue::Text(dt.to_rfc3339_opts(SecondsFormat::Micros, true))
        }
        AttributeValue::List(_) => SqlValue::Text(value.to_json().to_string()),
    }
}

/// Converts an entity id into a bindable SQL value.
pub(crate) fn id_to_sql_value(id: &EntityId) -> SqlValue {
    match id {
        EntityId::Int(n) => SqlValue::Integer(*n),
        EntityId::Str(s) => SqlValue::Text(s.clone()),
    }
}

/// One compiled predicate with its bound parameters.
pub(crate) struct Predicate {
    pub(crate) sql: String,
    pub(crate) params: Vec<SqlValue>,
}

/// Compiles one comparison condition into a predicate.
///
/// Equality against null becomes `IS NULL` / `IS NOT NULL`; list-kind
/// attributes are not compiled here, their contains semantics run over the
/// fetched rows instead.
pub(crate) fn condition_predicate(condition: &Condition) -> Predicate {
    let column = quote(column_for(&condition.attribute));
    if matches!(condition.value, AttributeValue::Null) {
        let sql = match condition.operator {
            Comparison::Equal => format!("{} IS NULL", column),
            Comparison::NotEqual => format!("{} IS NOT NULL", column),
            // Ordering against null matches nothing.
            _ => "0".to_string(),
        };
        return Predicate {
            sql,
            params: Vec::new(),
        };
    }
    let operator = match condition.operator {
        Comparison::Equal => "=",
        Comparison::NotEqual => "!=",
        Comparison::Greater => ">",
        Comparison::GreaterOrEqual => ">=",
        Comparison::Smaller => "<",
        Comparison::SmallerOrEqual => "<=",
    };
    Predicate {
        sql: format!("{} {} ?", column, operator),
        params: vec![to_sql_value(&condition.value)],
    }
}

/// Compiles one fuzzy filter pair into a predicate.
///
/// String columns match through the registered case-insensitive `REGEXP`
/// function, everything else compares exactly.
pub(crate) fn filter_predicate(attribute: &str, value: &AttributeValue) -> Predicate {
    let column = quote(column_for(attribute));
    match value {
        AttributeValue::Null => Predicate {
            sql: format!("{} IS NULL", column),
            params: Vec::new(),
        },
        AttributeValue::Str(pattern) => Predicate {
            sql: format!("{} REGEXP ?", column),
            params: vec![SqlValue::Text(pattern.clone())],
        },
        other => Predicate {
            sql: format!("{} = ?", column),
            params: vec![to_sql_value(other)],
        },
    }
}

/// Joins predicates into a `WHERE` clause, empty when there are none.
pub(crate) fn where_clause(predicates: &[Predicate]) -> (String, Vec<SqlValue>) {
    if predicates.is_empty() {
        return (String::new(), Vec::new());
    }
    let sql = predicates
        .iter()
        .map(|p| p.sql.as_str())
        .collect::<Vec<_>>()
        .join(" AND ");
    let params = predicates.iter().flat_map(|p| p.params.clone()).collect();
    (format!(" WHERE {}", sql), params)
}

/// `ORDER BY` clause for the sort keys, always falling back to the id.
pub(crate) fn order_by(sort: &[SortKey]) -> String {
    let mut keys: Vec<String> = sort
        .iter()
        .map(|key| {
            format!(
                "{} {}",
                quote(column_for(&key.attribute)),
                if key.reverse { "DESC" } else { "ASC" }
            )
        })
        .collect();
    keys.push(format!("{} ASC", quote(ID_COLUMN)));
    format!(" ORDER BY {}", keys.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldKind;

    fn schema() -> Schema {
        Schema::builder("task")
            .field("description", FieldKind::Str)
            .optional_field("due", FieldKind::DateTime)
            .field("priority", FieldKind::Int)
            .build()
    }

    #[test]
    fn test_create_table_declares_typed_columns() {
        assert_eq!(
            create_table(&schema()),
            "CREATE TABLE IF NOT EXISTS \"task\" (\"id\" INTEGER PRIMARY KEY, \
             \"description\" TEXT NOT NULL, \"due\" TEXT, \"priority\" INTEGER NOT NULL)"
        );
    }

    #[test]
    fn test_upsert_overwrites_on_conflicting_id() {
        let sql = upsert(&schema());
        assert!(sql.starts_with("INSERT INTO \"task\""));
        assert!(sql.contains("ON CONFLICT(\"id\") DO UPDATE SET"));
        assert!(sql.contains("\"priority\" = excluded.\"priority\""));
    }

    #[test]
    fn test_null_equality_compiles_to_is_null() {
        let predicate = condition_predicate(&Condition {
            attribute: "due".to_string(),
            operator: Comparison::Equal,
            value: AttributeValue::Null,
        });
        assert_eq!(predicate.sql, "\"due\" IS NULL");
        assert!(predicate.params.is_empty());
    }

    #[test]
    fn test_id_attribute_maps_to_the_id_column() {
        let predicate = condition_predicate(&Condition {
            attribute: ID_ATTRIBUTE.to_string(),
            operator: Comparison::Greater,
            value: AttributeValue::Int(3),
        });
        assert_eq!(predicate.sql, "\"id\" > ?");
    }

    #[test]
    fn test_order_by_keeps_id_as_tiebreak() {
        let clause = order_by(&[SortKey {
            attribute: "priority".to_string(),
            reverse: true,
        }]);
        assert_eq!(clause, " ORDER BY \"priority\" DESC, \"id\" ASC");
    }
}
