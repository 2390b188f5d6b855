use crate::domain::model::Record;
use crate::domain::ports::{ChildRecord, Store};
use crate::domain::schema::{FieldDescriptor, FieldKind, ModelSchema};
use crate::utils::error::{Result, ServiceError};
use async_trait::async_trait;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, ErrorCode};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};

const MEMORY_TARGET: &str = ":memory:";

/// SqliteStore is a Store implementation backed by rusqlite (bundled SQLite).
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens the store named by a `sqlite://<path>` connection string.
    pub fn connect(database_url: &str) -> Result<Self> {
        let target = database_url.strip_prefix("sqlite://").ok_or_else(|| {
            ServiceError::InvalidConfigValueError {
                field: "database.url".to_string(),
                value: database_url.to_string(),
                reason: "Only sqlite:// connection strings are supported".to_string(),
            }
        })?;

        if target == MEMORY_TARGET {
            Self::open_in_memory()
        } else {
            Self::open(Path::new(target))
        }
    }

    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        tracing::debug!("Opened SQLite database at {}", path.display());
        Ok(Self::from_connection(conn))
    }

    /// Create an in-memory SQLite database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Runs `f` against the connection on the blocking pool.
    async fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|e| ServiceError::StoreUnavailable {
                message: e.to_string(),
            })?;
            f(&mut *guard)
        })
        .await
        .map_err(|e| ServiceError::StoreUnavailable {
            message: e.to_string(),
        })?
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn generate_schemas(&self, schemas: &[&'static ModelSchema]) -> Result<()> {
        let statements: Vec<String> = schemas.iter().map(|s| create_table_sql(s)).collect();
        self.with_connection(move |conn| {
            let tx = conn.transaction()?;
            for sql in &statements {
                tx.execute_batch(sql)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await?;
        tracing::debug!("Schema ready for {} model(s)", schemas.len());
        Ok(())
    }

    async fn insert(&self, schema: &'static ModelSchema, values: Record) -> Result<Record> {
        self.with_connection(move |conn| insert_row(conn, schema, &values))
            .await
    }

    async fn insert_graph(
        &self,
        schema: &'static ModelSchema,
        values: Record,
        children: Vec<ChildRecord>,
    ) -> Result<Record> {
        self.with_connection(move |conn| {
            let tx = conn.transaction()?;
            let parent = insert_row(&tx, schema, &values)?;
            let parent_pk = pk_of(schema, &parent)?;

            for child in children {
                let mut child_values = child.values;
                child_values.insert(child.relation_field, Value::from(parent_pk));
                insert_row(&tx, child.schema, &child_values)?;
            }

            // Dropping an uncommitted transaction rolls it back, so an early
            // return above leaves neither parent nor children behind.
            tx.commit()?;
            Ok(parent)
        })
        .await
    }

    async fn save(&self, schema: &'static ModelSchema, record: &Record) -> Result<()> {
        let record = record.clone();
        self.with_connection(move |conn| {
            let pk_field = primary_key_of(schema)?;
            let pk = pk_of(schema, &record)?;

            let assigned: Vec<&FieldDescriptor> = schema
                .columns()
                .filter(|f| !f.primary_key && record.contains_key(f.name))
                .collect();
            if assigned.is_empty() {
                return Ok(());
            }

            let set_clause = assigned
                .iter()
                .enumerate()
                .map(|(i, f)| format!("\"{}\" = ?{}", f.name, i + 1))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "UPDATE \"{}\" SET {} WHERE \"{}\" = ?{}",
                schema.table,
                set_clause,
                pk_field.name,
                assigned.len() + 1
            );

            let mut params: Vec<SqlValue> = assigned
                .iter()
                .map(|f| to_sql_value(record.get(f.name).unwrap_or(&Value::Null)))
                .collect();
            params.push(SqlValue::Integer(pk));

            let affected = conn
                .execute(&sql, params_from_iter(params.iter()))
                .map_err(map_write_error)?;
            if affected == 0 {
                return Err(ServiceError::InvalidRow {
                    message: format!("{} with {} {} does not exist", schema.name, pk_field.name, pk),
                });
            }
            Ok(())
        })
        .await
    }

    async fn filter(
        &self,
        schema: &'static ModelSchema,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Record>> {
        let field = column_of(schema, field)?;
        let value = value.clone();
        self.with_connection(move |conn| select_where(conn, schema, field, &value, None))
            .await
    }

    async fn find_first(
        &self,
        schema: &'static ModelSchema,
        field: &str,
        value: &Value,
    ) -> Result<Option<Record>> {
        let field = column_of(schema, field)?;
        let value = value.clone();
        let rows = self
            .with_connection(move |conn| select_where(conn, schema, field, &value, Some(1)))
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn count(&self, schema: &'static ModelSchema) -> Result<u64> {
        self.with_connection(move |conn| {
            let sql = format!("SELECT COUNT(*) FROM \"{}\"", schema.table);
            let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
            Ok(count.max(0) as u64)
        })
        .await
    }
}

fn create_table_sql(schema: &ModelSchema) -> String {
    let columns = schema
        .columns()
        .map(column_definition)
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE IF NOT EXISTS \"{}\" ({});", schema.table, columns)
}

fn column_definition(field: &FieldDescriptor) -> String {
    if field.primary_key {
        return format!("\"{}\" INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL", field.name);
    }

    let mut definition = match field.kind {
        FieldKind::Integer => format!("\"{}\" INT NOT NULL", field.name),
        FieldKind::Text { max_length } => {
            format!("\"{}\" VARCHAR({}) NOT NULL", field.name, max_length)
        }
        FieldKind::ForeignKey { references } => format!(
            "\"{}\" INT NOT NULL REFERENCES \"{}\" ON DELETE CASCADE",
            field.name, references
        ),
        FieldKind::ReverseRelation { .. } => unreachable!("reverse relations have no column"),
    };
    if field.unique {
        definition.push_str(" UNIQUE");
    }
    definition
}

fn primary_key_of(schema: &ModelSchema) -> Result<&'static FieldDescriptor> {
    schema
        .primary_key()
        .ok_or_else(|| ServiceError::configuration(format!("{} has no primary key", schema.name)))
}

fn pk_of(schema: &ModelSchema, record: &Record) -> Result<i64> {
    record.pk(schema).ok_or_else(|| ServiceError::InvalidRow {
        message: format!("{} row has no identity", schema.name),
    })
}

fn column_of(schema: &ModelSchema, name: &str) -> Result<&'static FieldDescriptor> {
    schema
        .field(name)
        .filter(|f| f.is_column())
        .ok_or_else(|| ServiceError::UnknownField {
            model: schema.name.to_string(),
            field: name.to_string(),
        })
}

fn insert_row(conn: &Connection, schema: &ModelSchema, values: &Record) -> Result<Record> {
    let mut columns = Vec::with_capacity(values.len());
    let mut params = Vec::with_capacity(values.len());
    // Schema order keeps the generated SQL stable.
    for field in schema.columns() {
        if let Some(value) = values.get(field.name) {
            columns.push(format!("\"{}\"", field.name));
            params.push(to_sql_value(value));
        }
    }
    if columns.len() != values.len() {
        if let Some(unknown) = values.data.keys().find(|k| column_of(schema, k.as_str()).is_err()) {
            return Err(ServiceError::UnknownField {
                model: schema.name.to_string(),
                field: unknown.clone(),
            });
        }
    }

    let sql = if columns.is_empty() {
        format!("INSERT INTO \"{}\" DEFAULT VALUES", schema.table)
    } else {
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO \"{}\" ({}) VALUES ({})",
            schema.table,
            columns.join(", "),
            placeholders
        )
    };

    conn.execute(&sql, params_from_iter(params.iter()))
        .map_err(map_write_error)?;
    let rowid = conn.last_insert_rowid();
    tracing::debug!("Inserted {} row {}", schema.name, rowid);

    let pk_field = primary_key_of(schema)?;
    select_where(conn, schema, pk_field, &Value::from(rowid), Some(1))?
        .into_iter()
        .next()
        .ok_or_else(|| ServiceError::InvalidRow {
            message: format!("{} row {} vanished after insert", schema.name, rowid),
        })
}

fn select_where(
    conn: &Connection,
    schema: &ModelSchema,
    field: &FieldDescriptor,
    value: &Value,
    limit: Option<usize>,
) -> Result<Vec<Record>> {
    let names: Vec<&'static str> = schema.columns().map(|f| f.name).collect();
    let projection = names
        .iter()
        .map(|n| format!("\"{}\"", n))
        .collect::<Vec<_>>()
        .join(", ");
    let mut sql = format!(
        "SELECT {} FROM \"{}\" WHERE \"{}\" = ?1",
        projection, schema.table, field.name
    );
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(std::iter::once(to_sql_value(value))), |row| {
        let mut record = Record::new();
        for (i, name) in names.iter().enumerate() {
            record.insert(*name, from_sql_value(row.get_ref(i)?));
        }
        Ok(record)
    })?;

    let mut result = Vec::new();
    for row in rows {
        result.push(row?);
    }
    Ok(result)
}

/// Store-level UNIQUE failures read the same as validation failures.
fn map_write_error(err: rusqlite::Error) -> ServiceError {
    if let rusqlite::Error::SqliteFailure(failure, Some(message)) = &err {
        if failure.code == ErrorCode::ConstraintViolation {
            if let Some(columns) = message.strip_prefix("UNIQUE constraint failed: ") {
                let violations = columns
                    .split(", ")
                    .map(|c| format!("'{}' must be unique", c.rsplit('.').next().unwrap_or(c)))
                    .collect::<Vec<_>>();
                return ServiceError::invalid_argument(violations.join(", "));
            }
        }
    }
    err.into()
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn from_sql_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::from(bytes.to_vec()),
    }
}
