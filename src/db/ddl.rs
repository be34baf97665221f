//! Schema DDL: CREATE/DROP TABLE text per dialect and the create-all /
//! drop-all sequences that run a schema's hooks around it.

use crate::db::engine::Engine;
use crate::dialect::{Dialect, DialectExpression, DialectExpressionRegistry};
use crate::error::DbResult;
use crate::models::{Column, ColumnType, Index, SchemaDescriptor, SchemaEvent, ServerDefault, Table};
use tracing::{debug, info};

/// Concrete SQL type of a column.
pub fn column_type_sql(
    column: &Column,
    dialect: Dialect,
    registry: &DialectExpressionRegistry,
) -> DbResult<String> {
    let serial = column.autoincrement && dialect == Dialect::PostgreSql;
    let sql = match (column.column_type, dialect) {
        (ColumnType::UnicodeText(length), _) => {
            return registry.render_for(&DialectExpression::unicode_text(length), dialect);
        }

        (ColumnType::Integer, Dialect::PostgreSql) if serial => "SERIAL".to_string(),
        (ColumnType::BigInteger, Dialect::PostgreSql) if serial => "BIGSERIAL".to_string(),
        (ColumnType::Integer, Dialect::MySql | Dialect::MsSql) => "INT".to_string(),
        (ColumnType::Integer, Dialect::Oracle) => "NUMBER(10)".to_string(),
        (ColumnType::Integer, _) => "INTEGER".to_string(),
        // rowid aliasing needs the exact type name INTEGER
        (ColumnType::BigInteger, Dialect::Sqlite) => "INTEGER".to_string(),
        (ColumnType::BigInteger, Dialect::Oracle) => "NUMBER(19)".to_string(),
        (ColumnType::BigInteger, _) => "BIGINT".to_string(),

        (ColumnType::Float, Dialect::PostgreSql) => "DOUBLE PRECISION".to_string(),
        (ColumnType::Float, Dialect::MySql) => "DOUBLE".to_string(),
        (ColumnType::Float, Dialect::Sqlite) => "REAL".to_string(),
        (ColumnType::Float, Dialect::MsSql) => "FLOAT".to_string(),
        (ColumnType::Float, Dialect::Oracle) => "BINARY_DOUBLE".to_string(),

        (ColumnType::Boolean, Dialect::MsSql) => "BIT".to_string(),
        (ColumnType::Boolean, Dialect::Oracle) => "NUMBER(1)".to_string(),
        (ColumnType::Boolean, _) => "BOOLEAN".to_string(),

        (ColumnType::String(Some(len)), Dialect::Oracle) => format!("VARCHAR2({})", len),
        (ColumnType::String(None), Dialect::Oracle) => "VARCHAR2(4000)".to_string(),
        (ColumnType::String(Some(len)), _) => format!("VARCHAR({})", len),
        (ColumnType::String(None), Dialect::MySql | Dialect::MsSql) => {
            "VARCHAR(255)".to_string()
        }
        (ColumnType::String(None), _) => "VARCHAR".to_string(),

        (ColumnType::Text, Dialect::MsSql) => "VARCHAR(MAX)".to_string(),
        (ColumnType::Text, Dialect::Oracle) => "CLOB".to_string(),
        (ColumnType::Text, _) => "TEXT".to_string(),

        (ColumnType::Timestamp, Dialect::MySql) => "DATETIME".to_string(),
        (ColumnType::Timestamp, Dialect::MsSql) => "DATETIME2".to_string(),
        (ColumnType::Timestamp, _) => "TIMESTAMP".to_string(),

        (ColumnType::Json, Dialect::PostgreSql) => "JSONB".to_string(),
        (ColumnType::Json, Dialect::MySql) => "JSON".to_string(),
        (ColumnType::Json, Dialect::MsSql) => "NVARCHAR(MAX)".to_string(),
        (ColumnType::Json, Dialect::Oracle) => "CLOB".to_string(),
        (ColumnType::Json, Dialect::Sqlite) => "TEXT".to_string(),

        (ColumnType::Binary, Dialect::PostgreSql) => "BYTEA".to_string(),
        (ColumnType::Binary, Dialect::MsSql) => "VARBINARY(MAX)".to_string(),
        (ColumnType::Binary, _) => "BLOB".to_string(),
    };
    Ok(sql)
}

fn column_sql(
    column: &Column,
    dialect: Dialect,
    registry: &DialectExpressionRegistry,
) -> DbResult<String> {
    let mut sql = format!(
        "{} {}",
        dialect.quote_identifier(&column.name),
        column_type_sql(column, dialect, registry)?
    );

    if column.autoincrement {
        match dialect {
            Dialect::MsSql => sql.push_str(" IDENTITY(1,1)"),
            Dialect::Oracle => sql.push_str(" GENERATED BY DEFAULT AS IDENTITY"),
            _ => {}
        }
    }

    match &column.server_default {
        Some(ServerDefault::Expression(expr)) => {
            let rendered = registry.render_for(expr, dialect)?;
            // MySQL only accepts non-literal defaults in parentheses
            if dialect == Dialect::MySql && !rendered.starts_with('(') {
                sql.push_str(&format!(" DEFAULT ({})", rendered));
            } else {
                sql.push_str(&format!(" DEFAULT {}", rendered));
            }
        }
        Some(ServerDefault::Literal(text)) => sql.push_str(&format!(" DEFAULT {}", text)),
        None => {}
    }

    if !column.nullable {
        sql.push_str(" NOT NULL");
    }
    if column.autoincrement && dialect == Dialect::MySql {
        sql.push_str(" AUTO_INCREMENT");
    }
    if column.unique && !column.primary_key {
        sql.push_str(" UNIQUE");
    }
    Ok(sql)
}

fn column_list(columns: &[String], dialect: Dialect) -> String {
    columns
        .iter()
        .map(|c| dialect.quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `CREATE TABLE` statement for `table`, skipped by the database when the
/// table already exists (where the dialect supports it).
pub fn create_table_sql(
    table: &Table,
    dialect: Dialect,
    registry: &DialectExpressionRegistry,
) -> DbResult<String> {
    let mut parts = Vec::with_capacity(table.columns.len() + 2);
    for column in &table.columns {
        parts.push(column_sql(column, dialect, registry)?);
    }

    let primary_key: Vec<String> = table.primary_key().map(|c| c.name.clone()).collect();
    if !primary_key.is_empty() {
        parts.push(format!("PRIMARY KEY ({})", column_list(&primary_key, dialect)));
    }

    for column in &table.columns {
        if let Some(fk) = &column.references {
            let mut clause = format!(
                "FOREIGN KEY ({}) REFERENCES {} ({})",
                dialect.quote_identifier(&column.name),
                dialect.quote_identifier(&fk.table),
                dialect.quote_identifier(&fk.column)
            );
            if let Some(action) = fk.on_delete {
                clause.push_str(" ON DELETE ");
                clause.push_str(action.as_sql());
            }
            parts.push(clause);
        }
    }

    if dialect == Dialect::MySql {
        for index in &table.indexes {
            parts.push(format!(
                "{}INDEX {} ({})",
                if index.unique { "UNIQUE " } else { "" },
                dialect.quote_identifier(&index.name),
                column_list(&index.columns, dialect)
            ));
        }
    }

    let create = match dialect {
        Dialect::MsSql | Dialect::Oracle => "CREATE TABLE",
        _ => "CREATE TABLE IF NOT EXISTS",
    };
    Ok(format!(
        "{} {} ({})",
        create,
        dialect.quote_identifier(&table.name),
        parts.join(", ")
    ))
}

/// `CREATE INDEX` statement. MySQL declares indexes inside `CREATE TABLE`
/// instead, so this returns `None` there.
pub fn create_index_sql(table: &Table, index: &Index, dialect: Dialect) -> Option<String> {
    let if_not_exists = match dialect {
        Dialect::MySql => return None,
        Dialect::MsSql | Dialect::Oracle => "",
        Dialect::PostgreSql | Dialect::Sqlite => "IF NOT EXISTS ",
    };
    Some(format!(
        "CREATE {}INDEX {}{} ON {} ({})",
        if index.unique { "UNIQUE " } else { "" },
        if_not_exists,
        dialect.quote_identifier(&index.name),
        dialect.quote_identifier(&table.name),
        column_list(&index.columns, dialect)
    ))
}

pub fn drop_table_sql(table: &Table, dialect: Dialect) -> String {
    match dialect {
        Dialect::Oracle => format!("DROP TABLE {}", dialect.quote_identifier(&table.name)),
        _ => format!("DROP TABLE IF EXISTS {}", dialect.quote_identifier(&table.name)),
    }
}

async fn run_hooks(
    engine: &Engine,
    schema: &SchemaDescriptor,
    event: SchemaEvent,
    registry: &DialectExpressionRegistry,
) -> DbResult<usize> {
    let mut count = 0;
    for hook in schema.hooks_for(event) {
        let sql = registry.render_for(&hook.expression, engine.dialect())?;
        debug!(event = ?event, sql = %sql, "Running schema hook");
        engine.execute(&sql).await?;
        count += 1;
    }
    Ok(count)
}

/// Create every table of `schema` in declaration order, with the
/// before/after-create hooks around them.
pub async fn create_all(
    engine: &Engine,
    schema: &SchemaDescriptor,
    registry: &DialectExpressionRegistry,
) -> DbResult<()> {
    let dialect = engine.dialect();
    run_hooks(engine, schema, SchemaEvent::BeforeCreate, registry).await?;

    for table in schema.tables() {
        let sql = create_table_sql(table, dialect, registry)?;
        debug!(table = %table.name, sql = %sql, "Creating table");
        engine.execute(&sql).await?;
        for index in &table.indexes {
            if let Some(sql) = create_index_sql(table, index, dialect) {
                debug!(index = %index.name, sql = %sql, "Creating index");
                engine.execute(&sql).await?;
            }
        }
    }

    let hooks = run_hooks(engine, schema, SchemaEvent::AfterCreate, registry).await?;
    info!(
        tables = schema.tables().len(),
        hooks,
        dialect = %dialect,
        "Schema created"
    );
    Ok(())
}

/// Drop every table of `schema` in reverse declaration order, with the
/// before/after-drop hooks around them.
pub async fn drop_all(
    engine: &Engine,
    schema: &SchemaDescriptor,
    registry: &DialectExpressionRegistry,
) -> DbResult<()> {
    let dialect = engine.dialect();
    run_hooks(engine, schema, SchemaEvent::BeforeDrop, registry).await?;

    for table in schema.tables().iter().rev() {
        let sql = drop_table_sql(table, dialect);
        debug!(table = %table.name, sql = %sql, "Dropping table");
        engine.execute(&sql).await?;
    }

    run_hooks(engine, schema, SchemaEvent::AfterDrop, registry).await?;
    info!(tables = schema.tables().len(), dialect = %dialect, "Schema dropped");
    Ok(())
}
