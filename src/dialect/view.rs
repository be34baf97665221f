//! View DDL attached to a schema descriptor.

use super::DialectExpression;
use crate::db::query::Select;
use crate::error::DbResult;
use crate::models::{Column, SchemaDescriptor, SchemaEvent, Table};
use tracing::debug;

/// Declare a view over `query` and return a table-shaped projection of it.
///
/// The view is created after the schema's tables and dropped before them. The
/// returned table is not added to `schema`; it only lets callers select from
/// the view like any table. `materialized` takes effect on PostgreSQL and is
/// ignored elsewhere.
pub fn create_view(
    name: impl Into<String>,
    query: &Select,
    schema: &mut SchemaDescriptor,
    materialized: bool,
) -> DbResult<Table> {
    let name = name.into();

    let mut projection = Table::new(name.clone());
    for output in query.output_columns()? {
        let mut column = Column::new(output.name, output.column_type);
        column.primary_key = output.primary_key;
        column.nullable = output.nullable;
        projection = projection.column(column);
    }

    schema.on(
        SchemaEvent::AfterCreate,
        DialectExpression::create_view(name.clone(), query.clone(), materialized),
    );
    schema.on(
        SchemaEvent::BeforeDrop,
        DialectExpression::drop_view(name.clone(), materialized),
    );

    let sources: Vec<&str> = query.tables().map(|t| t.name.as_str()).collect();
    debug!(
        view = %name,
        sources = %sources.join(","),
        columns = projection.columns.len(),
        materialized,
        "Registered view DDL hooks"
    );
    Ok(projection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ColumnType;

    fn user_table() -> Table {
        Table::new("user")
            .column(Column::new("id", ColumnType::Integer).primary_key())
            .column(Column::new("first_name", ColumnType::String(Some(64))))
            .column(Column::new("email", ColumnType::String(Some(128))))
    }

    #[test]
    fn test_projection_columns() {
        let mut schema = SchemaDescriptor::new().with_table(user_table());
        let select = Select::from_table(&user_table())
            .columns(["id"])
            .column_as("first_name", "name");

        let view = create_view("name_view", &select, &mut schema, false).unwrap();
        assert_eq!(view.name, "name_view");
        let names: Vec<_> = view.column_names().collect();
        assert_eq!(names, ["id", "name"]);
        assert!(view.columns[0].primary_key);
        assert!(!view.columns[0].autoincrement);
        assert_eq!(view.columns[1].column_type, ColumnType::String(Some(64)));
    }

    #[test]
    fn test_projection_over_join() {
        let post = Table::new("post")
            .column(Column::new("id", ColumnType::Integer).primary_key())
            .column(Column::new("user_id", ColumnType::Integer).not_null())
            .column(Column::new("content", ColumnType::Text));
        let mut schema = SchemaDescriptor::new()
            .with_table(user_table())
            .with_table(post.clone());
        let select = Select::from_table(&user_table())
            .join(&post, "post.user_id", "user.id")
            .columns(["user.id", "content"])
            .concat_as(["first_name", "email"], "label");

        let view = create_view("user_posts", &select, &mut schema, false).unwrap();
        let names: Vec<_> = view.column_names().collect();
        assert_eq!(names, ["id", "content", "label"]);
        assert_eq!(view.columns[1].column_type, ColumnType::Text);
        assert_eq!(view.columns[2].column_type, ColumnType::Text);
        assert!(view.columns[2].nullable);
    }

    #[test]
    fn test_registers_hooks_not_table() {
        let mut schema = SchemaDescriptor::new().with_table(user_table());
        let select = Select::from_table(&user_table());
        create_view("all_users", &select, &mut schema, true).unwrap();

        assert_eq!(schema.tables().len(), 1);
        assert_eq!(schema.hooks_for(SchemaEvent::AfterCreate).count(), 1);
        assert_eq!(schema.hooks_for(SchemaEvent::BeforeDrop).count(), 1);
        assert!(matches!(
            schema.hooks_for(SchemaEvent::BeforeDrop).next().map(|h| &h.expression),
            Some(DialectExpression::DropView { materialized: true, .. })
        ));
    }

    #[test]
    fn test_unknown_projection_column() {
        let mut schema = SchemaDescriptor::new();
        let select = Select::from_table(&user_table()).columns(["nickname"]);
        assert!(create_view("v", &select, &mut schema, false).is_err());
        assert!(schema.hooks().is_empty());
    }
}
