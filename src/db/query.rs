//! Statement builders for reads and single-table writes.
//!
//! Statements are validated against the declared [`Table`] when compiled; a
//! reference to an undeclared column is a schema error. Compilation either
//! emits dialect placeholders with a parameter list, or inlines the values as
//! literals for statements embedded in DDL.

use std::collections::HashSet;

use crate::dialect::Dialect;
use crate::error::{DbError, DbResult};
use crate::models::{Column, ColumnType, QueryParam, Record, Table};

/// How parameter values appear in compiled SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindStyle {
    /// `$1` / `?` placeholders, values returned separately
    Placeholder,
    /// Values rendered inline as SQL literals
    Literal,
}

/// SQL text plus the values for its placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStatement {
    pub sql: String,
    pub params: Vec<QueryParam>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    NotEq,
    Lt,
    Gt,
    Like,
}

impl FilterOp {
    fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Like => "LIKE",
        }
    }
}

#[derive(Debug, Clone)]
struct Filter {
    column: String,
    op: FilterOp,
    value: QueryParam,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
enum Expr {
    /// `column` or `table.column`
    Column(String),
    /// String concatenation of column references
    Concat(Vec<String>),
}

#[derive(Debug, Clone)]
struct Projection {
    expr: Expr,
    label: Option<String>,
}

/// A table added to the FROM list after the first one.
#[derive(Debug, Clone)]
struct Source {
    table: Table,
    /// Join condition as `(left, right)` column references; none for a cross product
    on: Option<(String, String)>,
}

/// Column of a SELECT's result set.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputColumn {
    pub name: String,
    pub column_type: ColumnType,
    pub primary_key: bool,
    pub nullable: bool,
}

/// A projection with its column references looked up.
enum Resolved<'a> {
    Column {
        table: &'a Table,
        column: &'a Column,
        label: Option<&'a str>,
    },
    Concat {
        parts: Vec<(&'a Table, &'a Column)>,
        label: &'a str,
    },
}

impl Resolved<'_> {
    fn name(&self) -> &str {
        match self {
            Self::Column { column, label, .. } => label.unwrap_or(&column.name),
            Self::Concat { label, .. } => label,
        }
    }

    fn output(&self) -> OutputColumn {
        match self {
            Self::Column { column, .. } => OutputColumn {
                name: self.name().to_string(),
                column_type: column.column_type,
                primary_key: column.primary_key,
                nullable: column.nullable,
            },
            Self::Concat { parts, label } => OutputColumn {
                name: label.to_string(),
                column_type: ColumnType::Text,
                primary_key: false,
                nullable: parts.iter().any(|(_, c)| c.nullable),
            },
        }
    }
}

/// Collects placeholders and values while a statement is rendered.
struct Binder {
    dialect: Dialect,
    style: BindStyle,
    params: Vec<QueryParam>,
}

impl Binder {
    fn new(dialect: Dialect, style: BindStyle) -> Self {
        Self {
            dialect,
            style,
            params: Vec::new(),
        }
    }

    fn bind(&mut self, value: &QueryParam) -> DbResult<String> {
        match self.style {
            BindStyle::Literal => self.dialect.literal(value),
            BindStyle::Placeholder => {
                self.params.push(value.clone());
                Ok(self.dialect.placeholder(self.params.len()))
            }
        }
    }

    fn finish(self, sql: String) -> CompiledStatement {
        CompiledStatement {
            sql,
            params: self.params,
        }
    }
}

/// Render `WHERE a = ? AND b = ?` for the given filters, in order.
///
/// `column_sql` validates a column reference and returns its SQL form.
fn render_where(
    filters: &[Filter],
    binder: &mut Binder,
    column_sql: impl Fn(&str) -> DbResult<String>,
) -> DbResult<String> {
    if filters.is_empty() {
        return Ok(String::new());
    }
    let mut predicates = Vec::with_capacity(filters.len());
    for filter in filters {
        let column = column_sql(&filter.column)?;
        let predicate = match (&filter.op, &filter.value) {
            (FilterOp::Eq, QueryParam::Null) => format!("{} IS NULL", column),
            (FilterOp::NotEq, QueryParam::Null) => format!("{} IS NOT NULL", column),
            (op, value) => format!("{} {} {}", column, op.as_sql(), binder.bind(value)?),
        };
        predicates.push(predicate);
    }
    Ok(format!(" WHERE {}", predicates.join(" AND ")))
}

fn concat_sql(dialect: Dialect, parts: &[String]) -> String {
    match dialect {
        Dialect::MySql => format!("CONCAT({})", parts.join(", ")),
        Dialect::MsSql => parts.join(" + "),
        _ => parts.join(" || "),
    }
}

/// SELECT over one table, or several joined or cross-multiplied tables.
///
/// Column references are either bare (`email`) or qualified (`post.user_id`).
/// A bare reference must match exactly one source table. Over a single table
/// columns render unqualified; over several they render as `table.column`.
#[derive(Debug, Clone)]
pub struct Select {
    table: Table,
    joins: Vec<Source>,
    projections: Vec<Projection>,
    filters: Vec<Filter>,
    order_by: Vec<(String, Order)>,
    limit: Option<u64>,
}

impl Select {
    /// Select every column of `table`.
    pub fn from_table(table: &Table) -> Self {
        Self {
            table: table.clone(),
            joins: Vec::new(),
            projections: Vec::new(),
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    /// The first table of the FROM list.
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Every source table in FROM order.
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        std::iter::once(&self.table).chain(self.joins.iter().map(|j| &j.table))
    }

    /// Add `table` to the FROM list with no join condition (`FROM a, b`).
    pub fn and_from(mut self, table: &Table) -> Self {
        self.joins.push(Source {
            table: table.clone(),
            on: None,
        });
        self
    }

    /// Inner join `table` on `left = right`.
    ///
    /// The condition may reference `table` and any table added before it.
    pub fn join(
        mut self,
        table: &Table,
        left: impl Into<String>,
        right: impl Into<String>,
    ) -> Self {
        self.joins.push(Source {
            table: table.clone(),
            on: Some((left.into(), right.into())),
        });
        self
    }

    /// Restrict the output to these columns.
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projections.extend(columns.into_iter().map(|c| Projection {
            expr: Expr::Column(c.into()),
            label: None,
        }));
        self
    }

    /// Add an output column under a different name.
    pub fn column_as(mut self, column: impl Into<String>, label: impl Into<String>) -> Self {
        self.projections.push(Projection {
            expr: Expr::Column(column.into()),
            label: Some(label.into()),
        });
        self
    }

    /// Add the string concatenation of `columns` as output column `label`.
    pub fn concat_as<I, S>(mut self, columns: I, label: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projections.push(Projection {
            expr: Expr::Concat(columns.into_iter().map(Into::into).collect()),
            label: Some(label.into()),
        });
        self
    }

    pub fn filter(
        mut self,
        column: impl Into<String>,
        op: FilterOp,
        value: impl Into<QueryParam>,
    ) -> Self {
        self.filters.push(Filter {
            column: column.into(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn filter_eq(self, column: impl Into<String>, value: impl Into<QueryParam>) -> Self {
        self.filter(column, FilterOp::Eq, value)
    }

    /// Equality filter for every `(field, value)` pair, in iteration order.
    pub fn filter_by<I, K, V>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<QueryParam>,
    {
        for (column, value) in filters {
            self = self.filter(column, FilterOp::Eq, value);
        }
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, order: Order) -> Self {
        self.order_by.push((column.into(), order));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Look up a bare or qualified column reference among the source tables.
    fn resolve(&self, reference: &str) -> DbResult<(&Table, &Column)> {
        if let Some((table_name, column_name)) = reference.rsplit_once('.') {
            let table = self
                .tables()
                .find(|t| t.name == table_name)
                .ok_or_else(|| {
                    DbError::schema(
                        format!("Table '{}' is not a source of this SELECT", table_name),
                        reference,
                    )
                })?;
            return Ok((table, table.require_column(column_name)?));
        }
        if self.joins.is_empty() {
            return Ok((&self.table, self.table.require_column(reference)?));
        }
        let mut found = self
            .tables()
            .filter_map(|t| t.get_column(reference).map(|c| (t, c)));
        match (found.next(), found.next()) {
            (Some(hit), None) => Ok(hit),
            (Some(_), Some(_)) => Err(DbError::schema(
                format!("Column '{}' is ambiguous; qualify it with a table name", reference),
                reference,
            )),
            (None, _) => Err(DbError::schema(
                format!("No source table has a column '{}'", reference),
                reference,
            )),
        }
    }

    fn column_sql(&self, dialect: Dialect, table: &Table, column: &Column) -> String {
        let name = dialect.quote_identifier(&column.name);
        if self.joins.is_empty() {
            name
        } else {
            format!("{}.{}", dialect.quote_identifier(&table.name), name)
        }
    }

    fn reference_sql(&self, dialect: Dialect, reference: &str) -> DbResult<String> {
        let (table, column) = self.resolve(reference)?;
        Ok(self.column_sql(dialect, table, column))
    }

    fn resolve_projections(&self) -> DbResult<Vec<Resolved<'_>>> {
        let mut seen_tables = HashSet::new();
        for table in self.tables() {
            if !seen_tables.insert(table.name.as_str()) {
                return Err(DbError::schema(
                    format!("Table '{}' appears more than once in FROM", table.name),
                    table.name.clone(),
                ));
            }
        }

        let resolved: Vec<Resolved<'_>> = if self.projections.is_empty() {
            self.tables()
                .flat_map(|table| {
                    table.columns.iter().map(move |column| Resolved::Column {
                        table,
                        column,
                        label: None,
                    })
                })
                .collect()
        } else {
            self.projections
                .iter()
                .map(|p| self.resolve_projection(p))
                .collect::<DbResult<_>>()?
        };

        let mut seen = HashSet::new();
        for item in &resolved {
            if !seen.insert(item.name()) {
                return Err(DbError::schema(
                    format!("SELECT has more than one output column named '{}'", item.name()),
                    self.table.name.clone(),
                ));
            }
        }
        Ok(resolved)
    }

    fn resolve_projection<'a>(&'a self, projection: &'a Projection) -> DbResult<Resolved<'a>> {
        match (&projection.expr, projection.label.as_deref()) {
            (Expr::Column(reference), label) => {
                let (table, column) = self.resolve(reference)?;
                Ok(Resolved::Column {
                    table,
                    column,
                    label,
                })
            }
            (Expr::Concat(references), Some(label)) if !references.is_empty() => {
                let parts = references
                    .iter()
                    .map(|r| self.resolve(r))
                    .collect::<DbResult<_>>()?;
                Ok(Resolved::Concat { parts, label })
            }
            (Expr::Concat(_), label) => Err(DbError::schema(
                "Concatenation needs at least one column and a label",
                label.unwrap_or(&self.table.name).to_string(),
            )),
        }
    }

    /// Result set columns, in output order; a label replaces the column name.
    pub fn output_columns(&self) -> DbResult<Vec<OutputColumn>> {
        Ok(self
            .resolve_projections()?
            .iter()
            .map(Resolved::output)
            .collect())
    }

    pub fn compile(&self, dialect: Dialect, style: BindStyle) -> DbResult<CompiledStatement> {
        let mut binder = Binder::new(dialect, style);

        let mut columns = Vec::new();
        for item in self.resolve_projections()? {
            let rendered = match &item {
                Resolved::Column {
                    table,
                    column,
                    label,
                } => {
                    let source = self.column_sql(dialect, table, column);
                    match label {
                        Some(label) if *label != column.name => {
                            format!("{} AS {}", source, dialect.quote_identifier(label))
                        }
                        _ => source,
                    }
                }
                Resolved::Concat { parts, label } => {
                    let parts: Vec<String> = parts
                        .iter()
                        .map(|(table, column)| self.column_sql(dialect, table, column))
                        .collect();
                    format!(
                        "{} AS {}",
                        concat_sql(dialect, &parts),
                        dialect.quote_identifier(label)
                    )
                }
            };
            columns.push(rendered);
        }
        if columns.is_empty() {
            return Err(DbError::schema(
                "SELECT has no output columns",
                self.table.name.clone(),
            ));
        }

        let mut sql = String::from("SELECT ");
        if let (Some(limit), Dialect::MsSql) = (self.limit, dialect) {
            sql.push_str(&format!("TOP {} ", limit));
        }
        sql.push_str(&columns.join(", "));
        sql.push_str(" FROM ");
        sql.push_str(&dialect.quote_identifier(&self.table.name));
        for source in &self.joins {
            let table = dialect.quote_identifier(&source.table.name);
            match &source.on {
                None => sql.push_str(&format!(", {}", table)),
                Some((left, right)) => sql.push_str(&format!(
                    " JOIN {} ON {} = {}",
                    table,
                    self.reference_sql(dialect, left)?,
                    self.reference_sql(dialect, right)?
                )),
            }
        }
        sql.push_str(&render_where(&self.filters, &mut binder, |c| {
            self.reference_sql(dialect, c)
        })?);

        if !self.order_by.is_empty() {
            let mut terms = Vec::with_capacity(self.order_by.len());
            for (column, order) in &self.order_by {
                let dir = match order {
                    Order::Asc => "ASC",
                    Order::Desc => "DESC",
                };
                terms.push(format!("{} {}", self.reference_sql(dialect, column)?, dir));
            }
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }

        match (self.limit, dialect) {
            (Some(_), Dialect::MsSql) | (None, _) => {}
            (Some(limit), Dialect::Oracle) => {
                sql.push_str(&format!(" FETCH FIRST {} ROWS ONLY", limit))
            }
            (Some(limit), _) => sql.push_str(&format!(" LIMIT {}", limit)),
        }

        Ok(binder.finish(sql))
    }
}

/// Single-row INSERT built from a record.
#[derive(Debug, Clone)]
pub struct Insert {
    table: Table,
    values: Vec<(String, QueryParam)>,
}

impl Insert {
    /// Take values for the table's columns from `record`, in column order.
    ///
    /// Generated columns (autoincrement or server default) that are missing or
    /// null are left out so the database fills them in. Keys that are not
    /// declared columns are rejected.
    pub fn from_record(table: &Table, record: &Record) -> DbResult<Self> {
        for key in record.keys() {
            table.require_column(key)?;
        }
        let values = table
            .columns
            .iter()
            .filter_map(|column| {
                let value = record.get(&column.name)?;
                if value.is_null() && column.is_generated() {
                    return None;
                }
                Some((column.name.clone(), QueryParam::from_json(value)))
            })
            .collect();
        Ok(Self {
            table: table.clone(),
            values,
        })
    }

    pub fn compile(&self, dialect: Dialect) -> DbResult<CompiledStatement> {
        let mut binder = Binder::new(dialect, BindStyle::Placeholder);
        let table = dialect.quote_identifier(&self.table.name);

        if self.values.is_empty() {
            let sql = match dialect {
                Dialect::MySql => format!("INSERT INTO {} () VALUES ()", table),
                _ => format!("INSERT INTO {} DEFAULT VALUES", table),
            };
            return Ok(binder.finish(sql));
        }

        let columns: Vec<String> = self
            .values
            .iter()
            .map(|(name, _)| dialect.quote_identifier(name))
            .collect();
        let placeholders = self
            .values
            .iter()
            .map(|(_, value)| binder.bind(value))
            .collect::<DbResult<Vec<_>>>()?;
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders.join(", ")
        );
        Ok(binder.finish(sql))
    }
}

/// DELETE of the row identified by a record's primary key.
#[derive(Debug, Clone)]
pub struct Delete {
    table: Table,
    filters: Vec<Filter>,
}

impl Delete {
    pub fn by_primary_key(table: &Table, record: &Record) -> DbResult<Self> {
        let mut filters = Vec::new();
        for column in table.primary_key() {
            match record.get(&column.name) {
                Some(value) if !value.is_null() => filters.push(Filter {
                    column: column.name.clone(),
                    op: FilterOp::Eq,
                    value: QueryParam::from_json(value),
                }),
                _ => {
                    return Err(DbError::schema(
                        format!(
                            "Record has no value for primary key column '{}'",
                            column.name
                        ),
                        format!("{}.{}", table.name, column.name),
                    ));
                }
            }
        }
        if filters.is_empty() {
            return Err(DbError::schema(
                format!("Table '{}' has no primary key", table.name),
                table.name.clone(),
            ));
        }
        Ok(Self {
            table: table.clone(),
            filters,
        })
    }

    pub fn compile(&self, dialect: Dialect) -> DbResult<CompiledStatement> {
        let mut binder = Binder::new(dialect, BindStyle::Placeholder);
        let mut sql = format!("DELETE FROM {}", dialect.quote_identifier(&self.table.name));
        sql.push_str(&render_where(&self.filters, &mut binder, |c| {
            self.table.require_column(c)?;
            Ok(dialect.quote_identifier(c))
        })?);
        Ok(binder.finish(sql))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::DialectExpression;
    use crate::models::{ColumnType, ServerDefault};
    use serde_json::{Value as JsonValue, json};

    fn user_table() -> Table {
        Table::new("user")
            .column(Column::new("id", ColumnType::Integer).primary_key())
            .column(Column::new("first_name", ColumnType::String(Some(64))).not_null())
            .column(Column::new("last_name", ColumnType::String(Some(64))))
            .column(Column::new("email", ColumnType::String(Some(128))))
            .column(
                Column::new("created_at", ColumnType::Timestamp)
                    .server_default(ServerDefault::Expression(DialectExpression::TimestampDefault)),
            )
    }

    fn record(value: JsonValue) -> Record {
        match value {
            JsonValue::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_select_filters_in_order() {
        let select = Select::from_table(&user_table())
            .columns(["id", "email"])
            .filter_eq("first_name", "Ann")
            .filter_eq("last_name", "Lee");
        let stmt = select.compile(Dialect::PostgreSql, BindStyle::Placeholder).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT id, email FROM \"user\" WHERE first_name = $1 AND last_name = $2"
        );
        assert_eq!(stmt.params, vec![QueryParam::from("Ann"), QueryParam::from("Lee")]);
    }

    #[test]
    fn test_select_all_columns_sqlite() {
        let stmt = Select::from_table(&user_table())
            .filter_eq("email", "a@x.io")
            .compile(Dialect::Sqlite, BindStyle::Placeholder)
            .unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT id, first_name, last_name, email, created_at FROM \"user\" WHERE email = ?"
        );
    }

    #[test]
    fn test_select_literal_binds() {
        let stmt = Select::from_table(&user_table())
            .column_as("first_name", "name")
            .filter_eq("last_name", "O'Neil")
            .compile(Dialect::MySql, BindStyle::Literal)
            .unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT first_name AS name FROM `user` WHERE last_name = 'O''Neil'"
        );
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_select_null_filter() {
        let stmt = Select::from_table(&user_table())
            .columns(["id"])
            .filter_eq("email", QueryParam::Null)
            .compile(Dialect::Sqlite, BindStyle::Placeholder)
            .unwrap();
        assert_eq!(stmt.sql, "SELECT id FROM \"user\" WHERE email IS NULL");
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_select_order_and_limit() {
        let select = Select::from_table(&user_table())
            .columns(["id"])
            .order_by("id", Order::Desc)
            .limit(5);
        assert_eq!(
            select.compile(Dialect::Sqlite, BindStyle::Placeholder).unwrap().sql,
            "SELECT id FROM \"user\" ORDER BY id DESC LIMIT 5"
        );
        assert_eq!(
            select.compile(Dialect::MsSql, BindStyle::Placeholder).unwrap().sql,
            "SELECT TOP 5 id FROM [user] ORDER BY id DESC"
        );
        assert_eq!(
            select.compile(Dialect::Oracle, BindStyle::Placeholder).unwrap().sql,
            "SELECT id FROM \"user\" ORDER BY id DESC FETCH FIRST 5 ROWS ONLY"
        );
    }

    #[test]
    fn test_unknown_filter_column() {
        let err = Select::from_table(&user_table())
            .filter_eq("nickname", "x")
            .compile(Dialect::Sqlite, BindStyle::Placeholder)
            .unwrap_err();
        assert!(matches!(err, DbError::Schema { .. }));
    }

    fn post_table() -> Table {
        Table::new("post")
            .column(Column::new("id", ColumnType::Integer).primary_key())
            .column(
                Column::new("user_id", ColumnType::Integer)
                    .not_null()
                    .references("user", "id"),
            )
            .column(Column::new("content", ColumnType::Text))
    }

    #[test]
    fn test_select_cross_product_with_concat() {
        let stmt = Select::from_table(&user_table())
            .and_from(&post_table())
            .columns(["user.id"])
            .concat_as(["user.first_name", "user.last_name"], "full_name")
            .columns(["post.content"])
            .compile(Dialect::Sqlite, BindStyle::Literal)
            .unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT \"user\".id, \"user\".first_name || \"user\".last_name AS full_name, \
             post.content FROM \"user\", post"
        );
    }

    #[test]
    fn test_concat_per_dialect() {
        let select = Select::from_table(&user_table())
            .concat_as(["first_name", "last_name"], "full_name");
        assert_eq!(
            select.compile(Dialect::MySql, BindStyle::Literal).unwrap().sql,
            "SELECT CONCAT(first_name, last_name) AS full_name FROM `user`"
        );
        assert_eq!(
            select.compile(Dialect::MsSql, BindStyle::Literal).unwrap().sql,
            "SELECT first_name + last_name AS full_name FROM [user]"
        );
    }

    #[test]
    fn test_select_join_filters_and_orders_qualified() {
        let stmt = Select::from_table(&user_table())
            .join(&post_table(), "post.user_id", "user.id")
            .columns(["user.id", "first_name", "content"])
            .filter_eq("last_name", "Lee")
            .order_by("post.id", Order::Asc)
            .compile(Dialect::PostgreSql, BindStyle::Placeholder)
            .unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT \"user\".id, \"user\".first_name, post.content FROM \"user\" \
             JOIN post ON post.user_id = \"user\".id \
             WHERE \"user\".last_name = $1 ORDER BY post.id ASC"
        );
        assert_eq!(stmt.params, vec![QueryParam::from("Lee")]);
    }

    #[test]
    fn test_join_column_errors() {
        let joined = Select::from_table(&user_table()).join(&post_table(), "post.user_id", "user.id");

        let ambiguous = joined.clone().columns(["id"]);
        assert!(matches!(
            ambiguous.compile(Dialect::Sqlite, BindStyle::Placeholder),
            Err(DbError::Schema { .. })
        ));

        let foreign = joined.clone().columns(["comment.id"]);
        assert!(matches!(
            foreign.output_columns(),
            Err(DbError::Schema { .. })
        ));

        // both tables have an `id` column
        assert!(matches!(
            joined.output_columns(),
            Err(DbError::Schema { .. })
        ));
    }

    #[test]
    fn test_self_join_rejected() {
        let select = Select::from_table(&user_table())
            .and_from(&user_table())
            .columns(["user.email"]);
        assert!(matches!(
            select.compile(Dialect::Sqlite, BindStyle::Placeholder),
            Err(DbError::Schema { .. })
        ));
    }

    #[test]
    fn test_float_filter_literals() {
        let select = Select::from_table(&user_table())
            .columns(["id"])
            .filter("id", FilterOp::Gt, 1.0);
        assert_eq!(
            select.compile(Dialect::Sqlite, BindStyle::Literal).unwrap().sql,
            "SELECT id FROM \"user\" WHERE id > 1.0"
        );

        let nan = Select::from_table(&user_table())
            .columns(["id"])
            .filter("id", FilterOp::Gt, f64::NAN);
        assert!(matches!(
            nan.compile(Dialect::Sqlite, BindStyle::Literal),
            Err(DbError::InvalidValue { .. })
        ));
        // placeholders carry the value to the driver unchanged
        let stmt = nan.compile(Dialect::Sqlite, BindStyle::Placeholder).unwrap();
        assert_eq!(stmt.params.len(), 1);
    }

    #[test]
    fn test_insert_skips_generated_nulls() {
        let rec = record(json!({
            "id": null,
            "first_name": "Ann",
            "last_name": "Lee",
            "email": "a@x.io",
            "created_at": null
        }));
        let stmt = Insert::from_record(&user_table(), &rec)
            .unwrap()
            .compile(Dialect::PostgreSql)
            .unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO \"user\" (first_name, last_name, email) VALUES ($1, $2, $3)"
        );
        assert_eq!(stmt.params.len(), 3);
    }

    #[test]
    fn test_insert_rejects_unknown_key() {
        let rec = record(json!({"first_name": "Ann", "age": 3}));
        assert!(matches!(
            Insert::from_record(&user_table(), &rec),
            Err(DbError::Schema { .. })
        ));
    }

    #[test]
    fn test_insert_default_values() {
        let table = Table::new("counter")
            .column(Column::new("id", ColumnType::Integer).primary_key());
        let insert = Insert::from_record(&table, &Record::new()).unwrap();
        assert_eq!(
            insert.compile(Dialect::Sqlite).unwrap().sql,
            "INSERT INTO counter DEFAULT VALUES"
        );
        assert_eq!(
            insert.compile(Dialect::MySql).unwrap().sql,
            "INSERT INTO counter () VALUES ()"
        );
    }

    #[test]
    fn test_delete_by_primary_key() {
        let rec = record(json!({"id": 7, "first_name": "Ann"}));
        let stmt = Delete::by_primary_key(&user_table(), &rec)
            .unwrap()
            .compile(Dialect::Sqlite)
            .unwrap();
        assert_eq!(stmt.sql, "DELETE FROM \"user\" WHERE id = ?");
        assert_eq!(stmt.params, vec![QueryParam::Int(7)]);
    }

    #[test]
    fn test_delete_requires_key_value() {
        let rec = record(json!({"id": null, "first_name": "Ann"}));
        assert!(matches!(
            Delete::by_primary_key(&user_table(), &rec),
            Err(DbError::Schema { .. })
        ));
    }
}
