//! Schema-related data models.
//!
//! Tables and columns declared by the caller, the schema descriptor that groups
//! them with DDL hooks, and the [`Entity`] trait that ties a record type to its
//! table. Also the introspection results returned by the schema inspector.

use crate::dialect::DialectExpression;
use crate::error::{DbError, DbResult};
use crate::models::Record;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Logical column type, mapped to a concrete type per dialect at DDL time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    BigInteger,
    Float,
    Boolean,
    /// VARCHAR with an optional length
    String(Option<u32>),
    Text,
    /// Rendered through the dialect registry
    UnicodeText(Option<i64>),
    Timestamp,
    Json,
    Binary,
}

impl ColumnType {
    pub fn is_integer(&self) -> bool {
        matches!(self, Self::Integer | Self::BigInteger)
    }
}

/// Value the database fills in when an insert omits the column.
#[derive(Debug, Clone)]
pub enum ServerDefault {
    /// Dialect expression such as the UTC timestamp default
    Expression(DialectExpression),
    /// SQL text used as-is
    Literal(String),
}

/// Foreign key action on delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ForeignKeyAction {
    Cascade,
    SetNull,
    SetDefault,
    Restrict,
    NoAction,
}

impl ForeignKeyAction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
            Self::Restrict => "RESTRICT",
            Self::NoAction => "NO ACTION",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyRef {
    pub table: String,
    pub column: String,
    pub on_delete: Option<ForeignKeyAction>,
}

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    pub primary_key: bool,
    pub nullable: bool,
    /// Database generates the value when the insert carries none
    pub autoincrement: bool,
    pub unique: bool,
    pub server_default: Option<ServerDefault>,
    pub references: Option<ForeignKeyRef>,
}

impl Column {
    /// Nullable column with no constraints.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            primary_key: false,
            nullable: true,
            autoincrement: false,
            unique: false,
            server_default: None,
            references: None,
        }
    }

    /// Mark as primary key. Integer keys autoincrement unless turned off.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self.autoincrement = self.column_type.is_integer();
        self
    }

    pub fn autoincrement(mut self, enabled: bool) -> Self {
        self.autoincrement = enabled;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn server_default(mut self, default: ServerDefault) -> Self {
        self.server_default = Some(default);
        self
    }

    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.references = Some(ForeignKeyRef {
            table: table.into(),
            column: column.into(),
            on_delete: None,
        });
        self
    }

    /// Set the delete action of an existing reference.
    pub fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        if let Some(fk) = self.references.as_mut() {
            fk.on_delete = Some(action);
        }
        self
    }

    /// True when an insert may leave the column out.
    pub fn is_generated(&self) -> bool {
        self.autoincrement || self.server_default.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

impl Index {
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    pub indexes: Vec<Index>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn index(mut self, index: Index) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Look up a column, failing with a schema error when it is not declared.
    pub fn require_column(&self, name: &str) -> DbResult<&Column> {
        self.get_column(name).ok_or_else(|| {
            DbError::schema(
                format!("Table '{}' has no column '{}'", self.name, name),
                format!("{}.{}", self.name, name),
            )
        })
    }

    pub fn primary_key(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.primary_key)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// Point in the create-all / drop-all sequence where a hook runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaEvent {
    BeforeCreate,
    AfterCreate,
    BeforeDrop,
    AfterDrop,
}

/// DDL statement emitted at a schema event.
#[derive(Debug, Clone)]
pub struct DdlHook {
    pub event: SchemaEvent,
    pub expression: DialectExpression,
}

/// Caller-owned set of tables plus the DDL hooks attached to them.
///
/// Tables are created in declaration order and dropped in reverse. Hooks for
/// the same event run in registration order.
#[derive(Debug, Clone, Default)]
pub struct SchemaDescriptor {
    tables: Vec<Table>,
    hooks: Vec<DdlHook>,
}

impl SchemaDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`add_table`](Self::add_table).
    pub fn with_table(mut self, table: Table) -> Self {
        self.add_table(table);
        self
    }

    /// Add a table. A table with the same name is replaced in place.
    pub fn add_table(&mut self, table: Table) {
        match self.tables.iter_mut().find(|t| t.name == table.name) {
            Some(existing) => *existing = table,
            None => self.tables.push(table),
        }
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Attach a DDL statement to a schema event.
    pub fn on(&mut self, event: SchemaEvent, expression: DialectExpression) {
        self.hooks.push(DdlHook { event, expression });
    }

    pub fn hooks(&self) -> &[DdlHook] {
        &self.hooks
    }

    pub fn hooks_for(&self, event: SchemaEvent) -> impl Iterator<Item = &DdlHook> {
        self.hooks.iter().filter(move |h| h.event == event)
    }
}

/// A record type stored in one table.
///
/// Records cross the engine boundary as JSON maps keyed by column name, so the
/// serde field names must match the table's column names.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync {
    fn table() -> Table;

    fn to_record(&self) -> DbResult<Record> {
        match serde_json::to_value(self) {
            Ok(JsonValue::Object(map)) => Ok(map),
            Ok(other) => Err(DbError::schema(
                format!("Entity must serialize to an object, got {}", other),
                Self::table().name,
            )),
            Err(e) => Err(DbError::schema(
                format!("Failed to serialize entity: {}", e),
                Self::table().name,
            )),
        }
    }

    fn from_record(record: Record) -> DbResult<Self> {
        serde_json::from_value(JsonValue::Object(record)).map_err(|e| {
            DbError::schema(
                format!("Failed to decode row: {}", e),
                Self::table().name,
            )
        })
    }
}

/// Relation found by introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    pub table_type: TableType,
}

impl TableInfo {
    pub fn new(name: impl Into<String>, table_type: TableType) -> Self {
        Self {
            name: name.into(),
            table_type,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableType {
    Table,
    View,
    MaterializedView,
}

impl TableType {
    /// Parse table type from database-specific string.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "view" => Self::View,
            "materialized view" | "matview" => Self::MaterializedView,
            _ => Self::Table,
        }
    }
}

impl std::fmt::Display for TableType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::View => write!(f, "view"),
            Self::MaterializedView => write!(f, "materialized_view"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize)]
    struct Tag {
        id: Option<i64>,
        label: String,
    }

    impl Entity for Tag {
        fn table() -> Table {
            Table::new("tag")
                .column(Column::new("id", ColumnType::Integer).primary_key())
                .column(Column::new("label", ColumnType::String(Some(32))).not_null())
        }
    }

    #[test]
    fn test_primary_key_defaults() {
        let id = Column::new("id", ColumnType::Integer).primary_key();
        assert!(id.autoincrement);
        assert!(!id.nullable);

        let code = Column::new("code", ColumnType::String(Some(8))).primary_key();
        assert!(!code.autoincrement);
    }

    #[test]
    fn test_require_column() {
        let table = Tag::table();
        assert!(table.require_column("label").is_ok());
        let err = table.require_column("color").unwrap_err();
        assert!(matches!(err, DbError::Schema { .. }));
    }

    #[test]
    fn test_add_table_replaces_same_name() {
        let mut schema = SchemaDescriptor::new()
            .with_table(Table::new("a"))
            .with_table(Table::new("b"));
        schema.add_table(Table::new("a").column(Column::new("x", ColumnType::Text)));
        let names: Vec<_> = schema.tables().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(schema.get_table("a").unwrap().columns.len(), 1);
    }

    #[test]
    fn test_hooks_for_event_keep_order() {
        let mut schema = SchemaDescriptor::new();
        schema.on(SchemaEvent::AfterCreate, DialectExpression::drop_view("first", false));
        schema.on(SchemaEvent::BeforeDrop, DialectExpression::drop_view("other", false));
        schema.on(SchemaEvent::AfterCreate, DialectExpression::drop_view("second", false));

        let names: Vec<_> = schema
            .hooks_for(SchemaEvent::AfterCreate)
            .map(|h| match &h.expression {
                DialectExpression::DropView { name, .. } => name.clone(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(names, ["first", "second"]);
    }

    #[test]
    fn test_entity_record_conversion() {
        let tag = Tag {
            id: None,
            label: "rust".into(),
        };
        let record = tag.to_record().unwrap();
        assert_eq!(record.get("label"), Some(&JsonValue::from("rust")));
        assert_eq!(record.get("id"), Some(&JsonValue::Null));

        let back = Tag::from_record(record).unwrap();
        assert_eq!(back.label, "rust");
    }

    #[test]
    fn test_table_type_parse() {
        assert_eq!(TableType::parse("BASE TABLE"), TableType::Table);
        assert_eq!(TableType::parse("view"), TableType::View);
        assert_eq!(TableType::parse("matview"), TableType::MaterializedView);
    }
}
