//! Declarative sqlite schemas with versioning.
//!
//! Tables are described as consts, stamped into the database through
//! `PRAGMA user_version`, migrated step by step when an older file is
//! opened, and structurally validated (columns, indices, foreign keys)
//! every time.

use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use tracing::info;

/// Offset added to the schema version before it is written to
/// `PRAGMA user_version`. A sqlite file with a user_version below the
/// offset was not created by this crate and is rejected on open.
pub const USER_VERSION_OFFSET: i64 = 74000;

/// Column default for integer unix-epoch timestamps.
pub const DEFAULT_UNIX_TIMESTAMP: &str = "(cast(strftime('%s','now') as int))";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Integer,
    Text,
    Real,
    Blob,
}

impl SqlType {
    pub const fn as_sql(self) -> &'static str {
        match self {
            SqlType::Integer => "INTEGER",
            SqlType::Text => "TEXT",
            SqlType::Real => "REAL",
            SqlType::Blob => "BLOB",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefAction {
    Cascade,
    SetNull,
    Restrict,
}

impl RefAction {
    pub const fn as_sql(self) -> &'static str {
        match self {
            RefAction::Cascade => "CASCADE",
            RefAction::SetNull => "SET NULL",
            RefAction::Restrict => "RESTRICT",
        }
    }
}

/// Foreign key target of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference {
    pub table: &'static str,
    pub column: &'static str,
    pub on_delete: RefAction,
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: SqlType,
    pub non_null: bool,
    pub primary_key: bool,
    pub unique: bool,
    pub default_value: Option<&'static str>,
    pub references: Option<Reference>,
}

/// Shorthand for [`Column`] consts: `db_column!("name", SqlType::Text)`
/// with optional field overrides, e.g.
/// `db_column!("user_id", SqlType::Integer, non_null = true)`.
#[macro_export]
macro_rules! db_column {
    ($name:expr, $sql_type:expr) => {
        $crate::sqlite_persistence::Column {
            name: $name,
            sql_type: $sql_type,
            non_null: false,
            primary_key: false,
            unique: false,
            default_value: None,
            references: None,
        }
    };
    ($name:expr, $sql_type:expr, $($field:ident = $value:expr),+ $(,)?) => {
        $crate::sqlite_persistence::Column {
            $($field: $value,)+
            ..$crate::db_column!($name, $sql_type)
        }
    };
}

impl Column {
    fn definition_sql(&self) -> String {
        let mut sql = format!("{} {}", self.name, self.sql_type.as_sql());
        if self.primary_key {
            sql.push_str(" PRIMARY KEY");
        }
        if self.non_null {
            sql.push_str(" NOT NULL");
        }
        if self.unique {
            sql.push_str(" UNIQUE");
        }
        if let Some(default) = self.default_value {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        sql
    }
}

#[derive(Debug)]
pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column],
    /// `(index_name, indexed_columns)` pairs, created alongside the table.
    pub indices: &'static [(&'static str, &'static str)],
    /// Multi-column UNIQUE constraints; single-column uniques go on the column.
    pub unique_constraints: &'static [&'static [&'static str]],
}

impl Table {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        conn.execute_batch(&self.create_sql())
            .with_context(|| format!("Failed to create table {}", self.name))
    }

    pub fn create_sql(&self) -> String {
        let mut parts: Vec<String> = self.columns.iter().map(Column::definition_sql).collect();
        for constraint in self.unique_constraints {
            parts.push(format!("UNIQUE ({})", constraint.join(", ")));
        }
        for column in self.columns {
            if let Some(reference) = column.references {
                parts.push(format!(
                    "FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {}",
                    column.name,
                    reference.table,
                    reference.column,
                    reference.on_delete.as_sql()
                ));
            }
        }
        let mut sql = format!(
            "CREATE TABLE {} (\n    {}\n);",
            self.name,
            parts.join(",\n    ")
        );
        for (index_name, indexed_columns) in self.indices {
            sql.push_str(&format!(
                "\nCREATE INDEX {} ON {} ({});",
                index_name, self.name, indexed_columns
            ));
        }
        sql
    }

    pub fn validate(&self, conn: &Connection) -> Result<()> {
        self.validate_columns(conn)?;
        self.validate_indices(conn)?;
        self.validate_foreign_keys(conn)
    }

    fn validate_columns(&self, conn: &Connection) -> Result<()> {
        struct ColumnInfo {
            name: String,
            sql_type: String,
            non_null: bool,
            primary_key: bool,
        }

        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", self.name))?;
        let found: Vec<ColumnInfo> = stmt
            .query_map([], |row| {
                Ok(ColumnInfo {
                    name: row.get(1)?,
                    sql_type: row.get(2)?,
                    non_null: row.get::<_, i64>(3)? != 0,
                    primary_key: row.get::<_, i64>(5)? != 0,
                })
            })?
            .collect::<std::result::Result<_, _>>()?;

        if found.is_empty() {
            bail!("Table {} does not exist", self.name);
        }
        if found.len() != self.columns.len() {
            bail!(
                "Table {} has {} columns, expected {}",
                self.name,
                found.len(),
                self.columns.len()
            );
        }
        for column in self.columns {
            let info = found
                .iter()
                .find(|c| c.name == column.name)
                .with_context(|| format!("Table {} is missing column {}", self.name, column.name))?;
            if info.sql_type != column.sql_type.as_sql() {
                bail!(
                    "Column {}.{} has type {}, expected {}",
                    self.name,
                    column.name,
                    info.sql_type,
                    column.sql_type.as_sql()
                );
            }
            if info.non_null != column.non_null {
                bail!(
                    "Column {}.{} nullability mismatch (NOT NULL should be {})",
                    self.name,
                    column.name,
                    column.non_null
                );
            }
            if info.primary_key != column.primary_key {
                bail!("Column {}.{} primary key mismatch", self.name, column.name);
            }
        }
        Ok(())
    }

    fn validate_indices(&self, conn: &Connection) -> Result<()> {
        // (name, origin): "c" for CREATE INDEX, "u" for UNIQUE constraints.
        let mut stmt = conn.prepare(&format!("PRAGMA index_list({})", self.name))?;
        let found: Vec<(String, String)> = stmt
            .query_map([], |row| Ok((row.get(1)?, row.get(3)?)))?
            .collect::<std::result::Result<_, _>>()?;

        for (index_name, _) in self.indices {
            if !found
                .iter()
                .any(|(name, origin)| name == index_name && origin == "c")
            {
                bail!("Table {} is missing index {}", self.name, index_name);
            }
        }

        for constraint in self.unique_constraints {
            let satisfied = found
                .iter()
                .filter(|(_, origin)| origin == "u")
                .any(|(name, _)| match index_columns(conn, name) {
                    Ok(columns) => columns == *constraint,
                    Err(_) => false,
                });
            if !satisfied {
                bail!(
                    "Table {} is missing UNIQUE constraint on ({})",
                    self.name,
                    constraint.join(", ")
                );
            }
        }
        Ok(())
    }

    fn validate_foreign_keys(&self, conn: &Connection) -> Result<()> {
        struct ForeignKeyInfo {
            table: String,
            from: String,
            to: String,
            on_delete: String,
        }

        let mut stmt = conn.prepare(&format!("PRAGMA foreign_key_list({})", self.name))?;
        let found: Vec<ForeignKeyInfo> = stmt
            .query_map([], |row| {
                Ok(ForeignKeyInfo {
                    table: row.get(2)?,
                    from: row.get(3)?,
                    to: row.get(4)?,
                    on_delete: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<_, _>>()?;

        let declared: Vec<(&Column, Reference)> = self
            .columns
            .iter()
            .filter_map(|c| c.references.map(|r| (c, r)))
            .collect();

        if found.len() != declared.len() {
            bail!(
                "Table {} has {} foreign keys, expected {}",
                self.name,
                found.len(),
                declared.len()
            );
        }
        for (column, reference) in declared {
            let matched = found.iter().any(|fk| {
                fk.from == column.name
                    && fk.table == reference.table
                    && fk.to == reference.column
                    && fk.on_delete == reference.on_delete.as_sql()
            });
            if !matched {
                bail!(
                    "Table {} foreign key on {} does not match its declaration",
                    self.name,
                    column.name
                );
            }
        }
        Ok(())
    }
}

fn index_columns(conn: &Connection, index_name: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA index_info({})", index_name))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(2))?
        .collect::<std::result::Result<_, _>>()?;
    Ok(columns)
}

/// One version of a database layout. `tables` is the complete layout at
/// this version; `migration` transforms a database at the previous
/// version into this one (None only for the first version).
pub struct SchemaVersion {
    pub version: usize,
    pub tables: &'static [&'static Table],
    pub migration: Option<fn(&Connection) -> Result<()>>,
}

impl SchemaVersion {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            table.create(conn)?;
        }
        Ok(())
    }

    pub fn validate(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            table.validate(conn)?;
        }
        Ok(())
    }
}

/// Brings a just-opened connection to the latest schema version.
///
/// A fresh database gets the latest layout directly; an existing one is
/// checked against the version it claims, migrated step by step inside a
/// transaction, then validated against the latest layout.
pub fn initialize_versioned_db(
    conn: &mut Connection,
    schemas: &[SchemaVersion],
    fresh: bool,
) -> Result<()> {
    let latest = schemas.last().context("No schema versions defined")?;

    if fresh {
        latest.create(conn)?;
        stamp_version(conn, latest.version)?;
        return latest.validate(conn);
    }

    let raw: i64 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    let stored = raw - USER_VERSION_OFFSET;
    let position = schemas
        .iter()
        .position(|s| s.version as i64 == stored)
        .with_context(|| {
            format!(
                "Unknown database schema version {} (user_version {})",
                stored, raw
            )
        })?;

    schemas[position]
        .validate(conn)
        .with_context(|| format!("Schema validation failed at version {}", stored))?;

    if schemas[position].version < latest.version {
        let tx = conn.transaction()?;
        for schema in &schemas[position + 1..] {
            let migration = schema
                .migration
                .with_context(|| format!("No migration to schema version {}", schema.version))?;
            info!("Migrating database schema to version {}", schema.version);
            migration(&tx)?;
        }
        tx.commit()?;
        stamp_version(conn, latest.version)?;
    }

    latest
        .validate(conn)
        .context("Schema validation failed after migration")
}

fn stamp_version(conn: &Connection, version: usize) -> Result<()> {
    conn.execute(
        &format!("PRAGMA user_version = {}", USER_VERSION_OFFSET + version as i64),
        [],
    )?;
    Ok(())
}
