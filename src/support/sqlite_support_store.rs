use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::db_column;
use crate::sqlite_persistence::{
    initialize_versioned_db, RefAction, Reference, SchemaVersion, SqlType, Table,
};

use super::models::{CaseMessage, CaseStatus, SupportCase};
use super::store::SupportStore;

const SUPPORT_CASE_TABLE_V_0: Table = Table {
    name: "support_case",
    columns: &[
        db_column!("id", SqlType::Integer, primary_key = true),
        db_column!("user_id", SqlType::Integer, non_null = true),
        db_column!("subject", SqlType::Text, non_null = true),
        db_column!("status", SqlType::Text, non_null = true),
        db_column!("created_at", SqlType::Text, non_null = true),
        db_column!("updated_at", SqlType::Text, non_null = true),
    ],
    indices: &[
        ("idx_support_case_user_id", "user_id"),
        ("idx_support_case_updated_at", "updated_at DESC"),
    ],
    unique_constraints: &[],
};

const CASE_MESSAGE_TABLE_V_0: Table = Table {
    name: "case_message",
    columns: &[
        db_column!("id", SqlType::Integer, primary_key = true),
        db_column!(
            "support_case_id",
            SqlType::Integer,
            non_null = true,
            references = Some(Reference {
                table: "support_case",
                column: "id",
                on_delete: RefAction::Cascade,
            })
        ),
        db_column!("user_id", SqlType::Integer, non_null = true),
        db_column!("message", SqlType::Text, non_null = true),
        db_column!("created_at", SqlType::Text, non_null = true),
    ],
    indices: &[("idx_case_message_case_id", "support_case_id")],
    unique_constraints: &[],
};

const SUPPORT_VERSIONED_SCHEMAS: [SchemaVersion; 1] = [SchemaVersion {
    version: 0,
    tables: &[&SUPPORT_CASE_TABLE_V_0, &CASE_MESSAGE_TABLE_V_0],
    migration: None,
}];

pub struct SqliteSupportStore {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteSupportStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let fresh = !path.exists();
        let mut conn = Connection::open(path)
            .with_context(|| format!("Failed to open support database at {:?}", path))?;
        conn.execute("PRAGMA foreign_keys = ON;", [])?;
        initialize_versioned_db(&mut conn, &SUPPORT_VERSIONED_SCHEMAS, fresh)
            .context("Support database schema initialization failed")?;
        Ok(SqliteSupportStore {
            connection: Arc::new(Mutex::new(conn)),
        })
    }

    // Fixed-width timestamps so the TEXT column sorts chronologically.
    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    fn parse_datetime(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    fn row_to_case(row: &rusqlite::Row) -> rusqlite::Result<SupportCase> {
        let status_str: String = row.get("status")?;
        let created_at_str: String = row.get("created_at")?;
        let updated_at_str: String = row.get("updated_at")?;
        Ok(SupportCase {
            id: row.get::<_, i64>("id")? as usize,
            user_id: row.get::<_, i64>("user_id")? as usize,
            subject: row.get("subject")?,
            status: CaseStatus::parse(&status_str).unwrap_or(CaseStatus::Open),
            created_at: Self::parse_datetime(&created_at_str),
            updated_at: Self::parse_datetime(&updated_at_str),
        })
    }

    fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<CaseMessage> {
        let created_at_str: String = row.get("created_at")?;
        Ok(CaseMessage {
            id: row.get::<_, i64>("id")? as usize,
            support_case_id: row.get::<_, i64>("support_case_id")? as usize,
            user_id: row.get::<_, i64>("user_id")? as usize,
            message: row.get("message")?,
            created_at: Self::parse_datetime(&created_at_str),
        })
    }
}

impl SupportStore for SqliteSupportStore {
    fn create_case_with_message(
        &self,
        user_id: usize,
        subject: &str,
        message: &str,
    ) -> Result<SupportCase> {
        let mut conn = self.connection.lock().unwrap();
        let tx = conn.transaction()?;
        let timestamp = Self::format_datetime(&Utc::now());
        tx.execute(
            "INSERT INTO support_case (user_id, subject, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![user_id as i64, subject, CaseStatus::Open.as_str(), timestamp],
        )?;
        let case_id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO case_message (support_case_id, user_id, message, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![case_id, user_id as i64, message, timestamp],
        )?;
        tx.commit().context("Failed to create support case")?;

        let created_at = Self::parse_datetime(&timestamp);
        Ok(SupportCase {
            id: case_id as usize,
            user_id,
            subject: subject.to_string(),
            status: CaseStatus::Open,
            created_at,
            updated_at: created_at,
        })
    }

    fn get_case(&self, case_id: usize) -> Result<Option<SupportCase>> {
        let conn = self.connection.lock().unwrap();
        let case = conn
            .query_row(
                "SELECT id, user_id, subject, status, created_at, updated_at
                 FROM support_case WHERE id = ?1",
                params![case_id as i64],
                Self::row_to_case,
            )
            .optional()?;
        Ok(case)
    }

    fn get_user_cases(&self, user_id: usize) -> Result<Vec<SupportCase>> {
        let conn = self.connection.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, subject, status, created_at, updated_at
             FROM support_case WHERE user_id = ?1 ORDER BY updated_at DESC, id DESC",
        )?;
        let cases = stmt
            .query_map(params![user_id as i64], Self::row_to_case)?
            .collect::<std::result::Result<_, _>>()?;
        Ok(cases)
    }

    fn get_all_cases(&self) -> Result<Vec<SupportCase>> {
        let conn = self.connection.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, subject, status, created_at, updated_at
             FROM support_case ORDER BY updated_at DESC, id DESC",
        )?;
        let cases = stmt
            .query_map([], Self::row_to_case)?
            .collect::<std::result::Result<_, _>>()?;
        Ok(cases)
    }

    fn add_message(&self, case_id: usize, user_id: usize, message: &str) -> Result<CaseMessage> {
        let mut conn = self.connection.lock().unwrap();
        let tx = conn.transaction()?;
        let timestamp = Self::format_datetime(&Utc::now());
        let updated = tx.execute(
            "UPDATE support_case SET updated_at = ?2 WHERE id = ?1",
            params![case_id as i64, timestamp],
        )?;
        if updated == 0 {
            bail!("Support case {} does not exist", case_id);
        }
        tx.execute(
            "INSERT INTO case_message (support_case_id, user_id, message, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![case_id as i64, user_id as i64, message, timestamp],
        )?;
        let message_id = tx.last_insert_rowid();
        tx.commit().context("Failed to add case message")?;

        Ok(CaseMessage {
            id: message_id as usize,
            support_case_id: case_id,
            user_id,
            message: message.to_string(),
            created_at: Self::parse_datetime(&timestamp),
        })
    }

    fn get_case_messages(&self, case_id: usize) -> Result<Vec<CaseMessage>> {
        let conn = self.connection.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, support_case_id, user_id, message, created_at
             FROM case_message WHERE support_case_id = ?1 ORDER BY id",
        )?;
        let messages = stmt
            .query_map(params![case_id as i64], Self::row_to_message)?
            .collect::<std::result::Result<_, _>>()?;
        Ok(messages)
    }

    fn set_case_status(&self, case_id: usize, status: CaseStatus) -> Result<bool> {
        let conn = self.connection.lock().unwrap();
        let timestamp = Self::format_datetime(&Utc::now());
        let updated = conn.execute(
            "UPDATE support_case SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![case_id as i64, status.as_str(), timestamp],
        )?;
        Ok(updated > 0)
    }
}
