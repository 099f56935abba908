use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::db_column;
use crate::sqlite_persistence::{
    initialize_versioned_db, RefAction, Reference, SchemaVersion, SqlType, Table,
    DEFAULT_UNIX_TIMESTAMP,
};

use super::auth::{
    ApiKey, ApiKeyValue, PasswordCredentials, SessionToken, SessionTokenValue,
};
use super::user_models::{User, UserRole};
use super::user_store::{ApiKeyStore, CredentialsStore, SessionTokenStore, UserStore};

const USER_TABLE_V_0: Table = Table {
    name: "user",
    columns: &[
        db_column!("id", SqlType::Integer, primary_key = true),
        db_column!("handle", SqlType::Text, non_null = true, unique = true),
        db_column!(
            "created",
            SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_UNIX_TIMESTAMP)
        ),
    ],
    indices: &[("idx_user_handle", "handle")],
    unique_constraints: &[],
};

const SESSION_TOKEN_TABLE_V_0: Table = Table {
    name: "session_token",
    columns: &[
        db_column!(
            "user_id",
            SqlType::Integer,
            non_null = true,
            references = Some(Reference {
                table: "user",
                column: "id",
                on_delete: RefAction::Cascade,
            })
        ),
        db_column!("value", SqlType::Text, non_null = true, unique = true),
        db_column!(
            "created",
            SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_UNIX_TIMESTAMP)
        ),
        db_column!("last_used", SqlType::Integer),
    ],
    indices: &[("idx_session_token_value", "value")],
    unique_constraints: &[],
};

const PASSWORD_CREDENTIALS_TABLE_V_0: Table = Table {
    name: "password_credentials",
    columns: &[
        db_column!(
            "user_id",
            SqlType::Integer,
            non_null = true,
            unique = true,
            references = Some(Reference {
                table: "user",
                column: "id",
                on_delete: RefAction::Cascade,
            })
        ),
        db_column!("salt", SqlType::Text, non_null = true),
        db_column!("hash", SqlType::Text, non_null = true),
        db_column!("hasher", SqlType::Text, non_null = true),
        db_column!(
            "created",
            SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_UNIX_TIMESTAMP)
        ),
        db_column!("last_used", SqlType::Integer),
    ],
    indices: &[],
    unique_constraints: &[],
};

const USER_ROLE_TABLE_V_0: Table = Table {
    name: "user_role",
    columns: &[
        db_column!(
            "user_id",
            SqlType::Integer,
            non_null = true,
            references = Some(Reference {
                table: "user",
                column: "id",
                on_delete: RefAction::Cascade,
            })
        ),
        db_column!("role", SqlType::Text, non_null = true),
        db_column!(
            "created",
            SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_UNIX_TIMESTAMP)
        ),
    ],
    indices: &[("idx_user_role_user_id", "user_id")],
    unique_constraints: &[&["user_id", "role"]],
};

const API_KEY_TABLE_V_1: Table = Table {
    name: "api_key",
    columns: &[
        db_column!("id", SqlType::Text, primary_key = true),
        db_column!(
            "user_id",
            SqlType::Integer,
            non_null = true,
            references = Some(Reference {
                table: "user",
                column: "id",
                on_delete: RefAction::Cascade,
            })
        ),
        db_column!("name", SqlType::Text, non_null = true),
        db_column!("value", SqlType::Text, non_null = true, unique = true),
        db_column!(
            "active",
            SqlType::Integer,
            non_null = true,
            default_value = Some("1")
        ),
        db_column!(
            "created",
            SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_UNIX_TIMESTAMP)
        ),
        db_column!("last_used", SqlType::Integer),
    ],
    indices: &[
        ("idx_api_key_value", "value"),
        ("idx_api_key_user_id", "user_id"),
    ],
    unique_constraints: &[],
};

fn migrate_v0_to_v1(conn: &Connection) -> Result<()> {
    API_KEY_TABLE_V_1.create(conn)
}

const USER_VERSIONED_SCHEMAS: [SchemaVersion; 2] = [
    SchemaVersion {
        version: 0,
        tables: &[
            &USER_TABLE_V_0,
            &SESSION_TOKEN_TABLE_V_0,
            &PASSWORD_CREDENTIALS_TABLE_V_0,
            &USER_ROLE_TABLE_V_0,
        ],
        migration: None,
    },
    SchemaVersion {
        version: 1,
        tables: &[
            &USER_TABLE_V_0,
            &SESSION_TOKEN_TABLE_V_0,
            &PASSWORD_CREDENTIALS_TABLE_V_0,
            &USER_ROLE_TABLE_V_0,
            &API_KEY_TABLE_V_1,
        ],
        migration: Some(migrate_v0_to_v1),
    },
];

fn system_time_from_epoch(secs: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs.max(0) as u64)
}

fn epoch_from_system_time(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn session_token_from_row(row: &Row) -> rusqlite::Result<SessionToken> {
    Ok(SessionToken {
        user_id: row.get::<_, i64>(0)? as usize,
        value: SessionTokenValue(row.get(1)?),
        created: system_time_from_epoch(row.get(2)?),
        last_used: row.get::<_, Option<i64>>(3)?.map(system_time_from_epoch),
    })
}

fn api_key_from_row(row: &Row) -> rusqlite::Result<ApiKey> {
    Ok(ApiKey {
        id: row.get(0)?,
        user_id: row.get::<_, i64>(1)? as usize,
        name: row.get(2)?,
        value: ApiKeyValue(row.get(3)?),
        active: row.get::<_, i64>(4)? != 0,
        created: system_time_from_epoch(row.get(5)?),
        last_used: row.get::<_, Option<i64>>(6)?.map(system_time_from_epoch),
    })
}

pub struct SqliteUserStore {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteUserStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let fresh = !path.exists();
        let mut conn = Connection::open(path)
            .with_context(|| format!("Failed to open user database at {:?}", path))?;
        conn.execute("PRAGMA foreign_keys = ON;", [])?;
        initialize_versioned_db(&mut conn, &USER_VERSIONED_SCHEMAS, fresh)
            .context("User database schema initialization failed")?;
        Ok(SqliteUserStore {
            connection: Arc::new(Mutex::new(conn)),
        })
    }
}

impl UserStore for SqliteUserStore {
    fn create_user(&self, user_handle: &str) -> Result<usize> {
        let conn = self.connection.lock().unwrap();
        conn.execute(
            "INSERT INTO user (handle) VALUES (?1)",
            params![user_handle],
        )
        .with_context(|| format!("Failed to create user {}", user_handle))?;
        Ok(conn.last_insert_rowid() as usize)
    }

    fn get_user(&self, user_id: usize) -> Result<Option<User>> {
        let conn = self.connection.lock().unwrap();
        let user = conn
            .query_row(
                "SELECT id, handle, created FROM user WHERE id = ?1",
                params![user_id as i64],
                |row| {
                    Ok(User {
                        id: row.get::<_, i64>(0)? as usize,
                        handle: row.get(1)?,
                        created: system_time_from_epoch(row.get(2)?),
                    })
                },
            )
            .optional()?;
        Ok(user)
    }

    fn get_user_id(&self, user_handle: &str) -> Result<Option<usize>> {
        let conn = self.connection.lock().unwrap();
        let id = conn
            .query_row(
                "SELECT id FROM user WHERE handle = ?1",
                params![user_handle],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(id.map(|id| id as usize))
    }

    fn get_user_handle(&self, user_id: usize) -> Result<Option<String>> {
        let conn = self.connection.lock().unwrap();
        let handle = conn
            .query_row(
                "SELECT handle FROM user WHERE id = ?1",
                params![user_id as i64],
                |row| row.get(0),
            )
            .optional()?;
        Ok(handle)
    }

    fn get_all_user_handles(&self) -> Result<Vec<String>> {
        let conn = self.connection.lock().unwrap();
        let mut stmt = conn.prepare("SELECT handle FROM user ORDER BY id")?;
        let handles = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;
        Ok(handles)
    }

    fn get_user_roles(&self, user_id: usize) -> Result<Vec<UserRole>> {
        let conn = self.connection.lock().unwrap();
        let mut stmt = conn.prepare("SELECT role FROM user_role WHERE user_id = ?1")?;
        let names: Vec<String> = stmt
            .query_map(params![user_id as i64], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;
        names
            .iter()
            .map(|name| {
                UserRole::from_str(name)
                    .with_context(|| format!("Unknown role {} in user database", name))
            })
            .collect()
    }

    fn add_user_role(&self, user_id: usize, role: UserRole) -> Result<()> {
        let conn = self.connection.lock().unwrap();
        conn.execute(
            "INSERT INTO user_role (user_id, role) VALUES (?1, ?2)",
            params![user_id as i64, role.as_str()],
        )
        .with_context(|| format!("Failed to add role {} to user {}", role.as_str(), user_id))?;
        Ok(())
    }

    fn remove_user_role(&self, user_id: usize, role: UserRole) -> Result<()> {
        let conn = self.connection.lock().unwrap();
        conn.execute(
            "DELETE FROM user_role WHERE user_id = ?1 AND role = ?2",
            params![user_id as i64, role.as_str()],
        )?;
        Ok(())
    }
}

impl SessionTokenStore for SqliteUserStore {
    fn get_session_token(&self, value: &SessionTokenValue) -> Result<Option<SessionToken>> {
        let conn = self.connection.lock().unwrap();
        let token = conn
            .query_row(
                "SELECT user_id, value, created, last_used FROM session_token WHERE value = ?1",
                params![value.0],
                session_token_from_row,
            )
            .optional()?;
        Ok(token)
    }

    fn add_session_token(&self, token: SessionToken) -> Result<()> {
        let conn = self.connection.lock().unwrap();
        conn.execute(
            "INSERT INTO session_token (user_id, value, created, last_used) VALUES (?1, ?2, ?3, ?4)",
            params![
                token.user_id as i64,
                token.value.0,
                epoch_from_system_time(token.created),
                token.last_used.map(epoch_from_system_time),
            ],
        )
        .context("Failed to add session token")?;
        Ok(())
    }

    fn delete_session_token(&self, value: &SessionTokenValue) -> Result<Option<SessionToken>> {
        let conn = self.connection.lock().unwrap();
        let token = conn
            .query_row(
                "SELECT user_id, value, created, last_used FROM session_token WHERE value = ?1",
                params![value.0],
                session_token_from_row,
            )
            .optional()?;
        if token.is_some() {
            conn.execute(
                "DELETE FROM session_token WHERE value = ?1",
                params![value.0],
            )?;
        }
        Ok(token)
    }

    fn update_session_token_last_used(&self, value: &SessionTokenValue) -> Result<()> {
        let conn = self.connection.lock().unwrap();
        conn.execute(
            "UPDATE session_token SET last_used = cast(strftime('%s','now') as int) WHERE value = ?1",
            params![value.0],
        )?;
        Ok(())
    }
}

impl CredentialsStore for SqliteUserStore {
    fn get_password_credentials(&self, user_id: usize) -> Result<Option<PasswordCredentials>> {
        let conn = self.connection.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT user_id, salt, hash, hasher, created, last_used
                 FROM password_credentials WHERE user_id = ?1",
                params![user_id as i64],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, Option<i64>>(5)?,
                    ))
                },
            )
            .optional()?;
        match row {
            None => Ok(None),
            Some((user_id, salt, hash, hasher, created, last_used)) => {
                Ok(Some(PasswordCredentials {
                    user_id: user_id as usize,
                    salt,
                    hash,
                    hasher: hasher.parse()?,
                    created: system_time_from_epoch(created),
                    last_used: last_used.map(system_time_from_epoch),
                }))
            }
        }
    }

    fn upsert_password_credentials(&self, credentials: PasswordCredentials) -> Result<()> {
        let conn = self.connection.lock().unwrap();
        conn.execute(
            "INSERT INTO password_credentials (user_id, salt, hash, hasher, created, last_used)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(user_id) DO UPDATE SET
                 salt = excluded.salt,
                 hash = excluded.hash,
                 hasher = excluded.hasher,
                 created = excluded.created,
                 last_used = excluded.last_used",
            params![
                credentials.user_id as i64,
                credentials.salt,
                credentials.hash,
                credentials.hasher.to_string(),
                epoch_from_system_time(credentials.created),
                credentials.last_used.map(epoch_from_system_time),
            ],
        )
        .context("Failed to store password credentials")?;
        Ok(())
    }
}

impl ApiKeyStore for SqliteUserStore {
    fn add_api_key(&self, key: ApiKey) -> Result<()> {
        let conn = self.connection.lock().unwrap();
        conn.execute(
            "INSERT INTO api_key (id, user_id, name, value, active, created, last_used)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                key.id,
                key.user_id as i64,
                key.name,
                key.value.0,
                key.active as i64,
                epoch_from_system_time(key.created),
                key.last_used.map(epoch_from_system_time),
            ],
        )
        .context("Failed to add API key")?;
        Ok(())
    }

    fn get_api_key_by_value(&self, value: &ApiKeyValue) -> Result<Option<ApiKey>> {
        let conn = self.connection.lock().unwrap();
        let key = conn
            .query_row(
                "SELECT id, user_id, name, value, active, created, last_used
                 FROM api_key WHERE value = ?1",
                params![value.0],
                api_key_from_row,
            )
            .optional()?;
        Ok(key)
    }

    fn get_api_key(&self, key_id: &str) -> Result<Option<ApiKey>> {
        let conn = self.connection.lock().unwrap();
        let key = conn
            .query_row(
                "SELECT id, user_id, name, value, active, created, last_used
                 FROM api_key WHERE id = ?1",
                params![key_id],
                api_key_from_row,
            )
            .optional()?;
        Ok(key)
    }

    fn get_user_api_keys(&self, user_id: usize) -> Result<Vec<ApiKey>> {
        let conn = self.connection.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, name, value, active, created, last_used
             FROM api_key WHERE user_id = ?1 ORDER BY created",
        )?;
        let keys = stmt
            .query_map(params![user_id as i64], api_key_from_row)?
            .collect::<std::result::Result<_, _>>()?;
        Ok(keys)
    }

    fn set_api_key_active(&self, key_id: &str, active: bool) -> Result<bool> {
        let conn = self.connection.lock().unwrap();
        let updated = conn.execute(
            "UPDATE api_key SET active = ?2 WHERE id = ?1",
            params![key_id, active as i64],
        )?;
        Ok(updated > 0)
    }

    fn update_api_key_last_used(&self, key_id: &str) -> Result<()> {
        let conn = self.connection.lock().unwrap();
        conn.execute(
            "UPDATE api_key SET last_used = cast(strftime('%s','now') as int) WHERE id = ?1",
            params![key_id],
        )?;
        Ok(())
    }
}
