mod versioned_schema;

pub use versioned_schema::{
    initialize_versioned_db, Column, RefAction, Reference, SchemaVersion, SqlType, Table,
    DEFAULT_UNIX_TIMESTAMP, USER_VERSION_OFFSET,
};
