use super::{IdentityRecord, IdentityStore};
use crate::error::{Error, ErrorKind};
use crate::keys::PublicKey;
use crate::metadata::ProfileMetadata;
use crate::misc::Unixtime;
use crate::relay_url::{parse_relay_hints, RelayUrl};
use async_trait::async_trait;
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::spawn_blocking;

const IDENTITY_COLUMNS: &str = "username, pubkey, lightning_address, relays, \
                                display_name, about, picture, banner, \
                                followers, following, metadata_updated_at, created_at";

/// The identity registry and settings, kept in a SQLite database
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database file and bring its schema up to date
    pub async fn open(path: PathBuf) -> Result<SqliteStore, Error> {
        let connection = spawn_blocking(move || {
            let db = Connection::open_with_flags(
                &path,
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX
                    | OpenFlags::SQLITE_OPEN_NOFOLLOW,
            )?;

            // Performance:
            db.pragma_update(None, "journal_mode", "WAL")?;
            db.pragma_update(None, "synchronous", "normal")?;
            db.pragma_update(None, "temp_store", "memory")?;

            check_and_upgrade(&db)?;
            Ok::<Connection, Error>(db)
        })
        .await??;

        Ok(SqliteStore {
            db: Arc::new(Mutex::new(connection)),
        })
    }

    pub async fn open_in_memory() -> Result<SqliteStore, Error> {
        let connection = spawn_blocking(move || {
            let db = Connection::open_in_memory()?;
            check_and_upgrade(&db)?;
            Ok::<Connection, Error>(db)
        })
        .await??;

        Ok(SqliteStore {
            db: Arc::new(Mutex::new(connection)),
        })
    }

    async fn fetch(
        &self,
        criteria: Option<&'static str>,
        param: Option<String>,
    ) -> Result<Vec<IdentityRecord>, Error> {
        let sql = match criteria {
            None => format!("SELECT {} FROM identity", IDENTITY_COLUMNS),
            Some(crit) => format!("SELECT {} FROM identity WHERE {}", IDENTITY_COLUMNS, crit),
        };
        let sql = format!("{} ORDER BY created_at DESC, rowid DESC", sql);

        let db = self.db.clone();
        spawn_blocking(move || {
            let db = db.blocking_lock();
            let mut stmt = db.prepare(&sql)?;
            let mut rows = match param {
                Some(p) => stmt.query([p])?,
                None => stmt.query([])?,
            };
            let mut output: Vec<IdentityRecord> = Vec::new();
            while let Some(row) = rows.next()? {
                output.push(identity_from_row(row)?);
            }
            Ok::<Vec<IdentityRecord>, Error>(output)
        })
        .await?
    }

    /// Add a new identity. Usernames and public keys are each unique.
    pub async fn register(
        &self,
        username: &str,
        pubkey: PublicKey,
        lightning_address: Option<String>,
        relays: Vec<RelayUrl>,
    ) -> Result<IdentityRecord, Error> {
        let username = username.trim().to_owned();
        if username.is_empty() {
            return Err(ErrorKind::General("username must not be empty".to_owned()).into());
        }

        let mut record = IdentityRecord::new(&username, pubkey);
        record.lightning_address = lightning_address.filter(|a| !a.trim().is_empty());
        record.relays = relays;

        let relays_json = serde_json::to_string(&record.relays)?;
        let username2 = record.username.clone();
        let lightning_address = record.lightning_address.clone();
        let created_at = record.created_at.0;
        let db = self.db.clone();
        spawn_blocking(move || -> Result<(), Error> {
            let db = db.blocking_lock();
            let username_taken: Option<String> = db
                .query_row(
                    "SELECT pubkey FROM identity WHERE username = ?",
                    [&username2],
                    |row| row.get(0),
                )
                .optional()?;
            if username_taken.is_some() {
                return Err(ErrorKind::UsernameTaken(username2).into());
            }
            let pubkey_taken: Option<String> = db
                .query_row(
                    "SELECT username FROM identity WHERE pubkey = ?",
                    [pubkey.as_hex_string()],
                    |row| row.get(0),
                )
                .optional()?;
            if pubkey_taken.is_some() {
                return Err(ErrorKind::PublicKeyTaken.into());
            }

            let sql = "INSERT INTO identity (username, pubkey, lightning_address, relays, created_at) \
                       VALUES (?, ?, ?, ?, ?)";
            let mut stmt = db.prepare(sql)?;
            stmt.execute((
                &username2,
                pubkey.as_hex_string(),
                &lightning_address,
                &relays_json,
                created_at,
            ))?;
            Ok::<(), Error>(())
        })
        .await??;

        tracing::info!("Registered {} as {}", record.username, pubkey);
        Ok(record)
    }

    /// Change the account fields of an identity. Metadata is left alone.
    pub async fn update_account(
        &self,
        pubkey: PublicKey,
        username: &str,
        lightning_address: Option<String>,
        relays: Vec<RelayUrl>,
    ) -> Result<(), Error> {
        let username = username.trim().to_owned();
        if username.is_empty() {
            return Err(ErrorKind::General("username must not be empty".to_owned()).into());
        }
        let lightning_address = lightning_address.filter(|a| !a.trim().is_empty());
        let relays_json = serde_json::to_string(&relays)?;

        let db = self.db.clone();
        spawn_blocking(move || -> Result<(), Error> {
            let db = db.blocking_lock();
            let taken_by: Option<String> = db
                .query_row(
                    "SELECT pubkey FROM identity WHERE username = ? AND pubkey != ?",
                    [username.clone(), pubkey.as_hex_string()],
                    |row| row.get(0),
                )
                .optional()?;
            if taken_by.is_some() {
                return Err(ErrorKind::UsernameTaken(username).into());
            }

            let sql = "UPDATE identity SET username = ?, lightning_address = ?, relays = ? \
                       WHERE pubkey = ?";
            let mut stmt = db.prepare(sql)?;
            let changed = stmt.execute((
                &username,
                &lightning_address,
                &relays_json,
                pubkey.as_hex_string(),
            ))?;
            if changed == 0 {
                return Err(ErrorKind::IdentityNotFound(pubkey.as_hex_string()).into());
            }
            Ok::<(), Error>(())
        })
        .await??;

        Ok(())
    }

    /// All settings rows except the schema version
    pub async fn read_settings(&self) -> Result<Vec<(String, String)>, Error> {
        let db = self.db.clone();
        spawn_blocking(move || {
            let db = db.blocking_lock();
            let mut stmt = db.prepare("SELECT key, value FROM settings WHERE key != 'version'")?;
            let mut rows = stmt.query([])?;
            let mut output: Vec<(String, String)> = Vec::new();
            while let Some(row) = rows.next()? {
                output.push((row.get(0)?, row.get(1)?));
            }
            Ok::<Vec<(String, String)>, Error>(output)
        })
        .await?
    }

    pub async fn write_setting(&self, key: &'static str, value: String) -> Result<(), Error> {
        let db = self.db.clone();
        spawn_blocking(move || {
            let db = db.blocking_lock();
            let mut stmt = db.prepare("REPLACE INTO settings (key, value) VALUES (?, ?)")?;
            stmt.execute((key, &value))?;
            Ok::<(), Error>(())
        })
        .await??;
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for SqliteStore {
    async fn read_by_pubkey(&self, pubkey: PublicKey) -> Result<Option<IdentityRecord>, Error> {
        let records = self
            .fetch(Some("pubkey = ?"), Some(pubkey.as_hex_string()))
            .await?;
        Ok(records.into_iter().next())
    }

    async fn read_by_username(&self, username: &str) -> Result<Option<IdentityRecord>, Error> {
        let records = self
            .fetch(Some("username = ?"), Some(username.to_owned()))
            .await?;
        Ok(records.into_iter().next())
    }

    async fn update_metadata(
        &self,
        pubkey: PublicKey,
        metadata: &ProfileMetadata,
    ) -> Result<(), Error> {
        let sql = "UPDATE identity SET display_name = ?, about = ?, picture = ?, banner = ?, \
                   followers = ?, following = ?, metadata_updated_at = ? WHERE pubkey = ?";
        let metadata = metadata.clone();
        let db = self.db.clone();
        spawn_blocking(move || -> Result<(), Error> {
            let db = db.blocking_lock();
            let mut stmt = db.prepare(sql)?;
            let changed = stmt.execute((
                &metadata.display_name,
                &metadata.about,
                &metadata.picture,
                &metadata.banner,
                metadata.followers,
                metadata.following,
                metadata.updated_at.map(|u| u.0),
                pubkey.as_hex_string(),
            ))?;
            if changed == 0 {
                return Err(ErrorKind::IdentityNotFound(pubkey.as_hex_string()).into());
            }
            Ok::<(), Error>(())
        })
        .await??;
        Ok(())
    }

    async fn list_by_recency(&self, search: Option<&str>) -> Result<Vec<IdentityRecord>, Error> {
        let records = self.fetch(None, None).await?;
        Ok(match search {
            Some(s) => records.into_iter().filter(|r| r.matches_search(s)).collect(),
            None => records,
        })
    }

    async fn count(&self) -> Result<usize, Error> {
        let db = self.db.clone();
        spawn_blocking(move || {
            let db = db.blocking_lock();
            let count: usize = db.query_row("SELECT count(*) FROM identity", [], |row| row.get(0))?;
            Ok::<usize, Error>(count)
        })
        .await?
    }
}

fn identity_from_row(row: &Row<'_>) -> Result<IdentityRecord, Error> {
    let pubkey: String = row.get(1)?;
    let relays: String = row.get(3)?;
    let relays: Vec<String> = serde_json::from_str(&relays)?;
    let updated_at: Option<i64> = row.get(10)?;
    Ok(IdentityRecord {
        username: row.get(0)?,
        pubkey: PublicKey::try_from_hex_string(&pubkey)?,
        lightning_address: row.get(2)?,
        relays: parse_relay_hints(relays.iter().map(|s| s.as_str())),
        metadata: ProfileMetadata {
            display_name: row.get(4)?,
            about: row.get(5)?,
            picture: row.get(6)?,
            banner: row.get(7)?,
            followers: row.get(8)?,
            following: row.get(9)?,
            updated_at: updated_at.map(Unixtime),
        },
        created_at: Unixtime(row.get(11)?),
    })
}

fn check_and_upgrade(db: &Connection) -> Result<(), Error> {
    // A fresh database has no settings table yet
    match db.query_row(
        "SELECT value FROM settings WHERE key = 'version'",
        [],
        |row| row.get::<usize, String>(0),
    ) {
        Ok(v) => upgrade(db, v.parse::<u16>()?),
        Err(_) => upgrade(db, 0),
    }
}

macro_rules! apply_sql {
    ($db:ident, $version:ident, $thisversion:expr, $file:expr) => {{
        if $version < $thisversion {
            tracing::info!("Upgrading database to version {}", $thisversion);
            $db.execute_batch(include_str!($file))?;
            $db.execute(
                &format!(
                    "UPDATE settings SET value='{}' WHERE key='version'",
                    $thisversion
                ),
                (),
            )?;
            $version = $thisversion;
        }
    }};
}

fn upgrade(db: &Connection, mut version: u16) -> Result<(), Error> {
    apply_sql!(db, version, 1, "schema1.sql");

    tracing::debug!("Database is at version {}", version);

    Ok(())
}
