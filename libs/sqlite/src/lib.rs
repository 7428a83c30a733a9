use anyhow::{anyhow, Context, Result};
use rusqlite::{Connection, ErrorCode, OpenFlags, OptionalExtension};
use std::{rc::Rc, sync::Mutex, time::Duration};
use tracing::*;

use engine::storage::{EntryStorage, StorageFactory};
use kernel::prelude::{DirectoryError, Dn, Entry, SearchProgress, SearchRequest};

pub const MEMORY_SPECIAL: &str = ":memory:";

/// How long a session waits on another session's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

pub struct SqliteStorage<C>
where
    C: AsConnection,
{
    conn: C,
}

enum SetupQuery {
    Execute(&'static str),
    Query(&'static str),
}

pub trait AsConnection {
    fn connection(&self) -> &Connection;
}

pub trait Migrate {
    fn migrate(&self) -> Result<()>;
}

impl Migrate for Connection {
    fn migrate(&self) -> Result<()> {
        let exec = |query: SetupQuery| -> Result<()> {
            match query {
                SetupQuery::Execute(sql) => {
                    let mut stmt = self.prepare(sql)?;
                    stmt.execute([])?;
                }
                SetupQuery::Query(sql) => {
                    let mut stmt = self.prepare(sql)?;
                    let _ = stmt.query([])?;
                }
            };
            Ok(())
        };

        exec(SetupQuery::Query("PRAGMA journal_mode = WAL"))?;

        exec(SetupQuery::Execute(
            r#"
                CREATE TABLE IF NOT EXISTS entries (
                    dn_norm TEXT NOT NULL PRIMARY KEY,
                    dn TEXT NOT NULL,
                    serialized TEXT NOT NULL
                )"#,
        ))?;

        Ok(())
    }
}

struct Owned {
    conn: Connection,
}

impl Owned {
    fn new(uri: &str) -> Result<Self> {
        let conn = Connection::open_with_flags(
            uri,
            OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE,
        )?;

        conn.busy_timeout(BUSY_TIMEOUT)?;

        Ok(Self { conn })
    }
}

impl AsConnection for Owned {
    fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl<C> SqliteStorage<C>
where
    C: AsConnection,
{
    pub fn wrap(conn: C) -> Result<Rc<Self>> {
        Ok(Rc::new(Self { conn }))
    }

    fn connection(&self) -> &Connection {
        self.conn.connection()
    }

    fn deserialize(serialized: &str) -> Result<Entry> {
        serde_json::from_str(serialized).with_context(|| "deserializing entry")
    }
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation)
}

impl<C> EntryStorage for SqliteStorage<C>
where
    C: AsConnection,
{
    fn load(&self, dn: &Dn) -> Result<Option<Entry>> {
        let serialized: Option<String> = self
            .connection()
            .query_row(
                "SELECT serialized FROM entries WHERE dn_norm = ?1",
                [dn.normalized()],
                |row| row.get(0),
            )
            .optional()?;

        serialized.map(|s| Self::deserialize(&s)).transpose()
    }

    fn add(&self, entry: &Entry) -> Result<()> {
        debug!(dn = %entry.dn(), "inserting");

        let mut stmt = self
            .connection()
            .prepare("INSERT INTO entries (dn_norm, dn, serialized) VALUES (?1, ?2, ?3)")?;

        let serialized = serde_json::to_string(entry)?;

        match stmt.execute((entry.dn().normalized(), entry.dn().as_str(), &serialized)) {
            Ok(1) => Ok(()),
            Ok(_) => Err(anyhow!("no rows affected by insert")),
            Err(e) if is_constraint_violation(&e) => {
                Err(DirectoryError::AlreadyExists(entry.dn().clone()).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, dn: &Dn) -> Result<bool> {
        debug!(%dn, "deleting");

        let mut stmt = self
            .connection()
            .prepare("DELETE FROM entries WHERE dn_norm = ?1")?;

        Ok(stmt.execute([dn.normalized()])? == 1)
    }

    fn search(
        &self,
        request: &SearchRequest,
        visit: &mut dyn FnMut(&Entry) -> Result<()>,
    ) -> Result<()> {
        trace!(filter = %request.filter, "searching");

        let mut stmt = self
            .connection()
            .prepare("SELECT serialized FROM entries ORDER BY dn_norm")?;

        let mut rows = stmt.query([])?;
        let mut progress = SearchProgress::new(request);
        while let Some(row) = rows.next()? {
            let serialized: String = row.get(0)?;
            let candidate = Self::deserialize(&serialized)?;
            progress.offer(&candidate, visit)?;
        }

        trace!(returned = progress.returned(), "searched");

        Ok(())
    }

    fn begin(&self) -> Result<()> {
        trace!("tx:begin");

        // Writer lock up front, a deferred read lock can't be upgraded once
        // another session has written.
        self.connection().execute("BEGIN IMMEDIATE TRANSACTION", [])?;

        Ok(())
    }

    fn rollback(&self, benign: bool) -> Result<()> {
        if benign {
            trace!("tx:rollback");
        } else {
            warn!("tx:rollback");
        }

        self.connection().execute("ROLLBACK TRANSACTION", [])?;

        Ok(())
    }

    fn commit(&self) -> Result<()> {
        trace!("tx:commit");

        self.connection().execute("COMMIT TRANSACTION", [])?;

        Ok(())
    }

    fn query_all(&self) -> Result<Vec<Entry>> {
        let mut stmt = self
            .connection()
            .prepare("SELECT serialized FROM entries ORDER BY dn_norm")?;

        let entries = stmt.query_map([], |row| row.get::<_, String>(0))?;

        entries
            .into_iter()
            .map(|v| Self::deserialize(&v?))
            .collect::<Result<_>>()
    }
}

struct InMemoryKeepAlive {
    _connection: Mutex<Connection>,
    url: String,
}

impl InMemoryKeepAlive {
    fn new(id: &str) -> Result<Self> {
        let url = format!("file:autoids-{}?mode=memory&cache=shared", id);
        Ok(Self {
            _connection: Mutex::new(Connection::open_with_flags(
                &url,
                OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_READ_WRITE,
            )?),
            url,
        })
    }
}

/// Opens one connection per storage against a database file, or against a
/// private shared-cache memory database for `:memory:`.
pub struct Factory {
    uri: String,
    _id: String,
    _keep_alive: Option<InMemoryKeepAlive>,
}

impl Factory {
    pub fn new(path: &str) -> Result<Self> {
        let id = nanoid::nanoid!();
        let (keep_alive, uri) = if path == MEMORY_SPECIAL {
            let keep_alive = InMemoryKeepAlive::new(&id)?;
            let uri = keep_alive.url.to_owned();
            (Some(keep_alive), uri)
        } else {
            (None, format!("file:{}", path))
        };

        Ok(Factory {
            uri,
            _id: id,
            _keep_alive: keep_alive,
        })
    }
}

impl StorageFactory for Factory {
    fn migrate(&self) -> Result<()> {
        let conn = Owned::new(&self.uri)?;
        conn.connection().migrate()
    }

    fn create_storage(&self) -> Result<Rc<dyn EntryStorage>> {
        Ok(SqliteStorage::wrap(Owned::new(&self.uri)?)?)
    }
}
