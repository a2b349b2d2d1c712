//! SQLite-backed account/action store.
//!
//! The store hands out independent [`Session`]s, one per unit of work.
//! Concurrent units must never share a session: each unit performs all
//! reads/writes for its account chain on its own connection, and every
//! terminal action transition is committed before the next dependency
//! begins, so a crash mid-chain leaves a consistent, resumable trail.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::domain::{Account, Action, ActionKind, ActionStatus, NewAccount};

/// Handle to the database file. Cheap to clone across tasks; each task opens
/// its own [`Session`].
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    /// Open the store at `path`, creating the schema if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let store = Self { path };

        // Opening one session up front validates the file and creates tables.
        store.session()?;
        Ok(store)
    }

    /// Open an independent transactional session.
    pub fn session(&self) -> Result<Session> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create store directory {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(&self.path)
            .with_context(|| format!("failed to open store {}", self.path.display()))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            "#,
        )?;

        initialize_schema(&conn)?;

        Ok(Session { conn })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// One connection to the store. Never share across concurrent units.
pub struct Session {
    conn: Connection,
}

impl Session {
    /// Insert a new account, active by default. Fails on duplicate email,
    /// address or private key.
    pub fn insert_account(&self, new: &NewAccount) -> Result<Account> {
        let headers = serde_json::Value::Object(new.headers.clone()).to_string();
        let created_at = Utc::now();

        self.conn
            .execute(
                r#"
                INSERT INTO accounts (email, address, private_key, proxy, headers, active, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)
                "#,
                params![
                    new.email,
                    new.address,
                    new.private_key,
                    new.proxy,
                    headers,
                    created_at.to_rfc3339(),
                ],
            )
            .with_context(|| format!("failed to insert account {}", new.email))?;

        let id = self.conn.last_insert_rowid();
        self.find_account_by_id(id)?
            .context("inserted account not found")
    }

    pub fn find_account_by_id(&self, id: i64) -> Result<Option<Account>> {
        self.conn
            .query_row(
                "SELECT * FROM accounts WHERE id = ?1",
                params![id],
                account_from_row,
            )
            .optional()
            .context("failed to query account by id")
    }

    pub fn find_account_by_email(&self, email: &str) -> Result<Option<Account>> {
        self.conn
            .query_row(
                "SELECT * FROM accounts WHERE email = ?1",
                params![email],
                account_from_row,
            )
            .optional()
            .context("failed to query account by email")
    }

    /// All accounts eligible for batch runs, oldest first.
    pub fn list_active_accounts(&self) -> Result<Vec<Account>> {
        self.list_accounts(true)
    }

    pub fn list_accounts(&self, active_only: bool) -> Result<Vec<Account>> {
        let sql = if active_only {
            "SELECT * FROM accounts WHERE active = 1 ORDER BY id"
        } else {
            "SELECT * FROM accounts ORDER BY id"
        };

        let mut stmt = self.conn.prepare(sql)?;
        let accounts = stmt
            .query_map([], account_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to list accounts")?;
        Ok(accounts)
    }

    pub fn set_account_active(&self, id: i64, active: bool) -> Result<()> {
        self.conn
            .execute(
                "UPDATE accounts SET active = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, active, Utc::now().to_rfc3339()],
            )
            .context("failed to update account active flag")?;
        Ok(())
    }

    pub fn update_account_headers(
        &self,
        id: i64,
        headers: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        let headers = serde_json::Value::Object(headers.clone()).to_string();
        self.conn
            .execute(
                "UPDATE accounts SET headers = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, headers, Utc::now().to_rfc3339()],
            )
            .context("failed to update account headers")?;
        Ok(())
    }

    /// Persist a new action in `Pending`. Commits before returning.
    pub fn create_action(
        &self,
        account_id: i64,
        kind: ActionKind,
        payload: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Action> {
        let payload = serde_json::Value::Object(payload.clone()).to_string();
        let created_at = Utc::now();

        self.conn
            .execute(
                r#"
                INSERT INTO actions (account_id, kind, status, payload, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    account_id,
                    kind.as_str(),
                    ActionStatus::Pending.as_str(),
                    payload,
                    created_at.to_rfc3339(),
                ],
            )
            .with_context(|| format!("failed to create {} action", kind))?;

        let id = self.conn.last_insert_rowid();
        self.find_action_by_id(id)?
            .context("created action not found")
    }

    pub fn find_action_by_id(&self, id: i64) -> Result<Option<Action>> {
        self.conn
            .query_row(
                "SELECT * FROM actions WHERE id = ?1",
                params![id],
                action_from_row,
            )
            .optional()
            .context("failed to query action by id")
    }

    /// Apply a terminal transition, merging `payload_patch` into the stored
    /// payload. Commits before returning.
    pub fn update_action_status(
        &self,
        action_id: i64,
        status: ActionStatus,
        payload_patch: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        let action = self
            .find_action_by_id(action_id)?
            .with_context(|| format!("action {} not found", action_id))?;

        // Pending is the only state that may transition; terminal records
        // are immutable.
        if action.status != ActionStatus::Pending {
            anyhow::bail!(
                "action {} is already {} and cannot transition to {}",
                action_id,
                action.status.as_str(),
                status.as_str()
            );
        }

        let mut payload = action.payload;
        for (key, value) in payload_patch {
            payload.insert(key.clone(), value.clone());
        }
        let payload = serde_json::Value::Object(payload).to_string();

        self.conn
            .execute(
                "UPDATE actions SET status = ?2, payload = ?3, updated_at = ?4 WHERE id = ?1",
                params![
                    action_id,
                    status.as_str(),
                    payload,
                    Utc::now().to_rfc3339(),
                ],
            )
            .with_context(|| format!("failed to update action {}", action_id))?;
        Ok(())
    }

    /// Most recent successful action of `kind` for the account, if any.
    pub fn find_latest_successful_action(
        &self,
        account_id: i64,
        kind: ActionKind,
    ) -> Result<Option<Action>> {
        self.conn
            .query_row(
                r#"
                SELECT * FROM actions
                WHERE account_id = ?1 AND kind = ?2 AND status = ?3
                ORDER BY created_at DESC, id DESC
                LIMIT 1
                "#,
                params![account_id, kind.as_str(), ActionStatus::Success.as_str()],
                action_from_row,
            )
            .optional()
            .context("failed to query latest successful action")
    }

    /// All actions for one account, oldest first. Used by tests and stats.
    pub fn list_actions_for_account(&self, account_id: i64) -> Result<Vec<Action>> {
        let mut stmt = self
            .conn
            .prepare("SELECT * FROM actions WHERE account_id = ?1 ORDER BY id")?;
        let actions = stmt
            .query_map(params![account_id], action_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to list actions")?;
        Ok(actions)
    }

    pub fn count_actions(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM actions", [], |row| row.get(0))
            .context("failed to count actions")
    }

    /// (kind, status, count) rows for the stats command.
    pub fn action_counts(&self) -> Result<Vec<(String, String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT kind, status, COUNT(*) FROM actions GROUP BY kind, status ORDER BY kind, status",
        )?;
        let counts = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to aggregate action counts")?;
        Ok(counts)
    }

    /// Backdate an action's creation time. Test-only hook for max-age checks.
    #[doc(hidden)]
    pub fn backdate_action(&self, action_id: i64, created_at: DateTime<Utc>) -> Result<()> {
        self.conn
            .execute(
                "UPDATE actions SET created_at = ?2 WHERE id = ?1",
                params![action_id, created_at.to_rfc3339()],
            )
            .context("failed to backdate action")?;
        Ok(())
    }
}

fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            id INTEGER PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            address TEXT NOT NULL UNIQUE,
            private_key TEXT NOT NULL UNIQUE,
            proxy TEXT NULL,
            headers TEXT NOT NULL DEFAULT '{}',
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NULL
        );
        CREATE TABLE IF NOT EXISTS actions (
            id INTEGER PRIMARY KEY,
            account_id INTEGER NOT NULL REFERENCES accounts(id),
            kind TEXT NOT NULL,
            status TEXT NOT NULL,
            payload TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            updated_at TEXT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_actions_account_kind_status
            ON actions(account_id, kind, status, created_at);
        "#,
    )
    .context("failed to initialize store schema")?;
    Ok(())
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get("id")?,
        email: row.get("email")?,
        address: row.get("address")?,
        private_key: row.get("private_key")?,
        proxy: row.get("proxy")?,
        headers: json_map_column(row, "headers")?,
        active: row.get("active")?,
        created_at: datetime_column(row, "created_at")?,
        updated_at: optional_datetime_column(row, "updated_at")?,
    })
}

fn action_from_row(row: &Row<'_>) -> rusqlite::Result<Action> {
    let kind: String = row.get("kind")?;
    let status: String = row.get("status")?;

    Ok(Action {
        id: row.get("id")?,
        account_id: row.get("account_id")?,
        kind: kind
            .parse()
            .map_err(|e: String| column_error("kind", e))?,
        status: status
            .parse()
            .map_err(|e: String| column_error("status", e))?,
        payload: json_map_column(row, "payload")?,
        created_at: datetime_column(row, "created_at")?,
        updated_at: optional_datetime_column(row, "updated_at")?,
    })
}

fn json_map_column(
    row: &Row<'_>,
    column: &str,
) -> rusqlite::Result<serde_json::Map<String, serde_json::Value>> {
    let raw: String = row.get(column)?;
    match serde_json::from_str::<serde_json::Value>(&raw) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(_) | Err(_) => Err(column_error(column, format!("invalid JSON object: {}", raw))),
    }
}

fn datetime_column(row: &Row<'_>, column: &str) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(column)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| column_error(column, e.to_string()))
}

fn optional_datetime_column(
    row: &Row<'_>,
    column: &str,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(column)?;
    match raw {
        None => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| column_error(column, e.to_string())),
    }
}

fn column_error(column: &str, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        format!("column {}: {}", column, message).into(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (Store, TempDir) {
        let temp = TempDir::new().unwrap();
        let store = Store::open(temp.path().join("test.db")).unwrap();
        (store, temp)
    }

    fn test_account(session: &Session, email: &str) -> Account {
        session
            .insert_account(&NewAccount {
                email: email.to_string(),
                address: format!("0x{}", email),
                private_key: format!("key-{}", email),
                proxy: None,
                headers: serde_json::Map::new(),
            })
            .unwrap()
    }

    #[test]
    fn test_insert_and_find_account() {
        let (store, _temp) = test_store();
        let session = store.session().unwrap();

        let account = test_account(&session, "a@example.com");
        assert!(account.active);

        let found = session
            .find_account_by_email("a@example.com")
            .unwrap()
            .unwrap();
        assert_eq!(found.id, account.id);
        assert_eq!(found.address, "0xa@example.com");

        assert!(session.find_account_by_email("missing@x").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let (store, _temp) = test_store();
        let session = store.session().unwrap();

        test_account(&session, "dup@example.com");
        let result = session.insert_account(&NewAccount {
            email: "dup@example.com".to_string(),
            address: "0xother".to_string(),
            private_key: "key-other".to_string(),
            proxy: None,
            headers: serde_json::Map::new(),
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_active_filter() {
        let (store, _temp) = test_store();
        let session = store.session().unwrap();

        let a = test_account(&session, "a@example.com");
        let _b = test_account(&session, "b@example.com");

        session.set_account_active(a.id, false).unwrap();

        let active = session.list_active_accounts().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].email, "b@example.com");

        assert_eq!(session.list_accounts(false).unwrap().len(), 2);
    }

    #[test]
    fn test_action_create_and_terminal_transition() {
        let (store, _temp) = test_store();
        let session = store.session().unwrap();
        let account = test_account(&session, "a@example.com");

        let action = session
            .create_action(account.id, ActionKind::Waitlist, &serde_json::Map::new())
            .unwrap();
        assert_eq!(action.status, ActionStatus::Pending);

        let mut patch = serde_json::Map::new();
        patch.insert("message".to_string(), serde_json::Value::String("ok".into()));
        session
            .update_action_status(action.id, ActionStatus::Success, &patch)
            .unwrap();

        let stored = session.find_action_by_id(action.id).unwrap().unwrap();
        assert_eq!(stored.status, ActionStatus::Success);
        assert_eq!(stored.payload.get("message").unwrap(), "ok");
        assert!(stored.updated_at.is_some());
    }

    #[test]
    fn test_payload_patch_merges_with_existing() {
        let (store, _temp) = test_store();
        let session = store.session().unwrap();
        let account = test_account(&session, "a@example.com");

        let mut initial = serde_json::Map::new();
        initial.insert("seed".to_string(), serde_json::Value::from(7));
        let action = session
            .create_action(account.id, ActionKind::Faucet, &initial)
            .unwrap();

        let mut patch = serde_json::Map::new();
        patch.insert("hash".to_string(), serde_json::Value::String("0x1".into()));
        session
            .update_action_status(action.id, ActionStatus::Success, &patch)
            .unwrap();

        let stored = session.find_action_by_id(action.id).unwrap().unwrap();
        assert_eq!(stored.payload.get("seed").unwrap(), 7);
        assert_eq!(stored.payload.get("hash").unwrap(), "0x1");
    }

    #[test]
    fn test_terminal_status_is_never_overwritten() {
        let (store, _temp) = test_store();
        let session = store.session().unwrap();
        let account = test_account(&session, "a@example.com");

        let action = session
            .create_action(account.id, ActionKind::Stake, &serde_json::Map::new())
            .unwrap();
        session
            .update_action_status(action.id, ActionStatus::Success, &serde_json::Map::new())
            .unwrap();

        let mut patch = serde_json::Map::new();
        patch.insert("error".to_string(), serde_json::Value::String("late".into()));
        let result = session.update_action_status(action.id, ActionStatus::Failed, &patch);
        assert!(result.is_err());

        let stored = session.find_action_by_id(action.id).unwrap().unwrap();
        assert_eq!(stored.status, ActionStatus::Success);
        assert!(stored.payload.get("error").is_none());
    }

    #[test]
    fn test_latest_successful_action_ordering() {
        let (store, _temp) = test_store();
        let session = store.session().unwrap();
        let account = test_account(&session, "a@example.com");

        let first = session
            .create_action(account.id, ActionKind::Faucet, &serde_json::Map::new())
            .unwrap();
        session
            .update_action_status(first.id, ActionStatus::Success, &serde_json::Map::new())
            .unwrap();

        let second = session
            .create_action(account.id, ActionKind::Faucet, &serde_json::Map::new())
            .unwrap();
        session
            .update_action_status(second.id, ActionStatus::Success, &serde_json::Map::new())
            .unwrap();

        // A failed one after should not win
        let third = session
            .create_action(account.id, ActionKind::Faucet, &serde_json::Map::new())
            .unwrap();
        session
            .update_action_status(third.id, ActionStatus::Failed, &serde_json::Map::new())
            .unwrap();

        let latest = session
            .find_latest_successful_action(account.id, ActionKind::Faucet)
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, second.id);

        assert!(session
            .find_latest_successful_action(account.id, ActionKind::Stake)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_independent_sessions_see_commits() {
        let (store, _temp) = test_store();

        let writer = store.session().unwrap();
        let account = test_account(&writer, "a@example.com");
        writer
            .create_action(account.id, ActionKind::Waitlist, &serde_json::Map::new())
            .unwrap();

        let reader = store.session().unwrap();
        assert_eq!(reader.count_actions().unwrap(), 1);
        assert_eq!(
            reader.list_actions_for_account(account.id).unwrap().len(),
            1
        );
    }
}
