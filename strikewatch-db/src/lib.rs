mod error;
mod models;

pub use error::{DbError, Result};
pub use models::{SavedServer, ScheduleTarget};

use std::path::Path;
use tokio_rusqlite::Connection;
use tokio_rusqlite::rusqlite::{self, OptionalExtension, params};
use tracing::{debug, info};

/// Settings key for the persisted schedule enabled flag.
pub const SCHEDULE_ENABLED_KEY: &str = "schedule_enabled";

/// Database wrapper for all Strikewatch persistence.
#[derive(Clone)]
pub struct Database {
  conn: Connection,
}

impl Database {
  /// Open or create a database at the given path.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = Connection::open(path).await.map_err(DbError::Sqlite)?;
    let db = Self { conn };
    db.initialize().await?;
    Ok(db)
  }

  /// Create an in-memory database (useful for testing).
  pub async fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .await
      .map_err(DbError::Sqlite)?;
    let db = Self { conn };
    db.initialize().await?;
    Ok(db)
  }

  /// Initialize the database schema.
  async fn initialize(&self) -> Result<()> {
    self.conn
            .call(|conn| {
                conn.pragma_update(None, "journal_mode", "WAL")?;

                conn.execute_batch(
                    r#"
                    -- Saved server list for batch queries and the schedule
                    CREATE TABLE IF NOT EXISTS saved_servers (
                        position INTEGER PRIMARY KEY AUTOINCREMENT,
                        address TEXT NOT NULL UNIQUE
                    );

                    -- Channels receiving scheduled broadcasts
                    CREATE TABLE IF NOT EXISTS schedule_targets (
                        channel_id INTEGER PRIMARY KEY,
                        added_at INTEGER NOT NULL
                    );

                    -- Runtime settings that survive restarts
                    CREATE TABLE IF NOT EXISTS settings (
                        key TEXT PRIMARY KEY,
                        value TEXT NOT NULL
                    );
                    "#,
                )?;
                Ok::<_, rusqlite::Error>(())
            })
            .await?;

    info!("database initialized");
    Ok(())
  }

  // ========================================================================
  // Saved servers
  // ========================================================================

  /// List saved servers in insertion order, numbered from 1.
  pub async fn list_servers(&self) -> Result<Vec<SavedServer>> {
    let addresses = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare_cached("SELECT address FROM saved_servers ORDER BY position")?;

        let addresses = stmt
          .query_map([], |row| row.get::<_, String>(0))?
          .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok::<_, rusqlite::Error>(addresses)
      })
      .await?;

    Ok(
      addresses
        .into_iter()
        .enumerate()
        .map(|(i, address)| SavedServer {
          index: i + 1,
          address,
        })
        .collect(),
    )
  }

  /// Append an address to the saved list.
  /// Returns an error if the address is already saved.
  pub async fn add_server(&self, address: String) -> Result<SavedServer> {
    let lookup = address.clone();
    let inserted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let exists: bool = tx
          .prepare_cached("SELECT EXISTS(SELECT 1 FROM saved_servers WHERE address = ?1)")?
          .query_row(params![&lookup], |row| row.get(0))?;

        if exists {
          return Ok::<_, rusqlite::Error>(None);
        }

        tx.prepare_cached("INSERT INTO saved_servers (address) VALUES (?1)")?
          .execute(params![&lookup])?;
        let count: i64 = tx
          .prepare_cached("SELECT COUNT(*) FROM saved_servers")?
          .query_row([], |row| row.get(0))?;

        tx.commit()?;
        Ok(Some(count as usize))
      })
      .await?;

    let index = inserted.ok_or_else(|| DbError::ServerAlreadySaved(address.clone()))?;
    debug!(%address, index, "saved server");
    Ok(SavedServer { index, address })
  }

  /// Remove the server at a 1-based position in the saved list.
  pub async fn remove_server_at(&self, index: usize) -> Result<SavedServer> {
    if index == 0 {
      return Err(DbError::ServerNotFound(index));
    }

    let removed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let row: Option<(i64, String)> = tx
          .prepare_cached(
            "SELECT position, address FROM saved_servers ORDER BY position LIMIT 1 OFFSET ?1",
          )?
          .query_row(params![(index - 1) as i64], |row| Ok((row.get(0)?, row.get(1)?)))
          .optional()?;

        let Some((position, address)) = row else {
          return Ok::<_, rusqlite::Error>(None);
        };

        tx.prepare_cached("DELETE FROM saved_servers WHERE position = ?1")?
          .execute(params![position])?;
        tx.commit()?;
        Ok(Some(address))
      })
      .await?;

    let address = removed.ok_or(DbError::ServerNotFound(index))?;
    debug!(%address, index, "removed saved server");
    Ok(SavedServer { index, address })
  }

  /// Remove every saved server. Returns the number removed.
  pub async fn clear_servers(&self) -> Result<u64> {
    let deleted = self
      .conn
      .call(|conn| {
        let deleted = conn
          .prepare_cached("DELETE FROM saved_servers")?
          .execute([])?;
        Ok::<_, rusqlite::Error>(deleted as u64)
      })
      .await?;

    debug!(deleted, "cleared saved servers");
    Ok(deleted)
  }

  /// Populate the saved list from configuration, but only when it is empty.
  /// Returns the number of addresses inserted.
  pub async fn seed_servers(&self, addresses: Vec<String>) -> Result<u64> {
    let inserted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let count: i64 = tx
          .prepare_cached("SELECT COUNT(*) FROM saved_servers")?
          .query_row([], |row| row.get(0))?;
        if count > 0 {
          return Ok::<_, rusqlite::Error>(0);
        }

        let mut inserted = 0u64;
        for address in &addresses {
          inserted += tx
            .prepare_cached("INSERT OR IGNORE INTO saved_servers (address) VALUES (?1)")?
            .execute(params![address])? as u64;
        }
        tx.commit()?;
        Ok(inserted)
      })
      .await?;

    if inserted > 0 {
      info!(inserted, "seeded saved servers from configuration");
    }
    Ok(inserted)
  }

  // ========================================================================
  // Schedule targets
  // ========================================================================

  /// List broadcast targets in the order they were added.
  pub async fn list_targets(&self) -> Result<Vec<ScheduleTarget>> {
    let targets = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare_cached(
          "SELECT channel_id, added_at FROM schedule_targets ORDER BY added_at, channel_id",
        )?;

        let targets = stmt
          .query_map([], |row| {
            Ok(ScheduleTarget {
              channel_id: row.get(0)?,
              added_at: row.get(1)?,
            })
          })?
          .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok::<_, rusqlite::Error>(targets)
      })
      .await?;

    Ok(targets)
  }

  /// Add a broadcast target. Returns false if it was already present.
  pub async fn add_target(&self, channel_id: u64, now: i64) -> Result<bool> {
    let added = self
      .conn
      .call(move |conn| {
        let changed = conn
          .prepare_cached(
            "INSERT OR IGNORE INTO schedule_targets (channel_id, added_at) VALUES (?1, ?2)",
          )?
          .execute(params![channel_id, now])?;
        Ok::<_, rusqlite::Error>(changed > 0)
      })
      .await?;

    debug!(channel_id, added, "add schedule target");
    Ok(added)
  }

  /// Remove a broadcast target. Returns false if it was not present.
  pub async fn remove_target(&self, channel_id: u64) -> Result<bool> {
    let removed = self
      .conn
      .call(move |conn| {
        let changed = conn
          .prepare_cached("DELETE FROM schedule_targets WHERE channel_id = ?1")?
          .execute(params![channel_id])?;
        Ok::<_, rusqlite::Error>(changed > 0)
      })
      .await?;

    debug!(channel_id, removed, "remove schedule target");
    Ok(removed)
  }

  /// Populate targets from configuration, but only when none are stored.
  pub async fn seed_targets(&self, channel_ids: Vec<u64>, now: i64) -> Result<u64> {
    let inserted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let count: i64 = tx
          .prepare_cached("SELECT COUNT(*) FROM schedule_targets")?
          .query_row([], |row| row.get(0))?;
        if count > 0 {
          return Ok::<_, rusqlite::Error>(0);
        }

        let mut inserted = 0u64;
        for channel_id in &channel_ids {
          inserted += tx
            .prepare_cached(
              "INSERT OR IGNORE INTO schedule_targets (channel_id, added_at) VALUES (?1, ?2)",
            )?
            .execute(params![channel_id, now])? as u64;
        }
        tx.commit()?;
        Ok(inserted)
      })
      .await?;

    if inserted > 0 {
      info!(inserted, "seeded schedule targets from configuration");
    }
    Ok(inserted)
  }

  // ========================================================================
  // Settings
  // ========================================================================

  /// Read a runtime setting.
  pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
    let key = key.to_string();
    let value = self
      .conn
      .call(move |conn| {
        conn
          .prepare_cached("SELECT value FROM settings WHERE key = ?1")?
          .query_row(params![&key], |row| row.get(0))
          .optional()
      })
      .await?;

    Ok(value)
  }

  /// Write a runtime setting, replacing any previous value.
  pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
    let key = key.to_string();
    let value = value.to_string();
    self
      .conn
      .call(move |conn| {
        conn
          .prepare_cached(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
          )?
          .execute(params![&key, &value])?;
        Ok::<_, rusqlite::Error>(())
      })
      .await?;

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_saved_servers_keep_insertion_order() {
    let db = Database::open_in_memory().await.unwrap();

    db.add_server("10.0.0.1:27015".to_string()).await.unwrap();
    db.add_server("10.0.0.2".to_string()).await.unwrap();
    let third = db.add_server("[::1]:27016".to_string()).await.unwrap();
    assert_eq!(third.index, 3);

    let servers = db.list_servers().await.unwrap();
    let addresses: Vec<_> = servers.iter().map(|s| s.address.as_str()).collect();
    assert_eq!(addresses, vec!["10.0.0.1:27015", "10.0.0.2", "[::1]:27016"]);
    assert_eq!(servers[0].index, 1);
    assert_eq!(servers[2].index, 3);
  }

  #[tokio::test]
  async fn test_duplicate_server_rejected() {
    let db = Database::open_in_memory().await.unwrap();

    db.add_server("10.0.0.1:27015".to_string()).await.unwrap();
    let result = db.add_server("10.0.0.1:27015".to_string()).await;
    assert!(matches!(result, Err(DbError::ServerAlreadySaved(_))));
    assert_eq!(db.list_servers().await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_remove_server_renumbers_list() {
    let db = Database::open_in_memory().await.unwrap();

    for address in ["a:1", "b:2", "c:3"] {
      db.add_server(address.to_string()).await.unwrap();
    }

    let removed = db.remove_server_at(2).await.unwrap();
    assert_eq!(removed.address, "b:2");

    let servers = db.list_servers().await.unwrap();
    assert_eq!(servers.len(), 2);
    assert_eq!(servers[1].index, 2);
    assert_eq!(servers[1].address, "c:3");
  }

  #[tokio::test]
  async fn test_remove_server_out_of_range() {
    let db = Database::open_in_memory().await.unwrap();
    db.add_server("a:1".to_string()).await.unwrap();

    assert!(matches!(
      db.remove_server_at(0).await,
      Err(DbError::ServerNotFound(0))
    ));
    assert!(matches!(
      db.remove_server_at(2).await,
      Err(DbError::ServerNotFound(2))
    ));
  }

  #[tokio::test]
  async fn test_clear_servers_reports_count() {
    let db = Database::open_in_memory().await.unwrap();
    db.add_server("a:1".to_string()).await.unwrap();
    db.add_server("b:2".to_string()).await.unwrap();

    assert_eq!(db.clear_servers().await.unwrap(), 2);
    assert!(db.list_servers().await.unwrap().is_empty());
    assert_eq!(db.clear_servers().await.unwrap(), 0);
  }

  #[tokio::test]
  async fn test_seed_servers_only_when_empty() {
    let db = Database::open_in_memory().await.unwrap();

    let seeded = db
      .seed_servers(vec!["a:1".to_string(), "b:2".to_string(), "a:1".to_string()])
      .await
      .unwrap();
    assert_eq!(seeded, 2);

    // Second seed is ignored because the list already has entries
    let seeded = db.seed_servers(vec!["c:3".to_string()]).await.unwrap();
    assert_eq!(seeded, 0);
    assert_eq!(db.list_servers().await.unwrap().len(), 2);
  }

  #[tokio::test]
  async fn test_schedule_targets_add_remove() {
    let db = Database::open_in_memory().await.unwrap();

    assert!(db.add_target(111, 1_700_000_000).await.unwrap());
    assert!(!db.add_target(111, 1_700_000_100).await.unwrap());
    assert!(db.add_target(222, 1_700_000_200).await.unwrap());

    let targets = db.list_targets().await.unwrap();
    assert_eq!(
      targets.iter().map(|t| t.channel_id).collect::<Vec<_>>(),
      vec![111, 222]
    );
    assert_eq!(targets[0].added_at, 1_700_000_000);

    assert!(db.remove_target(111).await.unwrap());
    assert!(!db.remove_target(111).await.unwrap());
    assert_eq!(db.list_targets().await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_seed_targets_only_when_empty() {
    let db = Database::open_in_memory().await.unwrap();

    assert_eq!(db.seed_targets(vec![1, 2], 0).await.unwrap(), 2);
    assert_eq!(db.seed_targets(vec![3], 0).await.unwrap(), 0);
    assert_eq!(db.list_targets().await.unwrap().len(), 2);
  }

  #[tokio::test]
  async fn test_settings_roundtrip_and_overwrite() {
    let db = Database::open_in_memory().await.unwrap();

    assert_eq!(db.get_setting(SCHEDULE_ENABLED_KEY).await.unwrap(), None);

    db.set_setting(SCHEDULE_ENABLED_KEY, "true").await.unwrap();
    db.set_setting(SCHEDULE_ENABLED_KEY, "false").await.unwrap();
    assert_eq!(
      db.get_setting(SCHEDULE_ENABLED_KEY).await.unwrap().as_deref(),
      Some("false")
    );
  }
}
