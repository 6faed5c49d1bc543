//! Game server queries.
//!
//! This module handles:
//! - The typed result contract built from an A2S reply
//! - Cached, retried single-server queries
//! - Concurrent batch queries that keep input order

use std::future::Future;
use std::time::Duration;

use a2s::A2SClient;
use futures::future::join_all;
use thiserror::Error;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, warn};

use crate::address::{ServerAddress, parse_address};
use crate::cache::QueryCache;
use crate::error::StatusError;

/// Fixed pause between a failed attempt and the next one.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Upper bound on servers queried by one batch command or broadcast.
pub const MAX_BATCH: usize = 10;

/// A player as reported by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerInfo {
    pub name: String,
    pub score: i32,
    /// Time connected
    pub duration: Duration,
}

/// Live status of one game server.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerInfo {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub map: String,
    pub game: String,
    pub players: Vec<PlayerInfo>,
    /// Player count from the info reply (includes bots)
    pub player_count: u32,
    pub bots: u32,
    pub max_players: u32,
    pub password: bool,
    pub vac: bool,
    pub ping: Duration,
    /// Address to paste into the game console
    pub connect: String,
}

/// Failure of a single query attempt.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("{0}")]
    Protocol(String),

    #[error("no response within {}ms", .0.as_millis())]
    Timeout(Duration),
}

/// A source of live server status.
pub trait ServerQuery: Send + Sync + 'static {
    fn query(
        &self,
        address: &ServerAddress,
    ) -> impl Future<Output = Result<ServerInfo, ProbeError>> + Send;
}

/// Queries servers over the Source engine A2S protocol.
pub struct A2sQuery {
    client: A2SClient,
}

impl A2sQuery {
    /// Bind the UDP socket used for queries.
    pub async fn new() -> Result<Self, StatusError> {
        let client = A2SClient::new()
            .await
            .map_err(|e| StatusError::DependencyUnavailable {
                dependency: "A2S query client",
                reason: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

impl ServerQuery for A2sQuery {
    async fn query(&self, address: &ServerAddress) -> Result<ServerInfo, ProbeError> {
        let target = (address.host.as_str(), address.port);

        let started = Instant::now();
        let info = self
            .client
            .info(target)
            .await
            .map_err(|e| ProbeError::Protocol(e.to_string()))?;
        let ping = started.elapsed();

        // Some servers refuse player queries; the info reply is still useful
        let players = match self.client.players(target).await {
            Ok(players) => players
                .into_iter()
                .map(|p| PlayerInfo {
                    name: p.name,
                    score: p.score as i32,
                    duration: Duration::try_from_secs_f32(p.duration).unwrap_or_default(),
                })
                .collect(),
            Err(e) => {
                debug!(address = %address, error = %e, "player list unavailable");
                Vec::new()
            }
        };

        Ok(ServerInfo {
            host: address.host.clone(),
            port: address.port,
            name: info.name,
            map: info.map,
            game: info.game,
            players,
            player_count: u32::from(info.players),
            bots: u32::from(info.bots),
            max_players: u32::from(info.max_players),
            password: info.visibility,
            vac: info.vac,
            ping,
            connect: address.to_string(),
        })
    }
}

/// Per-query tuning.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Bound on each individual attempt
    pub timeout: Duration,
    /// Result reuse window, zero disables caching
    pub cache_ttl: Duration,
    /// Extra attempts after the first failure
    pub retries: u32,
    /// Deadline for every member of a batch, zero disables it
    pub batch_timeout: Duration,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5000),
            cache_ttl: Duration::from_millis(30_000),
            retries: 1,
            batch_timeout: Duration::from_millis(15_000),
        }
    }
}

/// One address in a batch, tagged with its 1-based input position.
#[derive(Debug)]
pub struct BatchEntry {
    pub index: usize,
    pub address: String,
    pub outcome: Result<ServerInfo, StatusError>,
}

/// Results of a batch query in input order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub entries: Vec<BatchEntry>,
    /// Wall-clock time from dispatch to the last settled query
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.entries.len() - self.succeeded()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Cached, retried access to a [`ServerQuery`] backend.
pub struct QueryService<Q> {
    backend: Q,
    cache: QueryCache<ServerInfo>,
    options: QueryOptions,
}

impl<Q: ServerQuery> QueryService<Q> {
    pub fn new(backend: Q, options: QueryOptions) -> Self {
        Self {
            backend,
            cache: QueryCache::new(),
            options,
        }
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Empty the result cache. Returns how many entries were dropped.
    pub async fn clear_cache(&self) -> usize {
        self.cache.clear().await
    }

    /// Parse an address and query it.
    pub async fn query_str(&self, input: &str) -> Result<ServerInfo, StatusError> {
        let address = parse_address(input)?;
        self.query(&address).await
    }

    /// Query one server, serving from cache while the entry is fresh.
    ///
    /// Attempts `retries + 1` times with a fixed one second pause between
    /// failures. Concurrent misses for the same address are not merged.
    pub async fn query(&self, address: &ServerAddress) -> Result<ServerInfo, StatusError> {
        let key = address.key();
        let caching = !self.options.cache_ttl.is_zero();

        if caching {
            if let Some(info) = self.cache.get_fresh(&key, self.options.cache_ttl).await {
                debug!(%key, "cache hit");
                return Ok(info);
            }
        }

        let attempts = self.options.retries + 1;
        let mut last_error = None;
        for attempt in 1..=attempts {
            let result = match timeout(self.options.timeout, self.backend.query(address)).await {
                Ok(result) => result,
                Err(_) => Err(ProbeError::Timeout(self.options.timeout)),
            };

            match result {
                Ok(info) => {
                    if caching {
                        self.cache.store(key, info.clone()).await;
                    }
                    return Ok(info);
                }
                Err(e) => {
                    warn!(%key, attempt, attempts, error = %e, "query attempt failed");
                    last_error = Some(e);
                }
            }

            if attempt < attempts {
                sleep(RETRY_DELAY).await;
            }
        }

        Err(StatusError::QueryFailed {
            address: address.to_string(),
            attempts,
            message: last_error.map(|e| e.to_string()).unwrap_or_default(),
        })
    }

    /// Query every address concurrently and wait for all of them.
    ///
    /// A failing address never aborts the others. When a batch timeout is
    /// configured, members still running at the deadline are reported as
    /// failed.
    pub async fn query_batch(&self, addresses: &[String]) -> BatchReport {
        if addresses.is_empty() {
            return BatchReport::default();
        }

        let started = Instant::now();
        let deadline = self.options.batch_timeout;

        let tasks = addresses.iter().enumerate().map(|(i, input)| async move {
            let work = self.query_str(input);
            let outcome = if deadline.is_zero() {
                work.await
            } else {
                match timeout(deadline, work).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(StatusError::QueryFailed {
                        address: input.clone(),
                        attempts: 0,
                        message: format!(
                            "batch deadline of {}ms exceeded",
                            deadline.as_millis()
                        ),
                    }),
                }
            };
            BatchEntry {
                index: i + 1,
                address: input.clone(),
                outcome,
            }
        });

        let entries = join_all(tasks).await;
        let report = BatchReport {
            entries,
            elapsed: started.elapsed(),
        };
        debug!(
            total = report.entries.len(),
            failed = report.failed(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "batch query finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_report_counts() {
        let report = BatchReport {
            entries: vec![
                BatchEntry {
                    index: 1,
                    address: "bad".to_string(),
                    outcome: Err(StatusError::invalid_address("bad", "missing host")),
                },
            ],
            elapsed: Duration::ZERO,
        };
        assert_eq!(report.succeeded(), 0);
        assert_eq!(report.failed(), 1);
        assert!(!report.is_empty());
    }

    #[test]
    fn test_timeout_message() {
        let err = ProbeError::Timeout(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "no response within 1500ms");
    }
}
