use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use strikewatch_db::{DbError, Database, SCHEDULE_ENABLED_KEY};

use crate::broadcast::{Broadcaster, Payload};
use crate::config::Config;
use crate::error::StatusError;
use crate::format::{format_batch, format_duration, format_report};
use crate::helpers::now;
pub use crate::query::MAX_BATCH;
use crate::query::{BatchReport, QueryService, ServerInfo, ServerQuery};
use crate::render::{Renderer, SurfaceFactory};
use crate::schedule::{ScheduleSettings, Scheduler, TimeWindow};

/// Shared state behind the chat commands and the HTTP surface.
pub struct StatusApp<Q, F, B> {
    pub config: Config,
    pub db: Database,
    pub queries: Arc<QueryService<Q>>,
    pub renderer: Arc<Renderer<F>>,
    pub scheduler: Scheduler<Q, F, B>,
    started_at: Instant,
}

/// Snapshot served by `GET /status` and the `status` command.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub uptime_secs: u64,
    pub cached_results: usize,
    pub saved_servers: usize,
    pub query: QueryStatus,
    pub schedule: ScheduleStatus,
}

/// Query client settings. Both startup dependencies are loaded by the time
/// a report can exist.
#[derive(Debug, Clone, Serialize)]
pub struct QueryStatus {
    pub timeout_ms: u64,
    pub cache_ttl_ms: u64,
    pub retries: u32,
    pub batch_timeout_ms: u64,
    pub image_replies: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleStatus {
    pub enabled: bool,
    pub running: bool,
    pub interval_minutes: u64,
    pub window: String,
    pub targets: usize,
    pub image: bool,
}

/// Batch addresses after applying the size cap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSelection {
    pub addresses: Vec<String>,
    /// Number of addresses before the cap, set only when some were dropped
    pub truncated_from: Option<usize>,
}

impl<Q: ServerQuery, F: SurfaceFactory, B: Broadcaster> StatusApp<Q, F, B> {
    /// Seed the store from configuration and load schedule state.
    pub async fn new(
        config: Config,
        db: Database,
        backend: Q,
        factory: F,
        broadcaster: B,
    ) -> Result<Self, StatusError> {
        let seeded = db.seed_servers(config.server_list.clone()).await?;
        if seeded > 0 {
            tracing::info!(seeded, "seeded saved servers from SERVER_LIST");
        }
        let seeded = db.seed_targets(config.schedule_channels.clone(), now()).await?;
        if seeded > 0 {
            tracing::info!(seeded, "seeded schedule targets from SCHEDULE_CHANNELS");
        }

        let enabled = match db.get_setting(SCHEDULE_ENABLED_KEY).await? {
            Some(value) => value == "true",
            None => config.schedule_enabled,
        };

        let settings = ScheduleSettings {
            enabled,
            interval: Duration::from_secs(config.schedule_interval_minutes * 60),
            window: TimeWindow {
                start: config.schedule_start,
                end: config.schedule_end,
            },
            targets: Vec::new(),
            addresses: Vec::new(),
            image: config.schedule_image,
        };

        let queries = Arc::new(QueryService::new(backend, config.query_options()));
        let renderer = Arc::new(Renderer::new(factory, config.render_options()));
        let scheduler = Scheduler::new(
            settings,
            Arc::clone(&queries),
            Arc::clone(&renderer),
            broadcaster,
        );

        let app = Self {
            config,
            db,
            queries,
            renderer,
            scheduler,
            started_at: Instant::now(),
        };
        app.reload_schedule_lists().await?;
        Ok(app)
    }

    /// Copy saved servers and broadcast targets into the live schedule.
    pub async fn reload_schedule_lists(&self) -> Result<(), DbError> {
        let addresses: Vec<String> = self
            .db
            .list_servers()
            .await?
            .into_iter()
            .map(|s| s.address)
            .collect();
        let targets: Vec<u64> = self
            .db
            .list_targets()
            .await?
            .into_iter()
            .map(|t| t.channel_id)
            .collect();

        tracing::debug!(
            servers = addresses.len(),
            targets = targets.len(),
            "schedule lists reloaded"
        );
        self.scheduler.update(|settings| {
            settings.addresses = addresses;
            settings.targets = targets;
        });
        Ok(())
    }

    /// Persist the enabled flag and apply it to the live schedule.
    pub async fn set_schedule_enabled(&self, enabled: bool) -> Result<(), DbError> {
        self.db
            .set_setting(SCHEDULE_ENABLED_KEY, if enabled { "true" } else { "false" })
            .await?;
        self.scheduler.update(|settings| settings.enabled = enabled);
        Ok(())
    }

    pub async fn query_server(&self, input: &str) -> Result<ServerInfo, StatusError> {
        self.queries.query_str(input).await
    }

    /// Single-server reply. Rendering failures are returned to the caller.
    pub fn server_payload(&self, info: &ServerInfo, image: bool) -> Result<Payload, StatusError> {
        if image {
            let png = self.renderer.render_server(info)?;
            return Ok(Payload::Image(png));
        }
        Ok(Payload::Text(self.server_text(info)))
    }

    /// Text form of a single-server reply.
    pub fn server_text(&self, info: &ServerInfo) -> String {
        format_report(info, &self.config.display_options())
    }

    /// Batch reply. Falls back to the text table when rendering fails.
    pub fn batch_payload(&self, report: &BatchReport, image: bool) -> Payload {
        if image {
            match self.renderer.render_batch(report) {
                Ok(png) => return Payload::Image(png),
                Err(e) => tracing::warn!(error = %e, "batch banner failed, replying with text"),
            }
        }
        Payload::Text(format_batch(report))
    }

    /// Addresses for a batch query: the explicit list, or the saved list when
    /// none is given. Capped at [`MAX_BATCH`].
    pub async fn select_batch(&self, explicit: Vec<String>) -> Result<BatchSelection, DbError> {
        let mut addresses = if explicit.is_empty() {
            self.db
                .list_servers()
                .await?
                .into_iter()
                .map(|s| s.address)
                .collect()
        } else {
            explicit
        };

        let truncated_from = (addresses.len() > MAX_BATCH).then_some(addresses.len());
        addresses.truncate(MAX_BATCH);
        Ok(BatchSelection {
            addresses,
            truncated_from,
        })
    }

    pub async fn status_report(&self) -> Result<StatusReport, DbError> {
        let saved_servers = self.db.list_servers().await?.len();
        let settings = self.scheduler.settings();
        let options = self.queries.options();
        Ok(StatusReport {
            uptime_secs: self.started_at.elapsed().as_secs(),
            cached_results: self.queries.cache_len(),
            saved_servers,
            query: QueryStatus {
                timeout_ms: options.timeout.as_millis() as u64,
                cache_ttl_ms: options.cache_ttl.as_millis() as u64,
                retries: options.retries,
                batch_timeout_ms: options.batch_timeout.as_millis() as u64,
                image_replies: self.config.generate_image,
            },
            schedule: ScheduleStatus {
                enabled: settings.enabled,
                running: self.scheduler.is_running(),
                interval_minutes: settings.interval.as_secs() / 60,
                window: settings.window.to_string(),
                targets: settings.targets.len(),
                image: settings.image,
            },
        })
    }
}

impl StatusReport {
    pub fn to_text(&self) -> String {
        let query = &self.query;
        let schedule = &self.schedule;
        [
            format!("⏱️ Uptime: {}", format_duration(Duration::from_secs(self.uptime_secs))),
            "🧩 A2S client and banner font loaded".to_string(),
            format!("💾 Cached results: {}", self.cached_results),
            format!("📋 Saved servers: {}", self.saved_servers),
            format!(
                "🔧 Queries: timeout {}ms, cache {}ms, {} retries, batch deadline {}ms, {} replies",
                query.timeout_ms,
                query.cache_ttl_ms,
                query.retries,
                query.batch_timeout_ms,
                if query.image_replies { "image" } else { "text" },
            ),
            format!(
                "📅 Schedule: {} ({}), every {}m, window {}, {} channel(s), {} format",
                if schedule.enabled { "enabled" } else { "disabled" },
                if schedule.running { "running" } else { "stopped" },
                schedule.interval_minutes,
                schedule.window,
                schedule.targets,
                if schedule.image { "image" } else { "text" },
            ),
        ]
        .join("\n")
    }
}
