//! Test doubles shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::Rgba;
use imageproc::rect::Rect;
use strikewatch_backend::address::ServerAddress;
use strikewatch_backend::broadcast::{Broadcaster, Payload};
use strikewatch_backend::error::StatusError;
use strikewatch_backend::query::{PlayerInfo, ProbeError, ServerInfo, ServerQuery};
use strikewatch_backend::render::{RenderError, Surface, SurfaceFactory};

/// Answers every query locally. Hosts starting with `down` always fail.
#[derive(Clone, Default)]
pub struct FakeQuery {
    pub calls: Arc<AtomicUsize>,
    failures_left: Arc<AtomicUsize>,
    latency: Duration,
}

impl FakeQuery {
    pub fn healthy() -> Self {
        Self::default()
    }

    /// Fail the first `n` calls, then answer normally.
    pub fn failing_first(n: usize) -> Self {
        Self {
            failures_left: Arc::new(AtomicUsize::new(n)),
            ..Self::default()
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ServerQuery for FakeQuery {
    async fn query(&self, address: &ServerAddress) -> Result<ServerInfo, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if address.host.starts_with("down") {
            return Err(ProbeError::Protocol("connection refused".to_string()));
        }
        let should_fail = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(ProbeError::Protocol("no reply".to_string()));
        }
        Ok(server_info(address))
    }
}

pub fn server_info(address: &ServerAddress) -> ServerInfo {
    ServerInfo {
        host: address.host.clone(),
        port: address.port,
        name: format!("Server {}", address.host),
        map: "de_inferno".to_string(),
        game: "Counter-Strike 2".to_string(),
        players: vec![PlayerInfo {
            name: "s1mple".to_string(),
            score: 12,
            duration: Duration::from_secs(600),
        }],
        player_count: 1,
        bots: 0,
        max_players: 10,
        password: false,
        vac: true,
        ping: Duration::from_millis(25),
        connect: address.to_string(),
    }
}

/// Surface that ignores drawing and encodes to a fixed marker.
pub struct NullSurface;

impl Surface for NullSurface {
    fn fill_rect(&mut self, _: Rect, _: Rgba<u8>) {}
    fn stroke_rect(&mut self, _: Rect, _: Rgba<u8>) {}
    fn draw_line(&mut self, _: (f32, f32), _: (f32, f32), _: Rgba<u8>) {}
    fn draw_text(&mut self, _: i32, _: i32, _: f32, _: Rgba<u8>, _: &str) {}
    fn measure_text(&self, size: f32, text: &str) -> u32 {
        (text.chars().count() as f32 * size * 0.5) as u32
    }
    fn encode_png(&self) -> Result<Vec<u8>, RenderError> {
        Ok(PNG_MARKER.to_vec())
    }
}

pub const PNG_MARKER: &[u8] = b"\x89PNG-fake";

/// Factory that either hands out [`NullSurface`]s or refuses every request.
#[derive(Default)]
pub struct FakeFactory {
    pub broken: bool,
}

impl FakeFactory {
    pub fn broken() -> Self {
        Self { broken: true }
    }
}

impl SurfaceFactory for FakeFactory {
    type Surface = NullSurface;

    fn create(&self, width: u32, height: u32) -> Result<NullSurface, RenderError> {
        if self.broken {
            return Err(RenderError::InvalidDimensions { width, height });
        }
        Ok(NullSurface)
    }
}

/// Records deliveries. Channels in `rejecting` fail.
#[derive(Clone, Default)]
pub struct RecordingBroadcaster {
    pub sent: Arc<Mutex<Vec<(u64, Payload)>>>,
    rejecting: Arc<HashSet<u64>>,
    latency: Duration,
}

impl RecordingBroadcaster {
    pub fn rejecting(channels: &[u64]) -> Self {
        Self {
            rejecting: Arc::new(channels.iter().copied().collect()),
            ..Self::default()
        }
    }

    /// Wait this long before each delivery is recorded.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn sent(&self) -> Vec<(u64, Payload)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_targets(&self) -> Vec<u64> {
        self.sent().iter().map(|(target, _)| *target).collect()
    }
}

impl Broadcaster for RecordingBroadcaster {
    async fn deliver(&self, channel_id: u64, payload: &Payload) -> Result<(), StatusError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.rejecting.contains(&channel_id) {
            return Err(StatusError::DeliveryFailed {
                target: channel_id,
                message: "Missing Access".to_string(),
            });
        }
        self.sent.lock().unwrap().push((channel_id, payload.clone()));
        Ok(())
    }
}
