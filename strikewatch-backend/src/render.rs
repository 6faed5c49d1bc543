//! Image rendering for server status banners.
//!
//! This module handles:
//! - The drawing surface capability and its raster implementation
//! - Laying out a single-server banner with its player list
//! - Laying out a batch summary banner

use ab_glyph::{Font, FontArc, PxScale};
use image::{ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::{
    draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut,
};
use imageproc::rect::Rect;
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

use crate::error::StatusError;
use crate::format::{DisplayOptions, PingBand, visible_players};
use crate::query::{BatchReport, ServerInfo};

/// Absolute cap on banner height.
pub const MAX_HEIGHT: u32 = 2000;
/// Narrowest banner the layout supports.
pub const MIN_WIDTH: u32 = 320;

const PADDING: u32 = 24;
/// Title block including the divider under it
const HEADER_HEIGHT: u32 = 90;
const FIELD_ROW: u32 = 32;
/// Map, players, ping and connect are always drawn
const BASE_FIELDS: u32 = 4;
const PLAYERS_HEADING: u32 = 40;
const FOOTER: u32 = 30;
const PLAYER_ROW: u32 = 28;
const COMPACT_ROW: u32 = 24;
/// Above this many visible players the list is split into two columns
const TWO_COLUMN_THRESHOLD: usize = 10;

const BATCH_HEADER: u32 = 100;
const BATCH_ROW: u32 = 90;
/// Batch rows that fit under [`MAX_HEIGHT`]
const MAX_BATCH_ROWS: usize = ((MAX_HEIGHT - BATCH_HEADER - PADDING) / BATCH_ROW) as usize;

/// DejaVu Sans, used when no font file is configured
const BUNDLED_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

const BACKGROUND: Rgba<u8> = Rgba([30, 33, 40, 255]);
const TEXT: Rgba<u8> = Rgba([255, 255, 255, 255]);
const MUTED: Rgba<u8> = Rgba([160, 165, 175, 255]);
const DIVIDER: Rgba<u8> = Rgba([70, 75, 85, 255]);
const ACCENT: Rgba<u8> = Rgba([88, 101, 242, 255]);

/// A 2D canvas that status banners are drawn on.
pub trait Surface {
    fn fill_rect(&mut self, rect: Rect, color: Rgba<u8>);
    fn stroke_rect(&mut self, rect: Rect, color: Rgba<u8>);
    fn draw_line(&mut self, from: (f32, f32), to: (f32, f32), color: Rgba<u8>);
    fn draw_text(&mut self, x: i32, y: i32, size: f32, color: Rgba<u8>, text: &str);
    /// Width in pixels of `text` at `size`.
    fn measure_text(&self, size: f32, text: &str) -> u32;
    fn encode_png(&self) -> Result<Vec<u8>, RenderError>;
}

/// Creates drawing surfaces of a requested size.
pub trait SurfaceFactory: Send + Sync + 'static {
    type Surface: Surface;

    fn create(&self, width: u32, height: u32) -> Result<Self::Surface, RenderError>;
}

/// Surfaces backed by an in-memory RGBA image.
#[derive(Clone)]
pub struct RasterFactory {
    font: FontArc,
}

impl RasterFactory {
    /// Use the font compiled into the binary.
    pub fn bundled() -> Result<Self, StatusError> {
        Self::from_bytes(BUNDLED_FONT.to_vec()).map_err(|e| StatusError::DependencyUnavailable {
            dependency: "banner font",
            reason: e.to_string(),
        })
    }

    /// Load the banner font from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, StatusError> {
        let path = path.as_ref();
        let unavailable = |reason: String| StatusError::DependencyUnavailable {
            dependency: "banner font",
            reason: format!("{}: {}", path.display(), reason),
        };
        let bytes = std::fs::read(path).map_err(|e| unavailable(e.to_string()))?;
        Self::from_bytes(bytes).map_err(|e| unavailable(e.to_string()))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, RenderError> {
        let font = FontArc::try_from_vec(bytes).map_err(|e| RenderError::FontLoad(e.to_string()))?;
        Ok(Self { font })
    }
}

impl SurfaceFactory for RasterFactory {
    type Surface = RasterSurface;

    fn create(&self, width: u32, height: u32) -> Result<RasterSurface, RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidDimensions { width, height });
        }
        Ok(RasterSurface {
            canvas: RgbaImage::new(width, height),
            font: self.font.clone(),
        })
    }
}

pub struct RasterSurface {
    canvas: RgbaImage,
    font: FontArc,
}

impl Surface for RasterSurface {
    fn fill_rect(&mut self, rect: Rect, color: Rgba<u8>) {
        draw_filled_rect_mut(&mut self.canvas, rect, color);
    }

    fn stroke_rect(&mut self, rect: Rect, color: Rgba<u8>) {
        draw_hollow_rect_mut(&mut self.canvas, rect, color);
    }

    fn draw_line(&mut self, from: (f32, f32), to: (f32, f32), color: Rgba<u8>) {
        draw_line_segment_mut(&mut self.canvas, from, to, color);
    }

    fn draw_text(&mut self, x: i32, y: i32, size: f32, color: Rgba<u8>, text: &str) {
        draw_text_mut(
            &mut self.canvas,
            color,
            x,
            y,
            PxScale::from(size),
            &self.font,
            text,
        );
    }

    fn measure_text(&self, size: f32, text: &str) -> u32 {
        let scale_factor = size / self.font.height_unscaled();
        let width: f32 = text
            .chars()
            .map(|c| self.font.h_advance_unscaled(self.font.glyph_id(c)) * scale_factor)
            .sum();
        width as u32
    }

    fn encode_png(&self) -> Result<Vec<u8>, RenderError> {
        let mut buf = Vec::new();
        self.canvas
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .map_err(|e| RenderError::ImageEncode(e.to_string()))?;
        Ok(buf)
    }
}

/// Banner layout settings.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub width: u32,
    pub min_height: u32,
    /// Base font size in pixels
    pub font_size: u32,
    pub display: DisplayOptions,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            width: 800,
            min_height: 300,
            font_size: 20,
            display: DisplayOptions::default(),
        }
    }
}

/// Draws status banners on surfaces from `F`.
pub struct Renderer<F> {
    factory: F,
    options: RenderOptions,
}

impl<F: SurfaceFactory> Renderer<F> {
    pub fn new(factory: F, mut options: RenderOptions) -> Self {
        options.width = options.width.max(MIN_WIDTH);
        Self { factory, options }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Height of a single-server banner for `info`.
    pub fn server_height(&self, info: &ServerInfo) -> u32 {
        let display = &self.options.display;
        let (names, hidden) = visible_players(&info.players, display.max_players);

        let (rows, row_height) = player_rows(names.len());
        let mut height = HEADER_HEIGHT
            + BASE_FIELDS * FIELD_ROW
            + PLAYERS_HEADING
            + FOOTER
            + rows * row_height;
        // "no players" or "N more" line
        if names.is_empty() || hidden > 0 {
            height += PLAYER_ROW;
        }
        if display.show_password {
            height += FIELD_ROW;
        }
        if display.show_vac {
            height += FIELD_ROW;
        }

        height.max(self.options.min_height).min(MAX_HEIGHT)
    }

    /// Height of a batch banner with `rows` servers, capped at [`MAX_HEIGHT`].
    pub fn batch_height(&self, rows: usize) -> u32 {
        BATCH_HEADER + rows.min(MAX_BATCH_ROWS) as u32 * BATCH_ROW + PADDING
    }

    /// Render a single server with its player list as PNG.
    pub fn render_server(&self, info: &ServerInfo) -> Result<Vec<u8>, RenderError> {
        let width = self.options.width;
        let height = self.server_height(info);
        let base = self.options.font_size as f32;
        let display = &self.options.display;
        let mut surface = self.factory.create(width, height)?;

        surface.fill_rect(Rect::at(0, 0).of_size(width, height), BACKGROUND);

        let title = if info.name.is_empty() { "Unnamed server" } else { info.name.as_str() };
        let title_size = fit_font_size(&surface, title, width.saturating_sub(PADDING * 2), base);
        surface.draw_text(PADDING as i32, 20, title_size, TEXT, title);
        divider(&mut surface, HEADER_HEIGHT - 12, width);

        let mut y = HEADER_HEIGHT;
        let mut field = |surface: &mut F::Surface, label: &str, value: &str, color: Rgba<u8>| {
            surface.draw_text(PADDING as i32, y as i32, base, MUTED, label);
            surface.draw_text((PADDING + 140) as i32, y as i32, base, color, value);
            y += FIELD_ROW;
        };

        field(&mut surface, "Map", &info.map, TEXT);
        field(
            &mut surface,
            "Players",
            &format!("{}/{} ({} bots)", info.player_count, info.max_players, info.bots),
            TEXT,
        );
        field(
            &mut surface,
            "Ping",
            &format!("{}ms", info.ping.as_millis()),
            PingBand::of(info.ping).color(),
        );
        if display.show_password {
            let value = if info.password { "Required" } else { "None" };
            field(&mut surface, "Password", value, TEXT);
        }
        if display.show_vac {
            let value = if info.vac { "Secured" } else { "Insecure" };
            field(&mut surface, "VAC", value, TEXT);
        }
        field(&mut surface, "Connect", &format!("connect {}", info.connect), ACCENT);

        divider(&mut surface, y + 4, width);
        y += PLAYERS_HEADING / 2;
        surface.draw_text(
            PADDING as i32,
            y as i32,
            base,
            TEXT,
            &format!("Players online ({})", info.players.len()),
        );
        y += PLAYERS_HEADING / 2 + 4;

        let (names, hidden) = visible_players(&info.players, display.max_players);
        let (rows, row_height) = player_rows(names.len());
        let column_width = (width - PADDING * 2) / 2;
        let list_size = if names.len() > TWO_COLUMN_THRESHOLD { base * 0.85 } else { base };
        for (i, name) in names.iter().enumerate() {
            let (column, row) = if names.len() > TWO_COLUMN_THRESHOLD {
                ((i as u32) / rows, (i as u32) % rows)
            } else {
                (0, i as u32)
            };
            surface.draw_text(
                (PADDING + column * column_width) as i32,
                (y + row * row_height) as i32,
                list_size,
                TEXT,
                &format!("{}. {}", i + 1, name),
            );
        }
        y += rows * row_height;

        if names.is_empty() {
            surface.draw_text(PADDING as i32, y as i32, base, MUTED, "No players online");
        } else if hidden > 0 {
            surface.draw_text(
                PADDING as i32,
                y as i32,
                base,
                MUTED,
                &format!("... and {} more not shown", hidden),
            );
        }

        border(&mut surface, width, height);
        surface.encode_png()
    }

    /// Render a batch summary (name, address, players, map, ping per row) as PNG.
    pub fn render_batch(&self, report: &BatchReport) -> Result<Vec<u8>, RenderError> {
        let width = self.options.width;
        let height = self.batch_height(report.entries.len());
        let base = self.options.font_size as f32;
        let small = (base * 0.75).round();
        let mut surface = self.factory.create(width, height)?;

        surface.fill_rect(Rect::at(0, 0).of_size(width, height), BACKGROUND);
        surface.draw_text(PADDING as i32, 20, (base * 1.5).round(), TEXT, "Server Status");
        surface.draw_text(
            PADDING as i32,
            56,
            small,
            MUTED,
            &format!(
                "{}/{} online · took {}ms",
                report.succeeded(),
                report.entries.len(),
                report.elapsed.as_millis()
            ),
        );
        divider(&mut surface, BATCH_HEADER - 12, width);

        for (i, entry) in report.entries.iter().take(MAX_BATCH_ROWS).enumerate() {
            let top = BATCH_HEADER + i as u32 * BATCH_ROW;
            let x = PADDING as i32;

            match &entry.outcome {
                Ok(info) => {
                    let name = if info.name.is_empty() { "Unnamed server" } else { info.name.as_str() };
                    surface.draw_text(x, top as i32, base, TEXT, &format!("#{} {}", entry.index, name));
                    surface.draw_text(x, (top + 28) as i32, small, MUTED, &info.connect);
                    surface.draw_text(
                        x,
                        (top + 52) as i32,
                        small,
                        TEXT,
                        &format!("{}/{} players · {}", info.player_count, info.max_players, info.map),
                    );

                    let ping = format!("{}ms", info.ping.as_millis());
                    let ping_x = width.saturating_sub(PADDING + surface.measure_text(base, &ping));
                    surface.draw_text(ping_x as i32, top as i32, base, PingBand::of(info.ping).color(), &ping);
                }
                Err(e) => {
                    surface.draw_text(
                        x,
                        top as i32,
                        base,
                        PingBand::Poor.color(),
                        &format!("#{} OFFLINE", entry.index),
                    );
                    surface.draw_text(x, (top + 28) as i32, small, MUTED, &entry.address);
                    surface.draw_text(x, (top + 52) as i32, small, MUTED, &e.to_string());
                }
            }

            if i + 1 < report.entries.len() {
                divider(&mut surface, top + BATCH_ROW - 10, width);
            }
        }

        border(&mut surface, width, height);
        surface.encode_png()
    }
}

/// Number of list rows and the height of each for `count` visible players.
fn player_rows(count: usize) -> (u32, u32) {
    if count > TWO_COLUMN_THRESHOLD {
        (count.div_ceil(2) as u32, COMPACT_ROW)
    } else {
        (count as u32, PLAYER_ROW)
    }
}

/// Largest whole-pixel size from 2x `base` down to `base` at which `text`
/// fits in `max_width`.
pub fn fit_font_size<S: Surface>(surface: &S, text: &str, max_width: u32, base: f32) -> f32 {
    let floor = base.round().max(1.0);
    let mut size = (base * 2.0).round();
    while size > floor && surface.measure_text(size, text) > max_width {
        size -= 1.0;
    }
    size
}

fn divider<S: Surface>(surface: &mut S, y: u32, width: u32) {
    surface.draw_line(
        (PADDING as f32, y as f32),
        ((width - PADDING) as f32, y as f32),
        DIVIDER,
    );
}

fn border<S: Surface>(surface: &mut S, width: u32, height: u32) {
    surface.stroke_rect(Rect::at(0, 0).of_size(width, height), ACCENT);
    surface.stroke_rect(Rect::at(1, 1).of_size(width - 2, height - 2), ACCENT);
}

/// Errors that can occur during rendering.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to load font: {0}")]
    FontLoad(String),

    #[error("invalid surface dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("failed to encode image: {0}")]
    ImageEncode(String),
}
