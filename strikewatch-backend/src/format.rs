//! Plain-text reports.

use std::sync::LazyLock;
use std::time::Duration;

use image::Rgba;
use regex::Regex;

use crate::query::{BatchReport, PlayerInfo, ServerInfo};

/// Width of the name column in batch tables.
const NAME_COLUMN: usize = 20;

static COLOR_CODES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\^\d").expect("valid regex"));

/// Which optional fields to show in reports.
#[derive(Debug, Clone)]
pub struct DisplayOptions {
    pub show_password: bool,
    pub show_vac: bool,
    pub max_players: usize,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            show_password: false,
            show_vac: false,
            max_players: 20,
        }
    }
}

/// Latency grade used for labels and banner colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingBand {
    Good,
    Fair,
    Poor,
}

impl PingBand {
    pub fn of(ping: Duration) -> Self {
        match ping.as_millis() {
            0..=80 => PingBand::Good,
            81..=150 => PingBand::Fair,
            _ => PingBand::Poor,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PingBand::Good => "🟢 good",
            PingBand::Fair => "🟡 fair",
            PingBand::Poor => "🔴 poor",
        }
    }

    pub fn color(self) -> Rgba<u8> {
        match self {
            PingBand::Good => Rgba([87, 242, 135, 255]),
            PingBand::Fair => Rgba([254, 231, 92, 255]),
            PingBand::Poor => Rgba([237, 66, 69, 255]),
        }
    }
}

/// Strip control characters and `^N` color codes from a player name.
pub fn clean_name(name: &str) -> String {
    let without_codes = COLOR_CODES.replace_all(name, "");
    without_codes
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Cleaned player names sorted case-insensitively and cut to `max`.
/// Also returns how many players were left out.
pub fn visible_players(players: &[PlayerInfo], max: usize) -> (Vec<String>, usize) {
    let mut names: Vec<String> = players
        .iter()
        .map(|p| {
            let name = clean_name(&p.name);
            if name.is_empty() { "(connecting)".to_string() } else { name }
        })
        .collect();
    names.sort_by_cached_key(|name| name.to_lowercase());

    let hidden = names.len().saturating_sub(max);
    names.truncate(max);
    (names, hidden)
}

/// Single-server summary, one line per available field.
pub fn format_server(info: &ServerInfo, options: &DisplayOptions) -> String {
    let mut lines = Vec::new();

    if !info.name.is_empty() {
        lines.push(format!("🎮 Name: {}", info.name));
    }
    if !info.map.is_empty() {
        lines.push(format!("🗺️ Map: {}", info.map));
    }
    lines.push(format!(
        "👥 Players: {}/{} (bots: {})",
        info.player_count, info.max_players, info.bots
    ));
    if options.show_password {
        let password = if info.password { "yes" } else { "no" };
        lines.push(format!("🔒 Password: {}", password));
    }
    lines.push(format!(
        "📶 Ping: {}ms ({})",
        info.ping.as_millis(),
        PingBand::of(info.ping).label()
    ));
    if !info.connect.is_empty() {
        lines.push(format!("🔗 Connect: connect {}", info.connect));
    }
    if options.show_vac {
        let vac = if info.vac { "enabled" } else { "disabled" };
        lines.push(format!("🛡️ VAC: {}", vac));
    }

    lines.join("\n")
}

/// Numbered player list.
pub fn format_players(players: &[PlayerInfo], max: usize) -> String {
    if players.is_empty() {
        return "No players online".to_string();
    }

    let (names, hidden) = visible_players(players, max);
    let mut lines = vec![format!("Players ({}):", players.len())];
    lines.extend(
        names
            .iter()
            .enumerate()
            .map(|(i, name)| format!("{}. {}", i + 1, name)),
    );
    if hidden > 0 {
        lines.push(format!("... and {} more not shown", hidden));
    }
    lines.join("\n")
}

/// Full single-server reply: summary followed by the player list.
pub fn format_report(info: &ServerInfo, options: &DisplayOptions) -> String {
    format!(
        "{}\n\n{}",
        format_server(info, options),
        format_players(&info.players, options.max_players)
    )
}

/// Fixed-width table with one row per batch entry, in input order.
pub fn format_batch(report: &BatchReport) -> String {
    let mut lines = vec![
        format!("📋 Server status ({} servers)", report.entries.len()),
        format!(
            "✅ {} online | ❌ {} failed | ⏱️ {}ms",
            report.succeeded(),
            report.failed(),
            report.elapsed.as_millis()
        ),
        String::new(),
    ];

    for entry in &report.entries {
        let row = match &entry.outcome {
            Ok(info) => format!(
                "{:>2}. {} {}/{}",
                entry.index,
                pad_name(&info.name),
                info.player_count,
                info.max_players
            ),
            Err(e) => format!("{:>2}. ❌ {} - {}", entry.index, entry.address, e),
        };
        lines.push(row);
    }

    lines.join("\n")
}

/// Truncate to the name column and pad with spaces.
fn pad_name(name: &str) -> String {
    let mut cut: String = if name.chars().count() > NAME_COLUMN {
        let mut short: String = name.chars().take(NAME_COLUMN - 1).collect();
        short.push('…');
        short
    } else {
        name.to_string()
    };
    let width = cut.chars().count();
    cut.extend(std::iter::repeat_n(' ', NAME_COLUMN - width));
    cut
}

/// Human readable duration, e.g. "1h 5m" or "42s".
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StatusError;
    use crate::query::BatchEntry;

    fn player(name: &str) -> PlayerInfo {
        PlayerInfo {
            name: name.to_string(),
            score: 0,
            duration: Duration::ZERO,
        }
    }

    fn server(name: &str) -> ServerInfo {
        ServerInfo {
            host: "10.0.0.1".to_string(),
            port: 27015,
            name: name.to_string(),
            map: "de_dust2".to_string(),
            game: "Counter-Strike 2".to_string(),
            players: vec![],
            player_count: 12,
            bots: 2,
            max_players: 24,
            password: true,
            vac: true,
            ping: Duration::from_millis(42),
            connect: "10.0.0.1:27015".to_string(),
        }
    }

    #[test]
    fn test_clean_name_strips_codes() {
        assert_eq!(clean_name("^1Red^7Team"), "RedTeam");
        assert_eq!(clean_name("tab\tbed\u{7}"), "tabbed");
        assert_eq!(clean_name("  ^2  "), "");
        assert_eq!(clean_name("caret^x"), "caret^x");
    }

    #[test]
    fn test_empty_player_list() {
        assert_eq!(format_players(&[], 20), "No players online");
    }

    #[test]
    fn test_players_sorted_case_insensitive() {
        let players = vec![player("bob"), player("^3Alice"), player("carol"), player("Bob2")];
        let text = format_players(&players, 20);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[1], "1. Alice");
        assert_eq!(lines[2], "2. bob");
        assert_eq!(lines[3], "3. Bob2");
        assert_eq!(lines[4], "4. carol");
    }

    #[test]
    fn test_players_truncated_with_footer() {
        let players: Vec<_> = (0..25).map(|i| player(&format!("player{:02}", i))).collect();
        let text = format_players(&players, 20);

        let numbered = text
            .lines()
            .filter(|line| line.split_once(". ").is_some_and(|(n, _)| n.parse::<usize>().is_ok()))
            .count();
        assert_eq!(numbered, 20);
        assert!(text.lines().last().unwrap().contains("5 more not shown"));
    }

    #[test]
    fn test_server_lines_in_order() {
        let options = DisplayOptions {
            show_password: true,
            show_vac: true,
            max_players: 20,
        };
        let text = format_server(&server("Dust Only"), &options);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 7);
        assert!(lines[0].ends_with("Dust Only"));
        assert!(lines[1].ends_with("de_dust2"));
        assert!(lines[2].contains("12/24 (bots: 2)"));
        assert!(lines[3].contains("Password: yes"));
        assert!(lines[4].contains("42ms") && lines[4].contains("good"));
        assert!(lines[5].contains("connect 10.0.0.1:27015"));
        assert!(lines[6].contains("VAC: enabled"));
    }

    #[test]
    fn test_server_omits_hidden_and_empty_fields() {
        let mut info = server("");
        info.map.clear();
        let text = format_server(&info, &DisplayOptions::default());
        assert!(!text.contains("Name:"));
        assert!(!text.contains("Map:"));
        assert!(!text.contains("Password"));
        assert!(!text.contains("VAC"));
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_ping_bands() {
        assert_eq!(PingBand::of(Duration::from_millis(80)), PingBand::Good);
        assert_eq!(PingBand::of(Duration::from_millis(81)), PingBand::Fair);
        assert_eq!(PingBand::of(Duration::from_millis(151)), PingBand::Poor);
    }

    #[test]
    fn test_batch_table_rows() {
        let report = BatchReport {
            entries: vec![
                BatchEntry {
                    index: 1,
                    address: "a:1".to_string(),
                    outcome: Ok(server("A very long server name indeed")),
                },
                BatchEntry {
                    index: 2,
                    address: "bad".to_string(),
                    outcome: Err(StatusError::invalid_address("bad", "missing host")),
                },
                BatchEntry {
                    index: 3,
                    address: "b:2".to_string(),
                    outcome: Ok(server("Short")),
                },
            ],
            elapsed: Duration::from_millis(321),
        };

        let text = format_batch(&report);
        let lines: Vec<_> = text.lines().collect();
        assert!(lines[1].contains("2 online") && lines[1].contains("1 failed") && lines[1].contains("321ms"));
        assert_eq!(lines[3], " 1. A very long server … 12/24");
        assert!(lines[4].starts_with(" 2. ❌ bad - invalid address"));
        assert_eq!(lines[5], format!(" 3. Short{} 12/24", " ".repeat(15)));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(600)), "10m");
        assert_eq!(format_duration(Duration::from_secs(3900)), "1h 5m");
    }
}
