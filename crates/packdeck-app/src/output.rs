//! Output renderers and formatting helpers for CLI commands.

use std::collections::{HashMap, HashSet};
use std::io::{self, Write};

use anyhow::anyhow;
use packdeck_config::Settings;
use packdeck_core::{CatalogPage, DownloadStage, DownloadState, PackId, SortOption, percent_complete};
use packdeck_events::{Event, EventEnvelope, EventStream};
use serde::Serialize;

use crate::cli::{CliError, CliResult, OutputFormat};

pub(crate) fn render_page(page: &CatalogPage, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(page),
        OutputFormat::Table => {
            println!(
                "{:>6} {:<40} {:>6} {:>10} {:>8} {:>8}",
                "ID", "NAME", "SONGS", "SIZE", "OVERALL", "PLAYS"
            );
            for pack in &page.data {
                println!(
                    "{:>6} {:<40} {:>6} {:>10} {:>8.2} {:>8}",
                    pack.id,
                    truncate(&pack.name, 40),
                    pack.song_count,
                    pack.size,
                    pack.overall,
                    pack.play_count
                );
            }
            println!(
                "page {}/{} ({} packs)",
                page.meta.current_page, page.meta.last_page, page.meta.total
            );
            Ok(())
        }
    }
}

pub(crate) fn render_sort_options(options: &[SortOption], format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(&options),
        OutputFormat::Table => {
            for option in options {
                println!("{:<12} {}", option.value, option.label);
            }
            Ok(())
        }
    }
}

pub(crate) fn render_settings(settings: &Settings, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(settings),
        OutputFormat::Table => {
            println!("hp_drain_rate: {}", settings.hp_drain_rate);
            println!("overall_difficulty: {}", settings.overall_difficulty);
            let song_path = if settings.song_path.is_empty() {
                "<unset>"
            } else {
                settings.song_path.as_str()
            };
            println!("song_path: {song_path}");
            Ok(())
        }
    }
}

/// Final line of the download command for one pack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct PackReport {
    pub(crate) pack_id: PackId,
    pub(crate) name: String,
    #[serde(flatten)]
    pub(crate) state: DownloadState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) archive_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) note: Option<String>,
}

pub(crate) fn render_reports(reports: &[PackReport], format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => print_json(&reports),
        OutputFormat::Table => {
            for report in reports {
                println!("{}", report_line(report));
            }
            Ok(())
        }
    }
}

fn report_line(report: &PackReport) -> String {
    let label = format!("[{}] {}", report.pack_id, report.name);
    match (&report.state, &report.note) {
        (_, Some(note)) => format!("{label}: skipped ({note})"),
        (DownloadState::Completed, None) => match &report.archive_path {
            Some(path) => format!("{label}: completed -> {path}"),
            None => format!("{label}: completed"),
        },
        (DownloadState::Failed { message }, None) => format!("{label}: failed: {message}"),
        (state, None) => format!("{label}: {}%", state.percent()),
    }
}

/// Print progress for `watched` packs until each one reached a terminal event.
///
/// Returns the packs still unfinished when the stream closed.
pub(crate) async fn render_progress(
    mut stream: EventStream,
    mut watched: HashSet<PackId>,
    format: OutputFormat,
) -> HashSet<PackId> {
    let mut last_shown: HashMap<PackId, (DownloadStage, u8)> = HashMap::new();
    while !watched.is_empty() {
        let Some(envelope) = stream.next().await else {
            break;
        };
        let Some(pack_id) = envelope.event.pack_id() else {
            continue;
        };
        if !watched.contains(&pack_id) {
            continue;
        }
        if matches!(
            envelope.event,
            Event::DownloadCompleted { .. }
                | Event::DownloadFailed { .. }
                | Event::DownloadForgotten { .. }
        ) {
            watched.remove(&pack_id);
        }
        if let Some(line) = progress_line(&envelope, format, &mut last_shown) {
            let mut stdout = io::stdout().lock();
            let _ = writeln!(stdout, "{line}");
        }
    }
    watched
}

fn progress_line(
    envelope: &EventEnvelope,
    format: OutputFormat,
    last_shown: &mut HashMap<PackId, (DownloadStage, u8)>,
) -> Option<String> {
    match format {
        OutputFormat::Json => serde_json::to_string(envelope).ok(),
        OutputFormat::Table => event_line(&envelope.event, last_shown),
    }
}

fn event_line(
    event: &Event,
    last_shown: &mut HashMap<PackId, (DownloadStage, u8)>,
) -> Option<String> {
    match event {
        Event::DownloadStarted { pack_id, source_url } => {
            Some(format!("[{pack_id}] started {source_url}"))
        }
        Event::DownloadProgress {
            pack_id,
            stage,
            bytes_downloaded,
            bytes_total,
        } => {
            let percent = percent_complete(*bytes_downloaded, *bytes_total);
            // Only print when the visible value changes.
            if last_shown.insert(*pack_id, (*stage, percent)) == Some((*stage, percent)) {
                return None;
            }
            Some(format!(
                "[{pack_id}] {stage} {percent:>3}% ({})",
                format_bytes(*bytes_downloaded)
            ))
        }
        Event::DownloadCompleted { pack_id, .. } => Some(format!("[{pack_id}] done")),
        Event::DownloadFailed { pack_id, message } => {
            Some(format!("[{pack_id}] failed: {message}"))
        }
        Event::DownloadForgotten { pack_id } => Some(format!("[{pack_id}] no longer tracked")),
        Event::CatalogLoaded { .. } => None,
    }
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_owned();
    }
    let mut shortened: String = value.chars().take(width.saturating_sub(1)).collect();
    shortened.push('…');
    shortened
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> CliResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::failure(anyhow!("failed to format JSON: {err}")))?;
    println!("{text}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use packdeck_events::EventBus;

    #[test]
    fn bytes_are_humanized() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024 + 512 * 1024), "5.5 MiB");
    }

    #[test]
    fn long_names_are_truncated() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 5), "abcd…");
    }

    #[test]
    fn report_lines_follow_state() {
        let mut report = PackReport {
            pack_id: 4,
            name: "Jack Wave".into(),
            state: DownloadState::Completed,
            archive_path: Some("downloads/4.zip".into()),
            note: None,
        };
        assert_eq!(report_line(&report), "[4] Jack Wave: completed -> downloads/4.zip");

        report.state = DownloadState::Failed {
            message: "pack transfer failed: timeout".into(),
        };
        report.archive_path = None;
        assert_eq!(
            report_line(&report),
            "[4] Jack Wave: failed: pack transfer failed: timeout"
        );

        report.note = Some("download already in progress".into());
        assert_eq!(
            report_line(&report),
            "[4] Jack Wave: skipped (download already in progress)"
        );
    }

    #[test]
    fn reports_serialize_with_state_tag() -> anyhow::Result<()> {
        let report = PackReport {
            pack_id: 4,
            name: "Jack Wave".into(),
            state: DownloadState::Failed {
                message: "boom".into(),
            },
            archive_path: None,
            note: None,
        };
        let value = serde_json::to_value(&report)?;
        assert_eq!(value["state"], "failed");
        assert_eq!(value["message"], "boom");
        assert!(value.get("archive_path").is_none());
        Ok(())
    }

    #[test]
    fn repeated_progress_is_suppressed() {
        let mut shown = HashMap::new();
        let progress = |downloaded| Event::DownloadProgress {
            pack_id: 1,
            stage: DownloadStage::Downloading,
            bytes_downloaded: downloaded,
            bytes_total: 1000,
        };
        assert!(event_line(&progress(250), &mut shown).is_some());
        assert!(event_line(&progress(250), &mut shown).is_none());
        assert!(event_line(&progress(251), &mut shown).is_none());
        assert!(event_line(&progress(300), &mut shown).is_some());
        assert!(event_line(&Event::DownloadForgotten { pack_id: 1 }, &mut shown).is_some());
    }

    #[tokio::test]
    async fn progress_replays_events_published_before_subscribing() {
        let bus = EventBus::new();
        bus.publish(Event::DownloadForgotten { pack_id: 99 });
        let since = bus.last_event_id().unwrap_or_default();
        bus.publish(Event::DownloadStarted {
            pack_id: 1,
            source_url: "https://files.test/1.zip".into(),
        });
        bus.publish(Event::DownloadCompleted {
            pack_id: 1,
            archive_path: "downloads/1.zip".into(),
        });

        let watched = HashSet::from([1, 2]);
        let finish_two = {
            let bus = bus.clone();
            tokio::spawn(async move {
                bus.publish(Event::DownloadFailed {
                    pack_id: 2,
                    message: "boom".into(),
                });
            })
        };
        let unfinished =
            render_progress(bus.subscribe(Some(since)), watched, OutputFormat::Json).await;
        assert!(unfinished.is_empty());
        assert!(finish_two.await.is_ok());
    }
}
