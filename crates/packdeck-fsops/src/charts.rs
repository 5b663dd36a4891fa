//! Chart discovery, conversion and song folder installation.

use std::collections::BTreeSet;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use packdeck_config::Settings;
use packdeck_core::error_chain;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{FsOpsError, FsOpsResult};

/// Extension of the step charts shipped inside packs.
const CHART_EXTENSION: &str = "sm";

/// Rates written into converted charts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConversionSettings {
    /// HP drain rate.
    pub hp_drain_rate: f64,
    /// Overall difficulty.
    pub overall_difficulty: f64,
}

impl From<&Settings> for ConversionSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            hp_drain_rate: settings.hp_drain_rate,
            overall_difficulty: settings.overall_difficulty,
        }
    }
}

/// Converts one chart into playable beatmaps written next to it.
///
/// Implementations should name outputs with [`converted_file_name`].
pub trait ChartConverter: Send + Sync {
    /// Convert `chart`, returning the files written.
    ///
    /// # Errors
    ///
    /// Returns the converter's own error when the chart cannot be converted.
    fn convert(
        &self,
        chart: &Path,
        settings: ConversionSettings,
    ) -> Result<Vec<PathBuf>, Box<dyn Error + Send + Sync>>;
}

/// Output name for the `difficulty` chart converted from `stem`.
#[must_use]
pub fn converted_file_name(stem: &str, difficulty: &str) -> String {
    format!("{stem} - {difficulty}.osu")
}

/// Every `.sm` chart beneath `root`, sorted by path.
///
/// # Errors
///
/// Returns [`FsOpsError::Walkdir`] when the tree cannot be traversed.
pub fn find_charts(root: &Path) -> FsOpsResult<Vec<PathBuf>> {
    let mut charts = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|err| FsOpsError::walkdir("find_charts.walk", root, err))?;
        let is_chart = entry.file_type().is_file()
            && entry
                .path()
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(CHART_EXTENSION));
        if is_chart {
            charts.push(entry.into_path());
        }
    }
    charts.sort();
    Ok(charts)
}

/// Run `converter` on every chart; failures are logged and skipped.
///
/// Returns the number of files written.
pub(crate) fn convert_charts(
    charts: &[PathBuf],
    converter: &dyn ChartConverter,
    settings: ConversionSettings,
) -> usize {
    let mut written = 0;
    for chart in charts {
        match converter.convert(chart, settings) {
            Ok(outputs) => {
                debug!(chart = %chart.display(), outputs = outputs.len(), "chart converted");
                written += outputs.len();
            }
            Err(source) => {
                let err = FsOpsError::Conversion {
                    path: chart.clone(),
                    source,
                };
                warn!(error = %error_chain(&err), chart = %chart.display(), "skipping chart");
            }
        }
    }
    written
}

/// Copy every directory holding a chart into `song_root`.
///
/// Existing directories with the same name are replaced. Returns the
/// installed directories.
///
/// # Errors
///
/// Returns an IO or walkdir error when a directory cannot be copied.
pub fn install_song_dirs(charts: &[PathBuf], song_root: &Path) -> FsOpsResult<Vec<PathBuf>> {
    let song_dirs: BTreeSet<&Path> = charts.iter().filter_map(|chart| chart.parent()).collect();
    fs::create_dir_all(song_root)
        .map_err(|err| FsOpsError::io("install_songs.create_root", song_root, err))?;

    let mut installed = Vec::with_capacity(song_dirs.len());
    for dir in song_dirs {
        let Some(name) = dir.file_name() else {
            continue;
        };
        let destination = song_root.join(name);
        if destination.exists() {
            fs::remove_dir_all(&destination)
                .map_err(|err| FsOpsError::io("install_songs.replace", &destination, err))?;
        }
        copy_tree(dir, &destination)?;
        installed.push(destination);
    }
    Ok(installed)
}

fn copy_tree(source: &Path, destination: &Path) -> FsOpsResult<()> {
    for entry in WalkDir::new(source) {
        let entry = entry.map_err(|err| FsOpsError::walkdir("copy_tree.walk", source, err))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|_| {
                FsOpsError::invalid_input(
                    "source_path",
                    "strip_prefix",
                    entry.path().to_string_lossy(),
                )
            })?;
        let target = destination.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .map_err(|err| FsOpsError::io("copy_tree.create_dir", &target, err))?;
        } else {
            fs::copy(entry.path(), &target)
                .map_err(|err| FsOpsError::io("copy_tree.copy_entry", &target, err))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn touch(path: &Path, body: &str) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, body)
    }

    struct RecordingConverter {
        seen: Mutex<Vec<PathBuf>>,
    }

    impl ChartConverter for RecordingConverter {
        fn convert(
            &self,
            chart: &Path,
            settings: ConversionSettings,
        ) -> Result<Vec<PathBuf>, Box<dyn Error + Send + Sync>> {
            self.seen
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(chart.to_path_buf());
            if chart.ends_with("bad.sm") {
                return Err(io::Error::other("unsupported chart").into());
            }
            let stem = chart
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            let output = chart.with_file_name(converted_file_name(&stem, "Hard"));
            fs::write(&output, format!("HPDrainRate:{}", settings.hp_drain_rate))?;
            Ok(vec![output])
        }
    }

    #[test]
    fn finds_charts_case_insensitively() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        touch(&dir.path().join("Pack/One/one.sm"), "")?;
        touch(&dir.path().join("Pack/Two/two.SM"), "")?;
        touch(&dir.path().join("Pack/Two/two.ogg"), "")?;

        let charts = find_charts(dir.path())?;
        assert_eq!(charts.len(), 2);
        assert!(charts[0].ends_with("Pack/One/one.sm"));
        Ok(())
    }

    #[test]
    fn conversion_failures_are_skipped() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let good = dir.path().join("Song/good.sm");
        let bad = dir.path().join("Song/bad.sm");
        touch(&good, "")?;
        touch(&bad, "")?;

        let converter = RecordingConverter {
            seen: Mutex::new(Vec::new()),
        };
        let settings = ConversionSettings::from(&Settings::default());
        let written = convert_charts(&[bad.clone(), good.clone()], &converter, settings);

        assert_eq!(written, 1);
        assert_eq!(converter.seen.lock().map(|seen| seen.len()).unwrap_or(0), 2);
        assert_eq!(
            fs::read_to_string(dir.path().join("Song/good - Hard.osu"))?,
            "HPDrainRate:8"
        );
        Ok(())
    }

    #[test]
    fn install_replaces_existing_song_dirs() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let chart = dir.path().join("extract/Pack/Song A/a.sm");
        touch(&chart, "new")?;
        touch(&dir.path().join("extract/Pack/Song A/audio.ogg"), "ogg")?;

        let songs = dir.path().join("songs");
        touch(&songs.join("Song A/stale.txt"), "old")?;

        let installed = install_song_dirs(&[chart], &songs)?;
        assert_eq!(installed, vec![songs.join("Song A")]);
        assert_eq!(fs::read_to_string(songs.join("Song A/a.sm"))?, "new");
        assert!(songs.join("Song A/audio.ogg").exists());
        assert!(!songs.join("Song A/stale.txt").exists());
        Ok(())
    }
}
