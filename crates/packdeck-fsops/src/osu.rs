//! osu!mania beatmap encoding and the `.sm` converter built on it.

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use crate::charts::{ChartConverter, ConversionSettings, converted_file_name};
use crate::error::FsOpsError;
use crate::simfile::{Simfile, StepChart};

/// Difficulty label used when a chart has none.
pub const UNKNOWN_DIFFICULTY: &str = "Unknown";

/// Playfield width osu! lays mania columns across.
const PLAYFIELD_WIDTH: usize = 512;

/// Converts every chart of a `.sm` file into an osu!mania beatmap written
/// next to it as `{stem} - {difficulty}.osu`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmToOsuConverter;

impl ChartConverter for SmToOsuConverter {
    fn convert(
        &self,
        chart: &Path,
        settings: ConversionSettings,
    ) -> Result<Vec<PathBuf>, Box<dyn Error + Send + Sync>> {
        let bytes = fs::read(chart).map_err(|err| FsOpsError::io("convert.read", chart, err))?;
        let simfile = Simfile::parse(&String::from_utf8_lossy(&bytes))?;
        let stem = chart
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut written: Vec<PathBuf> = Vec::with_capacity(simfile.charts.len());
        for step_chart in &simfile.charts {
            let mut version = version_name(step_chart);
            let mut output = chart.with_file_name(converted_file_name(&stem, &version));
            if written.contains(&output) {
                version = format!("{version} {}K", step_chart.key_count);
                output = chart.with_file_name(converted_file_name(&stem, &version));
            }
            let beatmap = encode_beatmap(&simfile, step_chart, &version, settings);
            fs::write(&output, beatmap)
                .map_err(|err| FsOpsError::io("convert.write", &output, err))?;
            written.push(output);
        }
        Ok(written)
    }
}

fn version_name(chart: &StepChart) -> String {
    let name: String = chart
        .difficulty
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    if name.trim().is_empty() {
        UNKNOWN_DIFFICULTY.to_owned()
    } else {
        name
    }
}

/// Render `chart` as an osu! file format v14 mania beatmap.
#[must_use]
pub fn encode_beatmap(
    simfile: &Simfile,
    chart: &StepChart,
    version: &str,
    settings: ConversionSettings,
) -> String {
    let mut lines = vec![
        "osu file format v14".to_owned(),
        String::new(),
        "[General]".to_owned(),
        format!("AudioFilename: {}", simfile.music),
        "AudioLeadIn: 0".to_owned(),
        "PreviewTime: -1".to_owned(),
        "Mode: 3".to_owned(),
        String::new(),
        "[Metadata]".to_owned(),
        format!("Title:{}", simfile.title),
        format!("TitleUnicode:{}", simfile.title),
        format!("Artist:{}", simfile.artist),
        format!("ArtistUnicode:{}", simfile.artist),
        format!("Creator:{}", simfile.credit),
        format!("Version:{version}"),
        String::new(),
        "[Difficulty]".to_owned(),
        format!("HPDrainRate:{}", settings.hp_drain_rate),
        format!("CircleSize:{}", chart.key_count),
        format!("OverallDifficulty:{}", settings.overall_difficulty),
        "ApproachRate:5".to_owned(),
        "SliderMultiplier:1.4".to_owned(),
        "SliderTickRate:1".to_owned(),
        String::new(),
        "[Events]".to_owned(),
    ];
    if !simfile.background.is_empty() {
        lines.push(format!("0,0,\"{}\",0,0", simfile.background));
    }

    lines.push(String::new());
    lines.push("[TimingPoints]".to_owned());
    for change in &simfile.bpms {
        lines.push(format!(
            "{},{},4,2,0,100,1,0",
            millis(simfile.beat_to_ms(change.beat)),
            60_000.0 / change.bpm
        ));
    }

    lines.push(String::new());
    lines.push("[HitObjects]".to_owned());
    for note in &chart.notes {
        let x = (PLAYFIELD_WIDTH * note.column + PLAYFIELD_WIDTH / 2) / chart.key_count;
        let time = millis(simfile.beat_to_ms(note.beat));
        lines.push(match note.end_beat {
            Some(end) => format!(
                "{x},192,{time},128,0,{}:0:0:0:0:",
                millis(simfile.beat_to_ms(end))
            ),
            None => format!("{x},192,{time},1,0,0:0:0:0:"),
        });
    }
    lines.push(String::new());
    lines.join("\n")
}

#[allow(clippy::cast_possible_truncation)]
fn millis(value: f64) -> i64 {
    value.round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SONG: &str = "\
#TITLE:Jack Wave;
#ARTIST:Nobody;
#CREDIT:mapper;
#MUSIC:song.ogg;
#BACKGROUND:bg.png;
#OFFSET:0.000;
#BPMS:0.000=120.000,4.000=240.000;
#NOTES:dance-single::Hard:9:0,0,0,0,0:
1000
0100
2000
0000
,
3000
0001
0000
0000
;
#NOTES:dance-single:::3:0,0,0,0,0:
0010
;
";

    fn settings() -> ConversionSettings {
        ConversionSettings {
            hp_drain_rate: 7.5,
            overall_difficulty: 8.0,
        }
    }

    #[test]
    fn writes_one_beatmap_per_chart() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let chart = dir.path().join("Jack Wave.sm");
        fs::write(&chart, SONG)?;

        let written = SmToOsuConverter
            .convert(&chart, settings())
            .map_err(|e| anyhow::anyhow!(e))?;
        assert_eq!(
            written,
            vec![
                dir.path().join("Jack Wave - Hard.osu"),
                dir.path().join("Jack Wave - Unknown.osu"),
            ]
        );

        let hard = fs::read_to_string(&written[0])?;
        for expected in [
            "AudioFilename: song.ogg",
            "Title:Jack Wave",
            "Creator:mapper",
            "Version:Hard",
            "HPDrainRate:7.5",
            "OverallDifficulty:8",
            "CircleSize:4",
            "0,0,\"bg.png\",0,0",
            "0,500,4,2,0,100,1,0",
            "2000,250,4,2,0,100,1,0",
            "64,192,0,1,0,0:0:0:0:",
            "192,192,500,1,0,0:0:0:0:",
            "64,192,1000,128,0,2000:0:0:0:0:",
            "448,192,2250,1,0,0:0:0:0:",
        ] {
            assert!(hard.lines().any(|line| line == expected), "missing {expected}");
        }
        Ok(())
    }

    #[test]
    fn duplicate_difficulties_get_key_suffix() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let chart = dir.path().join("dup.sm");
        fs::write(
            &chart,
            "#BPMS:0=150;#NOTES:dance-single::Hard:1::1000;#NOTES:dance-double::Hard:1::10000000;",
        )?;
        let written = SmToOsuConverter
            .convert(&chart, settings())
            .map_err(|e| anyhow::anyhow!(e))?;
        assert_eq!(written[1], dir.path().join("dup - Hard 8K.osu"));
        Ok(())
    }

    #[test]
    fn unreadable_charts_are_errors() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let chart = dir.path().join("broken.sm");
        fs::write(&chart, "#TITLE:no timing;")?;
        assert!(SmToOsuConverter.convert(&chart, settings()).is_err());
        assert!(SmToOsuConverter.convert(&dir.path().join("missing.sm"), settings()).is_err());
        Ok(())
    }
}
