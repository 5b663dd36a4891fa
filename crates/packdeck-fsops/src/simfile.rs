//! StepMania `.sm` chart parsing.
//!
//! Only what beatmap conversion needs is read: song metadata, the offset, the
//! BPM map and every `#NOTES` block. Stops, mines, lifts and fakes are
//! ignored.

use thiserror::Error;

/// Errors raised while reading a simfile.
#[derive(Debug, Error, PartialEq)]
pub enum SimfileError {
    /// The file declares no usable BPM.
    #[error("simfile has no timing data")]
    MissingTiming,
    /// The file holds no `#NOTES` block with playable rows.
    #[error("simfile has no playable charts")]
    NoCharts,
    /// A numeric tag could not be parsed.
    #[error("simfile tag has an invalid value")]
    InvalidValue {
        /// Tag that failed to parse.
        field: &'static str,
        /// Offending value.
        value: String,
    },
}

/// Tempo change at `beat`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BpmChange {
    /// Beat at which the tempo applies.
    pub beat: f64,
    /// Beats per minute.
    pub bpm: f64,
}

/// A single note; holds and rolls carry an end beat.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Note {
    /// Zero-based column.
    pub column: usize,
    /// Beat of the note head.
    pub beat: f64,
    /// Beat of the hold tail, if any.
    pub end_beat: Option<f64>,
}

/// One `#NOTES` block.
#[derive(Debug, Clone, PartialEq)]
pub struct StepChart {
    /// Difficulty label (`Hard`, `Challenge`, ...).
    pub difficulty: String,
    /// Number of columns.
    pub key_count: usize,
    /// Notes ordered by beat, then column.
    pub notes: Vec<Note>,
}

/// Parsed simfile.
#[derive(Debug, Clone, PartialEq)]
pub struct Simfile {
    /// `#TITLE`.
    pub title: String,
    /// `#ARTIST`.
    pub artist: String,
    /// `#CREDIT`.
    pub credit: String,
    /// `#MUSIC` file name.
    pub music: String,
    /// `#BACKGROUND` file name.
    pub background: String,
    /// `#OFFSET` in seconds; beat zero plays at `-offset`.
    pub offset: f64,
    /// Tempo map ordered by beat, starting at beat zero.
    pub bpms: Vec<BpmChange>,
    /// Every chart in the file.
    pub charts: Vec<StepChart>,
}

impl Simfile {
    /// Parse simfile text.
    ///
    /// # Errors
    ///
    /// Returns [`SimfileError`] when timing is missing or malformed, or when
    /// no chart carries notes.
    pub fn parse(text: &str) -> Result<Self, SimfileError> {
        let mut simfile = Self {
            title: String::new(),
            artist: String::new(),
            credit: String::new(),
            music: String::new(),
            background: String::new(),
            offset: 0.0,
            bpms: Vec::new(),
            charts: Vec::new(),
        };
        for (name, value) in tags(&strip_comments(text)) {
            match name.as_str() {
                "TITLE" => simfile.title = value.trim().to_owned(),
                "ARTIST" => simfile.artist = value.trim().to_owned(),
                "CREDIT" => simfile.credit = value.trim().to_owned(),
                "MUSIC" => simfile.music = value.trim().to_owned(),
                "BACKGROUND" => simfile.background = value.trim().to_owned(),
                "OFFSET" => simfile.offset = parse_number("OFFSET", value)?,
                "BPMS" => simfile.bpms = parse_bpms(value)?,
                "NOTES" => simfile.charts.extend(parse_chart(value)),
                _ => {}
            }
        }

        simfile.bpms.sort_by(|a, b| a.beat.total_cmp(&b.beat));
        match simfile.bpms.first_mut() {
            Some(first) => first.beat = 0.0,
            None => return Err(SimfileError::MissingTiming),
        }
        if simfile.charts.is_empty() {
            return Err(SimfileError::NoCharts);
        }
        Ok(simfile)
    }

    /// Milliseconds from audio start at which `beat` plays.
    #[must_use]
    pub fn beat_to_ms(&self, beat: f64) -> f64 {
        let mut seconds = -self.offset;
        for (index, change) in self.bpms.iter().enumerate() {
            let next = self
                .bpms
                .get(index + 1)
                .map_or(f64::INFINITY, |next| next.beat);
            seconds += (beat.min(next) - change.beat).max(0.0) * 60.0 / change.bpm;
            if beat <= next {
                break;
            }
        }
        seconds * 1000.0
    }
}

fn strip_comments(text: &str) -> String {
    text.lines()
        .map(|line| line.split("//").next().unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\n")
}

/// `#NAME:value;` pairs in file order, names uppercased.
fn tags(text: &str) -> Vec<(String, &str)> {
    let mut found = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find('#') {
        let after = &rest[start + 1..];
        let end = after.find(';').unwrap_or(after.len());
        if let Some((name, value)) = after[..end].split_once(':') {
            found.push((name.trim().to_ascii_uppercase(), value));
        }
        rest = after.get(end + 1..).unwrap_or_default();
    }
    found
}

fn parse_number(field: &'static str, value: &str) -> Result<f64, SimfileError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(0.0);
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|number| number.is_finite())
        .ok_or_else(|| SimfileError::InvalidValue {
            field,
            value: trimmed.to_owned(),
        })
}

fn parse_bpms(value: &str) -> Result<Vec<BpmChange>, SimfileError> {
    let mut changes = Vec::new();
    for pair in value.split(',').map(str::trim).filter(|pair| !pair.is_empty()) {
        let invalid = || SimfileError::InvalidValue {
            field: "BPMS",
            value: pair.to_owned(),
        };
        let (beat, bpm) = pair.split_once('=').ok_or_else(invalid)?;
        let beat = parse_number("BPMS", beat)?;
        let bpm = parse_number("BPMS", bpm)?;
        if bpm <= 0.0 {
            return Err(invalid());
        }
        changes.push(BpmChange { beat, bpm });
    }
    Ok(changes)
}

/// Parse `type:description:difficulty:meter:radar:rows`; blocks without rows
/// are skipped.
#[allow(clippy::cast_precision_loss)]
fn parse_chart(value: &str) -> Option<StepChart> {
    let fields: Vec<&str> = value.splitn(6, ':').collect();
    let [_, _, difficulty, _, _, rows] = fields.as_slice() else {
        return None;
    };

    let measures: Vec<Vec<&str>> = rows
        .split(',')
        .map(|measure| {
            measure
                .lines()
                .map(str::trim)
                .filter(|row| !row.is_empty())
                .collect()
        })
        .collect();
    let key_count = measures
        .iter()
        .flatten()
        .map(|row| row.chars().count())
        .next()
        .filter(|count| *count > 0)?;

    let mut notes: Vec<Note> = Vec::new();
    let mut open_holds: Vec<Option<usize>> = vec![None; key_count];
    for (measure_index, measure) in measures.iter().enumerate() {
        let rows_in_measure = measure.len() as f64;
        for (row_index, row) in measure.iter().enumerate() {
            let beat = 4.0 * (measure_index as f64 + row_index as f64 / rows_in_measure);
            for (column, symbol) in row.chars().take(key_count).enumerate() {
                match symbol {
                    '1' => notes.push(Note {
                        column,
                        beat,
                        end_beat: None,
                    }),
                    '2' | '4' => {
                        open_holds[column] = Some(notes.len());
                        notes.push(Note {
                            column,
                            beat,
                            end_beat: None,
                        });
                    }
                    '3' => {
                        if let Some(head) = open_holds[column].take() {
                            notes[head].end_beat = Some(beat);
                        }
                    }
                    _ => {}
                }
            }
        }
    }
    if notes.is_empty() {
        return None;
    }
    notes.sort_by(|a, b| a.beat.total_cmp(&b.beat).then(a.column.cmp(&b.column)));

    Some(StepChart {
        difficulty: difficulty.trim().to_owned(),
        key_count,
        notes,
    })
}
