//! Likert summaries of the practitioner survey.
//!
//! Survey exports mix free-text, multiple-choice and Likert questions. Likert
//! columns are recognized by their answers: the usefulness scale, the
//! agreement scale (English or Portuguese), or numeric scores.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::table::{is_missing, Table};

use super::{fixed, percent, Output};

/// Usefulness levels, most negative first.
pub const USEFULNESS_ORDER: [&str; 5] = ["Very not useful", "Not useful", "Neutral", "Useful", "Very useful"];

/// Agreement levels, most negative first.
pub const AGREE_ORDER: [&str; 5] = ["Strongly disagree", "Disagree", "Neutral", "Agree", "Strongly agree"];

/// Minimum share of answered cells that must map onto the scale.
const MIN_COVERAGE: f64 = 0.5;

/// Minimum number of distinct levels observed.
const MIN_LEVELS: usize = 3;

/// Longest question text kept when no guideline id is present.
const MAX_LABEL_CHARS: usize = 80;

const AGREE_ALIASES: &[(&str, &str)] = &[
    ("strongly disagree", "Strongly disagree"),
    ("disagree", "Disagree"),
    ("neutral", "Neutral"),
    ("neither agree nor disagree", "Neutral"),
    ("agree", "Agree"),
    ("strongly agree", "Strongly agree"),
    ("discordo totalmente", "Strongly disagree"),
    ("discordo", "Disagree"),
    ("neutro", "Neutral"),
    ("nem concordo nem discordo", "Neutral"),
    ("concordo", "Agree"),
    ("concordo totalmente", "Strongly agree"),
];

const USEFULNESS_ALIASES: &[(&str, &str)] = &[
    ("very not useful", "Very not useful"),
    ("verynotuseful", "Very not useful"),
    ("not useful", "Not useful"),
    ("neutral", "Neutral"),
    ("useful", "Useful"),
    ("very useful", "Very useful"),
];

static SCORE_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\(\d+\)\s*$").expect("Invalid regex pattern"));
static GUIDELINE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[\s*G\s*0*(\d+)").expect("Invalid regex pattern"));

/// A Likert scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scale {
    /// Very not useful .. Very useful.
    Useful,
    /// Strongly disagree .. Strongly agree, including numeric scores.
    Agree,
}

impl Scale {
    /// Levels of the scale, most negative first.
    #[must_use]
    pub fn levels(self) -> &'static [&'static str; 5] {
        match self {
            Self::Useful => &USEFULNESS_ORDER,
            Self::Agree => &AGREE_ORDER,
        }
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Useful => write!(f, "useful"),
            Self::Agree => write!(f, "agree"),
        }
    }
}

/// How answers of a column are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reading {
    UsefulText,
    AgreeText,
    AgreeNumeric,
}

impl Reading {
    fn scale(self) -> Scale {
        match self {
            Self::UsefulText => Scale::Useful,
            Self::AgreeText | Self::AgreeNumeric => Scale::Agree,
        }
    }

    fn map(self, cell: &str) -> Option<&'static str> {
        match self {
            Self::UsefulText => lookup(USEFULNESS_ALIASES, cell),
            Self::AgreeText => lookup(AGREE_ALIASES, cell),
            Self::AgreeNumeric => numeric_to_level(cell),
        }
    }
}

fn lookup(aliases: &[(&str, &'static str)], cell: &str) -> Option<&'static str> {
    if is_missing(cell) {
        return None;
    }
    let lowered = cell.trim().to_lowercase();
    let key = SCORE_SUFFIX.replace(&lowered, "");
    aliases
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|(_, level)| *level)
}

/// Map a numeric score onto the agreement scale.
///
/// 1 to 5 map one to one; 0 reads as the lowest level and 6 or 7 as the
/// highest, covering 0–4 and 1–7 scales at their edges.
#[must_use]
pub fn numeric_to_level(cell: &str) -> Option<&'static str> {
    let value: f64 = cell.trim().parse().ok()?;
    if value.fract() != 0.0 {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    match value as i64 {
        0 | 1 => Some(AGREE_ORDER[0]),
        2 => Some(AGREE_ORDER[1]),
        3 => Some(AGREE_ORDER[2]),
        4 => Some(AGREE_ORDER[3]),
        5..=7 => Some(AGREE_ORDER[4]),
        _ => None,
    }
}

/// Shorten a question to its guideline id, e.g. `[G07]`.
///
/// Questions without an id are cut to 80 characters.
#[must_use]
pub fn shorten_label(question: &str) -> String {
    if let Some(captures) = GUIDELINE_ID.captures(question) {
        let number = captures.get(1).map_or("", |m| m.as_str());
        return format!("[G{number:0>2}]");
    }
    if question.chars().count() > MAX_LABEL_CHARS {
        let cut: String = question.chars().take(MAX_LABEL_CHARS).collect();
        format!("{cut}…")
    } else {
        question.to_string()
    }
}

/// A column recognized as a Likert question.
#[derive(Debug, Clone, PartialEq)]
pub struct LikertProfile {
    /// Column header, i.e. the question text.
    pub question: String,
    /// Scale of the answers.
    pub scale: Scale,
    /// Share of answered cells that mapped onto the scale.
    pub coverage: f64,
    /// Number of mapped answers.
    pub valid: usize,
    /// Levels seen, in scale order.
    pub levels_observed: Vec<&'static str>,
    reading: Reading,
}

/// Options of [`likert_summary`].
#[derive(Debug, Clone)]
pub struct LikertOptions {
    /// Scales to look for.
    pub scales: Vec<Scale>,
    /// Keep only questions carrying a `[Gnn]` guideline id.
    pub only_guidelines: bool,
    /// Produce a question to short label map.
    pub label_map: bool,
}

impl Default for LikertOptions {
    fn default() -> Self {
        Self {
            scales: vec![Scale::Useful, Scale::Agree],
            only_guidelines: false,
            label_map: false,
        }
    }
}

fn profile_column(table: &Table, column: usize, scales: &[Scale]) -> Option<LikertProfile> {
    let mut readings = Vec::new();
    if scales.contains(&Scale::Useful) {
        readings.push(Reading::UsefulText);
    }
    if scales.contains(&Scale::Agree) {
        readings.extend([Reading::AgreeText, Reading::AgreeNumeric]);
    }

    let answered = table.column_values(column).filter(|c| !is_missing(c)).count();

    // first reading wins ties
    let mut best: Option<(Reading, Vec<&'static str>)> = None;
    for reading in readings {
        let mapped: Vec<&'static str> = table.column_values(column).filter_map(|c| reading.map(c)).collect();
        if best.as_ref().map_or(true, |(_, current)| mapped.len() > current.len()) {
            best = Some((reading, mapped));
        }
    }
    let (reading, mapped) = best?;
    if mapped.is_empty() {
        return None;
    }

    #[allow(clippy::cast_precision_loss)]
    let coverage = mapped.len() as f64 / answered.max(1) as f64;
    let distinct: BTreeSet<&str> = mapped.iter().copied().collect();
    if coverage < MIN_COVERAGE || distinct.len() < MIN_LEVELS {
        return None;
    }

    let scale = reading.scale();
    Some(LikertProfile {
        question: table.headers()[column].clone(),
        scale,
        coverage,
        valid: mapped.len(),
        levels_observed: scale.levels().iter().copied().filter(|l| distinct.contains(l)).collect(),
        reading,
    })
}

/// Recognize the Likert columns of a survey export.
#[must_use]
pub fn detect_likert_columns(table: &Table, scales: &[Scale]) -> Vec<LikertProfile> {
    (0..table.headers().len())
        .filter_map(|column| profile_column(table, column, scales))
        .collect()
}

/// Result tables of [`likert_summary`].
#[derive(Debug, Clone)]
pub struct LikertTables {
    /// Recognized questions.
    pub profiles: Vec<LikertProfile>,
    /// Answer counts per question and level.
    pub counts: Table,
    /// Answer percentages per question and level.
    pub percentages: Table,
    /// Question to short label map, when requested.
    pub label_map: Option<Table>,
}

impl LikertTables {
    /// Named outputs for writing, prefixed with `basename`.
    #[must_use]
    pub fn into_outputs(self, basename: &str) -> Vec<Output> {
        let mut outputs = vec![
            Output::new(format!("{basename}_counts.csv"), self.counts),
            Output::new(format!("{basename}_percentages.csv"), self.percentages),
        ];
        if let Some(map) = self.label_map {
            outputs.push(Output::new(format!("{basename}_label_map.csv"), map));
        }
        outputs
    }
}

/// Count answers per level for every Likert question.
///
/// Level columns are the union of the levels of the scales found, in scale
/// order; a question leaves the levels of other scales empty. Percentages
/// are rounded to one decimal.
#[must_use]
pub fn likert_summary(table: &Table, options: &LikertOptions) -> LikertTables {
    let mut profiles = detect_likert_columns(table, &options.scales);
    if options.only_guidelines {
        profiles.retain(|p| GUIDELINE_ID.is_match(&p.question));
        if profiles.is_empty() {
            warn!("No question carries a guideline id");
        }
    }
    for profile in &profiles {
        debug!(
            question = %profile.question,
            scale = %profile.scale,
            coverage = profile.coverage,
            levels = ?profile.levels_observed,
            "Likert column detected"
        );
    }

    let mut levels: Vec<&'static str> = Vec::new();
    for profile in &profiles {
        for level in profile.scale.levels() {
            if !levels.contains(level) {
                levels.push(*level);
            }
        }
    }

    let mut header = vec!["question".to_string()];
    header.extend(levels.iter().map(ToString::to_string));
    let mut counts = Table::new(header.clone());
    let mut percentages = Table::new(header);

    for profile in &profiles {
        let column = table.column_index(&profile.question);
        let mut tally = [0usize; 5];
        for cell in column.into_iter().flat_map(|c| table.column_values(c)) {
            if let Some(level) = profile.reading.map(cell) {
                if let Some(i) = profile.scale.levels().iter().position(|l| *l == level) {
                    tally[i] += 1;
                }
            }
        }
        let total: usize = tally.iter().sum();

        let mut count_row = vec![profile.question.clone()];
        let mut percent_row = vec![profile.question.clone()];
        for level in &levels {
            match profile.scale.levels().iter().position(|l| l == level) {
                Some(i) => {
                    count_row.push(tally[i].to_string());
                    #[allow(clippy::cast_precision_loss)]
                    let share = percent(tally[i] as f64, total as f64);
                    percent_row.push(fixed(share, 1));
                }
                None => {
                    count_row.push(String::new());
                    percent_row.push(String::new());
                }
            }
        }
        counts.push_row(count_row);
        percentages.push_row(percent_row);
    }

    let label_map = options.label_map.then(|| {
        let mut map = Table::new(["question", "alias"]);
        for profile in &profiles {
            map.push_row([profile.question.clone(), shorten_label(&profile.question)]);
        }
        map
    });

    info!(questions = profiles.len(), "Likert summary computed");
    LikertTables {
        profiles,
        counts,
        percentages,
        label_map,
    }
}
