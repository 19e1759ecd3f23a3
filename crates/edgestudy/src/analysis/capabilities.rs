//! Capabilities by ISO/IEC/IEEE 30141 class and operating layer.
//!
//! The wide study table has up to three capability slots per repository
//! (`capability_n`, `iso_mapping_cap_n`) plus one column listing the layers
//! the capabilities run on. Slots are melted into one row per capability and
//! layer; a capability spanning several layers contributes an equal fraction
//! of one to each.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::info;
use unicode_normalization::UnicodeNormalization;

use crate::table::{is_missing, Table};

use super::{fixed, percent, Output};

/// Canonical ISO/IEC/IEEE 30141 capability classes.
pub const ISO_CLASSES: [&str; 3] = [
    "Interface Capability",
    "Data Capabilities",
    "Supporting Capabilities",
];

/// Canonical layers, in display order.
pub const LAYERS: [&str; 5] = ["Device", "Edge", "Fog", "Cloud", "Cross-cutting"];

const ID_COLUMNS: &[&str] = &["id", "repo_id", "uid"];
const NAME_COLUMNS: &[&str] = &["repo_name", "repo", "name"];
const CAPABILITY_PREFIXES: &[&str] = &["capability", "cap"];
const ISO_PREFIXES: &[&str] = &["iso_mapping_cap", "iso_map", "iso_mapping", "iso", "iso_ns"];
const LAYER_COLUMNS: &[&str] = &["layer_caps", "layers_cap", "layers_caps", "layer"];

/// Layer combinations written as one token.
const LAYER_COMBOS: &[(&str, &[&str])] = &[
    ("device/edge", &["Device", "Edge"]),
    ("edge/device", &["Device", "Edge"]),
    ("edge/fog", &["Edge", "Fog"]),
    ("fog/edge", &["Edge", "Fog"]),
    ("fog/cloud", &["Fog", "Cloud"]),
    ("cloud/fog", &["Fog", "Cloud"]),
    ("edge/fog/cloud", &["Edge", "Fog", "Cloud"]),
    ("device/edge/fog", &["Device", "Edge", "Fog"]),
    ("device/edge/fog/cloud", &["Device", "Edge", "Fog", "Cloud"]),
];

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Invalid regex pattern"));
static TO_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bto\b").expect("Invalid regex pattern"));
static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[;,|]+").expect("Invalid regex pattern"));
static SLASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*/\s*").expect("Invalid regex pattern"));
static LAYER_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\blayer\b").expect("Invalid regex pattern"));

static LAYER_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    let patterns: &[(&str, &str)] = &[
        ("Device", r"\b(device|dispositivo|endpoint|mcu)\b|\bmicrocontrol"),
        ("Edge", r"\b(edge|borda|local)\b"),
        ("Fog", r"\bfog\b"),
        ("Cloud", r"\b(cloud|nuvem|datacenter|hpc)\b"),
        (
            "Cross-cutting",
            r"\bcross[-\s]?cutting\b|\b(transversal|end-to-end|full stack|continuum)\b",
        ),
    ];
    patterns
        .iter()
        .map(|(layer, pattern)| (*layer, Regex::new(pattern).expect("Invalid regex pattern")))
        .collect()
});

/// Trim, collapse whitespace, strip edge punctuation and fold to ASCII.
fn norm_basic(raw: &str) -> String {
    let collapsed = WHITESPACE.replace_all(raw.trim(), " ");
    let stripped = collapsed.trim_matches(|c: char| ",.;:|-_/".contains(c));
    stripped.nfkd().filter(char::is_ascii).collect()
}

/// Map an ISO mapping cell onto one of the three capability classes.
#[must_use]
pub fn normalize_iso(raw: &str) -> Option<&'static str> {
    let value = norm_basic(raw).to_lowercase();
    if value.is_empty() {
        None
    } else if value.contains("interface") {
        Some(ISO_CLASSES[0])
    } else if value.contains("data") {
        Some(ISO_CLASSES[1])
    } else if value.contains("support") {
        Some(ISO_CLASSES[2])
    } else {
        None
    }
}

/// Split a layer cell into canonical layers, in [`LAYERS`] order.
///
/// Combined forms such as `Edge/Fog`, `Fog to Cloud` or `Fog/Cloud ↔ Edge`
/// expand to every layer they name. A bare mention of "layer" with no known
/// layer is read as Edge.
#[must_use]
pub fn split_layers(raw: &str) -> Option<Vec<&'static str>> {
    let value = norm_basic(&raw.replace(['↔', '\\'], "/"));
    if value.is_empty() {
        return None;
    }

    let value = TO_WORD.replace_all(&value, "/");
    let value = SEPARATORS.replace_all(&value, "/");
    let value = SLASH.replace_all(&value, "/").to_lowercase();

    let mut found: BTreeSet<&'static str> = BTreeSet::new();
    for (combo, layers) in LAYER_COMBOS {
        if value.contains(combo) {
            found.extend(layers.iter().copied());
        }
    }
    for (layer, pattern) in LAYER_PATTERNS.iter() {
        if pattern.is_match(&value) {
            found.insert(*layer);
        }
    }
    if found.is_empty() && LAYER_WORD.is_match(&value) {
        found.insert("Edge");
    }

    let ordered: Vec<&'static str> = LAYERS.into_iter().filter(|l| found.contains(l)).collect();
    (!ordered.is_empty()).then_some(ordered)
}

/// Result tables of [`capability_distribution`].
#[derive(Debug, Clone)]
pub struct CapabilityTables {
    /// One row per capability slot and layer.
    pub long: Table,
    /// Weighted count per ISO class.
    pub counts_iso: Table,
    /// Weighted count per layer.
    pub counts_layers: Table,
    /// ISO class by layer, weighted counts.
    pub heat_counts: Table,
    /// ISO class by layer, percent of total weight.
    pub heat_percent: Table,
    /// ISO cells that matched no class.
    pub unmapped_iso: Table,
    /// Layer cells that matched no layer.
    pub unmapped_layers: Table,
}

impl CapabilityTables {
    /// Named outputs for writing.
    #[must_use]
    pub fn into_outputs(self) -> Vec<Output> {
        vec![
            Output::new("normalized_capabilities_long.csv", self.long),
            Output::new("counts_iso.csv", self.counts_iso),
            Output::new("counts_layers.csv", self.counts_layers),
            Output::new("heatmap_iso_x_layer_counts.csv", self.heat_counts),
            Output::new("heatmap_iso_x_layer_percent.csv", self.heat_percent),
            Output::new("unmapped_iso.csv", self.unmapped_iso),
            Output::new("unmapped_layers.csv", self.unmapped_layers),
        ]
    }
}

struct Record {
    iso: Option<&'static str>,
    layer: Option<&'static str>,
    weight: f64,
}

fn first_value(table: &Table, row: usize, candidates: &[&str]) -> String {
    candidates
        .iter()
        .filter_map(|c| table.column_index(c))
        .map(|i| table.value(row, i))
        .find(|v| !is_missing(v))
        .unwrap_or_default()
        .to_string()
}

fn slot_column(table: &Table, prefixes: &[&str], slot: u32) -> Option<usize> {
    prefixes
        .iter()
        .find_map(|p| table.column_index(&format!("{p}_{slot}")))
}

fn cell(table: &Table, row: usize, column: Option<usize>) -> String {
    column
        .map(|c| table.value(row, c))
        .filter(|v| !is_missing(v))
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn totals_table(label: &str, classes: &[&str], weights: &[f64]) -> Table {
    let total: f64 = weights.iter().sum();
    let mut table = Table::new([label, "count", "percent"]);
    for (class, weight) in classes.iter().zip(weights) {
        table.push_row([(*class).to_string(), fixed(*weight, 3), fixed(percent(*weight, total), 2)]);
    }
    table
}

fn dedup_rows(table: &mut Table) {
    let mut seen = std::collections::HashSet::new();
    table.retain_rows(|row| seen.insert(row.to_vec()));
}

/// Melt capability slots and aggregate them by ISO class and layer.
///
/// A slot is skipped only when its capability, its ISO mapping and the
/// row's layer cell are all blank. The layer column is shared by every slot
/// of a row, so a row with a layer contributes all `slots` slots to the layer
/// counts. A slot whose layer cell cannot be mapped keeps weight 1 with an
/// empty layer, so it still counts towards its ISO class.
#[must_use]
pub fn capability_distribution(table: &Table, slots: u32) -> CapabilityTables {
    let layer_col = table.first_column(LAYER_COLUMNS);

    let mut long = Table::new([
        "id",
        "repo_name",
        "slot",
        "cap_specific",
        "iso_raw",
        "iso",
        "layer_raw",
        "layer",
        "weight",
    ]);
    let mut unmapped_iso = Table::new(["id", "repo_name", "slot", "iso_raw"]);
    let mut unmapped_layers = Table::new(["id", "repo_name", "slot", "layer_raw"]);
    let mut records = Vec::new();

    for row in 0..table.len() {
        let id = first_value(table, row, ID_COLUMNS);
        let repo = first_value(table, row, NAME_COLUMNS);
        let layer_raw = cell(table, row, layer_col);

        for slot in 1..=slots {
            let capability = cell(table, row, slot_column(table, CAPABILITY_PREFIXES, slot));
            let iso_raw = cell(table, row, slot_column(table, ISO_PREFIXES, slot));
            if capability.is_empty() && iso_raw.is_empty() && layer_raw.is_empty() {
                continue;
            }

            let iso = normalize_iso(&iso_raw);
            if iso.is_none() && !iso_raw.is_empty() {
                unmapped_iso.push_row([id.clone(), repo.clone(), slot.to_string(), iso_raw.clone()]);
            }

            let layers = split_layers(&layer_raw);
            if layers.is_none() && !layer_raw.is_empty() {
                unmapped_layers.push_row([id.clone(), repo.clone(), slot.to_string(), layer_raw.clone()]);
            }
            let layers: Vec<Option<&'static str>> = match layers {
                Some(layers) => layers.into_iter().map(Some).collect(),
                None => vec![None],
            };
            #[allow(clippy::cast_precision_loss)]
            let weight = 1.0 / layers.len() as f64;

            for layer in layers {
                long.push_row([
                    id.clone(),
                    repo.clone(),
                    slot.to_string(),
                    capability.clone(),
                    iso_raw.clone(),
                    iso.unwrap_or_default().to_string(),
                    layer_raw.clone(),
                    layer.unwrap_or_default().to_string(),
                    fixed(weight, 4),
                ]);
                records.push(Record { iso, layer, weight });
            }
        }
    }
    dedup_rows(&mut unmapped_iso);
    dedup_rows(&mut unmapped_layers);

    let mut iso_weights = [0.0; ISO_CLASSES.len()];
    let mut layer_weights = [0.0; LAYERS.len()];
    let mut matrix = [[0.0; LAYERS.len()]; ISO_CLASSES.len()];
    for record in &records {
        let iso = record.iso.and_then(|i| ISO_CLASSES.iter().position(|c| *c == i));
        let layer = record.layer.and_then(|l| LAYERS.iter().position(|c| *c == l));
        if let Some(i) = iso {
            iso_weights[i] += record.weight;
        }
        if let Some(l) = layer {
            layer_weights[l] += record.weight;
        }
        if let (Some(i), Some(l)) = (iso, layer) {
            matrix[i][l] += record.weight;
        }
    }

    let matrix_total: f64 = matrix.iter().flatten().sum();
    let mut header = vec!["iso".to_string()];
    header.extend(LAYERS.iter().map(ToString::to_string));
    let mut heat_counts = Table::new(header.clone());
    let mut heat_percent = Table::new(header);
    for (class, weights) in ISO_CLASSES.iter().zip(&matrix) {
        let mut counts = vec![(*class).to_string()];
        counts.extend(weights.iter().map(|w| fixed(*w, 3)));
        heat_counts.push_row(counts);

        let mut shares = vec![(*class).to_string()];
        shares.extend(weights.iter().map(|w| fixed(percent(*w, matrix_total), 2)));
        heat_percent.push_row(shares);
    }

    info!(
        records = long.len(),
        unmapped_iso = unmapped_iso.len(),
        unmapped_layers = unmapped_layers.len(),
        "Capability distribution computed"
    );
    CapabilityTables {
        long,
        counts_iso: totals_table("iso", &ISO_CLASSES, &iso_weights),
        counts_layers: totals_table("layer", &LAYERS, &layer_weights),
        heat_counts,
        heat_percent,
        unmapped_iso,
        unmapped_layers,
    }
}
