//! Architectural layer of each repository, derived from its application
//! type.

use std::fmt;

use tracing::info;

use crate::error::Result;
use crate::table::{is_missing, Table};

use super::{fixed, percent};

/// Output file of [`arch_layer_distribution`].
pub const ARCH_LAYERS_FILE: &str = "distribution_arch_layers_counts.csv";

/// Column holding the annotated application type.
pub const APPLICATION_TYPE_COLUMN: &str = "application_type";

/// Column holding the repository description used as a hint.
pub const HINT_COLUMN: &str = "desc.";

/// Phrases marking a framework as an architecture description rather than a
/// runtime platform.
const META_KEYS: &[&str] = &[
    "42010",
    "reference architecture",
    "viewpoint",
    "metamodel",
    "iso 30141",
    "30141",
    "togaf",
    "dodaf",
    "adl",
    "architecture description",
    "architecture framework",
    "reference model",
    " ra ",
    " ra:",
    " ra-",
    " ra/",
    "model-driven",
];

/// Architectural layer of a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArchLayer {
    /// Reference architectures, metamodels and architecture frameworks.
    MetaArchitecture,
    /// Runtimes, middleware and deployment platforms.
    PlatformInfrastructure,
    /// Complete applications.
    System,
    /// Components meant to be embedded in a larger system.
    Subsystem,
}

impl ArchLayer {
    /// All layers in reporting order.
    pub const ALL: [Self; 4] = [
        Self::MetaArchitecture,
        Self::PlatformInfrastructure,
        Self::System,
        Self::Subsystem,
    ];

    /// Display label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MetaArchitecture => "Meta-Architecture",
            Self::PlatformInfrastructure => "Platform/Infrastructure",
            Self::System => "System",
            Self::Subsystem => "Subsystem",
        }
    }
}

impl fmt::Display for ArchLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercase an application type and fold spelling variants.
fn normalize_label(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .replace('_', " ")
        .replace('-', "")
        .replace("full system", "system")
        .replace("sub system", "subsystem")
        .replace("sistema", "system")
        .replace("plataforma", "platform")
}

/// Classify an application type, using the description to split
/// frameworks into meta-architectures and platforms.
///
/// Unknown types are treated as systems.
#[must_use]
pub fn classify_layer(application_type: &str, hint: &str) -> ArchLayer {
    match normalize_label(application_type).as_str() {
        "system" => ArchLayer::System,
        "subsystem" => ArchLayer::Subsystem,
        "platform" | "platform/framework" | "framework/platform" => ArchLayer::PlatformInfrastructure,
        "framework" => {
            let hint = format!(" {} ", hint.to_lowercase());
            if META_KEYS.iter().any(|key| hint.contains(key)) {
                ArchLayer::MetaArchitecture
            } else {
                ArchLayer::PlatformInfrastructure
            }
        }
        _ => ArchLayer::System,
    }
}

/// Count repositories per architectural layer.
///
/// Rows without an application type are dropped. The result lists every
/// layer in [`ArchLayer::ALL`] order as `Layer, Count, Percent`, with the
/// percentage rounded to one decimal.
///
/// # Errors
///
/// Returns an error if the application type column is missing.
pub fn arch_layer_distribution(table: &Table) -> Result<Table> {
    let type_col = table.require_column(APPLICATION_TYPE_COLUMN)?;
    let hint_col = table.column_index(HINT_COLUMN);

    let mut counts = [0usize; ArchLayer::ALL.len()];
    for row in 0..table.len() {
        let application_type = table.value(row, type_col);
        if is_missing(application_type) {
            continue;
        }
        let hint = hint_col.map_or("", |c| table.value(row, c));
        let layer = classify_layer(application_type, hint);
        counts[layer as usize] += 1;
    }

    let total: usize = counts.iter().sum();
    let mut result = Table::new(["Layer", "Count", "Percent"]);
    for (layer, count) in ArchLayer::ALL.iter().zip(counts) {
        #[allow(clippy::cast_precision_loss)]
        let share = percent(count as f64, total as f64);
        result.push_row([layer.to_string(), count.to_string(), fixed(share, 1)]);
    }

    info!(classified = total, skipped = table.len() - total, "Architectural layers counted");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label(" Full_System "), "system");
        assert_eq!(normalize_label("Sub-sistema"), "subsystem");
        assert_eq!(normalize_label("Plataforma"), "platform");
    }

    #[test]
    fn test_classify_layer_direct() {
        assert_eq!(classify_layer("System", ""), ArchLayer::System);
        assert_eq!(classify_layer("sub system", ""), ArchLayer::Subsystem);
        assert_eq!(classify_layer("Framework/Platform", ""), ArchLayer::PlatformInfrastructure);
        assert_eq!(classify_layer("library", ""), ArchLayer::System);
    }

    #[test]
    fn test_classify_framework_uses_hint() {
        assert_eq!(
            classify_layer("framework", "A Reference Architecture for edge AI"),
            ArchLayer::MetaArchitecture
        );
        assert_eq!(classify_layer("framework", "RA for IoT"), ArchLayer::MetaArchitecture);
        assert_eq!(classify_layer("framework", "An IIoT RA"), ArchLayer::MetaArchitecture);
        assert_eq!(classify_layer("framework", "Terra runtime"), ArchLayer::PlatformInfrastructure);
        assert_eq!(
            classify_layer("framework", "Kubernetes operator for inference"),
            ArchLayer::PlatformInfrastructure
        );
        assert_eq!(classify_layer("framework", "random"), ArchLayer::PlatformInfrastructure);
    }

    #[test]
    fn test_arch_layer_distribution() {
        let mut table = Table::new(["name", "application_type", "desc."]);
        table.push_row(["a", "system", ""]);
        table.push_row(["b", "System", ""]);
        table.push_row(["c", "framework", "ISO 42010 viewpoints"]);
        table.push_row(["d", "", "dropped"]);
        table.push_row(["e", "subsystem", ""]);

        let result = arch_layer_distribution(&table).unwrap();
        assert_eq!(
            result.rows(),
            &[
                vec!["Meta-Architecture", "1", "25.0"],
                vec!["Platform/Infrastructure", "0", "0.0"],
                vec!["System", "2", "50.0"],
                vec!["Subsystem", "1", "25.0"],
            ]
        );
    }

    #[test]
    fn test_arch_layer_distribution_requires_type_column() {
        let table = Table::new(["name"]);
        assert!(arch_layer_distribution(&table).is_err());
    }
}
