//! Status and priority vocabulary translation.
//!
//! The backend speaks a compact wire vocabulary (`todo`, `in_progress`,
//! `high`), while column titles and task cards use the display vocabulary
//! (`To Do`, `In Progress`, `High`). Both directions are total: known values
//! go through a fixed table, anything else through a deterministic fallback.

/// Separator used between words in wire tokens.
pub const WIRE_SEPARATOR: char = '_';

/// A bidirectional display ↔ wire mapping with a fallback rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vocabulary {
    /// `(display, wire)` pairs.
    table: &'static [(&'static str, &'static str)],
}

/// Task status vocabulary (column titles on the display side).
pub const STATUS: Vocabulary = Vocabulary {
    table: &[
        ("To Do", "todo"),
        ("In Progress", "in_progress"),
        ("Done", "done"),
    ],
};

/// Task priority vocabulary.
pub const PRIORITY: Vocabulary = Vocabulary {
    table: &[("Low", "low"), ("Medium", "medium"), ("High", "high")],
};

impl Vocabulary {
    /// Returns the fixed `(display, wire)` pairs of this vocabulary.
    #[must_use]
    pub const fn pairs(&self) -> &'static [(&'static str, &'static str)] {
        self.table
    }

    /// Translates a display value into its wire token.
    ///
    /// Unknown values are lowercased and every space becomes
    /// [`WIRE_SEPARATOR`].
    #[must_use]
    pub fn to_wire(&self, display: &str) -> String {
        self.table
            .iter()
            .find(|(d, _)| *d == display)
            .map_or_else(
                || display.to_lowercase().replace(' ', "_"),
                |(_, w)| (*w).to_string(),
            )
    }

    /// Translates a wire token into its display value.
    ///
    /// Unknown tokens are split on [`WIRE_SEPARATOR`], each segment gets an
    /// uppercase first letter, and the segments are joined with spaces.
    #[must_use]
    pub fn to_display(&self, wire: &str) -> String {
        self.table
            .iter()
            .find(|(_, w)| *w == wire)
            .map_or_else(
                || {
                    wire.split(WIRE_SEPARATOR)
                        .map(capitalize)
                        .collect::<Vec<_>>()
                        .join(" ")
                },
                |(d, _)| (*d).to_string(),
            )
    }

    /// Whether `display` is one of the fixed display values.
    #[must_use]
    pub fn is_canonical_display(&self, display: &str) -> bool {
        self.table.iter().any(|(d, _)| *d == display)
    }
}

/// Display status → wire status.
#[must_use]
pub fn status_to_wire(display: &str) -> String {
    STATUS.to_wire(display)
}

/// Wire status → display status.
#[must_use]
pub fn status_to_display(wire: &str) -> String {
    STATUS.to_display(wire)
}

/// Display priority → wire priority.
#[must_use]
pub fn priority_to_wire(display: &str) -> String {
    PRIORITY.to_wire(display)
}

/// Wire priority → display priority.
#[must_use]
pub fn priority_to_display(wire: &str) -> String {
    PRIORITY.to_display(wire)
}

fn capitalize(segment: &str) -> String {
    let mut chars = segment.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}
