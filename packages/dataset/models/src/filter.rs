//! Named, reusable predicates over incident fields.
//!
//! A filter selects which incidents participate in a load or an
//! aggregation. Text matches are case-sensitive, mirroring SQL `=`,
//! `LIKE '%x%'` and `IN (...)` against the upper-case Chicago export.

use serde::{Deserialize, Serialize};

use crate::{Incident, IncidentRow};

/// Read access to the fields a filter can inspect.
///
/// Implemented for both raw rows (so the load filter runs before
/// validation) and validated incidents.
pub trait IncidentFields {
    /// Primary crime type.
    fn category(&self) -> &str;
    /// Secondary description.
    fn description(&self) -> &str;
    /// Type of location, if recorded.
    fn location_description(&self) -> Option<&str>;
    /// Whether an arrest was made.
    fn arrested(&self) -> bool;
}

impl IncidentFields for Incident {
    fn category(&self) -> &str {
        &self.category
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn location_description(&self) -> Option<&str> {
        self.location_description.as_deref()
    }

    fn arrested(&self) -> bool {
        self.arrest
    }
}

impl IncidentFields for IncidentRow {
    fn category(&self) -> &str {
        &self.category
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn location_description(&self) -> Option<&str> {
        self.location_description.as_deref()
    }

    fn arrested(&self) -> bool {
        self.arrest.unwrap_or(false)
    }
}

/// How a text field is compared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextMatch {
    /// Whole-value equality.
    Exact(String),
    /// Substring match (`LIKE '%value%'`).
    Contains(String),
    /// Equality with any listed value (`IN (...)`).
    AnyOf(Vec<String>),
}

impl TextMatch {
    /// Whether `value` satisfies this match.
    #[must_use]
    pub fn is_match(&self, value: &str) -> bool {
        match self {
            Self::Exact(expected) => value == expected,
            Self::Contains(needle) => value.contains(needle.as_str()),
            Self::AnyOf(options) => options.iter().any(|o| o == value),
        }
    }
}

/// A predicate selecting which incidents participate in an operation.
///
/// Deserializes from config as an internally tagged table, e.g.
/// `{ type = "description", matches = { contains = "GUN" } }`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IncidentFilter {
    /// Every incident.
    #[default]
    All,
    /// Match on the primary crime type.
    Category {
        /// Comparison to apply.
        matches: TextMatch,
    },
    /// Match on the secondary description.
    Description {
        /// Comparison to apply.
        matches: TextMatch,
    },
    /// Match on the location type. Incidents without one never match.
    LocationDescription {
        /// Comparison to apply.
        matches: TextMatch,
    },
    /// Match on the arrest flag.
    Arrest {
        /// Required arrest flag.
        arrested: bool,
    },
    /// Every nested filter must match.
    And {
        /// Nested filters.
        filters: Vec<Self>,
    },
    /// At least one nested filter must match.
    Or {
        /// Nested filters.
        filters: Vec<Self>,
    },
    /// The nested filter must not match.
    Not {
        /// Nested filter.
        filter: Box<Self>,
    },
}

impl IncidentFilter {
    /// Description contains `needle` (the notebook's `'%GUN%'`).
    #[must_use]
    pub fn description_contains(needle: &str) -> Self {
        Self::Description {
            matches: TextMatch::Contains(needle.to_string()),
        }
    }

    /// Description equals `value`.
    #[must_use]
    pub fn description_equals(value: &str) -> Self {
        Self::Description {
            matches: TextMatch::Exact(value.to_string()),
        }
    }

    /// Primary type equals `value`.
    #[must_use]
    pub fn category_equals(value: &str) -> Self {
        Self::Category {
            matches: TextMatch::Exact(value.to_string()),
        }
    }

    /// Primary type is one of `values`.
    #[must_use]
    pub fn category_in<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Category {
            matches: TextMatch::AnyOf(values.into_iter().map(Into::into).collect()),
        }
    }

    /// Location type is one of `values`.
    #[must_use]
    pub fn location_in<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::LocationDescription {
            matches: TextMatch::AnyOf(values.into_iter().map(Into::into).collect()),
        }
    }

    /// Arrest flag equals `arrested`.
    #[must_use]
    pub const fn arrested(arrested: bool) -> Self {
        Self::Arrest { arrested }
    }

    /// Combines `self` and `other` so both must match.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match (self, other) {
            (Self::All, f) | (f, Self::All) => f,
            (Self::And { mut filters }, f) => {
                filters.push(f);
                Self::And { filters }
            }
            (a, b) => Self::And {
                filters: vec![a, b],
            },
        }
    }

    /// Whether this filter accepts every incident without inspecting it.
    #[must_use]
    pub const fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    /// Whether `incident` satisfies this filter.
    #[must_use]
    pub fn matches<T: IncidentFields + ?Sized>(&self, incident: &T) -> bool {
        match self {
            Self::All => true,
            Self::Category { matches } => matches.is_match(incident.category()),
            Self::Description { matches } => matches.is_match(incident.description()),
            Self::LocationDescription { matches } => incident
                .location_description()
                .is_some_and(|value| matches.is_match(value)),
            Self::Arrest { arrested } => incident.arrested() == *arrested,
            Self::And { filters } => filters.iter().all(|f| f.matches(incident)),
            Self::Or { filters } => filters.iter().any(|f| f.matches(incident)),
            Self::Not { filter } => !filter.matches(incident),
        }
    }
}
