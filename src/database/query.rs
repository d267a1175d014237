//! Predicates over activities and the range/skip/limit envelope around them.

use std::ops::Deref;

use chrono::NaiveDateTime;
use regex::{Regex, RegexBuilder};

use crate::activity::Activity;
use crate::error::QueryError;
use crate::fields;
use crate::record::Record;
use crate::units::{self, UnitSystem, ValueKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Less,
    LessOrEqual,
    Equal,
    NotEqual,
    GreaterOrEqual,
    Greater,
}

impl CompareOp {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol.trim() {
            "<" => Some(CompareOp::Less),
            "<=" => Some(CompareOp::LessOrEqual),
            "=" | "==" => Some(CompareOp::Equal),
            "!=" | "<>" => Some(CompareOp::NotEqual),
            ">=" => Some(CompareOp::GreaterOrEqual),
            ">" => Some(CompareOp::Greater),
            _ => None,
        }
    }

    fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            CompareOp::Less => lhs < rhs,
            CompareOp::LessOrEqual => lhs <= rhs,
            CompareOp::Equal => lhs == rhs,
            CompareOp::NotEqual => lhs != rhs,
            CompareOp::GreaterOrEqual => lhs >= rhs,
            CompareOp::Greater => lhs > rhs,
        }
    }
}

/// One node of a query's predicate tree.
#[derive(Debug, Clone)]
pub enum Term {
    /// Field text equals the value, ignoring case and surrounding space.
    Equal { field: String, value: String },
    /// Field text matches a case-insensitive regex. `None` never matches.
    Matches { field: String, regex: Option<Regex> },
    /// The field's keyword list holds the keyword.
    Contains { field: String, keyword: String },
    /// The activity has a value for the field, declared or derived.
    Defines(String),
    /// Numeric comparison in canonical units. Pace fields compare paces, so
    /// `Pace < 5:00 /km` selects the faster activities.
    Compare {
        field: String,
        kind: ValueKind,
        op: CompareOp,
        rhs: f64,
    },
    /// The body matches a case-insensitive regex. `None` never matches.
    Grep(Option<Regex>),
    Not(Box<Term>),
    And(Vec<Term>),
    Or(Vec<Term>),
}

fn compile(pattern: &str) -> Option<Regex> {
    match RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(regex) => Some(regex),
        Err(err) => {
            tracing::warn!(pattern, error = %err, "Invalid query regex, term matches nothing");
            None
        }
    }
}

impl Term {
    pub fn equal(field: &str, value: &str) -> Self {
        Term::Equal {
            field: field.to_string(),
            value: value.trim().to_string(),
        }
    }

    pub fn matches(field: &str, pattern: &str) -> Self {
        Term::Matches {
            field: field.to_string(),
            regex: compile(pattern),
        }
    }

    pub fn contains(field: &str, keyword: &str) -> Self {
        Term::Contains {
            field: field.to_string(),
            keyword: keyword.trim().to_string(),
        }
    }

    pub fn defines(field: &str) -> Self {
        Term::Defines(field.to_string())
    }

    /// Parse `rhs` in the field's unit kind, defaulting to `units` when the
    /// text names no unit.
    pub fn compare(
        field: &str,
        op: CompareOp,
        rhs: &str,
        units: UnitSystem,
    ) -> Result<Self, QueryError> {
        let spec =
            fields::lookup(field).ok_or_else(|| QueryError::UnknownField(field.to_string()))?;
        let invalid = || QueryError::InvalidValue {
            field: spec.name.to_string(),
            value: rhs.to_string(),
        };
        if !spec.kind.is_numeric() {
            return Err(invalid());
        }
        let rhs = units.parse(spec.kind, rhs).ok_or_else(invalid)?;
        Ok(Term::Compare {
            field: spec.name.to_string(),
            kind: spec.kind,
            op,
            rhs,
        })
    }

    pub fn grep(pattern: &str) -> Self {
        Term::Grep(compile(pattern))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(term: Term) -> Self {
        Term::Not(Box::new(term))
    }

    pub fn and(terms: Vec<Term>) -> Self {
        Term::And(terms)
    }

    pub fn or(terms: Vec<Term>) -> Self {
        Term::Or(terms)
    }

    pub fn evaluate<R: Deref<Target = Record>>(&self, activity: &Activity<'_, R>) -> bool {
        match self {
            Term::Equal { field, value } => activity
                .field_text(field)
                .is_some_and(|text| text.trim().eq_ignore_ascii_case(value)),
            Term::Matches { field, regex } => match (regex, activity.field_text(field)) {
                (Some(regex), Some(text)) => regex.is_match(&text),
                _ => false,
            },
            Term::Contains { field, keyword } => activity.field_text(field).is_some_and(|text| {
                units::keywords(&text)
                    .iter()
                    .any(|token| token.eq_ignore_ascii_case(keyword))
            }),
            Term::Defines(field) => activity.defines(field),
            Term::Compare {
                field,
                kind,
                op,
                rhs,
            } => {
                let Some(lhs) = activity.field_value(field) else {
                    return false;
                };
                if *kind == ValueKind::Pace {
                    if lhs <= 0.0 || *rhs <= 0.0 {
                        return false;
                    }
                    op.apply(1.0 / lhs, 1.0 / rhs)
                } else {
                    op.apply(lhs, *rhs)
                }
            }
            Term::Grep(regex) => regex
                .as_ref()
                .is_some_and(|regex| regex.is_match(activity.body())),
            Term::Not(term) => !term.evaluate(activity),
            Term::And(terms) => terms.iter().all(|term| term.evaluate(activity)),
            Term::Or(terms) => terms.iter().any(|term| term.evaluate(activity)),
        }
    }
}

/// Dates from `start` (inclusive) to `end` (exclusive); a missing bound is
/// open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateRange {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDateTime) -> bool {
        self.start.map_or(true, |start| date >= start) && self.end.map_or(true, |end| date < end)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Query {
    pub ranges: Vec<DateRange>,
    pub term: Option<Term>,
    pub skip: usize,
    /// `None` returns every match.
    pub max_count: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_range(mut self, range: DateRange) -> Self {
        self.ranges.push(range);
        self
    }

    pub fn with_term(mut self, term: Term) -> Self {
        self.term = Some(term);
        self
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn with_max_count(mut self, max_count: usize) -> Self {
        self.max_count = Some(max_count);
        self
    }

    /// An empty range list admits every date.
    pub fn admits(&self, date: NaiveDateTime) -> bool {
        self.ranges.is_empty() || self.ranges.iter().any(|range| range.contains(date))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_rejects_unknown_field_and_bad_value() {
        assert!(matches!(
            Term::compare("Mood", CompareOp::Less, "3", UnitSystem::Metric),
            Err(QueryError::UnknownField(_))
        ));
        assert!(matches!(
            Term::compare("Distance", CompareOp::Less, "far", UnitSystem::Metric),
            Err(QueryError::InvalidValue { .. })
        ));
        assert!(matches!(
            Term::compare("Keywords", CompareOp::Less, "3", UnitSystem::Metric),
            Err(QueryError::InvalidValue { .. })
        ));
    }

    #[test]
    fn invalid_regex_compiles_to_nothing() {
        assert!(matches!(Term::grep("(unclosed"), Term::Grep(None)));
        assert!(matches!(Term::matches("Weather", "sun"), Term::Matches { regex: Some(_), .. }));
    }

    #[test]
    fn empty_range_list_admits_everything() {
        let date = chrono::NaiveDate::from_ymd_opt(2020, 1, 1)
            .and_then(|d| d.and_hms_opt(8, 0, 0))
            .expect("date");
        assert!(Query::new().admits(date));

        let later = date + chrono::Duration::days(1);
        let query = Query::new().with_range(DateRange::new(Some(later), None));
        assert!(!query.admits(date));
        assert!(query.admits(later));
    }
}
