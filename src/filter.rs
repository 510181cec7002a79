// Filter Builder - loose request inputs to a typed movement filter
//
// Callers hand over whatever arrived on the query string: possibly empty,
// possibly malformed. Everything unparseable is treated as absent, never an
// error; the filter degrades to defaults instead of rejecting the request.
// The resolved window is half-open internally ([start, end_exclusive)) and
// reported back to callers as an inclusive end date.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use rusqlite::types::Value;

use crate::store::{date_to_sql, MovementKind};

pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 1000;

// ============================================================================
// REQUEST SHAPE
// ============================================================================

/// Raw, loosely-typed report request as received from a presentation layer.
/// All date and id fields are strings that may be empty or malformed.
#[derive(Debug, Clone, Default)]
pub struct ReportQuery {
    /// Inclusive start date, ISO format.
    pub start_date: Option<String>,
    /// Inclusive end date, ISO format.
    pub end_date: Option<String>,
    /// Category id as an integer string; non-numeric input is ignored.
    pub category_id: Option<String>,
    /// Exact payment method match.
    pub payment_method: Option<String>,
    /// Case-insensitive substring match against description, concept and
    /// document number.
    pub free_text: Option<String>,
    /// Row cap for movement lists; clamped to 1..=1000, default 10.
    pub limit: Option<i64>,
}

// ============================================================================
// DATE WINDOW
// ============================================================================

/// Resolved report window, end-exclusive internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end_exclusive: NaiveDate,
}

impl DateWindow {
    /// The calendar month containing `date`:
    /// `[first of month, first of next month)`.
    pub fn month_of(date: NaiveDate) -> DateWindow {
        let start = NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date);
        let end_exclusive = if date.month() == 12 {
            NaiveDate::from_ymd_opt(date.year() + 1, 1, 1).unwrap_or(date)
        } else {
            NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1).unwrap_or(date)
        };
        DateWindow {
            start,
            end_exclusive,
        }
    }

    /// Trailing 30-day window ending today: `[today - 30d, today + 1d)`.
    pub fn trailing_30_days(today: NaiveDate) -> DateWindow {
        DateWindow {
            start: today - Duration::days(30),
            end_exclusive: today + Duration::days(1),
        }
    }

    /// Inclusive end as shown to callers.
    pub fn end_inclusive(&self) -> NaiveDate {
        self.end_exclusive - Duration::days(1)
    }
}

// ============================================================================
// TYPED FILTER
// ============================================================================

/// Well-typed conjunction of sub-filters plus the resolved window.
#[derive(Debug, Clone, PartialEq)]
pub struct MovementFilter {
    pub window: DateWindow,
    /// Whether the caller explicitly supplied the start bound. Gates both
    /// the empty-window fallback and the opening balance.
    pub explicit_start: bool,
    pub explicit_end: bool,
    pub category_id: Option<i64>,
    pub payment_method: Option<String>,
    pub free_text: Option<String>,
    pub limit: i64,
}

fn parse_date(s: Option<&str>) -> Option<NaiveDate> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
}

fn parse_id(s: Option<&str>) -> Option<i64> {
    let s = s?.trim();
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn non_empty(s: Option<&str>) -> Option<String> {
    let s = s?.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

impl MovementFilter {
    /// Build a typed filter from loose inputs. Each absent or malformed date
    /// bound defaults independently from the current calendar month; an
    /// explicit inclusive end becomes an exclusive bound one day later, so a
    /// movement dated exactly on the end date is included.
    pub fn from_query(query: &ReportQuery, today: NaiveDate) -> MovementFilter {
        let default = DateWindow::month_of(today);

        let start = parse_date(query.start_date.as_deref());
        let end = parse_date(query.end_date.as_deref());

        let window = DateWindow {
            start: start.unwrap_or(default.start),
            end_exclusive: end
                .map(|d| d + Duration::days(1))
                .unwrap_or(default.end_exclusive),
        };

        MovementFilter {
            window,
            explicit_start: start.is_some(),
            explicit_end: end.is_some(),
            category_id: parse_id(query.category_id.as_deref()),
            payment_method: non_empty(query.payment_method.as_deref()),
            free_text: non_empty(query.free_text.as_deref()),
            limit: query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
        }
    }

    pub fn has_explicit_dates(&self) -> bool {
        self.explicit_start || self.explicit_end
    }
}

// ============================================================================
// SQL RENDERING
// ============================================================================

/// A WHERE-clause fragment over a movement table aliased `m`, with its
/// positional parameters.
#[derive(Debug, Clone)]
pub(crate) struct SqlPredicate {
    pub clause: String,
    pub params: Vec<Value>,
}

impl SqlPredicate {
    fn new() -> SqlPredicate {
        SqlPredicate {
            clause: String::new(),
            params: Vec::new(),
        }
    }

    fn push(&mut self, fragment: &str, params: impl IntoIterator<Item = Value>) {
        if !self.clause.is_empty() {
            self.clause.push_str(" AND ");
        }
        self.clause.push_str(fragment);
        self.params.extend(params);
    }

    /// Constrain to one movement kind.
    pub fn and_kind(mut self, kind: MovementKind) -> SqlPredicate {
        self.push("m.kind = ?", [Value::Text(kind.as_str().to_string())]);
        self
    }

    fn finish(mut self) -> SqlPredicate {
        if self.clause.is_empty() {
            self.clause.push_str("1 = 1");
        }
        self
    }
}

impl MovementFilter {
    fn non_date_fragments(&self, pred: &mut SqlPredicate) {
        if let Some(id) = self.category_id {
            pred.push("m.category_id = ?", [Value::Integer(id)]);
        }
        if let Some(method) = &self.payment_method {
            pred.push("m.payment_method = ?", [Value::Text(method.clone())]);
        }
        if let Some(text) = &self.free_text {
            let like = Value::Text(format!("%{}%", text.to_lowercase()));
            pred.push(
                "(LOWER(m.description) LIKE ? OR LOWER(m.concept) LIKE ? \
                 OR LOWER(m.document_number) LIKE ?)",
                [like.clone(), like.clone(), like],
            );
        }
    }

    /// Full predicate: window plus category/method/text sub-filters.
    pub(crate) fn predicate(&self) -> SqlPredicate {
        let mut pred = SqlPredicate::new();
        pred.push(
            "m.date >= ?",
            [Value::Text(date_to_sql(self.window.start))],
        );
        pred.push(
            "m.date < ?",
            [Value::Text(date_to_sql(self.window.end_exclusive))],
        );
        self.non_date_fragments(&mut pred);
        pred.finish()
    }

    /// Date-unbounded predicate: category/method/text sub-filters only.
    /// Used by the fallback probe for the latest movement date.
    pub(crate) fn unbounded_predicate(&self) -> SqlPredicate {
        let mut pred = SqlPredicate::new();
        self.non_date_fragments(&mut pred);
        pred.finish()
    }

    /// Everything strictly before the window start, under the same
    /// non-date sub-filters. Used for the opening balance.
    pub(crate) fn opening_predicate(&self) -> SqlPredicate {
        let mut pred = SqlPredicate::new();
        pred.push("m.date < ?", [Value::Text(date_to_sql(self.window.start))]);
        self.non_date_fragments(&mut pred);
        pred.finish()
    }
}
