// Fallback Resolver - never present an empty default dashboard
//
// When the caller supplied no date bounds and the current month has no
// matching movements, the window is replaced by the calendar month of the
// most recent matching movement; with an empty store it becomes a trailing
// 30-day window ending today. Explicit date bounds disable the fallback
// entirely: an explicitly empty range reports zeros as-is.
//
// The "no data" probe keeps the category/method/text sub-filters, so a
// filtered dashboard falls back to the latest month with data *for that
// filter*, not merely the latest month overall.

use chrono::NaiveDate;
use rusqlite::{params_from_iter, Connection};
use tracing::debug;

use crate::error::Result;
use crate::filter::{DateWindow, MovementFilter};
use crate::store::{date_from_sql, LedgerScope};

/// Count movements matching the filter inside its resolved window.
pub(crate) fn count_in_window(
    conn: &Connection,
    scope: LedgerScope,
    filter: &MovementFilter,
) -> Result<i64> {
    let pred = filter.predicate();
    let count: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM {} m WHERE {}",
            scope.table(),
            pred.clause
        ),
        params_from_iter(pred.params),
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Most recent movement date under the non-date sub-filters, across the
/// whole dataset.
pub(crate) fn latest_movement_date(
    conn: &Connection,
    scope: LedgerScope,
    filter: &MovementFilter,
) -> Result<Option<NaiveDate>> {
    let pred = filter.unbounded_predicate();
    let latest: Option<String> = conn.query_row(
        &format!(
            "SELECT MAX(m.date) FROM {} m WHERE {}",
            scope.table(),
            pred.clause
        ),
        params_from_iter(pred.params),
        |row| row.get(0),
    )?;

    match latest {
        Some(s) => Ok(Some(date_from_sql(0, &s)?)),
        None => Ok(None),
    }
}

/// Apply the two-tier window fallback, returning the filter actually used.
pub fn resolve_window(
    conn: &Connection,
    scope: LedgerScope,
    mut filter: MovementFilter,
    today: NaiveDate,
) -> Result<MovementFilter> {
    if filter.has_explicit_dates() {
        return Ok(filter);
    }

    if count_in_window(conn, scope, &filter)? > 0 {
        return Ok(filter);
    }

    match latest_movement_date(conn, scope, &filter)? {
        Some(last) => {
            filter.window = DateWindow::month_of(last);
            debug!(
                scope = scope.as_str(),
                start = %filter.window.start,
                "default window empty, falling back to latest active month"
            );
        }
        None => {
            filter.window = DateWindow::trailing_30_days(today);
            debug!(
                scope = scope.as_str(),
                start = %filter.window.start,
                "store empty for filter, falling back to trailing 30 days"
            );
        }
    }

    Ok(filter)
}
