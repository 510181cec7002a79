// Report Assembler - compose filter, fallback and facets into one report
//
// Each report is a bounded sequence of read-only queries over one
// connection; all facets share the resolved filter, so they are mutually
// consistent. The statement variant feeds the combined bank/cash ledger
// view: movements ascending with category names, plus the opening-balance
// scalar the consumer accumulates a running balance from.

use chrono::{Local, NaiveDate};
use rusqlite::{params_from_iter, Connection};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use crate::aggregate::{
    self, CategoryTotal, DailyPoint, KpiTotals, MethodTotal,
};
use crate::error::Result;
use crate::fallback::resolve_window;
use crate::filter::{MovementFilter, ReportQuery};
use crate::store::{
    movement_from_row, LedgerScope, Movement, MovementKind, MOVEMENT_COLUMNS,
};

// ============================================================================
// REPORT
// ============================================================================

/// Everything the dashboard needs, computed against one resolved filter.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub resolved_start: NaiveDate,
    /// Inclusive, as shown to the caller.
    pub resolved_end: NaiveDate,
    pub kpi: KpiTotals,
    pub daily_series: Vec<DailyPoint>,
    pub top_categories_income: Vec<CategoryTotal>,
    pub top_categories_expense: Vec<CategoryTotal>,
    pub payment_methods_income: Vec<MethodTotal>,
    pub payment_methods_expense: Vec<MethodTotal>,
    pub opening_balance: Decimal,
    pub recent_movements: Vec<Movement>,
}

/// Run a full report with "today" taken from the local clock.
pub fn run_report(conn: &Connection, scope: LedgerScope, query: &ReportQuery) -> Result<Report> {
    run_report_at(conn, scope, query, Local::now().date_naive())
}

/// Run a full report against an explicit "today" (injected for tests and
/// deterministic replays).
pub fn run_report_at(
    conn: &Connection,
    scope: LedgerScope,
    query: &ReportQuery,
    today: NaiveDate,
) -> Result<Report> {
    let filter = MovementFilter::from_query(query, today);
    let filter = resolve_window(conn, scope, filter, today)?;

    debug!(
        scope = scope.as_str(),
        start = %filter.window.start,
        end = %filter.window.end_inclusive(),
        "running report"
    );

    Ok(Report {
        resolved_start: filter.window.start,
        resolved_end: filter.window.end_inclusive(),
        kpi: aggregate::kpi_totals(conn, scope, &filter)?,
        daily_series: aggregate::daily_series(conn, scope, &filter)?,
        top_categories_income: aggregate::top_categories(
            conn,
            scope,
            &filter,
            MovementKind::Income,
        )?,
        top_categories_expense: aggregate::top_categories(
            conn,
            scope,
            &filter,
            MovementKind::Expense,
        )?,
        payment_methods_income: aggregate::payment_methods(
            conn,
            scope,
            &filter,
            MovementKind::Income,
        )?,
        payment_methods_expense: aggregate::payment_methods(
            conn,
            scope,
            &filter,
            MovementKind::Expense,
        )?,
        opening_balance: aggregate::opening_balance(conn, scope, &filter)?,
        recent_movements: recent_movements(conn, scope, &filter)?,
    })
}

/// Most recent movements under the filter, descending by (date, id),
/// capped at the filter's limit.
pub fn recent_movements(
    conn: &Connection,
    scope: LedgerScope,
    filter: &MovementFilter,
) -> Result<Vec<Movement>> {
    let pred = filter.predicate();
    let mut stmt = conn.prepare(&format!(
        "SELECT {MOVEMENT_COLUMNS} FROM {} m
         WHERE {}
         ORDER BY m.date DESC, m.id DESC
         LIMIT {}",
        scope.table(),
        pred.clause,
        filter.limit
    ))?;

    let movements = stmt
        .query_map(params_from_iter(pred.params), movement_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(movements)
}

// ============================================================================
// PER-KIND LISTING
// ============================================================================

/// One kind's movement list plus its exact filtered total, for the
/// income/expense list views.
#[derive(Debug, Clone, Serialize)]
pub struct KindListing {
    pub movements: Vec<Movement>,
    pub total: Decimal,
}

pub fn list_by_kind(
    conn: &Connection,
    scope: LedgerScope,
    filter: &MovementFilter,
    kind: MovementKind,
) -> Result<KindListing> {
    let pred = filter.predicate().and_kind(kind);
    let mut stmt = conn.prepare(&format!(
        "SELECT {MOVEMENT_COLUMNS} FROM {} m
         WHERE {}
         ORDER BY m.date DESC, m.id DESC
         LIMIT {}",
        scope.table(),
        pred.clause,
        filter.limit
    ))?;

    let movements = stmt
        .query_map(params_from_iter(pred.params), movement_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    // Total covers the whole filtered set, not only the listed page
    let total = aggregate::kind_total(conn, scope, filter, kind)?;

    Ok(KindListing { movements, total })
}

// ============================================================================
// LEDGER STATEMENT (running-balance view)
// ============================================================================

/// A movement annotated with its category's display name (left-joined; a
/// missing category is simply `None`).
#[derive(Debug, Clone, Serialize)]
pub struct StatementLine {
    #[serde(flatten)]
    pub movement: Movement,
    pub category_name: Option<String>,
}

/// Ascending movement list for one scope plus the opening balance.
///
/// The running balance is a presentation-side derived field: start from
/// `opening_balance` and walk the lines in order, adding the amount for
/// income and subtracting it for expense. [`LedgerStatement::running_balances`]
/// implements exactly that walk.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerStatement {
    pub resolved_start: NaiveDate,
    pub resolved_end: NaiveDate,
    pub opening_balance: Decimal,
    pub lines: Vec<StatementLine>,
}

impl LedgerStatement {
    /// Balance after each line, in statement order.
    pub fn running_balances(&self) -> Vec<Decimal> {
        let mut balance = self.opening_balance;
        self.lines
            .iter()
            .map(|line| {
                match line.movement.kind {
                    MovementKind::Income => balance += line.movement.amount,
                    MovementKind::Expense => balance -= line.movement.amount,
                }
                balance
            })
            .collect()
    }

    /// Balance after the last line (equals the opening balance when empty).
    pub fn closing_balance(&self) -> Decimal {
        self.running_balances()
            .last()
            .copied()
            .unwrap_or(self.opening_balance)
    }
}

pub fn ledger_statement(
    conn: &Connection,
    scope: LedgerScope,
    query: &ReportQuery,
) -> Result<LedgerStatement> {
    ledger_statement_at(conn, scope, query, Local::now().date_naive())
}

pub fn ledger_statement_at(
    conn: &Connection,
    scope: LedgerScope,
    query: &ReportQuery,
    today: NaiveDate,
) -> Result<LedgerStatement> {
    let filter = MovementFilter::from_query(query, today);
    let filter = resolve_window(conn, scope, filter, today)?;

    let pred = filter.predicate();
    let mut stmt = conn.prepare(&format!(
        "SELECT {MOVEMENT_COLUMNS}, c.name FROM {} m
         LEFT JOIN categories c ON c.id = m.category_id
         WHERE {}
         ORDER BY m.date ASC, m.id ASC",
        scope.table(),
        pred.clause
    ))?;

    let lines = stmt
        .query_map(params_from_iter(pred.params), |row| {
            Ok(StatementLine {
                movement: movement_from_row(row)?,
                category_name: row.get(9)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(LedgerStatement {
        resolved_start: filter.window.start,
        resolved_end: filter.window.end_inclusive(),
        opening_balance: aggregate::opening_balance(conn, scope, &filter)?,
        lines,
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{
        create_category, insert_movement, setup_database, CategoryKind, NewMovement,
    };
    use rust_decimal_macros::dec;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn seed(
        conn: &Connection,
        scope: LedgerScope,
        date_str: &str,
        kind: MovementKind,
        amount: Decimal,
        category_id: Option<i64>,
    ) -> i64 {
        insert_movement(
            conn,
            scope,
            &NewMovement {
                date: date(date_str),
                kind,
                amount,
                payment_method: Some("transfer".to_string()),
                concept: "Seed".to_string(),
                document_number: String::new(),
                description: String::new(),
                category_id,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_default_window_reported_inclusive() {
        let conn = test_conn();
        seed(&conn, LedgerScope::General, "2024-03-10", MovementKind::Income, dec!(10), None);

        let report = run_report_at(
            &conn,
            LedgerScope::General,
            &ReportQuery::default(),
            date("2024-03-15"),
        )
        .unwrap();

        assert_eq!(report.resolved_start, date("2024-03-01"));
        assert_eq!(report.resolved_end, date("2024-03-31"));
    }

    #[test]
    fn test_end_to_end_march_scenario() {
        let conn = test_conn();
        let cat_a = create_category(&conn, "A", CategoryKind::Both).unwrap();
        seed(&conn, LedgerScope::General, "2024-03-01", MovementKind::Income, dec!(50.00), Some(cat_a));
        seed(&conn, LedgerScope::General, "2024-03-02", MovementKind::Expense, dec!(20.00), Some(cat_a));
        seed(&conn, LedgerScope::General, "2024-02-15", MovementKind::Income, dec!(30.00), None);

        let query = ReportQuery {
            start_date: Some("2024-03-01".to_string()),
            end_date: Some("2024-03-31".to_string()),
            ..Default::default()
        };
        let report =
            run_report_at(&conn, LedgerScope::General, &query, date("2024-06-15")).unwrap();

        assert_eq!(report.kpi.income, dec!(50.00));
        assert_eq!(report.kpi.expense, dec!(20.00));
        assert_eq!(report.kpi.net, dec!(30.00));

        assert_eq!(report.daily_series.len(), 2);
        assert_eq!(report.daily_series[0].date, date("2024-03-01"));
        assert_eq!(report.daily_series[0].income, dec!(50.00));
        assert_eq!(report.daily_series[0].expense, dec!(0.00));
        assert_eq!(report.daily_series[1].date, date("2024-03-02"));
        assert_eq!(report.daily_series[1].expense, dec!(20.00));

        assert_eq!(report.top_categories_income.len(), 1);
        assert_eq!(report.top_categories_income[0].category, "A");
        assert_eq!(report.top_categories_income[0].total, dec!(50.00));

        // The 02-15 income predates the window and is not filtered out of
        // the prior balance
        assert_eq!(report.opening_balance, dec!(30.00));
    }

    #[test]
    fn test_explicit_empty_range_reports_zeros() {
        let conn = test_conn();
        seed(&conn, LedgerScope::General, "2023-07-03", MovementKind::Income, dec!(500), None);

        let query = ReportQuery {
            start_date: Some("2024-01-01".to_string()),
            end_date: Some("2024-01-31".to_string()),
            ..Default::default()
        };
        let report =
            run_report_at(&conn, LedgerScope::General, &query, date("2024-03-15")).unwrap();

        assert_eq!(report.resolved_start, date("2024-01-01"));
        assert_eq!(report.resolved_end, date("2024-01-31"));
        assert_eq!(report.kpi.income, Decimal::ZERO);
        assert_eq!(report.kpi.net, Decimal::ZERO);
        assert!(report.daily_series.is_empty());
        assert!(report.recent_movements.is_empty());
    }

    #[test]
    fn test_fallback_window_surfaces_in_report() {
        let conn = test_conn();
        seed(&conn, LedgerScope::General, "2023-07-03", MovementKind::Income, dec!(500), None);

        let report = run_report_at(
            &conn,
            LedgerScope::General,
            &ReportQuery::default(),
            date("2024-03-15"),
        )
        .unwrap();

        assert_eq!(report.resolved_start, date("2023-07-01"));
        assert_eq!(report.resolved_end, date("2023-07-31"));
        assert_eq!(report.kpi.income, dec!(500.00));
        // Fallback-resolved start carries no prior balance
        assert_eq!(report.opening_balance, Decimal::ZERO);
    }

    #[test]
    fn test_empty_store_report_window() {
        let conn = test_conn();
        let report = run_report_at(
            &conn,
            LedgerScope::General,
            &ReportQuery::default(),
            date("2024-03-15"),
        )
        .unwrap();

        assert_eq!(report.resolved_start, date("2024-02-14"));
        assert_eq!(report.resolved_end, date("2024-03-15"));
        assert_eq!(report.kpi, KpiTotals::zero());
    }

    #[test]
    fn test_recent_movements_order_and_limit() {
        let conn = test_conn();
        let first = seed(&conn, LedgerScope::General, "2024-03-10", MovementKind::Income, dec!(1), None);
        let second = seed(&conn, LedgerScope::General, "2024-03-10", MovementKind::Income, dec!(2), None);
        let newest = seed(&conn, LedgerScope::General, "2024-03-12", MovementKind::Income, dec!(3), None);

        let query = ReportQuery {
            limit: Some(2),
            ..Default::default()
        };
        let report =
            run_report_at(&conn, LedgerScope::General, &query, date("2024-03-15")).unwrap();

        // Descending by (date, id): the newest date first, then the higher
        // id within the tied date
        assert_eq!(report.recent_movements.len(), 2);
        assert_eq!(report.recent_movements[0].id, newest);
        assert_eq!(report.recent_movements[1].id, second);
        assert!(report.recent_movements.iter().all(|m| m.id != first));
    }

    #[test]
    fn test_list_by_kind_totals() {
        let conn = test_conn();
        seed(&conn, LedgerScope::Bank, "2024-03-01", MovementKind::Income, dec!(50), None);
        seed(&conn, LedgerScope::Bank, "2024-03-02", MovementKind::Income, dec!(30), None);
        seed(&conn, LedgerScope::Bank, "2024-03-03", MovementKind::Expense, dec!(20), None);

        let filter = MovementFilter::from_query(&ReportQuery::default(), date("2024-03-15"));
        let listing =
            list_by_kind(&conn, LedgerScope::Bank, &filter, MovementKind::Income).unwrap();

        assert_eq!(listing.movements.len(), 2);
        assert_eq!(listing.total, dec!(80.00));
        assert!(listing
            .movements
            .iter()
            .all(|m| m.kind == MovementKind::Income));
        // Descending by date
        assert_eq!(listing.movements[0].date, date("2024-03-02"));
    }

    #[test]
    fn test_statement_running_balances() {
        let conn = test_conn();
        let cat = create_category(&conn, "Donations", CategoryKind::Income).unwrap();
        seed(&conn, LedgerScope::Bank, "2024-02-20", MovementKind::Income, dec!(100), None);
        seed(&conn, LedgerScope::Bank, "2024-02-21", MovementKind::Expense, dec!(40), None);
        seed(&conn, LedgerScope::Bank, "2024-03-01", MovementKind::Income, dec!(50), Some(cat));
        seed(&conn, LedgerScope::Bank, "2024-03-02", MovementKind::Expense, dec!(30), None);

        let query = ReportQuery {
            start_date: Some("2024-03-01".to_string()),
            end_date: Some("2024-03-31".to_string()),
            ..Default::default()
        };
        let statement =
            ledger_statement_at(&conn, LedgerScope::Bank, &query, date("2024-06-15")).unwrap();

        assert_eq!(statement.opening_balance, dec!(60.00));
        assert_eq!(statement.lines.len(), 2);
        // Ascending chronological order with joined category names
        assert_eq!(statement.lines[0].movement.date, date("2024-03-01"));
        assert_eq!(statement.lines[0].category_name.as_deref(), Some("Donations"));
        assert_eq!(statement.lines[1].category_name, None);

        assert_eq!(statement.running_balances(), vec![dec!(110.00), dec!(80.00)]);
        assert_eq!(statement.closing_balance(), dec!(80.00));
    }

    #[test]
    fn test_statement_empty_window() {
        let conn = test_conn();
        let query = ReportQuery {
            start_date: Some("2024-01-01".to_string()),
            end_date: Some("2024-01-31".to_string()),
            ..Default::default()
        };
        let statement =
            ledger_statement_at(&conn, LedgerScope::Cash, &query, date("2024-03-15")).unwrap();

        assert!(statement.lines.is_empty());
        assert_eq!(statement.opening_balance, Decimal::ZERO);
        assert_eq!(statement.closing_balance(), Decimal::ZERO);
    }

    #[test]
    fn test_report_serializes() {
        let conn = test_conn();
        seed(&conn, LedgerScope::General, "2024-03-10", MovementKind::Income, dec!(10), None);

        let report = run_report_at(
            &conn,
            LedgerScope::General,
            &ReportQuery::default(),
            date("2024-03-15"),
        )
        .unwrap();

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["resolved_start"], "2024-03-01");
        assert_eq!(json["kpi"]["income"], "10.00");
    }
}
