// Aggregation - reporting facets over the resolved filtered set
//
// Every facet runs against the same predicate, so the results of one report
// are mutually consistent even when they come from separate queries. Sums
// happen in SQL over integer cents (exact); Decimal conversion is the last
// step out of each function. Empty result sets yield zeros and empty
// vectors, never errors.

use chrono::NaiveDate;
use rusqlite::{params_from_iter, Connection};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::filter::MovementFilter;
use crate::money;
use crate::store::{date_from_sql, LedgerScope, MovementKind};

/// Label for movements with no category.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Label for movements with no (or blank) payment method.
pub const OTHER_METHOD: &str = "other";

/// Category breakdowns are truncated to this many rows; the KPI totals are
/// never truncated.
pub const TOP_CATEGORY_LIMIT: i64 = 8;

// ============================================================================
// FACET TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiTotals {
    pub income: Decimal,
    pub expense: Decimal,
    pub net: Decimal,
}

impl KpiTotals {
    pub fn zero() -> KpiTotals {
        KpiTotals {
            income: Decimal::ZERO,
            expense: Decimal::ZERO,
            net: Decimal::ZERO,
        }
    }
}

/// One day of the sparse daily series. Days without movements are not
/// synthesized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPoint {
    pub date: NaiveDate,
    pub income: Decimal,
    pub expense: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTotal {
    pub category: String,
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodTotal {
    pub method: String,
    pub total: Decimal,
}

// ============================================================================
// FACET QUERIES
// ============================================================================

/// Income, expense and net totals for the filtered window.
pub fn kpi_totals(
    conn: &Connection,
    scope: LedgerScope,
    filter: &MovementFilter,
) -> Result<KpiTotals> {
    let pred = filter.predicate();
    let (income_cents, expense_cents): (i64, i64) = conn.query_row(
        &format!(
            "SELECT
                COALESCE(SUM(CASE WHEN m.kind = 'income' THEN m.amount_cents ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN m.kind = 'expense' THEN m.amount_cents ELSE 0 END), 0)
             FROM {} m WHERE {}",
            scope.table(),
            pred.clause
        ),
        params_from_iter(pred.params),
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    Ok(KpiTotals {
        income: money::from_cents(income_cents),
        expense: money::from_cents(expense_cents),
        net: money::from_cents(income_cents - expense_cents),
    })
}

/// Per-day income/expense sums, sparse, ascending by date.
pub fn daily_series(
    conn: &Connection,
    scope: LedgerScope,
    filter: &MovementFilter,
) -> Result<Vec<DailyPoint>> {
    let pred = filter.predicate();
    let mut stmt = conn.prepare(&format!(
        "SELECT
            m.date,
            COALESCE(SUM(CASE WHEN m.kind = 'income' THEN m.amount_cents ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN m.kind = 'expense' THEN m.amount_cents ELSE 0 END), 0)
         FROM {} m WHERE {}
         GROUP BY m.date
         ORDER BY m.date ASC",
        scope.table(),
        pred.clause
    ))?;

    let series = stmt
        .query_map(params_from_iter(pred.params), |row| {
            let date_str: String = row.get(0)?;
            let income_cents: i64 = row.get(1)?;
            let expense_cents: i64 = row.get(2)?;
            Ok(DailyPoint {
                date: date_from_sql(0, &date_str)?,
                income: money::from_cents(income_cents),
                expense: money::from_cents(expense_cents),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(series)
}

/// Top categories by summed amount for one movement kind, descending,
/// truncated to [`TOP_CATEGORY_LIMIT`]. Movements with no category group
/// under [`UNCATEGORIZED`]; ties break by category name ascending.
pub fn top_categories(
    conn: &Connection,
    scope: LedgerScope,
    filter: &MovementFilter,
    kind: MovementKind,
) -> Result<Vec<CategoryTotal>> {
    let pred = filter.predicate().and_kind(kind);
    let mut stmt = conn.prepare(&format!(
        "SELECT c.name, SUM(m.amount_cents) AS total
         FROM {} m
         LEFT JOIN categories c ON c.id = m.category_id
         WHERE {}
         GROUP BY c.name
         ORDER BY total DESC, c.name ASC
         LIMIT {TOP_CATEGORY_LIMIT}",
        scope.table(),
        pred.clause
    ))?;

    let totals = stmt
        .query_map(params_from_iter(pred.params), |row| {
            let name: Option<String> = row.get(0)?;
            let cents: i64 = row.get(1)?;
            Ok(CategoryTotal {
                category: name.unwrap_or_else(|| UNCATEGORIZED.to_string()),
                total: money::from_cents(cents),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(totals)
}

/// Payment-method breakdown for one movement kind, descending by sum.
/// NULL and blank methods normalize to [`OTHER_METHOD`] inside the grouping
/// expression, so the sentinel is always a single bucket.
pub fn payment_methods(
    conn: &Connection,
    scope: LedgerScope,
    filter: &MovementFilter,
    kind: MovementKind,
) -> Result<Vec<MethodTotal>> {
    let pred = filter.predicate().and_kind(kind);
    let mut stmt = conn.prepare(&format!(
        "SELECT
            COALESCE(NULLIF(TRIM(m.payment_method), ''), '{OTHER_METHOD}') AS method,
            SUM(m.amount_cents) AS total
         FROM {} m WHERE {}
         GROUP BY method
         ORDER BY total DESC, method ASC",
        scope.table(),
        pred.clause
    ))?;

    let totals = stmt
        .query_map(params_from_iter(pred.params), |row| {
            let cents: i64 = row.get(1)?;
            Ok(MethodTotal {
                method: row.get(0)?,
                total: money::from_cents(cents),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(totals)
}

/// Net sum (income minus expense) of all movements strictly before the
/// window start under the same non-date filters. Zero unless the caller
/// supplied an explicit start date: an unbounded-start report has no
/// meaningful prior balance.
pub fn opening_balance(
    conn: &Connection,
    scope: LedgerScope,
    filter: &MovementFilter,
) -> Result<Decimal> {
    if !filter.explicit_start {
        return Ok(Decimal::ZERO);
    }

    let pred = filter.opening_predicate();
    let cents: i64 = conn.query_row(
        &format!(
            "SELECT COALESCE(SUM(CASE WHEN m.kind = 'income'
                                      THEN m.amount_cents ELSE -m.amount_cents END), 0)
             FROM {} m WHERE {}",
            scope.table(),
            pred.clause
        ),
        params_from_iter(pred.params),
        |row| row.get(0),
    )?;

    Ok(money::from_cents(cents))
}

/// Exact sum for one movement kind under the filter. Used by the per-kind
/// list views so the displayed total always matches the listed rows' filter.
pub fn kind_total(
    conn: &Connection,
    scope: LedgerScope,
    filter: &MovementFilter,
    kind: MovementKind,
) -> Result<Decimal> {
    let pred = filter.predicate().and_kind(kind);
    let cents: i64 = conn.query_row(
        &format!(
            "SELECT COALESCE(SUM(m.amount_cents), 0) FROM {} m WHERE {}",
            scope.table(),
            pred.clause
        ),
        params_from_iter(pred.params),
        |row| row.get(0),
    )?;

    Ok(money::from_cents(cents))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::ReportQuery;
    use crate::store::{create_category, insert_movement, setup_database, CategoryKind, NewMovement};
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
        date_str: &str,
        kind: MovementKind,
        amount: Decimal,
        category_id: Option<i64>,
        method: Option<&str>,
    ) {
        insert_movement(
            conn,
            LedgerScope::General,
            &NewMovement {
                date: date(date_str),
                kind,
                amount,
                payment_method: method.map(str::to_string),
                concept: "Seed".to_string(),
                document_number: String::new(),
                description: String::new(),
                category_id,
            },
        )
        .unwrap();
    }

    fn march_filter() -> MovementFilter {
        let query = ReportQuery {
            start_date: Some("2024-03-01".to_string()),
            end_date: Some("2024-03-31".to_string()),
            ..Default::default()
        };
        MovementFilter::from_query(&query, date("2024-06-15"))
    }

    #[test]
    fn test_kpi_additivity_no_drift() {
        let conn = test_conn();
        // 0.10 three times must be exactly 0.30
        seed(&conn, "2024-03-01", MovementKind::Income, dec!(0.10), None, None);
        seed(&conn, "2024-03-02", MovementKind::Income, dec!(0.10), None, None);
        seed(&conn, "2024-03-03", MovementKind::Income, dec!(0.10), None, None);
        seed(&conn, "2024-03-04", MovementKind::Expense, dec!(0.05), None, None);

        let kpi = kpi_totals(&conn, LedgerScope::General, &march_filter()).unwrap();
        assert_eq!(kpi.income, dec!(0.30));
        assert_eq!(kpi.expense, dec!(0.05));
        assert_eq!(kpi.net, dec!(0.25));
        assert_eq!(kpi.net, kpi.income - kpi.expense);
    }

    #[test]
    fn test_kpi_empty_set_is_zero() {
        let conn = test_conn();
        let kpi = kpi_totals(&conn, LedgerScope::General, &march_filter()).unwrap();
        assert_eq!(kpi, KpiTotals::zero());
    }

    #[test]
    fn test_daily_series_sparse_and_ascending() {
        let conn = test_conn();
        seed(&conn, "2024-03-10", MovementKind::Expense, dec!(20), None, None);
        seed(&conn, "2024-03-01", MovementKind::Income, dec!(50), None, None);
        seed(&conn, "2024-03-01", MovementKind::Income, dec!(25), None, None);

        let series = daily_series(&conn, LedgerScope::General, &march_filter()).unwrap();
        assert_eq!(
            series,
            vec![
                DailyPoint {
                    date: date("2024-03-01"),
                    income: dec!(75.00),
                    expense: dec!(0.00),
                },
                DailyPoint {
                    date: date("2024-03-10"),
                    income: dec!(0.00),
                    expense: dec!(20.00),
                },
            ]
        );
    }

    #[test]
    fn test_uncategorized_sentinel() {
        let conn = test_conn();
        let cat = create_category(&conn, "Donations", CategoryKind::Income).unwrap();
        seed(&conn, "2024-03-01", MovementKind::Income, dec!(100), Some(cat), None);
        seed(&conn, "2024-03-02", MovementKind::Income, dec!(40), None, None);

        let cats =
            top_categories(&conn, LedgerScope::General, &march_filter(), MovementKind::Income)
                .unwrap();
        assert_eq!(cats.len(), 2);
        assert_eq!(cats[0].category, "Donations");
        assert_eq!(cats[0].total, dec!(100.00));
        assert_eq!(cats[1].category, UNCATEGORIZED);
        assert_eq!(cats[1].total, dec!(40.00));
    }

    #[test]
    fn test_top_categories_truncate_but_kpi_keeps_all() {
        let conn = test_conn();
        // 9 categories with distinct totals: only 8 shown, KPI keeps the rest
        let mut full_total = Decimal::ZERO;
        for i in 1..=9 {
            let cat = create_category(
                &conn,
                &format!("Category {i:02}"),
                CategoryKind::Income,
            )
            .unwrap();
            let amount = Decimal::from(i * 10);
            seed(&conn, "2024-03-05", MovementKind::Income, amount, Some(cat), None);
            full_total += amount;
        }

        let filter = march_filter();
        let cats =
            top_categories(&conn, LedgerScope::General, &filter, MovementKind::Income).unwrap();
        assert_eq!(cats.len(), 8);
        // Descending by total: 90 first, 20 last; 10 truncated away
        assert_eq!(cats[0].total, dec!(90.00));
        assert_eq!(cats[7].total, dec!(20.00));

        let kpi = kpi_totals(&conn, LedgerScope::General, &filter).unwrap();
        let shown: Decimal = cats.iter().map(|c| c.total).sum();
        assert_eq!(kpi.income, full_total);
        assert_eq!(kpi.income, shown + dec!(10.00));
    }

    #[test]
    fn test_top_categories_ties_break_by_name() {
        let conn = test_conn();
        let b = create_category(&conn, "Beta", CategoryKind::Both).unwrap();
        let a = create_category(&conn, "Alpha", CategoryKind::Both).unwrap();
        seed(&conn, "2024-03-01", MovementKind::Income, dec!(50), Some(b), None);
        seed(&conn, "2024-03-02", MovementKind::Income, dec!(50), Some(a), None);

        let cats =
            top_categories(&conn, LedgerScope::General, &march_filter(), MovementKind::Income)
                .unwrap();
        assert_eq!(cats[0].category, "Alpha");
        assert_eq!(cats[1].category, "Beta");
    }

    #[test]
    fn test_payment_methods_sentinel_is_single_bucket() {
        let conn = test_conn();
        seed(&conn, "2024-03-01", MovementKind::Expense, dec!(10), None, None);
        seed(&conn, "2024-03-02", MovementKind::Expense, dec!(15), None, Some("  "));
        seed(&conn, "2024-03-03", MovementKind::Expense, dec!(100), None, Some("debit"));

        let methods =
            payment_methods(&conn, LedgerScope::General, &march_filter(), MovementKind::Expense)
                .unwrap();
        assert_eq!(methods.len(), 2);
        assert_eq!(methods[0].method, "debit");
        assert_eq!(methods[0].total, dec!(100.00));
        assert_eq!(methods[1].method, OTHER_METHOD);
        assert_eq!(methods[1].total, dec!(25.00));
    }

    #[test]
    fn test_opening_balance_sign_convention() {
        let conn = test_conn();
        seed(&conn, "2024-02-10", MovementKind::Income, dec!(100), None, None);
        seed(&conn, "2024-02-11", MovementKind::Expense, dec!(40), None, None);
        seed(&conn, "2024-03-05", MovementKind::Income, dec!(999), None, None);

        let balance = opening_balance(&conn, LedgerScope::General, &march_filter()).unwrap();
        assert_eq!(balance, dec!(60.00));
    }

    #[test]
    fn test_opening_balance_zero_without_explicit_start() {
        let conn = test_conn();
        seed(&conn, "2024-02-10", MovementKind::Income, dec!(100), None, None);

        let filter = MovementFilter::from_query(&ReportQuery::default(), date("2024-03-15"));
        let balance = opening_balance(&conn, LedgerScope::General, &filter).unwrap();
        assert_eq!(balance, Decimal::ZERO);
    }

    #[test]
    fn test_opening_balance_keeps_non_date_filters() {
        let conn = test_conn();
        seed(&conn, "2024-02-10", MovementKind::Income, dec!(100), None, Some("debit"));
        seed(&conn, "2024-02-11", MovementKind::Income, dec!(500), None, Some("cash"));

        let query = ReportQuery {
            start_date: Some("2024-03-01".to_string()),
            payment_method: Some("debit".to_string()),
            ..Default::default()
        };
        let filter = MovementFilter::from_query(&query, date("2024-06-15"));
        let balance = opening_balance(&conn, LedgerScope::General, &filter).unwrap();
        assert_eq!(balance, dec!(100.00));
    }

    #[test]
    fn test_inclusive_end_date() {
        let conn = test_conn();
        seed(&conn, "2024-03-31", MovementKind::Income, dec!(77), None, None);

        let kpi = kpi_totals(&conn, LedgerScope::General, &march_filter()).unwrap();
        assert_eq!(kpi.income, dec!(77.00));
    }

    #[test]
    fn test_kind_total_matches_kpi() {
        let conn = test_conn();
        seed(&conn, "2024-03-01", MovementKind::Income, dec!(50), None, None);
        seed(&conn, "2024-03-02", MovementKind::Income, dec!(30), None, None);
        seed(&conn, "2024-03-03", MovementKind::Expense, dec!(20), None, None);

        let filter = march_filter();
        let kpi = kpi_totals(&conn, LedgerScope::General, &filter).unwrap();
        let income =
            kind_total(&conn, LedgerScope::General, &filter, MovementKind::Income).unwrap();
        let expense =
            kind_total(&conn, LedgerScope::General, &filter, MovementKind::Expense).unwrap();
        assert_eq!(income, kpi.income);
        assert_eq!(expense, kpi.expense);
    }
}
