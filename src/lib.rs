// Foundation Ledger - Core Library
// Reporting engine over the foundation's general, bank and petty-cash
// ledgers: typed filters, window fallback, daily/category/method
// aggregation, opening balances and running-balance statements.

pub mod aggregate;
pub mod error;
pub mod fallback;
pub mod filter;
pub mod money;
pub mod report;
pub mod store;

// Re-export commonly used types
pub use aggregate::{
    CategoryTotal, DailyPoint, KpiTotals, MethodTotal, OTHER_METHOD, TOP_CATEGORY_LIMIT,
    UNCATEGORIZED,
};
pub use error::{LedgerError, Result};
pub use fallback::resolve_window;
pub use filter::{DateWindow, MovementFilter, ReportQuery, DEFAULT_LIMIT, MAX_LIMIT};
pub use report::{
    ledger_statement, ledger_statement_at, list_by_kind, recent_movements, run_report,
    run_report_at, KindListing, LedgerStatement, Report, StatementLine,
};
pub use store::{
    categories_for_kind, count_all_movements, create_category, delete_category, delete_movement,
    find_category_by_name, get_movement, import_movements, insert_movement, list_categories,
    load_csv, setup_database, update_category, update_movement, Category, CategoryKind,
    ImportSummary, LedgerScope, Movement, MovementKind, MovementRecord, NewMovement,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
