use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use std::env;
use std::path::Path;
use tracing_subscriber::EnvFilter;

use foundation_ledger::{
    import_movements, ledger_statement, list_categories, load_csv, money, run_report,
    setup_database, LedgerScope, ReportQuery,
};

const DEFAULT_DB: &str = "foundation.db";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str);

    match command {
        Some("init") => run_init(),
        Some("import") => run_import(&args[2..]),
        Some("report") => run_report_cmd(&args[2..]),
        Some("statement") => run_statement(&args[2..]),
        Some("categories") => run_categories(),
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    println!("Foundation Ledger v{}", foundation_ledger::VERSION);
    println!();
    println!("Usage: foundation-ledger <command> [args]");
    println!();
    println!("Commands:");
    println!("  init                               Create the database schema");
    println!("  import <scope> <file.csv>          Import movements (idempotent)");
    println!("  report <scope> [start] [end]       Dashboard report as JSON");
    println!("  statement <scope> [start] [end]    Running-balance ledger statement");
    println!("  categories                         List categories");
    println!();
    println!("Scopes: general | bank | cash");
    println!("Dates:  ISO, e.g. 2024-03-01 (both bounds inclusive)");
    println!();
    println!("Database path comes from LEDGER_DB (default: {DEFAULT_DB})");
}

fn open_db() -> Result<Connection> {
    let path = env::var("LEDGER_DB").unwrap_or_else(|_| DEFAULT_DB.to_string());
    let conn = Connection::open(&path).with_context(|| format!("Failed to open {path}"))?;
    setup_database(&conn)?;
    Ok(conn)
}

fn parse_scope(args: &[String]) -> Result<LedgerScope> {
    let scope = args.first().context("Missing <scope> argument")?;
    LedgerScope::parse(scope).with_context(|| format!("Unknown scope '{scope}'"))
}

fn query_from_args(args: &[String]) -> ReportQuery {
    ReportQuery {
        start_date: args.get(1).cloned(),
        end_date: args.get(2).cloned(),
        ..Default::default()
    }
}

fn run_init() -> Result<()> {
    open_db()?;
    println!("Database initialized (WAL mode)");
    Ok(())
}

fn run_import(args: &[String]) -> Result<()> {
    let scope = parse_scope(args)?;
    let csv_path = args.get(1).context("Missing <file.csv> argument")?;

    let records = load_csv(Path::new(csv_path))?;
    println!("Loaded {} rows from {csv_path}", records.len());

    let conn = open_db()?;
    let summary = import_movements(&conn, scope, &records)?;

    println!("Inserted:   {}", summary.inserted);
    println!("Duplicates: {}", summary.duplicates);
    println!("Rejected:   {}", summary.rejected);

    Ok(())
}

fn run_report_cmd(args: &[String]) -> Result<()> {
    let scope = parse_scope(args)?;
    let conn = open_db()?;

    let report = run_report(&conn, scope, &query_from_args(args))?;

    println!(
        "Period {} to {} ({} scope)",
        report.resolved_start,
        report.resolved_end,
        scope.as_str()
    );
    println!("  Income:  {}", money::clp(report.kpi.income));
    println!("  Expense: {}", money::clp(report.kpi.expense));
    println!("  Net:     {}", money::clp_signed(report.kpi.net));
    println!();
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

fn run_statement(args: &[String]) -> Result<()> {
    let scope = parse_scope(args)?;
    let conn = open_db()?;

    let statement = ledger_statement(&conn, scope, &query_from_args(args))?;

    println!(
        "Statement {} to {} ({} scope)",
        statement.resolved_start,
        statement.resolved_end,
        scope.as_str()
    );
    println!("Opening balance: {}", money::clp_signed(statement.opening_balance));

    let balances = statement.running_balances();
    for (line, balance) in statement.lines.iter().zip(&balances) {
        println!(
            "{}  {:<8}  {:>16}  {:>16}  {}",
            line.movement.date,
            line.movement.kind.as_str(),
            money::clp(line.movement.amount),
            money::clp_signed(*balance),
            line.category_name.as_deref().unwrap_or("-"),
        );
    }
    println!("Closing balance: {}", money::clp_signed(statement.closing_balance()));

    Ok(())
}

fn run_categories() -> Result<()> {
    let conn = open_db()?;
    let categories = list_categories(&conn)?;

    if categories.is_empty() {
        bail!("No categories defined yet");
    }
    for c in categories {
        println!("{:>4}  {:<10}  {}", c.id, c.kind.as_str(), c.name);
    }
    Ok(())
}
