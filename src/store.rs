// Movement Store - SQLite persistence for ledger movements and categories
//
// The store owns all writes; the reporting engine only reads. Three movement
// tables share an identical shape and are selected by `LedgerScope`, so every
// query path is written once and parameterized by scope instead of being
// duplicated per sub-ledger. `setup_database` is the single schema registry:
// it runs once at startup and every table is declared in exactly one place.

use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{info, warn};

use crate::error::{LedgerError, Result};
use crate::money;

// ============================================================================
// SCOPES AND KINDS
// ============================================================================

/// Which sub-ledger a movement belongs to. Parallel tables, identical
/// reporting semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerScope {
    General,
    Bank,
    Cash,
}

impl LedgerScope {
    pub const ALL: [LedgerScope; 3] = [LedgerScope::General, LedgerScope::Bank, LedgerScope::Cash];

    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerScope::General => "general",
            LedgerScope::Bank => "bank",
            LedgerScope::Cash => "cash",
        }
    }

    /// Movement table backing this scope.
    pub(crate) fn table(&self) -> &'static str {
        match self {
            LedgerScope::General => "general_movements",
            LedgerScope::Bank => "bank_movements",
            LedgerScope::Cash => "cash_movements",
        }
    }

    pub fn parse(s: &str) -> Option<LedgerScope> {
        match s.trim().to_ascii_lowercase().as_str() {
            "general" => Some(LedgerScope::General),
            "bank" => Some(LedgerScope::Bank),
            "cash" => Some(LedgerScope::Cash),
            _ => None,
        }
    }
}

/// Direction of a movement. Never any other value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    Income,
    Expense,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Income => "income",
            MovementKind::Expense => "expense",
        }
    }

    pub fn parse(s: &str) -> Option<MovementKind> {
        match s.trim().to_ascii_lowercase().as_str() {
            "income" => Some(MovementKind::Income),
            "expense" => Some(MovementKind::Expense),
            _ => None,
        }
    }
}

/// Which movement kinds a category may be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryKind {
    Income,
    Expense,
    Both,
}

impl CategoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryKind::Income => "income",
            CategoryKind::Expense => "expense",
            CategoryKind::Both => "both",
        }
    }

    pub fn parse(s: &str) -> Option<CategoryKind> {
        match s.trim().to_ascii_lowercase().as_str() {
            "income" => Some(CategoryKind::Income),
            "expense" => Some(CategoryKind::Expense),
            "both" => Some(CategoryKind::Both),
            _ => None,
        }
    }

    /// A category usable for a movement of kind K must admit K or be `Both`.
    pub fn admits(&self, kind: MovementKind) -> bool {
        match self {
            CategoryKind::Both => true,
            CategoryKind::Income => kind == MovementKind::Income,
            CategoryKind::Expense => kind == MovementKind::Expense,
        }
    }
}

// ============================================================================
// ENTITIES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub kind: CategoryKind,
}

/// A single dated, typed, monetary record. Identity is the store's rowid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    pub id: i64,
    pub date: NaiveDate,
    pub kind: MovementKind,
    /// Non-negative, two-decimal currency value.
    pub amount: Decimal,
    pub payment_method: Option<String>,
    pub concept: String,
    pub document_number: String,
    pub description: String,
    pub category_id: Option<i64>,
}

/// Fields for creating or fully replacing a movement (all fields mutable
/// except identity).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMovement {
    pub date: NaiveDate,
    pub kind: MovementKind,
    pub amount: Decimal,
    pub payment_method: Option<String>,
    pub concept: String,
    pub document_number: String,
    pub description: String,
    pub category_id: Option<i64>,
}

pub(crate) const MOVEMENT_COLUMNS: &str =
    "m.id, m.date, m.kind, m.amount_cents, m.payment_method, m.concept, \
     m.document_number, m.description, m.category_id";

pub(crate) fn date_to_sql(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub(crate) fn date_from_sql(idx: usize, s: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Map a row selected with [`MOVEMENT_COLUMNS`] to a `Movement`.
pub(crate) fn movement_from_row(row: &Row<'_>) -> rusqlite::Result<Movement> {
    let date_str: String = row.get(1)?;
    let kind_str: String = row.get(2)?;
    let kind = MovementKind::parse(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            Type::Text,
            format!("unknown movement kind '{kind_str}'").into(),
        )
    })?;
    let cents: i64 = row.get(3)?;

    Ok(Movement {
        id: row.get(0)?,
        date: date_from_sql(1, &date_str)?,
        kind,
        amount: money::from_cents(cents),
        payment_method: row.get(4)?,
        concept: row.get(5)?,
        document_number: row.get(6)?,
        description: row.get(7)?,
        category_id: row.get(8)?,
    })
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE NOT NULL,
            applicable_kind TEXT NOT NULL DEFAULT 'both'
                CHECK (applicable_kind IN ('income', 'expense', 'both')),
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    for scope in LedgerScope::ALL {
        let table = scope.table();
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    date TEXT NOT NULL,
                    kind TEXT NOT NULL CHECK (kind IN ('income', 'expense')),
                    amount_cents INTEGER NOT NULL CHECK (amount_cents >= 0),
                    payment_method TEXT,
                    concept TEXT NOT NULL DEFAULT '',
                    document_number TEXT NOT NULL DEFAULT '',
                    description TEXT NOT NULL DEFAULT '',
                    category_id INTEGER REFERENCES categories(id),
                    import_hash TEXT UNIQUE,
                    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
                )"
            ),
            [],
        )?;

        conn.execute(
            &format!("CREATE INDEX IF NOT EXISTS idx_{table}_date ON {table}(date)"),
            [],
        )?;
        conn.execute(
            &format!("CREATE INDEX IF NOT EXISTS idx_{table}_category ON {table}(category_id)"),
            [],
        )?;
    }

    Ok(())
}

// ============================================================================
// MOVEMENT CRUD
// ============================================================================

pub fn insert_movement(conn: &Connection, scope: LedgerScope, m: &NewMovement) -> Result<i64> {
    insert_movement_with_hash(conn, scope, m, None)
}

fn insert_movement_with_hash(
    conn: &Connection,
    scope: LedgerScope,
    m: &NewMovement,
    import_hash: Option<&str>,
) -> Result<i64> {
    conn.execute(
        &format!(
            "INSERT INTO {} (
                date, kind, amount_cents, payment_method, concept,
                document_number, description, category_id, import_hash
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            scope.table()
        ),
        params![
            date_to_sql(m.date),
            m.kind.as_str(),
            money::to_cents(m.amount),
            m.payment_method,
            m.concept,
            m.document_number,
            m.description,
            m.category_id,
            import_hash,
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

pub fn update_movement(
    conn: &Connection,
    scope: LedgerScope,
    id: i64,
    m: &NewMovement,
) -> Result<()> {
    let changed = conn.execute(
        &format!(
            "UPDATE {} SET
                date = ?1, kind = ?2, amount_cents = ?3, payment_method = ?4,
                concept = ?5, document_number = ?6, description = ?7, category_id = ?8
             WHERE id = ?9",
            scope.table()
        ),
        params![
            date_to_sql(m.date),
            m.kind.as_str(),
            money::to_cents(m.amount),
            m.payment_method,
            m.concept,
            m.document_number,
            m.description,
            m.category_id,
            id,
        ],
    )?;

    if changed == 0 {
        return Err(LedgerError::MovementNotFound(id));
    }
    Ok(())
}

pub fn delete_movement(conn: &Connection, scope: LedgerScope, id: i64) -> Result<()> {
    let changed = conn.execute(
        &format!("DELETE FROM {} WHERE id = ?1", scope.table()),
        params![id],
    )?;

    if changed == 0 {
        return Err(LedgerError::MovementNotFound(id));
    }
    Ok(())
}

pub fn get_movement(conn: &Connection, scope: LedgerScope, id: i64) -> Result<Option<Movement>> {
    let movement = conn
        .query_row(
            &format!(
                "SELECT {MOVEMENT_COLUMNS} FROM {} m WHERE m.id = ?1",
                scope.table()
            ),
            params![id],
            movement_from_row,
        )
        .optional()?;

    Ok(movement)
}

pub fn count_all_movements(conn: &Connection, scope: LedgerScope) -> Result<i64> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", scope.table()),
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ============================================================================
// CATEGORY CRUD
// ============================================================================

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

pub fn create_category(conn: &Connection, name: &str, kind: CategoryKind) -> Result<i64> {
    let result = conn.execute(
        "INSERT INTO categories (name, applicable_kind) VALUES (?1, ?2)",
        params![name, kind.as_str()],
    );

    match result {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(e) if is_unique_violation(&e) => Err(LedgerError::DuplicateCategory(name.to_string())),
        Err(e) => Err(e.into()),
    }
}

pub fn update_category(conn: &Connection, id: i64, name: &str, kind: CategoryKind) -> Result<()> {
    let result = conn.execute(
        "UPDATE categories SET name = ?1, applicable_kind = ?2 WHERE id = ?3",
        params![name, kind.as_str(), id],
    );

    match result {
        Ok(0) => Err(LedgerError::CategoryNotFound(id)),
        Ok(_) => Ok(()),
        Err(e) if is_unique_violation(&e) => Err(LedgerError::DuplicateCategory(name.to_string())),
        Err(e) => Err(e.into()),
    }
}

/// Delete a category. Blocked while any movement in any scope references it.
pub fn delete_category(conn: &Connection, id: i64) -> Result<()> {
    for scope in LedgerScope::ALL {
        let refs: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE category_id = ?1",
                scope.table()
            ),
            params![id],
            |row| row.get(0),
        )?;
        if refs > 0 {
            return Err(LedgerError::CategoryInUse(id));
        }
    }

    let changed = conn.execute("DELETE FROM categories WHERE id = ?1", params![id])?;
    if changed == 0 {
        return Err(LedgerError::CategoryNotFound(id));
    }
    Ok(())
}

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<Category> {
    let kind_str: String = row.get(2)?;
    let kind = CategoryKind::parse(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            Type::Text,
            format!("unknown category kind '{kind_str}'").into(),
        )
    })?;

    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        kind,
    })
}

pub fn list_categories(conn: &Connection) -> Result<Vec<Category>> {
    let mut stmt =
        conn.prepare("SELECT id, name, applicable_kind FROM categories ORDER BY name")?;
    let categories = stmt
        .query_map([], category_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(categories)
}

/// Categories usable for movements of `kind` (its own kind, plus `both`).
pub fn categories_for_kind(conn: &Connection, kind: MovementKind) -> Result<Vec<Category>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, applicable_kind FROM categories
         WHERE applicable_kind = ?1 OR applicable_kind = 'both'
         ORDER BY name",
    )?;
    let categories = stmt
        .query_map(params![kind.as_str()], category_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(categories)
}

pub fn find_category_by_name(conn: &Connection, name: &str) -> Result<Option<Category>> {
    let category = conn
        .query_row(
            "SELECT id, name, applicable_kind FROM categories WHERE name = ?1",
            params![name],
            category_from_row,
        )
        .optional()?;
    Ok(category)
}

// ============================================================================
// CSV IMPORT (idempotent)
// ============================================================================

/// One movement row as read from a seed/import CSV. All fields are loose
/// strings; parsing and validation happen at import time.
#[derive(Debug, Clone, Deserialize)]
pub struct MovementRecord {
    #[serde(rename = "Date")]
    pub date: String,

    #[serde(rename = "Kind")]
    pub kind: String,

    #[serde(rename = "Amount")]
    pub amount: String,

    #[serde(rename = "Concept", default)]
    pub concept: String,

    #[serde(rename = "PaymentMethod", default)]
    pub payment_method: String,

    #[serde(rename = "DocumentNumber", default)]
    pub document_number: String,

    #[serde(rename = "Description", default)]
    pub description: String,

    #[serde(rename = "Category", default)]
    pub category: String,
}

impl MovementRecord {
    /// Idempotency hash for duplicate detection across repeated imports.
    fn idempotency_hash(&self, scope: LedgerScope, cents: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{}|{}|{}|{}|{}",
            scope.as_str(),
            self.date.trim(),
            self.kind.trim(),
            cents,
            self.concept.trim(),
        ));
        format!("{:x}", hasher.finalize())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub inserted: usize,
    pub duplicates: usize,
    pub rejected: usize,
}

pub fn load_csv(csv_path: &Path) -> Result<Vec<MovementRecord>> {
    let mut rdr = csv::Reader::from_path(csv_path)?;

    let mut records = Vec::new();
    for result in rdr.deserialize() {
        let record: MovementRecord = result?;
        records.push(record);
    }

    Ok(records)
}

/// Insert records into one scope, skipping rows already imported (same hash)
/// and rejecting rows that fail to parse. Re-running an import never
/// duplicates movements.
pub fn import_movements(
    conn: &Connection,
    scope: LedgerScope,
    records: &[MovementRecord],
) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();

    for record in records {
        let date = NaiveDate::parse_from_str(record.date.trim(), "%Y-%m-%d");
        let kind = MovementKind::parse(&record.kind);
        let amount = money::parse_amount(&record.amount).filter(|a| !a.is_sign_negative());

        let (date, kind, amount) = match (date, kind, amount) {
            (Ok(d), Some(k), Some(a)) => (d, k, a),
            _ => {
                warn!(
                    date = %record.date,
                    kind = %record.kind,
                    amount = %record.amount,
                    "rejecting unparseable import row"
                );
                summary.rejected += 1;
                continue;
            }
        };

        let category_id = match record.category.trim() {
            "" => None,
            name => match find_category_by_name(conn, name)? {
                Some(c) => Some(c.id),
                None => Some(create_category(conn, name, CategoryKind::Both)?),
            },
        };

        let method = record.payment_method.trim();
        let movement = NewMovement {
            date,
            kind,
            amount,
            payment_method: if method.is_empty() {
                None
            } else {
                Some(method.to_string())
            },
            concept: record.concept.trim().to_string(),
            document_number: record.document_number.trim().to_string(),
            description: record.description.trim().to_string(),
            category_id,
        };

        let hash = record.idempotency_hash(scope, money::to_cents(movement.amount));
        match insert_movement_with_hash(conn, scope, &movement, Some(&hash)) {
            Ok(_) => summary.inserted += 1,
            Err(LedgerError::Store(e)) if is_unique_violation(&e) => summary.duplicates += 1,
            Err(e) => return Err(e),
        }
    }

    info!(
        scope = scope.as_str(),
        inserted = summary.inserted,
        duplicates = summary.duplicates,
        rejected = summary.rejected,
        "import complete"
    );

    Ok(summary)
}

// ============================================================================
// TESTS
// ============================================================================
