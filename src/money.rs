// Money handling - integer cents inside the store, Decimal at the API boundary
//
// Amounts are persisted as non-negative integer minor units (cents) so that
// SQL SUM() stays exact; summing 0.10 three times must yield exactly 0.30.
// Conversion to Decimal happens only when rows cross into the library's
// public types, and display rounding happens only at the presentation edge.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Convert stored minor units to a two-decimal currency value.
pub fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// Convert a currency value to minor units, rounding half-up to the cent.
///
/// Rounding here is the write-side boundary: aggregation always runs over
/// the already-stored integer cents, never over re-rounded values.
pub fn to_cents(amount: Decimal) -> i64 {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded.mantissa() as i64
}

/// Round a value to the currency's minor unit (2 decimals, half-up) for display.
pub fn display_rounded(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Parse a user-supplied amount string. Malformed input is absent, never an error.
pub fn parse_amount(s: &str) -> Option<Decimal> {
    s.trim().parse::<Decimal>().ok()
}

fn thousands(n: i64) -> String {
    // 1250200 -> "1.250.200"
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    let chars: Vec<char> = digits.chars().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(*c);
    }
    out
}

/// Chilean peso display format: `$1.250.200.-` (no decimals, half-up).
pub fn clp(value: Decimal) -> String {
    let n = value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(0);
    format!("${}.-", thousands(n.abs()))
}

/// Signed variant of [`clp`]: `+$1.234.-` / `-$1.234.-`.
pub fn clp_signed(value: Decimal) -> String {
    let n = value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(0);
    let sign = if n < 0 { "-" } else { "+" };
    format!("{}${}.-", sign, thousands(n.abs()))
}
