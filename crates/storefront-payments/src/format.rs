//! Price formatting for product listings.

use rust_decimal::Decimal;

/// Minor units to a two-decimal amount string (`2900` -> `"29.00"`)
pub fn format_amount(amount: Option<i64>) -> String {
    amount.map_or_else(|| "0.00".into(), |cents| Decimal::new(cents, 2).to_string())
}

/// Currency symbol for the handful of currencies with one, else the code
pub fn format_currency(currency: Option<&str>) -> String {
    match currency {
        Some("EUR") => "€".into(),
        Some("USD") => "$".into(),
        Some("SEK") => "kr".into(),
        Some(other) => other.into(),
        None => String::new(),
    }
}

/// Amount with currency, symbol first except for SEK
pub fn format_money(amount: Option<i64>, currency: Option<&str>) -> String {
    let amount = format_amount(amount);
    let symbol = format_currency(currency);

    if currency == Some("SEK") {
        format!("{amount} {symbol}")
    } else {
        format!("{symbol} {amount}")
    }
}
