use crate::error::AppError;
use crate::models::Earnings;

fn currency_prefix(code: &str) -> String {
    match code {
        "USD" => "$".into(),
        "EUR" => "€".into(),
        "GBP" => "£".into(),
        "JPY" => "¥".into(),
        other => format!("{other} "),
    }
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Renders one key's total as e.g. `$1,234.56`. An absent key is an error,
/// never a zero.
pub fn present(earnings: &Earnings, key: &str) -> Result<String, AppError> {
    let amount = earnings.totals.get(key).copied().ok_or_else(|| {
        let known: Vec<&str> = earnings.totals.keys().map(String::as_str).collect();
        AppError::Lookup(format!(
            "no earnings for '{key}' (available: {})",
            if known.is_empty() {
                "none".to_string()
            } else {
                known.join(", ")
            }
        ))
    })?;

    let fixed = format!("{:.2}", amount.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let sign = if amount < 0.0 && fixed != "0.00" { "-" } else { "" };

    Ok(format!(
        "{sign}{}{}.{cents}",
        currency_prefix(&earnings.currency_code),
        group_thousands(whole)
    ))
}
