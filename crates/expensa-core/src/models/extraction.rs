use chrono::NaiveDate;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::expense::{Expense, ReceiptItem};
use crate::constants::{DEFAULT_CURRENCY, UNKNOWN_MERCHANT};

/// Normalized fields read from a receipt image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ExtractedReceipt {
    pub merchant_name: String,
    #[schema(value_type = f64)]
    pub amount: Decimal,
    pub currency: String,
    pub date: NaiveDate,
    pub items: Vec<ReceiptItem>,
    pub description: Option<String>,
    pub confidence: f64,
}

/// Request DTO for `POST /extract`. `path` (a storage key from `/upload`) wins over `image_url`.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct ExtractRequest {
    pub organization_id: Uuid,
    #[serde(default, alias = "imageUrl")]
    #[validate(length(min = 1, max = 2048))]
    pub image_url: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1, max = 1024))]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ExtractResponse {
    pub expense: Expense,
    pub extracted_data: ExtractedReceipt,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    pub image_url: String,
    pub path: String,
}

/// Turn the model's JSON object into trusted fields.
///
/// Amounts may arrive as numbers or strings and are made non-negative. A missing or
/// unreadable date becomes `today`, a blank merchant becomes the unknown-merchant
/// sentinel, and confidence is clamped to `[0, 1]`.
pub fn normalize_extraction(raw: &Value, today: NaiveDate) -> ExtractedReceipt {
    let merchant_name = raw
        .get("merchant_name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_MERCHANT)
        .to_string();

    let amount = raw
        .get("amount")
        .and_then(decimal_from_value)
        .map(|d| d.abs().round_dp(2))
        .unwrap_or(Decimal::ZERO);

    let currency = raw
        .get("currency")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_uppercase())
        .filter(|s| s.len() == 3 && s.chars().all(|c| c.is_ascii_alphabetic()))
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

    let date = raw
        .get("date")
        .and_then(Value::as_str)
        .and_then(parse_receipt_date)
        .unwrap_or(today);

    let items = raw
        .get("items")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(item_from_value).collect())
        .unwrap_or_default();

    let description = raw
        .get("description")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let confidence = raw
        .get("confidence")
        .and_then(|v| v.as_f64().or_else(|| v.as_str()?.trim().parse().ok()))
        .filter(|c: &f64| c.is_finite())
        .map(|c| c.clamp(0.0, 1.0))
        .unwrap_or(0.0);

    ExtractedReceipt {
        merchant_name,
        amount,
        currency,
        date,
        items,
        description,
        confidence,
    }
}

fn item_from_value(value: &Value) -> Option<ReceiptItem> {
    let name = value
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())?;
    Some(ReceiptItem {
        name: name.to_string(),
        quantity: value.get("quantity").and_then(decimal_from_value),
        price: value
            .get("price")
            .and_then(decimal_from_value)
            .map(|d| d.abs().round_dp(2)),
    })
}

fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Decimal::from(i))
            } else if let Some(u) = n.as_u64() {
                Some(Decimal::from(u))
            } else {
                n.as_f64().and_then(Decimal::from_f64)
            }
        }
        Value::String(s) => parse_amount_str(s),
        _ => None,
    }
}

/// Parse amounts written the way receipts print them: `"Rp 23.500"`, `"1,234.56"`,
/// `"12,50"`, `"-50000"`.
pub fn parse_amount_str(input: &str) -> Option<Decimal> {
    let cleaned: String = input
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect();
    let negative = cleaned.starts_with('-');
    let body = cleaned.trim_start_matches('-');
    if body.is_empty() || body.contains('-') {
        return None;
    }

    let last_dot = body.rfind('.');
    let last_comma = body.rfind(',');
    let decimal_sep = match (last_dot, last_comma) {
        (Some(d), Some(c)) => Some(if d > c { '.' } else { ',' }),
        (Some(d), None) => single_separator_is_decimal(body, '.', d).then_some('.'),
        (None, Some(c)) => single_separator_is_decimal(body, ',', c).then_some(','),
        (None, None) => None,
    };

    let normalized: String = match decimal_sep {
        Some(sep) => {
            let idx = body.rfind(sep)?;
            let (int_part, frac_part) = body.split_at(idx);
            let int_digits: String = int_part.chars().filter(char::is_ascii_digit).collect();
            let frac_digits: String =
                frac_part[1..].chars().filter(char::is_ascii_digit).collect();
            let int_digits = if int_digits.is_empty() {
                "0".to_string()
            } else {
                int_digits
            };
            format!("{}.{}", int_digits, frac_digits)
        }
        None => body.chars().filter(char::is_ascii_digit).collect(),
    };

    let value: Decimal = normalized.trim_end_matches('.').parse().ok()?;
    Some(if negative { -value } else { value })
}

/// A lone separator followed by exactly three digits is a thousands separator.
fn single_separator_is_decimal(body: &str, sep: char, idx: usize) -> bool {
    if body.matches(sep).count() > 1 {
        return false;
    }
    let fraction = &body[idx + 1..];
    fraction.len() != 3
}

fn parse_receipt_date(input: &str) -> Option<NaiveDate> {
    let input = input.trim();
    ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d", "%d.%m.%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(input, fmt).ok())
}
