use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::expense::Expense;
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Excel,
    Summary,
}

impl FromStr for ExportFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "excel" | "xlsx" => Ok(ExportFormat::Excel),
            "summary" | "json" => Ok(ExportFormat::Summary),
            other => Err(AppError::InvalidInput(format!(
                "Invalid export format '{}': expected excel or summary",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CategoryTotal {
    pub category: String,
    pub count: usize,
    #[schema(value_type = f64)]
    pub total_amount: Decimal,
}

/// JSON form of the accounting export.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ExportSummary {
    pub count: usize,
    #[schema(value_type = f64)]
    pub total_amount: Decimal,
    pub by_category: Vec<CategoryTotal>,
    /// First rows of the export; the spreadsheet itself is unbounded.
    pub preview: Vec<Expense>,
    pub status: String,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}
