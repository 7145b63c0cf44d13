//! Accounting export: spreadsheet or JSON summary of an organization's expenses.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use expensa_core::constants::EXPORT_PREVIEW_ROWS;
use expensa_core::models::{
    CategoryTotal, Expense, ExpenseFilter, ExpenseOrder, ExpenseStatus, ExportFormat,
    ExportSummary,
};
use expensa_core::policy::{Action, Resource};
use expensa_core::{AppError, Clock};
use expensa_db::ExpenseStore;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_xlsxwriter::{ExcelDateTime, Format, Workbook, XlsxError};
use uuid::Uuid;

use super::access::{AccessControl, Actor};
use super::expenses::check_date_range;

pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

const HEADERS: [&str; 6] = ["Date", "Merchant", "Category", "Description", "Status", "Amount"];

#[derive(Debug, Clone)]
pub struct ExportQuery {
    pub organization_id: Uuid,
    /// `None` or absent means VERIFIED; `"all"` exports every status.
    pub status: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub format: ExportFormat,
}

#[derive(Debug)]
pub enum ExportOutput {
    Spreadsheet { filename: String, bytes: Vec<u8> },
    Summary(ExportSummary),
}

/// Status selection for an export. Returns the statuses to include (`None` = all) and the
/// label echoed back in the summary.
fn parse_status(status: Option<&str>) -> Result<(Option<Vec<ExpenseStatus>>, String), AppError> {
    match status.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok((
            Some(vec![ExpenseStatus::Verified]),
            ExpenseStatus::Verified.as_str().to_string(),
        )),
        Some(s) if s.eq_ignore_ascii_case("all") => Ok((None, "ALL".to_string())),
        Some(s) => {
            let status: ExpenseStatus = s.parse()?;
            Ok((Some(vec![status]), status.as_str().to_string()))
        }
    }
}

fn summarize(expenses: &[Expense]) -> (Decimal, Vec<CategoryTotal>) {
    let mut by_category: BTreeMap<&str, (usize, Decimal)> = BTreeMap::new();
    let mut total = Decimal::ZERO;
    for expense in expenses {
        total += expense.amount;
        let entry = by_category
            .entry(expense.category.as_str())
            .or_insert((0, Decimal::ZERO));
        entry.0 += 1;
        entry.1 += expense.amount;
    }
    let totals = by_category
        .into_iter()
        .map(|(category, (count, total_amount))| CategoryTotal {
            category: category.to_string(),
            count,
            total_amount,
        })
        .collect();
    (total, totals)
}

fn excel_date(date: NaiveDate) -> Result<ExcelDateTime, XlsxError> {
    let year = u16::try_from(date.year()).unwrap_or(0);
    ExcelDateTime::from_ymd(year, date.month() as u8, date.day() as u8)
}

/// One row per expense plus a trailing total row.
fn build_workbook(expenses: &[Expense], currency_format: &str) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let day = Format::new().set_num_format("yyyy-mm-dd");
    let money = Format::new().set_num_format(currency_format);
    let money_total = Format::new().set_bold().set_num_format(currency_format);

    let worksheet = workbook.add_worksheet();
    worksheet.set_name("Expenses")?;

    for (col, title) in HEADERS.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *title, &header)?;
    }

    let mut row: u32 = 1;
    let mut total = Decimal::ZERO;
    for expense in expenses {
        worksheet.write_date_with_format(row, 0, &excel_date(expense.date)?, &day)?;
        worksheet.write_string(row, 1, &expense.merchant_name)?;
        worksheet.write_string(row, 2, &expense.category)?;
        worksheet.write_string(row, 3, expense.description.as_deref().unwrap_or(""))?;
        worksheet.write_string(row, 4, expense.status.as_str())?;
        worksheet.write_number_with_format(
            row,
            5,
            expense.amount.to_f64().unwrap_or_default(),
            &money,
        )?;
        total += expense.amount;
        row += 1;
    }

    worksheet.write_string_with_format(row, 0, "Total", &header)?;
    worksheet.write_number_with_format(row, 5, total.to_f64().unwrap_or_default(), &money_total)?;

    worksheet.set_column_width(0, 12)?;
    worksheet.set_column_width(1, 32)?;
    worksheet.set_column_width(2, 18)?;
    worksheet.set_column_width(3, 40)?;
    worksheet.set_column_width(4, 10)?;
    worksheet.set_column_width(5, 16)?;

    workbook.save_to_buffer()
}

pub struct ExportService {
    expenses: Arc<dyn ExpenseStore>,
    access: AccessControl,
    clock: Arc<dyn Clock>,
    currency_format: String,
}

impl ExportService {
    pub fn new(
        expenses: Arc<dyn ExpenseStore>,
        access: AccessControl,
        clock: Arc<dyn Clock>,
        currency_format: String,
    ) -> Self {
        Self {
            expenses,
            access,
            clock,
            currency_format,
        }
    }

    #[tracing::instrument(skip(self), fields(user_id = %actor.user_id))]
    pub async fn export(&self, actor: &Actor, query: ExportQuery) -> Result<ExportOutput, AppError> {
        check_date_range(query.from, query.to)?;
        let (statuses, status_label) = parse_status(query.status.as_deref())?;

        self.access
            .authorize(
                actor,
                query.organization_id,
                Action::ExportReport,
                &Resource::Organization {
                    id: query.organization_id,
                },
            )
            .await?;

        let filter = ExpenseFilter {
            organization_id: query.organization_id,
            statuses,
            from: query.from,
            to: query.to,
            created_by: None,
        };
        let expenses = self
            .expenses
            .list(&filter, ExpenseOrder::DateAscending)
            .await?;

        tracing::info!(
            organization_id = %query.organization_id,
            rows = expenses.len(),
            format = ?query.format,
            "Export generated"
        );

        match query.format {
            ExportFormat::Excel => {
                let bytes = build_workbook(&expenses, &self.currency_format).map_err(|e| {
                    AppError::Internal(format!("Failed to build spreadsheet: {}", e))
                })?;
                let filename = format!(
                    "expenses-{}-{}.xlsx",
                    status_label.to_lowercase(),
                    self.clock.today().format("%Y%m%d")
                );
                Ok(ExportOutput::Spreadsheet { filename, bytes })
            }
            ExportFormat::Summary => {
                let (total_amount, by_category) = summarize(&expenses);
                let count = expenses.len();
                let preview = expenses.into_iter().take(EXPORT_PREVIEW_ROWS).collect();
                Ok(ExportOutput::Summary(ExportSummary {
                    count,
                    total_amount,
                    by_category,
                    preview,
                    status: status_label,
                    from: query.from,
                    to: query.to,
                }))
            }
        }
    }
}
