//! Purchasing cost reads over the invoice rollups.
//!
//! Invoices often land days after delivery, so the single-date reads fall
//! back to the most recent earlier cost day when the requested date is
//! recent. Older dates are answered as asked.

use chrono::{Duration, NaiveDate};
use diesel::prelude::*;
use serde::Serialize;

use crate::db::models::{AmountMap, DailyCost, InvoiceOrder};
use crate::models::invoicing::OrderStatus;
use crate::queries::lookup::{delta_pct, escape_like, largest_first, share_pct, Lookup, LookupResult};
use crate::schema;
use crate::services::recommendations::{evaluate_cost, Recommendation, Thresholds};
use crate::utils::round_money;

use schema::daily_costs::dsl as DC;

pub const DEFAULT_INVOICE_LIMIT: i64 = 20;
pub const DEFAULT_RANGE_DAYS: i64 = 7;

/// How far back from `today` a missing cost date may be substituted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostFallback {
    pub today: NaiveDate,
    pub lookback_days: i64,
}

/// The cost date actually reported, and what was asked for when they differ.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostDate {
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl CostDate {
    fn as_requested(date: NaiveDate) -> Self {
        CostDate {
            date,
            requested_date: None,
            note: None,
        }
    }
}

fn cost_row(conn: &mut SqliteConnection, unit_id: &str, date: NaiveDate) -> QueryResult<Option<DailyCost>> {
    DC::daily_costs
        .filter(DC::restaurant_unit_id.eq(unit_id))
        .filter(DC::invoice_date.eq(date))
        .select(DailyCost::as_select())
        .first(conn)
        .optional()
}

pub fn resolve_cost_date(
    conn: &mut SqliteConnection,
    unit_id: &str,
    requested: NaiveDate,
    fallback: CostFallback,
) -> QueryResult<CostDate> {
    if cost_row(conn, unit_id, requested)?.is_some() {
        return Ok(CostDate::as_requested(requested));
    }
    if (fallback.today - requested).num_days() > fallback.lookback_days {
        return Ok(CostDate::as_requested(requested));
    }
    let latest: Option<NaiveDate> = DC::daily_costs
        .filter(DC::restaurant_unit_id.eq(unit_id))
        .filter(DC::invoice_date.le(requested))
        .order(DC::invoice_date.desc())
        .select(DC::invoice_date)
        .first(conn)
        .optional()?;
    Ok(match latest {
        Some(date) => CostDate {
            date,
            requested_date: Some(requested),
            note: Some(format!(
                "No cost data for {}; showing most recent available date.",
                requested
            )),
        },
        None => CostDate::as_requested(requested),
    })
}

fn no_cost_data(date: NaiveDate) -> String {
    format!("No cost data found for {}", date)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostComparison {
    pub prior_date: NaiveDate,
    pub prior_daily_cost: f64,
    pub daily_cost_delta: f64,
    pub daily_cost_delta_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyCostReport {
    #[serde(flatten)]
    pub day: CostDate,
    pub restaurant_unit_id: String,
    pub total_cost: f64,
    pub total_tax: f64,
    pub total_delivery: f64,
    pub total_other_charges: f64,
    pub total_credits: f64,
    pub invoice_count: i32,
    pub vendor_count: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison: Option<CostComparison>,
    pub recommendations: Vec<Recommendation>,
}

/// A cost day against the prior cost day, with the cost rules applied.
pub fn daily_cost(
    conn: &mut SqliteConnection,
    unit_id: &str,
    date: NaiveDate,
    fallback: CostFallback,
    thresholds: &Thresholds,
) -> LookupResult<DailyCostReport> {
    let day = resolve_cost_date(conn, unit_id, date, fallback)?;
    let Some(row) = cost_row(conn, unit_id, day.date)? else {
        return Ok(Lookup::no_data(no_cost_data(day.date)));
    };
    let prior: Option<(NaiveDate, f64)> = DC::daily_costs
        .filter(DC::restaurant_unit_id.eq(unit_id))
        .filter(DC::invoice_date.lt(day.date))
        .order(DC::invoice_date.desc())
        .select((DC::invoice_date, DC::total_cost))
        .first(conn)
        .optional()?;

    let comparison = prior.filter(|(_, cost)| *cost > 0.0).map(|(prior_date, cost)| CostComparison {
        prior_date,
        prior_daily_cost: round_money(cost),
        daily_cost_delta: round_money(row.total_cost - cost),
        daily_cost_delta_pct: delta_pct(row.total_cost, cost),
    });
    let recommendations = evaluate_cost(row.total_cost, prior.map(|(_, cost)| cost), thresholds);

    Ok(Lookup::Found(DailyCostReport {
        day,
        restaurant_unit_id: unit_id.to_string(),
        total_cost: round_money(row.total_cost),
        total_tax: round_money(row.total_tax),
        total_delivery: round_money(row.total_delivery),
        total_other_charges: round_money(row.total_other_charges),
        total_credits: round_money(row.total_credits),
        invoice_count: row.invoice_count,
        vendor_count: row.vendor_count,
        comparison,
        recommendations,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCost {
    pub rank: usize,
    pub name: String,
    pub cost: f64,
    pub pct: f64,
}

fn ranked_costs(map: &AmountMap, total: f64, limit: Option<usize>) -> Vec<RankedCost> {
    largest_first(map)
        .into_iter()
        .take(limit.unwrap_or(usize::MAX))
        .enumerate()
        .map(|(i, (name, cost))| RankedCost {
            rank: i + 1,
            name,
            cost: round_money(cost),
            pct: share_pct(cost, total),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCosts {
    #[serde(flatten)]
    pub day: CostDate,
    pub restaurant_unit_id: String,
    pub category_count: usize,
    pub categories: Vec<RankedCost>,
}

pub fn cost_by_category(
    conn: &mut SqliteConnection,
    unit_id: &str,
    date: NaiveDate,
    fallback: CostFallback,
    limit: Option<usize>,
) -> LookupResult<CategoryCosts> {
    let day = resolve_cost_date(conn, unit_id, date, fallback)?;
    let Some(row) = cost_row(conn, unit_id, day.date)? else {
        return Ok(Lookup::no_data(no_cost_data(day.date)));
    };
    let categories = ranked_costs(&row.cost_by_category, row.total_cost, limit);
    Ok(Lookup::Found(CategoryCosts {
        day,
        restaurant_unit_id: unit_id.to_string(),
        category_count: categories.len(),
        categories,
    }))
}

/// Single day (with fallback) or an inclusive range; a range without a
/// start covers the week ending at `end`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpendPeriod {
    Day(NaiveDate),
    Range { start: Option<NaiveDate>, end: NaiveDate },
}

fn default_range_start(end: NaiveDate) -> NaiveDate {
    end - Duration::days(DEFAULT_RANGE_DAYS - 1)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorSpend {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub day_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub restaurant_unit_id: String,
    pub vendor_count: usize,
    pub vendors: Vec<RankedCost>,
}

/// Spend per vendor, merged across the days of the period.
pub fn vendor_spend(
    conn: &mut SqliteConnection,
    unit_id: &str,
    period: SpendPeriod,
    fallback: CostFallback,
    limit: Option<usize>,
) -> LookupResult<VendorSpend> {
    let (start, end, resolved) = match period {
        SpendPeriod::Day(date) => {
            let day = resolve_cost_date(conn, unit_id, date, fallback)?;
            (day.date, day.date, Some(day))
        }
        SpendPeriod::Range { start, end } => (start.unwrap_or_else(|| default_range_start(end)), end, None),
    };

    let rows: Vec<(AmountMap, f64)> = DC::daily_costs
        .filter(DC::restaurant_unit_id.eq(unit_id))
        .filter(DC::invoice_date.between(start, end))
        .order(DC::invoice_date.asc())
        .select((DC::cost_by_vendor, DC::total_cost))
        .load(conn)?;
    if rows.is_empty() {
        let message = if start == end {
            no_cost_data(start)
        } else {
            format!("No cost data found between {} and {}", start, end)
        };
        return Ok(Lookup::no_data(message));
    }

    let mut merged = AmountMap::new();
    let mut total = 0.0;
    for (by_vendor, day_total) in &rows {
        for (name, cost) in by_vendor.iter() {
            merged.add(name.clone(), *cost);
        }
        total += day_total;
    }
    let vendors = ranked_costs(&merged, total, limit);
    let (requested_date, note) = resolved.map(|d| (d.requested_date, d.note)).unwrap_or((None, None));

    Ok(Lookup::Found(VendorSpend {
        start_date: start,
        end_date: end,
        day_count: rows.len(),
        requested_date,
        note,
        restaurant_unit_id: unit_id.to_string(),
        vendor_count: vendors.len(),
        vendors,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostTrendPoint {
    pub date: NaiveDate,
    pub total_cost: f64,
    pub total_tax: f64,
    pub total_delivery: f64,
    pub total_other_charges: f64,
    pub total_credits: f64,
    pub invoice_count: i32,
    pub vendor_count: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostTrend {
    pub restaurant_unit_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub day_count: usize,
    pub trend: Vec<CostTrendPoint>,
}

pub fn cost_trend(
    conn: &mut SqliteConnection,
    unit_id: &str,
    start: Option<NaiveDate>,
    end: NaiveDate,
) -> LookupResult<CostTrend> {
    let start = start.unwrap_or_else(|| default_range_start(end));
    let trend: Vec<CostTrendPoint> = DC::daily_costs
        .filter(DC::restaurant_unit_id.eq(unit_id))
        .filter(DC::invoice_date.between(start, end))
        .order(DC::invoice_date.asc())
        .select(DailyCost::as_select())
        .load(conn)?
        .into_iter()
        .map(|r| CostTrendPoint {
            date: r.invoice_date,
            total_cost: round_money(r.total_cost),
            total_tax: round_money(r.total_tax),
            total_delivery: round_money(r.total_delivery),
            total_other_charges: round_money(r.total_other_charges),
            total_credits: round_money(r.total_credits),
            invoice_count: r.invoice_count,
            vendor_count: r.vendor_count,
        })
        .collect();
    if trend.is_empty() {
        return Ok(Lookup::no_data(format!("No cost data found between {} and {}", start, end)));
    }
    Ok(Lookup::Found(CostTrend {
        restaurant_unit_id: unit_id.to_string(),
        start_date: start,
        end_date: end,
        day_count: trend.len(),
        trend,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceEntry {
    pub rank: usize,
    pub invoice_number: String,
    pub invoice_date: NaiveDate,
    pub created_date: NaiveDate,
    pub vendor_name: String,
    pub total: f64,
    pub tax: f64,
    pub delivery_charges: f64,
    pub other_charges: f64,
    pub credit_amount: f64,
    pub is_credit: bool,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceList {
    #[serde(flatten)]
    pub day: CostDate,
    pub restaurant_unit_id: String,
    pub vendor_filter: Option<String>,
    pub invoice_count: usize,
    pub invoices: Vec<InvoiceEntry>,
}

/// Finalized invoices of a cost day, newest and largest first.
pub fn invoice_list(
    conn: &mut SqliteConnection,
    unit_id: &str,
    date: NaiveDate,
    fallback: CostFallback,
    vendor: Option<&str>,
    limit: Option<i64>,
) -> LookupResult<InvoiceList> {
    use schema::invoice_orders::dsl as IO;

    let day = resolve_cost_date(conn, unit_id, date, fallback)?;
    let vendor = vendor.map(str::trim).filter(|v| !v.is_empty());

    let mut query = IO::invoice_orders
        .filter(IO::restaurant_unit_id.eq(unit_id))
        .filter(IO::invoice_date.eq(day.date))
        .filter(IO::status.eq(OrderStatus::FINALIZED.name()))
        .select(InvoiceOrder::as_select())
        .into_boxed();
    if let Some(v) = vendor {
        query = query.filter(IO::vendor_name.like(format!("%{}%", escape_like(v))).escape('\\'));
    }
    let rows: Vec<InvoiceOrder> = query
        .order((IO::created_date.desc(), IO::order_total.desc()))
        .limit(limit.unwrap_or(DEFAULT_INVOICE_LIMIT))
        .load(conn)?;

    let invoices: Vec<InvoiceEntry> = rows
        .into_iter()
        .enumerate()
        .map(|(i, r)| InvoiceEntry {
            rank: i + 1,
            invoice_number: r.invoice_number,
            invoice_date: r.invoice_date,
            created_date: r.created_date,
            vendor_name: r.vendor_name,
            total: round_money(r.order_total),
            tax: round_money(r.tax),
            delivery_charges: round_money(r.delivery_charges),
            other_charges: round_money(r.other_charges),
            credit_amount: round_money(r.credit_amount),
            is_credit: r.is_credit,
            status: r.status,
        })
        .collect();
    Ok(Lookup::Found(InvoiceList {
        day,
        restaurant_unit_id: unit_id.to_string(),
        vendor_filter: vendor.map(str::to_string),
        invoice_count: invoices.len(),
        invoices,
    }))
}
