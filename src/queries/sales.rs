//! Sales, guest and daypart reads over the POS rollups.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use serde::Serialize;

use crate::db::models::{DailyMetric, HourlyMetric, ItemDailyMetric, ServerDailyMetric, SyncLog};
use crate::queries::lookup::{delta_pct, hour_label, largest_first, share_pct, Lookup, LookupResult};
use crate::schema;
use crate::services::aggregate::labor_cost_pct;
use crate::services::recommendations::{evaluate, Comparison, Recommendation, Thresholds};
use crate::utils::{ratio_or_zero, round_money};

use schema::daily_metrics::dsl as DM;
use schema::hourly_metrics::dsl as HM;

pub(crate) fn daily_row(conn: &mut SqliteConnection, location: &str, date: NaiveDate) -> QueryResult<Option<DailyMetric>> {
    DM::daily_metrics
        .filter(DM::location_guid.eq(location))
        .filter(DM::business_date.eq(date))
        .select(DailyMetric::as_select())
        .first(conn)
        .optional()
}

fn no_data_for(date: NaiveDate) -> String {
    format!("No data found for {}", date)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayComparison {
    pub date: NaiveDate,
    pub net_sales: f64,
    pub order_count: i32,
    pub avg_check: f64,
    pub guest_count: i32,
    pub sales_delta: f64,
    pub sales_delta_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySummary {
    pub date: NaiveDate,
    pub location_id: String,
    pub location_name: String,
    pub net_sales: f64,
    pub gross_sales: f64,
    pub tax_collected: f64,
    pub tips_collected: f64,
    pub total_discounts: f64,
    pub order_count: i32,
    pub guest_count: i32,
    pub avg_check: f64,
    pub avg_guest_spend: f64,
    pub labor_hours: f64,
    pub labor_cost: f64,
    pub labor_cost_pct: f64,
    pub overtime_hours: f64,
    pub sales_per_labor_hour: f64,
    pub employee_count: i32,
    pub labor_cost_is_estimated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison: Option<DayComparison>,
    pub recommendations: Vec<Recommendation>,
}

/// One day's headline numbers, optionally against another day, with the
/// recommendations they trigger.
pub fn daily_summary(
    conn: &mut SqliteConnection,
    location: &str,
    date: NaiveDate,
    compare_to: Option<NaiveDate>,
    thresholds: &Thresholds,
) -> LookupResult<DailySummary> {
    let Some(row) = daily_row(conn, location, date)? else {
        return Ok(Lookup::no_data(no_data_for(date)));
    };

    let previous = match compare_to {
        Some(other) => daily_row(conn, location, other)?,
        None => None,
    };
    let comparison = previous.as_ref().map(|prev| DayComparison {
        date: prev.business_date,
        net_sales: prev.net_sales,
        order_count: prev.order_count,
        avg_check: prev.avg_check,
        guest_count: prev.guest_count,
        sales_delta: round_money(row.net_sales - prev.net_sales),
        sales_delta_pct: delta_pct(row.net_sales, prev.net_sales),
    });
    let rule_inputs = previous.as_ref().map(|prev| Comparison::between(&row, prev));
    let recommendations = evaluate(&row, rule_inputs.as_ref(), thresholds);

    Ok(Lookup::Found(DailySummary {
        date,
        location_id: row.location_guid,
        location_name: row.location_name,
        net_sales: row.net_sales,
        gross_sales: row.gross_sales,
        tax_collected: row.tax_collected,
        tips_collected: row.tips_collected,
        total_discounts: row.total_discounts,
        order_count: row.order_count,
        guest_count: row.guest_count,
        avg_check: row.avg_check,
        avg_guest_spend: row.avg_guest_spend,
        labor_hours: row.labor_hours,
        labor_cost: row.labor_cost,
        labor_cost_pct: row.labor_cost_pct,
        overtime_hours: row.overtime_hours,
        sales_per_labor_hour: row.sales_per_labor_hour,
        employee_count: row.employee_count,
        labor_cost_is_estimated: row.labor_cost_is_estimated,
        comparison,
        recommendations,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRevenue {
    pub location_id: String,
    pub location_name: String,
    pub net_sales: f64,
    pub gross_sales: f64,
    pub order_count: i32,
    pub guest_count: i32,
    pub avg_check: f64,
    pub tips_collected: f64,
    pub labor_cost: f64,
    pub labor_cost_pct: f64,
    pub sales_per_labor_hour: f64,
    pub overtime_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueByLocation {
    pub date: NaiveDate,
    pub total_net_sales: f64,
    pub location_count: usize,
    pub best_performer: LocationRevenue,
    pub locations: Vec<LocationRevenue>,
}

/// Side-by-side day for the given locations (every stored location when
/// `locations` is empty), best net sales first.
pub fn revenue_by_location(conn: &mut SqliteConnection, date: NaiveDate, locations: &[String]) -> LookupResult<RevenueByLocation> {
    let mut query = DM::daily_metrics
        .filter(DM::business_date.eq(date))
        .select(DailyMetric::as_select())
        .into_boxed();
    if !locations.is_empty() {
        query = query.filter(DM::location_guid.eq_any(locations.to_vec()));
    }
    let rows: Vec<DailyMetric> = query
        .order((DM::net_sales.desc(), DM::location_guid.asc()))
        .load(conn)?;

    let locations: Vec<LocationRevenue> = rows
        .into_iter()
        .map(|r| LocationRevenue {
            location_id: r.location_guid,
            location_name: r.location_name,
            net_sales: r.net_sales,
            gross_sales: r.gross_sales,
            order_count: r.order_count,
            guest_count: r.guest_count,
            avg_check: r.avg_check,
            tips_collected: r.tips_collected,
            labor_cost: r.labor_cost,
            labor_cost_pct: r.labor_cost_pct,
            sales_per_labor_hour: r.sales_per_labor_hour,
            overtime_hours: r.overtime_hours,
        })
        .collect();
    let Some(best) = locations.first().cloned() else {
        return Ok(Lookup::no_data(no_data_for(date)));
    };

    Ok(Lookup::Found(RevenueByLocation {
        date,
        total_net_sales: round_money(locations.iter().map(|l| l.net_sales).sum()),
        location_count: locations.len(),
        best_performer: best,
        locations,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BriefTotals {
    pub net_sales: f64,
    pub gross_sales: f64,
    pub order_count: i32,
    pub guest_count: i32,
    pub avg_check: f64,
    pub tips: f64,
    pub labor_hours: f64,
    pub labor_cost: f64,
    pub labor_cost_pct: f64,
    pub overtime_hours: f64,
    pub sales_per_labor_hour: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BriefLocation {
    pub location_id: String,
    pub location_name: String,
    pub net_sales: f64,
    pub order_count: i32,
    pub guest_count: i32,
    pub avg_check: f64,
    pub labor_cost_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BriefItem {
    pub rank: usize,
    pub name: String,
    pub total_quantity: f64,
    pub total_revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BriefServer {
    pub rank: usize,
    pub name: String,
    pub location_id: String,
    pub net_sales: f64,
    pub tips: f64,
    pub avg_check: f64,
    pub order_count: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutiveBrief {
    pub date: NaiveDate,
    pub location_count: usize,
    pub totals: BriefTotals,
    pub locations: Vec<BriefLocation>,
    pub top_items: Vec<BriefItem>,
    pub top_servers: Vec<BriefServer>,
    pub recommendations: Vec<Recommendation>,
}

const BRIEF_TOP_N: usize = 5;

/// Cross-location digest of one day: summed totals, each location, the
/// best-selling items and servers, and recommendations on the totals.
/// An empty `locations` slice covers every stored location.
pub fn executive_brief(
    conn: &mut SqliteConnection,
    date: NaiveDate,
    locations: &[String],
    thresholds: &Thresholds,
) -> LookupResult<ExecutiveBrief> {
    use schema::item_daily_metrics::dsl as IM;
    use schema::server_daily_metrics::dsl as SM;

    let mut query = DM::daily_metrics
        .filter(DM::business_date.eq(date))
        .select(DailyMetric::as_select())
        .into_boxed();
    if !locations.is_empty() {
        query = query.filter(DM::location_guid.eq_any(locations.to_vec()));
    }
    let rows: Vec<DailyMetric> = query
        .order((DM::net_sales.desc(), DM::location_guid.asc()))
        .load(conn)?;
    let Some(combined) = combine_days(&rows) else {
        return Ok(Lookup::no_data(no_data_for(date)));
    };

    let mut items = IM::item_daily_metrics
        .filter(IM::business_date.eq(date))
        .select(ItemDailyMetric::as_select())
        .into_boxed();
    if !locations.is_empty() {
        items = items.filter(IM::location_guid.eq_any(locations.to_vec()));
    }
    let mut by_item: BTreeMap<String, (f64, f64)> = BTreeMap::new();
    for item in items.load::<ItemDailyMetric>(conn)? {
        let entry = by_item.entry(item.display_name).or_default();
        entry.0 += item.quantity_sold;
        entry.1 += item.revenue;
    }
    let mut ranked_items: Vec<(String, f64, f64)> = by_item.into_iter().map(|(name, (qty, rev))| (name, qty, rev)).collect();
    ranked_items.sort_by(|a, b| b.2.total_cmp(&a.2).then_with(|| a.0.cmp(&b.0)));
    let top_items = ranked_items
        .into_iter()
        .take(BRIEF_TOP_N)
        .enumerate()
        .map(|(i, (name, qty, rev))| BriefItem {
            rank: i + 1,
            name,
            total_quantity: qty,
            total_revenue: round_money(rev),
        })
        .collect();

    let mut servers = SM::server_daily_metrics
        .filter(SM::business_date.eq(date))
        .select(ServerDailyMetric::as_select())
        .into_boxed();
    if !locations.is_empty() {
        servers = servers.filter(SM::location_guid.eq_any(locations.to_vec()));
    }
    let top_servers = servers
        .order((SM::net_sales.desc(), SM::server_name.asc()))
        .limit(BRIEF_TOP_N as i64)
        .load::<ServerDailyMetric>(conn)?
        .into_iter()
        .enumerate()
        .map(|(i, s)| BriefServer {
            rank: i + 1,
            name: s.server_name,
            location_id: s.location_guid,
            net_sales: s.net_sales,
            tips: s.tips,
            avg_check: s.avg_check,
            order_count: s.order_count,
        })
        .collect();

    let recommendations = evaluate(&combined, None, thresholds);
    let totals = BriefTotals {
        net_sales: combined.net_sales,
        gross_sales: combined.gross_sales,
        order_count: combined.order_count,
        guest_count: combined.guest_count,
        avg_check: combined.avg_check,
        tips: combined.tips_collected,
        labor_hours: combined.labor_hours,
        labor_cost: combined.labor_cost,
        labor_cost_pct: combined.labor_cost_pct,
        overtime_hours: combined.overtime_hours,
        sales_per_labor_hour: combined.sales_per_labor_hour,
    };
    let locations: Vec<BriefLocation> = rows
        .into_iter()
        .map(|r| BriefLocation {
            location_id: r.location_guid,
            location_name: r.location_name,
            net_sales: r.net_sales,
            order_count: r.order_count,
            guest_count: r.guest_count,
            avg_check: r.avg_check,
            labor_cost_pct: r.labor_cost_pct,
        })
        .collect();

    Ok(Lookup::Found(ExecutiveBrief {
        date,
        location_count: locations.len(),
        totals,
        locations,
        top_items,
        top_servers,
        recommendations,
    }))
}

/// Sums several locations' rows for one day into a single row so the
/// recommendation rules can run on the whole group.
fn combine_days(rows: &[DailyMetric]) -> Option<DailyMetric> {
    let mut out = rows.first()?.clone();
    out.location_guid = String::new();
    out.location_name = String::new();
    for r in &rows[1..] {
        out.gross_sales += r.gross_sales;
        out.net_sales += r.net_sales;
        out.tax_collected += r.tax_collected;
        out.tips_collected += r.tips_collected;
        out.total_discounts += r.total_discounts;
        out.order_count += r.order_count;
        out.guest_count += r.guest_count;
        out.labor_hours += r.labor_hours;
        out.labor_cost += r.labor_cost;
        out.overtime_hours += r.overtime_hours;
        out.employee_count += r.employee_count;
        out.labor_cost_is_estimated |= r.labor_cost_is_estimated;
    }
    out.gross_sales = round_money(out.gross_sales);
    out.net_sales = round_money(out.net_sales);
    out.tax_collected = round_money(out.tax_collected);
    out.tips_collected = round_money(out.tips_collected);
    out.total_discounts = round_money(out.total_discounts);
    out.labor_hours = round_money(out.labor_hours);
    out.labor_cost = round_money(out.labor_cost);
    out.overtime_hours = round_money(out.overtime_hours);
    out.avg_check = round_money(ratio_or_zero(out.net_sales, out.order_count as f64));
    out.avg_guest_spend = round_money(ratio_or_zero(out.net_sales, out.guest_count as f64));
    out.labor_cost_pct = labor_cost_pct(out.labor_cost, out.net_sales);
    out.sales_per_labor_hour = round_money(ratio_or_zero(out.net_sales, out.labor_hours));
    Some(out)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub net_sales: f64,
    pub order_count: i32,
    pub guest_count: i32,
    pub avg_check: f64,
    pub labor_cost_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueTrend {
    pub location_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub day_count: usize,
    pub trend: Vec<TrendPoint>,
}

pub fn revenue_trend(conn: &mut SqliteConnection, location: &str, start: NaiveDate, end: NaiveDate) -> LookupResult<RevenueTrend> {
    let trend: Vec<TrendPoint> = DM::daily_metrics
        .filter(DM::location_guid.eq(location))
        .filter(DM::business_date.between(start, end))
        .order(DM::business_date.asc())
        .select((
            DM::business_date,
            DM::net_sales,
            DM::order_count,
            DM::guest_count,
            DM::avg_check,
            DM::labor_cost_pct,
        ))
        .load::<(NaiveDate, f64, i32, i32, f64, f64)>(conn)?
        .into_iter()
        .map(|(date, net_sales, order_count, guest_count, avg_check, labor_cost_pct)| TrendPoint {
            date,
            net_sales,
            order_count,
            guest_count,
            avg_check,
            labor_cost_pct,
        })
        .collect();
    if trend.is_empty() {
        return Ok(Lookup::no_data(format!("No data found between {} and {}", start, end)));
    }
    Ok(Lookup::Found(RevenueTrend {
        location_id: location.to_string(),
        start_date: start,
        end_date: end,
        day_count: trend.len(),
        trend,
    }))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PaymentShare {
    pub amount: f64,
    pub pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentBreakdown {
    pub date: NaiveDate,
    pub location_id: String,
    pub total_payments: f64,
    pub cash: PaymentShare,
    pub credit: PaymentShare,
    pub other: PaymentShare,
    pub tips: f64,
    pub tips_pct: f64,
}

pub fn payment_breakdown(conn: &mut SqliteConnection, location: &str, date: NaiveDate) -> LookupResult<PaymentBreakdown> {
    let Some(row) = daily_row(conn, location, date)? else {
        return Ok(Lookup::no_data(no_data_for(date)));
    };
    let total = row.cash_payments + row.credit_payments + row.other_payments;
    let share = |amount: f64| PaymentShare {
        amount,
        pct: share_pct(amount, total),
    };
    Ok(Lookup::Found(PaymentBreakdown {
        date,
        location_id: row.location_guid.clone(),
        total_payments: round_money(total),
        cash: share(row.cash_payments),
        credit: share(row.credit_payments),
        other: share(row.other_payments),
        tips: row.tips_collected,
        tips_pct: share_pct(row.tips_collected, row.net_sales),
    }))
}

/// A named slice of net sales.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Share {
    pub name: String,
    pub revenue: f64,
    pub pct: f64,
}

pub(crate) fn shares_of(map: &crate::db::models::AmountMap, net_sales: f64) -> Vec<Share> {
    largest_first(map)
        .into_iter()
        .map(|(name, revenue)| Share {
            name,
            revenue: round_money(revenue),
            pct: share_pct(revenue, net_sales),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestMetrics {
    pub date: NaiveDate,
    pub location_id: String,
    pub guest_count: i32,
    pub avg_guest_spend: f64,
    pub order_count: i32,
    pub avg_check: f64,
    pub net_sales: f64,
    pub dining_options: Vec<Share>,
}

pub fn guest_metrics(conn: &mut SqliteConnection, location: &str, date: NaiveDate) -> LookupResult<GuestMetrics> {
    let Some(row) = daily_row(conn, location, date)? else {
        return Ok(Lookup::no_data(no_data_for(date)));
    };
    Ok(Lookup::Found(GuestMetrics {
        date,
        dining_options: shares_of(&row.sales_by_dining_option, row.net_sales),
        location_id: row.location_guid,
        guest_count: row.guest_count,
        avg_guest_spend: row.avg_guest_spend,
        order_count: row.order_count,
        avg_check: row.avg_check,
        net_sales: row.net_sales,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodTotals {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub day_count: usize,
    pub net_sales: f64,
    pub order_count: i64,
    pub guest_count: i64,
    pub avg_check: f64,
    pub labor_cost: f64,
    pub labor_cost_pct: f64,
    pub tips: f64,
    pub overtime_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodDelta {
    pub sales_delta: f64,
    pub sales_delta_pct: f64,
    pub order_delta: i64,
    pub guest_delta: i64,
    pub avg_check_delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodComparison {
    pub location_id: String,
    pub period1: PeriodTotals,
    pub period2: PeriodTotals,
    pub comparison: PeriodDelta,
}

fn period_totals(conn: &mut SqliteConnection, location: &str, start: NaiveDate, end: NaiveDate) -> QueryResult<PeriodTotals> {
    let rows: Vec<DailyMetric> = DM::daily_metrics
        .filter(DM::location_guid.eq(location))
        .filter(DM::business_date.between(start, end))
        .order(DM::business_date.asc())
        .select(DailyMetric::as_select())
        .load(conn)?;

    let net_sales: f64 = rows.iter().map(|r| r.net_sales).sum();
    let labor_cost: f64 = rows.iter().map(|r| r.labor_cost).sum();
    let order_count: i64 = rows.iter().map(|r| r.order_count as i64).sum();
    Ok(PeriodTotals {
        start_date: start,
        end_date: end,
        day_count: rows.len(),
        net_sales: round_money(net_sales),
        order_count,
        guest_count: rows.iter().map(|r| r.guest_count as i64).sum(),
        avg_check: round_money(ratio_or_zero(net_sales, order_count as f64)),
        labor_cost: round_money(labor_cost),
        labor_cost_pct: share_pct(labor_cost, net_sales),
        tips: round_money(rows.iter().map(|r| r.tips_collected).sum()),
        overtime_hours: round_money(rows.iter().map(|r| r.overtime_hours).sum()),
    })
}

/// Two inclusive date ranges summed and compared (period 1 against period 2).
pub fn compare_periods(
    conn: &mut SqliteConnection,
    location: &str,
    period1: (NaiveDate, NaiveDate),
    period2: (NaiveDate, NaiveDate),
) -> LookupResult<PeriodComparison> {
    let p1 = period_totals(conn, location, period1.0, period1.1)?;
    let p2 = period_totals(conn, location, period2.0, period2.1)?;
    if p1.day_count == 0 && p2.day_count == 0 {
        return Ok(Lookup::no_data(format!(
            "No data found for {}..{} or {}..{}",
            period1.0, period1.1, period2.0, period2.1
        )));
    }

    let comparison = PeriodDelta {
        sales_delta: round_money(p1.net_sales - p2.net_sales),
        sales_delta_pct: delta_pct(p1.net_sales, p2.net_sales),
        order_delta: p1.order_count - p2.order_count,
        guest_delta: p1.guest_count - p2.guest_count,
        avg_check_delta: round_money(p1.avg_check - p2.avg_check),
    };
    Ok(Lookup::Found(PeriodComparison {
        location_id: location.to_string(),
        period1: p1,
        period2: p2,
        comparison,
    }))
}

/// Named dayparts as `[start, end)` hours; anything else is late night.
const DAYPARTS: [(&str, i32, i32); 4] = [
    ("Morning (6-11)", 6, 11),
    ("Lunch (11-14)", 11, 14),
    ("Afternoon (14-17)", 14, 17),
    ("Dinner (17-21)", 17, 21),
];
const LATE_NIGHT: &str = "Late Night (21+)";

pub fn daypart_for(hour: i32) -> &'static str {
    DAYPARTS
        .iter()
        .find(|(_, start, end)| (*start..*end).contains(&hour))
        .map(|(name, _, _)| *name)
        .unwrap_or(LATE_NIGHT)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HourRow {
    pub hour: i32,
    pub label: String,
    pub order_count: i32,
    pub guest_count: i32,
    pub net_sales: f64,
    pub avg_check: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Daypart {
    pub name: &'static str,
    pub order_count: i32,
    pub guest_count: i32,
    pub net_sales: f64,
    pub pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DaypartBreakdown {
    pub date: NaiveDate,
    pub location_id: String,
    pub total_sales: f64,
    pub hourly: Vec<HourRow>,
    pub dayparts: Vec<Daypart>,
}

fn hourly_rows(conn: &mut SqliteConnection, location: &str, date: NaiveDate) -> QueryResult<Vec<HourlyMetric>> {
    HM::hourly_metrics
        .filter(HM::location_guid.eq(location))
        .filter(HM::business_date.eq(date))
        .order(HM::hour.asc())
        .select(HourlyMetric::as_select())
        .load(conn)
}

pub fn daypart_breakdown(conn: &mut SqliteConnection, location: &str, date: NaiveDate) -> LookupResult<DaypartBreakdown> {
    let rows = hourly_rows(conn, location, date)?;
    if rows.is_empty() {
        return Ok(Lookup::no_data(format!("No hourly data for {}", date)));
    }
    let total: f64 = rows.iter().map(|r| r.net_sales).sum();

    let mut dayparts: Vec<Daypart> = DAYPARTS
        .iter()
        .map(|(name, _, _)| *name)
        .chain([LATE_NIGHT])
        .map(|name| Daypart {
            name,
            order_count: 0,
            guest_count: 0,
            net_sales: 0.0,
            pct: 0.0,
        })
        .collect();
    for r in &rows {
        let name = daypart_for(r.hour);
        if let Some(part) = dayparts.iter_mut().find(|d| d.name == name) {
            part.order_count += r.order_count;
            part.guest_count += r.guest_count;
            part.net_sales += r.net_sales;
        }
    }
    dayparts.retain(|d| d.net_sales > 0.0);
    for part in &mut dayparts {
        part.pct = share_pct(part.net_sales, total);
        part.net_sales = round_money(part.net_sales);
    }

    Ok(Lookup::Found(DaypartBreakdown {
        date,
        location_id: location.to_string(),
        total_sales: round_money(total),
        hourly: rows
            .into_iter()
            .map(|r| HourRow {
                hour: r.hour,
                label: hour_label(r.hour),
                order_count: r.order_count,
                guest_count: r.guest_count,
                net_sales: r.net_sales,
                avg_check: r.avg_check,
            })
            .collect(),
        dayparts,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HourSnapshot {
    pub hour: i32,
    pub label: String,
    pub net_sales: f64,
    pub order_count: i32,
}

impl From<&HourlyMetric> for HourSnapshot {
    fn from(r: &HourlyMetric) -> Self {
        HourSnapshot {
            hour: r.hour,
            label: hour_label(r.hour),
            net_sales: r.net_sales,
            order_count: r.order_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeakHours {
    pub date: NaiveDate,
    pub location_id: String,
    pub peak_hour_by_sales: HourSnapshot,
    pub quietest_hour_by_sales: HourSnapshot,
    pub peak_hour_by_orders: HourSnapshot,
}

pub fn peak_hours(conn: &mut SqliteConnection, location: &str, date: NaiveDate) -> LookupResult<PeakHours> {
    let mut by_sales = hourly_rows(conn, location, date)?;
    // Stable sorts over hour order: ties go to the earlier hour.
    by_sales.sort_by(|a, b| b.net_sales.total_cmp(&a.net_sales));
    let (Some(peak), Some(quietest)) = (by_sales.first(), by_sales.last()) else {
        return Ok(Lookup::no_data(format!("No hourly data for {}", date)));
    };
    let mut by_orders: Vec<&HourlyMetric> = by_sales.iter().collect();
    by_orders.sort_by(|a, b| b.order_count.cmp(&a.order_count));

    Ok(Lookup::Found(PeakHours {
        date,
        location_id: location.to_string(),
        peak_hour_by_sales: peak.into(),
        quietest_hour_by_sales: quietest.into(),
        peak_hour_by_orders: by_orders[0].into(),
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub location_id: String,
    pub business_date: NaiveDate,
    pub synced_at: NaiveDateTime,
    pub order_count: i32,
    pub status: String,
    pub warnings: Vec<String>,
}

/// Most recent sync attempt for a location, whatever its outcome.
pub fn latest_sync(conn: &mut SqliteConnection, location: &str) -> LookupResult<SyncStatus> {
    use schema::sync_log::dsl as SL;

    let row: Option<SyncLog> = SL::sync_log
        .filter(SL::location_guid.eq(location))
        .order((SL::synced_at.desc(), SL::id.desc()))
        .select(SyncLog::as_select())
        .first(conn)
        .optional()?;
    Ok(match row {
        Some(r) => Lookup::Found(SyncStatus {
            location_id: r.location_guid,
            business_date: r.business_date,
            synced_at: r.synced_at,
            order_count: r.order_count,
            status: r.status,
            warnings: r.warnings.0,
        }),
        None => Lookup::no_data(format!("No sync recorded for {}", location)),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::models::AmountMap;
    use crate::db::store::test_connection;
    use crate::services::normalize::tests::scenario_date;
    use crate::services::pos_sync::tests::{options, FixturePos};
    use crate::services::pos_sync::SyncSession;
    use crate::services::recommendations::Severity;

    pub(crate) fn day_metric(location: &str, date: NaiveDate, net_sales: f64, order_count: i32) -> DailyMetric {
        DailyMetric {
            location_guid: location.to_string(),
            location_name: format!("Store {}", location),
            business_date: date,
            gross_sales: net_sales * 1.08,
            net_sales,
            tax_collected: net_sales * 0.08,
            tips_collected: net_sales * 0.15,
            total_discounts: 0.0,
            order_count,
            guest_count: order_count * 2,
            avg_check: round_money(ratio_or_zero(net_sales, order_count as f64)),
            avg_guest_spend: round_money(ratio_or_zero(net_sales, (order_count * 2) as f64)),
            labor_hours: 20.0,
            labor_cost: net_sales * 0.25,
            labor_cost_pct: 25.0,
            overtime_hours: 0.0,
            sales_per_labor_hour: round_money(net_sales / 20.0),
            employee_count: 4,
            cash_payments: 0.0,
            credit_payments: 0.0,
            other_payments: 0.0,
            sales_by_category: AmountMap::new(),
            sales_by_dining_option: AmountMap::new(),
            labor_cost_is_estimated: false,
        }
    }

    pub(crate) fn insert_metrics(conn: &mut SqliteConnection, rows: &[DailyMetric]) {
        diesel::insert_into(DM::daily_metrics).values(rows).execute(conn).expect("insert daily metrics");
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    pub(crate) fn synced_scenario() -> SqliteConnection {
        let mut conn = test_connection();
        let api = FixturePos::default();
        let mut session = SyncSession::new(&api, options());
        session.sync_date(&mut conn, "loc-1", scenario_date()).expect("sync");
        conn
    }

    #[test]
    fn missing_day_is_no_data() {
        let mut conn = test_connection();
        let result = daily_summary(&mut conn, "loc-1", d(1), None, &Thresholds::default()).expect("query");
        assert_eq!(result, Lookup::no_data("No data found for 2024-03-01"));
    }

    #[test]
    fn summary_carries_comparison_and_recommendations() {
        let mut conn = test_connection();
        insert_metrics(&mut conn, &[day_metric("loc-1", d(1), 100.0, 10), day_metric("loc-1", d(8), 60.0, 10)]);

        let summary = daily_summary(&mut conn, "loc-1", d(8), Some(d(1)), &Thresholds::default())
            .expect("query")
            .found()
            .expect("found");
        let comparison = summary.comparison.expect("comparison");
        assert_eq!(comparison.sales_delta, -40.0);
        assert_eq!(comparison.sales_delta_pct, -40.0);
        assert!(summary.recommendations.iter().any(|r| r.id == "revenue-decline"));
    }

    #[test]
    fn scenario_day_flags_critical_labor() {
        let mut conn = synced_scenario();
        let summary = daily_summary(&mut conn, "loc-1", scenario_date(), None, &Thresholds::default())
            .expect("query")
            .found()
            .expect("found");
        assert_eq!(summary.net_sales, 120.0);
        assert_eq!(summary.labor_cost_pct, 118.75);
        assert_eq!(summary.recommendations[0].severity, Severity::Critical);
        assert_eq!(summary.recommendations[0].id, "high-labor-cost");
    }

    #[test]
    fn locations_rank_by_net_sales() {
        let mut conn = test_connection();
        insert_metrics(
            &mut conn,
            &[day_metric("loc-a", d(1), 50.0, 5), day_metric("loc-b", d(1), 150.0, 9), day_metric("loc-c", d(1), 75.0, 3)],
        );
        let all = revenue_by_location(&mut conn, d(1), &[]).expect("query").found().expect("found");
        assert_eq!(all.location_count, 3);
        assert_eq!(all.total_net_sales, 275.0);
        assert_eq!(all.best_performer.location_id, "loc-b");

        let some = revenue_by_location(&mut conn, d(1), &["loc-a".to_string(), "loc-c".to_string()])
            .expect("query")
            .found()
            .expect("found");
        let ids: Vec<&str> = some.locations.iter().map(|l| l.location_id.as_str()).collect();
        assert_eq!(ids, vec!["loc-c", "loc-a"]);
    }

    fn item(location: &str, date: NaiveDate, name: &str, quantity_sold: f64, revenue: f64) -> ItemDailyMetric {
        ItemDailyMetric {
            location_guid: location.to_string(),
            business_date: date,
            display_name: name.to_string(),
            sales_category_name: "Food".to_string(),
            quantity_sold,
            revenue,
            avg_price: round_money(revenue / quantity_sold),
            order_count: quantity_sold as i32,
        }
    }

    fn server(location: &str, date: NaiveDate, name: &str, net_sales: f64) -> ServerDailyMetric {
        ServerDailyMetric {
            location_guid: location.to_string(),
            business_date: date,
            server_guid: format!("{}-{}", location, name),
            server_name: name.to_string(),
            order_count: 4,
            check_count: 4,
            guest_count: 8,
            net_sales,
            tips: round_money(net_sales * 0.18),
            avg_check: round_money(net_sales / 4.0),
            sales_per_hour: 0.0,
            hours_worked: 0.0,
        }
    }

    #[test]
    fn brief_sums_locations_and_ranks_leaders() {
        use schema::item_daily_metrics::dsl as IM;
        use schema::server_daily_metrics::dsl as SM;

        let mut conn = test_connection();
        let mut busy = day_metric("loc-b", d(1), 300.0, 20);
        busy.labor_cost = 135.0;
        busy.labor_cost_pct = 45.0;
        insert_metrics(&mut conn, &[day_metric("loc-a", d(1), 100.0, 10), busy, day_metric("loc-a", d(2), 999.0, 1)]);
        let items = vec![
            item("loc-a", d(1), "Burger", 4.0, 40.0),
            item("loc-a", d(1), "Fries", 6.0, 30.0),
            item("loc-b", d(1), "Burger", 6.0, 60.0),
            item("loc-b", d(1), "Salad", 5.0, 50.0),
            item("loc-b", d(2), "Steak", 9.0, 900.0),
        ];
        diesel::insert_into(IM::item_daily_metrics).values(&items).execute(&mut conn).expect("insert items");
        let servers = vec![
            server("loc-a", d(1), "Ann", 60.0),
            server("loc-a", d(1), "Bo", 40.0),
            server("loc-b", d(1), "Cy", 120.0),
            server("loc-b", d(1), "Di", 90.0),
            server("loc-b", d(1), "Ed", 50.0),
            server("loc-b", d(1), "Flo", 40.0),
        ];
        diesel::insert_into(SM::server_daily_metrics).values(&servers).execute(&mut conn).expect("insert servers");

        let brief = executive_brief(&mut conn, d(1), &[], &Thresholds::default())
            .expect("query")
            .found()
            .expect("found");
        assert_eq!(brief.location_count, 2);
        assert_eq!(brief.totals.net_sales, 400.0);
        assert_eq!(brief.totals.order_count, 30);
        assert_eq!(brief.totals.avg_check, 13.33);
        assert_eq!(brief.totals.labor_hours, 40.0);
        assert_eq!(brief.totals.labor_cost, 160.0);
        assert_eq!(brief.totals.labor_cost_pct, 40.0);
        assert_eq!(brief.totals.sales_per_labor_hour, 10.0);
        let ids: Vec<&str> = brief.locations.iter().map(|l| l.location_id.as_str()).collect();
        assert_eq!(ids, vec!["loc-b", "loc-a"]);

        let items: Vec<(&str, f64, f64)> =
            brief.top_items.iter().map(|i| (i.name.as_str(), i.total_quantity, i.total_revenue)).collect();
        assert_eq!(items, vec![("Burger", 10.0, 100.0), ("Salad", 5.0, 50.0), ("Fries", 6.0, 30.0)]);
        assert_eq!(brief.top_items[2].rank, 3);

        assert_eq!(brief.top_servers.len(), 5);
        let names: Vec<&str> = brief.top_servers.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Cy", "Di", "Ann", "Ed", "Bo"]);
        assert_eq!(brief.top_servers[0].rank, 1);
        assert_eq!(brief.top_servers[0].location_id, "loc-b");

        // loc-b alone is critical; the group sits at exactly 40% and only warns.
        let labor = brief.recommendations.iter().find(|r| r.id == "high-labor-cost").expect("labor rec");
        assert_eq!(labor.severity, Severity::Warning);
        assert_eq!(labor.value, 40.0);
    }

    #[test]
    fn brief_honours_location_filter_and_missing_days() {
        let mut conn = test_connection();
        insert_metrics(&mut conn, &[day_metric("loc-a", d(1), 100.0, 10), day_metric("loc-b", d(1), 300.0, 20)]);

        let only_a = executive_brief(&mut conn, d(1), &["loc-a".to_string()], &Thresholds::default())
            .expect("query")
            .found()
            .expect("found");
        assert_eq!(only_a.location_count, 1);
        assert_eq!(only_a.totals.net_sales, 100.0);
        assert!(only_a.top_items.is_empty());
        assert!(only_a.top_servers.is_empty());

        let missing = executive_brief(&mut conn, d(3), &[], &Thresholds::default()).expect("query");
        assert_eq!(missing, Lookup::no_data("No data found for 2024-03-03"));
    }

    #[test]
    fn periods_sum_and_compare() {
        let mut conn = test_connection();
        insert_metrics(
            &mut conn,
            &[
                day_metric("loc-1", d(1), 100.0, 10),
                day_metric("loc-1", d(2), 100.0, 10),
                day_metric("loc-1", d(8), 150.0, 10),
                day_metric("loc-1", d(9), 150.0, 10),
            ],
        );
        let cmp = compare_periods(&mut conn, "loc-1", (d(8), d(14)), (d(1), d(7)))
            .expect("query")
            .found()
            .expect("found");
        assert_eq!(cmp.period1.day_count, 2);
        assert_eq!(cmp.period1.net_sales, 300.0);
        assert_eq!(cmp.period1.labor_cost_pct, 25.0);
        assert_eq!(cmp.comparison.sales_delta, 100.0);
        assert_eq!(cmp.comparison.sales_delta_pct, 50.0);
        assert_eq!(cmp.comparison.avg_check_delta, 5.0);
    }

    #[test]
    fn dayparts_drop_empty_buckets() {
        let mut conn = synced_scenario();
        let breakdown = daypart_breakdown(&mut conn, "loc-1", scenario_date())
            .expect("query")
            .found()
            .expect("found");
        assert_eq!(breakdown.total_sales, 120.0);
        assert!(breakdown.dayparts.iter().all(|d| d.net_sales > 0.0));
        let pct: f64 = breakdown.dayparts.iter().map(|d| d.pct).sum();
        assert!((pct - 100.0).abs() < 0.05, "{}", pct);
    }

    #[test]
    fn daypart_boundaries() {
        assert_eq!(daypart_for(5), "Late Night (21+)");
        assert_eq!(daypart_for(6), "Morning (6-11)");
        assert_eq!(daypart_for(11), "Lunch (11-14)");
        assert_eq!(daypart_for(16), "Afternoon (14-17)");
        assert_eq!(daypart_for(20), "Dinner (17-21)");
        assert_eq!(daypart_for(21), "Late Night (21+)");
    }

    #[test]
    fn peak_hours_pick_extremes() {
        let mut conn = test_connection();
        let rows: Vec<HourlyMetric> = [(11, 4, 80.0), (12, 9, 200.0), (18, 12, 150.0), (22, 1, 12.0)]
            .into_iter()
            .map(|(hour, order_count, net_sales)| HourlyMetric {
                location_guid: "loc-1".into(),
                business_date: d(1),
                hour,
                order_count,
                guest_count: order_count,
                net_sales,
                avg_check: net_sales / order_count as f64,
            })
            .collect();
        diesel::insert_into(HM::hourly_metrics).values(&rows).execute(&mut conn).expect("insert");

        let peaks = peak_hours(&mut conn, "loc-1", d(1)).expect("query").found().expect("found");
        assert_eq!(peaks.peak_hour_by_sales.hour, 12);
        assert_eq!(peaks.quietest_hour_by_sales.label, "22:00");
        assert_eq!(peaks.peak_hour_by_orders.hour, 18);

        assert!(!peak_hours(&mut conn, "loc-1", d(2)).expect("query").is_found());
    }

    #[test]
    fn latest_sync_reports_last_attempt() {
        let mut conn = synced_scenario();
        let status = latest_sync(&mut conn, "loc-1").expect("query").found().expect("found");
        assert_eq!(status.business_date, scenario_date());
        assert_eq!(status.order_count, 2);
        assert!(!latest_sync(&mut conn, "loc-2").expect("query").is_found());
    }
}
