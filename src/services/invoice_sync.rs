//! Invoicing sync by created-date range and the per-date cost rollup.
//!
//! Order details are fetched before the transaction opens. Inside it every
//! order is upserted with its line items replaced wholesale, and each invoice
//! date touched (old or new) has its `daily_costs` row rebuilt.

use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use diesel::SqliteConnection;
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};

use crate::client::invoicing::InvoicingApi;
use crate::db::models::{
    self as dbm, sync_status, sync_type, AmountMap, DailyCost, InvoiceOrder, NewInvoiceLineItem, NewInvoiceSyncLog,
    WarningList,
};
use crate::models::invoicing::{OrderDetail, OrderStatus, OrderSummary};
use crate::schema;
use crate::services::refs;
use crate::utils::{normalize_invoice_date, normalize_source_date, round_money, SyncError};

pub const UNKNOWN_VENDOR: &str = "Unknown Vendor";
pub const UNCATEGORIZED: &str = "Uncategorized";
/// Order total not covered by line items (tax, delivery, rounding).
pub const UNALLOCATED: &str = "Unallocated";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvoiceSyncSummary {
    pub order_count: usize,
    pub affected_dates: BTreeSet<NaiveDate>,
    pub warnings: WarningList,
}

/// Fetch and store every restaurant unit the API key can see.
pub fn sync_units(conn: &mut SqliteConnection, api: &dyn InvoicingApi) -> Result<Vec<dbm::InvoiceUnit>, SyncError> {
    use schema::invoice_units::dsl as U;

    let units = api.restaurant_units()?;
    refs::upsert_invoice_units(conn, &units)?;
    let rows = U::invoice_units
        .order(U::name.asc())
        .select(dbm::InvoiceUnit::as_select())
        .load(conn)?;
    info!("Invoicing: {} restaurant unit(s) known", rows.len());
    Ok(rows)
}

/// Refresh categories and vendors for a unit.
pub fn sync_ref_data(conn: &mut SqliteConnection, api: &dyn InvoicingApi, unit_id: &str) -> Result<usize, SyncError> {
    let categories = api.categories(unit_id)?;
    let vendors = api.vendors(unit_id)?;

    let written = conn.transaction::<_, SyncError, _>(|conn| {
        let written = refs::upsert_invoice_categories(conn, unit_id, &categories)?
            + refs::upsert_invoice_vendors(conn, unit_id, &vendors)?;
        write_sync_log(conn, unit_id, sync_type::REF_DATA, None, written, &WarningList::default())?;
        Ok(written)
    })?;
    info!(
        "Invoicing: unit {} reference data synced ({} categories, {} vendors)",
        unit_id,
        categories.len(),
        vendors.len()
    );
    Ok(written)
}

/// Sync invoices created between `start` and `end` (inclusive).
pub fn sync_orders(
    conn: &mut SqliteConnection,
    api: &dyn InvoicingApi,
    unit_id: &str,
    start: NaiveDate,
    end: NaiveDate,
    status: Option<OrderStatus>,
) -> Result<InvoiceSyncSummary, SyncError> {
    info!("Invoicing: syncing unit {} orders created {} to {}", unit_id, start, end);
    let summaries = api.orders_by_created_range(unit_id, &start.to_string(), &end.to_string(), status)?;

    let mut warnings = WarningList::default();
    let mut fetched = Vec::with_capacity(summaries.len());
    for summary in &summaries {
        let Some(order_id) = summary.order_id.as_deref().filter(|id| !id.is_empty()) else {
            warn!("Invoicing: skipping order summary without id");
            continue;
        };
        match api.order_detail(unit_id, order_id) {
            Ok(detail) => fetched.push(order_rows(unit_id, summary, &detail, end)),
            Err(e) => {
                warn!("Invoicing: order {} detail failed: {}", order_id, e);
                warnings.push(format!("Failed to fetch order detail {}: {}", order_id, e));
            }
        }
    }
    debug!("Invoicing: {} of {} order detail(s) fetched", fetched.len(), summaries.len());

    let affected_dates = conn.transaction::<_, SyncError, _>(|conn| {
        let mut affected = BTreeSet::new();
        for (order, lines) in &fetched {
            if let Some(previous) = previous_invoice_date(conn, unit_id, &order.order_id)? {
                affected.insert(previous);
            }
            affected.insert(order.invoice_date);
            replace_order(conn, order, lines)?;
        }
        write_sync_log(conn, unit_id, sync_type::ORDERS, Some((start, end)), fetched.len(), &warnings)?;
        for date in &affected {
            recompute_daily_costs(conn, unit_id, *date)?;
        }
        Ok(affected)
    })?;

    info!(
        "Invoicing: unit {} stored {} order(s), recomputed {} date(s), status {}",
        unit_id,
        fetched.len(),
        affected_dates.len(),
        warnings.status()
    );
    Ok(InvoiceSyncSummary {
        order_count: fetched.len(),
        affected_dates,
        warnings,
    })
}

/// Log a failed invoicing sync without touching stored data.
pub fn record_failure(
    conn: &mut SqliteConnection,
    unit_id: &str,
    kind: &str,
    range: Option<(NaiveDate, NaiveDate)>,
    message: &str,
) -> QueryResult<usize> {
    let mut warnings = WarningList::default();
    warnings.push(message);
    let row = NewInvoiceSyncLog {
        restaurant_unit_id: unit_id.to_string(),
        sync_type: kind.to_string(),
        start_date: range.map(|r| r.0),
        end_date: range.map(|r| r.1),
        synced_at: Utc::now().naive_utc(),
        record_count: 0,
        status: sync_status::ERROR.to_string(),
        warnings,
    };
    diesel::insert_into(schema::invoice_sync_log::table).values(&row).execute(conn)
}

fn write_sync_log(
    conn: &mut SqliteConnection,
    unit_id: &str,
    kind: &str,
    range: Option<(NaiveDate, NaiveDate)>,
    record_count: usize,
    warnings: &WarningList,
) -> QueryResult<usize> {
    let row = NewInvoiceSyncLog {
        restaurant_unit_id: unit_id.to_string(),
        sync_type: kind.to_string(),
        start_date: range.map(|r| r.0),
        end_date: range.map(|r| r.1),
        synced_at: Utc::now().naive_utc(),
        record_count: record_count as i32,
        status: warnings.status().to_string(),
        warnings: warnings.clone(),
    };
    diesel::insert_into(schema::invoice_sync_log::table).values(&row).execute(conn)
}

/// Credit memos are stored negative whatever sign the source used.
fn signed(amount: f64, is_credit: bool) -> f64 {
    if is_credit { -amount.abs() } else { amount }
}

fn non_empty(values: &[Option<&String>]) -> String {
    values
        .iter()
        .flatten()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
        .unwrap_or_default()
        .to_string()
}

/// Storable order and line rows, detail fields winning over the summary.
fn order_rows(
    unit_id: &str,
    summary: &OrderSummary,
    detail: &OrderDetail,
    range_end: NaiveDate,
) -> (InvoiceOrder, Vec<NewInvoiceLineItem>) {
    let order_id = non_empty(&[detail.order_id.as_ref(), summary.order_id.as_ref()]);
    let is_credit = detail.is_credit.unwrap_or(false);
    let raw_invoice_date = detail.invoice_date.as_deref().or(summary.invoice_date.as_deref());
    let raw_created_date = detail.created_date.as_deref().or(summary.created_date.as_deref());
    let invoice_date = normalize_invoice_date(raw_invoice_date, raw_created_date, range_end);

    let order = InvoiceOrder {
        order_id: order_id.clone(),
        restaurant_unit_id: unit_id.to_string(),
        invoice_number: non_empty(&[detail.invoice_number.as_ref(), summary.invoice_number.as_ref()]),
        invoice_date,
        created_date: normalize_source_date(raw_created_date).unwrap_or(invoice_date),
        vendor_id: non_empty(&[detail.vendor_id.as_ref(), summary.vendor_id.as_ref()]),
        vendor_name: non_empty(&[detail.vendor_name.as_ref(), summary.vendor_name.as_ref()]),
        order_total: signed(detail.order_total.or(summary.order_total).unwrap_or(0.0), is_credit),
        tax: detail.tax.unwrap_or(0.0),
        delivery_charges: detail.delivery_charges.unwrap_or(0.0),
        other_charges: detail.other_charges.unwrap_or(0.0),
        credit_amount: detail.credit_amount.unwrap_or(0.0),
        is_credit,
        status: non_empty(&[detail.status.as_ref(), summary.status.as_ref()]).to_uppercase(),
    };

    let lines = detail
        .line_items
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(|line| NewInvoiceLineItem {
            order_id: order_id.clone(),
            restaurant_unit_id: unit_id.to_string(),
            vendor_item_code: line.vendor_item_code.clone(),
            vendor_item_name: line.vendor_item_name.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price,
            line_price: signed(line.line_price.unwrap_or(0.0), is_credit),
            category_id: line.category_id.clone().filter(|c| !c.is_empty()),
            packaging_id: line.packaging_id.clone(),
            company_concept_product_id: line.company_concept_product_id.clone(),
        })
        .collect();
    (order, lines)
}

fn previous_invoice_date(conn: &mut SqliteConnection, unit_id: &str, order_id: &str) -> QueryResult<Option<NaiveDate>> {
    use schema::invoice_orders::dsl as IO;

    IO::invoice_orders
        .filter(IO::restaurant_unit_id.eq(unit_id).and(IO::order_id.eq(order_id)))
        .select(IO::invoice_date)
        .first(conn)
        .optional()
}

fn replace_order(conn: &mut SqliteConnection, order: &InvoiceOrder, lines: &[NewInvoiceLineItem]) -> QueryResult<()> {
    use schema::invoice_line_items::dsl as LI;
    use schema::invoice_orders::dsl as IO;

    diesel::insert_into(IO::invoice_orders)
        .values(order)
        .on_conflict((IO::order_id, IO::restaurant_unit_id))
        .do_update()
        .set((
            IO::invoice_number.eq(order.invoice_number.clone()),
            IO::invoice_date.eq(order.invoice_date),
            IO::created_date.eq(order.created_date),
            IO::vendor_id.eq(order.vendor_id.clone()),
            IO::vendor_name.eq(order.vendor_name.clone()),
            IO::order_total.eq(order.order_total),
            IO::tax.eq(order.tax),
            IO::delivery_charges.eq(order.delivery_charges),
            IO::other_charges.eq(order.other_charges),
            IO::credit_amount.eq(order.credit_amount),
            IO::is_credit.eq(order.is_credit),
            IO::status.eq(order.status.clone()),
        ))
        .execute(conn)?;

    diesel::delete(
        LI::invoice_line_items.filter(
            LI::order_id
                .eq(&order.order_id)
                .and(LI::restaurant_unit_id.eq(&order.restaurant_unit_id)),
        ),
    )
    .execute(conn)?;
    if !lines.is_empty() {
        diesel::insert_into(LI::invoice_line_items).values(lines).execute(conn)?;
    }
    Ok(())
}

/// Rebuild the `daily_costs` row for one invoice date from finalized orders.
///
/// Returns the stored row, or `None` (and no row) when no finalized order
/// carries that date.
pub fn recompute_daily_costs(conn: &mut SqliteConnection, unit_id: &str, date: NaiveDate) -> QueryResult<Option<DailyCost>> {
    use schema::daily_costs::dsl as DC;
    use schema::invoice_categories::dsl as C;
    use schema::invoice_line_items::dsl as LI;
    use schema::invoice_orders::dsl as IO;
    use schema::invoice_vendors::dsl as V;

    diesel::delete(DC::daily_costs.filter(DC::restaurant_unit_id.eq(unit_id).and(DC::invoice_date.eq(date))))
        .execute(conn)?;

    let orders: Vec<InvoiceOrder> = IO::invoice_orders
        .filter(IO::restaurant_unit_id.eq(unit_id))
        .filter(IO::invoice_date.eq(date))
        .filter(IO::status.eq(OrderStatus::FINALIZED.name()))
        .order(IO::order_id.asc())
        .select(InvoiceOrder::as_select())
        .load(conn)?;
    if orders.is_empty() {
        debug!("Invoicing: no finalized orders for unit {} on {}", unit_id, date);
        return Ok(None);
    }

    let vendor_names: BTreeMap<String, String> = V::invoice_vendors
        .filter(V::restaurant_unit_id.eq(unit_id))
        .select((V::vendor_id, V::vendor_name))
        .load::<(String, String)>(conn)?
        .into_iter()
        .collect();

    let order_ids: Vec<&str> = orders.iter().map(|o| o.order_id.as_str()).collect();
    let lines: Vec<(String, Option<String>, Option<String>, f64)> = LI::invoice_line_items
        .left_join(
            C::invoice_categories.on(LI::category_id
                .assume_not_null()
                .eq(C::category_id)
                .and(C::restaurant_unit_id.eq(LI::restaurant_unit_id))),
        )
        .filter(LI::restaurant_unit_id.eq(unit_id))
        .filter(LI::order_id.eq_any(order_ids))
        .order(LI::id.asc())
        .select((LI::order_id, LI::category_id, C::category_name.nullable(), LI::line_price))
        .load(conn)?;

    let mut by_category = AmountMap::new();
    let mut line_totals: BTreeMap<&str, f64> = BTreeMap::new();
    for (order_id, category_id, category_name, price) in &lines {
        let key = [category_name.as_deref(), category_id.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|s| !s.is_empty())
            .unwrap_or(UNCATEGORIZED);
        by_category.add(key, *price);
        *line_totals.entry(order_id.as_str()).or_insert(0.0) += price;
    }

    let mut by_vendor = AmountMap::new();
    let (mut total, mut tax, mut delivery, mut other, mut credits) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for order in &orders {
        total += order.order_total;
        tax += order.tax;
        delivery += order.delivery_charges;
        other += order.other_charges;
        credits += order.credit_amount.abs();
        if order.is_credit && order.credit_amount == 0.0 {
            credits += order.order_total.abs();
        }

        let vendor = [
            vendor_names.get(&order.vendor_id).map(String::as_str),
            Some(order.vendor_name.as_str()),
            Some(order.vendor_id.as_str()),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or(UNKNOWN_VENDOR);
        by_vendor.add(vendor, order.order_total);

        let unallocated = order.order_total - line_totals.get(order.order_id.as_str()).copied().unwrap_or(0.0);
        if unallocated.abs() >= 0.005 {
            by_category.add(UNALLOCATED, unallocated);
        }
    }

    let total_cost = round_money(total);
    let largest_vendor = by_vendor
        .iter()
        .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()).then_with(|| b.0.cmp(a.0)))
        .map(|(k, _)| k.clone())
        .unwrap_or_else(|| UNKNOWN_VENDOR.to_string());

    let row = DailyCost {
        restaurant_unit_id: unit_id.to_string(),
        invoice_date: date,
        total_cost,
        total_tax: round_money(tax),
        total_delivery: round_money(delivery),
        total_other_charges: round_money(other),
        total_credits: round_money(credits),
        invoice_count: orders.len() as i32,
        vendor_count: by_vendor.len() as i32,
        cost_by_category: balanced(&by_category, total_cost, UNALLOCATED),
        cost_by_vendor: balanced(&by_vendor, total_cost, &largest_vendor),
    };
    diesel::insert_into(DC::daily_costs).values(&row).execute(conn)?;
    Ok(Some(row))
}

/// Round every entry to cents, then book the rounding residue on `residual_key`
/// so the stored values add up to `total` exactly.
fn balanced(map: &AmountMap, total: f64, residual_key: &str) -> AmountMap {
    let mut out = map.rounded();
    let residual = round_money(total - out.total());
    if residual != 0.0 {
        out.add(residual_key, residual);
        out = out.rounded();
    }
    out
}
