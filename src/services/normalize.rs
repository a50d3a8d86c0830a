//! Flattening of nested POS payloads into the raw row sets stored per
//! (location, business date).
//!
//! Nothing here touches the network or the store; name resolution goes
//! through [`LookupTables`] built once per sync.

use chrono::NaiveDate;
use chrono_tz::Tz;
use log::debug;
use std::collections::{BTreeMap, BTreeSet};

use crate::db::models::{CheckRow, NewDiscount, NewOrderItem, OrderRow, PaymentRow, TimeEntryRow};
use crate::models::pos::{ref_guid, Check, Order, Selection, TimeEntry};

pub const UNKNOWN_ITEM: &str = "Unknown Item";

/// Name lookups for one location, resolved before normalization.
#[derive(Debug, Clone)]
pub struct LookupTables {
    pub location_guid: String,
    pub location_name: String,
    pub timezone: Tz,
    /// sales category guid -> name
    pub categories: BTreeMap<String, String>,
    /// dining option guid -> name
    pub dining_options: BTreeMap<String, String>,
    /// employee guid -> full name
    pub employee_names: BTreeMap<String, String>,
}

impl LookupTables {
    pub fn new(location_guid: &str, location_name: &str, timezone: Tz) -> Self {
        LookupTables {
            location_guid: location_guid.to_string(),
            location_name: location_name.to_string(),
            timezone,
            categories: BTreeMap::new(),
            dining_options: BTreeMap::new(),
            employee_names: BTreeMap::new(),
        }
    }

    pub fn category_name(&self, guid: &str) -> Option<&str> {
        self.categories.get(guid).map(String::as_str).filter(|n| !n.is_empty())
    }

    pub fn dining_option_name(&self, guid: &str) -> Option<&str> {
        self.dining_options.get(guid).map(String::as_str).filter(|n| !n.is_empty())
    }

    pub fn employee_name(&self, guid: &str) -> Option<&str> {
        self.employee_names.get(guid).map(String::as_str).filter(|n| !n.is_empty())
    }
}

/// Every raw row written for one (location, business date).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedDay {
    pub orders: Vec<OrderRow>,
    pub checks: Vec<CheckRow>,
    pub items: Vec<NewOrderItem>,
    pub payments: Vec<PaymentRow>,
    pub discounts: Vec<NewDiscount>,
    pub time_entries: Vec<TimeEntryRow>,
}

impl NormalizedDay {
    pub fn checks_for<'a>(&'a self, order_guid: &'a str) -> impl Iterator<Item = &'a CheckRow> + 'a {
        self.checks.iter().filter(move |c| c.order_guid == order_guid)
    }
}

/// Flatten a day's orders and time entries.
///
/// Voided or deleted orders and checks are dropped entirely. Voided
/// selections are kept with `voided = true`. Repeated guids (an order echoed
/// on two pages, say) keep their first occurrence.
pub fn normalize_day(orders: &[Order], time_entries: &[TimeEntry], lookups: &LookupTables, date: NaiveDate) -> NormalizedDay {
    let mut day = NormalizedDay::default();
    let mut seen_orders = BTreeSet::new();
    let mut seen_checks = BTreeSet::new();
    let mut seen_payments = BTreeSet::new();

    for order in orders {
        if order.is_excluded() {
            continue;
        }
        if order.guid.is_empty() || !seen_orders.insert(order.guid.clone()) {
            debug!("Skipping duplicate or anonymous order {:?}", order.guid);
            continue;
        }
        day.orders.push(order_row(order, lookups, date));

        for check in order.checks.as_deref().unwrap_or_default() {
            if check.is_excluded() {
                continue;
            }
            if check.guid.is_empty() || !seen_checks.insert(check.guid.clone()) {
                debug!("Skipping duplicate or anonymous check {:?} on order {}", check.guid, order.guid);
                continue;
            }
            day.checks.push(check_row(check, &order.guid, lookups, date));

            let ctx = RowContext {
                order_guid: &order.guid,
                check_guid: &check.guid,
                lookups,
                date,
            };
            flatten_selections(check.selections.as_deref().unwrap_or_default(), &ctx, false, &mut day.items);

            for (index, payment) in check.payments.as_deref().unwrap_or_default().iter().enumerate() {
                let guid = if payment.guid.is_empty() {
                    format!("{}-payment-{}", check.guid, index)
                } else {
                    payment.guid.clone()
                };
                if !seen_payments.insert(guid.clone()) {
                    continue;
                }
                day.payments.push(PaymentRow {
                    guid,
                    check_guid: check.guid.clone(),
                    order_guid: order.guid.clone(),
                    location_guid: lookups.location_guid.clone(),
                    business_date: date,
                    payment_type: payment.payment_type.clone().unwrap_or_default(),
                    amount: payment.amount.unwrap_or(0.0),
                    tip_amount: payment.tip_amount.unwrap_or(0.0),
                    payment_status: payment.payment_status.clone().unwrap_or_default(),
                    refund_status: payment.refund_status.clone().unwrap_or_default(),
                });
            }

            for discount in check.applied_discounts.as_deref().unwrap_or_default() {
                day.discounts.push(NewDiscount {
                    check_guid: check.guid.clone(),
                    order_guid: order.guid.clone(),
                    location_guid: lookups.location_guid.clone(),
                    business_date: date,
                    name: discount.name.clone().unwrap_or_default(),
                    discount_amount: discount.discount_amount.unwrap_or(0.0),
                    discount_percent: discount.discount_percent.unwrap_or(0.0),
                });
            }
        }
    }

    let mut seen_entries = BTreeSet::new();
    for entry in time_entries {
        if entry.guid.is_empty() || !seen_entries.insert(entry.guid.clone()) {
            continue;
        }
        day.time_entries.push(time_entry_row(entry, lookups, date));
    }

    day
}

fn order_row(order: &Order, lookups: &LookupTables, date: NaiveDate) -> OrderRow {
    OrderRow {
        guid: order.guid.clone(),
        location_guid: lookups.location_guid.clone(),
        business_date: date,
        server_guid: ref_guid(&order.server).map(str::to_string),
        dining_option_guid: ref_guid(&order.dining_option).map(str::to_string),
        revenue_center_guid: ref_guid(&order.revenue_center).map(str::to_string),
        opened_at: order.opened_date.clone(),
        closed_at: order.closed_date.clone(),
        paid_at: order.paid_date.clone(),
        voided: false,
        deleted: false,
        guest_count: order.number_of_guests.unwrap_or(0).max(0),
        approval_status: order.approval_status.clone(),
    }
}

fn check_row(check: &Check, order_guid: &str, lookups: &LookupTables, date: NaiveDate) -> CheckRow {
    CheckRow {
        guid: check.guid.clone(),
        order_guid: order_guid.to_string(),
        location_guid: lookups.location_guid.clone(),
        business_date: date,
        payment_status: check.payment_status.clone().unwrap_or_default(),
        amount: check.amount.unwrap_or(0.0),
        tax_amount: check.tax_amount.unwrap_or(0.0),
        total_amount: check.total_amount.unwrap_or(0.0),
        tip_amount: check.tip_amount.unwrap_or(0.0),
        voided: false,
        deleted: false,
    }
}

fn time_entry_row(entry: &TimeEntry, lookups: &LookupTables, date: NaiveDate) -> TimeEntryRow {
    TimeEntryRow {
        guid: entry.guid.clone(),
        location_guid: lookups.location_guid.clone(),
        business_date: date,
        employee_guid: ref_guid(&entry.employee_reference).map(str::to_string),
        job_guid: ref_guid(&entry.job_reference).map(str::to_string),
        in_date: entry.in_date.clone(),
        out_date: entry.out_date.clone(),
        regular_hours: entry.regular_hours.unwrap_or(0.0),
        overtime_hours: entry.overtime_hours.unwrap_or(0.0),
        cash_sales: entry.cash_sales.unwrap_or(0.0),
        non_cash_sales: entry.non_cash_sales.unwrap_or(0.0),
        cash_tips: entry.cash_gratuity_service_charges.unwrap_or(0.0),
        non_cash_tips: entry.non_cash_gratuity_service_charges.unwrap_or(0.0),
        declared_cash_tips: entry.declared_cash_tips.unwrap_or(0.0),
    }
}

struct RowContext<'a> {
    order_guid: &'a str,
    check_guid: &'a str,
    lookups: &'a LookupTables,
    date: NaiveDate,
}

fn flatten_selections(selections: &[Selection], ctx: &RowContext<'_>, is_modifier: bool, out: &mut Vec<NewOrderItem>) {
    for sel in selections {
        let category_guid = ref_guid(&sel.sales_category).unwrap_or_default();
        let display_name = sel
            .display_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(UNKNOWN_ITEM);
        out.push(NewOrderItem {
            order_guid: ctx.order_guid.to_string(),
            check_guid: ctx.check_guid.to_string(),
            location_guid: ctx.lookups.location_guid.clone(),
            business_date: ctx.date,
            selection_guid: sel.guid.clone(),
            display_name: display_name.to_string(),
            item_guid: ref_guid(&sel.item).unwrap_or_default().to_string(),
            sales_category_guid: category_guid.to_string(),
            sales_category_name: ctx.lookups.category_name(category_guid).unwrap_or_default().to_string(),
            quantity: sel.quantity.unwrap_or(1.0),
            price: sel.price.unwrap_or(0.0),
            pre_discount_price: sel.pre_discount_price.unwrap_or(0.0),
            tax: sel.tax.unwrap_or(0.0),
            voided: sel.voided.unwrap_or(false),
            is_modifier,
        });
        if let Some(modifiers) = sel.modifiers.as_deref() {
            flatten_selections(modifiers, ctx, true, out);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::pos::EntityRef;

    pub(crate) fn scenario_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    pub(crate) fn load_orders_fixture() -> Vec<Order> {
        let json = std::fs::read_to_string("tests/data/orders-bulk.json").expect("fixture present");
        serde_json::from_str(&json).expect("parse orders")
    }

    pub(crate) fn scenario_lookups() -> LookupTables {
        let mut lookups = LookupTables::new("loc-1", "Downtown", chrono_tz::America::New_York);
        lookups.categories.insert("cat-food".into(), "Food".into());
        lookups.categories.insert("cat-wine".into(), "Wine".into());
        lookups.dining_options.insert("dine-in".into(), "Dine In".into());
        lookups.employee_names.insert("emp-1".into(), "Ana Novak".into());
        lookups
    }

    /// One shift of 8 regular and 1 overtime hour for an employee with no wage on file.
    pub(crate) fn scenario_time_entries() -> Vec<TimeEntry> {
        vec![TimeEntry {
            guid: "te-1".into(),
            employee_reference: Some(EntityRef::new("emp-9")),
            job_reference: Some(EntityRef::new("job-line")),
            in_date: Some("2024-03-01T14:00:00.000+0000".into()),
            out_date: Some("2024-03-02T00:00:00.000+0000".into()),
            regular_hours: Some(8.0),
            overtime_hours: Some(1.0),
            ..Default::default()
        }]
    }

    #[test]
    fn voided_orders_are_dropped_and_voided_selections_kept() {
        let day = normalize_day(&load_orders_fixture(), &[], &scenario_lookups(), scenario_date());
        assert_eq!(day.orders.len(), 2);
        assert_eq!(day.checks.len(), 2);
        assert!(day.orders.iter().all(|o| o.guid != "order-3"));
        assert!(day.payments.iter().all(|p| p.guid != "pay-3"));

        let fries = day.items.iter().find(|i| i.display_name == "Fries").expect("fries row");
        assert!(fries.voided);
        assert_eq!(day.items.len(), 6);
    }

    #[test]
    fn modifiers_are_flattened_after_their_parent() {
        let day = normalize_day(&load_orders_fixture(), &[], &scenario_lookups(), scenario_date());
        let names: Vec<(&str, bool)> = day
            .items
            .iter()
            .filter(|i| i.check_guid == "check-1")
            .map(|i| (i.display_name.as_str(), i.is_modifier))
            .collect();
        assert_eq!(names, vec![("Burger", false), ("Bacon", true), ("House Red", false)]);
    }

    #[test]
    fn missing_fields_get_defaults() {
        let day = normalize_day(&load_orders_fixture(), &[], &scenario_lookups(), scenario_date());
        let anonymous = day.items.iter().find(|i| i.selection_guid == "sel-5").expect("sel-5");
        assert_eq!(anonymous.display_name, UNKNOWN_ITEM);
        assert_eq!(anonymous.quantity, 1.0);
        assert_eq!(anonymous.sales_category_name, "");

        let order_two = day.orders.iter().find(|o| o.guid == "order-2").expect("order-2");
        assert_eq!(order_two.dining_option_guid, None);
        assert_eq!(order_two.paid_at, None);
        assert_eq!(day.discounts.len(), 1);
        assert_eq!(day.discounts[0].name, "Happy Hour");
    }

    #[test]
    fn duplicate_orders_keep_first_occurrence() {
        let mut orders = load_orders_fixture();
        orders.push(orders[0].clone());
        let day = normalize_day(&orders, &scenario_time_entries(), &scenario_lookups(), scenario_date());
        assert_eq!(day.orders.len(), 2);
        assert_eq!(day.payments.len(), 2);
        assert_eq!(day.time_entries.len(), 1);
        assert_eq!(day.time_entries[0].employee_guid.as_deref(), Some("emp-9"));
    }
}
