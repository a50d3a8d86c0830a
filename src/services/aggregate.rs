//! Rollups for one (location, business date), computed from the normalized
//! raw rows so the stored detail and the aggregates always agree.

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

use crate::db::models::{AmountMap, DailyMetric, HourlyMetric, ItemDailyMetric, ServerDailyMetric};
use crate::services::normalize::{LookupTables, NormalizedDay};
use crate::utils::{hour_in_timezone, ratio_or_zero, round_money};

pub const OVERTIME_MULTIPLIER: f64 = 1.5;
pub const UNCATEGORIZED: &str = "Uncategorized";
pub const OTHER_DINING_OPTION: &str = "Other";
pub const UNKNOWN_SERVER: &str = "Unknown";

/// Highest positive hourly wage per employee.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WageTable(BTreeMap<String, f64>);

impl WageTable {
    pub fn from_jobs<I, S>(jobs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut table = BTreeMap::new();
        for (employee, wage) in jobs {
            if !(wage.is_finite() && wage > 0.0) {
                continue;
            }
            let slot = table.entry(employee.into()).or_insert(wage);
            if wage > *slot {
                *slot = wage;
            }
        }
        WageTable(table)
    }

    pub fn rate(&self, employee_guid: &str) -> Option<f64> {
        self.0.get(employee_guid).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentClass {
    Cash,
    Credit,
    Other,
}

/// Exact `CASH` is cash; any card brand or `CREDIT` substring is credit.
pub fn classify_payment(payment_type: &str) -> PaymentClass {
    let upper = payment_type.trim().to_uppercase();
    if upper == "CASH" {
        PaymentClass::Cash
    } else if ["CREDIT", "VISA", "MASTERCARD", "AMEX"].iter().any(|p| upper.contains(p)) {
        PaymentClass::Credit
    } else {
        PaymentClass::Other
    }
}

pub fn estimated_wage_warning(default_wage: f64) -> String {
    let rate = if default_wage.fract() == 0.0 {
        format!("{:.0}", default_wage)
    } else {
        format!("{:.2}", default_wage)
    };
    format!("Some employees missing wage data; labor cost includes estimates at ${}/hr", rate)
}

#[derive(Debug, Clone, PartialEq)]
pub struct DayRollups {
    pub daily: DailyMetric,
    pub hourly: Vec<HourlyMetric>,
    pub items: Vec<ItemDailyMetric>,
    pub servers: Vec<ServerDailyMetric>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Default)]
struct LaborTotals {
    hours: f64,
    overtime_hours: f64,
    cost: f64,
    estimated: bool,
    employees: BTreeSet<String>,
    hours_by_employee: BTreeMap<String, f64>,
}

fn labor_totals(day: &NormalizedDay, wages: &WageTable, default_wage: f64) -> LaborTotals {
    let mut totals = LaborTotals::default();
    for entry in &day.time_entries {
        let regular = entry.regular_hours;
        let overtime = entry.overtime_hours;
        totals.hours += regular + overtime;
        totals.overtime_hours += overtime;

        let employee = entry.employee_guid.as_deref().filter(|g| !g.is_empty());
        let rate = match employee.and_then(|g| wages.rate(g)) {
            Some(rate) => rate,
            None => {
                totals.estimated = true;
                default_wage
            }
        };
        totals.cost += regular * rate + overtime * rate * OVERTIME_MULTIPLIER;

        if let Some(guid) = employee {
            totals.employees.insert(guid.to_string());
            *totals.hours_by_employee.entry(guid.to_string()).or_insert(0.0) += regular + overtime;
        }
    }
    totals
}

/// Labor cost as a percentage of net sales; 0 on days without positive net.
pub(crate) fn labor_cost_pct(cost: f64, net: f64) -> f64 {
    if net > 0.0 { round_money(cost / net * 100.0) } else { 0.0 }
}

/// Hour bucket of an order: opened time in the location zone, then closed,
/// then paid, then midnight.
fn order_hour(opened: Option<&str>, closed: Option<&str>, paid: Option<&str>, lookups: &LookupTables) -> u32 {
    [opened, closed, paid]
        .into_iter()
        .flatten()
        .find_map(|raw| hour_in_timezone(raw, lookups.timezone))
        .unwrap_or(0)
}

#[derive(Debug, Default)]
struct Bucket {
    orders: i32,
    guests: i32,
    sales: f64,
}

#[derive(Debug, Default)]
struct ItemTotals {
    category: String,
    quantity: f64,
    revenue: f64,
    orders: BTreeSet<String>,
}

#[derive(Debug, Default)]
struct ServerTotals {
    orders: i32,
    checks: i32,
    guests: i32,
    sales: f64,
    tips: f64,
}

/// Compute every rollup for the day plus the warnings labor estimation raised.
pub fn compute_rollups(
    day: &NormalizedDay,
    lookups: &LookupTables,
    wages: &WageTable,
    default_wage: f64,
    date: NaiveDate,
) -> DayRollups {
    let mut gross = 0.0;
    let mut net = 0.0;
    let mut tax = 0.0;
    let mut tips = 0.0;
    let mut guests = 0;
    let mut by_dining_option = AmountMap::new();
    let mut hourly: BTreeMap<u32, Bucket> = BTreeMap::new();
    let mut servers: BTreeMap<String, ServerTotals> = BTreeMap::new();

    for order in &day.orders {
        guests += order.guest_count;
        let dining = order
            .dining_option_guid
            .as_deref()
            .and_then(|g| lookups.dining_option_name(g))
            .unwrap_or(OTHER_DINING_OPTION)
            .to_string();
        let hour = order_hour(
            order.opened_at.as_deref(),
            order.closed_at.as_deref(),
            order.paid_at.as_deref(),
            lookups,
        );
        let bucket = hourly.entry(hour).or_default();
        bucket.orders += 1;
        bucket.guests += order.guest_count;

        let mut server = order
            .server_guid
            .as_deref()
            .filter(|g| !g.is_empty())
            .map(|g| servers.entry(g.to_string()).or_default());
        if let Some(s) = server.as_mut() {
            s.orders += 1;
            s.guests += order.guest_count;
        }

        for check in day.checks_for(&order.guid) {
            gross += check.total_amount;
            net += check.amount;
            tax += check.tax_amount;
            tips += check.tip_amount;
            by_dining_option.add(dining.clone(), check.amount);
            bucket.sales += check.amount;
            if let Some(s) = server.as_mut() {
                s.checks += 1;
                s.sales += check.amount;
                s.tips += check.tip_amount;
            }
        }
    }

    let discounts: f64 = day.discounts.iter().map(|d| d.discount_amount).sum();

    let (mut cash, mut credit, mut other) = (0.0, 0.0, 0.0);
    for payment in &day.payments {
        match classify_payment(&payment.payment_type) {
            PaymentClass::Cash => cash += payment.amount,
            PaymentClass::Credit => credit += payment.amount,
            PaymentClass::Other => other += payment.amount,
        }
    }

    let mut by_category = AmountMap::new();
    let mut items: BTreeMap<String, ItemTotals> = BTreeMap::new();
    for item in day.items.iter().filter(|i| !i.voided && !i.is_modifier) {
        let category = if item.sales_category_name.is_empty() {
            UNCATEGORIZED
        } else {
            item.sales_category_name.as_str()
        };
        by_category.add(category, item.price);

        let totals = items.entry(item.display_name.clone()).or_insert_with(|| ItemTotals {
            category: category.to_string(),
            ..Default::default()
        });
        totals.quantity += item.quantity;
        totals.revenue += item.price;
        totals.orders.insert(item.order_guid.clone());
    }

    let labor = labor_totals(day, wages, default_wage);
    let mut warnings = Vec::new();
    if labor.estimated && labor.hours > 0.0 {
        warnings.push(estimated_wage_warning(default_wage));
    }

    let order_count = day.orders.len() as i32;
    let daily = DailyMetric {
        location_guid: lookups.location_guid.clone(),
        location_name: lookups.location_name.clone(),
        business_date: date,
        gross_sales: round_money(gross),
        net_sales: round_money(net),
        tax_collected: round_money(tax),
        tips_collected: round_money(tips),
        total_discounts: round_money(discounts),
        order_count,
        guest_count: guests,
        avg_check: round_money(ratio_or_zero(net, order_count as f64)),
        avg_guest_spend: round_money(ratio_or_zero(net, guests as f64)),
        labor_hours: round_money(labor.hours),
        labor_cost: round_money(labor.cost),
        labor_cost_pct: labor_cost_pct(labor.cost, net),
        overtime_hours: round_money(labor.overtime_hours),
        sales_per_labor_hour: round_money(ratio_or_zero(net, labor.hours)),
        employee_count: labor.employees.len() as i32,
        cash_payments: round_money(cash),
        credit_payments: round_money(credit),
        other_payments: round_money(other),
        sales_by_category: by_category.rounded(),
        sales_by_dining_option: by_dining_option.rounded(),
        labor_cost_is_estimated: labor.estimated,
    };

    let hourly = hourly
        .into_iter()
        .map(|(hour, b)| HourlyMetric {
            location_guid: lookups.location_guid.clone(),
            business_date: date,
            hour: hour as i32,
            order_count: b.orders,
            guest_count: b.guests,
            net_sales: round_money(b.sales),
            avg_check: round_money(ratio_or_zero(b.sales, b.orders as f64)),
        })
        .collect();

    let items = items
        .into_iter()
        .map(|(name, t)| ItemDailyMetric {
            location_guid: lookups.location_guid.clone(),
            business_date: date,
            display_name: name,
            sales_category_name: t.category,
            quantity_sold: round_money(t.quantity),
            revenue: round_money(t.revenue),
            avg_price: round_money(ratio_or_zero(t.revenue, t.quantity)),
            order_count: t.orders.len() as i32,
        })
        .collect();

    let servers = servers
        .into_iter()
        .map(|(guid, s)| {
            let hours = labor.hours_by_employee.get(&guid).copied().unwrap_or(0.0);
            ServerDailyMetric {
                location_guid: lookups.location_guid.clone(),
                business_date: date,
                server_name: lookups.employee_name(&guid).unwrap_or(UNKNOWN_SERVER).to_string(),
                server_guid: guid,
                order_count: s.orders,
                check_count: s.checks,
                guest_count: s.guests,
                net_sales: round_money(s.sales),
                tips: round_money(s.tips),
                avg_check: round_money(ratio_or_zero(s.sales, s.checks as f64)),
                sales_per_hour: round_money(ratio_or_zero(s.sales, hours)),
                hours_worked: round_money(hours),
            }
        })
        .collect();

    DayRollups {
        daily,
        hourly,
        items,
        servers,
        warnings,
    }
}
