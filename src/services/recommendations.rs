//! Rule-based recommendations over daily rollups.

use serde::Serialize;

use crate::db::models::DailyMetric;
use crate::utils::{pct_change, ratio_or_zero};

/// Rule thresholds. Defaults are the operating targets; each can be
/// overridden from the environment (see `config`).
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    pub labor_cost_warning_pct: f64,
    pub labor_cost_critical_pct: f64,
    pub overtime_critical_hours: f64,
    pub discount_warning_pct: f64,
    pub splh_target: f64,
    pub cost_spike_warning_pct: f64,
    pub avg_check_decline_pct: f64,
    pub revenue_decline_pct: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            labor_cost_warning_pct: 35.0,
            labor_cost_critical_pct: 40.0,
            overtime_critical_hours: 8.0,
            discount_warning_pct: 5.0,
            splh_target: 40.0,
            cost_spike_warning_pct: 30.0,
            avg_check_decline_pct: -10.0,
            revenue_decline_pct: -15.0,
        }
    }
}

/// Declaration order is the sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Revenue,
    Labor,
    Operations,
    Costs,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub id: &'static str,
    pub category: Category,
    pub severity: Severity,
    pub title: String,
    pub body: String,
    pub metric: &'static str,
    pub value: f64,
    pub threshold: f64,
}

/// Comparison inputs for the period-over-period rules.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Comparison {
    pub avg_check: f64,
    pub sales_delta_pct: f64,
}

impl Comparison {
    pub fn between(current: &DailyMetric, previous: &DailyMetric) -> Self {
        Comparison {
            avg_check: previous.avg_check,
            sales_delta_pct: pct_change(current.net_sales, previous.net_sales).unwrap_or(0.0),
        }
    }
}

fn labor_cost(pct: f64, t: &Thresholds) -> Option<Recommendation> {
    if pct == 0.0 {
        return None;
    }
    let (severity, title, body, threshold) = if pct > t.labor_cost_critical_pct {
        (
            Severity::Critical,
            "Labor cost is critically high",
            format!(
                "Labor is running at {:.1}% of net sales, well above the {}% target. Review scheduling and consider cutting hours during slow dayparts.",
                pct, t.labor_cost_warning_pct
            ),
            t.labor_cost_critical_pct,
        )
    } else if pct > t.labor_cost_warning_pct {
        (
            Severity::Warning,
            "Labor cost is above target",
            format!(
                "Labor is at {:.1}% of net sales, above the {}% target. Monitor closely and adjust staffing if the trend continues.",
                pct, t.labor_cost_warning_pct
            ),
            t.labor_cost_warning_pct,
        )
    } else {
        return None;
    };
    Some(Recommendation {
        id: "high-labor-cost",
        category: Category::Labor,
        severity,
        title: title.to_string(),
        body,
        metric: "laborCostPct",
        value: pct,
        threshold,
    })
}

fn avg_check_decline(avg_check: f64, comparison: Option<&Comparison>, t: &Thresholds) -> Option<Recommendation> {
    let previous = comparison.map(|c| c.avg_check).filter(|v| *v != 0.0)?;
    if avg_check == 0.0 {
        return None;
    }
    let delta = pct_change(avg_check, previous)?;
    if delta >= t.avg_check_decline_pct {
        return None;
    }
    Some(Recommendation {
        id: "low-avg-check",
        category: Category::Revenue,
        severity: Severity::Warning,
        title: "Average check is declining".to_string(),
        body: format!(
            "Average check dropped {:.1}% compared to the prior period (${:.2} vs ${:.2}). Consider upselling strategies or menu adjustments.",
            delta.abs(),
            avg_check,
            previous
        ),
        metric: "avgCheck",
        value: delta,
        threshold: t.avg_check_decline_pct,
    })
}

fn overtime(hours: f64, t: &Thresholds) -> Option<Recommendation> {
    if hours <= 0.0 {
        return None;
    }
    let critical = hours > t.overtime_critical_hours;
    Some(Recommendation {
        id: "overtime-detected",
        category: Category::Labor,
        severity: if critical { Severity::Critical } else { Severity::Warning },
        title: if critical { "Significant overtime detected" } else { "Overtime hours logged" }.to_string(),
        body: if critical {
            format!(
                "{:.1} overtime hours were logged. At 1.5x pay, this significantly impacts labor cost. Review schedules to prevent recurring overtime.",
                hours
            )
        } else {
            format!(
                "{:.1} overtime hours were recorded. Monitor to ensure this doesn't become a pattern.",
                hours
            )
        },
        metric: "overtimeHours",
        value: hours,
        threshold: if critical { t.overtime_critical_hours } else { 0.0 },
    })
}

fn revenue_decline(comparison: Option<&Comparison>, t: &Thresholds) -> Option<Recommendation> {
    let delta = comparison.map(|c| c.sales_delta_pct).filter(|d| *d != 0.0)?;
    if delta >= t.revenue_decline_pct {
        return None;
    }
    Some(Recommendation {
        id: "revenue-decline",
        category: Category::Revenue,
        severity: Severity::Critical,
        title: "Significant revenue decline".to_string(),
        body: format!(
            "Revenue dropped {:.1}% compared to the prior period. Investigate whether this is due to traffic, check size, or external factors.",
            delta.abs()
        ),
        metric: "salesDeltaPct",
        value: delta,
        threshold: t.revenue_decline_pct,
    })
}

fn low_splh(splh: f64, t: &Thresholds) -> Option<Recommendation> {
    if splh == 0.0 || splh >= t.splh_target {
        return None;
    }
    Some(Recommendation {
        id: "low-splh",
        category: Category::Labor,
        severity: Severity::Warning,
        title: "Low sales per labor hour".to_string(),
        body: format!(
            "SPLH is ${:.2}, below the ${} target. Either sales need to increase or labor hours should be reduced during slow periods.",
            splh, t.splh_target
        ),
        metric: "salesPerLaborHour",
        value: splh,
        threshold: t.splh_target,
    })
}

fn high_discounts(discounts: f64, gross: f64, t: &Thresholds) -> Option<Recommendation> {
    if discounts == 0.0 || gross == 0.0 {
        return None;
    }
    let pct = ratio_or_zero(discounts, gross) * 100.0;
    if pct <= t.discount_warning_pct {
        return None;
    }
    Some(Recommendation {
        id: "high-discounts",
        category: Category::Operations,
        severity: Severity::Warning,
        title: "High discount rate".to_string(),
        body: format!(
            "Discounts represent {:.1}% of gross sales (${:.2}). Review discount policies and track which discounts are being used most.",
            pct, discounts
        ),
        metric: "discountPct",
        value: pct,
        threshold: t.discount_warning_pct,
    })
}

fn estimated_labor(metric: &DailyMetric) -> Option<Recommendation> {
    if !metric.labor_cost_is_estimated || metric.labor_hours == 0.0 {
        return None;
    }
    Some(Recommendation {
        id: "estimated-labor-cost",
        category: Category::Labor,
        severity: Severity::Info,
        title: "Labor cost includes estimates".to_string(),
        body: "Some employees have no wage on file, so part of the labor cost uses the default hourly rate. Add wages in the POS for exact figures.".to_string(),
        metric: "laborCost",
        value: metric.labor_cost,
        threshold: 0.0,
    })
}

fn sorted(mut found: Vec<Recommendation>) -> Vec<Recommendation> {
    found.sort_by_key(|r| r.severity);
    found
}

/// Evaluate every sales and labor rule against one day's rollup.
pub fn evaluate(metric: &DailyMetric, comparison: Option<&Comparison>, t: &Thresholds) -> Vec<Recommendation> {
    sorted(
        [
            labor_cost(metric.labor_cost_pct, t),
            avg_check_decline(metric.avg_check, comparison, t),
            overtime(metric.overtime_hours, t),
            revenue_decline(comparison, t),
            low_splh(metric.sales_per_labor_hour, t),
            high_discounts(metric.total_discounts, metric.gross_sales, t),
            estimated_labor(metric),
        ]
        .into_iter()
        .flatten()
        .collect(),
    )
}

/// Cost-side rules: a day's invoice spend against the prior cost day.
pub fn evaluate_cost(daily_cost: f64, prior_cost: Option<f64>, t: &Thresholds) -> Vec<Recommendation> {
    let mut found = Vec::new();
    if let Some(prior) = prior_cost.filter(|p| *p > 0.0)
        && let Some(delta) = pct_change(daily_cost, prior)
        && delta > t.cost_spike_warning_pct
    {
        found.push(Recommendation {
            id: "cost-spike",
            category: Category::Costs,
            severity: Severity::Warning,
            title: "Daily cost spike".to_string(),
            body: format!(
                "Invoice spend of ${:.2} is {:.1}% above the prior cost day (${:.2}). Check for bulk orders, price increases or duplicate invoices.",
                daily_cost, delta, prior
            ),
            metric: "dailyCostDeltaPct",
            value: delta,
            threshold: t.cost_spike_warning_pct,
        });
    }
    sorted(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::AmountMap;
    use chrono::NaiveDate;

    fn metric() -> DailyMetric {
        DailyMetric {
            location_guid: "loc-1".into(),
            location_name: "Downtown".into(),
            business_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            gross_sales: 129.6,
            net_sales: 120.0,
            tax_collected: 9.6,
            tips_collected: 18.0,
            total_discounts: 5.0,
            order_count: 2,
            guest_count: 5,
            avg_check: 60.0,
            avg_guest_spend: 24.0,
            labor_hours: 9.0,
            labor_cost: 142.5,
            labor_cost_pct: 118.75,
            overtime_hours: 1.0,
            sales_per_labor_hour: 13.33,
            employee_count: 1,
            cash_payments: 54.0,
            credit_payments: 75.6,
            other_payments: 0.0,
            sales_by_category: AmountMap::new(),
            sales_by_dining_option: AmountMap::new(),
            labor_cost_is_estimated: true,
        }
    }

    #[test]
    fn scenario_day_flags_critical_labor_first() {
        let recs = evaluate(&metric(), None, &Thresholds::default());
        assert_eq!(recs[0].id, "high-labor-cost");
        assert_eq!(recs[0].severity, Severity::Critical);
        assert_eq!(recs[0].threshold, 40.0);
        let ids: Vec<&str> = recs.iter().map(|r| r.id).collect();
        assert!(ids.contains(&"overtime-detected"));
        assert!(ids.contains(&"low-splh"));
        assert!(!ids.contains(&"high-discounts"), "5/129.6 is under 5%");
        assert!(recs.windows(2).all(|w| w[0].severity <= w[1].severity));
        assert_eq!(recs.last().map(|r| r.severity), Some(Severity::Info));
    }

    #[test]
    fn comparison_rules_need_a_prior_period() {
        let mut previous = metric();
        previous.net_sales = 200.0;
        previous.avg_check = 80.0;
        let current = metric();
        let cmp = Comparison::between(&current, &previous);
        assert_eq!(cmp.sales_delta_pct, -40.0);

        let recs = evaluate(&current, Some(&cmp), &Thresholds::default());
        let decline = recs.iter().find(|r| r.id == "revenue-decline").expect("decline");
        assert_eq!(decline.severity, Severity::Critical);
        let check = recs.iter().find(|r| r.id == "low-avg-check").expect("avg check");
        assert_eq!(check.value, -25.0);
    }

    #[test]
    fn thresholds_are_overridable() {
        let mut day = metric();
        day.labor_cost_pct = 37.0;
        day.overtime_hours = 0.0;
        day.sales_per_labor_hour = 0.0;
        day.labor_cost_is_estimated = false;
        let recs = evaluate(&day, None, &Thresholds::default());
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].severity, Severity::Warning);

        let relaxed = Thresholds {
            labor_cost_warning_pct: 38.0,
            ..Default::default()
        };
        assert!(evaluate(&day, None, &relaxed).is_empty());
    }

    #[test]
    fn cost_spike_against_prior_day() {
        let t = Thresholds::default();
        assert_eq!(evaluate_cost(140.0, Some(100.0), &t)[0].id, "cost-spike");
        assert!(evaluate_cost(120.0, Some(100.0), &t).is_empty());
        assert!(evaluate_cost(500.0, None, &t).is_empty());
        assert!(evaluate_cost(500.0, Some(0.0), &t).is_empty());
    }

    #[test]
    fn severity_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Severity::Critical).expect("json"), "\"critical\"");
    }
}
