//! Labor reads: daily labor summary, server leaderboard, overtime and shifts.

use chrono::NaiveDate;
use diesel::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::db::models::{ServerDailyMetric, TimeEntryRow};
use crate::queries::lookup::{Lookup, LookupResult};
use crate::queries::sales::daily_row;
use crate::schema;
use crate::services::pos_sync::employee_display_name;
use crate::services::recommendations::{evaluate, Category, Recommendation, Thresholds};
use crate::utils::round_money;

use schema::employees::dsl as E;
use schema::time_entries::dsl as TE;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaborSummary {
    pub date: NaiveDate,
    pub location_id: String,
    pub labor_hours: f64,
    pub labor_cost: f64,
    pub labor_cost_pct: f64,
    pub overtime_hours: f64,
    pub sales_per_labor_hour: f64,
    pub employee_count: i32,
    pub net_sales: f64,
    pub labor_cost_is_estimated: bool,
    pub recommendations: Vec<Recommendation>,
}

/// Labor side of the daily rollup with the labor rules only.
pub fn labor_summary(
    conn: &mut SqliteConnection,
    location: &str,
    date: NaiveDate,
    thresholds: &Thresholds,
) -> LookupResult<LaborSummary> {
    let Some(row) = daily_row(conn, location, date)? else {
        return Ok(Lookup::no_data(format!("No data found for {}", date)));
    };
    let recommendations = evaluate(&row, None, thresholds)
        .into_iter()
        .filter(|r| r.category == Category::Labor)
        .collect();
    Ok(Lookup::Found(LaborSummary {
        date,
        location_id: row.location_guid,
        labor_hours: row.labor_hours,
        labor_cost: row.labor_cost,
        labor_cost_pct: row.labor_cost_pct,
        overtime_hours: row.overtime_hours,
        sales_per_labor_hour: row.sales_per_labor_hour,
        employee_count: row.employee_count,
        net_sales: row.net_sales,
        labor_cost_is_estimated: row.labor_cost_is_estimated,
        recommendations,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedServer {
    pub rank: usize,
    pub server_guid: String,
    pub name: String,
    pub order_count: i32,
    pub check_count: i32,
    pub guest_count: i32,
    pub net_sales: f64,
    pub tips: f64,
    pub avg_check: f64,
    pub sales_per_hour: f64,
    pub hours_worked: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerPerformance {
    pub date: NaiveDate,
    pub location_id: String,
    pub server_count: usize,
    pub servers: Vec<RankedServer>,
}

pub fn server_performance(conn: &mut SqliteConnection, location: &str, date: NaiveDate) -> LookupResult<ServerPerformance> {
    use schema::server_daily_metrics::dsl as SM;

    let rows: Vec<ServerDailyMetric> = SM::server_daily_metrics
        .filter(SM::location_guid.eq(location))
        .filter(SM::business_date.eq(date))
        .order((SM::net_sales.desc(), SM::server_name.asc()))
        .select(ServerDailyMetric::as_select())
        .load(conn)?;
    if rows.is_empty() {
        return Ok(Lookup::no_data(format!("No server data for {}", date)));
    }

    let servers: Vec<RankedServer> = rows
        .into_iter()
        .enumerate()
        .map(|(i, r)| RankedServer {
            rank: i + 1,
            server_guid: r.server_guid,
            name: r.server_name,
            order_count: r.order_count,
            check_count: r.check_count,
            guest_count: r.guest_count,
            net_sales: r.net_sales,
            tips: r.tips,
            avg_check: r.avg_check,
            sales_per_hour: r.sales_per_hour,
            hours_worked: r.hours_worked,
        })
        .collect();
    Ok(Lookup::Found(ServerPerformance {
        date,
        location_id: location.to_string(),
        server_count: servers.len(),
        servers,
    }))
}

type ShiftRow = (TimeEntryRow, Option<String>, Option<String>);

/// Time entries of the day with the employee's stored name parts, clock-in order.
fn shift_rows(conn: &mut SqliteConnection, location: &str, date: NaiveDate) -> QueryResult<Vec<ShiftRow>> {
    TE::time_entries
        .left_join(E::employees.on(TE::employee_guid.assume_not_null().eq(E::guid)))
        .filter(TE::location_guid.eq(location))
        .filter(TE::business_date.eq(date))
        .order((TE::in_date.asc(), TE::employee_guid.asc(), TE::guid.asc()))
        .select((TimeEntryRow::as_select(), E::first_name.nullable(), E::last_name.nullable()))
        .load(conn)
}

fn name_of(first: &Option<String>, last: &Option<String>) -> String {
    employee_display_name(first.as_deref().unwrap_or(""), last.as_deref().unwrap_or(""))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OvertimeEmployee {
    pub employee_guid: String,
    pub name: String,
    pub regular_hours: f64,
    pub overtime_hours: f64,
    pub total_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OvertimeReport {
    pub date: NaiveDate,
    pub location_id: String,
    pub employees_with_overtime: usize,
    pub total_overtime_hours: f64,
    pub employees: Vec<OvertimeEmployee>,
}

/// Employees with overtime on the day, most overtime first.
pub fn overtime_report(conn: &mut SqliteConnection, location: &str, date: NaiveDate) -> LookupResult<OvertimeReport> {
    let rows = shift_rows(conn, location, date)?;
    if rows.is_empty() {
        return Ok(Lookup::no_data(format!("No time entries for {}", date)));
    }

    let mut by_employee: BTreeMap<String, OvertimeEmployee> = BTreeMap::new();
    for (entry, first, last) in rows.iter().filter(|(e, _, _)| e.overtime_hours > 0.0) {
        let guid = entry.employee_guid.clone().unwrap_or_default();
        let slot = by_employee.entry(guid.clone()).or_insert_with(|| OvertimeEmployee {
            employee_guid: guid,
            name: name_of(first, last),
            regular_hours: 0.0,
            overtime_hours: 0.0,
            total_hours: 0.0,
        });
        slot.regular_hours += entry.regular_hours;
        slot.overtime_hours += entry.overtime_hours;
        slot.total_hours += entry.regular_hours + entry.overtime_hours;
    }

    let mut employees: Vec<OvertimeEmployee> = by_employee
        .into_values()
        .map(|mut e| {
            e.regular_hours = round_money(e.regular_hours);
            e.overtime_hours = round_money(e.overtime_hours);
            e.total_hours = round_money(e.total_hours);
            e
        })
        .collect();
    employees.sort_by(|a, b| b.overtime_hours.total_cmp(&a.overtime_hours));

    Ok(Lookup::Found(OvertimeReport {
        date,
        location_id: location.to_string(),
        employees_with_overtime: employees.len(),
        total_overtime_hours: round_money(employees.iter().map(|e| e.overtime_hours).sum()),
        employees,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Shift {
    pub time_entry_guid: String,
    pub employee_guid: Option<String>,
    pub name: String,
    pub job_title: String,
    pub clock_in: Option<String>,
    pub clock_out: Option<String>,
    pub regular_hours: f64,
    pub overtime_hours: f64,
    pub total_hours: f64,
    pub had_overtime: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftReport {
    pub date: NaiveDate,
    pub location_id: String,
    pub shift_count: usize,
    pub employee_count: usize,
    pub overtime_shift_count: usize,
    pub total_hours: f64,
    pub shifts: Vec<Shift>,
}

/// Job titles keyed by (job guid, employee guid), plus a per-job fallback.
fn job_titles(conn: &mut SqliteConnection, job_guids: Vec<String>) -> QueryResult<(BTreeMap<(String, String), String>, BTreeMap<String, String>)> {
    use schema::employee_jobs::dsl as J;

    let rows: Vec<(String, String, String)> = J::employee_jobs
        .filter(J::guid.eq_any(job_guids))
        .order((J::guid.asc(), J::employee_guid.asc()))
        .select((J::guid, J::employee_guid, J::title))
        .load(conn)?;
    let mut exact = BTreeMap::new();
    let mut any = BTreeMap::new();
    for (job, employee, title) in rows.into_iter().filter(|(_, _, t)| !t.trim().is_empty()) {
        any.entry(job.clone()).or_insert_with(|| title.clone());
        exact.insert((job, employee), title);
    }
    Ok((exact, any))
}

/// Everyone who clocked in on the day, with role and hours.
pub fn employees_on_shift(conn: &mut SqliteConnection, location: &str, date: NaiveDate) -> LookupResult<ShiftReport> {
    let rows = shift_rows(conn, location, date)?;
    if rows.is_empty() {
        return Ok(Lookup::no_data(format!("No shift data found for {}", date)));
    }
    let job_guids = rows.iter().filter_map(|(e, _, _)| e.job_guid.clone()).collect();
    let (exact, any) = job_titles(conn, job_guids)?;

    let shifts: Vec<Shift> = rows
        .into_iter()
        .map(|(entry, first, last)| {
            let job_title = entry
                .job_guid
                .as_ref()
                .and_then(|job| {
                    let employee = entry.employee_guid.clone().unwrap_or_default();
                    exact.get(&(job.clone(), employee)).or_else(|| any.get(job))
                })
                .cloned()
                .unwrap_or_else(|| "Unknown".to_string());
            let total = entry.regular_hours + entry.overtime_hours;
            Shift {
                name: name_of(&first, &last),
                job_title,
                had_overtime: entry.overtime_hours > 0.0,
                total_hours: round_money(total),
                time_entry_guid: entry.guid,
                employee_guid: entry.employee_guid,
                clock_in: entry.in_date,
                clock_out: entry.out_date,
                regular_hours: entry.regular_hours,
                overtime_hours: entry.overtime_hours,
            }
        })
        .collect();

    let employee_count = shifts
        .iter()
        .map(|s| s.employee_guid.as_deref().unwrap_or(""))
        .collect::<std::collections::BTreeSet<_>>()
        .len();
    Ok(Lookup::Found(ShiftReport {
        date,
        location_id: location.to_string(),
        shift_count: shifts.len(),
        employee_count,
        overtime_shift_count: shifts.iter().filter(|s| s.had_overtime).count(),
        total_hours: round_money(shifts.iter().map(|s| s.regular_hours + s.overtime_hours).sum()),
        shifts,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::test_connection;
    use crate::queries::sales::tests::synced_scenario;
    use crate::services::normalize::tests::scenario_date;
    use crate::services::recommendations::Severity;

    fn with_second_shift() -> SqliteConnection {
        let mut conn = synced_scenario();
        let entry = TimeEntryRow {
            guid: "te-2".into(),
            location_guid: "loc-1".into(),
            business_date: scenario_date(),
            employee_guid: Some("emp-1".into()),
            job_guid: Some("job-server".into()),
            in_date: Some("2024-03-01T12:00:00.000+0000".into()),
            out_date: Some("2024-03-01T18:00:00.000+0000".into()),
            regular_hours: 6.0,
            overtime_hours: 0.0,
            cash_sales: 0.0,
            non_cash_sales: 0.0,
            cash_tips: 0.0,
            non_cash_tips: 0.0,
            declared_cash_tips: 0.0,
        };
        diesel::insert_into(TE::time_entries).values(&entry).execute(&mut conn).expect("insert entry");
        conn
    }

    #[test]
    fn summary_keeps_only_labor_rules() {
        let mut conn = synced_scenario();
        let summary = labor_summary(&mut conn, "loc-1", scenario_date(), &Thresholds::default())
            .expect("query")
            .found()
            .expect("found");
        assert_eq!(summary.labor_cost, 142.5);
        assert!(summary.labor_cost_is_estimated);
        assert!(summary.recommendations.iter().all(|r| r.category == Category::Labor));
        assert_eq!(summary.recommendations[0].severity, Severity::Critical);
        assert!(summary.recommendations.iter().any(|r| r.id == "estimated-labor-cost"));
    }

    #[test]
    fn servers_ranked_by_net_sales() {
        let mut conn = synced_scenario();
        let perf = server_performance(&mut conn, "loc-1", scenario_date())
            .expect("query")
            .found()
            .expect("found");
        assert_eq!(perf.servers[0].rank, 1);
        assert!(perf.servers.windows(2).all(|w| w[0].net_sales >= w[1].net_sales));
        assert!(perf.servers.iter().any(|s| s.name == "Ana Novak"));
    }

    #[test]
    fn overtime_groups_by_employee() {
        let mut conn = with_second_shift();
        let report = overtime_report(&mut conn, "loc-1", scenario_date())
            .expect("query")
            .found()
            .expect("found");
        assert_eq!(report.employees_with_overtime, 1);
        assert_eq!(report.total_overtime_hours, 1.0);
        assert_eq!(report.employees[0].employee_guid, "emp-9");
        assert_eq!(report.employees[0].name, "Unknown");
        assert_eq!(report.employees[0].total_hours, 9.0);
    }

    #[test]
    fn shifts_in_clock_in_order_with_names() {
        let mut conn = with_second_shift();
        let report = employees_on_shift(&mut conn, "loc-1", scenario_date())
            .expect("query")
            .found()
            .expect("found");
        assert_eq!(report.shift_count, 2);
        assert_eq!(report.employee_count, 2);
        assert_eq!(report.overtime_shift_count, 1);
        assert_eq!(report.total_hours, 15.0);
        assert_eq!(report.shifts[0].name, "Ana Novak");
        assert_eq!(report.shifts[0].job_title, "Unknown");
        assert!(report.shifts[1].had_overtime);
    }

    #[test]
    fn empty_day_is_no_data() {
        let mut conn = test_connection();
        let day = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap();
        assert!(!employees_on_shift(&mut conn, "loc-1", day).expect("query").is_found());
        assert!(!overtime_report(&mut conn, "loc-1", day).expect("query").is_found());
        assert!(!labor_summary(&mut conn, "loc-1", day, &Thresholds::default()).expect("query").is_found());
    }
}
