//! Per (location, business date) POS sync.
//!
//! Network calls happen first; the delete of the previous raw rows and
//! rollups, the inserts and the sync log row then commit in one transaction.

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use diesel::prelude::*;
use diesel::SqliteConnection;
use log::{info, warn};
use std::collections::BTreeSet;

use crate::client::pos::PosApi;
use crate::db::models::{self as dbm, sync_status, NewSyncLog, WarningList};
use crate::schema;
use crate::services::aggregate::{compute_rollups, DayRollups, WageTable};
use crate::services::normalize::{normalize_day, LookupTables, NormalizedDay};
use crate::services::refs;
use crate::utils::{local_day_window, resolve_timezone, SyncError};

/// Rows per multi-row INSERT, well under SQLite's bound-variable limit.
const INSERT_CHUNK: usize = 500;

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub default_wage: f64,
    pub default_timezone: Tz,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    pub order_count: usize,
    pub warnings: WarningList,
}

/// One run's view of the POS: the client plus which locations already had
/// their configuration refreshed.
pub struct SyncSession<'a> {
    api: &'a dyn PosApi,
    options: SyncOptions,
    configured: BTreeSet<String>,
}

impl<'a> SyncSession<'a> {
    pub fn new(api: &'a dyn PosApi, options: SyncOptions) -> Self {
        SyncSession {
            api,
            options,
            configured: BTreeSet::new(),
        }
    }

    /// Refresh restaurant info, sales categories, revenue centers and dining
    /// options once per location per session. Failures only log.
    pub fn ensure_config(&mut self, conn: &mut SqliteConnection, location: &str) {
        if !self.configured.insert(location.to_string()) {
            return;
        }

        match self.api.restaurant_info(location) {
            Ok(info) => log_store_failure("location", refs::upsert_location(conn, location, &info)),
            Err(e) => warn!("Could not fetch restaurant info for {}: {}", location, e),
        }
        match self.api.sales_categories(location) {
            Ok(rows) => log_store_failure("sales categories", refs::upsert_sales_categories(conn, location, &rows)),
            Err(e) => warn!("Could not fetch sales categories for {}: {}", location, e),
        }
        match self.api.revenue_centers(location) {
            Ok(rows) => log_store_failure("revenue centers", refs::upsert_revenue_centers(conn, location, &rows)),
            Err(e) => warn!("Could not fetch revenue centers for {}: {}", location, e),
        }
        match self.api.dining_options(location) {
            Ok(rows) => log_store_failure("dining options", refs::upsert_dining_options(conn, location, &rows)),
            Err(e) => warn!("Could not fetch dining options for {}: {}", location, e),
        }
    }

    /// Replace everything stored for (location, date) with a fresh fetch.
    pub fn sync_date(
        &mut self,
        conn: &mut SqliteConnection,
        location: &str,
        date: NaiveDate,
    ) -> Result<SyncOutcome, SyncError> {
        info!("Syncing {} for {}", location, date);
        self.ensure_config(conn, location);

        let mut warnings = WarningList::default();
        match self.api.employees(location) {
            Ok(employees) => {
                refs::upsert_employees(conn, location, &employees)?;
            }
            Err(e) => {
                warn!("Could not fetch employees for {}: {}", location, e);
                warnings.push(format!("Could not fetch employees: {}", e));
            }
        }

        let orders = self.api.orders_for_business_date(location, date)?;

        let lookups = load_lookups(conn, location, self.options.default_timezone)?;
        let (start, end) = local_day_window(date, lookups.timezone);
        let time_entries = match self.api.time_entries(location, &start, &end) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Could not fetch time entries for {}: {}", location, e);
                warnings.push(format!("Could not fetch time entries: {}", e));
                Vec::new()
            }
        };

        let wages = load_wage_table(conn, location)?;
        let day = normalize_day(&orders, &time_entries, &lookups, date);
        let rollups = compute_rollups(&day, &lookups, &wages, self.options.default_wage, date);
        for w in &rollups.warnings {
            warnings.push(w.clone());
        }

        conn.transaction::<_, SyncError, _>(|conn| {
            replace_day(conn, location, date, &day, &rollups)?;
            write_sync_log(conn, location, date, day.orders.len() as i32, warnings.status(), &warnings)?;
            Ok(())
        })?;

        info!(
            "Synced {} for {}: {} order(s), {} item row(s), net {:.2}, status {}",
            location,
            date,
            day.orders.len(),
            day.items.len(),
            rollups.daily.net_sales,
            warnings.status()
        );
        Ok(SyncOutcome {
            order_count: day.orders.len(),
            warnings,
        })
    }
}

fn log_store_failure(what: &str, result: QueryResult<usize>) {
    if let Err(e) = result {
        warn!("Storing {} failed: {}", what, e);
    }
}

/// Record a fatal sync failure for the key; stored data is left as it was.
pub fn record_failure(conn: &mut SqliteConnection, location: &str, date: NaiveDate, message: &str) -> QueryResult<usize> {
    let mut warnings = WarningList::default();
    warnings.push(message);
    write_sync_log(conn, location, date, 0, sync_status::ERROR, &warnings)
}

fn write_sync_log(
    conn: &mut SqliteConnection,
    location: &str,
    date: NaiveDate,
    order_count: i32,
    status: &str,
    warnings: &WarningList,
) -> QueryResult<usize> {
    let row = NewSyncLog {
        location_guid: location.to_string(),
        business_date: date,
        synced_at: Utc::now().naive_utc(),
        order_count,
        status: status.to_string(),
        warnings: warnings.clone(),
    };
    diesel::insert_into(schema::sync_log::table).values(&row).execute(conn)
}

/// Name lookups and timezone for a location, read from the reference tables.
pub fn load_lookups(conn: &mut SqliteConnection, location: &str, default_timezone: Tz) -> QueryResult<LookupTables> {
    use schema::dining_options::dsl as D;
    use schema::employees::dsl as E;
    use schema::locations::dsl as L;
    use schema::sales_categories::dsl as S;

    let stored: Option<dbm::Location> = L::locations
        .filter(L::guid.eq(location))
        .select(dbm::Location::as_select())
        .first(conn)
        .optional()?;
    let (name, timezone) = match &stored {
        Some(loc) => (loc.display_name(), resolve_timezone(&loc.timezone, default_timezone)),
        None => (dbm::display_name_for(location, None, None), default_timezone),
    };

    let mut lookups = LookupTables::new(location, &name, timezone);
    lookups.categories = S::sales_categories
        .filter(S::location_guid.eq(location))
        .select((S::guid, S::name))
        .load::<(String, String)>(conn)?
        .into_iter()
        .collect();
    lookups.dining_options = D::dining_options
        .filter(D::location_guid.eq(location))
        .select((D::guid, D::name))
        .load::<(String, String)>(conn)?
        .into_iter()
        .collect();
    lookups.employee_names = E::employees
        .filter(E::location_guid.eq(location))
        .select((E::guid, E::first_name, E::last_name))
        .load::<(String, String, String)>(conn)?
        .into_iter()
        .map(|(guid, first, last)| (guid, employee_display_name(&first, &last)))
        .collect();
    Ok(lookups)
}

/// "First Last" from stored name parts; "Unknown" when both are blank.
pub fn employee_display_name(first: &str, last: &str) -> String {
    let name = [first.trim(), last.trim()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if name.is_empty() { "Unknown".to_string() } else { name }
}

/// Highest positive wage per employee of the location, across all their jobs.
pub fn load_wage_table(conn: &mut SqliteConnection, location: &str) -> QueryResult<WageTable> {
    use schema::employee_jobs::dsl as J;
    use schema::employees::dsl as E;

    let jobs: Vec<(String, f64)> = J::employee_jobs
        .inner_join(E::employees.on(E::guid.eq(J::employee_guid)))
        .filter(E::location_guid.eq(location))
        .filter(J::wage_amount.gt(0.0))
        .select((J::employee_guid, J::wage_amount))
        .load(conn)?;
    Ok(WageTable::from_jobs(jobs))
}

fn replace_day(
    conn: &mut SqliteConnection,
    location: &str,
    date: NaiveDate,
    day: &NormalizedDay,
    rollups: &DayRollups,
) -> QueryResult<()> {
    use schema::*;

    macro_rules! clear {
        ($table:ident) => {
            diesel::delete($table::table.filter($table::location_guid.eq(location).and($table::business_date.eq(date))))
                .execute(conn)?
        };
    }
    macro_rules! insert_chunked {
        ($table:ident, $rows:expr) => {
            for chunk in $rows.chunks(INSERT_CHUNK) {
                diesel::insert_into($table::table).values(chunk).execute(conn)?;
            }
        };
    }

    clear!(orders);
    clear!(checks);
    clear!(order_items);
    clear!(payments);
    clear!(discounts);
    clear!(time_entries);
    clear!(daily_metrics);
    clear!(hourly_metrics);
    clear!(item_daily_metrics);
    clear!(server_daily_metrics);

    insert_chunked!(orders, day.orders);
    insert_chunked!(checks, day.checks);
    insert_chunked!(order_items, day.items);
    insert_chunked!(payments, day.payments);
    insert_chunked!(discounts, day.discounts);
    insert_chunked!(time_entries, day.time_entries);

    diesel::insert_into(daily_metrics::table).values(&rollups.daily).execute(conn)?;
    insert_chunked!(hourly_metrics, rollups.hourly);
    insert_chunked!(item_daily_metrics, rollups.items);
    insert_chunked!(server_daily_metrics, rollups.servers);
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::client::error::ApiError;
    use crate::db::store::test_connection;
    use crate::models::pos::*;
    use crate::services::normalize::tests::{load_orders_fixture, scenario_date, scenario_time_entries};

    /// In-process POS serving the fixture scenario.
    #[derive(Default)]
    pub(crate) struct FixturePos {
        pub fail_orders: bool,
        pub fail_employees: bool,
        pub fail_time_entries: bool,
    }

    fn unavailable(path: &str) -> ApiError {
        ApiError::Http {
            path: path.to_string(),
            status: 503,
            message: "unavailable".into(),
        }
    }

    impl PosApi for FixturePos {
        fn restaurant_info(&self, location: &str) -> Result<RestaurantInfo, ApiError> {
            Ok(RestaurantInfo {
                guid: location.to_string(),
                general: Some(RestaurantGeneral {
                    name: Some("Cafe Lipa".into()),
                    location_name: Some("Downtown".into()),
                    time_zone: Some("America/New_York".into()),
                    ..Default::default()
                }),
                location: None,
            })
        }

        fn sales_categories(&self, _location: &str) -> Result<Vec<SalesCategory>, ApiError> {
            Ok(vec![
                SalesCategory { guid: "cat-food".into(), name: Some("Food".into()) },
                SalesCategory { guid: "cat-wine".into(), name: Some("Wine".into()) },
            ])
        }

        fn revenue_centers(&self, _location: &str) -> Result<Vec<RevenueCenter>, ApiError> {
            Err(unavailable("/config/v2/revenueCenters"))
        }

        fn dining_options(&self, _location: &str) -> Result<Vec<DiningOption>, ApiError> {
            Ok(vec![DiningOption {
                guid: "dine-in".into(),
                name: Some("Dine In".into()),
                behavior: Some("DINE_IN".into()),
            }])
        }

        fn employees(&self, _location: &str) -> Result<Vec<Employee>, ApiError> {
            if self.fail_employees {
                return Err(unavailable("/labor/v1/employees"));
            }
            Ok(vec![Employee {
                guid: "emp-1".into(),
                first_name: Some("Ana".into()),
                last_name: Some("Novak".into()),
                jobs: Some(vec![EmployeeJob {
                    guid: "job-server".into(),
                    wage_amount: Some(20.0),
                    ..Default::default()
                }]),
                ..Default::default()
            }])
        }

        fn orders_for_business_date(&self, _location: &str, _date: NaiveDate) -> Result<Vec<Order>, ApiError> {
            if self.fail_orders {
                return Err(unavailable("/orders/v2/ordersBulk"));
            }
            Ok(load_orders_fixture())
        }

        fn time_entries(&self, _location: &str, start: &str, end: &str) -> Result<Vec<TimeEntry>, ApiError> {
            assert_eq!(start, "2024-03-01T00:00:00.000-0500");
            assert_eq!(end, "2024-03-01T23:59:59.999-0500");
            if self.fail_time_entries {
                return Err(unavailable("/labor/v1/timeEntries"));
            }
            Ok(scenario_time_entries())
        }
    }

    pub(crate) fn options() -> SyncOptions {
        SyncOptions {
            default_wage: 15.0,
            default_timezone: chrono_tz::America::New_York,
        }
    }

    fn stored_daily(conn: &mut SqliteConnection) -> Vec<dbm::DailyMetric> {
        use schema::daily_metrics::dsl as DM;
        DM::daily_metrics.select(dbm::DailyMetric::as_select()).load(conn).expect("daily rows")
    }

    type RollupSnapshot = (
        Vec<dbm::DailyMetric>,
        Vec<dbm::HourlyMetric>,
        Vec<dbm::ItemDailyMetric>,
        Vec<dbm::ServerDailyMetric>,
    );

    fn rollups(conn: &mut SqliteConnection) -> RollupSnapshot {
        use schema::hourly_metrics::dsl as HM;
        use schema::item_daily_metrics::dsl as IM;
        use schema::server_daily_metrics::dsl as SD;

        let hourly = HM::hourly_metrics
            .order(HM::hour.asc())
            .select(dbm::HourlyMetric::as_select())
            .load(conn)
            .expect("hourly rows");
        let items = IM::item_daily_metrics
            .order(IM::display_name.asc())
            .select(dbm::ItemDailyMetric::as_select())
            .load(conn)
            .expect("item rows");
        let servers = SD::server_daily_metrics
            .order(SD::server_guid.asc())
            .select(dbm::ServerDailyMetric::as_select())
            .load(conn)
            .expect("server rows");
        (stored_daily(conn), hourly, items, servers)
    }

    fn sync_logs(conn: &mut SqliteConnection) -> Vec<dbm::SyncLog> {
        use schema::sync_log::dsl as SL;
        SL::sync_log.order(SL::id.asc()).select(dbm::SyncLog::as_select()).load(conn).expect("sync log")
    }

    #[test]
    fn scenario_sync_writes_raw_rows_and_rollups() {
        let mut conn = test_connection();
        let api = FixturePos::default();
        let mut session = SyncSession::new(&api, options());
        let outcome = session.sync_date(&mut conn, "loc-1", scenario_date()).expect("sync");
        assert_eq!(outcome.order_count, 2);

        let daily = stored_daily(&mut conn);
        assert_eq!(daily.len(), 1);
        let d = &daily[0];
        assert_eq!(d.location_name, "Downtown");
        assert_eq!(d.net_sales, 120.0);
        assert_eq!(d.labor_cost, 142.5);
        assert_eq!(d.labor_cost_pct, 118.75);
        assert!(d.labor_cost_is_estimated);
        assert_eq!(d.sales_by_category.get("Food"), Some(75.0));

        let logs = sync_logs(&mut conn);
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, sync_status::PARTIAL);
        assert!(logs[0].warnings.iter().any(|w| w.contains("$15/hr")));

        use schema::hourly_metrics::dsl as HM;
        let hourly: Vec<f64> = HM::hourly_metrics
            .filter(HM::location_guid.eq("loc-1"))
            .select(HM::net_sales)
            .load(&mut conn)
            .expect("hourly");
        let sum: f64 = hourly.iter().sum();
        assert!((sum - d.net_sales).abs() <= 0.01 * hourly.len() as f64);

        use schema::server_daily_metrics::dsl as SD;
        let names: Vec<String> = SD::server_daily_metrics
            .order(SD::server_guid.asc())
            .select(SD::server_name)
            .load(&mut conn)
            .expect("servers");
        assert_eq!(names, vec!["Ana Novak".to_string(), "Unknown".to_string()]);
    }

    #[test]
    fn resync_replaces_instead_of_duplicating() {
        use schema::order_items::dsl as OI;
        use schema::orders::dsl as O;

        let mut conn = test_connection();
        let api = FixturePos::default();
        let mut session = SyncSession::new(&api, options());
        session.sync_date(&mut conn, "loc-1", scenario_date()).expect("first");
        let first = rollups(&mut conn);
        session.sync_date(&mut conn, "loc-1", scenario_date()).expect("second");
        let second = rollups(&mut conn);

        assert_eq!(first, second);
        assert_eq!(first.0.len(), 1);
        assert!(!first.1.is_empty());
        assert!(!first.2.is_empty());
        assert_eq!(first.3.len(), 2);
        let orders: i64 = O::orders.count().get_result(&mut conn).expect("count");
        let items: i64 = OI::order_items.count().get_result(&mut conn).expect("count");
        assert_eq!(orders, 2);
        assert_eq!(items, 6);
        assert_eq!(sync_logs(&mut conn).len(), 2);
    }

    #[test]
    fn side_fetch_failures_become_warnings() {
        let mut conn = test_connection();
        let api = FixturePos {
            fail_employees: true,
            fail_time_entries: true,
            ..Default::default()
        };
        let mut session = SyncSession::new(&api, options());
        let outcome = session.sync_date(&mut conn, "loc-1", scenario_date()).expect("sync");
        assert!(outcome.warnings.iter().any(|w| w.starts_with("Could not fetch employees:")));
        assert!(outcome.warnings.iter().any(|w| w.starts_with("Could not fetch time entries:")));

        let d = &stored_daily(&mut conn)[0];
        assert_eq!(d.labor_hours, 0.0);
        assert_eq!(d.labor_cost, 0.0);
        assert!(!outcome.warnings.iter().any(|w| w.contains("$15/hr")));
    }

    #[test]
    fn orders_failure_keeps_previous_data() {
        let mut conn = test_connection();
        let good = FixturePos::default();
        SyncSession::new(&good, options())
            .sync_date(&mut conn, "loc-1", scenario_date())
            .expect("seed");

        let broken = FixturePos {
            fail_orders: true,
            ..Default::default()
        };
        let err = SyncSession::new(&broken, options())
            .sync_date(&mut conn, "loc-1", scenario_date())
            .unwrap_err();
        assert!(matches!(err, SyncError::Api(_)));
        record_failure(&mut conn, "loc-1", scenario_date(), &err.to_string()).expect("log failure");

        assert_eq!(stored_daily(&mut conn)[0].net_sales, 120.0);
        let logs = sync_logs(&mut conn);
        assert_eq!(logs.last().map(|l| l.status.as_str()), Some(sync_status::ERROR));
    }

    #[test]
    fn known_wages_come_from_stored_jobs() {
        let mut conn = test_connection();
        let api = FixturePos::default();
        SyncSession::new(&api, options())
            .sync_date(&mut conn, "loc-1", scenario_date())
            .expect("sync");
        let wages = load_wage_table(&mut conn, "loc-1").expect("wages");
        assert_eq!(wages.rate("emp-1"), Some(20.0));
        assert_eq!(wages.rate("emp-9"), None);
        assert_eq!(load_wage_table(&mut conn, "loc-2").expect("wages").len(), 0);
    }
}
