//! Deterministic synthetic POS for demos and local runs (`--fake-data`).
//!
//! The same (location, date) always yields the same orders and shifts, so a
//! re-run exercises the idempotent replace path with identical input.

use chrono::{Datelike, NaiveDate, NaiveTime, TimeZone, Weekday};
use chrono_tz::Tz;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::client::error::ApiError;
use crate::client::pos::PosApi;
use crate::models::pos::*;
use crate::utils::parse_source_timestamp;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";
const TAX_RATE: f64 = 0.08;

const CATEGORIES: [(&str, &str); 4] = [
    ("fake-cat-food", "Food"),
    ("fake-cat-drinks", "Drinks"),
    ("fake-cat-wine", "Wine"),
    ("fake-cat-dessert", "Dessert"),
];

const MENU: [(&str, &str, f64); 12] = [
    ("Burger", "fake-cat-food", 16.0),
    ("Caesar Salad", "fake-cat-food", 12.5),
    ("Margherita Pizza", "fake-cat-food", 15.0),
    ("Fish Tacos", "fake-cat-food", 14.0),
    ("Ribeye", "fake-cat-food", 34.0),
    ("Fries", "fake-cat-food", 6.0),
    ("Lemonade", "fake-cat-drinks", 4.5),
    ("Espresso", "fake-cat-drinks", 3.5),
    ("House Red", "fake-cat-wine", 11.0),
    ("Pinot Grigio", "fake-cat-wine", 12.0),
    ("Tiramisu", "fake-cat-dessert", 9.0),
    ("Gelato", "fake-cat-dessert", 7.0),
];

const MODIFIERS: [(&str, f64); 3] = [("Extra Cheese", 1.5), ("Bacon", 3.0), ("Avocado", 2.5)];

const DINING_OPTIONS: [(&str, &str, &str); 3] = [
    ("fake-dine-in", "Dine In", "DINE_IN"),
    ("fake-takeout", "Take Out", "TAKE_OUT"),
    ("fake-delivery", "Delivery", "DELIVERY"),
];

/// guid, first, last, job title, hourly wage (None: no wage on file)
const STAFF: [(&str, &str, &str, &str, Option<f64>); 6] = [
    ("fake-emp-1", "Maja", "Kovac", "Server", Some(12.0)),
    ("fake-emp-2", "Luka", "Horvat", "Server", Some(12.0)),
    ("fake-emp-3", "Nina", "Zupan", "Server", Some(13.5)),
    ("fake-emp-4", "Tomaz", "Krajnc", "Line Cook", Some(19.0)),
    ("fake-emp-5", "Eva", "Potocnik", "Line Cook", None),
    ("fake-emp-6", "Jan", "Mlakar", "Host", Some(14.0)),
];
const SERVER_COUNT: usize = 3;

const PAYMENT_TYPES: [&str; 5] = ["CASH", "VISA", "MASTERCARD", "AMEX", "GIFTCARD"];

pub struct FakePosSource {
    timezone: Tz,
}

impl FakePosSource {
    pub fn new(timezone: Tz) -> Self {
        FakePosSource { timezone }
    }

    fn local_timestamp(&self, date: NaiveDate, minutes_after_midnight: u32) -> Option<String> {
        let time = NaiveTime::from_num_seconds_from_midnight_opt(minutes_after_midnight.min(24 * 60 - 1) * 60, 0)?;
        self.timezone
            .from_local_datetime(&date.and_time(time))
            .earliest()
            .map(|ts| ts.format(TIMESTAMP_FORMAT).to_string())
    }
}

/// Stable seed per (location, date): FNV-1a over the guid mixed with the day number.
fn rng_for(location: &str, date: NaiveDate) -> SmallRng {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in location.bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    SmallRng::seed_from_u64(hash ^ (date.num_days_from_ce() as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15))
}

fn round_cents(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn traffic_profile(day_fraction: f64, weekday: Weekday) -> f64 {
    let lunch_peak = gaussian(day_fraction, 0.52, 0.045) * 1.6;
    let dinner_peak = gaussian(day_fraction, 0.79, 0.05) * 2.0;
    let afternoon_lull = 0.25 * gaussian(day_fraction, 0.65, 0.08);
    let weekend_brunch = if is_weekend(weekday) {
        gaussian(day_fraction, 0.44, 0.06) * 1.2
    } else {
        0.0
    };
    (lunch_peak + dinner_peak + afternoon_lull + weekend_brunch).max(0.0)
}

fn gaussian(x: f64, center: f64, width: f64) -> f64 {
    let exponent = -((x - center) * (x - center)) / (2.0 * width * width);
    exponent.exp()
}

fn is_weekend(weekday: Weekday) -> bool {
    matches!(weekday, Weekday::Fri | Weekday::Sat | Weekday::Sun)
}

/// Minute of the day an order opens, sampled against the traffic curve
/// between 10:00 and 23:00.
fn opening_minute(weekday: Weekday, rng: &mut SmallRng) -> u32 {
    let mut minute = rng.random_range(600..1380);
    for _ in 0..32 {
        let fraction = minute as f64 / 1440.0;
        if rng.random_bool((traffic_profile(fraction, weekday) / 2.2).clamp(0.02, 1.0)) {
            break;
        }
        minute = rng.random_range(600..1380);
    }
    minute
}

fn selection(guid: String, rng: &mut SmallRng) -> Selection {
    let (name, category, unit_price) = MENU[rng.random_range(0..MENU.len())];
    let quantity = if rng.random_bool(0.15) { 2.0 } else { 1.0 };
    let modifiers = if category == "fake-cat-food" && rng.random_bool(0.2) {
        let (mod_name, mod_price) = MODIFIERS[rng.random_range(0..MODIFIERS.len())];
        Some(vec![Selection {
            guid: format!("{}-mod", guid),
            display_name: Some(mod_name.to_string()),
            sales_category: Some(EntityRef::new(category)),
            quantity: Some(1.0),
            price: Some(mod_price),
            ..Default::default()
        }])
    } else {
        None
    };
    let price = round_cents(unit_price * quantity);
    Selection {
        guid,
        display_name: Some(name.to_string()),
        item: Some(EntityRef::new(format!("fake-item-{}", name.to_lowercase().replace(' ', "-")))),
        sales_category: Some(EntityRef::new(category)),
        quantity: Some(quantity),
        price: Some(price),
        pre_discount_price: Some(price),
        tax: Some(round_cents(price * TAX_RATE)),
        voided: Some(rng.random_bool(0.03)),
        modifiers,
        ..Default::default()
    }
}

impl PosApi for FakePosSource {
    fn restaurant_info(&self, location: &str) -> Result<RestaurantInfo, ApiError> {
        Ok(RestaurantInfo {
            guid: location.to_string(),
            general: Some(RestaurantGeneral {
                name: Some("Demo Bistro".into()),
                location_name: Some(format!("Demo {}", location.chars().take(6).collect::<String>())),
                time_zone: Some(self.timezone.name().to_string()),
                ..Default::default()
            }),
            location: Some(RestaurantLocation {
                address1: Some("1 Market Street".into()),
                city: Some("Springfield".into()),
                state_code: Some("IL".into()),
                zip_code: Some("62701".into()),
                ..Default::default()
            }),
        })
    }

    fn sales_categories(&self, _location: &str) -> Result<Vec<SalesCategory>, ApiError> {
        Ok(CATEGORIES
            .iter()
            .map(|(guid, name)| SalesCategory {
                guid: guid.to_string(),
                name: Some(name.to_string()),
            })
            .collect())
    }

    fn revenue_centers(&self, _location: &str) -> Result<Vec<RevenueCenter>, ApiError> {
        Ok(vec![
            RevenueCenter { guid: "fake-rc-dining".into(), name: Some("Dining Room".into()) },
            RevenueCenter { guid: "fake-rc-bar".into(), name: Some("Bar".into()) },
        ])
    }

    fn dining_options(&self, _location: &str) -> Result<Vec<DiningOption>, ApiError> {
        Ok(DINING_OPTIONS
            .iter()
            .map(|(guid, name, behavior)| DiningOption {
                guid: guid.to_string(),
                name: Some(name.to_string()),
                behavior: Some(behavior.to_string()),
            })
            .collect())
    }

    fn employees(&self, _location: &str) -> Result<Vec<Employee>, ApiError> {
        Ok(STAFF
            .iter()
            .map(|(guid, first, last, title, wage)| Employee {
                guid: guid.to_string(),
                first_name: Some(first.to_string()),
                last_name: Some(last.to_string()),
                jobs: Some(vec![EmployeeJob {
                    guid: format!("fake-job-{}", title.to_lowercase().replace(' ', "-")),
                    title: Some(title.to_string()),
                    wage_type: Some("HOURLY".into()),
                    wage_amount: *wage,
                }]),
                ..Default::default()
            })
            .collect())
    }

    fn orders_for_business_date(&self, location: &str, date: NaiveDate) -> Result<Vec<Order>, ApiError> {
        let mut rng = rng_for(location, date);
        let weekday = date.weekday();
        let base = if is_weekend(weekday) { 55 } else { 38 };
        let count = base + rng.random_range(0..12);
        let business_date = date.format("%Y%m%d").to_string().parse::<u32>().ok();

        let mut orders = Vec::with_capacity(count);
        for n in 0..count {
            let order_guid = format!("fake-{}-{}-{:03}", location, date.format("%Y%m%d"), n);
            let opened_minute = opening_minute(weekday, &mut rng);
            let duration = rng.random_range(20..95);

            let selections: Vec<Selection> = (0..rng.random_range(1..=4))
                .map(|i| selection(format!("{}-sel-{}", order_guid, i), &mut rng))
                .collect();
            let subtotal: f64 = selections
                .iter()
                .filter(|s| !s.voided.unwrap_or(false))
                .map(|s| s.price.unwrap_or(0.0))
                .sum();
            let discount = if rng.random_bool(0.08) { round_cents(subtotal * 0.1) } else { 0.0 };
            let amount = round_cents(subtotal - discount);
            let tax = round_cents(amount * TAX_RATE);
            let tip = round_cents(amount * rng.random_range(0.12..0.22));
            let total = round_cents(amount + tax);
            let payment_type = PAYMENT_TYPES[rng.random_range(0..PAYMENT_TYPES.len())];
            let check_guid = format!("{}-check", order_guid);

            orders.push(Order {
                guid: order_guid.clone(),
                server: Some(EntityRef::new(STAFF[rng.random_range(0..SERVER_COUNT)].0)),
                dining_option: Some(EntityRef::new(DINING_OPTIONS[rng.random_range(0..DINING_OPTIONS.len())].0)),
                revenue_center: Some(EntityRef::new("fake-rc-dining")),
                opened_date: self.local_timestamp(date, opened_minute),
                closed_date: self.local_timestamp(date, opened_minute + duration),
                paid_date: self.local_timestamp(date, opened_minute + duration - 1),
                business_date,
                number_of_guests: Some(rng.random_range(1..=4)),
                approval_status: Some("APPROVED".into()),
                voided: Some(rng.random_bool(0.02)),
                deleted: Some(false),
                checks: Some(vec![Check {
                    guid: check_guid.clone(),
                    display_number: Some(format!("{}", 100 + n)),
                    payment_status: Some("CLOSED".into()),
                    amount: Some(amount),
                    tax_amount: Some(tax),
                    total_amount: Some(total),
                    tip_amount: Some(tip),
                    selections: Some(selections),
                    payments: Some(vec![Payment {
                        guid: format!("{}-pay", check_guid),
                        payment_type: Some(payment_type.to_string()),
                        amount: Some(total),
                        tip_amount: Some(tip),
                        payment_status: Some("CAPTURED".into()),
                        refund_status: Some("NONE".into()),
                    }]),
                    applied_discounts: (discount > 0.0).then(|| {
                        vec![AppliedDiscount {
                            guid: Some(format!("{}-disc", check_guid)),
                            name: Some("Happy Hour".into()),
                            discount_amount: Some(discount),
                            discount_percent: Some(10.0),
                        }]
                    }),
                    voided: Some(false),
                    deleted: Some(false),
                }]),
            });
        }
        Ok(orders)
    }

    fn time_entries(&self, location: &str, start: &str, _end: &str) -> Result<Vec<TimeEntry>, ApiError> {
        let date = parse_source_timestamp(start)
            .map(|ts| ts.with_timezone(&self.timezone).date_naive())
            .ok_or_else(|| ApiError::Config(format!("unparseable time entry window start {:?}", start)))?;
        let mut rng = rng_for(location, date);
        // Decorrelate from the order stream for the same key.
        let _: u64 = rng.random();

        let mut entries = Vec::with_capacity(STAFF.len());
        for (index, (guid, _, _, title, _)) in STAFF.iter().enumerate() {
            if rng.random_bool(0.1) {
                continue;
            }
            let shift_start = if *title == "Line Cook" { 600 } else { rng.random_range(630..720) };
            let regular = round_cents(rng.random_range(5.5..8.0));
            let overtime = if rng.random_bool(0.12) { round_cents(rng.random_range(0.5..2.5)) } else { 0.0 };
            let shift_end = shift_start + ((regular + overtime) * 60.0) as u32;
            entries.push(TimeEntry {
                guid: format!("fake-te-{}-{}-{}", location, date.format("%Y%m%d"), index),
                employee_reference: Some(EntityRef::new(*guid)),
                job_reference: Some(EntityRef::new(format!("fake-job-{}", title.to_lowercase().replace(' ', "-")))),
                in_date: self.local_timestamp(date, shift_start),
                out_date: self.local_timestamp(date, shift_end),
                regular_hours: Some(regular),
                overtime_hours: Some(overtime),
                business_date: date.format("%Y%m%d").to_string().parse::<u32>().ok(),
                ..Default::default()
            });
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::DailyMetric;
    use crate::db::store::test_connection;
    use crate::schema;
    use crate::services::pos_sync::{SyncOptions, SyncSession};
    use crate::utils::local_day_window;
    use diesel::prelude::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 8).unwrap()
    }

    #[test]
    fn same_key_same_orders() {
        let source = FakePosSource::new(chrono_tz::America::New_York);
        let a = source.orders_for_business_date("loc-demo", day()).expect("orders");
        let b = source.orders_for_business_date("loc-demo", day()).expect("orders");
        assert_eq!(a, b);
        assert!(!a.is_empty());

        let other_day = source
            .orders_for_business_date("loc-demo", day().succ_opt().unwrap())
            .expect("orders");
        assert_ne!(a, other_day);
    }

    #[test]
    fn orders_open_during_service_hours() {
        let tz = chrono_tz::America::New_York;
        let source = FakePosSource::new(tz);
        for order in source.orders_for_business_date("loc-demo", day()).expect("orders") {
            let opened = order.opened_date.as_deref().and_then(parse_source_timestamp).expect("opened");
            let local = opened.with_timezone(&tz);
            assert_eq!(local.date_naive(), day());
            assert!((10..23).contains(&chrono::Timelike::hour(&local)));
        }
    }

    #[test]
    fn time_entries_follow_window_date() {
        let tz = chrono_tz::Europe::Ljubljana;
        let source = FakePosSource::new(tz);
        let (start, end) = local_day_window(day(), tz);
        let entries = source.time_entries("loc-demo", &start, &end).expect("entries");
        assert!(entries.iter().all(|e| e.business_date == Some(20240308)));
        assert!(entries.iter().all(|e| e.regular_hours.unwrap_or(0.0) > 0.0));
    }

    #[test]
    fn syncs_end_to_end() {
        let mut conn = test_connection();
        let source = FakePosSource::new(chrono_tz::America::New_York);
        let mut session = SyncSession::new(
            &source,
            SyncOptions {
                default_wage: 15.0,
                default_timezone: chrono_tz::America::New_York,
            },
        );
        let outcome = session.sync_date(&mut conn, "loc-demo", day()).expect("sync");
        assert!(outcome.order_count > 0);

        use schema::daily_metrics::dsl as DM;
        let daily: DailyMetric = DM::daily_metrics.select(DailyMetric::as_select()).first(&mut conn).expect("daily");
        assert!(daily.net_sales > 0.0);
        assert_eq!(daily.location_name, "Demo loc-de");

        use schema::hourly_metrics::dsl as HM;
        let hourly: Vec<f64> = HM::hourly_metrics.select(HM::net_sales).load(&mut conn).expect("hourly");
        let sum: f64 = hourly.iter().sum();
        assert!((sum - daily.net_sales).abs() <= 0.01 * hourly.len() as f64);
    }
}
