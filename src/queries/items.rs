//! Menu item reads: rankings, category mix, attach rates and item trends.

use chrono::NaiveDate;
use diesel::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::db::models::ItemDailyMetric;
use crate::queries::lookup::{escape_like, normalize_names, Lookup, LookupResult};
use crate::queries::sales::{daily_row, shares_of, Share};
use crate::schema;
use crate::utils::round_money;

use schema::item_daily_metrics::dsl as IM;

pub const DEFAULT_BOTTOM_LIMIT: usize = 10;

/// Case-insensitive sales category filter. A category on both lists is included.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryFilter {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl CategoryFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Self {
        let include = normalize_names(include);
        let exclude = normalize_names(exclude)
            .into_iter()
            .filter(|e| !include.iter().any(|i| i.eq_ignore_ascii_case(e)))
            .collect();
        CategoryFilter { include, exclude }
    }

    pub fn include(&self) -> &[String] {
        &self.include
    }

    pub fn exclude(&self) -> &[String] {
        &self.exclude
    }

    pub fn admits(&self, category: &str) -> bool {
        let category = category.to_lowercase();
        let listed = |names: &[String]| names.iter().any(|n| n.to_lowercase() == category);
        (self.include.is_empty() || listed(self.include.as_slice())) && !listed(self.exclude.as_slice())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedItem {
    pub rank: usize,
    pub name: String,
    pub category: String,
    pub quantity_sold: f64,
    pub revenue: f64,
    pub avg_price: f64,
    pub order_count: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRanking {
    pub date: NaiveDate,
    pub location_id: String,
    pub include_categories: Vec<String>,
    pub exclude_categories: Vec<String>,
    pub item_count: usize,
    pub items: Vec<RankedItem>,
}

fn ranked_items(
    conn: &mut SqliteConnection,
    location: &str,
    date: NaiveDate,
    filter: &CategoryFilter,
    limit: Option<usize>,
    best_first: bool,
) -> LookupResult<ItemRanking> {
    let mut rows: Vec<ItemDailyMetric> = IM::item_daily_metrics
        .filter(IM::location_guid.eq(location))
        .filter(IM::business_date.eq(date))
        .order(IM::display_name.asc())
        .select(ItemDailyMetric::as_select())
        .load(conn)?;
    if rows.is_empty() {
        return Ok(Lookup::no_data(format!("No item data for {}", date)));
    }

    rows.retain(|r| r.revenue > 0.0 && filter.admits(&r.sales_category_name));
    if best_first {
        rows.sort_by(|a, b| b.revenue.total_cmp(&a.revenue));
    } else {
        rows.sort_by(|a, b| a.revenue.total_cmp(&b.revenue));
    }
    if let Some(limit) = limit {
        rows.truncate(limit);
    }

    let items: Vec<RankedItem> = rows
        .into_iter()
        .enumerate()
        .map(|(i, r)| RankedItem {
            rank: i + 1,
            name: r.display_name,
            category: r.sales_category_name,
            quantity_sold: r.quantity_sold,
            revenue: r.revenue,
            avg_price: r.avg_price,
            order_count: r.order_count,
        })
        .collect();
    Ok(Lookup::Found(ItemRanking {
        date,
        location_id: location.to_string(),
        include_categories: filter.include().to_vec(),
        exclude_categories: filter.exclude().to_vec(),
        item_count: items.len(),
        items,
    }))
}

/// Items with revenue, best first. Every matching item when `limit` is `None`.
pub fn top_items(
    conn: &mut SqliteConnection,
    location: &str,
    date: NaiveDate,
    filter: &CategoryFilter,
    limit: Option<usize>,
) -> LookupResult<ItemRanking> {
    ranked_items(conn, location, date, filter, limit, true)
}

/// Items with revenue, weakest first; [`DEFAULT_BOTTOM_LIMIT`] rows unless told otherwise.
pub fn bottom_items(
    conn: &mut SqliteConnection,
    location: &str,
    date: NaiveDate,
    filter: &CategoryFilter,
    limit: Option<usize>,
) -> LookupResult<ItemRanking> {
    ranked_items(conn, location, date, filter, Some(limit.unwrap_or(DEFAULT_BOTTOM_LIMIT)), false)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryBreakdown {
    pub date: NaiveDate,
    pub location_id: String,
    pub net_sales: f64,
    pub categories: Vec<Share>,
}

pub fn category_breakdown(conn: &mut SqliteConnection, location: &str, date: NaiveDate) -> LookupResult<CategoryBreakdown> {
    let Some(row) = daily_row(conn, location, date)? else {
        return Ok(Lookup::no_data(format!("No data found for {}", date)));
    };
    Ok(Lookup::Found(CategoryBreakdown {
        date,
        categories: shares_of(&row.sales_by_category, row.net_sales),
        location_id: row.location_guid,
        net_sales: row.net_sales,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairedCategory {
    pub category: String,
    pub check_count: usize,
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingRate {
    pub date: NaiveDate,
    pub location_id: String,
    pub source_category: String,
    pub paired_categories: Vec<String>,
    pub source_check_count: usize,
    pub paired_check_count: usize,
    pub pairing_rate: f64,
    pub breakdown: Vec<PairedCategory>,
}

/// Percent with one decimal.
fn attach_rate(hits: usize, of: usize) -> f64 {
    if of == 0 {
        return 0.0;
    }
    (hits as f64 / of as f64 * 1000.0).round() / 10.0
}

/// Of the checks holding a `source` category item, the share that also hold
/// an item of any `paired` category. Modifiers and voided selections do not count.
pub fn item_pairing_rate(
    conn: &mut SqliteConnection,
    location: &str,
    date: NaiveDate,
    source: &str,
    paired: &[String],
) -> LookupResult<PairingRate> {
    use schema::order_items::dsl as OI;

    let source = source.trim();
    let paired: Vec<String> = normalize_names(paired)
        .into_iter()
        .filter(|p| !p.eq_ignore_ascii_case(source))
        .collect();
    if paired.is_empty() {
        return Ok(Lookup::no_data(format!(
            "Paired categories must include at least one category other than {}",
            source
        )));
    }

    let rows: Vec<(String, String)> = OI::order_items
        .filter(OI::location_guid.eq(location))
        .filter(OI::business_date.eq(date))
        .filter(OI::is_modifier.eq(false))
        .filter(OI::voided.eq(false))
        .select((OI::check_guid, OI::sales_category_name))
        .load(conn)?;
    if rows.is_empty() {
        return Ok(Lookup::no_data(format!("No item data for {}", date)));
    }

    let mut categories_by_check: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (check, category) in rows {
        categories_by_check.entry(check).or_default().insert(category.to_lowercase());
    }
    let source_key = source.to_lowercase();
    let source_checks: Vec<&BTreeSet<String>> = categories_by_check
        .values()
        .filter(|cats| cats.contains(&source_key))
        .collect();
    let with = |wanted: &[String]| {
        source_checks
            .iter()
            .filter(|cats| wanted.iter().any(|w| cats.contains(&w.to_lowercase())))
            .count()
    };

    let paired_check_count = with(paired.as_slice());
    let breakdown = paired
        .iter()
        .map(|p| {
            let count = with(std::slice::from_ref(p));
            PairedCategory {
                category: p.clone(),
                check_count: count,
                rate: attach_rate(count, source_checks.len()),
            }
        })
        .collect();

    Ok(Lookup::Found(PairingRate {
        date,
        location_id: location.to_string(),
        source_category: source.to_string(),
        source_check_count: source_checks.len(),
        paired_check_count,
        pairing_rate: attach_rate(paired_check_count, source_checks.len()),
        paired_categories: paired,
        breakdown,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDay {
    pub date: NaiveDate,
    pub name: String,
    pub quantity_sold: f64,
    pub revenue: f64,
    pub avg_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPerformance {
    pub item_name: String,
    pub location_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_revenue: f64,
    pub total_quantity: f64,
    pub day_count: usize,
    pub trend: Vec<ItemDay>,
}

/// Daily rows for items whose name contains `name` (case-insensitive).
pub fn item_performance(
    conn: &mut SqliteConnection,
    location: &str,
    name: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> LookupResult<ItemPerformance> {
    let pattern = format!("%{}%", escape_like(name.trim()));
    let rows: Vec<ItemDailyMetric> = IM::item_daily_metrics
        .filter(IM::location_guid.eq(location))
        .filter(IM::display_name.like(pattern).escape('\\'))
        .filter(IM::business_date.between(start, end))
        .order((IM::business_date.asc(), IM::display_name.asc()))
        .select(ItemDailyMetric::as_select())
        .load(conn)?;
    if rows.is_empty() {
        return Ok(Lookup::no_data(format!(
            "No sales of items matching {:?} between {} and {}",
            name, start, end
        )));
    }

    let distinct_days: BTreeSet<NaiveDate> = rows.iter().map(|r| r.business_date).collect();
    Ok(Lookup::Found(ItemPerformance {
        item_name: name.to_string(),
        location_id: location.to_string(),
        start_date: start,
        end_date: end,
        total_revenue: round_money(rows.iter().map(|r| r.revenue).sum()),
        total_quantity: round_money(rows.iter().map(|r| r.quantity_sold).sum()),
        day_count: distinct_days.len(),
        trend: rows
            .into_iter()
            .map(|r| ItemDay {
                date: r.business_date,
                name: r.display_name,
                quantity_sold: r.quantity_sold,
                revenue: r.revenue,
                avg_price: r.avg_price,
            })
            .collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::NewOrderItem;
    use crate::db::store::test_connection;
    use crate::queries::sales::tests::synced_scenario;
    use crate::services::normalize::tests::scenario_date;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn item(check: &str, category: &str) -> NewOrderItem {
        NewOrderItem {
            order_guid: format!("o-{}", check),
            check_guid: check.to_string(),
            location_guid: "loc-1".into(),
            business_date: d(2),
            selection_guid: format!("s-{}-{}", check, category),
            display_name: format!("{} item", category),
            item_guid: String::new(),
            sales_category_guid: String::new(),
            sales_category_name: category.to_string(),
            quantity: 1.0,
            price: 10.0,
            pre_discount_price: 10.0,
            tax: 0.0,
            voided: false,
            is_modifier: false,
        }
    }

    fn item_day(name: &str, category: &str, date: NaiveDate, revenue: f64) -> ItemDailyMetric {
        ItemDailyMetric {
            location_guid: "loc-1".into(),
            business_date: date,
            display_name: name.to_string(),
            sales_category_name: category.to_string(),
            quantity_sold: 2.0,
            revenue,
            avg_price: revenue / 2.0,
            order_count: 2,
        }
    }

    /// Ten food checks; four also carry wine. A wine modifier and a voided
    /// wine selection on the other food checks must not count.
    fn pairing_scenario(conn: &mut SqliteConnection) {
        use schema::order_items::dsl as OI;
        let mut rows = Vec::new();
        for n in 0..10 {
            rows.push(item(&format!("c{}", n), "Food"));
        }
        for n in 0..4 {
            rows.push(item(&format!("c{}", n), "Wine"));
        }
        let mut modifier = item("c5", "Wine");
        modifier.is_modifier = true;
        let mut voided = item("c6", "Wine");
        voided.voided = true;
        rows.push(modifier);
        rows.push(voided);
        rows.push(item("c11", "Wine"));
        diesel::insert_into(OI::order_items).values(&rows).execute(conn).expect("insert items");
    }

    #[test]
    fn pairing_rate_four_of_ten() {
        let mut conn = test_connection();
        pairing_scenario(&mut conn);
        let rate = item_pairing_rate(
            &mut conn,
            "loc-1",
            d(2),
            "food",
            &["Wine".to_string(), "Draft Beer".to_string(), "FOOD".to_string()],
        )
        .expect("query")
        .found()
        .expect("found");
        assert_eq!(rate.source_check_count, 10);
        assert_eq!(rate.paired_check_count, 4);
        assert_eq!(rate.pairing_rate, 40.0);
        assert_eq!(rate.paired_categories, vec!["Wine".to_string(), "Draft Beer".to_string()]);
        assert_eq!(rate.breakdown[1].check_count, 0);
        assert_eq!(rate.breakdown[1].rate, 0.0);
    }

    #[test]
    fn pairing_needs_a_distinct_category() {
        let mut conn = test_connection();
        pairing_scenario(&mut conn);
        let result = item_pairing_rate(&mut conn, "loc-1", d(2), "Food", &[" food ".to_string()]).expect("query");
        assert!(!result.is_found());
    }

    #[test]
    fn attach_rate_rounds_to_one_decimal() {
        assert_eq!(attach_rate(1, 3), 33.3);
        assert_eq!(attach_rate(2, 3), 66.7);
        assert_eq!(attach_rate(0, 0), 0.0);
    }

    #[test]
    fn filters_apply_case_insensitively() {
        let mut conn = test_connection();
        let rows = vec![
            item_day("Burger", "Food", d(2), 48.0),
            item_day("Salad", "Food", d(2), 12.0),
            item_day("House Red", "Wine", d(2), 27.0),
            item_day("Comp Bread", "Food", d(2), 0.0),
            item_day("Espresso", "NA Beverage", d(2), 6.0),
        ];
        diesel::insert_into(IM::item_daily_metrics).values(&rows).execute(&mut conn).expect("insert");

        let food_only = CategoryFilter::new(&["food".to_string()], &["FOOD".to_string(), "wine".to_string()]);
        assert_eq!(food_only.exclude(), &["wine".to_string()]);
        let top = top_items(&mut conn, "loc-1", d(2), &food_only, None).expect("query").found().expect("found");
        let names: Vec<&str> = top.items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Burger", "Salad"]);

        let no_wine = CategoryFilter::new(&[], &["WINE".to_string()]);
        let bottom = bottom_items(&mut conn, "loc-1", d(2), &no_wine, Some(2)).expect("query").found().expect("found");
        let names: Vec<&str> = bottom.items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Espresso", "Salad"]);
        assert_eq!(bottom.items[1].rank, 2);
    }

    #[test]
    fn ranking_without_rows_is_no_data() {
        let mut conn = test_connection();
        let result = top_items(&mut conn, "loc-1", d(2), &CategoryFilter::default(), None).expect("query");
        assert_eq!(result.message(), Some("No item data for 2024-03-02"));
    }

    #[test]
    fn item_performance_matches_substrings() {
        let mut conn = test_connection();
        let rows = vec![
            item_day("Burger", "Food", d(1), 32.0),
            item_day("Cheese Burger", "Food", d(2), 36.0),
            item_day("Salad", "Food", d(2), 12.0),
            item_day("Burger", "Food", d(9), 40.0),
        ];
        diesel::insert_into(IM::item_daily_metrics).values(&rows).execute(&mut conn).expect("insert");

        let perf = item_performance(&mut conn, "loc-1", "burger", d(1), d(7)).expect("query").found().expect("found");
        assert_eq!(perf.total_revenue, 68.0);
        assert_eq!(perf.day_count, 2);
        assert_eq!(perf.trend.len(), 2);
        assert!(!item_performance(&mut conn, "loc-1", "bur_er", d(1), d(7)).expect("query").is_found());
    }

    #[test]
    fn scenario_categories_sorted_by_revenue() {
        let mut conn = synced_scenario();
        let breakdown = category_breakdown(&mut conn, "loc-1", scenario_date())
            .expect("query")
            .found()
            .expect("found");
        assert_eq!(breakdown.categories[0].name, "Food");
        assert_eq!(breakdown.categories[0].revenue, 75.0);
        assert_eq!(breakdown.categories[0].pct, 62.5);
    }
}
