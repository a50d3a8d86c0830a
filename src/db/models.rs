//! Diesel model structs for raw rows, rollups and sync bookkeeping.
//!
//! Map-valued rollup columns are stored as JSON text and surface here as
//! [`AmountMap`]; sync warnings surface as [`WarningList`].

use chrono::{NaiveDate, NaiveDateTime};
use diesel::backend::Backend;
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::sqlite::Sqlite;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::schema;
use crate::utils::round_money;

pub mod sync_status {
    pub const SUCCESS: &str = "success";
    pub const PARTIAL: &str = "partial";
    pub const ERROR: &str = "error";
}

pub mod sync_type {
    pub const ORDERS: &str = "orders";
    pub const REF_DATA: &str = "ref_data";
}

/// Open-ended `name -> amount` mapping persisted as a JSON object.
///
/// Backed by a `BTreeMap` so iteration (and therefore summation and
/// serialization) happens in key order on every run.
#[derive(Debug, Clone, Default, PartialEq, AsExpression, FromSqlRow, Serialize, Deserialize)]
#[diesel(sql_type = Text)]
#[serde(transparent)]
pub struct AmountMap(pub BTreeMap<String, f64>);

impl AmountMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: impl Into<String>, amount: f64) {
        *self.0.entry(key.into()).or_insert(0.0) += amount;
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.0.get(key).copied()
    }

    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.0.iter()
    }

    /// Copy with every value passed through [`round_money`].
    pub fn rounded(&self) -> AmountMap {
        AmountMap(self.0.iter().map(|(k, v)| (k.clone(), round_money(*v))).collect())
    }

    /// Parse stored JSON, keeping only finite numeric entries.
    ///
    /// Malformed text yields an empty map.
    pub fn parse_lenient(text: &str) -> AmountMap {
        match serde_json::from_str::<BTreeMap<String, serde_json::Value>>(text) {
            Ok(raw) => AmountMap(
                raw.into_iter()
                    .filter_map(|(k, v)| v.as_f64().filter(|n| n.is_finite()).map(|n| (k, n)))
                    .collect(),
            ),
            Err(e) => {
                warn!("Ignoring malformed amount map column: {}", e);
                AmountMap::default()
            }
        }
    }
}

impl ToSql<Text, Sqlite> for AmountMap {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
        let json = serde_json::to_string(&self.0)?;
        out.set_value(json);
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Sqlite> for AmountMap {
    fn from_sql(value: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
        let text = <String as FromSql<Text, Sqlite>>::from_sql(value)?;
        Ok(AmountMap::parse_lenient(&text))
    }
}

/// Warning strings collected during a sync, persisted as a JSON array.
#[derive(Debug, Clone, Default, PartialEq, Eq, AsExpression, FromSqlRow, Serialize, Deserialize)]
#[diesel(sql_type = Text)]
#[serde(transparent)]
pub struct WarningList(pub Vec<String>);

impl WarningList {
    pub fn push(&mut self, warning: impl Into<String>) {
        self.0.push(warning.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    /// `partial` when anything was collected, else `success`.
    pub fn status(&self) -> &'static str {
        if self.0.is_empty() {
            sync_status::SUCCESS
        } else {
            sync_status::PARTIAL
        }
    }
}

impl ToSql<Text, Sqlite> for WarningList {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
        let json = serde_json::to_string(&self.0)?;
        out.set_value(json);
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Sqlite> for WarningList {
    fn from_sql(value: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
        let text = <String as FromSql<Text, Sqlite>>::from_sql(value)?;
        match serde_json::from_str::<Vec<String>>(&text) {
            Ok(list) => Ok(WarningList(list)),
            Err(e) => {
                warn!("Ignoring malformed warnings column: {}", e);
                Ok(WarningList::default())
            }
        }
    }
}

// =====================
// POS reference data
// =====================

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::locations)]
pub struct Location {
    pub guid: String,
    pub name: String,
    pub location_name: String,
    pub timezone: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

impl Location {
    /// Human label: location name, then restaurant name, then a guid prefix.
    pub fn display_name(&self) -> String {
        display_name_for(&self.guid, Some(self.location_name.as_str()), Some(self.name.as_str()))
    }
}

pub fn display_name_for(guid: &str, location_name: Option<&str>, name: Option<&str>) -> String {
    [location_name, name]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| guid.chars().take(8).collect())
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::sales_categories)]
pub struct SalesCategory {
    pub guid: String,
    pub location_guid: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::revenue_centers)]
pub struct RevenueCenter {
    pub guid: String,
    pub location_guid: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::dining_options)]
pub struct DiningOption {
    pub guid: String,
    pub location_guid: String,
    pub name: String,
    pub behavior: String,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::employees)]
pub struct Employee {
    pub guid: String,
    pub location_guid: String,
    pub external_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::employee_jobs)]
pub struct EmployeeJob {
    pub guid: String,
    pub employee_guid: String,
    pub title: String,
    pub wage_type: String,
    pub wage_amount: f64,
}

// =====================
// POS raw transactional rows
// =====================

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::orders)]
pub struct OrderRow {
    pub guid: String,
    pub location_guid: String,
    pub business_date: NaiveDate,
    pub server_guid: Option<String>,
    pub dining_option_guid: Option<String>,
    pub revenue_center_guid: Option<String>,
    pub opened_at: Option<String>,
    pub closed_at: Option<String>,
    pub paid_at: Option<String>,
    pub voided: bool,
    pub deleted: bool,
    pub guest_count: i32,
    pub approval_status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::checks)]
pub struct CheckRow {
    pub guid: String,
    pub order_guid: String,
    pub location_guid: String,
    pub business_date: NaiveDate,
    pub payment_status: String,
    pub amount: f64,
    pub tax_amount: f64,
    pub total_amount: f64,
    pub tip_amount: f64,
    pub voided: bool,
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = schema::order_items)]
pub struct NewOrderItem {
    pub order_guid: String,
    pub check_guid: String,
    pub location_guid: String,
    pub business_date: NaiveDate,
    pub selection_guid: String,
    pub display_name: String,
    pub item_guid: String,
    pub sales_category_guid: String,
    pub sales_category_name: String,
    pub quantity: f64,
    pub price: f64,
    pub pre_discount_price: f64,
    pub tax: f64,
    pub voided: bool,
    pub is_modifier: bool,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = schema::order_items)]
pub struct OrderItem {
    pub id: i32,
    pub order_guid: String,
    pub check_guid: String,
    pub location_guid: String,
    pub business_date: NaiveDate,
    pub selection_guid: String,
    pub display_name: String,
    pub item_guid: String,
    pub sales_category_guid: String,
    pub sales_category_name: String,
    pub quantity: f64,
    pub price: f64,
    pub pre_discount_price: f64,
    pub tax: f64,
    pub voided: bool,
    pub is_modifier: bool,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::payments)]
pub struct PaymentRow {
    pub guid: String,
    pub check_guid: String,
    pub order_guid: String,
    pub location_guid: String,
    pub business_date: NaiveDate,
    pub payment_type: String,
    pub amount: f64,
    pub tip_amount: f64,
    pub payment_status: String,
    pub refund_status: String,
}

#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = schema::discounts)]
pub struct NewDiscount {
    pub check_guid: String,
    pub order_guid: String,
    pub location_guid: String,
    pub business_date: NaiveDate,
    pub name: String,
    pub discount_amount: f64,
    pub discount_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::time_entries)]
pub struct TimeEntryRow {
    pub guid: String,
    pub location_guid: String,
    pub business_date: NaiveDate,
    pub employee_guid: Option<String>,
    pub job_guid: Option<String>,
    pub in_date: Option<String>,
    pub out_date: Option<String>,
    pub regular_hours: f64,
    pub overtime_hours: f64,
    pub cash_sales: f64,
    pub non_cash_sales: f64,
    pub cash_tips: f64,
    pub non_cash_tips: f64,
    pub declared_cash_tips: f64,
}

// =====================
// POS rollups
// =====================

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::daily_metrics)]
pub struct DailyMetric {
    pub location_guid: String,
    pub location_name: String,
    pub business_date: NaiveDate,
    pub gross_sales: f64,
    pub net_sales: f64,
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
    pub cash_payments: f64,
    pub credit_payments: f64,
    pub other_payments: f64,
    pub sales_by_category: AmountMap,
    pub sales_by_dining_option: AmountMap,
    pub labor_cost_is_estimated: bool,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::hourly_metrics)]
pub struct HourlyMetric {
    pub location_guid: String,
    pub business_date: NaiveDate,
    pub hour: i32,
    pub order_count: i32,
    pub guest_count: i32,
    pub net_sales: f64,
    pub avg_check: f64,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::item_daily_metrics)]
pub struct ItemDailyMetric {
    pub location_guid: String,
    pub business_date: NaiveDate,
    pub display_name: String,
    pub sales_category_name: String,
    pub quantity_sold: f64,
    pub revenue: f64,
    pub avg_price: f64,
    pub order_count: i32,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::server_daily_metrics)]
pub struct ServerDailyMetric {
    pub location_guid: String,
    pub business_date: NaiveDate,
    pub server_guid: String,
    pub server_name: String,
    pub order_count: i32,
    pub check_count: i32,
    pub guest_count: i32,
    pub net_sales: f64,
    pub tips: f64,
    pub avg_check: f64,
    pub sales_per_hour: f64,
    pub hours_worked: f64,
}

#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = schema::sync_log)]
pub struct NewSyncLog {
    pub location_guid: String,
    pub business_date: NaiveDate,
    pub synced_at: NaiveDateTime,
    pub order_count: i32,
    pub status: String,
    pub warnings: WarningList,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = schema::sync_log)]
pub struct SyncLog {
    pub id: i32,
    pub location_guid: String,
    pub business_date: NaiveDate,
    pub synced_at: NaiveDateTime,
    pub order_count: i32,
    pub status: String,
    pub warnings: WarningList,
}

// =====================
// Invoicing
// =====================

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::invoice_units)]
pub struct InvoiceUnit {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::invoice_categories)]
pub struct InvoiceCategory {
    pub category_id: String,
    pub restaurant_unit_id: String,
    pub category_name: String,
    pub category_type: String,
    pub accounting_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::invoice_vendors)]
pub struct InvoiceVendor {
    pub vendor_id: String,
    pub restaurant_unit_id: String,
    pub vendor_name: String,
    pub central_vendor_id: String,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::invoice_orders)]
pub struct InvoiceOrder {
    pub order_id: String,
    pub restaurant_unit_id: String,
    pub invoice_number: String,
    pub invoice_date: NaiveDate,
    pub created_date: NaiveDate,
    pub vendor_id: String,
    pub vendor_name: String,
    pub order_total: f64,
    pub tax: f64,
    pub delivery_charges: f64,
    pub other_charges: f64,
    pub credit_amount: f64,
    pub is_credit: bool,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = schema::invoice_line_items)]
pub struct NewInvoiceLineItem {
    pub order_id: String,
    pub restaurant_unit_id: String,
    pub vendor_item_code: Option<String>,
    pub vendor_item_name: Option<String>,
    pub quantity: Option<f64>,
    pub unit_price: Option<f64>,
    pub line_price: f64,
    pub category_id: Option<String>,
    pub packaging_id: Option<String>,
    pub company_concept_product_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::daily_costs)]
pub struct DailyCost {
    pub restaurant_unit_id: String,
    pub invoice_date: NaiveDate,
    pub total_cost: f64,
    pub total_tax: f64,
    pub total_delivery: f64,
    pub total_other_charges: f64,
    pub total_credits: f64,
    pub invoice_count: i32,
    pub vendor_count: i32,
    pub cost_by_category: AmountMap,
    pub cost_by_vendor: AmountMap,
}

#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = schema::invoice_sync_log)]
pub struct NewInvoiceSyncLog {
    pub restaurant_unit_id: String,
    pub sync_type: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub synced_at: NaiveDateTime,
    pub record_count: i32,
    pub status: String,
    pub warnings: WarningList,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_map_parse_drops_non_numeric_entries() {
        let map = AmountMap::parse_lenient(r#"{"Food": 12.5, "Bar": "n/a", "Wine": null, "Retail": 3}"#);
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("Food"), Some(12.5));
        assert_eq!(map.get("Retail"), Some(3.0));
    }

    #[test]
    fn amount_map_parse_tolerates_garbage() {
        assert!(AmountMap::parse_lenient("not json").is_empty());
    }

    #[test]
    fn amount_map_rounds_each_value() {
        let mut map = AmountMap::new();
        map.add("Food", 10.005);
        map.add("Food", 0.001);
        map.add("Bar", 1.0 / 3.0);
        let rounded = map.rounded();
        assert_eq!(rounded.get("Food"), Some(10.01));
        assert_eq!(rounded.get("Bar"), Some(0.33));
    }

    #[test]
    fn warning_list_status() {
        let mut warnings = WarningList::default();
        assert_eq!(warnings.status(), sync_status::SUCCESS);
        warnings.push("Could not fetch employees");
        assert_eq!(warnings.status(), sync_status::PARTIAL);
    }

    #[test]
    fn display_name_falls_back_to_guid_prefix() {
        assert_eq!(display_name_for("abcdef123456", Some(" "), Some("")), "abcdef12");
        assert_eq!(display_name_for("abcdef123456", Some("Downtown"), Some("Cafe")), "Downtown");
        assert_eq!(display_name_for("abcdef123456", None, Some("Cafe")), "Cafe");
    }
}
