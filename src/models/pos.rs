//! Point-of-sale API payloads.
//!
//! Only the fields the ingestion uses are modeled; everything is optional
//! because the API omits empty values rather than sending nulls.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntityRef {
    pub guid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
}

impl EntityRef {
    pub fn new(guid: impl Into<String>) -> Self {
        EntityRef {
            guid: guid.into(),
            ..Default::default()
        }
    }
}

/// Guid of an optional reference, treating an empty guid as absent.
pub fn ref_guid(r: &Option<EntityRef>) -> Option<&str> {
    r.as_ref().map(|e| e.guid.as_str()).filter(|g| !g.is_empty())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest<'a> {
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub user_access_type: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthToken {
    pub access_token: String,
    pub expires_in: u64,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub token: AuthToken,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Order {
    pub guid: String,
    pub server: Option<EntityRef>,
    pub dining_option: Option<EntityRef>,
    pub revenue_center: Option<EntityRef>,
    pub opened_date: Option<String>,
    pub closed_date: Option<String>,
    pub paid_date: Option<String>,
    pub business_date: Option<u32>,
    pub number_of_guests: Option<i32>,
    pub approval_status: Option<String>,
    pub voided: Option<bool>,
    pub deleted: Option<bool>,
    pub checks: Option<Vec<Check>>,
}

impl Order {
    pub fn is_excluded(&self) -> bool {
        self.voided.unwrap_or(false) || self.deleted.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Check {
    pub guid: String,
    pub display_number: Option<String>,
    pub payment_status: Option<String>,
    pub amount: Option<f64>,
    pub tax_amount: Option<f64>,
    pub total_amount: Option<f64>,
    pub tip_amount: Option<f64>,
    pub selections: Option<Vec<Selection>>,
    pub payments: Option<Vec<Payment>>,
    pub applied_discounts: Option<Vec<AppliedDiscount>>,
    pub voided: Option<bool>,
    pub deleted: Option<bool>,
}

impl Check {
    pub fn is_excluded(&self) -> bool {
        self.voided.unwrap_or(false) || self.deleted.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Selection {
    pub guid: String,
    pub display_name: Option<String>,
    pub item: Option<EntityRef>,
    pub item_group: Option<EntityRef>,
    pub sales_category: Option<EntityRef>,
    pub quantity: Option<f64>,
    pub price: Option<f64>,
    pub pre_discount_price: Option<f64>,
    pub receipt_line_price: Option<f64>,
    pub tax: Option<f64>,
    pub voided: Option<bool>,
    pub modifiers: Option<Vec<Selection>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Payment {
    pub guid: String,
    #[serde(rename = "type")]
    pub payment_type: Option<String>,
    pub amount: Option<f64>,
    pub tip_amount: Option<f64>,
    pub payment_status: Option<String>,
    pub refund_status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppliedDiscount {
    pub guid: Option<String>,
    pub name: Option<String>,
    pub discount_amount: Option<f64>,
    pub discount_percent: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeEntry {
    pub guid: String,
    pub employee_reference: Option<EntityRef>,
    pub job_reference: Option<EntityRef>,
    pub in_date: Option<String>,
    pub out_date: Option<String>,
    pub regular_hours: Option<f64>,
    pub overtime_hours: Option<f64>,
    pub cash_sales: Option<f64>,
    pub non_cash_sales: Option<f64>,
    pub cash_gratuity_service_charges: Option<f64>,
    pub non_cash_gratuity_service_charges: Option<f64>,
    pub declared_cash_tips: Option<f64>,
    pub business_date: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Employee {
    pub guid: String,
    pub external_employee_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub deleted: Option<bool>,
    pub jobs: Option<Vec<EmployeeJob>>,
}

impl Employee {
    /// "First Last", either half optional; "Unknown" when both are blank.
    pub fn full_name(&self) -> String {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if name.is_empty() { "Unknown".to_string() } else { name }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmployeeJob {
    pub guid: String,
    pub title: Option<String>,
    pub wage_type: Option<String>,
    pub wage_amount: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SalesCategory {
    pub guid: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RevenueCenter {
    pub guid: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiningOption {
    pub guid: String,
    pub name: Option<String>,
    pub behavior: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RestaurantGeneral {
    pub name: Option<String>,
    pub location_name: Option<String>,
    pub location_code: Option<String>,
    pub time_zone: Option<String>,
    pub closeout_hour: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RestaurantLocation {
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub city: Option<String>,
    pub state_code: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RestaurantInfo {
    pub guid: String,
    pub general: Option<RestaurantGeneral>,
    pub location: Option<RestaurantLocation>,
}
