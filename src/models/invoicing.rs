//! Back-office invoicing API payloads.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::utils::serde_enum_name;

/// Invoice lifecycle states. Only `Closed` invoices feed cost rollups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Preprocessing,
    EdiPending,
    ImagePending,
    InitialReview,
    Reconciliation,
    FinalReview,
    AmReview,
    PendingApproval,
    Closed,
}

impl OrderStatus {
    pub const FINALIZED: OrderStatus = OrderStatus::Closed;

    /// Wire name, e.g. `PENDING_APPROVAL`.
    pub fn name(&self) -> String {
        serde_enum_name(self).unwrap_or_default()
    }

    /// Parse a wire name, case-insensitively.
    pub fn from_name(name: &str) -> Option<OrderStatus> {
        serde_json::from_value(Value::String(name.trim().to_uppercase())).ok()
    }
}

/// Ids arrive as strings on some endpoints and numbers on others.
fn flexible_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(other) => Some(other.to_string()),
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RestaurantUnit {
    #[serde(deserialize_with = "flexible_id")]
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Category {
    #[serde(deserialize_with = "flexible_id")]
    pub category_id: Option<String>,
    pub category_name: Option<String>,
    pub category_type: Option<String>,
    #[serde(deserialize_with = "flexible_id")]
    pub accounting_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Vendor {
    #[serde(deserialize_with = "flexible_id")]
    pub vendor_id: Option<String>,
    pub vendor_name: Option<String>,
    #[serde(deserialize_with = "flexible_id")]
    pub central_vendor_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderSummary {
    #[serde(deserialize_with = "flexible_id")]
    pub order_id: Option<String>,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<String>,
    pub created_date: Option<String>,
    #[serde(deserialize_with = "flexible_id")]
    pub vendor_id: Option<String>,
    pub vendor_name: Option<String>,
    pub order_total: Option<f64>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LineItem {
    pub vendor_item_code: Option<String>,
    pub vendor_item_name: Option<String>,
    #[serde(deserialize_with = "flexible_id")]
    pub company_concept_product_id: Option<String>,
    #[serde(deserialize_with = "flexible_id")]
    pub category_id: Option<String>,
    #[serde(deserialize_with = "flexible_id")]
    pub packaging_id: Option<String>,
    pub quantity: Option<f64>,
    pub unit_price: Option<f64>,
    pub line_price: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderDetail {
    #[serde(deserialize_with = "flexible_id")]
    pub order_id: Option<String>,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<String>,
    pub created_date: Option<String>,
    #[serde(deserialize_with = "flexible_id")]
    pub vendor_id: Option<String>,
    pub vendor_name: Option<String>,
    pub order_total: Option<f64>,
    pub tax: Option<f64>,
    pub delivery_charges: Option<f64>,
    pub other_charges: Option<f64>,
    pub credit_amount: Option<f64>,
    pub is_credit: Option<bool>,
    pub status: Option<String>,
    pub line_items: Option<Vec<LineItem>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_names_match_wire_format() {
        assert_eq!(OrderStatus::FINALIZED.name(), "CLOSED");
        assert_eq!(OrderStatus::PendingApproval.name(), "PENDING_APPROVAL");
        let parsed: OrderStatus = serde_json::from_str("\"AM_REVIEW\"").expect("status");
        assert_eq!(parsed, OrderStatus::AmReview);
        assert_eq!(OrderStatus::from_name(" closed "), Some(OrderStatus::Closed));
        assert_eq!(OrderStatus::from_name("final_review"), Some(OrderStatus::FinalReview));
        assert_eq!(OrderStatus::from_name("ALL"), None);
    }

    #[test]
    fn numeric_ids_become_strings() {
        let unit: RestaurantUnit = serde_json::from_str(r#"{"id": 1234, "name": "Downtown"}"#).expect("unit");
        assert_eq!(unit.id.as_deref(), Some("1234"));

        let category: Category = serde_json::from_str(
            r#"{"categoryId": "c-1", "categoryName": "Produce", "categoryType": "FOOD", "accountingCode": null}"#,
        )
        .expect("category");
        assert_eq!(category.accounting_code, None);

        let category: Category =
            serde_json::from_str(r#"{"categoryId": "c-2", "accountingCode": 5010}"#).expect("category");
        assert_eq!(category.accounting_code.as_deref(), Some("5010"));
    }

    #[test]
    fn detail_decodes_line_items() {
        let detail: OrderDetail = serde_json::from_str(
            r#"{
                "orderId": "ord-9",
                "invoiceDate": "2024-01-05",
                "createdDate": "2024-01-04T15:00:00Z",
                "vendorName": "Sysco",
                "orderTotal": 110.0,
                "isCredit": false,
                "status": "CLOSED",
                "lineItems": [{"linePrice": 60.0, "categoryId": "c-1"}, {"linePrice": 40.0}]
            }"#,
        )
        .expect("detail");
        assert_eq!(detail.order_id.as_deref(), Some("ord-9"));
        assert_eq!(detail.line_items.as_ref().map(Vec::len), Some(2));
    }
}
