//! Blocking client for the back-office invoicing API.
//!
//! Static `X-Api-Key` authentication. List endpoints wrap their rows under a
//! named key and continue with a `nextPage` token in the body.

use http::header;
use log::debug;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

use crate::client::error::{decode_json, ApiError};
use crate::client::paging::{drain_token_pages, TokenPage};
use crate::client::throttle::RequestThrottle;
use crate::client::transport::{read_response, RawResponse};
use crate::models::invoicing::*;

pub const DEFAULT_BASE_URL: &str = "https://api.marginedge.com/public";
const API_KEY_HEADER: &str = "X-Api-Key";
const NEXT_PAGE_KEY: &str = "nextPage";

pub trait InvoicingApi {
    fn restaurant_units(&self) -> Result<Vec<RestaurantUnit>, ApiError>;
    fn categories(&self, unit_id: &str) -> Result<Vec<Category>, ApiError>;
    fn vendors(&self, unit_id: &str) -> Result<Vec<Vendor>, ApiError>;
    /// Invoices created between `start` and `end` (inclusive, `YYYY-MM-DD`), optionally by status.
    fn orders_by_created_range(
        &self,
        unit_id: &str,
        start: &str,
        end: &str,
        status: Option<OrderStatus>,
    ) -> Result<Vec<OrderSummary>, ApiError>;
    fn order_detail(&self, unit_id: &str, order_id: &str) -> Result<OrderDetail, ApiError>;
}

#[derive(Debug, Clone)]
pub struct InvoicingSettings {
    pub base_url: String,
    pub api_key: String,
    pub min_interval: Duration,
    pub timeout: Duration,
}

pub struct InvoicingClient {
    agent: ureq::Agent,
    settings: InvoicingSettings,
    throttle: RequestThrottle,
}

impl InvoicingClient {
    pub fn new(settings: InvoicingSettings) -> Result<Self, ApiError> {
        if settings.api_key.trim().is_empty() {
            return Err(ApiError::Config("invoicing API key is empty".into()));
        }
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(settings.timeout))
            .build();
        Ok(InvoicingClient {
            agent: ureq::Agent::new_with_config(config),
            throttle: RequestThrottle::new(settings.min_interval),
            settings,
        })
    }

    fn url(&self, path: &str) -> String {
        let base = self.settings.base_url.trim_end_matches('/');
        format!("{}/{}", base, path.trim_start_matches('/'))
    }

    fn get(&self, path: &str, query: &[(&str, String)]) -> Result<RawResponse, ApiError> {
        let url = self.url(path);
        let raw = self.throttle.run(|| -> Result<RawResponse, ApiError> {
            let mut req = self
                .agent
                .get(&url)
                .header(header::ACCEPT, "application/json")
                .header(API_KEY_HEADER, self.settings.api_key.as_str());
            for (k, v) in query {
                req = req.query(k, v);
            }
            read_response(req.call()?)
        })?;
        if raw.status == 401 || raw.status == 403 {
            return Err(ApiError::Auth(format!("{} rejected the API key (http {})", path, raw.status)));
        }
        raw.into_success(path)
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, ApiError> {
        let raw = self.get(path, query)?;
        decode_json(path, &raw.body)
    }

    /// One page of a token-paginated list, rows taken from `list_key`.
    pub fn fetch_page<T: DeserializeOwned>(
        &self,
        path: &str,
        list_key: &str,
        params: &[(&str, String)],
        token: Option<&str>,
    ) -> Result<TokenPage<T>, ApiError> {
        let mut query = params.to_vec();
        if let Some(token) = token {
            query.push((NEXT_PAGE_KEY, token.to_string()));
        }
        let body: Value = self.get_json(path, &query)?;
        split_token_page(path, list_key, body)
    }

    /// Every row of a token-paginated list.
    pub fn fetch_all<T: DeserializeOwned>(
        &self,
        path: &str,
        list_key: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<T>, ApiError> {
        let rows = drain_token_pages(|token| self.fetch_page(path, list_key, params, token))?;
        debug!("{}: {} {} row(s)", path, rows.len(), list_key);
        Ok(rows)
    }
}

/// Pull the rows under `list_key` (missing means none) and the continuation token.
fn split_token_page<T: DeserializeOwned>(path: &str, list_key: &str, mut body: Value) -> Result<TokenPage<T>, ApiError> {
    let next_page = body
        .get(NEXT_PAGE_KEY)
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|t| !t.is_empty());
    let rows = match body.get_mut(list_key).map(Value::take) {
        None | Some(Value::Null) => Vec::new(),
        Some(list) => serde_path_to_error::deserialize(list).map_err(|e| ApiError::Decode {
            path: path.to_string(),
            message: format!("at `{}.{}`: {}", list_key, e.path(), e.inner()),
        })?,
    };
    Ok(TokenPage { rows, next_page })
}

impl InvoicingApi for InvoicingClient {
    fn restaurant_units(&self) -> Result<Vec<RestaurantUnit>, ApiError> {
        self.fetch_all("/restaurantUnits", "restaurants", &[])
    }

    fn categories(&self, unit_id: &str) -> Result<Vec<Category>, ApiError> {
        self.fetch_all("/categories", "categories", &[("restaurantUnitId", unit_id.to_string())])
    }

    fn vendors(&self, unit_id: &str) -> Result<Vec<Vendor>, ApiError> {
        self.fetch_all("/vendors", "vendors", &[("restaurantUnitId", unit_id.to_string())])
    }

    fn orders_by_created_range(
        &self,
        unit_id: &str,
        start: &str,
        end: &str,
        status: Option<OrderStatus>,
    ) -> Result<Vec<OrderSummary>, ApiError> {
        let mut params = vec![
            ("restaurantUnitId", unit_id.to_string()),
            ("startDate", start.to_string()),
            ("endDate", end.to_string()),
        ];
        if let Some(status) = status {
            params.push(("orderStatus", status.name()));
        }
        self.fetch_all("/orders", "orders", &params)
    }

    fn order_detail(&self, unit_id: &str, order_id: &str) -> Result<OrderDetail, ApiError> {
        let path = format!("/orders/{}", encode_path_segment(order_id));
        self.get_json(&path, &[("restaurantUnitId", unit_id.to_string())])
    }
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
fn encode_path_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn token_page_reads_rows_and_token() {
        let page: TokenPage<Vendor> = split_token_page(
            "/vendors",
            "vendors",
            json!({"nextPage": "abc", "vendors": [{"vendorId": "v1", "vendorName": "Sysco"}]}),
        )
        .expect("page");
        assert_eq!(page.next_page.as_deref(), Some("abc"));
        assert_eq!(page.rows[0].vendor_name.as_deref(), Some("Sysco"));
    }

    #[test]
    fn missing_list_key_is_empty_page() {
        let page: TokenPage<Vendor> = split_token_page("/vendors", "vendors", json!({"nextPage": ""})).expect("page");
        assert!(page.rows.is_empty());
        assert_eq!(page.next_page, None);
    }

    #[test]
    fn malformed_rows_report_path() {
        let err = split_token_page::<Category>("/categories", "categories", json!({"categories": [{"categoryName": 5}]}))
            .unwrap_err();
        match err {
            ApiError::Decode { message, .. } => assert!(message.contains("categories.[0].categoryName"), "{}", message),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn order_ids_are_path_encoded() {
        assert_eq!(encode_path_segment("ord 1/2"), "ord%201%2F2");
        assert_eq!(encode_path_segment("abc-123_x.y~"), "abc-123_x.y~");
    }

    #[test]
    fn rejects_empty_api_key() {
        let settings = InvoicingSettings {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: "".into(),
            min_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(30),
        };
        assert!(matches!(InvoicingClient::new(settings), Err(ApiError::Config(_))));
    }
}
