//! Blocking client for the point-of-sale API.
//!
//! - Client-credential login; the bearer token is cached and refreshed a
//!   configurable margin before it expires.
//! - Every request, including the login, goes through one [`RequestThrottle`].
//! - Bulk orders are paged with `page`/`pageSize` and a `Link: rel="next"` header.

use chrono::NaiveDate;
use http::header;
use log::{debug, info};
use serde::de::DeserializeOwned;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::client::error::{decode_json, ApiError};
use crate::client::paging::{drain_numbered_pages, link_has_next, Page};
use crate::client::throttle::RequestThrottle;
use crate::client::transport::{read_response, RawResponse};
use crate::models::pos::*;
use crate::utils::pos_business_date;

const LOGIN_PATH: &str = "/authentication/v1/authentication/login";
const LOCATION_HEADER: &str = "Toast-Restaurant-External-ID";
const MACHINE_CLIENT: &str = "TOAST_MACHINE_CLIENT";

/// Read-side of the POS used by the sync; implemented by [`PosClient`] and by
/// in-process sources for synthetic data and tests.
pub trait PosApi {
    fn restaurant_info(&self, location: &str) -> Result<RestaurantInfo, ApiError>;
    fn sales_categories(&self, location: &str) -> Result<Vec<SalesCategory>, ApiError>;
    fn revenue_centers(&self, location: &str) -> Result<Vec<RevenueCenter>, ApiError>;
    fn dining_options(&self, location: &str) -> Result<Vec<DiningOption>, ApiError>;
    fn employees(&self, location: &str) -> Result<Vec<Employee>, ApiError>;
    /// Every order for the business date, all pages drained.
    fn orders_for_business_date(&self, location: &str, date: NaiveDate) -> Result<Vec<Order>, ApiError>;
    /// Time entries between two offset-qualified instants.
    fn time_entries(&self, location: &str, start: &str, end: &str) -> Result<Vec<TimeEntry>, ApiError>;
}

#[derive(Debug, Clone)]
pub struct PosSettings {
    pub hostname: String,
    pub client_id: String,
    pub client_secret: String,
    pub min_interval: Duration,
    pub page_size: usize,
    pub refresh_margin: Duration,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    refresh_at: Instant,
}

impl CachedToken {
    /// Refresh `margin` before expiry; tokens shorter than the margin are
    /// used for half their lifetime.
    fn new(access_token: String, expires_in: Duration, margin: Duration, now: Instant) -> Self {
        let usable = if expires_in > margin {
            expires_in - margin
        } else {
            expires_in / 2
        };
        CachedToken {
            access_token,
            refresh_at: now + usable,
        }
    }

    fn is_fresh(&self, now: Instant) -> bool {
        now < self.refresh_at
    }
}

pub struct PosClient {
    agent: ureq::Agent,
    settings: PosSettings,
    token: Mutex<Option<CachedToken>>,
    throttle: RequestThrottle,
}

impl PosClient {
    pub fn new(settings: PosSettings) -> Result<Self, ApiError> {
        if settings.hostname.trim().is_empty() {
            return Err(ApiError::Config("POS hostname is empty".into()));
        }
        if settings.client_id.trim().is_empty() || settings.client_secret.trim().is_empty() {
            return Err(ApiError::Config("POS client credentials are empty".into()));
        }
        if settings.page_size == 0 {
            return Err(ApiError::Config("POS page size must be positive".into()));
        }
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(settings.timeout))
            .build();
        Ok(PosClient {
            agent: ureq::Agent::new_with_config(config),
            throttle: RequestThrottle::new(settings.min_interval),
            token: Mutex::new(None),
            settings,
        })
    }

    fn url(&self, path: &str) -> String {
        let base = self.settings.hostname.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }

    /// Current bearer token, logging in again when the cached one is due for refresh.
    pub fn authenticate(&self) -> Result<String, ApiError> {
        let mut cached = self.token.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = cached.as_ref()
            && token.is_fresh(Instant::now())
        {
            return Ok(token.access_token.clone());
        }

        let body = LoginRequest {
            client_id: &self.settings.client_id,
            client_secret: &self.settings.client_secret,
            user_access_type: MACHINE_CLIENT,
        };
        let url = self.url(LOGIN_PATH);
        let raw = self
            .throttle
            .run(|| -> Result<RawResponse, ApiError> {
                let resp = self
                    .agent
                    .post(&url)
                    .header(header::ACCEPT, "application/json")
                    .send_json(&body)?;
                read_response(resp)
            })?;
        if !raw.is_success() {
            return Err(ApiError::Auth(format!("http {}: {}", raw.status, raw.excerpt())));
        }
        let parsed: AuthResponse = decode_json(LOGIN_PATH, &raw.body)?;
        let token = CachedToken::new(
            parsed.token.access_token,
            Duration::from_secs(parsed.token.expires_in),
            self.settings.refresh_margin,
            Instant::now(),
        );
        info!(
            "Authenticated to POS API (token valid for {}s)",
            parsed.token.expires_in
        );
        let access = token.access_token.clone();
        *cached = Some(token);
        Ok(access)
    }

    fn get(&self, path: &str, location: &str, query: &[(&str, String)]) -> Result<RawResponse, ApiError> {
        let token = self.authenticate()?;
        let url = self.url(path);
        let raw = self.throttle.run(|| -> Result<RawResponse, ApiError> {
            let mut req = self
                .agent
                .get(&url)
                .header(header::ACCEPT, "application/json")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .header(LOCATION_HEADER, location);
            for (k, v) in query {
                req = req.query(k, v);
            }
            read_response(req.call()?)
        })?;
        if raw.status == 401 {
            // Drop the token so the next call logs in again.
            *self.token.lock().unwrap_or_else(PoisonError::into_inner) = None;
        }
        raw.into_success(path)
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str, location: &str, query: &[(&str, String)]) -> Result<T, ApiError> {
        let raw = self.get(path, location, query)?;
        decode_json(path, &raw.body)
    }

    /// One page of a numbered list endpoint.
    pub fn fetch_page<T: DeserializeOwned>(
        &self,
        path: &str,
        location: &str,
        params: &[(&str, String)],
        page: u32,
    ) -> Result<Page<T>, ApiError> {
        let mut query = params.to_vec();
        query.push(("pageSize", self.settings.page_size.to_string()));
        query.push(("page", page.to_string()));
        let raw = self.get(path, location, &query)?;
        let rows: Vec<T> = decode_json(path, &raw.body)?;
        Ok(Page {
            has_more: link_has_next(raw.link.as_deref()),
            rows,
        })
    }

    /// Every page of a numbered list endpoint.
    pub fn fetch_all<T: DeserializeOwned>(
        &self,
        path: &str,
        location: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<T>, ApiError> {
        drain_numbered_pages(self.settings.page_size, |page| {
            self.fetch_page(path, location, params, page)
        })
    }
}

impl PosApi for PosClient {
    fn restaurant_info(&self, location: &str) -> Result<RestaurantInfo, ApiError> {
        self.get_json(&format!("/restaurants/v1/restaurants/{}", location), location, &[])
    }

    fn sales_categories(&self, location: &str) -> Result<Vec<SalesCategory>, ApiError> {
        self.get_json("/config/v2/salesCategories", location, &[])
    }

    fn revenue_centers(&self, location: &str) -> Result<Vec<RevenueCenter>, ApiError> {
        self.get_json("/config/v2/revenueCenters", location, &[])
    }

    fn dining_options(&self, location: &str) -> Result<Vec<DiningOption>, ApiError> {
        self.get_json("/config/v2/diningOptions", location, &[])
    }

    fn employees(&self, location: &str) -> Result<Vec<Employee>, ApiError> {
        self.get_json("/labor/v1/employees", location, &[])
    }

    fn orders_for_business_date(&self, location: &str, date: NaiveDate) -> Result<Vec<Order>, ApiError> {
        let orders: Vec<Order> = self.fetch_all(
            "/orders/v2/ordersBulk",
            location,
            &[("businessDate", pos_business_date(date))],
        )?;
        debug!("Fetched {} order(s) for {} on {}", orders.len(), location, date);
        Ok(orders)
    }

    fn time_entries(&self, location: &str, start: &str, end: &str) -> Result<Vec<TimeEntry>, ApiError> {
        self.get_json(
            "/labor/v1/timeEntries",
            location,
            &[("startDate", start.to_string()), ("endDate", end.to_string())],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> PosSettings {
        PosSettings {
            hostname: "https://pos.example.com/".into(),
            client_id: "id".into(),
            client_secret: "secret".into(),
            min_interval: Duration::from_millis(200),
            page_size: 100,
            refresh_margin: Duration::from_secs(3600),
            timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn token_refreshes_an_hour_early() {
        let now = Instant::now();
        let token = CachedToken::new("t".into(), Duration::from_secs(86_400), Duration::from_secs(3600), now);
        assert!(token.is_fresh(now + Duration::from_secs(82_799)));
        assert!(!token.is_fresh(now + Duration::from_secs(82_800)));
    }

    #[test]
    fn short_lived_token_uses_half_its_lifetime() {
        let now = Instant::now();
        let token = CachedToken::new("t".into(), Duration::from_secs(600), Duration::from_secs(3600), now);
        assert!(token.is_fresh(now + Duration::from_secs(299)));
        assert!(!token.is_fresh(now + Duration::from_secs(300)));
    }

    #[test]
    fn rejects_incomplete_settings() {
        let mut s = settings();
        s.client_secret = " ".into();
        assert!(matches!(PosClient::new(s), Err(ApiError::Config(_))));
        let mut s = settings();
        s.page_size = 0;
        assert!(matches!(PosClient::new(s), Err(ApiError::Config(_))));
    }

    #[test]
    fn urls_join_without_double_slash() {
        let client = PosClient::new(settings()).expect("client");
        assert_eq!(
            client.url("/labor/v1/employees"),
            "https://pos.example.com/labor/v1/employees"
        );
        assert_eq!(client.url("config/v2/diningOptions"), "https://pos.example.com/config/v2/diningOptions");
    }
}
