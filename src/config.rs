//! Runtime configuration from the process environment (optionally seeded from
//! a `.env` file by `main`).

use chrono_tz::Tz;
use std::str::FromStr;
use std::time::Duration;

use crate::client::invoicing::{InvoicingSettings, DEFAULT_BASE_URL};
use crate::client::pos::PosSettings;
use crate::models::invoicing::OrderStatus;
use crate::services::recommendations::Thresholds;

pub const DEFAULT_DATABASE_URL: &str = "data/metrics.db";
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::New_York;
pub const DEFAULT_HOURLY_WAGE: f64 = 15.0;
pub const DEFAULT_INVOICE_LOOKBACK_DAYS: u32 = 30;
pub const DEFAULT_COST_FALLBACK_DAYS: u32 = 3;
const DEFAULT_POS_MIN_INTERVAL_MS: u64 = 200;
const DEFAULT_POS_PAGE_SIZE: usize = 100;
const DEFAULT_TOKEN_REFRESH_MARGIN_SECS: u64 = 3600;
const DEFAULT_INVOICE_MIN_INTERVAL_MS: u64 = 1000;
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct InvoicingConfig {
    pub settings: InvoicingSettings,
    /// Restaurant unit to sync; `None` is enough for listing units.
    pub unit_id: Option<String>,
    /// Status requested from the orders listing; `None` fetches every status.
    pub status: Option<OrderStatus>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Point-of-sale credentials; absent when none of them are set.
    pub pos: Option<PosSettings>,
    /// Location GUIDs to sync, in configured order.
    pub locations: Vec<String>,
    pub invoicing: Option<InvoicingConfig>,
    /// Days before the earliest synced date to include in the invoice window.
    pub invoice_lookback_days: u32,
    pub default_wage: f64,
    pub cost_fallback_lookback_days: u32,
    pub default_timezone: Tz,
    pub thresholds: Thresholds,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_url = get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let credentials = (get("POS_API_HOSTNAME"), get("POS_CLIENT_ID"), get("POS_CLIENT_SECRET"));
        let pos = match credentials {
            (None, None, None) => None,
            (Some(hostname), Some(client_id), Some(client_secret)) => Some(PosSettings {
                hostname,
                client_id,
                client_secret,
                min_interval: Duration::from_millis(parse_or(&get, "POS_MIN_INTERVAL_MS", DEFAULT_POS_MIN_INTERVAL_MS)?),
                page_size: positive(&get, "POS_PAGE_SIZE", DEFAULT_POS_PAGE_SIZE)?,
                refresh_margin: Duration::from_secs(parse_or(
                    &get,
                    "POS_TOKEN_REFRESH_MARGIN_SECS",
                    DEFAULT_TOKEN_REFRESH_MARGIN_SECS,
                )?),
                timeout: HTTP_TIMEOUT,
            }),
            _ => {
                return Err(
                    "POS_API_HOSTNAME, POS_CLIENT_ID and POS_CLIENT_SECRET must be set together".to_string(),
                );
            }
        };

        let mut locations: Vec<String> = Vec::new();
        for guid in get("POS_LOCATION_GUIDS").unwrap_or_default().split(',') {
            let guid = guid.trim();
            if !guid.is_empty() && !locations.iter().any(|l| l == guid) {
                locations.push(guid.to_string());
            }
        }

        let invoicing = get("INVOICE_API_KEY")
            .map(|api_key| -> Result<InvoicingConfig, String> {
                Ok(InvoicingConfig {
                    settings: InvoicingSettings {
                        base_url: get("INVOICE_API_BASE").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
                        api_key,
                        min_interval: Duration::from_millis(parse_or(
                            &get,
                            "INVOICE_MIN_INTERVAL_MS",
                            DEFAULT_INVOICE_MIN_INTERVAL_MS,
                        )?),
                        timeout: HTTP_TIMEOUT,
                    },
                    unit_id: get("INVOICE_UNIT_ID"),
                    status: invoice_status(get("INVOICE_STATUS"))?,
                })
            })
            .transpose()?;

        let default_timezone = match get("DEFAULT_TIMEZONE") {
            Some(name) => Tz::from_str(&name).map_err(|_| format!("DEFAULT_TIMEZONE is not a known IANA zone: {}", name))?,
            None => DEFAULT_TIMEZONE,
        };

        let defaults = Thresholds::default();
        let thresholds = Thresholds {
            labor_cost_warning_pct: parse_or(&get, "LABOR_COST_WARNING_PCT", defaults.labor_cost_warning_pct)?,
            labor_cost_critical_pct: parse_or(&get, "LABOR_COST_CRITICAL_PCT", defaults.labor_cost_critical_pct)?,
            overtime_critical_hours: parse_or(&get, "OVERTIME_CRITICAL_HOURS", defaults.overtime_critical_hours)?,
            discount_warning_pct: parse_or(&get, "DISCOUNT_WARNING_PCT", defaults.discount_warning_pct)?,
            splh_target: parse_or(&get, "SPLH_TARGET", defaults.splh_target)?,
            cost_spike_warning_pct: parse_or(&get, "COST_SPIKE_WARNING_PCT", defaults.cost_spike_warning_pct)?,
            ..defaults
        };

        Ok(Config {
            database_url,
            pos,
            locations,
            invoicing,
            invoice_lookback_days: parse_or(&get, "INVOICE_LOOKBACK_DAYS", DEFAULT_INVOICE_LOOKBACK_DAYS)?,
            default_wage: parse_or(&get, "DEFAULT_HOURLY_WAGE", DEFAULT_HOURLY_WAGE)?,
            cost_fallback_lookback_days: parse_or(&get, "COST_FALLBACK_LOOKBACK_DAYS", DEFAULT_COST_FALLBACK_DAYS)?,
            default_timezone,
            thresholds,
        })
    }

    /// The unit invoicing syncs target, when both key and unit are configured.
    pub fn invoice_target(&self) -> Option<(&InvoicingSettings, &str)> {
        let inv = self.invoicing.as_ref()?;
        inv.unit_id.as_deref().map(|unit| (&inv.settings, unit))
    }
}

/// Only finalized invoices feed cost rollups, so that is the default; `ALL`
/// lifts the filter.
fn invoice_status(raw: Option<String>) -> Result<Option<OrderStatus>, String> {
    match raw {
        None => Ok(Some(OrderStatus::FINALIZED)),
        Some(v) if v.eq_ignore_ascii_case("all") => Ok(None),
        Some(v) => OrderStatus::from_name(&v)
            .map(Some)
            .ok_or_else(|| format!("INVOICE_STATUS has an invalid value: {}", v)),
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, String>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.parse::<T>().map_err(|_| format!("{} has an invalid value: {}", key, raw)),
        None => Ok(default),
    }
}

fn positive<G>(get: &G, key: &str, default: usize) -> Result<usize, String>
where
    G: Fn(&str) -> Option<String>,
{
    match parse_or(get, key, default)? {
        0 => Err(format!("{} must be greater than zero", key)),
        n => Ok(n),
    }
}
