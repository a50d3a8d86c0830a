pub mod models {
    pub mod invoicing;
    pub mod pos;
}

pub mod client {
    pub mod error;
    pub mod invoicing;
    pub mod paging;
    pub mod pos;
    pub mod throttle;
    pub mod transport;
}
pub mod config;
pub mod db {
    pub mod models;
    pub mod store;
}
pub mod queries {
    pub mod costs;
    pub mod items;
    pub mod labor;
    pub mod lookup;
    pub mod sales;
}
pub mod schema;
pub mod utils;
pub mod services {
    pub mod aggregate;
    pub mod fake_data;
    pub mod invoice_sync;
    pub mod normalize;
    pub mod pos_sync;
    pub mod recommendations;
    pub mod refs;
}

use crate::client::invoicing::InvoicingClient;
use crate::client::pos::{PosApi, PosClient};
use crate::config::Config;
use crate::db::models::sync_type;
use crate::db::store;
use crate::queries::costs::{self, CostFallback, DailyCostReport};
use crate::queries::labor::{self, LaborSummary};
use crate::queries::lookup::Lookup;
use crate::queries::sales::{self, DailySummary};
use crate::services::fake_data::FakePosSource;
use crate::services::pos_sync::{self, SyncOptions, SyncSession};
use crate::services::invoice_sync;
use crate::utils::{date_range, dates_back_from, parse_iso_date};
use chrono::{Duration, NaiveDate, Utc};
use diesel::SqliteConnection;
use log::{error, info, warn};
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Location synced with `--fake-data` when no GUIDs are configured.
const DEMO_LOCATION: &str = "demo-location";

#[derive(Debug)]
struct LoadedEnvFile {
    path: PathBuf,
    explicit: bool,
}

#[derive(Debug, Default, PartialEq)]
struct CliArgs {
    env_file: Option<PathBuf>,
    date: Option<NaiveDate>,
    days: Option<u32>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    skip_invoices: bool,
    list_units: bool,
    fake_data: bool,
    report: bool,
}

impl CliArgs {
    /// Business dates to sync, oldest first. Defaults to yesterday.
    fn sync_dates(&self, today: NaiveDate) -> Vec<NaiveDate> {
        if let (Some(from), Some(to)) = (self.from, self.to) {
            return date_range(from, to);
        }
        let start = self.date.unwrap_or(today - Duration::days(1));
        dates_back_from(start, self.days.unwrap_or(1))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DayReport {
    location_id: String,
    date: NaiveDate,
    sales: Lookup<DailySummary>,
    labor: Lookup<LaborSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    costs: Option<Lookup<DailyCostReport>>,
}

fn run(cli: &CliArgs) -> Result<(), String> {
    // 1) Load config
    let cfg = Config::from_env()?;
    info!(
        "Config loaded (pos={}, locations={}, invoicing={}, unit={}, lookback={}d, default_wage={:.2}, timezone={})",
        cfg.pos.is_some(),
        cfg.locations.len(),
        cfg.invoicing.is_some(),
        cfg.invoicing
            .as_ref()
            .and_then(|i| i.unit_id.as_deref())
            .unwrap_or("-"),
        cfg.invoice_lookback_days,
        cfg.default_wage,
        cfg.default_timezone
    );

    // 2) Open DB, applying migrations and additive columns
    let mut conn = store::open(&cfg.database_url)?;

    if cli.list_units {
        return list_units(&mut conn, &cfg);
    }

    let today = Utc::now().with_timezone(&cfg.default_timezone).date_naive();
    let dates = cli.sync_dates(today);
    let (Some(first), Some(last)) = (dates.first().copied(), dates.last().copied()) else {
        return Err("no dates to sync".to_string());
    };
    info!("Sync window {} to {} ({} date(s))", first, last, dates.len());

    let mut failures = 0usize;

    // 3) POS: every location x date is its own unit of work
    let locations = pos_sync_locations(&cfg, cli)?;
    if let Some(source) = pos_source(&cfg, cli)? {
        let options = SyncOptions {
            default_wage: cfg.default_wage,
            default_timezone: cfg.default_timezone,
        };
        let mut session = SyncSession::new(source.as_ref(), options);
        for location in &locations {
            for date in &dates {
                match session.sync_date(&mut conn, location, *date) {
                    Ok(outcome) if !outcome.warnings.is_empty() => {
                        warn!(
                            "{} {} synced with {} warning(s)",
                            location,
                            date,
                            outcome.warnings.len()
                        );
                    }
                    Ok(_) => {}
                    Err(e) => {
                        failures += 1;
                        error!("Sync failed for {} {}: {}", location, date, e);
                        if let Err(log_err) = pos_sync::record_failure(&mut conn, location, *date, &e.to_string()) {
                            error!("Recording sync failure for {} {} failed: {}", location, date, log_err);
                        }
                    }
                }
            }
        }
    } else {
        info!("POS not configured; skipping POS sync");
    }

    // 4) Invoicing: reference data, then one created-date window
    if cli.skip_invoices {
        info!("Invoice sync skipped via --skip-invoices");
    } else if let Some((settings, unit_id)) = cfg.invoice_target() {
        let client = InvoicingClient::new(settings.clone()).map_err(|e| format!("invoicing client: {}", e))?;

        if let Err(e) = invoice_sync::sync_ref_data(&mut conn, &client, unit_id) {
            failures += 1;
            error!("Invoicing reference sync failed for unit {}: {}", unit_id, e);
            if let Err(log_err) =
                invoice_sync::record_failure(&mut conn, unit_id, sync_type::REF_DATA, None, &e.to_string())
            {
                error!("Recording invoicing failure failed: {}", log_err);
            }
        }

        let window = (first - Duration::days(i64::from(cfg.invoice_lookback_days)), last);
        let status = cfg.invoicing.as_ref().and_then(|i| i.status);
        match invoice_sync::sync_orders(&mut conn, &client, unit_id, window.0, window.1, status) {
            Ok(summary) => info!(
                "Invoicing: {} order(s) over {} to {}, {} cost date(s) recomputed",
                summary.order_count,
                window.0,
                window.1,
                summary.affected_dates.len()
            ),
            Err(e) => {
                failures += 1;
                error!("Invoicing order sync failed for unit {}: {}", unit_id, e);
                if let Err(log_err) =
                    invoice_sync::record_failure(&mut conn, unit_id, sync_type::ORDERS, Some(window), &e.to_string())
                {
                    error!("Recording invoicing failure failed: {}", log_err);
                }
            }
        }
    } else if cfg.invoicing.is_some() {
        warn!("INVOICE_UNIT_ID is not set; run with --list-units to find it");
    }

    // 5) Optional JSON report over what was just synced
    if cli.report {
        let reports = build_reports(&mut conn, &cfg, &locations, &dates, today)
            .map_err(|e| format!("building report failed: {}", e))?;
        let json = serde_json::to_string_pretty(&reports).map_err(|e| format!("serializing report failed: {}", e))?;
        println!("{}", json);
    }

    if failures > 0 {
        return Err(format!("{} sync key(s) failed; see log above", failures));
    }
    info!("Sync complete");
    Ok(())
}

fn pos_sync_locations(cfg: &Config, cli: &CliArgs) -> Result<Vec<String>, String> {
    if !cfg.locations.is_empty() {
        return Ok(cfg.locations.clone());
    }
    if cli.fake_data {
        return Ok(vec![DEMO_LOCATION.to_string()]);
    }
    if cfg.pos.is_some() {
        return Err("POS_LOCATION_GUIDS is empty".to_string());
    }
    Ok(Vec::new())
}

fn pos_source(cfg: &Config, cli: &CliArgs) -> Result<Option<Box<dyn PosApi>>, String> {
    if cli.fake_data {
        info!("Using synthetic POS data");
        return Ok(Some(Box::new(FakePosSource::new(cfg.default_timezone))));
    }
    match &cfg.pos {
        Some(settings) => {
            let client = PosClient::new(settings.clone()).map_err(|e| format!("POS client: {}", e))?;
            Ok(Some(Box::new(client)))
        }
        None => Ok(None),
    }
}

fn list_units(conn: &mut SqliteConnection, cfg: &Config) -> Result<(), String> {
    let settings = cfg
        .invoicing
        .as_ref()
        .map(|i| i.settings.clone())
        .ok_or_else(|| "--list-units requires INVOICE_API_KEY".to_string())?;
    let client = InvoicingClient::new(settings).map_err(|e| format!("invoicing client: {}", e))?;
    let units = invoice_sync::sync_units(conn, &client).map_err(|e| format!("listing units failed: {}", e))?;
    for unit in units {
        println!("{}\t{}", unit.id, unit.name);
    }
    Ok(())
}

fn build_reports(
    conn: &mut SqliteConnection,
    cfg: &Config,
    locations: &[String],
    dates: &[NaiveDate],
    today: NaiveDate,
) -> Result<Vec<DayReport>, diesel::result::Error> {
    let fallback = CostFallback {
        today,
        lookback_days: i64::from(cfg.cost_fallback_lookback_days),
    };
    let unit = cfg.invoice_target().map(|(_, unit)| unit.to_string());

    let mut reports = Vec::new();
    for location in locations {
        for date in dates {
            let compare_to = date.pred_opt();
            let costs = match unit.as_deref() {
                Some(unit) => Some(costs::daily_cost(conn, unit, *date, fallback, &cfg.thresholds)?),
                None => None,
            };
            reports.push(DayReport {
                location_id: location.clone(),
                date: *date,
                sales: sales::daily_summary(conn, location, *date, compare_to, &cfg.thresholds)?,
                labor: labor::labor_summary(conn, location, *date, &cfg.thresholds)?,
                costs,
            });
        }
    }
    Ok(reports)
}

fn parse_cli<I>(args: I) -> Result<CliArgs, String>
where
    I: IntoIterator<Item = OsString>,
{
    let mut args = args.into_iter();
    let mut cli = CliArgs::default();

    while let Some(arg) = args.next() {
        let arg = arg.into_string().map_err(|_| "argument contains invalid UTF-8".to_string())?;
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) if flag.starts_with("--") => (flag.to_string(), Some(value.to_string())),
            _ => (arg.clone(), None),
        };
        let mut value = |name: &str| -> Result<String, String> {
            let v = match inline.clone() {
                Some(v) => v,
                None => args
                    .next()
                    .and_then(|v| v.into_string().ok())
                    .ok_or_else(|| format!("`{}` requires a value", name))?,
            };
            if v.is_empty() {
                return Err(format!("`{}` requires a value", name));
            }
            Ok(v)
        };

        match flag.as_str() {
            "--env-file" => {
                if cli.env_file.is_some() {
                    return Err("`--env-file` provided more than once".to_string());
                }
                cli.env_file = Some(PathBuf::from(value("--env-file")?));
            }
            "--date" => cli.date = Some(parse_iso_date(&value("--date")?)?),
            "--from" => cli.from = Some(parse_iso_date(&value("--from")?)?),
            "--to" => cli.to = Some(parse_iso_date(&value("--to")?)?),
            "--days" => {
                let raw = value("--days")?;
                let days = raw
                    .parse::<u32>()
                    .ok()
                    .filter(|d| *d > 0)
                    .ok_or_else(|| format!("`--days` must be a positive integer, got {}", raw))?;
                cli.days = Some(days);
            }
            "--skip-invoices" if inline.is_none() => cli.skip_invoices = true,
            "--list-units" if inline.is_none() => cli.list_units = true,
            "--fake-data" if inline.is_none() => cli.fake_data = true,
            "--report" if inline.is_none() => cli.report = true,
            "--" => break,
            _ => return Err(format!("unrecognised argument: {}", arg)),
        }
    }

    match (cli.from, cli.to) {
        (Some(from), Some(to)) => {
            if from > to {
                return Err(format!("`--from` {} is after `--to` {}", from, to));
            }
            if cli.date.is_some() || cli.days.is_some() {
                return Err("`--from`/`--to` cannot be combined with `--date` or `--days`".to_string());
            }
        }
        (None, None) => {}
        _ => return Err("`--from` and `--to` must be given together".to_string()),
    }

    Ok(cli)
}

fn configure_env_from_cli(cli: &CliArgs) -> Result<Option<LoadedEnvFile>, String> {
    if let Some(path) = cli.env_file.clone() {
        if !path.is_file() {
            return Err(format!("env file not found: {}", path.display()));
        }
        load_env_file(&path)?;
        Ok(Some(LoadedEnvFile { path, explicit: true }))
    } else {
        let cwd = std::env::current_dir().map_err(|e| format!("unable to read current directory: {}", e))?;
        let default_path = cwd.join(".env");
        if default_path.is_file() {
            load_env_file(&default_path)?;
            Ok(Some(LoadedEnvFile {
                path: default_path,
                explicit: false,
            }))
        } else {
            Ok(None)
        }
    }
}

fn load_env_file(path: &Path) -> Result<(), String> {
    use std::fs::File;
    use std::io::{BufRead, BufReader};

    let file = File::open(path).map_err(|e| format!("failed to open {}: {}", path.display(), e))?;
    let reader = BufReader::new(file);

    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| format!("failed to read {} at line {}: {}", path.display(), index + 1, e))?;
        match parse_env_assignment(&line) {
            Ok(Some((key, value))) => {
                // Values already in the process environment win.
                if std::env::var_os(&key).is_none() {
                    // Updating process-level environment variables is unsafe on some targets.
                    unsafe {
                        std::env::set_var(key, value);
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                return Err(format!("{}:{}: {}", path.display(), index + 1, e));
            }
        }
    }

    Ok(())
}

fn parse_env_assignment(line: &str) -> Result<Option<(String, String)>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let without_export = trimmed
        .strip_prefix("export ")
        .map(|s| s.trim_start())
        .unwrap_or(trimmed);

    let Some((key, value_part)) = without_export.split_once('=') else {
        return Err("missing '=' in assignment".to_string());
    };
    let key = key.trim();

    if key.is_empty() {
        return Err("environment variable name cannot be empty".to_string());
    }
    if key.chars().any(|c| c.is_whitespace()) {
        return Err(format!("environment variable name contains whitespace: {}", key));
    }

    let value = parse_env_value(value_part)?;
    Ok(Some((key.to_string(), value)))
}

fn parse_env_value(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix('"') {
        parse_quoted(rest, '"', true)
    } else if let Some(rest) = trimmed.strip_prefix('\'') {
        parse_quoted(rest, '\'', false)
    } else {
        // Unquoted: an inline comment ends the value.
        let value = trimmed.split('#').next().unwrap_or_default().trim_end();
        Ok(value.to_string())
    }
}

/// Read up to the closing `quote`; only double quotes process escapes.
fn parse_quoted(input: &str, quote: char, escapes: bool) -> Result<String, String> {
    let mut result = String::new();
    let mut chars = input.chars();
    let mut escape = false;

    while let Some(ch) = chars.next() {
        if escape {
            result.push(match ch {
                'n' => '\n',
                'r' => '\r',
                't' => '\t',
                other => other,
            });
            escape = false;
        } else if escapes && ch == '\\' {
            escape = true;
        } else if ch == quote {
            let remainder = chars.as_str().trim();
            if remainder.is_empty() || remainder.starts_with('#') {
                return Ok(result);
            }
            return Err(format!("unexpected characters after closing {} quote", quote));
        } else {
            result.push(ch);
        }
    }

    if escape {
        Err("unterminated escape sequence in double-quoted value".to_string())
    } else {
        Err(format!("unterminated {}-quoted value", quote))
    }
}

fn main() {
    let cli = match parse_cli(std::env::args_os().skip(1)) {
        Ok(cli) => cli,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };
    let loaded_env = match configure_env_from_cli(&cli) {
        Ok(info) => info,
        Err(err) => {
            eprintln!("fatal: {}", err);
            std::process::exit(1);
        }
    };

    // Init logging after environment so RUST_LOG from .env is respected.
    let default_filter = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(default_filter)
        .format_timestamp_secs()
        .init();

    if let Some(info) = loaded_env.as_ref() {
        let origin = if info.explicit { "CLI-specified" } else { "default" };
        info!("Environment loaded from {} .env file: {}", origin, info.path.display());
    }

    info!(
        "restaurant-metrics {} (git {}) starting",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIME_GIT_HASH")
    );
    if let Err(e) = run(&cli) {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}
