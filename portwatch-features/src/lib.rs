//! Feature engine: turns a raw ingested table into the typed, per-port
//! feature-enriched [`Dataset`].

pub mod rolling;

use chrono::NaiveDate;
use portwatch_core::{
    parse_date, Dataset, Observation, PortwatchError, RawTable, Result, ROLLING_WINDOW,
};
use rolling::{clamped_zscores, first_difference, rolling_mean, ZSCORE_CLAMP};
use tracing::{debug, info};

const TRAFFIC_PREFIX: &str = "PORTCALLS";
const IMPORT_PREFIX: &str = "IMPORT_";
const EXPORT_PREFIX: &str = "EXPORT_";

/// Cleans and enriches a raw table. The input is left untouched.
pub fn transform(raw: &RawTable) -> Result<Dataset> {
    let mut table = raw.clone();
    table.normalize_headers();

    if !table.has_column("DATE") && table.missing_columns(&["YEAR", "MONTH", "DAY"]).is_empty()
    {
        let dates = synthesize_dates(&table);
        table.set_column("DATE", dates);
    }

    table.rename_column("PORTNAME", "PORT");
    table.rename_column("PORTID", "PORT_ID");

    let missing = table.missing_columns(&["DATE", "PORT"]);
    if !missing.is_empty() {
        return Err(PortwatchError::schema(missing));
    }

    let traffic_cols = table.columns_with_prefix(TRAFFIC_PREFIX);
    if traffic_cols.is_empty() {
        debug!(columns = ?table.headers(), "No port call columns in table");
        return Err(PortwatchError::schema([format!("{}*", TRAFFIC_PREFIX)]));
    }
    let import_cols = table.columns_with_prefix(IMPORT_PREFIX);
    let export_cols = table.columns_with_prefix(EXPORT_PREFIX);

    let (Some(date_col), Some(port_col)) = (table.column_index("DATE"), table.column_index("PORT"))
    else {
        return Err(PortwatchError::schema(["DATE", "PORT"]));
    };
    let country_col = table.column_index("COUNTRY");
    let port_id_col = table.column_index("PORT_ID");

    let mut observations = Vec::with_capacity(table.len());
    let mut dropped = 0usize;

    for row in 0..table.len() {
        let date = table.cell(row, date_col).and_then(parse_date);
        let port = table.cell(row, port_col);
        let (Some(date), Some(port)) = (date, port) else {
            dropped += 1;
            continue;
        };

        let traffic = row_sum(&table, row, &traffic_cols);
        if !traffic.is_finite() {
            dropped += 1;
            continue;
        }

        let mut observation = Observation::new(port, date, traffic).with_trade(
            row_sum(&table, row, &import_cols),
            row_sum(&table, row, &export_cols),
        );
        if let Some(country) = country_col.and_then(|col| table.cell(row, col)) {
            observation = observation.with_country(country);
        }
        if let Some(port_id) = port_id_col.and_then(|col| table.cell(row, col)) {
            observation = observation.with_port_id(port_id);
        }
        observations.push(observation);
    }

    // Stable, so same-day rows for a port keep their input order.
    observations.sort_by(|a, b| a.port.cmp(&b.port).then(a.date.cmp(&b.date)));

    let mut start = 0;
    while start < observations.len() {
        let end = start
            + observations[start..]
                .iter()
                .take_while(|o| o.port == observations[start].port)
                .count();
        engineer_port(&mut observations[start..end]);
        start = end;
    }

    info!(
        rows = observations.len(),
        dropped,
        traffic_columns = traffic_cols.len(),
        "Feature engineering complete"
    );

    Ok(Dataset::new(observations))
}

/// Per-port rolling mean, first difference and clamped z-score of traffic.
fn engineer_port(rows: &mut [Observation]) {
    let traffic: Vec<f64> = rows.iter().map(|o| o.traffic).collect();
    let means = rolling_mean(&traffic, ROLLING_WINDOW);
    let deltas = first_difference(&traffic);
    let zscores = clamped_zscores(&traffic, ZSCORE_CLAMP);

    for (i, observation) in rows.iter_mut().enumerate() {
        observation.rolling_avg_traffic = means[i];
        observation.traffic_delta = deltas[i];
        observation.traffic_zscore = zscores[i];
    }
}

/// Missing or unparseable cells count as zero.
fn row_sum(table: &RawTable, row: usize, cols: &[usize]) -> f64 {
    cols.iter()
        .filter_map(|&col| table.numeric(row, col))
        .sum()
}

fn synthesize_dates(table: &RawTable) -> Vec<String> {
    let year_col = table.column_index("YEAR");
    let month_col = table.column_index("MONTH");
    let day_col = table.column_index("DAY");

    (0..table.len())
        .map(|row| {
            let part = |col: Option<usize>| col.and_then(|c| table.numeric(row, c)).and_then(whole);
            let date = match (part(year_col), part(month_col), part(day_col)) {
                (Some(y), Some(m), Some(d)) => u32::try_from(m)
                    .ok()
                    .zip(u32::try_from(d).ok())
                    .and_then(|(m, d)| NaiveDate::from_ymd_opt(i32::try_from(y).ok()?, m, d)),
                _ => None,
            };
            date.map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default()
        })
        .collect()
}

/// `2024` and `2024.0` are both whole numbers, `2024.5` is not.
fn whole(value: f64) -> Option<i64> {
    (value.fract() == 0.0).then_some(value as i64)
}
