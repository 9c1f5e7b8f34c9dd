//! Tabular export of snapshot and scenario series.

use rdburn_core::{AssigneeSnapshot, DailySnapshot};
use rdburn_engine::Forecast;

/// Render the daily series, one row per date.
pub fn snapshot_csv(rows: &[DailySnapshot]) -> String {
    let mut out = String::from(
        "date,scope_hours,remaining_hours,completed_hours,ideal_remaining_hours,burn_hours,v_avg,v_max,v_min\n",
    );
    for row in rows {
        let burn = row.burn_hours.map(|b| b.to_string()).unwrap_or_default();
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{},{}\n",
            row.date,
            row.scope_hours,
            row.remaining_hours,
            row.completed_hours,
            row.ideal_remaining_hours,
            burn,
            row.v_avg,
            row.v_max,
            row.v_min,
        ));
    }
    out
}

/// Render per-assignee rows, one row per (date, assignee).
pub fn assignee_csv(rows: &[AssigneeSnapshot]) -> String {
    let mut out = String::from(
        "date,assignee_id,assignee_name,scope_hours,remaining_hours,completed_hours\n",
    );
    for row in rows {
        let (id, name) = match &row.assignee {
            Some(assignee) => (assignee.id.to_string(), field(&assignee.name)),
            None => (String::new(), String::new()),
        };
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            row.date, id, name, row.scope_hours, row.remaining_hours, row.completed_hours,
        ));
    }
    out
}

/// Render the three pacing scenarios side by side, one row per business day
/// out, with the forecast completion index as a trailing comment row.
pub fn forecast_csv(forecast: &Forecast) -> String {
    let mut out = String::from("days_out,avg_remaining,max_remaining,min_remaining\n");
    let horizon = forecast.avg.points.len();
    for n in 0..horizon {
        out.push_str(&format!(
            "{},{},{},{}\n",
            n + 1,
            forecast.avg.points[n],
            forecast.max.points[n],
            forecast.min.points[n],
        ));
    }
    out.push_str(&format!(
        "# completion (business days): avg={} max={} min={}\n",
        completion(forecast.avg.completion_index),
        completion(forecast.max.completion_index),
        completion(forecast.min.completion_index),
    ));
    out
}

fn completion(index: Option<u32>) -> String {
    index.map(|n| n.to_string()).unwrap_or_else(|| "never".to_string())
}

/// Quote a value that would break the row otherwise.
fn field(raw: &str) -> String {
    if raw.contains([',', '"', '\n']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}
