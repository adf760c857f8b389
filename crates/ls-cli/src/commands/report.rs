//! Report rendering for `lastseen watch`.
//!
//! Evaluates every configured report over a window and renders the result as
//! human-readable text or JSON.

use std::fmt::Write;

use chrono::{DateTime, Utc};
use ls_core::{PresenceService, ReportDefinition, ReportItem, ReportMetric, ReportRegistry, UserId};
use serde::Serialize;

use crate::commands::util::format_duration;

/// One evaluated report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportOutput {
    pub name: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub rows: Vec<ReportRow>,
}

/// One user's metrics, in milliseconds for JSON consumers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow {
    pub user_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_average_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekly_average_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_ms: Option<i64>,
}

impl From<&ReportItem> for ReportRow {
    fn from(item: &ReportItem) -> Self {
        let ms = |d: Option<chrono::Duration>| d.map(|d| d.num_milliseconds());
        Self {
            user_id: item.user_id,
            total_ms: ms(item.total),
            daily_average_ms: ms(item.daily_average),
            weekly_average_ms: ms(item.weekly_average),
            min_ms: ms(item.min),
            max_ms: ms(item.max),
        }
    }
}

impl ReportRow {
    fn metric(&self, metric: ReportMetric) -> Option<i64> {
        match metric {
            ReportMetric::Total => self.total_ms,
            ReportMetric::DailyAverage => self.daily_average_ms,
            ReportMetric::WeeklyAverage => self.weekly_average_ms,
            ReportMetric::Min => self.min_ms,
            ReportMetric::Max => self.max_ms,
        }
    }
}

/// Evaluates one report definition against the service.
pub fn evaluate(
    service: &PresenceService,
    definition: &ReportDefinition,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> ReportOutput {
    let rows = service
        .report(definition, from, to)
        .iter()
        .map(ReportRow::from)
        .collect();
    ReportOutput {
        name: definition.name.clone(),
        from,
        to,
        rows,
    }
}

/// Evaluates every registered report.
pub fn evaluate_all(
    service: &PresenceService,
    registry: &ReportRegistry,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Vec<ReportOutput> {
    registry
        .iter()
        .map(|definition| evaluate(service, definition, from, to))
        .collect()
}

fn metric_label(metric: ReportMetric) -> &'static str {
    match metric {
        ReportMetric::Total => "total",
        ReportMetric::DailyAverage => "daily",
        ReportMetric::WeeklyAverage => "weekly",
        ReportMetric::Min => "min",
        ReportMetric::Max => "max",
    }
}

/// Formats one report as human-readable text.
pub fn format_report(report: &ReportOutput) -> String {
    let mut output = String::new();

    writeln!(output, "REPORT: {}", report.name).unwrap();
    writeln!(
        output,
        "Window: {} .. {}",
        report.from.format("%Y-%m-%d %H:%M UTC"),
        report.to.format("%Y-%m-%d %H:%M UTC")
    )
    .unwrap();
    writeln!(output, "{}", "─".repeat(8 + report.name.chars().count())).unwrap();

    if report.rows.is_empty() {
        writeln!(output, "No tracked users in this report.").unwrap();
        return output;
    }

    for row in &report.rows {
        let id = row.user_id.to_string();
        let id_short = &id[..8.min(id.len())];
        let metrics: Vec<String> = ReportMetric::ALL
            .into_iter()
            .filter_map(|metric| {
                row.metric(metric).map(|ms| {
                    format!(
                        "{} {}",
                        metric_label(metric),
                        format_duration(chrono::Duration::milliseconds(ms))
                    )
                })
            })
            .collect();
        writeln!(output, "{id_short}  {}", metrics.join("  ")).unwrap();
    }

    output
}

/// Formats all reports as human-readable text.
pub fn format_reports(reports: &[ReportOutput]) -> String {
    if reports.is_empty() {
        return "No reports configured.\n".to_string();
    }

    reports
        .iter()
        .map(format_report)
        .collect::<Vec<_>>()
        .join("\n")
}
