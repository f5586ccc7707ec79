//! Terminal output of the cli. Rows are tab separated so they can be piped into `column -t`
//! or `cut`.

use ansi_term::{Colour, Style};
use chrono::NaiveDate;

use crate::{
    daemon::{
        classifier::{rules::ClassificationRules, KeywordList},
        storage::entities::{DailyReportEntity, LedgerEntity, StatusEntity},
    },
    utils::{
        percentage::share_of,
        time::{date_key, format_seconds, to_local_string},
    },
};

pub fn print_status(
    status: Option<&StatusEntity>,
    ledger: &LedgerEntity,
    reports: &[DailyReportEntity],
    today: NaiveDate,
) {
    let indicator = match status {
        Some(status) if status.monitoring_active => Colour::Green.paint("monitoring").to_string(),
        Some(status) => Colour::Red
            .paint(format!(
                "stopped ({})",
                status.stopped_reason.as_deref().unwrap_or("unknown reason")
            ))
            .to_string(),
        None => Colour::Yellow.paint("never started").to_string(),
    };
    println!("{indicator}");
    for line in status_lines(status, ledger, reports, today) {
        println!("{line}");
    }
}

/// Balance is taken from the status when present, it is newer than the ledger file between
/// two flushes.
fn status_lines(
    status: Option<&StatusEntity>,
    ledger: &LedgerEntity,
    reports: &[DailyReportEntity],
    today: NaiveDate,
) -> Vec<String> {
    let points = status.map_or(ledger.current_points, |v| v.current_points);
    let mut lines = vec![format!("Points\t{points}")];

    if let Some(status) = status {
        if let (Some(process), Some(category)) = (&status.active_process, status.active_category) {
            lines.push(format!("Active\t{process}\t{category}"));
        }
        if let Some(updated_at) = status.updated_at {
            lines.push(format!("Updated\t{}", to_local_string(updated_at)));
        }
    }

    let (earned, spent) = if ledger.last_reset_date == Some(today) {
        (ledger.daily_points_earned, ledger.daily_points_spent)
    } else {
        (0, 0)
    };
    lines.push(format!("Today\t+{earned}\t-{spent}"));
    if let Some(report) = reports.iter().find(|v| v.date == today) {
        lines.push(format!(
            "Time\t{} productive\t{} entertainment",
            format_seconds(report.productive_time),
            format_seconds(report.entertainment_time)
        ));
    }
    lines
}

pub fn print_report(reports: &[DailyReportEntity], days: usize) {
    let lines = report_lines(reports, days);
    if lines.is_empty() {
        println!("No reports yet");
        return;
    }
    println!(
        "{}",
        Style::new()
            .bold()
            .paint("Date\tEarned\tSpent\tProductive\tEntertainment\tShare\tStreaks")
    );
    for line in lines {
        println!("{line}");
    }
}

/// The last `days` reports, oldest first. Share is the productive part of all classified
/// time.
fn report_lines(reports: &[DailyReportEntity], days: usize) -> Vec<String> {
    let mut reports = reports.to_vec();
    reports.sort_by_key(|v| v.date);
    let skip = reports.len().saturating_sub(days);
    reports
        .iter()
        .skip(skip)
        .map(|report| {
            let share = share_of(
                report.productive_time,
                report.productive_time + report.entertainment_time,
            )
            .map_or_else(|| "-".to_string(), |v| v.to_string());
            format!(
                "{}\t{}\t{}\t{}\t{}\t{}\t{}",
                date_key(report.date),
                report.points_earned,
                report.points_spent,
                format_seconds(report.productive_time),
                format_seconds(report.entertainment_time),
                share,
                report.streaks
            )
        })
        .collect()
}

pub fn print_keywords(rules: &ClassificationRules) {
    for list in [
        KeywordList::Productivity,
        KeywordList::Entertainment,
        KeywordList::Neutral,
    ] {
        println!(
            "{}\t{}",
            Style::new().bold().paint(list.to_string()),
            rules.keywords(list).join(", ")
        );
    }
    println!(
        "{}\t{}",
        Style::new().bold().paint("whitelist"),
        rules.whitelist().entries().join(", ")
    );
}
