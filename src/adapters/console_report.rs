//! Plain-text comparison table for the terminal.
//!
//! One row per metric: the baseline value next to the winning trial's id and
//! value.

use std::fmt::Write as _;

use crate::domain::aggregate::{BestResults, Metric};
use crate::domain::trial::TrialSummary;
use crate::ports::report_port::ReportPort;

const STAT_WIDTH: usize = 25;
const DCA_WIDTH: usize = 22;

pub struct ConsoleReport;

fn unit(metric: Metric) -> &'static str {
    match metric {
        Metric::FinalValue => "$",
        Metric::Gain | Metric::AthDrawdown | Metric::MaxDrawdown => "%",
        Metric::TimeToRecovery => "months",
    }
}

fn cell(metric: Metric, summary: &TrialSummary) -> String {
    match metric {
        Metric::TimeToRecovery => format!("{} {}", summary.time_to_recovery, unit(metric)),
        _ => format!("{:.2} {}", metric.value(summary), unit(metric)),
    }
}

fn line(out: &mut String, stat: &str, dca: &str, trial: &str) {
    // Writing into a String cannot fail.
    let _ = writeln!(out, "{stat:<STAT_WIDTH$} {dca:<DCA_WIDTH$} {trial}");
}

impl ReportPort for ConsoleReport {
    fn render(&self, best: &BestResults) -> String {
        let mut out = String::new();
        line(&mut out, "<stat>", "<dca>", "<smart dca trial>");
        for metric in Metric::ALL {
            let winner = best.winner(metric);
            line(
                &mut out,
                metric.label(),
                &cell(metric, &best.baseline),
                &format!("[#{}] {}", winner.trial, cell(metric, winner)),
            );
        }
        out
    }
}
