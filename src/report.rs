//! End-of-run summary.
//!
//! One [`HarvestReport`] per run: counts, failures grouped by stage and by
//! `"<stage>: <reason>"`, and the identifiers the downstream indexer should
//! add or remove. Printed as text, or as JSON with `--json`.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use geo_harvester_core::changes::HarvestMode;
use geo_harvester_core::{Origin, Stage};

/// One record that did not make it through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
    pub identifier: String,
    pub stage: Stage,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HarvestReport {
    pub origin: Origin,
    pub harvest_type: HarvestMode,
    pub processed_records_count: usize,
    pub successful_records: usize,
    pub failed_records_count: usize,
    pub failed_by_stage: BTreeMap<Stage, usize>,
    pub failed_step_and_reason_count: BTreeMap<String, usize>,
    pub to_index: Vec<String>,
    pub to_delete: Vec<String>,
    pub notifications_sent: usize,
    pub notification_failures: usize,
    pub failures: Vec<RecordFailure>,
}

impl HarvestReport {
    pub fn new(origin: Origin, harvest_type: HarvestMode) -> Self {
        Self {
            origin,
            harvest_type,
            processed_records_count: 0,
            successful_records: 0,
            failed_records_count: 0,
            failed_by_stage: BTreeMap::new(),
            failed_step_and_reason_count: BTreeMap::new(),
            to_index: Vec::new(),
            to_delete: Vec::new(),
            notifications_sent: 0,
            notification_failures: 0,
            failures: Vec::new(),
        }
    }

    pub fn record_success(&mut self, identifier: &str, deleted: bool) {
        self.processed_records_count += 1;
        self.successful_records += 1;
        if deleted {
            self.to_delete.push(identifier.to_string());
        } else {
            self.to_index.push(identifier.to_string());
        }
    }

    pub fn record_failure(&mut self, identifier: &str, stage: Stage, reason: impl Into<String>) {
        let reason = reason.into();
        self.processed_records_count += 1;
        self.failed_records_count += 1;
        *self.failed_by_stage.entry(stage).or_insert(0) += 1;
        *self
            .failed_step_and_reason_count
            .entry(format!("{}: {}", stage, reason))
            .or_insert(0) += 1;
        self.failures.push(RecordFailure {
            identifier: identifier.to_string(),
            stage,
            reason,
        });
    }

    /// Move a record already counted as a success to the failures, e.g.
    /// when the combined output file could not be written.
    pub fn demote_success(&mut self, identifier: &str, stage: Stage, reason: &str) {
        let before = self.to_index.len() + self.to_delete.len();
        self.to_index.retain(|id| id != identifier);
        self.to_delete.retain(|id| id != identifier);
        let removed = before - (self.to_index.len() + self.to_delete.len());
        if removed == 0 {
            return;
        }
        self.successful_records -= removed;
        self.processed_records_count -= removed;
        for _ in 0..removed {
            self.record_failure(identifier, stage, reason);
        }
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for HarvestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "harvest {} ({})", self.origin, self.harvest_type)?;
        writeln!(f, "  processed: {}", self.processed_records_count)?;
        writeln!(f, "  succeeded: {}", self.successful_records)?;
        writeln!(f, "  failed: {}", self.failed_records_count)?;
        for (stage, count) in &self.failed_by_stage {
            writeln!(f, "    {:<10} {}", stage.as_str(), count)?;
        }
        writeln!(f, "  to index: {}", self.to_index.len())?;
        writeln!(f, "  to delete: {}", self.to_delete.len())?;
        if self.notifications_sent + self.notification_failures > 0 {
            writeln!(
                f,
                "  notifications: {} sent, {} failed",
                self.notifications_sent, self.notification_failures
            )?;
        }
        if !self.failed_step_and_reason_count.is_empty() {
            writeln!(f)?;
            writeln!(f, "  {:>6}   {}", "COUNT", "STAGE: REASON")?;
            writeln!(f, "  {}", "-".repeat(60))?;
            for (reason, count) in &self.failed_step_and_reason_count {
                writeln!(f, "  {:>6}   {}", count, reason)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_successes_and_failures() {
        let mut report = HarvestReport::new(Origin::Mit, HarvestMode::Incremental);
        report.record_success("a", false);
        report.record_success("c", true);
        report.record_failure("b", Stage::Fetch, "zip not found");
        report.record_failure("d", Stage::Fetch, "zip not found");

        assert_eq!(report.processed_records_count, 4);
        assert_eq!(report.successful_records, 2);
        assert_eq!(report.failed_records_count, 2);
        assert_eq!(report.to_index, vec!["a"]);
        assert_eq!(report.to_delete, vec!["c"]);
        assert_eq!(report.failed_by_stage[&Stage::Fetch], 2);
        assert_eq!(report.failed_step_and_reason_count["fetch: zip not found"], 2);
    }

    #[test]
    fn demoted_success_becomes_a_write_failure() {
        let mut report = HarvestReport::new(Origin::Alma, HarvestMode::Full);
        report.record_success("a", false);
        report.demote_success("a", Stage::Write, "output file: disk full");
        assert!(report.to_index.is_empty());
        assert_eq!(report.processed_records_count, 1);
        assert_eq!(report.successful_records, 0);
        assert_eq!(report.failed_by_stage[&Stage::Write], 1);
    }

    #[test]
    fn json_uses_stage_names() {
        let mut report = HarvestReport::new(Origin::Ogm, HarvestMode::Full);
        report.record_failure("x", Stage::Validate, "missing dct_title_s");
        let json: serde_json::Value = serde_json::from_str(&report.to_json_pretty().unwrap()).unwrap();
        assert_eq!(json["failed_by_stage"]["validate"], 1);
        assert_eq!(json["harvest_type"], "full");
        assert_eq!(json["failures"][0]["stage"], "validate");
    }

    #[test]
    fn text_summary_lists_reasons() {
        let mut report = HarvestReport::new(Origin::Mit, HarvestMode::Full);
        report.record_failure("b", Stage::Fetch, "zip not found");
        let text = report.to_string();
        assert!(text.contains("harvest mit (full)"));
        assert!(text.contains("fetch: zip not found"));
    }
}
