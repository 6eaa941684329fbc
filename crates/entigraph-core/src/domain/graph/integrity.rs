//! Integrity validation and repair
//!
//! Field checks live in [`super::validation`]; this module adds the checks
//! that need the store (referential, duplicate triples, derived counts),
//! writes findings to the validation log and replays corrections from it.
//! Nothing here invents graph facts: repairs only touch derived fields,
//! out-of-range numbers and rows that no longer point anywhere.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;

use super::repository::{CountDrift, IntegrityRepository};
use super::validation::{
    EntityRecord, GraphTable, MentionRecord, RelationshipRecord, ValidationErrorRecord,
    ValidationIssue, ValidationResult, ValidationType, check_entity_record, check_mention_record,
    check_relationship_record,
};

/// Number of entries kept in `recent_errors`
pub const RECENT_ERRORS_LIMIT: usize = 10;

/// Correction method names written to the log
pub mod methods {
    pub const RECOUNT_MENTIONS: &str = "recount_mentions";
    pub const DELETE_ORPHAN: &str = "delete_orphan";
    pub const CLAMP_RANGE: &str = "clamp_range";
    pub const RENORMALIZE_NAME: &str = "renormalize_name";
    pub const RECORD_MISSING: &str = "record_missing";
}

/// A field finding tied to the row it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordIssue {
    pub table: GraphTable,
    pub record_id: String,
    pub issue: ValidationIssue,
}

/// Outcome of one full integrity scan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub orphaned_mentions: Vec<String>,
    pub invalid_relationships: Vec<String>,
    pub inconsistent_counts: Vec<CountDrift>,
    pub format_errors: Vec<RecordIssue>,
    pub total_issues: usize,
    pub auto_fixed_issues: usize,
    /// New log entries written by this pass
    pub logged_errors: usize,
}

/// Outcome of replaying corrections from the log
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionReport {
    pub attempted: usize,
    pub successful: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

/// Optional bounds on log entry creation time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    /// From `hours` ago until now
    pub fn last_hours(hours: i64) -> Self {
        let now = Utc::now();
        Self {
            start: Some(now - Duration::hours(hours)),
            end: Some(now),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationErrorSummary {
    pub total_errors: usize,
    pub errors_by_type: BTreeMap<String, usize>,
    pub errors_by_severity: BTreeMap<String, usize>,
    pub uncorrected_errors: usize,
    pub auto_correctable_errors: usize,
    /// Newest first
    pub recent_errors: Vec<ValidationErrorRecord>,
}

impl ValidationErrorSummary {
    /// Aggregate log entries; `records` must be newest first
    pub fn from_records(records: Vec<ValidationErrorRecord>) -> Self {
        let mut summary = Self {
            total_errors: records.len(),
            ..Default::default()
        };
        for record in &records {
            *summary
                .errors_by_type
                .entry(record.validation_type.as_str().to_string())
                .or_default() += 1;
            *summary
                .errors_by_severity
                .entry(record.severity.as_str().to_string())
                .or_default() += 1;
            if !record.is_corrected() {
                summary.uncorrected_errors += 1;
            }
            if record.auto_correctable {
                summary.auto_correctable_errors += 1;
            }
        }
        summary.recent_errors = records.into_iter().take(RECENT_ERRORS_LIMIT).collect();
        summary
    }
}

/// Repair applied for one log entry
enum Correction {
    Applied(&'static str),
    Unsupported(String),
}

/// Validator and repair pass over the entity graph store
pub struct IntegrityValidator<R: IntegrityRepository> {
    repository: Arc<R>,
}

impl<R: IntegrityRepository> IntegrityValidator<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    /// Write non-referential findings to the log; returns new entries
    async fn log_issues(&self, table: GraphTable, record_id: &str, issues: &[ValidationIssue]) -> Result<usize> {
        let mut written = 0;
        for issue in issues
            .iter()
            .filter(|i| i.validation_type != ValidationType::ReferentialIntegrity)
        {
            let record = ValidationErrorRecord::from_issue(table, record_id, issue);
            if self.repository.log_validation_error(&record).await? {
                written += 1;
            }
        }
        Ok(written)
    }

    // ========== Record Validation ==========

    pub async fn validate_entity(&self, id: &str, record: &EntityRecord) -> Result<ValidationResult> {
        let issues = check_entity_record(record);
        self.log_issues(GraphTable::Entities, id, &issues).await?;
        Ok(ValidationResult::from_issues(issues))
    }

    pub async fn validate_relationship(&self, id: &str, record: &RelationshipRecord) -> Result<ValidationResult> {
        let mut issues = check_relationship_record(record);

        for (field, entity_id) in [
            ("source_entity_id", &record.source_entity_id),
            ("target_entity_id", &record.target_entity_id),
        ] {
            if !entity_id.trim().is_empty() && !self.repository.entity_exists(entity_id).await? {
                issues.push(ValidationIssue::error(
                    ValidationType::ReferentialIntegrity,
                    field,
                    format!("entity '{}' does not exist", entity_id),
                ));
            }
        }

        let stored = self
            .repository
            .count_relationship_triples(
                &record.source_entity_id,
                &record.target_entity_id,
                &record.relationship_type,
            )
            .await?;
        let this_row = u64::from(
            self.repository
                .record_exists(GraphTable::EntityRelationships, id)
                .await?,
        );
        if stored > this_row {
            issues.push(ValidationIssue::warning(
                ValidationType::Constraint,
                "relationship_type",
                format!(
                    "duplicate {} relationship between '{}' and '{}'",
                    record.relationship_type, record.source_entity_id, record.target_entity_id
                ),
            ));
        }

        self.log_issues(GraphTable::EntityRelationships, id, &issues).await?;
        Ok(ValidationResult::from_issues(issues))
    }

    pub async fn validate_mention(&self, id: &str, record: &MentionRecord) -> Result<ValidationResult> {
        let mut issues = check_mention_record(record);
        if !self.repository.entity_exists(&record.entity_id).await? {
            issues.push(ValidationIssue::error(
                ValidationType::ReferentialIntegrity,
                "entity_id",
                format!("entity '{}' does not exist", record.entity_id),
            ));
        }
        self.log_issues(GraphTable::EntityMentions, id, &issues).await?;
        Ok(ValidationResult::from_issues(issues))
    }

    // ========== Batch Checks ==========

    /// Full scan: orphans, count drift and field violations
    ///
    /// Count drift is repaired in the same pass. Everything else is logged
    /// for [`Self::auto_correct_errors`] or manual attention.
    pub async fn run_integrity_checks(&self) -> Result<IntegrityReport> {
        let mut report = IntegrityReport::default();

        report.orphaned_mentions = self.repository.find_orphaned_mentions().await?;
        for id in &report.orphaned_mentions {
            let issue = ValidationIssue::error(
                ValidationType::ReferentialIntegrity,
                "entity_id",
                "mention references a missing entity",
            )
            .correctable();
            let record = ValidationErrorRecord::from_issue(GraphTable::EntityMentions, id, &issue);
            if self.repository.log_validation_error(&record).await? {
                report.logged_errors += 1;
            }
        }

        report.invalid_relationships = self.repository.find_orphaned_relationships().await?;
        for id in &report.invalid_relationships {
            let issue = ValidationIssue::error(
                ValidationType::ReferentialIntegrity,
                "source_entity_id",
                "relationship references a missing entity",
            )
            .correctable();
            let record = ValidationErrorRecord::from_issue(GraphTable::EntityRelationships, id, &issue);
            if self.repository.log_validation_error(&record).await? {
                report.logged_errors += 1;
            }
        }

        report.inconsistent_counts = self.repository.find_mention_count_drift().await?;
        for drift in &report.inconsistent_counts {
            if self.repository.recount_mentions(&drift.entity_id).await? {
                report.auto_fixed_issues += 1;
            }
            let issue = ValidationIssue::error(
                ValidationType::BusinessRule,
                "mention_count",
                format!(
                    "mention_count {} does not match {} mention rows",
                    drift.stored, drift.actual
                ),
            )
            .correctable();
            let record = ValidationErrorRecord::from_issue(GraphTable::Entities, &drift.entity_id, &issue)
                .corrected_with(methods::RECOUNT_MENTIONS);
            if self.repository.log_validation_error(&record).await? {
                report.logged_errors += 1;
            }
            debug!(
                entity_id = %drift.entity_id,
                stored = drift.stored,
                actual = drift.actual,
                "Mention count recomputed"
            );
        }

        for (id, record) in self.repository.entity_records().await? {
            self.collect(&mut report, GraphTable::Entities, &id, check_entity_record(&record))
                .await?;
        }
        for (id, record) in self.repository.relationship_records().await? {
            self.collect(
                &mut report,
                GraphTable::EntityRelationships,
                &id,
                check_relationship_record(&record),
            )
            .await?;
        }
        for (id, record) in self.repository.mention_records().await? {
            self.collect(&mut report, GraphTable::EntityMentions, &id, check_mention_record(&record))
                .await?;
        }

        report.total_issues = report.orphaned_mentions.len()
            + report.invalid_relationships.len()
            + report.inconsistent_counts.len()
            + report.format_errors.len();

        info!(
            total_issues = report.total_issues,
            auto_fixed = report.auto_fixed_issues,
            orphaned_mentions = report.orphaned_mentions.len(),
            invalid_relationships = report.invalid_relationships.len(),
            "Integrity checks finished"
        );
        Ok(report)
    }

    async fn collect(
        &self,
        report: &mut IntegrityReport,
        table: GraphTable,
        record_id: &str,
        issues: Vec<ValidationIssue>,
    ) -> Result<()> {
        if issues.is_empty() {
            return Ok(());
        }
        report.logged_errors += self.log_issues(table, record_id, &issues).await?;
        report.format_errors.extend(issues.into_iter().map(|issue| RecordIssue {
            table,
            record_id: record_id.to_string(),
            issue,
        }));
        Ok(())
    }

    // ========== Corrections ==========

    /// Replay corrections for logged errors
    ///
    /// Without ids every uncorrected auto-correctable entry is attempted.
    /// With ids, each named uncorrected entry is attempted. Corrected
    /// entries are skipped so the call can be repeated.
    pub async fn auto_correct_errors(&self, error_ids: Option<&[String]>) -> Result<CorrectionReport> {
        let records = self.repository.list_validation_errors(error_ids).await?;
        let mut report = CorrectionReport::default();

        if let Some(ids) = error_ids {
            for id in ids {
                if !records.iter().any(|r| &r.id == id) {
                    report.attempted += 1;
                    report.failed += 1;
                    report.errors.push(format!("{}: validation error not found", id));
                }
            }
        }

        for record in records {
            if record.is_corrected() {
                continue;
            }
            if error_ids.is_none() && !record.auto_correctable {
                continue;
            }
            report.attempted += 1;

            match self.correct(&record).await {
                Ok(Correction::Applied(method)) => {
                    self.repository
                        .mark_validation_error_corrected(&record.id, method)
                        .await?;
                    report.successful += 1;
                    debug!(error_id = %record.id, method = method, "Validation error corrected");
                }
                Ok(Correction::Unsupported(reason)) => {
                    report.failed += 1;
                    report.errors.push(format!("{}: {}", record.id, reason));
                }
                Err(e) => {
                    warn!(error_id = %record.id, error = %e, "Correction failed");
                    report.failed += 1;
                    report.errors.push(format!("{}: {}", record.id, e));
                }
            }
        }

        info!(
            attempted = report.attempted,
            successful = report.successful,
            failed = report.failed,
            "Auto-correction finished"
        );
        Ok(report)
    }

    async fn correct(&self, record: &ValidationErrorRecord) -> Result<Correction> {
        if !record.auto_correctable {
            return Ok(Correction::Unsupported("not auto-correctable".into()));
        }
        let Some(table) = GraphTable::parse(&record.table_name) else {
            return Ok(Correction::Unsupported(format!("unknown table '{}'", record.table_name)));
        };
        if !self.repository.record_exists(table, &record.record_id).await? {
            return Ok(Correction::Applied(methods::RECORD_MISSING));
        }

        let field = record.field_name.as_deref();
        let correction = match (record.validation_type, table, field) {
            (ValidationType::BusinessRule, GraphTable::Entities, _) => {
                self.repository.recount_mentions(&record.record_id).await?;
                Correction::Applied(methods::RECOUNT_MENTIONS)
            }
            (ValidationType::ReferentialIntegrity, _, _) => {
                self.repository.delete_record(table, &record.record_id).await?;
                Correction::Applied(methods::DELETE_ORPHAN)
            }
            (ValidationType::Range, _, Some(field)) => match range_bounds(field) {
                Some((lower, upper)) => {
                    self.repository
                        .clamp_field(table, &record.record_id, field, lower, upper)
                        .await?;
                    Correction::Applied(methods::CLAMP_RANGE)
                }
                None => Correction::Unsupported(format!("no range known for field '{}'", field)),
            },
            (ValidationType::Format, GraphTable::Entities, Some("normalized_name")) => {
                self.repository.renormalize_entity(&record.record_id).await?;
                Correction::Applied(methods::RENORMALIZE_NAME)
            }
            (ty, _, _) => Correction::Unsupported(format!(
                "no correction strategy for {} on {}",
                ty,
                field.unwrap_or("record")
            )),
        };
        Ok(correction)
    }

    // ========== Reporting ==========

    pub async fn get_validation_error_summary(&self, range: Option<TimeRange>) -> Result<ValidationErrorSummary> {
        let range = range.unwrap_or_default();
        let records = self
            .repository
            .list_validation_errors_between(range.start, range.end)
            .await?;
        Ok(ValidationErrorSummary::from_records(records))
    }
}

/// Valid interval for a clampable column
fn range_bounds(field: &str) -> Option<(f64, f64)> {
    match field {
        "confidence_score" | "strength" => Some((0.0, 1.0)),
        "mention_count" => Some((1.0, i64::MAX as f64)),
        _ => None,
    }
}
