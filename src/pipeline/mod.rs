// src/pipeline/mod.rs
pub mod pacer;

use std::path::PathBuf;

use crate::config::CollectConfig;
use crate::dart::FilingService;
use crate::extractors::{FinancialFetcher, ReportLocator, SectionExtractor};
use crate::storage::{BusinessRecord, CheckpointRecord, CheckpointState, CheckpointStore, LogKind, StorageManager};
use crate::targets::Target;
use crate::utils::error::AppError;

pub use pacer::Pacer;

/// Terminal outcome of one entity in this run.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityOutcome {
    Saved(PathBuf),
    NoReport(String),
    LookupError(String),
    BusinessContentFailed(String),
}

/// Per-category counts for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total_targets: usize,
    pub already_processed: usize,
    pub saved: usize,
    pub no_report: usize,
    pub business_content_failed: usize,
    pub lookup_error: usize,
}

impl RunSummary {
    pub fn attempted(&self) -> usize {
        self.saved + self.no_report + self.business_content_failed + self.lookup_error
    }

    fn record(&mut self, outcome: &EntityOutcome) {
        match outcome {
            EntityOutcome::Saved(_) => self.saved += 1,
            EntityOutcome::NoReport(_) => self.no_report += 1,
            EntityOutcome::LookupError(_) => self.lookup_error += 1,
            EntityOutcome::BusinessContentFailed(_) => self.business_content_failed += 1,
        }
    }
}

/// Drives the collection: one entity at a time, checkpointing after each terminal outcome.
pub struct Collector<'a> {
    service: &'a dyn FilingService,
    config: CollectConfig,
    storage: StorageManager,
    checkpoint: CheckpointStore,
    locator: ReportLocator<'a>,
    extractor: SectionExtractor<'a>,
    financials: FinancialFetcher<'a>,
}

impl<'a> Collector<'a> {
    pub fn new(service: &'a dyn FilingService, config: CollectConfig) -> Result<Self, AppError> {
        let storage = StorageManager::new(
            &config.data_dir,
            config.missing_report_log.clone(),
            config.business_fail_log.clone(),
        )?;
        let checkpoint = CheckpointStore::new(config.checkpoint_path.clone());
        let locator = ReportLocator::new(
            service,
            config.retry,
            config.disclosures_since,
            config.disclosure_kind.clone(),
            config.target_year,
        );
        let extractor = SectionExtractor::new(service, config.retry);
        let financials = FinancialFetcher::new(
            service,
            config.retry,
            config.financial_year,
            config.financial_report_code.clone(),
        );

        Ok(Self {
            service,
            config,
            storage,
            checkpoint,
            locator,
            extractor,
            financials,
        })
    }

    pub fn storage(&self) -> &StorageManager {
        &self.storage
    }

    /// Processes every target not already resolved in the checkpoint.
    /// Nothing is checkpointed if the service cannot be prepared.
    pub async fn run(&self, targets: &[Target]) -> Result<RunSummary, AppError> {
        self.service.prepare().await?;

        let mut record = self.checkpoint.load()?;
        tracing::info!(
            "Checkpoint {}: {} completed, {} no report, {} lookup errors, {} failed extractions",
            self.checkpoint.path().display(),
            record.len(CheckpointState::Completed),
            record.len(CheckpointState::SkippedNoReport),
            record.len(CheckpointState::SkippedLookupError),
            record.len(CheckpointState::FailedBusinessContent)
        );
        if self.config.reset_failed {
            let cleared = record.clear(CheckpointState::FailedBusinessContent);
            self.checkpoint.save(&record)?;
            tracing::info!("Cleared {} failed_business_content entries", cleared);
        }

        let mut summary = RunSummary {
            total_targets: targets.len(),
            ..RunSummary::default()
        };
        let resolved = targets
            .iter()
            .filter(|t| record.is_resolved(&t.stock_code))
            .count();
        tracing::info!("Total targets from listed file: {}", targets.len());
        tracing::info!("Already processed (completed/no_report/lookup_error): {}", resolved);
        tracing::info!("Remaining to process now: {}", targets.len() - resolved);

        let mut pacer = Pacer::new(self.config.entity_interval);
        for (idx, target) in targets.iter().enumerate() {
            if record.is_resolved(&target.stock_code) {
                summary.already_processed += 1;
                continue;
            }
            if let Some(limit) = self.config.limit {
                if summary.attempted() >= limit {
                    tracing::info!("Reached limit of {} entities for this run", limit);
                    break;
                }
            }

            pacer.tick().await;
            tracing::info!(
                "[{}/{}] Checking {} ({})",
                idx + 1,
                targets.len(),
                target.company_name,
                target.stock_code
            );
            let outcome = self.process(target, &mut record).await?;
            match &outcome {
                EntityOutcome::Saved(path) => tracing::info!("  └ [Saved] {}", path.display()),
                EntityOutcome::NoReport(reason) | EntityOutcome::LookupError(reason) => {
                    tracing::info!("  └ [Skip] {}", reason)
                }
                EntityOutcome::BusinessContentFailed(reason) => {
                    tracing::info!("  └ [Skip] Business content extraction failed: {}", reason)
                }
            }
            summary.record(&outcome);
        }

        Ok(summary)
    }

    /// Locate, extract, fetch financials, persist. Every terminal outcome ends with a checkpoint save.
    pub async fn process(&self, target: &Target, record: &mut CheckpointRecord) -> Result<EntityOutcome, AppError> {
        let code = target.stock_code.as_str();
        let name = target.company_name.as_str();

        let located = match self.locator.locate(code, name).await {
            Ok(located) => located,
            Err(err) => {
                let reason = err.to_string();
                let (state, detail, outcome) = if err.reason.is_lookup_error() {
                    (CheckpointState::SkippedLookupError, "cannot_query_dart", EntityOutcome::LookupError(reason.clone()))
                } else {
                    (CheckpointState::SkippedNoReport, "", EntityOutcome::NoReport(reason.clone()))
                };
                self.log_skip(LogKind::MissingReport, target, &reason, detail);
                record.mark(code, state);
                self.checkpoint.save(record)?;
                tracing::debug!("Locate failed for {} queried as {}", code, err.query_identifier);
                return Ok(outcome);
            }
        };

        tracing::info!(
            "  └ Found '{}' ({}, filed {})",
            located.report_name,
            located.receipt_no,
            located.receipt_date
        );

        let description = match self.extractor.extract(&located.receipt_no).await {
            Ok(text) => text,
            Err(failure) => {
                let reason = failure.to_string();
                self.log_skip(
                    LogKind::BusinessContentFailure,
                    target,
                    &reason,
                    &format!("rcept_no={}", located.receipt_no),
                );
                record.mark(code, CheckpointState::FailedBusinessContent);
                self.checkpoint.save(record)?;
                return Ok(EntityOutcome::BusinessContentFailed(reason));
            }
        };

        let financials = self.financials.fetch(&located.query_identifier).await;
        let artifact = BusinessRecord::new(target, self.config.target_year, description, financials);
        let path = self.storage.save_record(&artifact)?;

        record.mark(code, CheckpointState::Completed);
        self.checkpoint.save(record)?;
        Ok(EntityOutcome::Saved(path))
    }

    fn log_skip(&self, kind: LogKind, target: &Target, reason: &str, detail: &str) {
        if let Err(e) = self
            .storage
            .append_log(kind, &target.stock_code, &target.company_name, reason, detail)
        {
            tracing::warn!("Failed to append {:?} log for {}: {}", kind, target.stock_code, e);
        }
    }
}
