use std::path::PathBuf;
use std::thread::sleep;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::audit::{AuditError, AuditLog, MutationRecord, run_timestamp};
use crate::config::BotConfig;
use crate::editor::ParameterEditor;
use crate::input::{InputSnapshot, InputTable, load_csv, snapshot_input};
use crate::rules::{PageContext, PageOutcome, Rule};
use crate::store::PageStore;
use crate::wikitext::{find_template, replace_template};

/// Everything resolved during Init, before any page is touched. The CLI
/// announces mode, summary and page count from this, giving the operator a
/// last chance to abort.
#[derive(Debug)]
pub struct RunPlan {
    pub timestamp: String,
    pub dry_run: bool,
    pub template: String,
    pub summary: String,
    pub page_titles: Vec<String>,
    pub sink_paths: Vec<PathBuf>,
    pub input_snapshot: Option<InputSnapshot>,
    delay_seconds: u64,
    audit: AuditLog,
    input: Option<InputTable>,
}

impl RunPlan {
    pub fn page_count(&self) -> usize {
        self.page_titles.len()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub dry_run: bool,
    pub pages_seen: usize,
    pub pages_edited: usize,
    pub pages_skipped: usize,
    pub pages_failed: usize,
    pub pages_outside_namespace: usize,
}

/// Orchestrates one run: Init (`prepare`), then strictly sequential
/// per-page processing (`execute`). One page is fully loaded, decided,
/// mutated and committed before the next begins.
pub struct RunDriver<'a> {
    config: &'a BotConfig,
    rule: &'a dyn Rule,
}

impl<'a> RunDriver<'a> {
    pub fn new(config: &'a BotConfig, rule: &'a dyn Rule) -> Self {
        Self { config, rule }
    }

    pub fn prepare(&self, store: &dyn PageStore) -> Result<RunPlan> {
        self.prepare_at(store, &run_timestamp())
    }

    /// Init with an explicit run timestamp: validate the configuration,
    /// load and snapshot the input data, open the audit sinks, resolve the
    /// page list.
    pub fn prepare_at(&self, store: &dyn PageStore, timestamp: &str) -> Result<RunPlan> {
        self.config.validate()?;

        let input = if self.config.input.enabled {
            Some(load_csv(
                &self.config.input.path,
                self.config.input.skip_header,
                &self.config.input.transforms(),
            )?)
        } else {
            None
        };
        let input_snapshot = if self.config.input.enabled {
            Some(snapshot_input(
                &self.config.input.path,
                &self.config.paths.input_copy_dir,
                timestamp,
            )?)
        } else {
            None
        };

        let sink_paths = self.config.audit_sinks(timestamp);
        let audit = AuditLog::open(&sink_paths)?;

        let mut page_titles = if self.config.input.source_pages {
            input
                .as_ref()
                .context("input data is required to source the page list")?
                .page_titles()
        } else {
            store.list_pages(&self.config.run.template)?
        };
        if let Some(limit) = self.config.run.page_limit {
            page_titles.truncate(limit);
        }

        Ok(RunPlan {
            timestamp: timestamp.to_string(),
            dry_run: self.config.dry_run(),
            template: self.config.run.template.clone(),
            summary: self.config.run.summary.clone(),
            page_titles,
            sink_paths,
            input_snapshot,
            delay_seconds: self.config.run.delay_seconds,
            audit,
            input,
        })
    }

    /// Iterate the planned pages. Per-page faults are logged and skipped;
    /// only an unwritable audit sink (or a failed commit) aborts the run.
    pub fn execute(&self, store: &mut dyn PageStore, mut plan: RunPlan) -> Result<RunReport> {
        let mut report = RunReport {
            dry_run: plan.dry_run,
            ..RunReport::default()
        };

        for (index, title) in plan.page_titles.iter().enumerate() {
            if index > 0 && plan.delay_seconds > 0 {
                sleep(Duration::from_secs(plan.delay_seconds));
            }
            report.pages_seen += 1;

            let doc = match store.load(title) {
                Ok(doc) => doc,
                Err(error) => {
                    append_error(&mut plan.audit, title, &format!("failed to load page: {error:#}"))?;
                    report.pages_failed += 1;
                    continue;
                }
            };

            // non-content pages (template docs, user sandboxes) are not
            // the bot's to touch; skipping them is not an error
            if !doc.namespace.is_content() {
                report.pages_outside_namespace += 1;
                continue;
            }

            let Some(instance) = find_template(&doc.text, &plan.template) else {
                append_error(&mut plan.audit, title, "template is not present on the page")?;
                report.pages_failed += 1;
                continue;
            };

            let mut block = instance.block.clone();
            let ctx = PageContext {
                title,
                input: plan.input.as_ref(),
            };
            let outcome = {
                let mut editor =
                    ParameterEditor::new(title, &mut block, &mut plan.audit, plan.dry_run);
                self.rule.apply(&ctx, &mut editor)
            };

            match outcome {
                Ok(PageOutcome::Edited { .. }) => {
                    // the page's queued mutations land as one commit; the
                    // audit trail already records them, so a failed commit
                    // must fail loudly rather than be skipped over
                    if !plan.dry_run && block != instance.block {
                        let new_text = replace_template(&doc.text, &instance, &block);
                        store
                            .commit(title, &new_text, &plan.summary)
                            .with_context(|| format!("failed to commit page '{title}'"))?;
                    }
                    report.pages_edited += 1;
                }
                Ok(PageOutcome::Skipped { .. }) => {
                    report.pages_skipped += 1;
                }
                Err(error) if is_fatal(&error) => return Err(error),
                Err(error) => {
                    append_error(&mut plan.audit, title, &format!("{error:#}"))?;
                    report.pages_failed += 1;
                }
            }
        }

        Ok(report)
    }
}

/// An [`AuditError`] anywhere in the chain means the trail can no longer be
/// trusted, which ends the run.
fn is_fatal(error: &anyhow::Error) -> bool {
    error
        .chain()
        .any(|cause| cause.downcast_ref::<AuditError>().is_some())
}

fn append_error(audit: &mut AuditLog, title: &str, text: &str) -> Result<(), AuditError> {
    audit.append(&MutationRecord::error(title, "", text, "", ""))
}
