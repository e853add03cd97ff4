use anyhow::{Context, Result, bail};
use regex::Regex;

use crate::block::{EditError, Placement};
use crate::config::BotConfig;
use crate::editor::{EditorError, ParameterEditor};
use crate::input::InputTable;

pub const RULE_NAMES: [&str; 2] = ["crew-split", "lookup-replace"];

/// Everything a rule may read about the page besides the block itself.
pub struct PageContext<'a> {
    pub title: &'a str,
    pub input: Option<&'a InputTable>,
}

/// Typed per-page outcome. Recoverable conditions are logged by the rule
/// and reported as a skip; errors are reserved for genuine faults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Edited { changes: usize },
    Skipped { reason: String },
}

/// Per-run business logic: decides which editor operations to apply to one
/// page. A malformed page must never abort the run, so rules log and skip
/// instead of failing.
pub trait Rule: std::fmt::Debug {
    fn name(&self) -> &'static str;
    fn describe(&self) -> &'static str;
    fn apply(
        &self,
        ctx: &PageContext<'_>,
        editor: &mut ParameterEditor<'_>,
    ) -> Result<PageOutcome>;
}

pub fn build_rule(name: &str, config: &BotConfig) -> Result<Box<dyn Rule>> {
    match name {
        "crew-split" => Ok(Box::new(CrewSplitRule::new(
            &config.rule.source_param,
            &config.rule.target_param,
        )?)),
        "lookup-replace" => Ok(Box::new(LookupReplaceRule::new(
            &config.rule.lookup_param,
            config.rule.lookup_column,
        ))),
        other => bail!(
            "unknown rule '{other}' (available: {})",
            RULE_NAMES.join(", ")
        ),
    }
}

fn skip(reason: &str) -> PageOutcome {
    PageOutcome::Skipped {
        reason: reason.to_string(),
    }
}

/// Transform-in-place: split a combined "<count> (Suggested: <count>)"
/// value into the bare count plus a sibling parameter holding the
/// suggestion, inserted right after the source parameter.
#[derive(Debug)]
pub struct CrewSplitRule {
    source_param: String,
    target_param: String,
    magnitude: Regex,
    suggested: Regex,
}

impl CrewSplitRule {
    pub fn new(source_param: &str, target_param: &str) -> Result<Self> {
        Ok(Self {
            source_param: source_param.to_string(),
            target_param: target_param.to_string(),
            magnitude: Regex::new(r"\d+").context("failed to compile magnitude pattern")?,
            suggested: Regex::new(r"Suggested: ([+-]?(?:[0-9]*[.])?[0-9]+)")
                .context("failed to compile suggestion pattern")?,
        })
    }
}

impl Rule for CrewSplitRule {
    fn name(&self) -> &'static str {
        "crew-split"
    }

    fn describe(&self) -> &'static str {
        "split a combined count value into the count plus a suggested-count param"
    }

    fn apply(
        &self,
        _ctx: &PageContext<'_>,
        editor: &mut ParameterEditor<'_>,
    ) -> Result<PageOutcome> {
        // the target param doubles as the already-processed sentinel
        match editor.guard_not_processed(&self.target_param, &self.source_param) {
            Ok(()) => {}
            Err(EditorError::Edit(EditError::AlreadyProcessed(_))) => {
                return Ok(skip("already processed"));
            }
            Err(error) => return Err(error.into()),
        }

        if !editor.has(&self.source_param) {
            editor.log_error(&self.source_param, "param is not present", "", "")?;
            return Ok(skip("param is not present"));
        }
        let value = editor.get(&self.source_param)?.to_string();

        let Some(magnitude) = self.magnitude.find(&value) else {
            editor.log_error(
                &self.source_param,
                "failed to extract the current crew count",
                &value,
                "",
            )?;
            return Ok(skip("failed to extract the current crew count"));
        };
        let current = magnitude.as_str();
        if current.parse::<i64>().is_err() {
            editor.log_error(
                &self.source_param,
                "failed to extract the current crew count",
                &value,
                "",
            )?;
            return Ok(skip("failed to extract the current crew count"));
        }

        let Some(captures) = self.suggested.captures(&value) else {
            editor.log_error(
                &self.source_param,
                "failed to extract the suggested crew count",
                &value,
                "",
            )?;
            return Ok(skip("failed to extract the suggested crew count"));
        };
        let suggested = match captures.get(1) {
            Some(group) => group.as_str().to_string(),
            None => bail!("suggestion pattern matched without a capture"),
        };

        editor.set_value(&self.source_param, current)?;
        editor.set_value_at(
            &self.target_param,
            &suggested,
            Placement::After(&self.source_param),
        )?;
        Ok(PageOutcome::Edited { changes: 2 })
    }
}

/// Lookup-driven replace: find the input row keyed by the page title and
/// set the parameter to the value from a configured column.
#[derive(Debug)]
pub struct LookupReplaceRule {
    param: String,
    value_column: usize,
}

impl LookupReplaceRule {
    pub fn new(param: &str, value_column: usize) -> Self {
        Self {
            param: param.to_string(),
            value_column,
        }
    }
}

impl Rule for LookupReplaceRule {
    fn name(&self) -> &'static str {
        "lookup-replace"
    }

    fn describe(&self) -> &'static str {
        "set a param to the value from the input row matching the page title"
    }

    fn apply(
        &self,
        ctx: &PageContext<'_>,
        editor: &mut ParameterEditor<'_>,
    ) -> Result<PageOutcome> {
        let Some(input) = ctx.input else {
            editor.log_error(&self.param, "no input data loaded", "", "")?;
            return Ok(skip("no input data loaded"));
        };
        let Some(row) = input.match_title(ctx.title) else {
            editor.log_error(&self.param, "no matching input entry", "", "")?;
            return Ok(skip("no matching input entry"));
        };
        let Some(new_value) = row.get(self.value_column) else {
            editor.log_error(
                &self.param,
                &format!("matching input entry has no column {}", self.value_column),
                "",
                "",
            )?;
            return Ok(skip("matching input entry is too short"));
        };
        let new_value = new_value.clone();

        editor.set_value(&self.param, &new_value)?;
        Ok(PageOutcome::Edited { changes: 1 })
    }
}
