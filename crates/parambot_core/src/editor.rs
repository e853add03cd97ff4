use thiserror::Error;

use crate::audit::{AuditError, AuditLog, MutationRecord};
use crate::block::{EditError, ParameterBlock, Placement};

/// Failure of an audited operation. `Edit` is the recoverable taxonomy a
/// rule may catch and turn into a skip; `Audit` means a sink refused the
/// row and the whole run must stop.
#[derive(Debug, Error)]
pub enum EditorError {
    #[error("{0}")]
    Edit(#[from] EditError),
    #[error("audit log write failed: {0}")]
    Audit(#[from] AuditError),
}

/// Audited operations over one page's [`ParameterBlock`].
///
/// Every operation writes exactly one audit row, success or failure, and
/// validates its constraints up front. Dry-run mode suppresses only the
/// mutation of the block itself, so an operator can preview a run from the
/// log without touching any page.
pub struct ParameterEditor<'a> {
    page_title: &'a str,
    block: &'a mut ParameterBlock,
    audit: &'a mut AuditLog,
    dry_run: bool,
}

impl<'a> ParameterEditor<'a> {
    pub fn new(
        page_title: &'a str,
        block: &'a mut ParameterBlock,
        audit: &'a mut AuditLog,
        dry_run: bool,
    ) -> Self {
        Self {
            page_title,
            block,
            audit,
            dry_run,
        }
    }

    pub fn page_title(&self) -> &str {
        self.page_title
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn block(&self) -> &ParameterBlock {
        self.block
    }

    pub fn has(&self, name: &str) -> bool {
        self.block.has(name)
    }

    pub fn get(&self, name: &str) -> Result<&str, EditError> {
        self.block.get(name)
    }

    /// Write a value, appending the parameter at the end if it is new.
    pub fn set_value(&mut self, name: &str, value: &str) -> Result<(), EditorError> {
        self.set_value_inner(name, value, None)
    }

    /// Write a value with explicit placement relative to a sibling.
    pub fn set_value_at(
        &mut self,
        name: &str,
        value: &str,
        placement: Placement<'_>,
    ) -> Result<(), EditorError> {
        self.set_value_inner(name, value, Some(placement))
    }

    fn set_value_inner(
        &mut self,
        name: &str,
        value: &str,
        placement: Option<Placement<'_>>,
    ) -> Result<(), EditorError> {
        let previous = match self.block.get(name) {
            Ok(current) => Some(current.to_string()),
            Err(_) => None,
        };

        if let Some(placement) = placement
            && let Some(error) = self.placement_fault(name, placement)
        {
            self.log_failure(name, &error, previous.as_deref().unwrap_or(""), value)?;
            return Err(error.into());
        }

        if !self.dry_run {
            match placement {
                Some(placement) => {
                    if let Err(error) = self.block.set_at(name, value, placement) {
                        self.log_failure(name, &error, previous.as_deref().unwrap_or(""), value)?;
                        return Err(error.into());
                    }
                }
                None => self.block.set(name, value),
            }
        }

        self.audit.append(&MutationRecord::value_change(
            self.page_title,
            name,
            previous.as_deref(),
            value,
        ))?;
        Ok(())
    }

    /// Delete a parameter, logging the value it carried.
    pub fn remove_param(&mut self, name: &str) -> Result<(), EditorError> {
        let previous = match self.block.get(name) {
            Ok(current) => current.to_string(),
            Err(error) => {
                self.log_failure(name, &error, "", "")?;
                return Err(error.into());
            }
        };

        if !self.dry_run
            && let Err(error) = self.block.remove(name)
        {
            self.log_failure(name, &error, &previous, "")?;
            return Err(error.into());
        }

        self.audit
            .append(&MutationRecord::removal(self.page_title, name, &previous))?;
        Ok(())
    }

    /// Rename by inserting the new name right before the old one and then
    /// removing the old entry, so the parameter keeps its position. Logged
    /// as a single rename row.
    pub fn rename_param(&mut self, old_name: &str, new_name: &str) -> Result<(), EditorError> {
        let value = match self.block.get(old_name) {
            Ok(current) => current.to_string(),
            Err(error) => {
                self.log_failure(old_name, &error, "", "")?;
                return Err(error.into());
            }
        };
        if old_name == new_name {
            let error = EditError::InvalidPlacement(format!(
                "cannot rename '{old_name}' to its own name"
            ));
            self.log_failure(old_name, &error, &value, &value)?;
            return Err(error.into());
        }

        if !self.dry_run {
            if let Err(error) = self
                .block
                .set_at(new_name, value.clone(), Placement::Before(old_name))
            {
                self.log_failure(old_name, &error, &value, &value)?;
                return Err(error.into());
            }
            if let Err(error) = self.block.remove(old_name) {
                self.log_failure(old_name, &error, &value, &value)?;
                return Err(error.into());
            }
        }

        self.audit.append(&MutationRecord::rename(
            self.page_title,
            old_name,
            new_name,
        ))?;
        Ok(())
    }

    /// Relocate a parameter before or after a sibling. Logged as a single
    /// move row naming the pivot.
    pub fn move_param(&mut self, name: &str, placement: Placement<'_>) -> Result<(), EditorError> {
        let fault = if !self.block.has(name) {
            Some(EditError::MissingParam(name.to_string()))
        } else {
            self.placement_fault(name, placement)
        };
        if let Some(error) = fault {
            self.log_failure(name, &error, "", "")?;
            return Err(error.into());
        }

        if !self.dry_run
            && let Err(error) = self.block.move_to(name, placement)
        {
            self.log_failure(name, &error, "", "")?;
            return Err(error.into());
        }

        self.audit.append(&MutationRecord::moved(
            self.page_title,
            name,
            &placement.describe(),
        ))?;
        Ok(())
    }

    /// Idempotency guard: a sentinel parameter that is already present
    /// means an earlier run touched this page. Trips with one note row.
    pub fn guard_not_processed(
        &mut self,
        sentinel: &str,
        log_param: &str,
    ) -> Result<(), EditorError> {
        if self.block.has(sentinel) {
            self.audit.append(&MutationRecord::note(
                self.page_title,
                log_param,
                "already processed",
            ))?;
            return Err(EditError::AlreadyProcessed(sentinel.to_string()).into());
        }
        Ok(())
    }

    /// Record a recoverable rule-level condition without mutating anything.
    pub fn log_error(
        &mut self,
        param: &str,
        error_text: &str,
        value_before: &str,
        value_after: &str,
    ) -> Result<(), EditorError> {
        self.audit.append(&MutationRecord::error(
            self.page_title,
            param,
            error_text,
            value_before,
            value_after,
        ))?;
        Ok(())
    }

    pub fn log_note(&mut self, param: &str, note: &str) -> Result<(), EditorError> {
        self.audit
            .append(&MutationRecord::note(self.page_title, param, note))?;
        Ok(())
    }

    fn placement_fault(&self, name: &str, placement: Placement<'_>) -> Option<EditError> {
        let pivot = placement.pivot();
        if !self.block.has(pivot) {
            return Some(EditError::MissingParam(pivot.to_string()));
        }
        if pivot == name {
            return Some(EditError::InvalidPlacement(format!(
                "cannot place '{name}' relative to itself"
            )));
        }
        None
    }

    fn log_failure(
        &mut self,
        param: &str,
        error: &EditError,
        value_before: &str,
        value_after: &str,
    ) -> Result<(), AuditError> {
        self.audit.append(&MutationRecord::error(
            self.page_title,
            param,
            &error.to_string(),
            value_before,
            value_after,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use tempfile::{TempDir, tempdir};

    use super::*;

    fn open_log(temp: &TempDir, name: &str) -> (AuditLog, PathBuf) {
        let path = temp.path().join(name);
        let log = AuditLog::open(std::slice::from_ref(&path)).expect("open log");
        (log, path)
    }

    fn read_rows(path: &Path) -> Vec<Vec<String>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)
            .expect("open log");
        reader
            .records()
            .skip(1) // header
            .map(|record| {
                record
                    .expect("row")
                    .iter()
                    .map(|field| field.to_string())
                    .collect()
            })
            .collect()
    }

    fn sample_block() -> ParameterBlock {
        ParameterBlock::from_pairs([("a", "1"), ("b", "2"), ("c", "3")])
    }

    #[test]
    fn set_value_logs_created_note_for_new_param() {
        let temp = tempdir().expect("tempdir");
        let (mut log, path) = open_log(&temp, "log.csv");
        let mut block = ParameterBlock::new();
        let mut editor = ParameterEditor::new("Vanguard", &mut block, &mut log, false);

        editor.set_value("crew", "5").expect("set");

        assert_eq!(block.get("crew").expect("get"), "5");
        let rows = read_rows(&path);
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0],
            vec!["Vanguard", "crew", "ok", "", "5", "", "param CREATED"]
        );
    }

    #[test]
    fn set_value_compares_existing_values() {
        let temp = tempdir().expect("tempdir");
        let (mut log, path) = open_log(&temp, "log.csv");
        let mut block = ParameterBlock::from_pairs([("crew", "5")]);
        let mut editor = ParameterEditor::new("Vanguard", &mut block, &mut log, false);

        editor.set_value("crew", "5").expect("unchanged");
        editor.set_value("crew", "6").expect("changed");

        let rows = read_rows(&path);
        assert_eq!(rows[0][5], "false");
        assert_eq!(rows[1][5], "true");
        assert_eq!(rows[1][3], "5");
        assert_eq!(rows[1][4], "6");
    }

    #[test]
    fn every_call_logs_exactly_one_row_even_on_failure() {
        let temp = tempdir().expect("tempdir");
        let (mut log, path) = open_log(&temp, "log.csv");
        let mut block = sample_block();
        let mut editor = ParameterEditor::new("Vanguard", &mut block, &mut log, false);

        editor.set_value("a", "10").expect("set");
        assert!(editor.remove_param("missing").is_err());
        assert!(editor.rename_param("missing", "other").is_err());
        assert!(
            editor
                .set_value_at("x", "9", Placement::Before("missing"))
                .is_err()
        );
        assert!(editor.move_param("a", Placement::After("a")).is_err());

        let rows = read_rows(&path);
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0][2], "ok");
        for row in &rows[1..] {
            assert_ne!(row[2], "ok");
        }
        // failed calls left the block untouched
        assert_eq!(block.names().collect::<Vec<_>>(), ["a", "b", "c"]);
    }

    #[test]
    fn dry_run_logs_identical_rows_without_mutating() {
        let temp = tempdir().expect("tempdir");

        let (mut live_log, live_path) = open_log(&temp, "live.csv");
        let mut live_block = sample_block();
        let mut live = ParameterEditor::new("Vanguard", &mut live_block, &mut live_log, false);
        live.set_value("a", "10").expect("set");
        live.set_value_at("x", "9", Placement::After("a")).expect("set_at");
        live.remove_param("c").expect("remove");

        let (mut dry_log, dry_path) = open_log(&temp, "dry.csv");
        let mut dry_block = sample_block();
        let mut dry = ParameterEditor::new("Vanguard", &mut dry_block, &mut dry_log, true);
        dry.set_value("a", "10").expect("set");
        dry.set_value_at("x", "9", Placement::After("a")).expect("set_at");
        dry.remove_param("c").expect("remove");

        assert_eq!(read_rows(&live_path), read_rows(&dry_path));
        assert_eq!(dry_block, sample_block());
        assert_ne!(live_block, sample_block());
    }

    #[test]
    fn rename_preserves_position_and_logs_one_row() {
        let temp = tempdir().expect("tempdir");
        let (mut log, path) = open_log(&temp, "log.csv");
        let mut block = sample_block();
        let mut editor = ParameterEditor::new("Vanguard", &mut block, &mut log, false);

        editor.rename_param("b", "x").expect("rename");

        assert_eq!(block.names().collect::<Vec<_>>(), ["a", "x", "c"]);
        assert_eq!(block.get("x").expect("get"), "2");
        let rows = read_rows(&path);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][6], "param RENAMED to: x");
    }

    #[test]
    fn move_after_logs_pivot_note() {
        let temp = tempdir().expect("tempdir");
        let (mut log, path) = open_log(&temp, "log.csv");
        let mut block = ParameterBlock::from_pairs([("a", "1"), ("b", "2")]);
        let mut editor = ParameterEditor::new("Vanguard", &mut block, &mut log, false);

        editor.move_param("a", Placement::After("b")).expect("move");

        assert_eq!(block.names().collect::<Vec<_>>(), ["b", "a"]);
        let rows = read_rows(&path);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][6], "param MOVED after: b");
    }

    #[test]
    fn guard_trips_on_sentinel_with_one_note_row() {
        let temp = tempdir().expect("tempdir");
        let (mut log, path) = open_log(&temp, "log.csv");
        let mut block = ParameterBlock::from_pairs([("crew", "5"), ("suggested_crew", "4")]);
        let mut editor = ParameterEditor::new("Vanguard", &mut block, &mut log, false);

        let err = editor
            .guard_not_processed("suggested_crew", "crew")
            .expect_err("must trip");
        assert!(matches!(
            err,
            EditorError::Edit(EditError::AlreadyProcessed(_))
        ));

        let rows = read_rows(&path);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][6], "already processed");

        // absent sentinel passes without logging
        let mut clean = ParameterBlock::from_pairs([("crew", "5")]);
        let mut editor = ParameterEditor::new("Vanguard", &mut clean, &mut log, false);
        editor
            .guard_not_processed("suggested_crew", "crew")
            .expect("clean page");
        assert_eq!(read_rows(&path).len(), 1);
    }
}
