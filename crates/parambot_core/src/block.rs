use thiserror::Error;

/// Operation-level failures raised by [`ParameterBlock`] and the editor.
///
/// These are expected control-flow outcomes for a batch run (a page missing
/// a parameter is skipped, not a crash), so they are a typed enum rather
/// than opaque `anyhow` errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EditError {
    #[error("param '{0}' is missing from the template")]
    MissingParam(String),
    #[error("invalid placement: {0}")]
    InvalidPlacement(String),
    #[error("param '{0}' is already present; page was processed by an earlier run")]
    AlreadyProcessed(String),
}

/// Where a parameter should land relative to a named sibling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement<'a> {
    Before(&'a str),
    After(&'a str),
}

impl<'a> Placement<'a> {
    /// Resolve the optional before/after pair that config and CLI input
    /// arrive as. Exactly one side must be given.
    pub fn from_options(
        before: Option<&'a str>,
        after: Option<&'a str>,
    ) -> Result<Self, EditError> {
        match (before, after) {
            (Some(_), Some(_)) => Err(EditError::InvalidPlacement(
                "both 'before' and 'after' are set".to_string(),
            )),
            (None, None) => Err(EditError::InvalidPlacement(
                "both 'before' and 'after' are unset".to_string(),
            )),
            (Some(pivot), None) => Ok(Self::Before(pivot)),
            (None, Some(pivot)) => Ok(Self::After(pivot)),
        }
    }

    pub fn pivot(self) -> &'a str {
        match self {
            Self::Before(pivot) | Self::After(pivot) => pivot,
        }
    }

    pub fn describe(self) -> String {
        match self {
            Self::Before(pivot) => format!("before: {pivot}"),
            Self::After(pivot) => format!("after: {pivot}"),
        }
    }
}

/// One named value of a template instance. The value keeps whatever
/// whitespace the page carried; comparisons trim, storage does not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamEntry {
    pub name: String,
    pub value: String,
}

/// Ordered, name-unique parameter set of one template instance on one page.
///
/// Order is semantically meaningful (before/after placement works off it)
/// and survives every edit that does not explicitly reposition. Positions
/// are always derived from the current order, never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterBlock {
    entries: Vec<ParamEntry>,
}

impl ParameterBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, N, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<String>,
        V: Into<String>,
    {
        let mut block = Self::new();
        for (name, value) in pairs {
            block.set(&name.into(), value.into());
        }
        block
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ParamEntry] {
        &self.entries
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    pub fn has(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    /// Trimmed view of a parameter value.
    pub fn get(&self, name: &str) -> Result<&str, EditError> {
        let index = self
            .index_of(name)
            .ok_or_else(|| EditError::MissingParam(name.to_string()))?;
        Ok(self.entries[index].value.trim())
    }

    pub fn get_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        match self.get(name) {
            Ok(value) => value,
            Err(_) => default,
        }
    }

    /// Overwrite in place (position unchanged) or append at the end.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.index_of(name) {
            Some(index) => self.entries[index].value = value,
            None => self.entries.push(ParamEntry {
                name: name.to_string(),
                value,
            }),
        }
    }

    /// Overwrite plus explicit repositioning, or positional insert for a
    /// new name. The pivot must exist and must not be the name itself.
    pub fn set_at(
        &mut self,
        name: &str,
        value: impl Into<String>,
        placement: Placement<'_>,
    ) -> Result<(), EditError> {
        let pivot = placement.pivot();
        if !self.has(pivot) {
            return Err(EditError::MissingParam(pivot.to_string()));
        }
        if pivot == name {
            return Err(EditError::InvalidPlacement(format!(
                "cannot place '{name}' relative to itself"
            )));
        }
        let value = value.into();
        if let Some(from) = self.index_of(name) {
            self.entries.remove(from);
        }
        self.insert_at(
            ParamEntry {
                name: name.to_string(),
                value,
            },
            placement,
        )
    }

    /// Delete an entry; the gap closes and later entries shift left.
    pub fn remove(&mut self, name: &str) -> Result<ParamEntry, EditError> {
        let index = self
            .index_of(name)
            .ok_or_else(|| EditError::MissingParam(name.to_string()))?;
        Ok(self.entries.remove(index))
    }

    /// Relocate an existing entry relative to a named sibling. Implemented
    /// as a single remove-then-reinsert at the resolved target.
    pub fn move_to(&mut self, name: &str, placement: Placement<'_>) -> Result<(), EditError> {
        if !self.has(name) {
            return Err(EditError::MissingParam(name.to_string()));
        }
        let pivot = placement.pivot();
        if !self.has(pivot) {
            return Err(EditError::MissingParam(pivot.to_string()));
        }
        if pivot == name {
            return Err(EditError::InvalidPlacement(format!(
                "cannot move '{name}' relative to itself"
            )));
        }
        let entry = self.remove(name)?;
        self.insert_at(entry, placement)
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.name == name)
    }

    fn insert_at(&mut self, entry: ParamEntry, placement: Placement<'_>) -> Result<(), EditError> {
        let pivot_index = self
            .index_of(placement.pivot())
            .ok_or_else(|| EditError::MissingParam(placement.pivot().to_string()))?;
        let target = match placement {
            Placement::Before(_) => pivot_index,
            // there is no entry after the last one to insert before, so
            // landing after the final entry is a plain append
            Placement::After(_) if pivot_index + 1 == self.entries.len() => self.entries.len(),
            Placement::After(_) => pivot_index + 1,
        };
        self.entries.insert(target, entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ParameterBlock {
        ParameterBlock::from_pairs([("a", "1"), ("b", "2"), ("c", "3")])
    }

    fn order(block: &ParameterBlock) -> Vec<&str> {
        block.names().collect()
    }

    #[test]
    fn set_then_get_on_fresh_name() {
        let mut block = ParameterBlock::new();
        block.set("crew", "5");
        assert!(block.has("crew"));
        assert_eq!(block.get("crew").expect("get"), "5");
    }

    #[test]
    fn get_returns_trimmed_value() {
        let block = ParameterBlock::from_pairs([("crew", " 5 \n")]);
        assert_eq!(block.get("crew").expect("get"), "5");
    }

    #[test]
    fn get_missing_fails() {
        let block = sample();
        assert_eq!(
            block.get("missing"),
            Err(EditError::MissingParam("missing".to_string()))
        );
        assert_eq!(block.get_or("missing", "fallback"), "fallback");
    }

    #[test]
    fn set_overwrites_in_place() {
        let mut block = sample();
        block.set("b", "20");
        assert_eq!(order(&block), ["a", "b", "c"]);
        assert_eq!(block.get("b").expect("get"), "20");
        assert_eq!(block.len(), 3);
    }

    #[test]
    fn remove_closes_the_gap() {
        let mut block = sample();
        let removed = block.remove("b").expect("remove");
        assert_eq!(removed.value, "2");
        assert!(!block.has("b"));
        assert_eq!(order(&block), ["a", "c"]);
        assert_eq!(
            block.remove("b"),
            Err(EditError::MissingParam("b".to_string()))
        );
    }

    #[test]
    fn set_at_inserts_before_pivot() {
        let mut block = sample();
        block
            .set_at("x", "9", Placement::Before("b"))
            .expect("set_at");
        assert_eq!(order(&block), ["a", "x", "b", "c"]);
    }

    #[test]
    fn set_at_repositions_existing_entry() {
        let mut block = sample();
        block
            .set_at("c", "30", Placement::After("a"))
            .expect("set_at");
        assert_eq!(order(&block), ["a", "c", "b"]);
        assert_eq!(block.get("c").expect("get"), "30");
    }

    #[test]
    fn set_at_rejects_missing_pivot_and_self_pivot() {
        let mut block = sample();
        assert_eq!(
            block.set_at("x", "9", Placement::Before("nope")),
            Err(EditError::MissingParam("nope".to_string()))
        );
        assert!(matches!(
            block.set_at("a", "9", Placement::After("a")),
            Err(EditError::InvalidPlacement(_))
        ));
        assert_eq!(order(&block), ["a", "b", "c"]);
    }

    #[test]
    fn move_after_last_entry_appends() {
        let mut block = ParameterBlock::from_pairs([("a", "1"), ("b", "2")]);
        block.move_to("a", Placement::After("b")).expect("move");
        assert_eq!(order(&block), ["b", "a"]);
        assert_eq!(block.get("a").expect("get"), "1");
    }

    #[test]
    fn move_before_relocates() {
        let mut block = sample();
        block.move_to("c", Placement::Before("a")).expect("move");
        assert_eq!(order(&block), ["c", "a", "b"]);
    }

    #[test]
    fn move_missing_name_or_pivot_fails_without_mutating() {
        let mut block = sample();
        assert_eq!(
            block.move_to("nope", Placement::Before("a")),
            Err(EditError::MissingParam("nope".to_string()))
        );
        assert_eq!(
            block.move_to("a", Placement::Before("nope")),
            Err(EditError::MissingParam("nope".to_string()))
        );
        assert_eq!(order(&block), ["a", "b", "c"]);
    }

    #[test]
    fn placement_from_options_requires_exactly_one_side() {
        assert!(matches!(
            Placement::from_options(None, None),
            Err(EditError::InvalidPlacement(_))
        ));
        assert!(matches!(
            Placement::from_options(Some("a"), Some("b")),
            Err(EditError::InvalidPlacement(_))
        ));
        assert_eq!(
            Placement::from_options(Some("a"), None).expect("before"),
            Placement::Before("a")
        );
        assert_eq!(
            Placement::from_options(None, Some("b")).expect("after"),
            Placement::After("b")
        );
    }
}
