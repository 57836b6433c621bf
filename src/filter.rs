// ABOUTME: Table selection rules for partial backups
// ABOUTME: Applies include/exclude lists to the discovered table set

use crate::error::BackupError;

/// Which tables of the schema a run should back up.
///
/// Include and exclude lists are mutually exclusive; configuration rejects
/// setting both. An empty filter selects every table.
#[derive(Debug, Clone, Default)]
pub struct TableFilter {
    include: Option<Vec<String>>,
    exclude: Option<Vec<String>>,
}

impl TableFilter {
    pub fn new(
        include: Option<Vec<String>>,
        exclude: Option<Vec<String>>,
    ) -> Result<Self, BackupError> {
        if include.is_some() && exclude.is_some() {
            return Err(BackupError::Config(
                "cannot use both include and exclude table lists".into(),
            ));
        }
        Ok(Self { include, exclude })
    }

    /// Selects every table.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_none() && self.exclude.is_none()
    }

    pub fn should_back_up(&self, table: &str) -> bool {
        if let Some(ref include) = self.include {
            if !include.iter().any(|t| t == table) {
                return false;
            }
        }
        if let Some(ref exclude) = self.exclude {
            if exclude.iter().any(|t| t == table) {
                return false;
            }
        }
        true
    }

    /// Names from the include list that matched nothing in the discovered
    /// set, for warning the operator about typos.
    pub fn unmatched_includes(&self, discovered: &[String]) -> Vec<String> {
        match &self.include {
            Some(include) => include
                .iter()
                .filter(|t| !discovered.contains(t))
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_selects_everything() {
        let filter = TableFilter::all();
        assert!(filter.is_empty());
        assert!(filter.should_back_up("users"));
        assert!(filter.should_back_up("orders"));
    }

    #[test]
    fn include_list_limits_selection() {
        let filter = TableFilter::new(Some(vec!["users".into()]), None).unwrap();
        assert!(filter.should_back_up("users"));
        assert!(!filter.should_back_up("orders"));
    }

    #[test]
    fn exclude_list_removes_tables() {
        let filter = TableFilter::new(None, Some(vec!["audit_log".into()])).unwrap();
        assert!(filter.should_back_up("users"));
        assert!(!filter.should_back_up("audit_log"));
    }

    #[test]
    fn both_lists_rejected() {
        assert!(TableFilter::new(Some(vec!["a".into()]), Some(vec!["b".into()])).is_err());
    }

    #[test]
    fn unmatched_includes_reported() {
        let filter =
            TableFilter::new(Some(vec!["users".into(), "ghosts".into()]), None).unwrap();
        let discovered = vec!["users".to_string(), "orders".to_string()];
        assert_eq!(filter.unmatched_includes(&discovered), vec!["ghosts"]);
    }
}
