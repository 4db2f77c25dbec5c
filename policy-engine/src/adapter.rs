use crate::{
    error::{PolicyError, Result},
    models::{FieldFilter, Tuple},
};
use parking_lot::RwLock;

pub mod text;

pub use text::{format_policy_text, parse_policy_text, TextAdapter};

/// One persisted row: the section it belongs to and its fields
pub type PolicyRow = (String, Tuple);

/// Persistence backend contract.
///
/// `load_policy`/`save_policy` move whole snapshots. The incremental methods
/// mirror the management API so a backing store can follow individual
/// mutations; adapters that cannot do that keep the defaults, which report
/// [`PolicyError::NotSupported`].
pub trait Adapter: Send + Sync {
    /// Read every stored row
    fn load_policy(&self) -> Result<Vec<PolicyRow>>;

    /// Replace the stored rows with `rows`
    fn save_policy(&self, rows: &[PolicyRow]) -> Result<()>;

    fn add_policy(&self, _section: &str, _tuple: &Tuple) -> Result<()> {
        Err(PolicyError::NotSupported("add_policy"))
    }

    fn add_policies(&self, section: &str, tuples: &[Tuple]) -> Result<()> {
        for tuple in tuples {
            self.add_policy(section, tuple)?;
        }
        Ok(())
    }

    fn remove_policy(&self, _section: &str, _tuple: &Tuple) -> Result<()> {
        Err(PolicyError::NotSupported("remove_policy"))
    }

    fn remove_filtered_policy(&self, _section: &str, _filter: &FieldFilter) -> Result<()> {
        Err(PolicyError::NotSupported("remove_filtered_policy"))
    }
}

/// In-memory adapter for testing and development
#[derive(Default)]
pub struct MemoryAdapter {
    rows: RwLock<Vec<PolicyRow>>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = PolicyRow>,
    {
        Self {
            rows: RwLock::new(rows.into_iter().collect()),
        }
    }

    /// Current stored rows
    pub fn rows(&self) -> Vec<PolicyRow> {
        self.rows.read().clone()
    }
}

impl Adapter for MemoryAdapter {
    fn load_policy(&self) -> Result<Vec<PolicyRow>> {
        Ok(self.rows.read().clone())
    }

    fn save_policy(&self, rows: &[PolicyRow]) -> Result<()> {
        *self.rows.write() = rows.to_vec();
        Ok(())
    }

    fn add_policy(&self, section: &str, tuple: &Tuple) -> Result<()> {
        let mut rows = self.rows.write();
        if !rows.iter().any(|(s, t)| s == section && t == tuple) {
            rows.push((section.to_string(), tuple.clone()));
        }
        Ok(())
    }

    fn remove_policy(&self, section: &str, tuple: &Tuple) -> Result<()> {
        let mut rows = self.rows.write();
        if let Some(index) = rows.iter().position(|(s, t)| s == section && t == tuple) {
            rows.remove(index);
        }
        Ok(())
    }

    fn remove_filtered_policy(&self, section: &str, filter: &FieldFilter) -> Result<()> {
        self.rows
            .write()
            .retain(|(s, t)| !(s == section && filter.matches(t)));
        Ok(())
    }
}
