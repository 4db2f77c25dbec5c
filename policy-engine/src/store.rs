use crate::{
    error::{PolicyError, Result},
    models::{FieldFilter, Tuple},
    schema::Schema,
    section::PolicySection,
};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Named, ordered, duplicate-free tuple sections behind one reader-writer lock.
///
/// Readers (`get_*`, `has`, `project_field`) run concurrently; every mutation
/// takes the write lock for the duration of one linear scan. The set of
/// sections and their arities come from the [`Schema`] and never change.
///
/// Mutations against an undeclared section, and adds whose arity does not
/// match the section, fail before any state changes. Reads against an
/// undeclared section return empty results.
pub struct PolicyStore {
    schema: Arc<Schema>,
    sections: RwLock<HashMap<String, PolicySection>>,
}

impl PolicyStore {
    pub fn new(schema: Arc<Schema>) -> Self {
        let sections = Self::empty_sections(&schema);
        Self {
            schema,
            sections: RwLock::new(sections),
        }
    }

    fn empty_sections(schema: &Schema) -> HashMap<String, PolicySection> {
        schema
            .sections()
            .map(|def| (def.name.clone(), PolicySection::new(def.arity)))
            .collect()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Section names in schema declaration order
    pub fn section_names(&self) -> Vec<String> {
        self.schema.sections().map(|s| s.name.clone()).collect()
    }

    fn validate(&self, section: &str, tuple: &Tuple) -> Result<()> {
        let expected = self.schema.arity(section)?;
        if tuple.arity() != expected {
            return Err(PolicyError::ArityMismatch {
                section: section.to_string(),
                expected,
                actual: tuple.arity(),
            });
        }
        Ok(())
    }

    // =============================================================================
    // Mutations
    // =============================================================================

    /// Append `tuple` unless an identical one is already present
    pub fn add_tuple(&self, section: &str, tuple: Tuple) -> Result<bool> {
        self.validate(section, &tuple)?;
        let mut sections = self.sections.write();
        let rows = sections
            .get_mut(section)
            .ok_or_else(|| PolicyError::UnknownSection(section.to_string()))?;

        if rows.contains(&tuple) {
            return Ok(false);
        }
        debug!(section, tuple = %tuple, "Adding tuple");
        rows.push(tuple);
        Ok(true)
    }

    /// Append every tuple not already present, returning the ones added.
    ///
    /// The whole batch is validated before anything is written.
    pub fn add_tuples(&self, section: &str, tuples: Vec<Tuple>) -> Result<Vec<Tuple>> {
        for tuple in &tuples {
            self.validate(section, tuple)?;
        }
        let mut sections = self.sections.write();
        let rows = sections
            .get_mut(section)
            .ok_or_else(|| PolicyError::UnknownSection(section.to_string()))?;

        let mut added = Vec::new();
        for tuple in tuples {
            if !rows.contains(&tuple) {
                rows.push(tuple.clone());
                added.push(tuple);
            }
        }
        debug!(section, added = added.len(), "Added tuple batch");
        Ok(added)
    }

    /// Remove the first exact match. Absent tuples, including ones of the
    /// wrong arity, are a no-op.
    pub fn remove_tuple(&self, section: &str, tuple: &Tuple) -> Result<bool> {
        let mut sections = self.sections.write();
        let rows = sections
            .get_mut(section)
            .ok_or_else(|| PolicyError::UnknownSection(section.to_string()))?;

        let removed = rows.remove(tuple);
        if removed {
            debug!(section, tuple = %tuple, "Removed tuple");
        }
        Ok(removed)
    }

    /// Remove each listed tuple that is present, returning the ones removed
    pub fn remove_tuples(&self, section: &str, tuples: &[Tuple]) -> Result<Vec<Tuple>> {
        let mut sections = self.sections.write();
        let rows = sections
            .get_mut(section)
            .ok_or_else(|| PolicyError::UnknownSection(section.to_string()))?;

        Ok(tuples
            .iter()
            .filter(|tuple| rows.remove(tuple))
            .cloned()
            .collect())
    }

    /// Remove every tuple matching `filter`, returning them in store order
    pub fn remove_filtered(&self, section: &str, filter: &FieldFilter) -> Result<Vec<Tuple>> {
        let mut sections = self.sections.write();
        let rows = sections
            .get_mut(section)
            .ok_or_else(|| PolicyError::UnknownSection(section.to_string()))?;

        let removed = rows.remove_matching(filter);
        debug!(section, filter = %filter, removed = removed.len(), "Removed filtered tuples");
        Ok(removed)
    }

    pub fn clear(&self) {
        let mut sections = self.sections.write();
        sections.values_mut().for_each(PolicySection::clear);
        info!("Cleared all policy sections");
    }

    /// Replace the contents of every section with `rows`.
    ///
    /// Every row is validated first; on error the store is left untouched.
    /// Duplicate rows collapse onto their first occurrence.
    pub fn load<I>(&self, rows: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, Tuple)>,
    {
        let mut fresh = Self::empty_sections(&self.schema);
        let mut seen: HashSet<(String, Tuple)> = HashSet::new();
        let mut count = 0usize;

        for (section, tuple) in rows {
            self.validate(&section, &tuple)?;
            if !seen.insert((section.clone(), tuple.clone())) {
                continue;
            }
            if let Some(target) = fresh.get_mut(&section) {
                target.push(tuple);
                count += 1;
            }
        }

        *self.sections.write() = fresh;
        info!(rows = count, "Loaded policy");
        Ok(())
    }

    // =============================================================================
    // Queries
    // =============================================================================

    /// Snapshot copy of a section in current order
    pub fn get_all(&self, section: &str) -> Vec<Tuple> {
        self.sections
            .read()
            .get(section)
            .map(|rows| rows.rows().to_vec())
            .unwrap_or_default()
    }

    /// Tuples matching `filter`, in store order
    pub fn get_filtered(&self, section: &str, filter: &FieldFilter) -> Vec<Tuple> {
        self.sections
            .read()
            .get(section)
            .map(|rows| rows.matching(filter).cloned().collect())
            .unwrap_or_default()
    }

    pub fn has(&self, section: &str, tuple: &Tuple) -> bool {
        self.sections
            .read()
            .get(section)
            .is_some_and(|rows| rows.contains(tuple))
    }

    /// Distinct values of `field` across a section, first occurrence first
    pub fn project_field(&self, section: &str, field: usize) -> Vec<String> {
        self.sections
            .read()
            .get(section)
            .map(|rows| rows.project(field))
            .unwrap_or_default()
    }

    pub fn len(&self, section: &str) -> usize {
        self.sections.read().get(section).map_or(0, PolicySection::len)
    }

    pub fn is_empty(&self) -> bool {
        self.sections.read().values().all(PolicySection::is_empty)
    }

    /// Run `f` against a section under the read lock without copying it
    pub fn with_section<R>(&self, section: &str, f: impl FnOnce(&PolicySection) -> R) -> Option<R> {
        self.sections.read().get(section).map(f)
    }

    /// Every row of every section, sections in schema order
    pub fn snapshot(&self) -> Vec<(String, Tuple)> {
        let sections = self.sections.read();
        self.schema
            .sections()
            .filter_map(|def| sections.get(&def.name).map(|rows| (&def.name, rows)))
            .flat_map(|(name, rows)| rows.iter().map(move |t| (name.clone(), t.clone())))
            .collect()
    }
}
