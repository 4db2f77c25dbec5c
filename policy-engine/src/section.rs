use crate::models::{FieldFilter, Tuple};
use itertools::Itertools;

/// Ordered collection of same-arity tuples.
///
/// The section keeps insertion order and knows its arity but does not
/// de-duplicate; [`crate::store::PolicyStore`] owns that rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicySection {
    arity: usize,
    rows: Vec<Tuple>,
}

impl PolicySection {
    pub fn new(arity: usize) -> Self {
        Self {
            arity,
            rows: Vec::new(),
        }
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tuple> {
        self.rows.iter()
    }

    pub fn rows(&self) -> &[Tuple] {
        &self.rows
    }

    pub fn contains(&self, tuple: &Tuple) -> bool {
        self.rows.iter().any(|row| row == tuple)
    }

    pub fn push(&mut self, tuple: Tuple) {
        self.rows.push(tuple);
    }

    /// Remove the first exact match, shifting later rows left
    pub fn remove(&mut self, tuple: &Tuple) -> bool {
        match self.rows.iter().position(|row| row == tuple) {
            Some(index) => {
                self.rows.remove(index);
                true
            }
            None => false,
        }
    }

    /// Remove every row matching `filter`, returning them in their original order
    pub fn remove_matching(&mut self, filter: &FieldFilter) -> Vec<Tuple> {
        if !filter.fits(self.arity) {
            return Vec::new();
        }
        let (removed, kept): (Vec<Tuple>, Vec<Tuple>) =
            self.rows.drain(..).partition(|row| filter.matches(row));
        self.rows = kept;
        removed
    }

    pub fn matching<'a>(&'a self, filter: &'a FieldFilter) -> impl Iterator<Item = &'a Tuple> + 'a {
        let fits = filter.fits(self.arity);
        self.rows
            .iter()
            .filter(move |row| fits && filter.matches(row))
    }

    /// Distinct values of one field in first-occurrence order
    pub fn project(&self, field: usize) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|row| row.field(field))
            .unique()
            .map(str::to_string)
            .collect()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }
}

impl<'a> IntoIterator for &'a PolicySection {
    type Item = &'a Tuple;
    type IntoIter = std::slice::Iter<'a, Tuple>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section() -> PolicySection {
        let mut section = PolicySection::new(3);
        section.push(Tuple::from(["alice", "data1", "read"]));
        section.push(Tuple::from(["bob", "data2", "write"]));
        section.push(Tuple::from(["data2_admin", "data2", "read"]));
        section.push(Tuple::from(["data2_admin", "data2", "write"]));
        section
    }

    #[test]
    fn test_remove_shifts_left() {
        let mut section = section();
        assert!(section.remove(&Tuple::from(["bob", "data2", "write"])));
        assert!(!section.remove(&Tuple::from(["bob", "data2", "write"])));
        assert_eq!(section.len(), 3);
        assert_eq!(section.rows()[1], Tuple::from(["data2_admin", "data2", "read"]));
    }

    #[test]
    fn test_remove_matching_keeps_order() {
        let mut section = section();
        let removed = section.remove_matching(&FieldFilter::new(1, ["data2"]));
        assert_eq!(removed.len(), 3);
        assert_eq!(removed[0], Tuple::from(["bob", "data2", "write"]));
        assert_eq!(section.rows(), &[Tuple::from(["alice", "data1", "read"])]);
    }

    #[test]
    fn test_project_first_occurrence() {
        let section = section();
        assert_eq!(section.project(0), vec!["alice", "bob", "data2_admin"]);
        assert_eq!(section.project(2), vec!["read", "write"]);
        assert!(section.project(7).is_empty());
    }
}
