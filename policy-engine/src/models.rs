use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// One rule or one role edge: an ordered, fixed-arity sequence of string fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tuple(Vec<String>);

impl Tuple {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(fields.into_iter().map(Into::into).collect())
    }

    pub fn fields(&self) -> &[String] {
        &self.0
    }

    pub fn field(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    pub fn arity(&self) -> usize {
        self.0.len()
    }

    pub fn into_fields(self) -> Vec<String> {
        self.0
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(", "))
    }
}

impl From<Vec<String>> for Tuple {
    fn from(fields: Vec<String>) -> Self {
        Self(fields)
    }
}

impl From<&[&str]> for Tuple {
    fn from(fields: &[&str]) -> Self {
        Self::new(fields.iter().copied())
    }
}

impl<const N: usize> From<[&str; N]> for Tuple {
    fn from(fields: [&str; N]) -> Self {
        Self::new(fields)
    }
}

/// Positional filter: fields `[start, start + values.len())` must equal `values`.
///
/// Fields outside the window are unconstrained. A window reaching past the
/// end of a tuple never matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFilter {
    start: usize,
    values: SmallVec<[String; 4]>,
}

impl FieldFilter {
    pub fn new<I, S>(start: usize, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            start,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Exclusive end of the constrained window, `None` on overflow
    pub fn end(&self) -> Option<usize> {
        self.start.checked_add(self.values.len())
    }

    /// Whether the window lies inside tuples of the given arity
    pub fn fits(&self, arity: usize) -> bool {
        self.end().is_some_and(|end| end <= arity)
    }

    pub fn matches(&self, tuple: &Tuple) -> bool {
        let Some(end) = self.end() else {
            return false;
        };
        tuple
            .fields()
            .get(self.start..end)
            .is_some_and(|window| window.iter().zip(&self.values).all(|(field, value)| field == value))
    }
}

impl fmt::Display for FieldFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}..] = ({})", self.start, self.values.join(", "))
    }
}
