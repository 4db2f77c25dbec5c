//! Line-oriented policy text: `section, field, field, ...` per line.
//!
//! Blank lines and lines starting with `#` are skipped. Fields are trimmed;
//! quoting is not supported, so field values cannot contain commas.

use super::{Adapter, PolicyRow};
use crate::{
    error::{PolicyError, Result},
    models::Tuple,
};

/// Parse policy text into rows, in line order
pub fn parse_policy_text(text: &str) -> Result<Vec<PolicyRow>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(number, line)| parse_line(number + 1, line))
        .collect()
}

fn parse_line(number: usize, line: &str) -> Result<PolicyRow> {
    let mut tokens = line.split(',').map(str::trim);
    let section = tokens.next().unwrap_or_default();
    let fields: Vec<&str> = tokens.collect();

    if section.is_empty() {
        return Err(PolicyError::InvalidPolicyLine(format!(
            "line {number}: missing section name"
        )));
    }
    if fields.is_empty() {
        return Err(PolicyError::InvalidPolicyLine(format!(
            "line {number}: section '{section}' has no fields"
        )));
    }

    Ok((section.to_string(), Tuple::new(fields)))
}

/// Render rows back into policy text, one line per row.
///
/// Fails with `InvalidPolicyLine` if a value would not read back unchanged:
/// one holding a comma or line break, or with surrounding whitespace.
pub fn format_policy_text(rows: &[PolicyRow]) -> Result<String> {
    let mut text = String::new();
    for (number, (section, tuple)) in rows.iter().enumerate() {
        if section.starts_with('#') || !is_plain(section) || section.is_empty() {
            return Err(PolicyError::InvalidPolicyLine(format!(
                "row {}: section name '{section}' cannot be written as text",
                number + 1
            )));
        }
        if let Some(field) = tuple.fields().iter().find(|field| !is_plain(field)) {
            return Err(PolicyError::InvalidPolicyLine(format!(
                "row {}: value {field:?} cannot be written as text",
                number + 1
            )));
        }
        text.push_str(&format!("{section}, {tuple}\n"));
    }
    Ok(text)
}

fn is_plain(value: &str) -> bool {
    value.trim() == value && !value.contains([',', '\n', '\r'])
}

/// Read-only adapter over policy text held in memory
pub struct TextAdapter {
    text: String,
}

impl TextAdapter {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl Adapter for TextAdapter {
    fn load_policy(&self) -> Result<Vec<PolicyRow>> {
        parse_policy_text(&self.text)
    }

    fn save_policy(&self, _rows: &[PolicyRow]) -> Result<()> {
        Err(PolicyError::NotSupported("save_policy"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: &str = "
# rules
p, alice, data1, read
p,bob , data2,write

g, alice, data2_admin
";

    #[test]
    fn test_parse_policy_text() {
        let rows = parse_policy_text(POLICY).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1], ("p".to_string(), Tuple::from(["bob", "data2", "write"])));
        assert_eq!(rows[2].0, "g");
    }

    #[test]
    fn test_parse_rejects_malformed_lines() {
        assert!(matches!(
            parse_policy_text("p, a\n, b, c"),
            Err(PolicyError::InvalidPolicyLine(msg)) if msg.starts_with("line 2")
        ));
        assert!(parse_policy_text("p").is_err());
    }

    #[test]
    fn test_format_round_trips() {
        let rows = parse_policy_text(POLICY).unwrap();
        let text = format_policy_text(&rows).unwrap();
        assert!(text.starts_with("p, alice, data1, read\n"));
        assert_eq!(parse_policy_text(&text).unwrap(), rows);
    }

    #[test]
    fn test_format_rejects_values_that_would_not_read_back() {
        for value in ["a,b", "a\nb", " padded", "line\r"] {
            let rows = vec![("p".to_string(), Tuple::from([value, "data1", "read"]))];
            assert!(
                matches!(format_policy_text(&rows), Err(PolicyError::InvalidPolicyLine(_))),
                "{value:?} should be rejected"
            );
        }

        let rows = vec![("#p".to_string(), Tuple::from(["alice", "data1", "read"]))];
        assert!(format_policy_text(&rows).is_err());
    }

    #[test]
    fn test_text_adapter_is_read_only() {
        let adapter = TextAdapter::new(POLICY);
        assert_eq!(adapter.load_policy().unwrap().len(), 3);
        assert!(matches!(
            adapter.save_policy(&[]),
            Err(PolicyError::NotSupported(_))
        ));
    }
}
