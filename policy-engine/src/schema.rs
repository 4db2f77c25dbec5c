use crate::error::{PolicyError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Name of the conventional rule section
pub const DEFAULT_POLICY_SECTION: &str = "p";
/// Name of the conventional role-assignment section
pub const DEFAULT_ROLE_SECTION: &str = "g";

/// What a section stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    /// Authorization rules consulted by the matcher
    Policy,
    /// `(member, role)` edges mirrored into a role graph of the same name
    Role,
}

/// Declaration of one named section and its fixed arity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionDef {
    pub name: String,
    pub kind: SectionKind,
    pub arity: usize,
}

/// Resolved model: section names, kinds and arities, fixed for the lifetime
/// of the store that was built from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schema {
    sections: Vec<SectionDef>,
    request_arity: usize,
}

impl Default for Schema {
    fn default() -> Self {
        Self::rbac()
    }
}

impl Schema {
    pub fn builder() -> SchemaDefinition {
        SchemaDefinition::default()
    }

    /// Classic RBAC layout: `p = sub, obj, act` and `g = _, _`
    pub fn rbac() -> Self {
        Self {
            sections: vec![
                SectionDef {
                    name: DEFAULT_POLICY_SECTION.to_string(),
                    kind: SectionKind::Policy,
                    arity: 3,
                },
                SectionDef {
                    name: DEFAULT_ROLE_SECTION.to_string(),
                    kind: SectionKind::Role,
                    arity: 2,
                },
            ],
            request_arity: 3,
        }
    }

    pub fn section(&self, name: &str) -> Option<&SectionDef> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Sections in declaration order
    pub fn sections(&self) -> impl Iterator<Item = &SectionDef> {
        self.sections.iter()
    }

    pub fn policy_sections(&self) -> impl Iterator<Item = &SectionDef> {
        self.sections.iter().filter(|s| s.kind == SectionKind::Policy)
    }

    pub fn role_sections(&self) -> impl Iterator<Item = &SectionDef> {
        self.sections.iter().filter(|s| s.kind == SectionKind::Role)
    }

    pub fn is_role_section(&self, name: &str) -> bool {
        self.section(name).is_some_and(|s| s.kind == SectionKind::Role)
    }

    pub fn request_arity(&self) -> usize {
        self.request_arity
    }

    /// Arity of a declared section
    pub fn arity(&self, name: &str) -> Result<usize> {
        self.section(name)
            .map(|s| s.arity)
            .ok_or_else(|| PolicyError::UnknownSection(name.to_string()))
    }
}

/// Unvalidated schema declaration, as written in configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    #[serde(default)]
    pub sections: Vec<SectionDef>,
    #[serde(default)]
    pub request_arity: Option<usize>,
}

impl SchemaDefinition {
    pub fn policy_section(mut self, name: &str, arity: usize) -> Self {
        self.sections.push(SectionDef {
            name: name.to_string(),
            kind: SectionKind::Policy,
            arity,
        });
        self
    }

    pub fn role_section(mut self, name: &str) -> Self {
        self.sections.push(SectionDef {
            name: name.to_string(),
            kind: SectionKind::Role,
            arity: 2,
        });
        self
    }

    pub fn request_arity(mut self, arity: usize) -> Self {
        self.request_arity = Some(arity);
        self
    }

    /// Validate the declaration and freeze it into a [`Schema`]
    pub fn build(self) -> Result<Schema> {
        let mut seen = HashSet::new();
        for section in &self.sections {
            if section.name.trim().is_empty() {
                return Err(PolicyError::InvalidSchema(
                    "Section names must not be empty".to_string(),
                ));
            }
            if !seen.insert(section.name.as_str()) {
                return Err(PolicyError::InvalidSchema(format!(
                    "Section '{}' declared more than once",
                    section.name
                )));
            }
            if section.arity == 0 {
                return Err(PolicyError::InvalidSchema(format!(
                    "Section '{}' must have at least one field",
                    section.name
                )));
            }
            if section.kind == SectionKind::Role && section.arity != 2 {
                return Err(PolicyError::InvalidSchema(format!(
                    "Role section '{}' must have exactly 2 fields, got {}",
                    section.name, section.arity
                )));
            }
        }

        let first_policy = self
            .sections
            .iter()
            .find(|s| s.kind == SectionKind::Policy)
            .ok_or_else(|| {
                PolicyError::InvalidSchema("At least one policy section is required".to_string())
            })?;

        let request_arity = self.request_arity.unwrap_or(first_policy.arity);
        if request_arity == 0 {
            return Err(PolicyError::InvalidSchema(
                "Request arity must be at least 1".to_string(),
            ));
        }

        Ok(Schema {
            sections: self.sections,
            request_arity,
        })
    }
}
