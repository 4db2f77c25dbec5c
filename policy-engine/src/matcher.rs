use crate::{
    effect::Effect,
    models::Tuple,
    role::RoleManager,
    schema::{DEFAULT_POLICY_SECTION, DEFAULT_ROLE_SECTION},
};
use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};

/// Role predicate bound to a [`RoleManager`], the `g(name, role)` of a matcher.
///
/// A name always holds itself; otherwise the membership graph decides.
#[derive(Clone, Copy)]
pub struct RoleResolver<'a> {
    roles: &'a RoleManager,
}

impl<'a> RoleResolver<'a> {
    pub fn new(roles: &'a RoleManager) -> Self {
        Self { roles }
    }

    pub fn has_role(&self, graph: &str, name: &str, role: &str) -> bool {
        name == role || self.roles.is_reachable(graph, name, role)
    }
}

/// Decides whether one candidate rule applies to a request
pub trait Matcher: Send + Sync {
    /// Policy section whose rules are the candidates
    fn section(&self) -> &str;

    fn matches(&self, request: &[String], rule: &Tuple, roles: &RoleResolver<'_>) -> bool;

    /// Effect of a matched rule; `None` leaves the rule out of the decision
    fn effect(&self, _rule: &Tuple) -> Option<Effect> {
        Some(Effect::Allow)
    }
}

/// How one request field is compared against one rule field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMatch {
    pub request: usize,
    pub rule: usize,
    /// Role graph consulted instead of plain equality
    #[serde(default)]
    pub role_graph: Option<String>,
}

impl FieldMatch {
    pub fn equal(request: usize, rule: usize) -> Self {
        Self {
            request,
            rule,
            role_graph: None,
        }
    }

    pub fn via_role(request: usize, rule: usize, graph: &str) -> Self {
        Self {
            request,
            rule,
            role_graph: Some(graph.to_string()),
        }
    }

    fn matches(&self, request: &[String], rule: &Tuple, roles: &RoleResolver<'_>) -> bool {
        let (Some(wanted), Some(granted)) = (request.get(self.request), rule.field(self.rule)) else {
            return false;
        };
        match &self.role_graph {
            Some(graph) => roles.has_role(graph, wanted, granted),
            None => wanted == granted,
        }
    }
}

/// Positional matcher covering ACL and RBAC layouts.
///
/// Every configured [`FieldMatch`] must hold. Rule values carry no wildcard
/// meaning. When `effect_field` is set the rule's effect is read from that
/// field, otherwise every matched rule allows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RbacMatcher {
    section: String,
    fields: SmallVec<[FieldMatch; 4]>,
    effect_field: Option<usize>,
}

impl Default for RbacMatcher {
    fn default() -> Self {
        Self::rbac()
    }
}

impl RbacMatcher {
    /// `g(r.sub, p.sub) && r.obj == p.obj && r.act == p.act`
    pub fn rbac() -> Self {
        Self {
            section: DEFAULT_POLICY_SECTION.to_string(),
            fields: smallvec![
                FieldMatch::via_role(0, 0, DEFAULT_ROLE_SECTION),
                FieldMatch::equal(1, 1),
                FieldMatch::equal(2, 2),
            ],
            effect_field: None,
        }
    }

    /// `r.sub == p.sub && r.obj == p.obj && r.act == p.act`
    pub fn acl() -> Self {
        Self {
            section: DEFAULT_POLICY_SECTION.to_string(),
            fields: smallvec![
                FieldMatch::equal(0, 0),
                FieldMatch::equal(1, 1),
                FieldMatch::equal(2, 2),
            ],
            effect_field: None,
        }
    }

    pub fn with_fields<I>(section: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = FieldMatch>,
    {
        Self {
            section: section.to_string(),
            fields: fields.into_iter().collect(),
            effect_field: None,
        }
    }

    pub fn with_section(mut self, section: &str) -> Self {
        self.section = section.to_string();
        self
    }

    pub fn with_effect_field(mut self, field: usize) -> Self {
        self.effect_field = Some(field);
        self
    }

    /// Replace the comparison for rule field `rule` with a role lookup in `graph`
    pub fn with_role_field(mut self, rule: usize, graph: &str) -> Self {
        for field in self.fields.iter_mut().filter(|f| f.rule == rule) {
            field.role_graph = Some(graph.to_string());
        }
        self
    }

    pub fn fields(&self) -> &[FieldMatch] {
        &self.fields
    }
}

impl Matcher for RbacMatcher {
    fn section(&self) -> &str {
        &self.section
    }

    fn matches(&self, request: &[String], rule: &Tuple, roles: &RoleResolver<'_>) -> bool {
        self.fields.iter().all(|field| field.matches(request, rule, roles))
    }

    fn effect(&self, rule: &Tuple) -> Option<Effect> {
        match self.effect_field {
            Some(index) => rule.field(index).and_then(Effect::from_token),
            None => Some(Effect::Allow),
        }
    }
}

/// Matcher backed by a closure, for layouts the positional matcher cannot express
pub struct FnMatcher<F> {
    section: String,
    predicate: F,
}

impl<F> FnMatcher<F>
where
    F: Fn(&[String], &Tuple, &RoleResolver<'_>) -> bool + Send + Sync,
{
    pub fn new(section: &str, predicate: F) -> Self {
        Self {
            section: section.to_string(),
            predicate,
        }
    }
}

impl<F> Matcher for FnMatcher<F>
where
    F: Fn(&[String], &Tuple, &RoleResolver<'_>) -> bool + Send + Sync,
{
    fn section(&self) -> &str {
        &self.section
    }

    fn matches(&self, request: &[String], rule: &Tuple, roles: &RoleResolver<'_>) -> bool {
        (self.predicate)(request, rule, roles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|f| f.to_string()).collect()
    }

    #[test]
    fn test_rbac_matcher_uses_roles() {
        let roles = RoleManager::new();
        roles.add_link("g", "alice", "data2_admin");
        let resolver = RoleResolver::new(&roles);
        let matcher = RbacMatcher::rbac();
        let rule = Tuple::from(["data2_admin", "data2", "read"]);

        assert!(matcher.matches(&request(&["alice", "data2", "read"]), &rule, &resolver));
        assert!(matcher.matches(&request(&["data2_admin", "data2", "read"]), &rule, &resolver));
        assert!(!matcher.matches(&request(&["bob", "data2", "read"]), &rule, &resolver));
        assert!(!matcher.matches(&request(&["alice", "data2"]), &rule, &resolver));
    }

    #[test]
    fn test_acl_matcher_ignores_roles() {
        let roles = RoleManager::new();
        roles.add_link("g", "alice", "data2_admin");
        let resolver = RoleResolver::new(&roles);
        let rule = Tuple::from(["data2_admin", "data2", "read"]);

        assert!(!RbacMatcher::acl().matches(&request(&["alice", "data2", "read"]), &rule, &resolver));
    }

    #[test]
    fn test_effect_field() {
        let matcher = RbacMatcher::rbac().with_effect_field(3);
        assert_eq!(matcher.effect(&Tuple::from(["a", "b", "c", "deny"])), Some(Effect::Deny));
        assert_eq!(matcher.effect(&Tuple::from(["a", "b", "c", "other"])), None);
        assert_eq!(RbacMatcher::rbac().effect(&Tuple::from(["a", "b", "c"])), Some(Effect::Allow));
    }

    #[test]
    fn test_fn_matcher() {
        let roles = RoleManager::new();
        let resolver = RoleResolver::new(&roles);
        let matcher = FnMatcher::new("p", |req, rule, _roles| {
            rule.field(1).is_some_and(|prefix| req.get(1).is_some_and(|obj| obj.starts_with(prefix)))
        });

        let rule = Tuple::from(["alice", "/data/", "read"]);
        assert!(matcher.matches(&request(&["alice", "/data/1", "read"]), &rule, &resolver));
        assert!(!matcher.matches(&request(&["alice", "/other", "read"]), &rule, &resolver));
        assert_eq!(matcher.section(), "p");
    }
}
