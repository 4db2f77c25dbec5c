use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PolicyError;

/// Effect carried by a matched rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    /// Parse a rule's effect token; anything other than `allow`/`deny` is indeterminate
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "allow" => Some(Effect::Allow),
            "deny" => Some(Effect::Deny),
            _ => None,
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Allow => write!(f, "allow"),
            Effect::Deny => write!(f, "deny"),
        }
    }
}

/// Outcome of folding matched rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    /// Index (in candidate order) of the rule that settled the decision, if any
    pub rule_index: Option<usize>,
}

impl Decision {
    fn new(allowed: bool, rule_index: Option<usize>) -> Self {
        Self { allowed, rule_index }
    }
}

/// Combines the effects of matching rules into one decision.
///
/// `matched` yields `(candidate index, effect)` for matching rules in store
/// order and is evaluated lazily, so an effector that stops pulling skips
/// the remaining matcher calls.
pub trait Effector: Send + Sync {
    fn decide(&self, matched: &mut dyn Iterator<Item = (usize, Effect)>) -> Decision;
}

/// Built-in effect combinators
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectPolicy {
    /// Allowed if any matching rule allows
    #[default]
    AllowOverride,
    /// Allowed unless a matching rule denies
    DenyOverride,
    /// Allowed if some rule allows and none denies
    AllowAndDeny,
    /// The first matching rule decides
    Priority,
}

impl Effector for EffectPolicy {
    fn decide(&self, matched: &mut dyn Iterator<Item = (usize, Effect)>) -> Decision {
        match self {
            EffectPolicy::AllowOverride => {
                for (index, effect) in matched {
                    if effect == Effect::Allow {
                        return Decision::new(true, Some(index));
                    }
                }
                Decision::new(false, None)
            }
            EffectPolicy::DenyOverride => {
                for (index, effect) in matched {
                    if effect == Effect::Deny {
                        return Decision::new(false, Some(index));
                    }
                }
                Decision::new(true, None)
            }
            EffectPolicy::AllowAndDeny => {
                let mut first_allow = None;
                for (index, effect) in matched {
                    match effect {
                        Effect::Deny => return Decision::new(false, Some(index)),
                        Effect::Allow => {
                            first_allow.get_or_insert(index);
                        }
                    }
                }
                Decision::new(first_allow.is_some(), first_allow)
            }
            EffectPolicy::Priority => matched
                .next()
                .map_or(Decision::new(false, None), |(i, effect)| {
                    Decision::new(effect == Effect::Allow, Some(i))
                }),
        }
    }
}

impl FromStr for EffectPolicy {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "allow_override" | "allow-override" => Ok(EffectPolicy::AllowOverride),
            "deny_override" | "deny-override" => Ok(EffectPolicy::DenyOverride),
            "allow_and_deny" | "allow-and-deny" => Ok(EffectPolicy::AllowAndDeny),
            "priority" => Ok(EffectPolicy::Priority),
            _ => Err(PolicyError::Config(format!(
                "Unknown effect policy: {s}. Valid options: allow_override, deny_override, allow_and_deny, priority"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decide(policy: EffectPolicy, effects: &[Effect]) -> Decision {
        let mut matched = effects.iter().copied().enumerate();
        policy.decide(&mut matched)
    }

    #[test]
    fn test_allow_override() {
        use Effect::*;
        assert_eq!(decide(EffectPolicy::AllowOverride, &[Deny, Allow]), Decision::new(true, Some(1)));
        assert!(!decide(EffectPolicy::AllowOverride, &[Deny]).allowed);
        assert!(!decide(EffectPolicy::AllowOverride, &[]).allowed);
    }

    #[test]
    fn test_deny_override() {
        use Effect::*;
        assert!(decide(EffectPolicy::DenyOverride, &[]).allowed);
        assert_eq!(decide(EffectPolicy::DenyOverride, &[Allow, Deny]), Decision::new(false, Some(1)));
    }

    #[test]
    fn test_allow_and_deny() {
        use Effect::*;
        assert_eq!(decide(EffectPolicy::AllowAndDeny, &[Allow, Allow]), Decision::new(true, Some(0)));
        assert!(!decide(EffectPolicy::AllowAndDeny, &[Allow, Deny]).allowed);
        assert!(!decide(EffectPolicy::AllowAndDeny, &[]).allowed);
    }

    #[test]
    fn test_priority_takes_first_match() {
        use Effect::*;
        assert_eq!(decide(EffectPolicy::Priority, &[Deny, Allow]), Decision::new(false, Some(0)));
        assert_eq!(decide(EffectPolicy::Priority, &[Allow, Deny]), Decision::new(true, Some(0)));
    }

    #[test]
    fn test_parse_effect_policy() {
        assert_eq!("deny-override".parse::<EffectPolicy>().unwrap(), EffectPolicy::DenyOverride);
        assert!("first_wins".parse::<EffectPolicy>().is_err());
        assert_eq!(Effect::from_token("deny"), Some(Effect::Deny));
        assert_eq!(Effect::from_token("maybe"), None);
    }
}
