//! Role-based convenience layer over the management API.
//!
//! Everything here works against the enforcer's policy section and its first
//! role section. Subjects sit in field 0 of both.

use crate::{enforcer::Enforcer, error::Result, models::Tuple};
use itertools::Itertools;

impl Enforcer {
    /// Roles `name` holds directly
    pub fn get_roles_for_user(&self, name: &str) -> Vec<String> {
        self.role_manager().get_roles(self.role_section(), name)
    }

    /// Names that hold `role` directly
    pub fn get_users_for_role(&self, role: &str) -> Vec<String> {
        self.role_manager().get_users(self.role_section(), role)
    }

    pub fn has_role_for_user(&self, name: &str, role: &str) -> bool {
        self.role_manager().has_link(self.role_section(), name, role)
    }

    pub fn add_role_for_user(&self, name: &str, role: &str) -> Result<bool> {
        self.add_grouping_policy([name, role])
    }

    pub fn add_roles_for_user(&self, name: &str, roles: &[&str]) -> Result<bool> {
        self.add_grouping_policies(roles.iter().map(|role| [name, *role]))
    }

    pub fn delete_role_for_user(&self, name: &str, role: &str) -> Result<bool> {
        self.remove_grouping_policy([name, role])
    }

    /// Drop every role `name` holds directly
    pub fn delete_roles_for_user(&self, name: &str) -> Result<bool> {
        self.remove_filtered_grouping_policy(0, [name])
    }

    /// Remove `name` as a member and as a policy subject
    pub fn delete_user(&self, name: &str) -> Result<bool> {
        let memberships = self.remove_filtered_grouping_policy(0, [name])?;
        let rules = self.remove_filtered_policy(0, [name])?;
        Ok(memberships || rules)
    }

    /// Remove every membership in `role` and every rule granted to it
    pub fn delete_role(&self, role: &str) -> Result<bool> {
        let memberships = self.remove_filtered_grouping_policy(1, [role])?;
        let rules = self.remove_filtered_policy(0, [role])?;
        Ok(memberships || rules)
    }

    /// Remove every rule granting `permission`, whoever holds it
    pub fn delete_permission(&self, permission: &[&str]) -> Result<bool> {
        self.remove_filtered_policy(1, permission.iter().copied())
    }

    pub fn add_permission_for_user(&self, name: &str, permission: &[&str]) -> Result<bool> {
        self.add_policy(subject_rule(name, permission))
    }

    pub fn delete_permission_for_user(&self, name: &str, permission: &[&str]) -> Result<bool> {
        self.remove_policy(subject_rule(name, permission))
    }

    pub fn delete_permissions_for_user(&self, name: &str) -> Result<bool> {
        self.remove_filtered_policy(0, [name])
    }

    /// Rules whose subject is exactly `name`
    pub fn get_permissions_for_user(&self, name: &str) -> Vec<Tuple> {
        self.get_filtered_policy(0, [name])
    }

    pub fn has_permission_for_user(&self, name: &str, permission: &[&str]) -> bool {
        self.has_policy(subject_rule(name, permission))
    }

    /// Every role `name` reaches through the role graph, nearest first
    pub fn get_implicit_roles_for_user(&self, name: &str) -> Vec<String> {
        self.role_manager().get_reachable(self.role_section(), name)
    }

    /// Rules granted to `name` directly or through any reachable role
    pub fn get_implicit_permissions_for_user(&self, name: &str) -> Vec<Tuple> {
        std::iter::once(name.to_string())
            .chain(self.get_implicit_roles_for_user(name))
            .flat_map(|subject| self.get_permissions_for_user(&subject))
            .unique()
            .collect()
    }

    /// Names that reach `role`, directly or through intermediate roles
    pub fn get_implicit_users_for_role(&self, role: &str) -> Vec<String> {
        let graph = self.role_section();
        let roles = self.role_manager();
        let links = roles.get_all_links(graph);
        links
            .iter()
            .filter_map(|link| link.field(0))
            .unique()
            .filter(|name| *name != role && roles.is_reachable(graph, name, role))
            .map(str::to_string)
            .collect()
    }
}

fn subject_rule(name: &str, permission: &[&str]) -> Tuple {
    Tuple::new(std::iter::once(name).chain(permission.iter().copied()))
}
