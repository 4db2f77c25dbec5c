use crate::{
    adapter::Adapter,
    config::EngineConfig,
    effect::{Effector, EffectPolicy},
    error::{PolicyError, Result},
    matcher::{Matcher, RbacMatcher, RoleResolver},
    models::{FieldFilter, Tuple},
    role::{RoleManager, DEFAULT_MAX_DEPTH},
    schema::{Schema, SectionKind, DEFAULT_ROLE_SECTION},
    store::PolicyStore,
};
use dashmap::{mapref::entry::Entry, DashMap};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Composition point for authorization decisions and policy management.
///
/// Owns one [`PolicyStore`] and one [`RoleManager`]; each guards itself with
/// its own reader-writer lock, so an `Enforcer` can be shared behind an `Arc`
/// and queried from many threads. Management calls are serialized by one
/// write lock held across the store change, the role-graph mirror, cache
/// invalidation and auto-save, so the store and role graphs never disagree
/// once a call returns. Mutations of role sections are mirrored into the role
/// graph of the same name.
pub struct Enforcer {
    schema: Arc<Schema>,
    store: PolicyStore,
    roles: RoleManager,
    matcher: Box<dyn Matcher>,
    effector: Box<dyn Effector>,
    adapter: Option<Box<dyn Adapter>>,
    cache: Option<DashMap<Vec<String>, bool>>,
    /// Bumped by every invalidation; decisions computed across a bump are not cached
    generation: AtomicU64,
    writes: Mutex<()>,
    enabled: bool,
    auto_save: bool,
    auto_build_role_links: bool,
}

/// Builder for [`Enforcer`]; validation and the initial load happen in [`build`](Self::build)
pub struct EnforcerBuilder {
    schema: Schema,
    matcher: Box<dyn Matcher>,
    effector: Box<dyn Effector>,
    adapter: Option<Box<dyn Adapter>>,
    max_role_depth: usize,
    enable_cache: bool,
    enabled: bool,
    auto_save: bool,
    auto_build_role_links: bool,
}

impl Default for EnforcerBuilder {
    fn default() -> Self {
        Self {
            schema: Schema::rbac(),
            matcher: Box::new(RbacMatcher::rbac()),
            effector: Box::new(EffectPolicy::AllowOverride),
            adapter: None,
            max_role_depth: DEFAULT_MAX_DEPTH,
            enable_cache: false,
            enabled: true,
            auto_save: true,
            auto_build_role_links: true,
        }
    }
}

impl EnforcerBuilder {
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    pub fn matcher(mut self, matcher: impl Matcher + 'static) -> Self {
        self.matcher = Box::new(matcher);
        self
    }

    pub fn effector(mut self, effector: impl Effector + 'static) -> Self {
        self.effector = Box::new(effector);
        self
    }

    pub fn adapter(mut self, adapter: impl Adapter + 'static) -> Self {
        self.adapter = Some(Box::new(adapter));
        self
    }

    pub fn max_role_depth(mut self, depth: usize) -> Self {
        self.max_role_depth = depth;
        self
    }

    pub fn with_cache(mut self) -> Self {
        self.enable_cache = true;
        self
    }

    /// Apply every setting carried by an [`EngineConfig`], including its schema
    pub fn config(mut self, config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        self.schema = config.schema()?;
        self.effector = Box::new(config.effect);
        self.max_role_depth = config.max_role_depth;
        self.enable_cache = config.enable_cache;
        self.enabled = config.enabled;
        self.auto_save = config.auto_save;
        self.auto_build_role_links = config.auto_build_role_links;
        Ok(self)
    }

    /// Validate the wiring and, if an adapter is set, load its policy.
    ///
    /// # Errors
    /// - `UnknownSection` if the matcher reads a section the schema lacks
    /// - `InvalidSchema` if that section is not a policy section
    /// - any load error from the adapter or from row validation
    pub fn build(self) -> Result<Enforcer> {
        let section = self.matcher.section();
        match self.schema.section(section) {
            Some(def) if def.kind == SectionKind::Policy => {}
            Some(_) => {
                return Err(PolicyError::InvalidSchema(format!(
                    "Matcher section '{section}' is not a policy section"
                )))
            }
            None => return Err(PolicyError::UnknownSection(section.to_string())),
        }

        let schema = Arc::new(self.schema);
        let enforcer = Enforcer {
            store: PolicyStore::new(schema.clone()),
            roles: RoleManager::with_max_depth(self.max_role_depth),
            schema,
            matcher: self.matcher,
            effector: self.effector,
            adapter: self.adapter,
            cache: self.enable_cache.then(DashMap::new),
            generation: AtomicU64::new(0),
            writes: Mutex::new(()),
            enabled: self.enabled,
            auto_save: self.auto_save,
            auto_build_role_links: self.auto_build_role_links,
        };

        if enforcer.adapter.is_some() {
            enforcer.load_policy()?;
        }
        Ok(enforcer)
    }
}

impl Enforcer {
    pub fn builder() -> EnforcerBuilder {
        EnforcerBuilder::default()
    }

    /// RBAC enforcer over an empty store
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// RBAC enforcer loaded from `adapter`
    pub fn with_adapter(adapter: impl Adapter + 'static) -> Result<Self> {
        Self::builder().adapter(adapter).build()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Direct access to the store. Role sections changed here are not
    /// mirrored into the role graphs until [`build_role_links`](Self::build_role_links).
    pub fn store(&self) -> &PolicyStore {
        &self.store
    }

    pub fn role_manager(&self) -> &RoleManager {
        &self.roles
    }

    pub fn enable_enforce(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn enable_auto_save(&mut self, auto_save: bool) {
        self.auto_save = auto_save;
    }

    pub fn enable_auto_build_role_links(&mut self, auto_build: bool) {
        self.auto_build_role_links = auto_build;
    }

    pub fn set_adapter(&mut self, adapter: impl Adapter + 'static) {
        self.adapter = Some(Box::new(adapter));
    }

    /// Section holding the candidate rules
    pub fn policy_section(&self) -> &str {
        self.matcher.section()
    }

    /// First declared role section, `g` when the schema declares none
    pub fn role_section(&self) -> &str {
        self.schema
            .role_sections()
            .next()
            .map_or(DEFAULT_ROLE_SECTION, |def| def.name.as_str())
    }

    // =============================================================================
    // Decisions
    // =============================================================================

    /// Decide whether `request` is allowed.
    ///
    /// # Errors
    /// `InvalidRequest` when the request length differs from the schema's request arity.
    pub fn enforce<S: AsRef<str>>(&self, request: &[S]) -> Result<bool> {
        if !self.enabled {
            return Ok(true);
        }
        let request = self.request(request)?;
        let Some(cache) = &self.cache else {
            return Ok(self.evaluate(&request).0);
        };

        if let Some(allowed) = cache.get(request.as_slice()) {
            debug!(request = ?request, "Cache hit for enforce");
            return Ok(*allowed);
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let (allowed, _) = self.evaluate(&request);

        // The entry holds its shard lock, so a concurrent clear either sees
        // this insert or has already bumped the generation.
        match cache.entry(request) {
            Entry::Vacant(slot) if self.generation.load(Ordering::SeqCst) == generation => {
                slot.insert(allowed);
            }
            _ => {}
        }
        Ok(allowed)
    }

    /// Like [`enforce`](Self::enforce), also returning the rule that settled
    /// the decision. Bypasses the cache.
    pub fn enforce_with_explain<S: AsRef<str>>(&self, request: &[S]) -> Result<(bool, Option<Tuple>)> {
        if !self.enabled {
            return Ok((true, None));
        }
        let request = self.request(request)?;
        Ok(self.evaluate(&request))
    }

    /// Evaluate many requests, stopping at the first malformed one
    pub fn batch_enforce<S: AsRef<str>>(&self, requests: &[Vec<S>]) -> Result<Vec<bool>> {
        requests.iter().map(|request| self.enforce(request)).collect()
    }

    fn request<S: AsRef<str>>(&self, request: &[S]) -> Result<Vec<String>> {
        let expected = self.schema.request_arity();
        if request.len() != expected {
            return Err(PolicyError::InvalidRequest(format!(
                "expected {expected} fields, got {}",
                request.len()
            )));
        }
        Ok(request.iter().map(|field| field.as_ref().to_string()).collect())
    }

    fn evaluate(&self, request: &[String]) -> (bool, Option<Tuple>) {
        let resolver = RoleResolver::new(&self.roles);
        let matcher = self.matcher.as_ref();

        self.store
            .with_section(matcher.section(), |rules| {
                let mut matched = rules
                    .iter()
                    .enumerate()
                    .filter(|(_, rule)| matcher.matches(request, rule, &resolver))
                    .filter_map(|(index, rule)| matcher.effect(rule).map(|effect| (index, effect)));
                let decision = self.effector.decide(&mut matched);
                let rule = decision
                    .rule_index
                    .and_then(|index| rules.rows().get(index).cloned());
                (decision.allowed, rule)
            })
            .unwrap_or((false, None))
    }

    fn invalidate_cache(&self) {
        if let Some(cache) = &self.cache {
            self.generation.fetch_add(1, Ordering::SeqCst);
            cache.clear();
        }
    }

    // =============================================================================
    // Persistence
    // =============================================================================

    /// Replace all in-memory state with the adapter's rows.
    ///
    /// Rows are validated before anything is replaced; on error the previous
    /// policy stays in place.
    pub fn load_policy(&self) -> Result<()> {
        let adapter = self.adapter.as_deref().ok_or(PolicyError::NoAdapter)?;
        let rows = adapter.load_policy()?;

        let _writes = self.writes.lock();
        self.store.load(rows)?;
        self.rebuild_role_links();
        self.invalidate_cache();
        Ok(())
    }

    /// Write every in-memory row through the adapter
    pub fn save_policy(&self) -> Result<()> {
        let adapter = self.adapter.as_deref().ok_or(PolicyError::NoAdapter)?;
        let rows = self.store.snapshot();
        adapter.save_policy(&rows)?;
        info!(rows = rows.len(), "Saved policy");
        Ok(())
    }

    /// Drop all rules and role links from memory; the adapter is not touched
    pub fn clear_policy(&self) {
        let _writes = self.writes.lock();
        self.store.clear();
        self.roles.clear();
        self.invalidate_cache();
    }

    /// Rebuild every role graph from its role section
    pub fn build_role_links(&self) {
        let _writes = self.writes.lock();
        self.rebuild_role_links();
        self.invalidate_cache();
    }

    fn rebuild_role_links(&self) {
        for def in self.schema.role_sections() {
            let links = self.store.get_all(&def.name);
            self.roles.rebuild(&def.name, &links);
        }
    }

    fn persist(&self, op: impl FnOnce(&dyn Adapter) -> Result<()>) -> Result<()> {
        if !self.auto_save {
            return Ok(());
        }
        let Some(adapter) = self.adapter.as_deref() else {
            return Ok(());
        };
        match op(adapter) {
            Ok(()) | Err(PolicyError::NotSupported(_)) => Ok(()),
            Err(err) => {
                warn!(error = %err, "Auto-save failed; in-memory policy kept");
                Err(err)
            }
        }
    }

    fn mirrors_roles(&self, section: &str) -> bool {
        self.auto_build_role_links && self.schema.is_role_section(section)
    }

    fn link_all(&self, section: &str, tuples: &[Tuple]) {
        if !self.mirrors_roles(section) {
            return;
        }
        for tuple in tuples {
            if let (Some(from), Some(to)) = (tuple.field(0), tuple.field(1)) {
                self.roles.add_link(section, from, to);
            }
        }
    }

    fn unlink_all(&self, section: &str, tuples: &[Tuple]) {
        if !self.mirrors_roles(section) {
            return;
        }
        for tuple in tuples {
            if let (Some(from), Some(to)) = (tuple.field(0), tuple.field(1)) {
                self.roles.remove_link(section, from, to);
            }
        }
    }

    // =============================================================================
    // Section-Generic Mutations
    // =============================================================================

    /// Add one rule to `section`; `Ok(false)` if it was already present
    pub fn add_named_policy(&self, section: &str, rule: impl Into<Tuple>) -> Result<bool> {
        let rule = rule.into();
        let _writes = self.writes.lock();
        if !self.store.add_tuple(section, rule.clone())? {
            return Ok(false);
        }
        info!(section, rule = %rule, "Added policy");
        self.link_all(section, std::slice::from_ref(&rule));
        self.invalidate_cache();
        self.persist(|adapter| adapter.add_policy(section, &rule))?;
        Ok(true)
    }

    /// Add every rule not already present; `Ok(true)` if any was added
    pub fn add_named_policies<I, T>(&self, section: &str, rules: I) -> Result<bool>
    where
        I: IntoIterator<Item = T>,
        T: Into<Tuple>,
    {
        let rules: Vec<Tuple> = rules.into_iter().map(Into::into).collect();
        let _writes = self.writes.lock();
        let added = self
            .store
            .add_tuples(section, rules)?;
        if added.is_empty() {
            return Ok(false);
        }
        info!(section, count = added.len(), "Added policies");
        self.link_all(section, &added);
        self.invalidate_cache();
        self.persist(|adapter| adapter.add_policies(section, &added))?;
        Ok(true)
    }

    /// Remove one rule from `section`; `Ok(false)` if it was absent
    pub fn remove_named_policy(&self, section: &str, rule: impl Into<Tuple>) -> Result<bool> {
        let rule = rule.into();
        let _writes = self.writes.lock();
        if !self.store.remove_tuple(section, &rule)? {
            return Ok(false);
        }
        info!(section, rule = %rule, "Removed policy");
        self.unlink_all(section, std::slice::from_ref(&rule));
        self.invalidate_cache();
        self.persist(|adapter| adapter.remove_policy(section, &rule))?;
        Ok(true)
    }

    /// Remove every listed rule that is present; `Ok(true)` if any was removed
    pub fn remove_named_policies<I, T>(&self, section: &str, rules: I) -> Result<bool>
    where
        I: IntoIterator<Item = T>,
        T: Into<Tuple>,
    {
        let rules: Vec<Tuple> = rules.into_iter().map(Into::into).collect();
        let _writes = self.writes.lock();
        let removed = self.store.remove_tuples(section, &rules)?;
        if removed.is_empty() {
            return Ok(false);
        }
        info!(section, count = removed.len(), "Removed policies");
        self.unlink_all(section, &removed);
        self.invalidate_cache();
        self.persist(|adapter| {
            removed
                .iter()
                .try_for_each(|rule| adapter.remove_policy(section, rule))
        })?;
        Ok(true)
    }

    /// Remove every rule whose fields from `field_index` on equal `values`
    pub fn remove_filtered_named_policy<I, S>(&self, section: &str, field_index: usize, values: I) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let filter = FieldFilter::new(field_index, values);
        let _writes = self.writes.lock();
        let removed = self.store.remove_filtered(section, &filter)?;
        if removed.is_empty() {
            return Ok(false);
        }
        info!(section, filter = %filter, count = removed.len(), "Removed filtered policies");
        self.unlink_all(section, &removed);
        self.invalidate_cache();
        self.persist(|adapter| adapter.remove_filtered_policy(section, &filter))?;
        Ok(true)
    }

    pub fn get_named_policy(&self, section: &str) -> Vec<Tuple> {
        self.store.get_all(section)
    }

    pub fn get_filtered_named_policy<I, S>(&self, section: &str, field_index: usize, values: I) -> Vec<Tuple>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.store
            .get_filtered(section, &FieldFilter::new(field_index, values))
    }

    pub fn has_named_policy(&self, section: &str, rule: impl Into<Tuple>) -> bool {
        self.store.has(section, &rule.into())
    }

    // =============================================================================
    // Policy Management
    // =============================================================================

    pub fn get_policy(&self) -> Vec<Tuple> {
        self.get_named_policy(self.policy_section())
    }

    pub fn get_filtered_policy<I, S>(&self, field_index: usize, values: I) -> Vec<Tuple>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.get_filtered_named_policy(self.policy_section(), field_index, values)
    }

    pub fn has_policy(&self, rule: impl Into<Tuple>) -> bool {
        self.has_named_policy(self.policy_section(), rule)
    }

    pub fn add_policy(&self, rule: impl Into<Tuple>) -> Result<bool> {
        self.add_named_policy(self.policy_section(), rule)
    }

    pub fn add_policies<I, T>(&self, rules: I) -> Result<bool>
    where
        I: IntoIterator<Item = T>,
        T: Into<Tuple>,
    {
        self.add_named_policies(self.policy_section(), rules)
    }

    pub fn remove_policy(&self, rule: impl Into<Tuple>) -> Result<bool> {
        self.remove_named_policy(self.policy_section(), rule)
    }

    pub fn remove_policies<I, T>(&self, rules: I) -> Result<bool>
    where
        I: IntoIterator<Item = T>,
        T: Into<Tuple>,
    {
        self.remove_named_policies(self.policy_section(), rules)
    }

    pub fn remove_filtered_policy<I, S>(&self, field_index: usize, values: I) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.remove_filtered_named_policy(self.policy_section(), field_index, values)
    }

    /// Distinct subjects of the policy section, first occurrence first
    pub fn get_all_subjects(&self) -> Vec<String> {
        self.store.project_field(self.policy_section(), 0)
    }

    pub fn get_all_objects(&self) -> Vec<String> {
        self.store.project_field(self.policy_section(), 1)
    }

    pub fn get_all_actions(&self) -> Vec<String> {
        self.store.project_field(self.policy_section(), 2)
    }

    /// Distinct roles named in the role section, first occurrence first
    pub fn get_all_roles(&self) -> Vec<String> {
        self.store.project_field(self.role_section(), 1)
    }

    // =============================================================================
    // Grouping Management
    // =============================================================================

    pub fn get_grouping_policy(&self) -> Vec<Tuple> {
        self.get_named_policy(self.role_section())
    }

    pub fn get_named_grouping_policy(&self, section: &str) -> Vec<Tuple> {
        self.get_named_policy(section)
    }

    pub fn get_filtered_grouping_policy<I, S>(&self, field_index: usize, values: I) -> Vec<Tuple>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.get_filtered_named_policy(self.role_section(), field_index, values)
    }

    pub fn has_grouping_policy(&self, link: impl Into<Tuple>) -> bool {
        self.has_named_policy(self.role_section(), link)
    }

    pub fn add_grouping_policy(&self, link: impl Into<Tuple>) -> Result<bool> {
        self.add_named_policy(self.role_section(), link)
    }

    pub fn add_named_grouping_policy(&self, section: &str, link: impl Into<Tuple>) -> Result<bool> {
        self.add_named_policy(section, link)
    }

    pub fn add_grouping_policies<I, T>(&self, links: I) -> Result<bool>
    where
        I: IntoIterator<Item = T>,
        T: Into<Tuple>,
    {
        self.add_named_policies(self.role_section(), links)
    }

    pub fn remove_grouping_policy(&self, link: impl Into<Tuple>) -> Result<bool> {
        self.remove_named_policy(self.role_section(), link)
    }

    pub fn remove_named_grouping_policy(&self, section: &str, link: impl Into<Tuple>) -> Result<bool> {
        self.remove_named_policy(section, link)
    }

    pub fn remove_filtered_grouping_policy<I, S>(&self, field_index: usize, values: I) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.remove_filtered_named_policy(self.role_section(), field_index, values)
    }

    pub fn remove_filtered_named_grouping_policy<I, S>(
        &self,
        section: &str,
        field_index: usize,
        values: I,
    ) -> Result<bool>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.remove_filtered_named_policy(section, field_index, values)
    }
}
