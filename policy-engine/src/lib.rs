//! Policy store and role manager for RustCare Engine
//!
//! This crate holds the in-memory state behind attribute- and role-based
//! authorization decisions:
//! - Named policy sections of fixed-arity string tuples
//! - Per-graph role membership with bounded transitive resolution
//! - Filtered queries and deletes over contiguous field windows
//! - A pluggable matcher/effector pipeline for allow/deny decisions
//! - Adapters for loading and persisting policy rows
//!
//! # Core Concepts
//!
//! - **Section**: a named collection of tuples, e.g. `p` for rules or `g` for memberships
//! - **Tuple**: an ordered list of fields, e.g. `alice, data1, read`
//! - **Role graph**: directed "member of" links built from a role section
//! - **Field filter**: equality on consecutive fields starting at an index
//!
//! # Example
//!
//! ```rust
//! use policy_engine::Enforcer;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let enforcer = Enforcer::new()?;
//!
//!     enforcer.add_policy(["data2_admin", "data2", "read"])?;
//!     enforcer.add_grouping_policy(["alice", "data2_admin"])?;
//!
//!     assert!(enforcer.enforce(&["alice", "data2", "read"])?);
//!     assert!(!enforcer.enforce(&["alice", "data2", "write"])?);
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod config;
pub mod effect;
pub mod enforcer;
pub mod error;
pub mod logging;
pub mod matcher;
pub mod models;
pub mod rbac_api;
pub mod role;
pub mod schema;
pub mod section;
pub mod store;

pub use adapter::{Adapter, MemoryAdapter, PolicyRow, TextAdapter};
pub use config::EngineConfig;
pub use effect::{Decision, Effect, EffectPolicy, Effector};
pub use enforcer::{Enforcer, EnforcerBuilder};
pub use error::{PolicyError, Result};
pub use logging::{init_tracing, LoggingConfig};
pub use matcher::{FieldMatch, FnMatcher, Matcher, RbacMatcher, RoleResolver};
pub use models::{FieldFilter, Tuple};
pub use role::{RoleGraph, RoleManager};
pub use schema::{Schema, SchemaDefinition, SectionDef, SectionKind};
pub use section::PolicySection;
pub use store::PolicyStore;
