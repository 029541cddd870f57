//! Relation metadata and include resolution.
//!
//! - [`RelationSpec`] describes how two models join.
//! - [`resolve_includes`] turns an `include` document into a flat map of
//!   dotted relation paths to [`IncludeOption`]s.
//!
//! ## Example
//!
//! ```rust
//! use quarry_query::relations::resolve_includes;
//! use serde_json::json;
//!
//! let includes = resolve_includes(&json!({
//!     "posts": {"where": {"published": true}, "take": 5},
//!     "profile": true
//! }))
//! .unwrap();
//!
//! assert_eq!(includes["posts"].pagination.take, Some(5));
//! assert!(includes.contains_key("profile"));
//! ```

mod include;
mod spec;

pub use include::{
    IncludeMap, IncludeOption, Selection, merge_includes, parse_selection, resolve_include, resolve_includes,
};
pub use spec::{RelationSpec, RelationType};
