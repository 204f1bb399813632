use thiserror::Error;

/// Error type user resolver bodies may fail with.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors reported by resolver registration and the `load` family.
///
/// Session errors abort the whole load immediately: destinations that were
/// already written before the failure must be considered invalid.
#[derive(Debug, Error)]
pub enum LoadError {
    /// A resolver for this (entity, key) pair is already registered.
    #[error("duplicate resolver for `{entity}` keyed by `{key}`")]
    DuplicateResolver {
        entity: &'static str,
        key: &'static str,
    },

    /// No resolver is registered for the requested (entity, key) pair.
    #[error("no resolver for `{entity}` keyed by `{key}`")]
    NoResolver {
        entity: &'static str,
        key: &'static str,
    },

    /// An adapter was invoked with keys of the wrong element type.
    #[error("resolver for `{entity}` invoked with keys that are not `{expected}`")]
    KeyTypeMismatch {
        entity: &'static str,
        expected: &'static str,
    },

    /// A resolver's result map did not cover every requested key.
    #[error(
        "not all items found: resolver for `{entity}` keyed by `{key}` \
         returned {returned} entries for {requested} keys"
    )]
    Incomplete {
        entity: &'static str,
        key: &'static str,
        requested: usize,
        returned: usize,
    },

    /// No value was resolved for a requested key.
    #[error("no data found for `{entity}` key {key}")]
    NotFound { entity: &'static str, key: String },

    /// A scalar destination received more than one value for its key.
    #[error("multiple data found for `{entity}` key {key}: expected one value, got {count}")]
    Ambiguous {
        entity: &'static str,
        key: String,
        count: usize,
    },

    /// Nested loads recursed past the registry's configured depth bound.
    #[error("load exceeded maximum nesting depth of {limit}")]
    DepthExceeded { limit: usize },

    /// A user resolver returned an error.
    #[error("resolver for `{entity}` failed: {source}")]
    Resolver {
        entity: &'static str,
        #[source]
        source: BoxError,
    },
}
