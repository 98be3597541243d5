//! Vocabulary constants used when reading signifiers and context shapes.

/// hMAS interaction vocabulary.
pub mod interaction {
    /// Generic marker type carried by every ability; never a capability on its own.
    pub const ABILITY: &str = "https://purl.org/hmas/interaction#Ability";
}

/// SHACL terms read from recommended context shapes.
pub mod shacl {
    pub const NODE_SHAPE: &str = "http://www.w3.org/ns/shacl#NodeShape";
    pub const PATH: &str = "http://www.w3.org/ns/shacl#path";
    pub const HAS_VALUE: &str = "http://www.w3.org/ns/shacl#hasValue";
    pub const TARGET_NODE: &str = "http://www.w3.org/ns/shacl#targetNode";
}

pub mod rdf {
    pub const TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
}

/// Path whose `sh:hasValue` objects are surfaced as belief contents.
pub const HAS_BELIEF: &str = "http://example.org/hasBelief";

/// Observable property names.
pub mod property {
    /// Distinguished property inspected by the event filter.
    pub const SIGNIFIER: &str = "signifier";
    pub const EXPOSURE_STATE: &str = "exposureState";
    pub const WEBSUB: &str = "websub";
}

/// Content types that select how a pushed payload is interpreted.
pub mod content_type {
    pub const TURTLE: &str = "text/turtle";
    pub const JSON: &str = "application/json";
}
