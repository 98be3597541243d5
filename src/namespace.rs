//! Namespace registry.
//!
//! Maps compact prefixes to absolute namespace IRIs so agents can write
//! `saref:ToggleCommand` instead of `https://saref.etsi.org/core/ToggleCommand`.
//!
//! Bindings are kept in registration order. Compaction returns the first
//! namespace that is a literal string prefix of the target, which is the
//! only ordering guarantee when namespaces overlap.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

static ABSOLUTE_IRI: OnceLock<Regex> = OnceLock::new();

fn absolute_iri() -> &'static Regex {
    ABSOLUTE_IRI.get_or_init(|| {
        Regex::new(r#"^[A-Za-z][A-Za-z0-9+.\-]*:[^\s<>"{}|\\^`]+$"#)
            .unwrap_or_else(|e| unreachable!("static IRI pattern is valid: {e}"))
    })
}

/// Returns true if `identifier` is a syntactically valid absolute IRI.
#[must_use]
pub fn is_absolute_iri(identifier: &str) -> bool {
    absolute_iri().is_match(identifier)
}

/// One prefix binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceBinding {
    /// Compact prefix, e.g. `ex`.
    pub prefix: String,
    /// Absolute namespace IRI, e.g. `https://example.org/`.
    pub identifier: String,
}

impl NamespaceBinding {
    /// Creates a binding after validating both parts.
    pub fn new(prefix: impl Into<String>, identifier: impl Into<String>) -> Result<Self, ValidationError> {
        let binding = Self {
            prefix: prefix.into(),
            identifier: identifier.into(),
        };
        binding.validate()?;
        Ok(binding)
    }

    /// Validates the binding.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.prefix.trim().is_empty() {
            return Err(ValidationError::EmptyPrefix);
        }
        if self.prefix.contains(|c: char| c == ':' || c.is_whitespace()) {
            return Err(ValidationError::InvalidPrefix {
                prefix: self.prefix.clone(),
            });
        }
        if !is_absolute_iri(&self.identifier) {
            return Err(ValidationError::InvalidIdentifier {
                identifier: self.identifier.clone(),
            });
        }
        Ok(())
    }
}

/// Bidirectional prefix/IRI registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceRegistry {
    bindings: Vec<NamespaceBinding>,
}

impl NamespaceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry from initial bindings, in order.
    pub fn with_bindings<I>(bindings: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = NamespaceBinding>,
    {
        let mut registry = Self::new();
        for b in bindings {
            registry.register(b.prefix, b.identifier)?;
        }
        Ok(registry)
    }

    /// Registers `prefix` for `identifier`.
    ///
    /// Overwrites an existing binding for the same prefix in place, so the
    /// prefix keeps its original position in the compaction order.
    ///
    /// # Errors
    /// - `InvalidIdentifier` if `identifier` is not an absolute IRI
    /// - `EmptyPrefix` if `prefix` is blank
    pub fn register(
        &mut self,
        prefix: impl Into<String>,
        identifier: impl Into<String>,
    ) -> Result<(), ValidationError> {
        let binding = NamespaceBinding::new(prefix, identifier)?;
        match self.bindings.iter_mut().find(|b| b.prefix == binding.prefix) {
            Some(existing) => existing.identifier = binding.identifier,
            None => self.bindings.push(binding),
        }
        Ok(())
    }

    /// Removes the binding for `prefix`; absent prefixes are ignored.
    pub fn unregister(&mut self, prefix: &str) {
        self.bindings.retain(|b| b.prefix != prefix);
    }

    /// Returns the namespace bound to `prefix`.
    #[must_use]
    pub fn namespace(&self, prefix: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|b| b.prefix == prefix)
            .map(|b| b.identifier.as_str())
    }

    /// Returns `prefix:relativePart` for the first namespace that is a literal
    /// prefix of `identifier`, or `identifier` unchanged.
    #[must_use]
    pub fn compact(&self, identifier: &str) -> String {
        for b in &self.bindings {
            if let Some(rest) = identifier.strip_prefix(b.identifier.as_str()) {
                return format!("{}:{rest}", b.prefix);
            }
        }
        identifier.to_string()
    }

    /// Expands a compact identifier whose prefix is registered.
    ///
    /// Anything else, including absolute IRIs whose scheme is not a
    /// registered prefix, is returned unchanged.
    #[must_use]
    pub fn resolve(&self, compact_or_absolute: &str) -> String {
        if let Some((prefix, local)) = compact_or_absolute.split_once(':') {
            if let Some(ns) = self.namespace(prefix) {
                return format!("{ns}{local}");
            }
        }
        compact_or_absolute.to_string()
    }

    /// Iterates bindings in registration order.
    pub fn bindings(&self) -> impl Iterator<Item = &NamespaceBinding> {
        self.bindings.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ex_registry() -> NamespaceRegistry {
        let mut r = NamespaceRegistry::new();
        r.register("ex", "https://example.org/").unwrap();
        r
    }

    #[test]
    fn compact_and_resolve_toggle_command() {
        let r = ex_registry();
        assert_eq!(r.compact("https://example.org/ToggleCommand"), "ex:ToggleCommand");
        assert_eq!(r.resolve("ex:ToggleCommand"), "https://example.org/ToggleCommand");
    }

    #[test]
    fn register_rejects_relative_identifier() {
        let mut r = NamespaceRegistry::new();
        let err = r.register("ex", "example.org/").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidIdentifier { .. }));

        let err = r.register("ex", "https://exa mple.org/").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidIdentifier { .. }));
        assert!(r.is_empty());
    }

    #[test]
    fn register_rejects_blank_prefix() {
        let mut r = NamespaceRegistry::new();
        let err = r.register("  ", "https://example.org/").unwrap_err();
        assert!(matches!(err, ValidationError::EmptyPrefix));
    }

    #[test]
    fn register_rejects_prefix_that_breaks_resolution() {
        let mut r = NamespaceRegistry::new();
        for prefix in ["a:b", "ex ", "e x", "ex\t"] {
            let err = r.register(prefix, "https://x.org/").unwrap_err();
            assert!(matches!(err, ValidationError::InvalidPrefix { .. }), "{prefix:?}");
        }
        assert!(r.is_empty());

        r.register("ab", "https://x.org/").unwrap();
        let compact = r.compact("https://x.org/Thing");
        assert_eq!(compact, "ab:Thing");
        assert_eq!(r.resolve(&compact), "https://x.org/Thing");
    }

    #[test]
    fn register_overwrites_in_place() {
        let mut r = ex_registry();
        r.register("saref", "https://saref.etsi.org/core/").unwrap();
        r.register("ex", "https://example.com/").unwrap();

        assert_eq!(r.len(), 2);
        assert_eq!(r.namespace("ex"), Some("https://example.com/"));
        assert_eq!(r.bindings().next().unwrap().prefix, "ex");
    }

    #[test]
    fn unregister_is_idempotent() {
        let mut r = ex_registry();
        r.unregister("ex");
        r.unregister("ex");
        r.unregister("missing");
        assert!(r.is_empty());
        assert_eq!(r.resolve("ex:A"), "ex:A");
    }

    #[test]
    fn compact_without_match_is_identity() {
        let r = ex_registry();
        let x = "https://other.org/Thing";
        assert_eq!(r.compact(x), x);
        assert_eq!(r.compact(&r.compact(x)), x);
    }

    #[test]
    fn resolve_leaves_absolute_iris_alone() {
        let r = ex_registry();
        assert_eq!(r.resolve("https://example.org/A"), "https://example.org/A");
        assert_eq!(r.resolve("no-colon"), "no-colon");
        assert_eq!(r.resolve("unknown:A"), "unknown:A");
    }

    #[test]
    fn overlapping_namespaces_first_registration_wins() {
        let mut r = NamespaceRegistry::new();
        r.register("ex", "https://example.org/").unwrap();
        r.register("exdev", "https://example.org/devices/").unwrap();

        let iri = "https://example.org/devices/Lamp";
        assert_eq!(r.compact(iri), "ex:devices/Lamp");
        assert_eq!(r.resolve(&r.compact(iri)), iri);

        let mut reversed = NamespaceRegistry::new();
        reversed.register("exdev", "https://example.org/devices/").unwrap();
        reversed.register("ex", "https://example.org/").unwrap();
        assert_eq!(reversed.compact(iri), "exdev:Lamp");
    }

    #[test]
    fn round_trip_law_holds_for_registered_namespaces() {
        let mut r = NamespaceRegistry::new();
        r.register("saref", "https://saref.etsi.org/core/").unwrap();
        r.register("td", "https://www.w3.org/2019/wot/td#").unwrap();
        r.register("hmas", "https://purl.org/hmas/").unwrap();

        for iri in [
            "https://saref.etsi.org/core/ToggleCommand",
            "https://www.w3.org/2019/wot/td#ActionAffordance",
            "https://purl.org/hmas/interaction#Ability",
            "https://purl.org/hmas/",
        ] {
            assert_eq!(r.resolve(&r.compact(iri)), iri);
        }
    }

    #[test]
    fn with_bindings_preserves_order() {
        let r = NamespaceRegistry::with_bindings(vec![
            NamespaceBinding::new("b", "https://b.org/").unwrap(),
            NamespaceBinding::new("a", "https://a.org/").unwrap(),
        ])
        .unwrap();
        let prefixes: Vec<_> = r.bindings().map(|b| b.prefix.as_str()).collect();
        assert_eq!(prefixes, vec!["b", "a"]);
    }

    #[test]
    fn absolute_iri_check() {
        assert!(is_absolute_iri("https://example.org/"));
        assert!(is_absolute_iri("urn:isbn:0451450523"));
        assert!(!is_absolute_iri("https:"));
        assert!(!is_absolute_iri("/relative/path"));
        assert!(!is_absolute_iri("1http://example.org/"));
    }
}
