//! Minimal RDF graph value type.
//!
//! Graphs are handed over by the description collaborator already parsed.
//! This module only models them: an insertion-ordered, duplicate-free list
//! of triples with simple pattern filtering.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// An RDF term.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Term {
    /// Absolute IRI.
    Iri {
        /// IRI value.
        value: String,
    },
    /// Blank node.
    Blank {
        /// Blank node label.
        id: String,
    },
    /// Literal with an optional datatype IRI.
    Literal {
        /// Lexical form.
        value: String,
        /// Datatype IRI.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        datatype: Option<String>,
    },
}

impl Term {
    #[must_use]
    pub fn iri(value: impl Into<String>) -> Self {
        Self::Iri { value: value.into() }
    }

    #[must_use]
    pub fn blank(id: impl Into<String>) -> Self {
        Self::Blank { id: id.into() }
    }

    #[must_use]
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal {
            value: value.into(),
            datatype: None,
        }
    }

    /// The string value of the term: IRI, blank label or lexical form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Iri { value } | Self::Literal { value, .. } => value,
            Self::Blank { id } => id,
        }
    }

    #[must_use]
    pub const fn is_iri(&self) -> bool {
        matches!(self, Self::Iri { .. })
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Iri { value } => write!(f, "<{value}>"),
            Self::Blank { id } => write!(f, "_:{id}"),
            Self::Literal { value, datatype: None } => write!(f, "\"{value}\""),
            Self::Literal {
                value,
                datatype: Some(dt),
            } => write!(f, "\"{value}\"^^<{dt}>"),
        }
    }
}

/// A single statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub subject: Term,
    pub predicate: String,
    pub object: Term,
}

impl Triple {
    #[must_use]
    pub fn new(subject: Term, predicate: impl Into<String>, object: Term) -> Self {
        Self {
            subject,
            predicate: predicate.into(),
            object,
        }
    }
}

/// Insertion-ordered set of triples.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Triple>", into = "Vec<Triple>")]
pub struct Graph {
    triples: Vec<Triple>,
    index: HashSet<Triple>,
}

impl Graph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a triple; returns false if it was already present.
    pub fn insert(&mut self, triple: Triple) -> bool {
        if self.index.contains(&triple) {
            return false;
        }
        self.index.insert(triple.clone());
        self.triples.push(triple);
        true
    }

    /// Adds every triple of `other`.
    pub fn extend(&mut self, other: &Self) {
        for t in &other.triples {
            self.insert(t.clone());
        }
    }

    pub fn clear(&mut self) {
        self.triples.clear();
        self.index.clear();
    }

    #[must_use]
    pub fn contains(&self, triple: &Triple) -> bool {
        self.index.contains(triple)
    }

    /// Triples matching the given pattern; `None` is a wildcard.
    pub fn filter<'a>(
        &'a self,
        subject: Option<&'a Term>,
        predicate: Option<&'a str>,
        object: Option<&'a Term>,
    ) -> impl Iterator<Item = &'a Triple> + 'a {
        self.triples.iter().filter(move |t| {
            subject.map_or(true, |s| &t.subject == s)
                && predicate.map_or(true, |p| t.predicate == p)
                && object.map_or(true, |o| &t.object == o)
        })
    }

    /// Objects of `(subject, predicate, ?)`.
    pub fn objects<'a>(&'a self, subject: &'a Term, predicate: &'a str) -> impl Iterator<Item = &'a Term> + 'a {
        self.filter(Some(subject), Some(predicate), None).map(|t| &t.object)
    }

    /// Subjects of `(?, predicate, object)`; pass `None` to match any object.
    pub fn subjects<'a>(&'a self, predicate: &'a str, object: Option<&'a Term>) -> impl Iterator<Item = &'a Term> + 'a {
        self.filter(None, Some(predicate), object).map(|t| &t.subject)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Triple> {
        self.triples.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.triples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }
}

impl PartialEq for Graph {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl Eq for Graph {}

impl From<Vec<Triple>> for Graph {
    fn from(triples: Vec<Triple>) -> Self {
        triples.into_iter().collect()
    }
}

impl From<Graph> for Vec<Triple> {
    fn from(graph: Graph) -> Self {
        graph.triples
    }
}

impl FromIterator<Triple> for Graph {
    fn from_iter<I: IntoIterator<Item = Triple>>(iter: I) -> Self {
        let mut g = Self::new();
        for t in iter {
            g.insert(t);
        }
        g
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str, p: &str, o: &str) -> Triple {
        Triple::new(Term::iri(s), p, Term::iri(o))
    }

    #[test]
    fn insert_deduplicates_and_keeps_order() {
        let mut g = Graph::new();
        assert!(g.insert(t("ex:a", "ex:p", "ex:b")));
        assert!(g.insert(t("ex:c", "ex:p", "ex:d")));
        assert!(!g.insert(t("ex:a", "ex:p", "ex:b")));

        assert_eq!(g.len(), 2);
        let subjects: Vec<_> = g.iter().map(|t| t.subject.as_str()).collect();
        assert_eq!(subjects, vec!["ex:a", "ex:c"]);
    }

    #[test]
    fn filter_with_wildcards() {
        let g: Graph = vec![
            t("ex:a", "ex:p", "ex:b"),
            t("ex:a", "ex:q", "ex:c"),
            t("ex:d", "ex:p", "ex:b"),
        ]
        .into();

        let a = Term::iri("ex:a");
        let b = Term::iri("ex:b");
        assert_eq!(g.filter(Some(&a), None, None).count(), 2);
        assert_eq!(g.filter(None, Some("ex:p"), Some(&b)).count(), 2);
        assert_eq!(g.objects(&a, "ex:q").next(), Some(&Term::iri("ex:c")));
        assert_eq!(g.subjects("ex:p", Some(&b)).count(), 2);
    }

    #[test]
    fn graph_equality_ignores_order() {
        let g1: Graph = vec![t("ex:a", "ex:p", "ex:b"), t("ex:c", "ex:p", "ex:d")].into();
        let g2: Graph = vec![t("ex:c", "ex:p", "ex:d"), t("ex:a", "ex:p", "ex:b")].into();
        assert_eq!(g1, g2);
    }

    #[test]
    fn serde_form_is_a_triple_list() {
        let mut g = Graph::new();
        g.insert(Triple::new(Term::blank("s"), "ex:p", Term::literal("on")));

        let json = serde_json::to_value(&g).unwrap();
        assert!(json.is_array());
        let back: Graph = serde_json::from_value(json).unwrap();
        assert_eq!(back, g);
        assert!(back.contains(&Triple::new(Term::blank("s"), "ex:p", Term::literal("on"))));
    }

    #[test]
    fn term_display() {
        assert_eq!(Term::iri("https://e.org/a").to_string(), "<https://e.org/a>");
        assert_eq!(Term::blank("b0").to_string(), "_:b0");
        assert_eq!(Term::literal("x").to_string(), "\"x\"");
    }
}
