//! The evaluation context threaded through the document tree.

use std::collections::BTreeMap;
use std::rc::Rc;

use curie::{Curie, PrefixMapping};
use icu::locale::LanguageIdentifier;
use itertools::Itertools;
use indexmap::IndexMap;
use oxiri::Iri;
use oxrdf::{BlankNode, NamedNode, NamedOrBlankNode};

use crate::HostDefaults;

/// A predicate waiting for a descendant to supply the missing resource.
#[derive(Clone, Debug)]
pub(crate) enum IncompleteTriple {
    /// `rel`: parent subject becomes the subject of the completed triple.
    Forward(NamedNode),
    /// `rev`: the completing resource becomes the subject.
    Reverse(NamedNode),
}

/// Everything an element inherits from its ancestors: the resolution
/// environment (base, mappings, vocabulary, language) plus the chaining
/// state (parent subject/object, incomplete triples).
///
/// Contexts are shared down the tree behind `Rc`; the maps are themselves
/// `Rc` so that an element which changes nothing reuses its parent's tables
/// outright, and one that adds a mapping clones only the table it touches.
pub(crate) struct EvaluationContext {
    pub base: Iri<String>,
    pub parent_subject: Rc<NamedOrBlankNode>,
    pub parent_object: Option<Rc<NamedOrBlankNode>>,
    pub uri_mappings: Rc<PrefixMapping>,
    pub term_mappings: Rc<BTreeMap<String, NamedNode>>,
    pub default_vocabulary: Option<NamedNode>,
    pub language: Option<Rc<LanguageIdentifier>>,
    pub incomplete_triples: Vec<IncompleteTriple>,
    /// In-scope `xmlns` declarations, in declaration order, for rebuilding
    /// XML-fragment literals. The empty string keys the default namespace.
    pub namespaces: Rc<IndexMap<String, String>>,
    /// The one blank node all `[_:]` references in this document share.
    pub anon_bnode: BlankNode,
}

impl EvaluationContext {
    /// Context for the document root: the document IRI (fragment removed)
    /// as base and parent subject, and the host language's initial
    /// mappings.
    pub fn root(base: &Iri<String>, host: &HostDefaults) -> Self {
        let base = strip_fragment(base);
        let mut mappings = PrefixMapping::default();
        for (prefix, uri) in host.uri_mappings {
            // Host-supplied pairs are static and well-formed.
            let _ = mappings.add_prefix(prefix, uri);
        }
        EvaluationContext {
            parent_subject: Rc::new(NamedOrBlankNode::NamedNode(NamedNode::new_unchecked(
                base.as_str(),
            ))),
            base,
            parent_object: None,
            uri_mappings: Rc::new(mappings),
            term_mappings: Rc::clone(&host.term_mappings),
            default_vocabulary: host.vocabulary.clone(),
            language: None,
            incomplete_triples: Vec::new(),
            namespaces: Rc::new(IndexMap::new()),
            anon_bnode: BlankNode::default(),
        }
    }

    /// True when an element changed none of the inherited resolution state,
    /// so a skipped element may hand the parent context to its children
    /// unchanged. Redeclaring a mapping that is already in scope still
    /// counts as unchanged, so the maps are compared by value when they
    /// are not the same table.
    pub fn matches_locals(&self, other: &EvaluationContext) -> bool {
        (Rc::ptr_eq(&self.uri_mappings, &other.uri_mappings)
            || prefix_mappings_eq(&self.uri_mappings, &other.uri_mappings))
            && (Rc::ptr_eq(&self.term_mappings, &other.term_mappings)
                || self.term_mappings == other.term_mappings)
            && (Rc::ptr_eq(&self.namespaces, &other.namespaces)
                || self.namespaces == other.namespaces)
            && self.default_vocabulary == other.default_vocabulary
            && self.language == other.language
            && self.base == other.base
    }
}

fn prefix_mappings_eq(a: &PrefixMapping, b: &PrefixMapping) -> bool {
    a.expand_curie(&Curie::new(None, "")).ok() == b.expand_curie(&Curie::new(None, "")).ok()
        && a.mappings().sorted().eq(b.mappings().sorted())
}

pub(crate) fn strip_fragment(iri: &Iri<String>) -> Iri<String> {
    match iri.as_str().split_once('#') {
        Some((before, _)) => Iri::parse(before.to_string()).unwrap_or_else(|_| iri.clone()),
        None => iri.clone(),
    }
}
