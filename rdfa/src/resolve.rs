//! CURIE, term and IRI resolution under the version-specific restriction
//! policies of the two rule sets.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::{Mutex, OnceLock};

use curie::{Curie, PrefixMapping};
use oxiri::Iri;
use oxrdf::{BlankNode, NamedNode, NamedOrBlankNode};

use crate::{trace, Error, Version};

/// How one candidate interpretation of an attribute value is attempted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Strategy {
    Term,
    SafeCurie,
    Curie,
    Uri,
    Bnode,
    AbsUri,
}

/// The restriction policy of an attribute: which interpretations it admits,
/// in which order. The order is part of the processing model; a value is
/// handed to each strategy in turn until one claims it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Policy {
    /// `about`, `resource`.
    SafeCurieOrCurieOrUri,
    /// `rel`, `rev`, `typeof`, `datatype`.
    TermOrCurieOrAbsUri,
    /// `property`. RDFa 1.0 restricts predicates to CURIEs only.
    TermOrCurieOrAbsUriProp,
    /// `href`, `src`.
    UriOnly,
}

impl Policy {
    fn strategies(self, version: Version) -> &'static [Strategy] {
        use Strategy::*;
        match (self, version) {
            // Term mappings are never consulted for about/resource, so the
            // safe set collapses to the same chain in both versions; the
            // versions still differ inside the strategies (prefix case
            // folding, the 1.0 "xml" reservation).
            (Policy::SafeCurieOrCurieOrUri, _) => &[SafeCurie, Curie, Uri, Bnode],
            (Policy::TermOrCurieOrAbsUri, Version::Rdfa10) => &[Term, Curie],
            (Policy::TermOrCurieOrAbsUri, Version::Rdfa11) => &[Term, Curie, AbsUri],
            (Policy::TermOrCurieOrAbsUriProp, Version::Rdfa10) => &[Curie],
            (Policy::TermOrCurieOrAbsUriProp, Version::Rdfa11) => &[Term, Curie, AbsUri],
            (Policy::UriOnly, _) => &[Uri],
        }
    }

    fn admits(self, version: Version, strategy: Strategy) -> bool {
        self.strategies(version).contains(&strategy)
    }
}

/// Outcome of resolving one attribute value.
pub(crate) enum Resolved {
    Node(NamedOrBlankNode),
    /// No strategy produced a node and at least one wants to say why.
    /// The value is withheld and the error reported once.
    Dropped(Error),
    /// No strategy claimed the value at all; it is ignored silently.
    Unmatched,
}

/// A borrow of everything resolution needs, rebuilt cheaply per element.
pub(crate) struct Resolver<'a> {
    pub version: Version,
    pub base: &'a Iri<String>,
    pub mappings: &'a PrefixMapping,
    pub terms: &'a BTreeMap<String, NamedNode>,
    pub vocabulary: Option<&'a NamedNode>,
    pub host_prefix: Option<&'a str>,
    pub bnodes: &'a RefCell<BTreeMap<String, BlankNode>>,
    pub anon: &'a BlankNode,
    pub interner: Option<&'a RefCell<BTreeMap<String, NamedNode>>>,
}

impl Resolver<'_> {
    pub fn resolve(&self, value: &str, policy: Policy) -> Resolved {
        let mut pending: Option<Error> = None;
        for strategy in policy.strategies(self.version) {
            match strategy {
                Strategy::Term => {
                    if !is_term(value) {
                        continue;
                    }
                    match self.resolve_term(value) {
                        Ok(node) => return Resolved::Node(node.into()),
                        Err(error) => pending.get_or_insert(error),
                    };
                }
                Strategy::SafeCurie => {
                    let Some(inner) = value
                        .strip_prefix('[')
                        .and_then(|rest| rest.strip_suffix(']'))
                    else {
                        continue;
                    };
                    // A safe CURIE is terminal: a bracketed value is a CURIE
                    // or nothing.
                    if let Some(name) = inner.strip_prefix("_:") {
                        return Resolved::Node(self.bnode(name).into());
                    }
                    if !inner.contains(':') {
                        return Resolved::Unmatched;
                    }
                    return match self.expand_curie(inner) {
                        Some(node) => Resolved::Node(node.into()),
                        None => {
                            Resolved::Dropped(Error::UnresolvedCurie(value.to_string()))
                        }
                    };
                }
                Strategy::Curie => {
                    if !value.contains(':') || value.starts_with("_:") {
                        continue;
                    }
                    match self.expand_curie(value) {
                        Some(node) => return Resolved::Node(node.into()),
                        None if prefix_shaped(value) => {
                            pending
                                .get_or_insert(Error::UnresolvedCurie(value.to_string()));
                        }
                        None => {}
                    }
                }
                Strategy::Uri => {
                    if policy.admits(self.version, Strategy::Bnode)
                        && value.starts_with("_:")
                    {
                        continue;
                    }
                    // RDFa 1.0 reserves values beginning with "xml"; they
                    // never denote an IRI.
                    if self.version == Version::Rdfa10
                        && value.len() >= 3
                        && value.as_bytes()[..3].eq_ignore_ascii_case(b"xml")
                    {
                        continue;
                    }
                    if policy != Policy::UriOnly
                        && prefix_shaped(value)
                        && self.expand_curie(value).is_none()
                    {
                        pending.get_or_insert(Error::UnresolvedCurie(value.to_string()));
                        continue;
                    }
                    match self.base.resolve(value) {
                        Ok(iri) => return Resolved::Node(self.named(iri.into_inner()).into()),
                        Err(_) => {
                            pending.get_or_insert(Error::MalformedUri(value.to_string()));
                        }
                    }
                }
                Strategy::Bnode => {
                    if let Some(name) = value.strip_prefix("_:") {
                        return Resolved::Node(self.bnode(name).into());
                    }
                }
                Strategy::AbsUri => {
                    if !value.contains(':') || prefix_shaped(value) {
                        continue;
                    }
                    match Iri::parse(value.to_string()) {
                        Ok(iri) => return Resolved::Node(self.named(iri.into_inner()).into()),
                        Err(_) => {
                            pending.get_or_insert(Error::MalformedUri(value.to_string()));
                        }
                    }
                }
            }
        }
        match pending {
            Some(error) => Resolved::Dropped(error),
            None => Resolved::Unmatched,
        }
    }

    /// Expands `rel`/`rev`/`property`/`typeof`/`datatype` values that must
    /// denote an IRI (not a blank node), as predicates must.
    pub fn resolve_iri(&self, value: &str, policy: Policy) -> Result<Option<NamedNode>, Error> {
        match self.resolve(value, policy) {
            Resolved::Node(NamedOrBlankNode::NamedNode(node)) => Ok(Some(node)),
            Resolved::Node(NamedOrBlankNode::BlankNode(_)) | Resolved::Unmatched => Ok(None),
            Resolved::Dropped(error) => Err(error),
        }
    }

    fn resolve_term(&self, term: &str) -> Result<NamedNode, Error> {
        if let Some(node) = self.terms.get(term) {
            return Ok(node.clone());
        }
        if let Some((_, node)) = self
            .terms
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(term))
        {
            return Ok(node.clone());
        }
        if let Some(vocabulary) = self.vocabulary {
            trace!("term {term:?} against vocabulary {vocabulary}");
            return NamedNode::new(format!("{}{}", vocabulary.as_str(), term))
                .map_err(|_| Error::MalformedUri(term.to_string()));
        }
        Err(Error::UnresolvedTerm(term.to_string()))
    }

    /// Expands a CURIE, resolves the expansion against the base, and
    /// records the winning prefix for serializers. `None` when the prefix
    /// (or the default mapping) is not bound.
    fn expand_curie(&self, value: &str) -> Option<NamedNode> {
        let (prefix, reference) = value.split_once(':')?;
        if prefix == "_" {
            return None;
        }
        let folded;
        let used_prefix = if prefix.is_empty() {
            // A declared default mapping wins; otherwise the host
            // language's reserved prefix fills in.
            if self.mappings.expand_curie(&Curie::new(None, "")).is_ok() {
                None
            } else {
                self.host_prefix
            }
        } else if self.version == Version::Rdfa11 {
            folded = prefix.to_ascii_lowercase();
            Some(folded.as_str())
        } else {
            Some(prefix)
        };
        let expanded = self
            .mappings
            .expand_curie(&Curie::new(used_prefix, reference))
            .ok()?;
        let resolved = self.base.resolve(&expanded).ok()?;
        if let Some(prefix) = used_prefix {
            let namespace = &expanded[..expanded.len() - reference.len()];
            register_prefix(prefix, namespace);
        }
        Some(self.named(resolved.into_inner()))
    }

    /// Blank nodes are cached per document so every `_:name` reference maps
    /// to the same node; an invalid name degrades to a fresh node that is
    /// still stable for that spelling.
    fn bnode(&self, name: &str) -> BlankNode {
        if name.is_empty() {
            return self.anon.clone();
        }
        self.bnodes
            .borrow_mut()
            .entry(name.to_string())
            .or_insert_with(|| {
                BlankNode::new(name).unwrap_or_default()
            })
            .clone()
    }

    fn named(&self, iri: String) -> NamedNode {
        match self.interner {
            Some(interner) => interner
                .borrow_mut()
                .entry(iri.clone())
                .or_insert_with(|| NamedNode::new_unchecked(iri))
                .clone(),
            None => NamedNode::new_unchecked(iri),
        }
    }
}

/// The term production: a leading ASCII letter or underscore (or a
/// `\uXXXX` escape, as long as it does not name a combining accent),
/// then letters, digits, `.`, `-`, `_` and escapes.
pub(crate) fn is_term(value: &str) -> bool {
    let mut rest = value;
    let mut first = true;
    while !rest.is_empty() {
        if let Some(hex) = rest.strip_prefix("\\u") {
            if hex.len() < 4 || !hex.as_bytes()[..4].iter().all(|b| b.is_ascii_hexdigit()) {
                return false;
            }
            // A combining accent is a legal name character but not a
            // legal first one.
            if first {
                match u32::from_str_radix(&hex[..4], 16).ok().and_then(char::from_u32) {
                    Some('\u{0300}'..='\u{036F}') | None => return false,
                    Some(_) => {}
                }
            }
            rest = &hex[4..];
        } else {
            let Some(c) = rest.chars().next() else {
                break;
            };
            let allowed = if first {
                c.is_ascii_alphabetic() || c == '_'
            } else {
                c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_')
            };
            if !allowed {
                return false;
            }
            rest = &rest[c.len_utf8()..];
        }
        first = false;
    }
    !value.is_empty()
}

/// True when a value reads as `prefix:reference`, so that failing to
/// expand it deserves a warning rather than silently treating it as an
/// IRI. Network-path references (`//` after the colon) never qualify.
fn prefix_shaped(value: &str) -> bool {
    match value.split_once(':') {
        Some((prefix, rest)) => is_term(prefix) && !rest.starts_with("//"),
        None => false,
    }
}

static REGISTERED: OnceLock<Mutex<BTreeMap<String, String>>> = OnceLock::new();

pub(crate) fn register_prefix(prefix: &str, namespace: &str) {
    if let Ok(mut registry) = REGISTERED
        .get_or_init(|| Mutex::new(BTreeMap::new()))
        .lock()
    {
        registry
            .entry(prefix.to_string())
            .or_insert_with(|| namespace.to_string());
    }
}

/// Every prefix-to-namespace pair any parse in this process has expanded a
/// CURIE through. Best effort, intended for seeding serializer prefix
/// tables.
pub fn registered_prefixes() -> BTreeMap<String, String> {
    REGISTERED
        .get_or_init(|| Mutex::new(BTreeMap::new()))
        .lock()
        .map(|registry| registry.clone())
        .unwrap_or_default()
}
