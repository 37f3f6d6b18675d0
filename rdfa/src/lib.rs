//! Extraction of RDF triples from RDFa-annotated markup.
//!
//! Implements the W3C RDFa Core processing model for both the 1.0 and 1.1
//! rule sets: recursive propagation of the evaluation context through the
//! document tree, CURIE/term/IRI resolution under version-dependent
//! restriction policies, incomplete-triple chaining, profile-supplied
//! mappings, and plain/typed/XML-fragment literal construction.
//!
//! The entry point is [`RdfaParser`]; [`parse`] is a shorthand for the
//! default options:
//!
//! ```no_run
//! let base = oxiri::Iri::parse("http://example.org/doc".to_string()).unwrap();
//! let graph = rdfa::parse(r#"<html><body vocab="http://schema.org/">
//!     <p typeof="Person"><span property="name">Alice</span></p>
//! </body></html>"#, base).unwrap();
//! assert_eq!(graph.len(), 2);
//! ```

use std::collections::BTreeMap;
use std::rc::Rc;

use oxiri::Iri;
use oxrdf::{Graph, NamedNode, Triple, TripleRef};

macro_rules! trace {
    ($($args:expr),*) => {
        #[cfg(debug_assertions)]
        println!($($args),*);
    };
}
pub(crate) use trace;

mod context;
mod literal;
mod profile;
mod resolve;
mod traverse;

pub use profile::{Profile, ProfileError, ProfileLoader, StaticProfiles};
pub use resolve::registered_prefixes;

use profile::ProfileResolver;

/// The RDFa rule set to apply. The two versions differ in which resolution
/// strategies each attribute admits, in prefix case-folding, and in whether
/// `@prefix` and `@profile` are honored at all.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Version {
    Rdfa10,
    #[default]
    Rdfa11,
}

/// Host-language profile of the markup being processed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HostLanguage {
    /// (X)HTML-like markup with `head`/`body` root containers, a document
    /// `<base href>` element, and the XHTML vocabulary's reserved terms.
    #[default]
    HeadBody,
    /// Generic XML-ish markup: no predefined mappings, `xml:base` honored,
    /// the document root acts as the root container.
    Generic,
}

/// Parser configuration.
#[derive(Clone, Debug)]
pub struct Options {
    pub version: Version,
    pub host_language: HostLanguage,
    /// Abort at the first reported error instead of degrading.
    pub validate: bool,
    /// Rewrite recognized typed literals into their canonical lexical form.
    pub canonicalize: bool,
    /// Share one `NamedNode` per distinct IRI within a parse.
    pub intern: bool,
    /// Recursion guard; exceeding it is always fatal.
    pub max_depth: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            version: Version::default(),
            host_language: HostLanguage::default(),
            validate: false,
            canonicalize: false,
            intern: true,
            max_depth: 128,
        }
    }
}

/// Severity attached to a [`Diagnostic`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A processor message: where in the document, how bad, and what happened.
/// Reported to the diagnostics callback regardless of `validate`; the flag
/// only decides whether errors also abort the parse.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    /// Element path from the document root, e.g. `html>body>div`.
    pub location: String,
    pub severity: Severity,
    pub message: String,
}

#[derive(derive_more::Error, derive_more::Display, Debug)]
pub enum Error {
    /// Unparseable or empty input. Always fatal.
    #[display("document error: {_0}")]
    Document(#[error(not(source))] String),

    /// A profile reference could not be resolved.
    #[display("profile reference error: {_0}")]
    ProfileReference(#[error(not(source))] String),

    /// A CURIE with a dangling prefix or undefined default namespace.
    #[display("unresolved CURIE: {_0}")]
    UnresolvedCurie(#[error(not(source))] String),

    /// A term with no mapping and no default vocabulary in scope.
    #[display("unresolved term: {_0}")]
    UnresolvedTerm(#[error(not(source))] String),

    /// A value that had to be an IRI but would not parse as one.
    #[display("malformed IRI: {_0}")]
    MalformedUri(#[error(not(source))] String),

    /// A literal whose lexical form does not satisfy its datatype.
    #[display("literal construction error: {_0}")]
    Literal(#[error(not(source))] String),

    /// The recursion guard fired. Always fatal.
    #[display("maximum nesting depth {_0} exceeded")]
    DepthExceeded(#[error(not(source))] usize),
}

impl Error {
    pub(crate) fn always_fatal(&self) -> bool {
        matches!(self, Error::Document(_) | Error::DepthExceeded(_))
    }

    pub(crate) fn severity(&self) -> Severity {
        match self {
            Error::Document(_)
            | Error::ProfileReference(_)
            | Error::Literal(_)
            | Error::DepthExceeded(_) => Severity::Error,
            Error::UnresolvedCurie(_) | Error::UnresolvedTerm(_) | Error::MalformedUri(_) => {
                Severity::Warning
            }
        }
    }
}

/// Receives each extracted triple, in emission order.
pub trait TripleSink {
    fn triple(&mut self, triple: TripleRef<'_>);
}

impl TripleSink for Graph {
    fn triple(&mut self, triple: TripleRef<'_>) {
        self.insert(triple);
    }
}

impl TripleSink for Vec<Triple> {
    fn triple(&mut self, triple: TripleRef<'_>) {
        self.push(triple.into_owned());
    }
}

pub(crate) const XHV: &str = "http://www.w3.org/1999/xhtml/vocab#";

// [xhtml-rdfa] reserved @rel/@rev values, all bound in the XHTML vocabulary.
const XHV_TERMS: &[&str] = &[
    "alternate",
    "appendix",
    "bookmark",
    "cite",
    "chapter",
    "contents",
    "copyright",
    "first",
    "glossary",
    "help",
    "icon",
    "index",
    "last",
    "license",
    "meta",
    "next",
    "p3pv1",
    "prev",
    "role",
    "section",
    "stylesheet",
    "subsection",
    "start",
    "top",
    "up",
];

/// The reserved-term table of the head/body host language.
pub fn head_body_terms() -> &'static BTreeMap<String, NamedNode> {
    static TERMS: std::sync::OnceLock<BTreeMap<String, NamedNode>> = std::sync::OnceLock::new();
    TERMS.get_or_init(|| {
        XHV_TERMS
            .iter()
            .map(|term| {
                (
                    (*term).to_string(),
                    NamedNode::new_unchecked(format!("{XHV}{term}")),
                )
            })
            .collect()
    })
}

/// Initial mappings a host language contributes to the root context.
pub(crate) struct HostDefaults {
    pub vocabulary: Option<NamedNode>,
    /// Prefix consulted for CURIEs with an empty prefix (`:name`).
    pub prefix: Option<&'static str>,
    pub uri_mappings: &'static [(&'static str, &'static str)],
    pub term_mappings: Rc<BTreeMap<String, NamedNode>>,
}

impl HostLanguage {
    pub(crate) fn defaults(self) -> HostDefaults {
        match self {
            HostLanguage::HeadBody => HostDefaults {
                vocabulary: None,
                prefix: Some("xhv"),
                uri_mappings: &[("xhv", XHV)],
                term_mappings: Rc::new(head_body_terms().clone()),
            },
            HostLanguage::Generic => HostDefaults {
                vocabulary: None,
                prefix: None,
                uri_mappings: &[],
                term_mappings: Rc::new(BTreeMap::new()),
            },
        }
    }
}

/// An RDFa processor with a fixed configuration and a per-parser profile
/// cache. Parsing never mutates the parser beyond its caches, so one parser
/// can be reused across documents.
pub struct RdfaParser {
    options: Options,
    profiles: ProfileResolver,
}

impl RdfaParser {
    pub fn new(options: Options) -> Self {
        Self::with_profile_loader(options, Box::new(profile::NoProfiles))
    }

    /// Installs a pluggable fetcher for `@profile` documents. Resolved
    /// profiles are cached per parser, keyed by their absolutized IRI.
    pub fn with_profile_loader(options: Options, loader: Box<dyn ProfileLoader>) -> Self {
        Self {
            options,
            profiles: ProfileResolver::new(loader),
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Parses `input` and collects the extracted triples into a [`Graph`].
    pub fn parse(&self, input: &str, base: Iri<String>) -> Result<Graph, Error> {
        let mut graph = Graph::new();
        self.parse_into(input, base, &mut graph, None)?;
        Ok(graph)
    }

    /// Parses `input`, handing each triple to `sink` as it is produced and
    /// each processor message to `diagnostics` if one is supplied.
    ///
    /// `base` must be absolute; for the head/body host language a document
    /// `<base href>` overrides it. Outside validation mode all recoverable
    /// problems degrade to withheld values; `Err` is reserved for
    /// [`Error::Document`], [`Error::DepthExceeded`] and, under
    /// `validate`, the first reported error of any kind.
    pub fn parse_into<'a>(
        &'a self,
        input: &str,
        base: Iri<String>,
        sink: &'a mut dyn TripleSink,
        diagnostics: Option<&'a mut dyn FnMut(Diagnostic)>,
    ) -> Result<(), Error> {
        traverse::parse_document(&self.options, &self.profiles, input, base, sink, diagnostics)
    }
}

/// One-shot extraction with default options.
pub fn parse(input: &str, base: Iri<String>) -> Result<Graph, Error> {
    RdfaParser::new(Options::default()).parse(input, base)
}
