#![allow(unused)]

use std::collections::HashSet;

use itertools::Itertools;
use oxiri::Iri;
use oxrdf::Graph;
use rdfa::{Options, RdfaParser};

pub fn base() -> Iri<String> {
    Iri::parse("http://rdfa.example/doc".to_string()).unwrap()
}

pub fn extract(html: &str) -> Graph {
    rdfa::parse(html, base()).unwrap()
}

pub fn extract_with(html: &str, options: Options) -> Graph {
    RdfaParser::new(options).parse(html, base()).unwrap()
}

/// Canonical Turtle rendition, with blank nodes relabeled so two
/// isomorphic graphs serialize identically.
pub fn serialize_graph(graph: &Graph) -> String {
    // NB: rdf_canon rather than oxrdf's canonicalization, which hangs
    let idents = rdf_canon::issue_graph_with::<sha2::Sha256>(graph, &Default::default()).unwrap();
    let graph = rdf_canon::relabel_graph(graph, &idents).unwrap();

    let mut output = Vec::new();
    let mut ttl = oxttl::TurtleSerializer::new()
        .with_base_iri(base().as_str())
        .unwrap();

    // slow but makes test output nicer
    let registered = rdfa::registered_prefixes();
    let mut prefixes_to_use = HashSet::new();
    let mut add_prefix = |full_iri: &str| {
        if let Some((prefix, namespace)) = registered
            .iter()
            .find(|(prefix, namespace)| !prefix.is_empty() && full_iri.starts_with(namespace.as_str()))
        {
            prefixes_to_use.insert((prefix.clone(), namespace.clone()));
        }
    };

    for triple in graph.iter() {
        if let oxrdf::SubjectRef::NamedNode(n) = triple.subject {
            add_prefix(n.as_str());
        }

        add_prefix(triple.predicate.as_str());

        if let oxrdf::TermRef::NamedNode(n) = triple.object {
            add_prefix(n.as_str());
        } else if let oxrdf::TermRef::Literal(l) = triple.object {
            if !l.is_plain() {
                add_prefix(l.datatype().as_str());
            }
        }
    }

    for (prefix, namespace) in prefixes_to_use {
        if Iri::parse(namespace.clone()).is_ok() {
            ttl = ttl.with_prefix(&prefix, &namespace).unwrap();
        }
    }

    let mut ttl = ttl.for_writer(&mut output);
    for triple in graph.iter().sorted_by_cached_key(|t| {
        (
            t.subject.to_string(),
            if t.predicate.as_str() == "http://www.w3.org/1999/02/22-rdf-syntax-ns#type" {
                // make "a" come first
                None
            } else {
                Some(t.predicate.to_string())
            },
            t.object.to_string(),
        )
    }) {
        ttl.serialize_triple(triple).unwrap();
    }

    ttl.finish().unwrap();

    String::from_utf8_lossy(&output).into_owned()
}

/// Asserts the extracted graph is isomorphic to the graph described by
/// `ttl`, by comparing canonical serializations.
pub fn assert_graph(graph: &Graph, ttl: &str) {
    let mut expected = Graph::new();
    let parser = oxttl::TurtleParser::new()
        .with_base_iri(base().as_str())
        .unwrap();
    for triple in parser.for_slice(ttl.as_bytes()) {
        expected.insert(&triple.unwrap());
    }

    pretty_assertions::assert_eq!(serialize_graph(graph), serialize_graph(&expected));
}
