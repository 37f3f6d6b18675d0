use std::collections::HashSet;

use oxrdf::vocab::rdf;
use oxrdf::{Graph, TermRef};
use rdfa::{Error, Options, RdfaParser, Severity};

mod utils;
use utils::{assert_graph, base, extract, extract_with, serialize_graph};

#[test]
fn vocabulary_terms_resolve_against_vocab() {
    let graph = extract(
        r##"<html><body vocab="http://example.org/ns#">
            <p about="#me" property="name">Alice</p>
        </body></html>"##,
    );
    assert_graph(
        &graph,
        r##"<http://rdfa.example/doc#me> <http://example.org/ns#name> "Alice" ."##,
    );
}

#[test]
fn typeof_creates_a_blank_node_subject() {
    let graph = extract(
        r##"<html><body prefix="schema: http://schema.org/">
            <p typeof="schema:Person"><span property="schema:name">Alice</span></p>
        </body></html>"##,
    );
    assert_graph(
        &graph,
        r##"@prefix schema: <http://schema.org/> .
           _:someone a schema:Person ; schema:name "Alice" ."##,
    );
}

#[test]
fn explicit_blank_nodes_are_shared_across_the_document() {
    let graph = extract(
        r##"<html><body prefix="foaf: http://xmlns.com/foaf/0.1/">
            <div about="_:joe" property="foaf:name">Joe</div>
            <div about="_:joe" property="foaf:mbox">joe@example.org</div>
        </body></html>"##,
    );
    assert_eq!(graph.len(), 2);
    let subjects: HashSet<String> = graph.iter().map(|t| t.subject.to_string()).collect();
    assert_eq!(subjects.len(), 1);
}

#[test]
fn hanging_rel_completes_with_the_descendant_subject() {
    let graph = extract(
        r##"<html><body prefix="foaf: http://xmlns.com/foaf/0.1/">
            <div about="http://example.org/alice" rel="foaf:knows">
                <div about="http://example.org/bob"></div>
            </div>
        </body></html>"##,
    );
    assert_graph(
        &graph,
        r##"<http://example.org/alice> <http://xmlns.com/foaf/0.1/knows> <http://example.org/bob> ."##,
    );
}

#[test]
fn hanging_rel_completes_once_per_descendant() {
    let graph = extract(
        r##"<html><body prefix="foaf: http://xmlns.com/foaf/0.1/">
            <div about="http://example.org/alice" rel="foaf:knows">
                <div about="http://example.org/bob"></div>
                <div about="http://example.org/carol"></div>
            </div>
        </body></html>"##,
    );
    assert_graph(
        &graph,
        r##"@prefix foaf: <http://xmlns.com/foaf/0.1/> .
           <http://example.org/alice> foaf:knows <http://example.org/bob>, <http://example.org/carol> ."##,
    );
}

#[test]
fn hanging_rev_points_back_at_the_ancestor() {
    let graph = extract(
        r##"<html><body prefix="foaf: http://xmlns.com/foaf/0.1/">
            <div about="http://example.org/1" rev="foaf:knows">
                <div about="http://example.org/2"></div>
            </div>
        </body></html>"##,
    );
    assert_graph(
        &graph,
        r##"<http://example.org/2> <http://xmlns.com/foaf/0.1/knows> <http://example.org/1> ."##,
    );
}

#[test]
fn href_supplies_the_object_for_rel() {
    let graph = extract(
        r##"<html><body prefix="ex: http://example.org/ns#">
            <a about="#a" rel="ex:link" href="http://other.example/">elsewhere</a>
        </body></html>"##,
    );
    assert_graph(
        &graph,
        r##"<http://rdfa.example/doc#a> <http://example.org/ns#link> <http://other.example/> ."##,
    );
}

#[test]
fn reserved_link_terms_use_the_xhtml_vocabulary() {
    let graph = extract(
        r##"<html><body>
            <a about="#a" rel="license" href="http://example.org/licenses/by">terms</a>
        </body></html>"##,
    );
    assert_graph(
        &graph,
        r##"<http://rdfa.example/doc#a>
               <http://www.w3.org/1999/xhtml/vocab#license>
               <http://example.org/licenses/by> ."##,
    );
}

#[test]
fn unbound_prefix_is_dropped_with_one_warning() {
    let html = r##"<html><body>
        <div about="#x" property="nope:name">text</div>
    </body></html>"##;

    let mut graph = Graph::new();
    let mut diagnostics = Vec::new();
    RdfaParser::new(Options::default())
        .parse_into(
            html,
            base(),
            &mut graph,
            Some(&mut |d| diagnostics.push(d)),
        )
        .unwrap();

    assert!(graph.is_empty());
    let warnings: Vec<_> = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Warning)
        .collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message.contains("nope:name"));
}

#[test]
fn validation_makes_unresolved_prefixes_fatal() {
    let html = r##"<html><body>
        <div about="#x" property="nope:name">text</div>
    </body></html>"##;

    let options = Options {
        validate: true,
        ..Options::default()
    };
    let result = RdfaParser::new(options).parse(html, base());
    assert!(matches!(result, Err(Error::UnresolvedCurie(_))));
}

#[test]
fn explicit_xml_literal_consumes_the_subtree() {
    let graph = extract(
        r##"<html><body prefix="ex: http://example.org/ns# rdf: http://www.w3.org/1999/02/22-rdf-syntax-ns#">
            <div about="#d" property="ex:desc" datatype="rdf:XMLLiteral">Some <em property="ex:inner">markup</em> here</div>
        </body></html>"##,
    );
    // The nested property must not have produced a second triple.
    assert_eq!(graph.len(), 1);
    let triple = graph.iter().next().unwrap();
    match triple.object {
        TermRef::Literal(literal) => {
            assert_eq!(literal.datatype(), rdf::XML_LITERAL);
            assert!(literal.value().contains("<em"));
        }
        other => panic!("expected an XML literal, got {other}"),
    }
}

#[test]
fn language_is_inherited_and_cleared() {
    let graph = extract(
        r##"<html><body prefix="ex: http://example.org/ns#" lang="en">
            <p about="#a" property="ex:label">hello</p>
            <p about="#b" property="ex:label" lang="">plain</p>
        </body></html>"##,
    );
    assert_graph(
        &graph,
        r##"@prefix ex: <http://example.org/ns#> .
           <http://rdfa.example/doc#a> ex:label "hello"@en .
           <http://rdfa.example/doc#b> ex:label "plain" ."##,
    );
}

#[test]
fn base_element_overrides_the_document_iri() {
    let graph = extract(
        r##"<html><head><base href="http://other.example/root"></head>
        <body prefix="ex: http://example.org/ns#">
            <p about="#x" property="ex:label">here</p>
        </body></html>"##,
    );
    assert_graph(
        &graph,
        r##"<http://other.example/root#x> <http://example.org/ns#label> "here" ."##,
    );
}

#[test]
fn elements_without_attributes_pass_the_subject_through() {
    let graph = extract(
        r##"<html><body prefix="ex: http://example.org/ns#">
            <div about="#outer">
                <div><div>
                    <span property="ex:label">deep</span>
                </div></div>
            </div>
        </body></html>"##,
    );
    assert_graph(
        &graph,
        r##"<http://rdfa.example/doc#outer> <http://example.org/ns#label> "deep" ."##,
    );
}

#[test]
fn extraction_is_deterministic() {
    let html = r##"<html><body prefix="ex: http://example.org/ns#">
        <div typeof="ex:Thing" rel="ex:part">
            <div typeof="ex:Part"><span property="ex:name">part</span></div>
        </div>
    </body></html>"##;
    let first = serialize_graph(&extract(html));
    let second = serialize_graph(&extract(html));
    assert_eq!(first, second);
}

#[test]
fn nesting_depth_is_bounded() {
    let mut html = String::from("<html><body>");
    for _ in 0..40 {
        html.push_str("<div>");
    }
    html.push_str("deep");
    for _ in 0..40 {
        html.push_str("</div>");
    }
    html.push_str("</body></html>");

    let result = RdfaParser::new(Options {
        max_depth: 16,
        ..Options::default()
    })
    .parse(&html, base());
    assert!(matches!(result, Err(Error::DepthExceeded(16))));
}

#[test]
fn empty_input_is_rejected() {
    assert!(matches!(
        rdfa::parse("   \n ", base()),
        Err(Error::Document(_))
    ));
}

#[test]
fn generic_host_honors_xml_base() {
    let options = Options {
        host_language: rdfa::HostLanguage::Generic,
        ..Options::default()
    };
    let graph = extract_with(
        r##"<doc xml:base="http://other.example/dir/">
            <item about="thing" property="http://example.org/ns#p">v</item>
        </doc>"##,
        options,
    );
    assert_graph(
        &graph,
        r##"<http://other.example/dir/thing> <http://example.org/ns#p> "v" ."##,
    );
}
