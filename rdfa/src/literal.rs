//! Construction of plain, typed and XML-fragment literals from an element.

use std::fmt::Write;
use std::str::FromStr;

use icu::locale::LanguageIdentifier;
use indexmap::IndexMap;
use itertools::Itertools;
use oxrdf::vocab::{rdf, xsd};
use oxrdf::{Literal, NamedNode};
use scraper::{ElementRef, Node};

use crate::{Error, Version};

/// The state of the `datatype` attribute after resolution.
pub(crate) enum Datatype {
    Missing,
    /// `datatype=""`: force a plain literal, keeping the language.
    Empty,
    Iri(NamedNode),
}

/// The literal an element's `property` attribute would assert, plus whether
/// the element's subtree was consumed as markup and must not be descended
/// into. `Ok(None)` means the value was reserved (a blank-node datatype)
/// and the assertion is withheld.
pub(crate) fn build_literal(
    element: ElementRef<'_>,
    language: Option<&LanguageIdentifier>,
    datatype: Datatype,
    content: Option<&str>,
    version: Version,
    namespaces: &IndexMap<String, String>,
    canonicalize: bool,
) -> Result<Option<(Literal, bool)>, Error> {
    match datatype {
        Datatype::Iri(datatype) if datatype.as_ref() == rdf::XML_LITERAL => {
            let fragment = xml_fragment(element, language, namespaces);
            Ok(Some((
                Literal::new_typed_literal(fragment, datatype),
                true,
            )))
        }
        Datatype::Iri(datatype) => {
            let lexical = match content {
                Some(content) => content.to_string(),
                None => text_content(element),
            };
            let lexical = checked_lexical(&datatype, lexical, canonicalize)?;
            Ok(Some((
                Literal::new_typed_literal(lexical, datatype),
                false,
            )))
        }
        Datatype::Empty => {
            let lexical = match content {
                Some(content) => content.to_string(),
                None => text_content(element),
            };
            Ok(Some((plain(lexical, language), false)))
        }
        Datatype::Missing => {
            if let Some(content) = content {
                return Ok(Some((plain(content.to_string(), language), false)));
            }
            // RDFa 1.0 decides structurally: the value is an XML literal
            // unless the children are present and purely text. RDFa 1.1
            // always takes the text.
            let structural_xml = version == Version::Rdfa10
                && (element.children().next().is_none()
                    || element
                        .children()
                        .any(|child| !matches!(child.value(), Node::Text(_))));
            if structural_xml {
                let fragment = xml_fragment(element, language, namespaces);
                Ok(Some((
                    Literal::new_typed_literal(fragment, rdf::XML_LITERAL),
                    true,
                )))
            } else {
                Ok(Some((plain(text_content(element), language), false)))
            }
        }
    }
}

fn plain(lexical: String, language: Option<&LanguageIdentifier>) -> Literal {
    match language {
        Some(language) => {
            Literal::new_language_tagged_literal_unchecked(lexical, language.to_string())
        }
        None => Literal::new_simple_literal(lexical),
    }
}

fn text_content(element: ElementRef<'_>) -> String {
    element.text().join("")
}

/// Validates the lexical form of recognized XSD datatypes, rewriting it to
/// the canonical form when asked. Unrecognized datatypes pass through.
fn checked_lexical(
    datatype: &NamedNode,
    lexical: String,
    canonicalize: bool,
) -> Result<String, Error> {
    fn check<T: FromStr + ToString>(
        lexical: String,
        canonicalize: bool,
    ) -> Result<String, Error> {
        match lexical.trim().parse::<T>() {
            Ok(value) if canonicalize => Ok(value.to_string()),
            Ok(_) => Ok(lexical),
            Err(_) => Err(Error::Literal(lexical)),
        }
    }

    match datatype.as_ref() {
        t if t == xsd::BOOLEAN => check::<oxsdatatypes::Boolean>(lexical, canonicalize),
        t if t == xsd::INTEGER => check::<oxsdatatypes::Integer>(lexical, canonicalize),
        t if t == xsd::DECIMAL => check::<oxsdatatypes::Decimal>(lexical, canonicalize),
        t if t == xsd::DOUBLE => check::<oxsdatatypes::Double>(lexical, canonicalize),
        t if t == xsd::FLOAT => check::<oxsdatatypes::Float>(lexical, canonicalize),
        t if t == xsd::DATE_TIME => check::<oxsdatatypes::DateTime>(lexical, canonicalize),
        t if t == xsd::DATE => check::<oxsdatatypes::Date>(lexical, canonicalize),
        t if t == xsd::TIME => check::<oxsdatatypes::Time>(lexical, canonicalize),
        t if t == xsd::DURATION => check::<oxsdatatypes::Duration>(lexical, canonicalize),
        _ => Ok(lexical),
    }
}

/// Serializes the element's child nodes as markup. In-scope namespace
/// declarations and the current language are re-declared on each top-level
/// child element so the fragment stands on its own.
fn xml_fragment(
    element: ElementRef<'_>,
    language: Option<&LanguageIdentifier>,
    namespaces: &IndexMap<String, String>,
) -> String {
    let mut out = String::new();
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(&escape_text(text)),
            Node::Comment(comment) => {
                let _ = write!(out, "<!--{}-->", &**comment);
            }
            Node::Element(_) => {
                let Some(child) = ElementRef::wrap(child) else {
                    continue;
                };
                serialize_element(&mut out, child, language, namespaces);
            }
            _ => {}
        }
    }
    out
}

fn serialize_element(
    out: &mut String,
    element: ElementRef<'_>,
    language: Option<&LanguageIdentifier>,
    namespaces: &IndexMap<String, String>,
) {
    let value = element.value();
    let name = value.name();
    let _ = write!(out, "<{name}");

    let mut declared_default = false;
    let mut declared = Vec::new();
    for (qualified, attr_value) in &value.attrs {
        match qualified.prefix.as_deref() {
            Some("xmlns") => declared.push(&*qualified.local),
            None if &*qualified.local == "xmlns" => declared_default = true,
            _ => {}
        }
        let _ = match qualified.prefix.as_deref() {
            Some(prefix) => write!(
                out,
                " {prefix}:{}=\"{}\"",
                qualified.local,
                escape_attr(attr_value)
            ),
            None => write!(out, " {}=\"{}\"", qualified.local, escape_attr(attr_value)),
        };
    }
    for (prefix, namespace) in namespaces {
        if prefix.is_empty() {
            if !declared_default {
                let _ = write!(out, " xmlns=\"{}\"", escape_attr(namespace));
            }
        } else if !declared.contains(&prefix.as_str()) {
            let _ = write!(out, " xmlns:{prefix}=\"{}\"", escape_attr(namespace));
        }
    }
    if let Some(language) = language {
        if value.attr("xml:lang").is_none() && value.attr("lang").is_none() {
            let _ = write!(out, " xml:lang=\"{language}\"");
        }
    }

    let _ = write!(out, ">{}</{name}>", element.inner_html());
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attr(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    fn with_element<R>(html: &str, selector: &str, f: impl FnOnce(ElementRef<'_>) -> R) -> R {
        let document = Html::parse_document(html);
        let selector = Selector::parse(selector).unwrap();
        f(document.select(&selector).next().unwrap())
    }

    #[test]
    fn plain_literal_from_text_content() {
        with_element("<p><span>Albert <b>Einstein</b></span></p>", "span", |el| {
            let (literal, suppress) = build_literal(
                el,
                None,
                Datatype::Missing,
                None,
                Version::Rdfa11,
                &IndexMap::new(),
                false,
            )
            .unwrap()
            .unwrap();
            assert_eq!(literal, Literal::new_simple_literal("Albert Einstein"));
            assert!(!suppress);
        });
    }

    #[test]
    fn content_attribute_wins_over_text() {
        with_element("<p><span>visible</span></p>", "span", |el| {
            let (literal, _) = build_literal(
                el,
                None,
                Datatype::Missing,
                Some("hidden"),
                Version::Rdfa11,
                &IndexMap::new(),
                false,
            )
            .unwrap()
            .unwrap();
            assert_eq!(literal, Literal::new_simple_literal("hidden"));
        });
    }

    #[test]
    fn typed_literal_validates_lexical_form() {
        with_element("<p><span>42</span></p>", "span", |el| {
            let (literal, _) = build_literal(
                el,
                None,
                Datatype::Iri(xsd::INTEGER.into_owned()),
                None,
                Version::Rdfa11,
                &IndexMap::new(),
                false,
            )
            .unwrap()
            .unwrap();
            assert_eq!(
                literal,
                Literal::new_typed_literal("42", xsd::INTEGER)
            );
        });
        with_element("<p><span>forty-two</span></p>", "span", |el| {
            let result = build_literal(
                el,
                None,
                Datatype::Iri(xsd::INTEGER.into_owned()),
                None,
                Version::Rdfa11,
                &IndexMap::new(),
                false,
            );
            assert!(matches!(result, Err(Error::Literal(_))));
        });
    }

    #[test]
    fn canonicalize_rewrites_lexical_form() {
        with_element("<p><span>042</span></p>", "span", |el| {
            let (literal, _) = build_literal(
                el,
                None,
                Datatype::Iri(xsd::INTEGER.into_owned()),
                None,
                Version::Rdfa11,
                &IndexMap::new(),
                true,
            )
            .unwrap()
            .unwrap();
            assert_eq!(literal, Literal::new_typed_literal("42", xsd::INTEGER));
        });
    }

    #[test]
    fn empty_datatype_keeps_language() {
        let language: LanguageIdentifier = "en".parse().unwrap();
        with_element("<p><span><b>bold</b></span></p>", "span", |el| {
            let (literal, suppress) = build_literal(
                el,
                Some(&language),
                Datatype::Empty,
                None,
                Version::Rdfa10,
                &IndexMap::new(),
                false,
            )
            .unwrap()
            .unwrap();
            assert_eq!(
                literal,
                Literal::new_language_tagged_literal_unchecked("bold", "en")
            );
            assert!(!suppress);
        });
    }

    #[test]
    fn explicit_xml_literal_keeps_markup() {
        with_element("<p><span>Two <b>bold</b> words</span></p>", "span", |el| {
            let (literal, suppress) = build_literal(
                el,
                None,
                Datatype::Iri(rdf::XML_LITERAL.into_owned()),
                None,
                Version::Rdfa11,
                &IndexMap::new(),
                false,
            )
            .unwrap()
            .unwrap();
            assert_eq!(literal.value(), "Two <b>bold</b> words");
            assert_eq!(literal.datatype(), rdf::XML_LITERAL);
            assert!(suppress);
        });
    }

    #[test]
    fn rdfa_10_promotes_markup_to_xml_literal() {
        with_element("<p><span>Two <b>bold</b> words</span></p>", "span", |el| {
            let (literal, suppress) = build_literal(
                el,
                None,
                Datatype::Missing,
                None,
                Version::Rdfa10,
                &IndexMap::new(),
                false,
            )
            .unwrap()
            .unwrap();
            assert_eq!(literal.datatype(), rdf::XML_LITERAL);
            assert!(suppress);
        });
        // Same markup under 1.1 flattens to text.
        with_element("<p><span>Two <b>bold</b> words</span></p>", "span", |el| {
            let (literal, suppress) = build_literal(
                el,
                None,
                Datatype::Missing,
                None,
                Version::Rdfa11,
                &IndexMap::new(),
                false,
            )
            .unwrap()
            .unwrap();
            assert_eq!(literal, Literal::new_simple_literal("Two bold words"));
            assert!(!suppress);
        });
    }

    #[test]
    fn rdfa_10_childless_elements_are_xml_literals() {
        with_element("<p><span></span></p>", "span", |el| {
            let (literal, suppress) = build_literal(
                el,
                None,
                Datatype::Missing,
                None,
                Version::Rdfa10,
                &IndexMap::new(),
                false,
            )
            .unwrap()
            .unwrap();
            assert_eq!(literal, Literal::new_typed_literal("", rdf::XML_LITERAL));
            assert!(suppress);
        });
        with_element("<p><span></span></p>", "span", |el| {
            let (literal, _) = build_literal(
                el,
                None,
                Datatype::Missing,
                None,
                Version::Rdfa11,
                &IndexMap::new(),
                false,
            )
            .unwrap()
            .unwrap();
            assert_eq!(literal, Literal::new_simple_literal(""));
        });
    }

    #[test]
    fn fragment_redeclares_in_scope_namespaces() {
        let mut namespaces = IndexMap::new();
        namespaces.insert(
            "ex".to_string(),
            "http://example.org/ns#".to_string(),
        );
        with_element("<p><span>a <b>b</b></span></p>", "span", |el| {
            let (literal, _) = build_literal(
                el,
                None,
                Datatype::Iri(rdf::XML_LITERAL.into_owned()),
                None,
                Version::Rdfa11,
                &namespaces,
                false,
            )
            .unwrap()
            .unwrap();
            assert_eq!(
                literal.value(),
                "a <b xmlns:ex=\"http://example.org/ns#\">b</b>"
            );
        });
    }

    #[test]
    fn fragment_escapes_text() {
        with_element("<p><span>1 &lt; 2 &amp; 3</span></p>", "span", |el| {
            let (literal, _) = build_literal(
                el,
                None,
                Datatype::Iri(rdf::XML_LITERAL.into_owned()),
                None,
                Version::Rdfa11,
                &IndexMap::new(),
                false,
            )
            .unwrap()
            .unwrap();
            assert_eq!(literal.value(), "1 &lt; 2 &amp; 3");
        });
    }
}
