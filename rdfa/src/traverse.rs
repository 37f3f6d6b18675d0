//! The recursive processing pass over the document tree.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::OnceLock;

use icu::locale::LanguageIdentifier;
use itertools::Itertools;
use oxiri::Iri;
use oxrdf::vocab::rdf;
use oxrdf::{
    BlankNode, NamedNode, NamedNodeRef, NamedOrBlankNode, NamedOrBlankNodeRef, TermRef, TripleRef,
};
use scraper::{ElementRef, Html, Selector};

use crate::context::{strip_fragment, EvaluationContext, IncompleteTriple};
use crate::literal::{build_literal, Datatype};
use crate::profile::ProfileResolver;
use crate::resolve::{register_prefix, Policy, Resolved, Resolver};
use crate::{
    trace, Diagnostic, Error, HostDefaults, HostLanguage, Options, Severity, TripleSink, Version,
};

pub(crate) fn parse_document<'a>(
    options: &'a Options,
    profiles: &'a ProfileResolver,
    input: &str,
    base: Iri<String>,
    sink: &'a mut dyn TripleSink,
    diagnostics: Option<&'a mut dyn FnMut(Diagnostic)>,
) -> Result<(), Error> {
    if input.trim().is_empty() {
        return Err(Error::Document("empty input".to_string()));
    }
    let document = Html::parse_document(input);

    // A document <base href> overrides the caller's base, fragment removed.
    let mut base = strip_fragment(&base);
    let mut base_error = None;
    if options.host_language == HostLanguage::HeadBody {
        static BASE: OnceLock<Selector> = OnceLock::new();
        let selector = BASE.get_or_init(|| Selector::parse("html>head>base").expect("selector"));
        if let Some(href) = document
            .select(selector)
            .next()
            .and_then(|element| element.value().attr("href"))
        {
            match base.resolve(href.trim()) {
                Ok(resolved) => base = strip_fragment(&resolved),
                Err(_) => base_error = Some(Error::MalformedUri(href.to_string())),
            }
        }
    }

    let session = Session {
        options,
        host: options.host_language.defaults(),
        profiles,
        document_base: base.clone(),
        sink: RefCell::new(sink),
        diagnostics: RefCell::new(diagnostics),
        bnodes: RefCell::new(BTreeMap::new()),
        interner: options.intern.then(|| RefCell::new(BTreeMap::new())),
    };

    if options.validate {
        for error in &document.errors {
            session.report("document", Severity::Warning, format!("markup error: {error}"));
        }
    }
    if let Some(error) = base_error {
        session.handle("html>head>base", error)?;
    }

    let ctx = Rc::new(EvaluationContext::root(&base, &session.host));
    session.traverse(document.root_element(), &ctx, "", 0)
}

struct Session<'a> {
    options: &'a Options,
    host: HostDefaults,
    profiles: &'a ProfileResolver,
    /// The document's own IRI, for skipping self-referential profiles.
    document_base: Iri<String>,
    sink: RefCell<&'a mut dyn TripleSink>,
    diagnostics: RefCell<Option<&'a mut dyn FnMut(Diagnostic)>>,
    bnodes: RefCell<BTreeMap<String, BlankNode>>,
    interner: Option<RefCell<BTreeMap<String, NamedNode>>>,
}

impl Session<'_> {
    fn report(&self, location: &str, severity: Severity, message: String) {
        if let Some(callback) = self.diagnostics.borrow_mut().as_mut() {
            callback(Diagnostic {
                location: location.to_string(),
                severity,
                message,
            });
        }
    }

    /// Reports a processing problem; decides whether it also stops the
    /// parse. Validation mode makes every reported error fatal; otherwise
    /// only document-level failures do.
    fn handle(&self, location: &str, error: Error) -> Result<(), Error> {
        self.report(location, error.severity(), error.to_string());
        if error.always_fatal() || self.options.validate {
            Err(error)
        } else {
            Ok(())
        }
    }

    fn emit(&self, subject: &NamedOrBlankNode, predicate: NamedNodeRef<'_>, object: TermRef<'_>) {
        trace!("emit {subject} {predicate} {object}");
        self.sink
            .borrow_mut()
            .triple(TripleRef::new(subject, predicate, object));
    }

    fn resolve_node(
        &self,
        resolver: &Resolver<'_>,
        location: &str,
        value: &str,
        policy: Policy,
    ) -> Result<Option<NamedOrBlankNode>, Error> {
        match resolver.resolve(value.trim(), policy) {
            Resolved::Node(node) => Ok(Some(node)),
            Resolved::Dropped(error) => {
                self.handle(location, error)?;
                Ok(None)
            }
            Resolved::Unmatched => Ok(None),
        }
    }

    /// Whitespace-separated attribute values that must each denote an IRI.
    /// Blank nodes and unclaimed values vanish; dropped values are
    /// reported.
    fn resolve_iris(
        &self,
        resolver: &Resolver<'_>,
        location: &str,
        value: &str,
        policy: Policy,
    ) -> Result<Vec<NamedNode>, Error> {
        let mut iris = Vec::new();
        for item in value.split_whitespace() {
            match resolver.resolve_iri(item, policy) {
                Ok(Some(iri)) => iris.push(iri),
                Ok(None) => {}
                Err(error) => self.handle(location, error)?,
            }
        }
        Ok(iris)
    }

    /// An element that acts as if it carried an empty `about`.
    fn is_root_container(&self, name: &str, depth: usize) -> bool {
        match self.options.host_language {
            HostLanguage::HeadBody => matches!(name, "head" | "body"),
            HostLanguage::Generic => depth == 0,
        }
    }

    fn traverse(
        &self,
        element: ElementRef<'_>,
        ctx: &Rc<EvaluationContext>,
        path: &str,
        depth: usize,
    ) -> Result<(), Error> {
        let name = element.value().name();
        let location = if path.is_empty() {
            name.to_string()
        } else {
            format!("{path}>{name}")
        };
        if depth > self.options.max_depth {
            return self.handle(&location, Error::DepthExceeded(self.options.max_depth));
        }

        let attr = |name: &str| element.value().attr(name);

        // Step 1: working copies of the inherited state.
        let mut base = ctx.base.clone();
        let mut uri_mappings = Rc::clone(&ctx.uri_mappings);
        let mut term_mappings = Rc::clone(&ctx.term_mappings);
        let mut namespaces = Rc::clone(&ctx.namespaces);
        let mut vocabulary = ctx.default_vocabulary.clone();
        let mut language = ctx.language.clone();

        if self.options.host_language == HostLanguage::Generic {
            if let Some(value) = attr("xml:base") {
                match base.resolve(value.trim()) {
                    Ok(resolved) => base = strip_fragment(&resolved),
                    Err(_) => self.handle(&location, Error::MalformedUri(value.to_string()))?,
                }
            }
        }

        // Step 2: profiles, processed right to left so that
        // earlier-declared profiles overwrite later ones. A reference that
        // cannot be honored withholds the whole subtree.
        if self.options.version == Version::Rdfa11 {
            if let Some(value) = attr("profile") {
                for reference in value.split_whitespace().rev() {
                    let iri = match base.resolve(reference) {
                        Ok(iri) => iri,
                        Err(_) => {
                            self.handle(
                                &location,
                                Error::ProfileReference(reference.to_string()),
                            )?;
                            return Ok(());
                        }
                    };
                    if iri.as_str() == self.document_base.as_str() {
                        trace!("skipping self-referential profile <{iri}>");
                        continue;
                    }
                    let profile = match self.profiles.resolve(iri.as_str()) {
                        Ok(profile) => profile,
                        Err(error) => {
                            self.handle(&location, Error::ProfileReference(error.to_string()))?;
                            return Ok(());
                        }
                    };
                    self.report(
                        &location,
                        Severity::Info,
                        format!("loaded profile <{iri}>"),
                    );
                    if !profile.prefixes.is_empty() {
                        let mappings = Rc::make_mut(&mut uri_mappings);
                        for (prefix, namespace) in &profile.prefixes {
                            if prefix.is_empty() {
                                mappings.set_default(namespace);
                            } else {
                                let _ = mappings.add_prefix(prefix, namespace);
                                register_prefix(prefix, namespace);
                            }
                        }
                    }
                    if !profile.terms.is_empty() {
                        let terms = Rc::make_mut(&mut term_mappings);
                        for (term, iri) in &profile.terms {
                            terms.insert(term.clone(), iri.clone());
                        }
                    }
                    if let Some(profile_vocabulary) = &profile.vocabulary {
                        vocabulary = Some(profile_vocabulary.clone());
                    }
                }
            }

            // Step 3: @vocab; an empty value resets to the host default.
            if let Some(value) = attr("vocab") {
                if value.trim().is_empty() {
                    vocabulary = self.host.vocabulary.clone();
                } else {
                    match base.resolve(value.trim()) {
                        Ok(iri) => vocabulary = Some(NamedNode::new_unchecked(iri.into_inner())),
                        Err(_) => {
                            self.handle(&location, Error::MalformedUri(value.to_string()))?
                        }
                    }
                }
            }
        }

        // Step 4: xmlns declarations, then @prefix (1.1 only). Namespace
        // IRIs are taken verbatim; they are not resolved against the base.
        for (qualified, value) in &element.value().attrs {
            let qualified_name = match qualified.prefix.as_deref() {
                Some(prefix) => format!("{prefix}:{}", qualified.local),
                None => (*qualified.local).to_string(),
            };
            if let Some(prefix) = qualified_name.strip_prefix("xmlns:") {
                if prefix == "_" || value.is_empty() {
                    continue;
                }
                let prefix = if self.options.version == Version::Rdfa11 {
                    prefix.to_ascii_lowercase()
                } else {
                    prefix.to_string()
                };
                let _ = Rc::make_mut(&mut uri_mappings).add_prefix(&prefix, value);
                register_prefix(&prefix, value);
                Rc::make_mut(&mut namespaces)
                    .entry(prefix)
                    .or_insert_with(|| value.to_string());
            } else if qualified_name == "xmlns" && !value.is_empty() {
                Rc::make_mut(&mut namespaces)
                    .entry(String::new())
                    .or_insert_with(|| value.to_string());
            }
        }
        if self.options.version == Version::Rdfa11 {
            if let Some(value) = attr("prefix") {
                for (declaration, namespace) in value.split_whitespace().tuples() {
                    let Some(prefix) = declaration.strip_suffix(':') else {
                        continue;
                    };
                    let prefix = prefix.to_ascii_lowercase();
                    if prefix == "_" {
                        continue;
                    }
                    let mappings = Rc::make_mut(&mut uri_mappings);
                    if prefix.is_empty() {
                        mappings.set_default(namespace);
                    } else {
                        let _ = mappings.add_prefix(&prefix, namespace);
                        register_prefix(&prefix, namespace);
                    }
                }
            }
        }

        // Step 5: language, xml:lang over lang; an empty value clears it.
        if let Some(value) = attr("xml:lang").or_else(|| attr("lang")) {
            if value.trim().is_empty() {
                language = None;
            } else {
                match value.trim().parse::<LanguageIdentifier>() {
                    Ok(lang) => language = Some(Rc::new(lang)),
                    Err(_) => self.report(
                        &location,
                        Severity::Warning,
                        format!("unusable language tag {value:?}"),
                    ),
                }
            }
        }

        let resolver = Resolver {
            version: self.options.version,
            base: &base,
            mappings: &uri_mappings,
            terms: &term_mappings,
            vocabulary: vocabulary.as_ref(),
            host_prefix: self.host.prefix,
            bnodes: &self.bnodes,
            anon: &ctx.anon_bnode,
            interner: self.interner.as_ref(),
        };

        let has_rel = attr("rel").is_some();
        let has_rev = attr("rev").is_some();
        let type_of = attr("typeof");

        let rels = match attr("rel") {
            Some(value) => {
                self.resolve_iris(&resolver, &location, value, Policy::TermOrCurieOrAbsUri)?
            }
            None => Vec::new(),
        };
        let revs = match attr("rev") {
            Some(value) => {
                self.resolve_iris(&resolver, &location, value, Policy::TermOrCurieOrAbsUri)?
            }
            None => Vec::new(),
        };

        let mut skip = false;
        let mut new_subject: Option<NamedOrBlankNode> = None;
        let mut current_object_resource: Option<NamedOrBlankNode> = None;

        if !has_rel && !has_rev {
            // Step 6: subject from the first resource attribute present.
            new_subject = if let Some(value) = attr("about") {
                self.resolve_node(&resolver, &location, value, Policy::SafeCurieOrCurieOrUri)?
            } else if let Some(value) = attr("src") {
                self.resolve_node(&resolver, &location, value, Policy::UriOnly)?
            } else if let Some(value) = attr("resource") {
                self.resolve_node(&resolver, &location, value, Policy::SafeCurieOrCurieOrUri)?
            } else if let Some(value) = attr("href") {
                self.resolve_node(&resolver, &location, value, Policy::UriOnly)?
            } else {
                None
            };
            if new_subject.is_none() {
                if self.is_root_container(name, depth) {
                    new_subject = Some(NamedNode::new_unchecked(base.as_str()).into());
                } else if type_of.is_some() {
                    new_subject = Some(BlankNode::default().into());
                } else {
                    new_subject = ctx.parent_object.as_deref().cloned();
                    if attr("property").is_none() {
                        skip = true;
                    }
                }
            }
            trace!("[step 6] new_subject: {new_subject:?}, skip: {skip}");
        } else {
            // Step 7: with rel/rev the subject comes from about/src only;
            // resource/href name the object instead.
            if let Some(value) = attr("about") {
                new_subject =
                    self.resolve_node(&resolver, &location, value, Policy::SafeCurieOrCurieOrUri)?;
            }
            if new_subject.is_none() {
                if let Some(value) = attr("src") {
                    new_subject = self.resolve_node(&resolver, &location, value, Policy::UriOnly)?;
                }
            }
            if new_subject.is_none() {
                if self.is_root_container(name, depth) {
                    new_subject = Some(NamedNode::new_unchecked(base.as_str()).into());
                } else if type_of.is_some() {
                    new_subject = Some(BlankNode::default().into());
                } else {
                    new_subject = ctx.parent_object.as_deref().cloned();
                }
            }
            current_object_resource = if let Some(value) = attr("resource") {
                self.resolve_node(&resolver, &location, value, Policy::SafeCurieOrCurieOrUri)?
            } else if let Some(value) = attr("href") {
                self.resolve_node(&resolver, &location, value, Policy::UriOnly)?
            } else {
                None
            };
            trace!("[step 7] new_subject: {new_subject:?}, object: {current_object_resource:?}");
        }

        // Step 8: type assertions.
        if let (Some(subject), Some(value)) = (&new_subject, type_of) {
            let types =
                self.resolve_iris(&resolver, &location, value, Policy::TermOrCurieOrAbsUri)?;
            for one_type in types {
                self.emit(subject, rdf::TYPE, one_type.as_ref().into());
            }
        }

        // Steps 9 and 10: rel/rev triples, or incomplete triples plus a
        // provisional blank node for descendants to hang off when no
        // object is given yet.
        let mut incomplete = Vec::new();
        if let Some(object) = &current_object_resource {
            if let Some(subject) = &new_subject {
                for predicate in &rels {
                    self.emit(
                        subject,
                        predicate.as_ref(),
                        NamedOrBlankNodeRef::from(object).into(),
                    );
                }
                for predicate in &revs {
                    self.emit(
                        object,
                        predicate.as_ref(),
                        NamedOrBlankNodeRef::from(subject).into(),
                    );
                }
            }
        } else if has_rel || has_rev {
            current_object_resource = Some(BlankNode::default().into());
            for predicate in rels {
                incomplete.push(IncompleteTriple::Forward(predicate));
            }
            for predicate in revs {
                incomplete.push(IncompleteTriple::Reverse(predicate));
            }
        }

        // Step 11: the object literal. Built whenever @property is
        // present, since an XML literal consumes the subtree even when
        // every predicate failed to resolve.
        let mut suppress_children = false;
        if let Some(property) = attr("property") {
            let properties = self.resolve_iris(
                &resolver,
                &location,
                property,
                Policy::TermOrCurieOrAbsUriProp,
            )?;
            let datatype = match attr("datatype") {
                None => Datatype::Missing,
                Some(value) if value.trim().is_empty() => Datatype::Empty,
                Some(value) => {
                    match resolver.resolve_iri(value.trim(), Policy::TermOrCurieOrAbsUri) {
                        Ok(Some(iri)) => Datatype::Iri(iri),
                        Ok(None) => Datatype::Missing,
                        Err(error) => {
                            self.handle(&location, error)?;
                            Datatype::Missing
                        }
                    }
                }
            };
            match build_literal(
                element,
                language.as_deref(),
                datatype,
                attr("content"),
                self.options.version,
                &namespaces,
                self.options.canonicalize,
            ) {
                Ok(Some((literal, suppress))) => {
                    suppress_children = suppress;
                    if let Some(subject) = &new_subject {
                        for predicate in &properties {
                            self.emit(subject, predicate.as_ref(), literal.as_ref().into());
                        }
                    }
                }
                Ok(None) => {}
                Err(error) => self.handle(&location, error)?,
            }
        }

        // Step 12: this element's subject completes the triples its
        // ancestor left hanging.
        if !skip {
            if let Some(subject) = &new_subject {
                for hanging in &ctx.incomplete_triples {
                    match hanging {
                        IncompleteTriple::Forward(predicate) => self.emit(
                            &ctx.parent_subject,
                            predicate.as_ref(),
                            NamedOrBlankNodeRef::from(subject).into(),
                        ),
                        IncompleteTriple::Reverse(predicate) => self.emit(
                            subject,
                            predicate.as_ref(),
                            NamedOrBlankNodeRef::from(&*ctx.parent_subject).into(),
                        ),
                    }
                }
            }
        }

        // Step 13: recurse with the derived context.
        if suppress_children {
            return Ok(());
        }
        let child_ctx = if skip {
            let candidate = EvaluationContext {
                base,
                parent_subject: Rc::clone(&ctx.parent_subject),
                parent_object: ctx.parent_object.clone(),
                uri_mappings,
                term_mappings,
                default_vocabulary: vocabulary,
                language,
                incomplete_triples: ctx.incomplete_triples.clone(),
                namespaces,
                anon_bnode: ctx.anon_bnode.clone(),
            };
            if ctx.matches_locals(&candidate) {
                trace!("[step 13] skip: reusing inherited context");
                Rc::clone(ctx)
            } else {
                Rc::new(candidate)
            }
        } else {
            let parent_subject = match new_subject {
                Some(subject) => Rc::new(subject),
                None => Rc::clone(&ctx.parent_subject),
            };
            let parent_object = match current_object_resource {
                Some(object) => Rc::new(object),
                None => Rc::clone(&parent_subject),
            };
            Rc::new(EvaluationContext {
                base,
                parent_subject,
                parent_object: Some(parent_object),
                uri_mappings,
                term_mappings,
                default_vocabulary: vocabulary,
                language,
                incomplete_triples: incomplete,
                namespaces,
                anon_bnode: ctx.anon_bnode.clone(),
            })
        };
        for child in element.children().filter_map(ElementRef::wrap) {
            self.traverse(child, &child_ctx, &location, depth + 1)?;
        }
        Ok(())
    }
}
