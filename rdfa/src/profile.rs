//! RDFa profile documents: externally supplied prefix, term and vocabulary
//! definitions referenced through `@profile`.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use oxrdf::NamedNode;

use crate::trace;

/// The mappings a profile document contributes. Definitions from a profile
/// are merged into the current context, later-declared profiles taking
/// precedence, local attributes over all of them.
#[derive(Clone, Debug, Default)]
pub struct Profile {
    pub prefixes: BTreeMap<String, String>,
    pub terms: BTreeMap<String, NamedNode>,
    pub vocabulary: Option<NamedNode>,
}

#[derive(derive_more::Error, derive_more::Display, Debug)]
#[display("profile {iri} unavailable: {reason}")]
pub struct ProfileError {
    pub iri: String,
    pub reason: String,
}

/// Fetches profile documents by IRI. Transport is out of scope for the
/// parser itself; implement this to plug in whatever retrieval the
/// application has.
pub trait ProfileLoader {
    fn load(&self, iri: &str) -> Result<Profile, ProfileError>;
}

/// The default loader: every reference fails, so any subtree with a
/// `@profile` attribute is pruned (or aborts the parse in validation mode).
pub(crate) struct NoProfiles;

impl ProfileLoader for NoProfiles {
    fn load(&self, iri: &str) -> Result<Profile, ProfileError> {
        Err(ProfileError {
            iri: iri.to_string(),
            reason: "no profile loader configured".to_string(),
        })
    }
}

/// A fixed in-memory profile set.
pub struct StaticProfiles(BTreeMap<String, Profile>);

impl StaticProfiles {
    pub fn new(profiles: impl IntoIterator<Item = (String, Profile)>) -> Self {
        Self(profiles.into_iter().collect())
    }
}

impl ProfileLoader for StaticProfiles {
    fn load(&self, iri: &str) -> Result<Profile, ProfileError> {
        self.0.get(iri).cloned().ok_or_else(|| ProfileError {
            iri: iri.to_string(),
            reason: "not a known profile".to_string(),
        })
    }
}

/// Caching front end over a [`ProfileLoader`]. Successful loads are cached
/// for the lifetime of the parser; failures are retried, since they may be
/// transient.
pub(crate) struct ProfileResolver {
    loader: Box<dyn ProfileLoader>,
    cache: RefCell<BTreeMap<String, Rc<Profile>>>,
}

impl ProfileResolver {
    pub fn new(loader: Box<dyn ProfileLoader>) -> Self {
        Self {
            loader,
            cache: RefCell::new(BTreeMap::new()),
        }
    }

    /// `iri` must already be absolutized against the document base.
    pub fn resolve(&self, iri: &str) -> Result<Rc<Profile>, ProfileError> {
        if let Some(profile) = self.cache.borrow().get(iri) {
            return Ok(Rc::clone(profile));
        }
        trace!("loading profile {iri}");
        let profile = Rc::new(self.loader.load(iri)?);
        self.cache
            .borrow_mut()
            .insert(iri.to_string(), Rc::clone(&profile));
        Ok(profile)
    }
}
