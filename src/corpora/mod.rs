//! Value sources for brute-forced fields, modeled around where the candidate
//! values come from, i.e. a wordlist file, a generated character sequence...
mod charset;
mod wordlist;

use std::borrow::Cow;
use std::fmt::{self, Display, Formatter};

// re-exports
pub use self::charset::CharsetCorpus;
pub use self::wordlist::Wordlist;

/// named object; the name ties a corpus to the field it feeds
pub trait Named {
    /// get the name of the implementor
    fn name(&self) -> &str;
}

/// Ordered collection of candidate values for a single field
pub trait Corpus: Named {
    /// get the value at `index`, if one exists
    ///
    /// implementors may return borrowed or computed values, hence the [`Cow`]
    fn get(&self, index: usize) -> Option<Cow<'_, str>>;

    /// total number of values this corpus can produce
    #[must_use]
    fn len(&self) -> usize;

    /// true when the corpus has no values
    #[must_use]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// [`Corpus`] wrapper enum to facilitate static dispatch of [`Corpus`] methods
///
/// the methods/traits implemented by the underlying [`Corpus`] types are
/// implemented here as well, so the underlying types can be used seamlessly
/// through this wrapper.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum CorpusType {
    /// [`Wordlist`] wrapper
    Wordlist(Wordlist),

    /// [`CharsetCorpus`] wrapper
    Charset(CharsetCorpus),
}

/// [`Corpus`] implementation for [`CorpusType`] enum
impl Corpus for CorpusType {
    fn get(&self, index: usize) -> Option<Cow<'_, str>> {
        match self {
            Self::Wordlist(corpus) => corpus.get(index),
            Self::Charset(corpus) => corpus.get(index),
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Wordlist(corpus) => corpus.len(),
            Self::Charset(corpus) => corpus.len(),
        }
    }
}

impl Named for CorpusType {
    fn name(&self) -> &str {
        match self {
            Self::Wordlist(corpus) => corpus.name(),
            Self::Charset(corpus) => corpus.name(),
        }
    }
}

impl Display for CorpusType {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Self::Wordlist(corpus) => corpus.fmt(f),
            Self::Charset(corpus) => corpus.fmt(f),
        }
    }
}

mod typestate {
    // typestate information for the different corpus builders; not useful for anything else
    pub trait CorpusBuildState {}
    pub struct NoItems;
    pub struct NoName;
    pub struct HasItems;
    pub struct HasName;
    impl CorpusBuildState for NoItems {}
    impl CorpusBuildState for NoName {}
    impl CorpusBuildState for HasItems {}
    impl CorpusBuildState for HasName {}
}
