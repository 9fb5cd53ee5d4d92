use std::borrow::Cow;
use std::fmt::{self, Display, Formatter};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::marker::PhantomData;
use std::path::Path;

use tracing::{error, instrument, warn};

use super::typestate::{CorpusBuildState, HasItems, HasName, NoItems, NoName};
use super::{Corpus, CorpusType, Named};
use crate::error::SiegelineError;

/// generic container representing an in-memory wordlist
///
/// # Examples
///
/// ```
/// # use siegeline::corpora::Wordlist;
/// # use siegeline::corpora::Corpus;
/// let wordlist = Wordlist::new().word("1").word("2").name("users").build();
///
/// assert_eq!(wordlist.len(), 2);
/// ```
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct Wordlist {
    items: Vec<String>,
    corpus_name: String,
}

/// general `Wordlist` implementation
impl Wordlist {
    /// create a default (empty) `WordlistBuilder`
    ///
    /// # Note
    ///
    /// `WordlistBuilder::build` can only be called after `WordlistBuilder::name` and
    /// `WordlistBuilder::word` or `WordlistBuilder::words` have been called.
    ///
    /// There are other constructors to immediately provide the corpus items, if desired.
    ///
    /// - [`Wordlist::with_words`]
    /// - [`Wordlist::from_file`]
    #[must_use]
    #[allow(clippy::new_ret_no_self)]
    pub const fn new() -> WordlistBuilder<NoItems, NoName> {
        WordlistBuilder {
            items: Vec::new(),
            corpus_name: None,
            _item_state: PhantomData,
            _name_state: PhantomData,
        }
    }

    /// given a collection of items, create a new `WordlistBuilder`
    ///
    /// # Examples
    ///
    /// ```
    /// # use siegeline::corpora::Wordlist;
    /// let wordlist = Wordlist::with_words(["1", "2", "3"]).name("pins").build();
    /// ```
    #[inline]
    pub fn with_words<I, T>(words: I) -> WordlistBuilder<HasItems, NoName>
    where
        T: Into<String>,
        I: IntoIterator<Item = T>,
    {
        WordlistBuilder {
            items: words.into_iter().map(Into::into).collect(),
            corpus_name: None,
            _item_state: PhantomData,
            _name_state: PhantomData,
        }
    }

    /// Populates a `Wordlist` with candidate values out of the file with the
    /// path given by `file_path`
    ///
    /// lines are trimmed of surrounding whitespace; lines that are empty after
    /// trimming are skipped. A file that yields no values at all is allowed
    /// (the resulting corpus simply produces zero combinations for its field),
    /// though it's likely a mistake, so a warning is logged.
    ///
    /// # Errors
    ///
    /// a missing or unreadable file returns an error variant
    ///
    /// # Examples
    ///
    /// ```
    /// # use std::fs;
    /// # use siegeline::corpora::{Corpus, Wordlist};
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let file_name = "smol-wordlist.txt";
    /// fs::write(file_name, "one\ntwo\n\n\nfour\n");
    ///
    /// let wordlist = Wordlist::from_file(file_name)?.name("words").build();
    ///
    /// fs::remove_file(file_name);
    ///
    /// assert_eq!(wordlist.len(), 3);
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all, level = "trace")]
    pub fn from_file<P>(file_path: P) -> Result<WordlistBuilder<HasItems, NoName>, SiegelineError>
    where
        P: AsRef<Path>,
    {
        let file = File::open(&file_path).map_err(|source| {
            error!(
                file = file_path.as_ref().to_string_lossy().to_string(),
                "could not open file while populating the wordlist: {}", source
            );

            SiegelineError::WordlistFileOpenError {
                source,
                path: file_path.as_ref().to_string_lossy().to_string(),
            }
        })?;

        let reader = BufReader::new(file);

        let mut items = Vec::new();

        for line in reader.lines().map_while(Result::ok) {
            let trimmed = line.trim();

            if trimmed.is_empty() {
                // skip blank lines
                continue;
            }

            items.push(trimmed.to_string());
        }

        if items.is_empty() {
            warn!(
                file = file_path.as_ref().to_string_lossy().to_string(),
                "wordlist file contained no usable values; its field will produce no combinations"
            );
        }

        Ok(WordlistBuilder {
            items,
            corpus_name: None,
            _item_state: PhantomData,
            _name_state: PhantomData,
        })
    }

    /// get a reference to the inner collection of candidate values
    #[inline]
    #[must_use]
    pub fn items(&self) -> &[String] {
        &self.items
    }
}

impl Display for Wordlist {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Wordlist::{{name={}, len={}}}",
            self.corpus_name,
            self.items.len()
        )
    }
}

/// `Corpus` implementation for `Wordlist` with an inner `Vec`
impl Corpus for Wordlist {
    fn get(&self, index: usize) -> Option<Cow<'_, str>> {
        self.items.get(index).map(|item| Cow::from(item.as_str()))
    }

    #[inline]
    fn len(&self) -> usize {
        self.items.len()
    }
}

impl Named for Wordlist {
    #[inline]
    fn name(&self) -> &str {
        &self.corpus_name
    }
}

pub struct WordlistBuilder<ItemState, NameState>
where
    ItemState: CorpusBuildState,
    NameState: CorpusBuildState,
{
    items: Vec<String>,
    corpus_name: Option<String>,
    _item_state: PhantomData<ItemState>,
    _name_state: PhantomData<NameState>,
}

impl<ItemState> WordlistBuilder<ItemState, NoName>
where
    ItemState: CorpusBuildState,
{
    pub fn name(self, corpus_name: &str) -> WordlistBuilder<ItemState, HasName> {
        WordlistBuilder {
            items: self.items,
            corpus_name: Some(corpus_name.to_string()),
            _item_state: PhantomData,
            _name_state: PhantomData,
        }
    }
}

impl<ItemState, NameState> WordlistBuilder<ItemState, NameState>
where
    ItemState: CorpusBuildState,
    NameState: CorpusBuildState,
{
    pub fn word<T>(mut self, word: T) -> WordlistBuilder<HasItems, NameState>
    where
        T: Into<String>,
    {
        self.items.push(word.into());

        WordlistBuilder {
            items: self.items,
            corpus_name: self.corpus_name,
            _item_state: PhantomData,
            _name_state: PhantomData,
        }
    }

    pub fn words<I, T>(mut self, words: I) -> WordlistBuilder<HasItems, NameState>
    where
        T: Into<String>,
        I: IntoIterator<Item = T>,
    {
        self.items.extend(words.into_iter().map(Into::into));

        WordlistBuilder {
            items: self.items,
            corpus_name: self.corpus_name,
            _item_state: PhantomData,
            _name_state: PhantomData,
        }
    }
}

impl WordlistBuilder<HasItems, HasName> {
    pub fn build(self) -> CorpusType {
        CorpusType::Wordlist(Wordlist {
            items: self.items,
            corpus_name: self.corpus_name.unwrap(),
        })
    }
}

impl WordlistBuilder<NoItems, HasName> {
    pub fn build(self) -> CorpusType {
        CorpusType::Wordlist(Wordlist {
            items: Vec::new(),
            corpus_name: self.corpus_name.unwrap(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn wordlist_builder_with_both_word_methods() {
        let wordlist = Wordlist::new()
            .words(["one", "two", "three"])
            .word("four")
            .name("words")
            .build();

        assert_eq!(wordlist.len(), 4);
        assert_eq!(wordlist.get(0).unwrap(), "one");
        assert_eq!(wordlist.get(3).unwrap(), "four");
        assert_eq!(wordlist.name(), "words");
    }

    #[test]
    fn wordlist_builder_with_name_first() {
        let wordlist = Wordlist::new()
            .name("words")
            .words(["one", "two", "three"])
            .word("four")
            .build();

        assert_eq!(wordlist.len(), 4);
        assert_eq!(wordlist.name(), "words");
    }

    #[test]
    fn wordlist_from_file_trims_and_skips_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "admin\n  guest  \n\n   \nroot\n").unwrap();

        let wordlist = Wordlist::from_file(file.path()).unwrap().name("users").build();

        assert_eq!(wordlist.len(), 3);
        assert_eq!(wordlist.get(0).unwrap(), "admin");
        assert_eq!(wordlist.get(1).unwrap(), "guest");
        assert_eq!(wordlist.get(2).unwrap(), "root");
    }

    #[test]
    fn wordlist_from_missing_file_is_an_error() {
        let result = Wordlist::from_file("definitely/not/a/real/path.txt");
        assert!(result.is_err());
    }

    #[test]
    fn wordlist_from_empty_file_builds_a_zero_length_corpus() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "\n  \n\t\n").unwrap();

        let wordlist = Wordlist::from_file(file.path()).unwrap().name("empty").build();

        assert!(wordlist.is_empty());
    }
}
