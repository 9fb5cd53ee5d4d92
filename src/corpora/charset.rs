use std::borrow::Cow;
use std::fmt::{self, Display, Formatter};
use std::marker::PhantomData;

use tracing::error;

use super::typestate::{CorpusBuildState, HasItems, HasName, NoItems, NoName};
use super::{Corpus, CorpusType, Named};
use crate::error::SiegelineError;

/// an implementor of the [`Corpus`] trait that produces every string of
/// exactly `length` characters drawn (with repetition) from `charset`
///
/// values are ordered lexicographically by charset position, with the last
/// position varying fastest (odometer order), and are decoded arithmetically
/// on demand rather than materialized up front. `generate:0123456789:6` can
/// enumerate all one million 6-digit codes without allocating any of them
/// until asked.
///
/// # Examples
///
/// ```
/// # use siegeline::corpora::{CharsetCorpus, Corpus};
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let corpus = CharsetCorpus::new().charset("01").length(2).name("bits").build()?;
///
/// assert_eq!(corpus.len(), 4);
/// assert_eq!(corpus.get(0).unwrap(), "00");
/// assert_eq!(corpus.get(3).unwrap(), "11");
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CharsetCorpus {
    charset: Vec<char>,
    length: usize,
    total: usize,
    corpus_name: String,
}

impl CharsetCorpus {
    /// create a new/empty `CharsetBuilder`
    ///
    /// # Note
    ///
    /// `CharsetBuilder::build` can only be called after `CharsetBuilder::name`,
    /// `CharsetBuilder::charset`, and `CharsetBuilder::length` have been called.
    #[must_use]
    #[allow(clippy::new_ret_no_self)]
    pub const fn new() -> CharsetBuilder<NoItems, NoName> {
        CharsetBuilder {
            charset: None,
            length: None,
            corpus_name: None,
            _item_state: PhantomData,
            _name_state: PhantomData,
        }
    }

    /// the characters values are drawn from, in significance order
    #[must_use]
    pub fn charset(&self) -> &[char] {
        &self.charset
    }

    /// the fixed length of every produced value
    #[must_use]
    pub const fn value_length(&self) -> usize {
        self.length
    }
}

impl Named for CharsetCorpus {
    fn name(&self) -> &str {
        &self.corpus_name
    }
}

impl Corpus for CharsetCorpus {
    fn get(&self, index: usize) -> Option<Cow<'_, str>> {
        if index >= self.total {
            return None;
        }

        let base = self.charset.len();
        let mut decoded = String::with_capacity(self.length);

        // treat `index` as a base-`charset.len()` number of fixed width
        // `length`; most significant digit first keeps the last position
        // varying fastest
        let mut divisor = self.total / base;

        for _ in 0..self.length {
            decoded.push(self.charset[(index / divisor) % base]);
            divisor = std::cmp::max(divisor / base, 1);
        }

        Some(Cow::from(decoded))
    }

    fn len(&self) -> usize {
        self.total
    }
}

impl Display for CharsetCorpus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CharsetCorpus::{{name={}, charset={}, length={}}}",
            self.corpus_name,
            self.charset.iter().collect::<String>(),
            self.length
        )
    }
}

pub struct CharsetBuilder<IS, NS>
where
    IS: CorpusBuildState,
    NS: CorpusBuildState,
{
    charset: Option<Vec<char>>,
    length: Option<usize>,
    corpus_name: Option<String>,
    _item_state: PhantomData<IS>,
    _name_state: PhantomData<NS>,
}

impl<IS> CharsetBuilder<IS, NoName>
where
    IS: CorpusBuildState,
{
    pub fn name(self, corpus_name: &str) -> CharsetBuilder<IS, HasName> {
        CharsetBuilder {
            charset: self.charset,
            length: self.length,
            corpus_name: Some(corpus_name.to_string()),
            _item_state: PhantomData,
            _name_state: PhantomData,
        }
    }
}

impl<IS, NS> CharsetBuilder<IS, NS>
where
    IS: CorpusBuildState,
    NS: CorpusBuildState,
{
    #[allow(clippy::missing_const_for_fn)]
    pub fn charset(self, charset: &str) -> CharsetBuilder<HasItems, NS> {
        CharsetBuilder {
            charset: Some(charset.chars().collect()),
            length: self.length,
            corpus_name: self.corpus_name,
            _item_state: PhantomData,
            _name_state: PhantomData,
        }
    }

    #[allow(clippy::missing_const_for_fn)]
    pub fn length(self, length: usize) -> Self {
        Self {
            charset: self.charset,
            length: Some(length),
            corpus_name: self.corpus_name,
            _item_state: PhantomData,
            _name_state: PhantomData,
        }
    }
}

impl CharsetBuilder<HasItems, HasName> {
    /// # Errors
    ///
    /// returns an error when
    /// - the charset is empty
    /// - the length is 0 or was never provided
    /// - `charset.len() ^ length` overflows a `usize`
    pub fn build(self) -> Result<CorpusType, SiegelineError> {
        let charset = self.charset.unwrap(); // mandatory, can't get here without it being set
        let length = self.length.unwrap_or(0);
        let corpus_name = self.corpus_name.unwrap();

        let spec = || format!("generate:{}:{length}", charset.iter().collect::<String>());

        if charset.is_empty() {
            error!(%length, "charset corpus requires at least one character");

            return Err(SiegelineError::GeneratorSpecError {
                reason: "characters must be provided",
                spec: spec(),
            });
        }

        if length == 0 {
            error!(%length, "charset corpus length must be positive");

            return Err(SiegelineError::GeneratorSpecError {
                reason: "length must be positive",
                spec: spec(),
            });
        }

        let Some(total) = charset
            .len()
            .checked_pow(u32::try_from(length).unwrap_or(u32::MAX))
        else {
            error!(%length, "charset corpus would overflow its value space");

            return Err(SiegelineError::GeneratorSpecError {
                reason: "value space is too large to enumerate",
                spec: spec(),
            });
        };

        Ok(CorpusType::Charset(CharsetCorpus {
            charset,
            length,
            total,
            corpus_name,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `generate:01:2` yields exactly ["00", "01", "10", "11"] in that order
    #[test]
    fn charset_corpus_emits_odometer_order() {
        let corpus = CharsetCorpus::new()
            .charset("01")
            .length(2)
            .name("bits")
            .build()
            .unwrap();

        let gathered: Vec<_> = (0..corpus.len())
            .map(|i| corpus.get(i).unwrap().into_owned())
            .collect();

        assert_eq!(gathered, ["00", "01", "10", "11"]);
        assert!(corpus.get(4).is_none());
    }

    #[test]
    fn charset_corpus_len_is_charset_size_to_the_length() {
        let corpus = CharsetCorpus::new()
            .charset("0123456789")
            .length(4)
            .name("pins")
            .build()
            .unwrap();

        assert_eq!(corpus.len(), 10_000);
        assert_eq!(corpus.get(0).unwrap(), "0000");
        assert_eq!(corpus.get(9_999).unwrap(), "9999");
        assert_eq!(corpus.get(123).unwrap(), "0123");
    }

    #[test]
    fn charset_corpus_with_single_position() {
        let corpus = CharsetCorpus::new()
            .charset("abc")
            .length(1)
            .name("chars")
            .build()
            .unwrap();

        assert_eq!(corpus.len(), 3);
        assert_eq!(corpus.get(2).unwrap(), "c");
    }

    /// hit the different err branches of the builder
    #[test]
    fn charset_corpus_rejects_invalid_specs() {
        assert!(CharsetCorpus::new()
            .charset("")
            .length(3)
            .name("empty")
            .build()
            .is_err());

        assert!(CharsetCorpus::new()
            .charset("ab")
            .length(0)
            .name("zero")
            .build()
            .is_err());

        // 62^64 has no chance of fitting in a usize
        assert!(CharsetCorpus::new()
            .charset("abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789")
            .length(64)
            .name("huge")
            .build()
            .is_err());
    }

    #[test]
    fn charset_corpus_with_multibyte_characters() {
        let corpus = CharsetCorpus::new()
            .charset("äö")
            .length(2)
            .name("umlauts")
            .build()
            .unwrap();

        assert_eq!(corpus.len(), 4);
        assert_eq!(corpus.get(1).unwrap(), "äö");
    }
}
