//! streams `(payload, attempt id)` pairs out of a [`ParameterSpace`]
use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::corpora::Corpus;
use crate::params::ParameterSpace;
use crate::payload::{Payload, PayloadField};

/// globally unique identifier for a scheduled attempt
///
/// ids are minted from a single shared atomic counter, start at 1, and
/// strictly increase across a run; a requeued attempt keeps the id it was
/// minted with
#[derive(
    Serialize, Deserialize, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Debug,
)]
pub struct AttemptId(u64);

impl AttemptId {
    /// create a new `AttemptId` from the given value
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// get the underlying value
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl Display for AttemptId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "AttemptId<{}>", self.0)
    }
}

/// one scheduled request execution: a unique id and a resolved payload
#[derive(Clone, Debug)]
pub struct Attempt {
    /// the attempt's unique id
    pub id: AttemptId,

    /// the resolved field-name-to-value mapping for this attempt
    pub payload: Payload,
}

/// lazily enumerates every payload combination the parameter space describes
///
/// zip fields advance together, truncated to the shortest of their value
/// sequences; for each zip assignment the product fields expand to their full
/// Cartesian product in declaration order, last-declared field varying
/// fastest. With no varying fields at all the stream produces the constant
/// payload forever, relying on the scheduler's stop conditions to terminate.
///
/// this is a single-pass, forward-only stream: it is not restartable and not
/// thread-safe; only the scheduler's pulling loop drives it. Minting the next
/// attempt id is the one atomic operation.
///
/// # Examples
///
/// ```
/// # use siegeline::corpora::Wordlist;
/// # use siegeline::generator::CombinationStream;
/// # use siegeline::params::ParameterSpace;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let space = ParameterSpace::new()
///     .field(Wordlist::with_words(["admin", "guest"]).name("role").build())
///     .field(Wordlist::with_words(["dev", "prod"]).name("env").build())
///     .build()?;
///
/// let stream = CombinationStream::new(space);
///
/// // 2 roles x 2 envs
/// assert_eq!(stream.count(), 4);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct CombinationStream {
    space: ParameterSpace,
    next_id: AtomicU64,

    /// number of pairwise passes; 1 when the zip group is empty (a single
    /// empty zip assignment)
    zip_passes: usize,
    zip_index: usize,

    /// current index per product field, in declaration order
    odometer: Vec<usize>,
    product_lens: Vec<usize>,

    started: bool,
    exhausted: bool,
    endless: bool,
}

impl CombinationStream {
    /// create a new `CombinationStream` over the given parameter space
    #[must_use]
    pub fn new(space: ParameterSpace) -> Self {
        let zip_len = space
            .zip_fields()
            .map(|field| field.corpus().len())
            .min();

        // None means no zip fields, which is a single pass with an empty
        // zip assignment; Some(0) means one of the zipped value sequences
        // is empty, so nothing can be produced
        let zip_passes = zip_len.unwrap_or(1);

        let product_lens: Vec<usize> = space
            .product_fields()
            .map(|field| field.corpus().len())
            .collect();

        let endless = space.varying().is_empty();

        let exhausted = !endless && (zip_passes == 0 || product_lens.contains(&0));

        Self {
            next_id: AtomicU64::new(1),
            zip_index: 0,
            odometer: vec![0; product_lens.len()],
            product_lens,
            zip_passes,
            started: false,
            exhausted,
            endless,
            space,
        }
    }

    /// pull the next `(payload, attempt id)` pair, if any remain
    pub fn next_attempt(&mut self) -> Option<Attempt> {
        if self.exhausted {
            return None;
        }

        if self.endless {
            return Some(self.emit());
        }

        if self.started {
            self.advance();

            if self.exhausted {
                return None;
            }
        } else {
            self.started = true;
        }

        Some(self.emit())
    }

    /// total number of ids minted so far
    #[must_use]
    pub fn ids_minted(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst) - 1
    }

    /// step the product odometer once, rolling into the next zip pass when
    /// the full product has been enumerated
    fn advance(&mut self) {
        // last-declared field varies fastest
        for position in (0..self.odometer.len()).rev() {
            self.odometer[position] += 1;

            if self.odometer[position] < self.product_lens[position] {
                return;
            }

            self.odometer[position] = 0;
        }

        // product wrapped (or there are no product fields); move to the next
        // pairwise assignment
        self.zip_index += 1;

        if self.zip_index >= self.zip_passes {
            self.exhausted = true;
        }
    }

    /// merge constants, the current zip assignment, the current product
    /// assignment, and the counter fields into a payload under a fresh id
    fn emit(&mut self) -> Attempt {
        let id = AttemptId::new(self.next_id.fetch_add(1, Ordering::SeqCst));

        let mut fields: Vec<PayloadField> = self.space.constants().to_vec();

        if !self.endless {
            for field in self.space.zip_fields() {
                fields.push(
                    field
                        .resolve(self.zip_index)
                        .expect("zip index is bounded by the shortest zipped corpus"),
                );
            }

            for (field, &index) in self.space.product_fields().zip(self.odometer.iter()) {
                fields.push(
                    field
                        .resolve(index)
                        .expect("odometer positions are bounded by their corpus lengths"),
                );
            }
        }

        for counter in self.space.counters() {
            fields.push(counter.resolve(id.get()));
        }

        Attempt {
            id,
            payload: Payload::new(fields),
        }
    }
}

impl Iterator for CombinationStream {
    type Item = Attempt;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_attempt()
    }
}
