//! field declarations and their partitioning into a parameter space
use std::collections::HashSet;

use tracing::{error, instrument};

use crate::corpora::{CharsetCorpus, Corpus, CorpusType, Named, Wordlist};
use crate::error::SiegelineError;
use crate::payload::{FieldTarget, PayloadField};

/// a brute-forced field together with its value source
///
/// the field's `target` and wire `key` are resolved from the declared name
/// once, here, and never re-derived
#[derive(Clone, Debug)]
pub struct VaryingField {
    name: String,
    target: FieldTarget,
    key: String,
    corpus: CorpusType,
}

impl VaryingField {
    /// the full declared name, prefix included
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// where values of this field land in the request
    #[must_use]
    pub const fn target(&self) -> FieldTarget {
        self.target
    }

    /// the prefix-stripped key used on the wire
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// the field's value source
    #[must_use]
    pub const fn corpus(&self) -> &CorpusType {
        &self.corpus
    }

    /// resolve the `index`-th candidate value into a [`PayloadField`]
    #[must_use]
    pub fn resolve(&self, index: usize) -> Option<PayloadField> {
        self.corpus.get(index).map(|value| PayloadField {
            name: self.name.clone(),
            target: self.target,
            key: self.key.clone(),
            value: value.into_owned(),
            counter: false,
        })
    }
}

/// a counter-fed field; its value is the decimal attempt id
#[derive(Clone, Debug)]
pub struct CounterField {
    name: String,
}

impl CounterField {
    /// the full declared name, prefix included
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// resolve this field against a freshly minted attempt id
    #[must_use]
    pub fn resolve(&self, attempt_id: u64) -> PayloadField {
        PayloadField::new(&self.name, &attempt_id.to_string()).counter()
    }
}

/// all declared fields, partitioned by how their values are produced and
/// how the varying ones combine
///
/// built once at startup; every validation failure here is fatal and happens
/// before any request is sent
#[derive(Clone, Debug, Default)]
pub struct ParameterSpace {
    varying: Vec<VaryingField>,
    constants: Vec<PayloadField>,
    counters: Vec<CounterField>,
    zip_group: Vec<usize>,
    product_group: Vec<usize>,
}

impl ParameterSpace {
    /// create a default (empty) [`ParameterSpaceBuilder`]
    #[must_use]
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> ParameterSpaceBuilder {
        ParameterSpaceBuilder::default()
    }

    /// fields whose values vary across attempts
    #[must_use]
    pub fn varying(&self) -> &[VaryingField] {
        &self.varying
    }

    /// fields with a single fixed value
    #[must_use]
    pub fn constants(&self) -> &[PayloadField] {
        &self.constants
    }

    /// counter-fed fields
    #[must_use]
    pub fn counters(&self) -> &[CounterField] {
        &self.counters
    }

    /// the varying fields combined by pairwise-positional pairing
    pub fn zip_fields(&self) -> impl Iterator<Item = &VaryingField> {
        self.zip_group.iter().map(|&i| &self.varying[i])
    }

    /// the varying fields combined by full Cartesian expansion
    pub fn product_fields(&self) -> impl Iterator<Item = &VaryingField> {
        self.product_group.iter().map(|&i| &self.varying[i])
    }
}

/// parse the `generate:<charset>:<length>` form of a value source
fn parse_generator_spec(name: &str, spec: &str) -> Result<CorpusType, SiegelineError> {
    let mut parts = spec.splitn(3, ':');

    // first part is the literal `generate`, already matched by the caller
    let (Some(_), Some(charset), Some(length)) = (parts.next(), parts.next(), parts.next()) else {
        error!(%spec, "generator spec must have the form generate:<charset>:<length>");

        return Err(SiegelineError::GeneratorSpecError {
            reason: "expected generate:<charset>:<length>",
            spec: spec.to_string(),
        });
    };

    let length: usize = length.parse().map_err(|_| {
        error!(%spec, "generator spec length is not a positive integer");

        SiegelineError::GeneratorSpecError {
            reason: "length must be a positive integer",
            spec: spec.to_string(),
        }
    })?;

    CharsetCorpus::new().charset(charset).length(length).name(name).build()
}

/// builder for [`ParameterSpace`]
///
/// accepts both parsed declarations (`declare`) and programmatic fields
/// (`field` / `constant` / `counter`); `build` performs all validation
#[derive(Default)]
pub struct ParameterSpaceBuilder {
    varying: Vec<VaryingField>,
    constants: Vec<PayloadField>,
    counters: Vec<CounterField>,
    zip_names: Vec<String>,
    product_names: Vec<String>,
    parse_error: Option<SiegelineError>,
}

impl ParameterSpaceBuilder {
    /// declare a field from its `key=source` (or `increment:key`) string form
    ///
    /// the source is one of
    /// - a quoted literal: `role="admin"`
    /// - a generator spec: `code=generate:0123456789:6`
    /// - anything else: a path to a wordlist file, loaded eagerly
    ///
    /// names may carry a `header:` or `cookie:` prefix to target those parts
    /// of the request
    ///
    /// # Examples
    ///
    /// ```
    /// # use siegeline::params::ParameterSpace;
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let space = ParameterSpace::new()
    ///     .declare("code=generate:0123456789:4")
    ///     .declare("role=\"admin\"")
    ///     .declare("increment:header:X-Request-Id")
    ///     .build()?;
    ///
    /// assert_eq!(space.varying().len(), 1);
    /// assert_eq!(space.constants().len(), 1);
    /// assert_eq!(space.counters().len(), 1);
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub fn declare(mut self, declaration: &str) -> Self {
        if self.parse_error.is_some() {
            // already broken; keep the first error
            return self;
        }

        if let Err(error) = self.parse_declaration(declaration) {
            self.parse_error = Some(error);
        }

        self
    }

    /// declare a cookie field; shorthand for `declare("cookie:<declaration>")`
    #[must_use]
    pub fn declare_cookie(self, declaration: &str) -> Self {
        self.declare(&format!("cookie:{declaration}"))
    }

    /// add a varying field backed by the given corpus; the field's name is
    /// the corpus name
    #[must_use]
    pub fn field(mut self, corpus: CorpusType) -> Self {
        let name = corpus.name().to_string();
        let placeholder = PayloadField::new(&name, "");

        self.varying.push(VaryingField {
            name,
            target: placeholder.target,
            key: placeholder.key,
            corpus,
        });

        self
    }

    /// add a constant field
    #[must_use]
    pub fn constant(mut self, name: &str, value: &str) -> Self {
        self.constants.push(PayloadField::new(name, value));
        self
    }

    /// add a counter-fed field
    #[must_use]
    pub fn counter(mut self, name: &str) -> Self {
        self.counters.push(CounterField {
            name: name.to_string(),
        });
        self
    }

    /// name the fields combined by pairwise-positional pairing
    #[must_use]
    pub fn zip_fields<I, T>(mut self, names: I) -> Self
    where
        T: Into<String>,
        I: IntoIterator<Item = T>,
    {
        self.zip_names.extend(names.into_iter().map(Into::into));
        self
    }

    /// name the fields combined by full Cartesian expansion
    ///
    /// when neither group is populated, every varying field lands here
    #[must_use]
    pub fn product_fields<I, T>(mut self, names: I) -> Self
    where
        T: Into<String>,
        I: IntoIterator<Item = T>,
    {
        self.product_names.extend(names.into_iter().map(Into::into));
        self
    }

    fn parse_declaration(&mut self, declaration: &str) -> Result<(), SiegelineError> {
        if let Some(counter_name) = declaration.strip_prefix("increment:") {
            if counter_name.is_empty() {
                return Err(SiegelineError::FieldParseError {
                    reason: "increment: requires a field name",
                    declaration: declaration.to_string(),
                });
            }

            self.counters.push(CounterField {
                name: counter_name.to_string(),
            });

            return Ok(());
        }

        let Some((name, source)) = declaration.split_once('=') else {
            return Err(SiegelineError::FieldParseError {
                reason: "expected key=source or increment:key",
                declaration: declaration.to_string(),
            });
        };

        if name.is_empty() {
            return Err(SiegelineError::FieldParseError {
                reason: "field name is empty",
                declaration: declaration.to_string(),
            });
        }

        if (source.starts_with('"') && source.ends_with('"') && source.len() >= 2)
            || (source.starts_with('\'') && source.ends_with('\'') && source.len() >= 2)
        {
            // quoted literal -> constant
            self.constants
                .push(PayloadField::new(name, &source[1..source.len() - 1]));

            return Ok(());
        }

        let corpus = if source.starts_with("generate:") {
            parse_generator_spec(name, source)?
        } else {
            Wordlist::from_file(source)?.name(name).build()
        };

        let placeholder = PayloadField::new(name, "");

        self.varying.push(VaryingField {
            name: name.to_string(),
            target: placeholder.target,
            key: placeholder.key,
            corpus,
        });

        Ok(())
    }

    /// finalize the parameter space
    ///
    /// # Errors
    ///
    /// returns an error when
    /// - any declaration failed to parse (first failure wins)
    /// - a field name is declared more than once
    /// - a zip/product group member doesn't name a varying field (counter and
    ///   constant fields have no value sequence and can't be grouped)
    /// - a field appears in both groups
    #[instrument(skip_all, level = "trace")]
    pub fn build(self) -> Result<ParameterSpace, SiegelineError> {
        if let Some(error) = self.parse_error {
            return Err(error);
        }

        let mut seen = HashSet::new();

        for name in self
            .varying
            .iter()
            .map(VaryingField::name)
            .chain(self.constants.iter().map(|c| c.name.as_str()))
            .chain(self.counters.iter().map(CounterField::name))
        {
            if !seen.insert(name.to_string()) {
                error!(%name, "field was declared more than once");

                return Err(SiegelineError::DuplicateField {
                    name: name.to_string(),
                });
            }
        }

        let resolve_group = |names: &[String], group: &'static str| {
            names
                .iter()
                .map(|name| {
                    self.varying
                        .iter()
                        .position(|field| field.name() == name)
                        .ok_or_else(|| {
                            error!(%name, %group, "group references a field with no value source");

                            SiegelineError::UnknownGroupField {
                                name: name.clone(),
                                group,
                            }
                        })
                })
                .collect::<Result<Vec<usize>, SiegelineError>>()
        };

        let zip_group = resolve_group(&self.zip_names, "zip")?;
        let mut product_group = resolve_group(&self.product_names, "product")?;

        // the groups must be disjoint; any varying field named by neither
        // group defaults into the product group, in declaration order (with
        // no grouping at all, that's every varying field)
        for (i, field) in self.varying.iter().enumerate() {
            let zipped = zip_group.contains(&i);
            let multiplied = product_group.contains(&i);

            if zipped && multiplied {
                error!(name = field.name(), "field appears in both groups");

                return Err(SiegelineError::OverlappingGroups {
                    name: field.name().to_string(),
                });
            }

            if !zipped && !multiplied {
                product_group.push(i);
            }
        }

        Ok(ParameterSpace {
            varying: self.varying,
            constants: self.constants,
            counters: self.counters,
            zip_group,
            product_group,
        })
    }
}
