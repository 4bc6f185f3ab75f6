//! Column-level preprocessing transforms

use super::{map_each, Transform};
use crate::frame::Frame;
use crate::{Error, Result};
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use serde_json::{json, Value};

/// Keep a single column (and the index).
#[derive(Debug, Clone)]
pub struct ExtractColumn {
    column: String,
}

impl ExtractColumn {
    /// Extract `column`.
    #[must_use]
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
        }
    }
}

impl Transform for ExtractColumn {
    fn name(&self) -> &'static str {
        "ExtractColumn"
    }

    fn params(&self) -> Value {
        json!({ "column": self.column })
    }

    fn apply(&self, inputs: &[&Frame]) -> Result<Vec<Frame>> {
        let [frame] = inputs else {
            return Err(Error::InvalidInput(format!(
                "ExtractColumn takes one input, got {}",
                inputs.len()
            )));
        };
        Ok(vec![frame.select(&[self.column.as_str()])?])
    }
}

/// Replace nulls in the given columns of every input.
#[derive(Debug, Clone)]
pub struct FillNulls {
    columns: Vec<String>,
    fill_value: Value,
}

impl FillNulls {
    /// Fill `columns` with `fill_value`.
    #[must_use]
    pub fn new(columns: Vec<String>, fill_value: Value) -> Self {
        Self {
            columns,
            fill_value,
        }
    }
}

impl Transform for FillNulls {
    fn name(&self) -> &'static str {
        "FillNulls"
    }

    fn params(&self) -> Value {
        json!({ "columns": self.columns, "fill_value": self.fill_value })
    }

    fn apply(&self, inputs: &[&Frame]) -> Result<Vec<Frame>> {
        map_each(inputs, |frame| {
            self.columns
                .iter()
                .try_fold(frame.clone(), |frame, column| {
                    frame.fill_nulls(column, &self.fill_value)
                })
        })
    }
}

/// Apply regex substitutions, in order, to text columns of every input.
#[derive(Debug, Clone)]
pub struct ReplacePatterns {
    columns: Vec<String>,
    substitutions: Vec<(Regex, String)>,
}

impl ReplacePatterns {
    /// Compile `substitutions` (`pattern`, `replacement`) for `columns`.
    ///
    /// Replacements use `$1`/`${name}` group syntax.
    ///
    /// # Errors
    /// Returns `Regex` if a pattern does not compile
    pub fn new(columns: Vec<String>, substitutions: Vec<(String, String)>) -> Result<Self> {
        let substitutions = substitutions
            .into_iter()
            .map(|(pattern, replacement)| Ok((Regex::new(&pattern)?, replacement)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            columns,
            substitutions,
        })
    }
}

impl Transform for ReplacePatterns {
    fn name(&self) -> &'static str {
        "ReplacePatterns"
    }

    fn params(&self) -> Value {
        let substitutions: Vec<(&str, &str)> = self
            .substitutions
            .iter()
            .map(|(pattern, replacement)| (pattern.as_str(), replacement.as_str()))
            .collect();
        json!({ "columns": self.columns, "substitutions": substitutions })
    }

    fn apply(&self, inputs: &[&Frame]) -> Result<Vec<Frame>> {
        map_each(inputs, |frame| {
            self.columns.iter().try_fold(frame.clone(), |frame, column| {
                frame.map_strings(column, |text| {
                    self.substitutions
                        .iter()
                        .fold(text.to_string(), |text, (pattern, replacement)| {
                            pattern.replace_all(&text, replacement.as_str()).into_owned()
                        })
                })
            })
        })
    }
}

/// Lowercase, tokenize, stem (English Snowball) and rejoin text columns.
///
/// A value that stems to nothing becomes a single space: an empty field
/// would reload from CSV as null.
#[derive(Debug, Clone)]
pub struct StemText {
    columns: Vec<String>,
    tokens: Regex,
}

impl StemText {
    /// Stem `columns`.
    ///
    /// # Errors
    /// Returns `Regex` if the tokenizer pattern fails to compile
    pub fn new(columns: Vec<String>) -> Result<Self> {
        Ok(Self {
            columns,
            // words, or runs of punctuation
            tokens: Regex::new(r"\w+|[^\w\s]+")?,
        })
    }

    fn stem(&self, stemmer: &Stemmer, text: &str) -> String {
        let lowered = text.to_lowercase();
        let stemmed: Vec<String> = self
            .tokens
            .find_iter(&lowered)
            .map(|token| stemmer.stem(token.as_str()).into_owned())
            .collect();
        let joined = stemmed.join(" ");
        if joined.is_empty() {
            " ".to_string()
        } else {
            joined
        }
    }
}

impl Transform for StemText {
    fn name(&self) -> &'static str {
        "StemText"
    }

    fn params(&self) -> Value {
        json!({ "columns": self.columns })
    }

    fn apply(&self, inputs: &[&Frame]) -> Result<Vec<Frame>> {
        let stemmer = Stemmer::create(Algorithm::English);
        map_each(inputs, |frame| {
            self.columns.iter().try_fold(frame.clone(), |frame, column| {
                frame.map_strings(column, |text| self.stem(&stemmer, text))
            })
        })
    }
}
