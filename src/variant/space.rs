//! Compile-Time Option Permutation Space
//!
//! A shader exposes an ordered list of compile-time options, each with a
//! discrete set of textual values (skinned on/off, fog mode, quality
//! tier...). [`VariantSpace`] enumerates the cartesian product of those
//! values as a flat ordinal range and decodes any ordinal back into one
//! concrete [`Permutation`], so callers iterate `0..total()` instead of
//! nesting a loop per option.
//!
//! The ordinal encoding is a mixed-radix counter with the *first* option
//! as the fastest-changing digit. The on-disk variant cache stores one
//! bytecode pair per ordinal, in this order, so the mapping must stay
//! stable.

use crate::errors::{KilnError, Result};

/// One named compile-time option and its possible values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOption {
    /// Macro name the option is exposed under.
    pub name: String,
    /// Possible values, in declaration order. Must be non-empty.
    pub values: Vec<String>,
}

impl CompileOption {
    pub fn new(name: impl Into<String>, values: &[&str]) -> Self {
        Self {
            name: name.into(),
            values: values.iter().map(|v| (*v).to_string()).collect(),
        }
    }
}

/// One concrete choice across all options: a value index per option, in
/// option-declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permutation {
    choices: Vec<usize>,
}

impl Permutation {
    /// Value index chosen for the option at `option_index`.
    #[must_use]
    pub fn choice(&self, option_index: usize) -> usize {
        self.choices[option_index]
    }

    #[must_use]
    pub fn choices(&self) -> &[usize] {
        &self.choices
    }
}

/// The full permutation space of an option list.
#[derive(Debug, Clone)]
pub struct VariantSpace {
    options: Vec<CompileOption>,
    total: usize,
}

impl VariantSpace {
    /// Builds the space. Fails with [`KilnError::EmptyOptionSpace`] when
    /// the option list is empty or any option has no values.
    pub fn build(options: Vec<CompileOption>) -> Result<Self> {
        if options.is_empty() || options.iter().any(|opt| opt.values.is_empty()) {
            return Err(KilnError::EmptyOptionSpace);
        }
        let total = options.iter().map(|opt| opt.values.len()).product();
        Ok(Self { options, total })
    }

    /// Total permutation count (product of all value counts).
    #[inline]
    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }

    #[must_use]
    pub fn options(&self) -> &[CompileOption] {
        &self.options
    }

    /// Decodes an ordinal into its permutation. Pure: the same ordinal
    /// always yields the same permutation.
    ///
    /// # Panics
    /// If `ordinal >= total()`.
    #[must_use]
    pub fn permutation_at(&self, ordinal: usize) -> Permutation {
        assert!(
            ordinal < self.total,
            "permutation ordinal {ordinal} out of range (total {})",
            self.total
        );
        let mut rest = ordinal;
        let mut choices = Vec::with_capacity(self.options.len());
        for option in &self.options {
            let radix = option.values.len();
            choices.push(rest % radix);
            rest /= radix;
        }
        Permutation { choices }
    }

    /// Inverse of [`Self::permutation_at`].
    ///
    /// # Panics
    /// If the permutation does not belong to this space.
    #[must_use]
    pub fn ordinal_of(&self, permutation: &Permutation) -> usize {
        assert_eq!(permutation.choices.len(), self.options.len());
        let mut ordinal = 0;
        let mut stride = 1;
        for (option, &choice) in self.options.iter().zip(&permutation.choices) {
            assert!(choice < option.values.len());
            ordinal += choice * stride;
            stride *= option.values.len();
        }
        ordinal
    }

    /// The `#define` block selecting `permutation`, one line per option in
    /// declaration order, each line newline-terminated so the block can be
    /// prepended to source directly. Pure function of its input.
    #[must_use]
    pub fn macro_block(&self, permutation: &Permutation) -> String {
        let mut block = String::new();
        for (option, &choice) in self.options.iter().zip(&permutation.choices) {
            block.push_str("#define ");
            block.push_str(&option.name);
            block.push(' ');
            block.push_str(&option.values[choice]);
            block.push('\n');
        }
        block
    }
}
