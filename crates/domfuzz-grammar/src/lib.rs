//! Context-free grammar engine for generating browser-fuzzing test cases
//!
//! This crate parses a textual grammar definition into a rule set and then
//! produces pseudo-random strings by recursive expansion of symbols. Beyond
//! plain string generation it has a *code mode* that turns production rules
//! into the statements of a generated program while tracking typed
//! variables, type inheritance, and variable reuse.
//!
//! # Architecture
//!
//! - **Parsing**: a line-oriented parser with directives (`!include`,
//!   `!import`, `!extends`, `!begin lines`, ...), inline tag attributes,
//!   and captured user-function blocks. Parse errors are counted per line,
//!   never fatal mid-parse.
//! - **Probabilities**: per-rule `p=` weights become cumulative
//!   distributions per symbol; an empty CDF means uniform selection.
//! - **Expansion**: recursive descent over rule right-hand sides with a
//!   depth cap and a non-recursive fallback, so self-referential grammars
//!   still terminate.
//! - **Code mode**: `line` rules are expanded one statement at a time with
//!   a bias toward "interesting" lines that use variables the program has
//!   already declared.
//!
//! # Usage
//!
//! ```rust,ignore
//! use domfuzz_grammar::Grammar;
//!
//! let mut grammar = Grammar::new();
//! if grammar.parse_from_file("rules/html.txt") != 0 {
//!     eprintln!("grammar has errors");
//!     return;
//! }
//! let sample = grammar.generate_root()?;
//! ```
//!
//! Seeded generation for reproducible output:
//!
//! ```rust,ignore
//! use rand::SeedableRng;
//! use rand::rngs::StdRng;
//!
//! let mut rng = StdRng::seed_from_u64(42);
//! let sample = grammar.generate_root_with_rng(&mut rng)?;
//! ```
//!
//! A [`Grammar`] is immutable after parsing and may be shared across
//! threads; each expansion owns its own context internally.

mod builtins;
mod context;
mod engine;
mod error;
mod parser;
mod prob;
mod rule;
mod tag;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use rand::Rng;
use tracing::warn;

pub use context::{GenerationContext, NONINTERESTING_TYPES, Variable};
pub use error::{Error, GrammarError, Result};
pub use rule::{Part, Rule, RuleKind, RuleRef};
pub use tag::{AttrValue, Tag};

/// A callback registered for `call` / `beforeoutput` tags.
///
/// Receives the tag's attributes, the live generation context, and the
/// current fragment value; returns the replacement fragment.
pub type Callback = Arc<
    dyn Fn(&Tag, &mut GenerationContext, &str) -> std::result::Result<String, GrammarError>
        + Send
        + Sync,
>;

/// Parses grammar definitions and generates corresponding languages.
///
/// Parse first, then generate:
///
/// ```rust,ignore
/// let mut grammar = Grammar::new();
/// assert_eq!(grammar.parse_from_file("grammar.txt"), 0);
/// let out = grammar.generate_root()?;        // from the declared root
/// let one = grammar.generate_symbol("foo")?; // or any symbol
/// ```
pub struct Grammar {
    pub(crate) root: Option<String>,
    pub(crate) creators: HashMap<String, Vec<RuleRef>>,
    pub(crate) nonrecursive_creators: HashMap<String, Vec<RuleRef>>,
    pub(crate) all_rules: Vec<RuleRef>,
    pub(crate) interesting_lines: HashMap<String, Vec<usize>>,
    pub(crate) all_nonhelper_lines: Vec<usize>,

    pub(crate) creator_cdfs: HashMap<String, Vec<f64>>,
    pub(crate) nonrecursive_creator_cdfs: HashMap<String, Vec<f64>>,

    pub(crate) var_format: String,
    pub(crate) definitions_dir: PathBuf,
    pub(crate) imports: HashMap<String, Arc<Grammar>>,
    pub(crate) functions: HashMap<String, Callback>,
    pub(crate) function_sources: HashMap<String, String>,
    pub(crate) line_guard: Option<String>,
    pub(crate) inheritance: HashMap<String, Vec<String>>,

    pub(crate) recursion_max: usize,
    pub(crate) var_reuse_prob: f64,
    pub(crate) interesting_line_prob: f64,
    pub(crate) max_vars_of_same_type: usize,
    pub(crate) dom_globals: bool,
}

impl Default for Grammar {
    fn default() -> Self {
        Grammar {
            root: None,
            creators: HashMap::new(),
            nonrecursive_creators: HashMap::new(),
            all_rules: Vec::new(),
            interesting_lines: HashMap::new(),
            all_nonhelper_lines: Vec::new(),
            creator_cdfs: HashMap::new(),
            nonrecursive_creator_cdfs: HashMap::new(),
            var_format: "var%05d".to_string(),
            definitions_dir: PathBuf::from("."),
            imports: HashMap::new(),
            functions: HashMap::new(),
            function_sources: HashMap::new(),
            line_guard: None,
            inheritance: HashMap::new(),
            recursion_max: 50,
            var_reuse_prob: 0.75,
            interesting_line_prob: 0.9,
            max_vars_of_same_type: 5,
            dom_globals: true,
        }
    }
}

impl Grammar {
    /// Creates an empty grammar with default tunables.
    pub fn new() -> Self {
        Self::default()
    }

    // ---- generation entry points -------------------------------------

    /// Expands the root symbol with a fresh context.
    pub fn generate_root(&self) -> Result<String> {
        self.generate_root_with_rng(&mut rand::rng())
    }

    /// Expands the root symbol using the caller's RNG.
    pub fn generate_root_with_rng<R: Rng>(&self, rng: &mut R) -> Result<String> {
        let root = self.root.clone().ok_or(GrammarError::NoRoot)?;
        let mut ctx = GenerationContext::default();
        self.generate(&root, &mut ctx, rng, 0, false)
    }

    /// Expands an arbitrary symbol with a fresh context.
    pub fn generate_symbol(&self, name: &str) -> Result<String> {
        self.generate_symbol_with_rng(name, &mut rand::rng())
    }

    /// Expands an arbitrary symbol using the caller's RNG.
    pub fn generate_symbol_with_rng<R: Rng>(&self, name: &str, rng: &mut R) -> Result<String> {
        let mut ctx = GenerationContext::default();
        self.generate(name, &mut ctx, rng, 0, false)
    }

    /// Generates `num_lines` statements of code, seeding the context with
    /// `initial_vars` (variables the embedder declared elsewhere) and
    /// starting the variable counter at `last_var_start`.
    pub fn generate_code(
        &self,
        num_lines: usize,
        initial_vars: &[Variable],
        last_var_start: usize,
    ) -> Result<String> {
        self.generate_code_with_rng(num_lines, initial_vars, last_var_start, &mut rand::rng())
    }

    /// [`Grammar::generate_code`] using the caller's RNG.
    pub fn generate_code_with_rng<R: Rng>(
        &self,
        num_lines: usize,
        initial_vars: &[Variable],
        last_var_start: usize,
        rng: &mut R,
    ) -> Result<String> {
        self.generate_code_impl(num_lines, initial_vars, last_var_start, rng)
    }

    // ---- embedder hooks ----------------------------------------------

    /// Mounts an already-parsed grammar under `name`, addressable from
    /// rules via `<import from=NAME ...>`. Faster than the `!import`
    /// directive when the grammar is already loaded.
    pub fn add_import(&mut self, name: impl Into<String>, grammar: Arc<Grammar>) {
        self.imports.insert(name.into(), grammar);
    }

    /// Registers a host callback invocable from `call` and `beforeoutput`
    /// tags. Replaces any callback previously registered under `name`.
    pub fn register_function<F>(&mut self, name: impl Into<String>, callback: F)
    where
        F: Fn(&Tag, &mut GenerationContext, &str) -> std::result::Result<String, GrammarError>
            + Send
            + Sync
            + 'static,
    {
        self.functions.insert(name.into(), Arc::new(callback));
    }

    // ---- tunables ----------------------------------------------------

    /// Overrides the probability of reusing an existing variable over
    /// creating a fresh one (default 0.75).
    pub fn set_var_reuse_prob(&mut self, p: f64) {
        self.var_reuse_prob = p;
    }

    /// Overrides the probability of picking an interesting line in code
    /// mode (default 0.9).
    pub fn set_interesting_line_prob(&mut self, p: f64) {
        self.interesting_line_prob = p;
    }

    /// Overrides the variable count above which reuse becomes mandatory
    /// (default 5).
    pub fn set_max_vars_of_same_type(&mut self, max: usize) {
        self.max_vars_of_same_type = max;
    }

    /// Overrides the recursion depth cap (default 50).
    pub fn set_max_recursion(&mut self, depth: usize) {
        self.recursion_max = depth;
    }

    /// Controls whether code mode seeds the implicit `document`/`window`
    /// variables (default on; generated DOM-fuzzing code expects them).
    pub fn set_dom_globals(&mut self, enabled: bool) {
        self.dom_globals = enabled;
    }

    // ---- introspection -----------------------------------------------

    /// The symbol marked `root`, if any.
    pub fn root_symbol(&self) -> Option<&str> {
        self.root.as_deref()
    }

    /// Every parsed rule in insertion order, for diagnostics.
    pub fn all_rules(&self) -> &[RuleRef] {
        &self.all_rules
    }

    /// The creator rules for a symbol.
    pub fn creators_for(&self, symbol: &str) -> Option<&[RuleRef]> {
        self.creators.get(symbol).map(Vec::as_slice)
    }

    /// The cumulative distribution for a symbol's creators; empty means
    /// uniform.
    pub fn cdf_for(&self, symbol: &str) -> Option<&[f64]> {
        self.creator_cdfs.get(symbol).map(Vec::as_slice)
    }

    /// The dedented source text of a captured `!begin function` block.
    pub fn function_source(&self, name: &str) -> Option<&str> {
        self.function_sources.get(name).map(String::as_str)
    }

    /// Direct parents recorded by `!extends` for a type.
    pub fn inheritance_of(&self, type_name: &str) -> Option<&[String]> {
        self.inheritance.get(type_name).map(Vec::as_slice)
    }

    /// Indices of line rules that consume (not create) the given type.
    pub fn interesting_lines_for(&self, type_name: &str) -> Option<&[usize]> {
        self.interesting_lines.get(type_name).map(Vec::as_slice)
    }

    /// Number of line rules eligible for top-level code generation.
    pub fn nonhelper_line_count(&self) -> usize {
        self.all_nonhelper_lines.len()
    }

    /// Checks that every tag referenced by any rule can be resolved:
    /// built-in, constant, `call`/`any`/`import`, or present in the creator
    /// table. Returns the unresolvable names, warning for each.
    pub fn check_grammar(&self) -> Vec<String> {
        let mut missing = Vec::new();
        for rule in &self.all_rules {
            for part in &rule.parts {
                let Part::Tag(tag) = part else { continue };
                let name = tag.name();
                if builtins::is_built_in(name)
                    || builtins::constant_value(name).is_some()
                    || matches!(name, "call" | "any")
                    || self.creators.contains_key(name)
                {
                    continue;
                }
                if !missing.iter().any(|m| m == name) {
                    warn!(symbol = name, "no creators for referenced symbol");
                    missing.push(name.to_string());
                }
            }
        }
        missing
    }
}
