//! Error types for grammar parsing and expansion

use thiserror::Error;

/// Result type for grammar operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while parsing a grammar definition or expanding a symbol.
///
/// Parsing reports these per line (counted, never aborting the parse);
/// expansion surfaces them by aborting the expansion in progress.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GrammarError {
    /// An empty `<>` tag in a rule
    #[error("empty tag encountered")]
    EmptyTag,

    /// A tag whose attribute list does not split into `key` / `key=value`
    #[error("error parsing tag '{0}'")]
    MalformedTag(String),

    /// A line outside a code block that is not of the form `<sym> = ...`
    #[error("error parsing rule '{0}'")]
    MalformedRule(String),

    /// A directive whose argument failed to parse
    #[error("argument to !{directive} is not {expected}")]
    BadDirectiveArgument { directive: String, expected: &'static str },

    /// A `!lineguard` template missing the `<line>` placeholder
    #[error("line guard template must contain '<line>'")]
    LineGuardWithoutPlaceholder,

    /// A `!` line whose command is not recognised
    #[error("unknown command '{0}'")]
    UnknownDirective(String),

    /// Nested or unterminated `!begin function` blocks
    #[error("error in function block: {0}")]
    BadFunctionBlock(String),

    /// Expansion reached a symbol with no production rules
    #[error("no creators for symbol <{0}>")]
    NoCreators(String),

    /// `generate_root` on a grammar that never declared a `root` symbol
    #[error("no root symbol defined")]
    NoRoot,

    /// `min` exceeds `max` in a built-in tag
    #[error("range error in <{0}> tag")]
    RangeInversion(String),

    /// A built-in tag missing a required attribute
    /// (`count` on `lines`, `from` on `import`, `function` on `call`)
    #[error("<{tag}> tag without '{attribute}' attribute")]
    MissingAttribute { tag: String, attribute: &'static str },

    /// An integer attribute that is not a decimal/hex/octal/binary literal
    #[error("invalid integer literal '{0}'")]
    InvalidInteger(String),

    /// A numeric attribute that is not a float literal
    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    /// Explicit rule probabilities that cannot form a distribution
    #[error("invalid probabilities for symbol <{symbol}>: {detail}")]
    InvalidProbability { symbol: String, detail: String },

    /// A binary-coded integer that does not fit its declared width
    #[error("value {value} does not fit a {width}-bit binary encoding")]
    PackOutOfRange { value: i128, width: u32 },

    /// A `char`/`string` draw landed outside the valid scalar range
    #[error("code point {0:#x} is not a valid character")]
    InvalidCodePoint(i128),

    /// `<import from=NAME>` referencing an unmounted grammar
    #[error("unknown import '{0}'")]
    UnknownImport(String),

    /// Errors while parsing the file behind an `!import` directive
    #[error("errors while parsing imported grammar '{0}'")]
    ImportFailed(String),

    /// `call`/`beforeoutput` naming a function with no registered callback
    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    /// A registered callback returned an error
    #[error("error in user-defined function '{name}': {message}")]
    Callback { name: String, message: String },

    /// `<any>` with no variables declared in the context
    #[error("no variables available for <any> tag")]
    NoVariables,

    /// Code generation requested from a grammar with no line rules
    #[error("no line rules available for code generation")]
    NoLineRules,
}

/// Top-level error union for expansion entry points.
///
/// Recursion exhaustion is kept separate from [`GrammarError`] so the
/// expansion engine can catch it and retry with non-recursive creators.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    /// Malformed grammar or unresolvable rule
    #[error(transparent)]
    Grammar(#[from] GrammarError),

    /// Maximum recursion depth reached while expanding the named symbol
    #[error("maximum recursion depth reached while expanding <{0}>")]
    RecursionLimit(String),
}

impl Error {
    /// True when this error is the recursion-depth cap, the one condition
    /// the engine recovers from by switching to non-recursive creators.
    pub fn is_recursion_limit(&self) -> bool {
        matches!(self, Error::RecursionLimit(_))
    }
}
