//! Line-oriented grammar parser
//!
//! Grammar sources are parsed one physical line at a time. Outside function
//! blocks a line is comment-stripped and trimmed, then classified: empty
//! (skipped), directive (`!...`), code line (inside `!begin lines` /
//! `!begin helperlines`), or grammar production (`<sym> = ...`).
//!
//! Errors are counted per line and reported through `tracing`; parsing
//! never aborts early. A parse is usable only when the error count is zero.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::Grammar;
use crate::context::is_noninteresting;
use crate::error::GrammarError;
use crate::rule::{Part, Rule, RuleKind};
use crate::tag::Tag;

// Use Option for graceful degradation if compilation fails
static RULE_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^<([^>]*)>\s*=\s*(.*)$").ok());
// The character class excludes ')' as well as '>'; a tag body containing a
// parenthesis is left in the text verbatim.
static TAG_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"<([^>)]*)>").ok());
static COMMAND_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^!([a-z_]+)\s*(.*)$").ok());
static FUNCTION_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^function\s*([A-Za-z._0-9]+)$").ok());

#[derive(Default)]
struct BlockState {
    in_code: bool,
    helper_lines: bool,
    in_function: bool,
    function_name: String,
    function_body: String,
}

/// Strips a `#` comment and surrounding whitespace.
fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(pos) => line[..pos].trim(),
        None => line.trim(),
    }
}

/// Splits a right-hand side into literal text and parsed tags.
///
/// `"foo<bar>baz"` yields text `foo`, tag `bar`, text `baz`; adjacent tags
/// produce no empty text parts.
fn split_parts(rhs: &str) -> Result<Vec<Part>, GrammarError> {
    let Some(tag_re) = TAG_RE.as_ref() else {
        return Err(GrammarError::MalformedRule(rhs.to_string()));
    };

    let mut parts = Vec::new();
    let mut cursor = 0;
    for caps in tag_re.captures_iter(rhs) {
        let Some(whole) = caps.get(0) else { continue };
        let text = &rhs[cursor..whole.start()];
        if !text.is_empty() {
            parts.push(Part::Text(text.to_string()));
        }
        let spec = caps.get(1).map_or("", |m| m.as_str());
        parts.push(Part::Tag(Tag::parse(spec)?));
        cursor = whole.end();
    }
    let trailing = &rhs[cursor..];
    if !trailing.is_empty() {
        parts.push(Part::Text(trailing.to_string()));
    }
    Ok(parts)
}

/// Dedents a function body: tabs expand to 8 spaces, then the minimum
/// common leading whitespace of non-blank lines is removed.
fn dedent(source: &str) -> String {
    let expanded = source.replace('\t', &" ".repeat(8));
    let indent = expanded
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);

    if indent == 0 {
        return source.to_string();
    }

    let lines: Vec<&str> = expanded
        .lines()
        .map(|line| if line.trim().is_empty() { line } else { &line[indent..] })
        .collect();
    lines.join("\n")
}

impl Grammar {
    /// Parses grammar rules from a string.
    ///
    /// Returns the number of errors encountered; the grammar is usable only
    /// when this is zero. On success the probability CDFs and the
    /// interesting-line index are (re)built.
    pub fn parse_from_string(&mut self, grammar_str: &str) -> usize {
        let errors = self.include_from_string(grammar_str);
        if errors > 0 {
            return errors;
        }

        if let Err(err) = self.normalize_probabilities() {
            warn!(error = %err, "error normalizing rule probabilities");
            return 1;
        }
        self.compute_interesting_indices();
        0
    }

    /// Parses grammar rules from a file. `!include` and `!import` paths in
    /// the file resolve relative to its directory.
    pub fn parse_from_file(&mut self, path: impl AsRef<Path>) -> usize {
        let path = path.as_ref();
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "error reading grammar file");
                return 1;
            }
        };
        self.definitions_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        self.parse_from_string(&content)
    }

    /// Parses lines into this grammar without rebuilding the CDFs or the
    /// interesting-line index; `parse_from_string` finishes those once the
    /// outermost source is done.
    fn include_from_string(&mut self, grammar_str: &str) -> usize {
        let mut state = BlockState::default();
        let mut num_errors = 0;

        for raw_line in grammar_str.split('\n') {
            let clean = if state.in_function {
                raw_line.to_string()
            } else {
                strip_comment(raw_line).to_string()
            };
            if !state.in_function && clean.is_empty() {
                continue;
            }

            let directive = COMMAND_RE.as_ref().and_then(|re| re.captures(&clean));
            if let Some(caps) = directive {
                let command = caps.get(1).map_or("", |m| m.as_str());
                let params = caps.get(2).map_or("", |m| m.as_str());
                match self.handle_directive(command, params, &mut state) {
                    Ok(nested_errors) => num_errors += nested_errors,
                    Err(err) => {
                        warn!(line = raw_line, error = %err, "error parsing line");
                        num_errors += 1;
                    }
                }
                continue;
            }

            let outcome = if state.in_function {
                state.function_body.push_str(raw_line);
                state.function_body.push('\n');
                Ok(())
            } else if state.in_code {
                self.parse_code_line(&clean, state.helper_lines)
            } else {
                self.parse_grammar_line(&clean)
            };
            if let Err(err) = outcome {
                warn!(line = raw_line, error = %err, "error parsing line");
                num_errors += 1;
            }
        }

        if state.in_function {
            warn!(function = %state.function_name, "unterminated function block");
        }
        num_errors
    }

    /// Dispatches one `!command params` line. Returns the number of errors
    /// contributed by nested sources (only `!include` produces any).
    fn handle_directive(
        &mut self,
        command: &str,
        params: &str,
        state: &mut BlockState,
    ) -> Result<usize, GrammarError> {
        match command {
            "varformat" => {
                self.var_format = params.trim().to_string();
            }
            "include" => return Ok(self.include_file(params)),
            "import" => self.import_file(params)?,
            "lineguard" => {
                if params.is_empty() {
                    self.line_guard = None;
                } else if params.contains("<line>") {
                    self.line_guard = Some(params.to_string());
                } else {
                    return Err(GrammarError::LineGuardWithoutPlaceholder);
                }
            }
            "max_recursion" => {
                self.recursion_max = params.trim().parse().map_err(|_| {
                    GrammarError::BadDirectiveArgument {
                        directive: command.to_string(),
                        expected: "an integer",
                    }
                })?;
            }
            "var_reuse_prob" => {
                self.var_reuse_prob = params.trim().parse().map_err(|_| {
                    GrammarError::BadDirectiveArgument {
                        directive: command.to_string(),
                        expected: "a number",
                    }
                })?;
            }
            "extends" => {
                let mut args = params.split_whitespace();
                let (Some(child), Some(parent)) = (args.next(), args.next()) else {
                    return Err(GrammarError::BadDirectiveArgument {
                        directive: command.to_string(),
                        expected: "two type names",
                    });
                };
                self.inheritance
                    .entry(child.to_string())
                    .or_default()
                    .push(parent.to_string());
            }
            "begin" if params == "lines" => {
                state.in_code = true;
                state.helper_lines = false;
            }
            "begin" if params == "helperlines" => {
                state.in_code = true;
                state.helper_lines = true;
            }
            "begin" if params.starts_with("function") => {
                let name = FUNCTION_RE
                    .as_ref()
                    .and_then(|re| re.captures(params))
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str().to_string());
                match name {
                    Some(name) if !state.in_function => {
                        state.function_name = name;
                        state.function_body.clear();
                        state.in_function = true;
                    }
                    _ => {
                        return Err(GrammarError::BadFunctionBlock(params.to_string()));
                    }
                }
            }
            "end" if params == "lines" || params == "helperlines" => {
                state.in_code = false;
            }
            "end" if params == "function" => {
                if state.in_function {
                    state.in_function = false;
                    let source = dedent(&state.function_body);
                    self.function_sources.insert(state.function_name.clone(), source);
                }
            }
            other => return Err(GrammarError::UnknownDirective(other.to_string())),
        }
        Ok(0)
    }

    /// `!include F`: parses another file into this grammar. The definitions
    /// directory is swapped for the duration so the included file can itself
    /// include or import relative to its own location.
    fn include_file(&mut self, filename: &str) -> usize {
        let filepath = self.definitions_dir.join(filename);
        let content = match fs::read_to_string(&filepath) {
            Ok(content) => content,
            Err(err) => {
                warn!(path = %filepath.display(), error = %err, "error reading included grammar");
                return 1;
            }
        };

        let nested_dir = filepath.parent().map(Path::to_path_buf).unwrap_or_default();
        let saved_dir = std::mem::replace(&mut self.definitions_dir, nested_dir);
        let errors = self.include_from_string(&content);
        self.definitions_dir = saved_dir;
        errors
    }

    /// `!import F`: parses another file as a sub-grammar mounted under its
    /// base name, addressable via `<import from=NAME ...>`.
    fn import_file(&mut self, filename: &str) -> Result<(), GrammarError> {
        let basename = Path::new(filename)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| GrammarError::ImportFailed(filename.to_string()))?;
        let path: PathBuf = self.definitions_dir.join(filename);

        let mut subgrammar = Grammar::new();
        if subgrammar.parse_from_file(&path) > 0 {
            return Err(GrammarError::ImportFailed(filename.to_string()));
        }
        self.imports.insert(basename, Arc::new(subgrammar));
        Ok(())
    }

    /// Parses a `<sym attrs> = RHS` production.
    fn parse_grammar_line(&mut self, line: &str) -> Result<(), GrammarError> {
        let caps = RULE_RE
            .as_ref()
            .and_then(|re| re.captures(line))
            .ok_or_else(|| GrammarError::MalformedRule(line.to_string()))?;

        let creates = Tag::parse(caps.get(1).map_or("", |m| m.as_str()))?;
        let parts = split_parts(caps.get(2).map_or("", |m| m.as_str()))?;
        let recursive = parts
            .iter()
            .any(|part| matches!(part, Part::Tag(tag) if tag.name() == creates.name()));

        let symbol = creates.name().to_string();
        let nonrecursive = creates.has("nonrecursive");
        let root = creates.has("root");
        let rule = Arc::new(Rule { kind: RuleKind::Grammar, parts, creates: vec![creates], recursive });

        self.creators.entry(symbol.clone()).or_default().push(rule.clone());
        if nonrecursive {
            self.nonrecursive_creators.entry(symbol.clone()).or_default().push(rule.clone());
        }
        self.all_rules.push(rule);
        if root {
            self.root = Some(symbol);
        }
        Ok(())
    }

    /// Parses one line of a code block. The rule registers under every type
    /// its `<new T>` tags declare, and (outside helper blocks) under `line`.
    fn parse_code_line(&mut self, line: &str, helper_lines: bool) -> Result<(), GrammarError> {
        let parts = split_parts(line)?;
        let creates: Vec<Tag> = parts
            .iter()
            .filter_map(|part| match part {
                Part::Tag(tag) if tag.is_new_var() => Some(tag.clone()),
                _ => None,
            })
            .collect();

        let rule = Arc::new(Rule { kind: RuleKind::Code, parts, creates, recursive: false });

        for tag in &rule.creates {
            if is_noninteresting(tag.name()) {
                continue;
            }
            self.creators.entry(tag.name().to_string()).or_default().push(rule.clone());
            if tag.has("nonrecursive") {
                self.nonrecursive_creators
                    .entry(tag.name().to_string())
                    .or_default()
                    .push(rule.clone());
            }
        }
        if !helper_lines {
            self.creators.entry("line".to_string()).or_default().push(rule.clone());
        }
        self.all_rules.push(rule);
        Ok(())
    }

    /// Indexes which line rules consume which types. Recomputed from
    /// scratch so repeated parses and `!include` chains stay duplicate-free.
    pub(crate) fn compute_interesting_indices(&mut self) {
        self.all_nonhelper_lines.clear();
        self.interesting_lines.clear();

        let Some(line_rules) = self.creators.get("line") else { return };
        let line_rules = line_rules.clone();

        for (index, rule) in line_rules.iter().enumerate() {
            self.all_nonhelper_lines.push(index);
            for part in &rule.parts {
                let Part::Tag(tag) = part else { continue };
                if is_noninteresting(tag.name()) || tag.is_new_var() {
                    continue;
                }
                self.interesting_lines.entry(tag.name().to_string()).or_default().push(index);
            }
        }
    }
}
