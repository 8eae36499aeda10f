//! Symbol expansion engine
//!
//! Expansion resolves a symbol to one of its creator rules (weighted by the
//! precomputed CDFs), then walks the rule's right-hand side replacing tags
//! with their expansions. Grammar rules return the filled string; code rules
//! append a statement to the context and return a variable name.
//!
//! Recursion is bounded by the grammar's depth cap. When a sub-expansion
//! exhausts it, the engine retries that sub-expansion once with only
//! non-recursive creators; if that also fails the error propagates.

use std::collections::HashMap;

use rand::Rng;
use rand::seq::IndexedRandom;
use tracing::warn;

use crate::Grammar;
use crate::builtins;
use crate::context::{GenerationContext, Variable, is_noninteresting};
use crate::error::{Error, GrammarError, Result};
use crate::rule::{Part, Rule, RuleKind, RuleRef};
use crate::tag::{Tag, parse_int_literal};

/// Renders `index` through a `var%05d`-style template. Only the `%d` and
/// zero-padded `%0Nd` conversions appear in grammar files; anything else
/// falls back to appending the index.
pub(crate) fn format_variable(fmt: &str, index: usize) -> String {
    if let Some(pos) = fmt.find('%') {
        let rest = &fmt[pos + 1..];
        let digit_count = rest.chars().take_while(char::is_ascii_digit).count();
        let (width_spec, tail) = rest.split_at(digit_count);
        if let Some(tail) = tail.strip_prefix('d') {
            let width: usize = width_spec.parse().unwrap_or(0);
            let number = if width_spec.starts_with('0') {
                format!("{index:0width$}")
            } else {
                format!("{index:width$}")
            };
            return format!("{}{}{}", &fmt[..pos], number, tail);
        }
    }
    format!("{fmt}{index}")
}

fn any_variable<R: Rng>(ctx: &GenerationContext, rng: &mut R) -> Result<String> {
    // One flat draw over every declared name, so each variable is equally
    // likely regardless of how many share its type. Sorted for
    // reproducibility under a seeded RNG (map iteration order is not
    // stable), then deduplicated: the inheritance closure indexes one
    // variable under several types.
    let mut names: Vec<&String> = ctx.variables.values().flatten().collect();
    names.sort_unstable();
    names.dedup();
    let name = names.choose(rng).ok_or(GrammarError::NoVariables)?;
    Ok((*name).clone())
}

impl Grammar {
    /// Expands `symbol`, preferring an existing variable of that type when
    /// the reuse gate fires.
    pub(crate) fn generate<R: Rng>(
        &self,
        symbol: &str,
        ctx: &mut GenerationContext,
        rng: &mut R,
        depth: usize,
        force_nonrecursive: bool,
    ) -> Result<String> {
        if !is_noninteresting(symbol) {
            let reuse = match ctx.variables.get(symbol) {
                Some(names)
                    if !names.is_empty()
                        && (ctx.force_var_reuse
                            || rng.random::<f64>() < self.var_reuse_prob
                            || names.len() > self.max_vars_of_same_type) =>
                {
                    names.choose(rng).cloned()
                }
                _ => None,
            };
            if let Some(name) = reuse {
                ctx.force_var_reuse = false;
                return Ok(name);
            }
        }

        let rule = self.select_creator(symbol, depth, force_nonrecursive, rng)?;
        self.expand_rule(symbol, &rule, ctx, rng, depth, force_nonrecursive)
    }

    /// Picks a creator rule for `symbol`: uniformly when the symbol's CDF is
    /// empty, by binary search against a random draw otherwise.
    fn select_creator<R: Rng>(
        &self,
        symbol: &str,
        depth: usize,
        force_nonrecursive: bool,
        rng: &mut R,
    ) -> Result<RuleRef> {
        let Some(creators) = self.creators.get(symbol) else {
            return Err(GrammarError::NoCreators(symbol.to_string()).into());
        };
        if depth >= self.recursion_max {
            return Err(Error::RecursionLimit(symbol.to_string()));
        }

        let (rules, cdf) = match self.nonrecursive_creators.get(symbol) {
            Some(nonrecursive) if force_nonrecursive => {
                (nonrecursive, self.nonrecursive_creator_cdfs.get(symbol))
            }
            _ => (creators, self.creator_cdfs.get(symbol)),
        };

        let cdf = cdf.map_or(&[] as &[f64], Vec::as_slice);
        if cdf.is_empty() {
            let rule = rules.choose(rng).ok_or_else(|| GrammarError::NoCreators(symbol.to_string()))?;
            return Ok(rule.clone());
        }

        let draw: f64 = rng.random();
        // Clamp for float rounding: the last cumulative value may fall a hair
        // below a draw near 1.0.
        let index = cdf.partition_point(|&p| p < draw).min(rules.len() - 1);
        Ok(rules[index].clone())
    }

    /// Expands one rule's right-hand side.
    pub(crate) fn expand_rule<R: Rng>(
        &self,
        symbol: &str,
        rule: &Rule,
        ctx: &mut GenerationContext,
        rng: &mut R,
        depth: usize,
        force_nonrecursive: bool,
    ) -> Result<String> {
        // Fragments memoized by a part's `id` attribute; a later part with
        // the same id repeats the earlier expansion verbatim.
        let mut fragment_ids: HashMap<String, String> = HashMap::new();
        let mut new_vars: Vec<Variable> = Vec::new();
        let mut ret_vars: Vec<String> = Vec::new();
        let mut fragments: Vec<String> = Vec::new();

        for part in &rule.parts {
            let tag = match part {
                Part::Text(text) => {
                    fragments.push(text.clone());
                    continue;
                }
                Part::Tag(tag) => tag,
            };

            if let Some(id) = tag.value("id") {
                if let Some(previous) = fragment_ids.get(id) {
                    fragments.push(previous.clone());
                    continue;
                }
            }

            let mut expanded = if rule.kind == RuleKind::Code && tag.is_new_var() {
                ctx.last_var_index += 1;
                let var_name = format_variable(&self.var_format, ctx.last_var_index);
                let var_type = tag.name().to_string();
                if var_type == symbol {
                    ret_vars.push(var_name.clone());
                }
                let declaration = format!("/* newvar{{{var_name}:{var_type}}} */ var {var_name}");
                new_vars.push(Variable { name: var_name, var_type });
                declaration
            } else if let Some(constant) = builtins::constant_value(tag.name()) {
                constant.to_string()
            } else if builtins::is_built_in(tag.name()) {
                builtins::generate(self, tag, rng)?
            } else if tag.name() == "call" {
                let function = tag.value("function").ok_or(GrammarError::MissingAttribute {
                    tag: "call".to_string(),
                    attribute: "function",
                })?;
                self.exec_function(function, tag, ctx, String::new())?
            } else if tag.name() == "any" {
                any_variable(ctx, rng)?
            } else {
                match self.generate(tag.name(), ctx, rng, depth + 1, force_nonrecursive) {
                    Ok(text) => text,
                    Err(err) if err.is_recursion_limit() && !force_nonrecursive => {
                        self.generate(tag.name(), ctx, rng, depth + 1, true)?
                    }
                    Err(err) => return Err(err),
                }
            };

            if let Some(id) = tag.value("id") {
                fragment_ids.insert(id.to_string(), expanded.clone());
            }

            if let Some(hook) = tag.value("beforeoutput") {
                expanded = self.exec_function(hook, tag, ctx, expanded)?;
            }

            fragments.push(expanded);
        }

        // Register the new variables and synthesize their fuzzervars
        // bookkeeping statements.
        let mut additional_lines = Vec::new();
        for var in &new_vars {
            if is_noninteresting(&var.var_type) {
                continue;
            }
            self.add_variable(&var.name, &var.var_type, ctx);
            additional_lines.push(format!(
                "if (!{name}) {{ {name} = GetVariable(fuzzervars, '{ty}'); }} else {{ {setters} }}",
                name = var.name,
                ty = var.var_type,
                setters = self.variable_setters(&var.name, &var.var_type),
            ));
        }

        let filled = fragments.concat();
        match rule.kind {
            RuleKind::Grammar => Ok(filled),
            RuleKind::Code => {
                ctx.lines.push(self.guard_line(&filled));
                for line in additional_lines {
                    ctx.lines.push(self.guard_line(&line));
                }
                if symbol == "line" {
                    Ok(filled)
                } else {
                    ret_vars
                        .choose(rng)
                        .cloned()
                        .ok_or_else(|| GrammarError::NoCreators(symbol.to_string()).into())
                }
            }
        }
    }

    /// Registers a variable under its type and, transitively, every parent
    /// type. The first variable of a type merges that type's interesting
    /// lines into the context.
    pub(crate) fn add_variable(&self, name: &str, var_type: &str, ctx: &mut GenerationContext) {
        if is_noninteresting(var_type) {
            return;
        }
        if !ctx.variables.contains_key(var_type) {
            ctx.variables.insert(var_type.to_string(), Vec::new());
            if let Some(indices) = self.interesting_lines.get(var_type) {
                for &index in indices {
                    if !ctx.interesting_lines.contains(&index) {
                        ctx.interesting_lines.push(index);
                    }
                }
            }
        }
        if let Some(names) = ctx.variables.get_mut(var_type) {
            names.push(name.to_string());
        }
        if let Some(parents) = self.inheritance.get(var_type) {
            for parent in parents {
                self.add_variable(name, parent, ctx);
            }
        }
    }

    /// `SetVariable` statements for a variable's type and every ancestor,
    /// depth-first in declaration order.
    pub(crate) fn variable_setters(&self, name: &str, var_type: &str) -> String {
        let mut out = format!("SetVariable(fuzzervars, {name}, '{var_type}'); ");
        if let Some(parents) = self.inheritance.get(var_type) {
            for parent in parents {
                out.push_str(&self.variable_setters(name, parent));
            }
        }
        out
    }

    fn guard_line(&self, line: &str) -> String {
        match &self.line_guard {
            Some(guard) => guard.replace("<line>", line),
            None => line.to_string(),
        }
    }

    /// Code-mode driver: expands `line` rules until `num_lines` statements
    /// exist, preferring lines that consume already-declared variables.
    pub(crate) fn generate_code_impl<R: Rng>(
        &self,
        num_lines: usize,
        initial_vars: &[Variable],
        last_var_start: usize,
        rng: &mut R,
    ) -> Result<String> {
        let Some(line_rules) = self.creators.get("line") else {
            return Err(GrammarError::NoLineRules.into());
        };
        if self.all_nonhelper_lines.is_empty() {
            return Err(GrammarError::NoLineRules.into());
        }

        let mut ctx = GenerationContext::with_var_start(last_var_start);
        for var in initial_vars {
            self.add_variable(&var.name, &var.var_type, &mut ctx);
        }
        if self.dom_globals {
            self.add_variable("document", "Document", &mut ctx);
            self.add_variable("window", "Window", &mut ctx);
        }

        while ctx.lines.len() < num_lines {
            // Transactional attempt: commit on success, drop on recursion
            // exhaustion and redraw.
            let mut attempt = ctx.clone();
            let line_no = if rng.random::<f64>() < self.interesting_line_prob
                && !attempt.interesting_lines.is_empty()
            {
                attempt.force_var_reuse = true;
                attempt.interesting_lines[rng.random_range(0..attempt.interesting_lines.len())]
            } else {
                self.all_nonhelper_lines[rng.random_range(0..self.all_nonhelper_lines.len())]
            };
            let Some(rule) = line_rules.get(line_no).cloned() else {
                return Err(GrammarError::NoLineRules.into());
            };

            match self.expand_rule("line", &rule, &mut attempt, rng, 0, false) {
                Ok(_) => ctx = attempt,
                Err(Error::RecursionLimit(sym)) => {
                    warn!(symbol = %sym, "maximum recursion depth reached, retrying line");
                }
                Err(err) => return Err(err),
            }
        }

        Ok(ctx.lines.join("\n"))
    }

    /// `<import from=NAME symbol=SYM>`: expands a symbol from a mounted
    /// sub-grammar, or its root when `symbol` is absent.
    pub(crate) fn generate_import_tag<R: Rng>(&self, tag: &Tag, rng: &mut R) -> Result<String> {
        let from = tag.value("from").ok_or(GrammarError::MissingAttribute {
            tag: "import".to_string(),
            attribute: "from",
        })?;
        let subgrammar =
            self.imports.get(from).ok_or_else(|| GrammarError::UnknownImport(from.to_string()))?;
        match tag.value("symbol") {
            Some(symbol) => subgrammar.generate_symbol_with_rng(symbol, rng),
            None => subgrammar.generate_root_with_rng(rng),
        }
    }

    /// `<lines count=N>`: runs code generation for `N` lines.
    pub(crate) fn generate_lines_tag<R: Rng>(&self, tag: &Tag, rng: &mut R) -> Result<String> {
        let count = match tag.value("count") {
            Some(text) => parse_int_literal(text)?,
            None => {
                return Err(GrammarError::MissingAttribute {
                    tag: "lines".to_string(),
                    attribute: "count",
                }
                .into());
            }
        };
        let count = usize::try_from(count)
            .map_err(|_| GrammarError::InvalidInteger(count.to_string()))?;
        self.generate_code_impl(count, &[], 0, rng)
    }

    /// Invokes a registered callback with the tag's attributes, the live
    /// context, and the current fragment value.
    pub(crate) fn exec_function(
        &self,
        name: &str,
        tag: &Tag,
        ctx: &mut GenerationContext,
        ret_val: String,
    ) -> Result<String> {
        let callback = self
            .functions
            .get(name)
            .ok_or_else(|| GrammarError::UnknownFunction(name.to_string()))?;
        callback(tag, ctx, &ret_val).map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_format_zero_pads() {
        assert_eq!(format_variable("var%05d", 7), "var00007");
        assert_eq!(format_variable("var%05d", 123456), "var123456");
        assert_eq!(format_variable("v%d_", 3), "v3_");
        assert_eq!(format_variable("plain", 9), "plain9");
    }

    #[test]
    fn setters_walk_inheritance_depth_first() {
        let mut grammar = Grammar::new();
        assert_eq!(
            grammar.parse_from_string("!extends Square Shape\n!extends Shape Node\n<root root> = x"),
            0
        );
        assert_eq!(
            grammar.variable_setters("v1", "Square"),
            "SetVariable(fuzzervars, v1, 'Square'); \
             SetVariable(fuzzervars, v1, 'Shape'); \
             SetVariable(fuzzervars, v1, 'Node'); "
        );
    }

    #[test]
    fn add_variable_closes_over_inheritance() {
        let mut grammar = Grammar::new();
        assert_eq!(grammar.parse_from_string("!extends Square Shape\n<root root> = x"), 0);
        let mut ctx = GenerationContext::default();
        grammar.add_variable("v1", "Square", &mut ctx);
        assert_eq!(ctx.variables["Square"], vec!["v1"]);
        assert_eq!(ctx.variables["Shape"], vec!["v1"]);
    }

    #[test]
    fn add_variable_ignores_noninteresting_types() {
        let grammar = Grammar::new();
        let mut ctx = GenerationContext::default();
        grammar.add_variable("v1", "DOMString", &mut ctx);
        assert!(ctx.variables.is_empty());
    }
}
