//! End-to-end expansion scenarios against literal grammars.

use std::collections::HashMap;
use std::sync::Arc;

use domfuzz_grammar::{Error, Grammar, GrammarError, Variable};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn parsed(source: &str) -> Grammar {
    let mut grammar = Grammar::new();
    let errors = grammar.parse_from_string(source);
    assert_eq!(errors, 0, "grammar failed to parse: {source}");
    grammar
}

#[test]
fn constant_tags_produce_reserved_characters() {
    let grammar = parsed("<root root> = A<lt>B<gt>C");
    let mut rng = StdRng::seed_from_u64(0);
    assert_eq!(grammar.generate_root_with_rng(&mut rng).unwrap(), "A<B>C");
}

#[test]
fn literal_text_round_trips() {
    let grammar = parsed("<root root> = hello world");
    assert_eq!(grammar.generate_root().unwrap(), "hello world");
}

#[test]
fn uniform_alternation_hits_both_arms() {
    let grammar = parsed("<root root> = <x>\n<x> = foo\n<x> = bar");
    let mut rng = StdRng::seed_from_u64(99);
    let mut foo = 0usize;
    let trials = 2000;
    for _ in 0..trials {
        match grammar.generate_root_with_rng(&mut rng).unwrap().as_str() {
            "foo" => foo += 1,
            "bar" => {}
            other => panic!("unexpected expansion {other:?}"),
        }
    }
    let ratio = foo as f64 / trials as f64;
    assert!((0.4..=0.6).contains(&ratio), "uniform ratio drifted: {ratio}");
}

#[test]
fn weighted_alternation_follows_the_cdf() {
    let grammar = parsed("<root root> = <x>\n<x p=0.25> = foo\n<x p=0.75> = bar");
    let mut rng = StdRng::seed_from_u64(7);
    let mut foo = 0usize;
    let trials = 4000;
    for _ in 0..trials {
        if grammar.generate_root_with_rng(&mut rng).unwrap() == "foo" {
            foo += 1;
        }
    }
    let ratio = foo as f64 / trials as f64;
    assert!((0.2..=0.3).contains(&ratio), "weighted ratio drifted: {ratio}");
}

#[test]
fn degenerate_integer_range_is_exact() {
    let grammar = parsed("<root root> = <uint8 min=0 max=0>");
    assert_eq!(grammar.generate_root().unwrap(), "0");
}

#[test]
fn binary_integer_packs_a_single_byte() {
    let grammar = parsed("<root root> = <uint8 min=1 max=1 b>");
    assert_eq!(grammar.generate_root().unwrap(), "\u{01}");
}

#[test]
fn inverted_integer_range_fails_expansion() {
    let grammar = parsed("<root root> = <uint8 min=9 max=1>");
    assert_eq!(
        grammar.generate_root(),
        Err(Error::Grammar(GrammarError::RangeInversion("uint8".to_string())))
    );
}

#[test]
fn recursion_fallback_terminates_in_the_leaf() {
    let source = "\
!max_recursion 3
<root root> = <x>
<x> = (<x>)
<x nonrecursive> = leaf
";
    let grammar = parsed(source);
    let mut rng = StdRng::seed_from_u64(5);
    for _ in 0..200 {
        let out = grammar.generate_root_with_rng(&mut rng).unwrap();
        let open = out.chars().take_while(|&c| c == '(').count();
        assert_eq!(out, format!("{}leaf{}", "(".repeat(open), ")".repeat(open)));
        assert!(open <= 3, "recursion exceeded the cap: {out}");
    }
}

#[test]
fn recursion_without_fallback_propagates() {
    let source = "\
!max_recursion 4
<root root> = <x>
<x> = (<x>)
";
    let grammar = parsed(source);
    let mut rng = StdRng::seed_from_u64(1);
    assert_eq!(
        grammar.generate_root_with_rng(&mut rng),
        Err(Error::RecursionLimit("x".to_string()))
    );
}

#[test]
fn unknown_symbol_fails_expansion() {
    let grammar = parsed("<root root> = <ghost>");
    assert_eq!(
        grammar.generate_root(),
        Err(Error::Grammar(GrammarError::NoCreators("ghost".to_string())))
    );
}

#[test]
fn generate_root_without_root_is_an_error() {
    let grammar = parsed("<x> = y");
    assert_eq!(grammar.generate_root(), Err(Error::Grammar(GrammarError::NoRoot)));
    assert_eq!(grammar.generate_symbol("x").unwrap(), "y");
}

#[test]
fn id_attribute_aliases_within_a_rule() {
    let grammar = parsed("<root root> = <x id=a>-<x id=a>\n<x> = foo\n<x> = bar");
    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..50 {
        let out = grammar.generate_root_with_rng(&mut rng).unwrap();
        let (left, right) = out.split_once('-').unwrap();
        assert_eq!(left, right, "id-aliased parts diverged: {out}");
    }
}

#[test]
fn call_tag_invokes_registered_callback() {
    let mut grammar = Grammar::new();
    assert_eq!(grammar.parse_from_string("<root root> = [<call function=greet who=world>]"), 0);
    grammar.register_function("greet", |tag, _ctx, _value| {
        Ok(format!("hello {}", tag.value("who").unwrap_or("?")))
    });
    assert_eq!(grammar.generate_root().unwrap(), "[hello world]");
}

#[test]
fn call_tag_without_function_attribute_fails() {
    let grammar = parsed("<root root> = <call>");
    assert_eq!(
        grammar.generate_root(),
        Err(Error::Grammar(GrammarError::MissingAttribute {
            tag: "call".to_string(),
            attribute: "function",
        }))
    );
}

#[test]
fn call_tag_with_unregistered_function_fails() {
    let grammar = parsed("<root root> = <call function=nope>");
    assert_eq!(
        grammar.generate_root(),
        Err(Error::Grammar(GrammarError::UnknownFunction("nope".to_string())))
    );
}

#[test]
fn beforeoutput_rewrites_the_fragment() {
    let mut grammar = Grammar::new();
    assert_eq!(grammar.parse_from_string("<root root> = <x beforeoutput=shout>\n<x> = quiet"), 0);
    grammar.register_function("shout", |_tag, _ctx, value| Ok(value.to_uppercase()));
    assert_eq!(grammar.generate_root().unwrap(), "QUIET");
}

#[test]
fn captured_function_source_still_needs_a_host_callback() {
    let source = "\
!begin function mangle
    ret_val = ret_val.upper()
!end function
<root root> = <call function=mangle>
";
    let grammar = parsed(source);
    assert_eq!(grammar.function_source("mangle"), Some("ret_val = ret_val.upper()"));
    assert_eq!(
        grammar.generate_root(),
        Err(Error::Grammar(GrammarError::UnknownFunction("mangle".to_string())))
    );
}

#[test]
fn mounted_import_expands_root_and_symbols() {
    let sub = parsed("<root root> = SUBROOT\n<word> = SUBWORD");
    let mut grammar = Grammar::new();
    assert_eq!(
        grammar.parse_from_string("<root root> = [<import from=sub>|<import from=sub symbol=word>]"),
        0
    );
    grammar.add_import("sub", Arc::new(sub));
    assert_eq!(grammar.generate_root().unwrap(), "[SUBROOT|SUBWORD]");
}

#[test]
fn import_without_mount_fails() {
    let grammar = parsed("<root root> = <import from=ghost>");
    assert_eq!(
        grammar.generate_root(),
        Err(Error::Grammar(GrammarError::UnknownImport("ghost".to_string())))
    );
}

#[test]
fn any_tag_is_uniform_over_variable_names_not_types() {
    let source = "\
!begin lines
pick(<any>);
!end lines
";
    let mut grammar = Grammar::new();
    assert_eq!(grammar.parse_from_string(source), 0);
    grammar.set_dom_globals(false);

    // One Element variable against nine Node variables: a uniform draw over
    // names gives every variable 1/10, while a type-first draw would hand
    // the lone Element half of all picks.
    let mut vars = vec![Variable::new("elem0", "Element")];
    for i in 1..=9 {
        vars.push(Variable::new(format!("node{i}"), "Node"));
    }

    let mut rng = StdRng::seed_from_u64(13);
    let mut counts: HashMap<String, usize> = HashMap::new();
    let trials = 5000;
    for _ in 0..trials {
        let line = grammar.generate_code_with_rng(1, &vars, 0, &mut rng).unwrap();
        let name = line
            .strip_prefix("pick(")
            .and_then(|rest| rest.strip_suffix(");"))
            .unwrap_or_else(|| panic!("unexpected line {line:?}"));
        *counts.entry(name.to_string()).or_default() += 1;
    }

    assert_eq!(counts.len(), 10, "every variable should be drawn: {counts:?}");
    for (name, count) in &counts {
        let ratio = *count as f64 / trials as f64;
        assert!((0.05..=0.15).contains(&ratio), "{name} drawn with ratio {ratio}, expected ~0.10");
    }
}

#[test]
fn any_tag_without_variables_fails() {
    let grammar = parsed("<root root> = <any>");
    assert_eq!(grammar.generate_root(), Err(Error::Grammar(GrammarError::NoVariables)));
}

#[test]
fn seeded_generation_is_reproducible() {
    let source = "\
<root root> = <x><x><x><x>
<x> = <hex>
<x> = (<x>)
<x nonrecursive> = <string minlength=2 maxlength=5 min=97 max=122>
";
    let grammar = parsed(source);
    let mut first_rng = StdRng::seed_from_u64(1234);
    let mut second_rng = StdRng::seed_from_u64(1234);
    for _ in 0..20 {
        assert_eq!(
            grammar.generate_root_with_rng(&mut first_rng).unwrap(),
            grammar.generate_root_with_rng(&mut second_rng).unwrap()
        );
    }
}

#[test]
fn comments_do_not_reach_the_output() {
    let grammar = parsed("<root root> = visible # not this\n");
    assert_eq!(grammar.generate_root().unwrap(), "visible");
}

#[test]
fn hash_constant_survives_comment_stripping() {
    // Literal '#' must come from the constant tag, never from raw text.
    let grammar = parsed("<root root> = color: <hash><hex><hex><hex>");
    let out = grammar.generate_root().unwrap();
    assert!(out.starts_with("color: #"));
    assert_eq!(out.len(), "color: #".len() + 3);
}
