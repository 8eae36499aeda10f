//! HTML post-processing: id injection and variable harvesting
//!
//! Generated markup alone is not enough for code mode; the script grammar
//! wants typed variables referring to the document's elements. This module
//! rewrites every recognized opening tag to carry a fresh `id` attribute,
//! records a matching variable, and emits the `getElementById` /
//! `createElement` declarations that bind those variables at runtime.

use domfuzz_grammar::Variable;
use once_cell::sync::Lazy;
use rand::Rng;
use rand::seq::IndexedRandom;
use regex::{Captures, Regex};

use crate::tag_types::TagTypeMap;

// Matches an opening tag up to and including the space after its name,
// e.g. `<div ` — tags without attributes are left alone.
static OPEN_TAG_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"<[a-zA-Z0-9_-]+ ").ok());

/// Variables harvested from one sample's markup, plus the declaration
/// statements that bind them.
#[derive(Debug, Default)]
pub struct ScanContext {
    /// Typed variables to seed script generation with
    pub variables: Vec<Variable>,
    /// `/* newvar{...} */ var ...` declarations, one per harvested variable
    pub declarations: String,
    html_counter: usize,
    svg_counter: usize,
}

impl ScanContext {
    fn next_html_var(&mut self) -> String {
        self.html_counter += 1;
        format!("htmlvar{:05}", self.html_counter)
    }

    fn next_svg_var(&mut self) -> String {
        self.svg_counter += 1;
        format!("svgvar{:05}", self.svg_counter)
    }
}

/// Rewrites recognized opening tags to carry fresh element ids, harvesting
/// one typed variable per rewritten tag. Unrecognized tags pass through.
pub fn inject_element_ids(html: &str, types: &TagTypeMap, ctx: &mut ScanContext) -> String {
    let Some(re) = OPEN_TAG_RE.as_ref() else {
        return html.to_string();
    };

    re.replace_all(html, |caps: &Captures<'_>| {
        let whole = &caps[0];
        let tag_name = &whole[1..whole.len() - 1];

        if let Some(var_type) = types.html.get(tag_name) {
            let name = ctx.next_html_var();
            ctx.variables.push(Variable::new(&name, var_type));
            ctx.declarations.push_str(&format!(
                "/* newvar{{{name}:{var_type}}} */ var {name} = document.getElementById(\"{name}\"); //{var_type}\n"
            ));
            format!("{whole}id=\"{name}\" ")
        } else if let Some(var_type) = types.svg.get(tag_name) {
            let name = ctx.next_svg_var();
            ctx.variables.push(Variable::new(&name, var_type));
            ctx.declarations.push_str(&format!(
                "/* newvar{{{name}:{var_type}}} */ var {name} = document.getElementById(\"{name}\"); //{var_type}\n"
            ));
            format!("{whole}id=\"{name}\" ")
        } else {
            whole.to_string()
        }
    })
    .into_owned()
}

/// Pre-creates `count` elements via `document.createElement`, harvesting a
/// variable for each, so scripts have elements to play with even when the
/// markup contributed none.
pub fn pregenerate_elements<R: Rng>(
    ctx: &mut ScanContext,
    count: usize,
    types: &TagTypeMap,
    rng: &mut R,
) {
    let tags = types.html_tags_sorted();
    for _ in 0..count {
        let Some(tag_name) = tags.choose(rng) else { return };
        let Some(var_type) = types.html.get(*tag_name) else { continue };
        let name = ctx.next_html_var();
        ctx.variables.push(Variable::new(&name, var_type));
        ctx.declarations.push_str(&format!(
            "/* newvar{{{name}:{var_type}}} */ var {name} = document.createElement(\"{tag_name}\"); //{var_type}\n"
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn recognized_tags_get_ids_and_variables() {
        let mut ctx = ScanContext::default();
        let html = "<div class=\"x\">hi</div><span >there</span>";
        let out = inject_element_ids(html, &TagTypeMap::builtin(), &mut ctx);

        assert_eq!(
            out,
            "<div id=\"htmlvar00001\" class=\"x\">hi</div><span id=\"htmlvar00002\" >there</span>"
        );
        assert_eq!(ctx.variables.len(), 2);
        assert_eq!(ctx.variables[0], Variable::new("htmlvar00001", "HTMLDivElement"));
        assert!(ctx.declarations.contains(
            "/* newvar{htmlvar00001:HTMLDivElement} */ var htmlvar00001 = \
             document.getElementById(\"htmlvar00001\"); //HTMLDivElement"
        ));
    }

    #[test]
    fn svg_tags_use_their_own_counter() {
        let mut ctx = ScanContext::default();
        let html = "<div a=1><circle r=4><rect w=1>";
        inject_element_ids(html, &TagTypeMap::builtin(), &mut ctx);
        let names: Vec<&str> = ctx.variables.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["htmlvar00001", "svgvar00001", "svgvar00002"]);
    }

    #[test]
    fn unknown_and_attributeless_tags_pass_through() {
        let mut ctx = ScanContext::default();
        let html = "<customthing a=1><div>bare</div>";
        let out = inject_element_ids(html, &TagTypeMap::builtin(), &mut ctx);
        assert_eq!(out, html);
        assert!(ctx.variables.is_empty());
    }

    #[test]
    fn pregenerated_elements_are_created_not_fetched() {
        let mut ctx = ScanContext::default();
        let mut rng = StdRng::seed_from_u64(9);
        pregenerate_elements(&mut ctx, 5, &TagTypeMap::builtin(), &mut rng);
        assert_eq!(ctx.variables.len(), 5);
        assert_eq!(ctx.declarations.matches("document.createElement").count(), 5);
        assert!(ctx.declarations.contains("htmlvar00005"));
    }

    #[test]
    fn pregeneration_is_reproducible_under_a_seed() {
        let types = TagTypeMap::builtin();
        let mut first = ScanContext::default();
        let mut second = ScanContext::default();
        pregenerate_elements(&mut first, 8, &types, &mut StdRng::seed_from_u64(3));
        pregenerate_elements(&mut second, 8, &types, &mut StdRng::seed_from_u64(3));
        assert_eq!(first.declarations, second.declarations);
    }
}
