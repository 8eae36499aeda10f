//! Template expansion into complete fuzzing samples
//!
//! A sample template is an HTML file with `<cssfuzzer>`, `<htmlfuzzer>`,
//! and `<jsfuzzer>` placeholders. Expansion generates a stylesheet and body
//! markup, harvests element variables out of the markup, then fills every
//! script placeholder with a generated function body that can see those
//! variables.

use std::path::Path;
use std::sync::Arc;

use domfuzz_grammar::Grammar;
use rand::Rng;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::scan::{ScanContext, inject_element_ids, pregenerate_elements};
use crate::tag_types::TagTypeMap;
use crate::SampleError;

const CSS_PLACEHOLDER: &str = "<cssfuzzer>";
const HTML_PLACEHOLDER: &str = "<htmlfuzzer>";
const JS_PLACEHOLDER: &str = "<jsfuzzer>";

/// Builds complete samples from a template and a set of grammars.
pub struct SampleBuilder {
    html_grammar: Grammar,
    css_grammar: Arc<Grammar>,
    js_grammar: Grammar,
    tag_types: TagTypeMap,
    /// Elements pre-created per sample beyond what the markup contributes
    pregenerated_elements: usize,
    /// Lines in the first (main) script body
    main_lines: usize,
    /// Lines in each subsequent (event handler) script body
    handler_lines: usize,
}

impl std::fmt::Debug for SampleBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleBuilder")
            .field("pregenerated_elements", &self.pregenerated_elements)
            .field("main_lines", &self.main_lines)
            .field("handler_lines", &self.handler_lines)
            .finish_non_exhaustive()
    }
}

impl SampleBuilder {
    /// Loads `html.txt`, `css.txt`, and `js.txt` from a grammar directory
    /// and mounts the CSS grammar into the other two as `cssgrammar`.
    pub fn from_grammar_dir(dir: impl AsRef<Path>) -> Result<Self, SampleError> {
        let dir = dir.as_ref();
        let css = Arc::new(Self::load_grammar(dir, "css.txt")?);
        let mut html = Self::load_grammar(dir, "html.txt")?;
        let mut js = Self::load_grammar(dir, "js.txt")?;
        html.add_import("cssgrammar", css.clone());
        js.add_import("cssgrammar", css.clone());
        Ok(Self::with_grammars(html, css, js))
    }

    /// Assembles a builder from already-parsed grammars. The caller is
    /// responsible for any cross-grammar imports.
    pub fn with_grammars(html: Grammar, css: Arc<Grammar>, js: Grammar) -> Self {
        SampleBuilder {
            html_grammar: html,
            css_grammar: css,
            js_grammar: js,
            tag_types: TagTypeMap::builtin(),
            pregenerated_elements: 5,
            main_lines: 1000,
            handler_lines: 500,
        }
    }

    fn load_grammar(dir: &Path, file: &str) -> Result<Grammar, SampleError> {
        let mut grammar = Grammar::new();
        let errors = grammar.parse_from_file(dir.join(file));
        if errors > 0 {
            return Err(SampleError::GrammarParse { file: file.to_string(), errors });
        }
        Ok(grammar)
    }

    /// Replaces the tag→type tables used for id injection.
    pub fn set_tag_types(&mut self, tag_types: TagTypeMap) {
        self.tag_types = tag_types;
    }

    /// Overrides the script body sizes (main body, then event handlers).
    pub fn set_script_lines(&mut self, main_lines: usize, handler_lines: usize) {
        self.main_lines = main_lines;
        self.handler_lines = handler_lines;
    }

    /// Overrides how many elements are pre-created per sample.
    pub fn set_pregenerated_elements(&mut self, count: usize) {
        self.pregenerated_elements = count;
    }

    /// Expands one template into a sample with a fresh OS-seeded RNG.
    pub fn build_sample(&self, template: &str) -> Result<String, SampleError> {
        self.build_sample_with_rng(template, &mut StdRng::from_os_rng())
    }

    /// Expands one template into a sample using the caller's RNG.
    pub fn build_sample_with_rng<R: Rng>(
        &self,
        template: &str,
        rng: &mut R,
    ) -> Result<String, SampleError> {
        let css = self.css_grammar.generate_symbol_with_rng("rules", rng)?;
        let html = self.html_grammar.generate_symbol_with_rng("bodyelements", rng)?;

        let mut scan = ScanContext::default();
        let html = inject_element_ids(&html, &self.tag_types, &mut scan);
        pregenerate_elements(&mut scan, self.pregenerated_elements, &self.tag_types, rng);

        let mut result = template.replace(CSS_PLACEHOLDER, &css).replace(HTML_PLACEHOLDER, &html);

        let mut num_lines = self.main_lines;
        while result.contains(JS_PLACEHOLDER) {
            let body = self.function_body(&scan, num_lines, rng)?;
            result = result.replacen(JS_PLACEHOLDER, &body, 1);
            num_lines = self.handler_lines;
        }
        Ok(result)
    }

    /// One script body: fuzzervars prologue, harvested element bindings,
    /// generated statements, teardown.
    fn function_body<R: Rng>(
        &self,
        scan: &ScanContext,
        num_lines: usize,
        rng: &mut R,
    ) -> Result<String, SampleError> {
        let mut js = String::new();
        js.push_str("var fuzzervars = {};\n\n");
        js.push_str(
            "SetVariable(fuzzervars, window, 'Window');\n\
             SetVariable(fuzzervars, document, 'Document');\n\
             SetVariable(fuzzervars, document.body.firstChild, 'Element');\n\n",
        );
        js.push_str("//beginjs\n");
        js.push_str(&scan.declarations);
        js.push_str(&self.js_grammar.generate_code_with_rng(num_lines, &scan.variables, 0, rng)?);
        js.push_str("\n//endjs\n");
        js.push_str("var fuzzervars = {};\nfreememory()\n");
        Ok(js)
    }
}
