//! Batch sample generation on top of `domfuzz-grammar`
//!
//! This crate is the collaborator layer around the grammar engine: it loads
//! the HTML/CSS/JS grammar trio, expands sample templates
//! (`<cssfuzzer>` / `<htmlfuzzer>` / `<jsfuzzer>` placeholders), injects
//! element ids into the generated markup so scripts can address the DOM,
//! and writes batches of output files. The `domfuzz` binary is a thin CLI
//! over [`SampleBuilder`].

use std::path::PathBuf;

use thiserror::Error;

mod sample;
mod scan;
mod tag_types;

pub use sample::SampleBuilder;
pub use scan::{ScanContext, inject_element_ids, pregenerate_elements};
pub use tag_types::TagTypeMap;

/// Errors from sample assembly.
#[derive(Debug, Error)]
pub enum SampleError {
    /// A grammar file failed to parse; the count comes from the engine's
    /// per-line error reporting.
    #[error("grammar '{file}' failed to parse with {errors} error(s)")]
    GrammarParse { file: String, errors: usize },

    /// Expansion failed inside the grammar engine
    #[error(transparent)]
    Generate(#[from] domfuzz_grammar::Error),

    /// Filesystem error reading a template or table
    #[error("error reading {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A tag-type table that is not valid JSON for the expected shape
    #[error("error parsing tag-type map {path}")]
    TagTypes {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
