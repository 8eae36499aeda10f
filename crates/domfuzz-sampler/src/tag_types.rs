//! Element-tag to engine-type tables
//!
//! The full HTML/SVG tables are data consumed by the sampler, loadable from
//! JSON. The built-in default covers the common elements so the sampler
//! works out of the box.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::SampleError;

/// Maps markup tag names to the grammar type of the element they create.
///
/// HTML and SVG tags live in separate tables because harvested variables
/// get different name prefixes per namespace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagTypeMap {
    /// HTML tag name → interface type, e.g. `a` → `HTMLAnchorElement`
    #[serde(default)]
    pub html: HashMap<String, String>,
    /// SVG tag name → interface type, e.g. `circle` → `SVGCircleElement`
    #[serde(default)]
    pub svg: HashMap<String, String>,
}

impl TagTypeMap {
    /// Loads a table from a JSON file of the shape
    /// `{"html": {"a": "HTMLAnchorElement", ...}, "svg": {...}}`.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SampleError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|source| SampleError::Io { path: path.to_path_buf(), source })?;
        serde_json::from_str(&text)
            .map_err(|source| SampleError::TagTypes { path: path.to_path_buf(), source })
    }

    /// A compact default covering the common HTML and SVG elements.
    pub fn builtin() -> Self {
        let html = [
            ("a", "HTMLAnchorElement"),
            ("audio", "HTMLAudioElement"),
            ("body", "HTMLBodyElement"),
            ("button", "HTMLButtonElement"),
            ("canvas", "HTMLCanvasElement"),
            ("div", "HTMLDivElement"),
            ("form", "HTMLFormElement"),
            ("iframe", "HTMLIFrameElement"),
            ("img", "HTMLImageElement"),
            ("input", "HTMLInputElement"),
            ("li", "HTMLLIElement"),
            ("option", "HTMLOptionElement"),
            ("p", "HTMLParagraphElement"),
            ("select", "HTMLSelectElement"),
            ("span", "HTMLSpanElement"),
            ("style", "HTMLStyleElement"),
            ("table", "HTMLTableElement"),
            ("td", "HTMLTableCellElement"),
            ("textarea", "HTMLTextAreaElement"),
            ("tr", "HTMLTableRowElement"),
            ("ul", "HTMLUListElement"),
            ("video", "HTMLVideoElement"),
        ];
        let svg = [
            ("animate", "SVGAnimateElement"),
            ("circle", "SVGCircleElement"),
            ("clipPath", "SVGClipPathElement"),
            ("defs", "SVGDefsElement"),
            ("ellipse", "SVGEllipseElement"),
            ("feGaussianBlur", "SVGFEGaussianBlurElement"),
            ("filter", "SVGFilterElement"),
            ("g", "SVGGElement"),
            ("image", "SVGImageElement"),
            ("line", "SVGLineElement"),
            ("linearGradient", "SVGLinearGradientElement"),
            ("marker", "SVGMarkerElement"),
            ("mask", "SVGMaskElement"),
            ("path", "SVGPathElement"),
            ("pattern", "SVGPatternElement"),
            ("polygon", "SVGPolygonElement"),
            ("rect", "SVGRectElement"),
            ("svg", "SVGSVGElement"),
            ("text", "SVGTextElement"),
            ("use", "SVGUseElement"),
        ];

        TagTypeMap {
            html: html.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            svg: svg.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    /// HTML tag names in sorted order, so seeded element pre-generation is
    /// reproducible.
    pub(crate) fn html_tags_sorted(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.html.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }
}
