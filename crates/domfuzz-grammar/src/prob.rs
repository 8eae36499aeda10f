//! Probability preprocessing
//!
//! After parsing, every creator list is converted to a cumulative
//! distribution so rule selection is a single binary search. An empty CDF
//! means uniform selection.

use std::collections::HashMap;

use crate::Grammar;
use crate::error::GrammarError;
use crate::rule::RuleRef;

/// Builds the CDF for one symbol's creator list.
///
/// Rules carrying an explicit `p` keep their weight; the remaining
/// probability mass is split evenly across the rules without one. When the
/// explicit weights already exceed 1, or every rule has a weight, the
/// explicit weights are rescaled to sum to 1 instead. An all-uniform list
/// yields an empty CDF. The `line` symbol is always uniform; per-line
/// probabilities are intentionally unsupported.
pub(crate) fn creator_cdf(symbol: &str, creators: &[RuleRef]) -> Result<Vec<f64>, GrammarError> {
    if symbol == "line" {
        return Ok(Vec::new());
    }

    let mut weights: Vec<Option<f64>> = Vec::with_capacity(creators.len());
    for rule in creators {
        let explicit = match rule.create_tag_for(symbol) {
            Some(tag) => tag.probability()?,
            None => None,
        };
        if let Some(p) = explicit {
            if p < 0.0 {
                return Err(GrammarError::InvalidProbability {
                    symbol: symbol.to_string(),
                    detail: format!("negative weight {p}"),
                });
            }
        }
        weights.push(explicit);
    }

    if weights.iter().all(Option::is_none) {
        return Ok(Vec::new());
    }

    let explicit_sum: f64 = weights.iter().flatten().sum();
    let undefined = weights.iter().filter(|w| w.is_none()).count();

    let (scale, fill) = if explicit_sum > 1.0 || undefined == 0 {
        if explicit_sum <= 0.0 {
            return Err(GrammarError::InvalidProbability {
                symbol: symbol.to_string(),
                detail: "weights sum to zero".to_string(),
            });
        }
        (1.0 / explicit_sum, 0.0)
    } else {
        (1.0, (1.0 - explicit_sum) / undefined as f64)
    };

    let mut cdf = Vec::with_capacity(weights.len());
    let mut running = 0.0;
    for weight in weights {
        running += match weight {
            Some(p) => p * scale,
            None => fill,
        };
        cdf.push(running);
    }
    Ok(cdf)
}

impl Grammar {
    /// Rebuilds the CDFs for both creator sets. Run once after parsing;
    /// idempotent.
    pub(crate) fn normalize_probabilities(&mut self) -> Result<(), GrammarError> {
        self.creator_cdfs = build_cdfs(&self.creators)?;
        self.nonrecursive_creator_cdfs = build_cdfs(&self.nonrecursive_creators)?;
        Ok(())
    }
}

fn build_cdfs(
    creators: &HashMap<String, Vec<RuleRef>>,
) -> Result<HashMap<String, Vec<f64>>, GrammarError> {
    let mut cdfs = HashMap::with_capacity(creators.len());
    for (symbol, rules) in creators {
        cdfs.insert(symbol.clone(), creator_cdf(symbol, rules)?);
    }
    Ok(cdfs)
}
