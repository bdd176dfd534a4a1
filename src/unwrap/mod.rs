//! Phase unwrapping strategies and the selector dispatching between them.
//!
//! # Strategies
//!
//! * **Row-only** / **column-only**: independent 1D unwraps along one axis.
//! * **Combined 2D**: rows first, then columns. Fast, approximate.
//! * **Least squares**: global Poisson-equation unwrap, optionally weighted.
//!
//! The least-squares strategy falls back to combined 2D when the solver fails, and unknown
//! method tags fall back as well. Both cases produce a non-fatal warning.

/// Least-squares unwrap (direct Poisson solve and weighted conjugate gradients).
pub mod least_squares;

/// Row, column and combined path-following unwraps.
pub mod path;

use least_squares::LeastSquaresUnwrap;
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// The available unwrapping strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnwrapMethod {
    RowOnly,
    ColumnOnly,
    Combined2D,
    LeastSquares,
}

impl Display for UnwrapMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            UnwrapMethod::RowOnly => write!(f, "row-only"),
            UnwrapMethod::ColumnOnly => write!(f, "column-only"),
            UnwrapMethod::Combined2D => write!(f, "combined-2d"),
            UnwrapMethod::LeastSquares => write!(f, "least-squares"),
        }
    }
}

impl FromStr for UnwrapMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['_', ' '], "-").as_str() {
            "row" | "row-only" | "rows" => Ok(UnwrapMethod::RowOnly),
            "column" | "column-only" | "columns" | "col" => Ok(UnwrapMethod::ColumnOnly),
            "combined" | "combined-2d" | "2d" => Ok(UnwrapMethod::Combined2D),
            "least-squares" | "lsq" | "ls" | "poisson" => Ok(UnwrapMethod::LeastSquares),
            other => Err(format!("unknown unwrap method '{other}'")),
        }
    }
}

/// Resolves a user-entered tag, falling back to combined 2D for unknown tags.
///
/// # Returns
/// The method to use and, on fallback, a warning for the user.
pub fn resolve_method(tag: &str) -> (UnwrapMethod, Option<String>) {
    match tag.parse() {
        Ok(method) => (method, None),
        Err(err) => {
            let warning = format!("{err}, using {} instead", UnwrapMethod::Combined2D);
            log::warn!("{warning}");
            (UnwrapMethod::Combined2D, Some(warning))
        }
    }
}

/// Result of the strategy selector.
#[derive(Debug, Clone)]
pub struct UnwrapOutcome {
    pub phase: Array2<f64>,
    pub method_used: UnwrapMethod,
    pub warnings: Vec<String>,
}

/// Unwraps `phase` with the requested strategy.
///
/// `weights` are only used by the least-squares strategy. A solver failure is recovered by
/// running combined 2D instead, so a result is always returned.
pub fn unwrap_phase(
    phase: ArrayView2<f64>,
    method: UnwrapMethod,
    weights: Option<&Array2<f64>>,
) -> UnwrapOutcome {
    let mut warnings = Vec::new();
    let (phase, method_used) = match method {
        UnwrapMethod::RowOnly => (path::unwrap_rows(phase), method),
        UnwrapMethod::ColumnOnly => (path::unwrap_columns(phase), method),
        UnwrapMethod::Combined2D => (path::unwrap_combined(phase), method),
        UnwrapMethod::LeastSquares => match LeastSquaresUnwrap::default().unwrap(phase, weights) {
            Ok(unwrapped) => (unwrapped, method),
            Err(err) => {
                let warning = format!(
                    "least-squares unwrap failed ({err}), using {} instead",
                    UnwrapMethod::Combined2D
                );
                log::warn!("{warning}");
                warnings.push(warning);
                (path::unwrap_combined(phase), UnwrapMethod::Combined2D)
            }
        },
    };
    UnwrapOutcome {
        phase,
        method_used,
        warnings,
    }
}

/// Resolves `tag` and unwraps with the resulting strategy, collecting all warnings.
pub fn unwrap_tagged(
    phase: ArrayView2<f64>,
    tag: &str,
    weights: Option<&Array2<f64>>,
) -> UnwrapOutcome {
    let (method, warning) = resolve_method(tag);
    let mut outcome = unwrap_phase(phase, method, weights);
    if let Some(warning) = warning {
        outcome.warnings.insert(0, warning);
    }
    outcome
}
