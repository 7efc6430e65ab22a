//! Scheme functions weighting the between-block covariances in the RGCCA
//! objective. The derivative drives the inner-component direction at every
//! iteration, so a scheme is only usable once its derivative is available:
//! the three built-ins carry closed forms, and [`Scheme::custom`] requires
//! the caller to hand over both the function and its derivative up front.

use anyhow::bail;
use std::fmt;
use std::sync::Arc;

type ScalarFn = Arc<dyn Fn(f64) -> f64 + Send + Sync>;

/// Convex scheme function applied to pairwise component covariances.
#[derive(Clone)]
pub enum Scheme {
    /// Identity, `g(x) = x`.
    Horst,
    /// Square, `g(x) = x²`.
    Factorial,
    /// Absolute value, `g(x) = |x|`.
    Centroid,
    /// User-supplied convex function with its derivative.
    Custom { g: ScalarFn, dg: ScalarFn },
}

impl Scheme {
    /// Resolves one of the built-in scheme names.
    pub fn from_name(name: &str) -> anyhow::Result<Self> {
        match name {
            "horst" => Ok(Scheme::Horst),
            "factorial" => Ok(Scheme::Factorial),
            "centroid" => Ok(Scheme::Centroid),
            other => bail!(
                "unknown scheme '{}': expected horst, factorial or centroid, or supply a custom function with its derivative",
                other
            ),
        }
    }

    /// Builds a custom scheme from a function and its derivative.
    pub fn custom(
        g: impl Fn(f64) -> f64 + Send + Sync + 'static,
        dg: impl Fn(f64) -> f64 + Send + Sync + 'static,
    ) -> Self {
        Scheme::Custom {
            g: Arc::new(g),
            dg: Arc::new(dg),
        }
    }

    pub fn g(&self, x: f64) -> f64 {
        match self {
            Scheme::Horst => x,
            Scheme::Factorial => x * x,
            Scheme::Centroid => x.abs(),
            Scheme::Custom { g, .. } => g(x),
        }
    }

    pub fn dg(&self, x: f64) -> f64 {
        match self {
            Scheme::Horst => 1.0,
            Scheme::Factorial => 2.0 * x,
            // signum(0) is 0 here, matching the subgradient convention
            Scheme::Centroid => {
                if x > 0.0 {
                    1.0
                } else if x < 0.0 {
                    -1.0
                } else {
                    0.0
                }
            }
            Scheme::Custom { dg, .. } => dg(x),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Scheme::Horst => "horst",
            Scheme::Factorial => "factorial",
            Scheme::Centroid => "centroid",
            Scheme::Custom { .. } => "custom",
        }
    }
}

impl fmt::Debug for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
