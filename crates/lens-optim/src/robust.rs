use lens_core::Real;
use serde::{Deserialize, Serialize};

/// Robust loss applied per observed point (on the squared pixel error).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RobustKernel {
    /// Plain least squares.
    #[default]
    None,
    /// Quadratic up to `delta` pixels, linear beyond.
    Huber { delta: Real },
    /// `c² log(1 + r²/c²)`.
    Cauchy { c: Real },
}

impl RobustKernel {
    /// Loss `rho(r²)` and IRLS weight `w` for a squared residual.
    pub fn rho_and_weight(self, r2: Real) -> (Real, Real) {
        match self {
            RobustKernel::None => (r2, 1.0),
            RobustKernel::Huber { delta } => {
                let r = r2.sqrt();
                if r <= delta {
                    (r2, 1.0)
                } else {
                    (2.0 * delta * r - delta * delta, delta / r)
                }
            }
            RobustKernel::Cauchy { c } => {
                let t = r2 / (c * c);
                (c * c * (1.0 + t).ln(), 1.0 / (1.0 + t))
            }
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, RobustKernel::None)
    }
}
