//! Distances between poses.
//!
//! Poses are compared through their relative pose `p^-1 * q`. The combined distance is the norm of
//! the relative translation plus `w` times the relative rotation angle, a pseudometric on the
//! product space of translations and rotations. The attitude weight `w` is how many meters one
//! radian of rotation is worth. The triangle inequality is not checked for any particular weight.

use crate::error::Error;
use crate::se3::{broadcast_len, PoseSet};

/// Combined translation + rotation distance with a fixed attitude weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseMetric {
    attitude_weight: f64,
}

impl PoseMetric {
    /// Fails with [Error::InvalidWeight] if `attitude_weight` is negative or NaN.
    pub fn new(attitude_weight: f64) -> Result<Self, Error> {
        if attitude_weight >= 0.0 {
            Ok(PoseMetric {
                attitude_weight: attitude_weight,
            })
        } else {
            Err(Error::InvalidWeight(attitude_weight))
        }
    }

    /// Translation only.
    pub fn translation_only() -> Self {
        PoseMetric {
            attitude_weight: 0.0,
        }
    }

    pub fn attitude_weight(&self) -> f64 {
        self.attitude_weight
    }

    /// Elementwise distance between `p` and `q`, broadcasting singletons.
    pub fn distance(&self, p: &PoseSet, q: &PoseSet) -> Result<Vec<f64>, Error> {
        let (t, r) = error(p, q)?;
        Ok(t.into_iter()
            .zip(r)
            .map(|(t, r)| t + self.attitude_weight * r)
            .collect())
    }
}

/// Elementwise combined distance `||t_rel|| + w * angle(R_rel)` of the relative poses `p^-1 * q`.
pub fn metric(p: &PoseSet, q: &PoseSet, w: f64) -> Result<Vec<f64>, Error> {
    broadcast_len(p.len(), q.len())?;
    PoseMetric::new(w)?.distance(p, q)
}

/// Raw alignment error between `p` and `q`: translation norms and rotation angles (radians) of the
/// relative poses.
pub fn error(p: &PoseSet, q: &PoseSet) -> Result<(Vec<f64>, Vec<f64>), Error> {
    Ok(p.relative(q)?.magnitude())
}
