use serde::{Deserialize, Serialize};

use crate::Error;

/// Material parameters of a homogeneous elastic solid as specified by the user.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialParams {
    /// Young's modulus in Pa.
    pub youngs_modulus: f64,
    /// Poisson's ratio. Must lie in the open interval `(-1, 0.5)`.
    pub poisson_ratio: f64,
    /// Density in kg/m³.
    pub density: f64,
}

impl Default for MaterialParams {
    fn default() -> Self {
        MaterialParams {
            youngs_modulus: 1.0e6,
            poisson_ratio: 0.45,
            density: 1000.0,
        }
    }
}

impl MaterialParams {
    pub fn with_youngs_modulus(mut self, youngs_modulus: f64) -> Self {
        self.youngs_modulus = youngs_modulus;
        self
    }
    pub fn with_poisson_ratio(mut self, poisson_ratio: f64) -> Self {
        self.poisson_ratio = poisson_ratio;
        self
    }
    pub fn with_density(mut self, density: f64) -> Self {
        self.density = density;
        self
    }

    /// Lamé parameters corresponding to these material parameters.
    pub fn elasticity(&self) -> ElasticityParameters {
        ElasticityParameters::from_young_poisson(self.youngs_modulus, self.poisson_ratio)
    }

    /// Shear modulus `μ = E / (2(1 + ν))`.
    #[inline]
    pub fn shear_modulus(&self) -> f64 {
        self.elasticity().mu
    }

    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |name: &str| {
            Err(Error::InvalidParameter {
                name: name.to_string(),
            })
        };
        if !(self.youngs_modulus > 0.0 && self.youngs_modulus.is_finite()) {
            return invalid("youngs_modulus");
        }
        if !(self.poisson_ratio > -1.0 && self.poisson_ratio < 0.5) {
            return invalid("poisson_ratio");
        }
        if !(self.density >= 0.0 && self.density.is_finite()) {
            return invalid("density");
        }
        Ok(())
    }
}

/// Lamé parameters.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ElasticityParameters {
    /// First Lamé parameter. Measured in Pa = N/m² = kg/(ms²).
    pub lambda: f64,
    /// Shear modulus. Measured in Pa = N/m² = kg/(ms²).
    pub mu: f64,
}

impl ElasticityParameters {
    pub fn scaled(self, scale: f64) -> ElasticityParameters {
        ElasticityParameters {
            lambda: self.lambda * scale,
            mu: self.mu * scale,
        }
    }

    pub fn from_bulk_shear(bulk: f64, shear: f64) -> Self {
        ElasticityParameters {
            lambda: bulk - 2.0 * shear / 3.0,
            mu: shear,
        }
    }

    pub fn from_young_poisson(young: f64, poisson: f64) -> Self {
        ElasticityParameters {
            lambda: young * poisson / ((1.0 + poisson) * (1.0 - 2.0 * poisson)),
            mu: young / (2.0 * (1.0 + poisson)),
        }
    }

    /// Bulk modulus `K = λ + 2μ/3`.
    pub fn bulk_modulus(&self) -> f64 {
        self.lambda + 2.0 * self.mu / 3.0
    }
}
