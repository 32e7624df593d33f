//! Energy units and the physical constants that go with them.

use crate::errors::*;
use std::fmt;
use std::str::FromStr;

/// Boltzmann constant in kJ/mol/K
pub const KB_KJMOL: f64 = 0.00831446210;

/// Boltzmann constant in kcal/mol/K
pub const KB_KCALMOL: f64 = 0.001982923700;

/// Number of kJ in one kcal
pub const KJ_PER_KCAL: f64 = 4.184;

/// Energy unit of a window collection or PMF
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnergyUnit {
    /// kJ/mol
    KjMol,
    /// kcal/mol
    KcalMol,
}

impl Default for EnergyUnit {
    fn default() -> Self {
        Self::KcalMol
    }
}

impl EnergyUnit {
    /// The Boltzmann constant expressed in this unit per kelvin
    pub fn boltzmann(self) -> f64 {
        match self {
            Self::KjMol => KB_KJMOL,
            Self::KcalMol => KB_KCALMOL,
        }
    }

    /// $k_B T$ in this unit
    pub fn kt(self, temperature: f64) -> f64 {
        self.boltzmann() * temperature
    }

    /// Label used in file headers
    pub fn label(self) -> &'static str {
        match self {
            Self::KjMol => "kJ/mol",
            Self::KcalMol => "kcal/mol",
        }
    }

    /// Factor that converts an energy in this unit to `target`
    pub fn conversion_to(self, target: EnergyUnit) -> f64 {
        match (self, target) {
            (Self::KjMol, Self::KcalMol) => 1.0 / KJ_PER_KCAL,
            (Self::KcalMol, Self::KjMol) => KJ_PER_KCAL,
            _ => 1.0,
        }
    }
}

impl fmt::Display for EnergyUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for EnergyUnit {
    type Err = WhamError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "kJ/mol" => Ok(Self::KjMol),
            "kcal/mol" => Ok(Self::KcalMol),
            other => Err(WhamError::UnknownUnit(other.to_string())),
        }
    }
}
