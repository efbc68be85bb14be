//! Region/city mapping and per-region file resolution.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One balancing authority with its paired city.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    Caiso,
    Ercot,
    Isone,
    Nyiso,
    Pjm,
    Spp,
}

pub const ALL_REGIONS: [Region; 6] = [
    Region::Caiso,
    Region::Ercot,
    Region::Isone,
    Region::Nyiso,
    Region::Pjm,
    Region::Spp,
];

impl Region {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Caiso => "caiso",
            Self::Ercot => "ercot",
            Self::Isone => "isone",
            Self::Nyiso => "nyiso",
            Self::Pjm => "pjm",
            Self::Spp => "spp",
        }
    }

    pub fn city(self) -> &'static str {
        match self {
            Self::Caiso => "la",
            Self::Ercot => "houston",
            Self::Isone => "boston",
            Self::Nyiso => "nyc",
            Self::Pjm => "chicago",
            Self::Spp => "kck",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "caiso" => Some(Self::Caiso),
            "ercot" => Some(Self::Ercot),
            "isone" => Some(Self::Isone),
            "nyiso" => Some(Self::Nyiso),
            "pjm" => Some(Self::Pjm),
            "spp" => Some(Self::Spp),
            _ => None,
        }
    }

    /// Second-pass (input) CSV path under `data_dir`.
    pub fn second_pass_path(self, data_dir: &Path) -> PathBuf {
        data_dir.join(format!("{}_{}_second_pass.csv", self.as_str(), self.city()))
    }

    /// Third-pass (output) CSV path under `data_dir`.
    pub fn third_pass_path(self, data_dir: &Path) -> PathBuf {
        data_dir.join(format!("{}_{}_third_pass.csv", self.as_str(), self.city()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_paths_follow_the_pass_naming() {
        let dir = Path::new("data/interim");
        assert_eq!(
            Region::Ercot.second_pass_path(dir),
            Path::new("data/interim/ercot_houston_second_pass.csv")
        );
        assert_eq!(
            Region::Spp.third_pass_path(dir),
            Path::new("data/interim/spp_kck_third_pass.csv")
        );
    }
}
