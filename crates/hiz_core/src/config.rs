//! # Pyramid Configuration
//!
//! Loaded once at startup from TOML:
//!
//! ```toml
//! mip_count = 8
//! tile_size = 32
//! region_span = 8
//! reduction = "max"
//! strict_back_reads = true
//! workers = 0
//! ```
//!
//! Every field is optional; missing fields take the defaults below.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HizError, HizResult};
use crate::reduce::DepthReduction;

/// Configuration of one depth pyramid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HizConfig {
    /// Number of mip levels K, including level 0.
    pub mip_count: u32,
    /// Texels of mip 0 per thread group and axis (power of two).
    pub tile_size: u32,
    /// Tiles per coarse region and axis (power of two).
    pub region_span: u32,
    /// Reduction operator.
    pub reduction: DepthReduction,
    /// Fail binding of a never-built back pyramid instead of warning.
    pub strict_back_reads: bool,
    /// Worker threads for the software executor, 0 = available parallelism.
    pub workers: usize,
}

impl Default for HizConfig {
    fn default() -> Self {
        Self {
            mip_count: 8,
            tile_size: 32,
            region_span: 8,
            reduction: DepthReduction::Max,
            strict_back_reads: true,
            workers: 0,
        }
    }
}

impl HizConfig {
    /// Upper bound on `mip_count`.
    pub const MAX_MIP_COUNT: u32 = 16;

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` on malformed TOML, unknown keys or values
    /// rejected by [`HizConfig::validate`].
    pub fn from_toml_str(source: &str) -> HizResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| HizError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the file cannot be read or parsed.
    pub fn from_toml_file(path: impl AsRef<Path>) -> HizResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| HizError::InvalidConfig(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` describing the first offending field.
    pub fn validate(&self) -> HizResult<()> {
        if !(1..=Self::MAX_MIP_COUNT).contains(&self.mip_count) {
            return Err(HizError::InvalidConfig(format!(
                "mip_count must be in 1..={}, got {}",
                Self::MAX_MIP_COUNT,
                self.mip_count
            )));
        }
        if self.tile_size < 2 || !self.tile_size.is_power_of_two() {
            return Err(HizError::InvalidConfig(format!(
                "tile_size must be a power of two >= 2, got {}",
                self.tile_size
            )));
        }
        if self.region_span == 0 || !self.region_span.is_power_of_two() {
            return Err(HizError::InvalidConfig(format!(
                "region_span must be a power of two >= 1, got {}",
                self.region_span
            )));
        }
        Ok(())
    }

    /// Worker count with 0 resolved to the machine's parallelism.
    #[must_use]
    pub fn resolved_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = HizConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.mip_count, 8);
        assert_eq!(config.reduction, DepthReduction::Max);
        assert!(config.strict_back_reads);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = HizConfig::from_toml_str("mip_count = 4\nreduction = \"min\"\n").unwrap();
        assert_eq!(config.mip_count, 4);
        assert_eq!(config.reduction, DepthReduction::Min);
        assert_eq!(config.tile_size, 32);
        assert_eq!(config.region_span, 8);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(matches!(
            HizConfig::from_toml_str("tile_size = 24"),
            Err(HizError::InvalidConfig(_))
        ));
        assert!(HizConfig::from_toml_str("mip_count = 0").is_err());
        assert!(HizConfig::from_toml_str("mip_count = 17").is_err());
        assert!(HizConfig::from_toml_str("region_span = 0").is_err());
        assert!(HizConfig::from_toml_str("reduction = \"average\"").is_err());
        assert!(HizConfig::from_toml_str("unknown_key = 1").is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = HizConfig::from_toml_file("/nonexistent/hiz.toml").unwrap_err();
        assert!(matches!(err, HizError::InvalidConfig(_)));
    }

    #[test]
    fn test_resolved_workers() {
        let config = HizConfig { workers: 3, ..HizConfig::default() };
        assert_eq!(config.resolved_workers(), 3);
        assert!(HizConfig::default().resolved_workers() >= 1);
    }
}
