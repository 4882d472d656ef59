use serde::{Deserialize, Serialize};

/// Static checkerboard geometry supplied at process/launch level.
///
/// `rows` and `cols` count *inner* corners, so the expected feature count of
/// a full detection is `rows * cols`. Validated once at coordinator
/// construction; a bad geometry rejects the whole channel, not individual
/// requests.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridGeometry {
    pub rows: u32,
    pub cols: u32,
    /// Physical spacing between adjacent corners, in meters.
    pub spacing: f32,
}

/// Errors from static configuration validation. Fatal: a coordinator is
/// never constructed from a bad geometry.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("checkerboard grid must have at least 2x2 inner corners (got {rows}x{cols})")]
    DegenerateGrid { rows: u32, cols: u32 },
    #[error("corner spacing must be finite and positive (got {spacing})")]
    BadSpacing { spacing: f32 },
}

impl GridGeometry {
    pub fn new(rows: u32, cols: u32, spacing: f32) -> Result<Self, ConfigError> {
        let geometry = Self {
            rows,
            cols,
            spacing,
        };
        geometry.validate()?;
        Ok(geometry)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rows < 2 || self.cols < 2 {
            return Err(ConfigError::DegenerateGrid {
                rows: self.rows,
                cols: self.cols,
            });
        }
        if !self.spacing.is_finite() || self.spacing <= 0.0 {
            return Err(ConfigError::BadSpacing {
                spacing: self.spacing,
            });
        }
        Ok(())
    }

    /// Number of feature points a full detection of this board carries.
    #[inline]
    pub fn expected_points(&self) -> usize {
        self.rows as usize * self.cols as usize
    }
}
