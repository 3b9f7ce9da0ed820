use crate::error::{ProcessingError, Result};
use crate::utils::constants::{LAND_COVER_NCOLS, LAND_COVER_NROWS};
use std::path::Path;

const LON_MIN: f64 = -180.0;
const LON_MAX: f64 = 180.0;
const LAT_MIN: f64 = -90.0;
const LAT_MAX: f64 = 90.0;

/// Global regular lat/lon grid of C4 vegetation fractions. Row 0 is the
/// northernmost band; cell coordinates are the cell's south-west origin.
#[derive(Debug, Clone, PartialEq)]
pub struct LandCoverGrid {
    ncols: usize,
    nrows: usize,
    values: Vec<f64>,
}

impl LandCoverGrid {
    pub fn new(ncols: usize, nrows: usize, values: Vec<f64>) -> Result<Self> {
        if ncols == 0 || nrows == 0 || values.len() != ncols * nrows {
            return Err(ProcessingError::InvalidFormat(format!(
                "Land cover grid of {}x{} needs {} values, got {}",
                ncols,
                nrows,
                ncols * nrows,
                values.len()
            )));
        }
        Ok(Self {
            ncols,
            nrows,
            values,
        })
    }

    /// Read a headerless CSV with one grid row per line, north first
    pub fn read(path: &Path) -> Result<Self> {
        Self::read_with_shape(path, LAND_COVER_NCOLS, LAND_COVER_NROWS)
    }

    pub fn read_with_shape(path: &Path, ncols: usize, nrows: usize) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .trim(csv::Trim::All)
            .from_path(path)?;

        let mut values = Vec::with_capacity(ncols * nrows);
        for (row_idx, record) in reader.records().enumerate() {
            let record = record?;
            if record.len() != ncols {
                return Err(ProcessingError::InvalidFormat(format!(
                    "Land cover row {} has {} columns, expected {}",
                    row_idx + 1,
                    record.len(),
                    ncols
                )));
            }
            for field in record.iter() {
                let value = field.parse::<f64>().map_err(|_| {
                    ProcessingError::InvalidFormat(format!("Invalid C4 fraction: '{}'", field))
                })?;
                values.push(value);
            }
        }

        Self::new(ncols, nrows, values)
    }

    fn cell_lat(&self, row: usize) -> f64 {
        let dlat = (LAT_MAX - LAT_MIN) / self.nrows as f64;
        LAT_MIN + (self.nrows - 1 - row) as f64 * dlat
    }

    fn cell_lon(&self, col: usize) -> f64 {
        let dlon = (LON_MAX - LON_MIN) / self.ncols as f64;
        LON_MIN + col as f64 * dlon
    }

    /// Closest cell by |dlat| + |dlon|. The distance is separable, so the
    /// best row and column are found independently; ties go to the first
    /// row (northernmost) and first column (westernmost).
    pub fn nearest_cell(&self, latitude: f64, longitude: f64) -> (usize, usize) {
        let mut best_row = 0;
        for row in 1..self.nrows {
            if (self.cell_lat(row) - latitude).abs() < (self.cell_lat(best_row) - latitude).abs() {
                best_row = row;
            }
        }

        let mut best_col = 0;
        for col in 1..self.ncols {
            if (self.cell_lon(col) - longitude).abs()
                < (self.cell_lon(best_col) - longitude).abs()
            {
                best_col = col;
            }
        }

        (best_row, best_col)
    }

    /// C4 fraction at the site's nearest cell, `None` for non-finite coordinates
    pub fn lookup(&self, latitude: f64, longitude: f64) -> Option<f64> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return None;
        }
        let (row, col) = self.nearest_cell(latitude, longitude);
        self.values.get(row * self.ncols + col).copied()
    }
}
