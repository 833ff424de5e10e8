use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// MetadataValue – a single header keyword carried alongside the cube
// ---------------------------------------------------------------------------

/// A dynamically-typed metadata value (plate id, instrument name, redshift…).
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::String(s) => write!(f, "{s}"),
            MetadataValue::Integer(i) => write!(f, "{i}"),
            MetadataValue::Float(v) => write!(f, "{v:.4}"),
            MetadataValue::Bool(b) => write!(f, "{b}"),
            MetadataValue::Null => write!(f, "<null>"),
        }
    }
}

fn strictly_increasing(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] < w[1])
}

// ---------------------------------------------------------------------------
// Spectrum – the spectrum of one spaxel
// ---------------------------------------------------------------------------

/// A single spectrum: rest-frame wavelength axis and flux, same length.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    wavelength: Vec<f64>,
    flux: Vec<f64>,
}

impl Spectrum {
    pub fn new(wavelength: Vec<f64>, flux: Vec<f64>) -> Result<Self> {
        if wavelength.len() != flux.len() {
            return Err(Error::invalid(format!(
                "wavelength has {} samples but flux has {}",
                wavelength.len(),
                flux.len()
            )));
        }
        if !strictly_increasing(&wavelength) {
            return Err(Error::invalid("wavelength axis is not strictly increasing"));
        }
        Ok(Spectrum { wavelength, flux })
    }

    pub fn wavelength(&self) -> &[f64] {
        &self.wavelength
    }

    pub fn flux(&self) -> &[f64] {
        &self.flux
    }

    pub fn len(&self) -> usize {
        self.flux.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flux.is_empty()
    }
}

// ---------------------------------------------------------------------------
// DataCube – wavelength × y × x flux cube
// ---------------------------------------------------------------------------

/// A spectral data cube. Flux (and the optional per-sample class labels) are
/// stored flat in `(wavelength, y, x)` order, i.e. the wavelength axis is the
/// slowest-varying one.
#[derive(Debug, Clone)]
pub struct DataCube {
    wave_rest: Vec<f64>,
    flux: Vec<f64>,
    labels: Option<Vec<i64>>,
    width: usize,
    height: usize,
    /// Header keywords carried through from the source file.
    pub metadata: BTreeMap<String, MetadataValue>,
}

impl DataCube {
    /// Build a cube, checking that every array agrees with
    /// `wave_rest.len() * height * width`.
    pub fn new(
        wave_rest: Vec<f64>,
        flux: Vec<f64>,
        labels: Option<Vec<i64>>,
        width: usize,
        height: usize,
    ) -> Result<Self> {
        if wave_rest.is_empty() {
            return Err(Error::invalid("cube has no rest-frame wavelength axis"));
        }
        if !strictly_increasing(&wave_rest) {
            return Err(Error::invalid("rest-frame wavelength axis is not strictly increasing"));
        }
        let expected = wave_rest.len() * height * width;
        if flux.len() != expected {
            return Err(Error::invalid(format!(
                "flux has {} values, expected {} ({} wavelengths × {height} × {width})",
                flux.len(),
                expected,
                wave_rest.len()
            )));
        }
        if let Some(labels) = &labels {
            if labels.len() != expected {
                return Err(Error::invalid(format!(
                    "labels have {} values, expected {expected}",
                    labels.len()
                )));
            }
        }
        Ok(DataCube {
            wave_rest,
            flux,
            labels,
            width,
            height,
            metadata: BTreeMap::new(),
        })
    }

    pub fn wave_rest(&self) -> &[f64] {
        &self.wave_rest
    }

    /// `(n_wavelengths, height, width)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.wave_rest.len(), self.height, self.width)
    }

    pub fn has_labels(&self) -> bool {
        self.labels.is_some()
    }

    fn offset(&self, wave_idx: usize, x: usize, y: usize) -> Result<usize> {
        if x >= self.width || y >= self.height {
            return Err(Error::CoordinateOutOfRange {
                x,
                y,
                width: self.width,
                height: self.height,
            });
        }
        Ok((wave_idx * self.height + y) * self.width + x)
    }

    /// Flux at the given pixel for the wavelength index range `range`.
    pub fn flux_slice(&self, range: std::ops::Range<usize>, x: usize, y: usize) -> Result<Vec<f64>> {
        range
            .map(|w| self.offset(w, x, y).map(|i| self.flux[i]))
            .collect()
    }

    /// The full flux column of one spaxel.
    pub fn flux_column(&self, x: usize, y: usize) -> Result<Vec<f64>> {
        self.flux_slice(0..self.wave_rest.len(), x, y)
    }

    /// The class-label column of one spaxel, if the cube carries labels.
    pub fn labels_column(&self, x: usize, y: usize) -> Result<Option<Vec<i64>>> {
        let Some(labels) = &self.labels else {
            return Ok(None);
        };
        (0..self.wave_rest.len())
            .map(|w| self.offset(w, x, y).map(|i| labels[i]))
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }

    /// The spectrum of one spaxel.
    pub fn spectrum(&self, x: usize, y: usize) -> Result<Spectrum> {
        Ok(Spectrum {
            wavelength: self.wave_rest.clone(),
            flux: self.flux_column(x, y)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube_2x3() -> DataCube {
        // 2 wavelengths, height 3, width 2; value encodes (w, y, x).
        let mut flux = Vec::new();
        for w in 0..2 {
            for y in 0..3 {
                for x in 0..2 {
                    flux.push((w * 100 + y * 10 + x) as f64);
                }
            }
        }
        DataCube::new(vec![5000.0, 5001.0], flux, None, 2, 3).unwrap()
    }

    #[test]
    fn flux_column_follows_wavelength_y_x_layout() {
        let cube = cube_2x3();
        assert_eq!(cube.shape(), (2, 3, 2));
        assert_eq!(cube.flux_column(1, 2).unwrap(), vec![21.0, 121.0]);
        assert_eq!(cube.flux_column(0, 0).unwrap(), vec![0.0, 100.0]);
    }

    #[test]
    fn out_of_range_pixel_is_reported_by_accessor() {
        let cube = cube_2x3();
        match cube.flux_column(2, 0) {
            Err(Error::CoordinateOutOfRange { x: 2, y: 0, width: 2, height: 3 }) => {}
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(
            cube.spectrum(0, 3),
            Err(Error::CoordinateOutOfRange { .. })
        ));
    }

    #[test]
    fn constructor_rejects_mismatched_arrays() {
        assert!(matches!(
            DataCube::new(vec![1.0, 2.0], vec![0.0; 3], None, 1, 1),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            DataCube::new(vec![1.0], vec![0.0], Some(vec![0, 1]), 1, 1),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            DataCube::new(Vec::new(), Vec::new(), None, 0, 0),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            DataCube::new(vec![2.0, 1.0], vec![0.0; 2], None, 1, 1),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn labels_column_absent_without_labels() {
        let cube = cube_2x3();
        assert_eq!(cube.labels_column(0, 0).unwrap(), None);
    }

    #[test]
    fn spectrum_requires_matching_lengths() {
        assert!(Spectrum::new(vec![1.0, 2.0], vec![1.0]).is_err());
        let sp = Spectrum::new(vec![1.0, 2.0], vec![3.0, 4.0]).unwrap();
        assert_eq!(sp.len(), 2);
        assert_eq!(sp.flux(), &[3.0, 4.0]);
    }
}
