//! Range compression: collapse one spaxel's spectrum into the summed flux of
//! nine named rest-frame wavelength bands.

use std::fmt;

use log::{debug, warn};
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::data::model::DataCube;
use crate::error::{Error, Result};

/// A named rest-frame wavelength window in Ångström, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub name: &'static str,
    pub start: f64,
    pub end: f64,
}

const fn band(name: &'static str, start: f64, end: f64) -> Band {
    Band { name, start, end }
}

/// The fixed band list. Output vectors always follow this order.
pub const BANDS: [Band; 9] = [
    band("h_alpha", 6540.0, 6580.0),
    band("h_beta", 4040.0, 4080.0),
    band("h_gamma", 4340.0, 4380.0),
    band("h_delta", 4860.0, 4900.0),
    band("h_epsilon", 5000.0, 5040.0),
    band("h_zeta", 5870.0, 5910.0),
    band("h_eta", 6640.0, 6680.0),
    // [O III]
    band("zero_three", 4850.0, 5020.0),
    // [S II]
    band("s_two", 6700.0, 6750.0),
];

/// Summed flux per band, in [`BANDS`] order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: [f64; BANDS.len()],
}

impl FeatureVector {
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        BANDS
            .iter()
            .position(|b| b.name == name)
            .map(|i| self.values[i])
    }

    /// `(band name, summed flux)` pairs in band order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        BANDS.iter().map(|b| b.name).zip(self.values.iter().copied())
    }
}

/// Serializes as a band-name → flux map in band order.
impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(BANDS.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, &value)?;
        }
        map.end()
    }
}

impl fmt::Display for FeatureVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.iter() {
            writeln!(f, "{name:>12}  {value:.6}")?;
        }
        Ok(())
    }
}

/// Index range `[lo, hi)` of the samples of a sorted axis inside `band`.
/// Left-side insertion points on both ends, so `hi` excludes `band.end`.
fn band_indices(wave: &[f64], band: &Band) -> std::ops::Range<usize> {
    let lo = wave.partition_point(|&w| w < band.start);
    let hi = wave.partition_point(|&w| w < band.end);
    lo..hi
}

/// Compress the spectrum at pixel `(x, y)` into a [`FeatureVector`].
///
/// A band that covers no samples, or whose sum is not finite, contributes 0.0.
/// The pixel is not pre-validated: an out-of-range coordinate surfaces as
/// [`Error::CoordinateOutOfRange`] from the cube accessor.
pub fn compress(cube: &DataCube, x: usize, y: usize) -> Result<FeatureVector> {
    let wave = cube.wave_rest();
    if wave.is_empty() {
        return Err(Error::invalid("cube has no rest-frame wavelength axis"));
    }

    let mut values = [0.0; BANDS.len()];
    for (slot, band) in values.iter_mut().zip(BANDS.iter()) {
        let range = band_indices(wave, band);
        if range.is_empty() {
            debug!("band {} has no samples in the cube's wavelength axis", band.name);
            continue;
        }
        let sum: f64 = cube.flux_slice(range, x, y)?.iter().sum();
        if sum.is_finite() {
            *slot = sum;
        } else {
            warn!("band {} at ({x}, {y}) sums to {sum}; using 0.0", band.name);
        }
    }

    Ok(FeatureVector { values })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_pixel(wave: Vec<f64>, flux: Vec<f64>) -> DataCube {
        DataCube::new(wave, flux, None, 1, 1).unwrap()
    }

    #[test]
    fn h_alpha_sums_only_its_window() {
        let cube = single_pixel(
            vec![4000.0, 4500.0, 5000.0, 6560.0, 7000.0],
            vec![1.0, 2.0, 3.0, 4.0, 5.0],
        );
        let fv = compress(&cube, 0, 0).unwrap();
        assert_eq!(fv.values().len(), 9);
        assert_eq!(fv.get("h_alpha"), Some(4.0));
        // 5000 Å falls inside both [O III] and H-epsilon windows.
        assert_eq!(fv.get("zero_three"), Some(3.0));
        assert_eq!(fv.get("h_epsilon"), Some(3.0));
        for name in ["h_beta", "h_gamma", "h_delta", "h_zeta", "h_eta", "s_two"] {
            assert_eq!(fv.get(name), Some(0.0), "{name}");
        }
    }

    #[test]
    fn output_follows_declared_band_order() {
        let cube = single_pixel(vec![6560.0], vec![2.5]);
        let fv = compress(&cube, 0, 0).unwrap();
        let names: Vec<_> = fv.iter().map(|(n, _)| n).collect();
        let expected: Vec<_> = BANDS.iter().map(|b| b.name).collect();
        assert_eq!(names, expected);
        assert_eq!(fv.values()[0], 2.5);
    }

    #[test]
    fn band_end_is_exclusive() {
        let cube = single_pixel(vec![6540.0, 6580.0], vec![1.0, 10.0]);
        assert_eq!(compress(&cube, 0, 0).unwrap().get("h_alpha"), Some(1.0));
    }

    #[test]
    fn nan_sum_becomes_zero() {
        let cube = single_pixel(vec![6550.0, 6560.0, 6710.0], vec![f64::NAN, 1.0, 7.0]);
        let fv = compress(&cube, 0, 0).unwrap();
        assert_eq!(fv.get("h_alpha"), Some(0.0));
        assert_eq!(fv.get("s_two"), Some(7.0));
        assert!(fv.values().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn bands_are_independent_of_unrelated_flux() {
        let wave = vec![4050.0, 6560.0, 6720.0];
        let a = compress(&single_pixel(wave.clone(), vec![1.0, 2.0, 3.0]), 0, 0).unwrap();
        let b = compress(&single_pixel(wave, vec![100.0, 2.0, -50.0]), 0, 0).unwrap();
        assert_eq!(a.get("h_alpha"), b.get("h_alpha"));
        assert_ne!(a.get("h_beta"), b.get("h_beta"));
    }

    #[test]
    fn out_of_range_pixel_propagates_accessor_error() {
        let cube = single_pixel(vec![6560.0], vec![1.0]);
        assert!(matches!(
            compress(&cube, 3, 0),
            Err(Error::CoordinateOutOfRange { x: 3, .. })
        ));
    }
}
