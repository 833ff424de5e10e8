//! Split a spectrum into its continuum, emission, absorption and cosmic-ray
//! components using per-sample class codes from an upstream classifier.

use std::collections::BTreeSet;
use std::fmt;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::data::model::Spectrum;
use crate::error::{Error, Result};

/// Physical category of one spectral sample.
///
/// Declaration order is the priority order used when more than one
/// component is non-zero at the same sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Continuum,
    Emission,
    Absorption,
    CosmicRay,
}

impl Category {
    /// All categories, highest priority first.
    pub const ALL: [Category; 4] = [
        Category::Continuum,
        Category::Emission,
        Category::Absorption,
        Category::CosmicRay,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Continuum => "continuum",
            Category::Emission => "emission",
            Category::Absorption => "absorption",
            Category::CosmicRay => "cosmic_ray",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ClassCodes – model output code → category table
// ---------------------------------------------------------------------------

/// Static mapping from classifier output codes to categories. The four
/// code sets are disjoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ClassCodeTable", into = "ClassCodeTable")]
pub struct ClassCodes {
    sets: [BTreeSet<i64>; 4],
}

/// Serialized form of [`ClassCodes`]: one code list per category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassCodeTable {
    pub continuum: Vec<i64>,
    pub emission: Vec<i64>,
    pub absorption: Vec<i64>,
    pub cosmic_ray: Vec<i64>,
}

impl TryFrom<ClassCodeTable> for ClassCodes {
    type Error = Error;

    fn try_from(raw: ClassCodeTable) -> Result<Self> {
        ClassCodes::new(&raw.continuum, &raw.emission, &raw.absorption, &raw.cosmic_ray)
    }
}

impl From<ClassCodes> for ClassCodeTable {
    fn from(codes: ClassCodes) -> Self {
        let [c, e, a, r] = codes.sets.map(|s| s.into_iter().collect::<Vec<i64>>());
        ClassCodeTable {
            continuum: c,
            emission: e,
            absorption: a,
            cosmic_ray: r,
        }
    }
}

impl Default for ClassCodes {
    fn default() -> Self {
        let set = |codes: &[i64]| codes.iter().copied().collect::<BTreeSet<_>>();
        ClassCodes {
            sets: [
                set(&[0, 1, 2, 10]),
                set(&[3, 6, 7, 8]),
                set(&[9, 11]),
                set(&[4, 5]),
            ],
        }
    }
}

impl ClassCodes {
    /// Build a table, rejecting a code that appears in more than one set.
    pub fn new(
        continuum: &[i64],
        emission: &[i64],
        absorption: &[i64],
        cosmic_ray: &[i64],
    ) -> Result<Self> {
        let sets = [continuum, emission, absorption, cosmic_ray]
            .map(|codes| codes.iter().copied().collect::<BTreeSet<_>>());
        for (i, a) in sets.iter().enumerate() {
            for (j, b) in sets.iter().enumerate().skip(i + 1) {
                if let Some(code) = a.intersection(b).next() {
                    return Err(Error::invalid(format!(
                        "class code {code} is mapped to both {} and {}",
                        Category::ALL[i],
                        Category::ALL[j]
                    )));
                }
            }
        }
        Ok(ClassCodes { sets })
    }

    /// Category of a class code, `None` if the code is unmapped.
    pub fn category(&self, code: i64) -> Option<Category> {
        Category::ALL
            .into_iter()
            .find(|c| self.sets[c.index()].contains(&code))
    }

    pub fn codes(&self, category: Category) -> &BTreeSet<i64> {
        &self.sets[category.index()]
    }
}

// ---------------------------------------------------------------------------
// Decomposition
// ---------------------------------------------------------------------------

/// One category's share of a spectrum.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Component {
    /// Original flux at this category's samples, zero elsewhere.
    pub flux: Vec<f64>,
    /// Sample indices belonging to this category, ascending.
    pub indices: Vec<usize>,
    /// Wavelengths of those samples, for plotting by the caller.
    pub wavelength: Vec<f64>,
}

impl Component {
    fn zeros(len: usize) -> Self {
        Component {
            flux: vec![0.0; len],
            ..Default::default()
        }
    }
}

/// The four parallel component arrays of one spectrum.
#[derive(Debug, Clone, PartialEq)]
pub struct Decomposition {
    components: [Component; 4],
    /// Samples whose class code is in none of the four sets.
    pub unclassified: Vec<usize>,
}

impl Decomposition {
    pub fn component(&self, category: Category) -> &Component {
        &self.components[category.index()]
    }

    pub fn continuum(&self) -> &[f64] {
        &self.component(Category::Continuum).flux
    }

    pub fn emission(&self) -> &[f64] {
        &self.component(Category::Emission).flux
    }

    pub fn absorption(&self) -> &[f64] {
        &self.component(Category::Absorption).flux
    }

    pub fn cosmic_ray(&self) -> &[f64] {
        &self.component(Category::CosmicRay).flux
    }

    pub fn len(&self) -> usize {
        self.components[0].flux.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Split `spectrum.flux` into four arrays by class code.
pub fn decompose(spectrum: &Spectrum, labels: &[i64], codes: &ClassCodes) -> Result<Decomposition> {
    let flux = spectrum.flux();
    if labels.len() != flux.len() {
        return Err(Error::invalid(format!(
            "spectrum has {} samples but {} labels",
            flux.len(),
            labels.len()
        )));
    }

    let mut components: [Component; 4] = std::array::from_fn(|_| Component::zeros(flux.len()));
    let mut unclassified = Vec::new();

    for (i, &code) in labels.iter().enumerate() {
        match codes.category(code) {
            Some(category) => {
                let component = &mut components[category.index()];
                component.flux[i] = flux[i];
                component.indices.push(i);
                component.wavelength.push(spectrum.wavelength()[i]);
            }
            None => unclassified.push(i),
        }
    }

    for category in Category::ALL {
        debug!(
            "{category}: {} of {} samples",
            components[category.index()].indices.len(),
            flux.len()
        );
    }
    if !unclassified.is_empty() {
        warn!("{} samples carry unmapped class codes", unclassified.len());
    }

    Ok(Decomposition {
        components,
        unclassified,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spectrum(flux: &[f64]) -> Spectrum {
        let wave = (0..flux.len()).map(|i| 4000.0 + i as f64).collect();
        Spectrum::new(wave, flux.to_vec()).unwrap()
    }

    #[test]
    fn default_codes_cover_model_outputs() {
        let codes = ClassCodes::default();
        let expected = [
            (0, Category::Continuum),
            (1, Category::Continuum),
            (2, Category::Continuum),
            (3, Category::Emission),
            (4, Category::CosmicRay),
            (5, Category::CosmicRay),
            (6, Category::Emission),
            (7, Category::Emission),
            (8, Category::Emission),
            (9, Category::Absorption),
            (10, Category::Continuum),
            (11, Category::Absorption),
        ];
        for (code, category) in expected {
            assert_eq!(codes.category(code), Some(category), "code {code}");
        }
        assert_eq!(codes.category(12), None);
    }

    #[test]
    fn overlapping_codes_are_rejected() {
        let err = ClassCodes::new(&[0, 1], &[1, 2], &[3], &[4]).unwrap_err();
        assert!(err.to_string().contains("class code 1"));
    }

    #[test]
    fn components_are_disjoint_and_keep_flux() {
        let sp = spectrum(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let labels = [0, 3, 9, 4, 10, 99];
        let d = decompose(&sp, &labels, &ClassCodes::default()).unwrap();

        assert_eq!(d.continuum(), &[1.0, 0.0, 0.0, 0.0, 5.0, 0.0]);
        assert_eq!(d.emission(), &[0.0, 2.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(d.absorption(), &[0.0, 0.0, 3.0, 0.0, 0.0, 0.0]);
        assert_eq!(d.cosmic_ray(), &[0.0, 0.0, 0.0, 4.0, 0.0, 0.0]);
        assert_eq!(d.unclassified, vec![5]);

        for i in 0..sp.len() {
            let non_zero = Category::ALL
                .iter()
                .filter(|c| d.component(**c).flux[i] != 0.0)
                .count();
            assert!(non_zero <= 1, "sample {i} is in {non_zero} components");
        }
    }

    #[test]
    fn component_wavelengths_follow_indices() {
        let sp = spectrum(&[1.0, 2.0, 3.0]);
        let d = decompose(&sp, &[3, 0, 3], &ClassCodes::default()).unwrap();
        let em = d.component(Category::Emission);
        assert_eq!(em.indices, vec![0, 2]);
        assert_eq!(em.wavelength, vec![4000.0, 4002.0]);
    }

    #[test]
    fn label_length_mismatch_is_invalid_input() {
        let sp = spectrum(&[1.0, 2.0]);
        assert!(matches!(
            decompose(&sp, &[0], &ClassCodes::default()),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn class_codes_round_trip_through_json() {
        let json = r#"{"continuum":[0],"emission":[1],"absorption":[2],"cosmic_ray":[3]}"#;
        let codes: ClassCodes = serde_json::from_str(json).unwrap();
        assert_eq!(codes.category(3), Some(Category::CosmicRay));

        let bad = r#"{"continuum":[0],"emission":[0],"absorption":[2],"cosmic_ray":[3]}"#;
        assert!(serde_json::from_str::<ClassCodes>(bad).is_err());
    }
}
