//! Map spectra to symbolic scores.
//!
//! Two modes:
//! * [`sonify`] – four-voice physical sonification of a decomposed spectrum.
//!   Each wavelength sample owns one 100 ms slot; at most one category sounds
//!   per slot, chosen by [`active_category`].
//! * [`sonify_intensity`] – one voice following an arbitrary intensity curve
//!   (e.g. the output of [`crate::compress::compress`]), with the instrument
//!   picked from five intensity tiers.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::classify::{Category, Decomposition};
use crate::error::{Error, Result};
use crate::mapping::{interpolate, midi_clamp, normalize_to_max, ValueRange};
use crate::score::{NoteEvent, Score, Track};

/// Slot length per wavelength sample in multi-track mode.
pub const SLOT_MS: u64 = 100;
/// Sounding length of every multi-track note; longer than a slot on purpose.
pub const NOTE_MS: u64 = 500;
/// Note spacing (and length) in single-track mode.
pub const INTENSITY_NOTE_MS: u64 = 200;

const CONTINUUM_PITCH: u8 = 50;
const CONTINUUM_VELOCITY: (u8, u8) = (40, 80);
const EMISSION_PITCH: (u8, u8) = (50, 70);
const EMISSION_VELOCITY: u8 = 70;
const ABSORPTION_PITCH: (u8, u8) = (28, 50);
const ABSORPTION_VELOCITY: u8 = 100;
const COSMIC_RAY_PITCH: u8 = 85;
const COSMIC_RAY_VELOCITY: (u8, u8) = (80, 127);
/// Full upward pitch-wheel deflection.
const MAX_PITCH_BEND: i16 = 8191;

const INTENSITY_PITCH: (f64, f64) = (40.0, 100.0);
const INTENSITY_VELOCITY: (f64, f64) = (30.0, 127.0);
/// Lower edges of the five timbre tiers over normalized intensity.
pub const TIER_CUTS: [f64; 5] = [0.0, 0.2, 0.4, 0.6, 0.8];

/// General MIDI programs for each voice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SonifyConfig {
    /// Ambient pad (GM "Pad 3 (polysynth)").
    pub continuum_program: u8,
    /// Bright voice.
    pub emission_program: u8,
    /// Deep pad.
    pub absorption_program: u8,
    /// Short-decay percussive voice (GM "Music Box").
    pub cosmic_ray_program: u8,
    /// Single-track instruments, quietest tier first.
    pub tier_programs: [u8; 5],
}

impl Default for SonifyConfig {
    fn default() -> Self {
        SonifyConfig {
            continuum_program: 90,
            emission_program: 73,
            absorption_program: 92,
            cosmic_ray_program: 10,
            tier_programs: [89, 48, 0, 73, 10],
        }
    }
}

impl SonifyConfig {
    fn program(&self, category: Category) -> u8 {
        match category {
            Category::Continuum => self.continuum_program,
            Category::Emission => self.emission_program,
            Category::Absorption => self.absorption_program,
            Category::CosmicRay => self.cosmic_ray_program,
        }
    }
}

/// A sample carries signal for a category when its value is non-zero and finite.
fn is_present(value: f64) -> bool {
    value != 0.0 && value.is_finite()
}

/// The category that sounds at a sample, given the four component values in
/// `[continuum, emission, absorption, cosmic_ray]` order.
///
/// Priority is continuum > emission > absorption > cosmic-ray: the first
/// present value wins. `None` when all four are absent.
pub fn active_category(values: [f64; 4]) -> Option<Category> {
    Category::ALL
        .into_iter()
        .zip(values)
        .find(|&(_, v)| is_present(v))
        .map(|(c, _)| c)
}

fn channel(category: Category) -> u8 {
    match category {
        Category::Continuum => 0,
        Category::Emission => 1,
        Category::Absorption => 2,
        Category::CosmicRay => 3,
    }
}

/// Multi-track physical sonification.
///
/// All five arrays share one length; index order is time order. Each
/// category is rescaled against the min/max of its own present samples.
pub fn sonify(
    wavelengths: &[f64],
    continuum: &[f64],
    emission: &[f64],
    absorption: &[f64],
    cosmic_rays: &[f64],
    config: &SonifyConfig,
) -> Result<Score> {
    let arrays = [continuum, emission, absorption, cosmic_rays];
    for (category, array) in Category::ALL.iter().zip(arrays) {
        if array.len() != wavelengths.len() {
            return Err(Error::invalid(format!(
                "{category} has {} samples but wavelength has {}",
                array.len(),
                wavelengths.len()
            )));
        }
    }

    let ranges = arrays.map(|a| ValueRange::of(a.iter().copied().filter(|&v| is_present(v))));
    let mut tracks = Category::ALL
        .iter()
        .map(|&c| Track::new(c.as_str(), channel(c), config.program(c)))
        .collect::<Result<Vec<_>>>()?;

    for slot in 0..wavelengths.len() {
        let values = arrays.map(|a| a[slot]);
        let Some(category) = active_category(values) else {
            continue;
        };
        let idx = category as usize;
        let value = values[idx];
        // Present at this slot, so the category has a range.
        let range = ranges[idx].unwrap_or(ValueRange { min: value, max: value });
        let start_ms = slot as u64 * SLOT_MS;

        let base = NoteEvent {
            channel: channel(category),
            pitch: 0,
            velocity: 0,
            start_ms,
            duration_ms: NOTE_MS,
            pitch_bend: None,
        };
        let note = match category {
            Category::Continuum => NoteEvent {
                pitch: CONTINUUM_PITCH,
                velocity: range.rescale(value, CONTINUUM_VELOCITY.0, CONTINUUM_VELOCITY.1),
                ..base
            },
            Category::Emission => NoteEvent {
                pitch: range.rescale(value, EMISSION_PITCH.0, EMISSION_PITCH.1),
                velocity: EMISSION_VELOCITY,
                pitch_bend: Some(MAX_PITCH_BEND),
                ..base
            },
            Category::Absorption => NoteEvent {
                pitch: range.rescale(value, ABSORPTION_PITCH.0, ABSORPTION_PITCH.1),
                velocity: ABSORPTION_VELOCITY,
                pitch_bend: Some(MAX_PITCH_BEND),
                ..base
            },
            // Spikes are pushed back by their own slot offset so sparse hits
            // spread out instead of landing on the pads.
            Category::CosmicRay => NoteEvent {
                pitch: COSMIC_RAY_PITCH,
                velocity: range.rescale(value, COSMIC_RAY_VELOCITY.0, COSMIC_RAY_VELOCITY.1) / 2,
                start_ms: start_ms + slot as u64 * SLOT_MS,
                ..base
            },
        };
        tracks[idx].push(note)?;
    }

    for track in &tracks {
        debug!("{}: {} notes", track.name, track.notes().len());
    }
    Ok(Score {
        tracks,
        ..Score::default()
    })
}

/// [`sonify`] over the components of a [`Decomposition`].
pub fn sonify_decomposition(
    wavelengths: &[f64],
    decomposition: &Decomposition,
    config: &SonifyConfig,
) -> Result<Score> {
    sonify(
        wavelengths,
        decomposition.continuum(),
        decomposition.emission(),
        decomposition.absorption(),
        decomposition.cosmic_ray(),
        config,
    )
}

/// Index of the timbre tier for a normalized intensity.
pub fn intensity_tier(normalized: f64) -> usize {
    TIER_CUTS
        .iter()
        .rposition(|&cut| normalized >= cut)
        .unwrap_or(0)
}

/// Single-track sonification of an intensity curve.
///
/// Intensities are normalized against their own maximum, which must be
/// positive. Pitch follows the wavelength across the curve's own span, and
/// notes sit back to back without overlap.
pub fn sonify_intensity(
    wavelengths: &[f64],
    intensities: &[f64],
    config: &SonifyConfig,
) -> Result<Score> {
    if wavelengths.len() != intensities.len() {
        return Err(Error::invalid(format!(
            "{} intensities for {} wavelengths",
            intensities.len(),
            wavelengths.len()
        )));
    }
    let normalized = normalize_to_max(intensities)?;
    let span = ValueRange::of(wavelengths.iter().copied())
        .ok_or_else(|| Error::invalid("wavelength axis has no finite values"))?;

    let mut current_tier = intensity_tier(normalized[0]);
    let mut track = Track::new("intensity", 0, config.tier_programs[current_tier])?;

    for (i, (&w, &level)) in wavelengths.iter().zip(&normalized).enumerate() {
        let start_ms = i as u64 * INTENSITY_NOTE_MS;
        let tier = intensity_tier(level);
        if tier != current_tier {
            track.change_program(start_ms, config.tier_programs[tier])?;
            current_tier = tier;
        }
        track.push(NoteEvent {
            channel: 0,
            pitch: midi_clamp(interpolate(w, (span.min, span.max), INTENSITY_PITCH)),
            velocity: midi_clamp(interpolate(level, (0.0, 1.0), INTENSITY_VELOCITY)),
            start_ms,
            duration_ms: INTENSITY_NOTE_MS,
            pitch_bend: None,
        })?;
    }

    debug!(
        "intensity: {} notes, {} program changes",
        track.notes().len(),
        track.program_changes().len()
    );
    Ok(Score {
        tracks: vec![track],
        ..Score::default()
    })
}
