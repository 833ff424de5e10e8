use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::classify::ClassCodes;
use crate::sonify::SonifyConfig;

/// Where rendered artifacts go and how the synthesis backend is driven.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Symbolic score (MIDI) output.
    pub midi_path: PathBuf,
    /// Rendered waveform output.
    pub wav_path: PathBuf,
    /// Instrument sound bank handed to the backend.
    pub sound_bank: PathBuf,
    /// Explicit backend executable; otherwise `FLUIDSYNTH_PATH`, then `PATH`.
    pub synth_path: Option<PathBuf>,
    pub sample_rate: u32,
    pub gain: f32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            midi_path: PathBuf::from("spectrum.mid"),
            wav_path: PathBuf::from("spectrum.wav"),
            sound_bank: PathBuf::from("FluidR3_GM.sf2"),
            synth_path: None,
            sample_rate: 44_100,
            gain: 0.6,
        }
    }
}

/// Everything a session needs besides the cube itself. Every field is
/// optional in the JSON file.
///
/// ```json
/// {
///   "output": { "sound_bank": "/usr/share/sounds/sf2/FluidR3_GM.sf2" },
///   "sonify": { "emission_program": 52 },
///   "class_codes": { "continuum": [0, 1, 2, 10], "emission": [3, 6, 7, 8],
///                    "absorption": [9, 11], "cosmic_ray": [4, 5] }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub output: OutputConfig,
    pub sonify: SonifyConfig,
    pub class_codes: ClassCodes,
}

impl Config {
    /// Read a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }
}
