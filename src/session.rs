use log::info;

use crate::classify::{decompose, Decomposition};
use crate::compress::{compress, FeatureVector};
use crate::config::Config;
use crate::data::model::DataCube;
use crate::error::{Error, Result};
use crate::render::{render_score, write_score, FluidSynthRenderer, RenderedFiles, Renderer};
use crate::score::Score;
use crate::sonify::{sonify_decomposition, sonify_intensity};

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Everything needed to turn a selected spaxel into sound: the loaded cube,
/// the configuration and the rendering backend. Each call is independent;
/// nothing is carried over from one pixel to the next.
pub struct Session {
    /// Loaded cube.
    pub cube: DataCube,

    /// Output paths, class codes and instrument programs.
    pub config: Config,

    /// Replacement backend. When unset, FluidSynth is set up from
    /// `config.output` at render time.
    renderer: Option<Box<dyn Renderer>>,

    /// Only write the score file; skip the backend.
    pub score_only: bool,
}

impl Session {
    /// A session rendering through FluidSynth as configured.
    pub fn new(cube: DataCube, config: Config) -> Self {
        Self {
            cube,
            config,
            renderer: None,
            score_only: false,
        }
    }

    /// Swap the rendering backend.
    pub fn with_renderer(mut self, renderer: Box<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Nine band sums at `(x, y)`.
    pub fn compress_pixel(&self, x: usize, y: usize) -> Result<FeatureVector> {
        compress(&self.cube, x, y)
    }

    /// Split the spectrum at `(x, y)` by the cube's class labels.
    pub fn decompose_pixel(&self, x: usize, y: usize) -> Result<Decomposition> {
        let spectrum = self.cube.spectrum(x, y)?;
        let labels = self
            .cube
            .labels_column(x, y)?
            .ok_or_else(|| Error::invalid("cube carries no classification labels"))?;
        decompose(&spectrum, &labels, &self.config.class_codes)
    }

    /// Multi-track score for `(x, y)`, not yet written anywhere.
    pub fn score_pixel(&self, x: usize, y: usize) -> Result<Score> {
        let decomposition = self.decompose_pixel(x, y)?;
        sonify_decomposition(self.cube.wave_rest(), &decomposition, &self.config.sonify)
    }

    /// Single-track score of the compressed spectrum at `(x, y)`. The band
    /// index stands in for wavelength.
    pub fn score_compressed(&self, x: usize, y: usize) -> Result<Score> {
        let features = self.compress_pixel(x, y)?;
        let axis: Vec<f64> = (0..features.values().len()).map(|i| i as f64).collect();
        sonify_intensity(&axis, features.values(), &self.config.sonify)
    }

    /// Decompose, sonify and render the spaxel at `(x, y)`.
    pub fn sonify_pixel(&self, x: usize, y: usize) -> Result<RenderedFiles> {
        let score = self.score_pixel(x, y)?;
        info!("pixel ({x}, {y}): {} notes", score.note_count());
        self.finish(&score)
    }

    /// Compress, sonify and render the spaxel at `(x, y)`.
    pub fn sonify_compressed(&self, x: usize, y: usize) -> Result<RenderedFiles> {
        let score = self.score_compressed(x, y)?;
        info!("pixel ({x}, {y}) compressed: {} notes", score.note_count());
        self.finish(&score)
    }

    fn finish(&self, score: &Score) -> Result<RenderedFiles> {
        if self.score_only {
            write_score(score, &self.config.output)
        } else if let Some(renderer) = &self.renderer {
            render_score(score, &self.config.output, renderer.as_ref())
        } else {
            let fluidsynth = FluidSynthRenderer::from_config(&self.config.output);
            render_score(score, &self.config.output, &fluidsynth)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_config_edits_reach_the_backend() {
        let dir = tempfile::tempdir().unwrap();
        let cube = DataCube::new(vec![6560.0], vec![1.0], Some(vec![0]), 1, 1).unwrap();
        let mut session = Session::new(cube, Config::default());
        session.config.output.midi_path = dir.path().join("out.mid");
        session.config.output.wav_path = dir.path().join("out.wav");
        let bank = dir.path().join("custom.sf2");
        session.config.output.sound_bank = bank.clone();

        match session.sonify_pixel(0, 0) {
            Err(Error::RenderingUnavailable { what: "sound bank", path }) => assert_eq!(path, bank),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
