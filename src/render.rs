//! Rendering a score to audio through an external synthesis backend.
//!
//! The backend sits behind [`Renderer`] so the mapping logic can be exercised
//! without spawning a process. [`render_score`] stages both output files in
//! their destination directories and only moves them into place once the
//! backend has succeeded.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::{debug, info};
use tempfile::NamedTempFile;

use crate::config::OutputConfig;
use crate::error::{Error, Result};
use crate::score::Score;

/// Environment variable naming the backend executable.
pub const SYNTH_PATH_ENV: &str = "FLUIDSYNTH_PATH";

/// Turns a score file into a waveform file.
pub trait Renderer {
    fn render(&self, score_path: &Path, wav_path: &Path) -> Result<()>;
}

/// FluidSynth, driven in non-interactive fast-render mode.
#[derive(Debug, Clone)]
pub struct FluidSynthRenderer {
    pub sound_bank: PathBuf,
    pub executable: Option<PathBuf>,
    pub sample_rate: u32,
    pub gain: f32,
}

impl FluidSynthRenderer {
    pub fn from_config(config: &OutputConfig) -> Self {
        Self {
            sound_bank: config.sound_bank.clone(),
            executable: config.synth_path.clone(),
            sample_rate: config.sample_rate,
            gain: config.gain,
        }
    }

    /// Locate the backend: explicit path, then `FLUIDSYNTH_PATH`, then `PATH`.
    pub fn find_executable(&self) -> Result<PathBuf> {
        if let Some(path) = &self.executable {
            if path.exists() {
                return Ok(path.clone());
            }
            return Err(Error::RenderingUnavailable {
                what: "synthesis backend",
                path: path.clone(),
            });
        }

        if let Some(path) = std::env::var_os(SYNTH_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Ok(path);
            }
            return Err(Error::RenderingUnavailable {
                what: "synthesis backend",
                path,
            });
        }

        let name = if cfg!(windows) { "fluidsynth.exe" } else { "fluidsynth" };
        which::which(name).map_err(|_| Error::RenderingUnavailable {
            what: "synthesis backend",
            path: PathBuf::from(name),
        })
    }
}

impl Renderer for FluidSynthRenderer {
    fn render(&self, score_path: &Path, wav_path: &Path) -> Result<()> {
        if !self.sound_bank.is_file() {
            return Err(Error::RenderingUnavailable {
                what: "sound bank",
                path: self.sound_bank.clone(),
            });
        }
        let executable = self.find_executable()?;

        // fluidsynth -ni -g <gain> -r <rate> -F <wav> <soundfont> <midi>
        let mut cmd = Command::new(&executable);
        cmd.arg("-ni")
            .arg("-g")
            .arg(self.gain.to_string())
            .arg("-r")
            .arg(self.sample_rate.to_string())
            .arg("-F")
            .arg(wav_path)
            .arg(&self.sound_bank)
            .arg(score_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        debug!("running {cmd:?}");

        let output = cmd.output()?;
        if !output.status.success() {
            return Err(Error::RenderFailed {
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Final locations of a successful render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedFiles {
    pub midi_path: PathBuf,
    pub wav_path: Option<PathBuf>,
}

/// A hidden temp file next to `dest`, so the final rename stays on one
/// filesystem. Created with the mode a plain `File::create` would get
/// (0666 less the umask), since the rename keeps it.
fn staging_file(dest: &Path, suffix: &str) -> Result<NamedTempFile> {
    let dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut builder = tempfile::Builder::new();
    builder.prefix(".cosmic-").suffix(suffix);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o666));
    }
    Ok(builder.tempfile_in(dir)?)
}

fn commit(staged: NamedTempFile, dest: &Path) -> Result<()> {
    staged.persist(dest).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Write only the score file.
pub fn write_score(score: &Score, config: &OutputConfig) -> Result<RenderedFiles> {
    let midi = staging_file(&config.midi_path, ".mid")?;
    score.write_midi(midi.path())?;
    commit(midi, &config.midi_path)?;
    info!("saved {}", config.midi_path.display());
    Ok(RenderedFiles {
        midi_path: config.midi_path.clone(),
        wav_path: None,
    })
}

/// Write the score, render it, then move both files into place.
///
/// On failure the staged files are dropped and nothing is left at either
/// destination path.
pub fn render_score(
    score: &Score,
    config: &OutputConfig,
    renderer: &dyn Renderer,
) -> Result<RenderedFiles> {
    let midi = staging_file(&config.midi_path, ".mid")?;
    score.write_midi(midi.path())?;
    let wav = staging_file(&config.wav_path, ".wav")?;

    renderer.render(midi.path(), wav.path())?;

    commit(wav, &config.wav_path)?;
    commit(midi, &config.midi_path)?;
    info!(
        "saved {} and {} ({} ms of music)",
        config.midi_path.display(),
        config.wav_path.display(),
        score.duration_ms()
    );
    Ok(RenderedFiles {
        midi_path: config.midi_path.clone(),
        wav_path: Some(config.wav_path.clone()),
    })
}
