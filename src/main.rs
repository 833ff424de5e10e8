use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use cosmic_composers::classify::Category;
use cosmic_composers::config::Config;
use cosmic_composers::data::loader::load_cube;
use cosmic_composers::session::Session;

/// Cosmic Composers – sonify spaxels of a spectral data cube
#[derive(Parser)]
#[command(name = "cosmic-composers")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print cube shape, wavelength span and metadata
    Info {
        /// Cube file (.parquet, .json or .csv)
        cube: PathBuf,
    },

    /// Sum flux in the nine named wavelength bands at one spaxel
    Compress {
        #[command(flatten)]
        pixel: PixelArgs,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Split one spaxel's spectrum into continuum / emission / absorption / cosmic-ray
    Decompose {
        #[command(flatten)]
        pixel: PixelArgs,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Four-voice sonification of a decomposed spaxel
    Sonify {
        #[command(flatten)]
        pixel: PixelArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Single-voice sonification of the compressed spaxel
    SonifyCompressed {
        #[command(flatten)]
        pixel: PixelArgs,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Args)]
struct PixelArgs {
    /// Cube file (.parquet, .json or .csv)
    cube: PathBuf,

    /// Spaxel x coordinate
    #[arg(short)]
    x: usize,

    /// Spaxel y coordinate
    #[arg(short)]
    y: usize,

    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct OutputArgs {
    /// Score (MIDI) output path
    #[arg(long)]
    midi: Option<PathBuf>,

    /// Waveform output path
    #[arg(long)]
    wav: Option<PathBuf>,

    /// Sound bank (.sf2) used by the synthesis backend
    #[arg(long)]
    sound_bank: Option<PathBuf>,

    /// Write the score only, do not render audio
    #[arg(long)]
    score_only: bool,
}

fn open_session(pixel: &PixelArgs, output: Option<&OutputArgs>) -> Result<Session> {
    let mut config = match &pixel.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(out) = output {
        if let Some(p) = &out.midi {
            config.output.midi_path = p.clone();
        }
        if let Some(p) = &out.wav {
            config.output.wav_path = p.clone();
        }
        if let Some(p) = &out.sound_bank {
            config.output.sound_bank = p.clone();
        }
    }
    let cube = load_cube(&pixel.cube)
        .with_context(|| format!("loading {}", pixel.cube.display()))?;
    let mut session = Session::new(cube, config);
    session.score_only = output.is_some_and(|o| o.score_only);
    Ok(session)
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Info { cube } => {
            let cube = load_cube(&cube).with_context(|| format!("loading {}", cube.display()))?;
            let (n_wave, height, width) = cube.shape();
            let wave = cube.wave_rest();
            println!("spaxels:     {width} x {height}");
            println!("wavelengths: {n_wave} ({:.1} – {:.1} Å)", wave[0], wave[n_wave - 1]);
            println!("labels:      {}", if cube.has_labels() { "yes" } else { "no" });
            for (key, value) in &cube.metadata {
                println!("{key:>12}: {value}");
            }
        }
        Commands::Compress { pixel, json } => {
            let session = open_session(&pixel, None)?;
            let features = session.compress_pixel(pixel.x, pixel.y)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&features)?);
            } else {
                print!("{features}");
            }
        }
        Commands::Decompose { pixel, json } => {
            let session = open_session(&pixel, None)?;
            let decomposition = session.decompose_pixel(pixel.x, pixel.y)?;
            let rows: Vec<_> = Category::ALL
                .iter()
                .map(|&c| {
                    let comp = decomposition.component(c);
                    (c, comp.indices.len(), comp.flux.iter().sum::<f64>())
                })
                .collect();
            if json {
                let value: serde_json::Map<String, serde_json::Value> = rows
                    .iter()
                    .map(|(c, count, total)| {
                        (
                            c.as_str().to_string(),
                            serde_json::json!({ "samples": count, "flux": total }),
                        )
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                for (c, count, total) in rows {
                    println!("{:>12}  {count:>6} samples  {total:.6}", c.as_str());
                }
                if !decomposition.unclassified.is_empty() {
                    println!("{:>12}  {:>6} samples", "unmapped", decomposition.unclassified.len());
                }
            }
        }
        Commands::Sonify { pixel, output } => {
            let session = open_session(&pixel, Some(&output))?;
            let files = session.sonify_pixel(pixel.x, pixel.y)?;
            report(&files);
        }
        Commands::SonifyCompressed { pixel, output } => {
            let session = open_session(&pixel, Some(&output))?;
            let files = session.sonify_compressed(pixel.x, pixel.y)?;
            report(&files);
        }
    }
    Ok(())
}

fn report(files: &cosmic_composers::render::RenderedFiles) {
    match &files.wav_path {
        Some(wav) => println!("Saved: {} and {}", files.midi_path.display(), wav.display()),
        None => println!("Saved: {}", files.midi_path.display()),
    }
}
