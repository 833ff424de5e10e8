use std::path::Path;

use cosmic_composers::config::Config;
use cosmic_composers::data::model::DataCube;
use cosmic_composers::render::Renderer;
use cosmic_composers::session::Session;
use cosmic_composers::Error;
use midly::{MidiMessage, Smf, TrackEventKind};
use pretty_assertions::assert_eq;

/// Stand-in backend: the "waveform" is a byte copy of the score file.
struct CopyRenderer;

impl Renderer for CopyRenderer {
    fn render(&self, score_path: &Path, wav_path: &Path) -> cosmic_composers::Result<()> {
        std::fs::copy(score_path, wav_path)?;
        Ok(())
    }
}

/// Single-spaxel cube.
fn pixel_cube(wave: Vec<f64>, flux: Vec<f64>, labels: Option<Vec<i64>>) -> DataCube {
    DataCube::new(wave, flux, labels, 1, 1).unwrap()
}

fn session_in(dir: &Path, cube: DataCube) -> Session {
    let mut config = Config::default();
    config.output.midi_path = dir.join("spaxel.mid");
    config.output.wav_path = dir.join("spaxel.wav");
    Session::new(cube, config).with_renderer(Box::new(CopyRenderer))
}

/// Note-on count per track of a MIDI file.
fn note_ons_per_track(path: &Path) -> Vec<usize> {
    let bytes = std::fs::read(path).unwrap();
    let smf = Smf::parse(&bytes).unwrap();
    smf.tracks
        .iter()
        .map(|track| {
            track
                .iter()
                .filter(|ev| {
                    matches!(
                        ev.kind,
                        TrackEventKind::Midi { message: MidiMessage::NoteOn { .. }, .. }
                    )
                })
                .count()
        })
        .collect()
}

#[test]
fn continuum_block_renders_ten_notes_on_the_pad_track() {
    let dir = tempfile::tempdir().unwrap();
    let n = 50;
    let wave: Vec<f64> = (0..n).map(|i| 4000.0 + 10.0 * i as f64).collect();
    let mut flux = vec![0.0; n];
    flux[..10].fill(1.0);
    let cube = pixel_cube(wave, flux, Some(vec![0; n]));

    let session = session_in(dir.path(), cube);
    let files = session.sonify_pixel(0, 0).unwrap();

    assert_eq!(note_ons_per_track(&files.midi_path), vec![10, 0, 0, 0]);
    let score = session.score_pixel(0, 0).unwrap();
    let pad = score.track("continuum").unwrap();
    assert!(pad.notes().iter().all(|n| n.velocity == 40));
    assert_eq!(pad.notes().last().unwrap().start_ms, 900);
}

#[test]
fn labelled_spaxel_spreads_over_four_tracks() {
    let dir = tempfile::tempdir().unwrap();
    let wave = vec![4000.0, 4001.0, 4002.0, 4003.0, 4004.0, 4005.0];
    let flux = vec![1.0, 2.0, 5.0, 0.5, 30.0, 1.5];
    // continuum, emission, emission, absorption, cosmic ray, unmapped
    let labels = vec![0, 3, 7, 11, 5, 42];
    let session = session_in(dir.path(), pixel_cube(wave, flux, Some(labels)));

    let decomposition = session.decompose_pixel(0, 0).unwrap();
    assert_eq!(decomposition.unclassified, vec![5]);

    let files = session.sonify_pixel(0, 0).unwrap();
    assert_eq!(note_ons_per_track(&files.midi_path), vec![1, 2, 1, 1]);
    let wav = files.wav_path.unwrap();
    assert_eq!(std::fs::read(&wav).unwrap(), std::fs::read(&files.midi_path).unwrap());
}

#[test]
fn rendering_is_repeatable() {
    let dir = tempfile::tempdir().unwrap();
    let wave = vec![6550.0, 6560.0, 6570.0];
    let cube = pixel_cube(wave, vec![1.0, 4.0, 2.0], Some(vec![0, 3, 4]));
    let session = session_in(dir.path(), cube);

    let first = session.sonify_pixel(0, 0).unwrap();
    let first_wav = std::fs::read(first.wav_path.as_ref().unwrap()).unwrap();
    let second = session.sonify_pixel(0, 0).unwrap();
    let second_wav = std::fs::read(second.wav_path.as_ref().unwrap()).unwrap();
    assert_eq!(first_wav.len(), second_wav.len());
    assert_eq!(first_wav, second_wav);
}

#[test]
fn compressed_spaxel_is_a_nine_note_melody() {
    let dir = tempfile::tempdir().unwrap();
    let wave = vec![4050.0, 4350.0, 4870.0, 5010.0, 5880.0, 6560.0, 6650.0, 6720.0];
    let flux = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
    let session = session_in(dir.path(), pixel_cube(wave, flux, None));

    let features = session.compress_pixel(0, 0).unwrap();
    assert_eq!(
        features.values(),
        &[6.0, 1.0, 2.0, 3.0, 4.0, 5.0, 7.0, 7.0, 8.0]
    );

    let files = session.sonify_compressed(0, 0).unwrap();
    assert_eq!(note_ons_per_track(&files.midi_path), vec![9]);
    let score = session.score_compressed(0, 0).unwrap();
    assert_eq!(score.duration_ms(), 9 * 200);
}

#[test]
fn dark_spaxel_fails_without_leaving_files() {
    let dir = tempfile::tempdir().unwrap();
    let cube = pixel_cube(vec![4000.0, 6560.0], vec![0.0, 0.0], None);
    let session = session_in(dir.path(), cube);

    let err = session.sonify_compressed(0, 0).unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn unlabelled_cube_cannot_be_decomposed() {
    let dir = tempfile::tempdir().unwrap();
    let session = session_in(dir.path(), pixel_cube(vec![4000.0], vec![1.0], None));
    assert!(matches!(session.sonify_pixel(0, 0), Err(Error::InvalidInput(_))));
}

#[test]
fn pixel_outside_cube_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let session = session_in(dir.path(), pixel_cube(vec![6560.0], vec![1.0], Some(vec![0])));
    assert!(matches!(
        session.sonify_pixel(1, 0),
        Err(Error::CoordinateOutOfRange { x: 1, y: 0, .. })
    ));
    assert!(matches!(
        session.compress_pixel(0, 4),
        Err(Error::CoordinateOutOfRange { .. })
    ));
}

#[test]
fn score_only_skips_the_backend() {
    let dir = tempfile::tempdir().unwrap();
    let cube = pixel_cube(vec![6560.0], vec![1.0], Some(vec![0]));
    let mut session = session_in(dir.path(), cube);
    session.score_only = true;

    let files = session.sonify_pixel(0, 0).unwrap();
    assert!(files.midi_path.exists());
    assert_eq!(files.wav_path, None);
    assert!(!dir.path().join("spaxel.wav").exists());
}
