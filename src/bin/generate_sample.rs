use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Float64Builder, Int64Array, Int64Builder, ListBuilder, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

// Class codes written to the `labels` column (the default code table).
const CONTINUUM: i64 = 0;
const EMISSION: i64 = 3;
const ABSORPTION: i64 = 9;
const COSMIC_RAY: i64 = 4;

const WIDTH: usize = 8;
const HEIGHT: usize = 8;

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// Rest-frame emission lines: (centre Å, sigma Å, peak relative to continuum).
const EMISSION_LINES: [(f64, f64, f64); 6] = [
    (6563.0, 3.0, 4.0), // H-alpha
    (4861.0, 3.0, 1.5), // H-beta
    (5007.0, 3.0, 2.5), // [O III]
    (4959.0, 3.0, 0.9), // [O III]
    (6717.0, 3.0, 0.6), // [S II]
    (6731.0, 3.0, 0.5), // [S II]
];

/// Stellar absorption features: (centre Å, sigma Å, depth relative to continuum).
const ABSORPTION_LINES: [(f64, f64, f64); 3] = [
    (3934.0, 6.0, 0.5), // Ca II K
    (3969.0, 6.0, 0.4), // Ca II H
    (5175.0, 8.0, 0.2), // Mg b
];

/// One spaxel: flux and per-sample class codes. Brightness falls off from
/// the cube centre.
fn generate_spaxel(wave: &[f64], x: usize, y: usize, rng: &mut SimpleRng) -> (Vec<f64>, Vec<i64>) {
    let dx = x as f64 - WIDTH as f64 / 2.0;
    let dy = y as f64 - HEIGHT as f64 / 2.0;
    let brightness = (-(dx * dx + dy * dy) / 18.0).exp();

    let mut flux = Vec::with_capacity(wave.len());
    let mut labels = Vec::with_capacity(wave.len());
    for &w in wave {
        let continuum = brightness * (1.0 + 0.3 * (w - 3600.0) / 3800.0);
        let em: f64 = EMISSION_LINES
            .iter()
            .map(|&(mu, sigma, amp)| gaussian(w, mu, sigma, amp * continuum))
            .sum();
        let ab: f64 = ABSORPTION_LINES
            .iter()
            .map(|&(mu, sigma, depth)| gaussian(w, mu, sigma, depth * continuum))
            .sum();

        let mut value = continuum + em - ab + rng.gauss(0.0, 0.01 * brightness);
        let mut label = if em > 0.2 * continuum {
            EMISSION
        } else if ab > 0.1 * continuum {
            ABSORPTION
        } else {
            CONTINUUM
        };
        if rng.next_f64() < 0.002 {
            value += 20.0 * brightness;
            label = COSMIC_RAY;
        }
        flux.push(value);
        labels.push(label);
    }
    (flux, labels)
}

fn main() -> Result<()> {
    env_logger::init();
    let mut rng = SimpleRng::new(42);

    // MaNGA-like log-spaced rest wavelengths, 3600 → ~7400 Å
    let wave: Vec<f64> = (0..3000)
        .map(|i| 3600.0 * 10f64.powf(i as f64 * 1.04e-4))
        .collect();

    let mut wave_builder = ListBuilder::new(Float64Builder::new());
    let mut flux_builder = ListBuilder::new(Float64Builder::new());
    let mut label_builder = ListBuilder::new(Int64Builder::new());
    let mut all_x: Vec<i64> = Vec::new();
    let mut all_y: Vec<i64> = Vec::new();

    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            let (flux, labels) = generate_spaxel(&wave, x, y, &mut rng);

            wave_builder.values().append_slice(&wave);
            wave_builder.append(true);
            flux_builder.values().append_slice(&flux);
            flux_builder.append(true);
            label_builder.values().append_slice(&labels);
            label_builder.append(true);
            all_x.push(x as i64);
            all_y.push(y as i64);
        }
    }
    let n_rows = all_x.len();

    let list_of = |inner: DataType| DataType::List(Arc::new(Field::new("item", inner, true)));
    let schema = Arc::new(Schema::new(vec![
        Field::new("spaxel_x", DataType::Int64, false),
        Field::new("spaxel_y", DataType::Int64, false),
        Field::new("wave", list_of(DataType::Float64), false),
        Field::new("flux", list_of(DataType::Float64), false),
        Field::new("labels", list_of(DataType::Int64), true),
        Field::new("instrument", DataType::Utf8, false),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(Int64Array::from(all_x)),
            Arc::new(Int64Array::from(all_y)),
            Arc::new(wave_builder.finish()),
            Arc::new(flux_builder.finish()),
            Arc::new(label_builder.finish()),
            Arc::new(StringArray::from(vec!["synthetic"; n_rows])),
        ],
    )
    .context("building record batch")?;

    // Write Parquet
    let output_path = "sample_cube.parquet";
    let file = std::fs::File::create(output_path).context("creating output file")?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing record batch")?;
    writer.close().context("closing parquet writer")?;

    println!(
        "Wrote {n_rows} spaxels ({WIDTH}x{HEIGHT}, {} wavelengths each) to {output_path}",
        wave.len()
    );
    Ok(())
}
