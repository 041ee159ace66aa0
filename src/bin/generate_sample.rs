use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use specmod_review::data::loader::RecordFormat;
use specmod_review::{EventRecord, FileStore, FreqBand, SpectraStore, Spectrum, StationRecord};

/// Write a synthetic event record for trying out the review tool.
#[derive(Parser, Debug)]
#[command(name = "generate_sample")]
struct Args {
    #[arg(long, default_value = "Events")]
    parent_dir: PathBuf,

    #[arg(long, default_value = "2012-10-08T12:12:12.760000Z")]
    event: String,

    #[arg(long, value_enum, default_value = "json")]
    format: RecordFormat,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

/// Brune source spectrum with whole-path attenuation.
fn brune(f: f64, omega0: f64, fc: f64, t_star: f64) -> f64 {
    omega0 / (1.0 + (f / fc).powi(2)) * (-std::f64::consts::PI * f * t_star).exp()
}

/// Log-spaced frequencies from 10^lo to 10^hi.
fn logspace(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 10f64.powf(lo + (hi - lo) * i as f64 / (n - 1) as f64))
        .collect()
}

/// Deterministic log-normal scatter drawn from a SplitMix64 stream.
struct Scatter {
    state: u64,
}

impl Scatter {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform in (0, 1].
    fn unit(&mut self) -> f64 {
        ((self.next_u64() >> 11) + 1) as f64 / (1u64 << 53) as f64
    }

    /// Multiplicative factor `exp(sigma * z)` with `z` standard normal.
    fn factor(&mut self, sigma: f64) -> f64 {
        let (u, v) = (self.unit(), self.unit());
        let z = (-2.0 * u.ln()).sqrt() * (std::f64::consts::TAU * v).sin();
        (sigma * z).exp()
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let mut scatter = Scatter::new(args.seed);

    let freq = logspace(-2.0, 2.0, 200);

    // (station, omega0, corner Hz, t*, noise level, pass_snr, usable band)
    let stations: [(&str, f64, f64, f64, f64, bool, Option<(f64, f64)>); 5] = [
        ("ST01", 1e-5, 3.0, 0.02, 2e-8, true, Some((0.5, 30.0))),
        ("ST02", 4e-6, 2.5, 0.03, 5e-8, true, Some((1.0, 20.0))),
        ("ST03", 2e-6, 3.5, 0.04, 1e-7, true, None),
        ("ST04", 5e-7, 3.0, 0.05, 4e-7, false, None),
        ("ST05", 8e-6, 2.0, 0.025, 3e-8, true, Some((0.3, 40.0))),
    ];

    let mut record = EventRecord::new();
    for (id, omega0, fc, t_star, noise_level, pass_snr, band) in stations {
        let noise_amp: Vec<f64> = freq
            .iter()
            .map(|&f| noise_level / (1.0 + f).sqrt() * scatter.factor(0.3))
            .collect();
        let signal_amp: Vec<f64> = freq
            .iter()
            .zip(&noise_amp)
            .map(|(&f, &n)| brune(f, omega0, fc, t_star) * scatter.factor(0.2) + n)
            .collect();

        let signal = Spectrum::new(freq.clone(), signal_amp).context("building signal spectrum")?;
        let noise = Spectrum::new(freq.clone(), noise_amp).context("building noise spectrum")?;
        let band = band
            .map(|(lo, hi)| FreqBand::new(lo, hi))
            .transpose()
            .context("building usable band")?;

        record.insert(id, StationRecord::new(signal, noise, pass_snr, band));
    }

    let mut store = FileStore::new(args.format);
    store
        .save(&args.parent_dir, &args.event, &record)
        .context("writing sample record")?;

    println!(
        "Wrote {} stations ({} frequencies each) to {}",
        record.len(),
        freq.len(),
        store.record_path(&args.parent_dir, &args.event).display()
    );
    Ok(())
}
