//! Historical corpus -- the single persisted table of labelled samples.
//!
//! Columns: `time,frequency,amplitude,is_anomaly`. The corpus is both the
//! novelty model's training set and the replay source's data. If the file is
//! missing it can be synthesized once; an existing file is loaded as-is.

use std::f64::consts::PI;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use rand::seq::{index, SliceRandom};
use rand::Rng;
use tracing::info;

use crate::config::CorpusConfig;
use crate::source::Sample;

const HEADER: &str = "time,frequency,amplitude,is_anomaly";

/// Corpus rows, ordered by time.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    samples: Vec<Sample>,
}

impl Corpus {
    pub fn from_samples(mut samples: Vec<Sample>) -> Self {
        samples.retain(Sample::is_finite);
        samples.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self { samples }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn anomaly_count(&self) -> usize {
        self.samples.iter().filter(|s| s.is_known_anomaly).count()
    }

    /// Parse a CSV file. Columns are located by header name.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read corpus: {}", path.display()))?;
        let mut lines = content.lines();

        let header = lines.next().context("corpus is empty")?;
        let columns: Vec<&str> = header.split(',').map(str::trim).collect();
        let col = |name: &str| {
            columns
                .iter()
                .position(|c| *c == name)
                .with_context(|| format!("corpus header is missing column '{}'", name))
        };
        let (c_time, c_freq, c_amp, c_label) =
            (col("time")?, col("frequency")?, col("amplitude")?, col("is_anomaly")?);

        let mut samples = Vec::new();
        for (n, line) in lines.enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            let row = n + 2;
            let field = |i: usize| {
                fields
                    .get(i)
                    .copied()
                    .with_context(|| format!("row {}: expected {} columns", row, columns.len()))
            };
            let num = |i: usize| -> Result<f64> {
                let raw = field(i)?;
                raw.parse()
                    .with_context(|| format!("row {}: invalid number '{}'", row, raw))
            };
            let label = match field(c_label)? {
                "1" | "1.0" | "true" | "True" => true,
                "0" | "0.0" | "false" | "False" => false,
                other => bail!("row {}: invalid is_anomaly '{}'", row, other),
            };
            samples.push(Sample::new(num(c_time)?, num(c_freq)?, num(c_amp)?, label));
        }

        let corpus = Self::from_samples(samples);
        info!(
            path = %path.display(),
            rows = corpus.len(),
            anomalies = corpus.anomaly_count(),
            "loaded corpus"
        );
        Ok(corpus)
    }

    /// Write rows in the given order.
    pub fn save(path: &Path, rows: &[Sample]) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let file = fs::File::create(path)
            .with_context(|| format!("failed to create corpus: {}", path.display()))?;
        let mut out = BufWriter::new(file);
        writeln!(out, "{}", HEADER)?;
        for s in rows {
            writeln!(
                out,
                "{},{},{},{}",
                s.time,
                s.frequency,
                s.amplitude,
                u8::from(s.is_known_anomaly)
            )?;
        }
        out.flush()?;
        Ok(())
    }

    /// Load the configured corpus, synthesizing it first if allowed and absent.
    pub fn load_or_generate(cfg: &CorpusConfig) -> Result<Self> {
        if !cfg.path.exists() {
            if !cfg.generate_if_missing {
                bail!("corpus not found: {}", cfg.path.display());
            }
            generate(&cfg.path, &mut rand::thread_rng())?;
        }
        Self::load(&cfg.path)
    }
}

/// Synthesize a corpus and write it to `path`. Returns the row count.
pub fn generate<R: Rng + ?Sized>(path: &Path, rng: &mut R) -> Result<usize> {
    let rows = synthesize(rng);
    Corpus::save(path, &rows)?;
    let anomalies = rows.iter().filter(|s| s.is_known_anomaly).count();
    info!(
        path = %path.display(),
        rows = rows.len(),
        anomalies,
        pct = %format!("{:.1}", anomalies as f64 / rows.len() as f64 * 100.0),
        "generated synthetic corpus"
    );
    Ok(rows.len())
}

const TIME_POINTS: usize = 5000;
const DURATION_SECS: f64 = 10.0;
const FM_CARRIERS_MHZ: [f64; 6] = [88.5, 91.7, 95.3, 98.1, 102.5, 105.9];
const HOP_CHANNELS_MHZ: [f64; 4] = [89.2, 93.4, 97.8, 104.3];
const BURSTS: usize = 20;
const BURST_LEN: usize = 5;
const SPY_CARRIER_MHZ: f64 = 94.2;
const TARGET_ANOMALY_FRACTION: f64 = 0.15;

/// Gaussian noise via Box-Muller.
fn gaussian<R: Rng + ?Sized>(rng: &mut R, sigma: f64) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    sigma * (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// Build a labelled, shuffled corpus: steady FM carriers as normal traffic,
/// with frequency hopping, high-power bursts and a weak drifting carrier as
/// anomalies.
pub fn synthesize<R: Rng + ?Sized>(rng: &mut R) -> Vec<Sample> {
    let t: Vec<f64> = (0..TIME_POINTS)
        .map(|i| DURATION_SECS * i as f64 / (TIME_POINTS - 1) as f64)
        .collect();

    let mut normal = Vec::new();
    for &freq in &FM_CARRIERS_MHZ {
        let amplitude = rng.gen_range(0.5..1.0);
        let phase = rng.gen_range(0.0..2.0 * PI);
        for &ti in t.iter().step_by(5) {
            let modulator = (2.0 * PI * 0.1 * ti).sin();
            let value = amplitude * (2.0 * PI * freq * ti + phase + 0.5 * modulator).sin()
                + gaussian(rng, 0.05);
            normal.push(Sample::new(ti, freq, value, false));
        }
    }

    let mut anomalies = Vec::new();

    let mut hop = HOP_CHANNELS_MHZ[0];
    for (i, &ti) in t.iter().enumerate() {
        if i % 100 == 0 {
            hop = *HOP_CHANNELS_MHZ.choose(rng).unwrap_or(&hop);
        }
        if i % 20 == 0 {
            let amplitude = rng.gen_range(0.2..0.4);
            let value = amplitude * (2.0 * PI * hop * ti).sin() + gaussian(rng, 0.02);
            anomalies.push(Sample::new(ti, hop, value, true));
        }
    }

    for start in index::sample(rng, TIME_POINTS, BURSTS).into_iter() {
        let freq = rng.gen_range(90.0..100.0);
        for &ti in t.iter().skip(start).take(BURST_LEN) {
            anomalies.push(Sample::new(ti, freq, rng.gen_range(3.0..5.0), true));
        }
    }

    let total = normal.len() + anomalies.len();
    if (anomalies.len() as f64) < TARGET_ANOMALY_FRACTION * total as f64 {
        let wanted = (normal.len() as f64 * TARGET_ANOMALY_FRACTION
            / (1.0 - TARGET_ANOMALY_FRACTION)) as usize;
        let needed = wanted.saturating_sub(anomalies.len());
        for &ti in t.iter().step_by(10).take(needed) {
            let freq = SPY_CARRIER_MHZ + gaussian(rng, 0.05);
            anomalies.push(Sample::new(ti, freq, rng.gen_range(0.3..0.5), true));
        }
    }

    let mut rows = normal;
    rows.extend(anomalies);
    rows.shuffle(rng);
    rows
}
