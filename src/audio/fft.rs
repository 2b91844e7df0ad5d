//! Radix-2 decimation-in-time FFT with a per-size twiddle cache.
//!
//! Only the magnitudes of the first N/2 bins leave this module; callers own
//! the decibel conversion (see [`magnitude_to_db`]).

use rustfft::num_complex::Complex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{Error, Result};

/// How a complex bin is folded into a magnitude.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MagnitudeMode {
    /// `sqrt(re² + im²)`
    #[default]
    Euclidean,
    /// `sqrt(re² × im²)`. Reproduces the output of the older JS analyser
    /// bit for bit; it is not a magnitude and breaks Parseval.
    LegacyProduct,
}

impl MagnitudeMode {
    fn magnitude(self, c: &Complex<f64>) -> f64 {
        match self {
            MagnitudeMode::Euclidean => (c.re * c.re + c.im * c.im).sqrt(),
            MagnitudeMode::LegacyProduct => (c.re * c.re * (c.im * c.im)).sqrt(),
        }
    }
}

/// Taper applied to each window before the transform.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum WindowFunction {
    #[default]
    Rectangular,
    Hann,
}

impl WindowFunction {
    pub fn apply(self, buffer: &mut [f64]) {
        match self {
            WindowFunction::Rectangular => {}
            WindowFunction::Hann => {
                let n = buffer.len();
                if n < 2 {
                    return;
                }
                let denom = (n - 1) as f64;
                for (i, sample) in buffer.iter_mut().enumerate() {
                    *sample *= 0.5 * (1.0 - (2.0 * PI * i as f64 / denom).cos());
                }
            }
        }
    }
}

/// Precomputed rotation coefficients for one transform size.
#[derive(Debug)]
pub struct TwiddleTable {
    /// `log2(N)`, the bit-reversal width.
    pub levels: u32,
    pub cos: Vec<f64>,
    pub sin: Vec<f64>,
}

impl TwiddleTable {
    fn new(n: usize) -> Self {
        let half = n / 2;
        let (cos, sin) = (0..half)
            .map(|i| {
                let angle = 2.0 * PI * i as f64 / n as f64;
                (angle.cos(), angle.sin())
            })
            .unzip();
        Self {
            levels: n.trailing_zeros(),
            cos,
            sin,
        }
    }
}

/// FFT engine owning the twiddle cache.
///
/// Construct once and share by reference: tables are keyed by size, added on
/// first use and never rewritten, so concurrent analyses can use the same
/// engine.
#[derive(Debug, Default)]
pub struct TransformEngine {
    tables: RwLock<HashMap<usize, Arc<TwiddleTable>>>,
    mode: MagnitudeMode,
}

impl TransformEngine {
    pub fn new(mode: MagnitudeMode) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            mode,
        }
    }

    pub fn mode(&self) -> MagnitudeMode {
        self.mode
    }

    /// Twiddle table for size `n`, computed on first request.
    pub fn table(&self, n: usize) -> Arc<TwiddleTable> {
        // Entries are insert-only, so a poisoned map is still consistent.
        if let Some(table) = self
            .tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&n)
        {
            return Arc::clone(table);
        }

        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
        let table = tables.entry(n).or_insert_with(|| {
            log::debug!("Building twiddle table for N={}", n);
            Arc::new(TwiddleTable::new(n))
        });
        Arc::clone(table)
    }

    /// Sizes with a cached table, ascending.
    pub fn cached_sizes(&self) -> Vec<usize> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        let mut sizes: Vec<usize> = tables.keys().copied().collect();
        sizes.sort_unstable();
        sizes
    }

    /// Magnitude spectrum of a real window, bins `[0, N/2)`.
    ///
    /// `window.len()` must be a non-zero power of two.
    pub fn transform(&self, window: &[f64]) -> Result<Vec<f64>> {
        let spectrum = self.transform_complex(window)?;
        Ok(self.half_magnitudes(&spectrum))
    }

    /// Like [`transform`](Self::transform) but zero-pads to the next power of
    /// two instead of rejecting the window. An empty window yields no bins.
    pub fn transform_padded(&self, window: &[f64]) -> Vec<f64> {
        let n = window.len().max(1).next_power_of_two();
        let mut buffer = to_complex(window, n);
        self.forward(&mut buffer);
        self.half_magnitudes(&buffer)
    }

    /// Full complex spectrum, all N bins, unnormalised.
    pub fn transform_complex(&self, window: &[f64]) -> Result<Vec<Complex<f64>>> {
        let n = window.len();
        if n == 0 || !n.is_power_of_two() {
            return Err(Error::NotPowerOfTwo(n));
        }
        let mut buffer = to_complex(window, n);
        self.forward(&mut buffer);
        Ok(buffer)
    }

    fn half_magnitudes(&self, spectrum: &[Complex<f64>]) -> Vec<f64> {
        spectrum[..spectrum.len() / 2]
            .iter()
            .map(|c| self.mode.magnitude(c))
            .collect()
    }

    /// In-place iterative Cooley-Tukey. `buffer.len()` is a power of two.
    fn forward(&self, buffer: &mut [Complex<f64>]) {
        let n = buffer.len();
        if n < 2 {
            return;
        }
        let table = self.table(n);

        for i in 0..n {
            let j = reverse_bits(i, table.levels);
            if j > i {
                buffer.swap(i, j);
            }
        }

        let mut size = 2;
        while size <= n {
            let half = size / 2;
            let step = n / size;
            for block in (0..n).step_by(size) {
                for (offset, k) in (0..half).zip((0..).step_by(step)) {
                    let j = block + offset;
                    let (cos, sin) = (table.cos[k], table.sin[k]);
                    let odd = buffer[j + half];
                    let rotated = Complex::new(
                        odd.re * cos + odd.im * sin,
                        -odd.re * sin + odd.im * cos,
                    );
                    buffer[j + half] = buffer[j] - rotated;
                    buffer[j] += rotated;
                }
            }
            size *= 2;
        }
    }
}

fn to_complex(window: &[f64], n: usize) -> Vec<Complex<f64>> {
    let mut buffer: Vec<Complex<f64>> = window.iter().map(|&x| Complex::new(x, 0.0)).collect();
    buffer.resize(n, Complex::new(0.0, 0.0));
    buffer
}

fn reverse_bits(x: usize, bits: u32) -> usize {
    if bits == 0 {
        return 0;
    }
    x.reverse_bits() >> (usize::BITS - bits)
}

/// `20·log10(magnitude / normalization)`, with NaN and infinities replaced by
/// `floor`.
pub fn magnitude_to_db(magnitude: f64, normalization: f64, floor: f64) -> f64 {
    let db = 20.0 * (magnitude / normalization).log10();
    if db.is_finite() {
        db
    } else {
        floor
    }
}
