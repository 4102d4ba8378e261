// Per-sample transforms stored alongside the raw history
//
// A transform is injected once at bank construction. Its width contract is
// checked there, so `apply` always receives correctly sized slices.

use crate::error::{StreamError, StreamResult};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// Stateless mapping from one raw vector to one derived vector
pub trait SampleTransform: Send + Sync {
    fn name(&self) -> &str;

    /// Output length for a given input length, or an error if the input
    /// length is not supported
    fn output_width(&self, input_width: usize) -> StreamResult<usize>;

    /// `input.len()` and `output.len()` match the widths agreed at construction
    fn apply(&self, input: &[f64], output: &mut [f64]);
}

/// Stores the raw vector unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl SampleTransform for Identity {
    fn name(&self) -> &str {
        "identity"
    }

    fn output_width(&self, input_width: usize) -> StreamResult<usize> {
        Ok(input_width)
    }

    fn apply(&self, input: &[f64], output: &mut [f64]) {
        output.copy_from_slice(input);
    }
}

/// Closure-backed transform with declared widths
pub struct FnTransform<F> {
    name: String,
    input_width: usize,
    output_width: usize,
    func: F,
}

impl<F> FnTransform<F>
where
    F: Fn(&[f64], &mut [f64]) + Send + Sync,
{
    pub fn new(name: impl Into<String>, input_width: usize, output_width: usize, func: F) -> Self {
        Self {
            name: name.into(),
            input_width,
            output_width,
            func,
        }
    }
}

impl<F> fmt::Debug for FnTransform<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTransform")
            .field("name", &self.name)
            .field("input_width", &self.input_width)
            .field("output_width", &self.output_width)
            .finish()
    }
}

impl<F> SampleTransform for FnTransform<F>
where
    F: Fn(&[f64], &mut [f64]) + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn output_width(&self, input_width: usize) -> StreamResult<usize> {
        if input_width != self.input_width {
            return Err(StreamError::InvalidConfig(format!(
                "transform '{}' expects {} input samples, bank width is {}",
                self.name, self.input_width, input_width
            )));
        }
        Ok(self.output_width)
    }

    fn apply(&self, input: &[f64], output: &mut [f64]) {
        (self.func)(input, output)
    }
}

/// log10 of the FFT magnitude over a contiguous band of bins
///
/// Bins follow the real-FFT convention: bin `k` sits at `k * sample_rate / width`
/// and only `0..=width/2` are meaningful.
pub struct LogMagnitudeSpectrum {
    width: usize,
    bins: Range<usize>,
    sample_rate: Option<f64>,
    fft: Arc<dyn Fft<f64>>,
}

impl LogMagnitudeSpectrum {
    pub fn new(width: usize, bins: Range<usize>) -> StreamResult<Self> {
        if width == 0 {
            return Err(StreamError::InvalidConfig(
                "spectrum width must be positive".into(),
            ));
        }
        let nyquist = width / 2;
        if bins.is_empty() || bins.end > nyquist + 1 {
            return Err(StreamError::InvalidConfig(format!(
                "spectrum bins {:?} outside 0..={} for width {}",
                bins, nyquist, width
            )));
        }

        let fft = FftPlanner::<f64>::new().plan_fft_forward(width);
        Ok(Self {
            width,
            bins,
            sample_rate: None,
            fft,
        })
    }

    /// Band starting at `low_bin` and ending at the last bin not above
    /// `max_frequency`
    pub fn for_band(
        width: usize,
        sample_rate: f64,
        low_bin: usize,
        max_frequency: f64,
    ) -> StreamResult<Self> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(StreamError::InvalidConfig(format!(
                "invalid sample rate {}",
                sample_rate
            )));
        }
        let resolution = sample_rate / width.max(1) as f64;
        let nyquist = width / 2;
        let high = (low_bin..=nyquist)
            .take_while(|&k| k as f64 * resolution <= max_frequency)
            .last()
            .map(|k| k + 1)
            .unwrap_or(low_bin);

        let mut spectrum = Self::new(width, low_bin..high)?;
        spectrum.sample_rate = Some(sample_rate);
        Ok(spectrum)
    }

    pub fn bins(&self) -> Range<usize> {
        self.bins.clone()
    }

    /// Frequency in Hz of every output value, when built with a sample rate
    pub fn frequencies(&self) -> Option<Vec<f64>> {
        let rate = self.sample_rate?;
        let resolution = rate / self.width as f64;
        Some(self.bins.clone().map(|k| k as f64 * resolution).collect())
    }
}

impl fmt::Debug for LogMagnitudeSpectrum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogMagnitudeSpectrum")
            .field("width", &self.width)
            .field("bins", &self.bins)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

impl SampleTransform for LogMagnitudeSpectrum {
    fn name(&self) -> &str {
        "log-magnitude-spectrum"
    }

    fn output_width(&self, input_width: usize) -> StreamResult<usize> {
        if input_width != self.width {
            return Err(StreamError::InvalidConfig(format!(
                "spectrum planned for {} samples, bank width is {}",
                self.width, input_width
            )));
        }
        Ok(self.bins.len())
    }

    fn apply(&self, input: &[f64], output: &mut [f64]) {
        let mut buffer: Vec<Complex<f64>> = input.iter().map(|&x| Complex::new(x, 0.0)).collect();
        self.fft.process(&mut buffer);

        for (out, bin) in output.iter_mut().zip(&buffer[self.bins.clone()]) {
            *out = bin.norm().log10();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_identity() {
        let mut out = [0.0; 3];
        Identity.apply(&[1.0, 2.0, 3.0], &mut out);
        assert_eq!(out, [1.0, 2.0, 3.0]);
        assert_eq!(Identity.output_width(7).unwrap(), 7);
    }

    #[test]
    fn test_fn_transform_width_contract() {
        let sum = FnTransform::new("sum", 4, 1, |input: &[f64], output: &mut [f64]| {
            output[0] = input.iter().sum();
        });
        assert_eq!(sum.output_width(4).unwrap(), 1);
        assert!(sum.output_width(5).is_err());

        let mut out = [0.0];
        sum.apply(&[1.0, 2.0, 3.0, 4.0], &mut out);
        assert_eq!(out[0], 10.0);
    }

    #[test]
    fn test_spectrum_peaks_at_tone_bin() {
        let width = 64;
        let tone_bin = 5;
        let signal: Vec<f64> = (0..width)
            .map(|i| (2.0 * PI * tone_bin as f64 * i as f64 / width as f64).sin())
            .collect();

        let spectrum = LogMagnitudeSpectrum::new(width, 1..33).unwrap();
        let mut out = vec![0.0; spectrum.output_width(width).unwrap()];
        spectrum.apply(&signal, &mut out);

        let peak = out
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i + 1)
            .unwrap();
        assert_eq!(peak, tone_bin);
        // |X_k| = width / 2 for a unit sine
        assert!((out[tone_bin - 1] - (width as f64 / 2.0).log10()).abs() < 1e-9);
    }

    #[test]
    fn test_band_selection() {
        // 16 samples at 1600 Hz -> 100 Hz per bin
        let spectrum = LogMagnitudeSpectrum::for_band(16, 1600.0, 2, 500.0).unwrap();
        assert_eq!(spectrum.bins(), 2..6);
        assert_eq!(
            spectrum.frequencies().unwrap(),
            vec![200.0, 300.0, 400.0, 500.0]
        );
        assert_eq!(spectrum.output_width(16).unwrap(), 4);
        assert!(spectrum.output_width(32).is_err());
    }

    #[test]
    fn test_band_caps_at_nyquist() {
        let spectrum = LogMagnitudeSpectrum::for_band(16, 1600.0, 0, 1.0e9).unwrap();
        assert_eq!(spectrum.bins(), 0..9);
    }

    #[test]
    fn test_empty_band_rejected() {
        assert!(LogMagnitudeSpectrum::for_band(16, 1600.0, 2, 50.0).is_err());
        assert!(LogMagnitudeSpectrum::new(16, 3..3).is_err());
        assert!(LogMagnitudeSpectrum::new(16, 0..10).is_err());
    }
}
