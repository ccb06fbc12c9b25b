//! Spectrum analysis of an insert's output.
//!
//! The render side pushes a mono mix of each processed block into a tap
//! ring; the analyser drains it on the control tick and keeps the magnitude
//! spectrum of the latest `fft_size` samples.

use std::f32::consts::PI;
use std::sync::Arc;

use ringbuf::traits::{Consumer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

pub struct SpectrumAnalyser {
    tap: HeapCons<f32>,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    window_sum: f32,
    /// Latest samples, oldest first.
    history: Vec<f32>,
    incoming: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
}

impl SpectrumAnalyser {
    /// Create an analyser and the tap the render side writes into.
    pub fn new(fft_size: usize) -> (Self, HeapProd<f32>) {
        let fft_size = fft_size.max(2);
        let (producer, consumer) = HeapRb::<f32>::new(fft_size * 4).split();
        let fft = FftPlanner::new().plan_fft_forward(fft_size);
        let window: Vec<f32> = (0..fft_size)
            .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / fft_size as f32).cos())
            .collect();
        let window_sum = window.iter().sum();
        let analyser = Self {
            tap: consumer,
            fft,
            window,
            window_sum,
            history: vec![0.0; fft_size],
            incoming: vec![0.0; fft_size * 4],
            scratch: vec![Complex { re: 0.0, im: 0.0 }; fft_size],
            magnitudes: vec![0.0; fft_size / 2],
        };
        (analyser, producer)
    }

    pub fn fft_size(&self) -> usize {
        self.history.len()
    }

    /// Linear magnitude per bin, normalised so a full-scale sine centred on
    /// a bin reads 1.0.
    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitudes
    }

    pub fn bin_frequency(&self, bin: usize, sample_rate: u32) -> f32 {
        bin as f32 * sample_rate as f32 / self.fft_size() as f32
    }

    /// Drain the tap and recompute if anything arrived.
    pub fn update(&mut self) -> bool {
        let n = self.tap.pop_slice(&mut self.incoming);
        if n == 0 {
            return false;
        }
        let size = self.history.len();
        let fresh = &self.incoming[n.saturating_sub(size)..n];
        self.history.rotate_left(fresh.len());
        self.history[size - fresh.len()..].copy_from_slice(fresh);
        self.compute();
        true
    }

    /// Forget everything heard so far, including whatever is still queued
    /// in the tap.
    pub fn clear(&mut self) {
        while self.tap.pop_slice(&mut self.incoming) > 0 {}
        self.history.fill(0.0);
        self.magnitudes.fill(0.0);
    }

    fn compute(&mut self) {
        for ((c, x), w) in self.scratch.iter_mut().zip(&self.history).zip(&self.window) {
            *c = Complex { re: x * w, im: 0.0 };
        }
        self.fft.process(&mut self.scratch);
        let scale = 2.0 / self.window_sum;
        for (m, c) in self.magnitudes.iter_mut().zip(&self.scratch) {
            *m = c.norm() * scale;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringbuf::traits::Producer;

    #[test]
    fn sine_peaks_in_its_bin() {
        let (mut analyser, mut tap) = SpectrumAnalyser::new(256);
        let bin = 16;
        let samples: Vec<f32> = (0..256)
            .map(|i| (2.0 * PI * bin as f32 * i as f32 / 256.0).sin())
            .collect();
        tap.push_slice(&samples);
        assert!(analyser.update());

        let mags = analyser.magnitudes();
        let peak = mags
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(peak, Some(bin));
        assert!((mags[bin] - 1.0).abs() < 0.01);
        assert_eq!(analyser.bin_frequency(bin, 48_000), 3000.0);
    }

    #[test]
    fn clear_zeroes_spectrum_and_drops_queued_samples() {
        let (mut analyser, mut tap) = SpectrumAnalyser::new(64);
        let tone: Vec<f32> = (0..64).map(|i| (2.0 * PI * 4.0 * i as f32 / 64.0).sin()).collect();
        tap.push_slice(&tone);
        assert!(analyser.update());
        tap.push_slice(&tone);

        analyser.clear();
        assert!(analyser.magnitudes().iter().all(|m| *m == 0.0));
        assert!(!analyser.update());
    }

    #[test]
    fn empty_tap_does_no_work() {
        let (mut analyser, _tap) = SpectrumAnalyser::new(128);
        assert!(!analyser.update());
        assert!(analyser.magnitudes().iter().all(|m| *m == 0.0));
    }
}
