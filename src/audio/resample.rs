//! PCM16 Sample-Rate Conversion
//!
//! Linear-interpolation resampling between the rates used by the platform:
//! 8kHz (G.711), 16kHz (AI input), 24kHz (AI output) and 48kHz (bridge).

use serde::{Deserialize, Serialize};

/// Sample rates supported by the audio pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleRate {
    Hz8000,
    Hz16000,
    Hz24000,
    Hz48000,
}

impl SampleRate {
    /// Rate in Hz
    pub fn hz(&self) -> u32 {
        match self {
            SampleRate::Hz8000 => 8_000,
            SampleRate::Hz16000 => 16_000,
            SampleRate::Hz24000 => 24_000,
            SampleRate::Hz48000 => 48_000,
        }
    }

    /// Samples in one 20ms frame at this rate
    pub fn samples_per_frame(&self) -> usize {
        (self.hz() as usize * 20) / 1000
    }
}

impl std::fmt::Display for SampleRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}Hz", self.hz())
    }
}

/// Linear-interpolation resampler between two fixed rates.
///
/// The output buffer is reused across calls so steady-state operation does
/// not allocate per frame.
pub struct Resampler {
    from: SampleRate,
    to: SampleRate,
    out: Vec<i16>,
}

impl Resampler {
    pub fn new(from: SampleRate, to: SampleRate) -> Self {
        Self {
            from,
            to,
            out: Vec::with_capacity(to.samples_per_frame() * 2),
        }
    }

    /// Resample a block of PCM16 samples.
    ///
    /// Returns a slice into the internal buffer, valid until the next call.
    pub fn process(&mut self, input: &[i16]) -> &[i16] {
        if self.from == self.to {
            self.out.clear();
            self.out.extend_from_slice(input);
            return &self.out;
        }

        let out_len = input.len() * self.to.hz() as usize / self.from.hz() as usize;
        self.out.clear();
        self.out.reserve(out_len);

        if input.is_empty() || out_len == 0 {
            return &self.out;
        }

        let step = (input.len() - 1) as f64 / out_len.max(1) as f64;
        for i in 0..out_len {
            let pos = i as f64 * step;
            let idx = pos as usize;
            let frac = pos - idx as f64;

            let a = input[idx] as f64;
            let b = input[(idx + 1).min(input.len() - 1)] as f64;
            let value = a + (b - a) * frac;

            self.out.push(value.clamp(-32768.0, 32767.0) as i16);
        }

        &self.out
    }
}

/// One-shot resample of a PCM16 buffer
pub fn resample(input: &[i16], from: SampleRate, to: SampleRate) -> Vec<i16> {
    let mut r = Resampler::new(from, to);
    r.process(input).to_vec()
}

/// Interpret little-endian PCM16 bytes as samples.
/// A trailing odd byte is dropped.
pub fn pcm16_to_samples(data: &[u8]) -> Vec<i16> {
    data.chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}

/// Serialize samples to little-endian PCM16 bytes
pub fn samples_to_pcm16(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, rate: SampleRate, ms: u32, amplitude: f64) -> Vec<i16> {
        let n = (rate.hz() as u64 * ms as u64 / 1000) as usize;
        (0..n)
            .map(|i| {
                let t = i as f64 / rate.hz() as f64;
                (amplitude * (2.0 * std::f64::consts::PI * freq * t).sin()) as i16
            })
            .collect()
    }

    #[test]
    fn test_identity_rate() {
        let input = vec![1i16, 2, 3, 4];
        assert_eq!(resample(&input, SampleRate::Hz16000, SampleRate::Hz16000), input);
    }

    #[test]
    fn test_output_length_ratio() {
        let input = vec![0i16; 960]; // 20ms at 48kHz
        let down = resample(&input, SampleRate::Hz48000, SampleRate::Hz16000);
        assert_eq!(down.len(), 320);

        let input = vec![0i16; 480]; // 20ms at 24kHz
        let up = resample(&input, SampleRate::Hz24000, SampleRate::Hz48000);
        assert_eq!(up.len(), 960);
    }

    #[test]
    fn test_silence_stays_silence() {
        let input = vec![0i16; 960];
        let out = resample(&input, SampleRate::Hz48000, SampleRate::Hz16000);
        assert!(out.iter().all(|&s| s == 0));
    }

    #[test]
    fn test_roundtrip_preserves_peak_within_3db() {
        // 1kHz sine, one second at 48kHz, down to 16kHz and back up.
        let original = sine(1000.0, SampleRate::Hz48000, 1000, 20000.0);
        let down = resample(&original, SampleRate::Hz48000, SampleRate::Hz16000);
        let up = resample(&down, SampleRate::Hz16000, SampleRate::Hz48000);

        let peak_in = original.iter().map(|s| s.unsigned_abs() as u32).max().unwrap();
        let peak_out = up.iter().map(|s| s.unsigned_abs() as u32).max().unwrap();

        // 3dB corresponds to a factor of ~0.707
        assert!(peak_out as f64 >= peak_in as f64 * 0.707);
        assert!(peak_out <= peak_in);
    }

    #[test]
    fn test_clipping_bounds() {
        let input = vec![i16::MAX, i16::MIN, i16::MAX, i16::MIN, 0, 0];
        let out = resample(&input, SampleRate::Hz8000, SampleRate::Hz48000);
        assert!(out.iter().all(|&s| (i16::MIN..=i16::MAX).contains(&s)));
    }

    #[test]
    fn test_pcm16_byte_roundtrip() {
        let samples = vec![0i16, 1, -1, 32767, -32768];
        let bytes = samples_to_pcm16(&samples);
        assert_eq!(pcm16_to_samples(&bytes), samples);
    }

    #[test]
    fn test_pcm16_odd_trailing_byte_dropped() {
        let bytes = vec![0x01, 0x00, 0xff];
        assert_eq!(pcm16_to_samples(&bytes), vec![1i16]);
    }
}
