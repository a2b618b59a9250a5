//! Tone Synthesis
//!
//! Sine tones and silence for in-band signaling. The security-gate beep is
//! generated once and cached for the lifetime of the process.

use std::sync::OnceLock;

use super::resample::SampleRate;

const BEEP_FREQ_HZ: f64 = 800.0;
const BEEP_DURATION_MS: u32 = 150;
const BEEP_VOLUME: f64 = 0.3;
const FADE_MS: u32 = 10;

/// Generate a PCM16 sine tone with a short fade in/out to avoid clicks
pub fn tone(freq_hz: f64, duration_ms: u32, rate: SampleRate) -> Vec<i16> {
    let sample_rate = rate.hz() as f64;
    let num_samples = (rate.hz() as u64 * duration_ms as u64 / 1000) as usize;
    let fade_samples = (rate.hz() as u64 * FADE_MS as u64 / 1000) as usize;

    (0..num_samples)
        .map(|i| {
            let envelope = if fade_samples > 0 && i < fade_samples {
                i as f64 / fade_samples as f64
            } else if fade_samples > 0 && i >= num_samples.saturating_sub(fade_samples) {
                (num_samples - i) as f64 / fade_samples as f64
            } else {
                1.0
            };
            let t = i as f64 / sample_rate;
            let value =
                BEEP_VOLUME * envelope * 32767.0 * (2.0 * std::f64::consts::PI * freq_hz * t).sin();
            value.clamp(-32768.0, 32767.0) as i16
        })
        .collect()
}

/// Generate silence of the given duration
pub fn silence(rate: SampleRate, duration_ms: u32) -> Vec<i16> {
    vec![0i16; (rate.hz() as u64 * duration_ms as u64 / 1000) as usize]
}

/// The cached 800Hz/150ms confirmation beep at the 48kHz bridge rate
pub fn beep() -> &'static [i16] {
    static BEEP: OnceLock<Vec<i16>> = OnceLock::new();
    BEEP.get_or_init(|| tone(BEEP_FREQ_HZ, BEEP_DURATION_MS, SampleRate::Hz48000))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tone_length() {
        let t = tone(800.0, 150, SampleRate::Hz48000);
        assert_eq!(t.len(), 48_000 * 150 / 1000);
    }

    #[test]
    fn test_tone_is_bounded_and_nonsilent() {
        let t = tone(1000.0, 100, SampleRate::Hz16000);
        assert!(t.iter().any(|&s| s != 0));
        let peak = t.iter().map(|s| s.unsigned_abs() as u32).max().unwrap();
        assert!(peak <= (BEEP_VOLUME * 32767.0) as u32 + 1);
    }

    #[test]
    fn test_tone_fades_to_near_zero_at_edges() {
        let t = tone(800.0, 150, SampleRate::Hz48000);
        assert_eq!(t[0], 0);
        assert!(t.last().unwrap().unsigned_abs() < 1000);
    }

    #[test]
    fn test_silence_is_all_zero() {
        let s = silence(SampleRate::Hz24000, 20);
        assert_eq!(s.len(), 480);
        assert!(s.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_beep_cached() {
        let a = beep().as_ptr();
        let b = beep().as_ptr();
        assert_eq!(a, b);
        assert_eq!(beep().len(), 48_000 * 150 / 1000);
    }
}
