//! Audio Codecs for the SIP Leg
//!
//! G.711 μ-law/A-law in pure Rust plus Opus via libopus bindings. The codec
//! layer converts between the RTP payload and PCM16 at the codec's native
//! rate; the bridge above always runs at 48kHz.

use audiopus::{
    coder::{Decoder as OpusDecoder, Encoder as OpusEncoder},
    packet::Packet,
    Application, Channels, MutSignals, SampleRate as OpusRate,
};

use crate::audio::SampleRate;

use super::SipError;

/// RTP payload type used for Opus in our SDP answers (dynamic range)
pub const OPUS_PAYLOAD_TYPE: u8 = 111;

/// Negotiated audio codec, in preference order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecKind {
    /// Opus 48000/1 (dynamic payload type)
    Opus,
    /// G.711 A-law, payload type 8
    Pcma,
    /// G.711 μ-law, payload type 0
    Pcmu,
}

impl CodecKind {
    pub fn payload_type(&self) -> u8 {
        match self {
            CodecKind::Opus => OPUS_PAYLOAD_TYPE,
            CodecKind::Pcma => 8,
            CodecKind::Pcmu => 0,
        }
    }

    /// The codec's native sample rate
    pub fn sample_rate(&self) -> SampleRate {
        match self {
            CodecKind::Opus => SampleRate::Hz48000,
            CodecKind::Pcma | CodecKind::Pcmu => SampleRate::Hz8000,
        }
    }

    /// RTP timestamp units per 20ms packet
    pub fn timestamp_step(&self) -> u32 {
        self.sample_rate().samples_per_frame() as u32
    }

    pub fn sdp_name(&self) -> &'static str {
        match self {
            CodecKind::Opus => "opus",
            CodecKind::Pcma => "PCMA",
            CodecKind::Pcmu => "PCMU",
        }
    }

    /// rtpmap attribute value for SDP
    pub fn rtpmap(&self) -> String {
        match self {
            CodecKind::Opus => format!("{} opus/48000/2", OPUS_PAYLOAD_TYPE),
            CodecKind::Pcma => "8 PCMA/8000".to_string(),
            CodecKind::Pcmu => "0 PCMU/8000".to_string(),
        }
    }
}

/// Pick the best codec we support from an SDP offer's payload list.
///
/// Preference: Opus 48k, then PCMA, then PCMU. Returns None when the offer
/// contains none of them (the call is rejected with 488).
pub fn negotiate(offered: &[u8], offers_opus: bool) -> Option<CodecKind> {
    if offers_opus {
        return Some(CodecKind::Opus);
    }
    if offered.contains(&8) {
        return Some(CodecKind::Pcma);
    }
    if offered.contains(&0) {
        return Some(CodecKind::Pcmu);
    }
    None
}

/// Stateful encoder/decoder for the negotiated codec.
///
/// Opus keeps encoder/decoder state across packets; G.711 is stateless.
pub enum AudioCodec {
    Opus {
        encoder: OpusEncoder,
        decoder: OpusDecoder,
        /// Reused decode buffer, one 20ms frame at 48kHz
        pcm_buf: Vec<i16>,
    },
    G711(CodecKind),
}

impl AudioCodec {
    pub fn new(kind: CodecKind) -> Result<Self, SipError> {
        match kind {
            CodecKind::Opus => {
                let encoder =
                    OpusEncoder::new(OpusRate::Hz48000, Channels::Mono, Application::Voip)
                        .map_err(|e| SipError::Codec(format!("opus encoder: {}", e)))?;
                let decoder = OpusDecoder::new(OpusRate::Hz48000, Channels::Mono)
                    .map_err(|e| SipError::Codec(format!("opus decoder: {}", e)))?;
                Ok(AudioCodec::Opus {
                    encoder,
                    decoder,
                    pcm_buf: vec![0i16; SampleRate::Hz48000.samples_per_frame()],
                })
            }
            kind => Ok(AudioCodec::G711(kind)),
        }
    }

    pub fn kind(&self) -> CodecKind {
        match self {
            AudioCodec::Opus { .. } => CodecKind::Opus,
            AudioCodec::G711(kind) => *kind,
        }
    }

    /// Encode one 20ms PCM16 frame at the codec's native rate
    pub fn encode(&mut self, pcm: &[i16]) -> Result<Vec<u8>, SipError> {
        match self {
            AudioCodec::Opus { encoder, .. } => {
                let mut out = vec![0u8; 4000];
                let len = encoder
                    .encode(pcm, &mut out)
                    .map_err(|e| SipError::Codec(format!("opus encode: {}", e)))?;
                out.truncate(len);
                Ok(out)
            }
            AudioCodec::G711(CodecKind::Pcmu) => {
                Ok(pcm.iter().map(|&s| mu_compress(s)).collect())
            }
            AudioCodec::G711(_) => Ok(pcm.iter().map(|&s| a_compress(s)).collect()),
        }
    }

    /// Decode one RTP payload to PCM16 at the codec's native rate
    pub fn decode(&mut self, payload: &[u8]) -> Result<Vec<i16>, SipError> {
        match self {
            AudioCodec::Opus {
                decoder, pcm_buf, ..
            } => {
                let packet = Packet::try_from(payload)
                    .map_err(|e| SipError::Codec(format!("opus packet: {}", e)))?;
                let signals = MutSignals::try_from(&mut *pcm_buf)
                    .map_err(|e| SipError::Codec(format!("opus buffer: {}", e)))?;
                let decoded = decoder
                    .decode(Some(packet), signals, false)
                    .map_err(|e| SipError::Codec(format!("opus decode: {}", e)))?;
                Ok(pcm_buf[..decoded].to_vec())
            }
            AudioCodec::G711(CodecKind::Pcmu) => {
                Ok(payload.iter().map(|&b| mu_expand(b)).collect())
            }
            AudioCodec::G711(_) => Ok(payload.iter().map(|&b| a_expand(b)).collect()),
        }
    }
}

// G.711 companding (ITU-T G.711). Each polarity is divided into 8
// logarithmic chords with 16 linear steps per chord; a byte packs polarity,
// chord index and step. μ-law biases the magnitude so every chord edge lands
// on a power of two and inverts the byte on the wire; A-law keeps chord 0
// linear and toggles alternate bits instead.

/// μ-law bias added before chord selection
const MU_BIAS: i32 = 132;
/// Largest magnitude μ-law can carry once the bias is applied
const MU_MAX: i32 = 32_635;
/// A-law wire-format toggle mask
const ALAW_XOR: u8 = 0x55;

/// Split a sample into polarity and magnitude
fn polarity(sample: i16) -> (bool, i32) {
    if sample < 0 {
        (true, -(sample as i32))
    } else {
        (false, sample as i32)
    }
}

/// Chord index of a magnitude: how far its top bit sits above bit 7
fn chord_of(magnitude: i32) -> u32 {
    if magnitude < 0x100 {
        return 0;
    }
    (24 - (magnitude as u32).leading_zeros()).min(7)
}

fn mu_compress(sample: i16) -> u8 {
    let (negative, magnitude) = polarity(sample);
    let biased = magnitude.min(MU_MAX) + MU_BIAS;

    let chord = chord_of(biased);
    let step = ((biased >> (chord + 3)) & 0x0F) as u8;

    !((u8::from(negative) << 7) | ((chord as u8) << 4) | step)
}

fn mu_expand(byte: u8) -> i16 {
    let byte = !byte;
    let chord = ((byte >> 4) & 0x07) as u32;
    let step = (byte & 0x0F) as i32;

    // Reconstruct at the step midpoint, then strip the encoder's bias
    let magnitude = ((2 * step + 33) << (chord + 2)) - MU_BIAS;
    if byte & 0x80 != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

fn a_compress(sample: i16) -> u8 {
    let (negative, magnitude) = polarity(sample);
    let magnitude = magnitude.min(i16::MAX as i32);

    let chord = chord_of(magnitude);
    let step = if chord == 0 {
        ((magnitude >> 4) & 0x0F) as u8
    } else {
        ((magnitude >> (chord + 3)) & 0x0F) as u8
    };

    // A-law marks positive samples with the sign bit set
    ((u8::from(!negative) << 7) | ((chord as u8) << 4) | step) ^ ALAW_XOR
}

fn a_expand(byte: u8) -> i16 {
    let byte = byte ^ ALAW_XOR;
    let chord = ((byte >> 4) & 0x07) as u32;
    let step = (byte & 0x0F) as i32;

    let magnitude = if chord == 0 {
        (2 * step + 1) << 3
    } else {
        (2 * step + 33) << (chord + 2)
    };
    if byte & 0x80 != 0 {
        magnitude as i16
    } else {
        -magnitude as i16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiation_preference_order() {
        assert_eq!(negotiate(&[0, 8], true), Some(CodecKind::Opus));
        assert_eq!(negotiate(&[0, 8], false), Some(CodecKind::Pcma));
        assert_eq!(negotiate(&[0], false), Some(CodecKind::Pcmu));
        assert_eq!(negotiate(&[9, 18], false), None);
    }

    #[test]
    fn test_codec_rates() {
        assert_eq!(CodecKind::Opus.sample_rate(), SampleRate::Hz48000);
        assert_eq!(CodecKind::Pcma.sample_rate(), SampleRate::Hz8000);
        assert_eq!(CodecKind::Opus.timestamp_step(), 960);
        assert_eq!(CodecKind::Pcmu.timestamp_step(), 160);
    }

    #[test]
    fn test_chord_boundaries() {
        assert_eq!(chord_of(0), 0);
        assert_eq!(chord_of(0xFF), 0);
        assert_eq!(chord_of(0x100), 1);
        assert_eq!(chord_of(0x1FF), 1);
        assert_eq!(chord_of(0x4000), 7);
        assert_eq!(chord_of(0x7FFF), 7);
    }

    #[test]
    fn test_mu_law_silence_is_exact() {
        assert_eq!(mu_compress(0), 0xFF);
        assert_eq!(mu_expand(mu_compress(0)), 0);
    }

    #[test]
    fn test_mu_law_quantization_error_bound() {
        // Half a step inside the active chord, which never exceeds
        // magnitude/16 plus the bias
        for sample in (-32_635..=32_635).step_by(97) {
            let sample = sample as i16;
            let decoded = mu_expand(mu_compress(sample)) as i32;
            let limit = (sample as i32).abs() / 16 + MU_BIAS;
            let error = (sample as i32 - decoded).abs();
            assert!(
                error <= limit,
                "mu-law error {} over limit {} at {}",
                error,
                limit,
                sample
            );
        }
    }

    #[test]
    fn test_a_law_quantization_error_bound() {
        // Chord 0 is linear with step 16; above it the error scales with the
        // magnitude
        for sample in (-32_000..=32_000).step_by(89) {
            let sample = sample as i16;
            let decoded = a_expand(a_compress(sample)) as i32;
            let limit = (sample as i32).abs() / 16 + 16;
            let error = (sample as i32 - decoded).abs();
            assert!(
                error <= limit,
                "a-law error {} over limit {} at {}",
                error,
                limit,
                sample
            );
        }
    }

    #[test]
    fn test_companding_preserves_polarity() {
        for sample in [-20_000i16, -300, -20, 20, 300, 20_000] {
            assert_eq!(mu_expand(mu_compress(sample)).signum(), sample.signum());
            let a = a_expand(a_compress(sample));
            // A-law's first step straddles zero; everything else keeps sign
            if sample.unsigned_abs() > 16 {
                assert_eq!(a.signum(), sample.signum());
            }
        }
    }

    #[test]
    fn test_g711_frame_sizes() {
        let mut codec = AudioCodec::new(CodecKind::Pcma).unwrap();
        let pcm: Vec<i16> = (0..160)
            .map(|i| ((i as f32 * 0.1).sin() * 10000.0) as i16)
            .collect();

        let encoded = codec.encode(&pcm).unwrap();
        assert_eq!(encoded.len(), 160); // 1 byte per sample

        let decoded = codec.decode(&encoded).unwrap();
        assert_eq!(decoded.len(), 160);
    }

    #[test]
    fn test_opus_roundtrip_frame_size() {
        let mut codec = AudioCodec::new(CodecKind::Opus).unwrap();
        let pcm: Vec<i16> = (0..960)
            .map(|i| ((i as f32 * 0.05).sin() * 12000.0) as i16)
            .collect();

        let encoded = codec.encode(&pcm).unwrap();
        assert!(!encoded.is_empty());
        assert!(encoded.len() < 960); // compressed

        let decoded = codec.decode(&encoded).unwrap();
        assert_eq!(decoded.len(), 960);
    }
}
