//! Audio Pipeline Primitives
//!
//! Sample-rate conversion, 20ms reframing and tone synthesis between the
//! telephony leg (48kHz bridge) and the realtime AI leg (16kHz in / 24kHz out).

mod frames;
mod resample;
mod tone;

pub use frames::{Frame, FrameQueue, Reframer};
pub use resample::{pcm16_to_samples, samples_to_pcm16, Resampler, SampleRate};
pub use tone::{beep, silence, tone};
