//! Audio pipeline: decode, canonicalize, store.

pub mod decode;
pub mod normalize;
pub mod pcm;

pub use decode::{decode_file, downmix_to_mono, DecodedAudio};
pub use normalize::{normalize_reference, resample_to_canonical, trim_silence, AudioNormalizer};
pub use pcm::{read_pcm, wav_bytes, write_pcm_atomic};
