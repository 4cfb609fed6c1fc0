pub mod decode;
pub mod resample;
pub mod sample;

pub use sample::AudioSample;
