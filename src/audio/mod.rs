pub mod analysis;
pub mod decode;
pub mod envelope;
pub mod features;
pub mod fft;
pub mod sampler;
pub mod schedule;
