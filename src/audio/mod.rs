pub mod clip;

pub use clip::AudioClip;
