pub mod decoder;
pub mod normalizer;
pub mod types;


pub use decoder::EventDecoder;
pub use normalizer::normalize;
pub use types::*;
