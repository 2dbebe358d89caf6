pub mod annotation;
pub mod detection;
