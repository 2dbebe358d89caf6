mod client;

pub use client::{DetectorClient, DetectorInput};
