mod client;
mod label_config;

pub use client::{FetchedImage, LabelStudioClient};
pub use label_config::{rectangle_tag, RectangleTag};
