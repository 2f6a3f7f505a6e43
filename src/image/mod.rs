//! Tar image decoding (C2)

mod decoder;

pub use decoder::ImageBundle;
