pub mod api;
pub mod config;
pub mod detector;
pub mod errors;
pub mod features;
pub mod index;
pub mod ingest;
pub mod logging;
pub mod pipeline;

pub use config::AppConfig;
pub use errors::*;

/// Decode raw image bytes into an RGB image.
///
/// Every entry point that accepts uploaded or downloaded bytes goes through
/// here so an undecodable payload always surfaces as `InvalidImage`.
pub fn decode_image(bytes: &[u8]) -> Result<image::DynamicImage> {
    if bytes.is_empty() {
        return Err(StyleSnapError::InvalidImage("empty image buffer".to_string()));
    }
    image::load_from_memory(bytes)
        .map_err(|e| StyleSnapError::InvalidImage(format!("could not decode image: {e}")))
}

/// L2-normalize a vector in place; zero vectors are left untouched.
pub fn normalize_l2(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-8 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
