//! Color descriptors: dominant color naming and HSV histograms.
//!
//! Hue lives on the 0..180 scale (half-degrees) and saturation/value on
//! 0..255, matching the ranges the catalog was originally indexed with.
//! The bucket thresholds in `classify_hsv` are fixed policy; changing them
//! invalidates every color label already stored in the index.

use image::RgbImage;

use crate::normalize_l2;

/// Closed palette returned by [`dominant_color`].
pub const PALETTE: [&str; 10] = [
    "black", "white", "grey", "red", "orange", "yellow", "green", "blue", "purple", "pink",
];

/// Convert an RGB pixel to HSV with h in [0, 180) and s, v in [0, 255].
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (f32, f32, f32) {
    let (r, g, b) = (f32::from(r), f32::from(g), f32::from(b));
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let v = max;
    let s = if max > 0.0 { delta * 255.0 / max } else { 0.0 };

    let mut h = if delta <= f32::EPSILON {
        0.0
    } else if (max - r).abs() < f32::EPSILON {
        60.0 * (g - b) / delta
    } else if (max - g).abs() < f32::EPSILON {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    if h < 0.0 {
        h += 360.0;
    }

    (h / 2.0, s, v)
}

/// Map mean HSV values to a palette name using fixed thresholds.
pub fn classify_hsv(h: f32, s: f32, v: f32) -> &'static str {
    if v < 50.0 {
        "black"
    } else if v > 200.0 && s < 50.0 {
        "white"
    } else if s < 50.0 {
        "grey"
    } else if !(10.0..=170.0).contains(&h) {
        "red"
    } else if h < 25.0 {
        "orange"
    } else if h < 35.0 {
        "yellow"
    } else if h < 85.0 {
        "green"
    } else if h < 130.0 {
        "blue"
    } else if h < 160.0 {
        "purple"
    } else {
        "pink"
    }
}

/// Dominant color name for an image, from mean hue/saturation/value.
pub fn dominant_color(image: &RgbImage) -> &'static str {
    let pixel_count = (image.width() as u64) * (image.height() as u64);
    if pixel_count == 0 {
        return "unknown";
    }

    let mut sum_h = 0.0f64;
    let mut sum_s = 0.0f64;
    let mut sum_v = 0.0f64;
    for pixel in image.pixels() {
        let (h, s, v) = rgb_to_hsv(pixel[0], pixel[1], pixel[2]);
        sum_h += f64::from(h);
        sum_s += f64::from(s);
        sum_v += f64::from(v);
    }

    let n = pixel_count as f64;
    classify_hsv(
        (sum_h / n) as f32,
        (sum_s / n) as f32,
        (sum_v / n) as f32,
    )
}

/// HSV color histogram: `bins` per channel, each channel L2-normalized
/// independently, concatenated H + S + V.
pub fn color_histogram(image: &RgbImage, bins: usize) -> Vec<f32> {
    let mut hist_h = vec![0.0f32; bins];
    let mut hist_s = vec![0.0f32; bins];
    let mut hist_v = vec![0.0f32; bins];

    for pixel in image.pixels() {
        let (h, s, v) = rgb_to_hsv(pixel[0], pixel[1], pixel[2]);
        hist_h[bin_index(h, 180.0, bins)] += 1.0;
        hist_s[bin_index(s, 256.0, bins)] += 1.0;
        hist_v[bin_index(v, 256.0, bins)] += 1.0;
    }

    normalize_l2(&mut hist_h);
    normalize_l2(&mut hist_s);
    normalize_l2(&mut hist_v);

    let mut histogram = Vec::with_capacity(bins * 3);
    histogram.extend(hist_h);
    histogram.extend(hist_s);
    histogram.extend(hist_v);
    histogram
}

fn bin_index(value: f32, range: f32, bins: usize) -> usize {
    let idx = (value / range * bins as f32) as usize;
    idx.min(bins - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_white_and_black_images() {
        let white = RgbImage::from_pixel(8, 8, image::Rgb([255, 255, 255]));
        assert_eq!(dominant_color(&white), "white");

        let black = RgbImage::from_pixel(8, 8, image::Rgb([0, 0, 0]));
        assert_eq!(dominant_color(&black), "black");
    }

    #[test]
    fn test_primary_hues() {
        let red = RgbImage::from_pixel(4, 4, image::Rgb([255, 0, 0]));
        assert_eq!(dominant_color(&red), "red");

        let green = RgbImage::from_pixel(4, 4, image::Rgb([0, 255, 0]));
        assert_eq!(dominant_color(&green), "green");

        let blue = RgbImage::from_pixel(4, 4, image::Rgb([0, 0, 255]));
        assert_eq!(dominant_color(&blue), "blue");

        let yellow = RgbImage::from_pixel(4, 4, image::Rgb([255, 255, 0]));
        assert_eq!(dominant_color(&yellow), "yellow");

        let grey = RgbImage::from_pixel(4, 4, image::Rgb([128, 128, 128]));
        assert_eq!(dominant_color(&grey), "grey");
    }

    #[test]
    fn test_exact_bucket_boundaries() {
        // Value/saturation gates
        assert_eq!(classify_hsv(90.0, 255.0, 49.9), "black");
        assert_eq!(classify_hsv(90.0, 49.9, 200.1), "white");
        assert_eq!(classify_hsv(90.0, 49.9, 200.0), "grey");
        assert_eq!(classify_hsv(90.0, 49.9, 128.0), "grey");

        // Hue buckets at their edges (saturated, mid value)
        assert_eq!(classify_hsv(9.9, 255.0, 128.0), "red");
        assert_eq!(classify_hsv(170.1, 255.0, 128.0), "red");
        assert_eq!(classify_hsv(10.0, 255.0, 128.0), "orange");
        assert_eq!(classify_hsv(24.9, 255.0, 128.0), "orange");
        assert_eq!(classify_hsv(25.0, 255.0, 128.0), "yellow");
        assert_eq!(classify_hsv(34.9, 255.0, 128.0), "yellow");
        assert_eq!(classify_hsv(35.0, 255.0, 128.0), "green");
        assert_eq!(classify_hsv(84.9, 255.0, 128.0), "green");
        assert_eq!(classify_hsv(85.0, 255.0, 128.0), "blue");
        assert_eq!(classify_hsv(129.9, 255.0, 128.0), "blue");
        assert_eq!(classify_hsv(130.0, 255.0, 128.0), "purple");
        assert_eq!(classify_hsv(159.9, 255.0, 128.0), "purple");
        assert_eq!(classify_hsv(160.0, 255.0, 128.0), "pink");
        assert_eq!(classify_hsv(170.0, 255.0, 128.0), "pink");
    }

    #[test]
    fn test_dominant_color_is_deterministic() {
        let img = RgbImage::from_fn(16, 16, |x, y| {
            image::Rgb([(x * 16) as u8, (y * 16) as u8, 200])
        });
        let first = dominant_color(&img);
        let second = dominant_color(&img);
        assert_eq!(first, second);
        assert!(PALETTE.contains(&first));
    }

    #[test]
    fn test_histogram_dimension_and_norm() {
        let img = RgbImage::from_pixel(10, 10, image::Rgb([200, 40, 40]));
        let hist = color_histogram(&img, 32);
        assert_eq!(hist.len(), 96);

        // Uniform image: one bin per channel, each channel unit-norm
        for channel in hist.chunks(32) {
            let norm: f32 = channel.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_histogram_dimension_tracks_bins() {
        let img = RgbImage::from_pixel(3, 3, image::Rgb([1, 2, 3]));
        assert_eq!(color_histogram(&img, 16).len(), 48);
        assert_eq!(color_histogram(&img, 8).len(), 24);
    }

    #[test]
    fn test_rgb_to_hsv_ranges() {
        for &(r, g, b) in &[(255, 0, 0), (0, 255, 0), (0, 0, 255), (12, 200, 90)] {
            let (h, s, v) = rgb_to_hsv(r, g, b);
            assert!((0.0..180.0).contains(&h), "h out of range: {h}");
            assert!((0.0..=255.0).contains(&s));
            assert!((0.0..=255.0).contains(&v));
        }
    }
}
