use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, RgbImage};
use ndarray::{Array1, Array4};

pub(crate) const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub(crate) const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Numerically stable soft-max. An empty or degenerate input yields a uniform vector.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    if logits.is_empty() {
        return Vec::new();
    }
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if !sum.is_finite() || sum == 0.0 {
        return vec![1.0 / logits.len() as f32; logits.len()];
    }
    exps.into_iter().map(|e| e / sum).collect()
}

/// Equal-weight mean of a set of vectors, or zeros when there are none.
pub(crate) fn average_vectors(vectors: &[Array1<f32>], size: usize) -> Array1<f32> {
    if vectors.is_empty() {
        return Array1::zeros(size);
    }
    let sum = vectors.iter().fold(Array1::zeros(vectors[0].len()), |acc, v| acc + v);
    sum / vectors.len() as f32
}

/// Resizes an RGB image and lays it out as a `[1, 3, size, size]` tensor
/// normalized per channel.
pub(crate) fn rgb_to_tensor(
    image: &RgbImage,
    size: u32,
    mean: [f32; 3],
    std: [f32; 3],
) -> Array4<f32> {
    let resized = image::imageops::resize(image, size, size, FilterType::Triangle);
    let side = size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, side, side));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            let value = pixel[c] as f32 / 255.0;
            tensor[[0, c, y as usize, x as usize]] = (value - mean[c]) / std[c];
        }
    }
    tensor
}

/// Resizes a gray image and lays it out as a `[1, 1, size, size]` tensor.
pub(crate) fn luma_to_tensor(image: &GrayImage, size: u32, mean: f32, std: f32) -> Array4<f32> {
    let resized = image::imageops::resize(image, size, size, FilterType::Triangle);
    let side = size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 1, side, side));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let value = pixel[0] as f32 / 255.0;
        tensor[[0, 0, y as usize, x as usize]] = (value - mean) / std;
    }
    tensor
}

/// Returns a copy whose longest side is at most `max_side`, plus the factor
/// that maps working-copy coordinates back to the original.
pub(crate) fn bounded_working_copy(image: &DynamicImage, max_side: u32) -> (DynamicImage, f32) {
    let (width, height) = (image.width(), image.height());
    let longest = width.max(height);
    if longest <= max_side || longest == 0 {
        return (image.clone(), 1.0);
    }
    let scale = max_side as f32 / longest as f32;
    let new_width = ((width as f32 * scale).round() as u32).max(1);
    let new_height = ((height as f32 * scale).round() as u32).max(1);
    (image.resize_exact(new_width, new_height, FilterType::Triangle), 1.0 / scale)
}
