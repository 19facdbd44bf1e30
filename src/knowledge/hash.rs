use std::path::Path;

use image::imageops::FilterType;

use crate::errors::MobiClawResult;

/// 64-bit difference hash: shrink to 9x8 grayscale and record whether each
/// pixel is brighter than its right neighbour. Robust to re-encoding and
/// small rendering noise (clock digits, cursor blink).
pub fn dhash(path: &Path) -> MobiClawResult<u64> {
    let img = image::open(path)?;
    Ok(dhash_image(&img))
}

pub fn dhash_image(img: &image::DynamicImage) -> u64 {
    let small = img.resize_exact(9, 8, FilterType::Triangle).to_luma8();
    let mut hash = 0u64;
    for y in 0..8 {
        for x in 0..8 {
            let left = small.get_pixel(x, y)[0];
            let right = small.get_pixel(x + 1, y)[0];
            hash = (hash << 1) | u64::from(left > right);
        }
    }
    hash
}

pub fn hamming(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}
