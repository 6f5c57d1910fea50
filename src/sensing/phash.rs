use anyhow::{Context, Result};
use image_hasher::{HashAlg, HasherConfig, ImageHash};

/// Perceptual hash of an encoded screenshot, base64 encoded. The image
/// format is sniffed from the bytes, so PNG, JPEG and TIFF captures all work.
pub fn compute_phash(image_bytes: &[u8]) -> Result<String> {
    let img = image::load_from_memory(image_bytes).context("failed to decode screenshot")?;
    let hasher = HasherConfig::new()
        .hash_alg(HashAlg::DoubleGradient)
        .hash_size(8, 8)
        .to_hasher();

    let hash = hasher.hash_image(&img);
    Ok(hash.to_base64())
}

/// Bit distance between two encoded hashes. Undecodable input counts as
/// maximally different.
pub fn compute_hamming_distance(lhs: &str, rhs: &str) -> u32 {
    let Ok(h1) = ImageHash::<Vec<u8>>::from_base64(lhs) else {
        return u32::MAX;
    };
    let Ok(h2) = ImageHash::<Vec<u8>>::from_base64(rhs) else {
        return u32::MAX;
    };
    h1.dist(&h2)
}
