// Perceptual image hashing — the difference-hash (dHash) fingerprint.
//
// Fingerprints persist across restarts and must stay compatible with state
// files written by earlier deployments, so every stage is pinned: any-color
// decode, integer BT.601 grayscale, area-averaging resize to 9x8, adjacent
// column comparison per row, MSB-first bit packing, lowercase hex. Equal
// images always produce equal fingerprints; crops, rotations, and mirrors
// intentionally do not match.

use std::fmt;
use std::str::FromStr;

use image::DynamicImage;
use serde::de;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// Width of the downsampled grid. One extra column so each of the 8 output
/// bits per row has a right-hand neighbor to compare against.
const GRID_WIDTH: u32 = 9;
/// Height of the downsampled grid.
const GRID_HEIGHT: u32 = 8;
const GRID_PIXELS: usize = (GRID_WIDTH * GRID_HEIGHT) as usize;

/// Packed fingerprint length in bytes (8 rows x 8 comparison bits).
pub const FINGERPRINT_LEN: usize = 8;

// BT.601 luma weights in 14-bit fixed point, matching the reference
// grayscale conversion bit for bit.
const LUMA_SHIFT: u32 = 14;
const LUMA_R: u32 = 4899;
const LUMA_G: u32 = 9617;
const LUMA_B: u32 = 1868;

/// A 64-bit difference-hash fingerprint of an image.
///
/// The canonical textual form is 16 lowercase hex characters; that form is
/// what the state file stores and what `Display`/`FromStr` speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; FINGERPRINT_LEN]);

impl Fingerprint {
    pub fn from_bytes(bytes: [u8; FINGERPRINT_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Fingerprint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let raw = hex::decode(s).map_err(|_| Error::MalformedFingerprint(s.to_string()))?;
        let bytes: [u8; FINGERPRINT_LEN] = raw
            .try_into()
            .map_err(|_| Error::MalformedFingerprint(s.to_string()))?;
        Ok(Self(bytes))
    }
}

// Serialize as the hex string so fingerprints can key JSON maps directly.
impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HexVisitor;

        impl de::Visitor<'_> for HexVisitor {
            type Value = Fingerprint;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a 16-character hex fingerprint")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Fingerprint, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_str(HexVisitor)
    }
}

/// Compute the difference-hash fingerprint of encoded image bytes.
///
/// Pure: no filesystem, no network. Fails with `Error::Decode` when the
/// bytes are not a decodable image in a supported format.
pub fn dhash(bytes: &[u8]) -> Result<Fingerprint, Error> {
    let decoded = image::load_from_memory(bytes)?;
    Ok(dhash_image(&decoded))
}

/// Fingerprint an already-decoded image.
pub fn dhash_image(decoded: &DynamicImage) -> Fingerprint {
    let (plane, width, height) = luminance_plane(decoded);
    let grid = area_downsample(&plane, width, height);
    pack_bits(&grid)
}

/// Collapse the image to an 8-bit luminance plane. Color images go through
/// the fixed-point BT.601 weights; alpha is dropped; already-gray images
/// pass through untouched (the weights sum to exactly 1.0 in fixed point,
/// so r == g == b always round-trips to the same value).
fn luminance_plane(decoded: &DynamicImage) -> (Vec<u8>, u32, u32) {
    if let DynamicImage::ImageLuma8(gray) = decoded {
        return (gray.as_raw().clone(), gray.width(), gray.height());
    }
    let rgb = decoded.to_rgb8();
    let (width, height) = rgb.dimensions();
    let plane = rgb
        .pixels()
        .map(|pixel| {
            let [r, g, b] = pixel.0;
            let weighted =
                u32::from(r) * LUMA_R + u32::from(g) * LUMA_G + u32::from(b) * LUMA_B;
            ((weighted + (1 << (LUMA_SHIFT - 1))) >> LUMA_SHIFT) as u8
        })
        .collect();
    (plane, width, height)
}

/// Downsample the luminance plane to the 9x8 grid with a fractional-coverage
/// box filter: every source pixel contributes to each output cell it
/// overlaps, weighted by the overlap area. Integer-multiple inputs reduce to
/// exact block means.
fn area_downsample(plane: &[u8], width: u32, height: u32) -> [u8; GRID_PIXELS] {
    let scale_x = f64::from(width) / f64::from(GRID_WIDTH);
    let scale_y = f64::from(height) / f64::from(GRID_HEIGHT);
    let mut grid = [0u8; GRID_PIXELS];

    for gy in 0..GRID_HEIGHT {
        let y0 = f64::from(gy) * scale_y;
        let y1 = y0 + scale_y;
        for gx in 0..GRID_WIDTH {
            let x0 = f64::from(gx) * scale_x;
            let x1 = x0 + scale_x;

            let mut sum = 0.0;
            let mut py = y0.floor() as usize;
            while (py as f64) < y1 && py < height as usize {
                let cover_y = overlap(py as f64, y0, y1);
                let mut px = x0.floor() as usize;
                while (px as f64) < x1 && px < width as usize {
                    let cover_x = overlap(px as f64, x0, x1);
                    sum += f64::from(plane[py * width as usize + px]) * cover_x * cover_y;
                    px += 1;
                }
                py += 1;
            }

            grid[(gy * GRID_WIDTH + gx) as usize] = (sum / (scale_x * scale_y)).round() as u8;
        }
    }
    grid
}

/// Length of the unit interval [p, p+1) that falls inside [lo, hi).
fn overlap(p: f64, lo: f64, hi: f64) -> f64 {
    (hi.min(p + 1.0) - lo.max(p)).max(0.0)
}

/// Pack the per-row adjacent-column comparisons into 8 bytes, MSB first:
/// bit 7 of byte r is the comparison of columns 0 and 1 in grid row r.
fn pack_bits(grid: &[u8; GRID_PIXELS]) -> Fingerprint {
    let mut packed = [0u8; FINGERPRINT_LEN];
    for row in 0..GRID_HEIGHT as usize {
        let mut byte = 0u8;
        for col in 0..8 {
            let i = row * GRID_WIDTH as usize + col;
            byte <<= 1;
            if grid[i] > grid[i + 1] {
                byte |= 1;
            }
        }
        packed[row] = byte;
    }
    Fingerprint::from_bytes(packed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let fp = Fingerprint::from_bytes([0xde, 0xad, 0xbe, 0xef, 0x00, 0x11, 0x22, 0x33]);
        assert_eq!(fp.to_hex(), "deadbeef00112233");
        let parsed: Fingerprint = "deadbeef00112233".parse().unwrap();
        assert_eq!(parsed, fp);
    }

    #[test]
    fn display_is_lowercase_hex() {
        let fp = Fingerprint::from_bytes([0xAB; 8]);
        assert_eq!(fp.to_string(), "abababababababab");
    }

    #[test]
    fn rejects_malformed_text() {
        assert!("".parse::<Fingerprint>().is_err());
        assert!("abcd".parse::<Fingerprint>().is_err());
        assert!("zzzzzzzzzzzzzzzz".parse::<Fingerprint>().is_err());
        assert!("deadbeef0011223344".parse::<Fingerprint>().is_err());
    }

    #[test]
    fn serde_uses_the_hex_form() {
        let fp = Fingerprint::from_bytes([1, 2, 3, 4, 5, 6, 7, 8]);
        let json = serde_json::to_string(&fp).unwrap();
        assert_eq!(json, "\"0102030405060708\"");
        let back: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fp);
    }

    #[test]
    fn gray_values_survive_the_luma_weights() {
        // r == g == b must reproduce the input exactly for every value,
        // otherwise grayscale re-encodes would drift the fingerprint.
        for v in [0u8, 1, 17, 128, 200, 254, 255] {
            let weighted = u32::from(v) * (LUMA_R + LUMA_G + LUMA_B);
            let rounded = ((weighted + (1 << (LUMA_SHIFT - 1))) >> LUMA_SHIFT) as u8;
            assert_eq!(rounded, v);
        }
    }

    #[test]
    fn exact_block_means_on_integer_multiples() {
        // 18x16 plane of 2x2 blocks: cell (gy, gx) averages exactly the
        // constant block value.
        let mut plane = vec![0u8; 18 * 16];
        for y in 0..16 {
            for x in 0..18 {
                plane[y * 18 + x] = ((y / 2) * 9 + x / 2) as u8;
            }
        }
        let grid = area_downsample(&plane, 18, 16);
        for gy in 0..8 {
            for gx in 0..9 {
                assert_eq!(grid[gy * 9 + gx], (gy * 9 + gx) as u8);
            }
        }
    }

    #[test]
    fn packing_is_msb_first() {
        let mut grid = [0u8; GRID_PIXELS];
        // Row 0: only columns 0 > 1, everything else flat, so 0b1000_0000.
        grid[0] = 10;
        let fp = pack_bits(&grid);
        assert_eq!(fp.as_bytes()[0], 0b1000_0000);
        assert_eq!(fp.as_bytes()[1..], [0u8; 7]);
    }
}
