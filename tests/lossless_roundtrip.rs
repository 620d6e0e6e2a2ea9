//! Lossless VP8L encoder roundtrip tests.
//!
//! Verifies that encode→decode produces pixel-identical output for various
//! synthetic images and VP8L configuration combinations.

use zenvp8l::{
    decode_rgb, decode_rgba, decode_vp8l, encode_argb, encode_vp8l, DecodeError, EncodeSession,
    LosslessDecoder, Lz77Strategies, Vp8lConfig,
};

/// Encode RGB pixels to VP8L, decode, and verify pixel-identical roundtrip.
fn assert_lossless_roundtrip(rgb: &[u8], w: u32, h: u32, config: &Vp8lConfig) -> Vec<u8> {
    let vp8l = encode_vp8l(rgb, w, h, false, config).expect("VP8L encoding failed");
    let (decoded, dw, dh) = decode_rgba(&vp8l).expect("decode failed");
    assert_eq!(dw, w);
    assert_eq!(dh, h);
    let total = (w * h) as usize;
    let mut mismatches = 0;
    for i in 0..total {
        if decoded[i * 4] != rgb[i * 3]
            || decoded[i * 4 + 1] != rgb[i * 3 + 1]
            || decoded[i * 4 + 2] != rgb[i * 3 + 2]
            || decoded[i * 4 + 3] != 255
        {
            mismatches += 1;
        }
    }
    assert_eq!(mismatches, 0, "{mismatches}/{total} pixel mismatches");
    vp8l
}

/// Encode packed ARGB pixels and verify the decoder returns them unchanged.
fn assert_argb_roundtrip(argb: &[u32], w: u32, h: u32, config: &Vp8lConfig) -> Vec<u8> {
    let vp8l = encode_argb(argb, w, h, config).expect("VP8L encoding failed");
    let (decoded, dw, dh) = decode_vp8l(&vp8l).expect("decode failed");
    assert_eq!((dw, dh), (w, h));
    let mismatches = decoded.iter().zip(argb).filter(|(a, b)| a != b).count();
    assert_eq!(mismatches, 0, "{mismatches}/{} pixel mismatches", argb.len());
    vp8l
}

/// The color cache flag follows the 40 header bits and the transform bit.
fn cache_bits_of(vp8l: &[u8]) -> u32 {
    let mut head = [0u8; 8];
    let n = vp8l.len().min(8);
    head[..n].copy_from_slice(&vp8l[..n]);
    let bits = u64::from_le_bytes(head);
    if (bits >> 41) & 1 == 0 {
        0
    } else {
        ((bits >> 42) & 0xf) as u32
    }
}

fn deterministic_noise(w: u32, h: u32) -> Vec<u8> {
    let mut rgb = vec![0u8; (w * h * 3) as usize];
    let mut seed = 42u64;
    for b in rgb.iter_mut() {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        *b = (seed >> 33) as u8;
    }
    rgb
}

fn deterministic_noise_argb(n: usize, seed: u64) -> Vec<u32> {
    let mut s = seed;
    (0..n)
        .map(|_| {
            s = s.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (s >> 32) as u32
        })
        .collect()
}

fn horizontal_gradient(w: u32, h: u32) -> Vec<u8> {
    let mut rgb = Vec::with_capacity((w * h * 3) as usize);
    for _y in 0..h {
        for x in 0..w {
            rgb.extend_from_slice(&[((x * 256 / w) & 0xFF) as u8, 100, 100]);
        }
    }
    rgb
}

fn bidirectional_gradient(w: u32, h: u32) -> Vec<u8> {
    let mut rgb = Vec::with_capacity((w * h * 3) as usize);
    for y in 0..h {
        for x in 0..w {
            rgb.extend_from_slice(&[
                ((x * 256 / w) & 0xFF) as u8,
                ((y * 256 / h) & 0xFF) as u8,
                100,
            ]);
        }
    }
    rgb
}

/// A few palette colors scattered pseudo-randomly: cache-friendly content.
fn palette_image(w: u32, h: u32, colors: usize) -> Vec<u32> {
    let palette: Vec<u32> = (0..colors as u32)
        .map(|i| 0xff00_0000 | i.wrapping_mul(0x9e37_79b9) >> 8)
        .collect();
    deterministic_noise_argb((w * h) as usize, 7)
        .into_iter()
        .map(|r| palette[(r >> 16) as usize % colors])
        .collect()
}

/// Repeated motif with noisy tiles, the kind of content where every parser
/// finds something.
fn textured(w: u32, h: u32) -> Vec<u32> {
    let noise = deterministic_noise_argb((w * h) as usize, 3);
    (0..w * h)
        .map(|i| {
            let (x, y) = (i % w, i / w);
            if (x / 5 + y / 3) % 4 == 0 {
                noise[i as usize] | 0xff00_0000
            } else {
                0xff30_6090 + (x % 7) * 0x0001_0203
            }
        })
        .collect()
}

// --- Scenario images ---

#[test]
fn solid_2x2() {
    let rgb = [200u8, 10, 60].repeat(4);
    let vp8l = assert_lossless_roundtrip(&rgb, 2, 2, &Vp8lConfig::default());
    assert_eq!(cache_bits_of(&vp8l), 0);
}

#[test]
fn three_stripes_16x16() {
    let colors = [[255u8, 0, 0], [0, 255, 0], [0, 0, 255]];
    let mut rgb = Vec::with_capacity(16 * 16 * 3);
    for y in 0..16 {
        for _x in 0..16 {
            rgb.extend_from_slice(&colors[y * 3 / 16]);
        }
    }
    let vp8l = assert_lossless_roundtrip(&rgb, 16, 16, &Vp8lConfig::default());
    // A handful of tokens, not one code per pixel.
    assert!(vp8l.len() < 96, "{} bytes", vp8l.len());
}

#[test]
fn noise_is_stored_near_raw_size() {
    let rgb = deterministic_noise(64, 64);
    let vp8l = assert_lossless_roundtrip(&rgb, 64, 64, &Vp8lConfig::default());
    // Incompressible: close to 24 bits per pixel, never far above.
    let raw = rgb.len();
    assert!(vp8l.len() > raw * 9 / 10);
    assert!(vp8l.len() < raw * 11 / 10);
}

// --- Quality / method grid ---

#[test]
fn gradient_all_qualities_and_methods() {
    let rgb = bidirectional_gradient(48, 40);
    for quality in [0u8, 25, 50, 75, 90, 100] {
        for method in [0u8, 2, 4, 5, 6] {
            assert_lossless_roundtrip(&rgb, 48, 40, &Vp8lConfig::new(quality, method));
        }
    }
}

#[test]
fn textured_all_qualities() {
    let argb = textured(67, 45);
    for quality in [0u8, 20, 50, 80, 100] {
        assert_argb_roundtrip(&argb, 67, 45, &Vp8lConfig::new(quality, 6));
    }
}

#[test]
fn noise_various_sizes() {
    for sz in [16u32, 31, 64, 128] {
        let rgb = deterministic_noise(sz, sz);
        assert_lossless_roundtrip(&rgb, sz, sz, &Vp8lConfig::new(75, 4));
    }
}

#[test]
fn noise_with_alpha() {
    let argb = deterministic_noise_argb(50 * 30, 11);
    let vp8l = assert_argb_roundtrip(&argb, 50, 30, &Vp8lConfig::default());
    let decoder = LosslessDecoder::new(&vp8l).unwrap();
    assert!(decoder.has_alpha());
    assert_eq!(decoder.dimensions(), (50, 30));
}

// --- Color cache ---

#[test]
fn palette_every_cache_size() {
    let argb = palette_image(40, 40, 12);
    for bits in 0..=11u8 {
        let config = Vp8lConfig::new(75, 4).with_cache_bits(bits);
        let vp8l = assert_argb_roundtrip(&argb, 40, 40, &config);
        assert!(cache_bits_of(&vp8l) <= bits as u32);
    }
}

#[test]
fn palette_picks_a_cache() {
    let argb = palette_image(64, 64, 8);
    let vp8l = assert_argb_roundtrip(&argb, 64, 64, &Vp8lConfig::new(75, 4));
    assert!(cache_bits_of(&vp8l) > 0);
}

#[test]
fn try_no_cache_never_grows_output() {
    let argb = palette_image(48, 48, 20);
    let with_cache = assert_argb_roundtrip(&argb, 48, 48, &Vp8lConfig::new(75, 4));
    let both = assert_argb_roundtrip(
        &argb,
        48,
        48,
        &Vp8lConfig::new(75, 4).with_try_no_cache(true),
    );
    assert!(both.len() <= with_cache.len());
}

// --- Entropy image ---

#[test]
fn meta_huffman_on_and_off() {
    let argb = textured(96, 64);
    for meta in [false, true] {
        assert_argb_roundtrip(
            &argb,
            96,
            64,
            &Vp8lConfig::new(90, 6).with_meta_huffman(meta),
        );
    }
}

#[test]
fn every_histogram_bits() {
    let mut rgb = horizontal_gradient(70, 33);
    // Differing halves give the clusterer something to split.
    let noise = deterministic_noise(70, 16);
    rgb[..noise.len()].copy_from_slice(&noise);
    for bits in 2..=9u8 {
        assert_lossless_roundtrip(
            &rgb,
            70,
            33,
            &Vp8lConfig::new(100, 6).with_histogram_bits(bits),
        );
    }
}

// --- LZ77 strategies ---

#[test]
fn each_lz77_strategy() {
    let argb = textured(53, 37);
    for strategy in Lz77Strategies::ALL {
        for quality in [10u8, 80] {
            assert_argb_roundtrip(
                &argb,
                53,
                37,
                &Vp8lConfig::new(quality, 4).with_lz77(strategy),
            );
        }
    }
    let all = Lz77Strategies::STANDARD | Lz77Strategies::RLE | Lz77Strategies::BOX;
    assert_argb_roundtrip(&argb, 53, 37, &Vp8lConfig::new(100, 6).with_lz77(all));
}

// --- Shapes ---

#[test]
fn degenerate_shapes() {
    for (w, h) in [(1u32, 1u32), (1, 57), (300, 1), (2, 3), (13, 7)] {
        let argb = textured(w, h);
        assert_argb_roundtrip(&argb, w, h, &Vp8lConfig::default());
        assert_argb_roundtrip(&argb, w, h, &Vp8lConfig::new(100, 6));
    }
}

#[test]
fn long_runs_exceed_max_copy_length() {
    // 10000 identical pixels need several maximum-length copies.
    let mut argb = vec![0xff12_3456u32; 100 * 100];
    argb[5000] = 0xff00_0000;
    assert_argb_roundtrip(&argb, 100, 100, &Vp8lConfig::new(75, 4));
}

// --- API behaviour ---

#[test]
fn rgba_input_keeps_alpha() {
    let mut rgba = Vec::with_capacity(20 * 20 * 4);
    for i in 0..400u32 {
        rgba.extend_from_slice(&[(i % 20) as u8, (i / 20) as u8, 7, (i * 13 % 256) as u8]);
    }
    let vp8l = encode_vp8l(&rgba, 20, 20, true, &Vp8lConfig::default()).unwrap();
    let (decoded, w, h) = decode_rgba(&vp8l).unwrap();
    assert_eq!((w, h), (20, 20));
    assert_eq!(decoded, rgba);

    let (rgb, _, _) = decode_rgb(&vp8l).unwrap();
    assert_eq!(rgb.len(), 400 * 3);
    assert_eq!(&rgb[..3], &rgba[..3]);
}

#[test]
fn session_matches_one_shot_encoding() {
    let a = textured(40, 24);
    let b = palette_image(24, 40, 6);
    let config = Vp8lConfig::new(80, 5);
    let mut session = EncodeSession::new();
    for (argb, w, h) in [(&a, 40, 24), (&b, 24, 40), (&a, 40, 24)] {
        let reused = session.encode_argb(argb, w, h, &config).unwrap();
        assert_eq!(reused, encode_argb(argb, w, h, &config).unwrap());
    }
}

#[test]
fn corrupted_streams_fail_cleanly() {
    let argb = textured(32, 32);
    let vp8l = encode_argb(&argb, 32, 32, &Vp8lConfig::default()).unwrap();

    // Truncation anywhere past the header is an error, never a panic.
    for len in [5, 6, 8, vp8l.len() / 2, vp8l.len() - 1] {
        assert!(decode_vp8l(&vp8l[..len]).is_err());
    }

    let mut bad = vp8l.clone();
    bad[0] = 0x2e;
    assert!(matches!(
        decode_vp8l(&bad),
        Err(DecodeError::LosslessSignatureInvalid(0x2e))
    ));

    // Flipped bits may decode to other pixels but must not panic.
    for i in 5..vp8l.len().min(64) {
        let mut flipped = vp8l.clone();
        flipped[i] ^= 0x5a;
        let _ = decode_vp8l(&flipped);
    }
}
