// Copyright (c) 2019-2022, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaChaRng;
use vp9_inter::prelude::*;
use vp9_inter::CastFromPrimitive;

fn setup_encoder<T: Pixel>(
  width: usize, height: usize, bit_depth: usize, cs: ChromaSampling,
  speed: usize, tile_rows_log2: usize, threads: usize,
) -> Encoder<T> {
  let _ = env_logger::builder().is_test(true).try_init();
  let enc = EncoderConfig {
    width,
    height,
    bit_depth,
    chroma_sampling: cs,
    tile_rows_log2,
    ..EncoderConfig::with_speed_preset(speed)
  };
  Config::new()
    .with_encoder_config(enc)
    .with_threads(threads)
    .new_encoder()
    .unwrap()
}

fn textured<T: Pixel>(
  width: usize, height: usize, bit_depth: usize, cs: ChromaSampling,
  seed: u8,
) -> Frame<T> {
  let mut rng = ChaChaRng::from_seed([seed; 32]);
  let max = (1 << bit_depth) - 1;
  let mut f = Frame::new(width, height, cs);
  f.fill_with(|_, x, y| {
    let base = ((x * 7 + y * 3) % 64) << (bit_depth - 8);
    let v = (base + rng.gen_range(0..(4 << (bit_depth - 8)))).min(max);
    T::cast_from(v as u16)
  });
  f
}

/// Cells covered by the coded blocks, clipped to the frame.
fn coverage(
  blocks: &[CodedBlock], mi_rows: usize, mi_cols: usize,
) -> Vec<u8> {
  let mut hits = vec![0; mi_rows * mi_cols];
  for b in blocks {
    let bsize = b.mi.sb_type;
    let rows = (b.mi_row + bsize.height_mi()).min(mi_rows);
    let cols = (b.mi_col + bsize.width_mi()).min(mi_cols);
    for r in b.mi_row..rows {
      for c in b.mi_col..cols {
        hits[r * mi_cols + c] += 1;
      }
    }
  }
  hits
}

fn key_then_inter<T: Pixel>(
  enc: &mut Encoder<T>, source: &Frame<T>, next: &Frame<T>,
) -> (FrameResult<T>, FrameResult<T>, Vec<CodedBlock>) {
  let key = enc.encode_frame(source, &[], FrameType::KEY).unwrap();
  assert!(key.rd.is_valid());
  assert!(key.mode_info.iter().all(|mi| !mi.is_inter_block()));

  let mut blocks = Vec::new();
  let inter = enc
    .encode_frame_with_sink(
      next,
      &[Some(&key.rec)],
      FrameType::INTER,
      &mut blocks,
    )
    .unwrap();
  assert!(inter.rd.is_valid());
  (key, inter, blocks)
}

#[test]
fn high_bitdepth_444_frames_are_fully_coded() {
  let (w, h) = (72, 64);
  let mut enc =
    setup_encoder::<u16>(w, h, 10, ChromaSampling::Cs444, 4, 0, 0);
  let src = textured::<u16>(w, h, 10, ChromaSampling::Cs444, 1);
  let next = textured::<u16>(w, h, 10, ChromaSampling::Cs444, 2);
  let (_, inter, blocks) = key_then_inter(&mut enc, &src, &next);

  let grid = &inter.mode_info;
  assert_eq!((grid.mi_rows, grid.mi_cols), (8, 9));
  assert!(coverage(&blocks, grid.mi_rows, grid.mi_cols)
    .iter()
    .all(|&n| n == 1));

  for p in inter.rec.planes.iter() {
    assert_eq!((p.cfg.width, p.cfg.height), (w, h));
    assert!(p.rows().flatten().all(|&v| v <= 1023));
  }
}

#[test]
fn tiled_threaded_encode_matches_single_threaded() {
  let (w, h) = (128, 128);
  let src = textured::<u8>(w, h, 8, ChromaSampling::Cs420, 3);
  let next = textured::<u8>(w, h, 8, ChromaSampling::Cs420, 4);

  let mut serial =
    setup_encoder::<u8>(w, h, 8, ChromaSampling::Cs420, 9, 1, 0);
  let mut threaded =
    setup_encoder::<u8>(w, h, 8, ChromaSampling::Cs420, 9, 1, 2);
  let (_, a, blocks_a) = key_then_inter(&mut serial, &src, &next);
  let (_, b, blocks_b) = key_then_inter(&mut threaded, &src, &next);

  assert_eq!(a.rd.rate, b.rd.rate);
  assert_eq!(a.rd.dist, b.rd.dist);
  assert_eq!(blocks_a.len(), blocks_b.len());
  for (x, y) in blocks_a.iter().zip(blocks_b.iter()) {
    assert_eq!((x.mi_row, x.mi_col), (y.mi_row, y.mi_col));
    assert_eq!(x.mi.mode, y.mi.mode);
    assert_eq!(x.mi.mv[0], y.mi.mv[0]);
  }
  for (pa, pb) in a.rec.planes.iter().zip(b.rec.planes.iter()) {
    assert!(pa.rows().eq(pb.rows()));
  }
}

#[test]
fn static_content_is_predicted_from_the_reference() {
  let (w, h) = (64, 64);
  let mut enc =
    setup_encoder::<u8>(w, h, 8, ChromaSampling::Cs420, 0, 0, 0);
  let src = textured::<u8>(w, h, 8, ChromaSampling::Cs420, 5);
  let key = enc.encode_frame(&src, &[], FrameType::KEY).unwrap();
  let inter = enc
    .encode_frame(&key.rec, &[Some(&key.rec)], FrameType::INTER)
    .unwrap();
  assert!(inter.mode_info.iter().any(|mi| mi.is_inter_block()));
}
