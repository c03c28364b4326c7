// Copyright (c) 2017-2022, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

mod me;

use criterion::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaChaRng;
use vp9_inter::prelude::*;

fn noise_frame(ra: &mut ChaChaRng, w: usize, h: usize) -> Frame<u8> {
  let mut f = Frame::new(w, h, ChromaSampling::Cs420);
  f.fill_with(|_, _, _| ra.gen());
  f.pad();
  f
}

fn bench_encode_frame(c: &mut Criterion) {
  let mut ra = ChaChaRng::from_seed([0; 32]);
  let (w, h) = (320, 192);
  let reference = noise_frame(&mut ra, w, h);
  let source = noise_frame(&mut ra, w, h);

  for speed in [0, 4, 7] {
    let enc = EncoderConfig {
      width: w,
      height: h,
      tile_rows_log2: 1,
      ..EncoderConfig::with_speed_preset(speed)
    };
    let mut encoder: Encoder<u8> =
      Config::new().with_encoder_config(enc).new_encoder().unwrap();
    c.bench_function(&format!("encode_inter_frame_s{}", speed), |b| {
      b.iter(|| {
        black_box(
          encoder
            .encode_frame(&source, &[Some(&reference)], FrameType::INTER)
            .unwrap(),
        )
      })
    });
  }
}

criterion_group!(encode, bench_encode_frame);

criterion_main!(encode, mc::mc, me::me);
