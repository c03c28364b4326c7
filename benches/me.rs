// Copyright (c) 2017-2022, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use criterion::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaChaRng;
use vp9_inter::config::{SearchMethod, SpeedSettings};
use vp9_inter::dist::get_sad;
use vp9_inter::entropymv::MvCostTables;
use vp9_inter::frame::*;
use vp9_inter::mc::MotionVector;
use vp9_inter::me::*;
use vp9_inter::partition::BlockSize;
use vp9_inter::partition::BlockSize::*;

fn new_plane(ra: &mut ChaChaRng, width: usize, height: usize) -> Plane<u8> {
  let mut p = Plane::new(width, height, 0, 0, 128 + 8, 128 + 8);
  for v in p.data.iter_mut() {
    *v = ra.gen();
  }
  p
}

fn bench_get_sad(b: &mut Bencher, bs: &BlockSize) {
  let mut ra = ChaChaRng::from_seed([0; 32]);
  let input_plane = new_plane(&mut ra, 640, 480);
  let rec_plane = new_plane(&mut ra, 640, 480);
  let po = PlaneOffset { x: 0, y: 0 };

  let plane_org = input_plane.slice(po);
  let plane_ref = rec_plane.slice(po);

  b.iter(|| {
    let _ =
      black_box(get_sad(&plane_org, &plane_ref, bs.width(), bs.height()));
  })
}

pub fn get_sad_blocks(c: &mut Criterion) {
  let blocks = [BLOCK_4X4, BLOCK_8X8, BLOCK_16X16, BLOCK_32X32, BLOCK_64X64];
  let mut group = c.benchmark_group("get_sad");
  for bs in blocks.iter() {
    group.bench_with_input(BenchmarkId::from_parameter(bs), bs, bench_get_sad);
  }
  group.finish();
}

fn bench_single_motion_search(c: &mut Criterion, method: SearchMethod) {
  let mut ra = ChaChaRng::from_seed([1; 32]);
  let pre = new_plane(&mut ra, 256, 256);
  let mut src = new_plane(&mut ra, 256, 256);
  // The block at (96, 96) is the reference moved by (5, -9) pixels.
  let moved = pre.slice(PlaneOffset { x: 87, y: 101 });
  src.mut_slice(PlaneOffset { x: 96, y: 96 }).copy_from(&moved, 32, 32);

  let costs = MvCostTables::default();
  let ms = MotionSearch {
    src: src.slice(PlaneOffset { x: 96, y: 96 }),
    pre: pre.slice(PlaneOffset { x: 96, y: 96 }),
    w: 32,
    h: 32,
    limits: MvLimits::new(12, 12, BLOCK_32X32, 32, 32),
    costs: &costs,
    allow_hp: true,
    sad_per_bit: 3,
    error_per_bit: 64,
  };
  let sf = SpeedSettings { search_method: method, ..Default::default() };
  let step_param = init_search_range(256, &sf);

  c.bench_function(&format!("single_motion_search_{}", method), |b| {
    b.iter(|| {
      black_box(single_motion_search(
        &ms,
        BLOCK_32X32,
        MotionVector::ZERO,
        &[MotionVector::ZERO],
        step_param,
        &sf,
      ))
    })
  });
}

fn bench_nstep(c: &mut Criterion) {
  bench_single_motion_search(c, SearchMethod::NStep);
}

fn bench_hex(c: &mut Criterion) {
  bench_single_motion_search(c, SearchMethod::Hex);
}

criterion_group!(me, get_sad_blocks, bench_nstep, bench_hex);
