// Copyright (c) 2019-2022, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

pub use self::native::*;

mod native {
  use crate::frame::*;
  use crate::mc::{BILINEAR_FILTERS, FILTER_BITS, SUBPEL_TAPS};
  use crate::util::*;

  /// Sum of absolute differences of a `blk_w` x `blk_h` block.
  #[inline(always)]
  pub fn get_sad<T: Pixel>(
    plane_org: &PlaneSlice<'_, T>, plane_ref: &PlaneSlice<'_, T>,
    blk_w: usize, blk_h: usize,
  ) -> u32 {
    let mut sum = 0u32;
    for r in 0..blk_h {
      sum += plane_org[r][..blk_w]
        .iter()
        .zip(&plane_ref[r][..blk_w])
        .map(|(&a, &b)| (i32::cast_from(a) - i32::cast_from(b)).unsigned_abs())
        .sum::<u32>();
    }
    sum
  }

  /// Sum of squared errors and sum of differences.
  #[inline(always)]
  fn sse_sum<T: Pixel>(
    a: &PlaneSlice<'_, T>, b: &PlaneSlice<'_, T>, w: usize, h: usize,
  ) -> (u64, i64) {
    let mut sse = 0u64;
    let mut sum = 0i64;
    for r in 0..h {
      for (&x, &y) in a[r][..w].iter().zip(&b[r][..w]) {
        let d = i32::cast_from(x) - i32::cast_from(y);
        sse += (d * d) as u64;
        sum += d as i64;
      }
    }
    (sse, sum)
  }

  #[inline]
  pub fn get_sse<T: Pixel>(
    a: &PlaneSlice<'_, T>, b: &PlaneSlice<'_, T>, w: usize, h: usize,
  ) -> u64 {
    sse_sum(a, b, w, h).0
  }

  /// Variance of the difference of two blocks, `sse - sum^2 / n`, with the
  /// sse. Both saturate at `u32::MAX - 1`.
  pub fn get_variance<T: Pixel>(
    a: &PlaneSlice<'_, T>, b: &PlaneSlice<'_, T>, w: usize, h: usize,
  ) -> (u32, u32) {
    debug_assert!(w.is_power_of_two() && h.is_power_of_two());
    let (sse, sum) = sse_sum(a, b, w, h);
    let shift = w.trailing_zeros() + h.trailing_zeros();
    let var = sse - ((sum * sum) as u64 >> shift);
    (saturate(var), saturate(sse))
  }

  #[inline(always)]
  fn saturate(v: u64) -> u32 {
    v.min(u32::MAX as u64 - 1) as u32
  }

  /// Variance of `b` against `a` displaced by `(xoffset, yoffset)` in
  /// 1/16 pel, interpolated with the 2-tap bilinear filter.
  pub fn get_sub_pixel_variance<T: Pixel>(
    a: &PlaneSlice<'_, T>, xoffset: usize, yoffset: usize,
    b: &PlaneSlice<'_, T>, w: usize, h: usize,
  ) -> (u32, u32) {
    debug_assert!(w <= 64 && h <= 64);
    let htaps = &BILINEAR_FILTERS[xoffset][SUBPEL_TAPS / 2 - 1..];
    let vtaps = &BILINEAR_FILTERS[yoffset][SUBPEL_TAPS / 2 - 1..];

    let mut first = [0u16; 65 * 64];
    for r in 0..h + 1 {
      let row = &a[r];
      for c in 0..w {
        let v = i32::cast_from(row[c]) * htaps[0] as i32
          + i32::cast_from(row[c + 1]) * htaps[1] as i32;
        first[r * w + c] = round_shift(v, FILTER_BITS) as u16;
      }
    }

    let mut sse = 0u64;
    let mut sum = 0i64;
    for r in 0..h {
      let brow = &b[r];
      for c in 0..w {
        let v = first[r * w + c] as i32 * vtaps[0] as i32
          + first[(r + 1) * w + c] as i32 * vtaps[1] as i32;
        let d = round_shift(v, FILTER_BITS) - i32::cast_from(brow[c]);
        sse += (d * d) as u64;
        sum += d as i64;
      }
    }
    let shift = w.trailing_zeros() + h.trailing_zeros();
    let var = sse - ((sum * sum) as u64 >> shift);
    (saturate(var), saturate(sse))
  }

  /// Rounded mean of the 8x8 block at the slice origin.
  pub fn avg_8x8<T: Pixel>(s: &PlaneSlice<'_, T>) -> u32 {
    let sum: u32 = (0..8)
      .map(|r| s[r][..8].iter().map(|&v| u32::cast_from(v)).sum::<u32>())
      .sum();
    (sum + 32) >> 6
  }

  /// Rounded mean of the 4x4 block at the slice origin.
  pub fn avg_4x4<T: Pixel>(s: &PlaneSlice<'_, T>) -> u32 {
    let sum: u32 = (0..4)
      .map(|r| s[r][..4].iter().map(|&v| u32::cast_from(v)).sum::<u32>())
      .sum();
    (sum + 8) >> 4
  }
}

#[cfg(test)]
pub mod test {
  use super::*;
  use crate::frame::*;
  use crate::partition::BlockSize;
  use crate::partition::BlockSize::*;
  use crate::util::{CastFromPrimitive, Pixel};
  use rand::{Rng, SeedableRng};
  use rand_chacha::ChaChaRng;

  // Two planes with different strides
  fn setup_planes<T: Pixel>() -> (Plane<T>, Plane<T>) {
    let mut input_plane = Plane::new(640, 480, 0, 0, 128 + 8, 128 + 8);
    let mut rec_plane = Plane::new(640, 480, 0, 0, 2 * 128 + 8, 2 * 128 + 8);

    let xpad_off =
      (input_plane.cfg.xorigin - input_plane.cfg.xpad) as i32 - 8i32;

    for (i, row) in
      input_plane.data.chunks_mut(input_plane.cfg.stride).enumerate()
    {
      for (j, pixel) in row.iter_mut().enumerate() {
        let val = ((j + i) as i32 - xpad_off) & 255i32;
        *pixel = T::cast_from(val);
      }
    }

    for (i, row) in rec_plane.data.chunks_mut(rec_plane.cfg.stride).enumerate()
    {
      for (j, pixel) in row.iter_mut().enumerate() {
        let val = (j as i32 - i as i32 - xpad_off) & 255i32;
        *pixel = T::cast_from(val);
      }
    }

    (input_plane, rec_plane)
  }

  fn naive_sad<T: Pixel>(
    a: &PlaneSlice<'_, T>, b: &PlaneSlice<'_, T>, w: usize, h: usize,
  ) -> u32 {
    let mut sum = 0;
    for y in 0..h {
      for x in 0..w {
        sum += (i32::cast_from(a.p(x, y)) - i32::cast_from(b.p(x, y)))
          .unsigned_abs();
      }
    }
    sum
  }

  fn get_sad_same_inner<T: Pixel>() {
    let (input_plane, rec_plane) = setup_planes::<T>();
    let po = PlaneOffset { x: 32, y: 40 };
    let org = input_plane.slice(po);
    let rec = rec_plane.slice(po);
    for &bsize in BlockSize::ALL.iter() {
      let (w, h) = (bsize.width(), bsize.height());
      assert_eq!(naive_sad(&org, &rec, w, h), get_sad(&org, &rec, w, h));
    }
  }

  #[test]
  fn get_sad_same_u8() {
    get_sad_same_inner::<u8>();
  }

  #[test]
  fn get_sad_same_u16() {
    get_sad_same_inner::<u16>();
  }

  #[test]
  fn variance_of_constant_offset_is_zero() {
    let mut a = Plane::<u8>::new(16, 16, 0, 0, 8, 8);
    let mut b = Plane::<u8>::new(16, 16, 0, 0, 8, 8);
    let mut ra = ChaChaRng::from_seed([7; 32]);
    {
      let mut sa = a.as_mut_slice();
      let mut sb = b.as_mut_slice();
      for y in 0..16 {
        for x in 0..16 {
          let v: u8 = ra.gen_range(0..200);
          sa[y][x] = v;
          sb[y][x] = v + 3;
        }
      }
    }
    let (var, sse) = get_variance(&a.as_slice(), &b.as_slice(), 16, 16);
    assert_eq!(var, 0);
    assert_eq!(sse, 9 * 256);
    assert_eq!(get_sse(&a.as_slice(), &b.as_slice(), 16, 16), 9 * 256);
  }

  #[test]
  fn zero_offset_sub_pixel_matches_full_pixel() {
    let mut ra = ChaChaRng::from_seed([3; 32]);
    let mut a = Plane::<u8>::new(32, 32, 0, 0, 8, 8);
    let mut b = Plane::<u8>::new(32, 32, 0, 0, 8, 8);
    for v in a.data.iter_mut().chain(b.data.iter_mut()) {
      *v = ra.gen();
    }
    for &bsize in &[BLOCK_8X8, BLOCK_16X8, BLOCK_16X16] {
      let (w, h) = (bsize.width(), bsize.height());
      assert_eq!(
        get_sub_pixel_variance(&a.as_slice(), 0, 0, &b.as_slice(), w, h),
        get_variance(&a.as_slice(), &b.as_slice(), w, h)
      );
    }
  }

  #[test]
  fn half_pel_of_ramp_is_midpoint() {
    let mut a = Plane::<u8>::new(16, 16, 0, 0, 8, 8);
    let mut b = Plane::<u8>::new(16, 16, 0, 0, 8, 8);
    {
      let mut sa = a.as_mut_slice();
      let mut sb = b.as_mut_slice();
      for y in 0..17 {
        for x in 0..17 {
          sa[y][x] = (4 * x) as u8;
        }
      }
      for y in 0..8 {
        for x in 0..8 {
          sb[y][x] = (4 * x + 2) as u8;
        }
      }
    }
    let (var, sse) =
      get_sub_pixel_variance(&a.as_slice(), 8, 0, &b.as_slice(), 8, 8);
    assert_eq!((var, sse), (0, 0));
  }

  #[test]
  fn block_averages_round() {
    let mut p = Plane::<u8>::new(8, 8, 0, 0, 0, 0);
    {
      let mut s = p.as_mut_slice();
      for y in 0..8 {
        for x in 0..8 {
          s[y][x] = if x < 4 { 10 } else { 11 };
        }
      }
    }
    assert_eq!(avg_8x8(&p.as_slice()), 11);
    assert_eq!(avg_4x4(&p.as_slice()), 10);
  }
}
