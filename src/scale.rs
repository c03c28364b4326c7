// Copyright (c) 2017-2018, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Reference frame scaling policy.
//!
//! A reference of a different resolution is sampled on a grid stretched by
//! `other / this` in Q14 fixed point. References more than twice as large
//! or sixteen times smaller than the frame being predicted are unusable.

use crate::frame::*;
use crate::mc::{
  ConvolveBackend, ConvolveFn, ConvolveParams, MotionVector, Mv32,
  SUBPEL_BITS, SUBPEL_MASK, SUB_PEL_FILTERS_8,
};
use crate::util::Pixel;

pub const REF_SCALE_SHIFT: usize = 14;
pub const REF_NO_SCALE: i32 = 1 << REF_SCALE_SHIFT;
pub const REF_INVALID_SCALE: i32 = -1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScaleFactors {
  /// Horizontal scale in Q14, `other_w / this_w`.
  pub x_scale_fp: i32,
  /// Vertical scale in Q14, `other_h / this_h`.
  pub y_scale_fp: i32,
  /// Horizontal distance between predicted samples, 1/16 pel.
  pub x_step_q4: i32,
  /// Vertical distance between predicted samples, 1/16 pel.
  pub y_step_q4: i32,
  /// Convolution variant per `[has_x_subpel][has_y_subpel][is_avg]`.
  predict: [[[ConvolveFn; 2]; 2]; 2],
}

impl Default for ScaleFactors {
  fn default() -> Self {
    ScaleFactors::unscaled()
  }
}

#[inline]
const fn valid_ref_frame_size(
  ref_width: usize, ref_height: usize, this_width: usize, this_height: usize,
) -> bool {
  2 * this_width >= ref_width
    && 2 * this_height >= ref_height
    && this_width <= 16 * ref_width
    && this_height <= 16 * ref_height
}

#[inline]
const fn get_fixed_point_scale_factor(other: usize, this: usize) -> i32 {
  ((other << REF_SCALE_SHIFT) / this) as i32
}

impl ScaleFactors {
  /// Scale factors for a reference of the same size as the frame.
  pub const fn unscaled() -> Self {
    ScaleFactors {
      x_scale_fp: REF_NO_SCALE,
      y_scale_fp: REF_NO_SCALE,
      x_step_q4: 16,
      y_step_q4: 16,
      predict: Self::predict_table(false),
    }
  }

  /// Scale factors mapping a `this_w` x `this_h` frame onto a
  /// `other_w` x `other_h` reference.
  pub fn new(
    other_w: usize, other_h: usize, this_w: usize, this_h: usize,
  ) -> Self {
    if this_w == 0
      || this_h == 0
      || !valid_ref_frame_size(other_w, other_h, this_w, this_h)
    {
      return ScaleFactors {
        x_scale_fp: REF_INVALID_SCALE,
        y_scale_fp: REF_INVALID_SCALE,
        x_step_q4: 0,
        y_step_q4: 0,
        predict: Self::predict_table(true),
      };
    }

    let x_scale_fp = get_fixed_point_scale_factor(other_w, this_w);
    let y_scale_fp = get_fixed_point_scale_factor(other_h, this_h);
    let mut sf = ScaleFactors {
      x_scale_fp,
      y_scale_fp,
      x_step_q4: (16 * x_scale_fp) >> REF_SCALE_SHIFT,
      y_step_q4: (16 * y_scale_fp) >> REF_SCALE_SHIFT,
      predict: Self::predict_table(false),
    };
    sf.predict = Self::predict_table(sf.is_scaled());
    sf
  }

  const fn predict_table(scaled: bool) -> [[[ConvolveFn; 2]; 2]; 2] {
    use ConvolveFn::*;
    if scaled {
      // Any stepping other than 16 needs both passes, whatever the phase.
      [
        [[HorizVert, AvgHorizVert], [HorizVert, AvgHorizVert]],
        [[HorizVert, AvgHorizVert], [HorizVert, AvgHorizVert]],
      ]
    } else {
      [
        [[Copy, Avg], [Vert, AvgVert]],
        [[Horiz, AvgHoriz], [HorizVert, AvgHorizVert]],
      ]
    }
  }

  #[inline]
  pub const fn is_valid(&self) -> bool {
    self.x_scale_fp != REF_INVALID_SCALE
      && self.y_scale_fp != REF_INVALID_SCALE
  }

  #[inline]
  pub const fn is_scaled(&self) -> bool {
    self.is_valid()
      && (self.x_scale_fp != REF_NO_SCALE || self.y_scale_fp != REF_NO_SCALE)
  }

  #[inline]
  const fn scaled_x(&self, val: i32) -> i32 {
    ((val as i64 * self.x_scale_fp as i64) >> REF_SCALE_SHIFT) as i32
  }

  #[inline]
  const fn scaled_y(&self, val: i32) -> i32 {
    ((val as i64 * self.y_scale_fp as i64) >> REF_SCALE_SHIFT) as i32
  }

  /// Position in the reference of frame column `val`.
  #[inline]
  pub const fn scale_value_x(&self, val: i32) -> i32 {
    if self.is_scaled() {
      self.scaled_x(val)
    } else {
      val
    }
  }

  /// Position in the reference of frame row `val`.
  #[inline]
  pub const fn scale_value_y(&self, val: i32) -> i32 {
    if self.is_scaled() {
      self.scaled_y(val)
    } else {
      val
    }
  }

  /// Maps a 1/16 pel vector of the block at pixel `(x, y)` onto the
  /// reference grid, folding in the sub-pel phase of the scaled block
  /// position.
  #[inline]
  pub fn scale_mv(&self, mv_q4: MotionVector, x: i32, y: i32) -> Mv32 {
    if !self.is_scaled() {
      return Mv32 { row: mv_q4.row as i32, col: mv_q4.col as i32 };
    }
    let x_off_q4 = self.scaled_x(x << SUBPEL_BITS) & SUBPEL_MASK;
    let y_off_q4 = self.scaled_y(y << SUBPEL_BITS) & SUBPEL_MASK;
    Mv32 {
      row: self.scaled_y(mv_q4.row as i32) + y_off_q4,
      col: self.scaled_x(mv_q4.col as i32) + x_off_q4,
    }
  }

  /// The convolution variant for a prediction with the given sub-pel
  /// phases.
  #[inline]
  pub const fn convolve_fn(
    &self, has_subpel_x: bool, has_subpel_y: bool, is_avg: bool,
  ) -> ConvolveFn {
    self.predict[has_subpel_x as usize][has_subpel_y as usize]
      [is_avg as usize]
  }
}

/// Resamples the padded frame `src` onto the grid of `dst` with the
/// regular 8-tap kernel, then extends the borders of `dst`.
///
/// Output is produced in 16x16 luma blocks, each filtered from the phase
/// of its top-left sample, so motion search can treat a scaled reference
/// like an unscaled one.
pub fn scale_and_extend_frame<T: Pixel>(
  src: &Frame<T>, dst: &mut Frame<T>, backend: &dyn ConvolveBackend<T>,
  bit_depth: usize,
) {
  let (src_w, src_h) = (src.width(), src.height());
  let (dst_w, dst_h) = (dst.width(), dst.height());
  let x_step_q4 = (16 * src_w / dst_w) as i32;
  let y_step_q4 = (16 * src_h / dst_h) as i32;

  for (pli, (src_plane, dst_plane)) in
    src.planes.iter().zip(dst.planes.iter_mut()).enumerate()
  {
    let (xdec, ydec) = (dst_plane.cfg.xdec, dst_plane.cfg.ydec);
    debug_assert!(pli > 0 || (xdec == 0 && ydec == 0));
    let (bw, bh) = (16 >> xdec, 16 >> ydec);
    for y in (0..dst_h).step_by(16) {
      let y_q4 = (y * bh * src_h / dst_h) as i32;
      for x in (0..dst_w).step_by(16) {
        let x_q4 = (x * bw * src_w / dst_w) as i32;
        let src_po = PlaneOffset {
          x: ((x >> xdec) * src_w / dst_w) as isize,
          y: ((y >> ydec) * src_h / dst_h) as isize,
        };
        let dst_po =
          PlaneOffset { x: (x >> xdec) as isize, y: (y >> ydec) as isize };
        let params = ConvolveParams {
          kernel: &SUB_PEL_FILTERS_8,
          x0_q4: x_q4 & SUBPEL_MASK,
          x_step_q4,
          y0_q4: y_q4 & SUBPEL_MASK,
          y_step_q4,
          w: bw,
          h: bh,
          bit_depth,
        };
        backend.convolve8(
          &mut dst_plane.mut_slice(dst_po),
          &src_plane.slice(src_po),
          &params,
        );
      }
    }
  }
  dst.pad();
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::color::ChromaSampling;
  use crate::mc::ConvolveFn::*;
  use crate::mc::RustConvolve;

  #[test]
  fn same_size_is_unscaled() {
    let sf = ScaleFactors::new(352, 288, 352, 288);
    assert!(sf.is_valid());
    assert!(!sf.is_scaled());
    assert_eq!(sf, ScaleFactors::unscaled());
    assert_eq!(sf.x_step_q4, 16);
    assert_eq!(sf.scale_value_x(37), 37);
    let mv = MotionVector::new(-7, 13);
    assert_eq!(sf.scale_mv(mv, 8, 8), Mv32 { row: -7, col: 13 });
  }

  #[test]
  fn unscaled_dispatch_follows_subpel() {
    let sf = ScaleFactors::unscaled();
    assert_eq!(sf.convolve_fn(false, false, false), Copy);
    assert_eq!(sf.convolve_fn(false, false, true), Avg);
    assert_eq!(sf.convolve_fn(false, true, false), Vert);
    assert_eq!(sf.convolve_fn(true, false, true), AvgHoriz);
    assert_eq!(sf.convolve_fn(true, true, false), HorizVert);
  }

  #[test]
  fn scaled_dispatch_is_always_two_dimensional() {
    let sf = ScaleFactors::new(704, 576, 352, 288);
    assert!(sf.is_scaled());
    assert_eq!(sf.x_step_q4, 32);
    assert_eq!(sf.y_step_q4, 32);
    for x in [false, true] {
      for y in [false, true] {
        assert_eq!(sf.convolve_fn(x, y, false), HorizVert);
        assert_eq!(sf.convolve_fn(x, y, true), AvgHorizVert);
      }
    }
  }

  #[test]
  fn scaled_positions_and_vectors() {
    let sf = ScaleFactors::new(528, 432, 352, 288);
    assert_eq!(sf.x_step_q4, 24);
    assert_eq!(sf.scale_value_x(64), 96);
    assert_eq!(sf.scale_value_y(10), 15);
    // x = 3 maps to 4.5, so a half-pel phase is added to the column.
    let mv = sf.scale_mv(MotionVector::new(16, 16), 3, 0);
    assert_eq!(mv, Mv32 { row: 24, col: 24 + 8 });
  }

  #[test]
  fn invalid_sizes_are_rejected() {
    assert!(!ScaleFactors::new(800, 288, 352, 288).is_valid());
    assert!(!ScaleFactors::new(16, 16, 352, 288).is_valid());
    assert!(ScaleFactors::new(704, 576, 352, 288).is_valid());
    assert!(ScaleFactors::new(22, 18, 352, 288).is_valid());
  }

  #[test]
  fn same_size_rescale_is_a_copy() {
    let mut src = Frame::<u8>::new(48, 32, ChromaSampling::Cs420);
    src.fill_with(|pli, x, y| (x * 5 + y * 3 + pli * 40) as u8);
    src.pad();
    let mut dst = Frame::<u8>::new(48, 32, ChromaSampling::Cs420);
    scale_and_extend_frame(&src, &mut dst, &RustConvolve, 8);
    for pli in 0..3 {
      let cfg = &src.planes[pli].cfg;
      for y in 0..cfg.height {
        for x in 0..cfg.width {
          assert_eq!(dst.planes[pli].p(x, y), src.planes[pli].p(x, y));
        }
      }
    }
  }

  #[test]
  fn downscaled_flat_frame_stays_flat() {
    let mut src = Frame::<u8>::new(64, 64, ChromaSampling::Cs420);
    src.fill_with(|_, _, _| 77);
    src.pad();
    let mut dst = Frame::<u8>::new(32, 32, ChromaSampling::Cs420);
    scale_and_extend_frame(&src, &mut dst, &RustConvolve, 8);
    assert!(dst.planes[0].rows().flatten().all(|&v| v == 77));
    assert!(dst.planes[1].rows().flatten().all(|&v| v == 77));
  }
}
