// Copyright (c) 2017-2023, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

#![allow(non_upper_case_globals)]

use std::ops::Range;

use crate::border::McBuffer;
use crate::context::{MbEdges, ModeInfo};
use crate::frame::*;
use crate::mc::*;
use crate::partition::*;
use crate::scale::ScaleFactors;
use crate::util::*;

/// A reference frame together with its scaling onto the current frame.
#[derive(Clone, Copy, Debug)]
pub struct RefFrame<'a, T: Pixel> {
  pub frame: &'a Frame<T>,
  pub sf: ScaleFactors,
  /// Whether the reference lies after the current frame in display order.
  pub sign_bias: bool,
}

impl<'a, T: Pixel> RefFrame<'a, T> {
  pub fn new(
    frame: &'a Frame<T>, this_w: usize, this_h: usize, sign_bias: bool,
  ) -> Self {
    let sf =
      ScaleFactors::new(frame.width(), frame.height(), this_w, this_h);
    RefFrame { frame, sf, sign_bias }
  }
}

/// Shared inputs of inter prediction within one tile.
pub struct InterPredictor<'a, T: Pixel> {
  pub backend: &'a dyn ConvolveBackend<T>,
  pub kernel: &'static InterpKernel,
  pub bit_depth: usize,
  pub xdec: usize,
  pub ydec: usize,
}

/// Predicts a `w` x `h` block at plane position `(x, y)` from `ref_plane`.
///
/// `mv_q4` is in 1/16 pel of the plane. Windows that leave the reference
/// are rebuilt in `mc_buf` with replicated edges.
pub fn build_inter_predictor<T: Pixel>(
  ref_plane: &Plane<T>, dst: &mut PlaneMutSlice<'_, T>, mv_q4: MotionVector,
  sf: &ScaleFactors, kernel: &'static InterpKernel, x: i32, y: i32,
  w: usize, h: usize, is_avg: bool, backend: &dyn ConvolveBackend<T>,
  mc_buf: &mut McBuffer<T>, bit_depth: usize,
) {
  debug_assert!(sf.is_valid());
  let (scaled_mv, xs, ys, mut x0, mut y0, mut x0_16, mut y0_16) =
    if sf.is_scaled() {
      (
        sf.scale_mv(mv_q4, x, y),
        sf.x_step_q4,
        sf.y_step_q4,
        sf.scale_value_x(x),
        sf.scale_value_y(y),
        sf.scale_value_x(x << SUBPEL_BITS),
        sf.scale_value_y(y << SUBPEL_BITS),
      )
    } else {
      (
        Mv32 { row: mv_q4.row as i32, col: mv_q4.col as i32 },
        16,
        16,
        x,
        y,
        x << SUBPEL_BITS,
        y << SUBPEL_BITS,
      )
    };

  let subpel_x = scaled_mv.col & SUBPEL_MASK;
  let subpel_y = scaled_mv.row & SUBPEL_MASK;
  x0 += scaled_mv.col >> SUBPEL_BITS;
  y0 += scaled_mv.row >> SUBPEL_BITS;
  x0_16 += scaled_mv.col;
  y0_16 += scaled_mv.row;

  let params = ConvolveParams {
    kernel,
    x0_q4: subpel_x,
    x_step_q4: xs,
    y0_q4: subpel_y,
    y_step_q4: ys,
    w,
    h,
    bit_depth,
  };
  let convolve = sf.convolve_fn(subpel_x != 0, subpel_y != 0, is_avg);

  let frame_w = ref_plane.cfg.width as i32;
  let frame_h = ref_plane.cfg.height as i32;

  if scaled_mv.col != 0
    || scaled_mv.row != 0
    || frame_w & 7 != 0
    || frame_h & 7 != 0
  {
    let mut x1 = ((x0_16 + (w as i32 - 1) * xs) >> SUBPEL_BITS) + 1;
    let mut y1 = ((y0_16 + (h as i32 - 1) * ys) >> SUBPEL_BITS) + 1;
    let (mut wx0, mut wy0) = (x0, y0);
    let mut x_pad = 0;
    let mut y_pad = 0;

    // Scaled prediction always runs the 2-D filter, so its window needs
    // the taps on both axes even at full pel.
    if subpel_x != 0 || sf.is_scaled() {
      wx0 -= VP9_INTERP_EXTEND - 1;
      x1 += VP9_INTERP_EXTEND;
      x_pad = INTERP_EXTEND_BEFORE;
    }
    if subpel_y != 0 || sf.is_scaled() {
      wy0 -= VP9_INTERP_EXTEND - 1;
      y1 += VP9_INTERP_EXTEND;
      y_pad = INTERP_EXTEND_BEFORE;
    }

    if wx0 < 0 || wx0 > frame_w - 1 || x1 < 0 || x1 > frame_w
      || wy0 < 0 || wy0 > frame_h - 1 || y1 < 0 || y1 > frame_h
    {
      let b_w = (x1 - wx0) as usize;
      let b_h = (y1 - wy0) as usize;
      let window = mc_buf.build(
        ref_plane,
        wx0 as isize,
        wy0 as isize,
        b_w,
        b_h,
        frame_w as usize,
        frame_h as usize,
      );
      let src = window.subslice(x_pad, y_pad);
      convolve.dispatch(backend, dst, &src, &params);
      return;
    }
  }

  let src = ref_plane.slice(PlaneOffset { x: x0 as isize, y: y0 as isize });
  convolve.dispatch(backend, dst, &src, &params);
}

#[inline]
pub const fn round_mv_comp_q4(value: i32) -> i32 {
  (if value < 0 { value - 2 } else { value + 2 }) / 4
}

#[inline]
pub const fn round_mv_comp_q2(value: i32) -> i32 {
  (if value < 0 { value - 1 } else { value + 1 }) / 2
}

fn mi_mv_pred_q4(mi: &ModeInfo, which: usize) -> MotionVector {
  let (row, col) = mi.bmi.iter().fold((0, 0), |(r, c), b| {
    (r + b.mv[which].row as i32, c + b.mv[which].col as i32)
  });
  MotionVector::new(
    round_mv_comp_q4(row) as i16,
    round_mv_comp_q4(col) as i16,
  )
}

fn mi_mv_pred_q2(
  mi: &ModeInfo, which: usize, b0: usize, b1: usize,
) -> MotionVector {
  let a = mi.bmi[b0].mv[which];
  let b = mi.bmi[b1].mv[which];
  MotionVector::new(
    round_mv_comp_q2(a.row as i32 + b.row as i32) as i16,
    round_mv_comp_q2(a.col as i32 + b.col as i32) as i16,
  )
}

/// Vector used by the 4x4 block `block` (index into the 2x2 luma grid of
/// its top-left corner) of a subsampled plane of a sub-8x8 block.
pub fn average_split_mvs(
  mi: &ModeInfo, which: usize, block: usize, ss_x: usize, ss_y: usize,
) -> MotionVector {
  match (ss_x, ss_y) {
    (0, 0) => mi.bmi[block].mv[which],
    (0, _) => mi_mv_pred_q2(mi, which, block, block + 2),
    (_, 0) => mi_mv_pred_q2(mi, which, block, block + 1),
    _ => mi_mv_pred_q4(mi, which),
  }
}

/// Converts a 1/8 pel luma vector to 1/16 pel of a plane with the given
/// subsampling, clamped so the prediction stays within the extended
/// border around a `bw` x `bh` block.
pub fn clamp_mv_to_umv_border_sb(
  edges: &MbEdges, mv: MotionVector, bw: usize, bh: usize, ss_x: usize,
  ss_y: usize,
) -> MotionVector {
  debug_assert!(ss_x <= 1 && ss_y <= 1);
  let spel_left = (VP9_INTERP_EXTEND + bw as i32) << SUBPEL_BITS;
  let spel_right = spel_left - SUBPEL_SHIFTS as i32;
  let spel_top = (VP9_INTERP_EXTEND + bh as i32) << SUBPEL_BITS;
  let spel_bottom = spel_top - SUBPEL_SHIFTS as i32;
  let row = (mv.row as i32) * (1 << (1 - ss_y));
  let col = (mv.col as i32) * (1 << (1 - ss_x));
  let col = clamp(
    col,
    edges.to_left * (1 << (1 - ss_x)) - spel_left,
    edges.to_right * (1 << (1 - ss_x)) + spel_right,
  );
  let row = clamp(
    row,
    edges.to_top * (1 << (1 - ss_y)) - spel_top,
    edges.to_bottom * (1 << (1 - ss_y)) + spel_bottom,
  );
  MotionVector::new(row as i16, col as i16)
}

impl<'a, T: Pixel> InterPredictor<'a, T> {
  #[inline]
  fn decimation(&self, pli: usize) -> (usize, usize) {
    if pli == 0 {
      (0, 0)
    } else {
      (self.xdec, self.ydec)
    }
  }

  /// Builds the inter prediction of the block described by `mi` at
  /// `(mi_row, mi_col)` into `dst`, for the planes in `planes`.
  ///
  /// `refs` holds the reference of each entry of `mi.ref_frame`; a second
  /// reference is averaged into the first.
  pub fn build_inter_predictors_sb(
    &self, dst: &mut Frame<T>, refs: [Option<&RefFrame<'_, T>>; 2],
    mi: &ModeInfo, mi_row: usize, mi_col: usize, edges: &MbEdges,
    planes: Range<usize>, mc_buf: &mut McBuffer<T>,
  ) {
    let bsize = mi.sb_type;
    for pli in planes {
      let (ss_x, ss_y) = self.decimation(pli);
      let plane_x = ((mi_col * MI_SIZE) >> ss_x) as i32;
      let plane_y = ((mi_row * MI_SIZE) >> ss_y) as i32;
      for (which, rf) in refs.iter().enumerate() {
        let Some(rf) = rf else { continue };
        let is_avg = which == 1;
        let ref_plane = &rf.frame.planes[pli];
        if bsize.is_sub8x8() {
          let num_4x4_w = (2 >> ss_x).max(1);
          let num_4x4_h = (2 >> ss_y).max(1);
          for by in 0..num_4x4_h {
            for bx in 0..num_4x4_w {
              let block = (by << ss_y) * 2 + (bx << ss_x);
              let mv = if pli == 0 {
                mi.bmi[block].mv[which]
              } else {
                average_split_mvs(mi, which, block, ss_x, ss_y)
              };
              let mv_q4 =
                clamp_mv_to_umv_border_sb(edges, mv, 4, 4, ss_x, ss_y);
              let x = plane_x + 4 * bx as i32;
              let y = plane_y + 4 * by as i32;
              build_inter_predictor(
                ref_plane,
                &mut dst.planes[pli].mut_slice(PlaneOffset {
                  x: x as isize,
                  y: y as isize,
                }),
                mv_q4,
                &rf.sf,
                self.kernel,
                x,
                y,
                4,
                4,
                is_avg,
                self.backend,
                mc_buf,
                self.bit_depth,
              );
            }
          }
        } else {
          let bw = bsize.width() >> ss_x;
          let bh = bsize.height() >> ss_y;
          let mv_q4 =
            clamp_mv_to_umv_border_sb(edges, mi.mv[which], bw, bh, ss_x, ss_y);
          build_inter_predictor(
            ref_plane,
            &mut dst.planes[pli].mut_slice(PlaneOffset {
              x: plane_x as isize,
              y: plane_y as isize,
            }),
            mv_q4,
            &rf.sf,
            self.kernel,
            plane_x,
            plane_y,
            bw,
            bh,
            is_avg,
            self.backend,
            mc_buf,
            self.bit_depth,
          );
        }
      }
    }
  }
}

/// Intra prediction edges of one block, with the fallbacks applied.
pub struct IntraEdge<T: Pixel> {
  /// `above[0]` is the above-left sample, followed by the row above.
  above: [T; 64 + 1],
  left: [T; 64],
}

impl<T: Pixel> IntraEdge<T> {
  /// Gathers the edges of the `size` x `size` block at plane position
  /// `(x, y)` of `rec`.
  pub fn new(
    rec: &Plane<T>, x: usize, y: usize, size: usize, have_above: bool,
    have_left: bool, bit_depth: usize,
  ) -> Self {
    let base: i32 = 128 << (bit_depth - 8);
    let mut edge = IntraEdge {
      above: [T::cast_from(base - 1); 64 + 1],
      left: [T::cast_from(base + 1); 64],
    };
    let s = rec.slice(PlaneOffset { x: x as isize, y: y as isize });
    if have_above {
      let row = s.row_at(-1);
      edge.above[1..=size].copy_from_slice(&row[..size]);
      edge.above[0] = if have_left {
        s.go_left(1).row_at(-1)[0]
      } else {
        T::cast_from(base + 1)
      };
    }
    if have_left {
      let col = s.go_left(1);
      for (i, l) in edge.left[..size].iter_mut().enumerate() {
        *l = col.p(0, i);
      }
    }
    edge
  }
}

pub fn pred_dc<T: Pixel>(
  dst: &mut PlaneMutSlice<'_, T>, above: &[T], left: &[T], size: usize,
) {
  let sum: u32 = above[..size]
    .iter()
    .chain(left[..size].iter())
    .map(|&v| u32::cast_from(v))
    .sum();
  let len = 2 * size as u32;
  let avg = T::cast_from((sum + (len >> 1)) / len);
  for r in 0..size {
    dst[r][..size].fill(avg);
  }
}

pub fn pred_dc_one_edge<T: Pixel>(
  dst: &mut PlaneMutSlice<'_, T>, edge: &[T], size: usize,
) {
  let sum: u32 = edge[..size].iter().map(|&v| u32::cast_from(v)).sum();
  let avg = T::cast_from((sum + (size as u32 >> 1)) / size as u32);
  for r in 0..size {
    dst[r][..size].fill(avg);
  }
}

pub fn pred_dc_128<T: Pixel>(
  dst: &mut PlaneMutSlice<'_, T>, size: usize, bit_depth: usize,
) {
  let v = T::cast_from(128u32 << (bit_depth - 8));
  for r in 0..size {
    dst[r][..size].fill(v);
  }
}

pub fn pred_v<T: Pixel>(
  dst: &mut PlaneMutSlice<'_, T>, above: &[T], size: usize,
) {
  for r in 0..size {
    dst[r][..size].copy_from_slice(&above[..size]);
  }
}

pub fn pred_h<T: Pixel>(
  dst: &mut PlaneMutSlice<'_, T>, left: &[T], size: usize,
) {
  for (r, &l) in left[..size].iter().enumerate() {
    dst[r][..size].fill(l);
  }
}

pub fn pred_tm<T: Pixel>(
  dst: &mut PlaneMutSlice<'_, T>, above: &[T], left: &[T], above_left: T,
  size: usize, bit_depth: usize,
) {
  let ytop_left = i32::cast_from(above_left);
  for (r, &l) in left[..size].iter().enumerate() {
    let l = i32::cast_from(l);
    for (d, &a) in dst[r][..size].iter_mut().zip(&above[..size]) {
      *d = clip_pixel(l + i32::cast_from(a) - ytop_left, bit_depth);
    }
  }
}

/// Predicts a `size` x `size` block with one of the searched intra modes.
pub fn predict_intra<T: Pixel>(
  mode: PredictionMode, dst: &mut PlaneMutSlice<'_, T>, edge: &IntraEdge<T>,
  size: usize, have_above: bool, have_left: bool, bit_depth: usize,
) {
  debug_assert!(size <= 64);
  let above = &edge.above[1..];
  let left = &edge.left[..];
  match mode {
    PredictionMode::DC_PRED => match (have_above, have_left) {
      (true, true) => pred_dc(dst, above, left, size),
      (true, false) => pred_dc_one_edge(dst, above, size),
      (false, true) => pred_dc_one_edge(dst, left, size),
      (false, false) => pred_dc_128(dst, size, bit_depth),
    },
    PredictionMode::V_PRED => pred_v(dst, above, size),
    PredictionMode::H_PRED => pred_h(dst, left, size),
    PredictionMode::TM_PRED => {
      pred_tm(dst, above, left, edge.above[0], size, bit_depth)
    }
    _ => {
      debug_assert!(false, "unsupported intra mode {:?}", mode);
      pred_dc(dst, above, left, size)
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::color::ChromaSampling;
  use crate::context::BModeInfo;
  use pretty_assertions::assert_eq;

  fn ramp_frame(w: usize, h: usize) -> Frame<u8> {
    let mut f = Frame::new(w, h, ChromaSampling::Cs420);
    f.fill_with(|_, x, y| ((x * 3 + y * 5) & 0xff) as u8);
    f.pad();
    f
  }

  #[test]
  fn unscaled_full_pel_copy_16x16() {
    let reference = ramp_frame(64, 64);
    let mut pred = Frame::<u8>::new(64, 64, ChromaSampling::Cs420);
    let mut mc_buf = McBuffer::new();
    // (+2, -1) pixels in 1/16 pel.
    let mv_q4 = MotionVector::new(-16, 32);
    build_inter_predictor(
      &reference.planes[0],
      &mut pred.planes[0].mut_slice(PlaneOffset { x: 16, y: 16 }),
      mv_q4,
      &ScaleFactors::unscaled(),
      InterpFilter::EIGHTTAP.kernel(),
      16,
      16,
      16,
      16,
      false,
      &RustConvolve,
      &mut mc_buf,
      8,
    );
    for y in 0..16 {
      for x in 0..16 {
        assert_eq!(
          pred.planes[0].p(16 + x, 16 + y),
          reference.planes[0].p(18 + x, 15 + y)
        );
      }
    }
  }

  #[test]
  fn top_left_corner_replicates_edges() {
    let reference = ramp_frame(64, 64);
    let mut pred = Frame::<u8>::new(64, 64, ChromaSampling::Cs420);
    let mut mc_buf = McBuffer::new();
    // Eight pixels up and to the left of the frame corner.
    let mv_q4 = MotionVector::new(-8 * 16, -8 * 16);
    build_inter_predictor(
      &reference.planes[0],
      &mut pred.planes[0].as_mut_slice(),
      mv_q4,
      &ScaleFactors::unscaled(),
      InterpFilter::EIGHTTAP.kernel(),
      0,
      0,
      16,
      16,
      false,
      &RustConvolve,
      &mut mc_buf,
      8,
    );
    let r = &reference.planes[0];
    for y in 0..16 {
      for x in 0..16 {
        let sx = (x as isize - 8).max(0) as usize;
        let sy = (y as isize - 8).max(0) as usize;
        assert_eq!(pred.planes[0].p(x, y), r.p(sx, sy));
      }
    }
  }

  #[test]
  fn scaled_full_pel_window_at_the_corner() {
    let reference = ramp_frame(128, 128);
    let mut pred = Frame::<u8>::new(64, 64, ChromaSampling::Cs420);
    let mut mc_buf = McBuffer::new();
    let sf = ScaleFactors::new(128, 128, 64, 64);
    // One pixel up and left, two in the reference.
    let mv_q4 = MotionVector::new(-16, -16);
    build_inter_predictor(
      &reference.planes[0],
      &mut pred.planes[0].as_mut_slice(),
      mv_q4,
      &sf,
      InterpFilter::EIGHTTAP.kernel(),
      0,
      0,
      16,
      16,
      false,
      &RustConvolve,
      &mut mc_buf,
      8,
    );
    let r = &reference.planes[0];
    for y in 0..16 {
      for x in 0..16 {
        let sx = (2 * x as isize - 2).max(0) as usize;
        let sy = (2 * y as isize - 2).max(0) as usize;
        assert_eq!(pred.planes[0].p(x, y), r.p(sx, sy));
      }
    }
  }

  #[test]
  fn mv_rounding_ties_away_from_zero() {
    assert_eq!(round_mv_comp_q4(6), 2);
    assert_eq!(round_mv_comp_q4(-6), -2);
    assert_eq!(round_mv_comp_q4(5), 1);
    assert_eq!(round_mv_comp_q2(3), 2);
    assert_eq!(round_mv_comp_q2(-3), -2);
    assert_eq!(round_mv_comp_q2(2), 1);
  }

  #[test]
  fn split_mvs_average_by_subsampling() {
    let mut mi =
      ModeInfo { sb_type: BlockSize::BLOCK_4X4, ..Default::default() };
    let mvs = [(4, 8), (8, 8), (4, -8), (6, 2)];
    for (b, &(r, c)) in mi.bmi.iter_mut().zip(&mvs) {
      *b = BModeInfo {
        mode: PredictionMode::NEWMV,
        mv: [MotionVector::new(r, c), MotionVector::ZERO],
      };
    }
    assert_eq!(average_split_mvs(&mi, 0, 2, 0, 0), MotionVector::new(4, -8));
    // Rows 0 and 1 of the left column.
    assert_eq!(average_split_mvs(&mi, 0, 0, 0, 1), MotionVector::new(4, 0));
    // Columns 0 and 1 of the bottom row.
    assert_eq!(average_split_mvs(&mi, 0, 2, 1, 0), MotionVector::new(5, -3));
    // All four: (22 / 4, 10 / 4) rounded away from zero.
    assert_eq!(average_split_mvs(&mi, 0, 0, 1, 1), MotionVector::new(6, 3));
  }

  #[test]
  fn umv_clamp_limits_far_vectors() {
    let edges = MbEdges::new(0, 0, BlockSize::BLOCK_8X8, 8, 8);
    let mv = MotionVector::new(-1000, 2000);
    let clamped = clamp_mv_to_umv_border_sb(&edges, mv, 8, 8, 0, 0);
    // (4 + 8) << 4 beyond the left/top edge, in 1/16 pel.
    assert_eq!(clamped.row, -(12 << 4));
    assert_eq!(clamped.col, 7 * 8 * 8 * 2 + (12 << 4) - 16);
  }

  #[test]
  fn intra_fallbacks_without_neighbours() {
    let rec = Plane::<u8>::new(16, 16, 0, 0, 8, 8);
    let mut dst = Plane::<u8>::new(16, 16, 0, 0, 8, 8);
    let edge = IntraEdge::new(&rec, 0, 0, 4, false, false, 8);
    predict_intra(
      PredictionMode::V_PRED,
      &mut dst.as_mut_slice(),
      &edge,
      4,
      false,
      false,
      8,
    );
    assert_eq!(dst.p(3, 3), 127);
    predict_intra(
      PredictionMode::H_PRED,
      &mut dst.as_mut_slice(),
      &edge,
      4,
      false,
      false,
      8,
    );
    assert_eq!(dst.p(3, 3), 129);
    predict_intra(
      PredictionMode::DC_PRED,
      &mut dst.as_mut_slice(),
      &edge,
      4,
      false,
      false,
      8,
    );
    assert_eq!(dst.p(0, 0), 128);
  }

  #[test]
  fn tm_extrapolates_gradient() {
    let mut rec = Plane::<u8>::new(16, 16, 0, 0, 8, 8);
    {
      let mut s = rec.as_mut_slice();
      for y in 0..16 {
        for x in 0..16 {
          s[y][x] = (10 + x + 2 * y) as u8;
        }
      }
    }
    let mut dst = Plane::<u8>::new(16, 16, 0, 0, 8, 8);
    let edge = IntraEdge::new(&rec, 4, 4, 4, true, true, 8);
    predict_intra(
      PredictionMode::TM_PRED,
      &mut dst.mut_slice(PlaneOffset { x: 4, y: 4 }),
      &edge,
      4,
      true,
      true,
      8,
    );
    for y in 4..8 {
      for x in 4..8 {
        assert_eq!(dst.p(x, y), rec.p(x, y));
      }
    }
  }
}
