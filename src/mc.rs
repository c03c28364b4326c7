// Copyright (c) 2019-2022, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

pub use self::rust::*;

use crate::frame::*;
use crate::serialize::{Deserialize, Serialize};
use crate::util::*;

use std::ops;

/// Motion vector in 1/8 pel units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct MotionVector {
  pub row: i16,
  pub col: i16,
}

/// Components with a magnitude below this (in full pels) may use 1/8 pel.
pub const COMPANDED_MVREF_THRESH: i32 = 8;

impl MotionVector {
  pub const ZERO: MotionVector = MotionVector { row: 0, col: 0 };

  #[inline]
  pub const fn new(row: i16, col: i16) -> Self {
    MotionVector { row, col }
  }

  #[inline]
  pub const fn is_zero(self) -> bool {
    self.row == 0 && self.col == 0
  }

  /// Both components are small enough for eighth pel precision.
  #[inline]
  pub const fn use_mv_hp(self) -> bool {
    ((self.row as i32).abs() >> 3) < COMPANDED_MVREF_THRESH
      && ((self.col as i32).abs() >> 3) < COMPANDED_MVREF_THRESH
  }

  /// Drops the eighth pel bit, moving odd components one step towards
  /// zero, unless high precision is allowed and usable for this vector.
  #[inline]
  pub const fn lower_precision(self, allow_hp: bool) -> Self {
    if allow_hp && self.use_mv_hp() {
      return self;
    }
    let mut mv = self;
    if mv.row & 1 != 0 {
      mv.row += if mv.row > 0 { -1 } else { 1 };
    }
    if mv.col & 1 != 0 {
      mv.col += if mv.col > 0 { -1 } else { 1 };
    }
    mv
  }

  #[inline]
  pub fn clamp(
    self, min_col: i32, max_col: i32, min_row: i32, max_row: i32,
  ) -> Self {
    MotionVector {
      col: clamp(self.col as i32, min_col, max_col) as i16,
      row: clamp(self.row as i32, min_row, max_row) as i16,
    }
  }

  #[inline]
  pub const fn joint(self) -> MvJoint {
    match (self.row == 0, self.col == 0) {
      (true, true) => MvJoint::MV_JOINT_ZERO,
      (true, false) => MvJoint::MV_JOINT_HNZVZ,
      (false, true) => MvJoint::MV_JOINT_HZVNZ,
      (false, false) => MvJoint::MV_JOINT_HNZVNZ,
    }
  }

  /// Full pel position, rounding towards negative infinity.
  #[inline]
  pub const fn to_fullpel(self) -> Self {
    MotionVector { row: self.row >> 3, col: self.col >> 3 }
  }

  #[inline]
  pub const fn from_fullpel(self) -> Self {
    MotionVector { row: self.row * 8, col: self.col * 8 }
  }
}

/// Which components of a vector are nonzero.
#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum MvJoint {
  /// Zero vector
  MV_JOINT_ZERO = 0,
  /// Vert zero, hor nonzero
  MV_JOINT_HNZVZ = 1,
  /// Hor zero, vert nonzero
  MV_JOINT_HZVNZ = 2,
  /// Both nonzero
  MV_JOINT_HNZVNZ = 3,
}

pub const MV_JOINTS: usize = 4;

impl MvJoint {
  #[inline]
  pub const fn has_vertical(self) -> bool {
    matches!(self, MvJoint::MV_JOINT_HZVNZ | MvJoint::MV_JOINT_HNZVNZ)
  }

  #[inline]
  pub const fn has_horizontal(self) -> bool {
    matches!(self, MvJoint::MV_JOINT_HNZVZ | MvJoint::MV_JOINT_HNZVNZ)
  }
}

impl ops::Mul<i16> for MotionVector {
  type Output = MotionVector;

  #[inline]
  fn mul(self, rhs: i16) -> MotionVector {
    MotionVector { row: self.row * rhs, col: self.col * rhs }
  }
}

impl ops::Shr<u8> for MotionVector {
  type Output = MotionVector;

  #[inline]
  fn shr(self, rhs: u8) -> MotionVector {
    MotionVector { row: self.row >> rhs, col: self.col >> rhs }
  }
}

impl ops::Shl<u8> for MotionVector {
  type Output = MotionVector;

  #[inline]
  fn shl(self, rhs: u8) -> MotionVector {
    MotionVector { row: self.row << rhs, col: self.col << rhs }
  }
}

impl ops::Add<MotionVector> for MotionVector {
  type Output = MotionVector;

  #[inline]
  fn add(self, rhs: MotionVector) -> MotionVector {
    MotionVector { row: self.row + rhs.row, col: self.col + rhs.col }
  }
}

impl ops::Sub<MotionVector> for MotionVector {
  type Output = MotionVector;

  #[inline]
  fn sub(self, rhs: MotionVector) -> MotionVector {
    MotionVector { row: self.row - rhs.row, col: self.col - rhs.col }
  }
}

impl ops::Neg for MotionVector {
  type Output = MotionVector;

  #[inline]
  fn neg(self) -> MotionVector {
    MotionVector { row: -self.row, col: -self.col }
  }
}

/// Motion vector with 32-bit components, used once a vector has been
/// rescaled to 1/16 pel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Mv32 {
  pub row: i32,
  pub col: i32,
}

#[derive(
  Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize,
)]
#[allow(non_camel_case_types)]
pub enum InterpFilter {
  /// Regular 8-tap Lagrangian filter.
  #[default]
  EIGHTTAP,
  /// 8-tap low pass filter.
  EIGHTTAP_SMOOTH,
  /// 8-tap DCT based filter.
  EIGHTTAP_SHARP,
  /// 2-tap filter.
  BILINEAR,
}

pub const SUBPEL_BITS: i32 = 4;
pub const SUBPEL_MASK: i32 = (1 << SUBPEL_BITS) - 1;
pub const SUBPEL_SHIFTS: usize = 16;
pub const SUBPEL_TAPS: usize = 8;
pub const FILTER_BITS: usize = 7;

/// Extra samples needed before a block by an 8-tap filter.
pub const INTERP_EXTEND_BEFORE: usize = SUBPEL_TAPS / 2 - 1;
/// Extra samples needed after a block by an 8-tap filter.
pub const INTERP_EXTEND_AFTER: usize = SUBPEL_TAPS / 2;
/// Distance at which a vector is far enough outside the frame that every
/// tap of the filter reads replicated border samples.
pub const VP9_INTERP_EXTEND: i32 = 4;

pub type InterpKernel = [[i16; SUBPEL_TAPS]; SUBPEL_SHIFTS];

pub static BILINEAR_FILTERS: InterpKernel = [
  [0, 0, 0, 128, 0, 0, 0, 0],
  [0, 0, 0, 120, 8, 0, 0, 0],
  [0, 0, 0, 112, 16, 0, 0, 0],
  [0, 0, 0, 104, 24, 0, 0, 0],
  [0, 0, 0, 96, 32, 0, 0, 0],
  [0, 0, 0, 88, 40, 0, 0, 0],
  [0, 0, 0, 80, 48, 0, 0, 0],
  [0, 0, 0, 72, 56, 0, 0, 0],
  [0, 0, 0, 64, 64, 0, 0, 0],
  [0, 0, 0, 56, 72, 0, 0, 0],
  [0, 0, 0, 48, 80, 0, 0, 0],
  [0, 0, 0, 40, 88, 0, 0, 0],
  [0, 0, 0, 32, 96, 0, 0, 0],
  [0, 0, 0, 24, 104, 0, 0, 0],
  [0, 0, 0, 16, 112, 0, 0, 0],
  [0, 0, 0, 8, 120, 0, 0, 0],
];

// Lagrangian interpolation filter
pub static SUB_PEL_FILTERS_8: InterpKernel = [
  [0, 0, 0, 128, 0, 0, 0, 0],
  [0, 1, -5, 126, 8, -3, 1, 0],
  [-1, 3, -10, 122, 18, -6, 2, 0],
  [-1, 4, -13, 118, 27, -9, 3, -1],
  [-1, 4, -16, 112, 37, -11, 4, -1],
  [-1, 5, -18, 105, 48, -14, 4, -1],
  [-1, 5, -19, 97, 58, -16, 5, -1],
  [-1, 6, -19, 88, 68, -18, 5, -1],
  [-1, 6, -19, 78, 78, -19, 6, -1],
  [-1, 5, -18, 68, 88, -19, 6, -1],
  [-1, 5, -16, 58, 97, -19, 5, -1],
  [-1, 4, -14, 48, 105, -18, 5, -1],
  [-1, 4, -11, 37, 112, -16, 4, -1],
  [-1, 3, -9, 27, 118, -13, 4, -1],
  [0, 2, -6, 18, 122, -10, 3, -1],
  [0, 1, -3, 8, 126, -5, 1, 0],
];

// DCT based filter
pub static SUB_PEL_FILTERS_8S: InterpKernel = [
  [0, 0, 0, 128, 0, 0, 0, 0],
  [-1, 3, -7, 127, 8, -3, 1, 0],
  [-2, 5, -13, 125, 17, -6, 3, -1],
  [-3, 7, -17, 121, 27, -10, 5, -2],
  [-4, 9, -20, 115, 37, -13, 6, -2],
  [-4, 10, -23, 108, 48, -16, 8, -3],
  [-4, 10, -24, 100, 59, -19, 9, -3],
  [-4, 11, -24, 90, 70, -21, 10, -4],
  [-4, 11, -23, 80, 80, -23, 11, -4],
  [-4, 10, -21, 70, 90, -24, 11, -4],
  [-3, 9, -19, 59, 100, -24, 10, -4],
  [-3, 8, -16, 48, 108, -23, 10, -4],
  [-2, 6, -13, 37, 115, -20, 9, -4],
  [-2, 5, -10, 27, 121, -17, 7, -3],
  [-1, 3, -6, 17, 125, -13, 5, -2],
  [0, 1, -3, 8, 127, -7, 3, -1],
];

// 8-tap lowpass filter, Hamming window
pub static SUB_PEL_FILTERS_8LP: InterpKernel = [
  [-1, -7, 32, 80, 32, -7, -1, 0],
  [-1, -8, 28, 80, 37, -7, -2, 1],
  [0, -8, 24, 79, 41, -7, -2, 1],
  [0, -8, 20, 78, 45, -5, -3, 1],
  [0, -8, 16, 76, 50, -4, -3, 1],
  [0, -7, 13, 74, 54, -3, -4, 1],
  [1, -7, 9, 71, 58, -1, -4, 1],
  [1, -6, 6, 68, 62, 1, -5, 1],
  [1, -6, 4, 65, 65, 4, -6, 1],
  [1, -5, 1, 62, 68, 6, -6, 1],
  [1, -4, -1, 58, 71, 9, -7, 1],
  [1, -4, -3, 54, 74, 13, -7, 0],
  [1, -3, -4, 50, 76, 16, -8, 0],
  [1, -3, -5, 45, 78, 20, -8, 0],
  [1, -2, -7, 41, 79, 24, -8, 0],
  [1, -2, -7, 37, 80, 28, -8, -1],
];

const IDENTITY_TAPS: [i16; SUBPEL_TAPS] = [0, 0, 0, 128, 0, 0, 0, 0];

impl InterpFilter {
  #[inline]
  pub fn kernel(self) -> &'static InterpKernel {
    match self {
      InterpFilter::EIGHTTAP => &SUB_PEL_FILTERS_8,
      InterpFilter::EIGHTTAP_SMOOTH => &SUB_PEL_FILTERS_8LP,
      InterpFilter::EIGHTTAP_SHARP => &SUB_PEL_FILTERS_8S,
      InterpFilter::BILINEAR => &BILINEAR_FILTERS,
    }
  }
}

/// Filter position and stepping of one convolution call.
///
/// `x0_q4`/`y0_q4` are the 1/16 pel phase of the first output sample and
/// `x_step_q4`/`y_step_q4` the distance between output samples, 16 when
/// the reference is not scaled.
#[derive(Clone, Copy, Debug)]
pub struct ConvolveParams {
  pub kernel: &'static InterpKernel,
  pub x0_q4: i32,
  pub x_step_q4: i32,
  pub y0_q4: i32,
  pub y_step_q4: i32,
  pub w: usize,
  pub h: usize,
  pub bit_depth: usize,
}

impl ConvolveParams {
  /// Unscaled parameters with the given 1/16 pel phases.
  pub fn unscaled(
    kernel: &'static InterpKernel, subpel_x: i32, subpel_y: i32, w: usize,
    h: usize, bit_depth: usize,
  ) -> Self {
    ConvolveParams {
      kernel,
      x0_q4: subpel_x,
      x_step_q4: 16,
      y0_q4: subpel_y,
      y_step_q4: 16,
      w,
      h,
      bit_depth,
    }
  }

  #[inline]
  fn check(&self) {
    debug_assert!(self.w <= 64);
    debug_assert!(self.h <= 64);
    debug_assert!(self.x_step_q4 <= 32);
    debug_assert!(self.y_step_q4 <= 32);
  }
}

/// The eight convolution variants a prediction can dispatch to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConvolveFn {
  Copy,
  Avg,
  Horiz,
  AvgHoriz,
  Vert,
  AvgVert,
  HorizVert,
  AvgHorizVert,
}

impl ConvolveFn {
  #[inline]
  pub const fn is_avg(self) -> bool {
    matches!(
      self,
      ConvolveFn::Avg
        | ConvolveFn::AvgHoriz
        | ConvolveFn::AvgVert
        | ConvolveFn::AvgHorizVert
    )
  }

  /// Runs this variant through `backend`.
  pub fn dispatch<T: Pixel>(
    self, backend: &dyn ConvolveBackend<T>, dst: &mut PlaneMutSlice<'_, T>,
    src: &PlaneSlice<'_, T>, params: &ConvolveParams,
  ) {
    params.check();
    match self {
      ConvolveFn::Copy => backend.convolve_copy(dst, src, params),
      ConvolveFn::Avg => backend.convolve_avg(dst, src, params),
      ConvolveFn::Horiz => backend.convolve8_horiz(dst, src, params),
      ConvolveFn::AvgHoriz => backend.convolve8_avg_horiz(dst, src, params),
      ConvolveFn::Vert => backend.convolve8_vert(dst, src, params),
      ConvolveFn::AvgVert => backend.convolve8_avg_vert(dst, src, params),
      ConvolveFn::HorizVert => backend.convolve8(dst, src, params),
      ConvolveFn::AvgHorizVert => backend.convolve8_avg(dst, src, params),
    }
  }
}

/// A set of convolution kernels.
///
/// `src` is positioned on the integer sample of the first output pixel and
/// the implementation may read up to 3 samples before and 4 after the
/// filtered span. Every method defaults to the reference implementation;
/// an accelerated backend overrides what it provides and must reproduce
/// the reference output exactly.
pub trait ConvolveBackend<T: Pixel>: Send + Sync {
  fn convolve_copy(
    &self, dst: &mut PlaneMutSlice<'_, T>, src: &PlaneSlice<'_, T>,
    params: &ConvolveParams,
  ) {
    rust::convolve_copy(dst, src, params.w, params.h);
  }

  fn convolve_avg(
    &self, dst: &mut PlaneMutSlice<'_, T>, src: &PlaneSlice<'_, T>,
    params: &ConvolveParams,
  ) {
    rust::convolve_avg(dst, src, params.w, params.h);
  }

  fn convolve8_horiz(
    &self, dst: &mut PlaneMutSlice<'_, T>, src: &PlaneSlice<'_, T>,
    params: &ConvolveParams,
  ) {
    rust::convolve8_horiz(dst, src, params, false);
  }

  fn convolve8_avg_horiz(
    &self, dst: &mut PlaneMutSlice<'_, T>, src: &PlaneSlice<'_, T>,
    params: &ConvolveParams,
  ) {
    rust::convolve8_horiz(dst, src, params, true);
  }

  fn convolve8_vert(
    &self, dst: &mut PlaneMutSlice<'_, T>, src: &PlaneSlice<'_, T>,
    params: &ConvolveParams,
  ) {
    rust::convolve8_vert(dst, src, params, false);
  }

  fn convolve8_avg_vert(
    &self, dst: &mut PlaneMutSlice<'_, T>, src: &PlaneSlice<'_, T>,
    params: &ConvolveParams,
  ) {
    rust::convolve8_vert(dst, src, params, true);
  }

  fn convolve8(
    &self, dst: &mut PlaneMutSlice<'_, T>, src: &PlaneSlice<'_, T>,
    params: &ConvolveParams,
  ) {
    rust::convolve8(dst, src, params, false);
  }

  fn convolve8_avg(
    &self, dst: &mut PlaneMutSlice<'_, T>, src: &PlaneSlice<'_, T>,
    params: &ConvolveParams,
  ) {
    rust::convolve8(dst, src, params, true);
  }
}

/// The reference convolution backend.
#[derive(Clone, Copy, Debug, Default)]
pub struct RustConvolve;

impl<T: Pixel> ConvolveBackend<T> for RustConvolve {}

pub(crate) mod rust {
  use super::*;

  /// Largest intermediate the 2-D filter needs: 64 output rows at a 2:1
  /// step, plus the taps.
  const MAX_INTERMEDIATE_H: usize = (64 - 1) * 32 / 16 + 1 + SUBPEL_TAPS;

  #[inline(always)]
  fn filter_sum<F: Fn(usize) -> i32>(taps: &[i16; SUBPEL_TAPS], f: F) -> i32 {
    taps.iter().enumerate().map(|(k, &t)| t as i32 * f(k)).sum()
  }

  #[inline(always)]
  fn average<T: Pixel>(a: T, b: T) -> T {
    let a: i32 = a.into();
    let b: i32 = b.into();
    T::cast_from(round_shift(a + b, 1))
  }

  #[inline(always)]
  fn is_identity(kernel: &InterpKernel, phase_q4: i32, step_q4: i32) -> bool {
    step_q4 == 16
      && phase_q4 & SUBPEL_MASK == 0
      && kernel[0] == IDENTITY_TAPS
  }

  pub fn convolve_copy<T: Pixel>(
    dst: &mut PlaneMutSlice<'_, T>, src: &PlaneSlice<'_, T>, w: usize,
    h: usize,
  ) {
    for r in 0..h {
      dst[r][..w].copy_from_slice(&src[r][..w]);
    }
  }

  pub fn convolve_avg<T: Pixel>(
    dst: &mut PlaneMutSlice<'_, T>, src: &PlaneSlice<'_, T>, w: usize,
    h: usize,
  ) {
    for r in 0..h {
      let s = &src[r][..w];
      for (d, &s) in dst[r][..w].iter_mut().zip(s) {
        *d = average(*d, s);
      }
    }
  }

  /// Horizontal pass over raw rows; `src` starts 3 samples left of the
  /// first filtered position.
  fn convolve_horiz_raw<T: Pixel>(
    src: &[T], src_stride: usize, dst: &mut [T], dst_stride: usize,
    kernel: &InterpKernel, x0_q4: i32, x_step_q4: i32, w: usize, h: usize,
    bit_depth: usize, avg: bool,
  ) {
    for y in 0..h {
      let s = &src[y * src_stride..];
      let d = &mut dst[y * dst_stride..y * dst_stride + w];
      let mut x_q4 = x0_q4;
      for px in d.iter_mut() {
        let sx = (x_q4 >> SUBPEL_BITS) as usize;
        let taps = &kernel[(x_q4 & SUBPEL_MASK) as usize];
        let sum = filter_sum(taps, |k| i32::cast_from(s[sx + k]));
        let v: T = clip_pixel(round_shift(sum, FILTER_BITS), bit_depth);
        *px = if avg { average(*px, v) } else { v };
        x_q4 += x_step_q4;
      }
    }
  }

  /// Vertical pass over raw rows; `src` starts 3 rows above the first
  /// filtered position.
  fn convolve_vert_raw<T: Pixel>(
    src: &[T], src_stride: usize, dst: &mut [T], dst_stride: usize,
    kernel: &InterpKernel, y0_q4: i32, y_step_q4: i32, w: usize, h: usize,
    bit_depth: usize, avg: bool,
  ) {
    let mut y_q4 = y0_q4;
    for y in 0..h {
      let sy = (y_q4 >> SUBPEL_BITS) as usize;
      let taps = &kernel[(y_q4 & SUBPEL_MASK) as usize];
      let d = &mut dst[y * dst_stride..y * dst_stride + w];
      for (x, px) in d.iter_mut().enumerate() {
        let sum =
          filter_sum(taps, |k| i32::cast_from(src[(sy + k) * src_stride + x]));
        let v: T = clip_pixel(round_shift(sum, FILTER_BITS), bit_depth);
        *px = if avg { average(*px, v) } else { v };
      }
      y_q4 += y_step_q4;
    }
  }

  #[inline]
  fn raw<'a, T: Pixel>(src: &PlaneSlice<'a, T>) -> (&'a [T], usize) {
    let cfg = &src.plane.cfg;
    let base = (cfg.yorigin as isize + src.y) as usize * cfg.stride
      + (cfg.xorigin as isize + src.x) as usize;
    (&src.plane.data[base..], cfg.stride)
  }

  #[inline]
  fn raw_mut<'a, 'b, T: Pixel>(
    dst: &'b mut PlaneMutSlice<'a, T>,
  ) -> (&'b mut [T], usize) {
    let stride = dst.plane.cfg.stride;
    let (x, y) = (dst.x, dst.y);
    let cfg = &dst.plane.cfg;
    let base = (cfg.yorigin as isize + y) as usize * stride
      + (cfg.xorigin as isize + x) as usize;
    (&mut dst.plane.data[base..], stride)
  }

  pub fn convolve8_horiz<T: Pixel>(
    dst: &mut PlaneMutSlice<'_, T>, src: &PlaneSlice<'_, T>,
    params: &ConvolveParams, avg: bool,
  ) {
    let ConvolveParams { kernel, x0_q4, x_step_q4, w, h, bit_depth, .. } =
      *params;
    if is_identity(kernel, x0_q4, x_step_q4) {
      let src = src.reslice((x0_q4 >> SUBPEL_BITS) as isize, 0);
      return if avg {
        convolve_avg(dst, &src, w, h)
      } else {
        convolve_copy(dst, &src, w, h)
      };
    }
    let (s, s_stride) = raw(&src.go_left(INTERP_EXTEND_BEFORE));
    let (d, d_stride) = raw_mut(dst);
    convolve_horiz_raw(
      s, s_stride, d, d_stride, kernel, x0_q4, x_step_q4, w, h, bit_depth,
      avg,
    );
  }

  pub fn convolve8_vert<T: Pixel>(
    dst: &mut PlaneMutSlice<'_, T>, src: &PlaneSlice<'_, T>,
    params: &ConvolveParams, avg: bool,
  ) {
    let ConvolveParams { kernel, y0_q4, y_step_q4, w, h, bit_depth, .. } =
      *params;
    if is_identity(kernel, y0_q4, y_step_q4) {
      let src = src.reslice(0, (y0_q4 >> SUBPEL_BITS) as isize);
      return if avg {
        convolve_avg(dst, &src, w, h)
      } else {
        convolve_copy(dst, &src, w, h)
      };
    }
    let (s, s_stride) = raw(&src.go_up(INTERP_EXTEND_BEFORE));
    let (d, d_stride) = raw_mut(dst);
    convolve_vert_raw(
      s, s_stride, d, d_stride, kernel, y0_q4, y_step_q4, w, h, bit_depth,
      avg,
    );
  }

  /// Two-pass filter: horizontal into an intermediate buffer, then
  /// vertical into `dst`.
  ///
  /// The intermediate keeps `((h - 1) * y_step_q4 + y0_q4) / 16 + 8` rows
  /// starting 3 rows above the block, which is `h + 7` when unscaled.
  pub fn convolve8<T: Pixel>(
    dst: &mut PlaneMutSlice<'_, T>, src: &PlaneSlice<'_, T>,
    params: &ConvolveParams, avg: bool,
  ) {
    let ConvolveParams {
      kernel,
      x0_q4,
      x_step_q4,
      y0_q4,
      y_step_q4,
      w,
      h,
      bit_depth,
    } = *params;
    let intermediate_height =
      ((((h as i32 - 1) * y_step_q4 + y0_q4) >> SUBPEL_BITS) as usize)
        + SUBPEL_TAPS;
    debug_assert!(intermediate_height <= MAX_INTERMEDIATE_H);

    let mut temp = [T::cast_from(0u8); 64 * MAX_INTERMEDIATE_H];
    let (s, s_stride) = raw(
      &src.go_left(INTERP_EXTEND_BEFORE).go_up(INTERP_EXTEND_BEFORE),
    );
    convolve_horiz_raw(
      s,
      s_stride,
      &mut temp,
      64,
      kernel,
      x0_q4,
      x_step_q4,
      w,
      intermediate_height,
      bit_depth,
      false,
    );
    let (d, d_stride) = raw_mut(dst);
    convolve_vert_raw(
      &temp, 64, d, d_stride, kernel, y0_q4, y_step_q4, w, h, bit_depth, avg,
    );
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use interpolate_name::interpolate_test;
  use pretty_assertions::assert_eq;
  use rand::{Rng, SeedableRng};
  use rand_chacha::ChaChaRng;

  fn random_plane(w: usize, h: usize, seed: u64) -> Plane<u8> {
    let mut ra = ChaChaRng::seed_from_u64(seed);
    let mut p = Plane::new(w, h, 0, 0, 16, 16);
    let mut s = p.as_mut_slice();
    for y in 0..h {
      for x in 0..w {
        s[y][x] = ra.gen();
      }
    }
    p.pad(w, h);
    p
  }

  fn block(p: &Plane<u8>, w: usize, h: usize) -> Vec<u8> {
    let s = p.as_slice();
    (0..h).flat_map(|y| s[y][..w].to_vec()).collect()
  }

  #[test]
  fn zero_phase_filters_equal_copy() {
    let src = random_plane(32, 32, 0);
    for fns in [ConvolveFn::Horiz, ConvolveFn::Vert, ConvolveFn::HorizVert] {
      for filter in [
        InterpFilter::EIGHTTAP,
        InterpFilter::EIGHTTAP_SHARP,
        InterpFilter::BILINEAR,
      ] {
        let mut dst = Plane::new(16, 16, 0, 0, 0, 0);
        let params =
          ConvolveParams::unscaled(filter.kernel(), 0, 0, 16, 16, 8);
        fns.dispatch(
          &RustConvolve,
          &mut dst.as_mut_slice(),
          &src.as_slice().reslice(4, 4),
          &params,
        );
        let expected: Vec<u8> = {
          let s = src.as_slice().reslice(4, 4);
          (0..16).flat_map(|y| s[y][..16].to_vec()).collect()
        };
        assert_eq!(expected, block(&dst, 16, 16));
      }
    }
  }

  #[test]
  fn filtered_values_stay_in_range() {
    let src = random_plane(64, 64, 1);
    for filter in [
      InterpFilter::EIGHTTAP,
      InterpFilter::EIGHTTAP_SMOOTH,
      InterpFilter::EIGHTTAP_SHARP,
    ] {
      for phase in 1..16 {
        let mut dst = Plane::<u16>::new(16, 16, 0, 0, 0, 0);
        let src16 = {
          let mut p = Plane::<u16>::new(64, 64, 0, 0, 16, 16);
          let mut s = p.as_mut_slice();
          for y in 0..64 {
            for x in 0..64 {
              s[y][x] = if (x + y) % 2 == 0 { 0 } else { 1023 };
            }
          }
          p.pad(64, 64);
          p
        };
        let params =
          ConvolveParams::unscaled(filter.kernel(), phase, phase, 16, 16, 10);
        ConvolveFn::HorizVert.dispatch(
          &RustConvolve,
          &mut dst.as_mut_slice(),
          &src16.as_slice().reslice(8, 8),
          &params,
        );
        assert!(dst.rows().flatten().all(|&v| v <= 1023));

        let mut dst8 = Plane::<u8>::new(16, 16, 0, 0, 0, 0);
        let params =
          ConvolveParams::unscaled(filter.kernel(), phase, 0, 16, 16, 8);
        ConvolveFn::Horiz.dispatch(
          &RustConvolve,
          &mut dst8.as_mut_slice(),
          &src.as_slice().reslice(8, 8),
          &params,
        );
        let taps = &filter.kernel()[phase as usize];
        for y in 0..16 {
          for x in 0..16 {
            let sum: i32 = (0..SUBPEL_TAPS)
              .map(|k| taps[k] as i32 * src.p(x + 5 + k, y + 8) as i32)
              .sum();
            let expected = ((sum + 64) >> 7).clamp(0, 255) as u8;
            assert_eq!(dst8.p(x, y), expected);
          }
        }
      }
    }
  }

  #[interpolate_test(regular, InterpFilter::EIGHTTAP)]
  #[interpolate_test(smooth, InterpFilter::EIGHTTAP_SMOOTH)]
  #[interpolate_test(sharp, InterpFilter::EIGHTTAP_SHARP)]
  #[interpolate_test(bilinear, InterpFilter::BILINEAR)]
  fn flat_block_is_preserved(filter: InterpFilter) {
    let mut src = Plane::<u8>::new(32, 32, 0, 0, 16, 16);
    src.data.fill(77);
    for phase in 0..16 {
      let mut dst = Plane::new(16, 16, 0, 0, 0, 0);
      let params = ConvolveParams::unscaled(
        filter.kernel(),
        phase,
        15 - phase,
        16,
        16,
        8,
      );
      ConvolveFn::HorizVert.dispatch(
        &RustConvolve,
        &mut dst.as_mut_slice(),
        &src.as_slice().reslice(8, 8),
        &params,
      );
      assert!(dst.rows().flatten().all(|&v| v == 77));
    }
  }

  #[test]
  fn avg_of_identical_blocks_is_identity() {
    let src = random_plane(16, 16, 2);
    let mut dst = src.clone();
    convolve_avg(&mut dst.as_mut_slice(), &src.as_slice(), 16, 16);
    assert_eq!(block(&src, 16, 16), block(&dst, 16, 16));
  }

  #[test]
  fn avg_is_commutative() {
    let a = random_plane(16, 16, 3);
    let b = random_plane(16, 16, 4);
    let mut ab = a.clone();
    convolve_avg(&mut ab.as_mut_slice(), &b.as_slice(), 16, 16);
    let mut ba = b.clone();
    convolve_avg(&mut ba.as_mut_slice(), &a.as_slice(), 16, 16);
    assert_eq!(block(&ab, 16, 16), block(&ba, 16, 16));
  }

  #[test]
  fn half_pel_bilinear_averages_neighbours() {
    let mut src = Plane::<u8>::new(8, 1, 0, 0, 8, 8);
    {
      let mut s = src.as_mut_slice();
      for x in 0..8 {
        s[0][x] = (x * 10) as u8;
      }
    }
    src.pad(8, 1);
    let mut dst = Plane::new(4, 1, 0, 0, 0, 0);
    let params = ConvolveParams::unscaled(&BILINEAR_FILTERS, 8, 0, 4, 1, 8);
    ConvolveFn::Horiz.dispatch(
      &RustConvolve,
      &mut dst.as_mut_slice(),
      &src.as_slice(),
      &params,
    );
    assert_eq!(block(&dst, 4, 1), vec![5, 15, 25, 35]);
  }

  #[test]
  fn scaled_step_skips_samples() {
    let mut src = Plane::<u8>::new(16, 1, 0, 0, 8, 8);
    {
      let mut s = src.as_mut_slice();
      for x in 0..16 {
        s[0][x] = (x * 4) as u8;
      }
    }
    src.pad(16, 1);
    let mut dst = Plane::new(4, 1, 0, 0, 0, 0);
    let params = ConvolveParams {
      kernel: &SUB_PEL_FILTERS_8,
      x0_q4: 0,
      x_step_q4: 32,
      y0_q4: 0,
      y_step_q4: 16,
      w: 4,
      h: 1,
      bit_depth: 8,
    };
    ConvolveFn::Horiz.dispatch(
      &RustConvolve,
      &mut dst.as_mut_slice(),
      &src.as_slice(),
      &params,
    );
    assert_eq!(block(&dst, 4, 1), vec![0, 8, 16, 24]);
  }

  #[test]
  fn mv_precision_lowering() {
    let mv = MotionVector::new(3, -5);
    assert_eq!(mv.lower_precision(true), mv);
    assert_eq!(mv.lower_precision(false), MotionVector::new(2, -4));
    let far = MotionVector::new(129, 64);
    assert!(!far.use_mv_hp());
    assert_eq!(far.lower_precision(true), MotionVector::new(128, 64));
    assert_eq!(MotionVector::new(0, 3).joint(), MvJoint::MV_JOINT_HNZVZ);
    assert_eq!(MotionVector::new(-1, 0).joint(), MvJoint::MV_JOINT_HZVNZ);
  }
}
