// Copyright (c) 2017-2018, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use crate::frame::*;
use crate::util::*;

/// Side of the square scratch area used to rebuild reference windows; large
/// enough for a 64-wide block read at a 2:1 step plus the filter taps.
pub const MC_BUF_SIZE: usize = 64 * 2 + 32;

/// Copies a `b_w` x `b_h` window whose top-left corner is `(x, y)` in
/// `src` into `dst`, replicating the outermost samples of the
/// `frame_w` x `frame_h` visible area wherever the window leaves it.
pub fn extend_border<T: Pixel>(
  src: &Plane<T>, x: isize, y: isize, b_w: usize, b_h: usize,
  frame_w: usize, frame_h: usize, dst: &mut PlaneMutSlice<'_, T>,
) {
  debug_assert!(frame_w > 0 && frame_h > 0);
  let b_w_i = b_w as isize;
  let w = frame_w as isize;
  let h = frame_h as isize;
  let frame = src.as_slice();

  for r in 0..b_h {
    let ry = clamp(y + r as isize, 0, h - 1) as usize;
    let ref_row = &frame[ry];
    let left = clamp(-x, 0, b_w_i) as usize;
    let right = clamp(x + b_w_i - w, 0, b_w_i) as usize;
    let copy = b_w - left - right;
    let d = &mut dst[r][..b_w];

    if left > 0 {
      d[..left].fill(ref_row[0]);
    }
    if copy > 0 {
      let start = (x + left as isize) as usize;
      d[left..left + copy].copy_from_slice(&ref_row[start..start + copy]);
    }
    if right > 0 {
      d[left + copy..].fill(ref_row[frame_w - 1]);
    }
  }
}

/// Per-worker scratch for reference windows that leave the frame.
///
/// Owned by one tile and reused for every prediction it builds.
#[derive(Debug, Clone)]
pub struct McBuffer<T: Pixel> {
  plane: Plane<T>,
}

impl<T: Pixel> Default for McBuffer<T> {
  fn default() -> Self {
    McBuffer { plane: Plane::new(MC_BUF_SIZE, MC_BUF_SIZE, 0, 0, 0, 0) }
  }
}

impl<T: Pixel> McBuffer<T> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Rebuilds the window of `src` at `(x, y)` and returns a view of it.
  pub fn build(
    &mut self, src: &Plane<T>, x: isize, y: isize, b_w: usize, b_h: usize,
    frame_w: usize, frame_h: usize,
  ) -> PlaneSlice<'_, T> {
    debug_assert!(b_w <= MC_BUF_SIZE && b_h <= MC_BUF_SIZE);
    extend_border(
      src,
      x,
      y,
      b_w,
      b_h,
      frame_w,
      frame_h,
      &mut self.plane.as_mut_slice(),
    );
    self.plane.as_slice()
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use pretty_assertions::assert_eq;

  fn ramp(w: usize, h: usize) -> Plane<u8> {
    let mut p = Plane::new(w, h, 0, 0, 0, 0);
    let mut s = p.as_mut_slice();
    for y in 0..h {
      for x in 0..w {
        s[y][x] = (y * w + x) as u8;
      }
    }
    p
  }

  fn window(p: PlaneSlice<'_, u8>, w: usize, h: usize) -> Vec<Vec<u8>> {
    (0..h).map(|y| p[y][..w].to_vec()).collect()
  }

  #[test]
  fn inside_window_is_plain_copy() {
    let src = ramp(8, 8);
    let mut buf = McBuffer::new();
    let got = window(buf.build(&src, 2, 3, 4, 2, 8, 8), 4, 2);
    assert_eq!(got, vec![vec![26, 27, 28, 29], vec![34, 35, 36, 37]]);
  }

  #[test]
  fn top_left_corner_replicates_first_sample() {
    let src = ramp(64, 64);
    let mut buf = McBuffer::new();
    let got = window(buf.build(&src, -3, -3, 8, 8, 64, 64), 8, 8);
    let s = src.as_slice();
    for y in 0..3 {
      for x in 0..3 {
        assert_eq!(got[y][x], s[0][0]);
      }
    }
    for y in 3..8 {
      assert_eq!(&got[y][3..8], &s[y - 3][0..5]);
    }
    // The replicated strips next to the corner.
    for i in 3..8 {
      assert_eq!(got[0][i], s[0][i - 3]);
      assert_eq!(got[i][0], s[i - 3][0]);
    }
  }

  #[test]
  fn straddling_bottom_right() {
    let src = ramp(8, 8);
    let mut buf = McBuffer::new();
    let got = window(buf.build(&src, 6, 6, 4, 4, 8, 8), 4, 4);
    assert_eq!(
      got,
      vec![
        vec![54, 55, 55, 55],
        vec![62, 63, 63, 63],
        vec![62, 63, 63, 63],
        vec![62, 63, 63, 63],
      ]
    );
  }

  #[test]
  fn window_entirely_outside_repeats_edge() {
    let src = ramp(8, 8);
    let mut buf = McBuffer::new();
    let got = window(buf.build(&src, 20, -10, 3, 2, 8, 8), 3, 2);
    assert_eq!(got, vec![vec![7, 7, 7], vec![7, 7, 7]]);
  }
}
