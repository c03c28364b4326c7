// Copyright (c) 2017-2018, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use std::fmt::{Debug, Formatter};
use std::ops::{Index, IndexMut, Range};

use crate::util::*;

/// Plane-specific configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaneConfig {
  pub stride: usize,
  pub alloc_height: usize,
  pub width: usize,
  pub height: usize,
  pub xdec: usize,
  pub ydec: usize,
  pub xpad: usize,
  pub ypad: usize,
  pub xorigin: usize,
  pub yorigin: usize,
}

/// Absolute offset in pixels inside a plane
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlaneOffset {
  pub x: isize,
  pub y: isize,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Plane<T: Pixel> {
  pub data: Vec<T>,
  pub cfg: PlaneConfig,
}

impl<T: Pixel> Debug for Plane<T> {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "Plane {{ data: [{:?}, ...], cfg: {:?} }}",
      self.data.first(),
      self.cfg
    )
  }
}

impl<T: Pixel> Plane<T> {
  /// Stride alignment in pixels, log2.
  const STRIDE_ALIGNMENT_LOG2: usize = 4;

  pub fn new(
    width: usize, height: usize, xdec: usize, ydec: usize, xpad: usize,
    ypad: usize,
  ) -> Self {
    let xorigin = xpad.align_power_of_two(3);
    let yorigin = ypad;
    let stride = (xorigin + width + xpad)
      .align_power_of_two(Self::STRIDE_ALIGNMENT_LOG2);
    let alloc_height = yorigin + height + ypad;
    let data = vec![T::cast_from(128u8); stride * alloc_height];
    Plane {
      data,
      cfg: PlaneConfig {
        stride,
        alloc_height,
        width,
        height,
        xdec,
        ydec,
        xpad,
        ypad,
        xorigin,
        yorigin,
      },
    }
  }

  /// Replicates the outermost visible samples into the padding, given the
  /// luma dimensions `w` x `h` of the content.
  pub fn pad(&mut self, w: usize, h: usize) {
    let PlaneConfig { stride, alloc_height, xorigin, yorigin, .. } = self.cfg;
    let width = (w + self.cfg.xdec) >> self.cfg.xdec;
    let height = (h + self.cfg.ydec) >> self.cfg.ydec;
    let right = xorigin + width;

    for row in self.data.chunks_exact_mut(stride).skip(yorigin).take(height)
    {
      let (first, last) = (row[xorigin], row[right - 1]);
      row[..xorigin].fill(first);
      row[right..].fill(last);
    }

    let top = yorigin * stride;
    let bottom = (yorigin + height) * stride;
    for y in 0..yorigin {
      self.data.copy_within(top..top + stride, y * stride);
    }
    for y in yorigin + height..alloc_height {
      self.data.copy_within(bottom - stride..bottom, y * stride);
    }
  }

  pub fn slice(&self, po: PlaneOffset) -> PlaneSlice<'_, T> {
    PlaneSlice { plane: self, x: po.x, y: po.y }
  }

  pub fn mut_slice(&mut self, po: PlaneOffset) -> PlaneMutSlice<'_, T> {
    PlaneMutSlice { plane: self, x: po.x, y: po.y }
  }

  pub fn as_slice(&self) -> PlaneSlice<'_, T> {
    self.slice(PlaneOffset { x: 0, y: 0 })
  }

  pub fn as_mut_slice(&mut self) -> PlaneMutSlice<'_, T> {
    self.mut_slice(PlaneOffset { x: 0, y: 0 })
  }

  #[inline]
  fn index(&self, x: usize, y: usize) -> usize {
    (y + self.cfg.yorigin) * self.cfg.stride + (x + self.cfg.xorigin)
  }

  #[inline]
  fn row_range(&self, x: isize, y: isize) -> Range<usize> {
    debug_assert!(self.cfg.yorigin as isize + y >= 0);
    debug_assert!(self.cfg.xorigin as isize + x >= 0);
    let base_y = (self.cfg.yorigin as isize + y) as usize;
    let base_x = (self.cfg.xorigin as isize + x) as usize;
    let base = base_y * self.cfg.stride + base_x;
    let width = self.cfg.stride - base_x;
    base..base + width
  }

  pub fn p(&self, x: usize, y: usize) -> T {
    self.data[self.index(x, y)]
  }

  /// Copies visible rows `rows` of `src`, a plane of the same geometry,
  /// into the same rows of `self`.
  pub fn copy_row_range_from(&mut self, src: &Plane<T>, rows: Range<usize>) {
    debug_assert_eq!(self.cfg.stride, src.cfg.stride);
    let w = src.cfg.width.min(self.cfg.width);
    for y in rows {
      let base = self.index(0, y);
      self.data[base..base + w].copy_from_slice(&src.data[base..base + w]);
    }
  }

  /// Iterates over the visible rows.
  pub fn rows(&self) -> impl Iterator<Item = &[T]> {
    let width = self.cfg.width;
    (0..self.cfg.height).map(move |y| {
      let base = self.index(0, y);
      &self.data[base..base + width]
    })
  }
}

#[derive(Clone, Copy, Debug)]
pub struct PlaneSlice<'a, T: Pixel> {
  pub plane: &'a Plane<T>,
  pub x: isize,
  pub y: isize,
}

impl<'a, T: Pixel> PlaneSlice<'a, T> {
  pub fn row(&self, y: usize) -> &'a [T] {
    let range = self.plane.row_range(self.x, self.y + y as isize);
    &self.plane.data[range]
  }

  /// Row `y` relative to the slice origin, which may lie above it.
  pub fn row_at(&self, y: isize) -> &'a [T] {
    let range = self.plane.row_range(self.x, self.y + y);
    &self.plane.data[range]
  }

  pub fn subslice(&self, xo: usize, yo: usize) -> PlaneSlice<'a, T> {
    PlaneSlice {
      plane: self.plane,
      x: self.x + xo as isize,
      y: self.y + yo as isize,
    }
  }

  pub fn reslice(&self, xo: isize, yo: isize) -> PlaneSlice<'a, T> {
    PlaneSlice { plane: self.plane, x: self.x + xo, y: self.y + yo }
  }

  /// A slice starting i pixels above the current one.
  pub fn go_up(&self, i: usize) -> PlaneSlice<'a, T> {
    PlaneSlice { plane: self.plane, x: self.x, y: self.y - i as isize }
  }

  /// A slice starting i pixels to the left of the current one.
  pub fn go_left(&self, i: usize) -> PlaneSlice<'a, T> {
    PlaneSlice { plane: self.plane, x: self.x - i as isize, y: self.y }
  }

  pub fn p(&self, add_x: usize, add_y: usize) -> T {
    let new_y =
      (self.y + add_y as isize + self.plane.cfg.yorigin as isize) as usize;
    let new_x =
      (self.x + add_x as isize + self.plane.cfg.xorigin as isize) as usize;
    self.plane.data[new_y * self.plane.cfg.stride + new_x]
  }
}

impl<'a, T: Pixel> Index<usize> for PlaneSlice<'a, T> {
  type Output = [T];
  fn index(&self, index: usize) -> &Self::Output {
    let range = self.plane.row_range(self.x, self.y + index as isize);
    &self.plane.data[range]
  }
}

#[derive(Debug)]
pub struct PlaneMutSlice<'a, T: Pixel> {
  pub plane: &'a mut Plane<T>,
  pub x: isize,
  pub y: isize,
}

impl<'a, T: Pixel> PlaneMutSlice<'a, T> {
  pub fn row(&self, y: usize) -> &[T] {
    let range = self.plane.row_range(self.x, self.y + y as isize);
    &self.plane.data[range]
  }

  pub fn row_mut(&mut self, y: usize) -> &mut [T] {
    let range = self.plane.row_range(self.x, self.y + y as isize);
    &mut self.plane.data[range]
  }

  /// Reborrows as an immutable slice at the same origin.
  pub fn as_const(&self) -> PlaneSlice<'_, T> {
    PlaneSlice { plane: self.plane, x: self.x, y: self.y }
  }

  pub fn p(&self, add_x: usize, add_y: usize) -> T {
    self.as_const().p(add_x, add_y)
  }

  /// Copies a `w` x `h` block from `src` to this slice.
  pub fn copy_from(&mut self, src: &PlaneSlice<'_, T>, w: usize, h: usize) {
    for y in 0..h {
      self.row_mut(y)[..w].copy_from_slice(&src.row(y)[..w]);
    }
  }
}

impl<'a, T: Pixel> Index<usize> for PlaneMutSlice<'a, T> {
  type Output = [T];
  fn index(&self, index: usize) -> &Self::Output {
    let range = self.plane.row_range(self.x, self.y + index as isize);
    &self.plane.data[range]
  }
}

impl<'a, T: Pixel> IndexMut<usize> for PlaneMutSlice<'a, T> {
  fn index_mut(&mut self, index: usize) -> &mut Self::Output {
    let range = self.plane.row_range(self.x, self.y + index as isize);
    &mut self.plane.data[range]
  }
}
