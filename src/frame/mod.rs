// Copyright (c) 2018-2019, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use crate::api::ChromaSampling;
use crate::util::*;

mod plane;
pub use plane::*;

/// Luma border kept around reference frames, wide enough for the largest
/// motion vector reach plus the interpolation taps.
pub const FRAME_BORDER: usize = 160;

/// One video frame.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Frame<T: Pixel> {
  /// Planes constituting the frame.
  pub planes: [Plane<T>; 3],
}

impl<T: Pixel> Frame<T> {
  /// Creates a new frame with the given parameters and the default
  /// reference border.
  pub fn new(
    width: usize, height: usize, chroma_sampling: ChromaSampling,
  ) -> Self {
    Self::new_with_padding(width, height, chroma_sampling, FRAME_BORDER)
  }

  /// Creates a new frame with `luma_padding` pixels on every side of the
  /// luma plane; chroma padding follows the decimation.
  pub fn new_with_padding(
    width: usize, height: usize, chroma_sampling: ChromaSampling,
    luma_padding: usize,
  ) -> Self {
    let (xdec, ydec) = chroma_sampling.get_decimation();
    let (chroma_width, chroma_height) =
      chroma_sampling.get_chroma_dimensions(width, height);
    let chroma_padding_x = luma_padding >> xdec;
    let chroma_padding_y = luma_padding >> ydec;

    let chroma = || {
      Plane::new(
        chroma_width,
        chroma_height,
        xdec,
        ydec,
        chroma_padding_x,
        chroma_padding_y,
      )
    };

    Frame {
      planes: [
        Plane::new(width, height, 0, 0, luma_padding, luma_padding),
        chroma(),
        chroma(),
      ],
    }
  }

  /// Replicates the visible edges of every plane into its border.
  pub fn pad(&mut self) {
    let PlaneConfig { width, height, .. } = self.planes[0].cfg;
    for p in self.planes.iter_mut() {
      p.pad(width, height);
    }
  }

  #[inline(always)]
  pub fn chroma_sampling(&self) -> ChromaSampling {
    let cfg = &self.planes[1].cfg;
    ChromaSampling::from_decimation(cfg.xdec, cfg.ydec)
  }

  #[inline(always)]
  pub fn width(&self) -> usize {
    self.planes[0].cfg.width
  }

  #[inline(always)]
  pub fn height(&self) -> usize {
    self.planes[0].cfg.height
  }

  /// Fills every visible sample of every plane with `f(plane, x, y)`.
  pub fn fill_with<F: FnMut(usize, usize, usize) -> T>(&mut self, mut f: F) {
    for (pli, p) in self.planes.iter_mut().enumerate() {
      let PlaneConfig { width, height, .. } = p.cfg;
      let mut s = p.as_mut_slice();
      for y in 0..height {
        let row = &mut s[y];
        for x in 0..width {
          row[x] = f(pli, x, y);
        }
      }
    }
  }
}
