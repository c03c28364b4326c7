// Copyright (c) 2018-2020, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use crate::serialize::*;

/// Chroma subsampling format
#[derive(
  Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize,
)]
pub enum ChromaSampling {
  /// Both vertically and horizontally subsampled.
  #[default]
  Cs420,
  /// Horizontally subsampled.
  Cs422,
  /// Vertically subsampled.
  Cs440,
  /// Not subsampled.
  Cs444,
}

impl ChromaSampling {
  /// Provides the amount to right shift the luma plane dimensions to get the
  ///  chroma plane dimensions.
  /// Only values 0 or 1 are ever returned.
  pub const fn get_decimation(self) -> (usize, usize) {
    use self::ChromaSampling::*;
    match self {
      Cs420 => (1, 1),
      Cs422 => (1, 0),
      Cs440 => (0, 1),
      Cs444 => (0, 0),
    }
  }

  /// The sampling whose chroma planes have the given decimation.
  pub const fn from_decimation(xdec: usize, ydec: usize) -> Self {
    use self::ChromaSampling::*;
    match (xdec, ydec) {
      (1, 1) => Cs420,
      (1, 0) => Cs422,
      (0, 1) => Cs440,
      _ => Cs444,
    }
  }

  /// Calculates the size of a chroma plane for this sampling type, given the
  /// luma plane dimensions.
  pub const fn get_chroma_dimensions(
    self, luma_width: usize, luma_height: usize,
  ) -> (usize, usize) {
    let (ss_x, ss_y) = self.get_decimation();
    ((luma_width + ss_x) >> ss_x, (luma_height + ss_y) >> ss_y)
  }
}
