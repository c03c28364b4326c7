// Copyright (c) 2019-2022, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use super::*;

use crate::border::McBuffer;
use crate::context::*;
use crate::frame::*;
use crate::mc::MotionVector;
use crate::partition::*;
use crate::rdo::CodedBlock;
use crate::util::*;

use std::ops::Range;

/// Everything one tile worker owns while it encodes its strip.
///
/// # `TileStateMut` fields
///
/// The source is shared by every worker and only read. The mode info rows
/// of the strip are borrowed exclusively from the frame grid.
///
/// `rec` and `pred` span the whole frame so that block positions never need
/// translating; only the rows of this tile are ever written, and only
/// those rows are copied into the output once all workers are done.
#[derive(Debug)]
pub struct TileStateMut<'a, T: Pixel> {
  pub tile: TileInfo,
  pub input: &'a Frame<T>,
  pub mi: TileModeInfo<'a>,
  pub bc: BlockContext,
  pub rec: Frame<T>,
  pub pred: Frame<T>,
  pub mc_buf: McBuffer<T>,
  /// Vectors found by the last NEWMV search at the enclosing block size,
  /// indexed by `RefType`.
  pub pred_mv: [MotionVector; TOTAL_REFS_PER_FRAME],
  pub min_partition_size: BlockSize,
  pub max_partition_size: BlockSize,
  /// Leaves committed by the final pass over each superblock, in coding
  /// order.
  pub coded: Vec<CodedBlock>,
}

impl<'a, T: Pixel> TileStateMut<'a, T> {
  pub fn new(
    tile: TileInfo, input: &'a Frame<T>, mi: TileModeInfo<'a>,
  ) -> Self {
    let chroma_sampling = input.chroma_sampling();
    let (w, h) = (input.width(), input.height());
    debug_assert_eq!(mi.mi_row_start, tile.mi_row_start);
    let mut bc = BlockContext::new(tile.mi_col_end, chroma_sampling);
    bc.reset_above_context();
    TileStateMut {
      tile,
      input,
      mi,
      bc,
      rec: Frame::new(w, h, chroma_sampling),
      pred: Frame::new(w, h, chroma_sampling),
      mc_buf: McBuffer::new(),
      pred_mv: [MotionVector::ZERO; TOTAL_REFS_PER_FRAME],
      min_partition_size: BlockSize::BLOCK_4X4,
      max_partition_size: BlockSize::BLOCK_64X64,
      coded: Vec::new(),
    }
  }

  /// Visible rows of plane `pli` this tile reconstructs.
  pub fn plane_rows(&self, pli: usize) -> Range<usize> {
    let p = &self.rec.planes[pli].cfg;
    let start = (self.tile.mi_row_start * MI_SIZE) >> p.ydec;
    let end = ((self.tile.mi_row_end * MI_SIZE) >> p.ydec).min(p.height);
    start.min(end)..end
  }

  /// Whether the mode info row above `mi_row` belongs to this tile.
  #[inline]
  pub fn has_above(&self, mi_row: usize) -> bool {
    mi_row > self.tile.mi_row_start
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::color::ChromaSampling;

  #[test]
  fn plane_rows_follow_decimation() {
    let input = Frame::<u8>::new(64, 100, ChromaSampling::Cs420);
    let ti = TilingInfo::new(64, 100, 0);
    let mut grid = ModeInfoGrid::new(ti.mi_rows, ti.mi_cols);
    let mut views = grid.tile_views_mut(ti.tile_height_mi());
    let tile = ti.tile_info(0);
    let ts = TileStateMut::new(tile, &input, views.remove(0));
    assert_eq!(ts.plane_rows(0), 0..100);
    assert_eq!(ts.plane_rows(1), 0..50);
    assert!(!ts.has_above(0));
    assert!(ts.has_above(1));
  }
}
