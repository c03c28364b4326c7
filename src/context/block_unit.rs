// Copyright (c) 2017-2023, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use super::*;

/// Mode and vectors of one 4x4 sub-block of a sub-8x8 block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BModeInfo {
  pub mode: PredictionMode,
  pub mv: [MotionVector; 2],
}

/// Everything the encoder decided for one 8x8 cell of the frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModeInfo {
  pub sb_type: BlockSize,
  pub mode: PredictionMode,
  pub uv_mode: PredictionMode,
  pub ref_frame: [RefType; 2],
  pub mv: [MotionVector; 2],
  /// Sub-block modes, in raster order; only meaningful below 8x8.
  pub bmi: [BModeInfo; 4],
  pub tx_size: TxSize,
  pub skip: bool,
  pub interp_filter: InterpFilter,
  /// Mode context of each reference, indexed by `RefType`.
  pub mode_context: [u8; TOTAL_REFS_PER_FRAME],
}

impl Default for ModeInfo {
  fn default() -> Self {
    ModeInfo {
      sb_type: BlockSize::BLOCK_8X8,
      mode: PredictionMode::DC_PRED,
      uv_mode: PredictionMode::DC_PRED,
      ref_frame: [INTRA_FRAME, NONE_FRAME],
      mv: [MotionVector::ZERO; 2],
      bmi: [BModeInfo::default(); 4],
      tx_size: TxSize::TX_4X4,
      skip: false,
      interp_filter: InterpFilter::EIGHTTAP,
      mode_context: [0; TOTAL_REFS_PER_FRAME],
    }
  }
}

impl ModeInfo {
  #[inline]
  pub fn is_inter_block(&self) -> bool {
    self.ref_frame[0].is_inter()
  }

  #[inline]
  pub fn has_second_ref(&self) -> bool {
    self.ref_frame[1].is_inter()
  }

  /// Vector of sub-block `block` for reference `which`, or the block vector
  /// when the block is not split.
  #[inline]
  pub fn sub_block_mv(&self, which: usize, block: usize) -> MotionVector {
    if self.sb_type.is_sub8x8() {
      self.bmi[block].mv[which]
    } else {
      self.mv[which]
    }
  }

  /// Copies the vectors and mode of the last sub-block into the block
  /// level fields, as a sub-8x8 block is seen by its neighbours.
  pub fn finalize_sub8x8(&mut self) {
    if self.sb_type.is_sub8x8() {
      self.mode = self.bmi[3].mode;
      self.mv = self.bmi[3].mv;
    }
  }
}

/// Frame-wide mode info, one entry per 8x8 cell.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModeInfoGrid {
  pub mi_rows: usize,
  pub mi_cols: usize,
  data: Vec<ModeInfo>,
}

impl ModeInfoGrid {
  pub fn new(mi_rows: usize, mi_cols: usize) -> Self {
    ModeInfoGrid {
      mi_rows,
      mi_cols,
      data: vec![ModeInfo::default(); mi_rows * mi_cols],
    }
  }

  #[inline]
  pub fn get(&self, mi_row: usize, mi_col: usize) -> &ModeInfo {
    &self.data[mi_row * self.mi_cols + mi_col]
  }

  /// Splits the grid into disjoint views of `rows_per_chunk` mode info rows
  /// each, one per tile row.
  pub fn tile_views_mut(
    &mut self, rows_per_chunk: usize,
  ) -> Vec<TileModeInfo<'_>> {
    let mi_cols = self.mi_cols;
    self
      .data
      .chunks_mut(rows_per_chunk * mi_cols)
      .enumerate()
      .map(|(i, data)| TileModeInfo {
        mi_row_start: i * rows_per_chunk,
        mi_rows: data.len() / mi_cols,
        mi_cols,
        data,
      })
      .collect()
  }

  pub fn iter(&self) -> impl Iterator<Item = &ModeInfo> {
    self.data.iter()
  }
}

/// Mutable view of the mode info rows of one tile.
#[derive(Debug)]
pub struct TileModeInfo<'a> {
  pub mi_row_start: usize,
  pub mi_rows: usize,
  pub mi_cols: usize,
  data: &'a mut [ModeInfo],
}

impl<'a> TileModeInfo<'a> {
  /// Builds a view over a standalone buffer; used by tests and benches.
  pub fn from_slice(
    data: &'a mut [ModeInfo], mi_row_start: usize, mi_cols: usize,
  ) -> Self {
    let mi_rows = data.len() / mi_cols;
    TileModeInfo { mi_row_start, mi_rows, mi_cols, data }
  }

  #[inline]
  pub fn mi_row_end(&self) -> usize {
    self.mi_row_start + self.mi_rows
  }

  /// Mode info at absolute position `(mi_row, mi_col)`, which must lie in
  /// this tile.
  #[inline]
  pub fn get(&self, mi_row: usize, mi_col: usize) -> &ModeInfo {
    debug_assert!(mi_row >= self.mi_row_start && mi_row < self.mi_row_end());
    &self.data[(mi_row - self.mi_row_start) * self.mi_cols + mi_col]
  }

  #[inline]
  pub fn get_mut(&mut self, mi_row: usize, mi_col: usize) -> &mut ModeInfo {
    debug_assert!(mi_row >= self.mi_row_start && mi_row < self.mi_row_end());
    &mut self.data[(mi_row - self.mi_row_start) * self.mi_cols + mi_col]
  }

  /// Mode info at a signed offset from `(mi_row, mi_col)` when it lies in
  /// this tile.
  #[inline]
  pub fn neighbour(
    &self, mi_row: usize, mi_col: usize, row_off: isize, col_off: isize,
  ) -> Option<&ModeInfo> {
    let r = mi_row as isize + row_off;
    let c = mi_col as isize + col_off;
    if r < self.mi_row_start as isize
      || r >= self.mi_row_end() as isize
      || c < 0
      || c >= self.mi_cols as isize
    {
      return None;
    }
    Some(self.get(r as usize, c as usize))
  }

  /// Writes `mi` into every cell covered by a `bsize` block, clipped to the
  /// tile.
  pub fn set_block(
    &mut self, mi_row: usize, mi_col: usize, bsize: BlockSize, mi: &ModeInfo,
  ) {
    let y_mis = bsize.height_mi().min(self.mi_row_end() - mi_row);
    let x_mis = bsize.width_mi().min(self.mi_cols - mi_col);
    for r in mi_row..mi_row + y_mis {
      for c in mi_col..mi_col + x_mis {
        *self.get_mut(r, c) = *mi;
      }
    }
  }
}

/// Distance from a block to the frame edges, in 1/8 pel. Positive values
/// mean the edge lies beyond the block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MbEdges {
  pub to_left: i32,
  pub to_right: i32,
  pub to_top: i32,
  pub to_bottom: i32,
}

impl MbEdges {
  pub fn new(
    mi_row: usize, mi_col: usize, bsize: BlockSize, mi_rows: usize,
    mi_cols: usize,
  ) -> Self {
    let bh = bsize.height_mi() as i32;
    let bw = bsize.width_mi() as i32;
    let (mi_row, mi_col) = (mi_row as i32, mi_col as i32);
    let mi_size = MI_SIZE as i32;
    MbEdges {
      to_top: -((mi_row * mi_size) * 8),
      to_bottom: ((mi_rows as i32 - bh - mi_row) * mi_size) * 8,
      to_left: -((mi_col * mi_size) * 8),
      to_right: ((mi_cols as i32 - bw - mi_col) * mi_size) * 8,
    }
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn tile_views_cover_disjoint_rows() {
    let mut grid = ModeInfoGrid::new(10, 4);
    {
      let mut views = grid.tile_views_mut(8);
      assert_eq!(views.len(), 2);
      assert_eq!(views[1].mi_row_start, 8);
      assert_eq!(views[1].mi_rows, 2);
      let mi = ModeInfo { skip: true, ..Default::default() };
      views[1].set_block(8, 2, BlockSize::BLOCK_64X64, &mi);
      assert!(views[1].neighbour(9, 3, -2, 0).is_none());
      assert!(views[1].neighbour(9, 3, 0, 1).is_none());
      assert!(views[1].neighbour(9, 3, -1, -1).is_some());
    }
    assert!(grid.get(9, 3).skip);
    assert!(grid.get(8, 2).skip);
    assert!(!grid.get(8, 1).skip);
    assert!(!grid.get(7, 3).skip);
  }

  #[test]
  fn edges_at_frame_corners() {
    let e = MbEdges::new(0, 0, BlockSize::BLOCK_16X16, 8, 8);
    assert_eq!(e.to_left, 0);
    assert_eq!(e.to_top, 0);
    assert_eq!(e.to_right, 6 * 8 * 8);
    let e = MbEdges::new(7, 7, BlockSize::BLOCK_16X16, 8, 8);
    assert_eq!(e.to_right, -64);
    assert_eq!(e.to_bottom, -64);
    assert_eq!(e.to_left, -7 * 64);
  }
}
