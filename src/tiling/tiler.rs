// Copyright (c) 2019, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use crate::partition::*;
use crate::util::*;

pub const MAX_TILE_ROWS_LOG2: usize = 2;

/// Tiling information
///
/// A frame is split into horizontal strips of whole superblock rows. Each
/// strip is encoded independently: no context, candidate vector or intra
/// edge crosses a strip boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilingInfo {
  pub frame_width: usize,
  pub frame_height: usize,
  pub mi_rows: usize,
  pub mi_cols: usize,
  pub sb_rows: usize,
  pub sb_cols: usize,
  pub tile_height_sb: usize,
  pub rows: usize, // number of rows of tiles within the whole frame
}

/// Mode info bounds of one tile, end exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TileInfo {
  pub mi_row_start: usize,
  pub mi_row_end: usize,
  pub mi_col_start: usize,
  pub mi_col_end: usize,
}

impl TileInfo {
  /// Top mode info row of every superblock row of the tile.
  pub fn sb_row_starts(&self) -> impl Iterator<Item = usize> {
    (self.mi_row_start..self.mi_row_end).step_by(MI_BLOCK_SIZE)
  }

  /// Left mode info column of every superblock of a row.
  pub fn sb_col_starts(&self) -> impl Iterator<Item = usize> {
    (self.mi_col_start..self.mi_col_end).step_by(MI_BLOCK_SIZE)
  }
}

impl TilingInfo {
  pub fn new(
    frame_width: usize, frame_height: usize, tile_rows_log2: usize,
  ) -> Self {
    let mi_cols = frame_width.align_power_of_two_and_shift(MI_SIZE_LOG2);
    let mi_rows = frame_height.align_power_of_two_and_shift(MI_SIZE_LOG2);
    let sb_cols = mi_cols.align_power_of_two_and_shift(MI_BLOCK_SIZE_LOG2);
    let sb_rows = mi_rows.align_power_of_two_and_shift(MI_BLOCK_SIZE_LOG2);

    let max_tile_rows_log2 =
      Self::tile_log2(1, sb_rows).min(MAX_TILE_ROWS_LOG2);
    let tile_rows_log2 = tile_rows_log2.min(max_tile_rows_log2);
    let tile_height_sb = sb_rows.align_power_of_two_and_shift(tile_rows_log2);
    let rows = (sb_rows + tile_height_sb - 1) / tile_height_sb;

    Self {
      frame_width,
      frame_height,
      mi_rows,
      mi_cols,
      sb_rows,
      sb_cols,
      tile_height_sb,
      rows,
    }
  }

  /// Return the smallest value for `k` such that `blk_size << k` is greater
  /// than or equal to `target`.
  fn tile_log2(blk_size: usize, target: usize) -> usize {
    let mut k = 0;
    while (blk_size << k) < target {
      k += 1;
    }
    k
  }

  #[inline(always)]
  pub fn tile_count(&self) -> usize {
    self.rows
  }

  /// Height of a full tile in mode info rows.
  #[inline(always)]
  pub fn tile_height_mi(&self) -> usize {
    self.tile_height_sb << MI_BLOCK_SIZE_LOG2
  }

  pub fn tile_info(&self, row: usize) -> TileInfo {
    debug_assert!(row < self.rows);
    let mi_row_start = row * self.tile_height_mi();
    TileInfo {
      mi_row_start,
      mi_row_end: (mi_row_start + self.tile_height_mi()).min(self.mi_rows),
      mi_col_start: 0,
      mi_col_end: self.mi_cols,
    }
  }

  pub fn tile_iter(&self) -> impl Iterator<Item = TileInfo> + '_ {
    (0..self.rows).map(move |row| self.tile_info(row))
  }
}

#[cfg(test)]
pub mod test {
  use super::*;

  #[test]
  fn from_target_tiles_1080p() {
    let ti = TilingInfo::new(1920, 1080, 2);
    assert_eq!(ti.mi_cols, 240);
    assert_eq!(ti.mi_rows, 135);
    assert_eq!(ti.sb_rows, 17);
    assert_eq!(ti.tile_height_sb, 5);
    assert_eq!(ti.rows, 4);
    let last = ti.tile_info(3);
    assert_eq!(last.mi_row_start, 120);
    assert_eq!(last.mi_row_end, 135);
  }

  #[test]
  fn tile_rows_limited_by_frame() {
    let ti = TilingInfo::new(64, 64, 2);
    assert_eq!(ti.tile_count(), 1);
    let ti = TilingInfo::new(160, 130, 5);
    assert_eq!(ti.sb_rows, 3);
    assert_eq!(ti.tile_height_sb, 1);
    assert_eq!(ti.tile_count(), 3);
  }

  #[test]
  fn tiles_cover_frame_without_overlap() {
    let ti = TilingInfo::new(352, 288, 1);
    let tiles: Vec<_> = ti.tile_iter().collect();
    assert_eq!(tiles[0].mi_row_start, 0);
    for pair in tiles.windows(2) {
      assert_eq!(pair[0].mi_row_end, pair[1].mi_row_start);
    }
    assert_eq!(tiles.last().map(|t| t.mi_row_end), Some(ti.mi_rows));
    assert_eq!(tiles[0].sb_col_starts().count(), ti.sb_cols);
    assert_eq!(tiles[0].sb_row_starts().collect::<Vec<_>>(), vec![0, 8, 16]);
  }
}
