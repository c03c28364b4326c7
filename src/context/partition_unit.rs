// Copyright (c) 2017-2023, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use super::*;

/// Partition context values written for a block of each size:
/// `(above, left)`. A bit is cleared for every dimension that reaches
/// the corresponding square size.
static partition_context_lookup: [(u8, u8); BlockSize::BLOCK_SIZES] = [
  (15, 15), // 4X4
  (15, 14), // 4X8
  (14, 15), // 8X4
  (14, 14), // 8X8
  (14, 12), // 8X16
  (12, 14), // 16X8
  (12, 12), // 16X16
  (12, 8),  // 16X32
  (8, 12),  // 32X16
  (8, 8),   // 32X32
  (8, 0),   // 32X64
  (0, 8),   // 64X32
  (0, 0),   // 64X64
];

/// Number of 4x4 columns (and rows) in one superblock.
const SB_4X4: usize = MI_BLOCK_SIZE * 2;

/// Per-tile context stored along the top and left block edges.
#[derive(Clone, Debug)]
pub struct BlockContext {
  pub mi_cols: usize,
  pub chroma_sampling: ChromaSampling,
  above_seg_context: Vec<u8>,
  left_seg_context: [u8; MI_BLOCK_SIZE],
  /// Whether each 4x4 column above has coded coefficients, per plane.
  above_nonzero: [Vec<u8>; 3],
  left_nonzero: [[u8; SB_4X4]; 3],
}

/// The context a block can modify, saved so a trial encode can be
/// undone.
#[derive(Clone, Debug)]
pub struct BlockContextCheckpoint {
  mi_row: usize,
  mi_col: usize,
  above_seg_context: [u8; MI_BLOCK_SIZE],
  left_seg_context: [u8; MI_BLOCK_SIZE],
  above_nonzero: [[u8; SB_4X4]; 3],
  left_nonzero: [[u8; SB_4X4]; 3],
}

impl BlockContext {
  pub fn new(mi_cols: usize, chroma_sampling: ChromaSampling) -> Self {
    let (xdec, _) = chroma_sampling.get_decimation();
    let cols_4x4 = mi_cols * 2;
    BlockContext {
      mi_cols,
      chroma_sampling,
      above_seg_context: vec![0; mi_cols],
      left_seg_context: [0; MI_BLOCK_SIZE],
      above_nonzero: [
        vec![0; cols_4x4],
        vec![0; (cols_4x4 >> xdec).max(1)],
        vec![0; (cols_4x4 >> xdec).max(1)],
      ],
      left_nonzero: [[0; SB_4X4]; 3],
    }
  }

  /// Clears the above contexts; called at the start of each tile.
  pub fn reset_above_context(&mut self) {
    self.above_seg_context.fill(0);
    for plane in self.above_nonzero.iter_mut() {
      plane.fill(0);
    }
  }

  /// Clears the left contexts; called at the start of each superblock
  /// row.
  pub fn reset_left_context(&mut self) {
    self.left_seg_context = [0; MI_BLOCK_SIZE];
    self.left_nonzero = [[0; SB_4X4]; 3];
  }

  #[inline]
  fn decimation(&self, pli: usize) -> (usize, usize) {
    if pli == 0 {
      (0, 0)
    } else {
      self.chroma_sampling.get_decimation()
    }
  }

  /// Context for coding the partition of the `bsize` square at
  /// `(mi_row, mi_col)`.
  pub fn partition_plane_context(
    &self, mi_row: usize, mi_col: usize, bsize: BlockSize,
  ) -> usize {
    debug_assert!(bsize.is_sqr());
    let bsl = bsize.width_mi_log2();
    let bs = 1u8 << bsl;
    let end = (mi_col + bs as usize).min(self.mi_cols);
    let above = self.above_seg_context[mi_col..end]
      .iter()
      .fold(0, |acc, &v| acc | v);
    let lo = mi_row & MI_MASK;
    let left = self.left_seg_context
      [lo..(lo + bs as usize).min(MI_BLOCK_SIZE)]
      .iter()
      .fold(0, |acc, &v| acc | v);
    let above = ((above & bs) > 0) as usize;
    let left = ((left & bs) > 0) as usize;
    left * 2 + above + bsl * PARTITION_PLOFFSET
  }

  /// Records that a `subsize` block was coded at `(mi_row, mi_col)` as part
  /// of a `bsize` partition.
  pub fn update_partition_context(
    &mut self, mi_row: usize, mi_col: usize, subsize: BlockSize,
    bsize: BlockSize,
  ) {
    let bs = bsize.width_mi();
    let (above, left) = partition_context_lookup[subsize as usize];
    let end = (mi_col + bs).min(self.mi_cols);
    self.above_seg_context[mi_col..end].fill(above);
    let lo = mi_row & MI_MASK;
    self.left_seg_context[lo..(lo + bs).min(MI_BLOCK_SIZE)].fill(left);
  }

  /// Span of 4x4 units a `bsize` block covers in plane `pli`, as
  /// `(above range, left range)`.
  fn nonzero_span(
    &self, pli: usize, mi_row: usize, mi_col: usize, bsize: BlockSize,
  ) -> (std::ops::Range<usize>, std::ops::Range<usize>) {
    let (xdec, ydec) = self.decimation(pli);
    let w = (bsize.num_4x4_wide() >> xdec).max(1);
    let h = (bsize.num_4x4_high() >> ydec).max(1);
    let x = (mi_col * 2) >> xdec;
    let y = ((mi_row & MI_MASK) * 2) >> ydec;
    let above_len = self.above_nonzero[pli].len();
    (x.min(above_len)..(x + w).min(above_len), y..(y + h).min(SB_4X4))
  }

  /// Entropy context (0..=2) of the first coefficient token of a `bsize`
  /// block in plane `pli`.
  pub fn coeff_context(
    &self, pli: usize, mi_row: usize, mi_col: usize, bsize: BlockSize,
  ) -> usize {
    let (above, left) = self.nonzero_span(pli, mi_row, mi_col, bsize);
    let a = self.above_nonzero[pli][above].iter().any(|&v| v != 0);
    let l = self.left_nonzero[pli][left].iter().any(|&v| v != 0);
    a as usize + l as usize
  }

  /// Marks whether a `bsize` block coded coefficients in plane `pli`.
  pub fn set_coeff_context(
    &mut self, pli: usize, mi_row: usize, mi_col: usize, bsize: BlockSize,
    nonzero: bool,
  ) {
    let (above, left) = self.nonzero_span(pli, mi_row, mi_col, bsize);
    self.above_nonzero[pli][above].fill(nonzero as u8);
    self.left_nonzero[pli][left].fill(nonzero as u8);
  }

  /// Saves the context of the superblock containing `(mi_row, mi_col)`.
  pub fn checkpoint(
    &self, mi_row: usize, mi_col: usize,
  ) -> BlockContextCheckpoint {
    let sb_col = mi_col & !MI_MASK;
    let mut checkpoint = BlockContextCheckpoint {
      mi_row,
      mi_col: sb_col,
      above_seg_context: [0; MI_BLOCK_SIZE],
      left_seg_context: self.left_seg_context,
      above_nonzero: [[0; SB_4X4]; 3],
      left_nonzero: self.left_nonzero,
    };
    let end = (sb_col + MI_BLOCK_SIZE).min(self.mi_cols);
    checkpoint.above_seg_context[..end - sb_col]
      .copy_from_slice(&self.above_seg_context[sb_col..end]);
    for pli in 0..3 {
      let (xdec, _) = self.decimation(pli);
      let x = (sb_col * 2) >> xdec;
      let len = self.above_nonzero[pli].len();
      let end = (x + (SB_4X4 >> xdec)).min(len);
      checkpoint.above_nonzero[pli][..end - x]
        .copy_from_slice(&self.above_nonzero[pli][x..end]);
    }
    checkpoint
  }

  pub fn rollback(&mut self, checkpoint: &BlockContextCheckpoint) {
    let sb_col = checkpoint.mi_col;
    let end = (sb_col + MI_BLOCK_SIZE).min(self.mi_cols);
    self.above_seg_context[sb_col..end]
      .copy_from_slice(&checkpoint.above_seg_context[..end - sb_col]);
    self.left_seg_context = checkpoint.left_seg_context;
    for pli in 0..3 {
      let (xdec, _) = self.decimation(pli);
      let x = (sb_col * 2) >> xdec;
      let len = self.above_nonzero[pli].len();
      let end = (x + (SB_4X4 >> xdec)).min(len);
      self.above_nonzero[pli][x..end]
        .copy_from_slice(&checkpoint.above_nonzero[pli][..end - x]);
    }
    self.left_nonzero = checkpoint.left_nonzero;
  }
}
