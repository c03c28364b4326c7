// Copyright (c) 2017-2022, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

#![allow(non_camel_case_types)]

use self::BlockSize::*;
use self::TxSize::*;
use crate::serialize::{Deserialize, Serialize};
use thiserror::Error;

use std::fmt;

/// Log2 of the mode info unit, in pixels.
pub const MI_SIZE_LOG2: usize = 3;
pub const MI_SIZE: usize = 1 << MI_SIZE_LOG2;
/// Mode info units across one 64x64 superblock.
pub const MI_BLOCK_SIZE_LOG2: usize = 3;
pub const MI_BLOCK_SIZE: usize = 1 << MI_BLOCK_SIZE_LOG2;
pub const MI_MASK: usize = MI_BLOCK_SIZE - 1;

#[derive(PartialEq, Eq, PartialOrd, Ord, Copy, Clone, Debug, Hash)]
pub enum RefType {
  INTRA_FRAME = 0,
  LAST_FRAME = 1,
  GOLDEN_FRAME = 2,
  ALTREF_FRAME = 3,
  NONE_FRAME = 4,
}

use self::RefType::*;

impl RefType {
  /// convert to a ref list index, 0-2 (`INTER_REFS_PER_FRAME`)
  ///
  /// # Panics
  ///
  /// - If the ref type is a None or Intra frame
  #[inline]
  pub fn to_index(self) -> usize {
    match self {
      NONE_FRAME => {
        panic!("Tried to get slot of NONE_FRAME");
      }
      INTRA_FRAME => {
        panic!("Tried to get slot of INTRA_FRAME");
      }
      _ => (self as usize) - 1,
    }
  }

  #[inline]
  pub const fn is_inter(self) -> bool {
    matches!(self, LAST_FRAME | GOLDEN_FRAME | ALTREF_FRAME)
  }
}

impl Default for RefType {
  fn default() -> Self {
    INTRA_FRAME
  }
}

pub const ALL_INTER_REFS: [RefType; 3] =
  [LAST_FRAME, GOLDEN_FRAME, ALTREF_FRAME];

pub const INTER_REFS_PER_FRAME: usize = 3;
pub const TOTAL_REFS_PER_FRAME: usize = 4;

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub enum PartitionType {
  PARTITION_NONE,
  PARTITION_HORZ,
  PARTITION_VERT,
  PARTITION_SPLIT,
}

pub const PARTITION_TYPES: usize = 4;
pub const PARTITION_PLOFFSET: usize = 4;
pub const PARTITION_CONTEXTS: usize = 4 * PARTITION_PLOFFSET;

pub static ALL_PARTITION_TYPES: &[PartitionType] = &[
  PartitionType::PARTITION_NONE,
  PartitionType::PARTITION_HORZ,
  PartitionType::PARTITION_VERT,
  PartitionType::PARTITION_SPLIT,
];

#[derive(
  Debug,
  Copy,
  Clone,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
)]
pub enum BlockSize {
  BLOCK_4X4,
  BLOCK_4X8,
  BLOCK_8X4,
  BLOCK_8X8,
  BLOCK_8X16,
  BLOCK_16X8,
  BLOCK_16X16,
  BLOCK_16X32,
  BLOCK_32X16,
  BLOCK_32X32,
  BLOCK_32X64,
  BLOCK_64X32,
  BLOCK_64X64,
}

#[derive(Debug, Error, Copy, Clone, Eq, PartialEq)]
#[error("invalid block size")]
pub struct InvalidBlockSize;

impl Default for BlockSize {
  fn default() -> Self {
    BLOCK_64X64
  }
}

impl BlockSize {
  pub const BLOCK_SIZES: usize = 13;

  pub const ALL: [BlockSize; BlockSize::BLOCK_SIZES] = [
    BLOCK_4X4,
    BLOCK_4X8,
    BLOCK_8X4,
    BLOCK_8X8,
    BLOCK_8X16,
    BLOCK_16X8,
    BLOCK_16X16,
    BLOCK_16X32,
    BLOCK_32X16,
    BLOCK_32X32,
    BLOCK_32X64,
    BLOCK_64X32,
    BLOCK_64X64,
  ];

  /// # Errors
  ///
  /// - Returns `InvalidBlockSize` if the given `w` and `h` do not produce
  ///   a valid block size.
  #[inline]
  pub const fn from_width_and_height(
    w: usize, h: usize,
  ) -> Result<BlockSize, InvalidBlockSize> {
    Ok(match (w, h) {
      (4, 4) => BLOCK_4X4,
      (4, 8) => BLOCK_4X8,
      (8, 4) => BLOCK_8X4,
      (8, 8) => BLOCK_8X8,
      (8, 16) => BLOCK_8X16,
      (16, 8) => BLOCK_16X8,
      (16, 16) => BLOCK_16X16,
      (16, 32) => BLOCK_16X32,
      (32, 16) => BLOCK_32X16,
      (32, 32) => BLOCK_32X32,
      (32, 64) => BLOCK_32X64,
      (64, 32) => BLOCK_64X32,
      (64, 64) => BLOCK_64X64,
      _ => return Err(InvalidBlockSize),
    })
  }

  #[inline]
  pub const fn width(self) -> usize {
    1 << self.width_log2()
  }

  #[inline]
  pub const fn height(self) -> usize {
    1 << self.height_log2()
  }

  /// width * height
  #[inline]
  pub const fn area(self) -> usize {
    self.width() * self.height()
  }

  #[inline]
  pub const fn width_log2(self) -> usize {
    match self {
      BLOCK_4X4 | BLOCK_4X8 => 2,
      BLOCK_8X4 | BLOCK_8X8 | BLOCK_8X16 => 3,
      BLOCK_16X8 | BLOCK_16X16 | BLOCK_16X32 => 4,
      BLOCK_32X16 | BLOCK_32X32 | BLOCK_32X64 => 5,
      BLOCK_64X32 | BLOCK_64X64 => 6,
    }
  }

  #[inline]
  pub const fn height_log2(self) -> usize {
    match self {
      BLOCK_4X4 | BLOCK_8X4 => 2,
      BLOCK_4X8 | BLOCK_8X8 | BLOCK_16X8 => 3,
      BLOCK_8X16 | BLOCK_16X16 | BLOCK_32X16 => 4,
      BLOCK_16X32 | BLOCK_32X32 | BLOCK_64X32 => 5,
      BLOCK_32X64 | BLOCK_64X64 => 6,
    }
  }

  /// Width in 4x4 units, log2.
  #[inline]
  pub const fn width_4x4_log2(self) -> usize {
    self.width_log2() - 2
  }

  /// Height in 4x4 units, log2.
  #[inline]
  pub const fn height_4x4_log2(self) -> usize {
    self.height_log2() - 2
  }

  #[inline]
  pub const fn num_4x4_wide(self) -> usize {
    self.width() >> 2
  }

  #[inline]
  pub const fn num_4x4_high(self) -> usize {
    self.height() >> 2
  }

  /// Width in mode info units, at least one.
  #[inline]
  pub const fn width_mi(self) -> usize {
    if self.width() < MI_SIZE {
      1
    } else {
      self.width() >> MI_SIZE_LOG2
    }
  }

  /// Height in mode info units, at least one.
  #[inline]
  pub const fn height_mi(self) -> usize {
    if self.height() < MI_SIZE {
      1
    } else {
      self.height() >> MI_SIZE_LOG2
    }
  }

  /// Width in mode info units, log2; sub-8x8 sizes count as one unit.
  #[inline]
  pub const fn width_mi_log2(self) -> usize {
    if self.width_log2() < MI_SIZE_LOG2 {
      0
    } else {
      self.width_log2() - MI_SIZE_LOG2
    }
  }

  #[inline]
  pub const fn height_mi_log2(self) -> usize {
    if self.height_log2() < MI_SIZE_LOG2 {
      0
    } else {
      self.height_log2() - MI_SIZE_LOG2
    }
  }

  #[inline]
  pub const fn is_sqr(self) -> bool {
    self.width_log2() == self.height_log2()
  }

  #[inline]
  pub const fn is_sub8x8(self) -> bool {
    (self as usize) < (BLOCK_8X8 as usize)
  }

  /// The block size covering this one in a plane with the given decimation.
  ///
  /// # Errors
  ///
  /// - Returns `InvalidBlockSize` if the decimated block has no size of its
  ///   own (a 4x4 luma block in 4:2:0 chroma, for instance).
  #[inline]
  pub const fn subsampled_size(
    self, xdec: usize, ydec: usize,
  ) -> Result<BlockSize, InvalidBlockSize> {
    BlockSize::from_width_and_height(
      self.width() >> xdec,
      self.height() >> ydec,
    )
  }

  /// # Errors
  ///
  /// - Returns `InvalidBlockSize` if the block size cannot be split
  ///   in the requested way.
  pub const fn subsize(
    self, partition: PartitionType,
  ) -> Result<BlockSize, InvalidBlockSize> {
    use PartitionType::*;

    Ok(match partition {
      PARTITION_NONE => self,
      PARTITION_SPLIT => match self {
        BLOCK_8X8 => BLOCK_4X4,
        BLOCK_16X16 => BLOCK_8X8,
        BLOCK_32X32 => BLOCK_16X16,
        BLOCK_64X64 => BLOCK_32X32,
        _ => return Err(InvalidBlockSize),
      },
      PARTITION_HORZ => match self {
        BLOCK_8X8 => BLOCK_8X4,
        BLOCK_16X16 => BLOCK_16X8,
        BLOCK_32X32 => BLOCK_32X16,
        BLOCK_64X64 => BLOCK_64X32,
        _ => return Err(InvalidBlockSize),
      },
      PARTITION_VERT => match self {
        BLOCK_8X8 => BLOCK_4X8,
        BLOCK_16X16 => BLOCK_8X16,
        BLOCK_32X32 => BLOCK_16X32,
        BLOCK_64X64 => BLOCK_32X64,
        _ => return Err(InvalidBlockSize),
      },
    })
  }

  /// Largest transform fitting inside the block.
  #[inline]
  pub const fn max_tx_size(self) -> TxSize {
    match self {
      BLOCK_4X4 | BLOCK_4X8 | BLOCK_8X4 => TX_4X4,
      BLOCK_8X8 | BLOCK_8X16 | BLOCK_16X8 => TX_8X8,
      BLOCK_16X16 | BLOCK_16X32 | BLOCK_32X16 => TX_16X16,
      _ => TX_32X32,
    }
  }

  /// The square size one step above, used when a range must be square.
  #[inline]
  pub const fn next_square(self) -> BlockSize {
    match self {
      BLOCK_4X4 | BLOCK_4X8 | BLOCK_8X4 => BLOCK_4X4,
      BLOCK_8X8 | BLOCK_8X16 | BLOCK_16X8 => BLOCK_8X8,
      BLOCK_16X16 | BLOCK_16X32 | BLOCK_32X16 => BLOCK_16X16,
      BLOCK_32X32 | BLOCK_32X64 | BLOCK_64X32 => BLOCK_32X32,
      BLOCK_64X64 => BLOCK_64X64,
    }
  }

  /// Steps `n` entries down the size table, saturating at 4x4.
  #[inline]
  pub fn step_down(self, n: usize) -> BlockSize {
    BlockSize::ALL[(self as usize).saturating_sub(n)]
  }

  /// Steps `n` entries up the size table, saturating at 64x64.
  #[inline]
  pub fn step_up(self, n: usize) -> BlockSize {
    BlockSize::ALL[(self as usize + n).min(BlockSize::BLOCK_SIZES - 1)]
  }
}

impl fmt::Display for BlockSize {
  fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
    write!(f, "{}x{}", self.width(), self.height())
  }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum TxSize {
  #[default]
  TX_4X4,
  TX_8X8,
  TX_16X16,
  TX_32X32,
}

impl TxSize {
  #[inline]
  pub const fn width_log2(self) -> usize {
    self as usize + 2
  }

  #[inline]
  pub const fn width(self) -> usize {
    1 << self.width_log2()
  }

  /// Transform size for a chroma plane of a block with the given luma size.
  pub fn uv_tx_size(
    self, bsize: BlockSize, xdec: usize, ydec: usize,
  ) -> TxSize {
    if bsize.is_sub8x8() {
      return TX_4X4;
    }
    match bsize.subsampled_size(xdec, ydec) {
      Ok(plane_bsize) => self.min(plane_bsize.max_tx_size()),
      Err(_) => TX_4X4,
    }
  }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PredictionMode {
  DC_PRED,
  V_PRED,
  H_PRED,
  D45_PRED,
  D135_PRED,
  D117_PRED,
  D153_PRED,
  D207_PRED,
  D63_PRED,
  TM_PRED,
  NEARESTMV,
  NEARMV,
  ZEROMV,
  NEWMV,
}

pub const INTRA_MODES: usize = 10;
pub const INTER_MODES: usize = 4;

impl Default for PredictionMode {
  fn default() -> Self {
    PredictionMode::DC_PRED
  }
}

impl PredictionMode {
  #[inline]
  pub const fn is_intra(self) -> bool {
    (self as usize) < (PredictionMode::NEARESTMV as usize)
  }

  #[inline]
  pub const fn is_inter(self) -> bool {
    !self.is_intra()
  }

  /// Index among the inter modes, `NEARESTMV` first.
  #[inline]
  pub const fn inter_offset(self) -> usize {
    debug_assert!(self.is_inter());
    self as usize - PredictionMode::NEARESTMV as usize
  }
}

/// Intra modes the mode decision searches.
pub static RD_INTRA_MODES: &[PredictionMode] = &[
  PredictionMode::DC_PRED,
  PredictionMode::V_PRED,
  PredictionMode::H_PRED,
  PredictionMode::TM_PRED,
];

/// Inter modes the mode decision searches, in evaluation order.
pub static RD_INTER_MODES: &[PredictionMode] = &[
  PredictionMode::NEARESTMV,
  PredictionMode::NEARMV,
  PredictionMode::ZEROMV,
  PredictionMode::NEWMV,
];

#[cfg(test)]
mod test {
  use super::PartitionType::*;
  use super::*;

  #[test]
  fn subsize_of_square_sizes() {
    assert_eq!(BLOCK_64X64.subsize(PARTITION_SPLIT), Ok(BLOCK_32X32));
    assert_eq!(BLOCK_64X64.subsize(PARTITION_HORZ), Ok(BLOCK_64X32));
    assert_eq!(BLOCK_16X16.subsize(PARTITION_VERT), Ok(BLOCK_8X16));
    assert_eq!(BLOCK_8X8.subsize(PARTITION_SPLIT), Ok(BLOCK_4X4));
    assert_eq!(BLOCK_8X8.subsize(PARTITION_NONE), Ok(BLOCK_8X8));
    assert_eq!(BLOCK_16X8.subsize(PARTITION_SPLIT), Err(InvalidBlockSize));
  }

  #[test]
  fn mi_dimensions() {
    assert_eq!(BLOCK_4X4.width_mi(), 1);
    assert_eq!(BLOCK_4X8.height_mi(), 1);
    assert_eq!(BLOCK_64X32.width_mi(), 8);
    assert_eq!(BLOCK_64X32.height_mi(), 4);
    assert_eq!(BLOCK_32X32.width_mi_log2(), 2);
    assert_eq!(BLOCK_8X8.width_mi_log2(), 0);
    assert_eq!(BLOCK_4X4.width_mi_log2(), 0);
  }

  #[test]
  fn subsampled_sizes() {
    assert_eq!(BLOCK_16X16.subsampled_size(1, 1), Ok(BLOCK_8X8));
    assert_eq!(BLOCK_16X8.subsampled_size(1, 0), Ok(BLOCK_8X8));
    assert_eq!(BLOCK_8X16.subsampled_size(1, 0), Err(InvalidBlockSize));
    assert_eq!(BLOCK_4X4.subsampled_size(1, 1), Err(InvalidBlockSize));
  }

  #[test]
  fn size_table_steps() {
    assert_eq!(BLOCK_64X64.step_down(3), BLOCK_32X32);
    assert_eq!(BLOCK_8X8.step_down(6), BLOCK_4X4);
    assert_eq!(BLOCK_32X32.step_up(6), BLOCK_64X64);
    assert_eq!(BLOCK_32X16.next_square(), BLOCK_16X16);
    assert_eq!(BLOCK_16X16.max_tx_size(), TX_16X16);
    assert_eq!(TX_32X32.uv_tx_size(BLOCK_32X32, 1, 1), TX_16X16);
  }

  #[test]
  fn mode_classes() {
    assert!(PredictionMode::TM_PRED.is_intra());
    assert!(PredictionMode::NEARESTMV.is_inter());
    assert_eq!(PredictionMode::NEWMV.inter_offset(), 3);
    assert!(LAST_FRAME.is_inter());
    assert!(!INTRA_FRAME.is_inter());
    assert_eq!(ALTREF_FRAME.to_index(), 2);
  }
}
