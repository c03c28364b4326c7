// Copyright (c) 2017-2023, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Default symbol probabilities and the bit costs derived from them.
//!
//! Probabilities are 8-bit chances of a zero bit. Costs are in 1/256 bit.

#![allow(non_upper_case_globals)]

use crate::partition::*;

/// Cost unit: 1/256 bit.
pub const COST_PRECISION_BITS: u32 = 8;

/// A binary tree over tokens: entries come in `(bit 0, bit 1)` pairs, a
/// positive entry is the index of the next pair and a non-positive entry
/// `-t` is the leaf for token `t`.
pub type TreeIndex = i8;

/// Cost of coding `bit` with zero-probability `prob`.
#[inline]
pub fn cost_bit(prob: u8, bit: bool) -> u32 {
  let p = if bit { 256 - prob as u32 } else { prob as u32 };
  let p = p.clamp(1, 255) as f64 / 256.0;
  (-p.log2() * (1 << COST_PRECISION_BITS) as f64).round() as u32
}

/// Fills `costs[t]` with the cost of every token `t` reachable in `tree`.
pub fn cost_tokens(costs: &mut [u32], probs: &[u8], tree: &[TreeIndex]) {
  fn walk(
    costs: &mut [u32], probs: &[u8], tree: &[TreeIndex], i: usize, acc: u32,
  ) {
    let prob = probs[i >> 1];
    for b in 0..2 {
      let next = tree[i + b];
      let c = acc + cost_bit(prob, b == 1);
      if next <= 0 {
        costs[(-next) as usize] = c;
      } else {
        walk(costs, probs, tree, next as usize, c);
      }
    }
  }
  walk(costs, probs, tree, 0, 0);
}

pub static partition_tree: [TreeIndex; 6] = [
  -(PartitionType::PARTITION_NONE as i8),
  2,
  -(PartitionType::PARTITION_HORZ as i8),
  4,
  -(PartitionType::PARTITION_VERT as i8),
  -(PartitionType::PARTITION_SPLIT as i8),
];

/// Inter frame partition probabilities, by partition context.
pub static default_partition_probs: [[u8; PARTITION_TYPES - 1];
  PARTITION_CONTEXTS] = [
  // 8x8 -> 4x4
  [199, 122, 141],
  [147, 63, 159],
  [148, 133, 118],
  [121, 104, 114],
  // 16x16 -> 8x8
  [174, 73, 87],
  [92, 41, 83],
  [82, 99, 50],
  [53, 39, 39],
  // 32x32 -> 16x16
  [177, 58, 59],
  [68, 26, 63],
  [52, 79, 25],
  [17, 14, 12],
  // 64x64 -> 32x32
  [222, 34, 30],
  [72, 16, 44],
  [58, 32, 12],
  [10, 7, 6],
];

pub const SKIP_CONTEXTS: usize = 3;
pub static default_skip_probs: [u8; SKIP_CONTEXTS] = [192, 128, 64];

pub const INTER_MODE_CONTEXTS: usize = 7;

/// Tokens are `PredictionMode::inter_offset()` values.
pub static inter_mode_tree: [TreeIndex; 6] = [
  -(PredictionMode::ZEROMV.inter_offset() as i8),
  2,
  -(PredictionMode::NEARESTMV.inter_offset() as i8),
  4,
  -(PredictionMode::NEARMV.inter_offset() as i8),
  -(PredictionMode::NEWMV.inter_offset() as i8),
];

pub static default_inter_mode_probs: [[u8; INTER_MODES - 1];
  INTER_MODE_CONTEXTS] = [
  [2, 173, 34],
  [7, 145, 85],
  [7, 166, 63],
  [7, 94, 66],
  [8, 64, 46],
  [17, 81, 31],
  [25, 29, 30],
];

pub static intra_mode_tree: [TreeIndex; 18] = [
  -(PredictionMode::DC_PRED as i8),
  2,
  -(PredictionMode::TM_PRED as i8),
  4,
  -(PredictionMode::V_PRED as i8),
  6,
  8,
  12,
  -(PredictionMode::H_PRED as i8),
  10,
  -(PredictionMode::D135_PRED as i8),
  -(PredictionMode::D117_PRED as i8),
  -(PredictionMode::D45_PRED as i8),
  14,
  -(PredictionMode::D63_PRED as i8),
  16,
  -(PredictionMode::D153_PRED as i8),
  -(PredictionMode::D207_PRED as i8),
];

pub const BLOCK_SIZE_GROUPS: usize = 4;

/// Luma intra mode probabilities, by block size group.
pub static default_if_y_probs: [[u8; INTRA_MODES - 1]; BLOCK_SIZE_GROUPS] = [
  [65, 32, 18, 144, 162, 194, 41, 51, 98],
  [132, 68, 18, 165, 217, 196, 45, 40, 78],
  [173, 80, 19, 176, 240, 193, 64, 35, 46],
  [221, 135, 38, 194, 248, 121, 96, 85, 29],
];

pub static size_group_lookup: [u8; BlockSize::BLOCK_SIZES] =
  [0, 0, 0, 1, 1, 1, 2, 2, 2, 3, 3, 3, 3];

pub const INTRA_INTER_PROB: u8 = 102;
/// Chance of LAST_FRAME among single references.
pub const SINGLE_REF_P1: u8 = 142;
/// Chance of GOLDEN_FRAME once LAST_FRAME is ruled out.
pub const SINGLE_REF_P2: u8 = 142;

/// Cost tables for the block level symbols the mode search prices.
#[derive(Clone, Debug)]
pub struct ModeCosts {
  pub partition: [[u32; PARTITION_TYPES]; PARTITION_CONTEXTS],
  pub skip: [[u32; 2]; SKIP_CONTEXTS],
  pub inter_mode: [[u32; INTER_MODES]; INTER_MODE_CONTEXTS],
  pub y_mode: [[u32; INTRA_MODES]; BLOCK_SIZE_GROUPS],
  pub intra_inter: [u32; 2],
  /// Cost of each single reference, indexed by `RefType`.
  pub single_ref: [u32; 4],
}

impl Default for ModeCosts {
  fn default() -> Self {
    let mut partition = [[0; PARTITION_TYPES]; PARTITION_CONTEXTS];
    for (costs, probs) in partition.iter_mut().zip(&default_partition_probs) {
      cost_tokens(costs, probs, &partition_tree);
    }
    let mut inter_mode = [[0; INTER_MODES]; INTER_MODE_CONTEXTS];
    for (costs, probs) in inter_mode.iter_mut().zip(&default_inter_mode_probs)
    {
      cost_tokens(costs, probs, &inter_mode_tree);
    }
    let mut y_mode = [[0; INTRA_MODES]; BLOCK_SIZE_GROUPS];
    for (costs, probs) in y_mode.iter_mut().zip(&default_if_y_probs) {
      cost_tokens(costs, probs, &intra_mode_tree);
    }
    let skip = default_skip_probs
      .map(|p| [cost_bit(p, false), cost_bit(p, true)]);
    let intra_inter =
      [cost_bit(INTRA_INTER_PROB, false), cost_bit(INTRA_INTER_PROB, true)];
    let not_last = cost_bit(SINGLE_REF_P1, true);
    let single_ref = [
      0,
      cost_bit(SINGLE_REF_P1, false),
      not_last + cost_bit(SINGLE_REF_P2, false),
      not_last + cost_bit(SINGLE_REF_P2, true),
    ];
    ModeCosts { partition, skip, inter_mode, y_mode, intra_inter, single_ref }
  }
}

impl ModeCosts {
  /// Cost of signalling a luma intra mode for a `bsize` block.
  #[inline]
  pub fn intra_mode(&self, bsize: BlockSize, mode: PredictionMode) -> u32 {
    self.y_mode[size_group_lookup[bsize as usize] as usize][mode as usize]
  }

  /// Cost of signalling `ref_frame`, including the intra/inter flag.
  #[inline]
  pub fn reference(&self, ref_frame: RefType) -> u32 {
    if ref_frame.is_inter() {
      self.intra_inter[1] + self.single_ref[ref_frame as usize]
    } else {
      self.intra_inter[0]
    }
  }

  #[inline]
  pub fn inter_mode(&self, ctx: usize, mode: PredictionMode) -> u32 {
    self.inter_mode[ctx][mode.inter_offset()]
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn even_bit_costs_one_bit() {
    assert_eq!(cost_bit(128, false), 256);
    assert_eq!(cost_bit(128, true), 256);
    assert!(cost_bit(255, false) < 2);
    assert!(cost_bit(255, true) > 256 * 7);
  }

  #[test]
  fn partition_costs_follow_tree() {
    let costs = ModeCosts::default();
    let p = default_partition_probs[12];
    assert_eq!(costs.partition[12][0], cost_bit(p[0], false));
    assert_eq!(
      costs.partition[12][3],
      cost_bit(p[0], true) + cost_bit(p[1], true) + cost_bit(p[2], true)
    );
  }

  #[test]
  fn zero_mv_is_first_inter_leaf() {
    let costs = ModeCosts::default();
    assert_eq!(
      costs.inter_mode(6, PredictionMode::ZEROMV),
      cost_bit(default_inter_mode_probs[6][0], false)
    );
  }

  #[test]
  fn every_intra_mode_is_priced() {
    let costs = ModeCosts::default();
    for group in &costs.y_mode {
      assert!(group.iter().all(|&c| c > 0));
    }
  }
}
