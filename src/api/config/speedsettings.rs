// Copyright (c) 2020-2021, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use num_derive::*;

use crate::me::MAX_MVSEARCH_STEPS;
use crate::partition::BlockSize;
use crate::serialize::{Deserialize, Serialize};

use std::fmt;

/// Fastest preset accepted by [`SpeedSettings::from_preset`].
pub const MAX_SPEED_PRESET: usize = 10;

// NOTE: Add Structures at the end.
/// Contains the speed settings.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SpeedSettings {
  /// How the partitioning of each superblock is decided.
  ///
  /// RD search is slower.
  pub partition_search_type: PartitionSearchType,

  /// Block size used everywhere with `PartitionSearchType::FixedSize`.
  pub always_this_block_size: BlockSize,

  /// Derive the partition range of each superblock from its neighbours.
  ///
  /// Anything other than `Off` is faster.
  pub auto_min_max_partition_size: AutoMinMaxPartitionSize,

  /// Only search square partitions.
  ///
  /// Enabled is faster.
  pub use_square_partition_only: bool,

  /// Skip the rectangular partition a split result argues against.
  ///
  /// Enabled is faster.
  pub less_rectangular_check: bool,

  /// Distortion below which a skippable whole block ends the search of its
  /// node, scaled for 64x64. Zero disables the breakout.
  ///
  /// Higher is faster.
  pub partition_search_breakout_dist_thr: i64,

  /// Rate below which a skippable whole block ends the search of its node,
  /// per log2 of block pixels.
  ///
  /// Higher is faster.
  pub partition_search_breakout_rate_thr: i32,

  /// Full pixel motion search pattern.
  pub search_method: SearchMethod,

  /// Refinement rounds per sub-pixel precision level.
  ///
  /// Higher is slower.
  pub subpel_iters_per_step: usize,

  /// Extra halvings of the first full pixel search step.
  ///
  /// Higher is faster.
  pub reduce_first_step_size: usize,

  /// Maximum number of full pixel search steps.
  ///
  /// Higher is slower.
  pub max_step_search_steps: usize,

  /// Start motion search from the vectors found at the enclosing block
  /// size and narrow the search range accordingly.
  ///
  /// Enabled is faster.
  pub adaptive_motion_search: bool,

  // NOTE: put enums and basic type fields above
  /// Range of partition sizes that can be used. Larger ranges are slower.
  ///
  /// Must be based on square block sizes, so e.g. 8×4 isn't allowed here.
  pub partition_range: PartitionRange,
}

impl Default for SpeedSettings {
  /// The default settings are equivalent to speed 0
  fn default() -> Self {
    SpeedSettings {
      partition_range: PartitionRange::new(
        BlockSize::BLOCK_4X4,
        BlockSize::BLOCK_64X64,
      ),
      partition_search_type: PartitionSearchType::Rd,
      always_this_block_size: BlockSize::BLOCK_16X16,
      auto_min_max_partition_size: AutoMinMaxPartitionSize::Off,
      use_square_partition_only: false,
      less_rectangular_check: false,
      partition_search_breakout_dist_thr: 0,
      partition_search_breakout_rate_thr: 0,
      search_method: SearchMethod::NStep,
      subpel_iters_per_step: 2,
      reduce_first_step_size: 0,
      max_step_search_steps: MAX_MVSEARCH_STEPS,
      adaptive_motion_search: false,
    }
  }
}

impl SpeedSettings {
  /// Set the speed setting according to a numeric speed preset.
  ///
  /// Presets above [`MAX_SPEED_PRESET`] are clamped to it.
  pub fn from_preset(speed: usize) -> Self {
    if speed > MAX_SPEED_PRESET {
      log::warn!(
        "speed preset {} clamped to {}",
        speed,
        MAX_SPEED_PRESET
      );
    }
    let speed = speed.min(MAX_SPEED_PRESET);

    // The default settings are equivalent to speed 0
    let mut settings = SpeedSettings::default();

    if speed >= 1 {
      settings.less_rectangular_check = true;
      settings.adaptive_motion_search = true;
      settings.partition_search_breakout_dist_thr = 1 << 19;
      settings.partition_search_breakout_rate_thr = 80;
    }

    if speed >= 2 {
      settings.auto_min_max_partition_size =
        AutoMinMaxPartitionSize::RelaxedNeighboringMinMax;
      settings.partition_search_breakout_dist_thr = 1 << 20;
    }

    if speed >= 3 {
      settings.use_square_partition_only = true;
      settings.subpel_iters_per_step = 1;
      settings.partition_search_breakout_dist_thr = 1 << 21;
    }

    if speed >= 4 {
      settings.auto_min_max_partition_size =
        AutoMinMaxPartitionSize::ConstrainNeighboringMinMax;
      settings.search_method = SearchMethod::Hex;
      settings.partition_search_breakout_dist_thr = 1 << 22;
      settings.partition_search_breakout_rate_thr = 100;
    }

    if speed >= 5 {
      settings.search_method = SearchMethod::BigDia;
      settings.max_step_search_steps = MAX_MVSEARCH_STEPS - 2;
    }

    if speed >= 6 {
      settings.auto_min_max_partition_size = AutoMinMaxPartitionSize::Strict;
      settings.reduce_first_step_size = 1;
    }

    if speed >= 7 {
      settings.partition_search_type = PartitionSearchType::VarBased;
      settings.search_method = SearchMethod::Square;
    }

    if speed >= 8 {
      settings.partition_range =
        PartitionRange::new(BlockSize::BLOCK_8X8, BlockSize::BLOCK_64X64);
      settings.max_step_search_steps = MAX_MVSEARCH_STEPS - 4;
    }

    if speed >= 9 {
      settings.partition_search_type = PartitionSearchType::FixedSize;
      settings.always_this_block_size = BlockSize::BLOCK_16X16;
    }

    if speed >= 10 {
      settings.always_this_block_size = BlockSize::BLOCK_32X32;
      settings.reduce_first_step_size = 2;
    }

    settings
  }
}

/// Range of block sizes to use.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PartitionRange {
  pub(crate) min: BlockSize,
  pub(crate) max: BlockSize,
}

impl PartitionRange {
  /// Creates a new partition range with min and max partition sizes.
  ///
  /// # Panics
  ///
  /// - If `max` is smaller than `min`, or either is not square.
  pub fn new(min: BlockSize, max: BlockSize) -> Self {
    assert!(max >= min);
    // Split is only searched down to square sizes.
    assert!(min.is_sqr());
    assert!(max.is_sqr());

    Self { min, max }
  }

  /// Smallest partition size.
  pub const fn min(&self) -> BlockSize {
    self.min
  }

  /// Largest partition size.
  pub const fn max(&self) -> BlockSize {
    self.max
  }
}

/// How the partitioning of a superblock is chosen.
#[derive(
  Clone,
  Copy,
  Debug,
  PartialOrd,
  PartialEq,
  Eq,
  FromPrimitive,
  Serialize,
  Deserialize,
)]
pub enum PartitionSearchType {
  /// Recursive rate distortion search.
  Rd,
  /// One block size everywhere, shrunk at the frame edge.
  FixedSize,
  /// Thresholded source variance, without mode decision.
  VarBased,
}

impl fmt::Display for PartitionSearchType {
  fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
    write!(
      f,
      "{}",
      match self {
        PartitionSearchType::Rd => "RD",
        PartitionSearchType::FixedSize => "Fixed",
        PartitionSearchType::VarBased => "Variance",
      }
    )
  }
}

/// Source of the per superblock partition size range.
#[derive(
  Clone,
  Copy,
  Debug,
  PartialOrd,
  PartialEq,
  Eq,
  FromPrimitive,
  Serialize,
  Deserialize,
)]
pub enum AutoMinMaxPartitionSize {
  /// Use the configured partition range only.
  Off,
  /// Span the sizes used by the neighbours, widened by one step.
  RelaxedNeighboringMinMax,
  /// Center the range on the typical neighbouring size.
  ConstrainNeighboringMinMax,
  /// Use exactly the size the co-located area was coded with.
  Strict,
}

impl fmt::Display for AutoMinMaxPartitionSize {
  fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
    write!(
      f,
      "{}",
      match self {
        AutoMinMaxPartitionSize::Off => "Off",
        AutoMinMaxPartitionSize::RelaxedNeighboringMinMax => "Relaxed",
        AutoMinMaxPartitionSize::ConstrainNeighboringMinMax => "Constrained",
        AutoMinMaxPartitionSize::Strict => "Strict",
      }
    )
  }
}

/// Full pixel motion search pattern.
#[derive(
  Clone,
  Copy,
  Debug,
  PartialOrd,
  PartialEq,
  Eq,
  FromPrimitive,
  Serialize,
  Deserialize,
)]
pub enum SearchMethod {
  /// Four point diamond with a halving step.
  Diamond,
  /// Eight point diamond with a halving step.
  NStep,
  /// Hexagon pattern with a final square refinement.
  Hex,
  /// Wide diamond pattern.
  BigDia,
  /// Square pattern.
  Square,
  /// Exhaustive search around the diamond result.
  Full,
}

impl fmt::Display for SearchMethod {
  fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
    write!(
      f,
      "{}",
      match self {
        SearchMethod::Diamond => "Diamond",
        SearchMethod::NStep => "NStep",
        SearchMethod::Hex => "Hex",
        SearchMethod::BigDia => "BigDia",
        SearchMethod::Square => "Square",
        SearchMethod::Full => "Full",
      }
    )
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn presets_get_monotonically_cheaper() {
    let slow = SpeedSettings::from_preset(0);
    let fast = SpeedSettings::from_preset(MAX_SPEED_PRESET);
    assert_eq!(slow.partition_search_type, PartitionSearchType::Rd);
    assert_eq!(fast.partition_search_type, PartitionSearchType::FixedSize);
    assert!(fast.max_step_search_steps < slow.max_step_search_steps);
    assert!(fast.subpel_iters_per_step <= slow.subpel_iters_per_step);
    assert!(fast.partition_range.min() >= slow.partition_range.min());
  }

  #[test]
  fn out_of_range_preset_is_clamped() {
    let a = SpeedSettings::from_preset(MAX_SPEED_PRESET);
    let b = SpeedSettings::from_preset(MAX_SPEED_PRESET + 5);
    assert_eq!(a.always_this_block_size, b.always_this_block_size);
    assert_eq!(a.reduce_first_step_size, b.reduce_first_step_size);
  }

  #[test]
  #[should_panic]
  fn rectangular_partition_range_is_rejected() {
    let _ =
      PartitionRange::new(BlockSize::BLOCK_8X4, BlockSize::BLOCK_64X64);
  }
}
