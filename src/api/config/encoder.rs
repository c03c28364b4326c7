// Copyright (c) 2020, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use itertools::*;

use crate::api::color::*;
use crate::api::SpeedSettings;
use crate::mc::InterpFilter;
use crate::serialize::{Deserialize, Serialize};

use std::fmt;

/// Largest pixel domain quantizer step.
pub const MAX_QUANTIZER: usize = 255;

/// Encoder settings which impact the produced bitstream.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct EncoderConfig {
  // output size
  /// Width of the frames in pixels.
  pub width: usize,
  /// Height of the frames in pixels.
  pub height: usize,

  // data format
  /// Bit depth.
  pub bit_depth: usize,
  /// Chroma subsampling.
  pub chroma_sampling: ChromaSampling,

  // encoder configuration
  /// Pixel domain quantizer step, from 1 to [`MAX_QUANTIZER`].
  ///
  /// The Lagrangian multiplier of every decision is derived from it.
  pub quantizer: usize,
  /// Log2 of the number of tile rows. Clamped to what the frame height
  /// allows.
  pub tile_rows_log2: usize,
  /// Allow 1/8 pel motion vectors.
  pub allow_high_precision_mv: bool,
  /// Interpolation filter of every inter block.
  pub interp_filter: InterpFilter,

  /// Settings which affect the enconding speed vs. quality trade-off.
  pub speed_settings: SpeedSettings,
}

/// Default preset for EncoderConfig: the slowest speed preset. See
/// [`with_speed_preset()`].
///
/// [`with_speed_preset()`]: struct.EncoderConfig.html#method.with_speed_preset
impl Default for EncoderConfig {
  fn default() -> Self {
    const DEFAULT_SPEED: usize = 0;
    Self::with_speed_preset(DEFAULT_SPEED)
  }
}

impl EncoderConfig {
  /// This is a preset which provides default settings according to a speed
  /// value in the specific range 0–10. See [`from_preset()`].
  ///
  /// [`from_preset()`]: struct.SpeedSettings.html#method.from_preset
  pub fn with_speed_preset(speed: usize) -> Self {
    EncoderConfig {
      width: 640,
      height: 480,

      bit_depth: 8,
      chroma_sampling: ChromaSampling::Cs420,

      quantizer: 16,
      tile_rows_log2: 0,
      allow_high_precision_mv: true,
      interp_filter: InterpFilter::EIGHTTAP,
      speed_settings: SpeedSettings::from_preset(speed),
    }
  }
}

impl fmt::Display for EncoderConfig {
  fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
    let sf = &self.speed_settings;
    let pairs = [
      ("size", format!("{}x{}", self.width, self.height)),
      ("bit_depth", self.bit_depth.to_string()),
      ("quantizer", self.quantizer.to_string()),
      ("tile_rows_log2", self.tile_rows_log2.to_string()),
      ("high_precision_mv", self.allow_high_precision_mv.to_string()),
      ("partition_search", sf.partition_search_type.to_string()),
      ("min_block_size", sf.partition_range.min.to_string()),
      ("max_block_size", sf.partition_range.max.to_string()),
      ("auto_partition_range", sf.auto_min_max_partition_size.to_string()),
      ("square_only", sf.use_square_partition_only.to_string()),
      ("search_method", sf.search_method.to_string()),
      ("subpel_iters", sf.subpel_iters_per_step.to_string()),
      ("adaptive_motion_search", sf.adaptive_motion_search.to_string()),
    ];
    write!(
      f,
      "{}",
      pairs.iter().map(|pair| format!("{}={}", pair.0, pair.1)).join(" ")
    )
  }
}
