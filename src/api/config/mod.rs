// Copyright (c) 2020-2022, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use thiserror::Error;

use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::Arc;

use crate::encoder::Encoder;
use crate::me::MAX_MVSEARCH_STEPS;
use crate::partition::BlockSize;
use crate::util::Pixel;

mod encoder;
pub use encoder::*;

mod speedsettings;
pub use speedsettings::*;

pub use crate::tiling::{TilingInfo, MAX_TILE_ROWS_LOG2};

/// Enumeration of possible invalid configuration errors.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Error)]
#[non_exhaustive]
pub enum InvalidConfig {
  /// The width is invalid.
  #[error("invalid width {0} (expected >= 8, <= 65535)")]
  InvalidWidth(usize),
  /// The height is invalid.
  #[error("invalid height {0} (expected >= 8, <= 65535)")]
  InvalidHeight(usize),
  /// The bit depth is invalid.
  #[error("invalid bit depth {0} (expected 8, 10 or 12)")]
  InvalidBitDepth(usize),
  /// The quantizer is invalid.
  #[error("invalid quantizer {actual} (expected >= 1, <= {max})")]
  InvalidQuantizer {
    /// The actual value.
    actual: usize,
    /// The maximal supported value.
    max: usize,
  },
  /// Tile rows is invalid.
  #[error("invalid tile rows log2 {actual} (expected <= {max})")]
  InvalidTileRows {
    /// The actual value.
    actual: usize,
    /// The maximal supported value.
    max: usize,
  },
  /// The thread pool could not be built.
  #[error("unable to build a pool of {0} threads")]
  InvalidThreads(usize),
  /// A speed setting is out of its range.
  #[error("invalid speed setting {0}")]
  InvalidSpeedSetting(&'static str),
  /// The partition range is empty or not made of square sizes.
  #[error("invalid partition range {min}..={max}")]
  InvalidPartitionRange {
    /// The smallest partition size.
    min: BlockSize,
    /// The largest partition size.
    max: BlockSize,
  },
}

/// Contains the encoder configuration.
#[derive(Clone, Debug, Default)]
pub struct Config {
  /// Settings which impact the produced bitstream.
  pub(crate) enc: EncoderConfig,
  /// The number of threads in the threadpool.
  pub(crate) threads: usize,
}

impl Config {
  /// Create a default configuration
  ///
  /// same as `Default::default()`
  pub fn new() -> Self {
    Config::default()
  }

  /// Set the encoder configuration
  ///
  /// `EncoderConfig` contains the settings impacting the
  /// codec features used in the produced bitstream.
  pub fn with_encoder_config(mut self, enc: EncoderConfig) -> Self {
    self.enc = enc;
    self
  }

  /// Set the number of workers in the threadpool
  ///
  /// The threadpool runs the tiles of a frame in parallel.
  ///
  /// If it is left unset, the encoder will use the default global
  /// threadpool provided by Rayon instead.
  pub const fn with_threads(mut self, threads: usize) -> Self {
    self.threads = threads;
    self
  }

  /// The encoder configuration.
  pub const fn encoder_config(&self) -> &EncoderConfig {
    &self.enc
  }

  /// Create a new threadpool with this configuration if set,
  /// or return `None` if global threadpool should be used instead.
  pub(crate) fn new_thread_pool(
    &self,
  ) -> Result<Option<Arc<ThreadPool>>, InvalidConfig> {
    if self.threads == 0 {
      return Ok(None);
    }
    let pool = ThreadPoolBuilder::new()
      .num_threads(self.threads)
      .build()
      .map_err(|_| InvalidConfig::InvalidThreads(self.threads))?;
    Ok(Some(Arc::new(pool)))
  }

  /// Creates an [`Encoder`] with this configuration.
  ///
  /// # Errors
  ///
  /// Returns `InvalidConfig` if the config is invalid or the thread pool
  /// cannot be built.
  ///
  /// # Panics
  ///
  /// - If the pixel type cannot hold samples of the configured bit depth.
  pub fn new_encoder<T: Pixel>(&self) -> Result<Encoder<T>, InvalidConfig> {
    assert!(
      8 * std::mem::size_of::<T>() >= self.enc.bit_depth,
      "The Pixel u{} does not match the Config bit_depth {}",
      8 * std::mem::size_of::<T>(),
      self.enc.bit_depth
    );

    self.validate()?;
    let pool = self.new_thread_pool()?;
    Ok(Encoder::new(self.enc, pool))
  }

  /// Validates the configuration.
  ///
  /// # Errors
  ///
  /// - Returns `InvalidConfig` if any setting is out of range.
  pub fn validate(&self) -> Result<(), InvalidConfig> {
    use InvalidConfig::*;

    let config = &self.enc;

    if config.width < 8 || config.width > u16::MAX as usize {
      return Err(InvalidWidth(config.width));
    }
    if config.height < 8 || config.height > u16::MAX as usize {
      return Err(InvalidHeight(config.height));
    }
    if !matches!(config.bit_depth, 8 | 10 | 12) {
      return Err(InvalidBitDepth(config.bit_depth));
    }
    if config.quantizer == 0 || config.quantizer > MAX_QUANTIZER {
      return Err(InvalidQuantizer {
        actual: config.quantizer,
        max: MAX_QUANTIZER,
      });
    }
    if config.tile_rows_log2 > MAX_TILE_ROWS_LOG2 {
      return Err(InvalidTileRows {
        actual: config.tile_rows_log2,
        max: MAX_TILE_ROWS_LOG2,
      });
    }

    let sf = &config.speed_settings;
    let range = sf.partition_range;
    if range.min > range.max || !range.min.is_sqr() || !range.max.is_sqr() {
      return Err(InvalidPartitionRange { min: range.min, max: range.max });
    }
    if !sf.always_this_block_size.is_sqr() {
      return Err(InvalidSpeedSetting("always_this_block_size"));
    }
    if sf.max_step_search_steps == 0
      || sf.max_step_search_steps > MAX_MVSEARCH_STEPS
    {
      return Err(InvalidSpeedSetting("max_step_search_steps"));
    }
    if sf.reduce_first_step_size >= MAX_MVSEARCH_STEPS {
      return Err(InvalidSpeedSetting("reduce_first_step_size"));
    }
    if sf.partition_search_breakout_dist_thr < 0
      || sf.partition_search_breakout_rate_thr < 0
    {
      return Err(InvalidSpeedSetting("partition_search_breakout"));
    }

    Ok(())
  }

  /// Provide the tiling information for the current Config
  ///
  /// Useful for reporting and debugging.
  ///
  /// # Errors
  ///
  /// - Returns `InvalidConfig` if the config is invalid.
  pub fn tiling_info(&self) -> Result<TilingInfo, InvalidConfig> {
    self.validate()?;

    Ok(TilingInfo::new(
      self.enc.width,
      self.enc.height,
      self.enc.tile_rows_log2,
    ))
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn config(enc: EncoderConfig) -> Config {
    Config::new().with_encoder_config(enc)
  }

  #[test]
  fn default_config_is_valid() {
    assert_eq!(Config::new().validate(), Ok(()));
  }

  #[test]
  fn out_of_range_settings_are_rejected() {
    use InvalidConfig::*;
    let enc = EncoderConfig::default();

    let c = config(EncoderConfig { width: 4, ..enc });
    assert_eq!(c.validate(), Err(InvalidWidth(4)));
    let c = config(EncoderConfig { bit_depth: 9, ..enc });
    assert_eq!(c.validate(), Err(InvalidBitDepth(9)));
    let c = config(EncoderConfig { quantizer: 0, ..enc });
    assert_eq!(
      c.validate(),
      Err(InvalidQuantizer { actual: 0, max: MAX_QUANTIZER })
    );
    let c = config(EncoderConfig { tile_rows_log2: 3, ..enc });
    assert!(matches!(c.validate(), Err(InvalidTileRows { .. })));

    let mut sf = SpeedSettings::default();
    sf.max_step_search_steps = 0;
    let c = config(EncoderConfig { speed_settings: sf, ..enc });
    assert_eq!(
      c.validate(),
      Err(InvalidSpeedSetting("max_step_search_steps"))
    );
  }

  #[test]
  fn tiling_follows_the_configured_rows() {
    let enc = EncoderConfig {
      width: 256,
      height: 256,
      tile_rows_log2: 1,
      ..Default::default()
    };
    let ti = config(enc).tiling_info().unwrap();
    assert_eq!(ti.tile_count(), 2);
    assert_eq!(ti.tile_info(1).mi_row_start, 16);
  }

  #[test]
  fn encoder_gets_its_own_pool() {
    let c = config(EncoderConfig::default()).with_threads(2);
    assert!(c.new_thread_pool().unwrap().is_some());
    assert!(Config::new().new_thread_pool().unwrap().is_none());
  }
}
