// Copyright (c) 2017-2022, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Inter prediction, motion search and partition search core of a VP9
//! style encoder.
//!
//! A frame is predicted from up to three reference frames of any size
//! within the valid scaling range. Every 64x64 superblock is partitioned
//! by a recursive rate distortion search (or a fixed or variance based
//! shortcut), and each leaf gets the intra or inter mode with the lowest
//! cost. Entropy coding and the transform are left to the implementor of
//! [`ResidualCoder`] and [`BlockSink`].
//!
//! # Basic usage
//!
//! ```
//! use vp9_inter::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let enc = EncoderConfig { width: 64, height: 64, ..Default::default() };
//! let cfg = Config::new().with_encoder_config(enc);
//! let mut encoder: Encoder<u8> = cfg.new_encoder()?;
//!
//! let mut source = Frame::new(64, 64, ChromaSampling::Cs420);
//! source.fill_with(|_, x, y| (x + y) as u8);
//! let key = encoder.encode_frame(&source, &[], FrameType::KEY)?;
//! let inter =
//!   encoder.encode_frame(&source, &[Some(&key.rec)], FrameType::INTER)?;
//! assert!(inter.rd.is_valid());
//! # Ok(())
//! # }
//! ```

#![deny(bare_trait_objects)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::cast_ptr_alignment)]
#![allow(clippy::cognitive_complexity)]
#![allow(clippy::needless_range_loop)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::verbose_bit_mask)]
#![allow(clippy::unreadable_literal)]
#![allow(clippy::many_single_char_names)]
#![warn(clippy::expl_impl_clone_on_copy)]
#![warn(clippy::linkedlist)]
#![warn(clippy::map_flatten)]
#![warn(clippy::mem_forget)]
#![warn(clippy::mut_mut)]
#![warn(clippy::mutex_integer)]
#![warn(clippy::needless_borrow)]
#![warn(clippy::needless_continue)]
#![warn(clippy::path_buf_push_overwrite)]
#![warn(clippy::range_plus_one)]

mod serialize {
  cfg_if::cfg_if! {
    if #[cfg(feature="serialize")] {
      pub use serde::*;
    } else {
      pub use noop_proc_macro::{Deserialize, Serialize};
    }
  }
}

pub mod border;
pub mod context;
pub mod dist;
pub mod entropymode;
pub mod entropymv;
pub mod frame;
pub mod mc;
pub mod me;
pub mod mvref;
pub mod partition;
pub mod predict;
pub mod rdo;
pub mod scale;
pub mod tiling;
pub mod util;

mod api;
pub mod encoder;

pub use crate::api::{
  Config, Encoder, EncoderConfig, EncoderStatus, FrameResult, FrameType,
  InvalidConfig,
};
pub use crate::frame::{Frame, Plane, PlaneConfig, PlaneOffset};
pub use crate::util::{CastFromPrimitive, Pixel, PixelType};

pub use crate::context::{BModeInfo, ModeInfo, ModeInfoGrid};
pub use crate::rdo::{
  BlockSink, CodedBlock, NullSink, PixelQuantizer, RDCost, ResidualCoder,
  ResidualResult,
};

/// Commonly used types and traits.
pub mod prelude {
  pub use crate::api::*;
  pub use crate::context::{ModeInfo, ModeInfoGrid};
  pub use crate::frame::{Frame, Plane, PlaneConfig, PlaneOffset};
  pub use crate::mc::{ConvolveBackend, InterpFilter, MotionVector};
  pub use crate::partition::{BlockSize, PredictionMode, RefType};
  pub use crate::rdo::{
    BlockSink, CodedBlock, NullSink, PixelQuantizer, RDCost, ResidualCoder,
  };
  pub use crate::util::{Pixel, PixelType};
}

/// Color model information
pub mod color {
  pub use crate::api::color::*;
}

/// Encoder configuration and settings
pub mod config {
  pub use crate::api::config::*;
}
