// Copyright (c) 2018-2022, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

pub mod block;
pub mod partition;

use self::block::PLANES;
use crate::api::EncoderConfig;
use crate::context::*;
use crate::entropymode::ModeCosts;
use crate::entropymv::MvCostTables;
use crate::frame::*;
use crate::mc::{ConvolveBackend, RustConvolve};
use crate::me::init_search_range;
use crate::partition::RefType::*;
use crate::partition::*;
use crate::predict::RefFrame;
use crate::rdo::*;
use crate::scale::scale_and_extend_frame;
use crate::tiling::*;
use crate::util::*;

use rayon::prelude::*;
use rayon::ThreadPool;
use thiserror::Error;

use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum FrameType {
  KEY,
  INTER,
}

/// Errors reported by [`Encoder::encode_frame`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Error)]
#[non_exhaustive]
pub enum EncoderStatus {
  /// More references were passed than a frame can use, or one of them
  /// has another chroma sampling than the source.
  #[error("invalid reference frame")]
  InvalidReference,
  /// The source frame does not have the configured dimensions.
  #[error("frame size mismatch")]
  FrameSizeMismatch,
  /// Generic fatal error.
  #[error("failure")]
  Failure,
}

// Frame Invariants are invariant inside a frame
pub struct FrameInvariants<'a, T: Pixel> {
  pub config: &'a EncoderConfig,
  pub frame_type: FrameType,
  pub width: usize,
  pub height: usize,
  pub mi_rows: usize,
  pub mi_cols: usize,
  pub rd: RdParams,
  /// Prediction references with their scale factors, by slot.
  pub refs: [Option<RefFrame<'a, T>>; INTER_REFS_PER_FRAME],
  /// Motion search planes, resampled to the frame size when the
  /// reference is scaled.
  pub search_refs: [Option<&'a Frame<T>>; INTER_REFS_PER_FRAME],
  pub sign_bias: [bool; TOTAL_REFS_PER_FRAME],
  /// Mode info of the previous frame when it has the same size.
  pub prev_mi: Option<&'a ModeInfoGrid>,
  pub mv_costs: MvCostTables,
  pub mode_costs: ModeCosts,
  /// First full pixel search step of motion search.
  pub mv_step_param: usize,
  pub backend: &'a dyn ConvolveBackend<T>,
  pub residual: &'a dyn ResidualCoder<T>,
}

impl<'a, T: Pixel> FrameInvariants<'a, T> {
  pub fn new(
    config: &'a EncoderConfig, frame_type: FrameType,
    backend: &'a dyn ConvolveBackend<T>, residual: &'a dyn ResidualCoder<T>,
  ) -> Self {
    let (width, height) = (config.width, config.height);
    let mi_cols = width.align_power_of_two_and_shift(MI_SIZE_LOG2);
    let mi_rows = height.align_power_of_two_and_shift(MI_SIZE_LOG2);
    let max_mv = width.min(height) as i32;
    FrameInvariants {
      config,
      frame_type,
      width,
      height,
      mi_rows,
      mi_cols,
      rd: RdParams::new(config.quantizer as i32),
      refs: [None, None, None],
      search_refs: [None; INTER_REFS_PER_FRAME],
      sign_bias: [false; TOTAL_REFS_PER_FRAME],
      prev_mi: None,
      mv_costs: MvCostTables::default(),
      mode_costs: ModeCosts::default(),
      mv_step_param: init_search_range(max_mv, &config.speed_settings),
      backend,
      residual,
    }
  }

  /// Makes `frame` available as `ref_type`. `search` is the copy motion
  /// search reads when the reference has another size than the frame.
  ///
  /// Returns `false` and leaves the slot empty when the size ratio is out
  /// of range.
  pub fn set_reference(
    &mut self, ref_type: RefType, frame: &'a Frame<T>,
    search: Option<&'a Frame<T>>,
  ) -> bool {
    let idx = ref_type.to_index();
    let rf = RefFrame::new(
      frame,
      self.width,
      self.height,
      self.sign_bias[ref_type as usize],
    );
    if !rf.sf.is_valid() {
      log::warn!(
        "{:?} of {}x{} cannot predict a {}x{} frame, skipped",
        ref_type,
        frame.width(),
        frame.height(),
        self.width,
        self.height
      );
      return false;
    }
    let search = if rf.sf.is_scaled() { search } else { Some(frame) };
    self.search_refs[idx] = search;
    // Prediction through the scale factors works even without a
    // resampled copy; only the motion search needs one.
    self.refs[idx] = Some(rf);
    true
  }

  #[inline]
  pub fn allow_hp(&self) -> bool {
    self.config.allow_high_precision_mv
  }

  #[inline]
  pub fn ref_frame(&self, ref_type: RefType) -> Option<&RefFrame<'a, T>> {
    if ref_type.is_inter() {
      self.refs[ref_type.to_index()].as_ref()
    } else {
      None
    }
  }
}

/// Output of one encoded frame.
#[derive(Debug, Clone)]
pub struct FrameResult<T: Pixel> {
  /// Reconstruction, with its borders extended.
  pub rec: Frame<T>,
  pub mode_info: ModeInfoGrid,
  /// Sum of the costs of every superblock.
  pub rd: RDCost,
}

/// Inter prediction and mode decision core, one frame at a time.
pub struct Encoder<T: Pixel> {
  config: EncoderConfig,
  pool: Option<Arc<ThreadPool>>,
  sign_bias: [bool; TOTAL_REFS_PER_FRAME],
  prev_mi: Option<ModeInfoGrid>,
  backend: Box<dyn ConvolveBackend<T>>,
  residual: Box<dyn ResidualCoder<T>>,
}

impl<T: Pixel> Encoder<T> {
  pub(crate) fn new(
    config: EncoderConfig, pool: Option<Arc<ThreadPool>>,
  ) -> Self {
    Encoder {
      config,
      pool,
      sign_bias: [false; TOTAL_REFS_PER_FRAME],
      prev_mi: None,
      backend: Box::new(RustConvolve),
      residual: Box::new(PixelQuantizer::new(config.quantizer as i32)),
    }
  }

  pub fn config(&self) -> &EncoderConfig {
    &self.config
  }

  /// Replaces the convolution kernels used for every prediction.
  pub fn set_convolve_backend(
    &mut self, backend: Box<dyn ConvolveBackend<T>>,
  ) {
    self.backend = backend;
  }

  /// Replaces the residual coder consulted by mode decision.
  pub fn set_residual_coder(&mut self, residual: Box<dyn ResidualCoder<T>>) {
    self.residual = residual;
  }

  /// Marks `ref_type` as lying after the current frame in display order.
  pub fn set_sign_bias(&mut self, ref_type: RefType, sign_bias: bool) {
    self.sign_bias[ref_type as usize] = sign_bias;
  }

  /// Encodes `source` against `refs`, given in LAST, GOLDEN, ALTREF order.
  ///
  /// # Errors
  ///
  /// - `FrameSizeMismatch` if `source` does not have the configured size.
  /// - `InvalidReference` if more than three references are passed or one
  ///   of them has another chroma sampling.
  pub fn encode_frame(
    &mut self, source: &Frame<T>, refs: &[Option<&Frame<T>>],
    frame_type: FrameType,
  ) -> Result<FrameResult<T>, EncoderStatus> {
    self.encode_frame_with_sink(source, refs, frame_type, &mut NullSink)
  }

  /// Like [`encode_frame`], and hands every committed block to `sink` in
  /// coding order.
  ///
  /// # Errors
  ///
  /// See [`encode_frame`].
  ///
  /// [`encode_frame`]: #method.encode_frame
  pub fn encode_frame_with_sink(
    &mut self, source: &Frame<T>, refs: &[Option<&Frame<T>>],
    frame_type: FrameType, sink: &mut dyn BlockSink,
  ) -> Result<FrameResult<T>, EncoderStatus> {
    let config = &self.config;
    if source.width() != config.width || source.height() != config.height
    {
      return Err(EncoderStatus::FrameSizeMismatch);
    }
    if refs.len() > INTER_REFS_PER_FRAME {
      return Err(EncoderStatus::InvalidReference);
    }
    let chroma_sampling = source.chroma_sampling();
    let mut slots = [None; INTER_REFS_PER_FRAME];
    if frame_type == FrameType::INTER {
      slots[..refs.len()].copy_from_slice(refs);
    }
    if slots.iter().flatten().any(|f| f.chroma_sampling() != chroma_sampling)
    {
      return Err(EncoderStatus::InvalidReference);
    }

    // Prediction reads up to FRAME_BORDER pixels outside a reference.
    let padded: Vec<Option<Frame<T>>> = slots
      .iter()
      .map(|r| {
        r.map(|f| {
          let mut f = f.clone();
          f.pad();
          f
        })
      })
      .collect();
    let scaled: Vec<Option<Frame<T>>> = padded
      .iter()
      .map(|r| {
        let r = r.as_ref()?;
        if r.width() == config.width && r.height() == config.height {
          return None;
        }
        let mut dst =
          Frame::new(config.width, config.height, chroma_sampling);
        let backend = self.backend.as_ref();
        scale_and_extend_frame(r, &mut dst, backend, config.bit_depth);
        Some(dst)
      })
      .collect();

    let mut fi = FrameInvariants::new(
      config,
      frame_type,
      self.backend.as_ref(),
      self.residual.as_ref(),
    );
    fi.sign_bias = self.sign_bias;
    fi.prev_mi = self.prev_mi.as_ref().filter(|prev| {
      frame_type == FrameType::INTER
        && prev.mi_rows == fi.mi_rows
        && prev.mi_cols == fi.mi_cols
    });
    let mut ref_count = 0;
    for ((rt, frame), search) in
      ALL_INTER_REFS.iter().zip(&padded).zip(&scaled)
    {
      if let Some(frame) = frame {
        if fi.set_reference(*rt, frame, search.as_ref()) {
          ref_count += 1;
        }
      }
    }

    // Blocks crossing the right or bottom edge read past the visible area.
    let mut source = source.clone();
    source.pad();

    let ti =
      TilingInfo::new(config.width, config.height, config.tile_rows_log2);
    let mut mode_info = ModeInfoGrid::new(ti.mi_rows, ti.mi_cols);
    let mut rec = Frame::new(config.width, config.height, chroma_sampling);

    let mut rd = RDCost::init();
    {
      let mut tiles: Vec<TileStateMut<'_, T>> = mode_info
        .tile_views_mut(ti.tile_height_mi())
        .into_iter()
        .zip(ti.tile_iter())
        .map(|(mi, tile)| TileStateMut::new(tile, &source, mi))
        .collect();

      let costs = match self.pool.as_ref() {
        Some(pool) => pool.install(|| encode_tiles(&fi, &mut tiles)),
        None => encode_tiles(&fi, &mut tiles),
      };

      for (ts, cost) in tiles.iter().zip(&costs) {
        rd.accumulate(cost);
        for pli in 0..PLANES {
          let rows = ts.plane_rows(pli);
          rec.planes[pli].copy_row_range_from(&ts.rec.planes[pli], rows);
        }
        for block in ts.coded.iter() {
          sink.write_block(block);
        }
      }
    }
    rec.pad();

    log::debug!(
      "{:?} frame {}x{}: {} tiles, {} references ({} scaled), {}",
      frame_type,
      config.width,
      config.height,
      ti.tile_count(),
      ref_count,
      scaled.iter().flatten().count(),
      rd
    );

    self.prev_mi = Some(mode_info.clone());
    Ok(FrameResult { rec, mode_info, rd })
  }
}

/// Runs every tile on the current rayon pool and returns their costs in
/// tile order.
fn encode_tiles<T: Pixel>(
  fi: &FrameInvariants<'_, T>, tiles: &mut [TileStateMut<'_, T>],
) -> Vec<RDCost> {
  tiles.par_iter_mut().map(|ts| partition::encode_tile(fi, ts)).collect()
}

#[cfg(test)]
pub(crate) mod test_util {
  use super::*;

  pub fn key_frame_invariants<'a, T: Pixel>(
    config: &'a EncoderConfig, backend: &'a dyn ConvolveBackend<T>,
    residual: &'a dyn ResidualCoder<T>,
  ) -> FrameInvariants<'a, T> {
    FrameInvariants::new(config, FrameType::KEY, backend, residual)
  }

  /// Inter frame with `reference` as LAST. `reference` must be padded.
  pub fn inter_frame_invariants<'a, T: Pixel>(
    config: &'a EncoderConfig, reference: &'a Frame<T>,
    backend: &'a dyn ConvolveBackend<T>, residual: &'a dyn ResidualCoder<T>,
  ) -> FrameInvariants<'a, T> {
    let mut fi =
      FrameInvariants::new(config, FrameType::INTER, backend, residual);
    assert!(fi.set_reference(LAST_FRAME, reference, None));
    fi
  }

  /// Runs `f` on the state of the first tile of a frame sized by `fi`.
  pub fn with_tile_state<T: Pixel, R>(
    fi: &FrameInvariants<'_, T>, src: &Frame<T>,
    f: impl FnOnce(&mut TileStateMut<'_, T>) -> R,
  ) -> R {
    let ti = TilingInfo::new(fi.width, fi.height, 0);
    let mut grid = ModeInfoGrid::new(fi.mi_rows, fi.mi_cols);
    let mut views = grid.tile_views_mut(ti.tile_height_mi());
    let view = views.remove(0);
    let mut ts = TileStateMut::new(ti.tile_info(0), src, view);
    f(&mut ts)
  }
}
