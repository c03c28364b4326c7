// Copyright (c) 2017-2023, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use super::FrameInvariants;

use crate::context::*;
use crate::frame::*;
use crate::partition::*;
use crate::predict::*;
use crate::rdo::*;
use crate::tiling::*;
use crate::util::*;

use std::ops::Range;

pub const PLANES: usize = 3;

/// Size used for the contexts of a block; sub-8x8 blocks share one 8x8.
#[inline]
pub fn context_bsize(bsize: BlockSize) -> BlockSize {
  if bsize.is_sub8x8() {
    BlockSize::BLOCK_8X8
  } else {
    bsize
  }
}

/// Transform size of plane `pli` for a `bsize` block.
#[inline]
pub fn plane_tx_size(
  pli: usize, bsize: BlockSize, xdec: usize, ydec: usize,
) -> TxSize {
  let tx_size = bsize.max_tx_size();
  if pli == 0 {
    tx_size
  } else {
    tx_size.uv_tx_size(bsize, xdec, ydec)
  }
}

/// Position and extent of a block in one plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaneBlock {
  pub x: usize,
  pub y: usize,
  pub w: usize,
  pub h: usize,
  pub plane_w: usize,
  pub plane_h: usize,
}

impl PlaneBlock {
  pub fn new(
    cfg: &PlaneConfig, mi_row: usize, mi_col: usize, bsize: BlockSize,
  ) -> Self {
    let bsize = context_bsize(bsize);
    PlaneBlock {
      x: (mi_col * MI_SIZE) >> cfg.xdec,
      y: (mi_row * MI_SIZE) >> cfg.ydec,
      w: (bsize.width() >> cfg.xdec).max(4),
      h: (bsize.height() >> cfg.ydec).max(4),
      plane_w: cfg.width,
      plane_h: cfg.height,
    }
  }

  #[inline]
  pub fn offset(&self) -> PlaneOffset {
    PlaneOffset { x: self.x as isize, y: self.y as isize }
  }

  /// Extent inside the visible plane, rounded up to whole `tx_size`
  /// blocks.
  pub fn coded_size(&self, tx_size: TxSize) -> (usize, usize) {
    let n = tx_size.width_log2();
    let w = self.w.min(self.plane_w.saturating_sub(self.x));
    let h = self.h.min(self.plane_h.saturating_sub(self.y));
    (w.align_power_of_two(n).min(self.w), h.align_power_of_two(n).min(self.h))
  }
}

/// Predicts one intra transform block of plane `pli` at `(x, y)` from the
/// tile's reconstruction and codes its residual.
pub fn encode_intra_tx<T: Pixel>(
  fi: &FrameInvariants<'_, T>, ts: &mut TileStateMut<'_, T>, pli: usize,
  x: usize, y: usize, tx_size: TxSize, mode: PredictionMode, ctx: usize,
) -> ResidualResult {
  let bit_depth = fi.config.bit_depth;
  let size = tx_size.width();
  let ydec = ts.rec.planes[pli].cfg.ydec;
  let tile_top = (ts.tile.mi_row_start * MI_SIZE) >> ydec;
  let have_above = y > tile_top;
  let have_left = x > 0;
  let po = PlaneOffset { x: x as isize, y: y as isize };

  let edge = IntraEdge::new(
    &ts.rec.planes[pli],
    x,
    y,
    size,
    have_above,
    have_left,
    bit_depth,
  );
  predict_intra(
    mode,
    &mut ts.pred.planes[pli].mut_slice(po),
    &edge,
    size,
    have_above,
    have_left,
    bit_depth,
  );
  fi.residual.code_block(
    &ts.input.planes[pli].slice(po),
    &ts.pred.planes[pli].slice(po),
    &mut ts.rec.planes[pli].mut_slice(po),
    size,
    size,
    tx_size,
    ctx,
    bit_depth,
  )
}

/// Codes plane `pli` of the intra block `mi`, transform block by transform
/// block in raster order so each one predicts from its coded neighbours.
pub fn encode_intra_plane<T: Pixel>(
  fi: &FrameInvariants<'_, T>, ts: &mut TileStateMut<'_, T>, mi: &ModeInfo,
  pli: usize, mi_row: usize, mi_col: usize, ctx: usize,
) -> ResidualResult {
  let bsize = mi.sb_type;
  let cfg = &ts.rec.planes[pli].cfg;
  let pb = PlaneBlock::new(cfg, mi_row, mi_col, bsize);
  let tx_size = plane_tx_size(pli, bsize, cfg.xdec, cfg.ydec);
  let step = tx_size.width();

  let mut res = ResidualResult::default();
  for ty in (0..pb.h).step_by(step) {
    for tx in (0..pb.w).step_by(step) {
      let (x, y) = (pb.x + tx, pb.y + ty);
      if x >= pb.plane_w || y >= pb.plane_h {
        continue;
      }
      let mode = match pli {
        0 if bsize.is_sub8x8() => mi.bmi[(ty >> 2) * 2 + (tx >> 2)].mode,
        0 => mi.mode,
        _ => mi.uv_mode,
      };
      res.accumulate(&encode_intra_tx(fi, ts, pli, x, y, tx_size, mode, ctx));
    }
  }
  res
}

/// Builds the inter prediction of `mi` into the tile's prediction frame.
pub fn build_inter_prediction<T: Pixel>(
  fi: &FrameInvariants<'_, T>, ts: &mut TileStateMut<'_, T>, mi: &ModeInfo,
  mi_row: usize, mi_col: usize, planes: Range<usize>,
) {
  let edges = MbEdges::new(mi_row, mi_col, mi.sb_type, fi.mi_rows, fi.mi_cols);
  let cfg = &ts.pred.planes[1].cfg;
  let predictor = InterPredictor {
    backend: fi.backend,
    kernel: mi.interp_filter.kernel(),
    bit_depth: fi.config.bit_depth,
    xdec: cfg.xdec,
    ydec: cfg.ydec,
  };
  let refs = [fi.ref_frame(mi.ref_frame[0]), fi.ref_frame(mi.ref_frame[1])];
  predictor.build_inter_predictors_sb(
    &mut ts.pred,
    refs,
    mi,
    mi_row,
    mi_col,
    &edges,
    planes,
    &mut ts.mc_buf,
  );
}

/// Codes the residual of plane `pli` against the prediction already built
/// for the block.
pub fn code_inter_plane<T: Pixel>(
  fi: &FrameInvariants<'_, T>, ts: &mut TileStateMut<'_, T>, pli: usize,
  mi_row: usize, mi_col: usize, bsize: BlockSize, ctx: usize,
) -> ResidualResult {
  let cfg = &ts.rec.planes[pli].cfg;
  let pb = PlaneBlock::new(cfg, mi_row, mi_col, bsize);
  let tx_size = plane_tx_size(pli, bsize, cfg.xdec, cfg.ydec);
  let (w, h) = pb.coded_size(tx_size);
  let po = pb.offset();
  fi.residual.code_block(
    &ts.input.planes[pli].slice(po),
    &ts.pred.planes[pli].slice(po),
    &mut ts.rec.planes[pli].mut_slice(po),
    w,
    h,
    tx_size,
    ctx,
    fi.config.bit_depth,
  )
}

/// Uses the prediction of plane `pli` as its reconstruction.
pub fn copy_prediction<T: Pixel>(
  ts: &mut TileStateMut<'_, T>, pli: usize, mi_row: usize, mi_col: usize,
  bsize: BlockSize,
) {
  let pb = PlaneBlock::new(&ts.rec.planes[pli].cfg, mi_row, mi_col, bsize);
  let w = pb.w.min(pb.plane_w - pb.x);
  let h = pb.h.min(pb.plane_h - pb.y);
  let po = pb.offset();
  let pred = ts.pred.planes[pli].slice(po);
  ts.rec.planes[pli].mut_slice(po).copy_from(&pred, w, h);
}

/// Commits the mode chosen in `ctx` for the `bsize` block: writes the
/// mode info, rebuilds the reconstruction and updates the coefficient
/// contexts. With `output_enabled` the block is also recorded for the sink.
pub fn encode_b<T: Pixel>(
  fi: &FrameInvariants<'_, T>, ts: &mut TileStateMut<'_, T>, mi_row: usize,
  mi_col: usize, bsize: BlockSize, ctx: &PickModeContext,
  output_enabled: bool,
) {
  let mi = ctx.mic;
  debug_assert_eq!(mi.sb_type, bsize);
  let cb = context_bsize(bsize);
  ts.mi.set_block(mi_row, mi_col, bsize, &mi);

  if mi.is_inter_block() {
    build_inter_prediction(fi, ts, &mi, mi_row, mi_col, 0..PLANES);
    for pli in 0..PLANES {
      let nonzero = if mi.skip {
        copy_prediction(ts, pli, mi_row, mi_col, bsize);
        false
      } else {
        let c = ts.bc.coeff_context(pli, mi_row, mi_col, cb);
        !code_inter_plane(fi, ts, pli, mi_row, mi_col, bsize, c).skippable
      };
      ts.bc.set_coeff_context(pli, mi_row, mi_col, cb, nonzero);
    }
  } else {
    for pli in 0..PLANES {
      let c = ts.bc.coeff_context(pli, mi_row, mi_col, cb);
      let res = encode_intra_plane(fi, ts, &mi, pli, mi_row, mi_col, c);
      ts.bc.set_coeff_context(pli, mi_row, mi_col, cb, !res.skippable);
    }
  }

  if output_enabled {
    ts.coded.push(CodedBlock { mi_row, mi_col, mi });
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::api::EncoderConfig;
  use crate::color::ChromaSampling;
  use crate::encoder::test_util::*;
  use crate::mc::RustConvolve;

  #[test]
  fn plane_block_clips_to_the_visible_area() {
    let frame = Frame::<u8>::new(36, 20, ChromaSampling::Cs420);
    let pb =
      PlaneBlock::new(&frame.planes[0].cfg, 0, 2, BlockSize::BLOCK_32X32);
    assert_eq!((pb.x, pb.w), (16, 32));
    assert_eq!(pb.coded_size(TxSize::TX_32X32), (32, 32));
    assert_eq!(pb.coded_size(TxSize::TX_4X4), (20, 20));
    let uv =
      PlaneBlock::new(&frame.planes[1].cfg, 2, 4, BlockSize::BLOCK_4X8);
    assert_eq!((uv.x, uv.y, uv.w, uv.h), (16, 8, 4, 4));
  }

  #[test]
  fn uv_transform_follows_decimation() {
    use BlockSize::*;
    assert_eq!(plane_tx_size(0, BLOCK_64X64, 1, 1), TxSize::TX_32X32);
    assert_eq!(plane_tx_size(1, BLOCK_64X64, 1, 1), TxSize::TX_32X32);
    assert_eq!(plane_tx_size(1, BLOCK_16X16, 1, 1), TxSize::TX_8X8);
    assert_eq!(plane_tx_size(1, BLOCK_8X8, 1, 1), TxSize::TX_4X4);
    assert_eq!(plane_tx_size(1, BLOCK_16X16, 0, 0), TxSize::TX_16X16);
  }

  #[test]
  fn committed_block_lands_in_grid_and_output() {
    let config = EncoderConfig { width: 32, height: 32, ..Default::default() };
    let mut src = Frame::<u8>::new(32, 32, ChromaSampling::Cs420);
    src.fill_with(|_, x, y| (64 + x + y) as u8);
    let pq = PixelQuantizer::new(config.quantizer as i32);
    let fi = key_frame_invariants(&config, &RustConvolve, &pq);
    with_tile_state(&fi, &src, |ts| {
      let ctx = PickModeContext {
        mic: ModeInfo {
          sb_type: BlockSize::BLOCK_16X16,
          mode: PredictionMode::TM_PRED,
          uv_mode: PredictionMode::DC_PRED,
          tx_size: TxSize::TX_16X16,
          ..Default::default()
        },
        ..Default::default()
      };
      encode_b(&fi, ts, 2, 2, BlockSize::BLOCK_16X16, &ctx, false);
      assert!(ts.coded.is_empty());
      assert_eq!(ts.mi.get(3, 3).mode, PredictionMode::TM_PRED);
      assert_eq!(ts.mi.get(1, 1).mode, PredictionMode::DC_PRED);
      encode_b(&fi, ts, 0, 0, BlockSize::BLOCK_16X16, &ctx, true);
      assert_eq!(ts.coded.len(), 1);
      assert_eq!(ts.coded[0].mi_col, 0);
    });
  }
}
