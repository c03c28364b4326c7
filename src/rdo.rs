// Copyright (c) 2001-2016, Alliance for Open Media. All rights reserved
// Copyright (c) 2017-2023, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use crate::context::*;
use crate::dist::*;
use crate::encoder::block::*;
use crate::encoder::{FrameInvariants, FrameType};
use crate::entropymode::cost_bit;
use crate::frame::*;
use crate::mc::MotionVector;
use crate::me::*;
use crate::mvref::*;
use crate::partition::PredictionMode::*;
use crate::partition::RefType::*;
use crate::partition::*;
use crate::tiling::*;
use crate::util::*;

use arrayvec::ArrayVec;

use std::fmt;

pub const RDDIV_BITS: u32 = 7;
pub const RD_EPB_SHIFT: u32 = 6;

/// Rate, distortion and the Lagrangian cost combining them.
///
/// A rate of `i32::MAX` or a distortion of `i64::MAX` marks an infeasible
/// result; its cost is `i64::MAX` and it poisons every sum it enters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RDCost {
  /// In 1/256 bit.
  pub rate: i32,
  pub dist: i64,
  pub rdcost: i64,
}

impl RDCost {
  pub const fn init() -> Self {
    RDCost { rate: 0, dist: 0, rdcost: 0 }
  }

  pub const fn reset() -> Self {
    RDCost { rate: i32::MAX, dist: i64::MAX, rdcost: i64::MAX }
  }

  #[inline]
  pub const fn is_valid(&self) -> bool {
    self.rate != i32::MAX && self.dist != i64::MAX
  }

  #[inline]
  pub fn set_rdcost(&mut self, rd: &RdParams) {
    self.rdcost = rd.rdcost(self.rate, self.dist);
  }

  /// Adds `other` into a running sum.
  pub fn accumulate(&mut self, other: &RDCost) {
    if !self.is_valid() || !other.is_valid() {
      *self = RDCost::reset();
      return;
    }
    self.rate = self.rate.saturating_add(other.rate);
    self.dist = self.dist.saturating_add(other.dist);
    self.rdcost = self.rdcost.saturating_add(other.rdcost);
  }
}

impl Default for RDCost {
  fn default() -> Self {
    RDCost::reset()
  }
}

impl fmt::Display for RDCost {
  fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
    if self.is_valid() {
      write!(f, "rate {} dist {} rd {}", self.rate, self.dist, self.rdcost)
    } else {
      write!(f, "infeasible")
    }
  }
}

/// Lagrangian parameters derived from the quantizer step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RdParams {
  pub qstep: i32,
  pub rdmult: i64,
  pub rddiv: u32,
  pub error_per_bit: u32,
  pub sad_per_bit: u32,
}

impl RdParams {
  pub fn new(qstep: i32) -> Self {
    let qstep = qstep.max(1);
    let q = 8 * i64::from(qstep);
    let rdmult = (88 * q * q / 24).max(1);
    let sad_per_bit = (0.0418 * f64::from(2 * qstep) + 2.4107) as u32;
    RdParams {
      qstep,
      rdmult,
      rddiv: RDDIV_BITS,
      error_per_bit: ((rdmult >> RD_EPB_SHIFT) as u32).max(1),
      sad_per_bit: sad_per_bit.max(1),
    }
  }

  /// The quantizer in the units the variance thresholds are tuned for.
  #[inline]
  pub fn q_real(&self) -> i64 {
    2 * i64::from(self.qstep)
  }

  #[inline]
  pub fn rdcost(&self, rate: i32, dist: i64) -> i64 {
    if rate == i32::MAX || dist == i64::MAX {
      return i64::MAX;
    }
    ((128 + i64::from(rate) * self.rdmult) >> 8)
      .saturating_add(dist.saturating_mul(1 << self.rddiv))
  }
}

/// Outcome of coding the residual of one block in one plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResidualResult {
  pub rate: i32,
  /// Squared error of the reconstruction.
  pub dist: i64,
  /// Squared error of the prediction alone.
  pub sse: i64,
  /// No coefficient survived quantization.
  pub skippable: bool,
}

impl Default for ResidualResult {
  fn default() -> Self {
    ResidualResult { rate: 0, dist: 0, sse: 0, skippable: true }
  }
}

impl ResidualResult {
  pub fn accumulate(&mut self, other: &ResidualResult) {
    self.rate = self.rate.saturating_add(other.rate);
    self.dist += other.dist;
    self.sse += other.sse;
    self.skippable &= other.skippable;
  }
}

/// Transform, quantization and token costing of a residual.
///
/// Implementations code `src - pred` over a `w` x `h` area made of whole
/// `tx_size` blocks and write the reconstruction into `rec`. `ctx` is the
/// entropy context (0..=2) of the first token.
pub trait ResidualCoder<T: Pixel>: Send + Sync {
  fn code_block(
    &self, src: &PlaneSlice<'_, T>, pred: &PlaneSlice<'_, T>,
    rec: &mut PlaneMutSlice<'_, T>, w: usize, h: usize, tx_size: TxSize,
    ctx: usize, bit_depth: usize,
  ) -> ResidualResult;
}

/// Chance that a transform block codes no coefficient, by context.
const EMPTY_BLOCK_PROBS: [u8; 3] = [200, 128, 64];
const ZERO_TOKEN_COST: u32 = 64;

/// Pixel domain quantizer with a uniform step and an approximate token
/// cost model.
#[derive(Clone, Copy, Debug)]
pub struct PixelQuantizer {
  pub qstep: i32,
}

impl PixelQuantizer {
  pub fn new(qstep: i32) -> Self {
    PixelQuantizer { qstep: qstep.max(1) }
  }

  #[inline]
  fn level_cost(level: i32) -> u32 {
    256 * (2 + 2 * msb(level.abs()) as u32)
  }
}

impl<T: Pixel> ResidualCoder<T> for PixelQuantizer {
  fn code_block(
    &self, src: &PlaneSlice<'_, T>, pred: &PlaneSlice<'_, T>,
    rec: &mut PlaneMutSlice<'_, T>, w: usize, h: usize, tx_size: TxSize,
    ctx: usize, bit_depth: usize,
  ) -> ResidualResult {
    let step = tx_size.width();
    debug_assert!(w % step == 0 && h % step == 0);
    let q = self.qstep;
    let mut res = ResidualResult::default();
    for ty in (0..h).step_by(step) {
      for tx in (0..w).step_by(step) {
        let mut rate = 0;
        let mut zero_run = 0;
        let mut nonzero = false;
        for y in ty..ty + step {
          let src_row = &src[y][tx..tx + step];
          let pred_row = &pred[y][tx..tx + step];
          let rec_row = &mut rec[y][tx..tx + step];
          for ((&s, &p), r) in
            src_row.iter().zip(pred_row).zip(rec_row.iter_mut())
          {
            let (s, p) = (i32::cast_from(s), i32::cast_from(p));
            let diff = s - p;
            let level = (diff.abs() + q / 2) / q * diff.signum();
            let recon = clip_pixel::<T>(p + level * q, bit_depth);
            *r = recon;
            let err = i64::from(s - i32::cast_from(recon));
            res.dist += err * err;
            res.sse += i64::from(diff) * i64::from(diff);
            if level == 0 {
              zero_run += 1;
            } else {
              rate += ZERO_TOKEN_COST * zero_run + Self::level_cost(level);
              zero_run = 0;
              nonzero = true;
            }
          }
        }
        rate += cost_bit(EMPTY_BLOCK_PROBS[ctx.min(2)], nonzero);
        res.rate = res.rate.saturating_add(rate as i32);
        res.skippable &= !nonzero;
      }
    }
    res
  }
}

/// A leaf committed by the final encode of a superblock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodedBlock {
  pub mi_row: usize,
  pub mi_col: usize,
  pub mi: ModeInfo,
}

/// Receives every committed leaf, in coding order. This is where a
/// tokenizer would be attached.
pub trait BlockSink {
  fn write_block(&mut self, block: &CodedBlock);
}

/// Discards every block.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl BlockSink for NullSink {
  fn write_block(&mut self, _block: &CodedBlock) {}
}

impl BlockSink for Vec<CodedBlock> {
  fn write_block(&mut self, block: &CodedBlock) {
    self.push(*block);
  }
}

/// Best mode found for one node of the partition search.
#[derive(Clone, Copy, Debug)]
pub struct PickModeContext {
  pub mic: ModeInfo,
  /// Cost of the block without its partition symbol.
  pub rd: RDCost,
  pub skippable: bool,
  /// NEWMV vectors found while searching this node, by `RefType`.
  pub pred_mv: [MotionVector; TOTAL_REFS_PER_FRAME],
}

impl Default for PickModeContext {
  fn default() -> Self {
    PickModeContext {
      mic: ModeInfo::default(),
      rd: RDCost::reset(),
      skippable: false,
      pred_mv: [MotionVector::ZERO; TOTAL_REFS_PER_FRAME],
    }
  }
}

/// Writes `bmi` into every 4x4 of the prediction label starting at
/// sub-block `block`.
fn set_label(mi: &mut ModeInfo, block: usize, bmi: BModeInfo) {
  mi.bmi[block] = bmi;
  if mi.sb_type.num_4x4_high() == 2 {
    mi.bmi[block + 2] = bmi;
  }
  if mi.sb_type.num_4x4_wide() == 2 {
    mi.bmi[block + 1] = bmi;
  }
}

/// Sub-block indices starting a prediction label, in coding order.
fn label_starts(bsize: BlockSize) -> impl Iterator<Item = usize> {
  let (n4w, n4h) = (bsize.num_4x4_wide(), bsize.num_4x4_high());
  (0..2)
    .step_by(n4h)
    .flat_map(move |idy| (0..2).step_by(n4w).map(move |idx| idy * 2 + idx))
}

struct ModeSearch<'r, 'f, 't, T: Pixel> {
  fi: &'r FrameInvariants<'f, T>,
  ts: &'r mut TileStateMut<'t, T>,
  mi_row: usize,
  mi_col: usize,
  bsize: BlockSize,
  edges: MbEdges,
  skip_ctx: usize,
  best: RDCost,
  best_mi: Option<ModeInfo>,
  best_skippable: bool,
}

impl<'r, 'f, 't, T: Pixel> ModeSearch<'r, 'f, 't, T> {
  fn consider(&mut self, rd: RDCost, mi: ModeInfo, skippable: bool) {
    if rd.rdcost < self.best.rdcost {
      self.best = rd;
      self.best_mi = Some(mi);
      self.best_skippable = skippable;
    }
  }

  fn coeff_ctx(&self, pli: usize) -> usize {
    self.ts.bc.coeff_context(
      pli,
      self.mi_row,
      self.mi_col,
      context_bsize(self.bsize),
    )
  }

  fn ref_rate(&self, ref_frame: RefType) -> i32 {
    match self.fi.frame_type {
      FrameType::KEY => 0,
      FrameType::INTER => self.fi.mode_costs.reference(ref_frame) as i32,
    }
  }

  fn finish(&self, mi: &ModeInfo, rate: i32, dist: i64) -> RDCost {
    let mut rd = RDCost { rate, dist, rdcost: 0 };
    rd.set_rdcost(&self.fi.rd);
    debug_assert_eq!(mi.sb_type, self.bsize);
    rd
  }

  fn search_intra(&mut self) {
    let (mi_row, mi_col) = (self.mi_row, self.mi_col);
    let ref_rate = self.ref_rate(INTRA_FRAME);
    for &mode in RD_INTRA_MODES {
      let mi = ModeInfo {
        sb_type: self.bsize,
        mode,
        uv_mode: mode,
        tx_size: self.bsize.max_tx_size(),
        ..Default::default()
      };
      let mut res = ResidualResult::default();
      for pli in 0..PLANES {
        let ctx = self.coeff_ctx(pli);
        let r = encode_intra_plane(
          self.fi, self.ts, &mi, pli, mi_row, mi_col, ctx,
        );
        res.accumulate(&r);
      }
      let mode_rate = self.fi.mode_costs.intra_mode(self.bsize, mode) as i32;
      let skip_rate =
        self.fi.mode_costs.skip[self.skip_ctx][res.skippable as usize] as i32;
      let mi = ModeInfo { skip: res.skippable, ..mi };
      let rate = ref_rate + mode_rate + res.rate + skip_rate;
      let rd = self.finish(&mi, rate, res.dist);
      self.consider(rd, mi, res.skippable);
    }
  }

  /// Codes the luma 4x4 blocks of one label with `mode`.
  fn intra_label(
    &mut self, mode: PredictionMode, block: usize, ctx: usize,
  ) -> ResidualResult {
    let cfg = &self.ts.rec.planes[0].cfg;
    let (plane_w, plane_h) = (cfg.width, cfg.height);
    let (n4w, n4h) = (self.bsize.num_4x4_wide(), self.bsize.num_4x4_high());
    let x0 = self.mi_col * MI_SIZE + 4 * (block & 1);
    let y0 = self.mi_row * MI_SIZE + 4 * (block >> 1);
    let mut res = ResidualResult::default();
    for y in (y0..y0 + 4 * n4h).step_by(4) {
      for x in (x0..x0 + 4 * n4w).step_by(4) {
        if x >= plane_w || y >= plane_h {
          continue;
        }
        let r =
          encode_intra_tx(
            self.fi,
            self.ts,
            0,
            x,
            y,
            TxSize::TX_4X4,
            mode,
            ctx,
          );
        res.accumulate(&r);
      }
    }
    res
  }

  fn search_intra_sub8x8(&mut self) {
    let fi = self.fi;
    let mut mi = ModeInfo {
      sb_type: self.bsize,
      tx_size: TxSize::TX_4X4,
      ..Default::default()
    };
    let ctx = self.coeff_ctx(0);
    let mut res = ResidualResult::default();
    let mut mode_rate = self.ref_rate(INTRA_FRAME);
    for block in label_starts(self.bsize) {
      let mut best: Option<(i64, PredictionMode)> = None;
      for &mode in RD_INTRA_MODES {
        let r = self.intra_label(mode, block, ctx);
        let rate =
          fi.mode_costs.intra_mode(BlockSize::BLOCK_4X4, mode) as i32 + r.rate;
        let cost = fi.rd.rdcost(rate, r.dist);
        if best.map_or(true, |(c, _)| cost < c) {
          best = Some((cost, mode));
        }
      }
      let Some((_, mode)) = best else { return };
      // Leave the chosen mode's reconstruction for the next label.
      res.accumulate(&self.intra_label(mode, block, ctx));
      mode_rate += fi.mode_costs.intra_mode(BlockSize::BLOCK_4X4, mode) as i32;
      set_label(&mut mi, block, BModeInfo { mode, ..Default::default() });
    }
    mi.finalize_sub8x8();
    mi.uv_mode = mi.mode;
    for pli in 1..PLANES {
      let ctx = self.coeff_ctx(pli);
      let r = encode_intra_plane(
        fi,
        self.ts,
        &mi,
        pli,
        self.mi_row,
        self.mi_col,
        ctx,
      );
      res.accumulate(&r);
    }
    mi.skip = res.skippable;
    let skip_rate = fi.mode_costs.skip[self.skip_ctx][res.skippable as usize];
    let rate = mode_rate + res.rate + skip_rate as i32;
    let rd = self.finish(&mi, rate, res.dist);
    self.consider(rd, mi, res.skippable);
  }

  /// Predicts all planes of `mi`, codes the residual and settles the skip
  /// flag by comparing coding against dropping the residual.
  fn inter_rd(&mut self, mi: &mut ModeInfo, base_rate: i32) -> (RDCost, bool) {
    let (mi_row, mi_col) = (self.mi_row, self.mi_col);
    build_inter_prediction(self.fi, self.ts, mi, mi_row, mi_col, 0..PLANES);
    let mut res = ResidualResult::default();
    for pli in 0..PLANES {
      let ctx = self.coeff_ctx(pli);
      let r =
        code_inter_plane(
          self.fi, self.ts, pli, mi_row, mi_col, self.bsize, ctx,
        );
      res.accumulate(&r);
    }
    let skip_cost = self.fi.mode_costs.skip[self.skip_ctx];
    let coded_rate = base_rate + res.rate + skip_cost[0] as i32;
    let skipped_rate = base_rate + skip_cost[1] as i32;
    let rd_coded = self.fi.rd.rdcost(coded_rate, res.dist);
    let rd_skipped = self.fi.rd.rdcost(skipped_rate, res.sse);
    mi.skip = res.skippable || rd_skipped < rd_coded;
    let rd = if mi.skip {
      self.finish(mi, skipped_rate, res.sse)
    } else {
      self.finish(mi, coded_rate, res.dist)
    };
    (rd, res.skippable)
  }

  /// Full pel motion search followed by sub-pel refinement for the `w` x
  /// `h` area at luma position `(x, y)`.
  fn new_mv(
    &mut self, ref_frame: RefType, ref_mv: MotionVector,
    cands: [MotionVector; 2], x: usize, y: usize, w: usize, h: usize,
    limits: MvLimits,
  ) -> Option<NewMvResult> {
    let fi = self.fi;
    let pre = fi.search_refs[ref_frame.to_index()]?;
    let sf = &fi.config.speed_settings;
    let po = PlaneOffset { x: x as isize, y: y as isize };
    let ms = MotionSearch {
      src: self.ts.input.planes[0].slice(po),
      pre: pre.planes[0].slice(po),
      w,
      h,
      limits,
      costs: &fi.mv_costs,
      allow_hp: fi.allow_hp(),
      sad_per_bit: fi.rd.sad_per_bit,
      error_per_bit: fi.rd.error_per_bit,
    };
    let mut candidates: ArrayVec<MotionVector, 3> =
      cands.into_iter().collect();
    if sf.adaptive_motion_search {
      candidates.push(self.ts.pred_mv[ref_frame as usize]);
    }
    single_motion_search(
      &ms,
      self.bsize,
      ref_mv,
      &candidates,
      fi.mv_step_param,
      sf,
    )
  }

  fn search_inter(&mut self, ref_frame: RefType) {
    let fi = self.fi;
    let (mi_row, mi_col, bsize) = (self.mi_row, self.mi_col, self.bsize);
    let refs = MvRefSearch {
      mi: &self.ts.mi,
      prev: fi.prev_mi,
      sign_bias: fi.sign_bias,
    }
    .find_mv_refs(mi_row, mi_col, bsize, ref_frame, None, &self.edges);
    let (nearest, near) =
      find_best_ref_mvs(&refs.list, fi.allow_hp(), &self.edges);
    let mode_ctx = refs.mode_context.index();
    let limits = MvLimits::new(mi_row, mi_col, bsize, fi.mi_rows, fi.mi_cols);
    let ref_rate = self.ref_rate(ref_frame);

    for &mode in RD_INTER_MODES {
      let (mv, rate_mv) = match mode {
        NEARESTMV if nearest.is_zero() => continue,
        NEARESTMV => (nearest, 0),
        NEARMV if near.is_zero() || near == nearest => continue,
        NEARMV => (near, 0),
        ZEROMV => (MotionVector::ZERO, 0),
        _ => {
          let Some(found) = self.new_mv(
            ref_frame,
            nearest,
            [nearest, near],
            mi_col * MI_SIZE,
            mi_row * MI_SIZE,
            bsize.width(),
            bsize.height(),
            limits,
          ) else {
            continue;
          };
          self.ts.pred_mv[ref_frame as usize] = found.mv;
          (found.mv, found.rate_mv)
        }
      };
      if !limits.contains(mv.to_fullpel()) {
        continue;
      }
      let mut mi = ModeInfo {
        sb_type: bsize,
        mode,
        ref_frame: [ref_frame, NONE_FRAME],
        mv: [mv, MotionVector::ZERO],
        tx_size: bsize.max_tx_size(),
        interp_filter: fi.config.interp_filter,
        ..Default::default()
      };
      mi.mode_context[ref_frame as usize] = mode_ctx as u8;
      let base_rate = ref_rate
        + fi.mode_costs.inter_mode(mode_ctx, mode) as i32
        + rate_mv as i32;
      let (rd, skippable) = self.inter_rd(&mut mi, base_rate);
      self.consider(rd, mi, skippable);
    }
  }

  /// Picks a mode and vector for each label of a sub-8x8 block from its
  /// luma prediction error, then codes the block as a whole.
  fn search_inter_sub8x8(&mut self, ref_frame: RefType) {
    let fi = self.fi;
    let (mi_row, mi_col, bsize) = (self.mi_row, self.mi_col, self.bsize);
    let refs = MvRefSearch {
      mi: &self.ts.mi,
      prev: fi.prev_mi,
      sign_bias: fi.sign_bias,
    }
    .find_mv_refs(mi_row, mi_col, bsize, ref_frame, None, &self.edges);
    let (best_ref_mv, _) =
      find_best_ref_mvs(&refs.list, fi.allow_hp(), &self.edges);
    let mode_ctx = refs.mode_context.index();
    let limits = MvLimits::new(
      mi_row,
      mi_col,
      BlockSize::BLOCK_8X8,
      fi.mi_rows,
      fi.mi_cols,
    );
    let allow_hp = fi.allow_hp();
    let (lw, lh) = (4 * bsize.num_4x4_wide(), 4 * bsize.num_4x4_high());

    let mut mi = ModeInfo {
      sb_type: bsize,
      ref_frame: [ref_frame, NONE_FRAME],
      tx_size: TxSize::TX_4X4,
      interp_filter: fi.config.interp_filter,
      ..Default::default()
    };
    mi.mode_context[ref_frame as usize] = mode_ctx as u8;
    let mut label_rate = 0;

    for block in label_starts(bsize) {
      let (nearest, near) = MvRefSearch {
        mi: &self.ts.mi,
        prev: fi.prev_mi,
        sign_bias: fi.sign_bias,
      }
      .append_sub8x8_mvs_for_idx(&mi, block, 0, mi_row, mi_col, &self.edges);
      let (nearest, near) =
        (nearest.lower_precision(allow_hp), near.lower_precision(allow_hp));
      let x = mi_col * MI_SIZE + 4 * (block & 1);
      let y = mi_row * MI_SIZE + 4 * (block >> 1);
      let po = PlaneOffset { x: x as isize, y: y as isize };

      let mut best: Option<(i64, BModeInfo, i32)> = None;
      for &mode in RD_INTER_MODES {
        let (mv, rate_mv) = match mode {
          NEARESTMV if nearest.is_zero() => continue,
          NEARESTMV => (nearest, 0),
          NEARMV if near.is_zero() || near == nearest => continue,
          NEARMV => (near, 0),
          ZEROMV => (MotionVector::ZERO, 0),
          _ => {
            match self.new_mv(
              ref_frame,
              best_ref_mv,
              [nearest, near],
              x,
              y,
              lw,
              lh,
              limits,
            ) {
              Some(found) => (found.mv, found.rate_mv),
              None => continue,
            }
          }
        };
        if !limits.contains(mv.to_fullpel()) {
          continue;
        }
        let bmi = BModeInfo { mode, mv: [mv, MotionVector::ZERO] };
        set_label(&mut mi, block, bmi);
        build_inter_prediction(fi, self.ts, &mi, mi_row, mi_col, 0..1);
        let sse = get_sse(
          &self.ts.input.planes[0].slice(po),
          &self.ts.pred.planes[0].slice(po),
          lw,
          lh,
        );
        let rate =
          fi.mode_costs.inter_mode(mode_ctx, mode) as i32 + rate_mv as i32;
        let cost = fi.rd.rdcost(rate, sse as i64);
        if best.map_or(true, |(c, ..)| cost < c) {
          best = Some((cost, bmi, rate));
        }
      }
      let Some((_, bmi, rate)) = best else { return };
      set_label(&mut mi, block, bmi);
      label_rate += rate;
    }
    mi.finalize_sub8x8();

    let base_rate = self.ref_rate(ref_frame) + label_rate;
    let (rd, skippable) = self.inter_rd(&mut mi, base_rate);
    self.consider(rd, mi, skippable);
  }
}

/// Searches the intra and inter modes of the `bsize` block at
/// `(mi_row, mi_col)`.
///
/// Returns the cost of the best mode, stored in `ctx`, or an infeasible
/// cost (leaving `ctx` untouched) when nothing beats `best_rd`.
pub fn rd_pick_sb_modes<T: Pixel>(
  fi: &FrameInvariants<'_, T>, ts: &mut TileStateMut<'_, T>, mi_row: usize,
  mi_col: usize, bsize: BlockSize, ctx: &mut PickModeContext, best_rd: i64,
) -> RDCost {
  let edges = MbEdges::new(mi_row, mi_col, bsize, fi.mi_rows, fi.mi_cols);
  let skip_ctx = skip_context(&ts.mi, mi_row, mi_col);
  let mut search = ModeSearch {
    fi,
    ts,
    mi_row,
    mi_col,
    bsize,
    edges,
    skip_ctx,
    best: RDCost { rdcost: best_rd, ..RDCost::reset() },
    best_mi: None,
    best_skippable: false,
  };

  if bsize.is_sub8x8() {
    search.search_intra_sub8x8();
  } else {
    search.search_intra();
  }

  if fi.frame_type == FrameType::INTER {
    for &ref_frame in ALL_INTER_REFS.iter() {
      if fi.ref_frame(ref_frame).is_none() {
        continue;
      }
      if bsize.is_sub8x8() {
        search.search_inter_sub8x8(ref_frame);
      } else {
        search.search_inter(ref_frame);
      }
    }
  }

  match search.best_mi {
    Some(mi) => {
      ctx.mic = mi;
      ctx.rd = search.best;
      ctx.skippable = search.best_skippable;
      search.best
    }
    None => RDCost::reset(),
  }
}
