// Copyright (c) 2017-2022, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

use super::block::*;
use super::{FrameInvariants, FrameType};
use crate::api::{AutoMinMaxPartitionSize, PartitionSearchType};
use crate::context::*;
use crate::dist::*;
use crate::frame::*;
use crate::mc::MotionVector;
use crate::partition::BlockSize::*;
use crate::partition::PartitionType::*;
use crate::partition::RefType::*;
use crate::partition::*;
use crate::rdo::*;
use crate::tiling::*;
use crate::util::*;

/// Search state of one square node of a superblock's partition tree.
///
/// The tree is allocated once per tile and reused for every superblock;
/// the contexts of a node are only read back along the partitioning chosen
/// during the current search.
#[derive(Debug)]
pub struct PcTree {
  pub bsize: BlockSize,
  pub partitioning: PartitionType,
  /// Position among its siblings; the last child is committed by its
  /// parent instead of by itself.
  pub index: usize,
  pub none: PickModeContext,
  pub horizontal: [PickModeContext; 2],
  pub vertical: [PickModeContext; 2],
  /// Search of the 4x4 split of an 8x8 node, coded as one sub-8x8 block.
  pub leaf_split: PickModeContext,
  pub split: Vec<PcTree>,
}

impl PcTree {
  pub fn new(bsize: BlockSize) -> Self {
    debug_assert!(bsize.is_sqr() && bsize >= BLOCK_8X8);
    let split = match bsize {
      BLOCK_8X8 => Vec::new(),
      _ => {
        let subsize = square_subsize(bsize, PARTITION_SPLIT);
        (0..4)
          .map(|i| {
            let mut child = PcTree::new(subsize);
            child.index = i;
            child
          })
          .collect()
      }
    };
    PcTree {
      bsize,
      partitioning: PARTITION_NONE,
      index: 0,
      none: PickModeContext::default(),
      horizontal: [PickModeContext::default(); 2],
      vertical: [PickModeContext::default(); 2],
      leaf_split: PickModeContext::default(),
      split,
    }
  }

  /// Number of nodes in the tree.
  pub fn count(&self) -> usize {
    1 + self.split.iter().map(PcTree::count).sum::<usize>()
  }
}

/// Whether the frame's top or bottom edge falls within `mi_step` rows of
/// `mi_row`.
fn active_h_edge<T: Pixel>(
  fi: &FrameInvariants<'_, T>, mi_row: usize, mi_step: usize,
) -> bool {
  mi_row == 0 || (fi.mi_rows >= mi_row && fi.mi_rows < mi_row + mi_step)
}

fn active_v_edge<T: Pixel>(
  fi: &FrameInvariants<'_, T>, mi_col: usize, mi_step: usize,
) -> bool {
  mi_col == 0 || (fi.mi_cols >= mi_col && fi.mi_cols < mi_col + mi_step)
}

fn active_edge_sb<T: Pixel>(
  fi: &FrameInvariants<'_, T>, mi_row: usize, mi_col: usize,
) -> bool {
  active_h_edge(fi, mi_row, MI_BLOCK_SIZE)
    || active_v_edge(fi, mi_col, MI_BLOCK_SIZE)
}

fn set_partition_rd<T: Pixel>(
  fi: &FrameInvariants<'_, T>, rd: &mut RDCost, pl: usize,
  partition: PartitionType,
) {
  let cost = fi.mode_costs.partition[pl][partition as usize] as i32;
  rd.rate = rd.rate.saturating_add(cost);
  rd.set_rdcost(&fi.rd);
}

/// Size of the parts of a square block of at least 8x8.
fn square_subsize(bsize: BlockSize, partition: PartitionType) -> BlockSize {
  debug_assert!(bsize.is_sqr() && bsize >= BLOCK_8X8);
  bsize.subsize(partition).unwrap_or(bsize)
}

/// Recursive rate-distortion search of the partitioning of the `bsize`
/// square at `(mi_row, mi_col)`.
///
/// Candidates are tried in the order none, split, horizontal, vertical,
/// each one bounded by the best cost found so far. The winner is recorded
/// in `pc` and, unless this is the last child of its parent, committed
/// right away so that later siblings predict from it.
pub fn rd_pick_partition<T: Pixel>(
  fi: &FrameInvariants<'_, T>, ts: &mut TileStateMut<'_, T>,
  pc: &mut PcTree, mi_row: usize, mi_col: usize, bsize: BlockSize,
  best_rd: i64,
) -> RDCost {
  debug_assert!(bsize.is_sqr() && bsize >= BLOCK_8X8);
  let sf = &fi.config.speed_settings;
  let mi_step = bsize.width_mi() / 2;
  let pl = ts.bc.partition_plane_context(mi_row, mi_col, bsize);
  let (xdec, ydec) = {
    let cfg = &ts.input.planes[1].cfg;
    (cfg.xdec, cfg.ydec)
  };
  let (min_size, max_size) = (ts.min_partition_size, ts.max_partition_size);

  let force_horz_split = mi_row + mi_step >= fi.mi_rows;
  let force_vert_split = mi_col + mi_step >= fi.mi_cols;
  let in_range = bsize <= max_size && bsize > min_size;

  let none_allowed = !force_horz_split
    && !force_vert_split
    && bsize <= max_size
    && bsize >= min_size;
  let mut horz_allowed =
    !force_vert_split && ydec <= xdec && (in_range || force_horz_split);
  let mut vert_allowed =
    !force_horz_split && xdec <= ydec && (in_range || force_vert_split);
  let mut do_split = bsize > min_size;
  let mut do_rect = true;

  if sf.use_square_partition_only {
    horz_allowed &= force_horz_split;
    vert_allowed &= force_vert_split;
  }

  let checkpoint = ts.bc.checkpoint(mi_row, mi_col);
  let mut best = RDCost { rdcost: best_rd, ..RDCost::reset() };

  if none_allowed {
    let mut this = rd_pick_sb_modes(
      fi,
      ts,
      mi_row,
      mi_col,
      bsize,
      &mut pc.none,
      best.rdcost,
    );
    if this.is_valid() {
      set_partition_rd(fi, &mut this, pl, PARTITION_NONE);
      if this.rdcost < best.rdcost {
        best = this;
        pc.partitioning = PARTITION_NONE;

        let dist_thr = sf.partition_search_breakout_dist_thr
          >> (8 - (bsize.width_4x4_log2() + bsize.height_4x4_log2()));
        let rate_thr = sf.partition_search_breakout_rate_thr
          * (bsize.width_log2() + bsize.height_log2()) as i32;
        if pc.none.skippable && this.dist < dist_thr && this.rate < rate_thr
        {
          do_split = false;
          do_rect = false;
        }
      }
    }
    ts.bc.rollback(&checkpoint);
  }

  if sf.adaptive_motion_search {
    pc.none.pred_mv = ts.pred_mv;
  }

  if do_split {
    let subsize = square_subsize(bsize, PARTITION_SPLIT);
    let mut sum = RDCost::init();
    let complete = if bsize == BLOCK_8X8 {
      sum = rd_pick_sb_modes(
        fi,
        ts,
        mi_row,
        mi_col,
        BLOCK_4X4,
        &mut pc.leaf_split,
        best.rdcost,
      );
      true
    } else {
      let mut i = 0;
      while i < 4 && sum.rdcost < best.rdcost {
        let r = mi_row + (i >> 1) * mi_step;
        let c = mi_col + (i & 1) * mi_step;
        if r < fi.mi_rows && c < fi.mi_cols {
          if sf.adaptive_motion_search {
            ts.pred_mv = pc.none.pred_mv;
          }
          let child = &mut pc.split[i];
          child.index = i;
          let this = rd_pick_partition(
            fi,
            ts,
            child,
            r,
            c,
            subsize,
            best.rdcost - sum.rdcost,
          );
          if !this.is_valid() {
            sum = RDCost::reset();
            break;
          }
          sum.accumulate(&this);
        }
        i += 1;
      }
      i == 4
    };

    if complete && sum.rdcost < best.rdcost {
      set_partition_rd(fi, &mut sum, pl, PARTITION_SPLIT);
      if sum.rdcost < best.rdcost {
        best = sum;
        pc.partitioning = PARTITION_SPLIT;
      }
    } else if sf.less_rectangular_check {
      do_rect &= !none_allowed;
    }
    ts.bc.rollback(&checkpoint);
  }

  if horz_allowed && (do_rect || active_h_edge(fi, mi_row, mi_step)) {
    let subsize = square_subsize(bsize, PARTITION_HORZ);
    if sf.adaptive_motion_search {
      ts.pred_mv = pc.none.pred_mv;
    }
    let mut sum = rd_pick_sb_modes(
      fi,
      ts,
      mi_row,
      mi_col,
      subsize,
      &mut pc.horizontal[0],
      best.rdcost,
    );
    if sum.rdcost < best.rdcost
      && mi_row + mi_step < fi.mi_rows
      && bsize > BLOCK_8X8
    {
      encode_b(fi, ts, mi_row, mi_col, subsize, &pc.horizontal[0], false);
      if sf.adaptive_motion_search {
        ts.pred_mv = pc.none.pred_mv;
      }
      let this = rd_pick_sb_modes(
        fi,
        ts,
        mi_row + mi_step,
        mi_col,
        subsize,
        &mut pc.horizontal[1],
        best.rdcost - sum.rdcost,
      );
      sum.accumulate(&this);
    }
    if sum.rdcost < best.rdcost {
      set_partition_rd(fi, &mut sum, pl, PARTITION_HORZ);
      if sum.rdcost < best.rdcost {
        best = sum;
        pc.partitioning = PARTITION_HORZ;
      }
    }
    ts.bc.rollback(&checkpoint);
  }

  if vert_allowed && (do_rect || active_v_edge(fi, mi_col, mi_step)) {
    let subsize = square_subsize(bsize, PARTITION_VERT);
    if sf.adaptive_motion_search {
      ts.pred_mv = pc.none.pred_mv;
    }
    let mut sum = rd_pick_sb_modes(
      fi,
      ts,
      mi_row,
      mi_col,
      subsize,
      &mut pc.vertical[0],
      best.rdcost,
    );
    if sum.rdcost < best.rdcost
      && mi_col + mi_step < fi.mi_cols
      && bsize > BLOCK_8X8
    {
      encode_b(fi, ts, mi_row, mi_col, subsize, &pc.vertical[0], false);
      if sf.adaptive_motion_search {
        ts.pred_mv = pc.none.pred_mv;
      }
      let this = rd_pick_sb_modes(
        fi,
        ts,
        mi_row,
        mi_col + mi_step,
        subsize,
        &mut pc.vertical[1],
        best.rdcost - sum.rdcost,
      );
      sum.accumulate(&this);
    }
    if sum.rdcost < best.rdcost {
      set_partition_rd(fi, &mut sum, pl, PARTITION_VERT);
      if sum.rdcost < best.rdcost {
        best = sum;
        pc.partitioning = PARTITION_VERT;
      }
    }
    ts.bc.rollback(&checkpoint);
  }

  if !best.is_valid() {
    return RDCost::reset();
  }

  if pc.index != 3 {
    encode_sb(fi, ts, pc, mi_row, mi_col, bsize, bsize == BLOCK_64X64);
  }
  best
}

/// Commits the partitioning recorded in `pc` for the `bsize` square at
/// `(mi_row, mi_col)`, leaf by leaf.
pub fn encode_sb<T: Pixel>(
  fi: &FrameInvariants<'_, T>, ts: &mut TileStateMut<'_, T>, pc: &PcTree,
  mi_row: usize, mi_col: usize, bsize: BlockSize, output_enabled: bool,
) {
  if mi_row >= fi.mi_rows || mi_col >= fi.mi_cols {
    return;
  }
  let hbs = bsize.width_mi() / 2;
  let partition = pc.partitioning;
  let Ok(subsize) = bsize.subsize(partition) else {
    debug_assert!(false, "no {:?} split of {:?}", partition, bsize);
    return;
  };

  match partition {
    PARTITION_NONE => {
      encode_b(fi, ts, mi_row, mi_col, subsize, &pc.none, output_enabled);
    }
    PARTITION_HORZ => {
      let ctx = &pc.horizontal[0];
      encode_b(fi, ts, mi_row, mi_col, subsize, ctx, output_enabled);
      if mi_row + hbs < fi.mi_rows && bsize > BLOCK_8X8 {
        encode_b(
          fi,
          ts,
          mi_row + hbs,
          mi_col,
          subsize,
          &pc.horizontal[1],
          output_enabled,
        );
      }
    }
    PARTITION_VERT => {
      let ctx = &pc.vertical[0];
      encode_b(fi, ts, mi_row, mi_col, subsize, ctx, output_enabled);
      if mi_col + hbs < fi.mi_cols && bsize > BLOCK_8X8 {
        encode_b(
          fi,
          ts,
          mi_row,
          mi_col + hbs,
          subsize,
          &pc.vertical[1],
          output_enabled,
        );
      }
    }
    PARTITION_SPLIT => {
      if bsize == BLOCK_8X8 {
        let ctx = &pc.leaf_split;
        encode_b(fi, ts, mi_row, mi_col, subsize, ctx, output_enabled);
      } else {
        for (i, child) in pc.split.iter().enumerate() {
          encode_sb(
            fi,
            ts,
            child,
            mi_row + (i >> 1) * hbs,
            mi_col + (i & 1) * hbs,
            subsize,
            output_enabled,
          );
        }
      }
    }
  }

  if partition != PARTITION_SPLIT || bsize == BLOCK_8X8 {
    ts.bc.update_partition_context(mi_row, mi_col, subsize, bsize);
  }
}

/// Partition type that reaches a block of `bs_type` from the square
/// `bsize`.
pub fn partition_from_size(
  bsize: BlockSize, bs_type: BlockSize,
) -> PartitionType {
  let (w, h) = (bs_type.width(), bs_type.height());
  if w >= bsize.width() && h >= bsize.height() {
    PARTITION_NONE
  } else if w >= bsize.width() && h * 2 == bsize.height() {
    PARTITION_HORZ
  } else if h >= bsize.height() && w * 2 == bsize.width() {
    PARTITION_VERT
  } else {
    PARTITION_SPLIT
  }
}

/// Evaluates and commits the partitioning already written into the mode
/// info grid for the `bsize` square at `(mi_row, mi_col)`.
///
/// Only the top-left cell of each block needs to carry its size.
pub fn rd_use_partition<T: Pixel>(
  fi: &FrameInvariants<'_, T>, ts: &mut TileStateMut<'_, T>,
  pc: &mut PcTree, mi_row: usize, mi_col: usize, bsize: BlockSize,
  do_recon: bool,
) -> RDCost {
  if mi_row >= fi.mi_rows || mi_col >= fi.mi_cols {
    return RDCost::init();
  }
  let hbs = bsize.width_mi() / 2;
  let bs_type = ts.mi.get(mi_row, mi_col).sb_type;
  let partition = partition_from_size(bsize, bs_type);
  let Ok(subsize) = bsize.subsize(partition) else {
    return RDCost::reset();
  };
  pc.partitioning = partition;
  let pl = ts.bc.partition_plane_context(mi_row, mi_col, bsize);
  let checkpoint = ts.bc.checkpoint(mi_row, mi_col);

  let mut last = match partition {
    PARTITION_NONE => {
      rd_pick_sb_modes(fi, ts, mi_row, mi_col, bsize, &mut pc.none, i64::MAX)
    }
    PARTITION_HORZ => {
      let mut sum = rd_pick_sb_modes(
        fi,
        ts,
        mi_row,
        mi_col,
        subsize,
        &mut pc.horizontal[0],
        i64::MAX,
      );
      if sum.is_valid() && bsize > BLOCK_8X8 && mi_row + hbs < fi.mi_rows {
        encode_b(fi, ts, mi_row, mi_col, subsize, &pc.horizontal[0], false);
        let this = rd_pick_sb_modes(
          fi,
          ts,
          mi_row + hbs,
          mi_col,
          subsize,
          &mut pc.horizontal[1],
          i64::MAX,
        );
        sum.accumulate(&this);
      }
      sum
    }
    PARTITION_VERT => {
      let mut sum = rd_pick_sb_modes(
        fi,
        ts,
        mi_row,
        mi_col,
        subsize,
        &mut pc.vertical[0],
        i64::MAX,
      );
      if sum.is_valid() && bsize > BLOCK_8X8 && mi_col + hbs < fi.mi_cols {
        encode_b(fi, ts, mi_row, mi_col, subsize, &pc.vertical[0], false);
        let this = rd_pick_sb_modes(
          fi,
          ts,
          mi_row,
          mi_col + hbs,
          subsize,
          &mut pc.vertical[1],
          i64::MAX,
        );
        sum.accumulate(&this);
      }
      sum
    }
    PARTITION_SPLIT if bsize == BLOCK_8X8 => rd_pick_sb_modes(
      fi,
      ts,
      mi_row,
      mi_col,
      subsize,
      &mut pc.leaf_split,
      i64::MAX,
    ),
    PARTITION_SPLIT => {
      let mut sum = RDCost::init();
      for (i, child) in pc.split.iter_mut().enumerate() {
        let r = mi_row + (i >> 1) * hbs;
        let c = mi_col + (i & 1) * hbs;
        if r >= fi.mi_rows || c >= fi.mi_cols {
          continue;
        }
        child.index = i;
        let this = rd_use_partition(fi, ts, child, r, c, subsize, i != 3);
        sum.accumulate(&this);
        if !sum.is_valid() {
          break;
        }
      }
      sum
    }
  };

  if last.is_valid() {
    set_partition_rd(fi, &mut last, pl, partition);
  }
  ts.bc.rollback(&checkpoint);

  if do_recon && last.is_valid() {
    encode_sb(fi, ts, pc, mi_row, mi_col, bsize, bsize == BLOCK_64X64);
  }
  last
}

/// Shrinks the square `bsize` until it fits in the remaining rows and
/// columns, returning the size with its height and width in mode info
/// units. Outside the frame the size falls back to at most 8x8 and the
/// given dimensions are kept.
pub fn find_partition_size(
  bsize: BlockSize, rows_left: isize, cols_left: isize, bh: usize, bw: usize,
) -> (BlockSize, usize, usize) {
  if rows_left <= 0 || cols_left <= 0 {
    return (bsize.min(BLOCK_8X8), bh, bw);
  }
  let (mut bsize, mut bh, mut bw) = (bsize, bh, bw);
  while bsize > BLOCK_4X4 {
    bh = bsize.height_mi();
    bw = bsize.width_mi();
    if bh as isize <= rows_left && bw as isize <= cols_left {
      break;
    }
    bsize = bsize.step_down(3);
  }
  (bsize, bh, bw)
}

fn set_block_size<T: Pixel>(
  fi: &FrameInvariants<'_, T>, ts: &mut TileStateMut<'_, T>, mi_row: usize,
  mi_col: usize, bsize: BlockSize,
) {
  if mi_row < fi.mi_rows && mi_col < fi.mi_cols {
    ts.mi.get_mut(mi_row, mi_col).sb_type = bsize;
  }
}

/// Tiles the superblock at `(mi_row, mi_col)` with `bsize` blocks, using
/// smaller squares where the superblock crosses the tile edge.
pub fn set_fixed_partitioning<T: Pixel>(
  fi: &FrameInvariants<'_, T>, ts: &mut TileStateMut<'_, T>, mi_row: usize,
  mi_col: usize, bsize: BlockSize,
) {
  let rows_left = ts.tile.mi_row_end as isize - mi_row as isize;
  let cols_left = ts.tile.mi_col_end as isize - mi_col as isize;
  debug_assert!(rows_left > 0 && cols_left > 0);
  let sb = MI_BLOCK_SIZE as isize;

  if rows_left >= sb && cols_left >= sb {
    for r in (0..MI_BLOCK_SIZE).step_by(bsize.height_mi()) {
      for c in (0..MI_BLOCK_SIZE).step_by(bsize.width_mi()) {
        set_block_size(fi, ts, mi_row + r, mi_col + c, bsize);
      }
    }
    return;
  }

  let mut bh = bsize.height_mi();
  let mut r = 0;
  while r < MI_BLOCK_SIZE {
    let mut bw = bsize.width_mi();
    let mut c = 0;
    while c < MI_BLOCK_SIZE {
      let (size, h, w) = find_partition_size(
        bsize,
        rows_left - r as isize,
        cols_left - c as isize,
        bh,
        bw,
      );
      bh = h;
      bw = w;
      set_block_size(fi, ts, mi_row + r, mi_col + c, size);
      c += bw;
    }
    r += bh;
  }
}

/// Widens the observed `(min, max)` over the block sizes of one superblock,
/// counting each size into `hist`. Cells outside the frame count as 4x4.
fn sb_partition_size_range<'m>(
  sizes: impl Iterator<Item = Option<&'m ModeInfo>>,
  range: &mut (BlockSize, BlockSize), hist: &mut [u32; BlockSize::BLOCK_SIZES],
) {
  for mi in sizes {
    let sb_type = mi.map_or(BLOCK_4X4, |mi| mi.sb_type);
    hist[sb_type as usize] += 1;
    range.0 = range.0.min(sb_type);
    range.1 = range.1.max(sb_type);
  }
}

const MIN_PARTITION_SIZE: [BlockSize; BlockSize::BLOCK_SIZES] = [
  BLOCK_4X4, BLOCK_4X4, BLOCK_4X4, BLOCK_4X4, BLOCK_4X4, BLOCK_4X4,
  BLOCK_8X8, BLOCK_8X8, BLOCK_8X8, BLOCK_16X16, BLOCK_16X16, BLOCK_16X16,
  BLOCK_16X16,
];

const MAX_PARTITION_SIZE: [BlockSize; BlockSize::BLOCK_SIZES] = [
  BLOCK_8X8, BLOCK_16X16, BLOCK_16X16, BLOCK_16X16, BLOCK_32X32, BLOCK_32X32,
  BLOCK_32X32, BLOCK_64X64, BLOCK_64X64, BLOCK_64X64, BLOCK_64X64,
  BLOCK_64X64, BLOCK_64X64,
];

/// Partition size range of the superblock at `(mi_row, mi_col)`, predicted
/// from the co-located superblock of the previous frame and the left and
/// above neighbours.
pub fn rd_auto_partition_range<T: Pixel>(
  fi: &FrameInvariants<'_, T>, ts: &TileStateMut<'_, T>, mi_row: usize,
  mi_col: usize,
) -> (BlockSize, BlockSize) {
  let sf = &fi.config.speed_settings;
  let left_in_image = mi_col > ts.tile.mi_col_start;
  let above_in_image = ts.has_above(mi_row);
  let rows_left = ts.tile.mi_row_end as isize - mi_row as isize;
  let cols_left = ts.tile.mi_col_end as isize - mi_col as isize;
  let mut range = (BLOCK_4X4, BLOCK_64X64);

  if left_in_image || above_in_image || fi.frame_type != FrameType::KEY {
    range = (BLOCK_64X64, BLOCK_4X4);
    let mut hist = [0u32; BlockSize::BLOCK_SIZES];
    let cells = |r0: usize, c0: usize| {
      (0..MI_BLOCK_SIZE).flat_map(move |r| {
        (0..MI_BLOCK_SIZE).map(move |c| (r0 + r, c0 + c))
      })
    };

    if fi.frame_type != FrameType::KEY {
      if let Some(prev) = fi.prev_mi {
        sb_partition_size_range(
          cells(mi_row, mi_col).map(|(r, c)| {
            (r < prev.mi_rows && c < prev.mi_cols).then(|| prev.get(r, c))
          }),
          &mut range,
          &mut hist,
        );
      }
    }
    if left_in_image {
      sb_partition_size_range(
        cells(mi_row, mi_col - MI_BLOCK_SIZE).map(|(r, c)| {
          (r < ts.tile.mi_row_end).then(|| ts.mi.get(r, c))
        }),
        &mut range,
        &mut hist,
      );
    }
    if above_in_image {
      sb_partition_size_range(
        cells(mi_row - MI_BLOCK_SIZE, mi_col)
          .map(|(r, c)| (c < fi.mi_cols).then(|| ts.mi.get(r, c))),
        &mut range,
        &mut hist,
      );
    }

    match sf.auto_min_max_partition_size {
      AutoMinMaxPartitionSize::RelaxedNeighboringMinMax => {
        range = (
          MIN_PARTITION_SIZE[range.0 as usize],
          MAX_PARTITION_SIZE[range.1 as usize],
        );
      }
      AutoMinMaxPartitionSize::ConstrainNeighboringMinMax => {
        let (mut sum, mut first, mut second) = (0i64, 0i64, 0i64);
        for (i, &n) in hist.iter().enumerate() {
          let (n, i) = (n as i64, i as i64);
          sum += n;
          first += n * i;
          second += n * i * i;
        }
        if sum > 0 {
          let var_unnormalized = second - first * first / sum;
          let (lo, hi) = if var_unnormalized <= 4 * sum {
            let mean = (first / sum) as usize;
            (mean, mean)
          } else {
            (range.0 as usize, range.1 as usize)
          };
          range = (MIN_PARTITION_SIZE[lo], MAX_PARTITION_SIZE[hi]);
        }
      }
      AutoMinMaxPartitionSize::Off | AutoMinMaxPartitionSize::Strict => {}
    }

    // Nothing to learn from.
    if range.0 > range.1 {
      range = (BLOCK_4X4, BLOCK_64X64);
    }
  }

  let (max_size, _, _) =
    find_partition_size(range.1, rows_left, cols_left, 0, 0);
  let mut min_size = if active_edge_sb(fi, mi_row, mi_col) {
    BLOCK_4X4
  } else {
    range.0.min(max_size)
  };
  if sf.use_square_partition_only && max_size.next_square() < min_size {
    min_size = max_size.next_square();
  }
  (min_size, max_size)
}

/// Statistics of one node of the variance tree. Leaves hold a single
/// sample: the difference of the source and prediction averages.
#[derive(Clone, Copy, Debug, Default)]
struct Var {
  sse: i64,
  sum: i64,
  log2_count: u32,
  variance: i64,
}

impl Var {
  fn sample(diff: i64) -> Self {
    Var { sse: diff * diff, sum: diff, log2_count: 0, variance: 0 }
  }

  fn merge(a: &Var, b: &Var) -> Self {
    Var {
      sse: a.sse + b.sse,
      sum: a.sum + b.sum,
      log2_count: a.log2_count + 1,
      variance: 0,
    }
  }

  fn compute(&mut self) -> i64 {
    self.variance = (256
      * (self.sse - ((self.sum * self.sum) >> self.log2_count)))
      >> self.log2_count;
    self.variance
  }
}

#[derive(Clone, Debug, Default)]
struct VarTree {
  none: Var,
  horz: [Var; 2],
  vert: [Var; 2],
  split: Vec<VarTree>,
}

impl VarTree {
  fn from_children(split: Vec<VarTree>) -> Self {
    let s = |i: usize| split[i].none;
    let horz = [Var::merge(&s(0), &s(1)), Var::merge(&s(2), &s(3))];
    let vert = [Var::merge(&s(0), &s(2)), Var::merge(&s(1), &s(3))];
    let none = Var::merge(&vert[0], &vert[1]);
    VarTree { none, horz, vert, split }
  }
}

struct VarSource<'a, T: Pixel> {
  src: PlaneSlice<'a, T>,
  /// Prediction to compare against; a flat mid-grey block when absent.
  pred: Option<PlaneSlice<'a, T>>,
  leaf: usize,
  pixels_wide: usize,
  pixels_high: usize,
  mid: u32,
}

impl<'a, T: Pixel> VarSource<'a, T> {
  fn average(&self, s: &PlaneSlice<'_, T>) -> u32 {
    if self.leaf == 8 {
      avg_8x8(s)
    } else {
      avg_4x4(s)
    }
  }

  fn build(&self, x: usize, y: usize, size: usize) -> VarTree {
    if size == self.leaf {
      let none = if x < self.pixels_wide && y < self.pixels_high {
        let s = self.average(&self.src.subslice(x, y));
        let d = self
          .pred
          .as_ref()
          .map_or(self.mid, |p| self.average(&p.subslice(x, y)));
        Var::sample(s as i64 - d as i64)
      } else {
        Var::default()
      };
      return VarTree { none, ..Default::default() };
    }
    let half = size / 2;
    VarTree::from_children(
      (0..4)
        .map(|i| self.build(x + (i & 1) * half, y + (i >> 1) * half, half))
        .collect(),
    )
  }
}

/// Picks a size for the `bsize` node of the variance tree when its
/// variance is low enough, trying the whole block first and then its
/// vertical and horizontal halves. Returns whether a size was set.
fn set_vt_partitioning<T: Pixel>(
  fi: &FrameInvariants<'_, T>, ts: &mut TileStateMut<'_, T>,
  vt: &mut VarTree, bsize: BlockSize, mi_row: usize, mi_col: usize,
  threshold: i64, bsize_min: BlockSize,
) -> bool {
  let half = bsize.width_mi() / 2;
  let fits = mi_col + half < fi.mi_cols && mi_row + half < fi.mi_rows;
  let variance = vt.none.compute();

  if bsize == bsize_min {
    if fits && variance < threshold {
      set_block_size(fi, ts, mi_row, mi_col, bsize);
      return true;
    }
    return false;
  }
  if bsize < bsize_min {
    return false;
  }

  if fi.frame_type == FrameType::KEY
    && (bsize > BLOCK_32X32 || variance > threshold << 4)
  {
    return false;
  }
  if fits && variance < threshold {
    set_block_size(fi, ts, mi_row, mi_col, bsize);
    return true;
  }

  let (xdec, ydec) = {
    let cfg = &ts.input.planes[1].cfg;
    (cfg.xdec, cfg.ydec)
  };

  if mi_row + half < fi.mi_rows {
    let subsize = square_subsize(bsize, PARTITION_VERT);
    if vt.vert[0].compute() < threshold
      && vt.vert[1].compute() < threshold
      && subsize.subsampled_size(xdec, ydec).is_ok()
    {
      set_block_size(fi, ts, mi_row, mi_col, subsize);
      set_block_size(fi, ts, mi_row, mi_col + half, subsize);
      return true;
    }
  }
  if mi_col + half < fi.mi_cols {
    let subsize = square_subsize(bsize, PARTITION_HORZ);
    if vt.horz[0].compute() < threshold
      && vt.horz[1].compute() < threshold
      && subsize.subsampled_size(xdec, ydec).is_ok()
    {
      set_block_size(fi, ts, mi_row, mi_col, subsize);
      set_block_size(fi, ts, mi_row + half, mi_col, subsize);
      return true;
    }
  }
  false
}

/// Shift of the 16x16 threshold above the base on inter frames.
const VBP_INTER_16X16_SHIFT: u32 = 6;

/// Chooses the block sizes of the superblock at `(mi_row, mi_col)` from the
/// variance of block averages, writing them into the mode info grid.
///
/// Inter frames compare 8x8 averages of the source against a zero motion
/// prediction from `LAST_FRAME`; key frames compare 4x4 averages against
/// mid-grey and may go down to 4x4.
pub fn choose_partitioning<T: Pixel>(
  fi: &FrameInvariants<'_, T>, ts: &mut TileStateMut<'_, T>, mi_row: usize,
  mi_col: usize,
) {
  let is_key = fi.frame_type == FrameType::KEY;
  let (x0, y0) = (mi_col * MI_SIZE, mi_row * MI_SIZE);
  let pixels_wide = (fi.width - x0).min(64);
  let pixels_high = (fi.height - y0).min(64);

  let base = (if is_key { 80 } else { 4 }) * fi.rd.q_real();
  let (threshold_max, threshold, threshold_16x16, threshold_min, bsize_min) =
    if is_key {
      (base, base >> 2, base >> 2, base << 2, BLOCK_8X8)
    } else {
      let min = base << VBP_INTER_16X16_SHIFT;
      (base, base, min, min, BLOCK_16X16)
    };

  let use_pred = !is_key && fi.ref_frame(LAST_FRAME).is_some();
  if use_pred {
    let mi = ModeInfo {
      sb_type: BLOCK_64X64,
      mode: PredictionMode::ZEROMV,
      ref_frame: [LAST_FRAME, NONE_FRAME],
      mv: [MotionVector::ZERO; 2],
      interp_filter: fi.config.interp_filter,
      ..Default::default()
    };
    build_inter_prediction(fi, ts, &mi, mi_row, mi_col, 0..1);
  }

  let po = PlaneOffset { x: x0 as isize, y: y0 as isize };
  let mut vt = {
    let source = VarSource {
      src: ts.input.planes[0].slice(po),
      pred: use_pred.then(|| ts.pred.planes[0].slice(po)),
      leaf: if is_key { 4 } else { 8 },
      pixels_wide,
      pixels_high,
      mid: 128 << (fi.config.bit_depth - 8),
    };
    source.build(0, 0, 64)
  };

  if mi_col + MI_BLOCK_SIZE <= fi.mi_cols
    && mi_row + MI_BLOCK_SIZE <= fi.mi_rows
    && set_vt_partitioning(
      fi,
      ts,
      &mut vt,
      BLOCK_64X64,
      mi_row,
      mi_col,
      threshold_max,
      BLOCK_16X16,
    )
  {
    return;
  }

  for (i, vt32) in vt.split.iter_mut().enumerate() {
    let r32 = mi_row + (i >> 1) * 4;
    let c32 = mi_col + (i & 1) * 4;
    if set_vt_partitioning(
      fi,
      ts,
      vt32,
      BLOCK_32X32,
      r32,
      c32,
      threshold,
      BLOCK_16X16,
    ) {
      continue;
    }
    for (j, vt16) in vt32.split.iter_mut().enumerate() {
      let r16 = r32 + (j >> 1) * 2;
      let c16 = c32 + (j & 1) * 2;
      if set_vt_partitioning(
        fi,
        ts,
        vt16,
        BLOCK_16X16,
        r16,
        c16,
        threshold_16x16,
        bsize_min,
      ) {
        continue;
      }
      for (k, vt8) in vt16.split.iter_mut().enumerate() {
        let r8 = r16 + (k >> 1);
        let c8 = c16 + (k & 1);
        if !is_key {
          set_block_size(fi, ts, r8, c8, BLOCK_8X8);
        } else if !set_vt_partitioning(
          fi,
          ts,
          vt8,
          BLOCK_8X8,
          r8,
          c8,
          threshold_min,
          BLOCK_8X8,
        ) {
          set_block_size(fi, ts, r8, c8, BLOCK_4X4);
        }
      }
    }
  }
}

/// Encodes the superblock at `(mi_row, mi_col)` with the partition search
/// selected in the speed settings, returning its cost.
pub fn encode_superblock<T: Pixel>(
  fi: &FrameInvariants<'_, T>, ts: &mut TileStateMut<'_, T>,
  pc_root: &mut PcTree, mi_row: usize, mi_col: usize,
) -> RDCost {
  let sf = &fi.config.speed_settings;
  ts.pred_mv = [MotionVector::ZERO; TOTAL_REFS_PER_FRAME];
  pc_root.index = 0;

  let rd = match sf.partition_search_type {
    PartitionSearchType::FixedSize => {
      let bsize = sf.always_this_block_size;
      set_fixed_partitioning(fi, ts, mi_row, mi_col, bsize);
      rd_use_partition(fi, ts, pc_root, mi_row, mi_col, BLOCK_64X64, true)
    }
    PartitionSearchType::VarBased => {
      choose_partitioning(fi, ts, mi_row, mi_col);
      rd_use_partition(fi, ts, pc_root, mi_row, mi_col, BLOCK_64X64, true)
    }
    PartitionSearchType::Rd => {
      let range = sf.partition_range;
      let (mut min, mut max) = (range.min, range.max);
      if sf.auto_min_max_partition_size != AutoMinMaxPartitionSize::Off {
        let (auto_min, auto_max) =
          rd_auto_partition_range(fi, ts, mi_row, mi_col);
        min = min.max(auto_min);
        max = max.min(auto_max).max(min);
      }
      // Blocks crossing the frame edge must be able to reach 8x8.
      if mi_row + MI_BLOCK_SIZE > fi.mi_rows
        || mi_col + MI_BLOCK_SIZE > fi.mi_cols
      {
        min = min.min(BLOCK_8X8);
      }
      ts.min_partition_size = min;
      ts.max_partition_size = max;
      let (r, c) = (mi_row, mi_col);
      rd_pick_partition(fi, ts, pc_root, r, c, BLOCK_64X64, i64::MAX)
    }
  };

  let partition = pc_root.partitioning;
  log::trace!("sb ({}, {}): {:?} {}", mi_row, mi_col, partition, rd);
  rd
}

/// Encodes every superblock of the tile in raster order.
pub fn encode_tile<T: Pixel>(
  fi: &FrameInvariants<'_, T>, ts: &mut TileStateMut<'_, T>,
) -> RDCost {
  let mut pc_root = PcTree::new(BLOCK_64X64);
  let mut total = RDCost::init();
  let tile = ts.tile;
  for mi_row in tile.sb_row_starts() {
    ts.bc.reset_left_context();
    for mi_col in tile.sb_col_starts() {
      let rd = encode_superblock(fi, ts, &mut pc_root, mi_row, mi_col);
      total.accumulate(&rd);
    }
  }
  total
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::api::{EncoderConfig, SpeedSettings};
  use crate::color::ChromaSampling;
  use crate::encoder::test_util::*;
  use crate::mc::RustConvolve;

  fn config(
    width: usize, height: usize, speed_settings: SpeedSettings,
  ) -> EncoderConfig {
    EncoderConfig { width, height, speed_settings, ..Default::default() }
  }

  /// Marks the cells each coded block covers, clipped to the frame.
  fn coverage(
    coded: &[CodedBlock], mi_rows: usize, mi_cols: usize,
  ) -> Vec<u32> {
    let mut hits = vec![0u32; mi_rows * mi_cols];
    for b in coded {
      let bs = b.mi.sb_type;
      for r in b.mi_row..(b.mi_row + bs.height_mi()).min(mi_rows) {
        for c in b.mi_col..(b.mi_col + bs.width_mi()).min(mi_cols) {
          hits[r * mi_cols + c] += 1;
        }
      }
    }
    hits
  }

  #[test]
  fn tree_holds_every_square_node() {
    let pc = PcTree::new(BLOCK_64X64);
    assert_eq!(pc.count(), 85);
    assert_eq!(pc.split[3].index, 3);
    assert_eq!(pc.split[0].split[0].split[0].bsize, BLOCK_8X8);
    assert!(pc.split[0].split[0].split[0].split.is_empty());
  }

  #[test]
  fn partition_size_shrinks_to_fit() {
    let fit = find_partition_size;
    assert_eq!(fit(BLOCK_64X64, 5, 8, 8, 8), (BLOCK_32X32, 4, 4));
    assert_eq!(fit(BLOCK_64X64, 5, 1, 8, 8), (BLOCK_8X8, 1, 1));
    assert_eq!(fit(BLOCK_16X16, 0, 4, 2, 2), (BLOCK_8X8, 2, 2));
    assert_eq!(fit(BLOCK_16X16, 8, 8, 2, 2), (BLOCK_16X16, 2, 2));
  }

  #[test]
  fn partition_type_follows_stored_size() {
    assert_eq!(partition_from_size(BLOCK_64X64, BLOCK_64X64), PARTITION_NONE);
    assert_eq!(partition_from_size(BLOCK_64X64, BLOCK_64X32), PARTITION_HORZ);
    assert_eq!(partition_from_size(BLOCK_64X64, BLOCK_32X64), PARTITION_VERT);
    assert_eq!(partition_from_size(BLOCK_64X64, BLOCK_16X16), PARTITION_SPLIT);
    assert_eq!(partition_from_size(BLOCK_8X8, BLOCK_4X8), PARTITION_VERT);
    assert_eq!(partition_from_size(BLOCK_8X8, BLOCK_4X4), PARTITION_SPLIT);
  }

  #[test]
  fn fixed_partitioning_shrinks_at_the_frame_edge() {
    let config = config(40, 40, SpeedSettings::default());
    let src = Frame::<u8>::new(40, 40, ChromaSampling::Cs420);
    let pq = PixelQuantizer::new(config.quantizer as i32);
    let fi = key_frame_invariants(&config, &RustConvolve, &pq);
    with_tile_state(&fi, &src, |ts| {
      set_fixed_partitioning(&fi, ts, 0, 0, BLOCK_64X64);
      assert_eq!(ts.mi.get(0, 0).sb_type, BLOCK_32X32);
      assert_eq!(ts.mi.get(0, 4).sb_type, BLOCK_8X8);
      assert_eq!(ts.mi.get(4, 0).sb_type, BLOCK_8X8);
      assert_eq!(ts.mi.get(4, 4).sb_type, BLOCK_8X8);
    });
  }

  #[test]
  fn fixed_partition_codes_each_visible_cell_once() {
    let mut sf = SpeedSettings::default();
    sf.partition_search_type = PartitionSearchType::FixedSize;
    sf.always_this_block_size = BLOCK_16X16;
    let config = config(40, 24, sf);
    let mut src = Frame::<u8>::new(40, 24, ChromaSampling::Cs420);
    src.fill_with(|_, x, y| (x * 3 + y * 5) as u8);
    src.pad();
    let pq = PixelQuantizer::new(config.quantizer as i32);
    let fi = key_frame_invariants(&config, &RustConvolve, &pq);
    with_tile_state(&fi, &src, |ts| {
      let mut pc = PcTree::new(BLOCK_64X64);
      let rd = encode_superblock(&fi, ts, &mut pc, 0, 0);
      assert!(rd.is_valid());
      assert_eq!(ts.coded.len(), 9);
      let hits = coverage(&ts.coded, fi.mi_rows, fi.mi_cols);
      assert!(hits.iter().all(|&n| n == 1));
      assert_eq!(ts.coded[0].mi.sb_type, BLOCK_16X16);
    });
  }

  #[test]
  fn uniform_inter_superblock_stays_whole() {
    let mut sf = SpeedSettings::default();
    sf.partition_search_type = PartitionSearchType::VarBased;
    let config = config(64, 64, sf);
    let mut src = Frame::<u8>::new(64, 64, ChromaSampling::Cs420);
    src.fill_with(|_, _, _| 90);
    src.pad();
    let reference = src.clone();
    let pq = PixelQuantizer::new(config.quantizer as i32);
    let fi = inter_frame_invariants(&config, &reference, &RustConvolve, &pq);
    with_tile_state(&fi, &src, |ts| {
      choose_partitioning(&fi, ts, 0, 0);
      assert_eq!(ts.mi.get(0, 0).sb_type, BLOCK_64X64);

      let mut pc = PcTree::new(BLOCK_64X64);
      let rd = encode_superblock(&fi, ts, &mut pc, 0, 0);
      assert!(rd.is_valid());
      assert_eq!(pc.partitioning, PARTITION_NONE);
      assert_eq!(ts.coded.len(), 1);
      assert_eq!(ts.coded[0].mi.sb_type, BLOCK_64X64);
    });
  }

  #[test]
  fn busy_key_frame_goes_down_to_4x4() {
    let config = EncoderConfig {
      quantizer: 4,
      ..config(64, 64, SpeedSettings::default())
    };
    let mut src = Frame::<u8>::new(64, 64, ChromaSampling::Cs420);
    src.fill_with(|_, x, y| {
      if ((x >> 2) ^ (y >> 2)) & 1 == 1 {
        255
      } else {
        0
      }
    });
    let pq = PixelQuantizer::new(config.quantizer as i32);
    let fi = key_frame_invariants(&config, &RustConvolve, &pq);
    with_tile_state(&fi, &src, |ts| {
      choose_partitioning(&fi, ts, 0, 0);
      assert_eq!(ts.mi.get(0, 0).sb_type, BLOCK_4X4);
      assert_eq!(ts.mi.get(7, 7).sb_type, BLOCK_4X4);
    });
  }

  #[test]
  fn chosen_partition_is_no_worse_than_the_whole_block() {
    let config = config(64, 64, SpeedSettings::default());
    let mut src = Frame::<u8>::new(64, 64, ChromaSampling::Cs420);
    src.fill_with(|_, x, y| {
      if x < 24 && y > 40 {
        220
      } else {
        (x + y) as u8
      }
    });
    src.pad();
    let pq = PixelQuantizer::new(config.quantizer as i32);
    let fi = key_frame_invariants(&config, &RustConvolve, &pq);

    let mut whole = RDCost::reset();
    with_tile_state(&fi, &src, |ts| {
      let pl = ts.bc.partition_plane_context(0, 0, BLOCK_64X64);
      let mut ctx = PickModeContext::default();
      whole =
        rd_pick_sb_modes(&fi, ts, 0, 0, BLOCK_64X64, &mut ctx, i64::MAX);
      set_partition_rd(&fi, &mut whole, pl, PARTITION_NONE);
    });
    assert!(whole.is_valid());

    with_tile_state(&fi, &src, |ts| {
      let mut pc = PcTree::new(BLOCK_64X64);
      let rd =
        rd_pick_partition(&fi, ts, &mut pc, 0, 0, BLOCK_64X64, i64::MAX);
      assert!(rd.is_valid());
      assert!(rd.rdcost <= whole.rdcost);
      let hits = coverage(&ts.coded, fi.mi_rows, fi.mi_cols);
      assert!(hits.iter().all(|&n| n == 1));
    });
  }

  #[test]
  fn partial_superblock_search_stays_in_the_frame() {
    let config = config(72, 40, SpeedSettings::default());
    let mut src = Frame::<u8>::new(72, 40, ChromaSampling::Cs420);
    src.fill_with(|pli, x, y| ((x * 7) ^ (y * 3) ^ pli) as u8);
    src.pad();
    let pq = PixelQuantizer::new(config.quantizer as i32);
    let fi = key_frame_invariants(&config, &RustConvolve, &pq);
    with_tile_state(&fi, &src, |ts| {
      let rd = encode_tile(&fi, ts);
      assert!(rd.is_valid());
      assert!(ts
        .coded
        .iter()
        .all(|b| b.mi_row < fi.mi_rows && b.mi_col < fi.mi_cols));
      let hits = coverage(&ts.coded, fi.mi_rows, fi.mi_cols);
      assert!(hits.iter().all(|&n| n == 1));
    });
  }
}
