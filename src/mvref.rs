// Copyright (c) 2017-2023, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

#![allow(non_upper_case_globals)]

use crate::context::*;
use crate::frame::FRAME_BORDER;
use crate::mc::{MotionVector, VP9_INTERP_EXTEND};
use crate::partition::RefType::*;
use crate::partition::*;

pub const MVREF_NEIGHBOURS: usize = 8;
pub const MAX_MV_REF_CANDIDATES: usize = 2;

/// Candidates may point this far (1/8 pel) outside the frame.
const MV_BORDER: i32 = 16 << 3;
/// Margin for the final nearest/near vectors, 1/8 pel.
const MV_MARGIN: i32 = (FRAME_BORDER as i32 - VP9_INTERP_EXTEND) << 3;

/// Inter mode context, by how the two nearest neighbours were coded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MotionVectorContext {
  BothZero = 0,
  ZeroPlusPredicted = 1,
  BothPredicted = 2,
  NewPlusNonIntra = 3,
  BothNew = 4,
  IntraPlusNonIntra = 5,
  BothIntra = 6,
  InvalidCase = 9,
}

use self::MotionVectorContext::*;

impl MotionVectorContext {
  /// Index into the inter mode probabilities.
  #[inline]
  pub fn index(self) -> usize {
    debug_assert!(self != InvalidCase);
    (self as usize).min(BothIntra as usize)
  }
}

/// Flattened count of intra (9), zero (3) and new (1) neighbours.
static mode_2_counter: [usize; INTRA_MODES + INTER_MODES] = [
  9, 9, 9, 9, 9, 9, 9, 9, 9, 9, // intra modes
  0, // NEARESTMV
  0, // NEARMV
  3, // ZEROMV
  1, // NEWMV
];

static counter_to_context: [MotionVectorContext; 19] = [
  BothPredicted,
  NewPlusNonIntra,
  BothNew,
  ZeroPlusPredicted,
  NewPlusNonIntra,
  InvalidCase,
  BothZero,
  InvalidCase,
  InvalidCase,
  IntraPlusNonIntra,
  IntraPlusNonIntra,
  InvalidCase,
  IntraPlusNonIntra,
  InvalidCase,
  InvalidCase,
  InvalidCase,
  InvalidCase,
  InvalidCase,
  BothIntra,
];

/// Neighbour positions searched for each block size, `(row, col)` in mode
/// info units relative to the block.
static mv_ref_blocks: [[(isize, isize); MVREF_NEIGHBOURS];
  BlockSize::BLOCK_SIZES] = [
  // 4X4
  [(-1, 0), (0, -1), (-1, -1), (-2, 0), (0, -2), (-2, -1), (-1, -2), (-2, -2)],
  // 4X8
  [(-1, 0), (0, -1), (-1, -1), (-2, 0), (0, -2), (-2, -1), (-1, -2), (-2, -2)],
  // 8X4
  [(-1, 0), (0, -1), (-1, -1), (-2, 0), (0, -2), (-2, -1), (-1, -2), (-2, -2)],
  // 8X8
  [(-1, 0), (0, -1), (-1, -1), (-2, 0), (0, -2), (-2, -1), (-1, -2), (-2, -2)],
  // 8X16
  [(0, -1), (-1, 0), (1, -1), (-1, -1), (0, -2), (-2, 0), (-2, -1), (-1, -2)],
  // 16X8
  [(-1, 0), (0, -1), (-1, 1), (-1, -1), (-2, 0), (0, -2), (-1, -2), (-2, -1)],
  // 16X16
  [(-1, 0), (0, -1), (-1, 1), (1, -1), (-1, -1), (-3, 0), (0, -3), (-3, -3)],
  // 16X32
  [(0, -1), (-1, 0), (2, -1), (-1, -1), (-1, 1), (0, -3), (-3, 0), (-3, -3)],
  // 32X16
  [(-1, 0), (0, -1), (-1, 2), (-1, -1), (1, -1), (-3, 0), (0, -3), (-3, -3)],
  // 32X32
  [(-1, 1), (1, -1), (-1, 2), (2, -1), (-1, -1), (-3, 0), (0, -3), (-3, -3)],
  // 32X64
  [(0, -1), (-1, 0), (4, -1), (-1, 2), (-1, -1), (0, -3), (-3, 0), (2, -1)],
  // 64X32
  [(-1, 0), (0, -1), (-1, 4), (2, -1), (-1, -1), (-3, 0), (0, -3), (-1, 2)],
  // 64X64
  [(-1, 3), (3, -1), (-1, 4), (4, -1), (-1, -1), (-1, 0), (0, -1), (-1, 6)],
];

/// Sub-block of a sub-8x8 neighbour adjacent to sub-block `block_idx`,
/// indexed by whether the neighbour lies in the same column.
static idx_n_column_to_subblock: [[usize; 2]; 4] =
  [[1, 2], [1, 3], [3, 2], [3, 3]];

/// Returned by `CandidateList::try_add` once a second distinct vector has
/// been found; the search stops there.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListFull;

/// The nearest and near candidate vectors of one block and reference.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CandidateList {
  mvs: [MotionVector; MAX_MV_REF_CANDIDATES],
  count: usize,
}

impl CandidateList {
  /// Adds `mv` unless it repeats the first entry.
  pub fn try_add(&mut self, mv: MotionVector) -> Result<(), ListFull> {
    if self.count == 0 {
      self.mvs[0] = mv;
      self.count = 1;
      Ok(())
    } else if mv != self.mvs[0] {
      self.mvs[1] = mv;
      self.count = 2;
      Err(ListFull)
    } else {
      Ok(())
    }
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.count
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.count == 0
  }

  /// Entries in order, zero filled.
  #[inline]
  pub fn mvs(&self) -> [MotionVector; MAX_MV_REF_CANDIDATES] {
    self.mvs
  }
}

/// How the two nearest neighbours were coded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NeighbourCounts {
  pub intra: u8,
  pub zero: u8,
  pub new: u8,
  pub other: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MvRefs {
  /// Candidates clamped to the border around the block.
  pub list: [MotionVector; MAX_MV_REF_CANDIDATES],
  pub mode_context: MotionVectorContext,
  pub counts: NeighbourCounts,
}

/// Everything the candidate search reads besides the block position.
pub struct MvRefSearch<'a, 'b> {
  pub mi: &'a TileModeInfo<'b>,
  /// The co-located mode info of the previous frame, when usable.
  pub prev: Option<&'a ModeInfoGrid>,
  pub sign_bias: [bool; TOTAL_REFS_PER_FRAME],
}

#[inline]
fn scale_mv(
  candidate: &ModeInfo, which: usize, this_ref: RefType,
  sign_bias: &[bool; TOTAL_REFS_PER_FRAME],
) -> MotionVector {
  let mv = candidate.mv[which];
  if sign_bias[candidate.ref_frame[which] as usize]
    != sign_bias[this_ref as usize]
  {
    -mv
  } else {
    mv
  }
}

#[inline]
fn sub_block_mv(
  candidate: &ModeInfo, which: usize, search_col: isize,
  block_idx: Option<usize>,
) -> MotionVector {
  match block_idx {
    Some(idx) if candidate.sb_type.is_sub8x8() => {
      candidate.bmi[idx_n_column_to_subblock[idx][(search_col == 0) as usize]]
        .mv[which]
    }
    _ => candidate.mv[which],
  }
}

fn add_mv_diff_ref(
  candidate: &ModeInfo, ref_frame: RefType,
  sign_bias: &[bool; TOTAL_REFS_PER_FRAME], list: &mut CandidateList,
) -> Result<(), ListFull> {
  if candidate.ref_frame[0] != ref_frame {
    list.try_add(scale_mv(candidate, 0, ref_frame, sign_bias))?;
  }
  if candidate.ref_frame[1] != ref_frame
    && candidate.has_second_ref()
    && candidate.mv[1] != candidate.mv[0]
  {
    list.try_add(scale_mv(candidate, 1, ref_frame, sign_bias))?;
  }
  Ok(())
}

impl<'a, 'b> MvRefSearch<'a, 'b> {
  /// Finds up to two candidate vectors for `ref_frame` from the spatial
  /// neighbours and the previous frame, and the inter mode context.
  ///
  /// `block_idx` selects the sub-block of a sub-8x8 block.
  pub fn find_mv_refs(
    &self, mi_row: usize, mi_col: usize, bsize: BlockSize,
    ref_frame: RefType, block_idx: Option<usize>, edges: &MbEdges,
  ) -> MvRefs {
    let mut list = CandidateList::default();
    let mut context_counter = 0;
    let mut counts = NeighbourCounts::default();
    // Completes early once the list is full.
    let _ = self.search(
      &mut list,
      &mut context_counter,
      &mut counts,
      mi_row,
      mi_col,
      bsize,
      ref_frame,
      block_idx,
    );

    let clamp = |mv: MotionVector| {
      mv.clamp(
        edges.to_left - MV_BORDER,
        edges.to_right + MV_BORDER,
        edges.to_top - MV_BORDER,
        edges.to_bottom + MV_BORDER,
      )
    };
    MvRefs {
      list: list.mvs().map(clamp),
      mode_context: counter_to_context[context_counter],
      counts,
    }
  }

  #[allow(clippy::too_many_arguments)]
  fn search(
    &self, list: &mut CandidateList, context_counter: &mut usize,
    counts: &mut NeighbourCounts, mi_row: usize, mi_col: usize,
    bsize: BlockSize, ref_frame: RefType, block_idx: Option<usize>,
  ) -> Result<(), ListFull> {
    let search = &mv_ref_blocks[bsize as usize];
    let mut different_ref_found = false;
    let neighbour =
      |&(row, col): &(isize, isize)| {
        self.mi.neighbour(mi_row, mi_col, row, col)
      };

    // The nearest two neighbours also supply sub-block vectors and the
    // mode context.
    for pos in &search[..2] {
      let Some(candidate) = neighbour(pos) else { continue };
      *context_counter += mode_2_counter[candidate.mode as usize];
      match candidate.mode {
        m if m.is_intra() => counts.intra += 1,
        PredictionMode::ZEROMV => counts.zero += 1,
        PredictionMode::NEWMV => counts.new += 1,
        _ => counts.other += 1,
      }

      if candidate.ref_frame[0] == ref_frame {
        list.try_add(sub_block_mv(candidate, 0, pos.1, block_idx))?;
        different_ref_found = candidate.ref_frame[1] != ref_frame;
      } else {
        if candidate.ref_frame[1] == ref_frame {
          list.try_add(sub_block_mv(candidate, 1, pos.1, block_idx))?;
        }
        different_ref_found = true;
      }
    }

    for pos in &search[2..] {
      let Some(candidate) = neighbour(pos) else { continue };
      if candidate.ref_frame[0] == ref_frame {
        list.try_add(candidate.mv[0])?;
        different_ref_found = candidate.ref_frame[1] != ref_frame;
      } else {
        if candidate.ref_frame[1] == ref_frame {
          list.try_add(candidate.mv[1])?;
        }
        different_ref_found = true;
      }
    }

    let prev = self.prev.map(|grid| grid.get(mi_row, mi_col));
    if let Some(prev) = prev {
      if prev.ref_frame[0] == ref_frame {
        list.try_add(prev.mv[0])?;
      } else if prev.ref_frame[1] == ref_frame {
        list.try_add(prev.mv[1])?;
      }
    }

    if different_ref_found {
      for pos in search {
        let Some(candidate) = neighbour(pos) else { continue };
        if candidate.is_inter_block() {
          add_mv_diff_ref(candidate, ref_frame, &self.sign_bias, list)?;
        }
      }
    }

    if let Some(prev) = prev {
      if prev.is_inter_block() {
        add_mv_diff_ref(prev, ref_frame, &self.sign_bias, list)?;
      }
    }
    Ok(())
  }

  /// Nearest and near vectors of sub-block `block` of `mi`, the sub-8x8
  /// block being searched, for reference slot `which`.
  pub fn append_sub8x8_mvs_for_idx(
    &self, mi: &ModeInfo, block: usize, which: usize, mi_row: usize,
    mi_col: usize, edges: &MbEdges,
  ) -> (MotionVector, MotionVector) {
    let refs = self.find_mv_refs(
      mi_row,
      mi_col,
      mi.sb_type,
      mi.ref_frame[which],
      Some(block),
      edges,
    );
    let mv_list = refs.list;
    let first_other = |nearest: MotionVector, cands: &[MotionVector]| {
      cands.iter().copied().find(|&mv| mv != nearest).unwrap_or_default()
    };
    match block {
      0 => (mv_list[0], mv_list[1]),
      1 | 2 => {
        let nearest = mi.bmi[0].mv[which];
        (nearest, first_other(nearest, &mv_list))
      }
      _ => {
        let nearest = mi.bmi[2].mv[which];
        let candidates =
          [mi.bmi[1].mv[which], mi.bmi[0].mv[which], mv_list[0], mv_list[1]];
        (nearest, first_other(nearest, &candidates))
      }
    }
  }
}

/// Lowers the precision of the candidates and clamps them to the usable
/// area around the block, returning `(nearest, near)`.
pub fn find_best_ref_mvs(
  list: &[MotionVector; MAX_MV_REF_CANDIDATES], allow_hp: bool,
  edges: &MbEdges,
) -> (MotionVector, MotionVector) {
  let best = list.map(|mv| {
    mv.lower_precision(allow_hp).clamp(
      edges.to_left - MV_MARGIN,
      edges.to_right + MV_MARGIN,
      edges.to_top - MV_MARGIN,
      edges.to_bottom + MV_MARGIN,
    )
  });
  (best[0], best[1])
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::partition::BlockSize::*;
  use pretty_assertions::assert_eq;

  fn inter(ref_frame: RefType, mv: MotionVector) -> ModeInfo {
    ModeInfo {
      mode: PredictionMode::NEWMV,
      ref_frame: [ref_frame, NONE_FRAME],
      mv: [mv, MotionVector::ZERO],
      ..Default::default()
    }
  }

  #[test]
  fn candidate_list_deduplicates() {
    let mut list = CandidateList::default();
    let a = MotionVector::new(4, 4);
    assert_eq!(list.try_add(a), Ok(()));
    assert_eq!(list.try_add(a), Ok(()));
    assert_eq!(list.len(), 1);
    assert_eq!(list.try_add(MotionVector::new(4, 6)), Err(ListFull));
    assert_eq!(list.mvs(), [a, MotionVector::new(4, 6)]);
  }

  #[test]
  fn empty_neighbourhood_gives_zero_candidates() {
    let mut data = vec![ModeInfo::default(); 8 * 8];
    let mi = TileModeInfo::from_slice(&mut data, 0, 8);
    let search = MvRefSearch { mi: &mi, prev: None, sign_bias: [false; 4] };
    let edges = MbEdges::new(0, 0, BLOCK_16X16, 8, 8);
    let refs =
      search.find_mv_refs(0, 0, BLOCK_16X16, LAST_FRAME, None, &edges);
    assert_eq!(refs.list, [MotionVector::ZERO; 2]);
    assert_eq!(refs.mode_context, BothPredicted);
    assert_eq!(refs.counts, NeighbourCounts::default());
  }

  #[test]
  fn candidates_are_clamped_to_border() {
    let mut data = vec![ModeInfo::default(); 8 * 8];
    let mut mi = TileModeInfo::from_slice(&mut data, 0, 8);
    let far = MotionVector::new(-4000, -4000);
    mi.set_block(0, 2, BLOCK_8X8, &inter(LAST_FRAME, far));
    let search = MvRefSearch { mi: &mi, prev: None, sign_bias: [false; 4] };
    let edges = MbEdges::new(1, 2, BLOCK_8X8, 8, 8);
    let refs = search.find_mv_refs(1, 2, BLOCK_8X8, LAST_FRAME, None, &edges);
    assert_eq!(refs.list[0], MotionVector::new(-64 - 128, -128 - 128));
    assert_eq!(refs.list[1], MotionVector::ZERO);
    // Above neighbour is a new vector, left is intra.
    assert_eq!(refs.mode_context, IntraPlusNonIntra);
  }

  #[test]
  fn different_reference_is_sign_inverted() {
    let mut data = vec![ModeInfo::default(); 8 * 8];
    let mut mi = TileModeInfo::from_slice(&mut data, 0, 8);
    let alt = inter(ALTREF_FRAME, MotionVector::new(8, -16));
    mi.set_block(2, 1, BLOCK_8X8, &alt);
    let search = MvRefSearch {
      mi: &mi,
      prev: None,
      sign_bias: [false, false, false, true],
    };
    let edges = MbEdges::new(2, 2, BLOCK_8X8, 8, 8);
    let refs = search.find_mv_refs(2, 2, BLOCK_8X8, LAST_FRAME, None, &edges);
    assert_eq!(refs.list[0], MotionVector::new(-8, 16));
  }

  #[test]
  fn previous_frame_supplies_candidate() {
    let mut data = vec![ModeInfo::default(); 8 * 8];
    let mi = TileModeInfo::from_slice(&mut data, 0, 8);
    let mut prev = ModeInfoGrid::new(8, 8);
    prev
      .tile_views_mut(8)
      .remove(0)
      .set_block(3, 3, BLOCK_8X8, &inter(LAST_FRAME, MotionVector::new(6, 2)));
    let search =
      MvRefSearch { mi: &mi, prev: Some(&prev), sign_bias: [false; 4] };
    let edges = MbEdges::new(3, 3, BLOCK_8X8, 8, 8);
    let refs = search.find_mv_refs(3, 3, BLOCK_8X8, LAST_FRAME, None, &edges);
    assert_eq!(refs.list[0], MotionVector::new(6, 2));
  }

  #[test]
  fn best_ref_mvs_drop_eighth_pel() {
    let edges = MbEdges::new(4, 4, BLOCK_8X8, 16, 16);
    let list = [MotionVector::new(3, -5), MotionVector::new(200, 1)];
    let (nearest, near) = find_best_ref_mvs(&list, false, &edges);
    assert_eq!(nearest, MotionVector::new(2, -4));
    assert_eq!(near, MotionVector::new(200, 0));
    let (nearest, _) = find_best_ref_mvs(&list, true, &edges);
    assert_eq!(nearest, MotionVector::new(3, -5));
  }

  #[test]
  fn sub8x8_later_blocks_reuse_earlier_vectors() {
    let mut data = vec![ModeInfo::default(); 8 * 8];
    let mi = TileModeInfo::from_slice(&mut data, 0, 8);
    let search = MvRefSearch { mi: &mi, prev: None, sign_bias: [false; 4] };
    let mut cur = inter(LAST_FRAME, MotionVector::ZERO);
    cur.sb_type = BLOCK_4X4;
    cur.bmi[0].mv[0] = MotionVector::new(10, 10);
    cur.bmi[1].mv[0] = MotionVector::new(12, 10);
    cur.bmi[2].mv[0] = MotionVector::new(10, 10);
    let edges = MbEdges::new(2, 2, BLOCK_4X4, 8, 8);
    let (nearest, near) =
      search.append_sub8x8_mvs_for_idx(&cur, 1, 0, 2, 2, &edges);
    assert_eq!(nearest, MotionVector::new(10, 10));
    assert_eq!(near, MotionVector::ZERO);
    let (nearest, near) =
      search.append_sub8x8_mvs_for_idx(&cur, 3, 0, 2, 2, &edges);
    assert_eq!(nearest, MotionVector::new(10, 10));
    assert_eq!(near, MotionVector::new(12, 10));
  }
}
