// Copyright (c) 2017-2023, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Block motion search.
//!
//! Full pel searches work on whole-pel vectors and rank candidates by SAD
//! plus an approximate vector cost; their result is re-scored as variance
//! plus the real vector cost so that searches can be compared with each
//! other and with the sub-pel refinement. Infeasible results carry
//! `u32::MAX`.

use crate::api::{SearchMethod, SpeedSettings};
use crate::dist::*;
use crate::entropymv::*;
use crate::frame::*;
use crate::mc::MotionVector;
use crate::partition::*;
use crate::util::*;

use std::cmp;

pub const MAX_MVSEARCH_STEPS: usize = 11;
/// Largest full pel distance a search may move away from its reference.
pub const MAX_FULL_PEL_VAL: i32 = (1 << (MAX_MVSEARCH_STEPS - 1)) - 1;
/// Length of the first diamond step.
pub const MAX_FIRST_STEP: i32 = 1 << (MAX_MVSEARCH_STEPS - 1);

const MAX_PATTERN_SCALES: usize = 11;
const MAX_PATTERN_CANDIDATES: usize = 8;
const PATTERN_CANDIDATES_REF: usize = 3;

/// Full pel range a block's vector may take.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MvLimits {
  pub row_min: i32,
  pub row_max: i32,
  pub col_min: i32,
  pub col_max: i32,
}

impl MvLimits {
  /// Lets the block move until it lies just outside the frame, plus the
  /// interpolation margin.
  pub fn new(
    mi_row: usize, mi_col: usize, bsize: BlockSize, mi_rows: usize,
    mi_cols: usize,
  ) -> Self {
    const INTERP_EXTEND: i32 = crate::mc::VP9_INTERP_EXTEND;
    let mi_h = bsize.height_mi() as i32;
    let mi_w = bsize.width_mi() as i32;
    let (mi_row, mi_col) = (mi_row as i32, mi_col as i32);
    MvLimits {
      row_min: -((mi_row + mi_h) * MI_SIZE as i32 + INTERP_EXTEND),
      col_min: -((mi_col + mi_w) * MI_SIZE as i32 + INTERP_EXTEND),
      row_max: (mi_rows as i32 - mi_row) * MI_SIZE as i32 + INTERP_EXTEND,
      col_max: (mi_cols as i32 - mi_col) * MI_SIZE as i32 + INTERP_EXTEND,
    }
  }

  /// Intersects with the window a vector coded against `ref_mv` can reach.
  pub fn clamp_to_ref(&mut self, ref_mv: MotionVector) {
    let (row, col) = (ref_mv.row as i32, ref_mv.col as i32);
    let col_min = cmp::max(
      (col >> 3) - MAX_FULL_PEL_VAL + (col & 7 != 0) as i32,
      (MV_LOW >> 3) + 1,
    );
    let row_min = cmp::max(
      (row >> 3) - MAX_FULL_PEL_VAL + (row & 7 != 0) as i32,
      (MV_LOW >> 3) + 1,
    );
    let col_max = cmp::min((col >> 3) + MAX_FULL_PEL_VAL, (MV_UPP >> 3) - 1);
    let row_max = cmp::min((row >> 3) + MAX_FULL_PEL_VAL, (MV_UPP >> 3) - 1);

    self.col_min = self.col_min.max(col_min);
    self.col_max = self.col_max.min(col_max);
    self.row_min = self.row_min.max(row_min);
    self.row_max = self.row_max.min(row_max);
  }

  #[inline]
  pub fn contains(&self, mv: MotionVector) -> bool {
    let (r, c) = (mv.row as i32, mv.col as i32);
    r >= self.row_min && r <= self.row_max && c >= self.col_min
      && c <= self.col_max
  }

  #[inline]
  fn contains_strictly(&self, mv: MotionVector) -> bool {
    let (r, c) = (mv.row as i32, mv.col as i32);
    r > self.row_min && r < self.row_max && c > self.col_min
      && c < self.col_max
  }

  #[inline]
  pub fn clamp(&self, mv: MotionVector) -> MotionVector {
    mv.clamp(self.col_min, self.col_max, self.row_min, self.row_max)
  }
}

/// First diamond step to use for a vector magnitude of `size` full pels.
pub fn init_search_range(size: i32, sf: &SpeedSettings) -> usize {
  let size = size.max(16);
  let mut sr: usize = 0;
  while (size << sr) < MAX_FULL_PEL_VAL {
    sr += 1;
  }
  sr = sr.saturating_sub(1);
  sr += sf.reduce_first_step_size;
  sr.min(sf.max_step_search_steps.saturating_sub(2))
}

/// Search sites of the diamond searches, one ring per halving step length.
#[derive(Clone, Copy, Debug)]
pub struct SearchSiteConfig {
  sites: &'static [MotionVector],
  searches_per_step: usize,
}

const DS_SITE_COUNT: usize = 1 + 4 * MAX_MVSEARCH_STEPS;
const THREE_STEP_SITE_COUNT: usize = 1 + 8 * MAX_MVSEARCH_STEPS;

const fn search_sites<const N: usize>(diagonals: bool) -> [MotionVector; N] {
  let mut sites = [MotionVector::ZERO; N];
  let mut n = 1;
  let mut len = MAX_FIRST_STEP as i16;
  while len > 0 {
    sites[n] = MotionVector::new(-len, 0);
    sites[n + 1] = MotionVector::new(len, 0);
    sites[n + 2] = MotionVector::new(0, -len);
    sites[n + 3] = MotionVector::new(0, len);
    n += 4;
    if diagonals {
      sites[n] = MotionVector::new(-len, -len);
      sites[n + 1] = MotionVector::new(-len, len);
      sites[n + 2] = MotionVector::new(len, -len);
      sites[n + 3] = MotionVector::new(len, len);
      n += 4;
    }
    len /= 2;
  }
  sites
}

static DS_SITES: [MotionVector; DS_SITE_COUNT] = search_sites(false);
static THREE_STEP_SITES: [MotionVector; THREE_STEP_SITE_COUNT] =
  search_sites(true);

impl SearchSiteConfig {
  /// Four axis sites per step.
  pub fn diamond() -> Self {
    SearchSiteConfig { sites: &DS_SITES, searches_per_step: 4 }
  }

  /// Axis and diagonal sites, eight per step.
  pub fn three_step() -> Self {
    SearchSiteConfig { sites: &THREE_STEP_SITES, searches_per_step: 8 }
  }

  #[inline]
  pub fn total_steps(&self) -> usize {
    self.sites.len() / self.searches_per_step
  }
}

/// Candidate offsets of a multi-scale pattern search, `(row, col)`.
pub struct SearchPattern {
  num_candidates: [usize; MAX_PATTERN_SCALES],
  candidates: [[(i16, i16); MAX_PATTERN_CANDIDATES]; MAX_PATTERN_SCALES],
}

const fn scaled_pattern(
  first: [(i16, i16); MAX_PATTERN_CANDIDATES], base: [(i16, i16); 8],
) -> [[(i16, i16); MAX_PATTERN_CANDIDATES]; MAX_PATTERN_SCALES] {
  let mut out = [[(0, 0); MAX_PATTERN_CANDIDATES]; MAX_PATTERN_SCALES];
  out[0] = first;
  let mut s = 1;
  while s < MAX_PATTERN_SCALES {
    let mut i = 0;
    while i < MAX_PATTERN_CANDIDATES {
      let m = 1 << (s - 1);
      out[s][i] = (base[i].0 * m, base[i].1 * m);
      i += 1;
    }
    s += 1;
  }
  out
}

/// Eight neighbours first, then hexagons of radius `2^scale`.
pub static HEX_PATTERN: SearchPattern = SearchPattern {
  num_candidates: [8, 6, 6, 6, 6, 6, 6, 6, 6, 6, 6],
  candidates: scaled_pattern(
    [(-1, -1), (0, -1), (1, -1), (1, 0), (1, 1), (0, 1), (-1, 1), (-1, 0)],
    [(-1, -2), (1, -2), (2, 0), (1, 2), (-1, 2), (-2, 0), (0, 0), (0, 0)],
  ),
};

/// Four neighbours first, then diamonds of eight points.
pub static BIGDIA_PATTERN: SearchPattern = SearchPattern {
  num_candidates: [4, 8, 8, 8, 8, 8, 8, 8, 8, 8, 8],
  candidates: scaled_pattern(
    [(0, -1), (1, 0), (0, 1), (-1, 0), (0, 0), (0, 0), (0, 0), (0, 0)],
    [(-1, -1), (0, -2), (1, -1), (2, 0), (1, 1), (0, 2), (-1, 1), (-2, 0)],
  ),
};

/// Squares of eight points at every scale.
pub static SQUARE_PATTERN: SearchPattern = SearchPattern {
  num_candidates: [8; MAX_PATTERN_SCALES],
  candidates: scaled_pattern(
    [(-1, -1), (0, -1), (1, -1), (1, 0), (1, 1), (0, 1), (-1, 1), (-1, 0)],
    [(-2, -2), (0, -2), (2, -2), (2, 0), (2, 2), (0, 2), (-2, 2), (-2, 0)],
  ),
};

/// The three candidates around `k` on a ring of `n`.
#[inline]
fn next_chkpts(k: usize, n: usize) -> [usize; PATTERN_CANDIDATES_REF] {
  [if k == 0 { n - 1 } else { k - 1 }, k, if k == n - 1 { 0 } else { k + 1 }]
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SearchResult {
  pub mv: MotionVector,
  pub cost: u32,
}

impl SearchResult {
  #[inline]
  pub fn is_feasible(&self) -> bool {
    self.cost != u32::MAX
  }
}

/// Everything a search needs to know about one block.
///
/// `src` is the source block and `pre` the reference at the block's
/// position, so that a full pel vector is an offset into `pre`.
#[derive(Clone, Copy)]
pub struct MotionSearch<'a, T: Pixel> {
  pub src: PlaneSlice<'a, T>,
  pub pre: PlaneSlice<'a, T>,
  pub w: usize,
  pub h: usize,
  pub limits: MvLimits,
  pub costs: &'a MvCostTables,
  pub allow_hp: bool,
  pub sad_per_bit: u32,
  pub error_per_bit: u32,
}

impl<'a, T: Pixel> MotionSearch<'a, T> {
  #[inline]
  fn sad(&self, mv: MotionVector) -> u32 {
    let r = self.pre.reslice(mv.col as isize, mv.row as isize);
    get_sad(&self.src, &r, self.w, self.h)
  }

  #[inline]
  fn variance(&self, mv: MotionVector) -> u32 {
    let r = self.pre.reslice(mv.col as isize, mv.row as isize);
    get_variance(&self.src, &r, self.w, self.h).0
  }

  /// Variance at an eighth pel vector.
  #[inline]
  fn sub_pixel_variance(&self, row: i32, col: i32) -> u32 {
    let r = self.pre.reslice((col >> 3) as isize, (row >> 3) as isize);
    let sp = |x: i32| ((x & 7) << 1) as usize;
    get_sub_pixel_variance(&r, sp(col), sp(row), &self.src, self.w, self.h).0
  }

  #[inline]
  fn mvsad_cost(&self, mv: MotionVector, fcenter: MotionVector) -> u32 {
    self.costs.mvsad_err_cost(mv, fcenter, self.sad_per_bit)
  }

  #[inline]
  fn mv_err_cost(&self, mv: MotionVector, center: MotionVector) -> u32 {
    self.costs.mv_err_cost(mv, center, self.allow_hp, self.error_per_bit)
  }

  /// Final score of a full pel result.
  fn fullpel_result(
    &self, mv: MotionVector, bestsad: u32, center: MotionVector,
    use_mvcost: bool,
  ) -> SearchResult {
    if bestsad == u32::MAX {
      return SearchResult { mv, cost: u32::MAX };
    }
    let mvcost =
      if use_mvcost { self.mv_err_cost(mv.from_fullpel(), center) } else { 0 };
    SearchResult { mv, cost: self.variance(mv).saturating_add(mvcost) }
  }

  /// Tries `base + cands[i]` for each index, keeping the best below
  /// `bestsad`. Out of range points are skipped.
  fn check_candidates(
    &self, base: MotionVector, cands: &[(i16, i16)],
    idx: impl Iterator<Item = usize>, fcenter: MotionVector, use_mvcost: bool,
    bestsad: &mut u32,
  ) -> Option<usize> {
    let mut best_site = None;
    for i in idx {
      let mv = base + MotionVector::new(cands[i].0, cands[i].1);
      if !self.limits.contains(mv) {
        continue;
      }
      let mut thissad = self.sad(mv);
      if thissad < *bestsad {
        if use_mvcost {
          thissad = thissad.saturating_add(self.mvsad_cost(mv, fcenter));
        }
        if thissad < *bestsad {
          *bestsad = thissad;
          best_site = Some(i);
        }
      }
    }
    best_site
  }

  /// Multi-scale pattern search starting at the full pel `ref_mv`.
  ///
  /// With `do_init_search` every scale up to the one `search_param`
  /// selects is probed around the start and the search continues from the
  /// best scale; each scale is then refined by probing the three
  /// candidates next to the last winner until none improves.
  pub fn pattern_search(
    &self, ref_mv: MotionVector, search_param: usize, do_init_search: bool,
    do_refine: bool, use_mvcost: bool, center_mv: MotionVector,
    pattern: &SearchPattern,
  ) -> SearchResult {
    const NEIGHBORS: [(i16, i16); 4] = [(0, -1), (-1, 0), (1, 0), (0, 1)];
    let fcenter = center_mv.to_fullpel();
    let cands = &pattern.candidates;
    let num = &pattern.num_candidates;

    let mut br = self.limits.clamp(ref_mv);
    let mut bestsad =
      self.sad(br).saturating_add(self.mvsad_cost(br, fcenter));

    let top =
      MAX_PATTERN_SCALES - 1 - search_param.min(MAX_PATTERN_SCALES - 1);
    let mut best_init_s = Some(top);
    let mut k = 0;

    if do_init_search {
      best_init_s = None;
      for t in 0..=top {
        if let Some(site) = self.check_candidates(
          br,
          &cands[t],
          0..num[t],
          fcenter,
          use_mvcost,
          &mut bestsad,
        ) {
          best_init_s = Some(t);
          k = site;
        }
      }
      if let Some(s) = best_init_s {
        br = br + MotionVector::new(cands[s][k].0, cands[s][k].1);
      }
    }

    if let Some(start) = best_init_s {
      for s in (0..=start).rev() {
        if !do_init_search || s != start {
          match self.check_candidates(
            br,
            &cands[s],
            0..num[s],
            fcenter,
            use_mvcost,
            &mut bestsad,
          ) {
            Some(site) => {
              k = site;
              br = br + MotionVector::new(cands[s][k].0, cands[s][k].1);
            }
            None => continue,
          }
        }

        while let Some(site) = self.check_candidates(
          br,
          &cands[s],
          next_chkpts(k, num[s]).into_iter(),
          fcenter,
          use_mvcost,
          &mut bestsad,
        ) {
          k = site;
          br = br + MotionVector::new(cands[s][k].0, cands[s][k].1);
        }
      }
    }

    if do_refine {
      for _ in 0..16 {
        match self.check_candidates(
          br,
          &NEIGHBORS,
          0..NEIGHBORS.len(),
          fcenter,
          use_mvcost,
          &mut bestsad,
        ) {
          Some(site) => {
            br = br + MotionVector::new(NEIGHBORS[site].0, NEIGHBORS[site].1);
          }
          None => break,
        }
      }
    }

    self.fullpel_result(br, bestsad, center_mv, use_mvcost)
  }

  pub fn hex_search(
    &self, ref_mv: MotionVector, search_param: usize, do_init_search: bool,
    use_mvcost: bool, center_mv: MotionVector,
  ) -> SearchResult {
    self.pattern_search(
      ref_mv,
      search_param,
      do_init_search,
      false,
      use_mvcost,
      center_mv,
      &HEX_PATTERN,
    )
  }

  pub fn bigdia_search(
    &self, ref_mv: MotionVector, search_param: usize, do_init_search: bool,
    use_mvcost: bool, center_mv: MotionVector,
  ) -> SearchResult {
    self.pattern_search(
      ref_mv,
      search_param,
      do_init_search,
      false,
      use_mvcost,
      center_mv,
      &BIGDIA_PATTERN,
    )
  }

  pub fn square_search(
    &self, ref_mv: MotionVector, search_param: usize, do_init_search: bool,
    use_mvcost: bool, center_mv: MotionVector,
  ) -> SearchResult {
    self.pattern_search(
      ref_mv,
      search_param,
      do_init_search,
      false,
      use_mvcost,
      center_mv,
      &SQUARE_PATTERN,
    )
  }

  /// Diamond search starting at step `search_param`. Also returns how many
  /// steps ended without moving away from the start.
  pub fn diamond_search_sad(
    &self, ref_mv: MotionVector, search_param: usize, ss: &SearchSiteConfig,
    center_mv: MotionVector,
  ) -> (SearchResult, usize) {
    let fcenter = center_mv.to_fullpel();
    let start = self.limits.clamp(ref_mv);
    let mut best = start;
    let mut bestsad =
      self.sad(best).saturating_add(self.mvsad_cost(best, fcenter));
    let mut num00 = 0;

    let sps = ss.searches_per_step;
    let tot_steps = ss.total_steps().saturating_sub(search_param);
    let sites = ss.sites.get(search_param * sps..).unwrap_or(&[]);

    let mut i = 1;
    let mut best_site = 0;
    let mut last_site = 0;
    for _ in 0..tot_steps {
      for _ in 0..sps {
        let mv = best + sites[i];
        if self.limits.contains_strictly(mv) {
          let thissad = self.sad(mv);
          if thissad < bestsad {
            let thissad = thissad.saturating_add(self.mvsad_cost(mv, fcenter));
            if thissad < bestsad {
              bestsad = thissad;
              best_site = i;
            }
          }
        }
        i += 1;
      }

      if best_site != last_site {
        best = best + sites[best_site];
        last_site = best_site;
      } else if best == start {
        num00 += 1;
      }
    }

    (self.fullpel_result(best, bestsad, center_mv, true), num00)
  }

  /// Diamond search followed by `further_steps` searches with ever
  /// shorter first steps, skipping those the first search already showed
  /// to stay at the start, and an optional one-away refinement.
  pub fn full_pixel_diamond(
    &self, mvp_full: MotionVector, step_param: usize, further_steps: usize,
    do_refine: bool, ss: &SearchSiteConfig, center_mv: MotionVector,
  ) -> SearchResult {
    let (mut best, num00) =
      self.diamond_search_sad(mvp_full, step_param, ss, center_mv);
    let mut do_refine = do_refine;
    let mut n = num00;
    let mut num00 = 0;

    if n > further_steps {
      do_refine = false;
    }

    while n < further_steps {
      n += 1;
      if num00 > 0 {
        num00 -= 1;
        continue;
      }
      let (r, skip) =
        self.diamond_search_sad(mvp_full, step_param + n, ss, center_mv);
      num00 = skip;
      if num00 > further_steps - n {
        do_refine = false;
      }
      if r.cost < best.cost {
        best = r;
      }
    }

    if do_refine {
      let r = self.refining_search_sad(best.mv, 8, center_mv);
      if r.cost < best.cost {
        best = r;
      }
    }
    best
  }

  /// Walks one pel at a time while a neighbour improves, at most
  /// `search_range` times.
  pub fn refining_search_sad(
    &self, ref_mv: MotionVector, search_range: usize, center_mv: MotionVector,
  ) -> SearchResult {
    const NEIGHBORS: [MotionVector; 4] = [
      MotionVector::new(-1, 0),
      MotionVector::new(0, -1),
      MotionVector::new(0, 1),
      MotionVector::new(1, 0),
    ];
    let fcenter = center_mv.to_fullpel();
    let mut best = ref_mv;
    let mut bestsad =
      self.sad(best).saturating_add(self.mvsad_cost(best, fcenter));

    for _ in 0..search_range {
      let mut best_site = None;
      for (j, &n) in NEIGHBORS.iter().enumerate() {
        let mv = best + n;
        if !self.limits.contains_strictly(mv) {
          continue;
        }
        let thissad = self.sad(mv);
        if thissad < bestsad {
          let thissad = thissad.saturating_add(self.mvsad_cost(mv, fcenter));
          if thissad < bestsad {
            bestsad = thissad;
            best_site = Some(j);
          }
        }
      }
      match best_site {
        Some(j) => best = best + NEIGHBORS[j],
        None => break,
      }
    }

    self.fullpel_result(best, bestsad, center_mv, true)
  }

  /// Exhaustive search of the window `distance` pels around `ref_mv`.
  pub fn full_search_sad(
    &self, ref_mv: MotionVector, distance: i32, center_mv: MotionVector,
  ) -> SearchResult {
    let fcenter = center_mv.to_fullpel();
    let center = self.limits.clamp(ref_mv);
    let mut best = center;
    let mut bestsad =
      self.sad(best).saturating_add(self.mvsad_cost(best, fcenter));

    let row_min = (center.row as i32 - distance).max(self.limits.row_min);
    let row_max = (center.row as i32 + distance).min(self.limits.row_max);
    let col_min = (center.col as i32 - distance).max(self.limits.col_min);
    let col_max = (center.col as i32 + distance).min(self.limits.col_max);

    for r in row_min..row_max {
      for c in col_min..col_max {
        let mv = MotionVector::new(r as i16, c as i16);
        let thissad =
          self.sad(mv).saturating_add(self.mvsad_cost(mv, fcenter));
        if thissad < bestsad {
          bestsad = thissad;
          best = mv;
        }
      }
    }

    self.fullpel_result(best, bestsad, center_mv, true)
  }

  /// Refines the full pel `best_mv` to half, quarter and, when the
  /// precision allows it, eighth pel.
  ///
  /// Each level probes the four axis neighbours and the diagonal between
  /// the two better ones, for at most `iters_per_step` rounds. The result
  /// is an eighth pel vector; it is infeasible if it ended up farther from
  /// `ref_mv` than a coded vector can reach.
  pub fn find_best_sub_pixel_iterative(
    &self, best_mv: MotionVector, ref_mv: MotionVector, iters_per_step: usize,
  ) -> SearchResult {
    let (rr, rc) = (ref_mv.row as i32, ref_mv.col as i32);
    let bounds = SubpelBounds {
      minc: (self.limits.col_min << 3).max(rc - MV_MAX),
      maxc: (self.limits.col_max << 3).min(rc + MV_MAX),
      minr: (self.limits.row_min << 3).max(rr - MV_MAX),
      maxr: (self.limits.row_max << 3).min(rr + MV_MAX),
    };

    let center = best_mv.from_fullpel();
    let mut best = SubpelBest {
      row: center.row as i32,
      col: center.col as i32,
      err: self
        .variance(best_mv)
        .saturating_add(self.mv_err_cost(center, ref_mv)),
    };

    let mut hsteps = arrayvec::ArrayVec::<i32, 3>::new();
    hsteps.push(4);
    hsteps.push(2);
    if self.allow_hp && ref_mv.use_mv_hp() {
      hsteps.push(1);
    }

    for h in hsteps {
      let (mut tr, mut tc) = (best.row, best.col);
      for _ in 0..iters_per_step {
        let left = self.subpel_check(tr, tc - h, &bounds, ref_mv, &mut best);
        let right = self.subpel_check(tr, tc + h, &bounds, ref_mv, &mut best);
        let up = self.subpel_check(tr - h, tc, &bounds, ref_mv, &mut best);
        let down = self.subpel_check(tr + h, tc, &bounds, ref_mv, &mut best);

        let (dr, dc) = (
          if up < down { -h } else { h },
          if left < right { -h } else { h },
        );
        self.subpel_check(tr + dr, tc + dc, &bounds, ref_mv, &mut best);

        if tr == best.row && tc == best.col {
          break;
        }
        tr = best.row;
        tc = best.col;
      }
    }

    let mv = MotionVector::new(best.row as i16, best.col as i16);
    if (best.col - rc).abs() > (MAX_FULL_PEL_VAL << 3)
      || (best.row - rr).abs() > (MAX_FULL_PEL_VAL << 3)
    {
      return SearchResult { mv, cost: u32::MAX };
    }
    SearchResult { mv, cost: best.err }
  }

  fn subpel_check(
    &self, r: i32, c: i32, b: &SubpelBounds, ref_mv: MotionVector,
    best: &mut SubpelBest,
  ) -> u32 {
    if c < b.minc || c > b.maxc || r < b.minr || r > b.maxr {
      return u32::MAX;
    }
    let mv = MotionVector::new(r as i16, c as i16);
    let v = self
      .sub_pixel_variance(r, c)
      .saturating_add(self.mv_err_cost(mv, ref_mv));
    if v < best.err {
      *best = SubpelBest { row: r, col: c, err: v };
    }
    v
  }

  /// Picks the search start among `candidates` by SAD at their nearest
  /// full pel position, also returning the largest candidate magnitude in
  /// full pels.
  pub fn mv_pred(&self, candidates: &[MotionVector]) -> (MotionVector, i32) {
    let round = |v: i16| {
      let v = v as i32;
      ((v + 3 + (v >= 0) as i32) >> 3) as i16
    };
    let mut best = (MotionVector::ZERO, u32::MAX);
    let mut max_mv: i32 = 0;
    for (i, &mv) in candidates.iter().enumerate() {
      let mag = (mv.row as i32).abs().max((mv.col as i32).abs());
      max_mv = max_mv.max(mag >> 3);
      if candidates[..i].contains(&mv) {
        continue;
      }
      let fp =
        self.limits.clamp(MotionVector::new(round(mv.row), round(mv.col)));
      let sad = self.sad(fp);
      if sad < best.1 {
        best = (fp, sad);
      }
    }
    (best.0, max_mv)
  }
}

struct SubpelBounds {
  minc: i32,
  maxc: i32,
  minr: i32,
  maxr: i32,
}

struct SubpelBest {
  row: i32,
  col: i32,
  err: u32,
}

/// Outcome of a new motion vector search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NewMvResult {
  pub mv: MotionVector,
  /// Rate of coding `mv` against the reference vector, in 1/256 bit.
  pub rate_mv: u32,
}

/// Searches a new vector for one block against one reference.
///
/// `ref_mv` is the vector the result is coded against, `candidates` the
/// vectors considered as starting points (nearest, near and the vector a
/// larger block found, when any) and `mv_step_param` the frame level
/// first step. Returns `None` when no feasible vector exists.
pub fn single_motion_search<T: Pixel>(
  ms: &MotionSearch<'_, T>, bsize: BlockSize, ref_mv: MotionVector,
  candidates: &[MotionVector], mv_step_param: usize, sf: &SpeedSettings,
) -> Option<NewMvResult> {
  let mut ms = *ms;
  ms.limits.clamp_to_ref(ref_mv);
  if ms.limits.row_min > ms.limits.row_max
    || ms.limits.col_min > ms.limits.col_max
  {
    return None;
  }

  let (mvp_full, max_mv_context) = ms.mv_pred(candidates);

  let mut step_param =
    (init_search_range(max_mv_context, sf) + mv_step_param) / 2;
  if sf.adaptive_motion_search && bsize < BlockSize::BLOCK_64X64 {
    let b = bsize.width_4x4_log2().min(bsize.height_4x4_log2());
    let boffset = 2 * (BlockSize::BLOCK_64X64.width_4x4_log2() - b);
    step_param = step_param.max(boffset);
  }
  let step_param = step_param.min(MAX_MVSEARCH_STEPS - 1);
  let further_steps =
    (sf.max_step_search_steps.saturating_sub(1)).saturating_sub(step_param);

  let full = match sf.search_method {
    SearchMethod::Hex => {
      ms.hex_search(mvp_full, step_param, true, true, ref_mv)
    }
    SearchMethod::BigDia => {
      ms.bigdia_search(mvp_full, step_param, true, true, ref_mv)
    }
    SearchMethod::Square => {
      ms.square_search(mvp_full, step_param, true, true, ref_mv)
    }
    SearchMethod::Full => {
      let distance = (MAX_FIRST_STEP >> step_param).min(64);
      ms.full_search_sad(mvp_full, distance, ref_mv)
    }
    SearchMethod::Diamond => ms.full_pixel_diamond(
      mvp_full,
      step_param,
      further_steps,
      true,
      &SearchSiteConfig::diamond(),
      ref_mv,
    ),
    SearchMethod::NStep => ms.full_pixel_diamond(
      mvp_full,
      step_param,
      further_steps,
      true,
      &SearchSiteConfig::three_step(),
      ref_mv,
    ),
  };
  if !full.is_feasible() {
    return None;
  }

  let sub =
    ms.find_best_sub_pixel_iterative(
      full.mv,
      ref_mv,
      sf.subpel_iters_per_step,
    );
  if !sub.is_feasible() {
    return None;
  }

  let rate_mv =
    ms.costs.mv_bit_cost(sub.mv, ref_mv, ms.allow_hp, MV_COST_WEIGHT);
  Some(NewMvResult { mv: sub.mv, rate_mv })
}

#[cfg(test)]
pub mod test {
  use super::*;
  use rand::{Rng, SeedableRng};
  use rand_chacha::ChaChaRng;

  const BX: isize = 16;
  const BY: isize = 16;
  const TRUE_MV: MotionVector = MotionVector::new(2, -3);

  fn noise_plane(seed: u64) -> Plane<u8> {
    let mut p = Plane::new(64, 64, 0, 0, 32, 32);
    let mut rng = ChaChaRng::seed_from_u64(seed);
    for v in p.data.iter_mut() {
      *v = rng.gen();
    }
    p
  }

  /// Source whose block at `(BX, BY)` is the reference displaced by `mv`.
  fn shifted(r: &Plane<u8>, mv: MotionVector) -> Plane<u8> {
    let mut s = Plane::new(64, 64, 0, 0, 32, 32);
    let rs = r.as_slice().reslice(mv.col as isize, mv.row as isize);
    let mut d = s.as_mut_slice();
    for y in 0..64 {
      for x in 0..64 {
        d[y][x] = rs[y][x];
      }
    }
    s
  }

  fn search<'a>(
    src: &'a Plane<u8>, pre: &'a Plane<u8>, costs: &'a MvCostTables,
  ) -> MotionSearch<'a, u8> {
    MotionSearch {
      src: src.slice(PlaneOffset { x: BX, y: BY }),
      pre: pre.slice(PlaneOffset { x: BX, y: BY }),
      w: 16,
      h: 16,
      limits: MvLimits { row_min: -8, row_max: 8, col_min: -8, col_max: 8 },
      costs,
      allow_hp: false,
      sad_per_bit: 16,
      error_per_bit: 64,
    }
  }

  #[test]
  fn limits_follow_block_position() {
    let l = MvLimits::new(2, 3, BlockSize::BLOCK_16X16, 10, 12);
    assert_eq!(l.row_min, -(4 * 8 + 4));
    assert_eq!(l.col_min, -(5 * 8 + 4));
    assert_eq!(l.row_max, 8 * 8 + 4);
    assert_eq!(l.col_max, 9 * 8 + 4);

    let mut l = MvLimits {
      row_min: -5000,
      row_max: 5000,
      col_min: -5000,
      col_max: 5000,
    };
    l.clamp_to_ref(MotionVector::new(17, -16));
    assert_eq!(l.row_min, 2 - MAX_FULL_PEL_VAL + 1);
    assert_eq!(l.row_max, 2 + MAX_FULL_PEL_VAL);
    assert_eq!(l.col_min, -2 - MAX_FULL_PEL_VAL);
    assert_eq!(l.col_max, -2 + MAX_FULL_PEL_VAL);
  }

  #[test]
  fn search_range_from_magnitude() {
    let sf = SpeedSettings::default();
    assert_eq!(init_search_range(0, &sf), 5);
    assert_eq!(init_search_range(16, &sf), 5);
    assert_eq!(init_search_range(100, &sf), 3);
    assert_eq!(init_search_range(1000, &sf), 0);
  }

  #[test]
  fn site_tables() {
    let ds = SearchSiteConfig::diamond();
    assert_eq!(ds.total_steps(), MAX_MVSEARCH_STEPS);
    assert_eq!(ds.sites[1], MotionVector::new(-1024, 0));
    assert_eq!(ds.sites[44], MotionVector::new(0, 1));
    let ts = SearchSiteConfig::three_step();
    assert_eq!(ts.total_steps(), MAX_MVSEARCH_STEPS);
    assert_eq!(ts.sites[88], MotionVector::new(1, 1));
    assert_eq!(HEX_PATTERN.candidates[3][2], (8, 0));
    assert_eq!(BIGDIA_PATTERN.candidates[10][1], (0, -1024));
    assert_eq!(SQUARE_PATTERN.candidates[1][0], (-2, -2));
  }

  #[test]
  fn full_search_finds_displacement() {
    let pre = noise_plane(1);
    let src = shifted(&pre, TRUE_MV);
    let costs = MvCostTables::default();
    let ms = search(&src, &pre, &costs);
    let r = ms.full_search_sad(MotionVector::ZERO, 8, MotionVector::ZERO);
    assert_eq!(r.mv, TRUE_MV);
    assert_eq!(
      r.cost,
      ms.mv_err_cost(TRUE_MV.from_fullpel(), MotionVector::ZERO)
    );
  }

  #[test]
  fn refining_search_walks_to_match() {
    let pre = noise_plane(2);
    let src = shifted(&pre, TRUE_MV);
    let costs = MvCostTables::default();
    let ms = search(&src, &pre, &costs);
    let r = ms.refining_search_sad(
      MotionVector::new(2, -2),
      8,
      MotionVector::ZERO,
    );
    assert_eq!(r.mv, TRUE_MV);
  }

  #[test]
  fn diamond_last_step_and_num00() {
    let pre = noise_plane(3);
    let src = shifted(&pre, TRUE_MV);
    let costs = MvCostTables::default();
    let ms = search(&src, &pre, &costs);
    let ds = SearchSiteConfig::diamond();

    let (r, num00) =
      ms.diamond_search_sad(MotionVector::new(2, -4), 10, &ds, TRUE_MV * 8);
    assert_eq!(r.mv, TRUE_MV);
    assert_eq!(num00, 0);

    let (r, num00) = ms.diamond_search_sad(TRUE_MV, 8, &ds, TRUE_MV * 8);
    assert_eq!(r.mv, TRUE_MV);
    assert_eq!(num00, 3);
    assert_eq!(r.cost, ms.mv_err_cost(TRUE_MV * 8, TRUE_MV * 8));
  }

  #[test]
  fn hex_search_first_scale() {
    let pre = noise_plane(4);
    let src = shifted(&pre, TRUE_MV);
    let costs = MvCostTables::default();
    let ms = search(&src, &pre, &costs);
    let r =
      ms.hex_search(MotionVector::new(3, -2), 10, true, true, TRUE_MV * 8);
    assert_eq!(r.mv, TRUE_MV);
    assert_eq!(r.cost, ms.mv_err_cost(TRUE_MV * 8, TRUE_MV * 8));
  }

  #[test]
  fn pattern_search_respects_limits() {
    let pre = noise_plane(5);
    let src = shifted(&pre, MotionVector::new(6, 6));
    let costs = MvCostTables::default();
    let mut ms = search(&src, &pre, &costs);
    ms.limits = MvLimits { row_min: -1, row_max: 1, col_min: -1, col_max: 1 };
    for pattern in [&HEX_PATTERN, &BIGDIA_PATTERN, &SQUARE_PATTERN] {
      let r = ms.pattern_search(
        MotionVector::new(7, 7),
        0,
        true,
        true,
        true,
        MotionVector::ZERO,
        pattern,
      );
      assert!(ms.limits.contains(r.mv));
      assert!(r.is_feasible());
    }
  }

  #[test]
  fn half_pel_match() {
    let pre = noise_plane(6);
    // Horizontal half pel average of the reference.
    let mut src = Plane::new(64, 64, 0, 0, 32, 32);
    {
      let rs = pre.as_slice();
      let mut d = src.as_mut_slice();
      for y in 0..64 {
        for x in 0..64 {
          let a = rs[y][x] as u32;
          let b = rs[y][x + 1] as u32;
          d[y][x] = ((a + b + 1) >> 1) as u8;
        }
      }
    }
    let costs = MvCostTables::default();
    let ms = search(&src, &pre, &costs);
    let r =
      ms.find_best_sub_pixel_iterative(
        MotionVector::ZERO,
        MotionVector::ZERO,
        3,
      );
    assert_eq!(r.mv, MotionVector::new(0, 4));
    assert_eq!(
      r.cost,
      ms.mv_err_cost(MotionVector::new(0, 4), MotionVector::ZERO)
    );
  }

  #[test]
  fn single_search_reports_rate() {
    let pre = noise_plane(7);
    let src = shifted(&pre, TRUE_MV);
    let costs = MvCostTables::default();
    let ms = search(&src, &pre, &costs);
    let sf = SpeedSettings::default();
    let cands = [TRUE_MV * 8, MotionVector::ZERO];
    let r = single_motion_search(
      &ms,
      BlockSize::BLOCK_16X16,
      MotionVector::ZERO,
      &cands,
      5,
      &sf,
    )
    .unwrap();
    assert_eq!(r.mv, TRUE_MV * 8);
    assert_eq!(
      r.rate_mv,
      costs.mv_bit_cost(TRUE_MV * 8, MotionVector::ZERO, false, MV_COST_WEIGHT)
    );
  }
}
