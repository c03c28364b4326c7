// Copyright (c) 2017-2023, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

//! Motion vector probabilities and the cost tables the motion search
//! charges vectors with.

#![allow(non_upper_case_globals)]

use crate::entropymode::{cost_bit, cost_tokens, TreeIndex};
use crate::mc::{MotionVector, MV_JOINTS};
use crate::util::ILog;

pub const MV_CLASSES: usize = 11;
pub const CLASS0_BITS: usize = 1;
pub const CLASS0_SIZE: usize = 1 << CLASS0_BITS;
pub const MV_OFFSET_BITS: usize = MV_CLASSES + CLASS0_BITS - 2;
pub const MV_FP_SIZE: usize = 4;

pub const MV_MAX_BITS: usize = MV_CLASSES + CLASS0_BITS + 2;
pub const MV_MAX: i32 = (1 << MV_MAX_BITS) - 1;
pub const MV_IN_USE_BITS: usize = 14;
pub const MV_UPP: i32 = (1 << MV_IN_USE_BITS) - 1;
pub const MV_LOW: i32 = -(1 << MV_IN_USE_BITS);

/// Values a cost table covers on each side of zero.
const MV_COST_RANGE: i32 = MV_UPP;
const MV_COST_VALS: usize = 2 * MV_COST_RANGE as usize + 1;

pub static mv_joint_tree: [TreeIndex; 6] = [-0, 2, -1, 4, -2, -3];

#[rustfmt::skip]
pub static mv_class_tree: [TreeIndex; 20] = [
  -0, 2,
  -1, 4,
  6, 8,
  -2, -3,
  10, 12,
  -4, -5,
  -6, 14,
  16, 18,
  -7, -8,
  -9, -10,
];

pub static mv_class0_tree: [TreeIndex; 2] = [-0, -1];

pub static mv_fp_tree: [TreeIndex; 6] = [-0, 2, -1, 4, -2, -3];

/// Probabilities of one vector component.
#[derive(Clone, Copy, Debug)]
pub struct NmvComponent {
  pub sign: u8,
  pub classes: [u8; MV_CLASSES - 1],
  pub class0: [u8; CLASS0_SIZE - 1],
  pub bits: [u8; MV_OFFSET_BITS],
  pub class0_fp: [[u8; MV_FP_SIZE - 1]; CLASS0_SIZE],
  pub fp: [u8; MV_FP_SIZE - 1],
  pub class0_hp: u8,
  pub hp: u8,
}

#[derive(Clone, Copy, Debug)]
pub struct NmvContext {
  pub joints: [u8; MV_JOINTS - 1],
  pub comps: [NmvComponent; 2],
}

pub static default_nmv_context: NmvContext = NmvContext {
  joints: [32, 64, 96],
  comps: [
    // vertical
    NmvComponent {
      sign: 128,
      classes: [224, 144, 192, 168, 192, 176, 192, 198, 198, 245],
      class0: [216],
      bits: [136, 140, 148, 160, 176, 192, 224, 234, 234, 240],
      class0_fp: [[128, 128, 64], [96, 112, 64]],
      fp: [64, 96, 64],
      class0_hp: 160,
      hp: 128,
    },
    // horizontal
    NmvComponent {
      sign: 128,
      classes: [216, 128, 176, 160, 176, 176, 192, 198, 198, 208],
      class0: [208],
      bits: [136, 140, 148, 160, 176, 192, 224, 234, 234, 240],
      class0_fp: [[128, 128, 64], [96, 112, 64]],
      fp: [64, 96, 64],
      class0_hp: 160,
      hp: 128,
    },
  ],
};

/// Magnitude class of `z = |v| - 1`.
#[inline]
pub fn mv_class(z: u32) -> usize {
  if z >= CLASS0_SIZE as u32 * 4096 {
    MV_CLASSES - 1
  } else if z >> 3 == 0 {
    0
  } else {
    ILog::ilog(z >> 3) - 1
  }
}

/// First `z` of class `c`.
#[inline]
pub const fn mv_class_base(c: usize) -> u32 {
  if c > 0 {
    (CLASS0_SIZE as u32) << (c + 2)
  } else {
    0
  }
}

/// Per-component costs of every difference in `-MV_UPP..=MV_UPP`.
#[derive(Clone)]
struct ComponentCosts {
  costs: Vec<u32>,
}

impl ComponentCosts {
  fn new(comp: &NmvComponent, usehp: bool) -> Self {
    let sign_cost = [cost_bit(comp.sign, false), cost_bit(comp.sign, true)];
    let mut class_cost = [0u32; MV_CLASSES];
    cost_tokens(&mut class_cost, &comp.classes, &mv_class_tree);
    let mut class0_cost = [0u32; CLASS0_SIZE];
    cost_tokens(&mut class0_cost, &comp.class0, &mv_class0_tree);
    let mut bits_cost = [[0u32; 2]; MV_OFFSET_BITS];
    for (c, &p) in bits_cost.iter_mut().zip(comp.bits.iter()) {
      *c = [cost_bit(p, false), cost_bit(p, true)];
    }
    let mut class0_fp_cost = [[0u32; MV_FP_SIZE]; CLASS0_SIZE];
    for (c, p) in class0_fp_cost.iter_mut().zip(comp.class0_fp.iter()) {
      cost_tokens(c, p, &mv_fp_tree);
    }
    let mut fp_cost = [0u32; MV_FP_SIZE];
    cost_tokens(&mut fp_cost, &comp.fp, &mv_fp_tree);
    let class0_hp_cost =
      [cost_bit(comp.class0_hp, false), cost_bit(comp.class0_hp, true)];
    let hp_cost = [cost_bit(comp.hp, false), cost_bit(comp.hp, true)];

    let mut costs = vec![0u32; MV_COST_VALS];
    let center = MV_COST_RANGE as usize;
    for v in 1..=MV_COST_RANGE as u32 {
      let z = v - 1;
      let c = mv_class(z);
      let o = z - mv_class_base(c);
      let d = (o >> 3) as usize;
      let f = ((o >> 1) & 3) as usize;
      let e = (o & 1) as usize;
      let mut cost = class_cost[c];
      if c == 0 {
        cost += class0_cost[d] + class0_fp_cost[d][f];
        if usehp {
          cost += class0_hp_cost[e];
        }
      } else {
        cost += (0..c).map(|i| bits_cost[i][(d >> i) & 1]).sum::<u32>();
        cost += fp_cost[f];
        if usehp {
          cost += hp_cost[e];
        }
      }
      costs[center + v as usize] = cost + sign_cost[0];
      costs[center - v as usize] = cost + sign_cost[1];
    }
    ComponentCosts { costs }
  }

  #[inline]
  fn get(&self, v: i32) -> u32 {
    let v = v.clamp(-MV_COST_RANGE, MV_COST_RANGE);
    self.costs[(v + MV_COST_RANGE) as usize]
  }
}

/// Approximate SAD-domain cost of a full pel component.
#[derive(Clone)]
struct SadCosts {
  costs: Vec<u32>,
}

impl SadCosts {
  fn new() -> Self {
    let mut costs = vec![0u32; MV_COST_VALS];
    let center = MV_COST_RANGE as usize;
    for i in 1..=MV_COST_RANGE as usize {
      let z = (256.0 * (2.0 * ((8.0 * i as f32).log2() + 0.6))) as u32;
      costs[center + i] = z;
      costs[center - i] = z;
    }
    SadCosts { costs }
  }

  #[inline]
  fn get(&self, v: i32) -> u32 {
    let v = v.clamp(-MV_COST_RANGE, MV_COST_RANGE);
    self.costs[(v + MV_COST_RANGE) as usize]
  }
}

/// Joint costs charged in the SAD domain.
pub const NMV_JOINT_SAD_COST: [u32; MV_JOINTS] = [600, 300, 300, 300];

/// Weight applied to `mv_bit_cost` when reporting the rate of a new vector.
pub const MV_COST_WEIGHT: u32 = 108;

/// Bit cost of motion vector differences, for both precisions, plus the
/// SAD-domain approximation used by the full pel searches.
#[derive(Clone)]
pub struct MvCostTables {
  joint: [u32; MV_JOINTS],
  comps_hp: [ComponentCosts; 2],
  comps_lp: [ComponentCosts; 2],
  sad: SadCosts,
}

impl Default for MvCostTables {
  fn default() -> Self {
    Self::new(&default_nmv_context)
  }
}

impl MvCostTables {
  pub fn new(ctx: &NmvContext) -> Self {
    let mut joint = [0u32; MV_JOINTS];
    cost_tokens(&mut joint, &ctx.joints, &mv_joint_tree);
    MvCostTables {
      joint,
      comps_hp: [
        ComponentCosts::new(&ctx.comps[0], true),
        ComponentCosts::new(&ctx.comps[1], true),
      ],
      comps_lp: [
        ComponentCosts::new(&ctx.comps[0], false),
        ComponentCosts::new(&ctx.comps[1], false),
      ],
      sad: SadCosts::new(),
    }
  }

  #[inline]
  fn comps(&self, allow_hp: bool) -> &[ComponentCosts; 2] {
    if allow_hp {
      &self.comps_hp
    } else {
      &self.comps_lp
    }
  }

  /// Unweighted cost of coding `diff`, in 1/256 bit.
  #[inline]
  pub fn raw_cost(&self, diff: MotionVector, allow_hp: bool) -> u32 {
    let comps = self.comps(allow_hp);
    self.joint[diff.joint() as usize]
      + comps[0].get(diff.row as i32)
      + comps[1].get(diff.col as i32)
  }

  /// Rate of coding `mv` against `ref_mv`, scaled by `weight / 128`.
  #[inline]
  pub fn mv_bit_cost(
    &self, mv: MotionVector, ref_mv: MotionVector, allow_hp: bool,
    weight: u32,
  ) -> u32 {
    let c = self.raw_cost(mv - ref_mv, allow_hp) as u64 * weight as u64;
    ((c + 64) >> 7) as u32
  }

  /// Vector cost in the variance domain.
  #[inline]
  pub fn mv_err_cost(
    &self, mv: MotionVector, ref_mv: MotionVector, allow_hp: bool,
    error_per_bit: u32,
  ) -> u32 {
    let c = self.raw_cost(mv - ref_mv, allow_hp) as u64 * error_per_bit as u64;
    ((c + 4096) >> 13) as u32
  }

  /// Vector cost of a full pel vector in the SAD domain.
  #[inline]
  pub fn mvsad_err_cost(
    &self, mv: MotionVector, ref_mv: MotionVector, sad_per_bit: u32,
  ) -> u32 {
    let diff = mv - ref_mv;
    let c = NMV_JOINT_SAD_COST[diff.joint() as usize]
      + self.sad.get(diff.row as i32)
      + self.sad.get(diff.col as i32);
    ((c as u64 * sad_per_bit as u64 + 128) >> 8) as u32
  }
}
