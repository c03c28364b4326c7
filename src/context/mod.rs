// Copyright (c) 2017-2023, The rav1e contributors. All rights reserved
//
// This source code is subject to the terms of the BSD 2 Clause License and
// the Alliance for Open Media Patent License 1.0. If the BSD 2 Clause License
// was not distributed with this source code in the LICENSE file, you can
// obtain it at www.aomedia.org/license/software. If the Alliance for Open
// Media Patent License 1.0 was not distributed with this source code in the
// PATENTS file, you can obtain it at www.aomedia.org/license/patent.

#![allow(non_upper_case_globals)]

use crate::color::ChromaSampling;
use crate::mc::{InterpFilter, MotionVector};
use crate::partition::RefType::*;
use crate::partition::*;

mod block_unit;
pub use block_unit::*;

mod partition_unit;
pub use partition_unit::*;

/// Skip context of the block at `(mi_row, mi_col)`: the number of coded
/// neighbours above and to the left that skipped their residual.
pub fn skip_context(
  mi: &TileModeInfo<'_>, mi_row: usize, mi_col: usize,
) -> usize {
  let above =
    mi.neighbour(mi_row, mi_col, -1, 0).map_or(0, |m| m.skip as usize);
  let left =
    mi.neighbour(mi_row, mi_col, 0, -1).map_or(0, |m| m.skip as usize);
  above + left
}
