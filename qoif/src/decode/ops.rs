use crate::{opcode::Opcode, utils::apply_diff, Pixel, QoifContext};

/// Computes the pixel described by `op`.
///
/// Only touches the pending run; color array and previous pixel are updated by the caller.
#[inline(always)]
pub(crate) fn apply(ctx: &mut QoifContext, op: Opcode) -> Pixel {
    match op {
        Opcode::Index(index) => ctx.arr[usize::from(index)],
        Opcode::Diff { dr, dg, db } => apply_diff(ctx.prev, dr, dg, db),
        Opcode::Luma { dg, dr_dg, db_dg } => luma(ctx.prev, dg, dr_dg, db_dg),
        Opcode::Rgb([r, g, b]) => Pixel::new(r, g, b, ctx.prev.a),
        Opcode::Rgba(pixel) => pixel,
        Opcode::Run(run) => {
            // this call yields the first repeat
            ctx.run = run - 1;
            ctx.prev
        }
    }
}

// OP: 0b10
#[inline(always)]
const fn luma(prev: Pixel, g_diff: i8, rg_diff: i8, bg_diff: i8) -> Pixel {
    let (r_diff, b_diff) = (rg_diff.wrapping_add(g_diff), bg_diff.wrapping_add(g_diff));

    apply_diff(prev, r_diff, g_diff, b_diff)
}
