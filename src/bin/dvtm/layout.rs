//! Tiling algorithms: given the client sequence and the workspace, each
//! layout computes one rectangle per client.

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Rect {
    pub x: u16,
    pub y: u16,
    pub w: u16,
    pub h: u16,
}

impl Rect {
    pub fn contains(&self, x: u16, y: u16) -> bool {
        x >= self.x && x < self.x + self.w && y >= self.y && y < self.y + self.h
    }
}

/// Per-client input to an arrange function, in list order.
#[derive(Clone, Copy, Debug)]
pub struct LayoutSlot {
    pub minimized: bool,
}

/// `None` keeps the client's previous rectangle (fullscreen leaves
/// minimized windows where they were).
pub type ArrangeFn = fn(&[LayoutSlot], Rect, f32) -> Vec<Option<Rect>>;

pub struct Layout {
    pub symbol: &'static str,
    pub arrange: ArrangeFn,
}

/// Minimized clients always occupy one row each at the bottom of the
/// workspace, in list order, compressing the tiled region upward.
fn place_minimized(slots: &[LayoutSlot], ws: Rect, out: &mut [Option<Rect>]) -> Rect {
    let m = slots.iter().filter(|s| s.minimized).count() as u16;
    let tiled_h = ws.h.saturating_sub(m).max(1);
    let mut row = 0;
    for (i, slot) in slots.iter().enumerate() {
        if slot.minimized {
            let y = ws
                .y
                .saturating_add(ws.h.saturating_sub(m).saturating_add(row))
                .min(ws.y + ws.h.saturating_sub(1));
            out[i] = Some(Rect {
                x: ws.x,
                y,
                w: ws.w.max(1),
                h: 1,
            });
            row += 1;
        }
    }
    Rect {
        x: ws.x,
        y: ws.y,
        w: ws.w.max(1),
        h: tiled_h,
    }
}

fn visible_indices(slots: &[LayoutSlot]) -> Vec<usize> {
    slots
        .iter()
        .enumerate()
        .filter(|(_, s)| !s.minimized)
        .map(|(i, _)| i)
        .collect()
}

/// Master column on the left, remaining clients stacked vertically on
/// the right; stack height remainder goes to the bottom tile.
pub fn tile(slots: &[LayoutSlot], ws: Rect, mfact: f32) -> Vec<Option<Rect>> {
    let mut out = vec![None; slots.len()];
    let tiled = place_minimized(slots, ws, &mut out);
    let vis = visible_indices(slots);
    let n = vis.len();
    if n == 0 {
        return out;
    }
    if n == 1 {
        out[vis[0]] = Some(tiled);
        return out;
    }
    let mw = ((f32::from(ws.w) * mfact) as u16).max(1).min(tiled.w);
    let sw = tiled.w.saturating_sub(mw).max(1);
    out[vis[0]] = Some(Rect {
        x: tiled.x,
        y: tiled.y,
        w: mw,
        h: tiled.h,
    });
    let stack = (n - 1) as u16;
    let base = tiled.h / stack;
    let rem = tiled.h % stack;
    let mut y = tiled.y;
    for (pos, &idx) in vis[1..].iter().enumerate() {
        let mut h = base;
        if pos as u16 == stack - 1 {
            h += rem;
        }
        out[idx] = Some(Rect {
            x: tiled.x + mw,
            y,
            w: sw,
            h: h.max(1),
        });
        y = y.saturating_add(h.max(1));
    }
    out
}

/// Master row on top spanning the full width, remaining clients split
/// horizontally below; width remainder goes to the rightmost tile.
pub fn bstack(slots: &[LayoutSlot], ws: Rect, mfact: f32) -> Vec<Option<Rect>> {
    let mut out = vec![None; slots.len()];
    let tiled = place_minimized(slots, ws, &mut out);
    let vis = visible_indices(slots);
    let n = vis.len();
    if n == 0 {
        return out;
    }
    if n == 1 {
        out[vis[0]] = Some(tiled);
        return out;
    }
    let mh = ((f32::from(tiled.h) * mfact) as u16).max(1).min(tiled.h);
    let sh = tiled.h.saturating_sub(mh).max(1);
    out[vis[0]] = Some(Rect {
        x: tiled.x,
        y: tiled.y,
        w: tiled.w,
        h: mh,
    });
    let stack = (n - 1) as u16;
    let base = tiled.w / stack;
    let rem = tiled.w % stack;
    let mut x = tiled.x;
    for (pos, &idx) in vis[1..].iter().enumerate() {
        let mut w = base;
        if pos as u16 == stack - 1 {
            w += rem;
        }
        out[idx] = Some(Rect {
            x,
            y: tiled.y + mh,
            w: w.max(1),
            h: sh,
        });
        x = x.saturating_add(w.max(1));
    }
    out
}

/// Most-square row-major grid; the last row's clients widen to fill the
/// workspace, leftmost cells absorbing any extra columns.
pub fn grid(slots: &[LayoutSlot], ws: Rect, _mfact: f32) -> Vec<Option<Rect>> {
    let mut out = vec![None; slots.len()];
    let tiled = place_minimized(slots, ws, &mut out);
    let vis = visible_indices(slots);
    let n = vis.len();
    if n == 0 {
        return out;
    }
    let mut cols = 1u16;
    while usize::from(cols) * usize::from(cols) < n {
        cols += 1;
    }
    let rows = (n as u16).div_ceil(cols);
    let base_h = tiled.h / rows;
    let rem_h = tiled.h % rows;
    let mut y = tiled.y;
    let mut placed = 0usize;
    for row in 0..rows {
        let in_row = (n - placed).min(usize::from(cols)) as u16;
        let mut h = base_h;
        if row == rows - 1 {
            h += rem_h;
        }
        let base_w = tiled.w / in_row;
        let rem_w = tiled.w % in_row;
        let mut x = tiled.x;
        for col in 0..in_row {
            let mut w = base_w;
            if col < rem_w {
                w += 1;
            }
            out[vis[placed]] = Some(Rect {
                x,
                y,
                w: w.max(1),
                h: h.max(1),
            });
            x = x.saturating_add(w.max(1));
            placed += 1;
        }
        y = y.saturating_add(h.max(1));
    }
    out
}

/// Every visible client covers the whole workspace; minimized clients
/// keep their previous rectangles.
pub fn fullscreen(slots: &[LayoutSlot], ws: Rect, _mfact: f32) -> Vec<Option<Rect>> {
    slots
        .iter()
        .map(|slot| {
            if slot.minimized {
                None
            } else {
                Some(Rect {
                    x: ws.x,
                    y: ws.y,
                    w: ws.w.max(1),
                    h: ws.h.max(1),
                })
            }
        })
        .collect()
}
