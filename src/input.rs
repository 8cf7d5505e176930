//! Pointer drag tracking. Positions arrive already mapped to grid cells.

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Pointer {
    down: bool,
    pos: [f32; 2],
    last: Option<[f32; 2]>,
}

/// Movement since the last splat was taken.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Drag {
    pub pos: [f32; 2],
    pub delta: [f32; 2],
}

impl Pointer {
    pub fn press(&mut self, pos: [f32; 2]) {
        self.down = true;
        self.pos = pos;
        self.last = Some(pos);
    }

    pub fn moved(&mut self, pos: [f32; 2]) {
        self.pos = pos;
    }

    pub fn release(&mut self) {
        self.down = false;
        self.last = None;
    }

    /// The drag accumulated since the previous call, if the pointer is down
    /// and has moved.
    pub fn take_drag(&mut self) -> Option<Drag> {
        if !self.down {
            return None;
        }
        let last = self.last.replace(self.pos)?;
        let delta = [self.pos[0] - last[0], self.pos[1] - last[1]];
        if delta == [0.0, 0.0] {
            return None;
        }
        Some(Drag { pos: self.pos, delta })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drag_reports_motion_once() {
        let mut p = Pointer::default();
        assert_eq!(p.take_drag(), None);
        p.press([4.0, 4.0]);
        assert_eq!(p.take_drag(), None);
        p.moved([6.0, 3.0]);
        assert_eq!(p.take_drag(), Some(Drag { pos: [6.0, 3.0], delta: [2.0, -1.0] }));
        assert_eq!(p.take_drag(), None);
        p.release();
        p.moved([9.0, 9.0]);
        assert_eq!(p.take_drag(), None);
    }
}
