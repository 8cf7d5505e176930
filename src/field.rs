//! Grid fields, their buffered sets and the host-side sampling view used by
//! the reference kernels.

use serde::{Deserialize, Serialize};

/// One grid cell: four float channels, unused channels stay zero.
pub type Vec4 = [f32; 4];

/// Opaque handle to a field allocated on a compute device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub(crate) u32);

impl FieldId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// How a field is sampled at fractional positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    Linear,
    Nearest,
}

impl Filter {
    pub(crate) fn code(self) -> u32 {
        match self {
            Filter::Linear => 0,
            Filter::Nearest => 1,
        }
    }

    pub(crate) fn from_code(code: u32) -> Self {
        if code == 1 { Filter::Nearest } else { Filter::Linear }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldDesc {
    pub width: u32,
    pub height: u32,
    pub filter: Filter,
}

impl FieldDesc {
    pub fn new(width: u32, height: u32, filter: Filter) -> Self {
        Self { width, height, filter }
    }

    pub fn cells(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn size(&self) -> [u32; 2] {
        [self.width, self.height]
    }
}

/// The physical buffers backing one logical quantity plus its read index.
///
/// Slot 0 is the current value. Slot 1 is the next buffer of a double-buffered
/// field; a quad-buffered field uses slots 1..=3 as MacCormack scratch. Writes
/// never target slot 0 of a multi-buffer set, and `advance(k)` makes slot `k`
/// the new current buffer.
#[derive(Clone, Debug)]
pub struct FieldSet {
    buffers: Vec<FieldId>,
    read: usize,
    desc: FieldDesc,
}

impl FieldSet {
    pub fn new(buffers: Vec<FieldId>, desc: FieldDesc) -> Self {
        assert!(!buffers.is_empty(), "a field set needs at least one buffer");
        Self { buffers, read: 0, desc }
    }

    pub fn desc(&self) -> FieldDesc {
        self.desc
    }

    /// Physical buffers behind this field.
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn current(&self) -> FieldId {
        self.slot(0)
    }

    pub fn next(&self) -> FieldId {
        self.slot(1)
    }

    /// Buffer `k` positions after the current one.
    pub fn slot(&self, k: usize) -> FieldId {
        self.buffers[(self.read + k) % self.buffers.len()]
    }

    pub fn swap(&mut self) {
        self.advance(1);
    }

    pub fn advance(&mut self, k: usize) {
        self.read = (self.read + k) % self.buffers.len();
    }
}

/// Read-only view of a field's host data with clamp-to-edge addressing.
#[derive(Clone, Copy)]
pub struct Grid<'a> {
    pub data: &'a [Vec4],
    pub width: u32,
    pub height: u32,
}

impl<'a> Grid<'a> {
    pub fn new(data: &'a [Vec4], width: u32, height: u32) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize);
        Self { data, width, height }
    }

    pub fn at(&self, x: i32, y: i32) -> Vec4 {
        let cx = x.clamp(0, self.width as i32 - 1) as usize;
        let cy = y.clamp(0, self.height as i32 - 1) as usize;
        self.data[cy * self.width as usize + cx]
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && x < self.width as i32 && y < self.height as i32
    }

    /// Samples at a cell-space position (cell centres sit on integers).
    pub fn sample(&self, pos: [f32; 2], filter: Filter) -> Vec4 {
        let x = pos[0].clamp(0.0, (self.width - 1) as f32);
        let y = pos[1].clamp(0.0, (self.height - 1) as f32);
        match filter {
            Filter::Nearest => self.at(x.round() as i32, y.round() as i32),
            Filter::Linear => {
                let x0 = x.floor();
                let y0 = y.floor();
                let fx = x - x0;
                let fy = y - y0;
                let (x0, y0) = (x0 as i32, y0 as i32);
                let a = self.at(x0, y0);
                let b = self.at(x0 + 1, y0);
                let c = self.at(x0, y0 + 1);
                let d = self.at(x0 + 1, y0 + 1);
                mix4(mix4(a, b, fx), mix4(c, d, fx), fy)
            }
        }
    }

    /// The four cells bilinear sampling at `pos` would blend.
    pub fn footprint(&self, pos: [f32; 2]) -> [Vec4; 4] {
        let x = pos[0].clamp(0.0, (self.width - 1) as f32).floor() as i32;
        let y = pos[1].clamp(0.0, (self.height - 1) as f32).floor() as i32;
        [self.at(x, y), self.at(x + 1, y), self.at(x, y + 1), self.at(x + 1, y + 1)]
    }
}

pub fn mix4(a: Vec4, b: Vec4, t: f32) -> Vec4 {
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
        a[3] + (b[3] - a[3]) * t,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: u32) -> Vec<FieldId> {
        (0..n).map(FieldId).collect()
    }

    #[test]
    fn double_buffer_swaps_between_two_buffers() {
        let mut set = FieldSet::new(ids(2), FieldDesc::new(16, 16, Filter::Linear));
        assert_eq!(set.current(), FieldId(0));
        assert_eq!(set.next(), FieldId(1));
        set.swap();
        assert_eq!(set.current(), FieldId(1));
        assert_eq!(set.next(), FieldId(0));
    }

    #[test]
    fn quad_buffer_promotes_the_corrected_slot() {
        let mut set = FieldSet::new(ids(4), FieldDesc::new(16, 16, Filter::Linear));
        set.advance(3);
        assert_eq!(set.current(), FieldId(3));
        assert_eq!(set.slot(1), FieldId(0));
        assert_eq!(set.slot(3), FieldId(2));
    }

    #[test]
    fn linear_sample_interpolates_and_clamps() {
        let data = vec![[0.0; 4], [1.0; 4], [2.0; 4], [3.0; 4]];
        let grid = Grid::new(&data, 2, 2);
        let mid = grid.sample([0.5, 0.5], Filter::Linear);
        assert!((mid[0] - 1.5).abs() < 1e-6);
        let outside = grid.sample([-3.0, 9.0], Filter::Linear);
        assert_eq!(outside[0], 2.0);
        assert_eq!(grid.sample([0.6, 0.4], Filter::Nearest)[0], 1.0);
    }
}
