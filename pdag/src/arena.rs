// arena.rs — Pooled storage for per-node bound tuples
//
// Each node owns a `Layout` describing one fixed-shape tuple of `Span`s:
// region required, region computed, then the loop bounds of every stage,
// stored contiguously. Storage comes in blocks: one slab holding the spans of
// every tuple in the block, plus one handle count per slot. Tuples are
// checked out with `Layout::make` and their slots go back on the free list
// when their last `Bound` handle drops; blocks are never returned to the
// global allocator while the layout lives.
//
// Preconditions: a layout is used from one thread at a time (it is `!Sync`).
//   A block's slab is borrowed as a whole, so a mutable view of one tuple
//   must not overlap a view of another tuple from the same block.
// Postconditions: `num_live` equals the number of tuples held by handles.
// Failure modes: releasing a tuple to a foreign layout, or dropping a layout
//   with live tuples, panics.
// Side effects: none beyond the pool itself.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt::Write as _;
use std::ops::Range;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::span::Span;

static NEXT_LAYOUT_ID: AtomicUsize = AtomicUsize::new(0);

/// Refill granularity in bytes.
const PAGE_BYTES: usize = 4096;
const MIN_TUPLES_PER_BLOCK: usize = 8;

/// One bulk allocation: `tuples * total_size` spans and a handle count per
/// tuple.
#[derive(Debug)]
struct Block {
    layout_id: usize,
    spans: RefCell<Box<[Span]>>,
    handles: Box<[Cell<usize>]>,
}

/// A slot in one of a layout's blocks. Only ever created by, and returned
/// to, its `Layout`.
#[derive(Debug)]
pub struct BoundContents {
    block: Rc<Block>,
    slot: usize,
    range: Range<usize>,
}

impl BoundContents {
    fn handles(&self) -> &Cell<usize> {
        &self.block.handles[self.slot]
    }
}

// ── Layout ───────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Layout {
    /// Number of `Span`s per tuple.
    pub total_size: usize,
    /// Index of the first region-computed span.
    pub computed_offset: usize,
    /// Index of the first loop span of each stage.
    pub loop_offset: Vec<usize>,
    id: usize,
    blocks: RefCell<Vec<Rc<Block>>>,
    pool: RefCell<Vec<BoundContents>>,
    num_live: Cell<usize>,
}

impl Layout {
    /// Layout for a node of `dims` dimensions whose stages have the given
    /// loop counts.
    pub fn new(dims: usize, stage_loops: &[usize]) -> Self {
        let computed_offset = dims;
        let mut total_size = computed_offset + dims;
        let mut loop_offset = Vec::with_capacity(stage_loops.len());
        for &n in stage_loops {
            loop_offset.push(total_size);
            total_size += n;
        }
        Layout {
            total_size,
            computed_offset,
            loop_offset,
            id: NEXT_LAYOUT_ID.fetch_add(1, Ordering::Relaxed),
            blocks: RefCell::new(Vec::new()),
            pool: RefCell::new(Vec::new()),
            num_live: Cell::new(0),
        }
    }

    fn tuples_per_block(&self) -> usize {
        let tuple_bytes = (self.total_size * std::mem::size_of::<Span>()).max(1);
        (PAGE_BYTES / tuple_bytes).max(MIN_TUPLES_PER_BLOCK)
    }

    fn allocate_block(&self) {
        let n = self.tuples_per_block();
        let block = Rc::new(Block {
            layout_id: self.id,
            spans: RefCell::new(vec![Span::default(); n * self.total_size].into_boxed_slice()),
            handles: (0..n).map(|_| Cell::new(0)).collect(),
        });
        let mut pool = self.pool.borrow_mut();
        pool.reserve(n);
        // reversed so tuples are handed out in slab order
        for slot in (0..n).rev() {
            let start = slot * self.total_size;
            pool.push(BoundContents {
                block: Rc::clone(&block),
                slot,
                range: start..start + self.total_size,
            });
        }
        self.blocks.borrow_mut().push(block);
        log::trace!(
            "layout {}: new block of {} tuples ({} spans each)",
            self.id,
            n,
            self.total_size
        );
    }

    /// Check out a tuple. Its contents are unspecified until written.
    pub fn make(&self) -> Bound<'_> {
        if self.pool.borrow().is_empty() {
            self.allocate_block();
        }
        let contents = self.pool.borrow_mut().pop();
        if let Some(c) = &contents {
            c.handles().set(1);
        }
        self.num_live.set(self.num_live.get() + 1);
        Bound {
            layout: self,
            contents,
        }
    }

    /// Return a tuple to the free list.
    pub fn release(&self, b: BoundContents) {
        assert_eq!(
            b.block.layout_id, self.id,
            "bound tuple released to the wrong layout"
        );
        assert_eq!(b.handles().get(), 0, "bound tuple released while still shared");
        self.pool.borrow_mut().push(b);
        self.num_live.set(self.num_live.get() - 1);
    }

    pub fn num_live(&self) -> usize {
        self.num_live.get()
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.borrow().len()
    }

    /// Tuples currently on the free list.
    pub fn num_pooled(&self) -> usize {
        self.pool.borrow().len()
    }

    fn region_computed_len(&self) -> usize {
        self.loop_offset
            .first()
            .copied()
            .unwrap_or(self.total_size)
            - self.computed_offset
    }

    fn loop_range(&self, stage: usize) -> Range<usize> {
        let start = self.loop_offset[stage];
        let end = self
            .loop_offset
            .get(stage + 1)
            .copied()
            .unwrap_or(self.total_size);
        start..end
    }
}

impl Drop for Layout {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        assert_eq!(
            self.num_live.get(),
            0,
            "layout dropped with {} live bound tuple(s)",
            self.num_live.get()
        );
    }
}

// ── Bound handle ─────────────────────────────────────────────────────────

/// Shared handle to a pooled tuple. Cloning shares the tuple; mutating a
/// shared tuple first copies it into a fresh one from the same pool.
#[derive(Debug)]
pub struct Bound<'a> {
    layout: &'a Layout,
    contents: Option<BoundContents>,
}

impl<'a> Bound<'a> {
    pub fn layout(&self) -> &'a Layout {
        self.layout
    }

    fn contents(&self) -> &BoundContents {
        match &self.contents {
            Some(c) => c,
            None => unreachable!("bound handle used after release"),
        }
    }

    fn is_shared(&self) -> bool {
        self.contents().handles().get() > 1
    }

    pub fn data(&self) -> Ref<'_, [Span]> {
        let c = self.contents();
        Ref::map(c.block.spans.borrow(), |s| &s[c.range.clone()])
    }

    /// Mutable view of the whole tuple, copying it first if shared.
    pub fn data_mut(&mut self) -> RefMut<'_, [Span]> {
        if self.is_shared() {
            let copy = self.make_copy();
            *self = copy;
        }
        let c = self.contents();
        RefMut::map(c.block.spans.borrow_mut(), |s| &mut s[c.range.clone()])
    }

    /// A new, unshared tuple with the same contents.
    pub fn make_copy(&self) -> Bound<'a> {
        let b = self.layout.make();
        let (src, dst) = (self.contents(), b.contents());
        if Rc::ptr_eq(&src.block, &dst.block) {
            src.block
                .spans
                .borrow_mut()
                .copy_within(src.range.clone(), dst.range.start);
        } else {
            let from = src.block.spans.borrow();
            dst.block.spans.borrow_mut()[dst.range.clone()].copy_from_slice(&from[src.range.clone()]);
        }
        b
    }

    /// Detach the tuple from this handle, which must be its only one. The
    /// caller must hand it back with `Layout::release`.
    pub fn into_raw(mut self) -> BoundContents {
        match self.contents.take() {
            Some(c) => {
                c.handles().set(c.handles().get() - 1);
                c
            }
            None => unreachable!("bound handle used after release"),
        }
    }

    pub fn region_required(&self, i: usize) -> Ref<'_, Span> {
        Ref::map(self.data(), |d| &d[i])
    }

    pub fn region_computed(&self, i: usize) -> Ref<'_, Span> {
        let off = self.layout.computed_offset;
        Ref::map(self.data(), |d| &d[off + i])
    }

    pub fn loops(&self, stage: usize, i: usize) -> Ref<'_, Span> {
        let off = self.layout.loop_offset[stage];
        Ref::map(self.data(), |d| &d[off + i])
    }

    /// Loop spans of `stage`.
    pub fn stage_loops(&self, stage: usize) -> Ref<'_, [Span]> {
        let range = self.layout.loop_range(stage);
        Ref::map(self.data(), |d| &d[range])
    }

    pub fn region_required_mut(&mut self, i: usize) -> RefMut<'_, Span> {
        RefMut::map(self.data_mut(), |d| &mut d[i])
    }

    /// All region-required spans, mutably.
    pub fn required_spans_mut(&mut self) -> RefMut<'_, [Span]> {
        let n = self.layout.computed_offset;
        RefMut::map(self.data_mut(), |d| &mut d[..n])
    }

    pub fn region_computed_mut(&mut self, i: usize) -> RefMut<'_, Span> {
        let off = self.layout.computed_offset;
        RefMut::map(self.data_mut(), |d| &mut d[off + i])
    }

    pub fn loops_mut(&mut self, stage: usize, i: usize) -> RefMut<'_, Span> {
        let off = self.layout.loop_offset[stage];
        RefMut::map(self.data_mut(), |d| &mut d[off + i])
    }

    /// All region-required spans, and all region-computed spans, both
    /// mutably.
    pub fn required_and_computed_mut(&mut self) -> (RefMut<'_, [Span]>, RefMut<'_, [Span]>) {
        let layout = self.layout;
        RefMut::map_split(self.data_mut(), |d| {
            let (required, rest) = d.split_at_mut(layout.computed_offset);
            (required, &mut rest[..layout.region_computed_len()])
        })
    }

    /// All region-computed spans, and the loop spans of `stage`, both
    /// mutably.
    pub fn computed_and_loops_mut(&mut self, stage: usize) -> (RefMut<'_, [Span]>, RefMut<'_, [Span]>) {
        let layout = self.layout;
        let loops = layout.loop_range(stage);
        RefMut::map_split(self.data_mut(), |d| {
            let (head, tail) = d.split_at_mut(loops.start);
            let computed = &mut head[layout.computed_offset..][..layout.region_computed_len()];
            (computed, &mut tail[..loops.len()])
        })
    }

    /// Panics with a dump of the tuple if any span has `min > max`.
    pub fn validate(&self) {
        let data = self.data();
        let Some(bad) = data.iter().position(|p| p.max() < p.min()) else {
            return;
        };
        let first_loop = self
            .layout
            .loop_offset
            .first()
            .copied()
            .unwrap_or(self.layout.total_size);
        let mut err = String::from("Bad bounds object:\n");
        for (j, p) in data.iter().enumerate() {
            err.push_str(if j == bad { "=> " } else { "   " });
            let _ = if j < self.layout.computed_offset {
                write!(err, "required {j}: ")
            } else if j < first_loop {
                write!(err, "computed {}: ", j - self.layout.computed_offset)
            } else {
                write!(err, "loop {}: ", j - first_loop)
            };
            let _ = writeln!(err, "{}, {}", p.min(), p.max());
        }
        err.push_str("Corrupted bounds object. Min > max?");
        drop(data);
        panic!("{err}");
    }
}

impl Clone for Bound<'_> {
    fn clone(&self) -> Self {
        let contents = self.contents.as_ref().map(|c| {
            c.handles().set(c.handles().get() + 1);
            BoundContents {
                block: Rc::clone(&c.block),
                slot: c.slot,
                range: c.range.clone(),
            }
        });
        Bound {
            layout: self.layout,
            contents,
        }
    }
}

impl Drop for Bound<'_> {
    fn drop(&mut self) {
        if let Some(c) = self.contents.take() {
            let n = c.handles().get() - 1;
            c.handles().set(n);
            if n == 0 {
                self.layout.release(c);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets() {
        let l = Layout::new(2, &[3, 1]);
        assert_eq!(l.computed_offset, 2);
        assert_eq!(l.loop_offset, vec![4, 7]);
        assert_eq!(l.total_size, 8);
    }

    #[test]
    fn make_release_round_trip() {
        let l = Layout::new(2, &[2]);
        assert_eq!(l.num_live(), 0);
        {
            let _b = l.make();
            assert_eq!(l.num_live(), 1);
            assert_eq!(l.num_blocks(), 1);
        }
        assert_eq!(l.num_live(), 0);
        let pooled = l.num_pooled();
        drop(l.make());
        assert_eq!(l.num_pooled(), pooled);
        assert_eq!(l.num_blocks(), 1);
    }

    #[test]
    fn block_size_is_page_or_eight() {
        let small = Layout::new(1, &[1]);
        drop(small.make());
        // 3 spans of 24 bytes: 4096 / 72 = 56 tuples per block
        assert_eq!(small.num_pooled(), 4096 / (3 * std::mem::size_of::<Span>()));

        let big = Layout::new(64, &[64]);
        drop(big.make());
        assert_eq!(big.num_pooled(), 8);
    }

    #[test]
    fn one_block_backs_many_tuples() {
        let l = Layout::new(1, &[1]);
        let per_block = 4096 / (3 * std::mem::size_of::<Span>());
        let mut held = Vec::new();
        for i in 0..per_block {
            let mut b = l.make();
            b.data_mut().fill(Span::new(i as i64, i as i64, true));
            held.push(b);
        }
        assert_eq!(l.num_blocks(), 1);
        assert_eq!(l.num_pooled(), 0);
        for (i, b) in held.iter().enumerate() {
            assert_eq!(*b.region_required(0), Span::new(i as i64, i as i64, true));
        }
        held.push(l.make());
        assert_eq!(l.num_blocks(), 2);
        drop(held);
        assert_eq!(l.num_live(), 0);
        assert_eq!(l.num_pooled(), 2 * per_block);
    }

    #[test]
    fn clone_shares_until_written() {
        let l = Layout::new(1, &[1]);
        let mut a = l.make();
        *a.region_required_mut(0) = Span::new(0, 9, true);
        let mut b = a.clone();
        assert_eq!(l.num_live(), 1);
        *b.region_required_mut(0) = Span::new(5, 6, false);
        assert_eq!(l.num_live(), 2);
        assert_eq!(*a.region_required(0), Span::new(0, 9, true));
        assert_eq!(*b.region_required(0), Span::new(5, 6, false));
        drop(a);
        drop(b);
        assert_eq!(l.num_live(), 0);
    }

    #[test]
    fn split_borrows() {
        let l = Layout::new(2, &[2, 1]);
        let mut b = l.make();
        for (i, s) in b.data_mut().iter_mut().enumerate() {
            *s = Span::new(i as i64, i as i64 + 10, true);
        }
        {
            let (req, mut comp) = b.required_and_computed_mut();
            assert_eq!(req.len(), 2);
            assert_eq!(comp.len(), 2);
            comp[0] = req[1];
        }
        assert_eq!(*b.region_computed(0), Span::new(1, 11, true));

        {
            let (comp, mut loops) = b.computed_and_loops_mut(1);
            assert_eq!(loops.len(), 1);
            loops[0] = comp[1];
        }
        assert_eq!(*b.loops(1, 0), Span::new(3, 13, true));
    }

    #[test]
    fn validate_accepts_good_bounds() {
        let l = Layout::new(1, &[]);
        let mut b = l.make();
        b.data_mut().fill(Span::new(0, 0, true));
        b.validate();
    }

    #[test]
    #[should_panic(expected = "Bad bounds object")]
    fn validate_rejects_inverted_span() {
        let l = Layout::new(1, &[1]);
        let mut b = l.make();
        b.data_mut().fill(Span::new(0, 4, true));
        *b.loops_mut(0, 0) = Span::new(5, 4, true);
        b.validate();
    }

    #[test]
    #[should_panic(expected = "wrong layout")]
    fn release_to_foreign_layout_panics() {
        let a = Layout::new(1, &[]);
        let b = Layout::new(1, &[]);
        let raw = a.make().into_raw();
        b.release(raw);
    }

    #[test]
    #[should_panic(expected = "live bound tuple")]
    fn leaked_tuple_is_caught_on_drop() {
        let l = Layout::new(1, &[]);
        std::mem::forget(l.make());
        drop(l);
    }
}
