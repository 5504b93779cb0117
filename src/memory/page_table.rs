//! Two-level forward page table.
//!
//! Both levels are 1024-entry word tables, so one level occupies exactly one
//! physical frame and the table structure lives entirely in frames borrowed
//! from the platform allocator, reached through the kernel direct map. A
//! first-level slot holds the physical address of its second-level table
//! (`0` = absent); a second-level slot holds a [`Pte`].

use core::marker::PhantomData;

use crate::MachineOps;
use crate::error::{KernelError, Result};
use super::address::{KSEG_BASE, PA, VA};
use super::page::{FrameView, PageFrame};
use super::tlb::{TLBLO_DIRTY, TLBLO_PPAGE_MASK, TLBLO_VALID};
use super::{PAGE_SHIFT, PAGE_SIZE};

/// Entries per table level.
pub const TABLE_SIZE: usize = 1024;

const L1_SHIFT: usize = 22;
/// Virtual span covered by one second-level table (4 MiB).
const L2_SPAN: u64 = (TABLE_SIZE * PAGE_SIZE) as u64;

// One table level must fill one frame exactly.
const _: () = assert!(TABLE_SIZE * size_of::<u32>() == PAGE_SIZE);

/// A page-table entry: the TLB-entry-low word for the mapped page, stored
/// directly loadable. The zero word means "no mapping"; a present entry
/// always carries [`TLBLO_VALID`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Pte(u32);

impl Pte {
    pub const EMPTY: Pte = Pte(0);

    /// Builds the entry for a freshly mapped frame. `writable` sets the
    /// hardware dirty bit, which doubles as write permission.
    pub fn new(frame: PageFrame, writable: bool) -> Self {
        let mut lo = frame.pa().value() | TLBLO_VALID;
        if writable {
            lo |= TLBLO_DIRTY;
        }
        Pte(lo)
    }

    pub fn from_raw(raw: u32) -> Self {
        Pte(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn is_present(self) -> bool {
        self.0 != 0
    }

    pub fn is_valid(self) -> bool {
        self.0 & TLBLO_VALID != 0
    }

    pub fn is_writable(self) -> bool {
        self.0 & TLBLO_DIRTY != 0
    }

    /// The physical frame this entry maps.
    pub fn frame(self) -> PageFrame {
        PageFrame::from_pa(PA::from_value(self.0 & TLBLO_PPAGE_MASK))
    }
}

/// Sparse mapping from user virtual pages to [`Pte`]s. Second-level tables
/// are allocated lazily on first insert under their 4 MiB span.
pub struct PageTable<M: MachineOps> {
    root: PageFrame,
    _machine: PhantomData<M>,
}

impl<M: MachineOps> PageTable<M> {
    /// Creates an empty table: one zeroed first-level frame.
    pub fn new() -> Result<Self> {
        Ok(Self {
            root: alloc_table::<M>()?,
            _machine: PhantomData,
        })
    }

    /// Stores `entry` in the slot for `vaddr`, allocating the second-level
    /// table if this is the first mapping under its span.
    ///
    /// The slot must be empty: the fault path only inserts after a lookup
    /// miss, and overwriting would leak the previously mapped frame.
    pub fn insert(&mut self, vaddr: VA, entry: Pte) -> Result<()> {
        debug_assert!(vaddr.is_user());

        let l2_frame = match self.level2(vaddr) {
            Some(frame) => frame,
            None => {
                let frame = alloc_table::<M>()?;
                // SAFETY: we own the root frame and hold `&mut self`.
                let l1 = unsafe { table_mut::<M>(self.root) };
                l1[l1_index(vaddr)] = frame.pa().value();
                frame
            }
        };

        // SAFETY: the second-level frame is owned by this table.
        let l2 = unsafe { table_mut::<M>(l2_frame) };
        let slot = &mut l2[l2_index(vaddr)];
        debug_assert_eq!(*slot, 0, "mapping overwritten at {vaddr}");
        *slot = entry.raw();
        Ok(())
    }

    /// The entry for `vaddr`, or [`Pte::EMPTY`] if either level is absent.
    /// Never allocates.
    pub fn lookup(&self, vaddr: VA) -> Pte {
        match self.level2(vaddr) {
            // SAFETY: shared read of a frame owned by this table.
            Some(frame) => Pte::from_raw(unsafe { table::<M>(frame) }[l2_index(vaddr)]),
            None => Pte::EMPTY,
        }
    }

    /// Clears the writable bit on every present entry in
    /// `[vbase, vbase + npages * PAGE_SIZE)`, downgrading the pages to
    /// read-only. The clear is one-directional; re-enabling writes happens
    /// by natural refill against the owning region's permissions.
    pub fn clear_dirty_range(&mut self, vbase: VA, npages: usize) -> Result<()> {
        let start = vbase.value() as u64;
        let end = start + ((npages as u64) << PAGE_SHIFT);
        if end > KSEG_BASE as u64 {
            return Err(KernelError::InvalidValue);
        }

        let mut va = start;
        while va < end {
            let vaddr = VA::from_value(va as u32);
            let Some(l2_frame) = self.level2(vaddr) else {
                // Nothing mapped under this span; hop to the next table.
                va = (va & !(L2_SPAN - 1)) + L2_SPAN;
                continue;
            };
            // SAFETY: the second-level frame is owned by this table.
            let l2 = unsafe { table_mut::<M>(l2_frame) };
            let slot = &mut l2[l2_index(vaddr)];
            if *slot != 0 {
                *slot &= !TLBLO_DIRTY;
            }
            va += PAGE_SIZE as u64;
        }
        Ok(())
    }

    /// Deep copy for fork: the same table shape and VALID/DIRTY pattern over
    /// freshly allocated frames holding copies of the page contents.
    ///
    /// On allocation failure the partially built table is dropped, which
    /// returns everything it had acquired.
    pub fn duplicate(&self) -> Result<Self> {
        let new = Self::new()?;

        // SAFETY: shared read of the source table; the destination frames
        // are exclusively owned by `new`.
        let old_l1 = unsafe { table::<M>(self.root) };
        for (i1, &l2_pa) in old_l1.iter().enumerate() {
            if l2_pa == 0 {
                continue;
            }
            let new_l2_frame = alloc_table::<M>()?;
            (unsafe { table_mut::<M>(new.root) })[i1] = new_l2_frame.pa().value();

            let old_l2 = unsafe { table::<M>(PageFrame::from_pa(PA::from_value(l2_pa))) };
            for (i2, &raw) in old_l2.iter().enumerate() {
                let entry = Pte::from_raw(raw);
                if !entry.is_present() {
                    continue;
                }
                let frame = M::alloc_frame()?;
                // SAFETY: `frame` is freshly allocated and `entry.frame()`
                // belongs to the source table, which we only read.
                unsafe {
                    FrameView::<M>::new(frame).copy_from(&FrameView::new(entry.frame()));
                }
                let flags = entry.raw() & (TLBLO_VALID | TLBLO_DIRTY);
                (unsafe { table_mut::<M>(new_l2_frame) })[i2] = frame.pa().value() | flags;
            }
        }
        Ok(new)
    }

    /// The second-level table frame covering `vaddr`, if present.
    fn level2(&self, vaddr: VA) -> Option<PageFrame> {
        // SAFETY: shared read of the root frame owned by this table.
        let l1 = unsafe { table::<M>(self.root) };
        let pa = l1[l1_index(vaddr)];
        (pa != 0).then(|| PageFrame::from_pa(PA::from_value(pa)))
    }
}

impl<M: MachineOps> Drop for PageTable<M> {
    fn drop(&mut self) {
        // Release order: mapped frames, then each second-level table, then
        // the first level.
        // SAFETY: `&mut self` in drop gives exclusive access to all frames
        // owned by the table.
        let l1 = unsafe { table::<M>(self.root) };
        for &l2_pa in l1.iter() {
            if l2_pa == 0 {
                continue;
            }
            let l2_frame = PageFrame::from_pa(PA::from_value(l2_pa));
            let l2 = unsafe { table::<M>(l2_frame) };
            for &raw in l2.iter() {
                let entry = Pte::from_raw(raw);
                if entry.is_present() {
                    M::free_frame(entry.frame());
                }
            }
            M::free_frame(l2_frame);
        }
        M::free_frame(self.root);
    }
}

fn l1_index(vaddr: VA) -> usize {
    (vaddr.value() >> L1_SHIFT) as usize
}

fn l2_index(vaddr: VA) -> usize {
    (vaddr.value() as usize >> PAGE_SHIFT) & (TABLE_SIZE - 1)
}

/// Allocates one frame and zeroes it for use as a table level.
fn alloc_table<M: MachineOps>() -> Result<PageFrame> {
    let frame = M::alloc_frame()?;
    // SAFETY: freshly allocated, not yet linked anywhere.
    let mut view = unsafe { FrameView::<M>::new(frame) };
    view.zero();
    Ok(frame)
}

/// Shared view of the table level held in `frame`.
///
/// # Safety
///
/// `frame` must be a table frame owned by the calling [`PageTable`], with no
/// live mutable view of it.
unsafe fn table<'a, M: MachineOps>(frame: PageFrame) -> &'a [u32; TABLE_SIZE] {
    unsafe { &*M::frame_ptr(frame).cast().as_ptr() }
}

/// Exclusive view of the table level held in `frame`.
///
/// # Safety
///
/// As [`table`], and the caller must have exclusive access to the owning
/// [`PageTable`].
unsafe fn table_mut<'a, M: MachineOps>(frame: PageFrame) -> &'a mut [u32; TABLE_SIZE] {
    unsafe { &mut *M::frame_ptr(frame).cast().as_ptr() }
}
