//! Per-process address spaces.
//!
//! An address space owns a [`PageTable`] and an ordered list of [`Region`]s.
//! Regions are declared by the program loader; the page table fills in
//! lazily as the process faults pages in. Dropping the address space
//! returns every frame it acquired.

use alloc::vec::Vec;

use crate::MachineOps;
use crate::error::{KernelError, Result};
use crate::memory::address::{KSEG_BASE, USERSTACK, VA};
use crate::memory::page_table::PageTable;
use crate::memory::tlb;
use crate::memory::{PAGE_MASK, PAGE_SHIFT};
use super::region::{Region, RegionFlags};

/// Pages in the fixed-size user stack, 64 KiB. Generous for the programs
/// this kernel runs while keeping a runaway recursion's frame bill bounded.
pub const STACK_NPAGES: usize = 16;

pub struct AddressSpace<M: MachineOps> {
    pagetable: PageTable<M>,
    regions: Vec<Region>,
}

impl<M: MachineOps> AddressSpace<M> {
    /// Creates an empty address space: no regions, no mappings.
    pub fn new() -> Result<Self> {
        Ok(Self {
            pagetable: PageTable::new()?,
            regions: Vec::new(),
        })
    }

    /// Deep copy for fork: the region list in declaration order with its
    /// permissions, and a page table of the same shape over disjoint frames
    /// holding copies of the parent's pages.
    ///
    /// On allocation failure the partial copy is dropped, which returns
    /// every frame it had acquired.
    pub fn fork(&self) -> Result<Self> {
        Ok(Self {
            pagetable: self.pagetable.duplicate()?,
            regions: self.regions.clone(),
        })
    }

    /// Declares the range `[vaddr, vaddr + memsize)`, widened to page
    /// granularity, with permissions `flags`. Regions are kept in
    /// declaration order; overlap avoidance is the loader's contract.
    pub fn define_region(&mut self, vaddr: VA, memsize: usize, flags: RegionFlags) -> Result<()> {
        if flags.is_empty() {
            return Err(KernelError::InvalidValue);
        }

        // The base rounds down to its page; the size grows by the cut-off
        // offset and then rounds up.
        let memsize = memsize + vaddr.page_offset() as usize;
        let vbase = vaddr.page_align_down();
        let npages = (memsize + PAGE_MASK) >> PAGE_SHIFT;
        debug_assert!(npages > 0);
        debug_assert!(
            vbase.value() as u64 + ((npages as u64) << PAGE_SHIFT) <= KSEG_BASE as u64,
            "region reaches into the kernel segment"
        );

        self.regions.push(Region::new(vbase, npages, flags));
        Ok(())
    }

    /// Declares the stack region: [`STACK_NPAGES`] read/write pages ending
    /// at the kernel segment boundary. Returns the initial stack pointer.
    pub fn define_stack(&mut self) -> Result<VA> {
        let memsize = STACK_NPAGES << PAGE_SHIFT;
        let vbase = VA::from_value(USERSTACK - memsize as u32);
        self.define_region(vbase, memsize, RegionFlags::READ | RegionFlags::WRITE)?;
        Ok(VA::from_value(USERSTACK))
    }

    /// Makes every region writable while the loader streams program
    /// segments in. The declared permissions are parked inside the region
    /// and come back in [`Self::complete_load`].
    pub fn prepare_load(&mut self) -> Result<()> {
        for region in &mut self.regions {
            region.save_flags_for_load();
        }
        Ok(())
    }

    /// Restores the permissions declared before [`Self::prepare_load`],
    /// downgrades pages faulted in under regions that are no longer
    /// writable, and drops any stale writable translations from the TLB.
    pub fn complete_load(&mut self) -> Result<()> {
        for region in &mut self.regions {
            region.restore_flags_after_load();
            if !region.is_writable() {
                self.pagetable
                    .clear_dirty_range(region.vbase(), region.npages())?;
            }
        }
        tlb::flush_all::<M>();
        Ok(())
    }

    /// Called when the process gains the CPU. The TLB carries no
    /// address-space tags, so every slot is invalidated.
    pub fn activate(&self) {
        tlb::flush_all::<M>();
    }

    /// Called when the process loses the CPU; see [`Self::activate`].
    pub fn deactivate(&self) {
        tlb::flush_all::<M>();
    }

    /// The first declared region containing `vaddr`, if any.
    pub fn region_containing(&self, vaddr: VA) -> Option<&Region> {
        self.regions.iter().find(|region| region.contains(vaddr))
    }

    /// The declared regions, in declaration order.
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn pagetable(&self) -> &PageTable<M> {
        &self.pagetable
    }

    pub(crate) fn pagetable_mut(&mut self) -> &mut PageTable<M> {
        &mut self.pagetable
    }
}
