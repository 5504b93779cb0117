//! The fault path: TLB-miss handling and the subsystem's kernel-facing
//! entry points.
//!
//! A user access that misses the TLB traps to the kernel; the exception
//! dispatcher decodes the cause into a [`FaultType`] and calls [`vm_fault`]
//! with the current process's address space. The handler refills the TLB
//! from the page table, allocating and zero-filling a frame on first touch
//! of a page inside a declared region.

pub mod addrspace;
pub mod region;


use log::{info, warn};

use crate::MachineOps;
use crate::error::{KernelError, Result};
use crate::memory::address::VA;
use crate::memory::page::FrameView;
use crate::memory::page_table::Pte;
use crate::memory::tlb::{self, TlbShootdown};
use self::addrspace::AddressSpace;

/// The kind of access that trapped, as decoded from the exception cause.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FaultType {
    /// Load from a page with no TLB entry.
    Read,
    /// Store to a page with no TLB entry.
    Write,
    /// Store through a TLB entry whose writable bit is clear.
    ReadOnly,
}

impl FaultType {
    /// Decodes the dispatcher's raw fault code. Unknown codes are rejected
    /// here so the handler proper only ever sees real fault kinds.
    pub fn from_code(code: u32) -> Result<Self> {
        match code {
            0 => Ok(FaultType::Read),
            1 => Ok(FaultType::Write),
            2 => Ok(FaultType::ReadOnly),
            _ => Err(KernelError::InvalidValue),
        }
    }
}

/// One-time subsystem initialisation, called from boot before the first
/// user process exists. Frame bookkeeping belongs to the platform
/// allocator, so there is nothing to set up; the hook stays for boot
/// ordering symmetry with the other subsystems.
pub fn vm_bootstrap() {
    info!("vm: two-level page tables, lazy frame allocation");
}

/// Handles a TLB miss or permission fault at `fault_vaddr`.
///
/// `space` is the current process's address space, or `None` when the trap
/// arrived with no process bound (early boot, or a kernel bug); that case
/// reports [`KernelError::BadAddress`] rather than looping on the retried
/// access.
///
/// On success the translation for `fault_vaddr` is resident in the TLB and
/// the trapping instruction can be retried.
pub fn vm_fault<M: MachineOps>(
    space: Option<&mut AddressSpace<M>>,
    kind: FaultType,
    fault_vaddr: VA,
) -> Result<()> {
    match kind {
        // A store through a read-only entry is a permission violation, not
        // a refill opportunity: writable regions never produce these.
        FaultType::ReadOnly => return Err(KernelError::BadAddress),
        FaultType::Read | FaultType::Write => {}
    }

    let Some(space) = space else {
        warn!("vm: fault at {fault_vaddr} with no active address space");
        return Err(KernelError::BadAddress);
    };

    // Fast path: the page is already materialised, the TLB just lost it.
    let entry = space.pagetable().lookup(fault_vaddr);
    if entry.is_present() {
        tlb::load_random::<M>(tlb::entry_hi(fault_vaddr), entry.raw());
        return Ok(());
    }

    // First touch: the page must lie inside a declared region.
    let Some(region) = space.region_containing(fault_vaddr) else {
        return Err(KernelError::BadAddress);
    };
    let writable = region.is_writable();

    let frame = M::alloc_frame()?;
    // SAFETY: freshly allocated and not yet mapped anywhere.
    let mut view = unsafe { FrameView::<M>::new(frame) };
    view.zero();

    let entry = Pte::new(frame, writable);
    if let Err(err) = space.pagetable_mut().insert(fault_vaddr, entry) {
        M::free_frame(frame);
        return Err(err);
    }

    tlb::load_random::<M>(tlb::entry_hi(fault_vaddr), entry.raw());
    Ok(())
}

/// Evicts a translation on another CPU. This kernel runs one CPU; reaching
/// here means the config grew SMP without growing a shootdown protocol.
pub fn vm_tlbshootdown(_ts: &TlbShootdown) -> ! {
    panic!("vm: tlb shootdown on a uniprocessor kernel");
}
