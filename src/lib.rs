#![cfg_attr(not(test), no_std)]

//! Virtual-memory subsystem of a small teaching kernel targeting a 32-bit
//! processor with a software-managed TLB.
//!
//! The subsystem keeps one [`vm::addrspace::AddressSpace`] per process: an
//! ordered list of permission-tagged regions plus a two-level forward page
//! table whose entries are hardware TLB-low words. User pages are allocated
//! lazily by the fault path ([`vm::vm_fault`]) the first time they are
//! touched.
//!
//! All hardware access goes through the [`CpuOps`] and [`MachineOps`]
//! traits. The kernel binary implements them for the target board; the unit
//! tests run the whole subsystem hosted against the mock in [`test`].

extern crate alloc;

use core::ptr::NonNull;

use error::Result;
use memory::page::PageFrame;

pub mod error;
pub mod memory;
pub mod sync;
pub mod vm;

pub trait CpuOps: 'static {
    /// Masks all maskable interrupts on the current CPU core and returns the
    /// state that was in effect before masking.
    fn disable_interrupts() -> usize;

    /// Restores an interrupt state previously obtained from
    /// `disable_interrupts`.
    fn restore_interrupt_state(flags: usize);
}

/// The machine services the VM subsystem depends on: the physical frame
/// allocator, the kernel direct map, and the TLB write primitives.
///
/// Each supported target provides a concrete implementation. The frame
/// allocator is owned by the platform; this crate only borrows frames from
/// it and returns them on address-space teardown.
pub trait MachineOps: CpuOps {
    /// Number of slots in the hardware TLB.
    const NUM_TLB: usize;

    /// Allocates one physical frame. The contents are undefined; callers
    /// scrub before exposing the frame to userspace.
    fn alloc_frame() -> Result<PageFrame>;

    /// Returns `frame` to the allocator.
    ///
    /// `frame` must have come from `alloc_frame` and must not be referenced
    /// by any page-table entry afterwards.
    fn free_frame(frame: PageFrame);

    /// Address of `frame` in the kernel direct map, through which frames are
    /// zero-filled and copied without installing a user mapping.
    fn frame_ptr(frame: PageFrame) -> NonNull<u8>;

    /// Writes one TLB entry into a hardware-chosen slot.
    ///
    /// The caller must hold a [`sync::IrqGuard`]; `memory::tlb` wraps this
    /// accordingly.
    fn tlb_write_random(hi: u32, lo: u32);

    /// Writes the TLB slot at `index`. Same masking contract as
    /// `tlb_write_random`.
    fn tlb_write_indexed(index: usize, hi: u32, lo: u32);
}
