//! Wire format of the TLB entry pair and the masked-interrupt wrappers
//! around the hardware write primitives.

use crate::MachineOps;
use crate::sync::IrqGuard;
use super::PAGE_SHIFT;
use super::address::{KSEG_BASE, VA};

/// Physical frame bits of the entry-low word.
pub const TLBLO_PPAGE_MASK: u32 = 0xffff_f000;
/// Writable bit. The hardware calls it "dirty"; a store through an entry
/// with this bit clear raises a read-only fault.
pub const TLBLO_DIRTY: u32 = 1 << 10;
/// Valid bit: the entry participates in matching.
pub const TLBLO_VALID: u32 = 1 << 9;
/// Virtual page bits of the entry-high word.
pub const TLBHI_VPAGE_MASK: u32 = 0xffff_f000;

/// Entry-high word matching `vaddr`'s page. The kernel runs a single
/// address-space ID, so the ASID field stays zero.
pub fn entry_hi(vaddr: VA) -> u32 {
    vaddr.value() & TLBHI_VPAGE_MASK
}

/// Entry-high for an invalidated slot: a kernel-segment page, distinct per
/// index, that no user access can ever match.
fn invalid_hi(index: usize) -> u32 {
    KSEG_BASE + ((index as u32) << PAGE_SHIFT)
}

fn invalid_lo() -> u32 {
    0
}

/// Loads one translation into a hardware-chosen slot.
///
/// The raised-priority window encloses exactly the write: no allocation and
/// no lock acquisition happen inside it.
pub fn load_random<M: MachineOps>(hi: u32, lo: u32) {
    let _irq = IrqGuard::<M>::new();
    M::tlb_write_random(hi, lo);
}

/// Invalidates every TLB slot on the local CPU.
pub fn flush_all<M: MachineOps>() {
    let _irq = IrqGuard::<M>::new();
    for index in 0..M::NUM_TLB {
        M::tlb_write_indexed(index, invalid_hi(index), invalid_lo());
    }
}

/// A request to evict one translation on another CPU. Carried by the
/// inter-processor interrupt path, which this uniprocessor kernel does not
/// have; see [`crate::vm::vm_tlbshootdown`].
pub struct TlbShootdown {
    pub vaddr: VA,
}
