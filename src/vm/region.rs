use bitflags::bitflags;

use crate::memory::PAGE_SHIFT;
use crate::memory::address::VA;

bitflags! {
    /// Access permissions declared for a user region.
    ///
    /// Only the low three bits are meaningful; the word above them is zero
    /// except while a program load is in flight, when it parks the declared
    /// permissions (see [`Region::save_flags_for_load`]).
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct RegionFlags: u8 {
        const READ = 0b001;
        const WRITE = 0b010;
        const EXEC = 0b100;
    }
}

/// A contiguous range of user pages with uniform permissions.
#[derive(Clone, Debug)]
pub struct Region {
    vbase: VA,
    npages: usize,
    flags: RegionFlags,
}

impl Region {
    pub(crate) fn new(vbase: VA, npages: usize, flags: RegionFlags) -> Self {
        Self {
            vbase,
            npages,
            flags,
        }
    }

    pub fn vbase(&self) -> VA {
        self.vbase
    }

    pub fn npages(&self) -> usize {
        self.npages
    }

    /// The permissions currently in force, without the parked load bits.
    pub fn flags(&self) -> RegionFlags {
        RegionFlags::from_bits_truncate(self.flags.bits())
    }

    pub fn is_writable(&self) -> bool {
        self.flags.contains(RegionFlags::WRITE)
    }

    /// Whether `vaddr` falls inside the region.
    pub fn contains(&self, vaddr: VA) -> bool {
        let end = self.vbase.value() as u64 + ((self.npages as u64) << PAGE_SHIFT);
        self.vbase <= vaddr && (vaddr.value() as u64) < end
    }

    /// Parks the declared permissions in the high bits and grants read/write
    /// while program segments stream in. The high bits are known-zero at
    /// creation, so nothing is lost.
    pub(crate) fn save_flags_for_load(&mut self) {
        let bits = self.flags.bits() << 3;
        self.flags =
            RegionFlags::from_bits_retain(bits | (RegionFlags::READ | RegionFlags::WRITE).bits());
    }

    /// Restores the permissions parked by [`Self::save_flags_for_load`].
    pub(crate) fn restore_flags_after_load(&mut self) {
        self.flags = RegionFlags::from_bits_truncate(self.flags.bits() >> 3);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::PAGE_SIZE;

    #[test]
    fn containment_is_half_open() {
        let region = Region::new(VA::from_value(0x0040_0000), 2, RegionFlags::READ);
        assert!(region.contains(VA::from_value(0x0040_0000)));
        assert!(region.contains(VA::from_value(0x0040_1fff)));
        assert!(!region.contains(VA::from_value(0x0040_2000)));
        assert!(!region.contains(VA::from_value(0x003f_ffff)));
    }

    #[test]
    fn load_cycle_round_trips_flags() {
        for flags in [
            RegionFlags::READ,
            RegionFlags::READ | RegionFlags::EXEC,
            RegionFlags::READ | RegionFlags::WRITE,
            RegionFlags::all(),
        ] {
            let mut region = Region::new(VA::from_value(0), 1, flags);
            region.save_flags_for_load();
            assert_eq!(region.flags(), RegionFlags::READ | RegionFlags::WRITE);
            assert!(region.is_writable());
            region.restore_flags_after_load();
            assert_eq!(region.flags(), flags);
        }
    }

    #[test]
    fn page_count_scales_containment() {
        let npages = 16;
        let region = Region::new(
            VA::from_value(0x7fff_0000),
            npages,
            RegionFlags::READ | RegionFlags::WRITE,
        );
        let last = 0x7fff_0000 + (npages as u32 * PAGE_SIZE as u32) - 4;
        assert!(region.contains(VA::from_value(last)));
    }
}
