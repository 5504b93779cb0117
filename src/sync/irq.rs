use core::marker::PhantomData;

use crate::CpuOps;

/// An RAII window during which maskable interrupts are disabled on the
/// local CPU. The prior interrupt state is restored on drop, so guards nest.
///
/// The guard is `!Send`: an interrupt state saved on one core must be
/// restored on the same core.
pub struct IrqGuard<C: CpuOps> {
    saved: usize,
    _not_send: PhantomData<*const ()>,
    _cpu: PhantomData<C>,
}

impl<C: CpuOps> IrqGuard<C> {
    pub fn new() -> Self {
        Self {
            saved: C::disable_interrupts(),
            _not_send: PhantomData,
            _cpu: PhantomData,
        }
    }
}

impl<C: CpuOps> Default for IrqGuard<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: CpuOps> Drop for IrqGuard<C> {
    fn drop(&mut self) {
        C::restore_interrupt_state(self.saved);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CpuOps;
    use crate::test::MockMachine;

    #[test]
    fn guards_nest_and_restore() {
        let outer = IrqGuard::<MockMachine>::new();
        {
            let _inner = IrqGuard::<MockMachine>::new();
        }
        drop(outer);
        // A fresh guard must observe the fully restored state.
        assert_eq!(MockMachine::disable_interrupts(), 0);
        MockMachine::restore_interrupt_state(0);
    }
}
