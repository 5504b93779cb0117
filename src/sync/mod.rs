mod irq;

pub use irq::IrqGuard;
