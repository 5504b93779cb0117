use core::fmt;

/// Errno values understood by the trap dispatcher and the syscall layer.
pub const ENOMEM: i32 = 12;
pub const EFAULT: i32 = 14;
pub const EINVAL: i32 = 22;

/// Kernel-internal error type. Converted to an errno at the boundary where
/// the kernel reports failures to userspace.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KernelError {
    /// A physical frame or kernel heap allocation failed.
    NoMemory,
    /// An argument was malformed or out of the accepted domain.
    InvalidValue,
    /// An address was outside every mapping the caller may touch.
    BadAddress,
}

impl KernelError {
    /// The errno this error surfaces as.
    pub fn errno(self) -> i32 {
        match self {
            KernelError::NoMemory => ENOMEM,
            KernelError::InvalidValue => EINVAL,
            KernelError::BadAddress => EFAULT,
        }
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            KernelError::NoMemory => "out of memory",
            KernelError::InvalidValue => "invalid value",
            KernelError::BadAddress => "bad address",
        };
        f.write_str(msg)
    }
}

pub type Result<T> = core::result::Result<T, KernelError>;
