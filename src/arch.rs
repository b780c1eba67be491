//! Architecture tag and bit width, analogous to rd's `SupportedArch` but
//! spanning the archs the spec calls out (x86 debug registers vs. ARM
//! hardware watchpoints).

/// CPU architecture of the inferior. The debugger's own build target need
/// not match this (a 64-bit tracer can debug a 32-bit x86 tracee), which is
/// exactly why `Registers`/`RegisterBank` key off this tag rather than
/// `cfg(target_arch)`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Arch {
    X86,
    X86_64,
    Arm,
    Aarch64,
}

impl Arch {
    /// The architecture of the process this crate is itself running as,
    /// i.e. what we'd be debugging with if we attached to ourselves.
    pub fn host() -> Arch {
        if cfg!(target_arch = "x86_64") {
            Arch::X86_64
        } else if cfg!(target_arch = "x86") {
            Arch::X86
        } else if cfg!(target_arch = "aarch64") {
            Arch::Aarch64
        } else if cfg!(target_arch = "arm") {
            Arch::Arm
        } else {
            // Any arch this crate doesn't model falls back to the closest
            // word-width relative rather than failing construction; callers
            // still get `Error::NotImplemented` from operations that need a
            // profile for this tag.
            Arch::X86_64
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            Arch::X86 | Arch::Arm => 32,
            Arch::X86_64 | Arch::Aarch64 => 64,
        }
    }

    pub fn is_x86_family(self) -> bool {
        matches!(self, Arch::X86 | Arch::X86_64)
    }

    pub fn is_arm_family(self) -> bool {
        matches!(self, Arch::Arm | Arch::Aarch64)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn host_arch_has_sane_bit_width() {
        let a = Arch::host();
        assert!(a.bits() == 32 || a.bits() == 64);
    }
}
