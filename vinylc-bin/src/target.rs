#[derive(Copy, Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
#[clap(rename_all = "snake_case")]
pub enum Arch {
    Aarch64,
    X86_64,
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&vinyl::Arch::from(*self), f)
    }
}

impl From<Arch> for vinyl::Arch {
    fn from(value: Arch) -> Self {
        match value {
            Arch::Aarch64 => vinyl::Arch::Aarch64,
            Arch::X86_64 => vinyl::Arch::X86_64,
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_arch = "aarch64")] {
        pub const DEFAULT_ARCH: Arch = Arch::Aarch64;
    } else {
        pub const DEFAULT_ARCH: Arch = Arch::X86_64;
    }
}
