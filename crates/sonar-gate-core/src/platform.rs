use std::fmt;

use thiserror::Error;

/// Operating systems the scanner distribution is published for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    Linux,
    MacOs,
}

/// CPU architectures the scanner distribution is published for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X64,
    Aarch64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("unsupported operating system `{0}` (supported: linux, macosx)")]
    UnsupportedOs(String),
    #[error("unsupported CPU architecture `{0}` (supported: x64, aarch64)")]
    UnsupportedArch(String),
}

impl Os {
    /// Accepts both `uname -s` output and Rust target names.
    pub fn from_name(name: &str) -> Result<Self, PlatformError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "linux" => Ok(Self::Linux),
            "darwin" | "macos" | "macosx" => Ok(Self::MacOs),
            _ => Err(PlatformError::UnsupportedOs(name.to_string())),
        }
    }

    /// Identifier used in scanner archive names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::MacOs => "macosx",
        }
    }
}

impl Arch {
    /// Accepts both `uname -m` output and Rust target names.
    pub fn from_name(name: &str) -> Result<Self, PlatformError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "x86_64" | "amd64" | "x64" => Ok(Self::X64),
            "aarch64" | "arm64" => Ok(Self::Aarch64),
            _ => Err(PlatformError::UnsupportedArch(name.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::X64 => "x64",
            Self::Aarch64 => "aarch64",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
}

impl Platform {
    pub fn detect() -> Result<Self, PlatformError> {
        Self::from_names(std::env::consts::OS, std::env::consts::ARCH)
    }

    pub fn from_names(os: &str, arch: &str) -> Result<Self, PlatformError> {
        Ok(Self {
            os: Os::from_name(os)?,
            arch: Arch::from_name(arch)?,
        })
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os.as_str(), self.arch.as_str())
    }
}
