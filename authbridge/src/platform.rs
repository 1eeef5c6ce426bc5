//! Native library selection.
//!
//! One native library variant exists per processor architecture. The variant
//! is chosen once, from the architecture this process was built for, and
//! cached for the life of the process.

use std::fmt;
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;

use crate::errors::{BridgeError, BridgeResult};

/// Processor architectures with a native library variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture {
    /// 32-bit x86
    X86,
    /// 64-bit x86
    X64,
    /// 32-bit ARM
    Arm,
    /// 64-bit ARM
    Arm64,
}

impl Architecture {
    /// Maps a Rust target architecture name to a supported architecture.
    pub fn from_target(arch: &str) -> Option<Self> {
        match arch {
            "x86" => Some(Self::X86),
            "x86_64" => Some(Self::X64),
            "arm" => Some(Self::Arm),
            "aarch64" => Some(Self::Arm64),
            _ => None,
        }
    }

    /// The architecture of the running process.
    pub fn detect() -> BridgeResult<Self> {
        Self::from_target(std::env::consts::ARCH).ok_or_else(|| BridgeError::PlatformUnsupported {
            architecture: std::env::consts::ARCH.to_string(),
        })
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::X86 => "x86",
            Self::X64 => "x64",
            Self::Arm => "arm",
            Self::Arm64 => "arm64",
        };
        f.write_str(name)
    }
}

/// Operating system families, which decide the library file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatingSystem {
    /// Windows
    Windows,
    /// Linux and other Unix-likes
    Unix,
    /// macOS
    MacOs,
}

impl OperatingSystem {
    /// The operating system of the running process.
    pub fn detect() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Unix
        }
    }

    /// Dynamic library extension, including the leading dot.
    pub const fn library_extension(self) -> &'static str {
        match self {
            Self::Windows => ".dll",
            Self::Unix => ".so",
            Self::MacOs => ".dylib",
        }
    }
}

/// One entry of the native library table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeLibrary {
    /// Architecture this variant was built for
    pub architecture: Architecture,
    /// Library name without extension
    pub name: &'static str,
    /// Runtime identifier of the package directory holding the library
    pub runtime_id: &'static str,
}

const LIBRARIES: [NativeLibrary; 4] = [
    NativeLibrary {
        architecture: Architecture::X86,
        name: "msalruntime_x86",
        runtime_id: "win-x86",
    },
    NativeLibrary {
        architecture: Architecture::X64,
        name: "msalruntime",
        runtime_id: "win-x64",
    },
    NativeLibrary {
        architecture: Architecture::Arm,
        name: "msalruntime_arm",
        runtime_id: "win-arm",
    },
    NativeLibrary {
        architecture: Architecture::Arm64,
        name: "msalruntime_arm64",
        runtime_id: "win-arm64",
    },
];

static CURRENT: OnceCell<&'static NativeLibrary> = OnceCell::new();

impl NativeLibrary {
    /// Looks up the table entry for an architecture.
    pub fn for_architecture(architecture: Architecture) -> &'static Self {
        LIBRARIES
            .iter()
            .find(|library| library.architecture == architecture)
            .unwrap_or_else(|| unreachable!("every architecture has a table entry"))
    }

    /// The library for the running process, selected once.
    pub fn current() -> BridgeResult<&'static Self> {
        CURRENT
            .get_or_try_init(|| Architecture::detect().map(Self::for_architecture))
            .copied()
    }

    /// Library file name for the given operating system.
    pub fn file_name(&self, os: OperatingSystem) -> String {
        format!("{}{}", self.name, os.library_extension())
    }

    /// Directory holding the library inside a package rooted at `base`,
    /// e.g. `base/runtimes/win-x64/native`.
    pub fn package_path(&self, base: &Path) -> PathBuf {
        base.join("runtimes").join(self.runtime_id).join("native")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_architecture_has_its_own_library() {
        let names: Vec<_> = [
            Architecture::X86,
            Architecture::X64,
            Architecture::Arm,
            Architecture::Arm64,
        ]
        .into_iter()
        .map(|arch| NativeLibrary::for_architecture(arch).name)
        .collect();

        assert_eq!(
            names,
            ["msalruntime_x86", "msalruntime", "msalruntime_arm", "msalruntime_arm64"]
        );
    }

    #[test]
    fn target_names_map_to_architectures() {
        assert_eq!(Architecture::from_target("x86_64"), Some(Architecture::X64));
        assert_eq!(Architecture::from_target("aarch64"), Some(Architecture::Arm64));
        assert_eq!(Architecture::from_target("riscv64"), None);
    }

    #[test]
    fn current_is_stable_across_calls() {
        match (NativeLibrary::current(), NativeLibrary::current()) {
            (Ok(first), Ok(second)) => assert!(std::ptr::eq(first, second)),
            (Err(BridgeError::PlatformUnsupported { architecture }), Err(_)) => {
                assert_eq!(architecture, std::env::consts::ARCH);
            }
            other => panic!("selection changed between calls: {other:?}"),
        }
    }

    #[test]
    fn file_name_and_package_path() {
        let library = NativeLibrary::for_architecture(Architecture::Arm64);

        assert_eq!(library.file_name(OperatingSystem::Windows), "msalruntime_arm64.dll");
        assert_eq!(library.file_name(OperatingSystem::MacOs), "msalruntime_arm64.dylib");
        assert_eq!(
            library.package_path(Path::new("app")),
            Path::new("app").join("runtimes").join("win-arm64").join("native")
        );
    }
}
