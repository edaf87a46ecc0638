//! Host platform branch and the user-facing hints that depend on it.

use crate::project::ProjectKind;

/// The two launch branches the runner supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Unix,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Unix
        }
    }

    /// Name of the script a project directory must provide on this platform.
    pub fn script_name(self) -> &'static str {
        match self {
            Platform::Windows => "run.ps1",
            Platform::Unix => "run.sh",
        }
    }

    pub fn script_type(self) -> &'static str {
        match self {
            Platform::Windows => "PowerShell (.ps1)",
            Platform::Unix => "Shell (.sh)",
        }
    }

    /// Separator used in the search path variable.
    pub fn path_separator(self) -> char {
        match self {
            Platform::Windows => ';',
            Platform::Unix => ':',
        }
    }

    /// One line describing the host, e.g. `Operating System: linux (x86_64)`.
    pub fn host_description() -> String {
        format!(
            "Operating System: {} ({})",
            std::env::consts::OS,
            std::env::consts::ARCH
        )
    }

    /// Platform specific advice appended to launch failures.
    pub fn launch_hint(self) -> &'static str {
        match self {
            Platform::Windows => {
                "On Windows, make sure to have:\n\
                 - PowerShell scripts (.ps1) or WSL for Linux shell scripts.\n\
                 - PowerShell execution policy that allows scripts (Set-ExecutionPolicy RemoteSigned)."
            }
            Platform::Unix => {
                "On macOS/Linux, make sure run.sh has execute permissions (chmod +x run.sh)."
            }
        }
    }

    /// Toolchain expected for a project kind on this platform.
    pub fn toolchain(self, kind: ProjectKind) -> &'static str {
        match (kind, self) {
            (ProjectKind::Cpp, Platform::Windows) => {
                "MSYS2 with mingw-w64-x86_64-gcc, mingw-w64-x86_64-cmake"
            }
            (ProjectKind::Cpp, Platform::Unix) => "Compiler (gcc/clang) and CMake",
            (ProjectKind::TypeScript, _) => "Node.js and npm",
            (ProjectKind::Python, _) => "Python 3.9 or later",
            (ProjectKind::Java, _) => "JDK 17 or later",
        }
    }

    /// Lists the toolchains every project kind expects.
    pub fn toolchain_summary(self) -> String {
        let mut out = String::from("Make sure all required tools are installed:");
        for kind in [
            ProjectKind::Cpp,
            ProjectKind::TypeScript,
            ProjectKind::Python,
            ProjectKind::Java,
        ] {
            out.push_str(&format!("\n- {}: {}", kind.label(), self.toolchain(kind)));
        }
        out
    }
}
