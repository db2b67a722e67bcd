//! In-environment toolchain resolution for the compile-and-emulate backend.
//!
//! The resolver runs inside the container, so it is expressed as an ordered
//! list of [`Step`]s and rendered to a POSIX `sh` script. Every dynamic value
//! goes through [`shell_quote`]; candidate order is preserved and the first
//! candidate found on the environment's `PATH` wins.

use crate::config::{SandboxConfig, UNAVAILABLE_EXIT_CODE};

/// Shell variable that receives a resolved tool path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Compiler,
    Emulator,
}

impl Tool {
    fn var(self) -> &'static str {
        match self {
            Tool::Compiler => "CC",
            Tool::Emulator => "EMU",
        }
    }

    fn missing_message(self) -> &'static str {
        match self {
            Tool::Compiler => "RISC-V gcc not found",
            Tool::Emulator => "qemu-riscv64 not found",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Copy standard input into a file.
    Capture { path: String },
    /// First candidate present on `PATH`, else exit 127 with a diagnostic.
    Resolve { tool: Tool, candidates: Vec<String> },
    /// Run a resolved tool with arguments; a nonzero status aborts the script.
    Invoke { tool: Tool, args: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    steps: Vec<Step>,
}

impl Toolchain {
    /// Capture source, pick a compiler, build a stripped static rv64gc/lp64d
    /// binary without libc, pick an emulator, run it.
    pub fn riscv(config: &SandboxConfig) -> Self {
        let scratch = config.scratch.path.trim_end_matches('/');
        let source = format!("{scratch}/prog.S");
        let binary = format!("{scratch}/a.out");

        let compile_args = [
            "-nostdlib",
            "-static",
            "-march=rv64gc",
            "-mabi=lp64d",
            "-s",
            "-o",
            binary.as_str(),
            source.as_str(),
        ];

        Self {
            steps: vec![
                Step::Capture {
                    path: source.clone(),
                },
                Step::Resolve {
                    tool: Tool::Compiler,
                    candidates: config.compilers.clone(),
                },
                Step::Invoke {
                    tool: Tool::Compiler,
                    args: compile_args.iter().map(|s| s.to_string()).collect(),
                },
                Step::Resolve {
                    tool: Tool::Emulator,
                    candidates: config.emulators.clone(),
                },
                // -L is a no-op for a static binary.
                Step::Invoke {
                    tool: Tool::Emulator,
                    args: vec!["-L".to_string(), "/".to_string(), binary],
                },
            ],
        }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Render to a script for `/bin/sh -c`.
    pub fn render(&self) -> String {
        let mut lines = vec!["set -e".to_string()];
        for step in &self.steps {
            match step {
                Step::Capture { path } => {
                    lines.push(format!("cat >{}", shell_quote(path)));
                }
                Step::Resolve { tool, candidates } => {
                    let var = tool.var();
                    lines.push(format!("{var}=\"\""));
                    for candidate in candidates {
                        lines.push(format!(
                            "if [ -z \"${var}\" ]; then {var}=\"$(command -v {} 2>/dev/null || true)\"; fi",
                            shell_quote(candidate)
                        ));
                    }
                    lines.push(format!(
                        "[ -n \"${var}\" ] || {{ echo {} >&2; exit {UNAVAILABLE_EXIT_CODE}; }}",
                        shell_quote(tool.missing_message())
                    ));
                }
                Step::Invoke { tool, args } => {
                    let args: Vec<String> = args.iter().map(|a| shell_quote(a)).collect();
                    lines.push(format!("\"${}\" {}", tool.var(), args.join(" ")));
                }
            }
        }
        lines.join("\n")
    }
}

/// Single-quote a word for POSIX sh. Plain words pass through unchanged.
pub fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | '=' | ':' | ','));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}
