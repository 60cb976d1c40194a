//! Running commands through `sudo` or `doas`.
//!
//! Escalated commands are rewritten so that the tool prints a fixed marker
//! as its password prompt and reads the password from the terminal. The
//! output relay watches for the marker, strips it, and reports a
//! [`PasswordPrompt`](crate::PasswordPrompt) so the front-end can ask the
//! user with masked input.

use std::env;
use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default prompt marker passed to the privilege tool.
pub const DEFAULT_PASSWORD_MARKER: &str = "[WRAPPAC_PASSWORD_PROMPT]";

/// Short options of `sudo` that take a separate argument.
const SUDO_SHORT_WITH_ARG: &[&str] = &["-A", "-C", "-g", "-p", "-r", "-t", "-u"];

/// Long options of `sudo` that take a separate argument.
const SUDO_LONG_WITH_ARG: &[&str] = &[
    "--askpass",
    "--chdir",
    "--cd",
    "--close-from",
    "--prompt",
    "--group",
    "--host",
    "--type",
    "--role",
    "--chroot",
    "--user",
];

/// Privilege tools the session knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscalationTool {
    /// `sudo`
    Sudo,
    /// `doas`
    Doas,
}

impl EscalationTool {
    /// The executable name.
    #[must_use]
    pub const fn program(self) -> &'static str {
        match self {
            Self::Sudo => "sudo",
            Self::Doas => "doas",
        }
    }

    /// Recognize a tool from a program path or name.
    #[must_use]
    pub fn from_program(program: &str) -> Option<Self> {
        match Path::new(program).file_name()?.to_str()? {
            "sudo" => Some(Self::Sudo),
            "doas" => Some(Self::Doas),
            _ => None,
        }
    }
}

impl fmt::Display for EscalationTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

/// How to obtain root privileges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RootMethod {
    /// Prefer `sudo`, fall back to `doas`.
    #[default]
    Auto,
    /// Always `sudo`.
    Sudo,
    /// Always `doas`.
    Doas,
}

impl RootMethod {
    /// Find the tool on `PATH`.
    ///
    /// Returns the tool and its full path, or `None` if nothing usable is
    /// installed.
    #[must_use]
    pub fn resolve(self) -> Option<(EscalationTool, PathBuf)> {
        let path = env::var_os("PATH")?;
        let cwd = env::current_dir().ok()?;
        self.resolve_in(path, cwd)
    }

    /// Like [`Self::resolve`], searching `search_path` instead of `PATH`.
    #[must_use]
    pub fn resolve_in(
        self,
        search_path: impl AsRef<OsStr>,
        cwd: impl AsRef<Path>,
    ) -> Option<(EscalationTool, PathBuf)> {
        let candidates: &[EscalationTool] = match self {
            Self::Auto => &[EscalationTool::Sudo, EscalationTool::Doas],
            Self::Sudo => &[EscalationTool::Sudo],
            Self::Doas => &[EscalationTool::Doas],
        };

        candidates.iter().find_map(|tool| {
            which::which_in(tool.program(), Some(search_path.as_ref()), cwd.as_ref())
                .ok()
                .map(|path| (*tool, path))
        })
    }
}

impl std::str::FromStr for RootMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "sudo" => Ok(Self::Sudo),
            "doas" => Ok(Self::Doas),
            other => Err(format!("unknown root method: {other}")),
        }
    }
}

/// An argv ready to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepared {
    /// The rewritten argument vector.
    pub argv: Vec<String>,
    /// The privilege tool, when the command is escalated.
    pub tool: Option<EscalationTool>,
}

/// Rewrite `argv` so a leading `sudo` or `doas` prompts with `marker`.
///
/// Other commands are returned unchanged.
#[must_use]
pub fn prepare_argv(argv: &[String], marker: &str) -> Prepared {
    let tool = argv.first().and_then(|p| EscalationTool::from_program(p));
    let argv = match tool {
        Some(EscalationTool::Sudo) => prepare_sudo(argv, marker),
        Some(EscalationTool::Doas) => prepare_doas(argv, marker),
        None => argv.to_vec(),
    };
    Prepared { argv, tool }
}

fn prepare_sudo(argv: &[String], marker: &str) -> Vec<String> {
    let mut options: Vec<String> = Vec::new();
    let mut idx = 1;

    while idx < argv.len() {
        let item = argv[idx].as_str();

        if item == "--" {
            options.push(item.to_string());
            idx += 1;
            break;
        }

        if item.starts_with("--") {
            if item.starts_with("--prompt=") || item == "--stdin" {
                idx += 1;
                continue;
            }
            if item == "--prompt" {
                idx += 2;
                continue;
            }
            options.push(item.to_string());
            idx += 1;
            if SUDO_LONG_WITH_ARG.contains(&item) && idx < argv.len() {
                options.push(argv[idx].clone());
                idx += 1;
            }
            continue;
        }

        if item.starts_with('-') && item != "-" {
            if item == "-S" {
                idx += 1;
                continue;
            }
            if item == "-p" {
                idx += 2;
                continue;
            }
            options.push(item.to_string());
            idx += 1;
            if SUDO_SHORT_WITH_ARG.contains(&item) && idx < argv.len() {
                options.push(argv[idx].clone());
                idx += 1;
            }
            continue;
        }

        break;
    }

    let insert_at = options
        .iter()
        .position(|o| o == "--")
        .unwrap_or(options.len());
    let extra = ["-S".to_string(), "-p".to_string(), marker.to_string()];
    options.splice(insert_at..insert_at, extra);

    let mut out = Vec::with_capacity(argv.len() + 3);
    out.push(argv[0].clone());
    out.extend(options);
    out.extend(argv[idx.min(argv.len())..].iter().cloned());
    out
}

fn prepare_doas(argv: &[String], marker: &str) -> Vec<String> {
    let mut out = vec![argv[0].clone(), "-p".to_string(), marker.to_string()];
    let mut rest = argv[1..].iter();
    while let Some(item) = rest.next() {
        if item == "-p" {
            rest.next();
            continue;
        }
        out.push(item.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const M: &str = DEFAULT_PASSWORD_MARKER;

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn root_method_resolves_against_search_path() {
        use std::os::unix::fs::PermissionsExt;

        let dir = env::temp_dir().join(format!("wrappac-root-method-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let doas = dir.join("doas");
        std::fs::write(&doas, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&doas, std::fs::Permissions::from_mode(0o755)).unwrap();
        // Present but not executable.
        std::fs::write(dir.join("sudo"), "").unwrap();

        assert_eq!(
            RootMethod::Auto.resolve_in(&dir, &dir),
            Some((EscalationTool::Doas, doas.clone()))
        );
        assert_eq!(RootMethod::Sudo.resolve_in(&dir, &dir), None);
        assert_eq!(RootMethod::Doas.resolve_in("/nonexistent-wrappac", &dir), None);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn plain_commands_are_untouched() {
        let prepared = prepare_argv(&argv(&["pacman", "-Syu"]), M);
        assert_eq!(prepared.argv, argv(&["pacman", "-Syu"]));
        assert_eq!(prepared.tool, None);
    }

    #[test]
    fn sudo_gets_stdin_and_marker() {
        let prepared = prepare_argv(&argv(&["sudo", "pacman", "-Syu"]), M);
        assert_eq!(prepared.argv, argv(&["sudo", "-S", "-p", M, "pacman", "-Syu"]));
        assert_eq!(prepared.tool, Some(EscalationTool::Sudo));
    }

    #[test]
    fn sudo_user_prompt_is_replaced() {
        let prepared = prepare_argv(
            &argv(&["/usr/bin/sudo", "-p", "pw:", "--prompt=x", "-S", "ls"]),
            M,
        );
        assert_eq!(prepared.argv, argv(&["/usr/bin/sudo", "-S", "-p", M, "ls"]));
    }

    #[test]
    fn sudo_options_with_arguments_survive() {
        let prepared = prepare_argv(&argv(&["sudo", "-u", "alice", "--chdir", "/tmp", "id", "-u"]), M);
        assert_eq!(
            prepared.argv,
            argv(&["sudo", "-u", "alice", "--chdir", "/tmp", "-S", "-p", M, "id", "-u"])
        );
    }

    #[test]
    fn sudo_marker_goes_before_double_dash() {
        let prepared = prepare_argv(&argv(&["sudo", "-E", "--", "-weird"]), M);
        assert_eq!(prepared.argv, argv(&["sudo", "-E", "-S", "-p", M, "--", "-weird"]));
    }

    #[test]
    fn doas_prompt_is_replaced() {
        let prepared = prepare_argv(&argv(&["doas", "-p", "pw:", "-n", "pacman", "-Syu"]), M);
        assert_eq!(prepared.argv, argv(&["doas", "-p", M, "-n", "pacman", "-Syu"]));
        assert_eq!(prepared.tool, Some(EscalationTool::Doas));
    }

    #[test]
    fn root_method_parses() {
        assert_eq!("SUDO".parse::<RootMethod>(), Ok(RootMethod::Sudo));
        assert!("su".parse::<RootMethod>().is_err());
    }

    proptest! {
        #[test]
        fn sudo_command_tail_is_preserved(
            cmd in "[a-z]{1,8}",
            args in proptest::collection::vec("[a-zA-Z0-9=/._-]{0,6}", 0..6),
        ) {
            let mut input = argv(&["sudo"]);
            input.push(cmd.clone());
            input.extend(args.iter().cloned());

            let prepared = prepare_argv(&input, M);
            let mut tail = vec![cmd];
            tail.extend(args);
            prop_assert_eq!(&prepared.argv[4..], tail.as_slice());
            prop_assert!(prepared.argv.iter().any(|a| a == "-S"));
        }

        #[test]
        fn sudo_marker_appears_once(opts in proptest::collection::vec(
            prop_oneof![Just("-S"), Just("-E"), Just("-p"), Just("--stdin"), Just("-k")],
            0..6,
        )) {
            let mut input = argv(&["sudo"]);
            input.extend(opts.iter().map(|s| (*s).to_string()));
            input.push("true".to_string());

            let prepared = prepare_argv(&input, M);
            prop_assert_eq!(prepared.argv.iter().filter(|a| *a == M).count(), 1);
            prop_assert_eq!(prepared.argv.iter().filter(|a| *a == "-p").count(), 1);
        }
    }
}
