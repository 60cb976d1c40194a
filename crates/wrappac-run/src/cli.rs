//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;
use wrappac_session::{Invocation, LogFormat, RootMethod};

/// Run a command on a pseudo-terminal, the way the package manager runs it.
#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub struct Cli {
    /// Configuration file (`.toml` or `.json`). Defaults to
    /// `$XDG_CONFIG_HOME/wrappac/session.toml` when present.
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Run the command as root.
    #[arg(long)]
    pub root: bool,

    /// How to obtain root: auto, sudo or doas.
    #[arg(long, value_name = "METHOD", requires = "root")]
    pub root_method: Option<RootMethod>,

    /// Working directory for the command.
    #[arg(long, short = 'C', value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Extra environment variable for the command.
    #[arg(long = "env", short = 'e', value_name = "KEY=VALUE", value_parser = parse_env)]
    pub env: Vec<(String, String)>,

    /// Never echo typed input.
    #[arg(long)]
    pub masked: bool,

    /// Print stderr after the command instead of interleaving it.
    #[arg(long)]
    pub separate_stderr: bool,

    /// Strip escape sequences and print a plain log.
    #[arg(long)]
    pub plain: bool,

    /// Log filter, overriding the configuration (`RUST_LOG` still wins).
    #[arg(long, value_name = "FILTER")]
    pub log_level: Option<String>,

    /// Log line format: text or json.
    #[arg(long, value_name = "FORMAT")]
    pub log_format: Option<LogFormat>,

    /// The command and its arguments.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl Cli {
    /// The invocation described by the arguments.
    pub fn invocation(&self, window: Option<(u16, u16)>) -> Invocation {
        let mut builder = Invocation::builder(self.command[0].clone())
            .args(self.command[1..].iter().cloned())
            .masked_input(self.masked)
            .separate_stderr(self.separate_stderr);

        for (key, value) in &self.env {
            builder = builder.env(key, value);
        }
        if let Some(dir) = &self.cwd {
            builder = builder.working_directory(dir);
        }
        if let Some((cols, rows)) = window {
            builder = builder.window_size(cols, rows);
        }
        if self.root {
            builder = builder.as_root(self.root_method.unwrap_or_default());
        }
        builder.build()
    }
}

fn parse_env(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got {raw:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_keeps_its_flags() {
        let cli = Cli::try_parse_from(["wrappac-run", "--root", "pacman", "-Syu", "--noconfirm"])
            .expect("parse");

        assert!(cli.root);
        assert_eq!(cli.command, ["pacman", "-Syu", "--noconfirm"]);

        let invocation = cli.invocation(Some((100, 30)));
        assert_eq!(invocation.argv(), ["pacman", "-Syu", "--noconfirm"]);
        assert_eq!(invocation.root(), Some(RootMethod::Auto));
        assert_eq!(invocation.window_size(), Some((100, 30)));
    }

    #[test]
    fn env_pairs_are_parsed() {
        let cli = Cli::try_parse_from(["wrappac-run", "-e", "LANG=C", "-e", "EMPTY=", "env"])
            .expect("parse");
        assert_eq!(
            cli.env,
            [("LANG".to_string(), "C".to_string()), ("EMPTY".to_string(), String::new())]
        );
        assert!(Cli::try_parse_from(["wrappac-run", "-e", "=x", "env"]).is_err());
    }

    #[test]
    fn root_method_requires_root() {
        assert!(Cli::try_parse_from(["wrappac-run", "--root-method", "doas", "true"]).is_err());

        let cli = Cli::try_parse_from(["wrappac-run", "--root", "--root-method", "doas", "true"])
            .expect("parse");
        assert_eq!(cli.invocation(None).root(), Some(RootMethod::Doas));
    }

    #[test]
    fn command_is_required() {
        assert!(Cli::try_parse_from(["wrappac-run"]).is_err());
    }
}
