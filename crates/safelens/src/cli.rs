//! Command-line surface.

use {clap::{Parser, Subcommand}, std::path::PathBuf};

#[derive(Debug, Parser)]
#[clap(name = "safelens", about = "Local verification of Safe multisig transactions")]
pub struct Args {
    /// Tracing filter, e.g. `warn,safelens=debug`.
    #[clap(long, env = "SAFELENS_LOG", default_value = "warn,safelens=info")]
    pub log_filter: String,
    /// Emit logs as JSON lines.
    #[clap(long, env = "SAFELENS_LOG_JSON")]
    pub log_json: bool,
    /// Settings file location.
    #[clap(long, env = "SAFELENS_SETTINGS", default_value = "safelens.toml")]
    pub settings: PathBuf,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch a pending transaction from the Safe Transaction Service,
    /// assemble an evidence package, and verify it.
    Analyze {
        /// A Safe{Wallet} queue URL or `<chain>:<safe>:<safeTxHash>`.
        url: String,
        /// Print the raw verification report as JSON.
        #[clap(long)]
        json: bool,
        /// Also write the assembled evidence package to this file.
        #[clap(long)]
        export: Option<PathBuf>,
    },
    /// Verify an evidence package from a file, an inline JSON string, or
    /// stdin.
    Verify {
        /// Read the package from a file.
        #[clap(long, conflicts_with = "json_input")]
        file: Option<PathBuf>,
        /// Read the package from an inline JSON string.
        #[clap(long = "json", value_name = "JSON")]
        json_input: Option<String>,
        /// Accept unknown top-level fields with warnings instead of
        /// rejecting them.
        #[clap(long)]
        lenient: bool,
        /// Print the raw verification report as JSON.
        #[clap(long)]
        report_json: bool,
    },
    /// Print the stable verification-source registry.
    Sources,
    /// Manage the settings file.
    Settings {
        #[clap(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum SettingsAction {
    /// Write a commented default settings file.
    Init,
    /// Print the resolved settings.
    Show,
}

#[cfg(test)]
mod tests {
    use {super::*, clap::Parser};

    #[test]
    fn verify_accepts_file_json_or_stdin() {
        let args = Args::parse_from(["safelens", "verify", "--file", "package.json"]);
        assert!(matches!(
            args.command,
            Command::Verify { file: Some(_), json_input: None, .. }
        ));

        let args = Args::parse_from(["safelens", "verify", "--json", "{}"]);
        assert!(matches!(
            args.command,
            Command::Verify { file: None, json_input: Some(_), .. }
        ));

        let args = Args::parse_from(["safelens", "verify"]);
        assert!(matches!(
            args.command,
            Command::Verify { file: None, json_input: None, .. }
        ));

        // --file and --json are mutually exclusive.
        assert!(
            Args::try_parse_from(["safelens", "verify", "--file", "a", "--json", "{}"]).is_err()
        );
    }

    #[test]
    fn analyze_takes_a_url() {
        let args = Args::parse_from(["safelens", "analyze", "eth:0x00:0x11", "--json"]);
        assert!(matches!(args.command, Command::Analyze { json: true, .. }));
    }
}
