//! Command-line interface definitions for the `sortie` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page. Only
//! parsing happens here; option rules are checked by the request validator.

use clap::Parser;

/// Top-level CLI for the `sortie` binary.
#[derive(Debug, Parser)]
#[command(
    name = "sortie",
    version,
    about = "Boot a Scaleway instance, run a command on it over SSH, and clean up",
    override_usage = "sortie [OPTIONS] IMAGE [COMMAND] [ARG...]",
    disable_help_flag = true,
    allow_negative_numbers = true
)]
#[expect(
    clippy::struct_excessive_bools,
    reason = "each boolean is a command-line switch"
)]
pub(crate) struct Cli {
    /// Print usage.
    #[arg(short = 'h', long)]
    pub(crate) help: bool,
    /// Assign a name to the instance.
    #[arg(long, value_name = "NAME")]
    pub(crate) name: Option<String>,
    /// Bootscript identifier.
    #[arg(long, value_name = "ID")]
    pub(crate) bootscript: Option<String>,
    /// Instance tags, space separated.
    #[arg(short = 'e', long, value_name = "TAGS")]
    pub(crate) env: Option<String>,
    /// Additional volume sizes, space separated (e.g. "50G 1T").
    #[arg(short = 'v', long, value_name = "SIZES")]
    pub(crate) volume: Option<String>,
    /// Give up after this many seconds; 0 waits forever.
    #[arg(short = 'T', long, value_name = "SECONDS", default_value_t = 0)]
    pub(crate) timeout: i64,
    /// Public address: "none", "dynamic", or a reserved IP.
    #[arg(long, value_name = "POLICY")]
    pub(crate) ip_address: Option<String>,
    /// Attach to the instance console.
    #[arg(short = 'a', long)]
    pub(crate) attach: bool,
    /// Leave the instance running and print its identifier.
    #[arg(short = 'd', long)]
    pub(crate) detach: bool,
    /// Relay the session through this SSH gateway ([user@]host).
    #[arg(short = 'g', long, value_name = "HOST")]
    pub(crate) gateway: Option<String>,
    /// User-data entries, space separated KEY=VALUE or KEY=@path.
    #[arg(short = 'u', long, value_name = "ENTRIES")]
    pub(crate) userdata: Option<String>,
    /// Instance commercial type.
    #[arg(long, value_name = "TYPE", default_value = "DEV1-S")]
    pub(crate) commercial_type: String,
    /// Boot type: auto, local, or bootscript.
    #[arg(long, value_name = "TYPE", default_value = "auto")]
    pub(crate) boot_type: String,
    /// Remote SSH user.
    #[arg(long = "user", value_name = "USER", default_value = "root")]
    pub(crate) ssh_user: String,
    /// Remove the instance once the run concludes.
    #[arg(long = "rm")]
    pub(crate) auto_remove: bool,
    /// Enable IPv6.
    #[arg(long)]
    pub(crate) ipv6: bool,
    /// Authorise a throwaway SSH key instead of the account keys.
    #[arg(long)]
    pub(crate) tmp_ssh_key: bool,
    /// Stream the boot console, then stop.
    #[arg(long)]
    pub(crate) show_boot: bool,
    /// Remote SSH port.
    #[arg(short = 'p', long = "port", value_name = "PORT", default_value_t = 22)]
    pub(crate) ssh_port: u32,
    /// Do not allocate a pseudo-terminal.
    #[arg(long)]
    pub(crate) no_tty: bool,
    /// Image label or identifier, then the command to run and its arguments.
    #[arg(value_name = "IMAGE", trailing_var_arg = true)]
    pub(crate) args: Vec<String>,
}
