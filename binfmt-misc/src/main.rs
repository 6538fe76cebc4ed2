use anyhow::{Context, Result};
use binfmt_misc::{list, mount, BinfmtError, BinfmtFs, Dispatcher, FailurePolicy, Settings};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use log::LevelFilter;
use std::path::PathBuf;
use std::process::ExitCode;

/// Manage binfmt_misc interpreter registrations
#[derive(Parser)]
#[command(
    name = "binfmtctl",
    about = "Register, enable, disable and list binfmt_misc interpreters",
    version,
    disable_help_subcommand = true
)]
struct Cli {
    /// Where binfmt_misc is (or will be) mounted
    #[arg(long, env = "BINFMT_ROOT", default_value = binfmt_misc::DEFAULT_MOUNT_POINT, global = true)]
    root: PathBuf,

    /// Directory of definition files
    #[arg(long, env = "BINFMT_CONFIG_DIR", default_value = binfmt_misc::DEFAULT_CONFIG_DIR, global = true)]
    config_dir: PathBuf,

    /// Keep going when an entry fails during unregister-all or reload
    #[arg(long, global = true)]
    keep_going: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// List registered entries
    List {
        /// Print JSON instead of a table
        #[cfg(feature = "serde1")]
        #[arg(long)]
        json: bool,
    },
    /// Register a definition, by name in the config directory or by path
    Register { binfmt: Option<String> },
    /// Remove a registered entry
    Unregister { binfmt: Option<String> },
    /// Remove every registered entry
    UnregisterAll,
    /// Enable a registered entry
    Enable { binfmt: Option<String> },
    /// Disable a registered entry
    Disable { binfmt: Option<String> },
    /// Remove every entry, then register everything in the config directory
    Reload,
    /// Print this help
    Help,
}

impl Command {
    fn is_mutating(&self) -> bool {
        !matches!(self, Command::List { .. } | Command::Help)
    }
}

impl Cli {
    fn settings(&self) -> Settings {
        Settings {
            root: self.root.clone(),
            config_dir: self.config_dir.clone(),
            policy: if self.keep_going {
                FailurePolicy::KeepGoing
            } else {
                FailurePolicy::Abort
            },
        }
    }
}

fn required(arg: Option<String>) -> Result<String, BinfmtError> {
    arg.filter(|a| !a.is_empty())
        .ok_or(BinfmtError::MissingArgument("binfmt"))
}

/// `warn` unless `RUST_LOG` says otherwise; `debug` forces debug output.
fn logger(debug: bool) -> env_logger::Builder {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(LevelFilter::Warn).parse_default_env();
    if debug {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.format_timestamp(None);
    builder
}

fn init_logging() {
    logger(binfmt_misc::debug_enabled()).init();
}

/// Parse outcomes that only print usage and still succeed.
fn usage_only(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::DisplayHelp
            | ErrorKind::DisplayVersion
            | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
            | ErrorKind::InvalidSubcommand
    )
}

fn run(cli: Cli) -> Result<()> {
    let settings = cli.settings();
    let command = match cli.command {
        Some(command) => command,
        None => {
            Cli::command().print_help()?;
            return Ok(());
        }
    };

    if command.is_mutating() {
        mount::prepare(&settings.root).context("cannot modify binfmt_misc")?;
    }

    let store = BinfmtFs::new(&settings.root);
    let mut dispatcher = Dispatcher::new(store, &settings.config_dir).with_policy(settings.policy);

    match command {
        #[cfg(feature = "serde1")]
        Command::List { json: true } => list::list_json(dispatcher.store(), std::io::stdout().lock())?,
        Command::List { .. } => list::list(dispatcher.store(), std::io::stdout().lock())?,
        Command::Register { binfmt } => {
            let binfmt = required(binfmt)?;
            dispatcher
                .register(&binfmt)
                .with_context(|| format!("cannot register {}", binfmt))?;
        }
        Command::Unregister { binfmt } => {
            let binfmt = required(binfmt)?;
            dispatcher
                .unregister(&binfmt)
                .with_context(|| format!("cannot unregister {}", binfmt))?;
        }
        Command::UnregisterAll => dispatcher.unregister_all().context("cannot unregister all entries")?,
        Command::Enable { binfmt } => {
            let binfmt = required(binfmt)?;
            dispatcher
                .enable(&binfmt)
                .with_context(|| format!("cannot enable {}", binfmt))?;
        }
        Command::Disable { binfmt } => {
            let binfmt = required(binfmt)?;
            dispatcher
                .disable(&binfmt)
                .with_context(|| format!("cannot disable {}", binfmt))?;
        }
        Command::Reload => dispatcher.reload().context("cannot reload")?,
        Command::Help => Cli::command().print_help()?,
    }

    Ok(())
}

fn main() -> ExitCode {
    init_logging();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if usage_only(e.kind()) {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            };
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("binfmtctl: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
