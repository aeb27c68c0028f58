use crate::acquire::SnapshotOptions;
use crate::control::PriorityValue;
use crate::error::Result;
use crate::normalize::StartTimeFormat;
use clap::{Args, Parser, Subcommand};

/// procscope - cross-platform process snapshots
///
/// Lists processes through the platform's native tools (`ps` on Unix-like
/// systems, `wmic` on Windows), resolves their parent/child relationships and
/// can stop, kill or re-prioritize them.
#[derive(Parser, Debug)]
#[command(
    name = "procscope",
    version = "0.1.0",
    about = "Cross-platform process snapshots from native tool output",
    long_about = "Takes a snapshot of running processes using ps or wmic, normalizes the\n\
                  reported fields and resolves the process tree. Parents that are no longer\n\
                  running are shown as Unknown."
)]
pub struct Cli {
    /// Skip CPU usage and owner lookups
    #[arg(long, global = true)]
    pub fast: bool,

    /// Only keep processes with exactly this name
    #[arg(short = 'n', long = "name", value_name = "name", global = true)]
    pub name: Option<String>,

    /// chrono pattern for `ps` start times
    #[arg(
        long = "date-format",
        value_name = "pattern",
        env = "PROCSCOPE_DATE_FORMAT",
        global = true
    )]
    pub date_format: Option<String>,

    /// Comma separated localized month names, January first
    #[arg(
        long = "month-names",
        value_name = "names",
        env = "PROCSCOPE_MONTH_NAMES",
        global = true
    )]
    pub month_names: Option<String>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Be verbose about what you're doing
    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        global = true
    )]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// One line per process
    List,
    /// Process tree, one level of `-` per generation
    Tree,
    /// The procscope process itself
    #[command(name = "self")]
    Current,
    /// Processes matching a query
    Find(FindArgs),
    /// Thread count and page faults of one process
    Info { pid: String },
    /// Ask a process to terminate
    Stop { pid: String },
    /// Terminate a process immediately
    Kill { pid: String },
    /// Change a process priority
    Renice {
        pid: String,
        /// Class name (idle, below-normal, normal, above-normal, high, real-time) or raw value
        #[arg(allow_hyphen_values = true)]
        priority: String,
    },
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct FindArgs {
    #[arg(long)]
    pub pid: Option<String>,
    #[arg(long = "process-name")]
    pub process_name: Option<String>,
    #[arg(long)]
    pub user: Option<String>,
    #[arg(long)]
    pub command: Option<String>,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Validate the parsed arguments
    pub fn validate(&self) -> Result<()> {
        self.start_format()?;
        if let Command::Renice { priority, .. } = &self.command {
            priority.parse::<PriorityValue>()?;
        }
        Ok(())
    }

    pub fn verbosity_level(&self) -> u8 {
        self.verbose
    }

    /// Default `tracing` filter for the verbosity level
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }

    pub fn start_format(&self) -> Result<StartTimeFormat> {
        match (&self.date_format, &self.month_names) {
            (None, None) => Ok(StartTimeFormat::default()),
            (Some(pattern), None) => Ok(StartTimeFormat::with_pattern(pattern)),
            (pattern, Some(months)) => {
                let pattern = pattern
                    .clone()
                    .unwrap_or_else(|| StartTimeFormat::default().pattern().to_string());
                StartTimeFormat::custom(pattern, months.split(',').map(str::trim))
            }
        }
    }

    pub fn snapshot_options(&self) -> Result<SnapshotOptions> {
        let mut options = SnapshotOptions::default()
            .fast(self.fast)
            .start_format(self.start_format()?);
        if let Some(name) = &self.name {
            options = options.name_filter(name);
        }
        Ok(options)
    }

    pub fn priority(&self) -> Result<Option<PriorityValue>> {
        match &self.command {
            Command::Renice { priority, .. } => priority.parse().map(Some),
            _ => Ok(None),
        }
    }
}

impl FindArgs {
    pub fn describe(&self) -> String {
        match (&self.pid, &self.process_name, &self.user, &self.command) {
            (Some(pid), ..) => format!("pid {}", pid),
            (_, Some(name), ..) => format!("name {}", name),
            (_, _, Some(user), _) => format!("user {}", user),
            (_, _, _, Some(command)) => format!("command {}", command),
            _ => String::new(),
        }
    }
}
