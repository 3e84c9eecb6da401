use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rv")]
#[command(about = "Browse and search reduction runs", long_about = None)]
#[command(version)]
pub struct Cli {
    /// SQLite database to use instead of the configured one
    #[arg(long, global = true, env = "RV_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Address to bind (defaults to the configured host)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (defaults to the configured port)
        #[arg(long)]
        port: Option<u16>,

        /// Refuse every request that changes data
        #[arg(long)]
        read_only: bool,
    },

    /// Browse an instrument's runs
    #[command(subcommand)]
    Runs(RunsCommands),

    /// Search runs by number, instrument, description, date or status
    Search(SearchArgs),

    /// Failed-run queue
    #[command(subcommand)]
    Failed(FailedCommands),

    /// Instrument management
    #[command(subcommand)]
    Instruments(InstrumentCommands),

    /// Configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
pub enum RunsCommands {
    /// List an instrument's runs, newest first
    List {
        /// Instrument name
        instrument: String,

        /// Sort order: run or date
        #[arg(long, default_value = "run")]
        sort: String,

        /// Grouping: run, experiment or batch_runs
        #[arg(long, default_value = "run")]
        filter: String,

        /// Page number (out-of-range values are clamped)
        #[arg(long)]
        page: Option<String>,

        /// Runs per page: 10, 25, 50, 100, 250, 500 or all
        #[arg(long)]
        per_page: Option<String>,
    },

    /// Show one version of a run
    Show {
        /// Instrument name
        instrument: String,

        /// Run number
        run_number: u64,

        /// Run version (defaults to 0)
        #[arg(long)]
        version: Option<u32>,

        /// Show data locations as Windows paths
        #[arg(long)]
        windows: bool,
    },
}

#[derive(Args)]
pub struct SearchArgs {
    /// Run numbers, e.g. 60180-60190 or 60180,60185
    #[arg(long)]
    pub run_number: Option<String>,

    /// Instrument name
    #[arg(long)]
    pub instrument: Option<String>,

    /// Text to look for in the run description
    #[arg(long)]
    pub description: Option<String>,

    /// Match the description exactly instead of as a substring
    #[arg(long)]
    pub exact: bool,

    /// Status: queued, processing, completed, skipped or error
    #[arg(long)]
    pub status: Option<String>,

    /// Earliest creation date, YYYY-MM-DD
    #[arg(long)]
    pub from: Option<String>,

    /// Latest creation date, YYYY-MM-DD
    #[arg(long)]
    pub to: Option<String>,

    /// Search experiments by reference number instead of runs
    #[arg(
        long,
        conflicts_with_all = ["run_number", "instrument", "description", "status", "from", "to"]
    )]
    pub experiment: Option<String>,

    #[arg(long)]
    pub page: Option<String>,

    #[arg(long)]
    pub per_page: Option<String>,
}

#[derive(Subcommand)]
pub enum FailedCommands {
    /// List failed runs that are not hidden
    List {
        #[arg(long)]
        page: Option<String>,

        #[arg(long)]
        per_page: Option<String>,
    },

    /// Hide a failed run from the queue
    Hide {
        /// Instrument name
        instrument: String,

        /// Run number
        run_number: u64,

        /// Run version
        version: u32,
    },
}

#[derive(Subcommand)]
pub enum InstrumentCommands {
    /// List all instruments
    List,

    /// Mark instruments active when they have a reduction script
    Sync,

    /// Pause an instrument
    Pause {
        /// Instrument name
        name: String,
    },

    /// Resume a paused instrument
    Resume {
        /// Instrument name
        name: String,
    },

    /// Show current and upcoming run variables
    Variables {
        /// Instrument name
        name: String,
    },

    /// Show the default variables from reduce_vars.json
    Defaults {
        /// Instrument name
        name: String,
    },

    /// Delete stored run variables by start-run range or experiment
    DeleteVariables {
        /// Instrument name
        name: String,

        /// First start run to delete
        #[arg(long, default_value_t = 0)]
        start: u64,

        /// Last start run to delete (0 deletes everything from --start on)
        #[arg(long, default_value_t = 0)]
        end: u64,

        /// Delete the variables of this experiment instead of a run range
        #[arg(long, conflicts_with_all = ["start", "end"])]
        experiment: Option<u64>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the config file location
    Path,

    /// Print the effective configuration
    Show,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_runs_list() {
        let cli = Cli::try_parse_from([
            "rv", "runs", "list", "MARI", "--sort", "date", "--per-page", "25",
        ])
        .unwrap();
        match cli.command {
            Commands::Runs(RunsCommands::List {
                instrument,
                sort,
                filter,
                per_page,
                ..
            }) => {
                assert_eq!(instrument, "MARI");
                assert_eq!(sort, "date");
                assert_eq!(filter, "run");
                assert_eq!(per_page.as_deref(), Some("25"));
            }
            _ => panic!("expected runs list"),
        }
    }

    #[test]
    fn test_global_db_flag() {
        let cli = Cli::try_parse_from([
            "rv", "failed", "hide", "MARI", "60200", "1", "--db", "/tmp/rv.db",
        ])
        .unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/rv.db")));
        match cli.command {
            Commands::Failed(FailedCommands::Hide {
                instrument,
                run_number,
                version,
            }) => {
                assert_eq!(instrument, "MARI");
                assert_eq!(run_number, 60200);
                assert_eq!(version, 1);
            }
            _ => panic!("expected failed hide"),
        }
    }

    #[test]
    fn test_parse_delete_variables() {
        let cli = Cli::try_parse_from([
            "rv", "instruments", "delete-variables", "MARI", "--start", "200",
        ])
        .unwrap();
        match cli.command {
            Commands::Instruments(InstrumentCommands::DeleteVariables {
                name,
                start,
                end,
                experiment,
            }) => {
                assert_eq!(name, "MARI");
                assert_eq!((start, end), (200, 0));
                assert!(experiment.is_none());
            }
            _ => panic!("expected instruments delete-variables"),
        }

        assert!(
            Cli::try_parse_from([
                "rv", "instruments", "delete-variables", "MARI", "--experiment", "1", "--end", "5",
            ])
            .is_err()
        );
    }

    #[test]
    fn test_experiment_search_conflicts_with_run_filters() {
        assert!(
            Cli::try_parse_from(["rv", "search", "--experiment", "123", "--instrument", "MARI"])
                .is_err()
        );
        assert!(Cli::try_parse_from(["rv", "search", "--experiment", "123"]).is_ok());
    }
}
