use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "lifelens")]
#[command(about = "Profile, pacing and care insights from a personal activity journal")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config directory (default: <config_dir>/lifelens)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// SQLite database path, overrides the config file
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// IANA timezone, overrides the config file
    #[arg(long, global = true)]
    pub timezone: Option<String>,

    /// Evaluate as of this RFC 3339 instant instead of now
    #[arg(long, global = true)]
    pub at: Option<DateTime<Utc>>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Import logs and answers from a JSON file ({"logs": [...], "answers": [...]})
    Import {
        file: PathBuf,
    },
    /// Show the psychological profile
    Profile {
        user: String,
    },
    /// Show archetype and behavioral cohort
    Classify {
        user: String,
    },
    /// Rank similar peers
    Matches {
        user: String,
    },
    /// Decide whether a prompt may be shown
    Pacing {
        user: String,
    },
    /// Show energy level, trajectory and unmet needs
    Energy {
        user: String,
    },
    /// Show the most important intervention, if any
    Intervention {
        user: String,
    },
    /// Show XP, level, story arc and achievements
    Narrative {
        user: String,
    },
    /// Everything at once, each section computed independently
    Report {
        user: String,
    },
    /// Publish the user's trait vector to the peer directory
    PublishPeer {
        user: String,
        /// Display name shown to peers (default: the user id)
        #[arg(long)]
        name: Option<String>,
    },
}
