use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "cad-intake")]
#[command(about = "Merges downloaded trade drawings into project coordination folders", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Classify, process and deliver the downloaded files of one project
    Update {
        /// Six digit project number
        #[arg(short, long)]
        project: String,

        /// Create review models of processed drawings
        #[arg(long)]
        preview: bool,

        /// List files with no metadata record
        #[arg(short = 'u', long)]
        show_unknown: bool,

        /// List ignored files
        #[arg(short = 'i', long)]
        show_ignored: bool,
    },
    /// Print configuration values
    PrintConfig,
}

impl Commands {
    pub fn project(&self) -> Option<&str> {
        match self {
            Commands::Update { project, .. } => Some(project.as_str()),
            Commands::PrintConfig => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_flags() {
        let cli = Cli::parse_from(["cad-intake", "update", "-p", "123456", "--preview", "-u"]);
        match cli.command {
            Some(Commands::Update {
                project,
                preview,
                show_unknown,
                show_ignored,
            }) => {
                assert_eq!(project, "123456");
                assert!(preview);
                assert!(show_unknown);
                assert!(!show_ignored);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_project_is_required() {
        assert!(Cli::try_parse_from(["cad-intake", "update"]).is_err());
    }
}
