use crate::commands::{run_label, run_score, run_train, LabelArgs, ScoreArgs, TrainArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use piggy_health::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "piggy-health",
    about = "Score household financial health and train the consumption pattern model",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Train the consumption pattern model and write the artifact
    Train(TrainArgs),
    /// Score a single household from the command line
    Score(ScoreArgs),
    /// Attach rule scores, personas and labels to a CSV table
    Label(LabelArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Train(args) => run_train(args),
        Command::Score(args) => run_score(args),
        Command::Label(args) => run_label(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_subcommand_defaults_to_serve() {
        let cli = Cli::try_parse_from(["piggy-health"]).expect("parses");
        assert!(cli.command.is_none());
    }

    #[test]
    fn train_requires_a_data_source() {
        assert!(Cli::try_parse_from(["piggy-health", "train"]).is_err());
        assert!(Cli::try_parse_from([
            "piggy-health",
            "train",
            "--data",
            "households.csv",
            "--synthetic",
            "100",
        ])
        .is_err());

        let cli = Cli::try_parse_from(["piggy-health", "train", "--synthetic", "500"])
            .expect("parses");
        match cli.command {
            Some(Command::Train(args)) => {
                assert_eq!(args.synthetic, Some(500));
                assert_eq!(args.estimators, 400);
                assert!(!args.no_calibration);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn ensemble_accepts_short_names() {
        let cli = Cli::try_parse_from([
            "piggy-health",
            "train",
            "--synthetic",
            "50",
            "--ensemble",
            "rf",
        ])
        .expect("parses");
        match cli.command {
            Some(Command::Train(args)) => {
                assert_eq!(args.ensemble, piggy_health::model::EnsembleKind::RandomForest)
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
