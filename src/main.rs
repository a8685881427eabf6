use clap::Parser;
use color_eyre::Result;
use duetask::cli::{self, Cli, Commands, ListArgs};
use duetask::{Config, Database, LogScheduler, Profile, Session, TaskPlanner, utils};
use std::path::Path;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Set up error reporting with color-eyre
    color_eyre::install()?;

    let cli = Cli::parse();

    // Determine profile: --dev flag enables dev mode, otherwise use prod
    let profile = if cli.dev { Profile::Dev } else { Profile::Prod };

    let config = match cli.config {
        Some(ref path) => Config::load_from(Path::new(path))?,
        None => Config::load_with_profile(profile)?,
    };

    // Logs go to stderr so command output stays clean; RUST_LOG wins over config
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    let db_path = match cli.db {
        Some(ref path) => utils::expand_path(path),
        None => config.get_database_path(),
    };
    let db = Database::new(
        db_path
            .to_str()
            .ok_or_else(|| color_eyre::eyre::eyre!("Database path contains invalid UTF-8"))?,
    )?;

    let session = Session::new(cli.user.clone().unwrap_or_else(|| config.user.clone()));
    let mut planner = TaskPlanner::new(db, LogScheduler::new(), config.reschedule_policy());
    let now = utils::local_now();

    tracing::debug!(user = %session.user_id, db = %db_path.display(), "starting");

    match cli.command.unwrap_or(Commands::List(ListArgs::default())) {
        Commands::Add {
            category,
            name,
            date,
            time,
            remind,
        } => {
            cli::handle_add(
                &mut planner,
                &session,
                category,
                name,
                date,
                time,
                remind,
                &config.default_lead_times_days,
                now,
            )?;
        }
        Commands::Edit {
            id,
            category,
            name,
            date,
            time,
        } => {
            cli::handle_edit(&mut planner, &session, id, category, name, date, time, now)?;
        }
        Commands::Delete { id } => {
            cli::handle_delete(&mut planner, &session, id)?;
        }
        Commands::Show { id, json } => {
            cli::handle_show(&planner, &session, id, json)?;
        }
        Commands::List(args) => {
            cli::handle_list(&planner, &session, args)?;
        }
        Commands::Upcoming { days, json } => {
            cli::handle_upcoming(&planner, &session, days, json, now)?;
        }
    }

    Ok(())
}
