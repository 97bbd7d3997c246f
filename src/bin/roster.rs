use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use roster_rbac::{
    EngineConfig, OrgId, PersonId, PrivLevel, RbacError, RoleGraph, access, closure, recalculate,
    schema,
};
use sea_orm::{Database, DatabaseConnection};
use std::fmt::Display;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, prelude::*};

#[derive(Parser, Debug)]
#[command(version, about = "Maintain the roster role tables")]
struct Cli {
    #[arg(global = true, short, long, help = "Show debug messages")]
    verbose: bool,

    #[arg(
        global = true,
        short = 'u',
        long,
        env = "DATABASE_URL",
        help = "Database URL, overrides the one in the config file"
    )]
    database_url: Option<String>,

    #[arg(global = true, short, long, help = "Config file, default: ./roster.toml")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Create the role engine tables")]
    Init,
    #[command(about = "Recalculate implicit roles, privilege levels and list rights")]
    Recalc,
    #[command(about = "Check a person's privilege level on an org")]
    Check {
        #[arg(long)]
        person: i32,
        #[arg(long)]
        org: i32,
        #[arg(
            long,
            default_value = "member",
            help = "none, student, member, contributor, leader or master"
        )]
        level: PrivLevel,
    },
    #[command(about = "Report the first cycle among role implications or team parents")]
    Cycles,
}

#[tokio::main]
async fn main() {
    dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);
    run(cli).await.unwrap_or_else(handle_error);
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "roster_rbac=debug"
    } else {
        "roster_rbac=info"
    };
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
    let _ = tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .try_init();
}

async fn run(cli: Cli) -> Result<(), RbacError> {
    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::load()?,
    };
    let db = connect(cli.database_url, &config).await?;

    match cli.command {
        Commands::Init => {
            schema::create_tables(&db).await?;
            println!("created {}", schema::all_tables().join(", "));
        }
        Commands::Recalc => {
            let report = recalculate(&db, &config).await?;
            println!("{report}");
            for (list, roles) in &report.warn_on_unsub {
                let roles: Vec<String> = roles.iter().map(ToString::to_string).collect();
                println!("{list}: warn before removing {}", roles.join(", "));
            }
        }
        Commands::Check { person, org, level } => {
            let (person, org) = (PersonId(person), OrgId(org));
            let held = access::privilege_level(&db, person, org).await?;
            let granted = access::has_privilege(&db, person, org, level).await?;
            println!(
                "{person} holds {held} on {org}: {}",
                if granted { "granted" } else { "denied" }
            );
            if !granted {
                std::process::exit(2);
            }
        }
        Commands::Cycles => {
            let graph = RoleGraph::load(&db).await?;
            let mut found = false;
            if let Some(path) = closure::find_cycle(graph.implication_edges()) {
                println!("{}", RbacError::RoleCycle(path));
                found = true;
            }
            if let Some(path) = closure::find_cycle(&graph.team_edges()) {
                println!("{}", RbacError::TeamCycle(path));
                found = true;
            }
            if !found {
                println!("no cycles");
            }
        }
    }
    Ok(())
}

async fn connect(
    url: Option<String>,
    config: &EngineConfig,
) -> Result<DatabaseConnection, RbacError> {
    let url = match url {
        Some(url) => url,
        None => config.database_url()?.ok_or_else(|| {
            RbacError::Config(
                "no database url: pass --database-url or set it in roster.toml".into(),
            )
        })?,
    };
    Ok(Database::connect(url).await?)
}

fn handle_error<E>(error: E)
where
    E: Display,
{
    eprintln!("{error}");
    ::std::process::exit(1);
}
