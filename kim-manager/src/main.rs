use std::path::PathBuf;

use clap::{Parser, Subcommand};
use kim_authz::Decision;
use kim_manager::commands::check::{self, CheckOptions};
use kim_manager::commands::run::{self, RunOptions};
use kim_manager::commands::schema::{self, SchemaKind};
use kim_manager::commands::{subject, CommandResult};

#[derive(Parser)]
#[command(name = "kim", version, about = "kim - identity and access control plane")]
struct Cli {
    /// Directory holding kim.yaml and kim-{profile}.yaml
    #[arg(long, global = true, default_value = ".")]
    config_dir: PathBuf,
    /// Configuration profile (KIM_PROFILE takes precedence)
    #[arg(long, global = true, default_value = "dev")]
    profile: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the Policy and Role controllers and the storage adapter
    Run {
        /// Manifest file or directory loaded into the store at startup
        #[arg(long)]
        manifests: Option<PathBuf>,
    },
    /// Convert subject identifiers
    Subject {
        #[command(subcommand)]
        action: SubjectCommand,
    },
    /// Evaluate one request against a manifest bundle; exits 2 on deny
    Check {
        #[arg(long)]
        manifests: PathBuf,
        /// name/namespace or hex subject identifier
        #[arg(long)]
        subject: String,
        #[arg(long)]
        resource: String,
        #[arg(long)]
        action: String,
    },
    /// Print the argon2 hash to store under a Secret's password-hash key
    HashPassword { password: String },
    /// Print the JSON schema of a resource kind
    Schema {
        #[arg(value_enum)]
        kind: SchemaKind,
    },
}

#[derive(Subcommand)]
enum SubjectCommand {
    /// name + namespace -> hex identifier
    Encode { name: String, namespace: String },
    /// hex identifier -> name/namespace
    Decode { id: String },
}

async fn dispatch(cli: Cli) -> CommandResult<i32> {
    match cli.command {
        Commands::Run { manifests } => {
            run::run(RunOptions {
                config_dir: cli.config_dir,
                profile: cli.profile,
                manifests,
            })
            .await?;
        }
        Commands::Subject { action } => match action {
            SubjectCommand::Encode { name, namespace } => {
                println!("{}", subject::encode(&name, &namespace))
            }
            SubjectCommand::Decode { id } => println!("{}", subject::decode(&id)?),
        },
        Commands::Check {
            manifests,
            subject,
            resource,
            action,
        } => {
            let decision = check::run(CheckOptions {
                manifests,
                subject,
                resource,
                action,
            })
            .await?;
            if decision == Decision::Deny {
                return Ok(2);
            }
        }
        Commands::HashPassword { password } => {
            println!("{}", kim_oidc::hash_password(&password)?)
        }
        Commands::Schema { kind } => println!("{}", schema::render(kind)?),
    }
    Ok(0)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    match dispatch(cli).await {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{}", colored::Colorize::red(format!("Error: {e}").as_str()));
            std::process::exit(1);
        }
    }
}
