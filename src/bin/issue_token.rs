use std::io::{self, Write};

use clap::Parser;

use import_table::auth::{AuthConfig, IMPORT_TABLE_PERMISSION, JwtService};

#[derive(Parser, Debug)]
#[command(
    name = "issue_token",
    about = "Print a signed actor token for the import-table service"
)]
struct Args {
    /// Actor id to put in the token subject (`root` is allowed everything).
    #[arg(long)]
    actor: String,

    /// Permission to grant. Repeat for several; defaults to `import-table`.
    #[arg(long = "permission")]
    permissions: Vec<String>,

    /// Token lifetime in seconds, overriding IMPORT_TABLE_TOKEN_TTL_SECS.
    #[arg(long)]
    ttl_secs: Option<i64>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();
    let actor = args.actor.trim();
    if actor.is_empty() {
        writeln!(io::stderr(), "error: --actor must not be empty")?;
        std::process::exit(1);
    }

    let mut config = AuthConfig::from_env()?;
    if let Some(ttl) = args.ttl_secs {
        if ttl <= 0 {
            writeln!(io::stderr(), "error: --ttl-secs must be positive")?;
            std::process::exit(1);
        }
        config.token_ttl_secs = ttl;
    }

    let permissions = if args.permissions.is_empty() {
        vec![IMPORT_TABLE_PERMISSION.to_string()]
    } else {
        args.permissions
    };

    let jwt = JwtService::from_config(&config)?;
    let signed = jwt.issue_actor_token(actor, &permissions)?;

    log::info!(
        "issued token for '{}' with [{}], expires {}",
        actor,
        permissions.join(", "),
        signed.expires_at
    );
    println!("{}", signed.token);
    Ok(())
}
