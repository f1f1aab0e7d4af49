use rss_util::commands;
use rss_util::error::{AppError, Result};
use rss_util::models::{FeedStatus, MirrorMode};
use rss_util::{App, Config};

const USAGE: &str = "\
Usage: rss-util [OPTIONS]

Options:
  --refresh                 Fetch every feed and store new articles
  --sync                    Run a mirror sync pass now
  --flags                   Print feature flags
  --enable <flag>           Turn a feature flag on
  --disable <flag>          Turn a feature flag off
  --mirror-dir <path>       Set the mirror directory (empty string clears it)
  --mirror-mode <mode>      Mirror output: raw | markdown
  --set-api-key <key>       Store the API key encrypted (empty string clears it)
  --help                    Show this message

Without options, prints a short status.";

enum Action {
    Refresh,
    Sync,
    Flags,
    SetFlag(String, bool),
    MirrorDir(String),
    MirrorMode(MirrorMode),
    SetApiKey(String),
}

fn parse_args(args: &[String]) -> Result<Vec<Action>> {
    let mut actions = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value = || {
            iter.next()
                .cloned()
                .ok_or_else(|| AppError::Config(format!("{} requires a value", arg)))
        };
        let action = match arg.as_str() {
            "--refresh" => Action::Refresh,
            "--sync" => Action::Sync,
            "--flags" => Action::Flags,
            "--enable" => Action::SetFlag(value()?, true),
            "--disable" => Action::SetFlag(value()?, false),
            "--mirror-dir" => Action::MirrorDir(value()?),
            "--mirror-mode" => match value()?.as_str() {
                "raw" => Action::MirrorMode(MirrorMode::Raw),
                "markdown" | "md" => Action::MirrorMode(MirrorMode::Markdown),
                other => {
                    return Err(AppError::Config(format!("unknown mirror mode: {}", other)));
                }
            },
            "--set-api-key" => Action::SetApiKey(value()?),
            other => return Err(AppError::Config(format!("unknown option: {}", other))),
        };
        actions.push(action);
    }
    Ok(actions)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (only show warnings and errors by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("{}", USAGE);
        return Ok(());
    }
    let actions = match parse_args(&args) {
        Ok(actions) => actions,
        Err(e) => {
            eprintln!("Error: {}\n\n{}", e, USAGE);
            std::process::exit(2);
        }
    };

    // Load configuration
    let config = Config::load()?;
    let app = App::new(&config).await?;

    let result = if actions.is_empty() {
        print_status(&app).await
    } else {
        run_actions(&app, actions).await
    };

    // Let the mirror worker finish whatever the actions triggered
    app.shutdown().await;
    result
}

async fn run_actions(app: &App, actions: Vec<Action>) -> Result<()> {
    for action in actions {
        match action {
            Action::Refresh => {
                let summary = app.refresh_feeds().await?;
                println!(
                    "Refreshed {} feeds ({} failed)",
                    summary.refreshed, summary.failed
                );
            }
            Action::Sync => {
                let response = commands::sync_to_mirror(app).await;
                match (response.data, response.error) {
                    (Some(result), _) if result.skipped => println!(
                        "Mirror sync skipped: {}",
                        result.reason.unwrap_or_default()
                    ),
                    (Some(result), _) => println!(
                        "Mirror synced: {} written, {} failed, {} removed",
                        result.written, result.failed, result.removed
                    ),
                    (None, error) => {
                        return Err(AppError::Mirror(error.unwrap_or_default()));
                    }
                }
            }
            Action::Flags => {
                for (name, enabled) in app.store().feature_flags().await? {
                    println!("{:<20} {}", name, if enabled { "on" } else { "off" });
                }
            }
            Action::SetFlag(flag, enabled) => {
                app.store().set_feature_flag(&flag, enabled).await?;
                println!("{} {}", flag, if enabled { "enabled" } else { "disabled" });
            }
            Action::MirrorDir(dir) => {
                app.store()
                    .update_settings(|settings| {
                        settings.set_mirror_directory(Some(&dir));
                        Ok(())
                    })
                    .await?;
                if dir.trim().is_empty() {
                    println!("Mirror directory cleared");
                } else {
                    println!("Mirror directory set to {}", dir.trim());
                }
            }
            Action::MirrorMode(mode) => {
                app.store()
                    .update_settings(|settings| {
                        settings.set_mirror_mode(mode);
                        Ok(())
                    })
                    .await?;
                println!("Mirror mode set to {:?}", mode);
            }
            Action::SetApiKey(key) => {
                app.set_api_key(&key).await?;
                if key.is_empty() {
                    println!("API key cleared");
                } else {
                    println!("API key stored");
                }
            }
        }
    }
    Ok(())
}

async fn print_status(app: &App) -> Result<()> {
    let store = app.store();
    let feeds = store.read_feeds().await?;
    let settings = store.read_settings().await?;
    let failing = feeds.iter().filter(|f| f.status == FeedStatus::Error).count();

    println!("Data directory: {}", store.root().display());
    println!("Schema version: {}", app.migration_report().to);
    println!("Feeds: {} ({} failing)", feeds.len(), failing);
    println!(
        "Mirror: {} ({:?})",
        settings.mirror_directory().as_deref().unwrap_or("not configured"),
        settings.mirror_mode()
    );
    println!(
        "API key: {}",
        if app.api_key().await?.is_some() { "configured" } else { "not configured" }
    );
    Ok(())
}
