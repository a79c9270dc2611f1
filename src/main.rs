use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Context;
use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use inotify_notifier::{Event, Notification, Notifier, Settings, logging};

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

#[derive(Parser)]
#[command(name = "inotify-notifier")]
#[command(version, about = "Watch files and directories for filesystem events")]
#[command(styles = clap_cargo_style())]
struct Cli {
    /// Path to a settings.toml (defaults to the nearest .notifier/settings.toml)
    #[arg(short, long, global = true, env = "NOTIFIER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch paths and print one line per event
    Watch {
        /// Files or directories to watch
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Also watch every directory beneath each path
        #[arg(short, long)]
        recursive: bool,

        /// Event kinds to print, e.g. open,modify (default: all)
        #[arg(short, long, value_delimiter = ',')]
        events: Vec<Event>,

        /// Paths whose events are never printed
        #[arg(short, long)]
        ignore: Vec<PathBuf>,

        /// Exit after this many events
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },

    /// Show the effective configuration
    Config,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .context("failed to load configuration")?;

    logging::init_with_config(&settings.logging);

    match cli.command {
        Commands::Config => {
            let rendered = toml::to_string_pretty(&settings)?;
            print!("{rendered}");
            Ok(())
        }
        Commands::Watch {
            paths,
            recursive,
            events,
            ignore,
            count,
        } => watch(&settings, paths, recursive, events, ignore, count),
    }
}

fn watch(
    settings: &Settings,
    paths: Vec<PathBuf>,
    recursive: bool,
    events: Vec<Event>,
    ignore: Vec<PathBuf>,
    count: Option<usize>,
) -> anyhow::Result<()> {
    let mut notifier = Notifier::with_settings(settings).context("failed to start inotify")?;

    for path in &paths {
        notifier = if recursive {
            notifier.watch_path_recursively(path)
        } else {
            notifier.watch_file(path)
        }
        .with_context(|| format!("cannot watch {}", path.display()))?;
    }
    for path in &ignore {
        notifier = notifier.ignore_file(path);
    }

    let stop = notifier.stop_handle();
    let seen = Arc::new(AtomicUsize::new(0));
    let print = move |notification: Notification| {
        let kind = if notification.is_dir { "dir" } else { "file" };
        println!(
            "{} {} {kind} {}",
            notification.time.format("%H:%M:%S%.3f"),
            notification.event,
            notification.path.display()
        );

        let printed = seen.fetch_add(1, Ordering::SeqCst) + 1;
        if count.is_some_and(|limit| printed >= limit) {
            stop.stop();
        }
    };

    notifier = if events.is_empty() {
        notifier.on_unexpected_event(print)
    } else {
        notifier.on_events(events, print)
    };

    notifier.run()?;
    Ok(())
}
