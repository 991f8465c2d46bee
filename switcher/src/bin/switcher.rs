// switcher: CLI for the settings snapshot switcher
//
// Commands:
//   switcher status
//   switcher list [--json]
//   switcher select <label>
//   switcher select-path <path>
//   switcher export [<path>]
//   switcher export-project
//   switcher project open <file> | close | rename <new-file>
//   switcher watch

use anyhow::{anyhow, bail, Context, Result};
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use snapshot_switcher::{
    config::Config,
    host::{NoDisplay, ProjectHost, SelectionDisplay},
    local::{FileLiveSettings, MarkerProjectHost},
    prefs::JsonPreferences,
    watch::SnapshotWatcher,
    Collaborators, ExportOutcome, Switcher,
};
use std::{
    env,
    path::PathBuf,
    sync::{Arc, OnceLock, Weak},
};
use tracing::info;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

fn print_help() {
    println!(
        r#"switcher - switch between configuration snapshots

USAGE:
    switcher <COMMAND> [OPTIONS]

COMMANDS:
    status                    Show the snapshot directory and current selection
    list                      List snapshots, most recently used first
    select <label>            Apply the snapshot with this label
    select-path <path>        Apply the snapshot at this absolute path
    export [<path>]           Save the live settings as a snapshot
    export-project            Save the live settings as the project's snapshot
    project open <file>       Open a project (descriptor file)
    project close             Close the open project
    project rename <file>     Rename the open project's descriptor file
    watch                     Follow the snapshot directory until interrupted
    help                      Show this help message

OPTIONS:
    --json             Output in JSON format (for list)

ENVIRONMENT:
    SNAPSHOT_SWITCHER_DIR         State directory (default ~/.snapshot-switcher)
    SNAPSHOT_SWITCHER_AUTO_SAVE   Auto-save file; its folder holds the snapshots
    SNAPSHOT_SWITCHER_EXT         Snapshot extension (default settings)
    RUST_LOG                      Log filter

EXAMPLES:
    switcher list --json
    switcher select "Dark (team)"
    switcher export ~/Documents/Settings/Presenting.settings
    switcher project open ~/src/app/App.sln
"#
    );
}

fn init_logging() {
    let filter = EnvFilter::from_default_env().add_directive(
        "snapshot_switcher=info"
            .parse()
            .unwrap_or_else(|_| LevelFilter::INFO.into()),
    );
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Everything a command needs
struct App {
    config: Config,
    switcher: Arc<Switcher>,
    host: Arc<MarkerProjectHost>,
}

impl App {
    fn new(config: Config, display: Arc<dyn SelectionDisplay>) -> Result<Self> {
        config
            .ensure_dirs()
            .with_context(|| format!("Failed to create {}", config.state_dir().display()))?;

        let prefs = JsonPreferences::open(config.preferences_file())
            .context("Failed to load preferences")?;
        let host = Arc::new(MarkerProjectHost::new(config.clone()));
        let switcher = Arc::new(Switcher::new(Collaborators {
            live: Arc::new(FileLiveSettings::new(config.live_settings_file())),
            prefs: Arc::new(prefs),
            host: host.clone(),
            display,
        }));

        switcher
            .configure(Some(&config.auto_save_file), &config.extension)
            .context("Failed to configure snapshot directory")?;
        switcher
            .initialize()
            .context("Failed to load snapshots")?;

        Ok(Self {
            config,
            switcher,
            host,
        })
    }
}

fn absolute(path: &str) -> Result<PathBuf> {
    let path = PathBuf::from(path);
    if path.is_absolute() {
        return Ok(path);
    }
    Ok(env::current_dir()
        .context("Failed to read current directory")?
        .join(path))
}

fn print_selection(switcher: &Switcher) {
    match switcher.selected_label() {
        Some(label) => println!("Selected: {}", label),
        None => println!("Selected: (none)"),
    }
}

fn main() -> Result<()> {
    init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    let command = args[1].as_str();
    let json_output = args.iter().any(|a| a == "--json");
    let positional: Vec<&str> = args[2..]
        .iter()
        .map(String::as_str)
        .filter(|a| !a.starts_with("--"))
        .collect();

    if matches!(command, "help" | "--help" | "-h") {
        print_help();
        return Ok(());
    }
    if command == "watch" {
        return watch(Config::from_env());
    }

    let app = App::new(Config::from_env(), Arc::new(NoDisplay))?;
    let switcher = &app.switcher;

    match command {
        "status" => {
            if let Some(layout) = switcher.layout() {
                println!("Snapshots: {}", layout.settings_dir.display());
            }
            println!("Live file: {}", app.config.live_settings_file().display());
            match app.host.current_project_file() {
                Some(project) => println!("Project:   {}", project.display()),
                None => println!("Project:   (none)"),
            }
            print_selection(switcher);
        }

        "list" => {
            let snapshots = switcher.snapshots();
            if json_output {
                println!("{}", serde_json::to_string_pretty(&snapshots)?);
            } else if snapshots.is_empty() {
                println!("No snapshots");
            } else {
                for info in snapshots {
                    let marker = if info.selected { "*" } else { " " };
                    println!("{} {:<32} {}", marker, info.label, info.path.display());
                }
            }
        }

        "select" => {
            let label = positional
                .first()
                .ok_or_else(|| anyhow!("Usage: switcher select <label>"))?;
            if !switcher.select_label(label)? {
                bail!("No snapshot labelled '{}'", label);
            }
            print_selection(switcher);
        }

        "select-path" => {
            let path = positional
                .first()
                .ok_or_else(|| anyhow!("Usage: switcher select-path <path>"))?;
            let path = absolute(path)?;
            if !switcher.select_path(&path)? {
                bail!("No snapshot at {}", path.display());
            }
            print_selection(switcher);
        }

        "export" => {
            let target = positional.first().map(|p| absolute(p)).transpose()?;
            match switcher.export_current(target.as_deref())? {
                ExportOutcome::Exported(path) => println!("Exported to {}", path.display()),
                ExportOutcome::TargetRequired => bail!("Usage: switcher export <path>"),
                ExportOutcome::Unconfigured => bail!("No snapshot directory configured"),
            }
        }

        "export-project" => match switcher.export_project()? {
            Some(path) => println!("Exported to {}", path.display()),
            None => bail!("No project is open"),
        },

        "project" => project_command(&app, &positional)?,

        other => {
            eprintln!("Unknown command: {}", other);
            print_help();
            std::process::exit(1);
        }
    }

    Ok(())
}

fn project_command(app: &App, positional: &[&str]) -> Result<()> {
    let switcher = &app.switcher;

    match positional {
        ["open", file] => {
            let file = absolute(file)?;
            if app.host.current_project_file().is_some() {
                switcher.project_closing()?;
            }
            app.host
                .open(&file)
                .context("Failed to record open project")?;
            switcher.project_opened()?;
            println!("Opened {}", file.display());
            print_selection(switcher);
        }
        ["close"] => {
            if app.host.current_project_file().is_none() {
                bail!("No project is open");
            }
            switcher.project_closing()?;
            app.host.close().context("Failed to clear open project")?;
            print_selection(switcher);
        }
        ["rename", new_file] => {
            let old = app
                .host
                .current_project_file()
                .ok_or_else(|| anyhow!("No project is open"))?;
            let new_file = absolute(new_file)?;
            app.host
                .open(&new_file)
                .context("Failed to record renamed project")?;
            switcher.project_renamed(&old)?;
            println!("Renamed {} to {}", old.display(), new_file.display());
        }
        _ => bail!("Usage: switcher project open <file> | close | rename <file>"),
    }
    Ok(())
}

/// Follow the snapshot directory until SIGINT/SIGTERM, then shut down
fn watch(config: Config) -> Result<()> {
    let slot: Arc<OnceLock<Weak<Switcher>>> = Arc::new(OnceLock::new());
    let display_slot = Arc::clone(&slot);
    let display = move || {
        if let Some(switcher) = display_slot.get().and_then(Weak::upgrade) {
            println!("--");
            print_labels(&switcher);
        }
    };

    let app = App::new(config, Arc::new(display))?;
    let _ = slot.set(Arc::downgrade(&app.switcher));

    let watcher = Arc::new(
        SnapshotWatcher::start(&app.switcher).context("Failed to watch snapshot directory")?,
    );
    app.switcher.attach_change_source(watcher.clone());
    info!(root = %watcher.root().display(), "Watching, press Ctrl-C to stop");
    print_labels(&app.switcher);

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("Failed to install signal handlers")?;
    if let Some(signal) = signals.forever().next() {
        info!(signal, "Stopping");
    }

    app.switcher.begin_shutdown()?;
    Ok(())
}

fn print_labels(switcher: &Switcher) {
    let selected = switcher.selected_label();
    for label in switcher.display_labels() {
        let marker = if Some(&label) == selected.as_ref() { "*" } else { " " };
        println!("{} {}", marker, label);
    }
}
