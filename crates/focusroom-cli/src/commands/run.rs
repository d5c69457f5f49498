use clap::Args;
use focusroom_core::notify::{SilentNotifier, TerminalNotifier};
use focusroom_core::storage::{load_or_seed_config, persistence_channel};
use focusroom_core::time::system_time;
use focusroom_core::{
    ActivityTracker, AppConfig, Command, ConfiguredStore, Event, FocusEngine, InputKind,
    NotificationChannel, Permission, PictureInPicture, RuntimeObserver, SessionRuntime,
    TerminalOverlay, XpAward,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::LocalSet;

#[derive(Args)]
pub struct RunArgs {
    /// Task the sessions are recorded against
    #[arg(long)]
    task: Option<String>,
    /// Open the floating overlay right away
    #[arg(long)]
    overlay: bool,
    /// Suppress notifications for this run
    #[arg(long)]
    no_notify: bool,
    /// Auto-start breaks and focus phases for this run
    #[arg(long)]
    auto: bool,
}

/// Map one stdin line to a command.
///
/// `p` start/pause, `s` skip, `y` still here, `o` overlay, `q` quit.
/// `t <task>` records the next sessions against a task; bare `t` clears it.
pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    match line {
        "p" => return Some(Command::Toggle),
        "s" => return Some(Command::Skip),
        "y" => return Some(Command::ConfirmPresence),
        "o" => return Some(Command::ToggleOverlay),
        "q" => return Some(Command::Quit),
        "t" => return Some(Command::SetTask(None)),
        _ => {}
    }
    let task = line.strip_prefix("t ")?.trim();
    Some(Command::SetTask((!task.is_empty()).then(|| task.to_string())))
}

/// Prints every event as one JSON line on stdout.
struct JsonLines;

impl RuntimeObserver for JsonLines {
    fn on_event(&mut self, event: &Event) {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!(error = %e, "failed to encode event"),
        }
    }
}

async fn read_commands(tx: mpsc::UnboundedSender<Command>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                // Any keystroke counts as presence.
                if tx.send(Command::Input(InputKind::KeyPress)).is_err() {
                    break;
                }
                if let Some(command) = parse_command(&line) {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "stdin read failed");
                break;
            }
        }
    }
}

async fn session(args: RunArgs, app: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = ConfiguredStore::open(&app)?;
    let mut config = load_or_seed_config(&store).await;
    if args.auto {
        config.auto_start_breaks = true;
        config.auto_start_pomodoros = true;
    }

    let time = system_time();
    let mut engine = FocusEngine::with_config(config, time.clone(), ActivityTracker::new(time));
    engine.set_inactivity_enabled(app.inactivity.enabled);
    engine.set_task(args.task);

    let (handle, worker) = persistence_channel(store);
    let worker = worker.spawn_thread()?;

    let notifications = if app.notifications.enabled && !args.no_notify {
        NotificationChannel::new(Permission::Granted, Box::new(TerminalNotifier))
    } else {
        NotificationChannel::new(Permission::Denied, Box::new(SilentNotifier))
    };
    let overlay = PictureInPicture::new(
        TerminalOverlay::stderr().with_permission(app.overlay.enabled),
        app.overlay.fps,
    );
    let mut runtime =
        SessionRuntime::new(engine, handle, notifications, overlay, XpAward::from(&app));
    if args.overlay {
        runtime.toggle_overlay();
    }

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::task::spawn_local(read_commands(tx));

    let snapshot = runtime.run(rx, &mut JsonLines).await;
    let stats = tokio::task::spawn_blocking(move || worker.join())
        .await?
        .map_err(|_| "persistence thread panicked")?;
    tracing::info!(applied = stats.applied, failed = stats.failed, "session closed");
    println!("{}", serde_json::to_string(&snapshot)?);
    Ok(())
}

pub fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let app = AppConfig::load()?;
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let local = LocalSet::new();
    let result = local.block_on(&rt, session(args, app));
    // The stdin reader may still be parked on a blocking read.
    rt.shutdown_background();
    result
}
