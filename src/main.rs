//! Alarm Clock CLI
//!
//! Manage alarms from the terminal and run the alarm service:
//! - alarms are stored in a JSON state file
//! - `run` checks them every second and plays a synthesized sound
//! - ringing alarms are snoozed or stopped from the keyboard

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{CommandFactory, Parser};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use alarm_clock::alarm::{next_occurrence, AlarmOptions, AlarmPatch, AlarmTriggerEngine};
use alarm_clock::audio::{find_sound, AudioConfig, AudioEngine, AudioError, DEFAULT_SOUND, SOUNDS};
use alarm_clock::cli::{AddArgs, Cli, Commands, Display, EditArgs, SettingsArgs};
use alarm_clock::clock::{Clock, SystemClock};
use alarm_clock::config::AppConfig;
use alarm_clock::notification::{ConsoleNotifier, NotificationBridge};
use alarm_clock::service::AlarmService;
use alarm_clock::store::{AlarmStore, StoredState};

/// Main entry point
#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    init_tracing(cli.verbose);

    // Execute command
    if let Err(e) = execute(cli).await {
        Display::show_error(&e);
        std::process::exit(1);
    }
}

/// Initializes the tracing subscriber for logging.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

/// Executes the CLI command.
async fn execute(cli: Cli) -> Result<()> {
    let Some(command) = cli.command else {
        // No command provided, show help
        Cli::command().print_help()?;
        return Ok(());
    };

    match command {
        Commands::Completions { shell } => {
            generate_completions(shell);
            Ok(())
        }
        Commands::Sounds => {
            let default_sound = AlarmStore::open(cli.store)
                .and_then(|store| store.load())
                .map(|state| state.settings.default_sound)
                .unwrap_or_else(|_| DEFAULT_SOUND.to_string());
            Display::show_sounds(&SOUNDS, &default_sound);
            Ok(())
        }
        Commands::TestSound {
            sound,
            duration,
            volume,
        } => {
            let config = load_config(cli.config.as_deref())?;
            preview(&config, &sound, duration, volume).await
        }
        command => {
            let config = load_config(cli.config.as_deref())?;
            let store = AlarmStore::open(cli.store)?;
            debug!(path = %store.path().display(), "Using state file");
            if matches!(command, Commands::Run) {
                run(&store, &config).await
            } else {
                manage(&store, &config, command)
            }
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => Ok(AppConfig::load(path)?),
        None => Ok(AppConfig::default()),
    }
}

// ============================================================================
// Alarm management
// ============================================================================

/// Loads the state file into an engine.
///
/// Returns the engine and the number of expired alarms dropped on load.
fn load_engine(
    store: &AlarmStore,
    config: &AppConfig,
    clock: Arc<dyn Clock>,
) -> Result<(AlarmTriggerEngine, usize)> {
    let exists = store.path().exists();
    let state = store.load()?;
    let settings = if exists {
        state.settings
    } else {
        config.alarms.clone()
    };

    let loaded = state.alarms.len();
    let mut engine = AlarmTriggerEngine::new(settings, clock);
    engine.restore(state.alarms);
    let expired = loaded - engine.alarms().len();
    Ok((engine, expired))
}

fn save_engine(store: &AlarmStore, engine: &AlarmTriggerEngine) -> Result<()> {
    let state = StoredState::new(engine.alarms().to_vec(), engine.settings().clone());
    store.save(&state)?;
    Ok(())
}

fn resolve(engine: &AlarmTriggerEngine, prefix: &str) -> Result<Uuid> {
    engine.resolve_id(prefix).ok_or_else(|| {
        anyhow!(
            "no single alarm matches '{}' (run `alarm-clock list` for ids)",
            prefix
        )
    })
}

/// Runs a command that reads or edits the state file.
fn manage(store: &AlarmStore, config: &AppConfig, command: Commands) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let now = clock.now();
    let (mut engine, expired) = load_engine(store, config, clock)?;

    let changed = match command {
        Commands::Add(args) => {
            let id = add(&mut engine, args)?;
            if let Some(alarm) = engine.get(id) {
                Display::show_added(alarm, now);
            }
            true
        }
        Commands::Quick { minutes } => {
            let id = engine.add_quick_alarm(minutes)?;
            if let Some(alarm) = engine.get(id) {
                Display::show_added(alarm, now);
            }
            true
        }
        Commands::Preset { time: None, .. } => {
            Display::show_presets();
            false
        }
        Commands::Preset {
            time: Some((hour, minute)),
            label,
        } => {
            let id = engine.add_preset_alarm(hour, minute, label.unwrap_or_default())?;
            if let Some(alarm) = engine.get(id) {
                Display::show_added(alarm, now);
            }
            true
        }
        Commands::List { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(engine.alarms())?);
            } else {
                Display::show_alarm_list(engine.alarms(), now);
            }
            false
        }
        Commands::Edit(args) => {
            let id = edit(&mut engine, args)?;
            if let Some(alarm) = engine.get(id) {
                Display::show_edited(alarm, now);
            }
            true
        }
        Commands::Remove { id } => {
            let id = resolve(&engine, &id)?;
            if let Some(alarm) = engine.get(id).cloned() {
                engine.remove_alarm(id);
                Display::show_removed(&alarm);
            }
            true
        }
        Commands::Toggle { id } => {
            let id = resolve(&engine, &id)?;
            engine.toggle_alarm(id);
            if let Some(alarm) = engine.get(id) {
                Display::show_toggled(alarm);
            }
            true
        }
        Commands::Duplicate { id } => {
            let id = resolve(&engine, &id)?;
            let copy = engine
                .duplicate(id)
                .context("failed to duplicate alarm")?;
            if let Some(alarm) = engine.get(copy) {
                Display::show_added(alarm, now);
            }
            true
        }
        Commands::ClearExpired => {
            Display::show_cleared(expired + engine.clear_expired());
            true
        }
        Commands::Settings(args) => {
            let changed = !args.is_empty();
            apply_settings(&mut engine, args)?;
            Display::show_settings(engine.settings());
            changed
        }
        Commands::Run
        | Commands::Sounds
        | Commands::TestSound { .. }
        | Commands::Completions { .. } => {
            bail!("command does not operate on the state file")
        }
    };

    if changed {
        save_engine(store, &engine)?;
    }
    Ok(())
}

fn add(engine: &mut AlarmTriggerEngine, args: AddArgs) -> Result<Uuid> {
    let (hour, minute) = args.time;
    let options = AlarmOptions {
        sound: args.sound,
        volume: args.volume,
        is_active: Some(!args.inactive),
        ..AlarmOptions::default()
    };
    Ok(engine.add_alarm_at(hour, minute, args.label.unwrap_or_default(), options)?)
}

fn edit(engine: &mut AlarmTriggerEngine, args: EditArgs) -> Result<Uuid> {
    if args.is_empty() {
        bail!("nothing to change (pass --time, --label, --sound or --volume)");
    }
    let id = resolve(engine, &args.id)?;
    let now = SystemClock::new().now();
    let time = args
        .time
        .map(|(hour, minute)| next_occurrence(now, hour, minute))
        .transpose()?;

    let patch = AlarmPatch {
        time,
        sound: args.sound,
        volume: args.volume,
        label: args.label,
        ..AlarmPatch::default()
    };
    engine.edit_alarm(id, patch)?;
    Ok(id)
}

fn apply_settings(engine: &mut AlarmTriggerEngine, args: SettingsArgs) -> Result<()> {
    if let Some(minutes) = args.snooze {
        engine.set_snooze_minutes(minutes);
    }
    if let Some(sound) = args.sound {
        engine.set_default_sound(&sound)?;
    }
    if let Some(volume) = args.volume {
        engine.set_default_volume(volume);
    }
    if let Some(enabled) = args.notifications {
        let mut bridge = NotificationBridge::new(Arc::new(ConsoleNotifier::new()), false);
        engine.set_notifications_enabled(bridge.set_enabled(enabled));
    }
    if let Some(enabled) = args.wake_lock {
        engine.set_wake_lock_enabled(enabled);
    }
    Ok(())
}

// ============================================================================
// Foreground service
// ============================================================================

/// A wall-clock jump larger than this between two checks means the host
/// slept; the alarm check is then made due immediately.
const RESUME_GAP_SECS: i64 = 5;

/// Keeps a running service and the state file in step.
///
/// The file is the source of truth: alarms written by other `alarm-clock`
/// commands are adopted before the service writes anything back.
struct StoreSync<'a> {
    store: &'a AlarmStore,
    seen: StoredState,
}

impl<'a> StoreSync<'a> {
    fn new(store: &'a AlarmStore, seen: StoredState) -> Self {
        Self { store, seen }
    }

    /// Reloads the service if the file changed since it was last seen.
    fn pull(&mut self, service: &AlarmService) -> Result<bool> {
        let on_disk = self.store.load()?;
        if on_disk == self.seen {
            return Ok(false);
        }
        debug!("State file changed on disk, reloading");
        service.reload(on_disk.clone());
        self.seen = on_disk;
        Ok(true)
    }

    /// Writes the service's state, adopting outside changes first.
    fn push(&mut self, service: &AlarmService) -> Result<()> {
        self.pull(service)?;
        self.store.save(&service.snapshot())?;
        self.seen = self.store.load()?;
        Ok(())
    }
}

/// Runs the alarm service until Ctrl-C or `q`.
async fn run(store: &AlarmStore, config: &AppConfig) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let state = store.load()?;
    let settings = if store.path().exists() {
        state.settings.clone()
    } else {
        config.alarms.clone()
    };

    let audio = AudioEngine::with_rodio(config.effective_audio(&settings));
    let service = AlarmService::new(
        config.scheduler,
        settings,
        Arc::clone(&clock),
        audio,
        Arc::new(ConsoleNotifier::new()),
    )?;
    service.restore(state.alarms.clone());
    service.start()?;
    let mut sync = StoreSync::new(store, state);

    let alarms = service.alarms();
    Display::show_running(service.next_alarm().as_ref(), alarms.len(), clock.now());

    let mut input = spawn_stdin_reader();
    let mut input_open = true;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut watch = tokio::time::interval(Duration::from_secs(1));
    let mut last_wall = clock.now();

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                }
                break;
            }
            _ = watch.tick() => {
                let now = clock.now();
                if (now - last_wall).num_seconds().abs() > RESUME_GAP_SECS {
                    debug!("Wall clock jumped, checking alarms now");
                    service.force_sync();
                }
                last_wall = now;
                if let Err(e) = sync.pull(&service) {
                    warn!("Failed to read state file: {:#}", e);
                }
            }
            line = input.recv(), if input_open => match line.as_deref().map(str::trim) {
                Some("s" | "snooze") => {
                    sync.pull(&service)?;
                    let count = service.snooze_ringing();
                    Display::show_snoozed(count, service.settings().snooze_minutes);
                    sync.push(&service)?;
                }
                Some("x" | "stop") => {
                    sync.pull(&service)?;
                    Display::show_stopped(service.stop_all_alarms());
                    sync.push(&service)?;
                }
                Some("q" | "quit") => break,
                Some("") => {}
                Some(_) => Display::show_run_help(),
                None => input_open = false,
            },
        }
    }

    sync.push(&service)?;
    service.shutdown();
    Ok(())
}

/// Forwards stdin lines from a blocking reader thread.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    let spawned = std::thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            for line in std::io::stdin().lines() {
                let Ok(line) = line else {
                    break;
                };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        warn!("Keyboard commands unavailable: {}", e);
    }
    rx
}

/// Plays a sound preview and waits for it to finish.
async fn preview(config: &AppConfig, sound: &str, seconds: u64, volume: Option<f32>) -> Result<()> {
    let definition = find_sound(sound).ok_or_else(|| AudioError::UnknownSound(sound.to_string()))?;
    let engine = AudioEngine::with_rodio(AudioConfig {
        wake_lock: false,
        ..config.audio
    });
    if let Some(volume) = volume {
        engine.set_volume(volume);
    }

    let duration = Duration::from_secs(seconds);
    Display::show_previewing(definition, seconds);
    engine.test_sound(sound, duration).await?;

    tokio::select! {
        () = tokio::time::sleep(duration + Duration::from_millis(200)) => {}
        _ = tokio::signal::ctrl_c() => {}
    }
    engine.dispose();
    Ok(())
}

/// Generates shell completion scripts.
fn generate_completions(shell: clap_complete::Shell) {
    use clap_complete::generate;
    use std::io;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();
    generate(shell, &mut cmd, bin_name, &mut io::stdout());
}

// ============================================================================
// Tests
// ============================================================================
