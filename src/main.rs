mod app;
mod model;
mod msg;
mod slash;

use std::io;
use std::iter;
use std::path::PathBuf;
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{self, DisableMouseCapture, EnableMouseCapture, Event};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use notify::{EventKind, RecursiveMode, Watcher};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use app::App;
use model::config::AppConfig;
use msg::Msg;

type Tui = Terminal<CrosstermBackend<io::Stdout>>;

/// Autosave debounce and palette retries are checked at this rate.
const TICK_RATE: Duration = Duration::from_millis(50);

fn main() -> Result<()> {
    let _log_guard = init_logging()?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "inkpad starting");

    let config = AppConfig::load()?;
    let mut terminal = enter_terminal()?;
    let outcome = run(&mut terminal, config);
    leave_terminal(&mut terminal)?;

    if let Err(err) = outcome {
        tracing::error!("inkpad stopped: {err:?}");
        eprintln!("inkpad error: {err:?}");
    }
    Ok(())
}

/// The terminal belongs to the UI, so logs go to a daily file in the data dir.
fn init_logging() -> Result<WorkerGuard> {
    let log_dir = directories::ProjectDirs::from("", "", "inkpad")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(std::env::temp_dir);
    std::fs::create_dir_all(&log_dir)?;

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&log_dir, "inkpad.log"));
    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("inkpad=info")),
        )
        .with_ansi(false)
        .init();
    Ok(guard)
}

fn enter_terminal() -> Result<Tui> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    Ok(Terminal::new(CrosstermBackend::new(stdout))?)
}

fn leave_terminal(terminal: &mut Tui) -> Result<()> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    Ok(())
}

fn run(terminal: &mut Tui, config: AppConfig) -> Result<()> {
    let (tx, rx) = mpsc::channel::<Msg>();
    let vault = config.vault_path();
    let mut app = App::new(config, tx.clone())?;

    forward_terminal_events(tx.clone());
    forward_ticks(tx.clone());
    watch_vault(vault, tx);

    loop {
        // One blocking receive, then everything already queued, then one redraw.
        for msg in iter::once(rx.recv()?).chain(rx.try_iter()) {
            app.update(msg)?;
        }

        if app.should_quit {
            return app.shutdown();
        }
        terminal.draw(|frame| app.view(frame))?;
    }
}

fn forward_terminal_events(tx: Sender<Msg>) {
    thread::spawn(move || {
        loop {
            let msg = match event::read() {
                Ok(Event::Key(key)) => Msg::Key(key),
                Ok(Event::Mouse(mouse)) => Msg::Mouse(mouse),
                Ok(Event::Resize(width, height)) => Msg::Resize(width, height),
                Ok(_) => continue,
                Err(err) => {
                    tracing::warn!("terminal read failed: {err}");
                    continue;
                }
            };
            if tx.send(msg).is_err() {
                return;
            }
        }
    });
}

fn forward_ticks(tx: Sender<Msg>) {
    thread::spawn(move || {
        while tx.send(Msg::Tick).is_ok() {
            thread::sleep(TICK_RATE);
        }
    });
}

/// Report created, modified and removed paths under the vault as
/// `Msg::FileChanged`.
fn watch_vault(vault: PathBuf, tx: Sender<Msg>) {
    thread::spawn(move || {
        let on_event = move |res: notify::Result<notify::Event>| match res {
            Ok(event)
                if matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                ) =>
            {
                for path in event.paths {
                    if tx.send(Msg::FileChanged(path)).is_err() {
                        break;
                    }
                }
            }
            Ok(_) => {}
            Err(err) => tracing::warn!("vault watcher error: {err}"),
        };

        let mut watcher = match notify::recommended_watcher(on_event) {
            Ok(watcher) => watcher,
            Err(err) => {
                tracing::warn!("vault watcher unavailable: {err}");
                return;
            }
        };
        if let Err(err) = watcher.watch(&vault, RecursiveMode::Recursive) {
            tracing::warn!("cannot watch {}: {err}", vault.display());
            return;
        }

        // Dropping the watcher stops it.
        loop {
            thread::park();
        }
    });
}
