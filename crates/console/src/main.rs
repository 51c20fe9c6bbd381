mod command;
mod error;
mod flags;
mod terminal;

use std::cell::RefCell;
use std::convert::Infallible;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use clap::Parser;
use ember_backend::create_backend;
use ember_core::{
    ChatSurface, InjectionGuard, MemoryPage, MessageBridge, PanelEvent, ScrollSignal,
    SettingsStore, Transcript, Widget, WidgetParts, WidgetSettings,
};
use snafu::{OptionExt, ResultExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use crate::command::{Command, HELP};
use crate::error::{
    BuildRuntimeSnafu, ConsoleError, CreateBackendSnafu, InvalidOriginSnafu,
    MissingBackendUrlSnafu, MountRefusedSnafu, ReadInputSnafu, SaveSettingsSnafu,
};
use crate::flags::FileFlags;
use crate::terminal::{FlagConfirm, LocalTasks, Terminal};

/// Origin the in-process chat surface claims for itself.
const CONSOLE_ORIGIN: &str = "http://localhost";

/// Talk to an assistant backend through the widget core from a terminal.
#[derive(Debug, Parser)]
#[command(name = "ember", version)]
struct Args {
    /// Base URL of the assistant backend, e.g. https://assist.example.com.
    #[arg(long, env = "EMBER_BACKEND_URL")]
    backend_url: Option<String>,
    /// Settings file. Defaults to the user configuration directory.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Forget panel and auto-open flags left by earlier runs.
    #[arg(long)]
    fresh: bool,
    /// Enable the reindex command.
    #[arg(long)]
    admin: bool,
    /// Write the effective settings back to the settings file.
    #[arg(long)]
    save: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(error = %error, "console session failed");
            eprintln!("ember: {error}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), ConsoleError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context(BuildRuntimeSnafu {
            stage: "build-runtime",
        })?;
    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, session(args))
}

fn effective_settings(store: &SettingsStore, args: &Args) -> WidgetSettings {
    let mut settings = (*store.settings()).clone();
    if let Some(backend_url) = &args.backend_url {
        settings.backend_url = backend_url.clone();
    }
    if args.admin {
        settings.admin = true;
    }
    settings.normalized()
}

async fn session(args: Args) -> Result<(), ConsoleError> {
    let store = match &args.config {
        Some(path) => SettingsStore::new(path.clone()),
        None => SettingsStore::load(),
    };
    let settings = effective_settings(&store, &args);
    if args.save {
        store.update(settings.clone()).context(SaveSettingsSnafu {
            stage: "save-settings",
        })?;
    }

    if settings.backend_url.is_empty() {
        return MissingBackendUrlSnafu {
            stage: "resolve-backend-url",
        }
        .fail();
    }
    let origin = settings
        .resolve_surface_origin(CONSOLE_ORIGIN)
        .context(InvalidOriginSnafu {
            stage: "resolve-surface-origin",
            origin: CONSOLE_ORIGIN,
        })?;
    let backend = create_backend(settings.backend_config()).context(CreateBackendSnafu {
        stage: "create-backend",
    })?;

    let flags = Rc::new(FileFlags::open(FileFlags::default_path(), args.fresh));
    tracing::debug!(path = ?flags.path(), "session flags loaded");

    let terminal = Rc::new(Terminal::default());
    let confirm = Rc::new(FlagConfirm::default());
    let tasks = Rc::new(LocalTasks::default());
    let guard = InjectionGuard::new(MemoryPage::top_level());

    let mut surface_bridge = None;
    let mounted = Widget::mount(&guard, &settings, || {
        let (host, surface) = MessageBridge::loopback_pair(origin);
        surface_bridge = Some(surface);

        let transcript = Rc::new(RefCell::new(Transcript::new()));
        transcript.borrow_mut().observe(terminal.clone());
        Ok::<_, Infallible>(WidgetParts {
            backend,
            bridge: host,
            flags,
            transcript,
            panel: terminal.clone(),
            confirm: confirm.clone(),
            spawner: tasks.clone(),
        })
    });
    let widget = match mounted {
        Ok(widget) => widget,
        Err(never) => match never {},
    };
    let (Some(widget), Some(surface_bridge)) = (widget, surface_bridge) else {
        return MountRefusedSnafu {
            stage: "mount-widget",
        }
        .fail();
    };
    let surface = ChatSurface::attach(surface_bridge, terminal.clone());

    println!("ember console: type a question, or /help for commands");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context(ReadInputSnafu {
        stage: "read-stdin",
    })? {
        match Command::parse(&line) {
            Command::Ask(question) => {
                if !surface.submit(&question) {
                    println!("(still waiting for the previous answer)");
                }
            }
            Command::Open => {
                if !widget.state().is_open() {
                    widget.dispatch(PanelEvent::BubbleActivated);
                }
            }
            Command::Close => {
                widget.dispatch(PanelEvent::CloseActivated);
            }
            Command::Escape => {
                widget.dispatch(PanelEvent::EscapePressed);
            }
            Command::Scroll {
                offset,
                viewport_height,
            } => {
                widget.on_scroll(ScrollSignal::new(offset, viewport_height));
            }
            Command::Reindex { confirmed } => {
                confirm.arm(confirmed);
                if !widget.trigger_reindex() {
                    confirm.arm(false);
                    println!("(reindex needs --admin)");
                }
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
            Command::Empty => {}
            Command::Invalid(reason) => println!("({reason}; /help lists commands)"),
        }
    }

    // Input may end (piped stdin) while an answer or a reindex is still on its way.
    tasks.finish().await;
    tracing::info!("console session ended");
    Ok(())
}
