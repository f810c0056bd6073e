use clap::{Parser, Subcommand};
use lib::gate::{ActivitySignal, CredentialGate, IdlePhase, InactivityTimer};
use lib::orchestrator::{ChatMessage, Orchestrator};
use lib::recorder::{NewMessage, SessionId, SessionMode, SessionRecorder};
use lib::remote::{AssistantsClient, ConversationClient, Role};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Parley CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and default files (config and sessions directory).
    Init {
        /// Config file path (default: PARLEY_CONFIG_PATH or ~/.parley/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,
    },

    /// Run the gateway (login, chat, session recording, and analytics over HTTP).
    Gateway {
        /// Config file path (default: PARLEY_CONFIG_PATH or ~/.parley/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// HTTP port (default from config or 15151)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Log in and chat with the assistant from the terminal (recorded as a session).
    Chat {
        /// Config file path (default: PARLEY_CONFIG_PATH or ~/.parley/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<std::path::PathBuf>,

        /// Record the session in avatar mode instead of text-only.
        #[arg(long)]
        avatar: bool,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("parley {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Gateway { config, port }) => {
            if let Err(e) = run_gateway(config, port).await {
                log::error!("gateway failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Chat { config, avatar }) => {
            let mode = if avatar {
                SessionMode::Avatar
            } else {
                SessionMode::TextOnly
            };
            if let Err(e) = run_chat(config, mode).await {
                log::error!("chat failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<std::path::PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    let dir = lib::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_gateway(
    config_path: Option<std::path::PathBuf>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let (mut config, path) = lib::config::load_config(config_path)?;
    lib::init::require_initialized(&path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!("starting gateway on {}:{}", config.gateway.bind, config.gateway.port);
    lib::gateway::run_gateway(config, path).await
}

type StdinLines = tokio::io::Lines<BufReader<tokio::io::Stdin>>;

async fn prompt(lines: &mut StdinLines, label: &str) -> anyhow::Result<Option<String>> {
    print!("{}", label);
    std::io::stdout().flush()?;
    Ok(lines.next_line().await?.map(|l| l.trim().to_string()))
}

async fn run_chat(
    config_path: Option<std::path::PathBuf>,
    mode: SessionMode,
) -> anyhow::Result<()> {
    let (config, path) = lib::config::load_config(config_path)?;
    lib::init::require_initialized(&path)?;

    let gate = CredentialGate::from_config(&config.gate);
    if !gate.is_configured() {
        anyhow::bail!("no login credentials configured (set gate.identifier and gate.secret)");
    }
    let api_key = lib::config::resolve_api_key(&config)
        .ok_or_else(|| anyhow::anyhow!("no API key configured (set assistant.apiKey or OPENAI_API_KEY)"))?;
    let orchestrator_config = lib::config::orchestrator_config(&config)?;
    let idle_config = lib::config::idle_config(&config.gate)?;
    let reset_while_warning = idle_config.reset_while_warning;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let Some(email) = prompt(&mut lines, "email: ").await? else {
        return Ok(());
    };
    let Some(password) = prompt(&mut lines, "password: ").await? else {
        return Ok(());
    };
    if !gate.check_credentials(&email, &password) {
        anyhow::bail!("Invalid email or password");
    }

    let client: Arc<dyn ConversationClient> = Arc::new(AssistantsClient::new(
        lib::config::resolve_base_url(&config),
        api_key,
    ));
    let orchestrator = Orchestrator::new(client, orchestrator_config);

    let sessions_dir = lib::config::resolve_sessions_dir(&config, &path);
    let store = lib::init::open_session_store(&sessions_dir).await?;
    let recorder = SessionRecorder::new(Arc::new(store));
    let session = recorder.start_session(mode).await?;
    log::info!("chat: recording session {}", session);

    let logged_out = Arc::new(Notify::new());
    let cancel = CancellationToken::new();
    let timer = {
        let logged_out = logged_out.clone();
        let cancel = cancel.clone();
        InactivityTimer::start(idle_config, move || {
            cancel.cancel();
            logged_out.notify_one();
        })
    };
    let warnings = tokio::spawn(print_warnings(timer.subscribe()));

    println!("signed in; type a message, /exit to quit");
    let mut history: Vec<ChatMessage> = Vec::new();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let line = tokio::select! {
            biased;
            _ = logged_out.notified() => {
                println!("\nlogged out after inactivity");
                break;
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };
        let input = line.trim();

        match line_action(timer.phase(), input, reset_while_warning) {
            LineAction::StayActive => {
                timer.stay_active();
                continue;
            }
            LineAction::Ignore => {
                timer.activity(ActivitySignal::KeyPress);
                println!("(press Enter to stay signed in)");
                continue;
            }
            LineAction::Skip => {
                timer.activity(ActivitySignal::KeyPress);
                continue;
            }
            LineAction::Handle => timer.activity(ActivitySignal::KeyPress),
        }
        if input.eq_ignore_ascii_case("/exit") || input.eq_ignore_ascii_case("/quit") {
            break;
        }

        history.push(ChatMessage::user(input));
        record(&recorder, &session, NewMessage::new(Role::User, input)).await;

        let started = std::time::Instant::now();
        // Waiting on a reply is not idleness; the prompt can't answer a warning meanwhile.
        let busy = timer.hold();
        let outcome = orchestrator.generate_reply_cancellable(&history, &cancel).await;
        drop(busy);
        match outcome {
            Ok(reply) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                println!("< {}", reply.text.trim());
                record(
                    &recorder,
                    &session,
                    NewMessage::new(Role::Assistant, reply.text.clone()).with_duration(duration_ms),
                )
                .await;
                history.push(ChatMessage::assistant(reply.text));
            }
            Err(e) => {
                eprintln!("< {}", e);
            }
        }
        if cancel.is_cancelled() {
            println!("logged out after inactivity");
            break;
        }
    }

    timer.stop();
    warnings.abort();
    println!("session {} saved", session);
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum LineAction {
    /// Empty line while the warning is shown: confirm presence.
    StayActive,
    /// Input while the warning is shown and activity does not reset it.
    Ignore,
    /// Empty line outside the warning.
    Skip,
    Handle,
}

fn line_action(phase: IdlePhase, input: &str, reset_while_warning: bool) -> LineAction {
    let warning = matches!(phase, IdlePhase::Warning { .. });
    match (warning, input.is_empty()) {
        (true, true) => LineAction::StayActive,
        (true, false) if !reset_while_warning => LineAction::Ignore,
        (false, true) => LineAction::Skip,
        _ => LineAction::Handle,
    }
}

/// Recording failures are logged; the chat continues.
async fn record(recorder: &SessionRecorder, session: &SessionId, message: NewMessage) {
    if let Err(e) = recorder.track_message(session, message).await {
        log::warn!("chat: could not record message: {}", e);
    }
}

async fn print_warnings(mut phase: tokio::sync::watch::Receiver<IdlePhase>) {
    while phase.changed().await.is_ok() {
        let current = *phase.borrow();
        if let IdlePhase::Warning { remaining_secs } = current {
            println!(
                "\nstill there? logging out in {}s (press Enter to stay signed in)",
                remaining_secs
            );
        }
    }
}
