mod api;
mod app;
mod cli;
mod config;
mod input;
mod model;
mod session;
mod ui;

use anyhow::{Context, Result};
use api::MonitorGateway;
use app::{App, AppCommand};
use clap::Parser;
use cli::CliArgs;
use crossterm::event::{Event, EventStream, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use futures::StreamExt;
use model::Severity;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use session::{SessionEnvelope, WsChannel};
use std::io::{self, Stdout};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = CliArgs::parse();
    if let Some((source, file)) = config::load()? {
        apply_file_defaults(&mut args, &file);
        debug!("loaded config from {source}");
    }
    init_tracing(&args.log_filter)?;

    let gateway = MonitorGateway::new(&args.server)?;
    gateway
        .probe()
        .await
        .with_context(|| format!("startup check against {} failed", args.server))?;

    let mut app = App::new(gateway.base_url().to_string());
    run(&mut app, &gateway, &args).await
}

/// Config file values fill in flags the CLI left at their defaults.
fn apply_file_defaults(args: &mut CliArgs, file: &config::FileConfig) {
    if args.server == cli::DEFAULT_SERVER
        && let Some(server) = &file.server
    {
        args.server = server.clone();
    }
    if args.refresh_ms == cli::DEFAULT_REFRESH_MS
        && let Some(refresh_ms) = file.refresh_ms
    {
        args.refresh_ms = refresh_ms;
    }
    if args.alert_ms == cli::DEFAULT_ALERT_MS
        && let Some(alert_ms) = file.alert_ms
    {
        args.alert_ms = alert_ms;
    }
    if args.log_filter == "info"
        && let Some(log_filter) = &file.log_filter
    {
        args.log_filter = log_filter.clone();
    }
}

fn init_tracing(level_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level_filter)
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to initialize tracing filter")?;

    // The TUI owns the screen; diagnostics go to the sink and the on-screen
    // activity log is the user-visible surface.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .with_writer(std::io::sink)
        .try_init();

    Ok(())
}

async fn run(app: &mut App, gateway: &MonitorGateway, args: &CliArgs) -> Result<()> {
    let mut terminal = init_terminal()?;
    let run_result = run_loop(&mut terminal, app, gateway, args).await;
    let restore_result = restore_terminal(&mut terminal);

    match (run_result, restore_result) {
        (Err(run_error), Err(restore_error)) => Err(anyhow::anyhow!(
            "{run_error:#}\nterminal restore error: {restore_error:#}"
        )),
        (Err(error), _) => Err(error),
        (_, Err(error)) => Err(error),
        (Ok(()), Ok(())) => Ok(()),
    }
}

fn init_terminal() -> Result<TuiTerminal> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal backend")?;
    terminal.clear().context("failed to clear terminal")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut TuiTerminal) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to show cursor")?;
    Ok(())
}

async fn run_loop(
    terminal: &mut TuiTerminal,
    app: &mut App,
    gateway: &MonitorGateway,
    args: &CliArgs,
) -> Result<()> {
    // One immediate full refresh, alert check and cost fetch before the
    // tickers take over.
    refresh_cluster(app, gateway).await;
    check_alerts(app, gateway).await;
    load_cost(app, gateway).await;

    let mut reader = EventStream::new();
    let mut cluster_ticker = interval(Duration::from_millis(args.refresh_ms.max(500)));
    cluster_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut alert_ticker = interval(Duration::from_millis(args.alert_ms.max(1_000)));
    alert_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The startup refresh already covered the immediate first tick of both.
    cluster_ticker.tick().await;
    alert_ticker.tick().await;

    let (session_tx, mut session_rx) = mpsc::unbounded_channel::<SessionEnvelope>();

    loop {
        terminal
            .draw(|frame| ui::render(frame, app))
            .context("failed to render terminal frame")?;

        if !app.running() {
            break;
        }

        let debounce_deadline = app.next_search_deadline();
        tokio::select! {
            maybe_event = reader.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        if let Some(action) = input::map_key(app.mode(), key) {
                            debug!("action={action:?}");
                            let command = app.apply_action(action);
                            execute_command(app, gateway, command, &session_tx).await;
                        }
                    }
                    Some(Ok(Event::Resize(_, _))) => {}
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        app.set_status(format!("terminal event error: {error}"));
                    }
                    None => break,
                }
            }
            _ = cluster_ticker.tick() => {
                refresh_cluster(app, gateway).await;
            }
            _ = alert_ticker.tick() => {
                check_alerts(app, gateway).await;
            }
            _ = sleep_until_deadline(debounce_deadline) => {
                app.poll_search(Instant::now());
            }
            maybe_envelope = session_rx.recv() => {
                if let Some(envelope) = maybe_envelope {
                    app.on_session_event(envelope);
                }
            }
        }
    }

    // Page teardown: the tickers drop with the loop; the terminal channel,
    // if any, is disconnected here. In-flight requests are not cancelled,
    // their results are simply never applied.
    app.close_session();
    Ok(())
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}

async fn execute_command(
    app: &mut App,
    gateway: &MonitorGateway,
    command: AppCommand,
    session_tx: &mpsc::UnboundedSender<SessionEnvelope>,
) {
    match command {
        AppCommand::None => {}
        AppCommand::RefreshCluster => refresh_cluster(app, gateway).await,
        AppCommand::RunScan => match gateway.run_scan().await {
            Ok(report) => app.scan_finished(report),
            Err(error) => app.scan_failed(&compact_error(&error)),
        },
        AppCommand::OpenTerminal { pod } => {
            let url = gateway.socket_url();
            let events = session_tx.clone();
            app.open_session(&pod, move |session_id| {
                Box::new(WsChannel::connect(url, session_id, events))
            });
        }
        AppCommand::ShowNodeDetail { name } => match gateway.fetch_node_detail(&name).await {
            Ok(detail) => app.set_node_detail(detail),
            Err(error) => {
                app.set_status(format!(
                    "Node detail failed for {name}: {}",
                    compact_error(&error)
                ));
            }
        },
    }
}

/// One cluster cycle: both endpoints must respond 2xx or the snapshot stays
/// untouched. On success only the cluster payload is applied; the alert list
/// is owned by the alert-check task.
async fn refresh_cluster(app: &mut App, gateway: &MonitorGateway) {
    match tokio::try_join!(gateway.fetch_cluster(), gateway.fetch_alerts()) {
        Ok((payload, _alerts)) => app.apply_cluster(payload),
        Err(error) => {
            warn!("cluster refresh failed: {error:#}");
            app.record_cluster_failure(&compact_error(&error));
        }
    }
}

async fn check_alerts(app: &mut App, gateway: &MonitorGateway) {
    match gateway.fetch_alerts().await {
        Ok(alerts) => app.apply_alerts(alerts),
        Err(error) => {
            // The cached alert list stays; the next tick retries naturally.
            warn!("alert check failed: {error:#}");
        }
    }
}

async fn load_cost(app: &mut App, gateway: &MonitorGateway) {
    match gateway.fetch_cost().await {
        Ok(cost) => app.set_cost(cost),
        Err(error) => {
            app.push_log(
                format!("Cost update: {}", compact_error(&error)),
                Severity::Critical,
            );
        }
    }
}

fn compact_error(error: &anyhow::Error) -> String {
    let mut out = Vec::new();
    for (index, cause) in error.chain().enumerate() {
        if index == 0 {
            out.push(cause.to_string());
        } else if index <= 2 {
            out.push(format!("caused by: {cause}"));
        } else {
            break;
        }
    }

    out.join("\n")
}
