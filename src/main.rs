use clap::{Parser, Subcommand, ValueEnum};
use courtside::application::commands::{
    availability_status_impl, cancel_monthly_task_impl, create_monitor_task_impl,
    create_monthly_tasks_impl, direct_book_impl, list_monthly_tasks_impl, list_orders_impl, list_tasks_impl, lock_book_impl,
    login_impl, logout_impl, logs_impl, monthly_venue_ids_impl, mount_view_impl,
    refresh_venues_impl, rescue_two_factor_impl, session_status_impl, set_auto_refresh_impl,
    stop_task_impl, submit_two_factor_impl, unmount_view_impl, venue_grid_impl,
};
use courtside::application::polling::View;
use courtside::{AppState, InfraError};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "courtside", version, about = "Venue slot booking client")]
struct Cli {
    /// Directory holding config/ and logs/ (defaults to the current directory)
    #[arg(long, global = true)]
    workspace: Option<PathBuf>,
    /// Account name to attach to a session restored from the keyring
    #[arg(long, global = true)]
    username: Option<String>,
    /// Omit to start an interactive shell
    #[command(subcommand)]
    cmd: Option<Command>,
}

/// One line typed into the interactive shell.
#[derive(Parser)]
#[command(name = "courtside", no_binary_name = true, disable_version_flag = true)]
struct ShellLine {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in with username and password
    Login {
        username: String,
        password: String,
        /// Address booking notifications are sent to
        #[arg(long)]
        email: Option<String>,
    },
    /// Submit the login two-factor code
    TwoFactor { code: String },
    /// Submit the code for a rescue challenge raised during a refresh
    Rescue { code: String },
    /// Sign out and clear every cache
    Logout,
    /// Show the session state
    Status,
    /// Show the availability grid for a date
    Venues {
        /// YYYY-MM-DD, defaults to today
        #[arg(long)]
        date: Option<String>,
        /// Fetch the window before rendering
        #[arg(long)]
        refresh: bool,
    },
    /// Show the cached window dates and refresh state
    Dates,
    /// Book a free slot immediately
    Book {
        date: String,
        /// Venue id or name
        venue: String,
        /// HH:MM-HH:MM
        slot: String,
    },
    /// Start a lock task on a slot
    Lock {
        date: String,
        venue: String,
        slot: String,
    },
    /// Create a snipe or lock monitor task
    Monitor {
        #[arg(value_enum)]
        kind: TaskKindArg,
        date: String,
        slot: String,
        #[arg(long)]
        venue: Option<String>,
    },
    /// List monitor tasks
    Tasks {
        #[arg(long)]
        refresh: bool,
    },
    /// Stop a monitor task
    Stop { task_id: String },
    /// Monthly recurring tasks
    Monthly {
        #[command(subcommand)]
        cmd: MonthlyCommand,
    },
    /// List orders in a bucket (unpaid, paid, refund, closed)
    Orders {
        bucket: String,
        #[arg(long)]
        page: Option<u32>,
    },
    /// Show the Booking Service log tail
    Logs {
        #[arg(long)]
        refresh: bool,
    },
    /// Mount a view and start its polling
    View {
        #[arg(value_enum)]
        view: ViewArg,
    },
    /// Unmount the current view and stop polling
    Unmount,
    /// Toggle the dashboard auto refresh
    AutoRefresh {
        #[arg(value_enum)]
        state: Toggle,
    },
    /// Mount the dashboard; outside the shell, runs until Ctrl-C
    Watch {
        #[arg(long)]
        auto_refresh: bool,
    },
    /// Leave the interactive shell
    Quit,
}

#[derive(Subcommand)]
enum MonthlyCommand {
    /// Create one task per weekday and slot
    Create {
        #[arg(long)]
        year: i32,
        #[arg(long)]
        month: u32,
        /// 1 = Monday .. 7 = Sunday (repeatable)
        #[arg(long = "weekday", required = true)]
        weekdays: Vec<u8>,
        /// HH:MM-HH:MM (repeatable)
        #[arg(long = "slot", required = true)]
        slots: Vec<String>,
        /// Monthly venue id (repeatable)
        #[arg(long = "venue", required = true)]
        venue_ids: Vec<String>,
    },
    List,
    Cancel {
        task_id: String,
        /// Confirm the cancellation
        #[arg(long)]
        yes: bool,
    },
    /// Show the court number to monthly venue id table
    Venues,
}

#[derive(Clone, Copy, ValueEnum)]
enum TaskKindArg {
    Snipe,
    Lock,
}

#[derive(Clone, Copy, ValueEnum)]
enum ViewArg {
    Dashboard,
    Orders,
    Monthly,
}

impl From<ViewArg> for View {
    fn from(value: ViewArg) -> Self {
        match value {
            ViewArg::Dashboard => View::Dashboard,
            ViewArg::Orders => View::Orders,
            ViewArg::Monthly => View::Monthly,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Once,
    Shell,
}

#[derive(Serialize)]
struct StatusOnly {
    status: &'static str,
}

fn init_tracing() -> Result<(), String> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("courtside=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| format!("failed to initialize tracing subscriber: {error}"))
}

fn emit<T: Serialize>(
    state: &AppState,
    command: &str,
    result: Result<T, InfraError>,
) -> Result<(), String> {
    let value = result.map_err(|error| state.command_error(command, &error))?;
    let rendered = serde_json::to_string_pretty(&value).map_err(|error| error.to_string())?;
    println!("{rendered}");
    Ok(())
}

fn ok(status: &'static str) -> StatusOnly {
    StatusOnly { status }
}

/// Splits a shell line on whitespace, keeping double-quoted runs together.
fn split_line(line: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut pending = false;
    for ch in line.chars() {
        match ch {
            '"' => {
                quoted = !quoted;
                pending = true;
            }
            ch if ch.is_whitespace() && !quoted => {
                if pending {
                    words.push(std::mem::take(&mut current));
                    pending = false;
                }
            }
            ch => {
                current.push(ch);
                pending = true;
            }
        }
    }
    if quoted {
        return Err("unterminated quote".to_string());
    }
    if pending {
        words.push(current);
    }
    Ok(words)
}

async fn read_code(input: &mut Lines<BufReader<Stdin>>) -> Result<String, String> {
    eprint!("two-factor code: ");
    match input.next_line().await {
        Ok(Some(line)) if !line.trim().is_empty() => Ok(line.trim().to_string()),
        Ok(_) => Err("no two-factor code entered".to_string()),
        Err(error) => Err(error.to_string()),
    }
}

async fn dispatch(
    state: &AppState,
    command: Command,
    mode: Mode,
    input: &mut Lines<BufReader<Stdin>>,
) -> Result<(), String> {
    match command {
        Command::Login {
            username,
            password,
            email,
        } => {
            let response = login_impl(state, username, password, email)
                .await
                .map_err(|error| state.command_error("login", &error))?;
            let needs_code = response.status == "two_factor_required";
            emit(state, "login", Ok(response))?;
            if needs_code && mode == Mode::Once {
                let code = read_code(input).await?;
                emit(state, "submit_two_factor", submit_two_factor_impl(state, code).await)?;
            }
            Ok(())
        }
        Command::TwoFactor { code } => {
            emit(state, "submit_two_factor", submit_two_factor_impl(state, code).await)
        }
        Command::Rescue { code } => {
            emit(state, "rescue_two_factor", rescue_two_factor_impl(state, code).await)
        }
        Command::Logout => emit(state, "logout", logout_impl(state).map(|()| ok("signed_out"))),
        Command::Status => emit(state, "session_status", session_status_impl(state)),
        Command::Venues { date, refresh } => {
            if refresh {
                refresh_venues_impl(state)
                    .await
                    .map_err(|error| state.command_error("refresh_venues", &error))?;
            }
            emit(state, "venue_grid", venue_grid_impl(state, date))
        }
        Command::Dates => emit(state, "availability_status", availability_status_impl(state)),
        Command::Book { date, venue, slot } => emit(
            state,
            "direct_book",
            direct_book_impl(state, date, venue, slot).await,
        ),
        Command::Lock { date, venue, slot } => emit(
            state,
            "lock_book",
            lock_book_impl(state, date, venue, slot).await,
        ),
        Command::Monitor {
            kind,
            date,
            slot,
            venue,
        } => {
            let kind = match kind {
                TaskKindArg::Snipe => "snipe",
                TaskKindArg::Lock => "lock",
            };
            emit(
                state,
                "create_monitor_task",
                create_monitor_task_impl(state, kind.to_string(), date, slot, venue).await,
            )
        }
        Command::Tasks { refresh } => emit(state, "list_tasks", list_tasks_impl(state, refresh).await),
        Command::Stop { task_id } => emit(state, "stop_task", stop_task_impl(state, task_id).await),
        Command::Monthly { cmd } => match cmd {
            MonthlyCommand::Create {
                year,
                month,
                weekdays,
                slots,
                venue_ids,
            } => emit(
                state,
                "create_monthly_tasks",
                create_monthly_tasks_impl(state, year, month, weekdays, slots, venue_ids).await,
            ),
            MonthlyCommand::List => emit(
                state,
                "list_monthly_tasks",
                list_monthly_tasks_impl(state).await,
            ),
            MonthlyCommand::Cancel { task_id, yes } => emit(
                state,
                "cancel_monthly_task",
                cancel_monthly_task_impl(state, task_id, yes).await,
            ),
            MonthlyCommand::Venues => emit(
                state,
                "monthly_venue_ids",
                monthly_venue_ids_impl(state).await,
            ),
        },
        Command::Orders { bucket, page } => {
            emit(state, "list_orders", list_orders_impl(state, bucket, page).await)
        }
        Command::Logs { refresh } => emit(state, "logs", logs_impl(state, refresh).await),
        Command::View { view } => emit(
            state,
            "mount_view",
            mount_view_impl(state, view.into()).map(|()| ok("mounted")),
        ),
        Command::Unmount => emit(
            state,
            "unmount_view",
            unmount_view_impl(state).map(|()| ok("unmounted")),
        ),
        Command::AutoRefresh { state: toggle } => emit(
            state,
            "set_auto_refresh",
            set_auto_refresh_impl(state, matches!(toggle, Toggle::On)).map(|()| ok("updated")),
        ),
        Command::Watch { auto_refresh } => {
            set_auto_refresh_impl(state, auto_refresh)
                .and_then(|()| mount_view_impl(state, View::Dashboard))
                .map_err(|error| state.command_error("watch", &error))?;
            if mode == Mode::Shell {
                return emit(state, "watch", Ok(ok("watching")));
            }
            eprintln!("watching the dashboard, Ctrl-C to stop");
            tokio::signal::ctrl_c()
                .await
                .map_err(|error| error.to_string())?;
            state.scheduler().shutdown();
            Ok(())
        }
        Command::Quit => Ok(()),
    }
}

async fn run_shell(state: &AppState, input: &mut Lines<BufReader<Stdin>>) -> Result<(), String> {
    eprintln!("courtside shell, type `help` for commands or `quit` to leave");
    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = input.next_line() => line.map_err(|error| error.to_string())?,
        };
        let Some(line) = line else {
            break;
        };
        let words = match split_line(&line) {
            Ok(words) if words.is_empty() => continue,
            Ok(words) => words,
            Err(message) => {
                eprintln!("error: {message}");
                continue;
            }
        };
        match ShellLine::try_parse_from(words) {
            Ok(ShellLine { cmd: Command::Quit }) => break,
            Ok(ShellLine { cmd }) => {
                if let Err(message) = dispatch(state, cmd, Mode::Shell, input).await {
                    eprintln!("error: {message}");
                }
            }
            Err(error) => {
                let _ = error.print();
            }
        }
    }
    state.scheduler().shutdown();
    Ok(())
}

async fn run(cli: Cli) -> Result<(), String> {
    let workspace_root = match cli.workspace {
        Some(path) => path,
        None => std::env::current_dir()
            .map_err(|error| format!("failed to resolve current directory: {error}"))?,
    };
    let state = AppState::new(workspace_root)
        .map_err(|error| format!("failed to initialize app state: {error}"))?;
    if let Some(username) = cli.username.as_deref() {
        state
            .set_username(username)
            .map_err(|error| state.command_error("set_username", &error))?;
    }

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    match cli.cmd {
        Some(command) => dispatch(&state, command, Mode::Once, &mut input).await,
        None => run_shell(&state, &mut input).await,
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(message) = init_tracing() {
        eprintln!("{message}");
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_line_keeps_quoted_venue_names() {
        let words = split_line(r#"book 2026-03-10 "Court 1" 18:00-20:00"#).expect("split");
        assert_eq!(words, vec!["book", "2026-03-10", "Court 1", "18:00-20:00"]);
        assert_eq!(split_line("   ").expect("split"), Vec::<String>::new());
        assert!(split_line(r#"book "Court"#).is_err());
    }

    #[test]
    fn shell_line_parses_monthly_create() {
        let line = ShellLine::try_parse_from([
            "monthly", "create", "--year", "2026", "--month", "4", "--weekday", "1", "--weekday",
            "3", "--slot", "09:00-10:00", "--venue", "5115",
        ])
        .expect("parse");
        match line.cmd {
            Command::Monthly {
                cmd: MonthlyCommand::Create { weekdays, slots, .. },
            } => {
                assert_eq!(weekdays, vec![1, 3]);
                assert_eq!(slots, vec!["09:00-10:00".to_string()]);
            }
            _ => panic!("expected monthly create"),
        }
    }
}
