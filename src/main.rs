use anyhow::Result;
use log::info;
use tokio::io::{self, AsyncBufReadExt, BufReader};

use runtrack_lib::{
    auth::IdentityProvider,
    data_dir, debug_from_env, init_logging,
    session::{RunSessionController, RunUiState},
    App,
};

const HELP: &str = "commands: signup <email> <password> <name> | login <email> <password> | \
reset <email> | newpass <token> <password> | logout | start | stop | status | list | delete <id> | clear | quit";

#[tokio::main]
async fn main() -> Result<()> {
    init_logging(debug_from_env());
    info!("RunTrack starting up...");

    let app = App::open(data_dir()?)?;
    let mut session: Option<RunSessionController> = None;

    println!("{HELP}");
    let mut lines = BufReader::new(io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            [] => continue,
            ["quit"] | ["exit"] => break,
            ["signup", email, password, name @ ..] => {
                let name = name.join(" ");
                match app.auth.sign_up(email, password, &name).await {
                    Ok(user) => {
                        println!("signed up as {}", user.email);
                        session = Some(replace_session(&app, session.take()).await);
                    }
                    Err(err) => println!("error: {err}"),
                }
            }
            ["login", email, password] => match app.auth.sign_in(email, password).await {
                Ok(user) => {
                    println!("signed in as {}", user.email);
                    session = Some(replace_session(&app, session.take()).await);
                }
                Err(err) => println!("error: {err}"),
            },
            ["reset", email] => match app.auth.issue_password_reset(email).await {
                Ok(token) => println!("reset token: {token}"),
                Err(err) => println!("error: {err}"),
            },
            ["newpass", token, password] => match app.auth.reset_password(token, password).await {
                Ok(()) => println!("password updated, log in again"),
                Err(err) => println!("error: {err}"),
            },
            ["logout"] => {
                if let Some(previous) = session.take() {
                    previous.shutdown().await;
                }
                app.auth.sign_out();
                println!("signed out");
            }
            [command, rest @ ..] => match &session {
                Some(controller) => run_intent(controller, command, rest).await?,
                None => println!("sign in first"),
            },
        }
    }

    if let Some(controller) = session {
        controller.shutdown().await;
    }
    Ok(())
}

async fn replace_session(
    app: &App,
    previous: Option<RunSessionController>,
) -> RunSessionController {
    if let Some(previous) = previous {
        previous.shutdown().await;
    }
    app.start_session()
}

async fn run_intent(controller: &RunSessionController, command: &str, args: &[&str]) -> Result<()> {
    match (command, args) {
        ("start", []) => controller.start()?,
        ("stop", []) => controller.stop()?,
        ("delete", [run_id]) => controller.delete(*run_id)?,
        ("clear", []) => controller.clear_error()?,
        ("status", []) => print_status(&controller.state()),
        ("list", []) => print_runs(&controller.state()),
        _ => println!("{HELP}"),
    }
    Ok(())
}

fn print_status(state: &RunUiState) {
    match &state.current_run {
        Some(run) => println!("{:?} run {} {}", state.phase, run.id, state.formatted_elapsed()),
        None => println!("{:?}", state.phase),
    }
    if let Some(error) = &state.error {
        println!("error: {error}");
    }
}

fn print_runs(state: &RunUiState) {
    if state.runs.is_empty() {
        println!("no runs yet");
    }
    for run in &state.runs {
        let marker = if run.is_active { "*" } else { " " };
        println!(
            "{marker} {} {} {}",
            run.id,
            run.start_time.format("%Y-%m-%d %H:%M:%S"),
            run.formatted_duration()
        );
    }
}
