use std::path::PathBuf;
use std::process::ExitCode;

use base64::{Engine, engine::general_purpose::STANDARD};
use clap::Parser;
use log::{debug, error};
use tokio::io::{AsyncBufReadExt, BufReader};

use chatter::api::models::{OutgoingMessage, ProfileUpdate, User};
use chatter::app::{App, ClientConfig};
use chatter::notice::{Level, Notice, Notifier};
use chatter::storage::Preferences;
use chatter::ui::commands::{self, Command};
use chatter::ui::chat_view::{self, Shown};
use chatter::ui::sidebar;

#[derive(Parser, Debug)]
#[command(name = "chatter", about = "Terminal chat client")]
struct Args {
    /// Server URL, e.g. http://localhost:5000
    #[arg(long)]
    server: Option<String>,

    /// Settings file (defaults to the platform config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the effective settings back to the settings file
    #[arg(long)]
    save_config: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config_path = args.config.or_else(ClientConfig::default_path);
    let mut config = config_path.as_deref().map(ClientConfig::load).unwrap_or_default();
    if let Some(server) = args.server {
        config.server_url = chatter::utils::normalize_url(&server);
    }
    if args.save_config {
        if let Some(path) = config_path.as_deref() {
            if let Err(e) = config.save(path) {
                error!("failed to save settings: {e}");
            }
        }
    }

    let prefs = match Preferences::open_default() {
        Ok(p) => p,
        Err(e) => {
            error!("cannot open preferences: {e}");
            return ExitCode::FAILURE;
        }
    };
    let (notifier, notices) = Notifier::channel();
    let app = match App::new(&config, prefs, notifier) {
        Ok(app) => app,
        Err(e) => {
            error!("cannot start client: {e}");
            return ExitCode::FAILURE;
        }
    };

    println!("chatter - {} (theme: {}), /help for commands", config.server_url, app.theme.theme());
    run(app, notices).await;
    ExitCode::SUCCESS
}

async fn run(mut app: App, mut notices: tokio::sync::mpsc::UnboundedReceiver<Notice>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut shown = Shown::default();

    if app.session.check_session().await {
        after_sign_in(&mut app).await;
    } else {
        println!("not signed in, use /login or /signup");
    }

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if !handle_line(&mut app, &mut shown, &line).await {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!("stdin: {e}");
                    break;
                }
            },
            alive = app.session.next_presence() => {
                if !alive {
                    debug!("presence feed closed");
                }
            }
            // only the receive races; reconciling runs to completion
            event = app.chat.next_event() => match event {
                Some(event) => {
                    app.chat.handle_event(event).await;
                    print_new_messages(&app, &mut shown);
                }
                None => debug!("conversation feed closed"),
            },
            Some(notice) = notices.recv() => print_notice(&notice),
        }
    }

    app.session.disconnect_channel();
}

fn print_notice(notice: &Notice) {
    match notice {
        Notice::Show { level: Level::Error, text, .. } => println!("! {text}"),
        Notice::Show { level: Level::Loading, text, .. } | Notice::Update { text, .. } => println!("… {text}"),
        Notice::Show { text, .. } => println!("- {text}"),
        Notice::Dismiss { .. } => {}
    }
}

fn me(app: &App) -> String {
    app.session.user().map(|u| u.id.clone()).unwrap_or_default()
}

fn print_new_messages(app: &App, shown: &mut Shown) {
    let me = me(app);
    for m in shown.fresh(app.chat.messages()) {
        println!("{}", chat_view::line(m, &me, app.chat.selected()));
    }
}

fn print_roster(app: &App) {
    println!("conversations:");
    for row in sidebar::render(&app.chat, &app.session) {
        println!("{row}");
    }
}

async fn after_sign_in(app: &mut App) {
    app.rebind_channel();
    if let Some(user) = app.session.user() {
        println!("signed in as {} (@{})", user.full_name(), user.username);
    }
    if app.chat.load_roster().await {
        print_roster(app);
    }
}

fn profile_from(user: &User) -> ProfileUpdate {
    ProfileUpdate {
        name: user.name.clone(),
        last_name: user.last_name.clone(),
        username: user.username.clone(),
        date_of_birth: user.date_of_birth.clone(),
        bio: user.bio.clone().unwrap_or_default(),
        profile_picture: None,
    }
}

async fn read_picture(path: &str) -> Result<String, String> {
    let bytes = tokio::fs::read(path).await.map_err(|e| format!("{path}: {e}"))?;
    let format = image::guess_format(&bytes).map_err(|e| format!("{path}: {e}"))?;
    let mime = format.to_mime_type();
    Ok(format!("data:{mime};base64,{}", STANDARD.encode(bytes)))
}

/// Returns `false` when the user asked to quit.
async fn handle_line(app: &mut App, shown: &mut Shown, line: &str) -> bool {
    let cmd = match commands::parse(line) {
        Ok(Some(cmd)) => cmd,
        Ok(None) => return true,
        Err(usage) => {
            println!("{usage}");
            return true;
        }
    };

    match cmd {
        Command::SignUp(req) => {
            if app.session.sign_up(&req).await {
                after_sign_in(app).await;
            }
        }
        Command::SignIn(req) => {
            if app.session.sign_in(&req).await {
                after_sign_in(app).await;
            }
        }
        Command::SignOut => {
            app.sign_out().await;
        }
        Command::Users => {
            if app.chat.load_roster().await {
                print_roster(app);
            }
        }
        Command::Open(needle) => {
            let Some(c) = sidebar::pick(&app.chat, &needle).cloned() else {
                println!("no conversation matches {needle:?}");
                return true;
            };
            let id = c.id.clone();
            println!("-- {} --", c.full_name());
            app.chat.select_correspondent(Some(c)).await;
            if app.chat.load_messages(&id).await {
                let me = me(app);
                for row in chat_view::render(app.chat.messages(), &me, app.chat.selected()) {
                    println!("{row}");
                }
                shown.reset(app.chat.messages());
            }
        }
        Command::Close => app.chat.select_correspondent(None).await,
        Command::Send(text) => {
            if app.chat.selected().is_none() {
                println!("open a conversation first (/open)");
                return true;
            }
            app.chat.send_message(&OutgoingMessage::text(text)).await;
            print_new_messages(app, shown);
        }
        Command::Delete(id) => {
            app.chat.delete_message(&id).await;
        }
        Command::Bio(bio) => {
            let Some(mut update) = app.session.user().map(profile_from) else {
                println!("sign in first");
                return true;
            };
            update.bio = bio;
            app.session.update_profile(update).await;
        }
        Command::Avatar(path) => {
            let Some(mut update) = app.session.user().map(profile_from) else {
                println!("sign in first");
                return true;
            };
            match read_picture(&path).await {
                Ok(picture) => {
                    update.profile_picture = Some(picture);
                    app.session.update_profile(update).await;
                }
                Err(e) => println!("! {e}"),
            }
        }
        Command::Theme(None) => println!("theme: {}", app.theme.theme()),
        Command::Theme(Some(name)) => match app.theme.set_theme(&name) {
            Ok(()) => println!("theme: {name}"),
            Err(e) => println!("! could not save theme: {e}"),
        },
        Command::Online => {
            let online = app.session.online_users();
            if online.is_empty() {
                println!("nobody online");
            }
            for id in online {
                let name = app.chat.correspondent(id).map(|c| c.full_name()).unwrap_or_else(|| id.clone());
                println!("* {name}");
            }
        }
        Command::WhoAmI => match app.session.user() {
            Some(u) => println!("{} (@{}, {})", u.full_name(), u.username, u.email),
            None => println!("not signed in"),
        },
        Command::Help => println!("{}", commands::HELP),
        Command::Quit => return false,
    }
    true
}
