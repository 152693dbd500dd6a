use crate::api::models::{SignInRequest, SignUpRequest};

pub const HELP: &str = "\
commands:
  /signup <name> <last name> <username> <email> <birthdate> <password>
  /login <email> <password>
  /logout
  /users                 refresh and list conversations
  /open <n|id|name>      open a conversation
  /close                 close the current conversation
  /delete <message id>
  /bio <text>            update your bio
  /avatar <image file>   upload a new profile picture
  /theme [name]          show or set the theme
  /online                list online users
  /whoami
  /help
  /quit
anything else is sent to the open conversation";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SignUp(SignUpRequest),
    SignIn(SignInRequest),
    SignOut,
    Users,
    Open(String),
    Close,
    Send(String),
    Delete(String),
    Bio(String),
    Avatar(String),
    Theme(Option<String>),
    Online,
    WhoAmI,
    Help,
    Quit,
}

/// Parse one input line. `Ok(None)` for blank input, `Err` with a usage hint
/// for malformed commands.
pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(Command::Send(line.to_string())));
    };
    let (name, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let args = args.trim();
    let words: Vec<&str> = args.split_whitespace().collect();

    let cmd = match name {
        "signup" => match words.as_slice() {
            [name, last_name, username, email, dob, password] => Command::SignUp(SignUpRequest {
                name: name.to_string(),
                last_name: last_name.to_string(),
                username: username.to_string(),
                email: email.to_string(),
                date_of_birth: dob.to_string(),
                password: password.to_string(),
            }),
            _ => return Err("usage: /signup <name> <last name> <username> <email> <birthdate> <password>".into()),
        },
        "login" => match words.as_slice() {
            [email, password] => Command::SignIn(SignInRequest {
                email: email.to_string(),
                password: password.to_string(),
            }),
            _ => return Err("usage: /login <email> <password>".into()),
        },
        "logout" => Command::SignOut,
        "users" => Command::Users,
        "open" if !args.is_empty() => Command::Open(args.to_string()),
        "open" => return Err("usage: /open <n|id|name>".into()),
        "close" => Command::Close,
        "delete" if words.len() == 1 => Command::Delete(words[0].to_string()),
        "delete" => return Err("usage: /delete <message id>".into()),
        "bio" => Command::Bio(args.to_string()),
        "avatar" if !args.is_empty() => Command::Avatar(args.to_string()),
        "avatar" => return Err("usage: /avatar <image file>".into()),
        "theme" => Command::Theme(words.first().map(|s| s.to_string())),
        "online" => Command::Online,
        "whoami" => Command::WhoAmI,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("unknown command /{other}, try /help")),
    };
    Ok(Some(cmd))
}
