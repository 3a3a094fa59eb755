use crate::error::{AppError, Result};
use crate::essay::EssayService;
use crate::services::{Message, TelegramClient};

const LIST_LIMIT: u32 = 10;

pub const USAGE: &str = "Commands:\n/list - latest essays\n/essay <id> - read and listen to an essay";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    List,
    Essay(String),
}

/// Parses a chat message into a bot command. Anything that is not one of the
/// known commands is ignored.
pub fn parse_command(text: &str) -> Option<Command> {
    let mut parts = text.split_whitespace();
    let head = parts.next()?.strip_prefix('/')?;
    // Group chats address commands as /list@my_bot
    let name = head.split('@').next().unwrap_or(head);

    match name {
        "start" | "help" => Some(Command::Help),
        "list" => Some(Command::List),
        "essay" => Some(match parts.next() {
            Some(id) => Command::Essay(id.to_string()),
            None => Command::Help,
        }),
        _ => None,
    }
}

pub async fn handle_message(
    client: &TelegramClient,
    essays: &EssayService,
    message: &Message,
) -> Result<()> {
    let Some(command) = message.text.as_deref().and_then(parse_command) else {
        return Ok(());
    };
    let chat_id = message.chat.id;
    tracing::debug!("Bot command {:?} from chat {}", command, chat_id);

    match command {
        Command::Help => {
            client.send_message(chat_id, USAGE).await?;
        }
        Command::List => {
            let latest = essays.list("", Some(LIST_LIMIT), None).await?;
            let text = if latest.is_empty() {
                "No essays yet.".to_string()
            } else {
                latest
                    .iter()
                    .map(|e| format!("{} ({})", e.title, e.id))
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            client.send_message(chat_id, &text).await?;
        }
        Command::Essay(id) => send_essay(client, essays, chat_id, &id).await?,
    }
    Ok(())
}

async fn send_essay(
    client: &TelegramClient,
    essays: &EssayService,
    chat_id: i64,
    id: &str,
) -> Result<()> {
    let essay = match essays.detail(id).await {
        Ok(essay) => essay,
        Err(AppError::NotFound(_)) => {
            client
                .send_message(chat_id, &format!("Essay {id} not found."))
                .await?;
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    let text = if essay.telegraph.is_empty() {
        essay.title.clone()
    } else {
        format!("{}\n{}", essay.title, essay.telegraph)
    };
    client.send_message(chat_id, &text).await?;

    if !essay.file_id.is_empty() {
        client
            .send_audio(chat_id, &essay.file_id, &essay.title, None)
            .await?;
    } else if !essay.file.is_empty() {
        let file_id = client
            .send_audio(chat_id, &essay.file, &essay.title, None)
            .await?;
        if let Some(file_id) = file_id {
            essays.update_file_id(&essay.id, &file_id).await?;
        }
    } else {
        client
            .send_message(chat_id, "Audio is not ready yet.")
            .await?;
    }
    Ok(())
}
