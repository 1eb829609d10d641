//! Telegram bot module - questionnaire dialogue over teloxide

use std::sync::Arc;

use teloxide::{
    dispatching::dialogue::{Dialogue, InMemStorage},
    prelude::*,
    types::{ChatAction, ChatId, InlineKeyboardButton, InlineKeyboardMarkup, UserId},
    utils::command::BotCommands,
};
use tracing::{info, warn};

use crate::dialogue::{Button, Callback, Conversation, Input, PostAction, Reply, State};

type MyDialogue = Dialogue<State, InMemStorage<State>>;
type HandlerResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Telegram message limit, in UTF-16 code units
const MESSAGE_LIMIT: usize = 4096;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Команды бота:")]
pub enum Command {
    #[command(description = "Составить тренировку")]
    Start,
    #[command(description = "Отменить текущий опрос")]
    Cancel,
    #[command(description = "Показать помощь")]
    Help,
}

fn make_keyboard(rows: &[Vec<Button>]) -> InlineKeyboardMarkup {
    let buttons: Vec<Vec<InlineKeyboardButton>> = rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| InlineKeyboardButton::callback(b.label.clone(), b.callback.token()))
                .collect()
        })
        .collect();

    InlineKeyboardMarkup::new(buttons)
}

/// Cut text into non-blank chunks of at most `limit` UTF-16 units, preferring line breaks
fn split_message(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.encode_utf16().count();
        if current_len + line_len > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len <= limit {
            current.push_str(line);
            current_len += line_len;
            continue;
        }
        // Line longer than the limit on its own
        for ch in line.chars() {
            let ch_len = ch.len_utf16();
            if current_len + ch_len > limit {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            current.push(ch);
            current_len += ch_len;
        }
    }
    chunks.push(current);

    chunks.retain(|c| !c.trim().is_empty());
    chunks
}

/// Sessions are keyed by user, dialogues by chat; they coincide only in private chats
fn from_private_chat(msg: Message) -> bool {
    msg.chat.is_private()
}

fn callback_from_private_chat(q: CallbackQuery) -> bool {
    q.message.as_ref().is_some_and(|m| m.chat().is_private())
}

/// Start the Telegram bot; runs until Ctrl+C
pub async fn run_bot(token: String, conversation: Conversation) -> anyhow::Result<()> {
    let bot = Bot::new(token);
    let conversation = Arc::new(conversation);

    bot.set_my_commands(Command::bot_commands()).await?;

    let handler = dptree::entry()
        .enter_dialogue::<Update, InMemStorage<State>, State>()
        .branch(
            Update::filter_message()
                .filter(from_private_chat)
                .filter_command::<Command>()
                .endpoint(handle_command),
        )
        .branch(
            Update::filter_message()
                .filter(from_private_chat)
                .endpoint(handle_message),
        )
        .branch(
            Update::filter_callback_query()
                .filter(callback_from_private_chat)
                .endpoint(handle_callback),
        );

    info!("Bot started");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![InMemStorage::<State>::new(), conversation])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

/// Run one input through the state machine and persist the next state
async fn step(
    bot: &Bot,
    chat_id: ChatId,
    user: UserId,
    dialogue: &MyDialogue,
    conversation: &Conversation,
    input: Input,
) -> HandlerResult<Vec<Reply>> {
    let state = dialogue.get().await?.unwrap_or_default();

    if Conversation::may_generate(&state, &input) {
        bot.send_chat_action(chat_id, ChatAction::Typing).await?;
    }

    let outcome = conversation.handle(user, state, input).await;
    dialogue.update(outcome.state).await?;
    Ok(outcome.replies)
}

async fn send_replies(bot: &Bot, chat_id: ChatId, replies: Vec<Reply>) -> HandlerResult {
    for reply in replies {
        let (text, keyboard) = match reply {
            Reply::Text(text) | Reply::Notice(text) => (text, None),
            Reply::Keyboard { text, buttons } => (text, Some(make_keyboard(&buttons))),
        };

        let mut chunks = split_message(&text, MESSAGE_LIMIT);
        let Some(last) = chunks.pop() else {
            warn!(chat = %chat_id, "skipping blank reply");
            continue;
        };
        for chunk in chunks {
            bot.send_message(chat_id, chunk).await?;
        }
        // Keyboard goes under the final part
        match keyboard {
            Some(keyboard) => bot.send_message(chat_id, last).reply_markup(keyboard).await?,
            None => bot.send_message(chat_id, last).await?,
        };
    }
    Ok(())
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    dialogue: MyDialogue,
    conversation: Arc<Conversation>,
) -> HandlerResult {
    let Some(user) = msg.from.as_ref().map(|u| u.id) else {
        return Ok(());
    };

    let input = match cmd {
        Command::Start => Input::Start,
        Command::Cancel => Input::Cancel,
        Command::Help => {
            bot.send_message(msg.chat.id, Command::descriptions().to_string())
                .await?;
            return Ok(());
        }
    };

    let replies = step(&bot, msg.chat.id, user, &dialogue, &conversation, input).await?;
    send_replies(&bot, msg.chat.id, replies).await
}

async fn handle_message(
    bot: Bot,
    msg: Message,
    dialogue: MyDialogue,
    conversation: Arc<Conversation>,
) -> HandlerResult {
    let Some(user) = msg.from.as_ref().map(|u| u.id) else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        bot.send_message(msg.chat.id, "Я понимаю только текст. Напиши /start")
            .await?;
        return Ok(());
    };

    let input = Input::Text(text.to_string());
    let replies = step(&bot, msg.chat.id, user, &dialogue, &conversation, input).await?;
    send_replies(&bot, msg.chat.id, replies).await
}

async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    dialogue: MyDialogue,
    conversation: Arc<Conversation>,
) -> HandlerResult {
    let callback = q.data.as_deref().and_then(Callback::parse);
    let chat_id = q.message.as_ref().map(|m| m.chat().id);

    let (Some(callback), Some(chat_id)) = (callback, chat_id) else {
        warn!(user = %q.from.id, data = ?q.data, "unknown callback");
        bot.answer_callback_query(q.id).await?;
        return Ok(());
    };

    // Generation can outlast the callback answer window, so answer right away
    let answered_early = matches!(callback, Callback::Action(PostAction::Regenerate));
    if answered_early {
        bot.answer_callback_query(q.id.clone()).await?;
    }

    let replies = step(&bot, chat_id, q.from.id, &dialogue, &conversation, Input::Button(callback)).await?;

    if answered_early {
        return send_replies(&bot, chat_id, replies).await;
    }

    // Notices go into the callback answer, everything else into the chat
    let (notices, messages): (Vec<Reply>, Vec<Reply>) =
        replies.into_iter().partition(|r| matches!(r, Reply::Notice(_)));

    let answer = bot.answer_callback_query(q.id);
    match notices.first() {
        Some(notice) => answer.text(notice.text()).await?,
        None => answer.await?,
    };

    send_replies(&bot, chat_id, messages).await
}
