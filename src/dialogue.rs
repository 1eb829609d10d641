//! Conversation state machine - questionnaire, generation and the post-generation menu
//!
//! Transport independent: takes the current [`State`] and an [`Input`], returns the
//! next state plus the replies to render. The Telegram adapter lives in `bot`.

use std::sync::Arc;

use teloxide::types::UserId;
use tracing::{error, info, warn};

use crate::generation::GenerationClient;
use crate::prompt::build_prompt;
use crate::session::{Session, SessionError, SessionStore};
use crate::workout::{Choice, Goal, HEIGHT_RANGE, Level, StatsError, WEIGHT_RANGE, WorkoutType, parse_stats};

/// How many workouts "show history" renders
pub const HISTORY_SHOWN: usize = 3;
/// Per-entry character cap in the history view
pub const HISTORY_PREVIEW_CHARS: usize = 1000;

#[derive(Clone, Debug, Default, PartialEq)]
pub enum State {
    /// No active dialogue
    #[default]
    Idle,
    AwaitGoal,
    AwaitLevel {
        goal: Goal,
    },
    AwaitType {
        goal: Goal,
        level: Level,
    },
    AwaitStats {
        goal: Goal,
        level: Level,
        workout_type: WorkoutType,
    },
    /// Post-generation menu
    Terminal,
}

impl State {
    fn is_collecting(&self) -> bool {
        matches!(
            self,
            State::AwaitGoal | State::AwaitLevel { .. } | State::AwaitType { .. } | State::AwaitStats { .. }
        )
    }
}

/// Actions offered after a workout has been generated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostAction {
    Regenerate,
    ShowHistory,
    BackToLast,
    NewRequest,
}

impl PostAction {
    fn id(&self) -> &'static str {
        match self {
            PostAction::Regenerate => "regenerate",
            PostAction::ShowHistory => "history",
            PostAction::BackToLast => "last",
            PostAction::NewRequest => "new",
        }
    }

    fn all() -> &'static [PostAction] {
        &[
            PostAction::Regenerate,
            PostAction::ShowHistory,
            PostAction::BackToLast,
            PostAction::NewRequest,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            PostAction::Regenerate => "🔄 Другой вариант",
            PostAction::ShowHistory => "📜 История",
            PostAction::BackToLast => "↩️ К последней",
            PostAction::NewRequest => "🆕 Новый запрос",
        }
    }
}

/// Button payload; the adapter echoes the token back verbatim on press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callback {
    Goal(Goal),
    Level(Level),
    Type(WorkoutType),
    Action(PostAction),
}

impl Callback {
    pub fn token(&self) -> String {
        match self {
            Callback::Goal(g) => format!("goal:{}", g.id()),
            Callback::Level(l) => format!("level:{}", l.id()),
            Callback::Type(t) => format!("type:{}", t.id()),
            Callback::Action(a) => format!("act:{}", a.id()),
        }
    }

    pub fn parse(token: &str) -> Option<Self> {
        let (kind, id) = token.split_once(':')?;
        match kind {
            "goal" => Goal::from_id(id).map(Callback::Goal),
            "level" => Level::from_id(id).map(Callback::Level),
            "type" => WorkoutType::from_id(id).map(Callback::Type),
            "act" => PostAction::all()
                .iter()
                .find(|a| a.id() == id)
                .map(|a| Callback::Action(*a)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Button {
    pub label: String,
    pub callback: Callback,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text(String),
    Keyboard { text: String, buttons: Vec<Vec<Button>> },
    /// Transient notice (callback answer), not a chat message
    Notice(String),
}

impl Reply {
    pub fn text(&self) -> &str {
        match self {
            Reply::Text(text) | Reply::Notice(text) => text,
            Reply::Keyboard { text, .. } => text,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Start,
    Cancel,
    Text(String),
    Button(Callback),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub state: State,
    pub replies: Vec<Reply>,
}

impl Outcome {
    fn new(state: State, reply: Reply) -> Self {
        Self { state, replies: vec![reply] }
    }
}

const CANCELLED: &str = "Окей, отмена. Если хочешь начать заново — напиши /start.";
const NOTHING_TO_CANCEL: &str = "Сейчас нечего отменять. Напиши /start, чтобы составить тренировку.";
const IDLE_HINT: &str = "Напиши /start, чтобы составить тренировку.";
const STALE_BUTTON: &str = "Эта кнопка уже неактуальна. Начни заново: /start";
const EXPIRED: &str = "Данные устарели. Начни заново: /start";
const GENERATION_FAILED: &str = "Не удалось составить тренировку 😔 Попробуй ещё раз чуть позже.";
const HISTORY_EMPTY: &str = "История пуста";
const STATS_HINT: &str = "Напиши рост и вес через пробел, например: 185 75";

/// Drives one user's dialogue; shared across all users
pub struct Conversation {
    store: Arc<dyn SessionStore>,
    generator: Arc<dyn GenerationClient>,
}

impl Conversation {
    pub fn new(store: Arc<dyn SessionStore>, generator: Arc<dyn GenerationClient>) -> Self {
        Self { store, generator }
    }

    /// Whether handling this input will call the generation backend
    pub fn may_generate(state: &State, input: &Input) -> bool {
        matches!(
            (state, input),
            (State::AwaitStats { .. }, Input::Text(_)) | (_, Input::Button(Callback::Action(PostAction::Regenerate)))
        )
    }

    pub async fn handle(&self, user: UserId, state: State, input: Input) -> Outcome {
        match input {
            Input::Start => {
                info!(user = %user, "questionnaire started");
                Outcome::new(State::AwaitGoal, ask_goal())
            }
            Input::Cancel if state.is_collecting() => {
                info!(user = %user, "dialogue cancelled");
                Outcome::new(State::Idle, Reply::Text(CANCELLED.to_string()))
            }
            Input::Cancel => Outcome::new(state, Reply::Text(NOTHING_TO_CANCEL.to_string())),
            Input::Button(Callback::Action(action)) => self.post_action(user, state, action).await,
            input => self.answer(user, state, input).await,
        }
    }

    /// Questionnaire answers (free text or choice buttons)
    async fn answer(&self, user: UserId, state: State, input: Input) -> Outcome {
        match state {
            State::Idle => match input {
                Input::Button(_) => Outcome::new(State::Idle, Reply::Notice(STALE_BUTTON.to_string())),
                _ => Outcome::new(State::Idle, Reply::Text(IDLE_HINT.to_string())),
            },

            State::AwaitGoal => match pick::<Goal>(&input, |c| match c {
                Callback::Goal(g) => Some(g),
                _ => None,
            }) {
                Some(goal) => Outcome::new(State::AwaitLevel { goal }, ask_level(goal)),
                None => Outcome::new(State::AwaitGoal, ask_goal()),
            },

            State::AwaitLevel { goal } => match pick::<Level>(&input, |c| match c {
                Callback::Level(l) => Some(l),
                _ => None,
            }) {
                Some(level) => Outcome::new(State::AwaitType { goal, level }, ask_type(level)),
                None => Outcome::new(State::AwaitLevel { goal }, ask_level(goal)),
            },

            State::AwaitType { goal, level } => match pick::<WorkoutType>(&input, |c| match c {
                Callback::Type(t) => Some(t),
                _ => None,
            }) {
                Some(workout_type) => Outcome::new(
                    State::AwaitStats { goal, level, workout_type },
                    Reply::Text(format!(
                        "Формат: {}.\n\n{}",
                        workout_type.name_ru(),
                        STATS_HINT
                    )),
                ),
                None => Outcome::new(State::AwaitType { goal, level }, ask_type(level)),
            },

            State::AwaitStats { goal, level, workout_type } => {
                let current = State::AwaitStats { goal, level, workout_type };
                let Input::Text(text) = input else {
                    return Outcome::new(current, Reply::Text(STATS_HINT.to_string()));
                };
                match parse_stats(&text) {
                    Ok(stats) => {
                        let session = Session::new(goal, level, workout_type, stats);
                        info!(
                            user = %user,
                            goal = goal.id(),
                            level = level.id(),
                            workout_type = workout_type.id(),
                            height_cm = stats.height_cm,
                            weight_kg = stats.weight_kg,
                            "questionnaire completed"
                        );
                        self.store.put(user, session.clone()).await;
                        let reply = self.generate_and_record(user, &session).await;
                        Outcome::new(State::Terminal, reply)
                    }
                    Err(e) => {
                        warn!(user = %user, error = %e, "invalid stats");
                        Outcome::new(current, Reply::Text(stats_error_text(&e)))
                    }
                }
            }

            State::Terminal => match input {
                Input::Button(_) => Outcome::new(State::Terminal, Reply::Notice(STALE_BUTTON.to_string())),
                _ => Outcome::new(
                    State::Terminal,
                    Reply::Keyboard {
                        text: "Выбери действие 👇".to_string(),
                        buttons: action_menu(),
                    },
                ),
            },
        }
    }

    async fn post_action(&self, user: UserId, state: State, action: PostAction) -> Outcome {
        let reply = match (action, self.store.get(user).await) {
            (PostAction::NewRequest, _) => {
                self.store.delete(user).await;
                info!(user = %user, "session reset for new request");
                return Outcome::new(State::AwaitGoal, ask_goal());
            }
            (action, None) => {
                warn!(user = %user, action = action.id(), "{}", SessionError::Missing(user));
                Reply::Text(EXPIRED.to_string())
            }
            (PostAction::Regenerate, Some(session)) => self.generate_and_record(user, &session).await,
            (PostAction::ShowHistory, Some(session)) if session.history.is_empty() => {
                Reply::Notice(HISTORY_EMPTY.to_string())
            }
            (PostAction::ShowHistory, Some(session)) => Reply::Keyboard {
                text: render_history(session.recent(HISTORY_SHOWN)),
                buttons: action_menu(),
            },
            (PostAction::BackToLast, Some(session)) => match session.last() {
                Some(last) => Reply::Keyboard {
                    text: last.to_string(),
                    buttons: action_menu(),
                },
                None => Reply::Notice(HISTORY_EMPTY.to_string()),
            },
        };
        Outcome::new(state, reply)
    }

    /// One generation attempt; history changes only on success
    async fn generate_and_record(&self, user: UserId, session: &Session) -> Reply {
        let prompt = build_prompt(
            session.goal,
            session.height_cm,
            session.weight_kg,
            session.level,
            session.workout_type,
        );

        let text = match self.generator.generate(&prompt).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                warn!(user = %user, "generation returned blank text");
                return Reply::Keyboard {
                    text: GENERATION_FAILED.to_string(),
                    buttons: action_menu(),
                };
            }
            Err(e) => {
                error!(user = %user, error = %e, "generation failed");
                return Reply::Keyboard {
                    text: GENERATION_FAILED.to_string(),
                    buttons: action_menu(),
                };
            }
        };

        if let Err(e) = self.store.append_history(user, text.clone()).await {
            // Session was reset while the request was in flight
            warn!(user = %user, error = %e, "dropping generated workout");
            return Reply::Text(EXPIRED.to_string());
        }

        info!(user = %user, len = text.len(), "workout generated");
        Reply::Keyboard {
            text,
            buttons: action_menu(),
        }
    }
}

/// Resolve a choice from its button or from a typed label
fn pick<C: Choice>(input: &Input, from_callback: impl Fn(Callback) -> Option<C>) -> Option<C> {
    match input {
        Input::Button(callback) => from_callback(*callback),
        Input::Text(text) => C::from_label(text),
        _ => None,
    }
}

fn choice_buttons<C: Choice>(emoji: impl Fn(&C) -> &'static str, callback: impl Fn(C) -> Callback) -> Vec<Vec<Button>> {
    C::variants()
        .iter()
        .map(|c| {
            vec![Button {
                label: format!("{} {}", emoji(c), c.label()),
                callback: callback(*c),
            }]
        })
        .collect()
}

fn ask_goal() -> Reply {
    Reply::Keyboard {
        text: "Привет! Я твой тренер-бот 🏋️\n\nКакая у тебя цель?".to_string(),
        buttons: choice_buttons::<Goal>(Goal::emoji, Callback::Goal),
    }
}

fn ask_level(goal: Goal) -> Reply {
    Reply::Keyboard {
        text: format!("Цель: {}.\n\nКакой у тебя уровень подготовки?", goal.name_ru()),
        buttons: choice_buttons::<Level>(Level::emoji, Callback::Level),
    }
}

fn ask_type(level: Level) -> Reply {
    Reply::Keyboard {
        text: format!("Уровень: {}.\n\nКакой формат тренировки предпочитаешь?", level.name_ru()),
        buttons: choice_buttons::<WorkoutType>(WorkoutType::emoji, Callback::Type),
    }
}

fn action_menu() -> Vec<Vec<Button>> {
    let button = |action: PostAction| Button {
        label: action.label().to_string(),
        callback: Callback::Action(action),
    };
    vec![
        vec![button(PostAction::Regenerate), button(PostAction::ShowHistory)],
        vec![button(PostAction::BackToLast)],
        vec![button(PostAction::NewRequest)],
    ]
}

fn stats_error_text(error: &StatsError) -> String {
    let problem = match error {
        StatsError::TokenCount(_) | StatsError::NotANumber(_) => "Нужно два целых числа.".to_string(),
        StatsError::HeightOutOfRange(_) => format!(
            "Рост должен быть от {} до {} см.",
            HEIGHT_RANGE.start(),
            HEIGHT_RANGE.end()
        ),
        StatsError::WeightOutOfRange(_) => format!(
            "Вес должен быть от {} до {} кг.",
            WEIGHT_RANGE.start(),
            WEIGHT_RANGE.end()
        ),
    };
    format!("{} {}", problem, STATS_HINT)
}

fn render_history(entries: &[String]) -> String {
    let mut text = String::from("📜 Последние тренировки:\n");
    for (i, entry) in entries.iter().enumerate() {
        text.push_str(&format!("\n{}. {}\n", i + 1, truncate(entry, HISTORY_PREVIEW_CHARS)));
    }
    text
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::GenerationError;
    use crate::session::InMemorySessionStore;
    use crate::workout::Stats;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const USER: UserId = UserId(1);

    /// Records prompts; echoes them back or fails
    struct FakeGenerator {
        fail: bool,
        // Fixed reply instead of the numbered plan
        canned: Option<&'static str>,
        prompts: Mutex<Vec<String>>,
    }

    impl FakeGenerator {
        fn ok() -> Arc<Self> {
            Arc::new(Self { fail: false, canned: None, prompts: Mutex::new(Vec::new()) })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self { fail: true, canned: None, prompts: Mutex::new(Vec::new()) })
        }

        fn replying(text: &'static str) -> Arc<Self> {
            Arc::new(Self { fail: false, canned: Some(text), prompts: Mutex::new(Vec::new()) })
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl GenerationClient for FakeGenerator {
        async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
            let n = {
                let mut prompts = self.prompts.lock().unwrap();
                prompts.push(prompt.to_string());
                prompts.len()
            };
            tokio::task::yield_now().await;
            if self.fail {
                return Err(GenerationError::UpstreamStatus { code: 500, body: "boom".into() });
            }
            match self.canned {
                Some(text) => Ok(text.to_string()),
                None => Ok(format!("plan #{}: {}", n, prompt)),
            }
        }
    }

    fn setup(generator: Arc<FakeGenerator>) -> (Conversation, Arc<InMemorySessionStore>) {
        let store = Arc::new(InMemorySessionStore::default());
        let conversation = Conversation::new(store.clone(), generator);
        (conversation, store)
    }

    fn stats_state() -> State {
        State::AwaitStats {
            goal: Goal::Strength,
            level: Level::Beginner,
            workout_type: WorkoutType::FullBody,
        }
    }

    async fn seed(store: &InMemorySessionStore, user: UserId, height_cm: u32, entries: usize) {
        let session = Session::new(
            Goal::MassGain,
            Level::Advanced,
            WorkoutType::Split,
            Stats { height_cm, weight_kg: 80 },
        );
        store.put(user, session).await;
        for i in 1..=entries {
            store.append_history(user, format!("entry {}", i)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_full_questionnaire() {
        let generator = FakeGenerator::ok();
        let (conv, store) = setup(generator.clone());

        let out = conv.handle(USER, State::Idle, Input::Start).await;
        assert_eq!(out.state, State::AwaitGoal);

        let out = conv.handle(USER, out.state, Input::Button(Callback::Goal(Goal::Strength))).await;
        assert_eq!(out.state, State::AwaitLevel { goal: Goal::Strength });

        let out = conv.handle(USER, out.state, Input::Button(Callback::Level(Level::Beginner))).await;
        assert_eq!(out.state, State::AwaitType { goal: Goal::Strength, level: Level::Beginner });

        let out = conv
            .handle(USER, out.state, Input::Button(Callback::Type(WorkoutType::FullBody)))
            .await;
        assert_eq!(out.state, stats_state());
        assert!(store.get(USER).await.is_none());

        let out = conv.handle(USER, out.state, Input::Text("185 75".into())).await;
        assert_eq!(out.state, State::Terminal);
        assert_eq!(generator.calls(), 1);

        let prompt = generator.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("185"));
        assert!(prompt.contains("75"));
        assert!(prompt.contains(Goal::Strength.name_ru()));
        assert!(prompt.contains(Level::Beginner.name_ru()));
        assert!(prompt.contains(WorkoutType::FullBody.name_ru()));

        let session = store.get(USER).await.unwrap();
        assert_eq!(session.history.len(), 1);
        assert_eq!(session.height_cm, 185);
        assert!(matches!(&out.replies[0], Reply::Keyboard { buttons, .. } if buttons == &action_menu()));
    }

    #[tokio::test]
    async fn test_typed_goal_accepted() {
        let (conv, _) = setup(FakeGenerator::ok());
        let out = conv.handle(USER, State::AwaitGoal, Input::Text("Сушка".into())).await;
        assert_eq!(out.state, State::AwaitLevel { goal: Goal::Cutting });
    }

    #[tokio::test]
    async fn test_invalid_choice_reprompts() {
        let (conv, _) = setup(FakeGenerator::ok());

        let out = conv.handle(USER, State::AwaitGoal, Input::Text("хочу летать".into())).await;
        assert_eq!(out.state, State::AwaitGoal);
        assert_eq!(out.replies, vec![ask_goal()]);

        let level_state = State::AwaitLevel { goal: Goal::MassGain };
        let out = conv
            .handle(USER, level_state.clone(), Input::Button(Callback::Goal(Goal::Cutting)))
            .await;
        assert_eq!(out.state, level_state);
    }

    #[tokio::test]
    async fn test_invalid_stats_keep_state() {
        let generator = FakeGenerator::ok();
        let (conv, store) = setup(generator.clone());

        for text in ["99 70", "251 70", "180 29", "180 201", "185", "185 75 1", "abc 75", "185,75"] {
            let out = conv.handle(USER, stats_state(), Input::Text(text.into())).await;
            assert_eq!(out.state, stats_state(), "input {:?}", text);
            assert!(out.replies[0].text().contains("185 75"));
        }

        assert_eq!(generator.calls(), 0);
        assert!(store.get(USER).await.is_none());
    }

    #[tokio::test]
    async fn test_invalid_stats_do_not_touch_existing_session() {
        let (conv, store) = setup(FakeGenerator::ok());
        seed(&store, USER, 170, 2).await;
        let before = store.get(USER).await.unwrap();

        conv.handle(USER, stats_state(), Input::Text("300 70".into())).await;
        assert_eq!(store.get(USER).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_stats_error_mentions_bounds() {
        let (conv, _) = setup(FakeGenerator::ok());
        let out = conv.handle(USER, stats_state(), Input::Text("300 70".into())).await;
        assert!(out.replies[0].text().contains("100 до 250"));
    }

    #[tokio::test]
    async fn test_initial_generation_failure() {
        let (conv, store) = setup(FakeGenerator::failing());
        let out = conv.handle(USER, stats_state(), Input::Text("185 75".into())).await;

        assert_eq!(out.state, State::Terminal);
        assert_eq!(out.replies[0].text(), GENERATION_FAILED);
        let session = store.get(USER).await.unwrap();
        assert!(session.history.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_discards_context() {
        let (conv, store) = setup(FakeGenerator::ok());
        seed(&store, USER, 170, 1).await;

        let out = conv.handle(USER, stats_state(), Input::Cancel).await;
        assert_eq!(out.state, State::Idle);
        assert_eq!(out.replies[0].text(), CANCELLED);
        // committed session survives
        assert!(store.get(USER).await.is_some());

        let out = conv.handle(USER, State::Terminal, Input::Cancel).await;
        assert_eq!(out.state, State::Terminal);
        assert_eq!(out.replies[0].text(), NOTHING_TO_CANCEL);
    }

    #[tokio::test]
    async fn test_regenerate_success_appends() {
        let generator = FakeGenerator::ok();
        let (conv, store) = setup(generator.clone());
        seed(&store, USER, 170, 2).await;

        let out = conv
            .handle(USER, State::Terminal, Input::Button(Callback::Action(PostAction::Regenerate)))
            .await;
        assert_eq!(out.state, State::Terminal);
        assert_eq!(generator.calls(), 1);

        let session = store.get(USER).await.unwrap();
        assert_eq!(session.history.len(), 3);
        assert_eq!(session.goal, Goal::MassGain);
        assert_eq!(out.replies[0].text(), session.last().unwrap());
    }

    #[tokio::test]
    async fn test_regenerate_failure_keeps_history() {
        let (conv, store) = setup(FakeGenerator::failing());
        seed(&store, USER, 170, 2).await;

        let out = conv
            .handle(USER, State::Terminal, Input::Button(Callback::Action(PostAction::Regenerate)))
            .await;
        assert_eq!(out.replies[0].text(), GENERATION_FAILED);
        assert_eq!(store.get(USER).await.unwrap().history.len(), 2);
    }

    #[tokio::test]
    async fn test_blank_generation_is_not_recorded() {
        let (conv, store) = setup(FakeGenerator::replying("  \n "));

        let out = conv.handle(USER, stats_state(), Input::Text("180 80".into())).await;
        assert_eq!(out.state, State::Terminal);
        assert_eq!(out.replies[0].text(), GENERATION_FAILED);
        assert!(store.get(USER).await.unwrap().history.is_empty());

        let out = conv
            .handle(USER, State::Terminal, Input::Button(Callback::Action(PostAction::Regenerate)))
            .await;
        assert_eq!(out.replies[0].text(), GENERATION_FAILED);
        assert!(store.get(USER).await.unwrap().history.is_empty());
    }

    #[tokio::test]
    async fn test_regenerate_without_session() {
        let generator = FakeGenerator::ok();
        let (conv, _) = setup(generator.clone());

        let out = conv
            .handle(USER, State::Terminal, Input::Button(Callback::Action(PostAction::Regenerate)))
            .await;
        assert_eq!(out.replies, vec![Reply::Text(EXPIRED.to_string())]);
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_show_history_last_three() {
        let (conv, store) = setup(FakeGenerator::ok());
        seed(&store, USER, 170, 5).await;

        let out = conv
            .handle(USER, State::Terminal, Input::Button(Callback::Action(PostAction::ShowHistory)))
            .await;
        let text = out.replies[0].text();
        assert!(!text.contains("entry 1"));
        assert!(!text.contains("entry 2"));
        let p3 = text.find("entry 3").unwrap();
        let p4 = text.find("entry 4").unwrap();
        let p5 = text.find("entry 5").unwrap();
        assert!(p3 < p4 && p4 < p5);
        assert_eq!(store.get(USER).await.unwrap().history.len(), 5);
    }

    #[tokio::test]
    async fn test_show_history_truncates_entries() {
        let (conv, store) = setup(FakeGenerator::ok());
        seed(&store, USER, 170, 0).await;
        store.append_history(USER, "я".repeat(HISTORY_PREVIEW_CHARS + 50)).await.unwrap();

        let out = conv
            .handle(USER, State::Terminal, Input::Button(Callback::Action(PostAction::ShowHistory)))
            .await;
        let text = out.replies[0].text();
        assert!(text.contains('…'));
        assert_eq!(text.matches('я').count(), HISTORY_PREVIEW_CHARS);
    }

    #[tokio::test]
    async fn test_show_history_empty_is_notice() {
        let (conv, store) = setup(FakeGenerator::ok());
        seed(&store, USER, 170, 0).await;

        let out = conv
            .handle(USER, State::Terminal, Input::Button(Callback::Action(PostAction::ShowHistory)))
            .await;
        assert_eq!(out.replies, vec![Reply::Notice(HISTORY_EMPTY.to_string())]);
        assert_eq!(out.state, State::Terminal);
    }

    #[tokio::test]
    async fn test_back_to_last() {
        let (conv, store) = setup(FakeGenerator::ok());
        seed(&store, USER, 170, 2).await;

        let out = conv
            .handle(USER, State::Terminal, Input::Button(Callback::Action(PostAction::BackToLast)))
            .await;
        assert_eq!(
            out.replies,
            vec![Reply::Keyboard { text: "entry 2".to_string(), buttons: action_menu() }]
        );

        store.delete(USER).await;
        seed(&store, USER, 170, 0).await;
        let out = conv
            .handle(USER, State::Terminal, Input::Button(Callback::Action(PostAction::BackToLast)))
            .await;
        assert_eq!(out.replies, vec![Reply::Notice(HISTORY_EMPTY.to_string())]);
    }

    #[tokio::test]
    async fn test_new_request_resets() {
        let (conv, store) = setup(FakeGenerator::ok());

        for state in [State::Idle, State::AwaitGoal, stats_state(), State::Terminal] {
            seed(&store, USER, 170, 1).await;
            let out = conv
                .handle(USER, state, Input::Button(Callback::Action(PostAction::NewRequest)))
                .await;
            assert_eq!(out.state, State::AwaitGoal);
            assert!(store.get(USER).await.is_none());
        }
    }

    #[tokio::test]
    async fn test_concurrent_regenerate_isolated() {
        let generator = FakeGenerator::ok();
        let (conv, store) = setup(generator.clone());
        let alice = UserId(10);
        let bob = UserId(20);
        seed(&store, alice, 180, 1).await;
        seed(&store, bob, 160, 1).await;

        let regenerate = Input::Button(Callback::Action(PostAction::Regenerate));
        tokio::join!(
            conv.handle(alice, State::Terminal, regenerate.clone()),
            conv.handle(bob, State::Terminal, regenerate.clone()),
            conv.handle(alice, State::Terminal, regenerate.clone()),
        );

        let alice_history = store.get(alice).await.unwrap().history;
        let bob_history = store.get(bob).await.unwrap().history;
        assert_eq!(alice_history.len(), 3);
        assert_eq!(bob_history.len(), 2);
        assert!(alice_history[1..].iter().all(|h| h.contains("180 см")));
        assert!(bob_history[1..].iter().all(|h| h.contains("160 см")));
    }

    #[test]
    fn test_callback_tokens() {
        let all = [
            Callback::Goal(Goal::MassGain),
            Callback::Level(Level::Advanced),
            Callback::Type(WorkoutType::CardioStrength),
            Callback::Action(PostAction::ShowHistory),
            Callback::Action(PostAction::NewRequest),
        ];
        for callback in all {
            assert_eq!(Callback::parse(&callback.token()), Some(callback));
        }
        assert_eq!(Callback::Action(PostAction::Regenerate).token(), "act:regenerate");
        assert_eq!(Callback::parse("act:dance"), None);
        assert_eq!(Callback::parse("regenerate"), None);
    }

    #[test]
    fn test_may_generate() {
        assert!(Conversation::may_generate(&stats_state(), &Input::Text("185 75".into())));
        assert!(Conversation::may_generate(
            &State::Idle,
            &Input::Button(Callback::Action(PostAction::Regenerate))
        ));
        assert!(!Conversation::may_generate(&State::AwaitGoal, &Input::Text("сила".into())));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("привет", 3), "при…");
        assert_eq!(truncate("abc", 3), "abc");
    }
}
