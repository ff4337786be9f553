//! bevy + bevy_llm_chat example: a gemini chat window.
//! - text boxes for the api key and the prompt (tab switches focus).
//! - model picker over the static catalog, with category switch.
//! - clear chat / clear cache / download chat buttons and a message counter.
//!
//! env (or `.env`):
//!   GOOGLE_API_KEY     (key, optional: can be typed in)
//!   CHAT_MODEL         (default gemini-1.5-flash)
//!   CHAT_TIMEOUT_SECS  (default 30)
//!   CHAT_EXPORT_DIR    (default .)

use bevy::input::keyboard::{KeyCode, KeyboardInput};
use bevy::prelude::*;
use bevy_llm_chat::{
    BevyLlmChatPlugin, ChatConfig, ChatNoticeEvt, CredentialCheck, LlmChatSet, ModelSelection, NoticeLevel,
    Role, Session, SessionCommand, TurnFailedEvt, send_user_text,
};

// ---------------------- ui tags ----------------------

#[derive(Component)]
struct HistoryText;
#[derive(Component)]
struct StreamText;
#[derive(Component)]
struct PromptText;
#[derive(Component)]
struct ApiKeyText;
#[derive(Component)]
struct ModelText;
#[derive(Component)]
struct InfoText;
#[derive(Component)]
struct NoticeText;

#[derive(Component, Clone, Copy, PartialEq, Eq, Debug)]
enum Btn {
    PrevModel,
    NextModel,
    Category,
    ClearChat,
    ClearCache,
    Download,
}

// ---------------------- app state ----------------------

#[derive(Resource)]
struct ChatEntity(Entity);

#[derive(Resource, Default)]
struct PromptBuf(String);

#[derive(Resource, Default)]
struct KeyBuf(String);

#[derive(Resource, Default)]
struct Focus(FocusField);

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
enum FocusField {
    ApiKey,
    #[default]
    Prompt,
}

/// latest status line that is not tied to a turn (cache cleared, export, key check).
#[derive(Resource, Default)]
struct StatusLine(Option<(NoticeLevel, String)>);

// ---------------------- main ----------------------

fn main() {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();

    let config = ChatConfig::from_env();
    let key = config.api_key.clone().unwrap_or_default();

    App::new()
        .insert_resource(ClearColor(Color::srgb_u8(18, 18, 20)))
        .insert_resource(config)
        .insert_resource(PromptBuf::default())
        .insert_resource(KeyBuf(key))
        .insert_resource(Focus::default())
        .insert_resource(StatusLine::default())
        .add_plugins(DefaultPlugins)
        .add_plugins(BevyLlmChatPlugin)
        .add_systems(Startup, setup)
        .add_systems(Update, (handle_text_input, handle_buttons))
        // readers run after bevy_llm_chat wrote sessions back
        .add_systems(
            Update,
            (on_notice, on_failed, refresh_texts).chain().after(LlmChatSet::Drain),
        )
        .run();
}

// ---------------------- setup ui ----------------------

fn setup(mut commands: Commands, config: Res<ChatConfig>, key: Res<KeyBuf>, mut status: ResMut<StatusLine>) {
    commands.spawn(Camera2d::default());

    let mut session = Session::new(ModelSelection::named(&config.model), None);
    let check = session.set_credential(&key.0);
    status.0 = Some((level_of(check), check.notice().to_string()));
    let session = commands.spawn(session).id();
    commands.insert_resource(ChatEntity(session));

    let style_18 = TextFont { font_size: 18.0, ..default() };
    let style_14 = TextFont { font_size: 14.0, ..default() };

    commands
        .spawn((
            Node {
                width: Val::Percent(100.0),
                height: Val::Percent(100.0),
                flex_direction: FlexDirection::Column,
                row_gap: Val::Px(8.0),
                padding: UiRect::all(Val::Px(12.0)),
                ..default()
            },
            BackgroundColor(Color::NONE),
        ))
        .with_children(|p| {
            // --- settings box ---
            p.spawn((
                Node {
                    width: Val::Percent(100.0),
                    height: Val::Auto,
                    flex_direction: FlexDirection::Column,
                    row_gap: Val::Px(6.0),
                    padding: UiRect::all(Val::Px(8.0)),
                    ..default()
                },
                BackgroundColor(Color::srgb(0.10, 0.10, 0.12)),
            ))
            .with_children(|c| {
                c.spawn((Text::new(""), style_14.clone(), TextColor(Color::WHITE), ApiKeyText));
                c.spawn((
                    Node {
                        width: Val::Percent(100.0),
                        height: Val::Auto,
                        column_gap: Val::Px(8.0),
                        flex_direction: FlexDirection::Row,
                        ..default()
                    },
                    BackgroundColor(Color::NONE),
                ))
                .with_children(|row| {
                    button(row, &style_14, Btn::Category, "category", 100.0);
                    button(row, &style_14, Btn::PrevModel, "<", 28.0);
                    row.spawn((Text::new("model: "), style_14.clone(), TextColor(Color::WHITE), ModelText));
                    button(row, &style_14, Btn::NextModel, ">", 28.0);
                });
                c.spawn((
                    Node {
                        width: Val::Percent(100.0),
                        height: Val::Auto,
                        column_gap: Val::Px(8.0),
                        flex_direction: FlexDirection::Row,
                        ..default()
                    },
                    BackgroundColor(Color::NONE),
                ))
                .with_children(|row| {
                    button(row, &style_14, Btn::ClearChat, "clear chat", 100.0);
                    button(row, &style_14, Btn::ClearCache, "clear cache", 100.0);
                    button(row, &style_14, Btn::Download, "download chat", 120.0);
                    row.spawn((Text::new(""), style_14.clone(), TextColor(Color::WHITE), InfoText));
                });
                c.spawn((Text::new(""), style_14.clone(), TextColor(Color::srgb(0.9, 0.8, 0.4)), NoticeText));
            });

            // --- conversation box ---
            p.spawn((
                Node {
                    width: Val::Percent(100.0),
                    height: Val::Percent(100.0),
                    flex_direction: FlexDirection::Column,
                    row_gap: Val::Px(8.0),
                    padding: UiRect::axes(Val::Px(8.0), Val::Px(12.0)),
                    overflow: Overflow::scroll_y(),
                    ..default()
                },
                BackgroundColor(Color::NONE),
            ))
            .with_children(|c| {
                c.spawn((Text::new(""), style_18.clone(), TextColor(Color::WHITE), HistoryText));
                c.spawn((
                    Text::new(""),
                    style_18.clone(),
                    TextColor(Color::srgb_u8(200, 200, 200)),
                    StreamText,
                ));
                c.spawn((Text::new("> "), style_14.clone(), TextColor(Color::WHITE), PromptText));
            });
        });
}

fn button(parent: &mut ChildSpawnerCommands, font: &TextFont, kind: Btn, label: &str, width: f32) {
    parent
        .spawn((
            Button,
            Node {
                width: Val::Px(width),
                height: Val::Px(28.0),
                align_items: AlignItems::Center,
                justify_content: JustifyContent::Center,
                ..default()
            },
            BackgroundColor(Color::srgb(0.2, 0.2, 0.25)),
            kind,
        ))
        .with_children(|b| {
            b.spawn((Text::new(label), font.clone(), TextColor(Color::WHITE)));
        });
}

fn level_of(check: CredentialCheck) -> NoticeLevel {
    match check {
        CredentialCheck::Missing => NoticeLevel::Info,
        CredentialCheck::TooShort => NoticeLevel::Error,
        CredentialCheck::UnexpectedPrefix => NoticeLevel::Warning,
        CredentialCheck::LooksValid => NoticeLevel::Success,
    }
}

// ---------------------- input & buttons ----------------------

#[allow(clippy::too_many_arguments)]
fn handle_text_input(
    mut commands: Commands,
    mut ev_kbd: EventReader<KeyboardInput>,
    keys: Res<ButtonInput<KeyCode>>,
    mut focus: ResMut<Focus>,
    mut key: ResMut<KeyBuf>,
    mut prompt: ResMut<PromptBuf>,
    mut status: ResMut<StatusLine>,
    chat: Res<ChatEntity>,
    mut q_session: Query<&mut Session>,
) {
    if keys.just_pressed(KeyCode::Tab) {
        focus.0 = match focus.0 {
            FocusField::ApiKey => FocusField::Prompt,
            FocusField::Prompt => FocusField::ApiKey,
        };
        info!(target: "chat", "focus -> {:?}", focus.0);
    }

    for ev in ev_kbd.read() {
        if ev.state.is_pressed() {
            if let Some(txt) = &ev.text {
                let s = txt.replace(['\r', '\n', '\t'], "");
                match focus.0 {
                    FocusField::ApiKey => key.0.push_str(&s),
                    FocusField::Prompt => prompt.0.push_str(&s),
                }
            }
        }
    }

    if keys.just_pressed(KeyCode::Backspace) {
        match focus.0 {
            FocusField::ApiKey => {
                key.0.pop();
            }
            FocusField::Prompt => {
                prompt.0.pop();
            }
        }
    }

    if !keys.just_pressed(KeyCode::Enter) {
        return;
    }
    let Ok(mut session) = q_session.get_mut(chat.0) else { return };
    match focus.0 {
        FocusField::ApiKey => {
            let check = session.set_credential(&key.0);
            info!(target: "chat", "api key applied: {:?}", check);
            status.0 = Some((level_of(check), check.notice().to_string()));
        }
        FocusField::Prompt => {
            if session.credential().is_none() {
                status.0 = Some((NoticeLevel::Warning, CredentialCheck::Missing.notice().to_string()));
                return;
            }
            if session.is_busy() {
                return;
            }
            // empty prompts still go through so the plugin can warn about them
            let msg = std::mem::take(&mut prompt.0);
            send_user_text(&mut commands, chat.0, msg);
        }
    }
}

fn handle_buttons(
    mut q: Query<(&Interaction, &Btn, &mut BackgroundColor), Changed<Interaction>>,
    chat: Res<ChatEntity>,
    mut q_session: Query<&mut Session>,
    mut ev_cmd: EventWriter<SessionCommand>,
) {
    for (i, btn, mut bg) in &mut q {
        match *i {
            Interaction::Pressed => {
                bg.0 = Color::srgb(0.3, 0.3, 0.35);
                let Ok(mut session) = q_session.get_mut(chat.0) else { continue };
                match btn {
                    Btn::PrevModel => session.model.prev(),
                    Btn::NextModel => session.model.next(),
                    Btn::Category => {
                        let next = session.model.category().next();
                        session.model.set_category(next);
                    }
                    Btn::ClearChat => {
                        ev_cmd.write(SessionCommand::ClearChat(chat.0));
                    }
                    Btn::ClearCache => {
                        ev_cmd.write(SessionCommand::ClearCache);
                    }
                    Btn::Download => {
                        ev_cmd.write(SessionCommand::ExportTranscript(chat.0));
                    }
                }
                info!(target: "chat", "{:?} -> model '{}'", btn, session.model.name());
            }
            Interaction::Hovered => bg.0 = Color::srgb(0.25, 0.25, 0.3),
            Interaction::None => bg.0 = Color::srgb(0.2, 0.2, 0.25),
        }
    }
}

// ---------------------- chat events ----------------------

fn on_notice(mut ev: EventReader<ChatNoticeEvt>, mut status: ResMut<StatusLine>) {
    for ChatNoticeEvt { level, text, .. } in ev.read() {
        status.0 = Some((*level, text.clone()));
    }
}

fn on_failed(mut ev: EventReader<TurnFailedEvt>, mut status: ResMut<StatusLine>) {
    for TurnFailedEvt { entity, error } in ev.read() {
        warn!(target: "chat", "turn failed (entity={:?}): {}", entity, error);
        // the notice itself lives on the session; show the model hint here
        if let Some(hint) = error.suggestion() {
            status.0 = Some((NoticeLevel::Info, hint));
        }
    }
}

// ---------------------- text refresh ----------------------

#[allow(clippy::type_complexity)]
fn refresh_texts(
    chat: Res<ChatEntity>,
    q_session: Query<&Session>,
    key: Res<KeyBuf>,
    prompt: Res<PromptBuf>,
    focus: Res<Focus>,
    status: Res<StatusLine>,
    mut sets: ParamSet<(
        Query<&mut Text, With<ApiKeyText>>,
        Query<&mut Text, With<ModelText>>,
        Query<&mut Text, With<InfoText>>,
        Query<&mut Text, With<NoticeText>>,
        Query<&mut Text, With<HistoryText>>,
        Query<&mut Text, With<StreamText>>,
        Query<&mut Text, With<PromptText>>,
    )>,
) {
    let Ok(session) = q_session.get(chat.0) else { return };
    let caret = |f: FocusField| if focus.0 == f { " |" } else { "" };

    if let Ok(mut t) = sets.p0().single_mut() {
        // password field: never echo the key
        let masked = if key.0.is_empty() { "<empty>".to_string() } else { "*".repeat(key.0.chars().count()) };
        t.0 = format!("api key: {}{}  (enter to apply)", masked, caret(FocusField::ApiKey));
    }
    if let Ok(mut t) = sets.p1().single_mut() {
        t.0 = format!(
            "model: {} [{} / {}]",
            session.model.name(),
            session.model.category().label(),
            session.model.status().label()
        );
    }
    if let Ok(mut t) = sets.p2().single_mut() {
        t.0 = format!("messages: {}", session.conversation.message_count());
    }
    if let Ok(mut t) = sets.p3().single_mut() {
        let mut lines = Vec::new();
        if let Some(n) = &session.notice {
            lines.push(n.clone());
        }
        if let Some((level, text)) = &status.0 {
            lines.push(format!("[{level:?}] {text}"));
        }
        t.0 = lines.join("\n");
    }
    if let Ok(mut t) = sets.p4().single_mut() {
        let mut out = String::new();
        for m in session.conversation.visible() {
            let who = match m.role() {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => continue,
            };
            out.push_str(&format!("{who}: {}\n\n", m.content()));
        }
        if let Some(p) = &session.pending_prompt {
            out.push_str(&format!("user: {p}\n\n"));
        }
        t.0 = out;
    }
    if let Ok(mut t) = sets.p5().single_mut() {
        t.0 = if session.is_busy() {
            if session.partial.is_empty() { "thinking...".to_string() } else { format!("assistant: {}▌", session.partial) }
        } else {
            String::new()
        };
    }
    if let Ok(mut t) = sets.p6().single_mut() {
        let hint = if session.credential().is_none() { "  (enter an api key to start chatting)" } else { "" };
        t.0 = format!("> {}{}{}", prompt.0, caret(FocusField::Prompt), hint);
    }
}
