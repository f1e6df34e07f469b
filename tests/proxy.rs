//! End-to-end scenarios through the public handler API with a scripted
//! upstream adapter.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use poe_proxy::handlers::{self, AppState, AskRequest};
use poe_proxy::poe::{BotClient, BotQuery, FragmentStream, ProtocolMode};
use poe_proxy::session::Turn;
use poe_proxy::{Config, ProxyError};

struct ScriptedBot {
    calls: AtomicUsize,
    histories: Mutex<Vec<Vec<Turn>>>,
    replies: Mutex<Vec<Vec<&'static str>>>,
    fail_first_with_mismatch: bool,
}

impl ScriptedBot {
    fn new(replies: Vec<Vec<&'static str>>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            histories: Mutex::new(Vec::new()),
            replies: Mutex::new(replies),
            fail_first_with_mismatch: false,
        })
    }
}

#[async_trait]
impl BotClient for ScriptedBot {
    async fn query(
        &self,
        query: &BotQuery,
        mode: ProtocolMode,
    ) -> Result<FragmentStream, ProxyError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.histories.lock().unwrap().push(query.history.clone());

        if self.fail_first_with_mismatch && call == 0 {
            assert_eq!(mode, ProtocolMode::Standard);
            return Err(ProxyError::ProtocolMismatch(
                "unsupported response shape".to_string(),
            ));
        }

        let mut replies = self.replies.lock().unwrap();
        let fragments = if replies.is_empty() {
            vec!["scripted reply"]
        } else {
            replies.remove(0)
        };
        let items: Vec<Result<String, ProxyError>> =
            fragments.into_iter().map(|f| Ok(f.to_string())).collect();
        Ok(Box::pin(futures_util::stream::iter(items)))
    }
}

fn app_state(client: Arc<ScriptedBot>) -> AppState {
    let config = Config::new("test-key".into(), true, 60, 60).expect("valid config");
    AppState::new(config, client)
}

#[tokio::test]
async fn multi_turn_conversation_accumulates_history() {
    let bot = ScriptedBot::new(vec![
        vec!["Hi! ", "You said Hello."],
        vec!["You just said Hello."],
    ]);
    let state = app_state(bot.clone());

    let first = handlers::ask(
        &state,
        AskRequest {
            bot: "GPT-4o".into(),
            prompt: "Hello".into(),
            session_id: None,
        },
        None,
    )
    .await
    .expect("first ask succeeds");

    assert_eq!(first.text, "Hi! You said Hello.");
    assert!(!first.session_id.is_empty());

    let second = handlers::ask(
        &state,
        AskRequest {
            bot: "GPT-4o".into(),
            prompt: "What did I just say?".into(),
            session_id: Some(first.session_id.clone()),
        },
        None,
    )
    .await
    .expect("second ask succeeds");

    assert_eq!(second.session_id, first.session_id);

    // The adapter saw the full prior turn pair on the second call.
    let histories = bot.histories.lock().unwrap();
    assert!(histories[0].is_empty());
    assert_eq!(
        histories[1],
        vec![Turn::user("Hello"), Turn::assistant("Hi! You said Hello.")]
    );

    // Cleanup is idempotent and reports status, not errors.
    let cleared = handlers::clear_session(&state, &first.session_id).await;
    assert_eq!(cleared.status, "success");
    let again = handlers::clear_session(&state, &first.session_id).await;
    assert_eq!(again.status, "not_found");
}

#[tokio::test]
async fn protocol_fallback_yields_a_warning_and_two_attempts() {
    let bot = Arc::new(ScriptedBot {
        calls: AtomicUsize::new(0),
        histories: Mutex::new(Vec::new()),
        replies: Mutex::new(vec![vec!["fallback ", "reply"]]),
        fail_first_with_mismatch: true,
    });
    let state = app_state(bot.clone());

    let reply = handlers::ask(
        &state,
        AskRequest {
            bot: "Claude-3-Opus-200k".into(),
            prompt: "Hello".into(),
            session_id: None,
        },
        None,
    )
    .await
    .expect("fallback succeeds");

    assert_eq!(reply.text, "fallback reply");
    let warning = reply.warning.expect("warning is set after fallback");
    assert!(!warning.is_empty());
    assert_eq!(bot.calls.load(Ordering::SeqCst), 2);
}
