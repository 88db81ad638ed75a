use std::env;
use std::sync::Arc;

use dotenvy::dotenv;
use kotoba_adapter::provider::openai_chat::OpenAiChatProvider;
use kotoba_adapter::sync::race;
use kotoba_adapter::types::Role;
use kotoba_adapter::{Adapter, DynProvider, Request, Response};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

fn load_env_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn adapter_from_env() -> Option<Adapter> {
    let _ = dotenv();
    init_tracing();

    let Some(endpoint) = load_env_var("OPENAI_CHAT_ENDPOINT") else {
        eprintln!("skip live test: OPENAI_CHAT_ENDPOINT missing");
        return None;
    };
    let Some(api_key) = load_env_var("OPENAI_CHAT_KEY") else {
        eprintln!("skip live test: OPENAI_CHAT_KEY missing");
        return None;
    };
    let Some(model) = load_env_var("OPENAI_CHAT_MODEL") else {
        eprintln!("skip live test: OPENAI_CHAT_MODEL missing");
        return None;
    };

    let provider: DynProvider = Arc::new(
        OpenAiChatProvider::new(api_key)
            .with_base_url(endpoint)
            .with_default_model(model),
    );
    Some(
        Adapter::builder()
            .with_provider("openai", provider)
            .build()
            .expect("adapter"),
    )
}

#[tokio::test]
#[ignore = "requires valid OpenAI-compatible endpoint"]
async fn openai_chat_live_threaded_dialog() {
    let Some(adapter) = adapter_from_env() else {
        return;
    };
    let ctx = CancellationToken::new();

    let first: Response = Request::untyped()
        .create_thread()
        .with_instruction("You are a helpful assistant. Answer in one sentence.")
        .with_text(Role::User, "My favourite language is Rust. Remember it.")
        .execute(&ctx, &adapter)
        .await
        .expect("first turn");
    assert!(!first.get(0).expect("text").trim().is_empty());

    let second: Response = Request::untyped()
        .from_candidate(&first, 0)
        .with_text(Role::User, "Which language did I name? Reply with the name only.")
        .execute(&ctx, &adapter)
        .await
        .expect("second turn");
    let text = second.get(0).expect("text");
    assert!(text.contains("Rust"), "unexpected answer: {text}");
}

#[tokio::test]
#[ignore = "requires valid OpenAI-compatible endpoint"]
async fn openai_chat_live_race() {
    let Some(adapter) = adapter_from_env() else {
        return;
    };

    let requests: Vec<Request> = ["one", "two"]
        .into_iter()
        .map(|word| {
            Request::untyped()
                .with_text(Role::User, format!("Repeat the word '{word}' and nothing else."))
                .with_max_tokens(16)
        })
        .collect();
    let winner = race(&CancellationToken::new(), &adapter, &requests)
        .await
        .expect("one request succeeds");
    assert_eq!(winner.num_candidates(), 1);
}
