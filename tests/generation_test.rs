//! Integration tests for provider selection and reply handling.

use chatq::error::Error;
use chatq::llm::{PERSONA, Provider, generator, non_empty_reply};
use secrecy::SecretString;

#[test]
fn provider_names_and_aliases_parse() {
    assert_eq!("openai".parse::<Provider>().unwrap(), Provider::OpenAi);
    assert_eq!("ChatGPT".parse::<Provider>().unwrap(), Provider::OpenAi);
    assert_eq!("anthropic".parse::<Provider>().unwrap(), Provider::Anthropic);
    assert_eq!(" claude ".parse::<Provider>().unwrap(), Provider::Anthropic);
}

#[test]
fn unknown_provider_is_a_config_error() {
    assert!(matches!("bard".parse::<Provider>(), Err(Error::Config(_))));
}

#[test]
fn provider_display_round_trips() {
    for provider in [Provider::OpenAi, Provider::Anthropic] {
        assert_eq!(provider.to_string().parse::<Provider>().unwrap(), provider);
    }
}

#[test]
fn replies_are_trimmed() {
    let reply = non_empty_reply(Provider::OpenAi, "  Bro, ship it.\n".to_string()).unwrap();
    assert_eq!(reply, "Bro, ship it.");
}

#[test]
fn blank_replies_are_generation_errors() {
    for blank in ["", "   ", "\n\t"] {
        let err = non_empty_reply(Provider::Anthropic, blank.to_string()).unwrap_err();
        assert!(matches!(err, Error::Generation(_)));
    }
}

#[test]
fn persona_is_a_single_sentence_instruction() {
    assert!(PERSONA.contains("one sentence"));
}

#[tokio::test]
async fn generators_build_for_both_providers() {
    let key = SecretString::from("sk-test");
    assert!(generator(Provider::OpenAi, &key, "gpt-3.5-turbo").is_ok());
    assert!(generator(Provider::Anthropic, &key, "claude-3-5-sonnet-20240620").is_ok());
}
