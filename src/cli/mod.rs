//! CLI command implementations.
//!
//! Each submodule implements one command; [`factory`] turns configuration
//! into the runtime components the commands share.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `chat` | Answer an utterance through a backend, capturing quality answers |
//! | `classify` | Show the intent an utterance maps to |
//! | `scopes` | List or create topic scopes |
//! | `backends` | List configured backends |
//! | `captures` | List captured documents or save one by hand |
//!
//! # Example Usage
//!
//! ```bash
//! # Ask the default backend
//! jnext chat "how should I practice standing on one leg?"
//!
//! # Ask every enabled backend inside a topic scope
//! jnext chat --backend all --scope balance_training --focus 60 "what is a reset?"
//!
//! # Review what was captured
//! jnext captures list balance_training
//! ```

mod backends;
mod captures;
mod chat;
pub mod factory;
mod output;
mod scopes;

pub use backends::cmd_backends;
pub use captures::{cmd_list as cmd_captures_list, cmd_save as cmd_captures_save};
pub use chat::{ChatArgs, cmd_chat, cmd_classify, write_classification_text, write_outcome_text};
pub use factory::{
    build_anthropic_client, build_backend, build_chat_service, build_chat_service_with,
    build_gateway, build_gemini_client, build_http_config, build_ollama_client,
    build_openai_client, build_retry_policy, build_scope_registry, open_storage,
};
pub use output::{OutputFormat, write_as, write_json, write_yaml};
pub use scopes::{cmd_create as cmd_scopes_create, cmd_list as cmd_scopes_list};
