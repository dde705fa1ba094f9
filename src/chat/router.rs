//! Command routing for incoming chat messages.
//!
//! The first token of a message picks the handler: `/select rr` goes to the
//! `/select` handler, `/Select@z5bot rr` too. Anything that is not a known
//! command is gameplay and goes to the fallback handler.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, info_span, warn, Instrument};

use super::handlers;
use super::messages::describe_error;
use super::ChatMessage;
use crate::models::story::Catalog;
use crate::savegame::SaveProtocol;
use crate::session::SessionRegistry;
use crate::Result;

/// Future returned by every command handler: the reply messages, in order.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send>>;

/// A command handler.
pub type Handler = fn(Arc<BotState>, ChatMessage) -> HandlerFuture;

/// Route name reported for messages handled by the fallback.
pub const DEFAULT_ROUTE: &str = "default";

/// Shared state handed to every handler.
#[derive(Debug)]
pub struct BotState {
    /// Selectable stories.
    pub catalog: Catalog,
    /// Live sessions.
    pub registry: Arc<SessionRegistry>,
    /// Save/restore dialogs.
    pub saves: SaveProtocol,
}

/// Map from command name to handler, plus a fallback for gameplay.
pub struct CommandRouter {
    routes: HashMap<&'static str, Handler>,
    fallback: Handler,
}

impl std::fmt::Debug for CommandRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&&str> = self.routes.keys().collect();
        names.sort();
        f.debug_struct("CommandRouter").field("routes", &names).finish_non_exhaustive()
    }
}

impl CommandRouter {
    /// Router with no commands; everything goes to `fallback`.
    #[must_use]
    pub fn new(fallback: Handler) -> Self {
        Self {
            routes: HashMap::new(),
            fallback,
        }
    }

    /// Router with the standard bot commands.
    #[must_use]
    pub fn with_default_commands() -> Self {
        let mut router = Self::new(handlers::gameplay);
        router.add_command("/start", handlers::start);
        router.add_command("/select", handlers::select);
        router.add_command("/load", handlers::load);
        router.add_command("/save", handlers::save);
        router.add_command("/clear", handlers::clear);
        router.add_command("/enter", handlers::enter);
        router.add_command("/i", handlers::ignore);
        router.add_command("/ping", handlers::ping);
        router.add_command("/msg", handlers::msg);
        router
    }

    /// Register or replace a command. `name` includes the leading `/`.
    pub fn add_command(&mut self, name: &'static str, handler: Handler) {
        self.routes.insert(name, handler);
    }

    /// Registered command names, sorted.
    #[must_use]
    pub fn command_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.routes.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Pick the handler for `text` and report the route name.
    #[must_use]
    pub fn resolve(&self, text: &str) -> (&'static str, Handler) {
        command_token(text)
            .and_then(|token| self.routes.get_key_value(token.as_str()))
            .map_or((DEFAULT_ROUTE, self.fallback), |(name, handler)| {
                (*name, *handler)
            })
    }
}

/// Lowercased first token of `text` with any `@botname` suffix removed, if
/// it looks like a command.
#[must_use]
pub fn command_token(text: &str) -> Option<String> {
    let first = text.split_whitespace().next()?;
    if !first.starts_with('/') {
        return None;
    }
    let name = first.split('@').next().unwrap_or(first);
    Some(name.to_lowercase())
}

/// Text after the first token, trimmed; `None` if there is none.
#[must_use]
pub fn command_argument(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    let (_, rest) = trimmed.split_once(char::is_whitespace)?;
    let rest = rest.trim();
    (!rest.is_empty()).then_some(rest)
}

/// The chat bot: shared state plus a router.
#[derive(Debug)]
pub struct Bot {
    state: Arc<BotState>,
    router: CommandRouter,
}

impl Bot {
    /// Bot with the standard commands.
    #[must_use]
    pub fn new(state: BotState) -> Self {
        Self::with_router(state, CommandRouter::with_default_commands())
    }

    /// Bot with a custom router.
    #[must_use]
    pub fn with_router(state: BotState, router: CommandRouter) -> Self {
        Self {
            state: Arc::new(state),
            router,
        }
    }

    /// Shared state.
    #[must_use]
    pub fn state(&self) -> &Arc<BotState> {
        &self.state
    }

    /// Handle one incoming message and return the replies to send, in order.
    ///
    /// Errors are turned into their player-facing text; this never fails.
    pub async fn handle(&self, message: ChatMessage) -> Vec<String> {
        let (route, handler) = self.router.resolve(&message.text);
        let span = info_span!("chat_message", chat_id = %message.chat_id, route);

        async move {
            debug!(text = %message.text, "dispatching message");
            match handler(Arc::clone(&self.state), message).await {
                Ok(replies) => {
                    debug!(replies = replies.len(), "message handled");
                    replies
                }
                Err(err) => {
                    warn!(%err, "command failed");
                    vec![describe_error(&err)]
                }
            }
        }
        .instrument(span)
        .await
    }
}
