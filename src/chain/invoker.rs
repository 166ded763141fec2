//! Wraps a [`Runnable`] with per-session history.
//!
//! Each call reads the session's log into the history slot, runs the
//! chain, and on success appends the user input followed by the answer.
//! A stream persists only after it has been drained without error; a
//! dropped or failed stream leaves the log untouched.

use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::{debug, warn};

use super::{ChainInput, ChainOutput, RunConfig, Runnable};
use crate::error::{ColloquyError, Result};
use crate::history::{HistoryKey, HistoryStore, SessionHistoryRegistry};
use crate::types::Message;
use crate::util::blocking::{block_on, BlockingStream};

#[derive(Clone)]
pub struct HistoryAwareInvoker {
    chain: Arc<dyn Runnable>,
    sessions: Arc<SessionHistoryRegistry>,
    history_limit: Option<usize>,
}

impl HistoryAwareInvoker {
    pub fn new(chain: Arc<dyn Runnable>, sessions: Arc<SessionHistoryRegistry>) -> Self {
        Self {
            chain,
            sessions,
            history_limit: None,
        }
    }

    /// Read at most `limit` recent messages per call.
    pub fn with_history_limit(mut self, limit: Option<usize>) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn sessions(&self) -> &Arc<SessionHistoryRegistry> {
        &self.sessions
    }

    async fn prepare(
        &self,
        input: String,
        config: &RunConfig,
    ) -> Result<(Arc<dyn HistoryStore>, HistoryKey, ChainInput)> {
        let session_id = config
            .session_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ColloquyError::Configuration("missing session id".into()))?;
        let store = self.sessions.get_or_create(session_id).await?;
        let key = HistoryKey::new(session_id, config.user_id.as_deref());
        let history = store.list(&key, self.history_limit).await;
        debug!(key = %key, history = history.len(), "invoker: history loaded");
        Ok((store, key, ChainInput::new(input).with_history(history)))
    }

    pub async fn invoke(&self, input: impl Into<String>, config: &RunConfig) -> Result<ChainOutput> {
        let (store, key, chain_input) = self.prepare(input.into(), config).await?;
        let user = Message::user(chain_input.input.clone());
        let output = self.chain.invoke(chain_input).await?;
        store.append(&key, user).await;
        store.append(&key, Message::assistant(output.answer.clone())).await;
        Ok(output)
    }

    pub async fn stream(
        &self,
        input: impl Into<String>,
        config: &RunConfig,
    ) -> Result<BoxStream<'static, Result<String>>> {
        let (store, key, chain_input) = self.prepare(input.into(), config).await?;
        let user = Message::user(chain_input.input.clone());
        let mut fragments = self.chain.stream(chain_input).await?;

        let stream = async_stream::stream! {
            let mut answer = String::new();
            while let Some(item) = fragments.next().await {
                match item {
                    Ok(fragment) => {
                        answer.push_str(&fragment);
                        yield Ok(fragment);
                    }
                    Err(e) => {
                        warn!(key = %key, error = %e, "stream failed; turn not persisted");
                        yield Err(e);
                        return;
                    }
                }
            }
            store.append(&key, user).await;
            store.append(&key, Message::assistant(answer)).await;
        };
        Ok(Box::pin(stream))
    }

    pub fn invoke_blocking(&self, input: impl Into<String>, config: &RunConfig) -> Result<ChainOutput> {
        block_on(self.invoke(input, config))?
    }

    pub fn stream_blocking(
        &self,
        input: impl Into<String>,
        config: &RunConfig,
    ) -> Result<BlockingStream<String>> {
        let input = input.into();
        BlockingStream::open(self.stream(input, config))
    }
}

impl std::fmt::Debug for HistoryAwareInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryAwareInvoker")
            .field("sessions", &self.sessions)
            .field("history_limit", &self.history_limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::stream;

    /// Echoes the input and reports how much history it saw.
    struct Echo;

    #[async_trait]
    impl Runnable for Echo {
        async fn invoke(&self, input: ChainInput) -> Result<ChainOutput> {
            Ok(ChainOutput::answer(format!(
                "{} ({} prior)",
                input.input,
                input.history.len()
            )))
        }

        async fn stream(&self, input: ChainInput) -> Result<BoxStream<'static, Result<String>>> {
            let parts = vec![Ok(input.input), Ok("!".to_string())];
            Ok(Box::pin(stream::iter(parts)))
        }
    }

    fn invoker() -> HistoryAwareInvoker {
        HistoryAwareInvoker::new(Arc::new(Echo), Arc::new(SessionHistoryRegistry::in_memory()))
    }

    async fn log(invoker: &HistoryAwareInvoker, session: &str) -> Vec<Message> {
        let store = invoker.sessions.get_or_create(session).await.unwrap();
        store.list(&HistoryKey::session(session), None).await
    }

    #[tokio::test]
    async fn missing_session_is_a_configuration_error() {
        let err = invoker().invoke("hi", &RunConfig::default()).await.unwrap_err();
        match err {
            ColloquyError::Configuration(msg) => assert_eq!(msg, "missing session id"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn history_is_injected_and_turn_persisted() {
        let invoker = invoker();
        let config = RunConfig::session("s1");
        let first = invoker.invoke("one", &config).await.unwrap();
        assert_eq!(first.answer, "one (0 prior)");
        let second = invoker.invoke("two", &config).await.unwrap();
        assert_eq!(second.answer, "two (2 prior)");

        let log = log(&invoker, "s1").await;
        assert_eq!(
            log,
            vec![
                Message::user("one"),
                Message::assistant("one (0 prior)"),
                Message::user("two"),
                Message::assistant("two (2 prior)"),
            ]
        );
    }

    #[tokio::test]
    async fn drained_stream_persists_joined_answer() {
        let invoker = invoker();
        let config = RunConfig::session("s");
        let fragments: Vec<String> = invoker
            .stream("hey", &config)
            .await
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(fragments, vec!["hey", "!"]);
        assert_eq!(
            log(&invoker, "s").await,
            vec![Message::user("hey"), Message::assistant("hey!")]
        );
    }

    #[tokio::test]
    async fn dropped_stream_persists_nothing() {
        let invoker = invoker();
        let config = RunConfig::session("s");
        let mut fragments = invoker.stream("hey", &config).await.unwrap();
        assert_eq!(fragments.next().await.unwrap().unwrap(), "hey");
        drop(fragments);
        assert!(log(&invoker, "s").await.is_empty());
    }

    #[test]
    fn blocking_shapes_work_outside_a_runtime() {
        let invoker = invoker();
        let config = RunConfig::session("b");
        let output = invoker.invoke_blocking("x", &config).unwrap();
        assert_eq!(output.answer, "x (0 prior)");

        let fragments: Vec<String> = invoker
            .stream_blocking("y", &config)
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(fragments.concat(), "y!");
    }
}
