//! Turn orchestration: request assembly, the cancellable stream task, hook
//! dispatch and history persistence.

pub mod action;
mod prompt;
mod request;
pub mod types;

pub use action::{DelegateInput, Delegation, NextAction};
pub use prompt::{TOOL_CALLS, TOOL_CALLS_SCHEMA};
pub use types::{TurnContext, TurnId, TurnResult, TurnStatus};

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::assistant::{Assistant, AssistantRegistry, ConnectorRegistry};
use crate::attachment::FileStore;
use crate::config::ParleyConfig;
use crate::content::Contents;
use crate::error::{ErrorCategory, ParleyError, Result};
use crate::hooks::HookContext;
use crate::provider::{ChatBackend, FrameControl};
use crate::storage::{ConversationStore, HistoryRecord};
use crate::stream::{error_text_from_raw, Step, StreamMachine, StreamOutput};
use crate::types::{ClientFrame, FrameSink, Message, Options};

type TurnFuture<'a> = Pin<Box<dyn Future<Output = Result<TurnResult>> + Send + 'a>>;

/// Streaming response engine. Cheap to clone; clones share every collaborator.
#[derive(Clone)]
pub struct Engine {
    pub(crate) assistants: AssistantRegistry,
    pub(crate) connectors: ConnectorRegistry,
    pub(crate) backend: Arc<dyn ChatBackend>,
    pub(crate) storage: Option<Arc<dyn ConversationStore>>,
    pub(crate) files: Option<Arc<dyn FileStore>>,
    pub(crate) config: Arc<ParleyConfig>,
}

impl Engine {
    /// Connector capabilities are seeded from `config.connectors`.
    pub fn new(
        config: ParleyConfig,
        assistants: AssistantRegistry,
        backend: Arc<dyn ChatBackend>,
    ) -> Self {
        Self {
            connectors: ConnectorRegistry::from_settings(config.connectors.clone()),
            assistants,
            backend,
            storage: None,
            files: None,
            config: Arc::new(config),
        }
    }

    pub fn with_connectors(mut self, connectors: ConnectorRegistry) -> Self {
        self.connectors = connectors;
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn ConversationStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_file_store(mut self, files: Arc<dyn FileStore>) -> Self {
        self.files = Some(files);
        self
    }

    pub fn assistants(&self) -> &AssistantRegistry {
        &self.assistants
    }

    pub fn connectors(&self) -> &ConnectorRegistry {
        &self.connectors
    }

    pub fn config(&self) -> &ParleyConfig {
        &self.config
    }

    /// Run one user turn to completion, writing frames to `sink`.
    ///
    /// Every failure is reported to the client as exactly one error frame;
    /// the returned [`TurnResult`] mirrors what the client saw.
    pub async fn execute(
        &self,
        ctx: TurnContext,
        input: Message,
        options: Options,
        sink: FrameSink,
        disconnect: CancellationToken,
    ) -> TurnResult {
        debug!(
            turn_id = %ctx.turn_id,
            session_id = %ctx.session_id,
            assistant_id = %ctx.assistant_id,
            rag = ctx.rag,
            "turn start"
        );

        let prepared = async {
            let assistant = self.assistants.get(&ctx.assistant_id)?;
            let messages = self.with_history(&ctx, &assistant, input).await?;
            Ok::<_, ParleyError>((assistant, messages))
        }
        .await;

        let result = match prepared {
            Ok((assistant, messages)) => {
                self.handle_chat_stream(ctx.clone(), assistant, messages, options, sink, disconnect)
                    .await
            }
            Err(err) => {
                sink(ClientFrame::error(err.to_string()));
                TurnResult::failed(err.to_string())
            }
        };

        debug!(turn_id = %ctx.turn_id, status = ?result.status, "turn finished");
        result
    }

    /// Run the turn body as a background task raced against `disconnect`.
    ///
    /// On disconnect the task is signalled and left to wind down on its own;
    /// it forwards nothing after observing the signal.
    pub async fn handle_chat_stream(
        &self,
        ctx: TurnContext,
        assistant: Arc<Assistant>,
        messages: Vec<Message>,
        options: Options,
        sink: FrameSink,
        disconnect: CancellationToken,
    ) -> TurnResult {
        let cancel = CancellationToken::new();
        let engine = self.clone();
        let task_sink = sink.clone();
        let task_cancel = cancel.clone();

        let mut task = tokio::spawn(async move {
            let result = engine
                .run_turn(
                    ctx,
                    assistant,
                    messages,
                    options,
                    Contents::new(),
                    task_sink.clone(),
                    task_cancel.clone(),
                )
                .await;

            match result {
                Ok(result) => result,
                Err(_) if task_cancel.is_cancelled() => TurnResult::canceled(),
                Err(err) if !err.is_reportable() => TurnResult::canceled(),
                Err(err) => {
                    warn!(category = %err.category(), error = %err, "turn failed");
                    task_sink(ClientFrame::error(err.to_string()));
                    TurnResult::failed(err.to_string())
                }
            }
        });

        tokio::select! {
            joined = &mut task => joined.unwrap_or_else(|err| {
                sink(ClientFrame::error(err.to_string()));
                TurnResult::failed(err.to_string())
            }),
            _ = disconnect.cancelled() => {
                debug!("client disconnected, canceling turn");
                cancel.cancel();
                TurnResult::canceled()
            }
        }
    }

    /// One assistant's part of a turn. Boxed so delegation can recurse.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn run_turn(
        &self,
        ctx: TurnContext,
        assistant: Arc<Assistant>,
        messages: Vec<Message>,
        options: Options,
        contents: Contents,
        sink: FrameSink,
        cancel: CancellationToken,
    ) -> TurnFuture<'_> {
        Box::pin(async move {
            if ctx.depth > self.config.max_delegation_depth {
                return Err(ParleyError::DelegationDepthExceeded(
                    self.config.max_delegation_depth,
                ));
            }
            if cancel.is_cancelled() {
                return Err(ParleyError::Canceled);
            }

            let mut ctx = ctx;
            ctx.vision = assistant.vision;
            let mut active = assistant;
            let mut messages = messages;
            let mut request_options = self.with_options(&active, options.clone());

            let init = active
                .hooks
                .run_init(HookContext {
                    turn: ctx.clone(),
                    messages: messages.clone(),
                    options: request_options.clone(),
                    contents: contents.clone(),
                })
                .await?;

            if let Some(result) = init {
                if let Some(rewritten) = result.messages {
                    messages = rewritten;
                }
                if let Some(target) = result.assistant_id.filter(|id| *id != active.id) {
                    let next = self.assistants.get(&target)?;
                    let input = messages
                        .pop()
                        .ok_or_else(|| ParleyError::invalid_input("no input message to hand over"))?;
                    debug!(
                        turn_id = %ctx.turn_id,
                        from = %active.id,
                        to = %next.id,
                        "init hook switched assistant"
                    );
                    messages = self.with_history(&ctx, &next, input).await?;
                    request_options = self.with_options(&next, options);
                    ctx.assistant_id = next.id.clone();
                    ctx.vision = next.vision;
                    active = next;
                }
                if let Some(replaced) = result.options {
                    request_options = replaced;
                }
            }

            self.stream_chat(ctx, active, messages, request_options, contents, sink, cancel)
                .await
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn stream_chat(
        &self,
        ctx: TurnContext,
        assistant: Arc<Assistant>,
        messages: Vec<Message>,
        options: Options,
        contents: Contents,
        sink: FrameSink,
        cancel: CancellationToken,
    ) -> Result<TurnResult> {
        let request = self.request_messages(&assistant, &messages).await?;

        debug!(
            turn_id = %ctx.turn_id,
            assistant_id = %assistant.id,
            backend = self.backend.name(),
            depth = ctx.depth,
            "streaming chat"
        );

        let mut machine = StreamMachine::new(assistant.meta(), contents, sink.clone());
        let mut step = Step::Continue;
        let transport = {
            let mut on_frame = |raw: &[u8]| {
                if cancel.is_cancelled() {
                    return FrameControl::Stop;
                }
                match machine.handle_frame(raw) {
                    Step::Continue => FrameControl::Continue,
                    terminal => {
                        step = terminal;
                        FrameControl::Stop
                    }
                }
            };
            self.backend.chat(&request, &options, &mut on_frame).await
        };

        if cancel.is_cancelled() {
            debug!(turn_id = %ctx.turn_id, "turn canceled during stream");
            return Err(ParleyError::Canceled);
        }

        if let Err(err) = transport {
            if step == Step::Continue {
                return Err(err);
            }
            warn!(turn_id = %ctx.turn_id, error = %err, "transport error after stream end");
        }

        if step == Step::Continue && machine.pending().is_none() {
            step = machine.end_of_stream();
        }

        let StreamOutput {
            contents,
            downstream,
            pending,
        } = machine.finish();

        debug!(turn_id = %ctx.turn_id, step = ?step, segments = contents.segments().len(), "stream ended");

        match (step, pending) {
            (Step::Failed(raw), _) => {
                Ok(self
                    .fail(&ctx, &assistant, messages, options, contents, raw, &sink)
                    .await)
            }
            // Undecoded text replaces the done frame as the terminal frame.
            (_, Some(pending)) => Ok(report_pending(&sink, &pending)),
            (_, None) => {
                self.complete(ctx, assistant, messages, options, contents, downstream, sink, cancel)
                    .await
            }
        }
    }

    /// Provider reported an error: let the fail hook rewrite it, then report.
    #[allow(clippy::too_many_arguments)]
    async fn fail(
        &self,
        ctx: &TurnContext,
        assistant: &Assistant,
        messages: Vec<Message>,
        options: Options,
        contents: Contents,
        raw: String,
        sink: &FrameSink,
    ) -> TurnResult {
        let hook_ctx = HookContext {
            turn: ctx.clone(),
            messages,
            options,
            contents,
        };
        let message = match assistant.hooks.run_fail(hook_ctx, raw.clone()).await {
            Ok(Some(result)) => result
                .error
                .or(result.output)
                .unwrap_or_else(|| error_text_from_raw(&raw)),
            Ok(None) => error_text_from_raw(&raw),
            Err(err) => {
                warn!(turn_id = %ctx.turn_id, error = %err, "fail hook failed, using provider error");
                error_text_from_raw(&raw)
            }
        };
        sink(ClientFrame::error(message.clone()));
        TurnResult::failed(message)
    }

    /// Stream finished: run the done hook, persist, then act on its result.
    #[allow(clippy::too_many_arguments)]
    async fn complete(
        &self,
        ctx: TurnContext,
        assistant: Arc<Assistant>,
        messages: Vec<Message>,
        options: Options,
        contents: Contents,
        downstream: Vec<Message>,
        sink: FrameSink,
        cancel: CancellationToken,
    ) -> Result<TurnResult> {
        let mut hook_messages = messages.clone();
        hook_messages.extend(downstream);
        let done = assistant
            .hooks
            .run_done(HookContext {
                turn: ctx.clone(),
                messages: hook_messages,
                options,
                contents: contents.clone(),
            })
            .await;

        let malformed = matches!(&done, Err(err) if err.category() == ErrorCategory::Input);
        if !malformed {
            self.save_history(&ctx, &assistant, &messages, &contents).await;
        }

        let result = match done {
            Ok(result) => result.unwrap_or_default(),
            Err(err) => {
                sink(ClientFrame::error(err.to_string()));
                return Ok(TurnResult::failed(err.to_string()));
            }
        };

        if let Some(next) = result.next {
            return self.execute_action(next, ctx, sink, cancel).await;
        }

        sink(match result.output {
            Some(output) => ClientFrame::output(output),
            None => ClientFrame::done(),
        });
        Ok(TurnResult::completed())
    }

    /// Best effort; failures are logged only.
    async fn save_history(
        &self,
        ctx: &TurnContext,
        assistant: &Assistant,
        messages: &[Message],
        contents: &Contents,
    ) {
        let Some(storage) = &self.storage else {
            return;
        };
        let Some(input) = messages.last() else {
            return;
        };
        if contents.is_empty() || ctx.session_id.is_empty() {
            return;
        }

        let mut records = Vec::with_capacity(2);
        if !input.hidden {
            records.push(HistoryRecord::user(input.text.clone(), ctx.session_id.clone()));
        }
        records.push(HistoryRecord::assistant(
            contents.json(),
            ctx.session_id.clone(),
            &assistant.meta(),
        ));

        if let Err(err) = storage
            .save_history(&ctx.session_id, records, &ctx.chat_id, &ctx.metadata())
            .await
        {
            warn!(turn_id = %ctx.turn_id, error = %err, "failed to save history");
        }
    }
}

fn report_pending(sink: &FrameSink, pending: &str) -> TurnResult {
    let message = error_text_from_raw(pending);
    sink(ClientFrame::error(message.clone()));
    TurnResult::failed(message)
}
