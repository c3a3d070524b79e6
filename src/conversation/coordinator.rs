//! Conversation coordinator: the single writer of live conversation state.
//!
//! All state transitions are serialized through one select loop. The agent
//! read task, the transcription task, and the playback task each hand their
//! results back into the loop as inbox messages tagged with the generation
//! that spawned them; the policy driver decides what each one may do.

use crate::agent::events::AgentEvent;
use crate::agent::{AgentClient, RunOutcome};
use crate::audio::capture::CaptureSession;
use crate::audio::playback::{PlaybackNotice, PlaybackSession};
use crate::config::VoiceConfig;
use crate::conversation::driver::{Action, Driver, RunSettled};
use crate::conversation::messages::{Command, ConversationEvent, Message, Role};
use crate::error::{Result, VoiceError};
use crate::state::{ConversationState, StateMachine};
use crate::synth::SynthesisClient;
use crate::transcribe::TranscribeClient;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{info, trace};

/// Observer channel capacity. A slow subscriber loses oldest events, never
/// blocks the loop.
const EVENT_CHANNEL_SIZE: usize = 256;

/// Inbox messages: commands plus async task completions.
#[derive(Debug)]
enum Internal {
    Command(Command),
    AgentEvent {
        generation: u64,
        event: AgentEvent,
    },
    RunSettled {
        generation: u64,
        result: Result<RunOutcome>,
    },
    TranscriptReady {
        result: Result<String>,
    },
    Playback(PlaybackNotice),
}

/// Cloneable command surface for a running [`Conversation`].
#[derive(Debug, Clone)]
pub struct ConversationHandle {
    tx: mpsc::UnboundedSender<Internal>,
}

impl ConversationHandle {
    /// Send a message to the agent, superseding any in-flight run.
    ///
    /// # Errors
    ///
    /// Returns an error if the conversation loop has stopped.
    pub fn send_message(&self, text: impl Into<String>) -> Result<()> {
        self.send(Command::SendMessage(text.into()))
    }

    /// Begin microphone capture, stopping any active playback first.
    ///
    /// # Errors
    ///
    /// Returns an error if the conversation loop has stopped.
    pub fn start_recording(&self) -> Result<()> {
        self.send(Command::StartRecording)
    }

    /// Finalize capture; the transcript feeds the next message.
    ///
    /// # Errors
    ///
    /// Returns an error if the conversation loop has stopped.
    pub fn stop_recording(&self) -> Result<()> {
        self.send(Command::StopRecording)
    }

    /// Cancel everything and return to the initial state.
    ///
    /// # Errors
    ///
    /// Returns an error if the conversation loop has stopped.
    pub fn reset(&self) -> Result<()> {
        self.send(Command::Reset)
    }

    /// Stop the conversation loop, releasing all sessions.
    ///
    /// # Errors
    ///
    /// Returns an error if the conversation loop has already stopped.
    pub fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown)
    }

    fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(Internal::Command(command))
            .map_err(|_| VoiceError::Channel("conversation loop closed".into()))
    }
}

/// Coordinates one conversation: history, state, and the audio sessions.
pub struct Conversation {
    config: VoiceConfig,
    driver: Driver,
    machine: StateMachine,
    history: Vec<Message>,
    agent: AgentClient,
    transcriber: TranscribeClient,
    synth: SynthesisClient,
    capture: Option<CaptureSession>,
    playback: Option<PlaybackSession>,
    run_cancel: Option<CancellationToken>,
    inbox_tx: mpsc::UnboundedSender<Internal>,
    inbox_rx: mpsc::UnboundedReceiver<Internal>,
    events_tx: broadcast::Sender<ConversationEvent>,
}

impl Conversation {
    /// Create a conversation with the given configuration.
    pub fn new(config: VoiceConfig) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let agent = AgentClient::new(&config.agent);
        let transcriber = TranscribeClient::new(&config.transcribe);
        let synth = SynthesisClient::new(&config.synthesis);
        Self {
            config,
            driver: Driver::new(),
            machine: StateMachine::new(),
            history: Vec::new(),
            agent,
            transcriber,
            synth,
            capture: None,
            playback: None,
            run_cancel: None,
            inbox_tx,
            inbox_rx,
            events_tx,
        }
    }

    /// A command handle for this conversation.
    pub fn handle(&self) -> ConversationHandle {
        ConversationHandle {
            tx: self.inbox_tx.clone(),
        }
    }

    /// Subscribe to the notification feed.
    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.events_tx.subscribe()
    }

    /// The current conversation state.
    pub fn state(&self) -> &ConversationState {
        self.machine.state()
    }

    /// The conversation history so far.
    pub fn messages(&self) -> &[Message] {
        &self.history
    }

    /// Run the coordinator loop until shutdown.
    ///
    /// Every session resource is released before this returns.
    ///
    /// # Errors
    ///
    /// Reserved; the current implementation always returns `Ok`.
    pub async fn run(mut self) -> Result<()> {
        info!("conversation loop started");
        while let Some(msg) = self.inbox_rx.recv().await {
            if matches!(msg, Internal::Command(Command::Shutdown)) {
                break;
            }
            self.handle_internal(msg).await;
        }
        self.teardown().await;
        info!("conversation loop stopped");
        Ok(())
    }

    async fn handle_internal(&mut self, msg: Internal) {
        match msg {
            Internal::Command(command) => {
                let actions = match command {
                    Command::SendMessage(text) => {
                        if text.trim().is_empty() {
                            Vec::new()
                        } else {
                            self.driver.send_message(text)
                        }
                    }
                    Command::StartRecording => self.driver.start_recording(),
                    Command::StopRecording => self.driver.stop_recording(),
                    Command::Reset => self.driver.reset(),
                    // Intercepted by the run loop.
                    Command::Shutdown => Vec::new(),
                };
                self.apply_actions(actions).await;
            }
            Internal::AgentEvent { generation, event } => {
                self.on_agent_event(generation, &event);
            }
            Internal::RunSettled { generation, result } => {
                self.on_run_settled(generation, result).await;
            }
            Internal::TranscriptReady { result } => {
                let actions = self
                    .driver
                    .transcript_ready(result.map_err(|e| e.to_string()));
                self.apply_actions(actions).await;
            }
            Internal::Playback(notice) => self.on_playback_notice(notice),
        }
    }

    fn on_agent_event(&mut self, generation: u64, event: &AgentEvent) {
        if !self.driver.accepts(generation) {
            trace!("dropping stale event from superseded run");
            return;
        }

        self.machine.apply(event);

        match event {
            AgentEvent::TextDelta { .. } => {
                self.publish(ConversationEvent::ResponseText(
                    self.machine.state().response_text.clone(),
                ));
            }
            AgentEvent::RunStarted
            | AgentEvent::RunFinished
            | AgentEvent::StateSnapshot { .. } => {
                self.publish(ConversationEvent::StateChanged(self.machine.state().clone()));
            }
            AgentEvent::ToolCallStart => {
                self.publish(ConversationEvent::ToolRunning { active: true });
            }
            AgentEvent::ToolCallEnd => {
                self.publish(ConversationEvent::ToolRunning { active: false });
            }
            AgentEvent::RunError { message } => {
                self.publish(ConversationEvent::Error(message.clone()));
                self.publish(ConversationEvent::StateChanged(self.machine.state().clone()));
            }
            AgentEvent::StateDelta { .. } => {}
        }
    }

    async fn on_run_settled(&mut self, generation: u64, result: Result<RunOutcome>) {
        let settled = match result {
            Ok(RunOutcome::Completed) => RunSettled::Completed {
                response: self.machine.state().response_text.clone(),
            },
            Ok(RunOutcome::Cancelled) => RunSettled::Cancelled,
            Err(e) => RunSettled::Failed {
                message: e.to_string(),
            },
        };

        let accepted = self.driver.accepts(generation);
        if accepted && let RunSettled::Failed { message } = &settled {
            self.machine.fail_run(message.clone());
        }

        let actions = self.driver.run_settled(generation, settled);
        self.apply_actions(actions).await;

        // Streaming settles last, after any error has surfaced.
        if accepted {
            self.machine.settle_run();
            self.run_cancel = None;
            self.publish(ConversationEvent::StateChanged(self.machine.state().clone()));
            self.publish(ConversationEvent::Streaming { active: false });
        }
    }

    fn on_playback_notice(&mut self, notice: PlaybackNotice) {
        match notice {
            PlaybackNotice::Started => {
                self.publish(ConversationEvent::Speaking { active: true });
            }
            PlaybackNotice::Finished => {
                self.driver.playback_settled();
                self.playback = None;
                self.publish(ConversationEvent::Speaking { active: false });
            }
            PlaybackNotice::Failed(message) => {
                self.driver.playback_settled();
                self.playback = None;
                self.publish(ConversationEvent::Speaking { active: false });
                self.publish(ConversationEvent::Error(message));
            }
        }
    }

    async fn apply_actions(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::StopPlayback => {
                    if let Some(playback) = self.playback.take() {
                        playback.stop().await;
                        self.publish(ConversationEvent::Speaking { active: false });
                    }
                }
                Action::CancelRun => {
                    if let Some(cancel) = self.run_cancel.take() {
                        cancel.cancel();
                    }
                }
                Action::StartRun {
                    generation,
                    user_text,
                } => self.start_run(generation, user_text),
                Action::StartCapture => self.start_capture(),
                Action::FinalizeCapture => self.finalize_capture(),
                Action::AbortCapture => {
                    if let Some(capture) = self.capture.take() {
                        capture.abort().await;
                        self.publish(ConversationEvent::Recording { analysis: None });
                    }
                }
                Action::AppendAssistant { text } => {
                    self.history.push(Message {
                        role: Role::Assistant,
                        content: text,
                    });
                }
                Action::Speak { text } => {
                    if let Some(old) = self.playback.take() {
                        old.stop().await;
                    }
                    let inbox = self.inbox_tx.clone();
                    let session = PlaybackSession::speak(
                        self.synth.clone(),
                        &self.config.audio,
                        text,
                        move |notice| {
                            let _ = inbox.send(Internal::Playback(notice));
                        },
                    );
                    match session {
                        Some(s) => self.playback = Some(s),
                        None => self.driver.playback_settled(),
                    }
                }
                Action::PublishTranscript { text } => {
                    self.publish(ConversationEvent::Transcript(text));
                }
                Action::SurfaceError { message } => {
                    self.publish(ConversationEvent::Error(message));
                }
                Action::ClearConversation => {
                    self.machine.reset();
                    self.history.clear();
                    self.run_cancel = None;
                    self.publish(ConversationEvent::StateChanged(
                        self.machine.state().clone(),
                    ));
                    self.publish(ConversationEvent::ResponseText(String::new()));
                    self.publish(ConversationEvent::Streaming { active: false });
                    self.publish(ConversationEvent::ToolRunning { active: false });
                }
            }
        }
    }

    fn start_run(&mut self, generation: u64, user_text: String) {
        self.history.push(Message {
            role: Role::User,
            content: user_text,
        });
        self.machine.begin_run();
        self.publish(ConversationEvent::Streaming { active: true });
        self.publish(ConversationEvent::StateChanged(self.machine.state().clone()));
        self.publish(ConversationEvent::ResponseText(String::new()));

        let cancel = CancellationToken::new();
        self.run_cancel = Some(cancel.clone());

        let agent = self.agent.clone();
        let messages = self.history.clone();
        let state = self.machine.state().clone();
        let inbox = self.inbox_tx.clone();
        tokio::spawn(async move {
            let event_inbox = inbox.clone();
            let result = agent
                .run(&messages, &state, &cancel, move |event| {
                    let _ = event_inbox.send(Internal::AgentEvent { generation, event });
                })
                .await;
            let _ = inbox.send(Internal::RunSettled { generation, result });
        });
    }

    fn start_capture(&mut self) {
        match CaptureSession::start(&self.config.audio) {
            Ok(session) => {
                self.publish(ConversationEvent::Recording {
                    analysis: Some(session.analysis()),
                });
                self.capture = Some(session);
            }
            Err(e) => {
                self.driver.capture_failed();
                self.publish(ConversationEvent::Error(e.to_string()));
            }
        }
    }

    fn finalize_capture(&mut self) {
        let Some(session) = self.capture.take() else {
            let _ = self.inbox_tx.send(Internal::TranscriptReady {
                result: Err(VoiceError::Audio("no active capture".into())),
            });
            return;
        };
        self.publish(ConversationEvent::Recording { analysis: None });

        let transcriber = self.transcriber.clone();
        let inbox = self.inbox_tx.clone();
        tokio::spawn(async move {
            let result = match session.stop().await {
                Ok(audio) => transcriber.transcribe(&audio).await,
                Err(e) => Err(e),
            };
            let _ = inbox.send(Internal::TranscriptReady { result });
        });
    }

    async fn teardown(&mut self) {
        if let Some(cancel) = self.run_cancel.take() {
            cancel.cancel();
        }
        if let Some(playback) = self.playback.take() {
            playback.stop().await;
        }
        if let Some(capture) = self.capture.take() {
            capture.abort().await;
        }
    }

    fn publish(&self, event: ConversationEvent) {
        // No subscriber is fine; the feed is observational.
        let _ = self.events_tx.send(event);
    }
}
