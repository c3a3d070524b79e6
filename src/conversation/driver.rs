//! Pure interruption policy for the conversation coordinator.
//!
//! The driver tracks which audio-bearing activities are live (agent run,
//! capture, transcription, playback) and turns commands and task
//! completions into an ordered list of effects for the coordinator to
//! execute. It performs no I/O, which makes the mutual-exclusion and
//! supersede rules directly testable.
//!
//! Cancellation is a generation counter: each run gets the generation
//! current at its start, and anything tagged with an older generation is
//! ignored. The counter is the request token — invalidating it is bumping
//! it, which happens before a new run starts.

/// An effect for the coordinator to execute, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Action {
    /// Stop and release the active playback session.
    StopPlayback,
    /// Cancel the in-flight agent request.
    CancelRun,
    /// Append the user turn and issue a new agent request.
    StartRun {
        /// Generation tag for the new run's events and completion.
        generation: u64,
        /// The user turn to append to history.
        user_text: String,
    },
    /// Acquire the microphone and begin capture.
    StartCapture,
    /// Finalize capture and hand the payload to transcription.
    FinalizeCapture,
    /// Tear down capture, discarding buffered audio.
    AbortCapture,
    /// Append an assistant turn to history.
    AppendAssistant {
        /// The completed response text.
        text: String,
    },
    /// Speak the completed response.
    Speak {
        /// Text to synthesize and play.
        text: String,
    },
    /// Notify the observer of the transcript about to be sent.
    PublishTranscript {
        /// The transcribed text.
        text: String,
    },
    /// Surface a user-visible error.
    SurfaceError {
        /// The error description.
        message: String,
    },
    /// Clear state and history back to initial.
    ClearConversation,
}

/// How an agent run settled, from the coordinator's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RunSettled {
    /// Stream closed normally; `response` is the accumulated text.
    Completed {
        /// Accumulated response text at completion.
        response: String,
    },
    /// The run was superseded or reset; not an error.
    Cancelled,
    /// Transport-level failure.
    Failed {
        /// The failure description.
        message: String,
    },
}

/// Activity tracker and policy reducer.
#[derive(Debug, Default)]
pub(crate) struct Driver {
    generation: u64,
    run_active: bool,
    recording: bool,
    transcribing: bool,
    playback_active: bool,
}

impl Driver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether events tagged with `generation` may touch live state.
    pub fn accepts(&self, generation: u64) -> bool {
        self.run_active && generation == self.generation
    }

    /// A new outgoing message: preempt playback, supersede any in-flight
    /// run, and start a new one under a fresh generation.
    pub fn send_message(&mut self, text: String) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.playback_active {
            actions.push(Action::StopPlayback);
            self.playback_active = false;
        }
        if self.run_active {
            actions.push(Action::CancelRun);
        }
        self.generation += 1;
        self.run_active = true;
        actions.push(Action::StartRun {
            generation: self.generation,
            user_text: text,
        });
        actions
    }

    /// Begin capture, stopping playback first. Rejected while capture or
    /// transcription is already underway.
    pub fn start_recording(&mut self) -> Vec<Action> {
        if self.recording || self.transcribing {
            return Vec::new();
        }
        let mut actions = Vec::new();
        if self.playback_active {
            actions.push(Action::StopPlayback);
            self.playback_active = false;
        }
        self.recording = true;
        actions.push(Action::StartCapture);
        actions
    }

    /// Finalize capture. A no-op when not recording.
    pub fn stop_recording(&mut self) -> Vec<Action> {
        if !self.recording {
            return Vec::new();
        }
        self.recording = false;
        self.transcribing = true;
        vec![Action::FinalizeCapture]
    }

    /// Capture failed to start; clear the activity flag.
    pub fn capture_failed(&mut self) {
        self.recording = false;
    }

    /// A transcription settled. Empty transcripts send nothing; failures
    /// surface without touching any in-flight run.
    pub fn transcript_ready(
        &mut self,
        result: std::result::Result<String, String>,
    ) -> Vec<Action> {
        if !self.transcribing {
            // Reset tore the pending transcription down.
            return Vec::new();
        }
        self.transcribing = false;
        match result {
            Ok(text) if !text.trim().is_empty() => {
                let mut actions = vec![Action::PublishTranscript { text: text.clone() }];
                actions.extend(self.send_message(text));
                actions
            }
            Ok(_) => Vec::new(),
            Err(message) => vec![Action::SurfaceError { message }],
        }
    }

    /// An agent run settled. Stale generations are dropped entirely; the
    /// current run's completion speaks the response when there is one.
    pub fn run_settled(&mut self, generation: u64, settled: RunSettled) -> Vec<Action> {
        if generation != self.generation || !self.run_active {
            return Vec::new();
        }
        self.run_active = false;
        match settled {
            RunSettled::Completed { response } if !response.trim().is_empty() => {
                self.playback_active = true;
                vec![
                    Action::AppendAssistant {
                        text: response.clone(),
                    },
                    Action::Speak { text: response },
                ]
            }
            RunSettled::Completed { .. } | RunSettled::Cancelled => Vec::new(),
            RunSettled::Failed { message } => vec![Action::SurfaceError { message }],
        }
    }

    /// Playback ended (naturally or on error).
    pub fn playback_settled(&mut self) {
        self.playback_active = false;
    }

    /// Cancel everything and clear all activity.
    pub fn reset(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.run_active {
            actions.push(Action::CancelRun);
        }
        if self.playback_active {
            actions.push(Action::StopPlayback);
        }
        if self.recording {
            actions.push(Action::AbortCapture);
        }
        self.generation += 1;
        self.run_active = false;
        self.recording = false;
        self.transcribing = false;
        self.playback_active = false;
        actions.push(Action::ClearConversation);
        actions
    }
}
