use tracing::{debug, warn};

use crate::config::EndOfStreamPolicy;
use crate::errors::TransportError;
use crate::stream::{ChatEvent, SessionState};
use crate::wire::{LineDecoder, parse_record};

/// Message of the synthetic error emitted when a body read fails mid-stream.
pub const TRANSPORT_INTERRUPTED: &str = "connection to the chat service was interrupted";

/// Message of the synthetic error emitted when the body closes early under
/// `EndOfStreamPolicy::Error`.
pub const STREAM_ENDED_EARLY: &str = "chat stream ended before completion";

/// Turns raw body fragments into an ordered sequence of `ChatEvent`s.
///
/// The ingestor is driven by one owner, one fragment at a time. It never
/// blocks and never fails: malformed records are dropped, transport problems
/// are converted into a terminal `Error` event.
#[derive(Debug)]
pub struct StreamIngestor {
    decoder: LineDecoder,
    state: SessionState,
    end_of_stream: EndOfStreamPolicy,
}

impl StreamIngestor {
    pub fn new(end_of_stream: EndOfStreamPolicy) -> Self {
        Self {
            decoder: LineDecoder::default(),
            state: SessionState::Idle,
            end_of_stream,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Moves `Idle -> Streaming`. Has no effect in any other state.
    pub fn begin(&mut self) {
        if self.state == SessionState::Idle {
            self.state = SessionState::Streaming;
        }
    }

    /// Feeds one fragment and returns the events it completed, in byte order.
    ///
    /// Fragments are ignored outside `Streaming`. Parsing stops at the first
    /// terminal event and everything after it is discarded.
    pub fn push_fragment(&mut self, fragment: &[u8]) -> Vec<ChatEvent> {
        if self.state != SessionState::Streaming {
            debug!(state = ?self.state, len = fragment.len(), "ignoring fragment outside streaming state");
            return Vec::new();
        }
        self.decoder.extend(fragment);
        self.drain()
    }

    /// Re-scans the buffer without new input.
    pub fn drain(&mut self) -> Vec<ChatEvent> {
        let mut events = Vec::new();
        if self.state != SessionState::Streaming {
            return events;
        }
        while let Some(line) = self.decoder.next_line() {
            let Some(event) = parse_record(&line) else {
                continue;
            };
            let terminal = self.settle(&event);
            events.push(event);
            if terminal {
                break;
            }
        }
        events
    }

    /// Handles a clean close of the body.
    ///
    /// Returns the synthetic terminal event, or `None` when the session was
    /// already finalized.
    pub fn end_of_stream(&mut self) -> Option<ChatEvent> {
        if self.state != SessionState::Streaming {
            return None;
        }
        let leftover = self.decoder.take_remainder();
        if !leftover.is_empty() {
            warn!(bytes = leftover.len(), "discarding unterminated record at end of stream");
        }
        let event = match self.end_of_stream {
            EndOfStreamPolicy::ImplicitDone => ChatEvent::Done,
            EndOfStreamPolicy::Error => ChatEvent::Error {
                message: STREAM_ENDED_EARLY.to_string(),
            },
        };
        self.settle(&event);
        Some(event)
    }

    /// Handles a failed body read.
    pub fn read_failed(&mut self, error: &TransportError) -> Option<ChatEvent> {
        if self.state != SessionState::Streaming {
            return None;
        }
        warn!(%error, "chat stream read failed");
        let event = ChatEvent::Error {
            message: TRANSPORT_INTERRUPTED.to_string(),
        };
        self.settle(&event);
        Some(event)
    }

    /// Cancels the session. Returns false if it had already finished.
    pub fn cancel(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = SessionState::Cancelled;
        self.decoder.clear();
        true
    }

    // Applies the state transition for `event`; returns true if it was terminal.
    fn settle(&mut self, event: &ChatEvent) -> bool {
        if !event.is_terminal() {
            return false;
        }
        self.state = match event {
            ChatEvent::Error { .. } => SessionState::Failed,
            _ => SessionState::Completed,
        };
        self.decoder.clear();
        true
    }
}

impl Default for StreamIngestor {
    fn default() -> Self {
        Self::new(EndOfStreamPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: [&str; 3] = [
        "data: {\"typ",
        "e\":\"start\",\"sources_used\":[],\"context_found\":false}\ndata: {\"typ",
        "e\":\"chunk\",\"content\":\"Hi\"}\ndata: {\"type\":\"chunk\",\"content\":\" there\"}\ndata: {\"type\":\"done\"}\n",
    ];

    fn expected_scenario() -> Vec<ChatEvent> {
        vec![
            ChatEvent::Start {
                sources: vec![],
                context_found: false,
            },
            ChatEvent::Token { text: "Hi".into() },
            ChatEvent::Token {
                text: " there".into(),
            },
            ChatEvent::Done,
        ]
    }

    fn feed<T: AsRef<[u8]>>(fragments: &[T]) -> (Vec<ChatEvent>, StreamIngestor) {
        let mut ingestor = StreamIngestor::default();
        ingestor.begin();
        let mut events = Vec::new();
        for fragment in fragments {
            events.extend(ingestor.push_fragment(fragment.as_ref()));
        }
        (events, ingestor)
    }

    #[test]
    fn scenario_fragments_yield_ordered_events() {
        let (events, ingestor) = feed(&SCENARIO);
        assert_eq!(events, expected_scenario());
        assert_eq!(ingestor.state(), SessionState::Completed);
    }

    #[test]
    fn every_split_matches_single_fragment_delivery() {
        let whole = SCENARIO.concat();
        let bytes = whole.as_bytes();
        let (reference, _) = feed(&[bytes]);
        assert_eq!(reference, expected_scenario());

        for cut in 0..=bytes.len() {
            let (events, _) = feed(&[&bytes[..cut], &bytes[cut..]]);
            assert_eq!(events, reference, "split at byte {cut}");
        }
        for a in (0..bytes.len()).step_by(7) {
            for b in (a..bytes.len()).step_by(11) {
                let (events, _) = feed(&[&bytes[..a], &bytes[a..b], &bytes[b..]]);
                assert_eq!(events, reference, "splits at {a} and {b}");
            }
        }
        let single_bytes: Vec<&[u8]> = bytes.chunks(1).collect();
        let (events, _) = feed(&single_bytes[..]);
        assert_eq!(events, reference);
    }

    #[test]
    fn drain_without_new_bytes_dispatches_nothing() {
        let mut ingestor = StreamIngestor::default();
        ingestor.begin();
        let events = ingestor.push_fragment(b"data: {\"type\":\"chunk\",\"content\":\"a\"}\ndata: {\"ty");
        assert_eq!(events.len(), 1);
        assert!(ingestor.drain().is_empty());
        assert!(ingestor.push_fragment(b"").is_empty());
        assert_eq!(ingestor.state(), SessionState::Streaming);
    }

    #[test]
    fn malformed_record_between_tokens_is_skipped() {
        let (events, ingestor) = feed(&[
            "data: {\"type\":\"chunk\",\"content\":\"one\"}\n",
            "data: {this is not json}\n",
            "data: {\"type\":\"chunk\",\"content\":\"two\"}\n",
        ]);
        assert_eq!(
            events,
            vec![
                ChatEvent::Token { text: "one".into() },
                ChatEvent::Token { text: "two".into() },
            ]
        );
        assert_eq!(ingestor.state(), SessionState::Streaming);
    }

    #[test]
    fn multibyte_split_decodes_once_complete() {
        let record = "data: {\"type\":\"chunk\",\"content\":\"\u{65e5}\u{672c}\"}\n";
        let bytes = record.as_bytes();
        let split = record.find('\u{672c}').expect("char present") + 1;
        let (events, _) = feed(&[&bytes[..split], &bytes[split..]]);
        assert_eq!(
            events,
            vec![ChatEvent::Token {
                text: "\u{65e5}\u{672c}".into()
            }]
        );
    }

    #[test]
    fn records_after_done_are_discarded() {
        let (events, mut ingestor) = feed(&[
            "data: {\"type\":\"chunk\",\"content\":\"a\"}\ndata: {\"type\":\"done\"}\ndata: {\"type\":\"chunk\",\"content\":\"late\"}\n",
        ]);
        assert_eq!(
            events,
            vec![ChatEvent::Token { text: "a".into() }, ChatEvent::Done]
        );
        assert!(
            ingestor
                .push_fragment(b"data: {\"type\":\"chunk\",\"content\":\"later\"}\n")
                .is_empty()
        );
        assert_eq!(ingestor.end_of_stream(), None);
        assert!(!ingestor.cancel());
        assert_eq!(ingestor.state(), SessionState::Completed);
    }

    #[test]
    fn server_error_is_terminal_and_sticky() {
        let (events, mut ingestor) = feed(&[
            "data: {\"type\":\"error\",\"error\":\"model not loaded\"}\ndata: {\"type\":\"done\"}\n",
        ]);
        assert_eq!(
            events,
            vec![ChatEvent::Error {
                message: "model not loaded".into()
            }]
        );
        assert_eq!(ingestor.state(), SessionState::Failed);
        assert_eq!(ingestor.read_failed(&TransportError::read("late")), None);
    }

    #[test]
    fn untyped_backend_records_stream_tokens_and_fail_on_error() {
        let (mut events, mut ingestor) = feed(&[
            "data: {\"token\": \"Hi\"}\n\ndata: {\"tok",
            "en\": \" there\"}\n\ndata: {\"error\": \"LLM interaction failed: boom\"}\n\n",
        ]);
        events.extend(ingestor.end_of_stream());
        assert_eq!(
            events,
            vec![
                ChatEvent::Token { text: "Hi".into() },
                ChatEvent::Token {
                    text: " there".into()
                },
                ChatEvent::Error {
                    message: "LLM interaction failed: boom".into()
                },
            ]
        );
        assert_eq!(ingestor.state(), SessionState::Failed);
    }

    #[test]
    fn untyped_done_record_completes_the_answer() {
        let (events, ingestor) = feed(&[
            "data: {\"token\": \"Ok\"}\n\ndata: {\"done\": true, \"context_used\": false}\n\ndata: {\"token\": \"late\"}\n\n",
        ]);
        assert_eq!(
            events,
            vec![ChatEvent::Token { text: "Ok".into() }, ChatEvent::Done]
        );
        assert_eq!(ingestor.state(), SessionState::Completed);
    }

    #[test]
    fn abrupt_end_is_implicit_done_by_default() {
        let (mut events, mut ingestor) =
            feed(&["data: {\"type\":\"chunk\",\"content\":\"Hi\"}\ndata: {\"type\":\"chu"]);
        events.extend(ingestor.end_of_stream());
        assert_eq!(
            events,
            vec![ChatEvent::Token { text: "Hi".into() }, ChatEvent::Done]
        );
        assert_eq!(ingestor.state(), SessionState::Completed);
    }

    #[test]
    fn abrupt_end_is_error_under_error_policy() {
        let mut ingestor = StreamIngestor::new(EndOfStreamPolicy::Error);
        ingestor.begin();
        let mut events = ingestor.push_fragment(b"data: {\"type\":\"chunk\",\"content\":\"Hi\"}\n");
        events.extend(ingestor.end_of_stream());
        assert_eq!(
            events,
            vec![
                ChatEvent::Token { text: "Hi".into() },
                ChatEvent::Error {
                    message: STREAM_ENDED_EARLY.into()
                }
            ]
        );
        assert_eq!(ingestor.state(), SessionState::Failed);
    }

    #[test]
    fn read_failure_becomes_generic_error() {
        let (_, mut ingestor) = feed(&["data: {\"type\":\"start\"}\n"]);
        let event = ingestor.read_failed(&TransportError::read("connection reset"));
        assert_eq!(
            event,
            Some(ChatEvent::Error {
                message: TRANSPORT_INTERRUPTED.into()
            })
        );
        assert_eq!(ingestor.state(), SessionState::Failed);
    }

    #[test]
    fn cancel_stops_dispatch_without_error() {
        let (events, mut ingestor) = feed(&["data: {\"type\":\"start\"}\ndata: {\"type\":\"chunk\""]);
        assert_eq!(events.len(), 1);
        assert!(ingestor.cancel());
        assert_eq!(ingestor.state(), SessionState::Cancelled);
        assert!(
            ingestor
                .push_fragment(b",\"content\":\"x\"}\ndata: {\"type\":\"done\"}\n")
                .is_empty()
        );
        assert_eq!(ingestor.end_of_stream(), None);
        assert_eq!(ingestor.read_failed(&TransportError::read("x")), None);
        assert_eq!(ingestor.state(), SessionState::Cancelled);
    }

    #[test]
    fn idle_ingestor_ignores_fragments() {
        let mut ingestor = StreamIngestor::default();
        assert!(ingestor.push_fragment(b"data: {\"type\":\"done\"}\n").is_empty());
        assert_eq!(ingestor.state(), SessionState::Idle);
        ingestor.begin();
        assert!(ingestor.drain().is_empty());
    }
}
