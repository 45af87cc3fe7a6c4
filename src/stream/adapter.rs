//! Push-to-Pull Adapter
//!
//! Runs a push source on a dedicated worker thread and hands its events to
//! the cursor one at a time. Two zero-capacity channels form the handshake:
//!
//! 1. the cursor sends on `resume` and blocks on `events`
//! 2. the worker, parked in `resume.recv()`, produces exactly one event and
//!    sends it, then parks again before producing the next
//!
//! So at most one event exists outside the parser at any time. A parse
//! error is held until the next resume and delivered in place of an event;
//! the worker then exits. Dropping the channel ends wakes a parked worker
//! with an error, which the handler turns into [`XmlError::Interrupted`] to
//! unwind the parse.

use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

use tracing::{debug, trace};

use super::events::{Delivered, RawAttribute, RawEvent};
use super::{EventType, ReaderConfig};
use crate::core::Attribute;
use crate::error::{Location, Result, XmlError};
use crate::source::{ContentHandler, DoctypeDeclaration, EventSource, XmlDeclaration};

const WORKER_NAME: &str = "xml-pull-worker";

/// Foreground half of the handshake
pub(crate) struct PullAdapter {
    resume: Option<SyncSender<()>>,
    events: Option<Receiver<Result<Delivered>>>,
    worker: Option<JoinHandle<()>>,
}

impl PullAdapter {
    /// Start the worker; it stays parked until the first [`next_event`](Self::next_event)
    pub fn spawn<S: EventSource>(source: S, config: ReaderConfig) -> Result<Self> {
        let (resume_tx, resume_rx) = sync_channel::<()>(0);
        let (event_tx, event_rx) = sync_channel::<Result<Delivered>>(0);

        let worker = thread::Builder::new()
            .name(WORKER_NAME.to_string())
            .spawn(move || run_worker(source, config, resume_rx, event_tx))?;
        debug!(worker = WORKER_NAME, "spawned parse worker");

        Ok(PullAdapter {
            resume: Some(resume_tx),
            events: Some(event_rx),
            worker: Some(worker),
        })
    }

    /// Let the worker produce one event and wait for it
    pub fn next_event(&mut self) -> Result<Delivered> {
        let (Some(resume), Some(events)) = (&self.resume, &self.events) else {
            return Err(XmlError::Closed);
        };
        // A send or receive error means the worker has already exited
        resume.send(()).map_err(|_| XmlError::Failed)?;
        match events.recv() {
            Ok(step) => {
                if let Ok(delivered) = &step {
                    trace!(event = %delivered.event.event_type(), "received event");
                }
                step
            }
            Err(_) => Err(XmlError::Failed),
        }
    }

    /// Release the worker and wait for it to exit; idempotent
    pub fn close(&mut self) -> Result<()> {
        self.resume.take();
        self.events.take();
        if let Some(worker) = self.worker.take() {
            let joined = worker.join();
            debug!(panicked = joined.is_err(), "parse worker joined");
            joined.map_err(|_| XmlError::WorkerPanicked)?;
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.worker.is_none()
    }
}

impl Drop for PullAdapter {
    fn drop(&mut self) {
        if self.close().is_err() {
            debug!("parse worker panicked before the reader was dropped");
        }
    }
}

fn run_worker<S: EventSource>(
    source: S,
    config: ReaderConfig,
    resume: Receiver<()>,
    events: SyncSender<Result<Delivered>>,
) {
    let mut handler = HandshakeHandler {
        resume,
        events,
        coalescing: config.coalescing,
        pending: None,
        location: Location::UNKNOWN,
    };

    match source.parse(&mut handler, &config) {
        Ok(()) => debug!("parse worker finished"),
        Err(XmlError::Interrupted) => debug!("parse worker interrupted"),
        Err(error) => {
            debug!(%error, "parse failed");
            handler.fail(error);
        }
    }
}

/// Text merged across callbacks while coalescing
struct Pending {
    text: String,
    location: Location,
}

/// Worker half of the handshake, seen by the source as its handler
struct HandshakeHandler {
    resume: Receiver<()>,
    events: SyncSender<Result<Delivered>>,
    coalescing: bool,
    pending: Option<Pending>,
    location: Location,
}

impl HandshakeHandler {
    /// Park until the cursor asks for an event, then hand it over
    fn deliver(&mut self, event: RawEvent, location: Location) -> Result<()> {
        self.resume.recv().map_err(|_| XmlError::Interrupted)?;
        trace!(event = %event.event_type(), "delivering event");
        self.events
            .send(Ok(Delivered { event, location }))
            .map_err(|_| XmlError::Interrupted)
    }

    fn flush(&mut self) -> Result<()> {
        match self.pending.take() {
            Some(pending) => self.deliver(
                RawEvent::Text {
                    kind: EventType::CHARACTERS,
                    text: pending.text,
                },
                pending.location,
            ),
            None => Ok(()),
        }
    }

    /// Deliver an event that ends any run of coalesced text
    fn emit(&mut self, event: RawEvent) -> Result<()> {
        self.flush()?;
        let location = self.location;
        self.deliver(event, location)
    }

    fn character_data(&mut self, kind: EventType, text: &str) -> Result<()> {
        if !self.coalescing {
            return self.emit(RawEvent::Text {
                kind,
                text: text.to_string(),
            });
        }
        match &mut self.pending {
            Some(pending) => pending.text.push_str(text),
            None => {
                self.pending = Some(Pending {
                    text: text.to_string(),
                    location: self.location,
                })
            }
        }
        Ok(())
    }

    /// Hand a parse error to the next resume, if anyone is still waiting
    fn fail(self, error: XmlError) {
        if self.resume.recv().is_ok() {
            // The cursor may have closed in between
            let _ = self.events.send(Err(error));
        }
    }
}

impl ContentHandler for HandshakeHandler {
    fn set_location(&mut self, location: Location) {
        self.location = location;
    }

    fn start_document(&mut self, declaration: XmlDeclaration) -> Result<()> {
        self.emit(RawEvent::StartDocument(declaration))
    }

    fn end_document(&mut self) -> Result<()> {
        self.emit(RawEvent::EndDocument)
    }

    fn doctype(&mut self, declaration: DoctypeDeclaration) -> Result<()> {
        self.emit(RawEvent::Dtd(Box::new(declaration)))
    }

    fn start_element(&mut self, name: &str, attributes: &[Attribute<'_>]) -> Result<()> {
        let attributes = attributes
            .iter()
            .map(|attr| RawAttribute {
                name: String::from_utf8_lossy(&attr.name).into_owned(),
                value: String::from_utf8_lossy(&attr.value).into_owned(),
                att_type: attr.att_type,
                specified: attr.specified,
                enumeration: attr
                    .enumeration
                    .iter()
                    .map(|v| String::from_utf8_lossy(v).into_owned())
                    .collect(),
            })
            .collect();
        self.emit(RawEvent::StartElement {
            name: name.to_string(),
            attributes,
        })
    }

    fn end_element(&mut self, name: &str) -> Result<()> {
        self.emit(RawEvent::EndElement {
            name: name.to_string(),
        })
    }

    fn characters(&mut self, text: &str) -> Result<()> {
        self.character_data(EventType::CHARACTERS, text)
    }

    fn cdata(&mut self, text: &str) -> Result<()> {
        self.character_data(EventType::CDATA, text)
    }

    fn whitespace(&mut self, text: &str) -> Result<()> {
        self.emit(RawEvent::Text {
            kind: EventType::SPACE,
            text: text.to_string(),
        })
    }

    fn comment(&mut self, text: &str) -> Result<()> {
        self.emit(RawEvent::Text {
            kind: EventType::COMMENT,
            text: text.to_string(),
        })
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
        self.emit(RawEvent::ProcessingInstruction {
            target: target.to_string(),
            data: data.to_string(),
        })
    }

    fn entity_reference(&mut self, name: &str, replacement: Option<&str>) -> Result<()> {
        self.emit(RawEvent::EntityReference {
            name: name.to_string(),
            replacement: replacement.map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::XmlSource;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn adapter(xml: &str, coalescing: bool) -> PullAdapter {
        let config = ReaderConfig {
            coalescing,
            ..ReaderConfig::default()
        };
        PullAdapter::spawn(XmlSource::from_text(xml), config).unwrap()
    }

    fn drain(adapter: &mut PullAdapter) -> Vec<RawEvent> {
        let mut events = Vec::new();
        loop {
            let event = adapter.next_event().unwrap().event;
            let done = event == RawEvent::EndDocument;
            events.push(event);
            if done {
                return events;
            }
        }
    }

    fn text(kind: EventType, text: &str) -> RawEvent {
        RawEvent::Text {
            kind,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_events_in_source_order() {
        let mut adapter = adapter("<a>x<![CDATA[y]]></a>", false);
        let events = drain(&mut adapter);
        assert_eq!(events.len(), 6);
        assert_eq!(events[2], text(EventType::CHARACTERS, "x"));
        assert_eq!(events[3], text(EventType::CDATA, "y"));
        adapter.close().unwrap();
    }

    #[test]
    fn test_coalescing_merges_until_boundary() {
        let mut adapter = adapter("<a>x<![CDATA[y]]>&amp;z<!--c-->w</a>", true);
        let events = drain(&mut adapter);
        let kinds: Vec<EventType> = events.iter().map(RawEvent::event_type).collect();
        assert_eq!(
            kinds,
            vec![
                EventType::START_DOCUMENT,
                EventType::START_ELEMENT,
                EventType::CHARACTERS,
                EventType::COMMENT,
                EventType::CHARACTERS,
                EventType::END_ELEMENT,
                EventType::END_DOCUMENT,
            ]
        );
        assert_eq!(events[2], text(EventType::CHARACTERS, "xy&z"));
        assert_eq!(events[4], text(EventType::CHARACTERS, "w"));
    }

    #[test]
    fn test_coalesced_text_keeps_first_location() {
        let mut adapter = adapter("<a>\nx<![CDATA[y]]></a>", true);
        adapter.next_event().unwrap();
        adapter.next_event().unwrap();
        let delivered = adapter.next_event().unwrap();
        assert_eq!(delivered.location.offset, 3);
    }

    #[test]
    fn test_error_delivered_then_failed() {
        let mut adapter = adapter("<a><b></a>", false);
        assert!(adapter.next_event().is_ok()); // START_DOCUMENT
        assert!(adapter.next_event().is_ok()); // <a>
        assert!(adapter.next_event().is_ok()); // <b>
        let error = adapter.next_event().unwrap_err();
        assert!(matches!(error, XmlError::Malformed { .. }));
        assert!(matches!(adapter.next_event(), Err(XmlError::Failed)));
        adapter.close().unwrap();
    }

    #[test]
    fn test_close_interrupts_parked_worker() {
        let mut adapter = adapter("<a><b/><b/><b/></a>", false);
        adapter.next_event().unwrap();
        adapter.next_event().unwrap();
        adapter.close().unwrap();
        assert!(adapter.is_closed());
        assert!(matches!(adapter.next_event(), Err(XmlError::Closed)));
        // Closing again is a no-op
        adapter.close().unwrap();
    }

    #[test]
    fn test_close_before_first_step() {
        let mut adapter = adapter("<a/>", false);
        adapter.close().unwrap();
    }

    #[test]
    fn test_one_event_in_flight() {
        struct Counting(Arc<AtomicUsize>);
        impl EventSource for Counting {
            fn parse<H: ContentHandler>(self, handler: &mut H, _: &ReaderConfig) -> Result<()> {
                handler.start_document(XmlDeclaration::default())?;
                for _ in 0..5 {
                    self.0.fetch_add(1, Ordering::SeqCst);
                    handler.comment("tick")?;
                }
                handler.end_document()
            }
        }

        let produced = Arc::new(AtomicUsize::new(0));
        let mut adapter =
            PullAdapter::spawn(Counting(Arc::clone(&produced)), ReaderConfig::default()).unwrap();
        adapter.next_event().unwrap();
        adapter.next_event().unwrap();
        adapter.next_event().unwrap();
        // Two comments consumed; the worker is parked before producing a fourth
        assert!(produced.load(Ordering::SeqCst) <= 3);
        adapter.close().unwrap();
        assert!(produced.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn test_worker_panic_reported_on_close() {
        struct Panicking;
        impl EventSource for Panicking {
            fn parse<H: ContentHandler>(self, handler: &mut H, _: &ReaderConfig) -> Result<()> {
                handler.start_document(XmlDeclaration::default())?;
                panic!("source bug");
            }
        }

        let mut adapter = PullAdapter::spawn(Panicking, ReaderConfig::default()).unwrap();
        adapter.next_event().unwrap();
        assert!(matches!(adapter.next_event(), Err(XmlError::Failed)));
        assert!(matches!(adapter.close(), Err(XmlError::WorkerPanicked)));
    }
}
