// ── Run loop ──
//
// Drives a Session from the outside world: driver events and user
// requests arrive over an mpsc channel, timers are mapped from the
// session's virtual clock onto tokio's, and every notification is
// broadcast to subscribers. One input is handled to completion before
// the next is looked at.

use std::future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::model::{DriverEvent, MacAddr};
use crate::session::{Session, TaggedNotification};
use crate::station::Station;

const REQUEST_CHANNEL_SIZE: usize = 64;
const NOTIFICATION_CHANNEL_SIZE: usize = 256;

/// Something for one interface to do.
#[derive(Debug, Clone)]
pub enum Request {
    Event(DriverEvent),
    WpsPbc { bssid: Option<MacAddr> },
    WpsPin { bssid: Option<MacAddr>, pin: Option<u32> },
    WpsCancel,
    Disconnect,
    Reassociate,
}

#[derive(Debug)]
struct Envelope {
    ifname: String,
    request: Request,
}

/// Cloneable handle for feeding and observing a running loop.
#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    tx: mpsc::Sender<Envelope>,
    notes: broadcast::Sender<Arc<TaggedNotification>>,
    cancel: CancellationToken,
}

impl RuntimeHandle {
    /// Queue a request for `ifname`.
    pub async fn send(&self, ifname: impl Into<String>, request: Request) -> Result<(), CoreError> {
        self.tx
            .send(Envelope {
                ifname: ifname.into(),
                request,
            })
            .await
            .map_err(|_| CoreError::Internal("run loop has stopped".into()))
    }

    pub async fn event(&self, ifname: impl Into<String>, event: DriverEvent) -> Result<(), CoreError> {
        self.send(ifname, Request::Event(event)).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<TaggedNotification>> {
        self.notes.subscribe()
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

pub struct Runtime {
    session: Session,
    rx: mpsc::Receiver<Envelope>,
    notes: broadcast::Sender<Arc<TaggedNotification>>,
    cancel: CancellationToken,
}

impl Runtime {
    pub fn new(session: Session) -> (Self, RuntimeHandle) {
        let (tx, rx) = mpsc::channel(REQUEST_CHANNEL_SIZE);
        let (notes, _) = broadcast::channel(NOTIFICATION_CHANNEL_SIZE);
        let cancel = CancellationToken::new();
        let handle = RuntimeHandle {
            tx,
            notes: notes.clone(),
            cancel: cancel.clone(),
        };
        (
            Self {
                session,
                rx,
                notes,
                cancel,
            },
            handle,
        )
    }

    /// Start every interface and run until cancelled, until every handle
    /// is dropped, or until the session asks to terminate. Returns the
    /// session for inspection.
    pub async fn run(mut self) -> Session {
        let origin = Instant::now();
        info!(interfaces = self.session.len(), "run loop starting");
        self.session.start_all();
        self.session.advance(Duration::ZERO);
        self.publish();

        while !self.session.terminate_requested() {
            let deadline = self.session.next_deadline().map(|at| origin + at);
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    debug!("run loop cancelled");
                    break;
                }
                msg = self.rx.recv() => {
                    let Some(envelope) = msg else {
                        debug!("all handles dropped");
                        break;
                    };
                    self.session.advance(origin.elapsed());
                    self.dispatch(envelope);
                }
                () = sleep_until(deadline) => {
                    self.session.advance(origin.elapsed());
                }
            }
            self.publish();
        }

        info!("run loop stopped");
        self.session
    }

    fn dispatch(&mut self, envelope: Envelope) {
        let Envelope { ifname, request } = envelope;
        let result = match request {
            Request::Event(event) => self.session.handle_event(&ifname, event),
            Request::WpsPbc { bssid } => self
                .session
                .with_station(&ifname, |st| st.start_pbc(bssid, false))
                .and_then(|r| r),
            Request::WpsPin { bssid, pin } => self
                .session
                .with_station(&ifname, |st| st.start_pin(bssid, pin, false, 0))
                .and_then(|r| r.map(|pin| debug!(%ifname, "WPS PIN {pin:08} in use"))),
            Request::WpsCancel => self.session.with_station(&ifname, Station::wps_cancel),
            Request::Disconnect => self.session.with_station(&ifname, Station::disconnect),
            Request::Reassociate => self.session.with_station(&ifname, Station::reassociate),
        };
        if let Err(err) = result {
            warn!(%ifname, %err, "request failed");
        }
    }

    fn publish(&mut self) {
        for note in self.session.drain_notifications() {
            debug!(ifname = %note.ifname, "{}", note.notification);
            // No subscribers is fine.
            let _ = self.notes.send(Arc::new(note));
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => future::pending().await,
    }
}
