use std::collections::HashMap;
use std::io;
use std::num::NonZeroU32;
use std::os::fd::RawFd;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::buf::{BufPool, MessageBuf, RecvBuf};
use crate::error::ErrorKind;
use crate::message::Outbound;
use crate::org_freedesktop_dbus as bus;
use crate::proto::Type;
use crate::{
    BodyBuf, Call, Error, Flags, MatchRule, Message, Observer, OwnedMessage, OwnedMessageKind,
    Result, Signal,
};

use super::observer::{MatchEntry, ObserverSlot, Subscription};
use super::transport::Stream;

/// The lifecycle of a connection.
///
/// `Disconnected` is terminal; a fresh connection object is required to
/// connect again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Created,
    Connecting,
    Connected,
    Disconnected,
}

/// What to do with the reply matching a pending call.
pub(crate) enum ReplyHandler {
    /// Complete a caller waiting on [`Connection::call`].
    Call(oneshot::Sender<Result<OwnedMessage>>),
    /// Book-keep an outstanding `AddMatch` for the given rule string.
    AddMatch {
        rule: Box<str>,
        ack: oneshot::Sender<Result<()>>,
    },
}

/// Mutable connection state, guarded by the single gate of the connection.
///
/// Operations under the gate never suspend.
pub(crate) struct State {
    pub(crate) phase: Phase,
    serial: u32,
    pub(crate) pending: HashMap<NonZeroU32, ReplyHandler>,
    pub(crate) matches: HashMap<Box<str>, MatchEntry>,
    pub(crate) name: Option<Box<str>>,
    pub(crate) reason: Option<Arc<Error>>,
    next_observer: u64,
}

impl State {
    fn new() -> Self {
        Self {
            phase: Phase::Created,
            serial: 0,
            pending: HashMap::new(),
            matches: HashMap::new(),
            name: None,
            reason: None,
            next_observer: 0,
        }
    }

    /// Allocate the next serial.
    ///
    /// Serials are never zero; after a wrap a slot is only reused once no
    /// call is pending under it.
    fn next_serial(&mut self) -> NonZeroU32 {
        loop {
            self.serial = self.serial.wrapping_add(1);

            if let Some(serial) = NonZeroU32::new(self.serial) {
                if !self.pending.contains_key(&serial) {
                    return serial;
                }
            }
        }
    }
}

pub(crate) struct Shared {
    pub(crate) state: Mutex<State>,
    /// Handle onto the sender task's queue; dropped on close so the task
    /// drains and exits.
    tx: Mutex<Option<mpsc::UnboundedSender<MessageBuf>>>,
    pub(crate) pool: BufPool,
    /// Cancelled on close to stop the receiver task.
    closed: CancellationToken,
    unix_fd: bool,
    guid: Box<[u8]>,
}

impl Shared {
    pub(crate) fn new(
        tx: mpsc::UnboundedSender<MessageBuf>,
        unix_fd: bool,
        guid: Box<[u8]>,
    ) -> Self {
        Self {
            state: Mutex::new(State::new()),
            tx: Mutex::new(Some(tx)),
            pool: BufPool::new(),
            closed: CancellationToken::new(),
            unix_fd,
            guid,
        }
    }

    /// Hand an encoded frame to the sender task.
    ///
    /// Returns the buffer if the transport is closed; ownership transfers on
    /// success.
    fn try_send(&self, buf: MessageBuf) -> std::result::Result<(), MessageBuf> {
        let tx = self.tx.lock().unwrap();

        match &*tx {
            Some(tx) => tx.send(buf).map_err(|error| error.0),
            None => Err(buf),
        }
    }

    /// Encode and send an outbound message.
    ///
    /// When a handler is given, the serial is allocated and the handler
    /// inserted under the gate, then the frame is sent; a failing send
    /// removes the handler again so no stale pending entry survives.
    pub(crate) fn send_message(
        &self,
        outbound: &Outbound<'_>,
        mut body: BodyBuf,
        handler: Option<ReplyHandler>,
    ) -> Result<NonZeroU32> {
        let mut buf = self.pool.rent();

        if let Err(error) = buf.encode(outbound, &mut body) {
            self.pool.put(buf);
            return Err(error);
        }

        let has_handler = handler.is_some();

        let serial = {
            let mut state = self.state.lock().unwrap();

            if state.phase == Phase::Disconnected {
                self.pool.put(buf);
                return Err(Error::disconnected(state.reason.clone()));
            }

            let serial = state.next_serial();

            if let Some(handler) = handler {
                state.pending.insert(serial, handler);
            }

            serial
        };

        buf.set_serial(serial);
        trace!(serial = serial.get(), "queueing message");

        if let Err(buf) = self.try_send(buf) {
            self.pool.put(buf);

            let mut state = self.state.lock().unwrap();

            if has_handler {
                state.pending.remove(&serial);
            }

            return Err(Error::disconnected(state.reason.clone()));
        }

        Ok(serial)
    }

    /// Tear the connection down.
    ///
    /// Close is idempotent and the first error wins as the disconnect
    /// reason. Every pending call completes with `Disconnected`, every
    /// observer channel closes, and both transport tasks stop.
    pub(crate) fn close(&self, reason: Option<Error>) {
        let (pending, matches) = {
            let mut state = self.state.lock().unwrap();

            if state.phase == Phase::Disconnected {
                return;
            }

            debug!(?reason, "closing connection");
            state.phase = Phase::Disconnected;
            state.reason = reason.map(Arc::new);

            (
                std::mem::take(&mut state.pending),
                std::mem::take(&mut state.matches),
            )
        };

        *self.tx.lock().unwrap() = None;
        self.closed.cancel();

        let reason = self.state.lock().unwrap().reason.clone();

        for (_, handler) in pending {
            match handler {
                ReplyHandler::Call(tx) => {
                    let _ = tx.send(Err(Error::disconnected(reason.clone())));
                }
                ReplyHandler::AddMatch { ack, .. } => {
                    let _ = ack.send(Err(Error::disconnected(reason.clone())));
                }
            }
        }

        // Dropping the entries drops the observer senders, closing their
        // channels.
        drop(matches);
    }

    /// Detach a disposed observer from its match entry.
    pub(crate) fn detach_observer(&self, rule: &str, id: u64) {
        let send_remove = {
            let mut state = self.state.lock().unwrap();

            if state.phase == Phase::Disconnected {
                return;
            }

            let Some(entry) = state.matches.get_mut(rule) else {
                return;
            };

            entry.observers.retain(|slot| slot.id != id);

            // The entry goes away with its last observer, or with its last
            // *subscribing* observer when a server-side rule exists.
            let remove = entry.observers.is_empty()
                || (!entry.has_subscribers()
                    && entry.subscription != Subscription::Unsubscribed);

            if !remove {
                return;
            }

            let send_remove = entry.subscription != Subscription::Unsubscribed
                && state.name.is_some();

            state.matches.remove(rule);
            send_remove
        };

        if send_remove {
            let mut body = BodyBuf::new();
            body.write(rule);

            let call = Call::with_path(bus::PATH, bus::REMOVE_MATCH)
                .with_interface(bus::INTERFACE)
                .with_destination(bus::DESTINATION)
                .with_flags(Flags::NO_REPLY_EXPECTED);

            if let Err(error) = self.send_message(&Outbound::from(&call), body, None) {
                debug!(?error, "RemoveMatch not sent");
            }
        }
    }
}

/// Dispatch one inbound frame.
///
/// Matching observers are collected under the gate and emitted to outside
/// of it, in wire order per observer; the pending-call completion, if any,
/// runs after the observers so a signal preceding a reply is observed
/// first. Observers attached or disposed while emitting do not receive the
/// frame.
pub(crate) fn dispatch(shared: &Shared, message: &Message<'_>) {
    let mut sinks = Vec::new();

    let handler = {
        let mut state = shared.state.lock().unwrap();

        let handler = message
            .reply_serial()
            .and_then(|serial| state.pending.remove(&serial));

        for entry in state.matches.values() {
            if entry.rule.matches(message) {
                for slot in &entry.observers {
                    sinks.push(slot.tx.clone());
                }
            }
        }

        handler
    };

    if sinks.is_empty() && handler.is_none() {
        return;
    }

    let owned = message.to_owned();

    for tx in sinks {
        // A send failure means the observer was disposed after the
        // snapshot; it must not receive the frame.
        let _ = tx.send(owned.clone());
    }

    if let Some(handler) = handler {
        complete(shared, handler, owned);
    }
}

/// Complete a pending call with the reply that matched its serial.
fn complete(shared: &Shared, handler: ReplyHandler, reply: OwnedMessage) {
    let result = if let OwnedMessageKind::Error { error_name, .. } = reply.kind() {
        let name = error_name.clone();

        // If the body leads with a string it is the error message.
        let message = if reply.signature().first_type() == Some(Type::STRING) {
            reply.body().read::<str>().ok().map(Box::from)
        } else {
            None
        };

        Err(Error::new(ErrorKind::Dbus { name, message }))
    } else if matches!(reply.kind(), OwnedMessageKind::MethodReturn { .. }) {
        Ok(reply)
    } else {
        Err(Error::new(ErrorKind::UnexpectedReply))
    };

    match handler {
        ReplyHandler::Call(tx) => {
            let _ = tx.send(result);
        }
        ReplyHandler::AddMatch { rule, ack } => match result {
            Ok(..) => {
                let mut state = shared.state.lock().unwrap();

                if let Some(entry) = state.matches.get_mut(&rule) {
                    entry.subscription = Subscription::Subscribed;
                }

                drop(state);
                let _ = ack.send(Ok(()));
            }
            Err(error) => {
                warn!(rule = &*rule, ?error, "AddMatch rejected, removing entry");

                let removed = shared.state.lock().unwrap().matches.remove(&rule);
                drop(removed);
                let _ = ack.send(Err(error));
            }
        },
    }
}

/// The receiver task: socket bytes in, frames dispatched in wire order.
pub(crate) async fn receiver_task_entry(shared: Arc<Shared>, stream: Arc<Stream>, mut recv: RecvBuf) {
    let result = recv_loop(&shared, &stream, &mut recv).await;

    match result {
        Ok(()) => shared.close(None),
        Err(error) => shared.close(Some(error)),
    }
}

async fn recv_loop(shared: &Shared, stream: &Stream, recv: &mut RecvBuf) -> Result<()> {
    loop {
        while let Some(message_ref) = recv.try_read_message()? {
            {
                let message = recv.read_message(&message_ref)?;
                trace!(serial = message.serial().get(), "dispatching frame");
                dispatch(shared, &message);
            }

            recv.advance(message_ref.total);
        }

        tokio::select! {
            _ = shared.closed.cancelled() => return Ok(()),
            ready = stream.readable() => ready?,
        }

        match recv.fill_from(|buf, fds| stream.try_recv(buf, fds)) {
            Ok(0) => {
                return Err(Error::new(ErrorKind::Io(io::Error::from(
                    io::ErrorKind::UnexpectedEof,
                ))))
            }
            Ok(_) => {}
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => {}
            Err(error) => return Err(error.into()),
        }
    }
}

/// The sender task: drains the outbound queue in FIFO order, so frames hit
/// the socket in serial order.
pub(crate) async fn sender_task_entry(
    shared: Arc<Shared>,
    stream: Arc<Stream>,
    mut rx: mpsc::UnboundedReceiver<MessageBuf>,
) {
    while let Some(buf) = rx.recv().await {
        match send_frame(&stream, &buf).await {
            Ok(()) => shared.pool.put(buf),
            Err(error) => {
                shared.pool.put(buf);
                shared.close(Some(error));
                return;
            }
        }
    }
}

async fn send_frame(stream: &Stream, buf: &MessageBuf) -> Result<()> {
    let bytes = buf.get();
    let fds = buf.raw_fds();
    let mut written = 0;

    while written < bytes.len() {
        stream.writable().await?;

        // Descriptors ride with the first chunk only.
        let attach: &[RawFd] = if written == 0 { &fds } else { &[] };

        match stream.try_send(&bytes[written..], attach) {
            Ok(n) => written += n,
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => continue,
            Err(error) => return Err(error.into()),
        }
    }

    Ok(())
}

/// A connection to a D-Bus peer or message bus.
///
/// Constructed with [`ConnectionBuilder`] or the [`session_bus`] and
/// [`system_bus`] shorthands. The connection owns a receiver and a sender
/// task; disposing it (explicitly or by drop) completes every pending call
/// with a disconnect error. A disconnected connection cannot be revived.
///
/// [`ConnectionBuilder`]: crate::ConnectionBuilder
/// [`session_bus`]: Self::session_bus
/// [`system_bus`]: Self::system_bus
pub struct Connection {
    shared: Arc<Shared>,
    tasks: Vec<JoinHandle<()>>,
}

impl Connection {
    /// Connect to the session bus named by `DBUS_SESSION_BUS_ADDRESS`.
    pub async fn session_bus() -> Result<Self> {
        crate::ConnectionBuilder::new().session_bus().connect().await
    }

    /// Connect to the system bus named by `DBUS_SYSTEM_BUS_ADDRESS`,
    /// falling back to the well-known socket path.
    pub async fn system_bus() -> Result<Self> {
        crate::ConnectionBuilder::new().system_bus().connect().await
    }

    /// Connect to the given address string.
    pub async fn connect_to(address: &str) -> Result<Self> {
        crate::ConnectionBuilder::new().address(address).connect().await
    }

    pub(crate) fn from_parts(shared: Arc<Shared>, tasks: Vec<JoinHandle<()>>) -> Self {
        Self { shared, tasks }
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    /// The unique name assigned by the bus, if the peer is a bus daemon.
    pub fn unique_name(&self) -> Option<Box<str>> {
        self.shared.state.lock().unwrap().name.clone()
    }

    /// The GUID the server reported during authentication.
    pub fn guid(&self) -> &[u8] {
        &self.shared.guid
    }

    /// Whether Unix fd passing was negotiated on this transport.
    pub fn unix_fd(&self) -> bool {
        self.shared.unix_fd
    }

    /// Issue a method call and await its reply.
    ///
    /// The reply is surfaced as the returned message for a method return,
    /// and as an error carrying the error name and message for an error
    /// reply. The `NO_REPLY_EXPECTED` flag is ignored here; use [`send`]
    /// for fire-and-forget calls.
    ///
    /// [`send`]: Self::send
    pub async fn call(&self, call: Call<'_>, body: BodyBuf) -> Result<OwnedMessage> {
        let mut call = call;
        call.flags = Flags(call.flags.0 & !Flags::NO_REPLY_EXPECTED.0);

        let (tx, rx) = oneshot::channel();

        self.shared
            .send_message(&Outbound::from(&call), body, Some(ReplyHandler::Call(tx)))?;

        match rx.await {
            Ok(result) => result,
            Err(..) => {
                let reason = self.shared.state.lock().unwrap().reason.clone();
                Err(Error::disconnected(reason))
            }
        }
    }

    /// Issue a method call without expecting a reply.
    ///
    /// The call is sent with `NO_REPLY_EXPECTED` and never enters the
    /// pending-call table.
    pub fn send(&self, call: Call<'_>, body: BodyBuf) -> Result<()> {
        let mut call = call;
        call.flags = call.flags | Flags::NO_REPLY_EXPECTED;

        self.shared
            .send_message(&Outbound::from(&call), body, None)?;
        Ok(())
    }

    /// Emit a signal.
    pub fn emit(&self, signal: Signal<'_>, body: BodyBuf) -> Result<()> {
        self.shared
            .send_message(&Outbound::from(&signal), body, None)?;
        Ok(())
    }

    /// Reply to an inbound method call with a method return.
    ///
    /// Replies to calls sent with `NO_REPLY_EXPECTED` are omitted.
    pub fn send_return(&self, to: &OwnedMessage, body: BodyBuf) -> Result<()> {
        if to.flags() & Flags::NO_REPLY_EXPECTED {
            return Ok(());
        }

        let outbound = Outbound {
            kind: crate::message::OutboundKind::MethodReturn {
                reply_serial: to.serial(),
            },
            interface: None,
            destination: to.sender(),
            flags: Flags::EMPTY,
        };

        self.shared.send_message(&outbound, body, None)?;
        Ok(())
    }

    /// Reply to an inbound method call with an error.
    pub fn send_error(&self, to: &OwnedMessage, error_name: &str, body: BodyBuf) -> Result<()> {
        if to.flags() & Flags::NO_REPLY_EXPECTED {
            return Ok(());
        }

        let outbound = Outbound {
            kind: crate::message::OutboundKind::Error {
                error_name,
                reply_serial: to.serial(),
            },
            interface: None,
            destination: to.sender(),
            flags: Flags::EMPTY,
        };

        self.shared.send_message(&outbound, body, None)?;
        Ok(())
    }

    /// Subscribe an observer for the given match rule.
    ///
    /// Observers on the same rule string share one match entry and at most
    /// one server-side subscription: the first subscriber issues `AddMatch`
    /// and awaits its acknowledgement, later subscribers attach to the
    /// existing subscription immediately. When the peer is not a message
    /// bus no server-side rule is installed.
    pub async fn add_match(&self, rule: MatchRule) -> Result<Observer> {
        let (observer, subscribe) = self.attach_observer(rule, true)?;

        if let Some(rule_string) = subscribe {
            let (ack_tx, ack_rx) = oneshot::channel();

            let mut body = BodyBuf::new();
            body.write(&*rule_string);

            let call = Call::with_path(bus::PATH, bus::ADD_MATCH)
                .with_interface(bus::INTERFACE)
                .with_destination(bus::DESTINATION);

            self.shared.send_message(
                &Outbound::from(&call),
                body,
                Some(ReplyHandler::AddMatch {
                    rule: rule_string,
                    ack: ack_tx,
                }),
            )?;

            match ack_rx.await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => return Err(error),
                Err(..) => {
                    let reason = self.shared.state.lock().unwrap().reason.clone();
                    return Err(Error::disconnected(reason));
                }
            }
        }

        Ok(observer)
    }

    /// Attach a local observer without a server-side subscription.
    ///
    /// The observer sees messages which already reach this connection and
    /// match the rule; no `AddMatch` is issued on its behalf.
    pub fn observe(&self, rule: MatchRule) -> Result<Observer> {
        let (observer, _) = self.attach_observer(rule, false)?;
        Ok(observer)
    }

    fn attach_observer(
        &self,
        rule: MatchRule,
        subscribes: bool,
    ) -> Result<(Observer, Option<Box<str>>)> {
        let rule_string: Box<str> = rule.to_rule_string().into();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut state = self.shared.state.lock().unwrap();

        if state.phase == Phase::Disconnected {
            return Err(Error::disconnected(state.reason.clone()));
        }

        let id = state.next_observer;
        state.next_observer += 1;

        let is_bus = state.name.is_some();

        let entry = state
            .matches
            .entry(rule_string.clone())
            .or_insert_with(|| MatchEntry::new(rule));

        entry.observers.push(ObserverSlot { id, tx, subscribes });

        let subscribe = if subscribes
            && is_bus
            && entry.subscription == Subscription::Unsubscribed
        {
            entry.subscription = Subscription::Pending;
            Some(rule_string.clone())
        } else {
            None
        };

        drop(state);

        let observer = Observer::new(Arc::downgrade(&self.shared), rule_string, id, rx);
        Ok((observer, subscribe))
    }

    /// Dispose the connection.
    ///
    /// Every pending call completes with a disconnect error and both
    /// transport tasks stop. Subsequent operations fail with the same
    /// error; a new connection must be constructed to continue.
    pub fn disconnect(&self) {
        self.shared.close(None);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shared.close(None);

        for task in &self.tasks {
            task.abort();
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock().unwrap();

        f.debug_struct("Connection")
            .field("phase", &state.phase)
            .field("name", &state.name)
            .field("unix_fd", &self.shared.unix_fd)
            .finish()
    }
}
