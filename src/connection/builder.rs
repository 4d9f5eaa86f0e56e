use std::env;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::buf::RecvBuf;
use crate::error::ErrorKind;
use crate::org_freedesktop_dbus as bus;
use crate::{Address, Addresses, BodyBuf, Call, Connection, Error, Result};

use super::connection::{receiver_task_entry, sender_task_entry, Phase, Shared};
use super::transport::{authenticate, Stream};

const ENV_SESSION_BUS: &str = "DBUS_SESSION_BUS_ADDRESS";
const ENV_SYSTEM_BUS: &str = "DBUS_SYSTEM_BUS_ADDRESS";
const DEFAULT_SYSTEM_BUS: &str = "unix:path=/var/run/dbus/system_bus_socket";

#[derive(Debug, Clone, Copy)]
enum Target {
    SessionBus,
    SystemBus,
    Address,
}

/// Builder for a [`Connection`].
///
/// Address discovery through the environment happens here; the connect
/// machinery itself only ever sees an address string. The entries of the
/// address are tried in order and the first that connects and
/// authenticates wins.
///
/// # Examples
///
/// ```no_run
/// use wirebus::ConnectionBuilder;
///
/// # #[tokio::main(flavor = "current_thread")] async fn main() -> wirebus::Result<()> {
/// let connection = ConnectionBuilder::new()
///     .address("unix:path=/run/user/1000/bus")
///     .connect()
///     .await?;
/// # Ok(()) }
/// ```
pub struct ConnectionBuilder {
    target: Target,
    address: Option<String>,
    bus: bool,
    negotiate_unix_fd: bool,
    cancel: Option<CancellationToken>,
}

impl ConnectionBuilder {
    /// Construct a new builder targeting the session bus.
    pub fn new() -> Self {
        Self {
            target: Target::SessionBus,
            address: None,
            bus: true,
            negotiate_unix_fd: true,
            cancel: None,
        }
    }

    /// Target the session bus named by `DBUS_SESSION_BUS_ADDRESS`.
    pub fn session_bus(mut self) -> Self {
        self.target = Target::SessionBus;
        self
    }

    /// Target the system bus named by `DBUS_SYSTEM_BUS_ADDRESS`, with the
    /// well-known socket path as fallback.
    pub fn system_bus(mut self) -> Self {
        self.target = Target::SystemBus;
        self
    }

    /// Target an explicit address string.
    pub fn address(mut self, address: &str) -> Self {
        self.target = Target::Address;
        self.address = Some(address.into());
        self
    }

    /// Treat the peer as a plain peer rather than a message bus.
    ///
    /// No `Hello` is sent after authentication, no unique name is recorded,
    /// and match rules stay local to this process.
    pub fn peer(mut self) -> Self {
        self.bus = false;
        self
    }

    /// Disable the Unix fd passing negotiation.
    pub fn without_unix_fd(mut self) -> Self {
        self.negotiate_unix_fd = false;
        self
    }

    /// Abort the connect phase when the given token is cancelled.
    ///
    /// A cancelled connect fails with a cancellation error and releases
    /// every resource it acquired.
    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Connect, authenticate and, when the peer is a bus, say `Hello`.
    pub async fn connect(self) -> Result<Connection> {
        let cancel = self.cancel.clone();

        match cancel {
            Some(cancel) => {
                tokio::select! {
                    _ = cancel.cancelled() => Err(Error::new(ErrorKind::Canceled)),
                    result = self.connect_inner() => result,
                }
            }
            None => self.connect_inner().await,
        }
    }

    async fn connect_inner(self) -> Result<Connection> {
        let address = match self.target {
            Target::Address => self.address.clone().expect("address set with target"),
            Target::SessionBus => match env::var(ENV_SESSION_BUS) {
                Ok(address) => address,
                Err(..) => return Err(Error::new(ErrorKind::MissingBus)),
            },
            Target::SystemBus => {
                env::var(ENV_SYSTEM_BUS).unwrap_or_else(|_| DEFAULT_SYSTEM_BUS.into())
            }
        };

        let mut last_error = None;

        for entry in Addresses::new(&address) {
            let entry = entry?;

            match self.connect_entry(&entry).await {
                Ok(connection) => return Ok(connection),
                Err(error) => {
                    debug!(?entry, ?error, "address entry failed");
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::from(crate::AddressError::Empty)))
    }

    async fn connect_entry(&self, address: &Address) -> Result<Connection> {
        let stream = Stream::connect(address).await?;
        let handshake = authenticate(&stream, address, self.negotiate_unix_fd).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::new(tx, handshake.unix_fd, handshake.guid));

        {
            let mut state = shared.state.lock().unwrap();
            debug_assert_eq!(state.phase, Phase::Created);
            state.phase = Phase::Connecting;
        }

        let mut recv = RecvBuf::new();

        // Bytes the handshake over-read already belong to the frame stream.
        let mut leftover = &handshake.leftover[..];

        while !leftover.is_empty() {
            let n = recv.fill_from(|chunk, _| {
                let n = chunk.len().min(leftover.len());
                chunk[..n].copy_from_slice(&leftover[..n]);
                Ok(n)
            })?;

            leftover = &leftover[n..];
        }

        let stream = Arc::new(stream);

        let tasks = vec![
            tokio::spawn(receiver_task_entry(shared.clone(), stream.clone(), recv)),
            tokio::spawn(sender_task_entry(shared.clone(), stream, rx)),
        ];

        let connection = Connection::from_parts(shared, tasks);

        if self.bus {
            let hello = Call::with_path(bus::PATH, bus::HELLO)
                .with_interface(bus::INTERFACE)
                .with_destination(bus::DESTINATION);

            let reply = connection.call(hello, BodyBuf::new()).await?;
            let name: Box<str> = reply.body().read::<str>()?.into();
            debug!(name = &*name, "bus assigned unique name");

            connection.shared().state.lock().unwrap().name = Some(name);
        }

        connection.shared().state.lock().unwrap().phase = Phase::Connected;
        Ok(connection)
    }
}

impl Default for ConnectionBuilder {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}
