use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;

use tokio::io::Interest;
use tokio::net::{TcpStream, UnixStream};
use tracing::{debug, trace};

use crate::address::Transport;
use crate::error::ErrorKind;
use crate::fd::{recv_with_fds, send_with_fds};
use crate::sasl::{self, Auth, SaslRequest, SaslResponse};
use crate::{Address, Error, Result};

/// A connected stream socket, either Unix or TCP.
///
/// Both tasks of a transport share the stream; readiness is polled per
/// interest and the actual I/O is performed with non-blocking calls so that
/// ancillary fd data can be received and sent on Unix sockets.
pub(crate) enum Stream {
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl Stream {
    /// Connect a stream socket for one address entry.
    pub(crate) async fn connect(address: &Address) -> Result<Self> {
        match address.transport() {
            Transport::Unix { path } => {
                if path.first() == Some(&0) {
                    let stream = connect_abstract(path)?;
                    stream.set_nonblocking(true)?;
                    Ok(Stream::Unix(UnixStream::from_std(stream)?))
                } else {
                    let path = std::ffi::OsStr::from_bytes(path);
                    Ok(Stream::Unix(UnixStream::connect(path).await?))
                }
            }
            Transport::Tcp { host, port } => {
                Ok(Stream::Tcp(TcpStream::connect((host.as_str(), *port)).await?))
            }
        }
    }

    /// Test if the stream supports fd passing at all.
    pub(crate) fn is_unix(&self) -> bool {
        matches!(self, Stream::Unix(..))
    }

    pub(crate) async fn readable(&self) -> io::Result<()> {
        match self {
            Stream::Unix(stream) => stream.readable().await,
            Stream::Tcp(stream) => stream.readable().await,
        }
    }

    pub(crate) async fn writable(&self) -> io::Result<()> {
        match self {
            Stream::Unix(stream) => stream.writable().await,
            Stream::Tcp(stream) => stream.writable().await,
        }
    }

    /// Attempt a non-blocking read, collecting ancillary descriptors on
    /// Unix sockets.
    pub(crate) fn try_recv(&self, buf: &mut [u8], fds: &mut Vec<OwnedFd>) -> io::Result<usize> {
        match self {
            Stream::Unix(stream) => stream.try_io(Interest::READABLE, || {
                recv_with_fds(stream.as_raw_fd(), buf, fds)
            }),
            Stream::Tcp(stream) => stream.try_read(buf),
        }
    }

    /// Attempt a non-blocking write, attaching `fds` as ancillary data.
    ///
    /// Descriptors may only be attached on Unix sockets, and only ride with
    /// the first chunk of a frame.
    pub(crate) fn try_send(&self, bytes: &[u8], fds: &[RawFd]) -> io::Result<usize> {
        match self {
            Stream::Unix(stream) => stream.try_io(Interest::WRITABLE, || {
                send_with_fds(stream.as_raw_fd(), bytes, fds)
            }),
            Stream::Tcp(stream) => stream.try_write(bytes),
        }
    }

    /// Write the whole of `bytes`, waiting for writability as needed.
    pub(crate) async fn send_all(&self, bytes: &[u8]) -> Result<()> {
        let mut written = 0;

        while written < bytes.len() {
            self.writable().await?;

            match self.try_send(&bytes[written..], &[]) {
                Ok(n) => written += n,
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => continue,
                Err(error) => return Err(error.into()),
            }
        }

        Ok(())
    }
}

/// Connect a socket in the Linux abstract namespace; `path` carries the
/// leading NUL byte.
fn connect_abstract(path: &[u8]) -> Result<std::os::unix::net::UnixStream> {
    // SAFETY: A plain socket/connect sequence; the descriptor is wrapped
    // immediately and the address struct is stack-local.
    unsafe {
        let fd = libc::socket(
            libc::AF_UNIX,
            libc::SOCK_STREAM | libc::SOCK_CLOEXEC,
            0,
        );

        if fd < 0 {
            return Err(io::Error::last_os_error().into());
        }

        let fd = OwnedFd::from_raw_fd(fd);

        let mut addr: libc::sockaddr_un = mem::zeroed();
        addr.sun_family = libc::AF_UNIX as libc::sa_family_t;

        if path.len() > addr.sun_path.len() {
            return Err(Error::new(ErrorKind::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "abstract socket name too long",
            ))));
        }

        for (i, &b) in path.iter().enumerate() {
            addr.sun_path[i] = b as libc::c_char;
        }

        let len = mem::size_of::<libc::sa_family_t>() + path.len();

        if libc::connect(
            fd.as_raw_fd(),
            &addr as *const libc::sockaddr_un as *const libc::sockaddr,
            len as libc::socklen_t,
        ) < 0
        {
            return Err(io::Error::last_os_error().into());
        }

        Ok(std::os::unix::net::UnixStream::from(fd))
    }
}

/// The outcome of a successful SASL handshake.
pub(crate) struct Handshake {
    /// The GUID the server reported on `OK`.
    pub(crate) guid: Box<[u8]>,
    /// Whether the server agreed to Unix fd passing.
    pub(crate) unix_fd: bool,
    /// Bytes received past the handshake, to be fed to the frame pipe.
    pub(crate) leftover: Vec<u8>,
}

/// Drive the client side of the SASL handshake over a fresh stream.
///
/// Sends the NUL credentials byte, authenticates with `EXTERNAL` falling
/// back to `ANONYMOUS`, negotiates fd passing on Unix sockets, and finishes
/// with `BEGIN`. Any response the client cannot interpret is answered with
/// `ERROR` before failing.
pub(crate) async fn authenticate(
    stream: &Stream,
    address: &Address,
    negotiate_unix_fd: bool,
) -> Result<Handshake> {
    let mut lines = LineReader::new();
    let mut out = Vec::new();

    // Out-of-band credentials signal on Unix; a no-op byte on TCP.
    out.push(0);

    let mut idbuf = [0u8; 32];

    let mut auth = if stream.is_unix() {
        Auth::external_from_uid(&mut idbuf)
    } else {
        Auth::Anonymous
    };

    let guid = loop {
        sasl::write_request(&mut out, &SaslRequest::Auth(auth));
        trace!(?auth, "sending AUTH");
        stream.send_all(&out).await?;
        out.clear();

        match sasl::parse_response(lines.next_line(stream).await?) {
            SaslResponse::Ok(guid) => break guid.as_bytes().to_vec(),
            SaslResponse::Rejected => {
                debug!(?auth, "authentication rejected");

                if matches!(auth, Auth::Anonymous) {
                    return Err(Error::new(ErrorKind::AuthRejected));
                }

                auth = Auth::Anonymous;
            }
            _ => {
                sasl::write_request(&mut out, &SaslRequest::Error);
                stream.send_all(&out).await?;
                return Err(Error::new(ErrorKind::AuthUnexpected));
            }
        }
    };

    if let Some(expected) = address.guid() {
        if !expected.as_bytes().eq_ignore_ascii_case(&guid) {
            return Err(Error::new(ErrorKind::GuidMismatch));
        }
    }

    let mut unix_fd = false;

    if negotiate_unix_fd && stream.is_unix() {
        sasl::write_request(&mut out, &SaslRequest::NegotiateUnixFd);
        stream.send_all(&out).await?;
        out.clear();

        // Anything but AGREE_UNIX_FD leaves fd passing disabled.
        unix_fd = matches!(
            sasl::parse_response(lines.next_line(stream).await?),
            SaslResponse::AgreeUnixFd
        );

        debug!(unix_fd, "negotiated fd passing");
    }

    sasl::write_request(&mut out, &SaslRequest::Begin);
    stream.send_all(&out).await?;

    Ok(Handshake {
        guid: guid.into(),
        unix_fd,
        leftover: lines.into_leftover(),
    })
}

/// Accumulates handshake bytes and hands out CR-LF terminated lines.
struct LineReader {
    buf: Vec<u8>,
    consumed: usize,
}

impl LineReader {
    fn new() -> Self {
        Self {
            buf: Vec::new(),
            consumed: 0,
        }
    }

    async fn next_line(&mut self, stream: &Stream) -> Result<&[u8]> {
        loop {
            // Drop the previously returned line.
            self.buf.drain(..self.consumed);
            self.consumed = 0;

            if let Some((line, consumed)) = sasl::take_line(&self.buf)? {
                let len = line.len();
                self.consumed = consumed;
                return Ok(&self.buf[..len]);
            }

            stream.readable().await?;

            let old = self.buf.len();
            self.buf.resize(old + 256, 0);

            let mut no_fds = Vec::new();

            match stream.try_recv(&mut self.buf[old..], &mut no_fds) {
                Ok(0) => {
                    self.buf.truncate(old);
                    return Err(Error::new(ErrorKind::Io(io::Error::from(
                        io::ErrorKind::UnexpectedEof,
                    ))));
                }
                Ok(n) => {
                    self.buf.truncate(old + n);
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                    self.buf.truncate(old);
                }
                Err(error) => {
                    self.buf.truncate(old);
                    return Err(error.into());
                }
            }
        }
    }

    fn into_leftover(mut self) -> Vec<u8> {
        self.buf.drain(..self.consumed);
        self.buf
    }
}
