//! File descriptor passing over Unix domain sockets.
//!
//! D-Bus transfers file descriptors out-of-band as `SCM_RIGHTS` control
//! messages; the message body carries 32-bit indexes into the ordered fd
//! list that accompanied the frame.

use std::fmt;
use std::io;
use std::mem;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};
use std::sync::{Arc, Mutex};

/// The maximum number of file descriptors accepted in a single control
/// message. Matches the kernel's `SCM_MAX_FD`.
const MAX_FDS: usize = 253;

/// The ordered collection of file descriptors which accompanied a message.
///
/// The collection is shared between every handler the message is dispatched
/// to. A handler that needs a descriptor past the dispatch takes ownership
/// of it with [`Fds::take`]; descriptors which are never taken are closed
/// when the last reference to the message is released.
#[derive(Clone, Default)]
pub struct Fds {
    inner: Arc<Mutex<Vec<Option<OwnedFd>>>>,
}

impl Fds {
    /// An empty collection.
    pub(crate) fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn from_vec(fds: Vec<OwnedFd>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(fds.into_iter().map(Some).collect())),
        }
    }

    /// The number of slots in the collection, taken or not.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    /// Test if the collection has no slots.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take ownership of the descriptor at `index`.
    ///
    /// The slot is emptied; the descriptor will not be closed when the
    /// message is released. Returns `None` if the index is out of range or
    /// the descriptor was already taken.
    pub fn take(&self, index: u32) -> Option<OwnedFd> {
        self.inner.lock().unwrap().get_mut(index as usize)?.take()
    }

    /// Get the raw descriptor at `index` without taking ownership.
    ///
    /// The descriptor remains valid until the message is released.
    pub fn get_raw(&self, index: u32) -> Option<RawFd> {
        use std::os::fd::AsRawFd;
        self.inner
            .lock()
            .unwrap()
            .get(index as usize)?
            .as_ref()
            .map(|fd| fd.as_raw_fd())
    }
}

impl fmt::Debug for Fds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fds").field("len", &self.len()).finish()
    }
}

/// An 8-aligned buffer for control message headers.
#[repr(C, align(8))]
struct CmsgBuf([u8; cmsg_capacity()]);

const fn cmsg_capacity() -> usize {
    // CMSG_SPACE is not a const fn; one header plus the fd payload rounded
    // up generously.
    mem::size_of::<libc::cmsghdr>() + MAX_FDS * mem::size_of::<RawFd>() + 16
}

/// Receive bytes from `socket` into `buf`, collecting any `SCM_RIGHTS`
/// descriptors into `fds`.
///
/// Returns the number of bytes read; zero means end of stream.
pub(crate) fn recv_with_fds(
    socket: RawFd,
    buf: &mut [u8],
    fds: &mut Vec<OwnedFd>,
) -> io::Result<usize> {
    let mut cmsg = CmsgBuf([0; cmsg_capacity()]);

    let mut iov = libc::iovec {
        iov_base: buf.as_mut_ptr().cast(),
        iov_len: buf.len(),
    };

    // SAFETY: msghdr is a plain C struct for which zeroes are valid.
    let mut msg: libc::msghdr = unsafe { mem::zeroed() };
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = cmsg.0.as_mut_ptr().cast();
    msg.msg_controllen = cmsg.0.len() as _;

    // SAFETY: The iovec and control buffer outlive the call.
    let n = unsafe { libc::recvmsg(socket, &mut msg, libc::MSG_CMSG_CLOEXEC) };

    if n < 0 {
        return Err(io::Error::last_os_error());
    }

    if msg.msg_flags & libc::MSG_CTRUNC != 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "control message truncated",
        ));
    }

    // SAFETY: The control buffer was populated by recvmsg above and is
    // walked with the C macros intended for it.
    unsafe {
        let mut header = libc::CMSG_FIRSTHDR(&msg);

        while !header.is_null() {
            let h = &*header;

            if h.cmsg_level == libc::SOL_SOCKET && h.cmsg_type == libc::SCM_RIGHTS {
                let data = libc::CMSG_DATA(header);
                let len = h.cmsg_len as usize - libc::CMSG_LEN(0) as usize;
                let count = len / mem::size_of::<RawFd>();

                for i in 0..count {
                    let mut fd: RawFd = 0;
                    std::ptr::copy_nonoverlapping(
                        data.add(i * mem::size_of::<RawFd>()),
                        &mut fd as *mut RawFd as *mut _,
                        mem::size_of::<RawFd>(),
                    );
                    fds.push(OwnedFd::from_raw_fd(fd));
                }
            }

            header = libc::CMSG_NXTHDR(&msg, header);
        }
    }

    Ok(n as usize)
}

/// Send `bytes` over `socket`, attaching `fds` as a single `SCM_RIGHTS`
/// control message.
///
/// Returns the number of bytes written. The descriptors ride along with the
/// first byte accepted by the kernel, so the caller must only attach them to
/// the first chunk of a frame.
pub(crate) fn send_with_fds(socket: RawFd, bytes: &[u8], fds: &[RawFd]) -> io::Result<usize> {
    if fds.is_empty() {
        // SAFETY: Plain send over a borrowed socket.
        let n = unsafe {
            libc::send(
                socket,
                bytes.as_ptr().cast(),
                bytes.len(),
                libc::MSG_NOSIGNAL,
            )
        };

        if n < 0 {
            return Err(io::Error::last_os_error());
        }

        return Ok(n as usize);
    }

    if fds.len() > MAX_FDS {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "too many file descriptors for one message",
        ));
    }

    let mut cmsg = CmsgBuf([0; cmsg_capacity()]);
    let payload = std::mem::size_of_val(fds);

    let mut iov = libc::iovec {
        iov_base: bytes.as_ptr() as *mut _,
        iov_len: bytes.len(),
    };

    // SAFETY: msghdr is a plain C struct for which zeroes are valid.
    let mut msg: libc::msghdr = unsafe { mem::zeroed() };
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = cmsg.0.as_mut_ptr().cast();

    // SAFETY: The control buffer is sized for MAX_FDS descriptors.
    let n = unsafe {
        msg.msg_controllen = libc::CMSG_SPACE(payload as u32) as _;

        let header = libc::CMSG_FIRSTHDR(&msg);
        (*header).cmsg_level = libc::SOL_SOCKET;
        (*header).cmsg_type = libc::SCM_RIGHTS;
        (*header).cmsg_len = libc::CMSG_LEN(payload as u32) as _;

        std::ptr::copy_nonoverlapping(
            fds.as_ptr().cast::<u8>(),
            libc::CMSG_DATA(header),
            payload,
        );

        libc::sendmsg(socket, &msg, libc::MSG_NOSIGNAL)
    };

    if n < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(n as usize)
}

/// Duplicate a descriptor with `FD_CLOEXEC` set, for attaching to an
/// outbound message without taking the caller's copy.
pub(crate) fn dup_cloexec(fd: RawFd) -> io::Result<OwnedFd> {
    // SAFETY: F_DUPFD_CLOEXEC produces a fresh descriptor we then own.
    let duped = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, 0) };

    if duped < 0 {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: `duped` was just created and is not shared.
    Ok(unsafe { OwnedFd::from_raw_fd(duped) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read as _, Seek, Write as _};
    use std::os::fd::AsRawFd;
    use std::os::unix::net::UnixStream;

    #[test]
    fn roundtrip_fds_over_socketpair() {
        let (a, b) = UnixStream::pair().unwrap();

        let mut file = tempfile();
        file.write_all(b"hello").unwrap();
        file.flush().unwrap();

        let n = send_with_fds(a.as_raw_fd(), b"x", &[file.as_raw_fd()]).unwrap();
        assert_eq!(n, 1);

        let mut buf = [0u8; 16];
        let mut fds = Vec::new();
        let n = recv_with_fds(b.as_raw_fd(), &mut buf, &mut fds).unwrap();
        assert_eq!(n, 1);
        assert_eq!(&buf[..1], b"x");
        assert_eq!(fds.len(), 1);

        let mut received = std::fs::File::from(fds.remove(0));
        received.seek(std::io::SeekFrom::Start(0)).unwrap();
        let mut out = String::new();
        received.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello");
    }

    #[test]
    fn take_empties_the_slot() {
        let file = tempfile();
        let fds = Fds::from_vec(vec![file.into()]);

        assert_eq!(fds.len(), 1);
        assert!(fds.get_raw(0).is_some());

        let taken = fds.take(0).unwrap();
        assert!(fds.take(0).is_none());
        assert!(fds.get_raw(0).is_none());
        assert_eq!(fds.len(), 1);

        drop(taken);
    }

    #[test]
    fn dup_outlives_original() {
        let file = tempfile();
        let duped = dup_cloexec(file.as_raw_fd()).unwrap();
        drop(file);

        // The duplicate must still be valid.
        let flags = unsafe { libc::fcntl(duped.as_raw_fd(), libc::F_GETFD) };
        assert_ne!(flags, -1);
    }

    fn tempfile() -> std::fs::File {
        tempfile_in(std::env::temp_dir())
    }

    fn tempfile_in(dir: std::path::PathBuf) -> std::fs::File {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static COUNTER: AtomicUsize = AtomicUsize::new(0);

        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = dir.join(format!("wirebus-fd-test-{}-{n}", std::process::id()));

        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .unwrap();

        std::fs::remove_file(&path).unwrap();
        file
    }
}
