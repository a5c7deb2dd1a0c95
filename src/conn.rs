//! The per-socket connection state machine.
//!
//! A connection is born busy (registered by the dispatcher right after the
//! dial), serves exactly one exchange at a time, and on completion either
//! parks itself in the registry for reuse or closes. While an exchange is
//! in flight the drive task owns the transport; the registry entry keeps
//! only metadata, so the sweeper closes a stalled connection by sending a
//! doom signal rather than by reaching into the socket.

use std::{io, net::SocketAddr, rc::Rc};

use bytes::{Bytes, BytesMut};
use futures_channel::oneshot;
use futures_util::future::{self, Either};
use tracing::trace;

use crate::{
    client::ClientShared,
    error::{Error, ProtocolError, Result},
    net::Transport,
    pool::{
        arena::{Link, Linked, LINKS},
        ConnId,
    },
    proto::{self, headers, BodyDecoder},
    response::Response,
};

const READ_CHUNK: usize = 16 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum State {
    Busy,
    Idle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum IoPhase {
    Writing,
    Reading,
}

/// Why a connection left the registry. Drives counters, doom errors and
/// log lines; the distinction is invisible to request futures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CloseReason {
    /// Idle past the keep-alive deadline.
    IdleExpired,
    /// Busy past the active read/write deadline.
    ActiveTimeout,
    /// The peer closed (or poisoned) a parked socket.
    PeerClosedIdle,
    /// `stop()` drained it from the idle list.
    ShutdownDrain,
    /// Response finished but the connection was not eligible for reuse.
    Finished,
    /// The exchange failed.
    Failed,
}

/// Registry entry for one live socket.
pub(crate) struct Connection {
    pub(crate) peer: SocketAddr,
    /// `Some` while parked idle; `None` while the drive task holds it.
    pub(crate) transport: Option<Transport>,
    pub(crate) state: State,
    /// Monotonic ms of the last pool transition or I/O progress.
    pub(crate) last_activity: u64,
    /// Requests already served on this socket.
    pub(crate) keep_alive_count: u32,
    pub(crate) phase: IoPhase,
    /// Sweeper-to-drive channel, armed while busy.
    pub(crate) doom: Option<oneshot::Sender<Error>>,
    /// Cancels the idle watcher, armed while idle.
    pub(crate) watch: Option<oneshot::Sender<()>>,
    links: [Link; LINKS],
}

impl Connection {
    pub(crate) fn new(peer: SocketAddr, now: u64) -> Self {
        Connection {
            peer,
            transport: None,
            state: State::Busy,
            last_activity: now,
            keep_alive_count: 0,
            phase: IoPhase::Writing,
            doom: None,
            watch: None,
            links: Default::default(),
        }
    }
}

impl Linked for Connection {
    fn link(&self, kind: usize) -> &Link {
        &self.links[kind]
    }

    fn link_mut(&mut self, kind: usize) -> &mut Link {
        &mut self.links[kind]
    }
}

/// Run one request/response exchange and settle the user future.
///
/// The task outlives the user-facing `ResponseFuture`: cancelling that
/// future merely drops the receiving end, and the exchange still completes
/// so the connection can be recycled.
pub(crate) async fn drive(
    shared: Rc<ClientShared>,
    id: ConnId,
    peer: SocketAddr,
    mut transport: Transport,
    wire: Bytes,
    request_was_head: bool,
    request_allows_reuse: bool,
    doom: oneshot::Receiver<Error>,
    tx: oneshot::Sender<Result<Response>>,
) {
    let result = tokio::select! {
        biased;
        doomed = doom => {
            // The sweeper already evicted us; the registry entry is gone.
            Err(doomed.unwrap_or(Error::ShuttingDown))
        }
        result = exchange(&shared, id, peer, &mut transport, &wire, request_was_head) => result,
    };

    match result {
        Ok((response, reusable)) => {
            shared.inspector().on_response(peer, &response);
            shared.finish_exchange(id, transport, reusable && request_allows_reuse);
            let _ = tx.send(Ok(response));
        }
        Err(err) => {
            trace!("exchange with {peer} failed: {err}");
            shared.close_conn(id, CloseReason::Failed);
            shared.inspector().on_error(peer, false, &err);
            let _ = tx.send(Err(err));
            // Dropping the checked-out transport releases the socket.
        }
    }
}

/// Write the request, then read and drain the response.
async fn exchange(
    shared: &Rc<ClientShared>,
    id: ConnId,
    peer: SocketAddr,
    transport: &mut Transport,
    wire: &[u8],
    request_was_head: bool,
) -> Result<(Response, bool)> {
    let io_err = |source: io::Error| Error::Io { peer, source };

    shared.touch(id, IoPhase::Writing);
    transport.write_all(wire).await.map_err(io_err)?;
    shared.touch(id, IoPhase::Reading);

    // Response head.
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    let head = loop {
        if let Some(head) = proto::parse_head(&mut buf)? {
            break head;
        }
        if transport.read_buf(&mut buf).await.map_err(io_err)? == 0 {
            return Err(ProtocolError::IncompleteResponse.into());
        }
        shared.touch(id, IoPhase::Reading);
    };

    // Body, per the framing the head announced.
    let mut decoder = BodyDecoder::from_head(request_was_head, &head)?;
    let max_body = shared.max_body_size();
    let mut body = BytesMut::new();
    loop {
        if decoder.decode(&mut buf, &mut body, max_body)? {
            break;
        }
        if transport.read_buf(&mut buf).await.map_err(io_err)? == 0 {
            decoder.on_eof()?;
            break;
        }
        shared.touch(id, IoPhase::Reading);
    }

    let reusable =
        decoder.allows_reuse() && headers::response_keep_alive(head.version, &head.headers);
    let response = Response::new(head, body.freeze(), peer);
    Ok((response, reusable))
}

/// Watch a parked connection for peer activity.
///
/// A read event on an idle socket is either EOF or unsolicited data; both
/// retire the connection. No request future is pending, so the error goes
/// to inspectors only, flagged `was_idle`.
pub(crate) fn spawn_idle_watch(
    shared: Rc<ClientShared>,
    id: ConnId,
    peer: SocketAddr,
    cancel: oneshot::Receiver<()>,
) {
    tokio::task::spawn_local(async move {
        let event = std::future::poll_fn(|cx| shared.poll_idle_event(id, cx));
        match future::select(cancel, event).await {
            // Leased again or closed by someone else.
            Either::Left(..) => {}
            Either::Right((gone, _)) => {
                if gone {
                    return;
                }
                if shared.close_conn(id, CloseReason::PeerClosedIdle) {
                    let err = Error::Io {
                        peer,
                        source: io::Error::new(
                            io::ErrorKind::ConnectionReset,
                            "peer closed idle connection",
                        ),
                    };
                    shared.inspector().on_error(peer, true, &err);
                }
            }
        }
    });
}
