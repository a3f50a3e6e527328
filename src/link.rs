//! Link handle: connection lifecycle plus stop-and-wait data transfer.
//!
//! A [`Link`] owns the byte channel and all per-link protocol state (send
//! and receive sequence bits, statistics).  Nothing is process-wide, so
//! any number of links can run side by side.
//!
//! # Usage
//!
//! ```ignore
//! let mut link = Link::connect(port, Role::Initiator, LinkConfig::default()).await?;
//! link.send(b"hello").await?;
//! link.disconnect().await?;
//! ```
//!
//! ```ignore
//! let mut link = Link::connect(port, Role::Responder, LinkConfig::default()).await?;
//! let mut buf = [0u8; 256];
//! loop {
//!     match link.receive(&mut buf).await {
//!         Ok(n) => handle(&buf[..n]),
//!         Err(LinkError::PeerDisconnected) => break,
//!         Err(e) => return Err(e),
//!     }
//! }
//! link.disconnect().await?;
//! ```
//!
//! Every wait is bounded by the deadline of the operation's own
//! [`RetryTimer`]; the deadline is checked before each byte and enforced by
//! the read itself, so there is exactly one place that decides "timed out".

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::Instant;

use crate::channel::Channel;
use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::frame::{control, max_body_len, supervision_frame, Seq};
use crate::parser::{Event, FrameParser};
use crate::receiver::{Receiver, Verdict};
use crate::sender::{AckOutcome, Sender};
use crate::state::{Expected, LinkState, Role};
use crate::timer::RetryTimer;

/// Counters for one link.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinkStats {
    /// Every frame written, supervision and information alike.
    pub frames_sent: u64,
    /// SET, DISC or information frames sent again after a timeout or REJ.
    pub retransmissions: u64,
    pub timeouts: u64,
    pub rr_sent: u64,
    pub rej_sent: u64,
    pub rej_received: u64,
    /// Retransmitted information frames that were re-acked, not delivered.
    pub duplicates: u64,
    /// Payloads handed to the caller.
    pub delivered: u64,
}

/// One end of a point-to-point stop-and-wait link.
#[derive(Debug)]
pub struct Link<T> {
    role: Role,
    state: LinkState,
    config: LinkConfig,
    channel: Channel<T>,
    sender: Sender,
    receiver: Receiver,
    stats: LinkStats,
    /// Set when `receive` consumed the peer's DISC.
    peer_disc_seen: bool,
}

impl<T: AsyncRead + AsyncWrite + Unpin> Link<T> {
    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Establish the link over `io`.
    ///
    /// The initiator sends SET until a UA arrives or the retry budget runs
    /// out ([`LinkError::LinkEstablishFailed`]).  The responder waits, with no
    /// deadline, for a SET and answers UA.
    pub async fn connect(io: T, role: Role, config: LinkConfig) -> Result<Self, LinkError> {
        let mut link = Self {
            role,
            state: LinkState::Idle,
            config,
            channel: Channel::new(io),
            sender: Sender::new(),
            receiver: Receiver::new(),
            stats: LinkStats::default(),
            peer_disc_seen: false,
        };
        match role {
            Role::Initiator => link.open_active().await?,
            Role::Responder => link.open_passive().await?,
        }
        Ok(link)
    }

    async fn open_active(&mut self) -> Result<(), LinkError> {
        self.state = LinkState::AwaitingPeerFrame(Expected::Ua);
        let mut parser = self.parser(&[control::UA]);
        let mut timer = RetryTimer::new(self.config.retry);

        'attempts: while timer.try_arm() {
            self.send_command(control::SET, timer.attempts()).await?;
            loop {
                match self.next_event(&mut parser, timer.deadline()).await? {
                    Some(Event::Supervision { control: control::UA }) => {
                        timer.cancel();
                        self.state = LinkState::Established;
                        log::debug!("[link] ← UA; established");
                        return Ok(());
                    }
                    Some(other) => log::trace!("[link] ignoring {other:?}"),
                    None => {
                        self.on_timeout("UA", timer.attempts());
                        continue 'attempts;
                    }
                }
            }
        }

        self.state = LinkState::Closed;
        log::warn!("[link] no UA after {} SET(s)", timer.attempts());
        Err(LinkError::LinkEstablishFailed {
            attempts: timer.attempts(),
        })
    }

    async fn open_passive(&mut self) -> Result<(), LinkError> {
        self.state = LinkState::AwaitingPeerFrame(Expected::Set);
        let mut parser = self.parser(&[control::SET]);
        loop {
            if let Some(Event::Supervision { control: control::SET }) =
                self.next_event(&mut parser, None).await?
            {
                break;
            }
        }
        log::debug!("[link] ← SET");
        self.send_supervision(control::UA).await?;
        self.state = LinkState::Established;
        Ok(())
    }

    /// Tear the link down with DISC/DISC/UA.
    ///
    /// Also the only way out of [`LinkState::Failed`].
    /// The link is [`LinkState::Closed`] afterwards even when this returns
    /// [`LinkError::LinkCloseFailed`]; the caller only decides whether to log it.
    pub async fn disconnect(&mut self) -> Result<(), LinkError> {
        match self.state {
            LinkState::Closed => return Ok(()),
            LinkState::Established | LinkState::Failed => {}
            other => return Err(LinkError::BadState(other)),
        }

        let result = match self.role {
            Role::Initiator => self.close_active().await,
            Role::Responder => self.close_passive().await,
        };
        self.state = LinkState::Closed;
        match &result {
            Ok(()) => log::debug!("[link] closed"),
            Err(e) => log::warn!("[link] close incomplete: {e}"),
        }
        result
    }

    async fn close_active(&mut self) -> Result<(), LinkError> {
        self.state = LinkState::AwaitingPeerFrame(Expected::Disc);
        let mut parser = self.parser(&[control::DISC]);
        let mut timer = RetryTimer::new(self.config.retry);

        'attempts: while timer.try_arm() {
            self.send_command(control::DISC, timer.attempts()).await?;
            loop {
                match self.next_event(&mut parser, timer.deadline()).await? {
                    Some(Event::Supervision { control: control::DISC }) => {
                        timer.cancel();
                        log::debug!("[link] ← DISC");
                        self.send_supervision(control::UA).await?;
                        return Ok(());
                    }
                    Some(other) => log::trace!("[link] ignoring {other:?}"),
                    None => {
                        self.on_timeout("DISC", timer.attempts());
                        continue 'attempts;
                    }
                }
            }
        }

        Err(LinkError::LinkCloseFailed {
            attempts: timer.attempts(),
        })
    }

    async fn close_passive(&mut self) -> Result<(), LinkError> {
        if !self.peer_disc_seen {
            self.wait_for_disc().await?;
        }

        self.state = LinkState::AwaitingPeerFrame(Expected::Ua);
        let mut parser = self.parser(&[control::UA, control::DISC]);
        let mut timer = RetryTimer::new(self.config.retry);

        'attempts: while timer.try_arm() {
            self.send_command(control::DISC, timer.attempts()).await?;
            loop {
                match self.next_event(&mut parser, timer.deadline()).await? {
                    Some(Event::Supervision { control: control::UA }) => {
                        timer.cancel();
                        log::debug!("[link] ← UA");
                        return Ok(());
                    }
                    Some(Event::Supervision { control: control::DISC }) => {
                        // Our DISC was lost; the peer is still asking.
                        log::debug!("[link] ← DISC (repeat)");
                        continue 'attempts;
                    }
                    Some(other) => log::trace!("[link] ignoring {other:?}"),
                    None => {
                        self.on_timeout("UA", timer.attempts());
                        continue 'attempts;
                    }
                }
            }
        }

        Err(LinkError::LinkCloseFailed {
            attempts: timer.attempts(),
        })
    }

    /// Responder side: wait (bounded) for the initiator's DISC.
    ///
    /// Retransmitted information frames are re-acked so a peer that lost our
    /// last RR can finish its send and move on to DISC.
    async fn wait_for_disc(&mut self) -> Result<(), LinkError> {
        self.state = LinkState::AwaitingPeerFrame(Expected::Disc);
        let mut parser = self.parser(&[control::DISC, control::I_0, control::I_1]);
        let mut timer = RetryTimer::new(self.config.retry);

        'attempts: while timer.try_arm() {
            loop {
                match self.next_event(&mut parser, timer.deadline()).await? {
                    Some(Event::Supervision { control: control::DISC }) => {
                        timer.cancel();
                        log::debug!("[link] ← DISC");
                        self.peer_disc_seen = true;
                        return Ok(());
                    }
                    Some(Event::Information { control: ctrl, body }) => {
                        let Some(ns) = Seq::from_info_control(ctrl) else {
                            continue;
                        };
                        if let Verdict::Duplicate { ack } = self.receiver.classify(ns, &body) {
                            self.stats.duplicates += 1;
                            self.send_supervision(ack).await?;
                        }
                    }
                    Some(other) => log::trace!("[link] ignoring {other:?}"),
                    None => {
                        self.on_timeout("DISC", timer.attempts());
                        continue 'attempts;
                    }
                }
            }
        }

        Err(LinkError::LinkCloseFailed {
            attempts: timer.attempts(),
        })
    }

    // -----------------------------------------------------------------------
    // Data transfer
    // -----------------------------------------------------------------------

    /// Deliver `payload` to the peer as one information frame.
    ///
    /// Returns the payload length once the peer acknowledges it with RR for
    /// the next sequence value.  A REJ triggers an immediate retransmission;
    /// silence triggers one after the timeout.  Both consume an attempt.
    /// On [`LinkError::MaxRetriesExceeded`] the sequence bit is unchanged and
    /// the link moves to [`LinkState::Failed`]: whether the peer got the frame
    /// is unknown, so the 1-bit Ns can no longer be trusted.
    ///
    /// A Responder whose UA was lost may see the peer's SET again here; it is
    /// answered with UA and the wait goes on.
    pub async fn send(&mut self, payload: &[u8]) -> Result<usize, LinkError> {
        self.ensure_established()?;
        if payload.len() > self.config.max_payload {
            return Err(LinkError::PayloadTooLarge {
                len: payload.len(),
                max: self.config.max_payload,
            });
        }

        let ns = self.sender.ns;
        self.sender.begin(self.role.local_address(), payload);
        let mut awaited = self.sender.awaited_controls().to_vec();
        if self.role == Role::Responder {
            awaited.push(control::SET);
        }
        let mut parser = self.parser(&awaited);
        let mut timer = RetryTimer::new(self.config.retry);

        'attempts: while timer.try_arm() {
            let Some(frame) = self.sender.in_flight() else {
                break;
            };
            self.channel.write_frame(frame).await?;
            self.sender.on_transmit();
            self.stats.frames_sent += 1;
            if timer.attempts() > 1 {
                self.stats.retransmissions += 1;
            }
            log::debug!(
                "[link] → I({ns}) len={} tx={}",
                payload.len(),
                self.sender.retransmit_count()
            );

            loop {
                match self.next_event(&mut parser, timer.deadline()).await? {
                    Some(Event::Supervision { control: control::SET }) => {
                        log::debug!("[link] ← SET (repeat)");
                        self.send_supervision(control::UA).await?;
                    }
                    Some(Event::Supervision { control: ctrl }) => match self.sender.on_ack(ctrl) {
                        AckOutcome::Acked { payload_len } => {
                            timer.cancel();
                            log::debug!("[link] ← {}", control::name(ctrl));
                            return Ok(payload_len);
                        }
                        AckOutcome::Rejected => {
                            self.stats.rej_received += 1;
                            log::warn!("[link] ← {}; retransmitting", control::name(ctrl));
                            continue 'attempts;
                        }
                        AckOutcome::Ignored => {}
                    },
                    Some(other) => log::trace!("[link] ignoring {other:?}"),
                    None => {
                        self.on_timeout("RR", timer.attempts());
                        continue 'attempts;
                    }
                }
            }
        }

        self.sender.abandon();
        self.state = LinkState::Failed;
        log::warn!("[link] I({ns}) never acknowledged; link failed");
        Err(LinkError::MaxRetriesExceeded {
            attempts: timer.attempts(),
        })
    }

    /// Receive exactly one new payload into `buf`.
    ///
    /// Corrupted frames are answered with REJ and duplicates with a repeated
    /// RR; neither returns.  A payload longer than `buf` yields
    /// [`LinkError::BufferTooSmall`] and is left unacknowledged.
    pub async fn receive(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        let payload = self.receive_frame(Some(buf.len())).await?;
        buf[..payload.len()].copy_from_slice(&payload);
        Ok(payload.len())
    }

    /// Like [`receive`](Self::receive) but returns an owned payload.
    pub async fn receive_vec(&mut self) -> Result<Vec<u8>, LinkError> {
        self.receive_frame(None).await
    }

    async fn receive_frame(&mut self, capacity: Option<usize>) -> Result<Vec<u8>, LinkError> {
        if self.peer_disc_seen {
            return Err(LinkError::PeerDisconnected);
        }
        self.ensure_established()?;

        let mut parser = self.parser(&[control::I_0, control::I_1, control::SET, control::DISC]);
        log::debug!("[link] waiting for I({})", self.receiver.expected);

        loop {
            let Some(event) = self.next_event(&mut parser, None).await? else {
                continue;
            };
            match event {
                Event::Supervision { control: control::SET } => {
                    // Our UA was lost; the peer is still connecting.
                    log::debug!("[link] ← SET (repeat)");
                    self.send_supervision(control::UA).await?;
                }
                Event::Supervision { control: control::DISC } => {
                    log::debug!("[link] ← DISC");
                    self.peer_disc_seen = true;
                    return Err(LinkError::PeerDisconnected);
                }
                Event::Supervision { .. } => {}
                Event::Information { control: ctrl, body } => {
                    let Some(ns) = Seq::from_info_control(ctrl) else {
                        continue;
                    };
                    if let (Some(capacity), Ok(payload)) = (capacity, &body) {
                        if ns == self.receiver.expected && payload.len() > capacity {
                            return Err(LinkError::BufferTooSmall {
                                needed: payload.len(),
                                capacity,
                            });
                        }
                    }
                    match self.receiver.on_frame(ns, body) {
                        Verdict::Deliver { payload, ack } => {
                            log::debug!("[link] ← I({ns}) len={}", payload.len());
                            self.stats.delivered += 1;
                            self.send_supervision(ack).await?;
                            return Ok(payload);
                        }
                        Verdict::Duplicate { ack } => {
                            log::debug!("[link] ← I({ns}) duplicate");
                            self.stats.duplicates += 1;
                            self.send_supervision(ack).await?;
                        }
                        Verdict::Reject { nack, reason } => {
                            log::warn!("[link] ← I({ns}) rejected: {reason}");
                            self.send_supervision(nack).await?;
                        }
                        Verdict::Discard => log::trace!("[link] dropped corrupt I({ns})"),
                    }
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Ns the next outgoing information frame will carry.
    pub fn send_seq(&self) -> Seq {
        self.sender.ns
    }

    /// Ns the next new incoming information frame must carry.
    pub fn recv_seq(&self) -> Seq {
        self.receiver.expected
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn get_ref(&self) -> &T {
        self.channel.get_ref()
    }

    /// Give back the underlying stream.
    pub fn into_inner(self) -> T {
        self.channel.into_inner()
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn ensure_established(&self) -> Result<(), LinkError> {
        match self.state {
            LinkState::Established => Ok(()),
            other => Err(LinkError::BadState(other)),
        }
    }

    fn parser(&self, accepts: &[u8]) -> FrameParser {
        FrameParser::new(
            self.role.peer_address(),
            accepts,
            max_body_len(self.config.max_payload),
        )
    }

    /// Read bytes until `parser` completes a frame or `deadline` passes.
    async fn next_event(
        &mut self,
        parser: &mut FrameParser,
        deadline: Option<Instant>,
    ) -> Result<Option<Event>, LinkError> {
        loop {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok(None);
            }
            let Some(byte) = self.channel.read_byte_until(deadline).await? else {
                return Ok(None);
            };
            if let Some(event) = parser.feed(byte) {
                return Ok(Some(event));
            }
        }
    }

    async fn send_supervision(&mut self, ctrl: u8) -> Result<(), LinkError> {
        let frame = supervision_frame(self.role.local_address(), ctrl);
        self.channel.write_frame(&frame).await?;
        self.stats.frames_sent += 1;
        match ctrl {
            control::RR_0 | control::RR_1 => self.stats.rr_sent += 1,
            control::REJ_0 | control::REJ_1 => self.stats.rej_sent += 1,
            _ => {}
        }
        log::debug!("[link] → {}", control::name(ctrl));
        Ok(())
    }

    /// SET or DISC, counting anything after the first attempt as a retransmission.
    async fn send_command(&mut self, ctrl: u8, attempt: u32) -> Result<(), LinkError> {
        if attempt > 1 {
            self.stats.retransmissions += 1;
        }
        self.send_supervision(ctrl).await
    }

    fn on_timeout(&mut self, awaited: &str, attempt: u32) {
        self.stats.timeouts += 1;
        log::warn!(
            "[link] timeout waiting for {awaited} (attempt {attempt}/{})",
            self.config.retry.max_attempts
        );
    }
}
