//! Per-room negotiation session.
//!
//! The room's elected offerer is *impolite*: on an offer collision (glare)
//! it ignores the incoming offer and keeps its own. The other side is
//! *polite*: it rolls back its own offer and answers the incoming one. Both
//! sides run the same code; only the politeness flag differs, so exactly
//! one of two simultaneous offers completes.
//!
//! The session never touches the socket. Methods return the description
//! (if any) the caller must send as `rtc:offer` / `rtc:answer`.

use tracing::{debug, info, warn};

use super::peer::{
    IceCandidate, IceConnectionState, PeerConnection, PeerError, SdpKind, SessionDescription,
    SignalingState,
};

/// Coarse lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationPhase {
    Idle,
    OfferPending,
    Stable,
    Closed,
}

/// Failures surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NegotiationError {
    #[error("peer connection error: {0}")]
    Peer(#[from] PeerError),
    #[error("negotiation session is closed")]
    Closed,
    /// ICE failed again after a restart; a fresh match is needed.
    #[error("connection lost")]
    ConnectionLost,
}

/// Perfect-negotiation driver for one room.
#[derive(Debug)]
pub struct NegotiationSession<P> {
    peer: P,
    polite: bool,
    ignore_offer: bool,
    phase: NegotiationPhase,
    /// Consecutive ICE failures since the last successful connection.
    ice_failures: u8,
}

impl<P: PeerConnection> NegotiationSession<P> {
    /// Start a session; the side whose id equals `offerer` is impolite.
    pub fn new(peer: P, local_user: &str, offerer: &str) -> Self {
        Self {
            peer,
            polite: local_user != offerer,
            ignore_offer: false,
            phase: NegotiationPhase::Idle,
            ice_failures: 0,
        }
    }

    pub fn is_polite(&self) -> bool {
        self.polite
    }

    pub fn phase(&self) -> NegotiationPhase {
        self.phase
    }

    pub fn peer(&self) -> &P {
        &self.peer
    }

    /// Whether the last remote offer was ignored because of glare.
    pub fn is_ignoring_offer(&self) -> bool {
        self.ignore_offer
    }

    fn ensure_open(&self) -> Result<(), NegotiationError> {
        if self.phase == NegotiationPhase::Closed {
            return Err(NegotiationError::Closed);
        }
        Ok(())
    }

    /// Local renegotiation is needed: create, apply and return an offer.
    pub async fn negotiation_needed(&mut self) -> Result<SessionDescription, NegotiationError> {
        self.ensure_open()?;
        self.make_offer(false).await
    }

    /// Create and apply a local offer.
    ///
    /// Holding `&mut self` for the whole exchange means a remote description
    /// can never be handled while an offer is half made: by the time
    /// [`Self::handle_remote_description`] runs, an outstanding offer is
    /// already applied and shows up as `HaveLocalOffer`.
    async fn make_offer(&mut self, ice_restart: bool) -> Result<SessionDescription, NegotiationError> {
        let offer = self.create_and_apply_offer(ice_restart).await?;
        self.phase = NegotiationPhase::OfferPending;
        debug!(polite = self.polite, ice_restart, "Local offer created");
        Ok(offer)
    }

    async fn create_and_apply_offer(
        &self,
        ice_restart: bool,
    ) -> Result<SessionDescription, PeerError> {
        let offer = self.peer.create_offer(ice_restart).await?;
        self.peer.set_local_description(offer.clone()).await?;
        Ok(offer)
    }

    /// Apply a remote offer or answer. Returns the answer to send back
    /// when the remote side offered and the offer was accepted.
    pub async fn handle_remote_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<Option<SessionDescription>, NegotiationError> {
        self.ensure_open()?;

        let is_offer = description.kind == SdpKind::Offer;
        let collision = is_offer && self.peer.signaling_state() != SignalingState::Stable;

        self.ignore_offer = !self.polite && collision;
        if self.ignore_offer {
            info!("Offer collision, keeping local offer");
            return Ok(None);
        }

        if collision {
            info!("Offer collision, rolling back local offer");
            self.peer
                .set_local_description(SessionDescription::rollback())
                .await?;
        }

        self.peer.set_remote_description(description).await?;

        if !is_offer {
            self.phase = NegotiationPhase::Stable;
            return Ok(None);
        }

        let answer = self.peer.create_answer().await?;
        self.peer.set_local_description(answer.clone()).await?;
        self.phase = NegotiationPhase::Stable;
        Ok(Some(answer))
    }

    /// Apply a remote ICE candidate.
    ///
    /// Failures caused by a deliberately ignored offer are swallowed.
    pub async fn handle_remote_candidate(
        &mut self,
        candidate: IceCandidate,
    ) -> Result<(), NegotiationError> {
        self.ensure_open()?;
        match self.peer.add_ice_candidate(candidate).await {
            Ok(()) => Ok(()),
            Err(e) if self.ignore_offer => {
                debug!(error = %e, "Dropped candidate for ignored offer");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// React to an ICE connection state change.
    ///
    /// The first failure restarts ICE and returns the restart offer; a
    /// second consecutive failure closes the session.
    pub async fn handle_connection_state(
        &mut self,
        state: IceConnectionState,
    ) -> Result<Option<SessionDescription>, NegotiationError> {
        self.ensure_open()?;
        match state {
            IceConnectionState::Connected | IceConnectionState::Completed => {
                self.ice_failures = 0;
                self.phase = NegotiationPhase::Stable;
                Ok(None)
            }
            IceConnectionState::Failed => {
                self.ice_failures += 1;
                if self.ice_failures > 1 {
                    warn!("ICE failed after restart, giving up");
                    self.phase = NegotiationPhase::Closed;
                    return Err(NegotiationError::ConnectionLost);
                }
                info!("ICE failed, restarting");
                self.make_offer(true).await.map(Some)
            }
            IceConnectionState::Closed => {
                self.close();
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    /// Discard the session on room teardown.
    pub fn close(&mut self) {
        self.phase = NegotiationPhase::Closed;
        self.ignore_offer = false;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    /// Minimal signaling-state model of a browser peer connection.
    #[derive(Debug)]
    struct FakePeer {
        name: &'static str,
        state: Mutex<FakeState>,
    }

    #[derive(Debug)]
    struct FakeState {
        signaling: SignalingState,
        remote: Option<SessionDescription>,
        offers: u32,
        restarts: u32,
        candidates: Vec<IceCandidate>,
        fail_offers: bool,
    }

    impl FakePeer {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                state: Mutex::new(FakeState {
                    signaling: SignalingState::Stable,
                    remote: None,
                    offers: 0,
                    restarts: 0,
                    candidates: Vec::new(),
                    fail_offers: false,
                }),
            }
        }

        fn remote(&self) -> Option<SessionDescription> {
            self.state.lock().unwrap().remote.clone()
        }
    }

    fn fail(msg: &str) -> PeerError {
        PeerError(msg.to_string())
    }

    #[async_trait]
    impl PeerConnection for FakePeer {
        fn signaling_state(&self) -> SignalingState {
            self.state.lock().unwrap().signaling
        }

        async fn create_offer(&self, ice_restart: bool) -> Result<SessionDescription, PeerError> {
            let mut state = self.state.lock().unwrap();
            if state.fail_offers {
                return Err(fail("offer failed"));
            }
            state.offers += 1;
            if ice_restart {
                state.restarts += 1;
            }
            Ok(SessionDescription::offer(format!("{}-offer-{}", self.name, state.offers)))
        }

        async fn create_answer(&self) -> Result<SessionDescription, PeerError> {
            let state = self.state.lock().unwrap();
            if state.signaling != SignalingState::HaveRemoteOffer {
                return Err(fail("no remote offer"));
            }
            Ok(SessionDescription::answer(format!("{}-answer", self.name)))
        }

        async fn set_local_description(&self, description: SessionDescription) -> Result<(), PeerError> {
            let mut state = self.state.lock().unwrap();
            state.signaling = match (state.signaling, description.kind) {
                (SignalingState::Stable, SdpKind::Offer) => SignalingState::HaveLocalOffer,
                (SignalingState::HaveLocalOffer, SdpKind::Rollback) => SignalingState::Stable,
                (SignalingState::HaveRemoteOffer, SdpKind::Answer) => SignalingState::Stable,
                _ => return Err(fail("invalid local description")),
            };
            Ok(())
        }

        async fn set_remote_description(&self, description: SessionDescription) -> Result<(), PeerError> {
            let mut state = self.state.lock().unwrap();
            state.signaling = match (state.signaling, description.kind) {
                (SignalingState::Stable, SdpKind::Offer) => SignalingState::HaveRemoteOffer,
                (SignalingState::HaveLocalOffer, SdpKind::Answer) => SignalingState::Stable,
                _ => return Err(fail("invalid remote description")),
            };
            state.remote = Some(description);
            Ok(())
        }

        async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), PeerError> {
            let mut state = self.state.lock().unwrap();
            if state.remote.is_none() {
                return Err(fail("no remote description"));
            }
            state.candidates.push(candidate);
            Ok(())
        }
    }

    fn candidate() -> IceCandidate {
        IceCandidate {
            candidate: "candidate:1 1 udp 1 10.0.0.2 9 typ host".to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_m_line_index: Some(0),
        }
    }

    fn pair() -> (NegotiationSession<FakePeer>, NegotiationSession<FakePeer>) {
        // "alice" sorts first, so she is the offerer and impolite.
        (
            NegotiationSession::new(FakePeer::new("alice"), "alice", "alice"),
            NegotiationSession::new(FakePeer::new("bob"), "bob", "alice"),
        )
    }

    #[tokio::test]
    async fn test_politeness_follows_offerer() {
        let (alice, bob) = pair();
        assert!(!alice.is_polite());
        assert!(bob.is_polite());
        assert_eq!(alice.phase(), NegotiationPhase::Idle);
    }

    #[tokio::test]
    async fn test_plain_offer_answer() {
        let (mut alice, mut bob) = pair();
        let offer = alice.negotiation_needed().await.unwrap();
        assert_eq!(alice.phase(), NegotiationPhase::OfferPending);

        let answer = bob.handle_remote_description(offer).await.unwrap().unwrap();
        assert_eq!(answer.kind, SdpKind::Answer);
        assert_eq!(alice.handle_remote_description(answer).await.unwrap(), None);

        assert_eq!(alice.phase(), NegotiationPhase::Stable);
        assert_eq!(bob.phase(), NegotiationPhase::Stable);
        assert_eq!(alice.peer().signaling_state(), SignalingState::Stable);
    }

    #[tokio::test]
    async fn test_glare_resolves_in_favor_of_impolite_offer() {
        let (mut alice, mut bob) = pair();
        let alice_offer = alice.negotiation_needed().await.unwrap();
        let bob_offer = bob.negotiation_needed().await.unwrap();

        // Both offers cross on the wire.
        assert_eq!(alice.handle_remote_description(bob_offer).await.unwrap(), None);
        assert!(alice.is_ignoring_offer());

        let answer = bob
            .handle_remote_description(alice_offer.clone())
            .await
            .unwrap()
            .expect("polite side answers");
        assert!(!bob.is_ignoring_offer());
        assert_eq!(bob.peer().remote(), Some(alice_offer));

        // Candidates for bob's discarded offer are swallowed on alice's side.
        alice.handle_remote_candidate(candidate()).await.unwrap();

        alice.handle_remote_description(answer).await.unwrap();
        assert_eq!(alice.peer().signaling_state(), SignalingState::Stable);
        assert_eq!(bob.peer().signaling_state(), SignalingState::Stable);
        assert_eq!(alice.peer().remote().map(|d| d.sdp), Some("bob-answer".to_string()));
    }

    #[tokio::test]
    async fn test_applied_local_offer_counts_as_collision() {
        let (_, mut bob) = pair();
        bob.negotiation_needed().await.unwrap();
        assert_eq!(bob.peer().signaling_state(), SignalingState::HaveLocalOffer);

        let incoming = SessionDescription::offer("alice-offer-1".to_string());
        let answer = bob.handle_remote_description(incoming).await.unwrap();
        assert_eq!(answer.map(|d| d.kind), Some(SdpKind::Answer));
        assert!(!bob.is_ignoring_offer());
    }

    #[tokio::test]
    async fn test_failed_local_offer_leaves_no_collision() {
        let (mut alice, _) = pair();
        alice.peer().state.lock().unwrap().fail_offers = true;
        assert!(matches!(
            alice.negotiation_needed().await,
            Err(NegotiationError::Peer(_))
        ));
        assert_eq!(alice.peer().signaling_state(), SignalingState::Stable);

        // The impolite side still answers an offer once nothing is outstanding.
        let incoming = SessionDescription::offer("bob-offer-1".to_string());
        let answer = alice.handle_remote_description(incoming).await.unwrap();
        assert_eq!(answer.map(|d| d.kind), Some(SdpKind::Answer));
        assert!(!alice.is_ignoring_offer());
    }

    #[tokio::test]
    async fn test_candidate_error_surfaces_without_glare() {
        let (_, mut bob) = pair();
        let err = bob.handle_remote_candidate(candidate()).await.unwrap_err();
        assert!(matches!(err, NegotiationError::Peer(_)));
    }

    #[tokio::test]
    async fn test_second_ice_failure_is_terminal() {
        let (mut alice, mut bob) = pair();
        let offer = alice.negotiation_needed().await.unwrap();
        let answer = bob.handle_remote_description(offer).await.unwrap().unwrap();
        alice.handle_remote_description(answer).await.unwrap();

        let restart = alice
            .handle_connection_state(IceConnectionState::Failed)
            .await
            .unwrap()
            .expect("restart offer");
        assert_eq!(restart.kind, SdpKind::Offer);
        assert_eq!(alice.peer().state.lock().unwrap().restarts, 1);

        let answer = bob.handle_remote_description(restart).await.unwrap().unwrap();
        alice.handle_remote_description(answer).await.unwrap();

        assert_eq!(
            alice.handle_connection_state(IceConnectionState::Failed).await,
            Err(NegotiationError::ConnectionLost)
        );
        assert_eq!(alice.phase(), NegotiationPhase::Closed);
        assert_eq!(
            alice.negotiation_needed().await,
            Err(NegotiationError::Closed)
        );
    }

    #[tokio::test]
    async fn test_connected_resets_failure_count() {
        let (mut alice, mut bob) = pair();
        for _ in 0..2 {
            let restart = alice
                .handle_connection_state(IceConnectionState::Failed)
                .await
                .unwrap()
                .unwrap();
            let answer = bob.handle_remote_description(restart).await.unwrap().unwrap();
            alice.handle_remote_description(answer).await.unwrap();
            alice
                .handle_connection_state(IceConnectionState::Connected)
                .await
                .unwrap();
        }
        assert_eq!(alice.phase(), NegotiationPhase::Stable);
    }
}
