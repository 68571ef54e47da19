//! Study enrollment.
//!
//! A researcher publishes a [`StudyInvitation`]: the study's RSA public key and
//! the public half of a long-lived X25519 agreement. A participant answers with
//! a join request sealed in a hybrid envelope; both sides then expand the same
//! shared secret into mirrored key sets. The researcher takes the initiator
//! role and the participant the responder role.
//!
//! ```text
//! researcher                               participant
//!     │ ── invitation (rsa pub, kex pub) ──▶ │
//!     │                                      │ fresh agreement, expand(Responder)
//!     │ ◀── hybrid(JoinRequest) ──────────── │
//!     │ decrypt, agree, expand(Initiator)    │
//! ```

use std::fmt;

use quietbox_crypto::{
    KeyAgreement, KeySet, PeerKeyShare, Role, RsaPrivateKey, RsaPublicKey, expand,
    hybrid::{decrypt_hybrid, encrypt_hybrid, generate_keypair, public_key_from_der, public_key_to_der},
};
use quietbox_proto::{Identifier, cbor};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    data::StudyId,
    env::{EnvRng, Environment},
    error::CoreError,
};

/// Everything a participant needs to join a study.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyInvitation {
    /// Human-readable study name
    pub name: String,
    /// Random identifier naming this study's join queue
    pub queue: Identifier,
    /// Study RSA public key, DER (SPKI)
    #[serde(with = "serde_bytes")]
    pub public_key_der: Vec<u8>,
    /// Public half of the study's key agreement
    pub kex_public: PeerKeyShare,
}

impl StudyInvitation {
    /// Encode for distribution, e.g. as a QR code.
    pub fn encode(&self) -> Result<Vec<u8>, CoreError> {
        cbor::to_vec(self).map_err(|e| CoreError::Format { reason: e.to_string() })
    }

    /// Decode a distributed invitation.
    pub fn decode(bytes: &[u8]) -> Result<Self, CoreError> {
        cbor::from_slice(bytes).map_err(|e| CoreError::Format { reason: format!("invitation: {e}") })
    }
}

/// Plaintext of a join request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    /// Queue of the study being joined
    pub queue: Identifier,
    /// Participant's public agreement value
    pub kex_public: PeerKeyShare,
}

impl JoinRequest {
    /// Build and seal a join request for `invitation`.
    ///
    /// Returns the sealed request for the researcher and the participant's
    /// half of the relationship.
    ///
    /// # Errors
    ///
    /// - `Format` if the invitation's public key does not parse
    /// - `AuthenticationFailed` if the invitation carries a non-contributory
    ///   agreement value
    pub fn prepare<E: Environment>(
        invitation: &StudyInvitation,
        sequence: u32,
        env: &E,
    ) -> Result<(Vec<u8>, KeySet), CoreError> {
        let study_key = public_key_from_der(&invitation.public_key_der)?;

        let mut rng = EnvRng::new(env);
        let mut agreement = KeyAgreement::generate(&mut rng);
        agreement.accept_share(&invitation.kex_public)?;
        let key_set = expand(agreement.shared_secret()?, Role::Responder);

        let request = Self { queue: invitation.queue, kex_public: agreement.public_share() };
        let plaintext =
            cbor::to_vec(&request).map_err(|e| CoreError::Format { reason: e.to_string() })?;
        let sealed = encrypt_hybrid(&plaintext, &study_key, sequence, &mut rng)?;

        debug!(study = %invitation.name, fingerprint = %short(&key_set), "join request prepared");
        Ok((sealed, key_set))
    }
}

/// A sealed join request as received by the researcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSubmission {
    /// Hybrid envelope produced by [`JoinRequest::prepare`]
    pub sealed: Vec<u8>,
    /// Sequence number the researcher expects, `None` to accept any
    pub expected_sequence: Option<u32>,
}

/// Researcher side of a study.
pub struct Study {
    id: StudyId,
    name: String,
    queue: Identifier,
    private_key: RsaPrivateKey,
    agreement: KeyAgreement,
}

impl Study {
    /// Create a study with fresh key material.
    ///
    /// # Errors
    ///
    /// `Format` if `rsa_bits` is below the accepted minimum.
    pub fn create<E: Environment>(
        id: StudyId,
        name: impl Into<String>,
        env: &E,
        rsa_bits: usize,
    ) -> Result<Self, CoreError> {
        let mut rng = EnvRng::new(env);
        let private_key = generate_keypair(&mut rng, rsa_bits)?;
        let agreement = KeyAgreement::generate(&mut rng);
        let queue = Identifier::from_bytes(env.random_array());

        Ok(Self { id, name: name.into(), queue, private_key, agreement })
    }

    /// Persistence handle.
    pub fn id(&self) -> StudyId {
        self.id
    }

    /// Study name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Join queue identifier.
    pub fn queue(&self) -> &Identifier {
        &self.queue
    }

    /// Study RSA public key.
    pub fn public_key(&self) -> RsaPublicKey {
        self.private_key.to_public_key()
    }

    /// Invitation to hand to prospective participants.
    pub fn invitation(&self) -> Result<StudyInvitation, CoreError> {
        Ok(StudyInvitation {
            name: self.name.clone(),
            queue: self.queue,
            public_key_der: public_key_to_der(&self.public_key())?,
            kex_public: self.agreement.public_share(),
        })
    }

    /// Open a join request and derive the researcher's half of the
    /// relationship.
    ///
    /// The agreement is re-armed afterwards whatever the outcome, so the next
    /// request starts clean.
    ///
    /// # Errors
    ///
    /// - `AuthenticationFailed` if the envelope does not open or the sequence
    ///   number is not the expected one
    /// - `ProtocolViolation` if the request names another study's queue or
    ///   does not parse
    pub fn accept_join(
        &mut self,
        sealed: &[u8],
        expected_sequence: Option<u32>,
    ) -> Result<KeySet, CoreError> {
        let result = self.agree(sealed, expected_sequence);
        self.agreement.reset();

        if let Err(err) = &result {
            warn!(study = %self.name, error = %err, "join request rejected");
        }
        result
    }

    fn agree(&mut self, sealed: &[u8], expected_sequence: Option<u32>) -> Result<KeySet, CoreError> {
        let plaintext = decrypt_hybrid(sealed, &self.private_key, expected_sequence)?;
        let request: JoinRequest = cbor::from_slice(&plaintext)
            .map_err(|e| CoreError::violation(format!("join request: {e}")))?;

        if request.queue != self.queue {
            return Err(CoreError::violation(format!(
                "join request for queue {} sent to {}",
                request.queue.short_hex(),
                self.queue.short_hex()
            )));
        }

        self.agreement.accept_share(&request.kex_public)?;
        let key_set = expand(self.agreement.shared_secret()?, Role::Initiator);

        debug!(study = %self.name, fingerprint = %short(&key_set), "join request accepted");
        Ok(key_set)
    }
}

impl fmt::Debug for Study {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Study")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}

fn short(key_set: &KeySet) -> String {
    let mut hex = key_set.fingerprint_hex();
    hex.truncate(16);
    hex
}

#[cfg(test)]
mod tests {
    use quietbox_crypto::{derivation::generate_outbound, hybrid::MIN_RSA_BITS};

    use super::*;
    use crate::env::SystemEnv;

    fn study() -> Study {
        Study::create(StudyId(1), "sleep", &SystemEnv::new(), MIN_RSA_BITS).unwrap()
    }

    #[test]
    fn enrollment_yields_mirrored_key_sets() {
        let mut study = study();
        let invitation = study.invitation().unwrap();

        let (sealed, participant) = JoinRequest::prepare(&invitation, 7, &SystemEnv::new()).unwrap();
        let researcher = study.accept_join(&sealed, Some(7)).unwrap();

        assert!(researcher.initiated());
        assert!(!participant.initiated());
        assert_eq!(researcher.fingerprint(), participant.fingerprint());
        assert_eq!(researcher.inbound_key(), participant.outbound_key());
    }

    #[test]
    fn each_participant_gets_a_distinct_relationship() {
        let mut study = study();
        let invitation = study.invitation().unwrap();
        let env = SystemEnv::new();

        let (first, _) = JoinRequest::prepare(&invitation, 0, &env).unwrap();
        let (second, _) = JoinRequest::prepare(&invitation, 0, &env).unwrap();

        let a = study.accept_join(&first, None).unwrap();
        let b = study.accept_join(&second, None).unwrap();
        assert_ne!(generate_outbound(&a), generate_outbound(&b));
    }

    #[test]
    fn wrong_sequence_is_rejected_and_agreement_rearmed() {
        let mut study = study();
        let invitation = study.invitation().unwrap();
        let (sealed, _) = JoinRequest::prepare(&invitation, 3, &SystemEnv::new()).unwrap();

        assert_eq!(study.accept_join(&sealed, Some(4)).unwrap_err(), CoreError::AuthenticationFailed);
        assert!(study.accept_join(&sealed, Some(3)).is_ok());
    }

    #[test]
    fn request_for_another_queue_is_a_violation() {
        let mut ours = study();
        let other = study();

        let mut invitation = other.invitation().unwrap();
        invitation.public_key_der = ours.invitation().unwrap().public_key_der;

        let (sealed, _) = JoinRequest::prepare(&invitation, 0, &SystemEnv::new()).unwrap();
        assert!(matches!(
            ours.accept_join(&sealed, None),
            Err(CoreError::ProtocolViolation { .. })
        ));
    }

    #[test]
    fn invitation_survives_encoding() {
        let invitation = study().invitation().unwrap();
        let decoded = StudyInvitation::decode(&invitation.encode().unwrap()).unwrap();
        assert_eq!(decoded, invitation);
    }
}
